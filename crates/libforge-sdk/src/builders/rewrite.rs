//! Install-name rewriting for relocatable frameworks.
//!
//! Every library gets the install id `@rpath/<lib>.framework/<lib>`. Any
//! dependency that still points into the build tree is redirected the same
//! way, so the frameworks can load each other once embedded in an app.

use std::path::Path;

use tracing::debug;

use super::common::library_base_name;
use crate::inspect::parse_otool_dependencies;
use crate::runner::{CommandRunner, Invocation};
use crate::types::ForgeError;

/// `@rpath/<lib>.framework/<lib>`.
pub fn rpath_install_name(lib_name: &str) -> String {
    format!("@rpath/{lib_name}.framework/{lib_name}")
}

/// One `-change <old> <new>` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub old: String,
    /// Framework name derived from the old file name, e.g. `libswresample`.
    pub bundle: String,
}

impl Rewrite {
    pub fn new_name(&self) -> String {
        rpath_install_name(&self.bundle)
    }
}

/// Builds the rewrite list from `otool -L` output.
///
/// Only dependencies located under `build_root` are rewritten; system
/// libraries and already-relocated `@rpath` names are left alone.
pub fn dependency_rewrites(otool_output: &str, build_root: &Path) -> Vec<Rewrite> {
    parse_otool_dependencies(otool_output)
        .into_iter()
        .filter(|dep| Path::new(dep).starts_with(build_root))
        .map(|old| {
            let file_name = Path::new(&old)
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default();
            Rewrite {
                bundle: library_base_name(&file_name).to_string(),
                old,
            }
        })
        .collect()
}

/// `install_name_tool -id @rpath/<lib>.framework/<lib> <dylib>`.
pub fn set_install_id(runner: &dyn CommandRunner, dylib: &Path, lib_name: &str) -> Result<(), ForgeError> {
    runner.run(
        &Invocation::new("install_name_tool")
            .arg("-id")
            .arg(rpath_install_name(lib_name))
            .arg(dylib),
    )?;
    Ok(())
}

/// Lists `dylib`'s dependencies and redirects the in-tree ones with a single
/// `install_name_tool` call. Returns the applied rewrites.
pub fn rewrite_dependencies(
    runner: &dyn CommandRunner,
    dylib: &Path,
    build_root: &Path,
) -> Result<Vec<Rewrite>, ForgeError> {
    let listing = runner.run(&Invocation::new("otool").arg("-L").arg(dylib))?;
    let rewrites = dependency_rewrites(&listing, build_root);
    if rewrites.is_empty() {
        return Ok(rewrites);
    }

    let mut inv = Invocation::new("install_name_tool");
    for rewrite in &rewrites {
        debug!(dylib = %dylib.display(), from = %rewrite.old, to = %rewrite.new_name(), "rewriting dependency");
        inv = inv.arg("-change").arg(&rewrite.old).arg(rewrite.new_name());
    }
    runner.run(&inv.arg(dylib))?;
    Ok(rewrites)
}
