//! Post-build checks on produced binaries.
//!
//! Apple binaries are inspected with `lipo -archs` and `otool`; Android
//! binaries with the NDK's `llvm-readelf`.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::context::BuildContext;
use crate::matrix::Arch;
use crate::runner::{CommandRunner, Invocation};
use crate::toolchain::LlvmTool;
use crate::types::ForgeError;

/// Tool used to list a binary's dynamic dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyTool {
    /// `otool -L` for Mach-O binaries.
    Otool,
    /// `llvm-readelf -d` for ELF binaries.
    Readelf(PathBuf),
}

/// Parses `lipo -archs` output for a single-architecture binary.
pub fn parse_lipo_arch(output: &str) -> Result<Arch, ForgeError> {
    match output.trim() {
        "arm64" => Ok(Arch::Arm64),
        "x86_64" => Ok(Arch::X86_64),
        other => Err(ForgeError::Bundle(format!(
            "unexpected architecture list from lipo: '{other}'"
        ))),
    }
}

/// Parses the `Machine:` line of `llvm-readelf -h` output.
pub fn parse_readelf_machine(output: &str) -> Result<Arch, ForgeError> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with("Machine:"))
        .ok_or_else(|| ForgeError::Bundle("no Machine field in readelf output".to_string()))?;
    let machine = line["Machine:".len()..].trim();
    match machine {
        "AArch64" => Ok(Arch::Arm64),
        "x86_64" | "Advanced Micro Devices X86-64" => Ok(Arch::X86_64),
        other => Err(ForgeError::Bundle(format!("unexpected ELF machine '{other}'"))),
    }
}

/// Returns the version of the first `minos` line in `otool -l` output.
pub fn parse_minos(output: &str) -> Option<&str> {
    output
        .lines()
        .map(str::trim)
        .find_map(|l| l.strip_prefix("minos "))
        .map(str::trim)
}

/// Parses dependency install names from `otool -L` output.
///
/// The first line names the binary itself and is skipped. Each remaining line
/// is cut at its first `(`.
pub fn parse_otool_dependencies(output: &str) -> Vec<String> {
    output
        .trim()
        .lines()
        .skip(1)
        .map(|line| match line.find('(') {
            Some(idx) => line[..idx].trim(),
            None => line.trim(),
        })
        .filter(|path| !path.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses `(NEEDED)` entries from `llvm-readelf -d` output.
pub fn parse_readelf_needed(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|l| l.contains("(NEEDED)"))
        .filter_map(|l| {
            let start = l.find('[')?;
            let end = l[start..].find(']')?;
            Some(l[start + 1..start + end].to_string())
        })
        .collect()
}

/// Lists the dynamic dependencies of `file`.
pub fn list_dependencies(
    runner: &dyn CommandRunner,
    tool: &DependencyTool,
    file: &Path,
) -> Result<Vec<String>, ForgeError> {
    match tool {
        DependencyTool::Otool => {
            let out = runner.run(&Invocation::new("otool").arg("-L").arg(file))?;
            Ok(parse_otool_dependencies(&out))
        }
        DependencyTool::Readelf(readelf) => {
            let out = runner.run(&Invocation::new(readelf).arg("-d").arg(file))?;
            Ok(parse_readelf_needed(&out))
        }
    }
}

/// Fails unless `file` was built for the context's architecture.
pub fn verify_arch(ctx: &BuildContext<'_>, file: &Path) -> Result<(), ForgeError> {
    let actual = if ctx.sdk_profile().is_apple() {
        parse_lipo_arch(&ctx.runner().run(&Invocation::new("lipo").arg("-archs").arg(file))?)?
    } else {
        let readelf = ctx.toolchain().llvm_tool(LlvmTool::Readelf)?;
        parse_readelf_machine(&ctx.runner().run(&Invocation::new(readelf).arg("-h").arg(file))?)?
    };
    if actual != ctx.arch() {
        return Err(ForgeError::Bundle(format!(
            "unexpected arch {actual}, expected {} for file {}",
            ctx.arch(),
            file.display()
        )));
    }
    debug!(file = %file.display(), arch = %actual, "arch verified");
    Ok(())
}

/// Fails unless an Apple binary records the SDK's minimum OS version.
/// Android binaries carry the API level in their toolchain triple and are
/// not checked.
pub fn verify_min_os(ctx: &BuildContext<'_>, file: &Path) -> Result<(), ForgeError> {
    let profile = ctx.sdk_profile();
    if !profile.is_apple() {
        return Ok(());
    }
    let out = ctx.runner().run(&Invocation::new("otool").arg("-l").arg(file))?;
    let expected = profile.min_os_version();
    match parse_minos(&out) {
        Some(found) if found == expected => Ok(()),
        Some(found) => Err(ForgeError::Bundle(format!(
            "unexpected min OS version {found}, expected {expected} for file {}",
            file.display()
        ))),
        None => Err(ForgeError::Bundle(format!(
            "cannot find minos in {}",
            file.display()
        ))),
    }
}

/// Checks every listed library in the context's dist `lib` directory.
pub fn verify_outputs(ctx: &BuildContext<'_>, file_names: &[String]) -> Result<(), ForgeError> {
    for name in file_names {
        let file = ctx.dist_lib_file(name);
        if !file.is_file() {
            return Err(ForgeError::MissingPath {
                kind: "build output",
                path: file,
            });
        }
        verify_arch(ctx, &file)?;
        verify_min_os(ctx, &file)?;
    }
    if !file_names.is_empty() {
        info!(count = file_names.len(), sdk = %ctx.sdk(), arch = %ctx.arch(), "outputs verified");
    }
    Ok(())
}
