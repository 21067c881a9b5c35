//! Filesystem helpers shared by the bundle pipeline and JNI packaging.
//!
//! All errors name the path involved so a failed run can be diagnosed from
//! the message alone.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::types::ForgeError;

/// A dynamic library found in a dist `lib` directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct DylibInfo {
    /// File name up to the first `.`, e.g. `libavformat`.
    pub name: String,
    /// Full file name, e.g. `libavformat.61.7.100.dylib`.
    pub file_name: String,
}

/// `libavformat.61.7.100.dylib` -> `libavformat`.
pub fn library_base_name(file_name: &str) -> &str {
    file_name.split('.').next().unwrap_or(file_name)
}

/// Lists regular files in `lib_dir` with extension `ext`, sorted by file name.
///
/// Directories and symbolic links (the usual `libfoo.dylib -> libfoo.1.dylib`
/// aliases) are skipped.
pub fn discover_dylibs(lib_dir: &Path, ext: &str) -> Result<Vec<DylibInfo>, ForgeError> {
    let entries = fs::read_dir(lib_dir).map_err(|e| {
        ForgeError::Bundle(format!(
            "failed to read library directory {}: {}",
            lib_dir.display(),
            e
        ))
    })?;

    let mut libs = Vec::new();
    for entry in entries {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() || file_type.is_symlink() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if Path::new(&file_name).extension().and_then(|e| e.to_str()) != Some(ext) {
            continue;
        }
        libs.push(DylibInfo {
            name: library_base_name(&file_name).to_string(),
            file_name,
        });
    }
    libs.sort();
    Ok(libs)
}

/// Fails when `other` does not contain exactly the libraries in `expected`.
pub fn ensure_same_library_set(
    expected: &[DylibInfo],
    expected_dir: &Path,
    other: &[DylibInfo],
    other_dir: &Path,
) -> Result<(), ForgeError> {
    let want: BTreeSet<&str> = expected.iter().map(|l| l.file_name.as_str()).collect();
    let got: BTreeSet<&str> = other.iter().map(|l| l.file_name.as_str()).collect();
    if want == got {
        return Ok(());
    }
    let missing: Vec<_> = want.difference(&got).copied().collect();
    let extra: Vec<_> = got.difference(&want).copied().collect();
    Err(ForgeError::Bundle(format!(
        "library set mismatch.\n\n\
         Reference: {}\n\
         Checked:   {}\n\
         Missing:   {:?}\n\
         Unexpected: {:?}\n\n\
         Rebuild every SDK and arch from the same sources before bundling.",
        expected_dir.display(),
        other_dir.display(),
        missing,
        extra
    )))
}

/// Removes `dir` if present and recreates it empty.
pub fn clean_dir(dir: &Path) -> Result<(), ForgeError> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|e| {
            ForgeError::Bundle(format!("failed to remove {}: {}", dir.display(), e))
        })?;
    }
    fs::create_dir_all(dir)
        .map_err(|e| ForgeError::Bundle(format!("failed to create {}: {}", dir.display(), e)))
}

/// Writes `contents` to `path`, creating parent directories.
pub fn write_file(path: &Path, contents: &str) -> Result<(), ForgeError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)
        .map_err(|e| ForgeError::Bundle(format!("failed to write {}: {}", path.display(), e)))
}

/// Recursively copies the contents of `src` into `dest`.
pub fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<(), ForgeError> {
    fs::create_dir_all(dest).map_err(|e| {
        ForgeError::Bundle(format!("failed to create directory {}: {}", dest.display(), e))
    })?;

    for entry in fs::read_dir(src).map_err(|e| {
        ForgeError::Bundle(format!("failed to read directory {}: {}", src.display(), e))
    })? {
        let entry = entry?;
        let path = entry.path();
        let dest_path = dest.join(entry.file_name());

        if path.is_dir() {
            copy_dir_recursive(&path, &dest_path)?;
        } else {
            fs::copy(&path, &dest_path).map_err(|e| {
                ForgeError::Bundle(format!(
                    "failed to copy {} to {}: {}",
                    path.display(),
                    dest_path.display(),
                    e
                ))
            })?;
        }
    }

    Ok(())
}

/// Header source for a library: `<include>/<lib>` when it exists, else
/// `<include>` itself.
pub fn headers_source_dir(include_dir: &Path, lib_name: &str) -> Result<PathBuf, ForgeError> {
    let per_lib = include_dir.join(lib_name);
    if per_lib.is_dir() {
        return Ok(per_lib);
    }
    if include_dir.is_dir() {
        return Ok(include_dir.to_path_buf());
    }
    Err(ForgeError::MissingPath {
        kind: "headers directory",
        path: include_dir.to_path_buf(),
    })
}
