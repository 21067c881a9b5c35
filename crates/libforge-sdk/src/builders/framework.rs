//! `.framework` bundle layout, manifest and module map.

use std::path::{Path, PathBuf};

use super::common::write_file;
use crate::types::ForgeError;

/// On-disk shape of a framework bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleLayout {
    /// macOS: content under `Versions/A`, top-level entries are symlinks
    /// through `Versions/Current`.
    Versioned,
    /// iOS: everything at the bundle root.
    Flat,
}

impl BundleLayout {
    /// Info.plist key carrying the deployment target.
    pub fn min_version_key(&self) -> &'static str {
        match self {
            BundleLayout::Versioned => "LSMinimumSystemVersion",
            BundleLayout::Flat => "MinimumOSVersion",
        }
    }
}

/// Paths inside one `<lib>.framework`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkPaths {
    pub root: PathBuf,
    pub content_dir: PathBuf,
    pub binary: PathBuf,
    pub info_plist: PathBuf,
    pub headers_dir: PathBuf,
    pub modules_dir: PathBuf,
    pub layout: BundleLayout,
}

impl FrameworkPaths {
    /// `framework_dir/<lib>.framework` laid out per `layout`.
    pub fn new(framework_dir: &Path, lib_name: &str, layout: BundleLayout) -> Self {
        let root = framework_dir.join(format!("{lib_name}.framework"));
        let content_dir = match layout {
            BundleLayout::Versioned => root.join("Versions/A"),
            BundleLayout::Flat => root.clone(),
        };
        let plist_dir = match layout {
            BundleLayout::Versioned => content_dir.join("Resources"),
            BundleLayout::Flat => content_dir.clone(),
        };
        Self {
            binary: content_dir.join(lib_name),
            info_plist: plist_dir.join("Info.plist"),
            headers_dir: content_dir.join("Headers"),
            modules_dir: content_dir.join("Modules"),
            root,
            content_dir,
            layout,
        }
    }

    pub fn module_map(&self) -> PathBuf {
        self.modules_dir.join("module.modulemap")
    }
}

/// Framework `Info.plist`.
pub fn info_plist(lib_name: &str, org: &str, layout: BundleLayout, min_version: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>CFBundleExecutable</key>
    <string>{lib}</string>
    <key>CFBundleIdentifier</key>
    <string>{org}.{lib}</string>
    <key>CFBundleName</key>
    <string>{lib}</string>
    <key>CFBundleInfoDictionaryVersion</key>
    <string>6.0</string>
    <key>CFBundleVersion</key>
    <string>1.0.0</string>
    <key>CFBundleShortVersionString</key>
    <string>1.0.0</string>
    <key>CFBundlePackageType</key>
    <string>FMWK</string>
    <key>{key}</key>
    <string>{min_version}</string>
</dict>
</plist>
"#,
        lib = lib_name,
        org = org,
        key = layout.min_version_key(),
        min_version = min_version,
    )
}

/// Single-header module declaration.
pub fn module_map(lib_name: &str, umbrella_header: &str) -> String {
    format!("framework module {lib_name} {{\n\theader \"{umbrella_header}\"\n\n\texport *\n}}\n")
}

pub fn write_info_plist(
    paths: &FrameworkPaths,
    lib_name: &str,
    org: &str,
    min_version: &str,
) -> Result<(), ForgeError> {
    write_file(
        &paths.info_plist,
        &info_plist(lib_name, org, paths.layout, min_version),
    )
}

pub fn write_module_map(paths: &FrameworkPaths, lib_name: &str, umbrella_header: &str) -> Result<(), ForgeError> {
    write_file(&paths.module_map(), &module_map(lib_name, umbrella_header))
}

/// Creates the top-level symlinks of a versioned bundle.
///
/// `Versions/Current -> A` is created first; `Headers`, `Resources`, the
/// binary and (when present) `Modules` then link through it.
pub fn link_versioned(paths: &FrameworkPaths, lib_name: &str, has_modules: bool) -> Result<(), ForgeError> {
    if paths.layout != BundleLayout::Versioned {
        return Ok(());
    }
    symlink("A", &paths.root.join("Versions/Current"))?;
    let mut items = vec!["Headers", "Resources", lib_name];
    if has_modules {
        items.push("Modules");
    }
    for item in items {
        symlink(&format!("Versions/Current/{item}"), &paths.root.join(item))?;
    }
    Ok(())
}

#[cfg(unix)]
fn symlink(target: &str, link: &Path) -> Result<(), ForgeError> {
    std::os::unix::fs::symlink(target, link).map_err(|e| {
        ForgeError::Bundle(format!(
            "failed to link {} -> {}: {}",
            link.display(),
            target,
            e
        ))
    })
}

#[cfg(not(unix))]
fn symlink(target: &str, link: &Path) -> Result<(), ForgeError> {
    Err(ForgeError::Bundle(format!(
        "versioned frameworks need symlink support; cannot link {} -> {}",
        link.display(),
        target
    )))
}
