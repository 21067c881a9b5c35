//! Framework and xcframework assembly.
//!
//! The pipeline runs strictly in order, per SDK and then per library:
//!
//! 1. Discover the dynamic libraries in the first SDK's first arch dist tree
//!    and check every other SDK/arch dist tree holds the same set
//! 2. For each library: relocate install names in each arch's dylib, merge
//!    the archs with `lipo`, then write `Info.plist`, headers and (when
//!    designated) a module map into a fresh `<lib>.framework`
//! 3. Aggregate each library's per-SDK frameworks into one `.xcframework`
//! 4. Sign every aggregate (release builds)
//! 5. Write `bundle-report.json` next to the aggregates
//!
//! Any failure aborts the run; there is no retry and no rollback.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

use super::common::{
    DylibInfo, clean_dir, copy_dir_recursive, discover_dylibs, ensure_same_library_set,
    headers_source_dir,
};
use super::framework::{FrameworkPaths, link_versioned, write_info_plist, write_module_map};
use super::rewrite::{rewrite_dependencies, set_install_id};
use crate::context::lib_name_for;
use crate::layout::BuildLayout;
use crate::matrix::{Arch, Sdk};
use crate::runner::{CommandRunner, Invocation};
use crate::toolchain::SdkProfile;
use crate::types::{BuildProfile, ForgeError, join_names};

/// File name of the JSON summary written next to the aggregates.
pub const REPORT_FILE: &str = "bundle-report.json";

/// Bundle identifier prefix used when none is configured.
pub const DEFAULT_ORG: &str = "com.example";

/// One assembled per-SDK framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameworkInfo {
    pub lib: DylibInfo,
    pub sdk: Sdk,
    pub path: PathBuf,
    pub binary: PathBuf,
    pub source_headers_dir: PathBuf,
    /// One entry per arch; more than one means the binary is fat.
    pub source_dylibs: Vec<PathBuf>,
    pub is_fat: bool,
    pub has_module_map: bool,
}

/// Summary of a bundle run, serialized to [`REPORT_FILE`].
#[derive(Debug, Clone, Serialize)]
pub struct BundleReport {
    pub target: String,
    pub profile: BuildProfile,
    pub platform: String,
    pub sdks: Vec<Sdk>,
    pub libraries: Vec<String>,
    pub frameworks: Vec<FrameworkInfo>,
    pub xcframeworks: Vec<PathBuf>,
    pub signed: bool,
    /// RFC 3339 UTC timestamp.
    pub created_at: String,
}

/// Builds `.framework` bundles per SDK and aggregates them into
/// `.xcframework` packages.
///
/// # Example
///
/// ```ignore
/// use libforge_sdk::builders::XcframeworkBuilder;
/// use libforge_sdk::{BuildLayout, BuildProfile, Platform, SystemRunner};
///
/// let layout = BuildLayout::new("/work/build", "/work/repo");
/// let report = XcframeworkBuilder::new(&layout, &SystemRunner, "ogg")
///     .sdks(Platform::Darwin.sdks().to_vec())
///     .platform_label("darwin")
///     .profile(BuildProfile::Release)
///     .sign_identity(Some("Developer ID Application: Example".into()))
///     .build()?;
/// println!("{} aggregates", report.xcframeworks.len());
/// # Ok::<(), libforge_sdk::ForgeError>(())
/// ```
pub struct XcframeworkBuilder<'a> {
    layout: &'a BuildLayout,
    runner: &'a dyn CommandRunner,
    target: String,
    profile: BuildProfile,
    sdks: Vec<Sdk>,
    platform_label: String,
    org: String,
    module_maps: BTreeSet<String>,
    umbrella_headers: BTreeMap<String, String>,
    sign_identity: Option<String>,
}

impl<'a> XcframeworkBuilder<'a> {
    /// Creates a builder for `target` covering all Apple SDKs. The target's
    /// own library is designated for a module map.
    pub fn new(layout: &'a BuildLayout, runner: &'a dyn CommandRunner, target: impl Into<String>) -> Self {
        let target = target.into();
        let module_maps = BTreeSet::from([lib_name_for(&target)]);
        Self {
            layout,
            runner,
            target,
            profile: BuildProfile::Release,
            sdks: vec![Sdk::MacOsx, Sdk::IphoneOs, Sdk::IphoneSimulator],
            platform_label: "darwin".to_string(),
            org: DEFAULT_ORG.to_string(),
            module_maps,
            umbrella_headers: BTreeMap::new(),
            sign_identity: None,
        }
    }

    pub fn profile(mut self, profile: BuildProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn sdks(mut self, sdks: Vec<Sdk>) -> Self {
        self.sdks = sdks;
        self
    }

    /// Directory name under `xcframework/`, usually the platform name.
    pub fn platform_label(mut self, label: impl Into<String>) -> Self {
        self.platform_label = label.into();
        self
    }

    pub fn org(mut self, org: impl Into<String>) -> Self {
        self.org = org.into();
        self
    }

    /// Replaces the set of libraries that receive a module map. Names are
    /// normalized with a `lib` prefix.
    pub fn module_maps<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.module_maps = names.into_iter().map(|n| lib_name_for(n.as_ref())).collect();
        self
    }

    /// Overrides the umbrella header (default `<lib>.h`) of one library.
    pub fn umbrella_header(mut self, lib: impl AsRef<str>, header: impl Into<String>) -> Self {
        self.umbrella_headers
            .insert(lib_name_for(lib.as_ref()), header.into());
        self
    }

    pub fn sign_identity(mut self, identity: Option<String>) -> Self {
        self.sign_identity = identity.filter(|i| !i.is_empty());
        self
    }

    fn dist_lib_dir(&self, sdk: Sdk, arch: Arch) -> PathBuf {
        self.layout
            .dist_dir(self.profile, sdk, arch, &self.target)
            .join("lib")
    }

    fn validate(&self) -> Result<(), ForgeError> {
        if self.sdks.is_empty() {
            return Err(ForgeError::Config("no SDKs selected for bundling".to_string()));
        }
        if let Some(sdk) = self.sdks.iter().find(|s| !s.is_apple()) {
            return Err(ForgeError::Config(format!(
                "SDK {sdk} cannot be bundled into an xcframework. Bundle SDKs: {}",
                join_names(Sdk::ALL.iter().filter(|s| s.is_apple()).map(|s| s.as_str()))
            )));
        }
        if !self.profile.is_debug() && self.sign_identity.is_none() {
            return Err(ForgeError::Config(
                "a signing identity is required for release builds.\n\n\
                 Pass --sign <identity>, or build with --debug to skip signing."
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Discovers the library set and checks it against every SDK/arch.
    fn discover(&self) -> Result<Vec<DylibInfo>, ForgeError> {
        let first_sdk = self.sdks[0];
        let reference_dir = self.dist_lib_dir(first_sdk, first_sdk.archs()[0]);
        let libs = discover_dylibs(&reference_dir, "dylib")?;
        if libs.is_empty() {
            return Err(ForgeError::Bundle(format!(
                "no dynamic libraries found in {}.\n\n\
                 Build the target with lib_type = \"dylib\" first.",
                reference_dir.display()
            )));
        }
        for &sdk in &self.sdks {
            for &arch in sdk.archs() {
                let dir = self.dist_lib_dir(sdk, arch);
                if dir == reference_dir {
                    continue;
                }
                let other = discover_dylibs(&dir, "dylib")?;
                ensure_same_library_set(&libs, &reference_dir, &other, &dir)?;
            }
        }
        info!(
            libraries = %join_names(libs.iter().map(|l| l.file_name.as_str())),
            "found libraries"
        );
        Ok(libs)
    }

    /// Runs the full pipeline and returns the written report.
    pub fn build(&self) -> Result<BundleReport, ForgeError> {
        self.validate()?;
        let libs = self.discover()?;

        let mut frameworks: BTreeMap<String, Vec<FrameworkInfo>> = BTreeMap::new();
        for &sdk in &self.sdks {
            let mut any_module_map = false;
            for lib in &libs {
                let info = self.assemble_framework(sdk, lib)?;
                any_module_map |= info.has_module_map;
                frameworks.entry(lib.name.clone()).or_default().push(info);
            }
            if !any_module_map {
                return Err(ForgeError::Bundle(format!(
                    "no module map written for target {} on SDK {}.\n\n\
                     Designated libraries: [{}]\n\
                     Discovered libraries: [{}]",
                    self.target,
                    sdk,
                    join_names(self.module_maps.iter().map(String::as_str)),
                    join_names(libs.iter().map(|l| l.name.as_str()))
                )));
            }
        }

        let xc_dir = self.layout.xcframework_dir(self.profile, &self.platform_label);
        clean_dir(&xc_dir)?;
        let mut xcframeworks = Vec::new();
        for lib in &libs {
            let per_sdk = frameworks.get(&lib.name).map(Vec::as_slice).unwrap_or_default();
            xcframeworks.push(self.aggregate(&xc_dir, &lib.name, per_sdk)?);
        }

        let signed = self.sign(&xcframeworks)?;

        let created_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|e| ForgeError::Bundle(format!("failed to format timestamp: {e}")))?;
        let report = BundleReport {
            target: self.target.clone(),
            profile: self.profile,
            platform: self.platform_label.clone(),
            sdks: self.sdks.clone(),
            libraries: libs.iter().map(|l| l.name.clone()).collect(),
            frameworks: libs
                .iter()
                .flat_map(|l| frameworks.remove(&l.name).unwrap_or_default())
                .collect(),
            xcframeworks,
            signed,
            created_at,
        };
        let report_path = xc_dir.join(REPORT_FILE);
        fs::write(&report_path, serde_json::to_string_pretty(&report)?)?;
        info!(report = %report_path.display(), "bundle report written");
        Ok(report)
    }

    fn assemble_framework(&self, sdk: Sdk, lib: &DylibInfo) -> Result<FrameworkInfo, ForgeError> {
        let profile = SdkProfile::for_sdk(sdk);
        let layout = profile.bundle_layout().ok_or_else(|| {
            ForgeError::Config(format!("SDK {sdk} has no framework bundle layout"))
        })?;
        let paths = FrameworkPaths::new(
            &self.layout.framework_dir(self.profile, sdk),
            &lib.name,
            layout,
        );
        info!(sdk = %sdk, framework = %paths.root.display(), "assembling framework");

        let arm64_include = self
            .layout
            .dist_dir(self.profile, sdk, Arch::Arm64, &self.target)
            .join("include");
        let headers_src = headers_source_dir(&arm64_include, &lib.name)?;

        clean_dir(&paths.root)?;
        fs::create_dir_all(&paths.headers_dir)?;

        let mut source_dylibs = Vec::new();
        for &arch in sdk.archs() {
            let dylib = self.dist_lib_dir(sdk, arch).join(&lib.file_name);
            if !dylib.is_file() {
                return Err(ForgeError::MissingPath {
                    kind: "architecture dylib",
                    path: dylib,
                });
            }
            source_dylibs.push(dylib);
        }

        let build_root = self.layout.profile_dir(self.profile);
        for dylib in &source_dylibs {
            set_install_id(self.runner, dylib, &lib.name)?;
            rewrite_dependencies(self.runner, dylib, &build_root)?;
        }

        self.runner.run(
            &Invocation::new("lipo")
                .arg("-create")
                .args(&source_dylibs)
                .arg("-output")
                .arg(&paths.binary),
        )?;

        write_info_plist(&paths, &lib.name, &self.org, profile.min_os_version())?;
        copy_dir_recursive(&headers_src, &paths.headers_dir)?;

        let has_module_map = self.module_maps.contains(&lib.name);
        if has_module_map {
            let default_header = format!("{}.h", lib.name);
            let header = self
                .umbrella_headers
                .get(&lib.name)
                .map(String::as_str)
                .unwrap_or(&default_header);
            info!(lib = %lib.name, header, "writing module map");
            write_module_map(&paths, &lib.name, header)?;
        }

        link_versioned(&paths, &lib.name, has_module_map)?;

        Ok(FrameworkInfo {
            lib: lib.clone(),
            sdk,
            path: paths.root,
            binary: paths.binary,
            source_headers_dir: headers_src,
            is_fat: sdk.is_fat(),
            source_dylibs,
            has_module_map,
        })
    }

    fn aggregate(&self, xc_dir: &Path, lib_name: &str, per_sdk: &[FrameworkInfo]) -> Result<PathBuf, ForgeError> {
        if per_sdk.is_empty() {
            return Err(ForgeError::Bundle(format!(
                "no framework found for library {lib_name}"
            )));
        }
        if per_sdk.len() != self.sdks.len() {
            return Err(ForgeError::Bundle(format!(
                "library {lib_name} has {} frameworks for {} SDKs",
                per_sdk.len(),
                self.sdks.len()
            )));
        }
        let output = xc_dir.join(format!("{lib_name}.xcframework"));
        let mut inv = Invocation::new("xcodebuild").arg("-create-xcframework");
        for fw in per_sdk {
            inv = inv.arg("-framework").arg(&fw.path);
        }
        self.runner.run(&inv.arg("-output").arg(&output))?;
        info!(xcframework = %output.display(), "xcframework created");
        Ok(output)
    }

    /// Signs every aggregate in release builds. Returns whether signing ran.
    fn sign(&self, xcframeworks: &[PathBuf]) -> Result<bool, ForgeError> {
        if self.profile.is_debug() || xcframeworks.is_empty() {
            return Ok(false);
        }
        let identity = self.sign_identity.as_deref().ok_or_else(|| {
            ForgeError::Config("a signing identity is required for release builds".to_string())
        })?;
        warn!(count = xcframeworks.len(), "signing xcframeworks");
        for xc in xcframeworks {
            self.runner.run(
                &Invocation::new("codesign")
                    .args(["--timestamp", "-s", identity])
                    .arg(xc),
            )?;
        }
        Ok(true)
    }
}
