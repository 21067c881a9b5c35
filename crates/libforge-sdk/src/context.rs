//! Per-cell build context.
//!
//! A [`BuildContext`] is the path set and toolchain resolver for exactly one
//! (SDK, arch, target, profile) tuple. It is created at the start of a matrix
//! cell and dropped at the end of it; nothing is shared between cells.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::layout::BuildLayout;
use crate::matrix::{Arch, MatrixEntry, Sdk};
use crate::runner::CommandRunner;
use crate::toolchain::{SdkProfile, Toolchain, ToolchainSettings};
use crate::types::{BuildProfile, ForgeError, LibType};

/// Inputs for [`BuildContext::new`].
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub sdk: Sdk,
    pub arch: Arch,
    /// Target name, e.g. `ogg` or `libogg`.
    pub target: String,
    pub profile: BuildProfile,
    pub lib_type: LibType,
    /// Wipe per-repo build directories before use.
    pub clean: bool,
    pub toolchain: ToolchainSettings,
}

impl ContextOptions {
    pub fn new(sdk: Sdk, arch: Arch, target: impl Into<String>) -> Self {
        Self {
            sdk,
            arch,
            target: target.into(),
            profile: BuildProfile::Release,
            lib_type: LibType::default(),
            clean: false,
            toolchain: ToolchainSettings::default(),
        }
    }

    pub fn profile(mut self, profile: BuildProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn lib_type(mut self, lib_type: LibType) -> Self {
        self.lib_type = lib_type;
        self
    }

    pub fn clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    pub fn toolchain(mut self, settings: ToolchainSettings) -> Self {
        self.toolchain = settings;
        self
    }
}

/// Options for [`BuildContext::compiler_flags`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FlagOptions {
    /// Omit `-arch <arch>` (for drivers that pass the architecture themselves).
    pub disable_arch: bool,
    /// Add `-fPIC`.
    pub pic: bool,
}

/// Directory tree and memoized toolchain for one matrix cell.
pub struct BuildContext<'a> {
    layout: &'a BuildLayout,
    runner: &'a dyn CommandRunner,
    entry: MatrixEntry,
    target: String,
    target_lib_name: String,
    profile: BuildProfile,
    lib_type: LibType,
    clean: bool,
    toolchain: Toolchain<'a>,
}

impl<'a> BuildContext<'a> {
    /// Validates the (SDK, arch) pair and creates the cell's directory tree.
    ///
    /// Directory creation is idempotent and never removes existing content.
    pub fn new(
        layout: &'a BuildLayout,
        runner: &'a dyn CommandRunner,
        options: ContextOptions,
    ) -> Result<Self, ForgeError> {
        let entry = MatrixEntry::new(options.sdk, options.arch)?;
        if options.target.trim().is_empty() {
            return Err(ForgeError::Config("target name must not be empty".to_string()));
        }
        let target_lib_name = lib_name_for(&options.target);

        let ctx = Self {
            layout,
            runner,
            entry,
            target: options.target,
            target_lib_name,
            profile: options.profile,
            lib_type: options.lib_type,
            clean: options.clean,
            toolchain: Toolchain::new(runner, entry, options.toolchain),
        };

        for dir in [
            ctx.libs_include_dir(),
            ctx.libs_lib_dir(),
            ctx.dist_include_dir(),
            ctx.dist_lib_dir(),
            ctx.tmp_dir(),
        ] {
            fs::create_dir_all(&dir)?;
        }
        debug!(sdk = %ctx.sdk(), arch = %ctx.arch(), target = %ctx.target, dir = %ctx.target_dir().display(), "context ready");
        Ok(ctx)
    }

    pub fn layout(&self) -> &BuildLayout {
        self.layout
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner
    }

    pub fn entry(&self) -> MatrixEntry {
        self.entry
    }

    pub fn sdk(&self) -> Sdk {
        self.entry.sdk
    }

    pub fn arch(&self) -> Arch {
        self.entry.arch
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Target name with a guaranteed `lib` prefix.
    pub fn target_lib_name(&self) -> &str {
        &self.target_lib_name
    }

    /// e.g. `libogg.dylib` or `libogg.so`.
    pub fn target_lib_file_name(&self) -> String {
        format!("{}.{}", self.target_lib_name, self.sdk_profile().dylib_ext())
    }

    pub fn profile(&self) -> BuildProfile {
        self.profile
    }

    pub fn lib_type(&self) -> LibType {
        self.lib_type
    }

    pub fn is_clean(&self) -> bool {
        self.clean
    }

    pub fn sdk_profile(&self) -> SdkProfile {
        self.toolchain.profile()
    }

    pub fn toolchain(&self) -> &Toolchain<'a> {
        &self.toolchain
    }

    pub fn arch_dir(&self) -> PathBuf {
        self.layout.arch_dir(self.profile, self.entry.sdk, self.entry.arch)
    }

    pub fn target_dir(&self) -> PathBuf {
        self.layout
            .target_dir(self.profile, self.entry.sdk, self.entry.arch, &self.target)
    }

    /// Staging tree for prebuilt inputs the target links against.
    pub fn libs_dir(&self) -> PathBuf {
        self.target_dir().join("libs")
    }

    pub fn libs_include_dir(&self) -> PathBuf {
        self.libs_dir().join("include")
    }

    pub fn libs_lib_dir(&self) -> PathBuf {
        self.libs_dir().join("lib")
    }

    /// Install prefix handed to the build driver.
    pub fn dist_dir(&self) -> PathBuf {
        self.layout
            .dist_dir(self.profile, self.entry.sdk, self.entry.arch, &self.target)
    }

    pub fn dist_include_dir(&self) -> PathBuf {
        self.dist_dir().join("include")
    }

    pub fn dist_lib_dir(&self) -> PathBuf {
        self.dist_dir().join("lib")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.target_dir().join("tmp")
    }

    /// Out-of-tree build directory for one source repository:
    /// `tmp/<repo name>`. Wiped first when the context was created with
    /// `clean`.
    pub fn repo_build_dir(&self, repo_name: &str) -> Result<PathBuf, ForgeError> {
        let dir = self.tmp_dir().join(repo_name);
        if self.clean && dir.exists() {
            debug!(dir = %dir.display(), "cleaning build directory");
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Resolves `name` inside the dist library directory.
    pub fn dist_lib_file(&self, name: &str) -> PathBuf {
        self.dist_lib_dir().join(name)
    }

    /// Common C/C++/linker flags for this cell.
    ///
    /// Apple SDKs get `-arch`, `-isysroot` and exactly one minimum-OS flag.
    /// Debug builds add `-g`.
    pub fn compiler_flags(&self, options: FlagOptions) -> Result<Vec<String>, ForgeError> {
        let mut flags = Vec::new();
        let profile = self.sdk_profile();
        if profile.is_apple() {
            if !options.disable_arch {
                flags.push("-arch".to_string());
                flags.push(self.arch().as_str().to_string());
            }
            flags.push("-isysroot".to_string());
            flags.push(path_string(&self.toolchain.sdk_root()?));
            if let Some(flag) = profile.min_os_version_flag() {
                flags.push(flag);
            }
        }
        if self.profile.is_debug() {
            flags.push("-g".to_string());
        }
        if options.pic {
            flags.push("-fPIC".to_string());
        }
        Ok(flags)
    }
}

/// Library name of a target: `ogg` -> `libogg`, `libogg` unchanged.
pub fn lib_name_for(target: &str) -> String {
    if target.starts_with("lib") {
        target.to_string()
    } else {
        format!("lib{target}")
    }
}

pub(crate) fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
