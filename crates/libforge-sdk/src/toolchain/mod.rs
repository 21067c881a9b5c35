//! Toolchain resolution for one matrix cell.
//!
//! A [`Toolchain`] answers "where is the compiler / linker / SDK root / NDK
//! tool for this (SDK, arch)?". Every answer is resolved lazily and memoized
//! in a [`ToolchainCache`] owned by the toolchain, and therefore by the build
//! context that owns it. The next matrix cell gets a fresh toolchain and an
//! empty cache.
//!
//! SDK-specific behavior is concentrated in [`SdkProfile`], selected once from
//! the SDK when the toolchain is created:
//!
//! | Profile | SDKs | Tools come from |
//! |---------|------|-----------------|
//! | `Desktop` | `macosx` | `xcrun` / `xcodebuild -find` |
//! | `MobileDevice` | `iphoneos`, `iphonesimulator` | `xcrun` / `xcodebuild -find` |
//! | `EmbeddedCross` | `android` | NDK prebuilt LLVM toolchain |

mod apple;
mod cache;
pub mod ndk;

use std::path::PathBuf;

pub use cache::{ToolchainCache, ToolchainKey};
pub use ndk::ToolchainSettings;

use crate::builders::framework::BundleLayout;
use crate::matrix::{Arch, MIN_ANDROID_API, MIN_IOS_VERSION, MIN_MACOS_VERSION, MatrixEntry, Sdk};
use crate::runner::CommandRunner;
use crate::types::ForgeError;

/// What is being resolved. Part of the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    SdkRoot,
    CCompiler,
    CxxCompiler,
    Linker,
    Strip,
    AndroidSdkRoot,
    NdkRoot,
    NdkToolchainRoot,
    NdkCmakeToolchain,
    Llvm(LlvmTool),
}

/// Binutils-style tools shipped with the NDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlvmTool {
    Ar,
    As,
    Ranlib,
    Strip,
    Nm,
    Readelf,
}

impl LlvmTool {
    pub fn bin_name(&self) -> &'static str {
        match self {
            LlvmTool::Ar => "llvm-ar",
            LlvmTool::As => "llvm-as",
            LlvmTool::Ranlib => "llvm-ranlib",
            LlvmTool::Strip => "llvm-strip",
            LlvmTool::Nm => "llvm-nm",
            LlvmTool::Readelf => "llvm-readelf",
        }
    }
}

/// Capability profile of an SDK family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdkProfile {
    /// macOS: versioned framework bundles, `LSMinimumSystemVersion`.
    Desktop,
    /// iOS device or simulator: flat framework bundles, `MinimumOSVersion`.
    MobileDevice { simulator: bool },
    /// Android NDK cross toolchain; no framework bundles.
    EmbeddedCross,
}

impl SdkProfile {
    pub fn for_sdk(sdk: Sdk) -> Self {
        match sdk {
            Sdk::MacOsx => SdkProfile::Desktop,
            Sdk::IphoneOs => SdkProfile::MobileDevice { simulator: false },
            Sdk::IphoneSimulator => SdkProfile::MobileDevice { simulator: true },
            Sdk::Android => SdkProfile::EmbeddedCross,
        }
    }

    pub fn is_apple(&self) -> bool {
        !matches!(self, SdkProfile::EmbeddedCross)
    }

    /// Deployment target (Apple) or API level (Android).
    pub fn min_os_version(&self) -> &'static str {
        match self {
            SdkProfile::Desktop => MIN_MACOS_VERSION,
            SdkProfile::MobileDevice { .. } => MIN_IOS_VERSION,
            SdkProfile::EmbeddedCross => MIN_ANDROID_API,
        }
    }

    /// Compiler flag pinning the minimum OS version. The NDK encodes the API
    /// level in the clang driver name instead.
    pub fn min_os_version_flag(&self) -> Option<String> {
        match self {
            SdkProfile::Desktop => Some(format!("-mmacosx-version-min={MIN_MACOS_VERSION}")),
            SdkProfile::MobileDevice { simulator: true } => {
                Some(format!("-mios-simulator-version-min={MIN_IOS_VERSION}"))
            }
            SdkProfile::MobileDevice { simulator: false } => {
                Some(format!("-miphoneos-version-min={MIN_IOS_VERSION}"))
            }
            SdkProfile::EmbeddedCross => None,
        }
    }

    pub fn bundle_layout(&self) -> Option<BundleLayout> {
        match self {
            SdkProfile::Desktop => Some(BundleLayout::Versioned),
            SdkProfile::MobileDevice { .. } => Some(BundleLayout::Flat),
            SdkProfile::EmbeddedCross => None,
        }
    }

    /// Shared-library file extension, without the dot.
    pub fn dylib_ext(&self) -> &'static str {
        if self.is_apple() { "dylib" } else { "so" }
    }

    pub fn cmake_system_name(&self) -> &'static str {
        match self {
            SdkProfile::Desktop => "Darwin",
            SdkProfile::MobileDevice { .. } => "iOS",
            SdkProfile::EmbeddedCross => "Android",
        }
    }

    /// `--host` triple for autoconf `configure` scripts.
    pub fn autoconf_host(&self, arch: Arch) -> String {
        if self.is_apple() {
            format!("{}-apple-darwin", arch.as_str())
        } else {
            ndk::target_triple(arch)
        }
    }
}

/// Memoizing toolchain resolver for one (SDK, arch).
pub struct Toolchain<'a> {
    runner: &'a dyn CommandRunner,
    entry: MatrixEntry,
    profile: SdkProfile,
    settings: ToolchainSettings,
    cache: ToolchainCache,
}

impl<'a> Toolchain<'a> {
    pub fn new(runner: &'a dyn CommandRunner, entry: MatrixEntry, settings: ToolchainSettings) -> Self {
        Self {
            runner,
            entry,
            profile: SdkProfile::for_sdk(entry.sdk),
            settings,
            cache: ToolchainCache::new(),
        }
    }

    pub fn profile(&self) -> SdkProfile {
        self.profile
    }

    pub fn sdk(&self) -> Sdk {
        self.entry.sdk
    }

    pub fn arch(&self) -> Arch {
        self.entry.arch
    }

    /// Number of memoized entries. Exposed for diagnostics and tests.
    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    fn cached(
        &self,
        kind: ToolKind,
        resolve: impl FnOnce() -> Result<PathBuf, ForgeError>,
    ) -> Result<PathBuf, ForgeError> {
        let key = ToolchainKey {
            sdk: self.entry.sdk,
            arch: self.entry.arch,
            kind,
        };
        self.cache.get_or_resolve(key, resolve)
    }

    fn unsupported(&self, what: &str) -> ForgeError {
        ForgeError::Toolchain(format!(
            "{what} is not available for SDK {} (arch {})",
            self.entry.sdk, self.entry.arch
        ))
    }

    /// SDK root passed as `-isysroot` (Apple) or the NDK sysroot.
    pub fn sdk_root(&self) -> Result<PathBuf, ForgeError> {
        self.cached(ToolKind::SdkRoot, || {
            if self.profile.is_apple() {
                apple::sdk_root(self.runner, self.entry.sdk)
            } else {
                must_be_dir("NDK sysroot", self.ndk_toolchain_root()?.join("sysroot"))
            }
        })
    }

    pub fn c_compiler(&self) -> Result<PathBuf, ForgeError> {
        self.cached(ToolKind::CCompiler, || self.compiler(false))
    }

    pub fn cxx_compiler(&self) -> Result<PathBuf, ForgeError> {
        self.cached(ToolKind::CxxCompiler, || self.compiler(true))
    }

    fn compiler(&self, cxx: bool) -> Result<PathBuf, ForgeError> {
        if self.profile.is_apple() {
            apple::find_tool(self.runner, if cxx { "clang++" } else { "clang" })
        } else {
            self.ndk_bin(&ndk::clang_name(self.entry.arch, cxx))
        }
    }

    /// The clang driver doubles as the linker on every supported SDK.
    pub fn linker(&self) -> Result<PathBuf, ForgeError> {
        self.cached(ToolKind::Linker, || self.c_compiler())
    }

    pub fn strip(&self) -> Result<PathBuf, ForgeError> {
        self.cached(ToolKind::Strip, || {
            if self.profile.is_apple() {
                apple::find_tool(self.runner, "strip")
            } else {
                self.llvm_tool(LlvmTool::Strip)
            }
        })
    }

    pub fn llvm_tool(&self, tool: LlvmTool) -> Result<PathBuf, ForgeError> {
        if self.profile.is_apple() {
            return Err(self.unsupported(tool.bin_name()));
        }
        self.cached(ToolKind::Llvm(tool), || self.ndk_bin(tool.bin_name()))
    }

    pub fn android_sdk_root(&self) -> Result<PathBuf, ForgeError> {
        if self.profile.is_apple() {
            return Err(self.unsupported("Android SDK"));
        }
        self.cached(ToolKind::AndroidSdkRoot, || ndk::android_sdk_root(&self.settings))
    }

    pub fn ndk_root(&self) -> Result<PathBuf, ForgeError> {
        if self.profile.is_apple() {
            return Err(self.unsupported("NDK"));
        }
        self.cached(ToolKind::NdkRoot, || {
            ndk::ndk_root(&self.settings, || self.android_sdk_root())
        })
    }

    pub fn ndk_toolchain_root(&self) -> Result<PathBuf, ForgeError> {
        let ndk_root = self.ndk_root()?;
        self.cached(ToolKind::NdkToolchainRoot, || {
            must_be_dir("NDK toolchain", ndk::toolchain_root(&ndk_root))
        })
    }

    pub fn ndk_cmake_toolchain_file(&self) -> Result<PathBuf, ForgeError> {
        let ndk_root = self.ndk_root()?;
        self.cached(ToolKind::NdkCmakeToolchain, || {
            must_be_file("NDK CMake toolchain file", ndk_root.join(ndk::CMAKE_TOOLCHAIN_FILE))
        })
    }

    fn ndk_bin(&self, name: &str) -> Result<PathBuf, ForgeError> {
        must_be_file("NDK tool", self.ndk_toolchain_root()?.join("bin").join(name))
    }
}

pub(crate) fn must_be_dir(kind: &'static str, path: PathBuf) -> Result<PathBuf, ForgeError> {
    if path.is_dir() {
        Ok(path)
    } else {
        Err(ForgeError::MissingPath { kind, path })
    }
}

pub(crate) fn must_be_file(kind: &'static str, path: PathBuf) -> Result<PathBuf, ForgeError> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(ForgeError::MissingPath { kind, path })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;
    use crate::runner::RecordingRunner;

    fn fake_ndk(root: &Path) -> PathBuf {
        let ndk_dir = root.join("ndk");
        let bin = ndk::toolchain_root(&ndk_dir).join("bin");
        fs::create_dir_all(&bin).unwrap();
        fs::create_dir_all(ndk::toolchain_root(&ndk_dir).join("sysroot")).unwrap();
        for arch in Arch::ALL {
            fs::write(bin.join(ndk::clang_name(arch, false)), "").unwrap();
            fs::write(bin.join(ndk::clang_name(arch, true)), "").unwrap();
        }
        for tool in [LlvmTool::Ar, LlvmTool::Strip, LlvmTool::Readelf] {
            fs::write(bin.join(tool.bin_name()), "").unwrap();
        }
        ndk_dir
    }

    #[test]
    fn test_min_os_flags_are_fixed_per_sdk() {
        assert_eq!(
            SdkProfile::for_sdk(Sdk::MacOsx).min_os_version_flag().as_deref(),
            Some("-mmacosx-version-min=11.0")
        );
        assert_eq!(
            SdkProfile::for_sdk(Sdk::IphoneOs).min_os_version_flag().as_deref(),
            Some("-miphoneos-version-min=14.0")
        );
        assert_eq!(
            SdkProfile::for_sdk(Sdk::IphoneSimulator).min_os_version_flag().as_deref(),
            Some("-mios-simulator-version-min=14.0")
        );
        assert_eq!(SdkProfile::for_sdk(Sdk::Android).min_os_version_flag(), None);
    }

    #[test]
    fn test_bundle_layout_by_family() {
        assert_eq!(SdkProfile::Desktop.bundle_layout(), Some(BundleLayout::Versioned));
        assert_eq!(
            SdkProfile::MobileDevice { simulator: true }.bundle_layout(),
            Some(BundleLayout::Flat)
        );
        assert_eq!(SdkProfile::EmbeddedCross.bundle_layout(), None);
        assert_eq!(SdkProfile::EmbeddedCross.autoconf_host(Arch::Arm64), "aarch64-linux-android28");
        assert_eq!(SdkProfile::Desktop.autoconf_host(Arch::X86_64), "x86_64-apple-darwin");
    }

    #[test]
    fn test_apple_compiler_resolved_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let clang = dir.path().join("clang");
        fs::write(&clang, "").unwrap();
        let reply = clang.display().to_string();
        let runner = RecordingRunner::with_responder(move |_| Ok(format!("{reply}\n")));
        let entry = MatrixEntry::new(Sdk::MacOsx, Arch::Arm64).unwrap();
        let toolchain = Toolchain::new(&runner, entry, ToolchainSettings::default());

        let first = toolchain.c_compiler().unwrap();
        let second = toolchain.c_compiler().unwrap();
        let linker = toolchain.linker().unwrap();
        assert_eq!(first, clang);
        assert_eq!(first, second);
        assert_eq!(linker, clang);
        assert_eq!(runner.count("xcodebuild"), 1);
        assert_eq!(
            runner.argvs()[0],
            vec!["xcodebuild".to_string(), "-find".to_string(), "clang".to_string()]
        );
    }

    #[test]
    fn test_new_toolchain_starts_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let reply = dir.path().display().to_string();
        let runner = RecordingRunner::with_responder(move |_| Ok(reply.clone()));
        let first = Toolchain::new(
            &runner,
            MatrixEntry::new(Sdk::MacOsx, Arch::Arm64).unwrap(),
            ToolchainSettings::default(),
        );
        first.sdk_root().unwrap();
        assert_eq!(first.cached_entries(), 1);

        let next = Toolchain::new(
            &runner,
            MatrixEntry::new(Sdk::MacOsx, Arch::X86_64).unwrap(),
            ToolchainSettings::default(),
        );
        assert_eq!(next.cached_entries(), 0);
        next.sdk_root().unwrap();
        assert_eq!(runner.count("xcrun"), 2);
    }

    #[test]
    fn test_missing_sdk_root_is_fatal() {
        let runner = RecordingRunner::with_responder(|_| Ok("/no/such/sdk\n".to_string()));
        let toolchain = Toolchain::new(
            &runner,
            MatrixEntry::new(Sdk::IphoneOs, Arch::Arm64).unwrap(),
            ToolchainSettings::default(),
        );
        let err = toolchain.sdk_root().unwrap_err();
        assert!(matches!(err, ForgeError::MissingPath { kind: "SDK root", .. }));
    }

    #[test]
    fn test_ndk_paths_compose_from_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let ndk_root = fake_ndk(dir.path());
        let runner = RecordingRunner::new();
        let settings = ToolchainSettings {
            ndk: Some(ndk_root.display().to_string()),
            ..Default::default()
        };
        let toolchain = Toolchain::new(
            &runner,
            MatrixEntry::new(Sdk::Android, Arch::Arm64).unwrap(),
            settings,
        );

        let bin = ndk::toolchain_root(&ndk_root).join("bin");
        assert_eq!(
            toolchain.c_compiler().unwrap(),
            bin.join("aarch64-linux-android28-clang")
        );
        assert_eq!(
            toolchain.cxx_compiler().unwrap(),
            bin.join("aarch64-linux-android28-clang++")
        );
        assert_eq!(toolchain.llvm_tool(LlvmTool::Ar).unwrap(), bin.join("llvm-ar"));
        assert_eq!(toolchain.strip().unwrap(), bin.join("llvm-strip"));
        assert_eq!(
            toolchain.sdk_root().unwrap(),
            ndk::toolchain_root(&ndk_root).join("sysroot")
        );
        assert!(toolchain.llvm_tool(LlvmTool::Nm).is_err());
        assert!(toolchain.ndk_cmake_toolchain_file().is_err());
        assert_eq!(runner.count("xcrun"), 0);
    }

    #[test]
    fn test_ndk_queries_rejected_for_apple() {
        let runner = RecordingRunner::new();
        let toolchain = Toolchain::new(
            &runner,
            MatrixEntry::new(Sdk::MacOsx, Arch::Arm64).unwrap(),
            ToolchainSettings::default(),
        );
        let err = toolchain.ndk_root().unwrap_err();
        assert!(err.to_string().contains("NDK is not available for SDK macosx"));
    }
}
