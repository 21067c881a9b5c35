//! Android NDK layout.
//!
//! The NDK root is resolved from, in order: an explicit `ANDROID_NDK_PATH`, an
//! absolute `--ndk` input, or `<android sdk>/ndk/<--ndk>` where the Android SDK
//! is `ANDROID_SDK_PATH` or `$HOME/Library/Android/sdk`. Every tool lives under
//! `toolchains/llvm/prebuilt/<host tag>/bin`.

use std::env;
use std::path::{Path, PathBuf};

use crate::matrix::{Arch, MIN_ANDROID_API};
use crate::types::ForgeError;

use super::must_be_dir;

/// Path of the CMake toolchain file relative to the NDK root.
pub const CMAKE_TOOLCHAIN_FILE: &str = "build/cmake/android.toolchain.cmake";

/// Inputs for locating the Android SDK and NDK.
///
/// Collected once at process start so toolchain resolution never reads the
/// process environment on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolchainSettings {
    /// `--ndk` value: a version directory name or an absolute path.
    pub ndk: Option<String>,
    /// Android SDK root (`ANDROID_SDK_PATH` or `$HOME/Library/Android/sdk`).
    pub android_sdk: Option<PathBuf>,
    /// Full NDK path override (`ANDROID_NDK_PATH`).
    pub android_ndk: Option<PathBuf>,
}

impl ToolchainSettings {
    /// Reads `ANDROID_NDK_PATH`, `ANDROID_SDK_PATH` and `HOME`.
    pub fn from_env(ndk: Option<String>) -> Self {
        let android_sdk = env::var_os("ANDROID_SDK_PATH")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                env::var_os("HOME")
                    .filter(|v| !v.is_empty())
                    .map(|home| PathBuf::from(home).join("Library/Android/sdk"))
            });
        let android_ndk = env::var_os("ANDROID_NDK_PATH")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self {
            ndk: ndk.filter(|v| !v.is_empty()),
            android_sdk,
            android_ndk,
        }
    }

    /// Whether any NDK input was supplied.
    pub fn has_ndk(&self) -> bool {
        self.ndk.is_some() || self.android_ndk.is_some()
    }
}

pub fn android_sdk_root(settings: &ToolchainSettings) -> Result<PathBuf, ForgeError> {
    settings.android_sdk.clone().ok_or_else(|| {
        ForgeError::Toolchain(
            "Android SDK location unknown.\n\n\
             Set ANDROID_SDK_PATH or install the SDK under $HOME/Library/Android/sdk."
                .to_string(),
        )
    })
}

/// Resolves the NDK root without consulting the filesystem beyond the final
/// existence check. `sdk_root` is only invoked for relative NDK inputs.
pub fn ndk_root(
    settings: &ToolchainSettings,
    sdk_root: impl FnOnce() -> Result<PathBuf, ForgeError>,
) -> Result<PathBuf, ForgeError> {
    let path = if let Some(path) = &settings.android_ndk {
        path.clone()
    } else {
        let input = settings.ndk.as_deref().ok_or_else(|| {
            ForgeError::Config(
                "NDK is not specified. Pass --ndk <version|path> or set ANDROID_NDK_PATH".to_string(),
            )
        })?;
        let input_path = Path::new(input);
        if input_path.is_absolute() {
            input_path.to_path_buf()
        } else {
            sdk_root()?.join("ndk").join(input)
        }
    };
    must_be_dir("NDK directory", path)
}

/// Prebuilt toolchain directory name for the host running libforge.
pub fn host_tag() -> &'static str {
    match env::consts::OS {
        "linux" => "linux-x86_64",
        "windows" => "windows-x86_64",
        // Darwin NDKs ship universal binaries under the x86_64 tag.
        _ => "darwin-x86_64",
    }
}

pub fn toolchain_root(ndk_root: &Path) -> PathBuf {
    ndk_root
        .join("toolchains/llvm/prebuilt")
        .join(host_tag())
}

/// `<arch>-linux-android<api>`, e.g. `aarch64-linux-android28`.
pub fn target_triple(arch: Arch) -> String {
    format!("{}-linux-android{}", arch.triple_name(), MIN_ANDROID_API)
}

/// API-qualified clang driver name.
pub fn clang_name(arch: Arch, cxx: bool) -> String {
    let mut name = format!("{}-clang", target_triple(arch));
    if cxx {
        name.push_str("++");
    }
    name
}
