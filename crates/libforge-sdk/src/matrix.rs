//! Static tables of valid platform / SDK / architecture combinations.
//!
//! | Platform | SDKs |
//! |----------|------|
//! | `macos` | `macosx` |
//! | `ios` | `iphoneos`, `iphonesimulator` |
//! | `darwin` | `macosx`, `iphoneos`, `iphonesimulator` |
//! | `android` | `android` |
//!
//! | SDK | Architectures | Multi-arch bundle |
//! |-----|---------------|-------------------|
//! | `macosx` | `arm64`, `x86_64` | yes |
//! | `iphoneos` | `arm64` | no |
//! | `iphonesimulator` | `arm64` | yes |
//! | `android` | `arm64`, `x86_64` | no |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{ForgeError, join_names};

/// Minimum macOS deployment target.
pub const MIN_MACOS_VERSION: &str = "11.0";
/// Minimum iOS (device and simulator) deployment target.
pub const MIN_IOS_VERSION: &str = "14.0";
/// Minimum Android API level baked into NDK compiler triples.
pub const MIN_ANDROID_API: &str = "28";

/// A user-facing platform grouping one or more SDKs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Macos,
    Ios,
    /// macOS and iOS together.
    Darwin,
    Android,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Macos,
        Platform::Ios,
        Platform::Darwin,
        Platform::Android,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Macos => "macos",
            Platform::Ios => "ios",
            Platform::Darwin => "darwin",
            Platform::Android => "android",
        }
    }

    /// SDKs built for this platform, in iteration order.
    pub fn sdks(&self) -> &'static [Sdk] {
        match self {
            Platform::Macos => &[Sdk::MacOsx],
            Platform::Ios => &[Sdk::IphoneOs, Sdk::IphoneSimulator],
            Platform::Darwin => &[Sdk::MacOsx, Sdk::IphoneOs, Sdk::IphoneSimulator],
            Platform::Android => &[Sdk::Android],
        }
    }
}

/// A platform toolchain root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sdk {
    #[serde(rename = "macosx")]
    MacOsx,
    #[serde(rename = "iphoneos")]
    IphoneOs,
    #[serde(rename = "iphonesimulator")]
    IphoneSimulator,
    #[serde(rename = "android")]
    Android,
}

impl Sdk {
    pub const ALL: [Sdk; 4] = [Sdk::MacOsx, Sdk::IphoneOs, Sdk::IphoneSimulator, Sdk::Android];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sdk::MacOsx => "macosx",
            Sdk::IphoneOs => "iphoneos",
            Sdk::IphoneSimulator => "iphonesimulator",
            Sdk::Android => "android",
        }
    }

    /// Architectures this SDK can be built for.
    pub fn archs(&self) -> &'static [Arch] {
        match self {
            Sdk::MacOsx => &[Arch::Arm64, Arch::X86_64],
            Sdk::IphoneOs => &[Arch::Arm64],
            Sdk::IphoneSimulator => &[Arch::Arm64],
            Sdk::Android => &[Arch::Arm64, Arch::X86_64],
        }
    }

    /// Whether bundles for this SDK are merged into a multi-architecture binary.
    pub fn is_fat(&self) -> bool {
        matches!(self, Sdk::MacOsx | Sdk::IphoneSimulator)
    }

    /// Apple SDKs are driven through the Xcode toolchain.
    pub fn is_apple(&self) -> bool {
        !matches!(self, Sdk::Android)
    }

    pub fn supports(&self, arch: Arch) -> bool {
        self.archs().contains(&arch)
    }
}

/// Target CPU instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Arch {
    #[serde(rename = "arm64")]
    Arm64,
    #[serde(rename = "x86_64")]
    X86_64,
}

impl Arch {
    pub const ALL: [Arch; 2] = [Arch::Arm64, Arch::X86_64];

    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Arm64 => "arm64",
            Arch::X86_64 => "x86_64",
        }
    }

    /// GNU-style name used in target triples (`aarch64-linux-android28`).
    pub fn triple_name(&self) -> &'static str {
        match self {
            Arch::Arm64 => "aarch64",
            Arch::X86_64 => "x86_64",
        }
    }

    /// Android ABI directory name used under `jniLibs/`.
    pub fn android_abi(&self) -> &'static str {
        match self {
            Arch::Arm64 => "arm64-v8a",
            Arch::X86_64 => "x86_64",
        }
    }
}

macro_rules! impl_display_from_str {
    ($ty:ident, $what:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ForgeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $ty::ALL
                    .into_iter()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| {
                        ForgeError::Config(format!(
                            "unsupported {} '{}'. Supported values: {}",
                            $what,
                            s,
                            join_names($ty::ALL.iter().map(|v| v.as_str()))
                        ))
                    })
            }
        }
    };
}

impl_display_from_str!(Platform, "platform");
impl_display_from_str!(Sdk, "SDK");
impl_display_from_str!(Arch, "arch");

/// A validated (SDK, architecture) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatrixEntry {
    pub sdk: Sdk,
    pub arch: Arch,
}

impl MatrixEntry {
    /// Validates that `arch` is supported by `sdk`.
    ///
    /// The error lists the architectures the SDK does support.
    pub fn new(sdk: Sdk, arch: Arch) -> Result<Self, ForgeError> {
        if !sdk.supports(arch) {
            return Err(ForgeError::Config(format!(
                "unsupported arch {} for SDK {}, valid archs: [{}]",
                arch,
                sdk,
                join_names(sdk.archs().iter().map(|a| a.as_str()))
            )));
        }
        Ok(Self { sdk, arch })
    }
}

/// Expands the selected SDKs into matrix cells, SDK-major.
///
/// With an explicit `arch`, every SDK must support it; otherwise each SDK
/// contributes all of its architectures.
pub fn expand_matrix(sdks: &[Sdk], arch: Option<Arch>) -> Result<Vec<MatrixEntry>, ForgeError> {
    if sdks.is_empty() {
        return Err(ForgeError::Config(
            "no SDKs selected. Specify SDKs via --platform or --sdk".to_string(),
        ));
    }
    let mut cells = Vec::new();
    for &sdk in sdks {
        match arch {
            Some(arch) => cells.push(MatrixEntry::new(sdk, arch)?),
            None => cells.extend(sdk.archs().iter().map(|&arch| MatrixEntry { sdk, arch })),
        }
    }
    Ok(cells)
}

/// Resolves the SDK list from an optional platform and an optional single SDK.
///
/// When both are given the SDK must belong to the platform.
pub fn select_sdks(platform: Option<Platform>, sdk: Option<Sdk>) -> Result<Vec<Sdk>, ForgeError> {
    match (platform, sdk) {
        (Some(platform), Some(sdk)) => {
            if !platform.sdks().contains(&sdk) {
                return Err(ForgeError::Config(format!(
                    "SDK {} is not part of platform {}. Platform SDKs: [{}]",
                    sdk,
                    platform,
                    join_names(platform.sdks().iter().map(|s| s.as_str()))
                )));
            }
            Ok(vec![sdk])
        }
        (None, Some(sdk)) => Ok(vec![sdk]),
        (Some(platform), None) => Ok(platform.sdks().to_vec()),
        (None, None) => Err(ForgeError::Config(
            "no SDKs found. Please specify SDKs via --platform or --sdk".to_string(),
        )),
    }
}
