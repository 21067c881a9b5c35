//! Root paths of a libforge run.
//!
//! A [`BuildLayout`] is constructed once at process start (usually from
//! `libforge.toml`) and passed by reference to every context, driver and
//! pipeline. Everything below the roots is derived:
//!
//! ```text
//! <build root>/
//! └── {release|debug}/
//!     ├── sdk-<sdk>/
//!     │   ├── <arch>/<target>/{libs,dist,tmp}/
//!     │   ├── framework/<lib>.framework
//!     │   └── jni/{jniLibs/<abi>,include}      (android only)
//!     └── xcframework/<platform>/<lib>.xcframework
//! <repo root>/<name>/<version selector>/
//! ```

use std::path::{Path, PathBuf};

use crate::matrix::{Arch, Sdk};
use crate::types::BuildProfile;

/// Absolute build and source roots for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLayout {
    build_root: PathBuf,
    repo_root: PathBuf,
}

impl BuildLayout {
    /// Creates a layout from two roots.
    ///
    /// Callers are expected to pass absolute paths; the layout never reads the
    /// working directory itself.
    pub fn new(build_root: impl Into<PathBuf>, repo_root: impl Into<PathBuf>) -> Self {
        Self {
            build_root: build_root.into(),
            repo_root: repo_root.into(),
        }
    }

    pub fn build_root(&self) -> &Path {
        &self.build_root
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// `<build root>/{release|debug}`. Dependency rewriting treats this as the
    /// boundary of "inside the build tree".
    pub fn profile_dir(&self, profile: BuildProfile) -> PathBuf {
        self.build_root.join(profile.as_str())
    }

    pub fn sdk_dir(&self, profile: BuildProfile, sdk: Sdk) -> PathBuf {
        self.profile_dir(profile).join(format!("sdk-{}", sdk.as_str()))
    }

    pub fn arch_dir(&self, profile: BuildProfile, sdk: Sdk, arch: Arch) -> PathBuf {
        self.sdk_dir(profile, sdk).join(arch.as_str())
    }

    pub fn target_dir(&self, profile: BuildProfile, sdk: Sdk, arch: Arch, target: &str) -> PathBuf {
        self.arch_dir(profile, sdk, arch).join(target)
    }

    /// Install prefix of a target for one (SDK, arch).
    pub fn dist_dir(&self, profile: BuildProfile, sdk: Sdk, arch: Arch, target: &str) -> PathBuf {
        self.target_dir(profile, sdk, arch, target).join("dist")
    }

    /// Directory holding the per-SDK `.framework` bundles.
    pub fn framework_dir(&self, profile: BuildProfile, sdk: Sdk) -> PathBuf {
        self.sdk_dir(profile, sdk).join("framework")
    }

    /// Directory holding the aggregated `.xcframework` packages for a platform label.
    pub fn xcframework_dir(&self, profile: BuildProfile, platform_label: &str) -> PathBuf {
        self.profile_dir(profile).join("xcframework").join(platform_label)
    }

    /// Root of the Android JNI packaging output.
    pub fn jni_dir(&self, profile: BuildProfile) -> PathBuf {
        self.sdk_dir(profile, Sdk::Android).join("jni")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths_follow_profile_sdk_arch_target() {
        let layout = BuildLayout::new("/work/build", "/work/repo");
        assert_eq!(
            layout.dist_dir(BuildProfile::Release, Sdk::IphoneOs, Arch::Arm64, "libogg"),
            PathBuf::from("/work/build/release/sdk-iphoneos/arm64/libogg/dist")
        );
        assert_eq!(
            layout.framework_dir(BuildProfile::Debug, Sdk::MacOsx),
            PathBuf::from("/work/build/debug/sdk-macosx/framework")
        );
        assert_eq!(
            layout.xcframework_dir(BuildProfile::Release, "darwin"),
            PathBuf::from("/work/build/release/xcframework/darwin")
        );
        assert_eq!(
            layout.jni_dir(BuildProfile::Release),
            PathBuf::from("/work/build/release/sdk-android/jni")
        );
    }

    #[test]
    fn test_profiles_do_not_collide() {
        let layout = BuildLayout::new("/b", "/r");
        assert_ne!(
            layout.arch_dir(BuildProfile::Debug, Sdk::Android, Arch::Arm64),
            layout.arch_dir(BuildProfile::Release, Sdk::Android, Arch::Arm64)
        );
    }
}
