//! Android JNI packaging.
//!
//! Collects the shared libraries of every Android arch into the
//! `jniLibs/<abi>` layout Gradle expects, next to one `include/` tree taken
//! from the arm64 build.

use std::fs;
use std::path::PathBuf;

use tracing::info;

use super::common::{
    DylibInfo, clean_dir, copy_dir_recursive, discover_dylibs, ensure_same_library_set,
};
use crate::context::{BuildContext, ContextOptions};
use crate::drivers::strip_file;
use crate::layout::BuildLayout;
use crate::matrix::{Arch, Sdk};
use crate::runner::CommandRunner;
use crate::toolchain::ToolchainSettings;
use crate::types::{BuildProfile, ForgeError, LibType};

/// Result of a packaging run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JniOutput {
    /// `<build root>/<profile>/sdk-android/jni`.
    pub dir: PathBuf,
    /// Every library copied, in `jniLibs/<abi>/<file>` form.
    pub libraries: Vec<PathBuf>,
    pub include_dir: PathBuf,
    pub stripped: bool,
}

/// Packages Android `.so` outputs of a target.
pub struct JniPackager<'a> {
    layout: &'a BuildLayout,
    runner: &'a dyn CommandRunner,
    target: String,
    profile: BuildProfile,
    settings: ToolchainSettings,
    strip: bool,
}

impl<'a> JniPackager<'a> {
    pub fn new(layout: &'a BuildLayout, runner: &'a dyn CommandRunner, target: impl Into<String>) -> Self {
        Self {
            layout,
            runner,
            target: target.into(),
            profile: BuildProfile::Release,
            settings: ToolchainSettings::default(),
            strip: false,
        }
    }

    pub fn profile(mut self, profile: BuildProfile) -> Self {
        self.profile = profile;
        self
    }

    /// NDK inputs, only consulted when stripping.
    pub fn toolchain(mut self, settings: ToolchainSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Runs `llvm-strip` on each library instead of copying it verbatim.
    pub fn strip(mut self, strip: bool) -> Self {
        self.strip = strip;
        self
    }

    fn dist_dir(&self, arch: Arch) -> PathBuf {
        self.layout
            .dist_dir(self.profile, Sdk::Android, arch, &self.target)
    }

    fn discover(&self) -> Result<Vec<DylibInfo>, ForgeError> {
        let archs = Sdk::Android.archs();
        let reference_dir = self.dist_dir(archs[0]).join("lib");
        let libs = discover_dylibs(&reference_dir, "so")?;
        if libs.is_empty() {
            return Err(ForgeError::Bundle(format!(
                "no shared libraries found in {}.\n\n\
                 Build the target for android with lib_type = \"dylib\" first.",
                reference_dir.display()
            )));
        }
        for &arch in &archs[1..] {
            let dir = self.dist_dir(arch).join("lib");
            let other = discover_dylibs(&dir, "so")?;
            ensure_same_library_set(&libs, &reference_dir, &other, &dir)?;
        }
        Ok(libs)
    }

    pub fn package(&self) -> Result<JniOutput, ForgeError> {
        let libs = self.discover()?;
        let include_src = self.dist_dir(Arch::Arm64).join("include");
        if !include_src.is_dir() {
            return Err(ForgeError::MissingPath {
                kind: "headers directory",
                path: include_src,
            });
        }

        let dir = self.layout.jni_dir(self.profile);
        clean_dir(&dir)?;

        let mut libraries = Vec::new();
        for &arch in Sdk::Android.archs() {
            let abi_dir = dir.join("jniLibs").join(arch.android_abi());
            fs::create_dir_all(&abi_dir)?;

            let ctx = if self.strip {
                Some(BuildContext::new(
                    self.layout,
                    self.runner,
                    ContextOptions::new(Sdk::Android, arch, self.target.as_str())
                        .profile(self.profile)
                        .lib_type(LibType::Dylib)
                        .toolchain(self.settings.clone()),
                )?)
            } else {
                None
            };

            for lib in &libs {
                let src = self.dist_dir(arch).join("lib").join(&lib.file_name);
                let dst = abi_dir.join(&lib.file_name);
                match &ctx {
                    Some(ctx) => strip_file(ctx, &src, &dst)?,
                    None => {
                        fs::copy(&src, &dst).map_err(|e| {
                            ForgeError::Bundle(format!(
                                "failed to copy {} to {}: {}",
                                src.display(),
                                dst.display(),
                                e
                            ))
                        })?;
                    }
                }
                libraries.push(dst);
            }
            info!(abi = arch.android_abi(), count = libs.len(), "packaged jni libraries");
        }

        let include_dir = dir.join("include");
        copy_dir_recursive(&include_src, &include_dir)?;

        Ok(JniOutput {
            dir,
            libraries,
            include_dir,
            stripped: self.strip,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::runner::RecordingRunner;
    use crate::toolchain::ndk;

    fn seed(layout: &BuildLayout, files: &[(Arch, &str)]) {
        for &arch in Sdk::Android.archs() {
            let dist = layout.dist_dir(BuildProfile::Release, Sdk::Android, arch, "opus");
            fs::create_dir_all(dist.join("lib")).unwrap();
            fs::create_dir_all(dist.join("include/opus")).unwrap();
            fs::write(dist.join("include/opus/opus.h"), arch.as_str()).unwrap();
            fs::write(dist.join("lib/libopus.a"), "").unwrap();
        }
        for (arch, file) in files {
            let dist = layout.dist_dir(BuildProfile::Release, Sdk::Android, *arch, "opus");
            fs::write(dist.join("lib").join(file), arch.android_abi()).unwrap();
        }
    }

    fn fake_ndk(root: &Path) -> PathBuf {
        let ndk_dir = root.join("ndk");
        let bin = ndk::toolchain_root(&ndk_dir).join("bin");
        fs::create_dir_all(&bin).unwrap();
        fs::write(bin.join("llvm-strip"), "").unwrap();
        ndk_dir
    }

    #[test]
    fn test_copies_per_abi_and_arm64_headers() {
        let dir = tempfile::TempDir::new().unwrap();
        let layout = BuildLayout::new(dir.path().join("build"), dir.path().join("repo"));
        seed(
            &layout,
            &[(Arch::Arm64, "libopus.so"), (Arch::X86_64, "libopus.so")],
        );
        let runner = RecordingRunner::new();

        let out = JniPackager::new(&layout, &runner, "opus").package().unwrap();

        let jni = layout.jni_dir(BuildProfile::Release);
        assert_eq!(out.dir, jni);
        assert_eq!(
            out.libraries,
            vec![
                jni.join("jniLibs/arm64-v8a/libopus.so"),
                jni.join("jniLibs/x86_64/libopus.so"),
            ]
        );
        assert_eq!(fs::read_to_string(&out.libraries[1]).unwrap(), "x86_64");
        assert_eq!(
            fs::read_to_string(jni.join("include/opus/opus.h")).unwrap(),
            "arm64"
        );
        assert!(!jni.join("jniLibs/arm64-v8a/libopus.a").exists());
        assert!(runner.argvs().is_empty());
    }

    #[test]
    fn test_strip_uses_ndk_llvm_strip() {
        let dir = tempfile::TempDir::new().unwrap();
        let layout = BuildLayout::new(dir.path().join("build"), dir.path().join("repo"));
        seed(
            &layout,
            &[(Arch::Arm64, "libopus.so"), (Arch::X86_64, "libopus.so")],
        );
        let ndk_dir = fake_ndk(dir.path());
        let runner = RecordingRunner::new();

        let out = JniPackager::new(&layout, &runner, "opus")
            .strip(true)
            .toolchain(ToolchainSettings {
                android_ndk: Some(ndk_dir.clone()),
                ..Default::default()
            })
            .package()
            .unwrap();

        assert!(out.stripped);
        let strip = ndk::toolchain_root(&ndk_dir).join("bin/llvm-strip");
        let argvs = runner.argvs();
        assert_eq!(argvs.len(), 2);
        assert_eq!(argvs[0][0], strip.display().to_string());
        assert_eq!(argvs[0][2], "-o");
        assert_eq!(argvs[0][3], out.libraries[0].display().to_string());
    }

    #[test]
    fn test_abi_library_sets_must_match() {
        let dir = tempfile::TempDir::new().unwrap();
        let layout = BuildLayout::new(dir.path().join("build"), dir.path().join("repo"));
        seed(&layout, &[(Arch::Arm64, "libopus.so")]);
        let runner = RecordingRunner::new();

        let err = JniPackager::new(&layout, &runner, "opus")
            .package()
            .unwrap_err();
        assert!(err.to_string().contains("library set mismatch"));
        assert!(!layout.jni_dir(BuildProfile::Release).exists());
    }

    #[test]
    fn test_no_shared_libraries_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let layout = BuildLayout::new(dir.path().join("build"), dir.path().join("repo"));
        seed(&layout, &[]);
        let runner = RecordingRunner::new();
        let err = JniPackager::new(&layout, &runner, "opus")
            .package()
            .unwrap_err();
        assert!(err.to_string().contains("no shared libraries found"));
    }
}
