//! External build drivers: CMake, autoconf `configure`, and plain `make`.
//!
//! Drivers run synchronously in the repo build directory with inherited
//! stdio. The environment passed to every driver carries `LIBFORGE_*`
//! variables describing the cell, so recipe scripts can locate the dist tree
//! without recomputing paths.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::{BuildContext, FlagOptions, path_string};
use crate::matrix::MIN_ANDROID_API;
use crate::runner::Invocation;
use crate::toolchain::LlvmTool;
use crate::types::{BuildAction, ForgeError, join_names};

/// Prefix of every variable exported to build drivers.
pub const ENV_PREFIX: &str = "LIBFORGE_";

/// Which phase of a driver is running. Exported as `LIBFORGE_STEP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Generate,
    Build,
    Install,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Generate => "generate",
            Step::Build => "build",
            Step::Install => "install",
        }
    }
}

/// Build system used by a target's sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    #[default]
    Cmake,
    Autoconf,
    Make,
}

impl DriverKind {
    pub const ALL: [DriverKind; 3] = [DriverKind::Cmake, DriverKind::Autoconf, DriverKind::Make];

    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::Cmake => "cmake",
            DriverKind::Autoconf => "autoconf",
            DriverKind::Make => "make",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DriverKind::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| {
                ForgeError::Config(format!(
                    "unsupported driver '{}'. Supported drivers: {}",
                    s,
                    join_names(DriverKind::ALL.iter().map(|d| d.as_str()))
                ))
            })
    }
}

/// How to build one source tree in one cell.
#[derive(Debug, Clone)]
pub struct Recipe {
    pub driver: DriverKind,
    pub source_dir: PathBuf,
    /// Working directory of the driver, usually `tmp/<repo>`.
    pub build_dir: PathBuf,
    /// Extra arguments for the generate step.
    pub args: Vec<String>,
    /// Extra environment variables for every step.
    pub env: Vec<(String, String)>,
}

impl Recipe {
    pub fn new(driver: DriverKind, source_dir: impl Into<PathBuf>, build_dir: impl Into<PathBuf>) -> Self {
        Self {
            driver,
            source_dir: source_dir.into(),
            build_dir: build_dir.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Host logical core count, passed as the driver job count.
pub fn jobs() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

fn var(name: &str, value: impl Into<String>) -> (String, String) {
    (format!("{ENV_PREFIX}{name}"), value.into())
}

/// `LIBFORGE_*` variables describing the cell.
pub fn forge_env(ctx: &BuildContext<'_>, step: Option<Step>) -> Vec<(String, String)> {
    let mut env = vec![
        var("SDK", ctx.sdk().as_str()),
        var("ARCH", ctx.arch().as_str()),
        var("ARCH_DIR", path_string(&ctx.arch_dir())),
        var("TARGET", ctx.target()),
        var("TARGET_LIB_NAME", ctx.target_lib_name()),
        var("TARGET_LIB_FILENAME", ctx.target_lib_file_name()),
        var("TARGET_DIR", path_string(&ctx.target_dir())),
        var("LIBS_DIR", path_string(&ctx.libs_dir())),
        var("LIBS_INCLUDE_DIR", path_string(&ctx.libs_include_dir())),
        var("LIBS_LIB_DIR", path_string(&ctx.libs_lib_dir())),
        var("DIST_DIR", path_string(&ctx.dist_dir())),
        var("DIST_INCLUDE_DIR", path_string(&ctx.dist_include_dir())),
        var("DIST_LIB_DIR", path_string(&ctx.dist_lib_dir())),
        var("TMP_DIR", path_string(&ctx.tmp_dir())),
        var("DEBUG", if ctx.profile().is_debug() { "1" } else { "0" }),
        var("DYLIB", if ctx.lib_type().is_shared() { "1" } else { "0" }),
    ];
    if let Some(step) = step {
        env.push(var("STEP", step.as_str()));
    }
    env
}

/// `CC`/`CXX`/`LD` (plus the NDK binutils on Android), and optionally
/// `CFLAGS`/`CXXFLAGS`/`LDFLAGS` built from [`BuildContext::compiler_flags`].
pub fn compiler_env(ctx: &BuildContext<'_>, with_flags: bool) -> Result<Vec<(String, String)>, ForgeError> {
    let toolchain = ctx.toolchain();
    let mut env = vec![
        ("CC".to_string(), path_string(&toolchain.c_compiler()?)),
        ("CXX".to_string(), path_string(&toolchain.cxx_compiler()?)),
        ("LD".to_string(), path_string(&toolchain.linker()?)),
    ];
    if !ctx.sdk_profile().is_apple() {
        for (name, tool) in [
            ("AR", LlvmTool::Ar),
            ("AS", LlvmTool::As),
            ("RANLIB", LlvmTool::Ranlib),
            ("STRIP", LlvmTool::Strip),
            ("NM", LlvmTool::Nm),
        ] {
            env.push((name.to_string(), path_string(&toolchain.llvm_tool(tool)?)));
        }
    }
    if with_flags {
        let flags = ctx.compiler_flags(FlagOptions::default())?.join(" ");
        env.push(("CFLAGS".to_string(), flags.clone()));
        env.push(("CXXFLAGS".to_string(), flags.clone()));
        env.push(("LDFLAGS".to_string(), flags));
    }
    Ok(env)
}

/// Arguments every CMake generate step starts with.
pub fn cmake_common_args(ctx: &BuildContext<'_>) -> Result<Vec<String>, ForgeError> {
    let profile = ctx.sdk_profile();
    let toolchain = ctx.toolchain();
    let mut args = vec![
        format!("-DCMAKE_SYSTEM_NAME={}", profile.cmake_system_name()),
        format!("-DCMAKE_INSTALL_PREFIX={}", ctx.dist_dir().display()),
        format!("-DCMAKE_LIBRARY_PATH={}", ctx.dist_lib_dir().display()),
        "-DCMAKE_FIND_USE_CMAKE_SYSTEM_PATH=0".to_string(),
        "-DCMAKE_FIND_USE_SYSTEM_ENVIRONMENT_PATH=0".to_string(),
        format!(
            "-DBUILD_SHARED_LIBS={}",
            if ctx.lib_type().is_shared() { 1 } else { 0 }
        ),
    ];

    if profile.is_apple() {
        let arch = ctx.arch().as_str();
        args.extend([
            format!("-DCMAKE_OSX_SYSROOT={}", toolchain.sdk_root()?.display()),
            format!("-DCMAKE_OSX_DEPLOYMENT_TARGET={}", profile.min_os_version()),
            format!("-DCMAKE_OSX_ARCHITECTURES={arch}"),
            "-DCMAKE_MACOSX_BUNDLE=0".to_string(),
            "-DCMAKE_XCODE_ATTRIBUTE_CODE_SIGNING_ALLOWED=0".to_string(),
            format!("-DCMAKE_SYSTEM_PROCESSOR={arch}"),
        ]);
    } else {
        let ndk = toolchain.ndk_root()?;
        let abi = ctx.arch().android_abi();
        args.extend([
            format!("-DANDROID_NDK={}", ndk.display()),
            format!("-DANDROID_ABI={abi}"),
            format!("-DANDROID_PLATFORM=android-{MIN_ANDROID_API}"),
            format!("-DCMAKE_ANDROID_NDK={}", ndk.display()),
            format!(
                "-DCMAKE_TOOLCHAIN_FILE={}",
                toolchain.ndk_cmake_toolchain_file()?.display()
            ),
            format!("-DCMAKE_ANDROID_ARCH_ABI={abi}"),
            format!("-DCMAKE_SYSTEM_VERSION={MIN_ANDROID_API}"),
        ]);
    }

    args.push(format!("-DCMAKE_BUILD_TYPE={}", ctx.profile().cmake_build_type()));
    Ok(args)
}

/// Runs the steps of `recipe` selected by `action`.
///
/// | Action | CMake | autoconf | make |
/// |--------|-------|----------|------|
/// | `configure` | generate | `configure` | nothing |
/// | `clean` | `--build . --target clean` | `make clean` | `make clean` |
/// | `build` | generate, build, install | `configure`, `make`, `make install` | `make`, `make install` |
/// | `make` | build, install | `make`, `make install` | `make`, `make install` |
pub fn run_recipe(ctx: &BuildContext<'_>, recipe: &Recipe, action: BuildAction) -> Result<(), ForgeError> {
    info!(
        driver = %recipe.driver,
        action = %action,
        sdk = %ctx.sdk(),
        arch = %ctx.arch(),
        dir = %recipe.build_dir.display(),
        "running build driver"
    );
    let driver = Driver { ctx, recipe };
    match (recipe.driver, action) {
        (DriverKind::Cmake, BuildAction::Configure) => driver.cmake_generate(),
        (DriverKind::Cmake, BuildAction::Clean) => driver.cmake_clean(),
        (DriverKind::Cmake, BuildAction::Build) => {
            driver.cmake_generate()?;
            driver.cmake_build()?;
            driver.cmake_install()
        }
        (DriverKind::Cmake, BuildAction::Make) => {
            driver.cmake_build()?;
            driver.cmake_install()
        }
        (DriverKind::Autoconf, BuildAction::Configure) => driver.autoconf_configure(),
        (DriverKind::Autoconf, BuildAction::Build) => {
            driver.autoconf_configure()?;
            driver.make()?;
            driver.make_install()
        }
        (DriverKind::Make, BuildAction::Configure) => {
            info!("make driver has no configure step");
            Ok(())
        }
        (DriverKind::Autoconf | DriverKind::Make, BuildAction::Clean) => driver.make_clean(),
        (DriverKind::Autoconf | DriverKind::Make, BuildAction::Build | BuildAction::Make) => {
            driver.make()?;
            driver.make_install()
        }
    }
}

struct Driver<'c, 'a> {
    ctx: &'c BuildContext<'a>,
    recipe: &'c Recipe,
}

impl Driver<'_, '_> {
    fn invocation(&self, program: &str, step: Step) -> Invocation {
        Invocation::new(program)
            .current_dir(&self.recipe.build_dir)
            .envs(forge_env(self.ctx, Some(step)))
            .envs(self.recipe.env.iter().cloned())
            .streaming()
    }

    fn run(&self, invocation: Invocation) -> Result<(), ForgeError> {
        self.ctx.runner().run(&invocation)?;
        Ok(())
    }

    fn cmake_generate(&self) -> Result<(), ForgeError> {
        let mut inv = self
            .invocation("cmake", Step::Generate)
            .args(cmake_common_args(self.ctx)?)
            .args(&self.recipe.args)
            .arg(&self.recipe.source_dir);
        if self.ctx.is_clean() {
            inv = inv.arg("--fresh");
        }
        self.run(inv)
    }

    fn cmake_build(&self) -> Result<(), ForgeError> {
        self.run(
            self.invocation("cmake", Step::Build)
                .args(["--build", "."])
                .args(["-j".to_string(), jobs().to_string()])
                .args(["--config", self.ctx.profile().cmake_build_type()]),
        )
    }

    fn cmake_install(&self) -> Result<(), ForgeError> {
        self.run(self.invocation("cmake", Step::Install).args(["--install", "."]))
    }

    fn cmake_clean(&self) -> Result<(), ForgeError> {
        self.run(
            self.invocation("cmake", Step::Build)
                .args(["--build", ".", "--target", "clean"]),
        )
    }

    fn autoconf_configure(&self) -> Result<(), ForgeError> {
        let configure = self.recipe.source_dir.join("configure");
        if !configure.is_file() {
            return Err(ForgeError::MissingPath {
                kind: "configure script",
                path: configure,
            });
        }
        let host = self.ctx.sdk_profile().autoconf_host(self.ctx.arch());
        self.run(
            self.invocation(&path_string(&configure), Step::Generate)
                .envs(compiler_env(self.ctx, true)?)
                .arg(format!("--prefix={}", self.ctx.dist_dir().display()))
                .arg(format!("--host={host}"))
                .args(&self.recipe.args),
        )
    }

    fn make(&self) -> Result<(), ForgeError> {
        self.run(
            self.invocation("make", Step::Build)
                .envs(compiler_env(self.ctx, true)?)
                .arg(format!("-j{}", jobs())),
        )
    }

    fn make_install(&self) -> Result<(), ForgeError> {
        self.run(self.invocation("make", Step::Install).arg("install"))
    }

    fn make_clean(&self) -> Result<(), ForgeError> {
        self.run(self.invocation("make", Step::Build).arg("clean"))
    }
}

/// Strips local symbols from `src` into `dst`.
///
/// Apple SDKs use `strip -x`; the NDK uses `llvm-strip`.
pub fn strip_file(ctx: &BuildContext<'_>, src: &Path, dst: &Path) -> Result<(), ForgeError> {
    let strip = ctx.toolchain().strip()?;
    let mut inv = Invocation::new(&strip);
    if ctx.sdk_profile().is_apple() {
        inv = inv.arg("-x");
    }
    ctx.runner().run(&inv.arg(src).arg("-o").arg(dst))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::context::ContextOptions;
    use crate::layout::BuildLayout;
    use crate::matrix::{Arch, Sdk};
    use crate::runner::RecordingRunner;
    use crate::types::{BuildProfile, LibType};

    /// Answers `xcrun` with a real directory and `xcodebuild -find` with a
    /// real file, so toolchain existence checks pass.
    fn xcode_runner(root: &Path) -> RecordingRunner {
        let sdk = root.join("MacOSX.sdk");
        let clang = root.join("clang");
        fs::create_dir_all(&sdk).unwrap();
        fs::write(&clang, "").unwrap();
        RecordingRunner::with_responder(move |inv| {
            let argv = inv.argv();
            Ok(match argv[0].as_str() {
                "xcrun" => sdk.display().to_string(),
                "xcodebuild" => clang.display().to_string(),
                _ => String::new(),
            })
        })
    }

    fn env_value<'e>(env: &'e [(String, String)], key: &str) -> Option<&'e str> {
        env.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_forge_env_describes_cell() {
        let dir = tempfile::TempDir::new().unwrap();
        let layout = BuildLayout::new(dir.path().join("build"), dir.path().join("repo"));
        let runner = RecordingRunner::new();
        let ctx = BuildContext::new(
            &layout,
            &runner,
            ContextOptions::new(Sdk::Android, Arch::Arm64, "ogg").lib_type(LibType::Dylib),
        )
        .unwrap();

        let env = forge_env(&ctx, Some(Step::Install));
        assert_eq!(env_value(&env, "LIBFORGE_SDK"), Some("android"));
        assert_eq!(env_value(&env, "LIBFORGE_ARCH"), Some("arm64"));
        assert_eq!(env_value(&env, "LIBFORGE_TARGET_LIB_FILENAME"), Some("libogg.so"));
        assert_eq!(env_value(&env, "LIBFORGE_DYLIB"), Some("1"));
        assert_eq!(env_value(&env, "LIBFORGE_STEP"), Some("install"));
        assert_eq!(
            env_value(&env, "LIBFORGE_DIST_DIR").map(PathBuf::from),
            Some(ctx.dist_dir())
        );
        assert!(forge_env(&ctx, None).iter().all(|(k, _)| k != "LIBFORGE_STEP"));
    }

    #[test]
    fn test_cmake_build_runs_generate_build_install() {
        let dir = tempfile::TempDir::new().unwrap();
        let layout = BuildLayout::new(dir.path().join("build"), dir.path().join("repo"));
        let runner = xcode_runner(dir.path());
        let ctx = BuildContext::new(
            &layout,
            &runner,
            ContextOptions::new(Sdk::MacOsx, Arch::X86_64, "ogg")
                .profile(BuildProfile::Debug)
                .clean(true),
        )
        .unwrap();
        let build_dir = ctx.repo_build_dir("ogg").unwrap();
        let recipe = Recipe::new(DriverKind::Cmake, dir.path().join("src"), &build_dir)
            .args(["-DOGG_TESTS=OFF"]);

        run_recipe(&ctx, &recipe, BuildAction::Build).unwrap();

        let cmake: Vec<_> = runner
            .calls()
            .into_iter()
            .filter(|c| c.program() == "cmake")
            .collect();
        assert_eq!(cmake.len(), 3);
        let generate = cmake[0].argv();
        assert!(generate.contains(&"-DCMAKE_SYSTEM_NAME=Darwin".to_string()));
        assert!(generate.contains(&"-DCMAKE_OSX_DEPLOYMENT_TARGET=11.0".to_string()));
        assert!(generate.contains(&"-DCMAKE_OSX_ARCHITECTURES=x86_64".to_string()));
        assert!(generate.contains(&"-DCMAKE_BUILD_TYPE=Debug".to_string()));
        assert!(generate.contains(&"-DBUILD_SHARED_LIBS=0".to_string()));
        assert!(generate.contains(&"-DOGG_TESTS=OFF".to_string()));
        assert_eq!(generate.last().map(String::as_str), Some("--fresh"));
        assert_eq!(cmake[0].working_dir(), Some(build_dir.as_path()));
        assert!(cmake[0].is_streaming());
        assert_eq!(
            env_value(cmake[0].env_vars(), "LIBFORGE_STEP"),
            Some("generate")
        );

        let build = cmake[1].argv();
        assert_eq!(&build[1..3], ["--build", "."]);
        assert_eq!(build[3], "-j");
        assert_eq!(build[4], jobs().to_string());
        assert_eq!(&build[5..], ["--config", "Debug"]);
        assert_eq!(&cmake[2].argv()[1..], ["--install", "."]);
    }

    #[test]
    fn test_autoconf_configure_sets_host_and_compilers() {
        let dir = tempfile::TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("configure"), "#!/bin/sh\n").unwrap();
        let layout = BuildLayout::new(dir.path().join("build"), dir.path().join("repo"));
        let runner = xcode_runner(dir.path());
        let ctx = BuildContext::new(
            &layout,
            &runner,
            ContextOptions::new(Sdk::MacOsx, Arch::Arm64, "vorbis"),
        )
        .unwrap();
        let recipe = Recipe::new(DriverKind::Autoconf, &src, ctx.repo_build_dir("vorbis").unwrap())
            .args(["--disable-docs"]);

        run_recipe(&ctx, &recipe, BuildAction::Configure).unwrap();

        let calls = runner.calls();
        let configure = calls.last().unwrap();
        let argv = configure.argv();
        assert!(argv[0].ends_with("configure"));
        assert_eq!(argv[1], format!("--prefix={}", ctx.dist_dir().display()));
        assert_eq!(argv[2], "--host=arm64-apple-darwin");
        assert_eq!(argv[3], "--disable-docs");
        let cflags = env_value(configure.env_vars(), "CFLAGS").unwrap();
        assert!(cflags.starts_with("-arch arm64 -isysroot "));
        assert!(cflags.ends_with("-mmacosx-version-min=11.0"));
        assert!(env_value(configure.env_vars(), "CC").unwrap().ends_with("clang"));
        assert_eq!(runner.count("make"), 0);
    }

    #[test]
    fn test_missing_configure_script_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let layout = BuildLayout::new(dir.path().join("build"), dir.path().join("repo"));
        let runner = RecordingRunner::new();
        let ctx = BuildContext::new(
            &layout,
            &runner,
            ContextOptions::new(Sdk::Android, Arch::Arm64, "ogg"),
        )
        .unwrap();
        let recipe = Recipe::new(DriverKind::Autoconf, dir.path().join("nowhere"), dir.path());
        let err = run_recipe(&ctx, &recipe, BuildAction::Build).unwrap_err();
        assert!(matches!(err, ForgeError::MissingPath { kind: "configure script", .. }));
        assert!(runner.argvs().is_empty());
    }

    #[test]
    fn test_make_clean_skips_toolchain() {
        let dir = tempfile::TempDir::new().unwrap();
        let layout = BuildLayout::new(dir.path().join("build"), dir.path().join("repo"));
        let runner = RecordingRunner::new();
        let ctx = BuildContext::new(
            &layout,
            &runner,
            ContextOptions::new(Sdk::Android, Arch::X86_64, "ogg"),
        )
        .unwrap();
        let recipe = Recipe::new(DriverKind::Make, dir.path(), dir.path());
        run_recipe(&ctx, &recipe, BuildAction::Clean).unwrap();
        run_recipe(&ctx, &recipe, BuildAction::Configure).unwrap();
        assert_eq!(runner.argvs(), vec![vec!["make".to_string(), "clean".to_string()]]);
    }

    #[test]
    fn test_driver_kind_parse() {
        assert_eq!("autoconf".parse::<DriverKind>().unwrap(), DriverKind::Autoconf);
        let msg = "ninja".parse::<DriverKind>().unwrap_err().to_string();
        assert!(msg.contains("cmake, autoconf, make"));
    }
}
