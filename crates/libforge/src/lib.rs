//! # libforge
//!
//! Command-line tool for cross-compiling native C/C++ libraries for Apple and
//! Android SDKs and packaging them for app projects.
//!
//! ## Overview
//!
//! `libforge` walks a matrix of SDKs and architectures for one target:
//!
//! - **Fetching** - Downloads an archive or checks out a git revision once
//! - **Building** - Runs CMake, autoconf or make per (SDK, arch) cell
//! - **Packaging** - Assembles `.framework`/`.xcframework` bundles or a JNI tree
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a starter libforge.toml
//! libforge init --target ogg
//!
//! # Build every iOS cell
//! libforge build --target ogg --platform ios
//!
//! # Bundle the shared libraries
//! libforge xcframework --target ogg --platform ios --sign "Developer ID Application: Example"
//!
//! # Build and package for Android
//! libforge build --target ogg --platform android --ndk 26.1.10909125
//! libforge jni --target ogg --ndk 26.1.10909125 --strip
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `build` | Fetch sources and run the build driver for each matrix cell |
//! | `xcframework` | Bundle Apple dylibs into frameworks and xcframeworks |
//! | `jni` | Package Android shared libraries per ABI |
//! | `deps` | List a binary's dynamic dependencies |
//! | `repo-dir` | Print a target's source directory |
//! | `init` | Write a starter `libforge.toml` |
//!
//! ## Output Directory
//!
//! ```text
//! build/
//! ├── release/
//! │   ├── sdk-iphoneos/
//! │   │   ├── arm64/ogg/{libs,dist,tmp}
//! │   │   └── framework/libogg.framework
//! │   ├── sdk-android/jni/{jniLibs,include}
//! │   └── xcframework/ios/libogg.xcframework
//! └── debug/
//! ```
//!
//! ## Environment
//!
//! `ANDROID_NDK_PATH`, `ANDROID_SDK_PATH` and `HOME` locate the NDK. They may
//! be set in a `.env` file next to the configuration.
//!
//! ## CLI Flags
//!
//! Global flags available on all commands:
//!
//! - **`--config <path>`** - Use this configuration instead of discovering one
//! - **`--verbose` / `-v`** - Log every spawned command
//!
//! ## Modules
//!
//! - [`config`] - Configuration file support for `libforge.toml`

#![cfg_attr(docsrs, feature(doc_cfg))]

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use libforge_sdk::builders::{JniPackager, XcframeworkBuilder};
use libforge_sdk::inspect::DependencyTool;
use libforge_sdk::toolchain::LlvmTool;
use libforge_sdk::{
    Arch, BuildAction, BuildContext, BuildProfile, ContextOptions, MatrixEntry, Platform, Recipe,
    Sdk, SystemRunner, Toolchain, ToolchainSettings, expand_matrix, fetch, list_dependencies,
    run_recipe, select_sdks, verify_outputs,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::{CONFIG_FILE_NAME, ForgeConfig, TargetConfig};

pub mod config;

/// Cross-compiles native libraries for Apple and Android SDKs.
#[derive(Parser, Debug)]
#[command(name = "libforge", author, version, about = "Native library build orchestrator for Apple and Android SDKs", long_about = None)]
pub struct Cli {
    /// Configuration file (default: discover libforge.toml upward)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print verbose output including all commands
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch sources and build a target for every selected (SDK, arch) cell.
    Build {
        #[arg(long, help = "Target name from libforge.toml (default: project.default_target)")]
        target: Option<String>,
        #[arg(long, help = "macos, ios, darwin or android")]
        platform: Option<String>,
        #[arg(long, help = "macosx, iphoneos, iphonesimulator or android")]
        sdk: Option<String>,
        #[arg(long, help = "arm64 or x86_64 (default: every arch of each SDK)")]
        arch: Option<String>,
        #[arg(long, default_value = "build", help = "configure, clean, build or make")]
        action: String,
        #[arg(long, help = "NDK version under $ANDROID_SDK_PATH/ndk, or an absolute path")]
        ndk: Option<String>,
        #[arg(long, help = "Build the debug profile")]
        debug: bool,
        #[arg(long, help = "Wipe build directories before running the driver")]
        clean: bool,
    },
    /// Bundle built dylibs into frameworks and one xcframework per library.
    Xcframework {
        #[arg(long)]
        target: Option<String>,
        #[arg(long, help = "macos, ios or darwin (default: darwin)")]
        platform: Option<String>,
        #[arg(long, help = "Bundle a single SDK of the platform")]
        sdk: Option<String>,
        #[arg(long)]
        debug: bool,
        #[arg(long, help = "Code signing identity, required for release builds")]
        sign: Option<String>,
    },
    /// Package Android shared libraries into jniLibs/<abi> and include/.
    Jni {
        #[arg(long)]
        target: Option<String>,
        #[arg(long)]
        debug: bool,
        #[arg(long)]
        ndk: Option<String>,
        #[arg(long, help = "Strip libraries with llvm-strip while copying")]
        strip: bool,
    },
    /// List the dynamic dependencies of a built binary.
    Deps {
        file: PathBuf,
        #[arg(long, default_value = "darwin", help = "darwin (otool) or android (llvm-readelf)")]
        os: String,
        #[arg(long)]
        ndk: Option<String>,
    },
    /// Print the source directory a target is fetched into.
    RepoDir {
        #[arg(long)]
        target: Option<String>,
    },
    /// Write a starter configuration file.
    Init {
        #[arg(long, default_value = CONFIG_FILE_NAME)]
        output: PathBuf,
        #[arg(long, default_value = "mylib")]
        target: String,
    },
}

/// Parses arguments, loads `.env` and the configuration, then runs the
/// selected command.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run_cli(cli)
}

/// Installs the `tracing` subscriber. `RUST_LOG` wins over `--verbose`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn run_cli(cli: Cli) -> Result<()> {
    if let Command::Init { output, target } = &cli.command {
        return write_config_template(output, target);
    }

    let (config, config_path) = ForgeConfig::load(cli.config.as_deref())?;
    load_dotenv(config_path.as_deref());
    match &config_path {
        Some(path) => info!(config = %path.display(), "using configuration"),
        None => info!("no {CONFIG_FILE_NAME} found, using defaults"),
    }

    match cli.command {
        Command::Build {
            target,
            platform,
            sdk,
            arch,
            action,
            ndk,
            debug,
            clean,
        } => {
            let target = config.select_target(target.as_deref())?;
            let selection = MatrixSelection::resolve(
                platform.as_deref().or(config.project.default_platform.as_deref()),
                sdk.as_deref(),
                arch.as_deref(),
            )?;
            let action: BuildAction = action.parse()?;
            let settings = ToolchainSettings::from_env(ndk);
            selection.require_ndk(&settings)?;
            cmd_build(
                &config,
                target,
                &selection,
                action,
                BuildProfile::from_debug(debug),
                clean,
                settings,
            )
        }
        Command::Xcframework {
            target,
            platform,
            sdk,
            debug,
            sign,
        } => {
            let target = config.select_target(target.as_deref())?;
            let platform = parse_opt::<Platform>(
                platform.as_deref().or(config.project.default_platform.as_deref()),
            )?
            .unwrap_or(Platform::Darwin);
            if platform == Platform::Android {
                bail!("xcframework bundles Apple SDKs only; use `libforge jni` for android");
            }
            let sdks = select_sdks(Some(platform), parse_opt::<Sdk>(sdk.as_deref())?)?;
            cmd_xcframework(&config, target, platform, sdks, BuildProfile::from_debug(debug), sign)
        }
        Command::Jni {
            target,
            debug,
            ndk,
            strip,
        } => {
            let target = config.select_target(target.as_deref())?;
            let settings = ToolchainSettings::from_env(ndk);
            if strip && !settings.has_ndk() {
                bail!("--strip needs the NDK. Pass --ndk <version|path> or set ANDROID_NDK_PATH");
            }
            let output = JniPackager::new(&config.layout(), &SystemRunner, target.name.as_str())
                .profile(BuildProfile::from_debug(debug))
                .toolchain(settings)
                .strip(strip)
                .package()?;
            println!("JNI libraries written to {}", output.dir.display());
            for lib in &output.libraries {
                println!("  {}", lib.display());
            }
            Ok(())
        }
        Command::Deps { file, os, ndk } => cmd_deps(&file, &os, ToolchainSettings::from_env(ndk)),
        Command::RepoDir { target } => {
            let target = config.select_target(target.as_deref())?;
            println!("{}", target.source.repo_dir(&config.layout()).display());
            Ok(())
        }
        Command::Init { .. } => Ok(()),
    }
}

/// SDKs and cells selected by `--platform`, `--sdk` and `--arch`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MatrixSelection {
    sdks: Vec<Sdk>,
    cells: Vec<MatrixEntry>,
}

impl MatrixSelection {
    fn resolve(platform: Option<&str>, sdk: Option<&str>, arch: Option<&str>) -> Result<Self> {
        let sdks = select_sdks(parse_opt::<Platform>(platform)?, parse_opt::<Sdk>(sdk)?)?;
        let arch = parse_opt::<Arch>(arch)?;
        if let Some(arch) = arch
            && !sdks.iter().any(|s| s.supports(arch))
        {
            bail!(
                "arch {} is not supported by any selected SDK ({})",
                arch,
                sdks.iter().map(Sdk::as_str).collect::<Vec<_>>().join(", ")
            );
        }
        let cells = expand_matrix(&sdks, arch)?;
        Ok(Self { sdks, cells })
    }

    fn require_ndk(&self, settings: &ToolchainSettings) -> Result<()> {
        if self.sdks.contains(&Sdk::Android) && !settings.has_ndk() {
            bail!("NDK is not specified. Pass --ndk <version|path> or set ANDROID_NDK_PATH");
        }
        Ok(())
    }
}

fn parse_opt<T>(value: Option<&str>) -> Result<Option<T>>
where
    T: std::str::FromStr<Err = libforge_sdk::ForgeError>,
{
    Ok(value.map(str::parse).transpose()?)
}

fn cmd_build(
    config: &ForgeConfig,
    target: &TargetConfig,
    selection: &MatrixSelection,
    action: BuildAction,
    profile: BuildProfile,
    clean: bool,
    settings: ToolchainSettings,
) -> Result<()> {
    let layout = config.layout();
    let runner = SystemRunner;

    for cell in &selection.cells {
        info!(target = %target.name, sdk = %cell.sdk, arch = %cell.arch, action = action.as_str(), "building");
        let ctx = BuildContext::new(
            &layout,
            &runner,
            ContextOptions::new(cell.sdk, cell.arch, target.name.as_str())
                .profile(profile)
                .lib_type(target.lib_type)
                .clean(clean)
                .toolchain(settings.clone()),
        )?;

        let source_dir = fetch(&target.source, &layout, &runner)
            .with_context(|| format!("fetching sources of target '{}'", target.name))?;
        let build_dir = ctx.repo_build_dir(&target.source.name)?;

        let mut recipe = Recipe::new(target.driver, &source_dir, &build_dir).args(target.args.iter().cloned());
        for (key, value) in &target.env {
            recipe = recipe.env(key, value);
        }
        run_recipe(&ctx, &recipe, action)
            .with_context(|| format!("{} {} failed for {}/{}", target.driver, action.as_str(), cell.sdk, cell.arch))?;

        if matches!(action, BuildAction::Build | BuildAction::Make) {
            verify_outputs(&ctx, &target.verify)?;
        }
    }

    println!(
        "Built {} for {} cell(s) under {}",
        target.name,
        selection.cells.len(),
        layout.profile_dir(profile).display()
    );
    Ok(())
}

fn cmd_xcframework(
    config: &ForgeConfig,
    target: &TargetConfig,
    platform: Platform,
    sdks: Vec<Sdk>,
    profile: BuildProfile,
    sign: Option<String>,
) -> Result<()> {
    let layout = config.layout();
    let mut builder = XcframeworkBuilder::new(&layout, &SystemRunner, target.name.as_str())
        .sdks(sdks)
        .platform_label(platform.as_str())
        .profile(profile)
        .org(config.project.org.as_str())
        .sign_identity(sign);
    if !target.module_maps.is_empty() {
        builder = builder.module_maps(&target.module_maps);
    }
    for (lib, header) in &target.umbrella_headers {
        builder = builder.umbrella_header(lib, header.as_str());
    }

    let report = builder.build()?;
    for xc in &report.xcframeworks {
        println!("Created {}", xc.display());
    }
    if report.signed {
        println!("Signed {} xcframework(s)", report.xcframeworks.len());
    }
    Ok(())
}

fn cmd_deps(file: &Path, os: &str, settings: ToolchainSettings) -> Result<()> {
    if !file.is_file() {
        bail!("file does not exist: {}", file.display());
    }
    let runner = SystemRunner;
    let tool = match os {
        "darwin" | "macos" | "ios" => DependencyTool::Otool,
        "android" => {
            let toolchain = Toolchain::new(&runner, MatrixEntry::new(Sdk::Android, Arch::Arm64)?, settings);
            DependencyTool::Readelf(toolchain.llvm_tool(LlvmTool::Readelf)?)
        }
        other => bail!("unsupported os '{other}'. Supported values: darwin, android"),
    };
    for dep in list_dependencies(&runner, &tool, file)? {
        println!("{dep}");
    }
    Ok(())
}

fn write_config_template(path: &Path, target: &str) -> Result<()> {
    ensure_can_write(path)?;
    fs::write(path, ForgeConfig::generate_starter_toml(target))
        .with_context(|| format!("writing {:?}", path))?;
    println!("Wrote starter configuration to {}", path.display());
    Ok(())
}

fn load_dotenv(config_path: Option<&Path>) {
    let dir = config_path
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok());
    if let Some(dir) = dir {
        let _ = dotenvy::from_path(dir.join(".env"));
    }
}

fn ensure_can_write(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("refusing to overwrite existing file: {:?}", path);
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating parent directory {:?}", parent))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parses_build_flags() {
        let cli = Cli::try_parse_from([
            "libforge", "-v", "build", "--target", "ogg", "--platform", "ios", "--arch", "arm64",
            "--debug", "--clean",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::Build {
                target,
                platform,
                arch,
                action,
                debug,
                clean,
                ..
            } => {
                assert_eq!(target.as_deref(), Some("ogg"));
                assert_eq!(platform.as_deref(), Some("ios"));
                assert_eq!(arch.as_deref(), Some("arm64"));
                assert_eq!(action, "build");
                assert!(debug && clean);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_target_is_optional() {
        let cli = Cli::try_parse_from(["libforge", "xcframework", "--debug"]).unwrap();
        match cli.command {
            Command::Xcframework { target, debug, .. } => {
                assert_eq!(target, None);
                assert!(debug);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(Cli::try_parse_from(["libforge", "repo-dir", "--target", "ogg"]).is_ok());
        assert!(Cli::try_parse_from(["libforge", "repo-dir", "--target"]).is_err());
    }

    #[test]
    fn test_repo_dir_uses_default_target() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &config_path,
            "[project]\ndefault_target = \"ogg\"\n\
             [[targets]]\nname = \"ogg\"\n[targets.source]\nurl = \"u\"\ntag = \"v1.3.5\"\n",
        )
        .unwrap();
        let config_arg = config_path.display().to_string();

        let cli = Cli::try_parse_from(["libforge", "--config", config_arg.as_str(), "repo-dir"]).unwrap();
        run_cli(cli).unwrap();

        let cli = Cli::try_parse_from([
            "libforge", "--config", config_arg.as_str(), "repo-dir", "--target", "opus",
        ])
        .unwrap();
        let err = run_cli(cli).unwrap_err();
        assert!(err.to_string().contains("unknown target 'opus'"));
    }

    #[test]
    fn test_selection_expands_platform() {
        let selection = MatrixSelection::resolve(Some("darwin"), None, None).unwrap();
        assert_eq!(selection.sdks, vec![Sdk::MacOsx, Sdk::IphoneOs, Sdk::IphoneSimulator]);
        assert_eq!(selection.cells.len(), 4);
        assert_eq!(selection.cells[1], MatrixEntry { sdk: Sdk::MacOsx, arch: Arch::X86_64 });
    }

    #[test]
    fn test_selection_filters_by_arch_with_single_sdk() {
        let selection = MatrixSelection::resolve(None, Some("android"), Some("x86_64")).unwrap();
        assert_eq!(
            selection.cells,
            vec![MatrixEntry { sdk: Sdk::Android, arch: Arch::X86_64 }]
        );
    }

    #[test]
    fn test_selection_validation_errors() {
        let err = MatrixSelection::resolve(Some("windows"), None, None).unwrap_err();
        assert!(err.to_string().contains("unsupported platform 'windows'"));

        let err = MatrixSelection::resolve(Some("ios"), Some("macosx"), None).unwrap_err();
        assert!(err.to_string().contains("not part of platform ios"));

        let err = MatrixSelection::resolve(Some("ios"), None, Some("x86_64")).unwrap_err();
        assert!(err.to_string().contains("not supported by any selected SDK"));

        let err = MatrixSelection::resolve(None, None, None).unwrap_err();
        assert!(err.to_string().contains("--platform or --sdk"));
    }

    #[test]
    fn test_android_requires_ndk() {
        let selection = MatrixSelection::resolve(Some("android"), None, None).unwrap();
        let err = selection
            .require_ndk(&ToolchainSettings::default())
            .unwrap_err();
        assert!(err.to_string().contains("NDK is not specified"));
        assert!(
            selection
                .require_ndk(&ToolchainSettings {
                    ndk: Some("26.1.10909125".into()),
                    ..Default::default()
                })
                .is_ok()
        );

        let apple = MatrixSelection::resolve(Some("macos"), None, None).unwrap();
        assert!(apple.require_ndk(&ToolchainSettings::default()).is_ok());
    }

    #[test]
    fn test_write_config_template_refuses_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join(CONFIG_FILE_NAME);

        write_config_template(&path, "opus").unwrap();
        let written = ForgeConfig::load_from_file(&path).unwrap();
        assert_eq!(written.target("opus").unwrap().source.name, "opus");

        let err = write_config_template(&path, "opus").unwrap_err();
        assert!(err.to_string().contains("refusing to overwrite"));
    }

    #[test]
    fn test_deps_rejects_missing_file_and_unknown_os() {
        let err = cmd_deps(Path::new("/no/such/lib.dylib"), "darwin", ToolchainSettings::default())
            .unwrap_err();
        assert!(err.to_string().contains("file does not exist"));

        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("libogg.dylib");
        fs::write(&file, "").unwrap();
        let err = cmd_deps(&file, "windows", ToolchainSettings::default()).unwrap_err();
        assert!(err.to_string().contains("unsupported os 'windows'"));
    }
}
