//! Configuration file support for libforge.
//!
//! This module loads `libforge.toml`, which declares the project directories
//! and every buildable target with its source repository and build recipe.
//!
//! ## Configuration File Location
//!
//! The configuration file is searched for in the following order:
//! 1. The path given with `--config`
//! 2. Current working directory (`./libforge.toml`)
//! 3. Parent directories (up to the repository root or filesystem root)
//!
//! Relative `build_dir` and `repo_dir` values resolve against the directory
//! holding the configuration file.
//!
//! ## Example Configuration
//!
//! ```toml
//! [project]
//! org = "org.xiph"
//! build_dir = "build"
//! repo_dir = "repo"
//! default_platform = "ios"
//!
//! [[targets]]
//! name = "ogg"
//! driver = "cmake"
//! lib_type = "dylib"
//! args = ["-DINSTALL_DOCS=OFF"]
//! verify = ["libogg.dylib"]
//!
//! [targets.source]
//! url = "https://github.com/xiph/ogg.git"
//! tag = "v1.3.5"
//! ```

use anyhow::{Context, Result, bail};
use libforge_sdk::{BuildLayout, DriverKind, LibType, SourceRepo};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// The default configuration file name.
pub const CONFIG_FILE_NAME: &str = "libforge.toml";

/// Root configuration structure for `libforge.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// Project-level configuration.
    pub project: ProjectConfig,

    /// Buildable targets, looked up by name.
    pub targets: Vec<TargetConfig>,
}

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Bundle identifier prefix for generated frameworks.
    ///
    /// Defaults to "com.example".
    pub org: String,

    /// Root of all build output.
    ///
    /// Defaults to `build`.
    pub build_dir: PathBuf,

    /// Root of downloaded sources.
    ///
    /// Defaults to `repo`.
    pub repo_dir: PathBuf,

    /// Platform used when `--platform` and `--sdk` are both absent.
    pub default_platform: Option<String>,

    /// Target used when a command is run without `--target`.
    pub default_target: Option<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            org: libforge_sdk::builders::xcframework::DEFAULT_ORG.to_string(),
            build_dir: PathBuf::from("build"),
            repo_dir: PathBuf::from("repo"),
            default_platform: None,
            default_target: None,
        }
    }
}

/// One buildable library.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub name: String,

    /// Build system driving the sources. Defaults to `cmake`.
    pub driver: DriverKind,

    /// Static archives or shared libraries. Defaults to `static`.
    pub lib_type: LibType,

    /// Extra arguments for the configure/generate step.
    pub args: Vec<String>,

    /// Extra environment variables for every driver step.
    pub env: BTreeMap<String, String>,

    /// Libraries that receive a module map when bundled.
    ///
    /// Empty means the target's own library (`lib<name>`).
    pub module_maps: Vec<String>,

    /// Umbrella header per library, overriding `<lib>.h`.
    pub umbrella_headers: BTreeMap<String, String>,

    /// Library files in `dist/lib` whose architecture and minimum OS are
    /// checked after a build.
    pub verify: Vec<String>,

    pub source: SourceRepo,
}

impl ForgeConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from the specified file path and resolves its
    /// relative directories against the file's directory.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: ForgeConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_dirs(base);
        config.normalize()?;
        Ok(config)
    }

    /// Searches for `libforge.toml` from the current directory upward.
    pub fn discover() -> Result<Option<(Self, PathBuf)>> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&cwd)
    }

    /// Attempts to find and load configuration starting from `start_dir`.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((config, path)))` - Found and loaded configuration with its path
    /// * `Ok(None)` - No configuration file found
    /// * `Err` - If a config file was found but couldn't be parsed
    pub fn discover_from(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                let config = Self::load_from_file(&config_path)?;
                return Ok(Some((config, config_path)));
            }

            // Stop at repository root or filesystem root
            if current.join(".git").exists() || !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Loads `explicit` when given, otherwise discovers a configuration.
    ///
    /// Without any file, defaults are used with directories relative to the
    /// current directory.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load_from_file(path)?, Some(path.to_path_buf())));
        }
        if let Some((config, path)) = Self::discover()? {
            return Ok((config, Some(path)));
        }
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        let mut config = Self::default();
        config.resolve_dirs(&cwd);
        Ok((config, None))
    }

    fn resolve_dirs(&mut self, base: &Path) {
        for dir in [&mut self.project.build_dir, &mut self.project.repo_dir] {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }

    /// Fills source names from target names and rejects duplicate targets.
    fn normalize(&mut self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for target in &mut self.targets {
            if target.name.trim().is_empty() {
                bail!("every [[targets]] entry needs a name");
            }
            if !seen.insert(target.name.clone()) {
                bail!("duplicate target '{}' in configuration", target.name);
            }
            if target.source.name.is_empty() {
                target.source.name = target.name.clone();
            }
        }
        Ok(())
    }

    /// Looks up a target by name.
    pub fn target(&self, name: &str) -> Result<&TargetConfig> {
        self.targets.iter().find(|t| t.name == name).with_context(|| {
            let known: Vec<_> = self.targets.iter().map(|t| t.name.as_str()).collect();
            format!(
                "unknown target '{}'. Configured targets: [{}]",
                name,
                known.join(", ")
            )
        })
    }

    /// Resolves `--target`, falling back to `project.default_target`.
    pub fn select_target(&self, name: Option<&str>) -> Result<&TargetConfig> {
        match name.or(self.project.default_target.as_deref()) {
            Some(name) => self.target(name),
            None => bail!(
                "no target selected.\n\n\
                 Pass --target <name> or set default_target under [project] in {CONFIG_FILE_NAME}"
            ),
        }
    }

    /// Output and source roots as a [`BuildLayout`].
    pub fn layout(&self) -> BuildLayout {
        BuildLayout::new(&self.project.build_dir, &self.project.repo_dir)
    }

    /// Generates a starter configuration file as a formatted TOML string.
    ///
    /// This includes helpful comments explaining each configuration option.
    pub fn generate_starter_toml(target: &str) -> String {
        format!(
            r#"# libforge configuration file
# CLI flags override these settings when provided.

[project]
# Bundle identifier prefix for generated frameworks
org = "com.example"

# Build output and source checkout roots, relative to this file
build_dir = "build"
repo_dir = "repo"

# Platform used when neither --platform nor --sdk is given
# (macos, ios, darwin or android)
# default_platform = "darwin"

# Target used when a command is run without --target
default_target = "{target}"

[[targets]]
name = "{target}"

# Build system: cmake, autoconf or make
driver = "cmake"

# static or dylib (bundling needs dylib)
lib_type = "dylib"

# Extra configure arguments
args = []

# Libraries that get a module map when bundled (default: lib{target})
# module_maps = ["lib{target}"]

# Umbrella header overrides
# [targets.umbrella_headers]
# lib{target} = "{target}/{target}.h"

# Files in dist/lib checked for architecture and minimum OS after a build
# verify = ["lib{target}.dylib"]

[targets.source]
url = "https://example.com/{target}.git"
# tag = "v1.0.0"
# commit = "0123456789abcdef"
# branch = "main"
# archive = "{target}-1.0.0"
"#,
            target = target,
        )
    }
}
