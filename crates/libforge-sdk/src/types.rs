//! Core types for libforge-sdk.
//!
//! This module defines the fundamental types used throughout the SDK:
//!
//! - [`ForgeError`] - Error types for matrix validation, toolchain resolution,
//!   process execution and bundle assembly
//! - [`BuildProfile`] - Debug or release output tree
//! - [`BuildAction`] - Which driver steps a build invocation runs
//! - [`LibType`] - Static or shared library output

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error types for libforge-sdk operations.
///
/// Every variant is fatal: the orchestrator never retries and never downgrades
/// a failure to a warning.
///
/// # Example
///
/// ```ignore
/// use libforge_sdk::{BuildContext, ForgeError};
///
/// match BuildContext::new(&layout, &runner, options) {
///     Ok(ctx) => println!("dist dir: {}", ctx.dist_dir().display()),
///     Err(ForgeError::Config(msg)) => eprintln!("bad matrix cell: {msg}"),
///     Err(e) => eprintln!("other error: {e}"),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    /// Invalid or missing configuration.
    ///
    /// Covers unsupported SDK/architecture/action values, SDKs outside the
    /// selected platform, and missing required inputs such as the NDK.
    #[error("configuration error: {0}")]
    Config(String),

    /// The host toolchain could not be resolved for the current SDK.
    #[error("toolchain error: {0}")]
    Toolchain(String),

    /// A path that toolchain resolution or bundle assembly depends on is absent.
    ///
    /// This signals a broken host environment rather than a transient
    /// condition, so it is never retried.
    #[error("{kind} does not exist: {path}")]
    MissingPath {
        /// What the path was expected to be (e.g. "NDK directory").
        kind: &'static str,
        /// The path that was checked.
        path: PathBuf,
    },

    /// An external tool could not be started at all.
    #[error("failed to start {description}: {source}\n\nEnsure the tool is installed and available on PATH.")]
    Spawn {
        /// Human-readable description of the command.
        description: String,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// An external tool exited with a nonzero status.
    #[error("{description} failed.\n\nExit status: {status}\n\nStdout:\n{stdout}\n\nStderr:\n{stderr}")]
    Command {
        /// Human-readable description of the command.
        description: String,
        /// Exit status as reported by the OS.
        status: String,
        /// Captured stdout (empty for streamed commands).
        stdout: String,
        /// Captured stderr (empty for streamed commands).
        stderr: String,
    },

    /// A bundle assembly invariant was violated.
    ///
    /// Examples: no module interface in an SDK pass, zero bundles for a
    /// library, a release build without a signing identity.
    #[error("bundle error: {0}")]
    Bundle(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}. Check file paths and permissions")]
    Io(#[from] std::io::Error),

    /// JSON serialization failed while writing a report.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Build profile selecting the `debug` or `release` output tree.
///
/// # Example
///
/// ```
/// use libforge_sdk::BuildProfile;
///
/// assert_eq!(BuildProfile::from_debug(true).as_str(), "debug");
/// assert_eq!(BuildProfile::Release.cmake_build_type(), "Release");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildProfile {
    /// Debug build with `-g` and the `Debug` CMake configuration.
    Debug,
    /// Optimized build; aggregates must be signed.
    Release,
}

impl BuildProfile {
    /// Maps the CLI `--debug` flag to a profile.
    pub fn from_debug(debug: bool) -> Self {
        if debug {
            BuildProfile::Debug
        } else {
            BuildProfile::Release
        }
    }

    /// Returns the directory name of the profile.
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildProfile::Debug => "debug",
            BuildProfile::Release => "release",
        }
    }

    /// Value passed as `CMAKE_BUILD_TYPE` and `--config`.
    pub fn cmake_build_type(&self) -> &'static str {
        match self {
            BuildProfile::Debug => "Debug",
            BuildProfile::Release => "Release",
        }
    }

    pub fn is_debug(&self) -> bool {
        matches!(self, BuildProfile::Debug)
    }
}

/// Which steps of a multi-step build a single invocation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildAction {
    /// Generate the build system only (`cmake` / `./configure`).
    Configure,
    /// Clean previous build products of the driver.
    Clean,
    /// Generate, build and install.
    #[default]
    Build,
    /// Build and install, reusing a previously generated build system.
    Make,
}

impl BuildAction {
    pub const ALL: [BuildAction; 4] = [
        BuildAction::Configure,
        BuildAction::Clean,
        BuildAction::Build,
        BuildAction::Make,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildAction::Configure => "configure",
            BuildAction::Clean => "clean",
            BuildAction::Build => "build",
            BuildAction::Make => "make",
        }
    }
}

impl fmt::Display for BuildAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildAction {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BuildAction::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| {
                ForgeError::Config(format!(
                    "unsupported action '{}'. Supported actions: {}",
                    s,
                    join_names(BuildAction::ALL.iter().map(|a| a.as_str()))
                ))
            })
    }
}

/// Library output kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibType {
    /// Static archives (`.a`).
    #[default]
    Static,
    /// Shared libraries (`.dylib` / `.so`).
    Dylib,
}

impl LibType {
    pub fn is_shared(&self) -> bool {
        matches!(self, LibType::Dylib)
    }
}

/// Joins display names with `", "` for "valid alternatives" messages.
pub(crate) fn join_names<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names.into_iter().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_from_debug_flag() {
        assert_eq!(BuildProfile::from_debug(true), BuildProfile::Debug);
        assert_eq!(BuildProfile::from_debug(false), BuildProfile::Release);
        assert_eq!(BuildProfile::Release.as_str(), "release");
    }

    #[test]
    fn test_action_parse_lists_alternatives() {
        assert_eq!("make".parse::<BuildAction>().unwrap(), BuildAction::Make);
        let err = "deploy".parse::<BuildAction>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unsupported action 'deploy'"));
        assert!(msg.contains("configure, clean, build, make"));
    }

    #[test]
    fn test_command_error_includes_output() {
        let err = ForgeError::Command {
            description: "lipo -create".to_string(),
            status: "exit status: 1".to_string(),
            stdout: String::new(),
            stderr: "fatal error: no such file".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("lipo -create failed"));
        assert!(msg.contains("no such file"));
    }
}
