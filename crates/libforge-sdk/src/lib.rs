//! Native library build orchestration for Apple and Android SDKs.
//!
//! `libforge-sdk` cross-compiles third-party C/C++ libraries over a matrix of
//! SDKs and architectures, then packages the results as Apple
//! `.xcframework` bundles or Android JNI trees.
//!
//! # Architecture
//!
//! - **Matrix** ([`matrix`]): platforms, SDKs, archs and the cells a build visits
//! - **Layout** ([`layout`]): every output path as a pure function of the cell
//! - **Toolchain** ([`toolchain`]): per-cell compiler, SDK root and NDK
//!   resolution, memoized per context
//! - **Context** ([`context`]): one matrix cell with its directories and flags
//! - **Drivers** ([`drivers`]): CMake, autoconf and make invocations
//! - **Source** ([`source`]): archive download or git checkout of a target
//! - **Builders** ([`builders`]): framework/xcframework and JNI packaging
//! - **Inspect** ([`inspect`]): architecture, minimum OS and dependency checks
//!
//! Every host tool goes through a [`CommandRunner`], so the whole pipeline can
//! be driven by a scripted runner in tests.
//!
//! # Example
//!
//! ```ignore
//! use libforge_sdk::{
//!     BuildAction, BuildContext, BuildLayout, ContextOptions, DriverKind, LibType, Recipe,
//!     SourceRepo, SystemRunner, expand_matrix, fetch, run_recipe,
//! };
//!
//! let layout = BuildLayout::new("build", "repo");
//! let runner = SystemRunner;
//! let repo = SourceRepo::new("ogg", "https://github.com/xiph/ogg.git");
//! let source = fetch(&repo, &layout, &runner)?;
//!
//! for cell in expand_matrix(libforge_sdk::Platform::Ios.sdks(), None)? {
//!     let ctx = BuildContext::new(
//!         &layout,
//!         &runner,
//!         ContextOptions::new(cell.sdk, cell.arch, "ogg").lib_type(LibType::Dylib),
//!     )?;
//!     let recipe = Recipe::new(DriverKind::Cmake, &source, ctx.repo_build_dir("ogg")?);
//!     run_recipe(&ctx, &recipe, BuildAction::Build)?;
//! }
//! # Ok::<(), libforge_sdk::ForgeError>(())
//! ```

pub mod builders;
pub mod context;
pub mod drivers;
pub mod inspect;
pub mod layout;
pub mod matrix;
pub mod runner;
pub mod source;
pub mod toolchain;
pub mod types;

pub use context::{BuildContext, ContextOptions, FlagOptions, lib_name_for};
pub use drivers::{DriverKind, Recipe, Step, run_recipe};
pub use inspect::{DependencyTool, list_dependencies, verify_outputs};
pub use layout::BuildLayout;
pub use matrix::{Arch, MatrixEntry, Platform, Sdk, expand_matrix, select_sdks};
pub use runner::{CommandRunner, Invocation, SystemRunner};
pub use source::{SourceRepo, fetch};
pub use toolchain::{SdkProfile, Toolchain, ToolchainSettings};
pub use types::{BuildAction, BuildProfile, ForgeError, LibType};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_public_reexports_resolve() {
        assert_eq!(lib_name_for("ogg"), "libogg");
        assert_eq!(Platform::Ios.sdks(), &[Sdk::IphoneOs, Sdk::IphoneSimulator]);
    }
}
