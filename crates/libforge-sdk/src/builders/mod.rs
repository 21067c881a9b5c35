//! Packaging of built libraries.
//!
//! ## Overview
//!
//! Once the matrix loop has filled each cell's `dist/` tree, the builders turn
//! those outputs into something an app can consume:
//!
//! | Builder | SDKs | Output |
//! |---------|------|--------|
//! | [`XcframeworkBuilder`] | macosx, iphoneos, iphonesimulator | One `.xcframework` per library, plus `bundle-report.json` |
//! | [`JniPackager`] | android | `jniLibs/<abi>/*.so` and `include/` |
//!
//! ## Apple pipeline
//!
//! 1. **Discovery** - dylibs in the first SDK/arch dist tree, checked against
//!    every other SDK/arch
//! 2. **Relocation** - install ids and in-tree dependencies rewritten to
//!    `@rpath/<lib>.framework/<lib>` (see [`rewrite`])
//! 3. **Merge** - `lipo -create` over each SDK's archs
//! 4. **Bundle** - `Info.plist`, headers, module map and, on macOS, the
//!    versioned symlinks (see [`framework`])
//! 5. **Aggregate and sign** - `xcodebuild -create-xcframework`, then
//!    `codesign` for release builds
//!
//! ## Example
//!
//! ```ignore
//! use libforge_sdk::builders::{JniPackager, XcframeworkBuilder};
//! use libforge_sdk::{BuildLayout, BuildProfile, SystemRunner};
//!
//! let layout = BuildLayout::new("build", "repo");
//!
//! XcframeworkBuilder::new(&layout, &SystemRunner, "ogg")
//!     .profile(BuildProfile::Debug)
//!     .build()?;
//!
//! JniPackager::new(&layout, &SystemRunner, "ogg")
//!     .profile(BuildProfile::Debug)
//!     .package()?;
//! # Ok::<(), libforge_sdk::ForgeError>(())
//! ```

pub mod common;
pub mod framework;
pub mod jni;
pub mod rewrite;
pub mod xcframework;

pub use common::DylibInfo;
pub use framework::{BundleLayout, FrameworkPaths};
pub use jni::{JniOutput, JniPackager};
pub use xcframework::{BundleReport, FrameworkInfo, XcframeworkBuilder};
