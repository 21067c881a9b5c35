//! Xcode toolchain queries for the desktop and mobile-device SDKs.

use std::path::PathBuf;

use crate::matrix::Sdk;
use crate::runner::{CommandRunner, Invocation};
use crate::types::ForgeError;

use super::{must_be_dir, must_be_file};

/// `xcrun --sdk <sdk> --show-sdk-path`, which must name an existing directory.
pub fn sdk_root(runner: &dyn CommandRunner, sdk: Sdk) -> Result<PathBuf, ForgeError> {
    let out = runner.run_trimmed(
        &Invocation::new("xcrun")
            .arg("--sdk")
            .arg(sdk.as_str())
            .arg("--show-sdk-path"),
    )?;
    if out.is_empty() {
        return Err(ForgeError::Toolchain(format!(
            "xcrun returned an empty SDK path for {sdk}.\n\n\
             Install the SDK with Xcode and select it with `xcode-select -s`."
        )));
    }
    must_be_dir("SDK root", PathBuf::from(out))
}

/// `xcodebuild -find <tool>`, which must name an existing file.
pub fn find_tool(runner: &dyn CommandRunner, tool: &str) -> Result<PathBuf, ForgeError> {
    let out = runner.run_trimmed(&Invocation::new("xcodebuild").arg("-find").arg(tool))?;
    if out.is_empty() {
        return Err(ForgeError::Toolchain(format!(
            "xcodebuild could not locate '{tool}' in the active developer directory"
        )));
    }
    must_be_file("Xcode tool", PathBuf::from(out))
}
