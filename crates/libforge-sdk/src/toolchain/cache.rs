//! Per-context memoization of resolved toolchain paths.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;

use tracing::debug;

use super::ToolKind;
use crate::matrix::{Arch, Sdk};
use crate::types::ForgeError;

/// Structured cache key. Two different resolutions can never share an entry
/// because every component is a value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToolchainKey {
    pub sdk: Sdk,
    pub arch: Arch,
    pub kind: ToolKind,
}

/// Lazily filled map from [`ToolchainKey`] to a resolved path.
///
/// Owned by exactly one context; interior mutability lets resolvers that
/// depend on other cached values (an NDK binary needs the NDK root) recurse
/// through `&self`.
#[derive(Debug, Default)]
pub struct ToolchainCache {
    entries: RefCell<HashMap<ToolchainKey, PathBuf>>,
}

impl ToolchainCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value for `key`, or runs `resolve` once and stores
    /// its result. Failed resolutions are not cached; they abort the run.
    pub fn get_or_resolve<F>(&self, key: ToolchainKey, resolve: F) -> Result<PathBuf, ForgeError>
    where
        F: FnOnce() -> Result<PathBuf, ForgeError>,
    {
        if let Some(hit) = self.entries.borrow().get(&key) {
            return Ok(hit.clone());
        }
        let value = resolve()?;
        debug!(sdk = %key.sdk, arch = %key.arch, kind = ?key.kind, path = %value.display(), "resolved toolchain path");
        self.entries.borrow_mut().insert(key, value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}
