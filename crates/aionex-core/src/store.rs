//! Remote file store contract
//!
//! A store lists repository entries and reads/writes one file at a time.
//! Every read returns an opaque [`VersionToken`]; a write must quote the
//! token it is based on and fails with [`Error::Conflict`] when the remote
//! has moved on.

use crate::error::{Error, Result};
use crate::tree::TreeEntry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Opaque identifier of the exact remote content state (a blob sha on GitHub).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content of a single remote file at a specific version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlob {
    pub content: String,
    pub version: VersionToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCapabilities {
    pub writable: bool,
}

impl StoreCapabilities {
    pub const READ_WRITE: Self = Self { writable: true };
    pub const READ_ONLY: Self = Self { writable: false };
}

/// A write based on a previously read version.
#[derive(Debug, Clone, Copy)]
pub struct WriteRequest<'a> {
    pub path: &'a str,
    pub content: &'a str,
    pub expected_version: &'a VersionToken,
    pub message: &'a str,
}

pub trait RemoteFileStore: Send + Sync {
    /// Human-readable name of the backend, e.g. `owner/repo`.
    fn label(&self) -> String;

    fn capabilities(&self) -> StoreCapabilities;

    fn list_entries(&self) -> StoreFuture<'_, Vec<TreeEntry>>;

    fn read_file<'a>(&'a self, path: &'a str) -> StoreFuture<'a, FileBlob>;

    /// Returns the new version token on success.
    fn write_file<'a>(&'a self, request: WriteRequest<'a>) -> StoreFuture<'a, VersionToken>;
}

/// Rejection used by read-only backends.
pub fn read_only_rejection<'a>(label: String) -> StoreFuture<'a, VersionToken> {
    Box::pin(async move { Err(Error::ReadOnly(label)) })
}
