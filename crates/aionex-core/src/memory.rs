//! In-memory remote store
//!
//! Backs the demo mode (read-only) and the test suites (writable). Versions
//! are issued from a per-store counter: `v1`, `v2`, ...

use crate::error::{Error, Result};
use crate::store::{
    read_only_rejection, FileBlob, RemoteFileStore, StoreCapabilities, StoreFuture,
    VersionToken, WriteRequest,
};
use crate::tree::TreeEntry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct StoredFile {
    content: String,
    version: VersionToken,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<String, StoredFile>,
    directories: BTreeSet<String>,
    next_version: u64,
    writes: usize,
}

impl MemoryState {
    fn issue_version(&mut self) -> VersionToken {
        self.next_version += 1;
        VersionToken::new(format!("v{}", self.next_version))
    }
}

#[derive(Debug)]
pub struct MemoryStore {
    label: String,
    writable: bool,
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            writable: true,
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn read_only(label: impl Into<String>) -> Self {
        Self {
            writable: false,
            ..Self::new(label)
        }
    }

    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.insert_file(path, content);
        self
    }

    pub fn with_directory(self, path: &str) -> Self {
        self.lock().directories.insert(path.to_string());
        self
    }

    /// Create or overwrite a file, bypassing the version check.
    pub fn insert_file(&self, path: &str, content: &str) -> VersionToken {
        let mut state = self.lock();
        let version = state.issue_version();
        state.files.insert(
            path.to_string(),
            StoredFile {
                content: content.to_string(),
                version: version.clone(),
            },
        );
        version
    }

    /// Simulate another client changing the file remotely.
    pub fn set_remote_content(&self, path: &str, content: &str) -> VersionToken {
        self.insert_file(path, content)
    }

    /// Simulate another client deleting the file remotely.
    pub fn remove_file(&self, path: &str) -> bool {
        self.lock().files.remove(path).is_some()
    }

    pub fn content(&self, path: &str) -> Option<String> {
        self.lock().files.get(path).map(|f| f.content.clone())
    }

    pub fn version(&self, path: &str) -> Option<VersionToken> {
        self.lock().files.get(path).map(|f| f.version.clone())
    }

    /// Number of accepted writes.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self, request: WriteRequest<'_>) -> Result<VersionToken> {
        let mut state = self.lock();
        let current = state
            .files
            .get(request.path)
            .map(|f| f.version.clone())
            .ok_or_else(|| Error::NotFound(request.path.to_string()))?;

        if &current != request.expected_version {
            return Err(Error::Conflict {
                path: request.path.to_string(),
                expected: request.expected_version.to_string(),
            });
        }

        let version = state.issue_version();
        state.files.insert(
            request.path.to_string(),
            StoredFile {
                content: request.content.to_string(),
                version: version.clone(),
            },
        );
        state.writes += 1;
        Ok(version)
    }
}

impl RemoteFileStore for MemoryStore {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn capabilities(&self) -> StoreCapabilities {
        if self.writable {
            StoreCapabilities::READ_WRITE
        } else {
            StoreCapabilities::READ_ONLY
        }
    }

    fn list_entries(&self) -> StoreFuture<'_, Vec<TreeEntry>> {
        let entries: Vec<TreeEntry> = {
            let state = self.lock();
            state
                .directories
                .iter()
                .map(TreeEntry::directory)
                .chain(state.files.keys().map(TreeEntry::file))
                .collect()
        };
        Box::pin(async move { Ok(entries) })
    }

    fn read_file<'a>(&'a self, path: &'a str) -> StoreFuture<'a, FileBlob> {
        let result = self
            .lock()
            .files
            .get(path)
            .map(|f| FileBlob {
                content: f.content.clone(),
                version: f.version.clone(),
            })
            .ok_or_else(|| Error::NotFound(path.to_string()));
        Box::pin(async move { result })
    }

    fn write_file<'a>(&'a self, request: WriteRequest<'a>) -> StoreFuture<'a, VersionToken> {
        if !self.writable {
            return read_only_rejection(self.label.clone());
        }
        let result = self.write(request);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_with_current_version_issues_new_token() {
        let store = MemoryStore::new("mem").with_file("a.txt", "one");
        let v1 = store.version("a.txt").unwrap();

        let v2 = store
            .write_file(WriteRequest {
                path: "a.txt",
                content: "two",
                expected_version: &v1,
                message: "update",
            })
            .await
            .unwrap();

        assert_ne!(v1, v2);
        assert_eq!(store.content("a.txt").as_deref(), Some("two"));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_write_is_a_conflict() {
        let store = MemoryStore::new("mem").with_file("a.txt", "one");
        let v1 = store.version("a.txt").unwrap();
        store.set_remote_content("a.txt", "theirs");

        let err = store
            .write_file(WriteRequest {
                path: "a.txt",
                content: "mine",
                expected_version: &v1,
                message: "update",
            })
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(store.content("a.txt").as_deref(), Some("theirs"));
    }

    #[tokio::test]
    async fn test_read_only_store_rejects_writes() {
        let store = MemoryStore::read_only("demo").with_file("a.txt", "one");
        let v1 = store.version("a.txt").unwrap();
        let err = store
            .write_file(WriteRequest {
                path: "a.txt",
                content: "two",
                expected_version: &v1,
                message: "update",
            })
            .await
            .unwrap_err();
        assert_eq!(err, Error::ReadOnly("demo".to_string()));
        assert!(!store.capabilities().writable);
    }

    #[tokio::test]
    async fn test_listing_includes_explicit_directories() {
        let store = MemoryStore::new("mem")
            .with_directory("empty")
            .with_file("src/lib.rs", "");
        let entries = store.list_entries().await.unwrap();
        assert!(entries.contains(&TreeEntry::directory("empty")));
        assert!(entries.contains(&TreeEntry::file("src/lib.rs")));
        assert_eq!(
            store.read_file("missing").await.unwrap_err(),
            Error::NotFound("missing".to_string())
        );
    }
}
