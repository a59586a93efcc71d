//! Active file ownership and the commit protocol
//!
//! `FileStateManager` is the only owner of the active file and its edit
//! buffer. Everything else sees snapshots.
//!
//! ```text
//! NoFile -> Loading -> Loaded(clean) <-> Loaded(dirty) -> Committing -> Loaded(clean)
//! ```
//!
//! Overlapping selections are resolved by request number: a load result is
//! applied only if no newer selection was issued while it was in flight.

use crate::error::{Error, Result};
use crate::store::{RemoteFileStore, StoreCapabilities, VersionToken, WriteRequest};
use std::sync::{Arc, Mutex, MutexGuard};

/// The file as last loaded from or committed to the remote. Its content
/// lives in the edit buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ActiveFile {
    path: String,
    version: VersionToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    NoFile,
    Loading { path: String },
    Loaded { path: String, dirty: bool },
    Committing { path: String },
}

/// Read-only copy of the active file with the current buffer contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    pub path: String,
    pub content: String,
    pub version: VersionToken,
    pub dirty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    /// The file is now active.
    Loaded,
    /// A newer selection was issued while this one was in flight; its result
    /// was discarded.
    Superseded,
}

#[derive(Debug, Default)]
struct EditBuffer {
    content: String,
    dirty: bool,
}

#[derive(Debug)]
struct PendingLoad {
    request: u64,
    path: String,
}

#[derive(Debug, Default)]
struct Inner {
    active: Option<ActiveFile>,
    buffer: EditBuffer,
    pending: Option<PendingLoad>,
    committing: bool,
    last_request: u64,
}

pub struct FileStateManager {
    store: Arc<dyn RemoteFileStore>,
    inner: Mutex<Inner>,
}

/// Clears the pending marker if the load future is dropped before finishing.
struct PendingLoadGuard<'a> {
    manager: &'a FileStateManager,
    request: u64,
}

impl Drop for PendingLoadGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.manager.lock();
        if inner
            .pending
            .as_ref()
            .is_some_and(|p| p.request == self.request)
        {
            inner.pending = None;
        }
    }
}

/// Leaves the committing state however the commit future ends.
struct CommitGuard<'a> {
    manager: &'a FileStateManager,
}

impl Drop for CommitGuard<'_> {
    fn drop(&mut self) {
        self.manager.lock().committing = false;
    }
}

impl FileStateManager {
    pub fn new(store: Arc<dyn RemoteFileStore>) -> Self {
        Self {
            store,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn capabilities(&self) -> StoreCapabilities {
        self.store.capabilities()
    }

    pub fn status(&self) -> FileStatus {
        let inner = self.lock();
        if inner.committing {
            if let Some(active) = &inner.active {
                return FileStatus::Committing {
                    path: active.path.clone(),
                };
            }
        }
        if let Some(pending) = &inner.pending {
            return FileStatus::Loading {
                path: pending.path.clone(),
            };
        }
        match &inner.active {
            Some(active) => FileStatus::Loaded {
                path: active.path.clone(),
                dirty: inner.buffer.dirty,
            },
            None => FileStatus::NoFile,
        }
    }

    pub fn snapshot(&self) -> Option<FileSnapshot> {
        let inner = self.lock();
        inner.active.as_ref().map(|active| FileSnapshot {
            path: active.path.clone(),
            content: inner.buffer.content.clone(),
            version: active.version.clone(),
            dirty: inner.buffer.dirty,
        })
    }

    /// Load `path` and make it the active file.
    ///
    /// Unsaved edits to the previous file are discarded once the new file
    /// arrives. If the load fails, the previous file (if any) stays active.
    pub async fn select_file(&self, path: &str) -> Result<SelectOutcome> {
        let request = {
            let mut inner = self.lock();
            if inner.committing {
                return Err(Error::invalid_state(
                    "Cannot switch files while a commit is in progress",
                ));
            }
            inner.last_request += 1;
            let request = inner.last_request;
            inner.pending = Some(PendingLoad {
                request,
                path: path.to_string(),
            });
            request
        };
        let _pending = PendingLoadGuard {
            manager: self,
            request,
        };

        tracing::debug!("Loading {} (request {})", path, request);
        let result = self.store.read_file(path).await;

        let mut inner = self.lock();
        let is_current = inner
            .pending
            .as_ref()
            .is_some_and(|p| p.request == request);
        if !is_current {
            match &result {
                Ok(_) => tracing::debug!("Discarding stale load of {}", path),
                Err(err) => tracing::debug!("Discarding stale load failure for {}: {}", path, err),
            }
            return Ok(SelectOutcome::Superseded);
        }
        inner.pending = None;

        match result {
            Ok(blob) => {
                if let Some(previous) = &inner.active {
                    if inner.buffer.dirty {
                        tracing::info!("Discarding unsaved edits to {}", previous.path);
                    }
                }
                inner.buffer = EditBuffer {
                    content: blob.content,
                    dirty: false,
                };
                inner.active = Some(ActiveFile {
                    path: path.to_string(),
                    version: blob.version,
                });
                tracing::info!("Loaded {}", path);
                Ok(SelectOutcome::Loaded)
            }
            Err(err) => {
                tracing::warn!("Failed to load {}: {}", path, err);
                Err(err)
            }
        }
    }

    /// Replace the buffer contents and mark it dirty.
    pub fn edit(&self, content: impl Into<String>) -> Result<()> {
        let mut inner = self.lock();
        if inner.committing {
            return Err(Error::invalid_state(
                "Edits are not accepted while a commit is in progress",
            ));
        }
        if inner.pending.is_some() {
            return Err(Error::invalid_state("A file is still loading"));
        }
        if inner.active.is_none() {
            return Err(Error::invalid_state("No file is open"));
        }
        inner.buffer.content = content.into();
        inner.buffer.dirty = true;
        Ok(())
    }

    /// Write the buffer back to the remote, based on the loaded version.
    ///
    /// On success the new version token becomes the base for the next commit
    /// and the buffer is clean. On any failure, including a version conflict,
    /// the buffer stays dirty and the stored version is untouched.
    pub async fn commit(&self, message: &str) -> Result<VersionToken> {
        if !self.store.capabilities().writable {
            return Err(Error::ReadOnly(self.store.label()));
        }

        let (path, content, expected) = {
            let mut inner = self.lock();
            if inner.committing {
                return Err(Error::invalid_state("A commit is already in progress"));
            }
            if inner.pending.is_some() {
                return Err(Error::invalid_state("Cannot commit while a file is loading"));
            }
            let (path, version) = match &inner.active {
                Some(active) => (active.path.clone(), active.version.clone()),
                None => return Err(Error::invalid_state("No file is open")),
            };
            if !inner.buffer.dirty {
                return Err(Error::invalid_state("No changes to commit"));
            }
            if message.trim().is_empty() {
                return Err(Error::validation(path, "commit message is empty"));
            }
            inner.committing = true;
            (path, inner.buffer.content.clone(), version)
        };
        let _committing = CommitGuard { manager: self };

        tracing::debug!("Committing {} on top of {}", path, expected);
        let result = self
            .store
            .write_file(WriteRequest {
                path: &path,
                content: &content,
                expected_version: &expected,
                message,
            })
            .await;

        let mut inner = self.lock();
        inner.committing = false;
        match result {
            Ok(version) => {
                if let Some(active) = inner.active.as_mut() {
                    active.version = version.clone();
                }
                inner.buffer.dirty = false;
                tracing::info!("Committed {} ({} -> {})", path, expected, version);
                Ok(version)
            }
            Err(err) => {
                tracing::warn!("Commit of {} failed: {}", path, err);
                Err(err)
            }
        }
    }

    /// Drop the active file and invalidate any in-flight load.
    pub fn disconnect(&self) {
        let mut inner = self.lock();
        inner.active = None;
        inner.buffer = EditBuffer::default();
        inner.pending = None;
        inner.last_request += 1;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::store::{FileBlob, StoreFuture};
    use crate::tree::TreeEntry;
    use std::collections::HashMap;
    use tokio::sync::Notify;

    /// Store whose reads and writes can be held until a test releases them.
    struct GatedStore {
        inner: MemoryStore,
        gates: Mutex<HashMap<String, Arc<Notify>>>,
    }

    impl GatedStore {
        fn new(inner: MemoryStore) -> Self {
            Self {
                inner,
                gates: Mutex::new(HashMap::new()),
            }
        }

        fn gate(&self, key: &str) -> Arc<Notify> {
            self.gates
                .lock()
                .unwrap()
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Notify::new()))
                .clone()
        }

        fn existing_gate(&self, key: &str) -> Option<Arc<Notify>> {
            self.gates.lock().unwrap().get(key).cloned()
        }
    }

    impl RemoteFileStore for GatedStore {
        fn label(&self) -> String {
            self.inner.label()
        }

        fn capabilities(&self) -> StoreCapabilities {
            self.inner.capabilities()
        }

        fn list_entries(&self) -> StoreFuture<'_, Vec<TreeEntry>> {
            self.inner.list_entries()
        }

        fn read_file<'a>(&'a self, path: &'a str) -> StoreFuture<'a, FileBlob> {
            let gate = self.existing_gate(path);
            Box::pin(async move {
                if let Some(gate) = gate {
                    gate.notified().await;
                }
                self.inner.read_file(path).await
            })
        }

        fn write_file<'a>(&'a self, request: WriteRequest<'a>) -> StoreFuture<'a, VersionToken> {
            let gate = self.existing_gate("write");
            Box::pin(async move {
                if let Some(gate) = gate {
                    gate.notified().await;
                }
                self.inner.write_file(request).await
            })
        }
    }

    fn store() -> MemoryStore {
        MemoryStore::new("mem")
            .with_file("a.txt", "alpha")
            .with_file("b.txt", "beta")
    }

    #[tokio::test]
    async fn test_select_loads_clean_file() {
        let manager = FileStateManager::new(Arc::new(store()));
        assert_eq!(manager.status(), FileStatus::NoFile);

        let outcome = manager.select_file("a.txt").await.unwrap();

        assert_eq!(outcome, SelectOutcome::Loaded);
        let snapshot = manager.snapshot().unwrap();
        assert_eq!(snapshot.content, "alpha");
        assert_eq!(snapshot.version, VersionToken::new("v1"));
        assert!(!snapshot.dirty);
    }

    #[tokio::test]
    async fn test_newer_selection_wins_over_slower_older_one() {
        let store = Arc::new(GatedStore::new(store()));
        let gate_a = store.gate("a.txt");
        let manager = FileStateManager::new(store.clone());

        let (first, second) = tokio::join!(manager.select_file("a.txt"), async {
            let loaded = manager.select_file("b.txt").await;
            gate_a.notify_one();
            loaded
        });

        assert_eq!(first.unwrap(), SelectOutcome::Superseded);
        assert_eq!(second.unwrap(), SelectOutcome::Loaded);
        assert_eq!(manager.snapshot().unwrap().path, "b.txt");
        assert_eq!(manager.snapshot().unwrap().content, "beta");
        assert_eq!(
            manager.status(),
            FileStatus::Loaded {
                path: "b.txt".to_string(),
                dirty: false
            }
        );
    }

    #[tokio::test]
    async fn test_failed_load_keeps_previous_file_and_edits() {
        let manager = FileStateManager::new(Arc::new(store()));
        manager.select_file("a.txt").await.unwrap();
        manager.edit("alpha, edited").unwrap();

        let err = manager.select_file("missing.txt").await.unwrap_err();

        assert_eq!(err, Error::NotFound("missing.txt".to_string()));
        let snapshot = manager.snapshot().unwrap();
        assert_eq!(snapshot.path, "a.txt");
        assert_eq!(snapshot.content, "alpha, edited");
        assert!(snapshot.dirty);
    }

    #[tokio::test]
    async fn test_failed_first_load_returns_to_no_file() {
        let manager = FileStateManager::new(Arc::new(store()));
        assert!(manager.select_file("nope").await.is_err());
        assert_eq!(manager.status(), FileStatus::NoFile);
    }

    #[tokio::test]
    async fn test_selecting_another_file_discards_edits() {
        let manager = FileStateManager::new(Arc::new(store()));
        manager.select_file("a.txt").await.unwrap();
        manager.edit("scratch").unwrap();

        manager.select_file("b.txt").await.unwrap();
        manager.select_file("a.txt").await.unwrap();

        assert_eq!(manager.snapshot().unwrap().content, "alpha");
        assert!(!manager.snapshot().unwrap().dirty);
    }

    #[tokio::test]
    async fn test_edit_requires_a_loaded_file() {
        let manager = FileStateManager::new(Arc::new(store()));
        let err = manager.edit("x").unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_commit_success_updates_version_and_cleans_buffer() {
        let store = Arc::new(store());
        let manager = FileStateManager::new(store.clone());
        manager.select_file("a.txt").await.unwrap();
        let before = manager.snapshot().unwrap().version;
        manager.edit("alpha v2").unwrap();

        let version = manager.commit("Update a").await.unwrap();

        assert_ne!(version, before);
        let snapshot = manager.snapshot().unwrap();
        assert_eq!(snapshot.version, version);
        assert!(!snapshot.dirty);
        assert_eq!(store.content("a.txt").as_deref(), Some("alpha v2"));

        // The new token is the base for the next commit.
        manager.edit("alpha v3").unwrap();
        assert!(manager.commit("Again").await.is_ok());
    }

    #[tokio::test]
    async fn test_commit_against_stale_version_is_a_conflict() {
        let store = Arc::new(store());
        let manager = FileStateManager::new(store.clone());
        manager.select_file("a.txt").await.unwrap();
        let v1 = manager.snapshot().unwrap().version;
        manager.edit("mine").unwrap();
        store.set_remote_content("a.txt", "theirs");

        let err = manager.commit("msg").await.unwrap_err();

        assert!(err.is_conflict());
        let snapshot = manager.snapshot().unwrap();
        assert_eq!(snapshot.version, v1);
        assert!(snapshot.dirty);
        assert_eq!(snapshot.content, "mine");
        assert_eq!(store.content("a.txt").as_deref(), Some("theirs"));
    }

    #[tokio::test]
    async fn test_commit_on_read_only_store_is_rejected_before_writing() {
        let store = Arc::new(MemoryStore::read_only("demo").with_file("a.txt", "alpha"));
        let manager = FileStateManager::new(store.clone());
        manager.select_file("a.txt").await.unwrap();
        manager.edit("changed").unwrap();

        let err = manager.commit("msg").await.unwrap_err();

        assert_eq!(err, Error::ReadOnly("demo".to_string()));
        assert_eq!(store.write_count(), 0);
        assert!(manager.snapshot().unwrap().dirty);
    }

    #[tokio::test]
    async fn test_commit_requires_dirty_buffer_and_message() {
        let manager = FileStateManager::new(Arc::new(store()));
        assert!(matches!(
            manager.commit("msg").await,
            Err(Error::InvalidState(_))
        ));

        manager.select_file("a.txt").await.unwrap();
        assert!(matches!(
            manager.commit("msg").await,
            Err(Error::InvalidState(_))
        ));

        manager.edit("changed").unwrap();
        assert!(matches!(
            manager.commit("   ").await,
            Err(Error::Validation { .. })
        ));
        assert!(manager.snapshot().unwrap().dirty);
    }

    #[tokio::test]
    async fn test_edits_and_selection_rejected_while_committing() {
        let store = Arc::new(GatedStore::new(store()));
        let write_gate = store.gate("write");
        let manager = FileStateManager::new(store.clone());
        manager.select_file("a.txt").await.unwrap();
        manager.edit("pending commit").unwrap();

        let (committed, _) = tokio::join!(manager.commit("msg"), async {
            assert_eq!(
                manager.status(),
                FileStatus::Committing {
                    path: "a.txt".to_string()
                }
            );
            assert!(matches!(
                manager.edit("sneaky"),
                Err(Error::InvalidState(_))
            ));
            assert!(matches!(
                manager.select_file("b.txt").await,
                Err(Error::InvalidState(_))
            ));
            write_gate.notify_one();
        });

        assert!(committed.is_ok());
        assert_eq!(manager.snapshot().unwrap().content, "pending commit");
        assert!(!manager.snapshot().unwrap().dirty);
    }

    #[tokio::test]
    async fn test_disconnect_discards_active_file_and_in_flight_loads() {
        let store = Arc::new(GatedStore::new(store()));
        let gate_a = store.gate("a.txt");
        let manager = FileStateManager::new(store.clone());

        let (loaded, _) = tokio::join!(manager.select_file("a.txt"), async {
            manager.disconnect();
            gate_a.notify_one();
        });

        assert_eq!(loaded.unwrap(), SelectOutcome::Superseded);
        assert_eq!(manager.status(), FileStatus::NoFile);
        assert!(manager.snapshot().is_none());
    }
}
