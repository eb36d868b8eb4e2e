//! Bookmark document persistence
//!
//! The document is stored as one JSON blob in a key-value primitive. Every
//! save rewrites the whole document; there is no delta format.
//!
//! Saves are fire-and-forget. In write-behind mode a background task owns
//! the key-value store and applies snapshots in the order they were queued,
//! so a caller (and every change subscriber) sees the new in-memory state
//! before it is durable. `flush()` closes that window when a caller needs to.
//!
//! Files written by `FileKeyValueStore`:
//! - `<data_dir>/workspaces/<hash>/markr.bookmarks.json` - the document
//! - `<data_dir>/workspaces/<hash>/markr.bookmarks.corrupt.json` - last unreadable document

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use super::error::{StorageError, StorageOp, StorageResult};
use crate::models::BookmarkStoreRoot;

/// Key the bookmark document is stored under
pub const BOOKMARKS_KEY: &str = "markr.bookmarks";

/// Raw blob storage supplied by the host
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()>;
    fn remove(&self, key: &str) -> StorageResult<()>;
}

/// One file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path backing `key`
    pub fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && !key.contains(['/', '\\'])
            && key != "..";
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        fs::read(&path)
            .map(Some)
            .map_err(|e| StorageError::from_io(e, StorageOp::Read, path))
    }

    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let path = self.path_for(key)?;
        atomic_write(&path, value)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        if path.exists() {
            fs::remove_file(&path).map_err(|e| StorageError::from_io(e, StorageOp::Remove, path))?;
        }
        Ok(())
    }
}

/// In-memory key-value store, for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.entries().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries().remove(key);
        Ok(())
    }
}

/// A storage failure kept for later reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageFailure {
    pub message: String,
    pub recoverable: bool,
    pub suggestion: Option<&'static str>,
}

impl From<&StorageError> for StorageFailure {
    fn from(error: &StorageError) -> Self {
        Self {
            message: error.to_string(),
            recoverable: error.is_recoverable(),
            suggestion: error.recovery_suggestion(),
        }
    }
}

/// Failures shared between an adapter and its writer task
#[derive(Debug, Default)]
struct FailureLog {
    writes: AtomicUsize,
    last: Mutex<Option<StorageFailure>>,
}

impl FailureLog {
    fn record(&self, failure: StorageFailure) {
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Some(failure);
    }

    fn record_write(&self, failure: StorageFailure) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.record(failure);
    }

    fn last(&self) -> Option<StorageFailure> {
        self.last.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

enum WriteRequest {
    Snapshot(Vec<u8>),
    Flush(oneshot::Sender<()>),
}

enum Writer {
    Inline,
    Behind(mpsc::UnboundedSender<WriteRequest>),
}

/// Loads and saves the bookmark document through a [`KeyValueStore`]
pub struct PersistenceAdapter {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    writer: Writer,
    failures: Arc<FailureLog>,
    held: AtomicBool,
}

impl PersistenceAdapter {
    /// Adapter whose saves complete before `save` returns
    pub fn inline(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            key: BOOKMARKS_KEY.to_string(),
            writer: Writer::Inline,
            failures: Arc::new(FailureLog::default()),
            held: AtomicBool::new(false),
        }
    }

    /// Adapter that hands snapshots to a background tokio task
    ///
    /// Falls back to inline writes when called outside a tokio runtime.
    pub fn write_behind(kv: Arc<dyn KeyValueStore>) -> Self {
        let mut adapter = Self::inline(kv);
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No tokio runtime available; bookmark saves will be written inline");
            return adapter;
        };

        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(run_writer(
            Arc::clone(&adapter.kv),
            adapter.key.clone(),
            rx,
            Arc::clone(&adapter.failures),
        ));
        adapter.writer = Writer::Behind(tx);
        adapter
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn backup_key(&self) -> String {
        format!("{}.corrupt", self.key)
    }

    /// Whether saves go through the background writer
    pub fn is_write_behind(&self) -> bool {
        matches!(self.writer, Writer::Behind(_))
    }

    /// Number of writes that failed and were dropped
    pub fn write_failures(&self) -> usize {
        self.failures.writes.load(Ordering::SeqCst)
    }

    /// Whether saves are held back because the stored document could not
    /// be read and must not be overwritten
    pub fn is_holding_writes(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    /// Most recent load or write failure, if any
    pub fn last_failure(&self) -> Option<StorageFailure> {
        self.failures.last()
    }

    /// Read the document; `None` on first run
    ///
    /// An unparsable document is copied to the backup key and reported as
    /// [`StorageError::CorruptDocument`]. When that copy fails too the error
    /// is [`StorageError::CorruptNotBackedUp`] and the document must not be
    /// overwritten. A parsable document is normalized.
    ///
    /// Any failure other than a backed-up corrupt document holds later
    /// saves, so the unread document survives the session.
    pub fn load(&self) -> StorageResult<Option<BookmarkStoreRoot>> {
        let result = self.read_document();
        match &result {
            Ok(_) | Err(StorageError::CorruptDocument { .. }) => {
                self.held.store(false, Ordering::SeqCst)
            }
            Err(_) => self.held.store(true, Ordering::SeqCst),
        }
        if let Err(e) = &result {
            self.failures.record(e.into());
        }
        result
    }

    fn read_document(&self) -> StorageResult<Option<BookmarkStoreRoot>> {
        let Some(bytes) = self.kv.get(&self.key)? else {
            return Ok(None);
        };

        let mut root: BookmarkStoreRoot = match serde_json::from_slice(&bytes) {
            Ok(root) => root,
            Err(e) => {
                let backup_key = self.backup_key();
                if let Err(backup_err) = self.kv.set(&backup_key, &bytes) {
                    error!("Failed to back up corrupt bookmark document: {}", backup_err);
                    return Err(StorageError::CorruptNotBackedUp {
                        key: self.key.clone(),
                        backup_key,
                        details: e.to_string(),
                        source: Box::new(backup_err),
                    });
                }
                return Err(StorageError::CorruptDocument {
                    key: self.key.clone(),
                    backup_key,
                    details: e.to_string(),
                });
            }
        };

        let repairs = root.normalize();
        if repairs > 0 {
            warn!(repairs, "Repaired inconsistencies in loaded bookmark document");
        }
        Ok(Some(root))
    }

    /// Persist the full document without waiting for durability
    ///
    /// Failures are logged and counted, never returned: the in-memory state
    /// stays authoritative for the session.
    pub fn save(&self, root: &BookmarkStoreRoot) {
        if self.is_holding_writes() {
            debug!("Save held: stored bookmark document was not loaded");
            return;
        }
        if let Err(e) = self.try_save(root) {
            self.failures.record_write((&e).into());
            warn!("Failed to persist bookmarks: {}", e);
        }
    }

    /// Persist the full document, reporting errors detected before hand-off
    ///
    /// Inline mode reports write errors. Write-behind mode only reports a
    /// stopped worker; later write errors are logged by the worker.
    pub fn try_save(&self, root: &BookmarkStoreRoot) -> StorageResult<()> {
        let bytes = serde_json::to_vec(root)?;
        match &self.writer {
            Writer::Inline => self.kv.set(&self.key, &bytes),
            Writer::Behind(tx) => tx
                .send(WriteRequest::Snapshot(bytes))
                .map_err(|_| StorageError::WorkerStopped),
        }
    }

    /// Wait until every snapshot queued so far has been written
    pub async fn flush(&self) -> StorageResult<()> {
        let Writer::Behind(tx) = &self.writer else {
            return Ok(());
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        tx.send(WriteRequest::Flush(ack_tx))
            .map_err(|_| StorageError::WorkerStopped)?;
        ack_rx.await.map_err(|_| StorageError::WorkerStopped)
    }
}

impl std::fmt::Debug for PersistenceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceAdapter")
            .field("key", &self.key)
            .field("write_behind", &self.is_write_behind())
            .finish()
    }
}

/// Background writer: applies snapshots in order, keeping only the newest
/// of any snapshots queued back to back
async fn run_writer(
    kv: Arc<dyn KeyValueStore>,
    key: String,
    mut rx: mpsc::UnboundedReceiver<WriteRequest>,
    failures: Arc<FailureLog>,
) {
    while let Some(request) = rx.recv().await {
        let mut bytes = match request {
            WriteRequest::Snapshot(bytes) => bytes,
            WriteRequest::Flush(ack) => {
                let _ = ack.send(());
                continue;
            }
        };

        let mut acks = Vec::new();
        while let Ok(next) = rx.try_recv() {
            match next {
                WriteRequest::Snapshot(newer) => bytes = newer,
                WriteRequest::Flush(ack) => {
                    acks.push(ack);
                    break;
                }
            }
        }

        let kv = Arc::clone(&kv);
        let key = key.clone();
        match tokio::task::spawn_blocking(move || kv.set(&key, &bytes)).await {
            Ok(Ok(())) => debug!("Bookmark document persisted"),
            Ok(Err(e)) => {
                failures.record_write((&e).into());
                warn!("Failed to persist bookmarks: {}", e);
            }
            Err(e) => {
                failures.record_write(StorageFailure {
                    message: format!("Bookmark writer task failed: {}", e),
                    recoverable: false,
                    suggestion: None,
                });
                error!("Bookmark writer task failed: {}", e);
            }
        }

        for ack in acks {
            let _ = ack.send(());
        }
    }
    debug!("Bookmark writer stopped");
}

/// Replace `path` with `data` without ever exposing a half-written file
///
/// The bytes go to a sibling `.tmp` file, are synced, then renamed over the
/// target. A crash leaves either the old document or the new one.
fn atomic_write(path: &Path, data: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StorageError::Directory {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let temp_path = path.with_extension("tmp");
    let write_temp = || -> std::io::Result<()> {
        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()
    };
    write_temp().map_err(|e| StorageError::from_io(e, StorageOp::Write, temp_path.clone()))?;

    fs::rename(&temp_path, path).map_err(|source| StorageError::Rename {
        from: temp_path.clone(),
        to: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::FileIdentity;
    use crate::models::{BookmarkFileGroup, NewBookmark, TextRange};
    use tempfile::TempDir;
    use uuid::Uuid;

    /// Store whose writes always fail
    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> StorageResult<Option<Vec<u8>>> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &[u8]) -> StorageResult<()> {
            Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "No space left on device",
            )))
        }

        fn remove(&self, _key: &str) -> StorageResult<()> {
            Ok(())
        }
    }

    /// Memory store that refuses to write backup keys
    #[derive(Default)]
    struct BackupRejectingStore {
        inner: MemoryKeyValueStore,
    }

    impl KeyValueStore for BackupRejectingStore {
        fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
            if key.ends_with(".corrupt") {
                return Err(StorageError::from_io(
                    std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
                    StorageOp::Write,
                    PathBuf::from(key),
                ));
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> StorageResult<()> {
            self.inner.remove(key)
        }
    }

    fn sample_root() -> BookmarkStoreRoot {
        let file = FileIdentity::from_path("/nonexistent/src/main.rs").unwrap();
        let mut group = BookmarkFileGroup::new(&file);
        group.bookmarks.push(
            NewBookmark::line(3)
                .label("entry")
                .color("red")
                .into_bookmark(Uuid::new_v4(), file.hash()),
        );
        group.bookmarks.push(
            NewBookmark::selection(TextRange::new(5, 2, 7, 0).unwrap())
                .description("loop body")
                .into_bookmark(Uuid::new_v4(), file.hash()),
        );

        let mut root = BookmarkStoreRoot::empty("workspace-hash");
        root.data.push(group);
        root
    }

    #[test]
    fn test_file_store_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let kv = FileKeyValueStore::new(temp_dir.path().join("ws"));

        assert!(kv.get("doc").unwrap().is_none());
        kv.set("doc", b"hello").unwrap();
        assert_eq!(kv.get("doc").unwrap().unwrap(), b"hello");
        assert!(temp_dir.path().join("ws").join("doc.json").exists());
        assert!(!temp_dir.path().join("ws").join("doc.tmp").exists());

        kv.remove("doc").unwrap();
        assert!(kv.get("doc").unwrap().is_none());
    }

    #[test]
    fn test_file_store_rejects_path_keys() {
        let kv = FileKeyValueStore::new("/tmp");
        assert!(matches!(
            kv.path_for("../escape"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(kv.path_for("").is_err());
        assert!(kv.path_for(BOOKMARKS_KEY).is_ok());
    }

    #[test]
    fn test_load_returns_none_on_first_run() {
        let adapter = PersistenceAdapter::inline(Arc::new(MemoryKeyValueStore::new()));
        assert!(adapter.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let adapter = PersistenceAdapter::inline(Arc::new(FileKeyValueStore::new(temp_dir.path())));
        let root = sample_root();

        adapter.save(&root);
        let loaded = adapter.load().unwrap().unwrap();

        assert_eq!(loaded, root);
        assert_eq!(adapter.write_failures(), 0);

        assert!(adapter.is_holding_writes());
        adapter.save(&sample_root());
        assert_eq!(
            kv.inner.get(BOOKMARKS_KEY).unwrap().unwrap(),
            b"{\"workspace\": \"ws\", \"da"
        );
    }

    #[test]
    fn test_persisted_json_shape() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let adapter = PersistenceAdapter::inline(kv.clone());
        adapter.save(&sample_root());

        let bytes = kv.get(BOOKMARKS_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["workspace"], "workspace-hash");
        let group = &value["data"][0];
        assert!(group["id"].is_string());
        assert_eq!(group["fileUri"], "file:///nonexistent/src/main.rs");
        assert_eq!(group["filename"], "main.rs");
        assert_eq!(group["bookmarks"][1]["type"], "selection");
        assert_eq!(group["bookmarks"][1]["range"]["endLine"], 7);
    }

    #[test]
    fn test_corrupt_document_is_backed_up() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.set(BOOKMARKS_KEY, b"{not json").unwrap();
        let adapter = PersistenceAdapter::inline(kv.clone());

        let err = adapter.load().unwrap_err();
        assert!(matches!(err, StorageError::CorruptDocument { .. }));
        assert!(!adapter.is_holding_writes());
        assert_eq!(
            kv.get("markr.bookmarks.corrupt").unwrap().unwrap(),
            b"{not json"
        );
    }

    #[test]
    fn test_invalid_range_in_document_is_corrupt() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let mut value = serde_json::to_value(sample_root()).unwrap();
        value["data"][0]["bookmarks"][0]["range"]["startLine"] = serde_json::json!(99);
        kv.set(BOOKMARKS_KEY, &serde_json::to_vec(&value).unwrap())
            .unwrap();

        let adapter = PersistenceAdapter::inline(kv);
        assert!(matches!(
            adapter.load(),
            Err(StorageError::CorruptDocument { .. })
        ));
    }

    #[test]
    fn test_write_failure_is_swallowed() {
        let adapter = PersistenceAdapter::inline(Arc::new(FailingStore));
        adapter.save(&sample_root());
        adapter.save(&sample_root());
        assert_eq!(adapter.write_failures(), 2);

        let failure = adapter.last_failure().unwrap();
        assert!(failure.message.contains("No space left"));
    }

    #[test]
    fn test_corrupt_document_kept_when_backup_fails() {
        let kv = Arc::new(BackupRejectingStore::default());
        kv.inner.set(BOOKMARKS_KEY, b"{\"workspace\": \"ws\", \"da").unwrap();
        let adapter = PersistenceAdapter::inline(kv.clone());

        let err = adapter.load().unwrap_err();
        assert!(matches!(err, StorageError::CorruptNotBackedUp { .. }));
        assert!(kv.inner.get("markr.bookmarks.corrupt").unwrap().is_none());

        let failure = adapter.last_failure().unwrap();
        assert!(failure.recoverable);
        assert!(failure.suggestion.is_some());
        assert_eq!(adapter.write_failures(), 0);

        assert!(adapter.is_holding_writes());
        adapter.save(&sample_root());
        assert_eq!(
            kv.inner.get(BOOKMARKS_KEY).unwrap().unwrap(),
            b"{\"workspace\": \"ws\", \"da"
        );
    }

    #[test]
    fn test_write_behind_without_runtime_falls_back_to_inline() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let adapter = PersistenceAdapter::write_behind(kv.clone());
        assert!(!adapter.is_write_behind());

        adapter.save(&sample_root());
        assert!(kv.get(BOOKMARKS_KEY).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_write_behind_flush_persists_latest_snapshot() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let adapter = PersistenceAdapter::write_behind(kv.clone());
        assert!(adapter.is_write_behind());

        let mut root = sample_root();
        adapter.save(&root);
        root.data.clear();
        adapter.save(&root);
        adapter.flush().await.unwrap();

        let loaded = adapter.load().unwrap().unwrap();
        assert_eq!(loaded, root);
    }

    #[tokio::test]
    async fn test_write_behind_failures_are_counted() {
        let adapter = PersistenceAdapter::write_behind(Arc::new(FailingStore));
        adapter.save(&sample_root());
        adapter.flush().await.unwrap();

        assert_eq!(adapter.write_failures(), 1);
    }
}
