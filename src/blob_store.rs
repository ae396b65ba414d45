//! Durable blob storage.
//!
//! The engine persists whole documents by name ("notes.json", "server.json")
//! and never edits them in place. This module provides the trait it talks
//! to and two implementations:
//! - [`FileBlobStore`]: one file per blob inside a storage root directory
//! - [`MemoryBlobStore`]: in-process map, used by tests and embedders that
//!   provide their own persistence

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::config::StorageRootResolver;
use crate::error::{NoteError, NoteResult};

/// Blob holding the local note collection
pub const NOTES_BLOB: &str = "notes.json";

/// Blob holding the last known server state (and the server's own data)
pub const SERVER_SNAPSHOT_BLOB: &str = "server.json";

/// Trait for durable key-value blob storage.
///
/// Blobs are whole UTF-8 documents addressed by name. A missing blob is not
/// an error: `read` returns `Ok(None)`.
pub trait BlobStore: Send + Sync + 'static {
    /// Read a blob.
    ///
    /// # Returns
    /// * `Ok(Some(content))` - The blob exists
    /// * `Ok(None)` - No blob with this name
    /// * `Err(NoteError)` - The blob exists but could not be read
    fn read(&self, name: &str) -> impl Future<Output = NoteResult<Option<String>>> + Send;

    /// Write a blob, replacing any previous content.
    fn write(&self, name: &str, content: &str) -> impl Future<Output = NoteResult<()>> + Send;

    /// Check whether a blob exists.
    fn exists(&self, name: &str) -> impl Future<Output = bool> + Send;
}

/// Filesystem-backed blob store.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write leaves the previous version intact.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    /// Open a blob store rooted at `root`, creating the directory if needed.
    ///
    /// Failing to create the directory is a configuration error: without a
    /// writable storage location nothing else can work.
    pub fn open(root: impl Into<PathBuf>) -> NoteResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            NoteError::Config(format!(
                "Cannot create storage directory {}: {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self { root })
    }

    /// Open a blob store at the location chosen by `resolver`
    pub fn from_resolver(resolver: &impl StorageRootResolver) -> NoteResult<Self> {
        Self::open(resolver.storage_root()?)
    }

    /// The storage root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> NoteResult<PathBuf> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
        {
            return Err(NoteError::storage(format!("Invalid blob name: {:?}", name)));
        }
        Ok(self.root.join(name))
    }
}

impl BlobStore for FileBlobStore {
    async fn read(&self, name: &str) -> NoteResult<Option<String>> {
        let path = self.path_for(name)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // Invalid UTF-8 is malformed content, left for the parser to reject
        match String::from_utf8(bytes) {
            Ok(content) => Ok(Some(content)),
            Err(e) => {
                tracing::warn!("{} is not valid UTF-8", path.display());
                Ok(Some(String::from_utf8_lossy(e.as_bytes()).into_owned()))
            }
        }
    }

    async fn write(&self, name: &str, content: &str) -> NoteResult<()> {
        let path = self.path_for(name)?;
        // Unique per write so concurrent writers never rename each other's file
        let tmp_path = self
            .root
            .join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()));

        if let Err(e) = tokio::fs::write(&tmp_path, content).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        tracing::trace!("Wrote {} bytes to {}", content.len(), path.display());
        Ok(())
    }

    async fn exists(&self, name: &str) -> bool {
        match self.path_for(name) {
            Ok(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }
}

/// In-memory blob store.
///
/// Reads and writes can be made to fail on demand to exercise the
/// storage-failure paths.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with one blob
    pub fn with_blob(name: &str, content: &str) -> Self {
        let store = Self::default();
        if let Ok(mut blobs) = store.blobs.lock() {
            blobs.insert(name.to_string(), content.to_string());
        }
        store
    }

    /// Make every subsequent read fail (or succeed again)
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent write fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Current content of a blob, bypassing failure injection
    pub fn get(&self, name: &str) -> Option<String> {
        self.blobs.lock().ok()?.get(name).cloned()
    }

    /// Remove a blob
    pub fn remove(&self, name: &str) -> bool {
        self.blobs
            .lock()
            .map(|mut blobs| blobs.remove(name).is_some())
            .unwrap_or(false)
    }
}

impl BlobStore for MemoryBlobStore {
    async fn read(&self, name: &str) -> NoteResult<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(NoteError::storage(format!("Read of {} failed", name)));
        }
        let blobs = self
            .blobs
            .lock()
            .map_err(|_| NoteError::storage("Blob map lock poisoned"))?;
        Ok(blobs.get(name).cloned())
    }

    async fn write(&self, name: &str, content: &str) -> NoteResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(NoteError::storage(format!("Write of {} failed", name)));
        }
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| NoteError::storage("Blob map lock poisoned"))?;
        blobs.insert(name.to_string(), content.to_string());
        Ok(())
    }

    async fn exists(&self, name: &str) -> bool {
        self.blobs
            .lock()
            .map(|blobs| blobs.contains_key(name))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_store_missing_blob_reads_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileBlobStore::open(temp_dir.path()).unwrap();

        assert_eq!(store.read(NOTES_BLOB).await.unwrap(), None);
        assert!(!store.exists(NOTES_BLOB).await);
    }

    #[tokio::test]
    async fn test_file_store_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileBlobStore::open(temp_dir.path()).unwrap();

        store.write(SERVER_SNAPSHOT_BLOB, "[]").await.unwrap();
        assert!(store.exists(SERVER_SNAPSHOT_BLOB).await);
        assert_eq!(
            store.read(SERVER_SNAPSHOT_BLOB).await.unwrap().as_deref(),
            Some("[]")
        );

        store.write(SERVER_SNAPSHOT_BLOB, "[1]").await.unwrap();
        assert_eq!(
            store.read(SERVER_SNAPSHOT_BLOB).await.unwrap().as_deref(),
            Some("[1]")
        );
        // No temporary file left behind
        let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_file_store_concurrent_writes_last_writer_wins() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FileBlobStore::open(temp_dir.path()).unwrap());

        for round in 0..20 {
            let mut tasks = Vec::new();
            for writer in 0..8 {
                let store = store.clone();
                tasks.push(tokio::spawn(async move {
                    let content = format!("[\"round {} writer {}\"]", round, writer);
                    store.write(SERVER_SNAPSHOT_BLOB, &content).await
                }));
            }
            for task in tasks {
                task.await.unwrap().unwrap();
            }

            // Whole content of exactly one writer, never a mix
            let content = store.read(SERVER_SNAPSHOT_BLOB).await.unwrap().unwrap();
            let prefix = format!("[\"round {} writer ", round);
            assert!(content.starts_with(&prefix), "unexpected content {}", content);
            assert!(content.ends_with("\"]"));
        }

        let entries = std::fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn test_file_store_invalid_utf8_reads_as_malformed() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(SERVER_SNAPSHOT_BLOB), [0xff, 0xfe, b'[']).unwrap();
        let store = FileBlobStore::open(temp_dir.path()).unwrap();

        let content = store.read(SERVER_SNAPSHOT_BLOB).await.unwrap().unwrap();
        assert!(crate::models::parse_note_list(&content).is_err());
    }

    #[tokio::test]
    async fn test_file_store_creates_nested_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("a").join("b");
        let store = FileBlobStore::open(&root).unwrap();

        store.write(NOTES_BLOB, "x").await.unwrap();
        assert!(root.join(NOTES_BLOB).exists());
        assert_eq!(store.root(), root.as_path());
    }

    #[tokio::test]
    async fn test_file_store_from_resolver() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join(crate::config::STORAGE_DIR_NAME);

        let store = FileBlobStore::from_resolver(&root).unwrap();
        store.write(NOTES_BLOB, "[]").await.unwrap();
        assert!(root.join(NOTES_BLOB).exists());
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_names() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileBlobStore::open(temp_dir.path()).unwrap();

        assert!(store.write("../escape.json", "x").await.is_err());
        assert!(store.read("sub/notes.json").await.is_err());
        assert!(!store.exists("..").await);
    }

    #[tokio::test]
    async fn test_file_store_open_fails_when_root_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("occupied");
        std::fs::write(&file_path, "not a directory").unwrap();

        let result = FileBlobStore::open(file_path.join("inner"));
        assert!(matches!(result, Err(NoteError::Config(_))));
    }

    #[tokio::test]
    async fn test_memory_store_failure_injection() {
        let store = MemoryBlobStore::with_blob(NOTES_BLOB, "[]");
        assert!(store.exists(NOTES_BLOB).await);

        store.set_fail_writes(true);
        assert!(store.write(NOTES_BLOB, "changed").await.is_err());
        assert_eq!(store.get(NOTES_BLOB).as_deref(), Some("[]"));

        store.set_fail_reads(true);
        assert!(store.read(NOTES_BLOB).await.is_err());

        store.set_fail_reads(false);
        store.set_fail_writes(false);
        store.write(NOTES_BLOB, "changed").await.unwrap();
        assert_eq!(store.read(NOTES_BLOB).await.unwrap().as_deref(), Some("changed"));

        assert!(store.remove(NOTES_BLOB));
        assert!(!store.exists(NOTES_BLOB).await);
    }
}
