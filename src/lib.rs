//! NoteCore - offline-first note storage and synchronization.
//!
//! This library provides:
//! - Data model (Note) and its JSON wire format
//! - Durable blob storage (filesystem and in-memory)
//! - The local note store with observable snapshots
//! - Remote endpoints (HTTP, blob-backed, offline)
//! - The sync engine: push, pull (replace) and sync (Last-Write-Wins merge)
//! - Configuration management
//!
//! # Feature Flags
//!
//! - `server`: Include the HTTP note server (axum) and the `notecore-server` binary.
//! - `desktop`: Resolve the storage root from the user's home directory.

pub mod blob_store;
pub mod config;
pub mod error;
pub mod merge;
pub mod models;
pub mod remote;
pub mod store;
pub mod sync_engine;
#[cfg(feature = "server")]
pub mod sync_server;

// Re-export commonly used types
pub use blob_store::{BlobStore, FileBlobStore, MemoryBlobStore};
pub use config::{Config, StorageRootResolver};
pub use error::{NoteError, NoteResult};
pub use merge::{merge_notes, MergeResult};
pub use models::Note;
pub use remote::{BlobRemote, HttpRemote, OfflineRemote, RemoteEndpoint};
pub use store::NoteStore;
pub use sync_engine::{BackgroundRefresh, SharedStore, SyncEngine, SyncResult};
