//! Offline-first synchronization between the local store and a remote.
//!
//! Three operations, all idempotent when nothing changes in between:
//! - [`push`](SyncEngine::push): send the local collection to the remote
//! - [`pull`](SyncEngine::pull): make the local collection equal to the
//!   remote's (server is the single source of truth)
//! - [`sync`](SyncEngine::sync): Last-Write-Wins merge of both sides, so
//!   work done offline is never dropped
//!
//! Whenever the remote cannot be reached, the engine falls back to a local
//! snapshot blob holding the last known server state: pushes are written
//! there and pulls read from there. Only a failure of that local blob makes
//! an operation fail.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::blob_store::{BlobStore, SERVER_SNAPSHOT_BLOB};
use crate::config::Config;
use crate::error::NoteResult;
use crate::merge::{dedupe_by_id, merge_notes};
use crate::models::{encode_note_list, parse_note_list, Note};
use crate::remote::RemoteEndpoint;
use crate::store::NoteStore;

/// Default delay between the push and the pull that follow a local edit
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(300);

/// Default interval of the background pull
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(1000);

/// A store shared between the UI and the sync engine
pub type SharedStore<B> = Arc<Mutex<NoteStore<B>>>;

/// Result of a sync operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncResult {
    pub success: bool,
    /// Notes received from the remote (or the local snapshot)
    pub pulled: usize,
    /// Notes sent to the remote (or the local snapshot)
    pub pushed: usize,
    /// True if the remote was unreachable and the local snapshot was used
    pub offline: bool,
    pub errors: Vec<String>,
}

impl SyncResult {
    pub fn success() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            errors: vec![error.into()],
            ..Default::default()
        }
    }
}

/// Sync engine
pub struct SyncEngine<B: BlobStore, R: RemoteEndpoint> {
    store: SharedStore<B>,
    blobs: Arc<B>,
    remote: R,
    snapshot_blob: String,
    settle_delay: Duration,
    refresh_interval: Duration,
}

impl<B: BlobStore, R: RemoteEndpoint> SyncEngine<B, R> {
    /// Create a sync engine.
    ///
    /// `blobs` receives the offline snapshot; it is usually the same blob
    /// store the `store` persists to.
    pub fn new(store: SharedStore<B>, blobs: Arc<B>, remote: R) -> Self {
        Self {
            store,
            blobs,
            remote,
            snapshot_blob: SERVER_SNAPSHOT_BLOB.to_string(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }

    /// Use the snapshot blob name, settle delay and refresh interval from `config`
    pub fn with_config(mut self, config: &Config) -> Self {
        self.snapshot_blob = config.snapshot_blob().to_string();
        self.settle_delay = config.push_settle_delay();
        self.refresh_interval = config.refresh_interval();
        self
    }

    pub fn with_snapshot_blob(mut self, name: impl Into<String>) -> Self {
        self.snapshot_blob = name.into();
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn snapshot_blob(&self) -> &str {
        &self.snapshot_blob
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn store(&self) -> &SharedStore<B> {
        &self.store
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Send the full local collection to the remote.
    ///
    /// If the remote is unavailable the collection is written to the local
    /// snapshot instead and the push still succeeds.
    pub async fn push(&self) -> SyncResult {
        let notes = self.store.lock().await.get_all().to_vec();
        self.push_notes(&notes).await
    }

    /// Replace the local collection with the remote's.
    ///
    /// Local-only notes are discarded. With the remote unavailable the local
    /// snapshot is used; a missing or blank snapshot means no notes.
    pub async fn pull(&self) -> SyncResult {
        let (notes, offline) = match self.fetch_remote().await {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::error!("Pull failed: {}", e);
                return SyncResult::failure(format!("Pull failed: {}", e));
            }
        };

        let pulled = notes.len();
        let notes = dedupe_by_id(notes);

        let mut store = self.store.lock().await;
        if store.get_all() != notes.as_slice() {
            if let Err(e) = store.replace_all(notes).await {
                return SyncResult::failure(format!("Failed to store pulled notes: {}", e));
            }
            tracing::debug!("Pull replaced local collection with {} notes", store.len());
        }

        SyncResult {
            pulled,
            offline,
            ..SyncResult::success()
        }
    }

    /// Merge the local and remote collections with Last-Write-Wins.
    ///
    /// What gets pushed is the merged collection, not the pre-merge local one.
    /// The remote state is read before anything is pushed, so that the merge
    /// sees what the remote held rather than our own upload. The merged
    /// collection is then pushed (same fallback as [`push`](Self::push)) and
    /// installed locally. A failed push aborts before the store is touched.
    /// The store stays locked for the whole operation, so no local edit can
    /// slip in between the merge and the install.
    pub async fn sync(&self) -> SyncResult {
        let (remote_notes, fetched_offline) = match self.fetch_remote().await {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::error!("Sync failed reading remote state: {}", e);
                return SyncResult::failure(format!("Sync failed: {}", e));
            }
        };

        let mut store = self.store.lock().await;
        let merged = merge_notes(store.get_all(), &dedupe_by_id(remote_notes.clone()));

        tracing::info!(
            "Merged {} local and {} remote notes: {} local-only, {} remote-only, {} local wins, {} remote wins",
            store.len(),
            remote_notes.len(),
            merged.local_only,
            merged.remote_only,
            merged.local_wins,
            merged.remote_wins
        );

        let pushed = self.push_notes(&merged.notes).await;
        if !pushed.success {
            return pushed;
        }

        if let Err(e) = store.replace_all(merged.notes).await {
            return SyncResult::failure(format!("Failed to store merged notes: {}", e));
        }

        SyncResult {
            pulled: remote_notes.len(),
            pushed: pushed.pushed,
            offline: fetched_offline || pushed.offline,
            ..SyncResult::success()
        }
    }

    /// Propagate a local edit: push, wait for the push to settle, pull.
    ///
    /// If the push fails the pull is skipped, since pulling would replace the
    /// edit that never left this device.
    pub async fn propagate_local_change(&self) -> SyncResult {
        let pushed = self.push().await;
        if !pushed.success {
            return pushed;
        }

        tokio::time::sleep(self.settle_delay).await;

        let mut result = self.pull().await;
        result.pushed = pushed.pushed;
        result.offline |= pushed.offline;
        result
    }

    /// Create a note locally, then propagate it
    pub async fn create_note(&self, title: &str, content: &str) -> NoteResult<Note> {
        let note = self.store.lock().await.create(title, content).await?;
        log_result("propagate create", &self.propagate_local_change().await);
        Ok(note)
    }

    /// Update a note locally, then propagate it if it existed
    pub async fn update_note(&self, id: &str, title: &str, content: &str) -> NoteResult<bool> {
        let updated = self.store.lock().await.update(id, title, content).await?;
        if updated {
            log_result("propagate update", &self.propagate_local_change().await);
        }
        Ok(updated)
    }

    /// Delete a note locally, then propagate the deletion if it existed
    pub async fn delete_note(&self, id: &str) -> NoteResult<bool> {
        let deleted = self.store.lock().await.delete(id).await?;
        if deleted {
            log_result("propagate delete", &self.propagate_local_change().await);
        }
        Ok(deleted)
    }

    /// Start the background refresh at the engine's refresh interval
    pub fn start_background_refresh(self: &Arc<Self>) -> BackgroundRefresh {
        self.spawn_background_refresh(self.refresh_interval)
    }

    /// Start pulling every `interval` in a background task.
    ///
    /// The first pull happens immediately. The task runs until
    /// [`BackgroundRefresh::stop`] is called or the handle is dropped.
    pub fn spawn_background_refresh(self: &Arc<Self>, interval: Duration) -> BackgroundRefresh {
        let engine = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let interval = interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::debug!("Background refresh started, interval={:?}", interval);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let result = engine.pull().await;
                        if !result.success {
                            tracing::warn!("Background pull failed: {:?}", result.errors);
                        }
                    }
                }
            }

            tracing::debug!("Background refresh stopped");
        });

        BackgroundRefresh {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    async fn push_notes(&self, notes: &[Note]) -> SyncResult {
        match self.remote.replace_all(notes).await {
            Ok(()) => {
                tracing::debug!("Pushed {} notes to remote", notes.len());
                SyncResult {
                    pushed: notes.len(),
                    ..SyncResult::success()
                }
            }
            Err(remote_err) => {
                tracing::warn!(
                    "Push to remote failed, keeping {} notes in {}: {}",
                    notes.len(),
                    self.snapshot_blob,
                    remote_err
                );
                match self.write_snapshot(notes).await {
                    Ok(()) => SyncResult {
                        pushed: notes.len(),
                        offline: true,
                        ..SyncResult::success()
                    },
                    Err(local_err) => {
                        tracing::error!("Offline snapshot write failed: {}", local_err);
                        SyncResult::failure(format!(
                            "Push failed: {}; local fallback failed: {}",
                            remote_err, local_err
                        ))
                    }
                }
            }
        }
    }

    /// Fetch the remote collection, falling back to the local snapshot.
    /// The flag is true when the fallback was used.
    async fn fetch_remote(&self) -> NoteResult<(Vec<Note>, bool)> {
        match self.remote.fetch_all().await {
            Ok(notes) => Ok((notes, false)),
            Err(e) => {
                tracing::warn!(
                    "Fetch from remote failed, reading {}: {}",
                    self.snapshot_blob,
                    e
                );
                Ok((self.read_snapshot().await?, true))
            }
        }
    }

    async fn read_snapshot(&self) -> NoteResult<Vec<Note>> {
        let Some(content) = self.blobs.read(&self.snapshot_blob).await? else {
            return Ok(Vec::new());
        };
        Ok(parse_note_list(&content).unwrap_or_else(|e| {
            tracing::warn!("Ignoring corrupt {}: {}", self.snapshot_blob, e);
            Vec::new()
        }))
    }

    async fn write_snapshot(&self, notes: &[Note]) -> NoteResult<()> {
        let content = encode_note_list(notes)?;
        self.blobs.write(&self.snapshot_blob, &content).await
    }
}

fn log_result(operation: &str, result: &SyncResult) {
    if result.success {
        tracing::debug!(
            "{}: pushed={} pulled={} offline={}",
            operation,
            result.pushed,
            result.pulled,
            result.offline
        );
    } else {
        tracing::warn!("{} failed: {:?}", operation, result.errors);
    }
}

/// Handle to a running background refresh task
pub struct BackgroundRefresh {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundRefresh {
    /// Stop the task, letting an in-flight pull finish first
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for BackgroundRefresh {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
