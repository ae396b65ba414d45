//! Local note collection.
//!
//! [`NoteStore`] owns the in-process list of notes and is its only mutator.
//! Every mutation is written to the notes blob before it becomes visible: if
//! the write fails the error is returned and the in-memory collection keeps
//! its previous value. Reads of the blob are the opposite: a missing, blank,
//! unreadable or corrupt blob simply means "no notes yet".
//!
//! Observers get full-collection snapshots through [`NoteStore::subscribe`].

use std::sync::Arc;

use tokio::sync::watch;

use crate::blob_store::{BlobStore, NOTES_BLOB};
use crate::config::Config;
use crate::error::NoteResult;
use crate::merge::dedupe_by_id;
use crate::models::{encode_note_list, parse_note_list, Note};

pub struct NoteStore<B: BlobStore> {
    blobs: Arc<B>,
    blob_name: String,
    notes: Vec<Note>,
    snapshots: watch::Sender<Vec<Note>>,
}

impl<B: BlobStore> NoteStore<B> {
    /// Create an empty store persisting to the default notes blob.
    ///
    /// Call [`load`](Self::load) to pick up previously saved notes.
    pub fn new(blobs: Arc<B>) -> Self {
        Self::with_blob_name(blobs, NOTES_BLOB)
    }

    /// Create an empty store persisting to the configured notes blob
    pub fn from_config(blobs: Arc<B>, config: &Config) -> Self {
        Self::with_blob_name(blobs, config.notes_blob())
    }

    /// Create an empty store persisting to a custom blob name
    pub fn with_blob_name(blobs: Arc<B>, blob_name: impl Into<String>) -> Self {
        let (snapshots, _) = watch::channel(Vec::new());
        Self {
            blobs,
            blob_name: blob_name.into(),
            notes: Vec::new(),
            snapshots,
        }
    }

    /// Name of the blob this store persists to
    pub fn blob_name(&self) -> &str {
        &self.blob_name
    }

    /// Replace the in-memory collection with the persisted one.
    pub async fn load(&mut self) {
        let notes = match self.blobs.read(&self.blob_name).await {
            Ok(Some(content)) => parse_note_list(&content).unwrap_or_else(|e| {
                tracing::warn!("Discarding unparseable {}: {}", self.blob_name, e);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("Could not read {}: {}", self.blob_name, e);
                Vec::new()
            }
        };

        tracing::debug!("Loaded {} notes from {}", notes.len(), self.blob_name);
        self.commit(dedupe_by_id(notes));
    }

    /// Create, persist and return a new note
    pub async fn create(&mut self, title: &str, content: &str) -> NoteResult<Note> {
        let note = Note::new(title, content);

        let mut notes = self.notes.clone();
        notes.push(note.clone());
        self.persist_and_commit(notes).await?;

        Ok(note)
    }

    /// Replace the title and content of an existing note.
    ///
    /// Returns `Ok(false)` without touching storage if `id` is unknown.
    pub async fn update(&mut self, id: &str, title: &str, content: &str) -> NoteResult<bool> {
        let Some(pos) = self.position(id) else {
            return Ok(false);
        };

        let mut notes = self.notes.clone();
        notes[pos] = notes[pos].with_changes(title, content);
        self.persist_and_commit(notes).await?;

        Ok(true)
    }

    /// Remove a note.
    ///
    /// Returns `Ok(false)` without touching storage if `id` is unknown.
    pub async fn delete(&mut self, id: &str) -> NoteResult<bool> {
        let Some(pos) = self.position(id) else {
            return Ok(false);
        };

        let mut notes = self.notes.clone();
        notes.remove(pos);
        self.persist_and_commit(notes).await?;

        Ok(true)
    }

    /// Swap in a whole new collection (duplicate ids are collapsed by LWW)
    pub async fn replace_all(&mut self, notes: Vec<Note>) -> NoteResult<()> {
        self.persist_and_commit(dedupe_by_id(notes)).await
    }

    pub fn get_by_id(&self, id: &str) -> Option<&Note> {
        self.notes.iter().find(|note| note.id == id)
    }

    pub fn get_all(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Subscribe to collection snapshots.
    ///
    /// The receiver starts at the current collection and sees every later
    /// one; any number of receivers may exist.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Note>> {
        self.snapshots.subscribe()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.notes.iter().position(|note| note.id == id)
    }

    async fn persist_and_commit(&mut self, notes: Vec<Note>) -> NoteResult<()> {
        let content = encode_note_list(&notes)?;
        if let Err(e) = self.blobs.write(&self.blob_name, &content).await {
            tracing::error!("Failed to persist {}: {}", self.blob_name, e);
            return Err(e);
        }
        self.commit(notes);
        Ok(())
    }

    fn commit(&mut self, notes: Vec<Note>) {
        self.notes = notes;
        self.snapshots.send_replace(self.notes.clone());
    }
}
