//! Last-Write-Wins merge of note collections.
//!
//! Notes are merged as whole units keyed by id. For an id present on both
//! sides the note with the strictly greater `updated_at` wins; on equal
//! timestamps the remote copy is kept.

use std::collections::HashMap;

use crate::models::Note;

/// Result of merging a local and a remote collection.
#[derive(Debug, Clone, Default)]
pub struct MergeResult {
    /// Merged collection: remote order first, then local-only notes
    pub notes: Vec<Note>,
    /// Ids only present locally
    pub local_only: usize,
    /// Ids only present remotely
    pub remote_only: usize,
    /// Shared ids where the local copy was newer
    pub local_wins: usize,
    /// Shared ids where the remote copy was kept (newer or tied)
    pub remote_wins: usize,
}

impl MergeResult {
    /// Number of ids present on both sides
    pub fn overlapping(&self) -> usize {
        self.local_wins + self.remote_wins
    }
}

/// Merge `local` into `remote` using Last-Write-Wins.
///
/// The result contains exactly one note for every id in either input. Both
/// inputs are assumed to be free of duplicate ids; if they are not, later
/// occurrences are resolved the same way as cross-side overlaps.
pub fn merge_notes(local: &[Note], remote: &[Note]) -> MergeResult {
    let mut result = MergeResult::default();
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(remote.len() + local.len());
    let mut merged: Vec<Note> = Vec::with_capacity(remote.len() + local.len());

    for note in remote {
        match index.get(note.id.as_str()) {
            Some(&pos) => {
                if !merged[pos].is_newer_than(note) {
                    merged[pos] = note.clone();
                }
            }
            None => {
                index.insert(note.id.as_str(), merged.len());
                merged.push(note.clone());
            }
        }
    }
    let remote_ids = merged.len();

    for note in local {
        match index.get(note.id.as_str()) {
            Some(&pos) if pos < remote_ids => {
                if note.is_newer_than(&merged[pos]) {
                    merged[pos] = note.clone();
                    result.local_wins += 1;
                } else {
                    result.remote_wins += 1;
                }
            }
            Some(&pos) => {
                if !merged[pos].is_newer_than(note) {
                    merged[pos] = note.clone();
                }
            }
            None => {
                index.insert(note.id.as_str(), merged.len());
                merged.push(note.clone());
                result.local_only += 1;
            }
        }
    }

    result.remote_only = remote_ids - result.overlapping();
    result.notes = merged;
    result
}

/// Collapse duplicate ids to a single note each.
///
/// Each id keeps the position of its first occurrence and the value of its
/// newest occurrence; on equal timestamps the later occurrence wins.
pub fn dedupe_by_id(notes: Vec<Note>) -> Vec<Note> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(notes.len());
    let mut unique: Vec<Note> = Vec::with_capacity(notes.len());

    for note in notes {
        match index.get(&note.id) {
            Some(&pos) => {
                if !unique[pos].is_newer_than(&note) {
                    unique[pos] = note;
                }
            }
            None => {
                index.insert(note.id.clone(), unique.len());
                unique.push(note);
            }
        }
    }

    unique
}
