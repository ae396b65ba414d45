//! Data models for NoteCore.
//!
//! A [`Note`] is replaced as a whole on every edit. `updated_at` is the
//! logical clock used by Last-Write-Wins reconciliation, so it only ever moves
//! forward for a given id.
//!
//! Timestamps are milliseconds since the Unix epoch. On the wire and on disk
//! notes are a plain JSON array with camelCase field names.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::NoteResult;

/// A single note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique identifier, assigned at creation and never changed
    pub id: String,
    pub title: String,
    pub content: String,
    /// When the note was created (ms since epoch)
    pub created_at: i64,
    /// When the note was last changed (ms since epoch)
    pub updated_at: i64,
}

impl Note {
    /// Create a new note with a fresh id and `created_at == updated_at == now`
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: generate_note_id(),
            title: title.into(),
            content: content.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Return an edited copy of this note.
    ///
    /// The copy keeps `id` and `created_at`. Its `updated_at` is strictly
    /// greater than ours even if the wall clock has not advanced.
    pub fn with_changes(&self, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: self.id.clone(),
            title: title.into(),
            content: content.into(),
            created_at: self.created_at,
            updated_at: now_millis().max(self.updated_at.saturating_add(1)),
        }
    }

    /// LWW comparison: true only if this note was written strictly later
    pub fn is_newer_than(&self, other: &Note) -> bool {
        self.updated_at > other.updated_at
    }
}

/// Generate a collision-resistant note id (128-bit random, 32 hex chars)
pub fn generate_note_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Parse a stored or received note list.
///
/// Blank input is an empty list. Anything that is not a JSON array of notes
/// is an error; callers on read paths decide whether to treat that as empty.
pub fn parse_note_list(content: &str) -> NoteResult<Vec<Note>> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(content)?)
}

/// Serialize a note list the way it is stored on disk
pub fn encode_note_list(notes: &[Note]) -> NoteResult<String> {
    Ok(serde_json::to_string_pretty(notes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_at(id: &str, updated_at: i64) -> Note {
        Note {
            id: id.to_string(),
            title: "t".to_string(),
            content: "c".to_string(),
            created_at: 0,
            updated_at,
        }
    }

    #[test]
    fn test_note_creation() {
        let note = Note::new("Groceries", "milk, eggs");

        assert_eq!(note.title, "Groceries");
        assert_eq!(note.content, "milk, eggs");
        assert_eq!(note.created_at, note.updated_at);
        assert!(note.created_at > 0);
    }

    #[test]
    fn test_id_format() {
        let note = Note::new("a", "b");
        assert_eq!(note.id.len(), 32);
        assert!(note.id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(note.id, Note::new("a", "b").id);
    }

    #[test]
    fn test_with_changes_keeps_identity() {
        let original = Note::new("before", "old body");
        let edited = original.with_changes("after", "new body");

        assert_eq!(edited.id, original.id);
        assert_eq!(edited.created_at, original.created_at);
        assert_eq!(edited.title, "after");
        assert_eq!(edited.content, "new body");
        assert!(edited.updated_at > original.updated_at);
    }

    #[test]
    fn test_with_changes_advances_clock_from_future_timestamp() {
        // A note last written by a device whose clock runs ahead
        let mut ahead = Note::new("x", "y");
        ahead.updated_at = now_millis() + 60_000;

        let edited = ahead.with_changes("x", "z");
        assert_eq!(edited.updated_at, ahead.updated_at + 1);
    }

    #[test]
    fn test_is_newer_than_is_strict() {
        assert!(note_at("a", 200).is_newer_than(&note_at("a", 100)));
        assert!(!note_at("a", 100).is_newer_than(&note_at("a", 100)));
        assert!(!note_at("a", 50).is_newer_than(&note_at("a", 100)));
    }

    #[test]
    fn test_wire_field_names() {
        let note = note_at("abc", 5);
        let value = serde_json::to_value(&note).unwrap();

        assert_eq!(value["id"], "abc");
        assert_eq!(value["createdAt"], 0);
        assert_eq!(value["updatedAt"], 5);
        assert!(value.get("updated_at").is_none());
    }

    #[test]
    fn test_parse_ignores_unknown_fields_and_accepts_legacy_ids() {
        let json = r#"[{"id":"1718000000000-4821","title":"t","content":"c",
            "createdAt":1,"updatedAt":2,"pinned":true}]"#;
        let notes = parse_note_list(json).unwrap();

        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, "1718000000000-4821");
        assert_eq!(notes[0].updated_at, 2);
    }

    #[test]
    fn test_parse_blank_is_empty() {
        assert!(parse_note_list("").unwrap().is_empty());
        assert!(parse_note_list("  \n").unwrap().is_empty());
        assert!(parse_note_list("[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed_is_error() {
        assert!(parse_note_list("{not json").is_err());
        assert!(parse_note_list(r#"{"id":"a"}"#).is_err());
    }

    #[test]
    fn test_encode_then_parse_preserves_notes() {
        let notes = vec![note_at("a", 1), note_at("b", 2)];
        let encoded = encode_note_list(&notes).unwrap();
        assert_eq!(parse_note_list(&encoded).unwrap(), notes);
    }

    #[test]
    fn test_with_changes_at_max_timestamp_does_not_overflow() {
        let mut last = Note::new("x", "y");
        last.updated_at = i64::MAX;

        let edited = last.with_changes("x", "z");
        assert_eq!(edited.updated_at, i64::MAX);
    }
}
