//! Positional annotation rules and the snapshot value pushed to live clients.
//!
//! A [`Snapshot`] is the full, freshly-read list of a project's annotations
//! at publish time. It is immutable once built and cheap to clone, so the
//! same value can be kept as a topic's last-published state and handed to
//! every connection.

use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::CoreError;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum length of an annotation note, in characters.
pub const MAX_NOTE_LENGTH: usize = 2000;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate an annotation note: non-blank and at most [`MAX_NOTE_LENGTH`] chars.
pub fn validate_note(note: &str) -> Result<(), CoreError> {
    if note.trim().is_empty() {
        return Err(CoreError::Validation("note must not be empty".to_string()));
    }
    let len = note.chars().count();
    if len > MAX_NOTE_LENGTH {
        return Err(CoreError::Validation(format!(
            "note has {len} characters, maximum is {MAX_NOTE_LENGTH}"
        )));
    }
    Ok(())
}

/// Validate the coordinate payload.
///
/// The payload is schema-free, but it must be structured: a JSON object
/// (e.g. `{"x": 0, "y": 0, "z": 1}`) or an array (e.g. `[0, 0, 1]`).
pub fn validate_coordinates(coordinates: &serde_json::Value) -> Result<(), CoreError> {
    if coordinates.is_object() || coordinates.is_array() {
        Ok(())
    } else {
        Err(CoreError::Validation(
            "coordinates must be a JSON object or array".to_string(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The view of one annotation sent over the real-time channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationView {
    pub id: DbId,
    pub note: String,
    pub coordinates: serde_json::Value,
}

/// An ordered, immutable list of annotation views.
///
/// Serializes as a bare JSON array.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    annotations: Arc<[AnnotationView]>,
}

impl Snapshot {
    pub fn new(annotations: Vec<AnnotationView>) -> Self {
        Self {
            annotations: annotations.into(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn annotations(&self) -> &[AnnotationView] {
        &self.annotations
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Encode as the JSON text frame sent to clients.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.annotations.as_ref().serialize(serializer)
    }
}

impl FromIterator<AnnotationView> for Snapshot {
    fn from_iter<I: IntoIterator<Item = AnnotationView>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
