//! Timeline store: the append-only record of what actually happened.
//!
//! Only the session's validate-success path appends here. There is no way
//! to edit or remove an entry once it lands.

use crate::core::path::{OperationId, PathMode};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TimelineEntry {
    pub event_id: String,
    pub ts: String,
    pub mode: PathMode,
    pub operation: OperationId,
    pub payload: JsonValue,
    pub validated_by: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TimelineStore {
    entries: Vec<TimelineEntry>,
}

impl TimelineStore {
    pub fn append(&mut self, entry: TimelineEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
