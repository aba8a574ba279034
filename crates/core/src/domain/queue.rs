// Enrichment Queue Items

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to an existing library record (never a copy of it)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordRef(String);

impl RecordRef {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RecordRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One pending enrichment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub record_ref: RecordRef,
    pub enqueued_at: i64, // epoch ms
}

impl QueueItem {
    pub fn new(record_ref: RecordRef, enqueued_at: i64) -> Self {
        Self {
            record_ref,
            enqueued_at,
        }
    }
}
