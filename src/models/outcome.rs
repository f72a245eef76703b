//! Per-record and per-batch results of the extraction pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier returned by a content-addressed store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One of the two derivations performed for every object.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Text,
    Metadata,
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::Text => f.write_str("text"),
            Branch::Metadata => f.write_str("metadata"),
        }
    }
}

/// Where in a branch a failure happened.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extraction,
    Publish,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BranchOutcome {
    Published { cid: ContentId },
    Failed { stage: Stage, reason: String },
}

impl BranchOutcome {
    pub fn cid(&self) -> Option<&ContentId> {
        match self {
            BranchOutcome::Published { cid } => Some(cid),
            BranchOutcome::Failed { .. } => None,
        }
    }
}

/// Final state of a single notification record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RecordOutcome {
    pub bucket: String,
    pub key: String,
    pub url: String,
    pub text: BranchOutcome,
    pub metadata: BranchOutcome,
}

impl RecordOutcome {
    /// Number of content identifiers this record produced (0..=2).
    pub fn published(&self) -> usize {
        [&self.text, &self.metadata]
            .into_iter()
            .filter(|b| b.cid().is_some())
            .count()
    }
}

/// Summary of one `POST /new` batch.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BatchReport {
    pub batch_id: Uuid,

    /// Records present in the decoded batch.
    pub received: usize,

    /// Outcomes of the records that were processed, in batch order.
    pub outcomes: Vec<RecordOutcome>,

    /// Records ignored because they were not object-creation events.
    pub skipped: usize,

    /// Records never launched because processing was cancelled.
    pub cancelled: usize,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
