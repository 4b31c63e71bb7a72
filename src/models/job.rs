use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Canonical lifecycle state of a generation job, independent of any
/// provider's native vocabulary. `Completed` and `Failed` are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Ordering of non-terminal progress, used to pick the more advanced of
    /// two non-terminal signals.
    pub fn rank(self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Running => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }
}

/// One produced media file with a retrievable URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub url: String,
    pub filename: String,
}

/// Value bound to a named input slot of a workflow.
#[derive(Debug, Clone)]
pub enum SlotValue {
    Image { bytes: Vec<u8>, mime: String },
    Text(String),
    Number(f64),
    Choice(String),
}

/// Provider-agnostic description of one generation request. Built once per
/// submission and immutable afterwards.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub workflow_id: String,
    pub slots: BTreeMap<String, SlotValue>,
}

/// Reconciled view of a submitted job. Owned by the lifecycle watcher;
/// immutable once `status` is terminal.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub run_id: String,
    pub status: JobStatus,
    #[serde(rename = "images")]
    pub assets: Vec<MediaAsset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobResult {
    pub fn queued(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            status: JobStatus::Queued,
            assets: Vec::new(),
            error: None,
        }
    }
}
