use serde::Serialize;

use crate::models::job::{JobStatus, MediaAsset};

/// Response after submitting a job.
#[derive(Debug, Serialize)]
pub struct RunSubmitResponse {
    pub success: bool,
    pub run_id: String,
}

/// Normalized live status, assembled from one upstream poll.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub run_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<MediaAsset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
