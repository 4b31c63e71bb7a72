//! Provider adapter contract.
//!
//! Each upstream execution provider implements [`JobBackend`]: build a
//! provider-specific payload from a canonical [`JobRequest`], submit it,
//! and translate the provider's status vocabulary and output shape into
//! the canonical ones. Adapters make exactly one outbound HTTP call per
//! invocation and never retry; re-polling is the lifecycle watcher's job.

use std::time::Duration;

use async_trait::async_trait;

use crate::models::job::{JobRequest, JobStatus};

/// Errors surfaced by a provider adapter.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Required credentials or endpoint identifiers are absent. Fatal,
    /// surfaced to the caller immediately, never retried.
    #[error("backend configuration error: {0}")]
    Configuration(String),

    /// Provider replied with a non-2xx status.
    #[error("upstream returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Provider replied with something we could not interpret (non-JSON
    /// body, missing run identifier, ...).
    #[error("unexpected upstream response: {0}")]
    Protocol(String),

    /// The synchronous run variant exceeded its deadline. The upstream job
    /// state is unknown and may still be running.
    #[error("upstream request exceeded the {0:?} deadline")]
    Timeout(Duration),

    /// Transport-level failure before any HTTP status was received.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// One normalized status observation from a provider.
#[derive(Debug, Clone)]
pub struct PollUpdate {
    pub status: JobStatus,
    /// Raw provider output object, fed to the output extractor. Present
    /// only when the provider attached one.
    pub raw_output: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Contract every execution provider adapter fulfils.
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Short provider name for logs and metrics labels.
    fn name(&self) -> &'static str;

    /// Map the provider's native status vocabulary onto the canonical set.
    /// Total: unrecognized values map to `Running`, never to a terminal
    /// state, so shape drift cannot fabricate a completion.
    fn map_status(&self, provider_status: &str) -> JobStatus;

    /// Translate canonical slots into the provider's submission body.
    fn build_payload(&self, request: &JobRequest) -> Result<serde_json::Value, BackendError>;

    /// Submit a job, returning the provider-issued run handle.
    async fn submit(&self, request: &JobRequest) -> Result<String, BackendError>;

    /// Ask the provider for the current status of a run.
    async fn poll_status(&self, run_id: &str) -> Result<PollUpdate, BackendError>;
}

/// Decode a provider response: non-2xx becomes `Upstream` with the raw
/// body, a body that is not JSON becomes `Protocol`.
pub(crate) async fn decode_json_response(
    response: reqwest::Response,
) -> Result<serde_json::Value, BackendError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(BackendError::Upstream {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body)
        .map_err(|e| BackendError::Protocol(format!("invalid JSON body: {e}")))
}
