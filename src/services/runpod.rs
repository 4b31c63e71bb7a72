//! RunPod serverless adapter.
//!
//! RunPod endpoints have no webhook delivery; polling is the sole status
//! source for these jobs. Image slots are encoded as **raw** base64 with no
//! data-URI prefix — the serverless handlers reject prefixed payloads with
//! an opaque validation error.

use std::time::Duration;

use base64::Engine;
use reqwest::Client;
use serde_json::{json, Map, Value};

use crate::config::AppConfig;
use crate::models::job::{JobRequest, JobStatus, SlotValue};
use crate::services::backend::{decode_json_response, BackendError, JobBackend, PollUpdate};
use crate::workflows::RunPodEndpoint;

#[derive(Debug)]
pub struct RunPodClient {
    http: Client,
    api_key: String,
    endpoint_id: String,
    base_url: String,
    sync_timeout: Duration,
}

impl RunPodClient {
    /// Build an adapter bound to one serverless endpoint. Missing
    /// credentials surface as `Configuration` at first use.
    pub fn from_config(config: &AppConfig, endpoint: RunPodEndpoint) -> Result<Self, BackendError> {
        let api_key = config
            .runpod_api_key
            .clone()
            .ok_or_else(|| BackendError::Configuration("RUNPOD_API_KEY is not set".into()))?;

        let endpoint_id = match endpoint {
            RunPodEndpoint::Upscale => config.runpod_endpoint_id.clone().ok_or_else(|| {
                BackendError::Configuration("RUNPOD_ENDPOINT_ID is not set".into())
            })?,
            RunPodEndpoint::AiTalk => {
                config.runpod_aitalk_endpoint_id.clone().ok_or_else(|| {
                    BackendError::Configuration("RUNPOD_AITALK_ENDPOINT_ID is not set".into())
                })?
            }
        };

        Ok(Self {
            http: Client::new(),
            api_key,
            endpoint_id,
            base_url: config.runpod_base_url.trim_end_matches('/').to_string(),
            sync_timeout: Duration::from_secs(config.sync_timeout_secs),
        })
    }

    pub fn map_provider_status(provider_status: &str) -> JobStatus {
        match provider_status {
            "IN_QUEUE" => JobStatus::Queued,
            "IN_PROGRESS" => JobStatus::Running,
            "COMPLETED" => JobStatus::Completed,
            "FAILED" | "CANCELLED" => JobStatus::Failed,
            _ => JobStatus::Running,
        }
    }

    fn endpoint_url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.endpoint_id, path)
    }

    /// Synchronous run variant: submit and wait for the terminal response
    /// in one call, bounded by the configured deadline. On expiry the
    /// upstream job state is unknown — it may still be running.
    pub async fn submit_sync(&self, request: &JobRequest) -> Result<PollUpdate, BackendError> {
        let payload = self.build_payload(request)?;
        let url = self.endpoint_url("runsync");

        tracing::debug!(
            workflow_id = %request.workflow_id,
            endpoint_id = %self.endpoint_id,
            deadline_secs = self.sync_timeout.as_secs(),
            "Submitting synchronous run to RunPod"
        );

        let result = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.sync_timeout)
            .json(&payload)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Err(BackendError::Timeout(self.sync_timeout)),
            Err(e) => return Err(e.into()),
        };

        let body = decode_json_response(response).await?;
        Ok(Self::update_from_body(body))
    }

    /// Ask RunPod to cancel a job. Never called automatically; stopping the
    /// local watch loop does not cancel the upstream job.
    pub async fn cancel(&self, run_id: &str) -> Result<(), BackendError> {
        let url = self.endpoint_url(&format!("cancel/{run_id}"));

        let response = self.http.post(&url).bearer_auth(&self.api_key).send().await?;
        decode_json_response(response).await?;

        tracing::info!(run_id = %run_id, "Cancelled RunPod job");
        Ok(())
    }

    fn update_from_body(body: Value) -> PollUpdate {
        let provider_status = body.get("status").and_then(Value::as_str).unwrap_or("");
        let error = body
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string);

        PollUpdate {
            status: Self::map_provider_status(provider_status),
            raw_output: body.get("output").cloned(),
            error,
        }
    }
}

#[async_trait::async_trait]
impl JobBackend for RunPodClient {
    fn name(&self) -> &'static str {
        "runpod"
    }

    fn map_status(&self, provider_status: &str) -> JobStatus {
        Self::map_provider_status(provider_status)
    }

    fn build_payload(&self, request: &JobRequest) -> Result<Value, BackendError> {
        let mut input = Map::new();
        for (name, value) in &request.slots {
            let encoded = match value {
                SlotValue::Image { bytes, .. } => {
                    Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
                }
                SlotValue::Text(text) | SlotValue::Choice(text) => Value::String(text.clone()),
                SlotValue::Number(n) => json!(n),
            };
            input.insert(name.clone(), encoded);
        }

        Ok(json!({ "input": input }))
    }

    async fn submit(&self, request: &JobRequest) -> Result<String, BackendError> {
        let payload = self.build_payload(request)?;
        let url = self.endpoint_url("run");

        tracing::debug!(
            workflow_id = %request.workflow_id,
            endpoint_id = %self.endpoint_id,
            "Submitting run to RunPod"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let body = decode_json_response(response).await?;
        body.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| BackendError::Protocol("submission response is missing job id".into()))
    }

    async fn poll_status(&self, run_id: &str) -> Result<PollUpdate, BackendError> {
        let url = self.endpoint_url(&format!("status/{run_id}"));

        let response = self.http.get(&url).bearer_auth(&self.api_key).send().await?;
        let body = decode_json_response(response).await?;
        Ok(Self::update_from_body(body))
    }
}
