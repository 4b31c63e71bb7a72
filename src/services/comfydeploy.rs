//! ComfyDeploy adapter.
//!
//! Submits workflow runs against a ComfyDeploy deployment and reads run
//! status back. ComfyDeploy pushes completion webhooks when a callback URL
//! is attached at submission time, so polling is the fallback source for
//! this provider. Image slots are encoded as base64 **data URIs**; sending
//! raw base64 here makes the deployment fail validation upstream.

use base64::Engine;
use reqwest::Client;
use serde_json::{json, Map, Value};

use crate::config::AppConfig;
use crate::models::job::{JobRequest, JobStatus, SlotValue};
use crate::services::backend::{decode_json_response, BackendError, JobBackend, PollUpdate};

pub struct ComfyDeployClient {
    http: Client,
    api_key: String,
    deployment_id: String,
    base_url: String,
    webhook_url: Option<String>,
}

impl ComfyDeployClient {
    /// Build from environment configuration. Missing credentials surface as
    /// `Configuration` at first use, not at process start.
    pub fn from_config(config: &AppConfig) -> Result<Self, BackendError> {
        let api_key = config
            .comfydeploy_api_key
            .clone()
            .ok_or_else(|| BackendError::Configuration("COMFYDEPLOY_API_KEY is not set".into()))?;
        let deployment_id = config.comfydeploy_deployment_id.clone().ok_or_else(|| {
            BackendError::Configuration("COMFYDEPLOY_DEPLOYMENT_ID is not set".into())
        })?;

        let webhook_url = config
            .webhook_base_url
            .as_deref()
            .map(|base| format!("{}/api/v1/webhook", base.trim_end_matches('/')));

        Ok(Self {
            http: Client::new(),
            api_key,
            deployment_id,
            base_url: config.comfydeploy_base_url.trim_end_matches('/').to_string(),
            webhook_url,
        })
    }

    /// Map one provider status string onto the canonical set, without an
    /// adapter instance. Shared with the webhook receiver, which normalizes
    /// pushed payloads through the same table.
    pub fn map_provider_status(provider_status: &str) -> JobStatus {
        match provider_status {
            "success" => JobStatus::Completed,
            // "timeout" is terminal on the provider side; leaving it
            // non-terminal would poll a dead run forever.
            "failed" | "timeout" => JobStatus::Failed,
            "queued" | "not-started" => JobStatus::Queued,
            "started" | "running" | "uploading" => JobStatus::Running,
            _ => JobStatus::Running,
        }
    }
}

#[async_trait::async_trait]
impl JobBackend for ComfyDeployClient {
    fn name(&self) -> &'static str {
        "comfydeploy"
    }

    fn map_status(&self, provider_status: &str) -> JobStatus {
        Self::map_provider_status(provider_status)
    }

    fn build_payload(&self, request: &JobRequest) -> Result<Value, BackendError> {
        let mut inputs = Map::new();
        for (name, value) in &request.slots {
            let encoded = match value {
                SlotValue::Image { bytes, mime } => {
                    let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
                    Value::String(format!("data:{mime};base64,{b64}"))
                }
                SlotValue::Text(text) | SlotValue::Choice(text) => Value::String(text.clone()),
                SlotValue::Number(n) => json!(n),
            };
            inputs.insert(name.clone(), encoded);
        }

        let mut payload = json!({
            "deployment_id": self.deployment_id,
            "inputs": inputs,
        });
        if let Some(webhook) = &self.webhook_url {
            payload["webhook"] = Value::String(webhook.clone());
        }
        Ok(payload)
    }

    async fn submit(&self, request: &JobRequest) -> Result<String, BackendError> {
        let payload = self.build_payload(request)?;
        let url = format!("{}/api/run/deployment/queue", self.base_url);

        tracing::debug!(
            workflow_id = %request.workflow_id,
            deployment_id = %self.deployment_id,
            webhook = self.webhook_url.is_some(),
            "Submitting run to ComfyDeploy"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let body = decode_json_response(response).await?;
        body.get("run_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| BackendError::Protocol("submission response is missing run_id".into()))
    }

    async fn poll_status(&self, run_id: &str) -> Result<PollUpdate, BackendError> {
        let url = format!("{}/api/run/{}", self.base_url, run_id);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let body = decode_json_response(response).await?;
        let status =
            self.map_status(body.get("status").and_then(Value::as_str).unwrap_or(""));
        let error = body
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(PollUpdate {
            status,
            raw_output: Some(body),
            error,
        })
    }
}
