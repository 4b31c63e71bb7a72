use axum::extract::{Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app_state::AppState;
use crate::routes::ApiError;
use crate::services::auth::{bearer_token, AuthError};
use crate::services::comfydeploy::ComfyDeployClient;
use crate::services::extract::extract_assets;
use crate::services::webhook_store::{WebhookRecord, WebhookStore};

/// POST /api/v1/webhook — provider push ingress.
///
/// Best effort: any payload that parses as JSON is acknowledged with
/// `{"success": true}`, even when its shape is unrecognized. Redelivery
/// upserts — one record per run, never two.
pub async fn ingest(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    metrics::counter!("webhook_deliveries_total").increment(1);

    let Some(run_id) = payload.get("run_id").and_then(Value::as_str) else {
        tracing::warn!("Webhook payload without run_id, ignoring");
        return Ok(Json(serde_json::json!({ "success": true })));
    };

    let provider_status = payload.get("status").and_then(Value::as_str).unwrap_or("");
    let record = WebhookRecord {
        run_id: run_id.to_string(),
        status: ComfyDeployClient::map_provider_status(provider_status),
        assets: extract_assets(&payload),
        error: payload
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string),
    };

    tracing::info!(
        run_id = %record.run_id,
        provider_status = %provider_status,
        status = %record.status,
        assets = record.assets.len(),
        "Webhook received"
    );

    state
        .webhook_store
        .upsert(record)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to store webhook record: {e}")))?;

    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct WebhookQuery {
    #[serde(alias = "runId")]
    pub run_id: String,
}

/// Either the stored record or the pending sentinel — absence of a record
/// during the queued/running window is a normal state, not an error.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum WebhookQueryResponse {
    Record(WebhookRecord),
    Pending { status: &'static str },
}

/// GET /api/v1/webhook?run_id=... — read back a stored record.
///
/// Shares its path with the public ingress, so the session gate is applied
/// here instead of via the protected-router middleware.
pub async fn query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<WebhookQuery>,
) -> Result<Json<WebhookQueryResponse>, ApiError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .ok_or(ApiError::Auth(AuthError::InvalidToken))?;
    state.auth.verify_token(token)?;

    let record = match state.webhook_store.get(&params.run_id).await {
        Ok(record) => record,
        Err(e) => {
            // A store hiccup must read as "nothing yet", not as a failure.
            tracing::warn!(run_id = %params.run_id, error = %e, "Webhook store read failed");
            None
        }
    };

    Ok(Json(match record {
        Some(record) => WebhookQueryResponse::Record(record),
        None => WebhookQueryResponse::Pending { status: "pending" },
    }))
}
