//! Adapter and lifecycle tests against loopback stubs of the provider HTTP
//! APIs. Everything runs on real sockets with short poll intervals, so the
//! full request/response path — payload building, error taxonomy, status
//! mapping, extraction, reconciliation — is exercised without external
//! services.

mod helpers;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use genrelay::models::job::{JobRequest, JobStatus};
use genrelay::services::backend::{BackendError, JobBackend};
use genrelay::services::lifecycle::{JobLifecycle, LifecycleSettings};
use genrelay::services::runpod::RunPodClient;
use genrelay::services::webhook_store::InMemoryWebhookStore;
use genrelay::workflows::{BackendBinding, RunPodEndpoint};

use helpers::{spawn_stub, test_config, test_state};

fn empty_request() -> JobRequest {
    JobRequest {
        workflow_id: "vellum-upscale".to_string(),
        slots: BTreeMap::new(),
    }
}

fn fast_settings() -> LifecycleSettings {
    LifecycleSettings {
        poll_interval: Duration::from_millis(50),
        job_deadline: Duration::from_secs(10),
    }
}

/// RunPod stub: submission returns a job id, the first two status polls
/// report progress, the third completes with an S3 output.
fn runpod_stub() -> Router {
    let polls = Arc::new(AtomicUsize::new(0));
    Router::new()
        .route(
            "/v2/ep-upscale/run",
            post(|| async { Json(json!({"id": "job-1", "status": "IN_QUEUE"})) }),
        )
        .route(
            "/v2/ep-upscale/status/{id}",
            get(
                |State(polls): State<Arc<AtomicUsize>>, Path(id): Path<String>| async move {
                    let n = polls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Json(json!({"id": id, "status": "IN_PROGRESS"}))
                    } else {
                        Json(json!({
                            "id": id,
                            "status": "COMPLETED",
                            "output": {"s3_url": "https://bucket.s3.amazonaws.com/out.mp4"}
                        }))
                    }
                },
            ),
        )
        .route(
            "/v2/ep-upscale/cancel/{id}",
            post(|Path(id): Path<String>| async move {
                Json(json!({"id": id, "status": "CANCELLED"}))
            }),
        )
        .with_state(polls)
}

async fn runpod_client(base: &str) -> RunPodClient {
    let mut config = test_config();
    config.runpod_base_url = base.to_string();
    RunPodClient::from_config(&config, RunPodEndpoint::Upscale).expect("runpod client")
}

#[tokio::test]
async fn runpod_submit_returns_the_job_id() {
    let addr = spawn_stub(runpod_stub()).await;
    let client = runpod_client(&format!("http://{addr}/v2")).await;

    let run_id = client.submit(&empty_request()).await.unwrap();
    assert_eq!(run_id, "job-1");
}

#[tokio::test]
async fn runpod_quota_rejection_surfaces_as_upstream_error() {
    // Scenario: submission fails with HTTP 500 and a quota message. The
    // caller gets the raw body back and no watch loop is ever started.
    let stub = Router::new().route(
        "/v2/ep-upscale/run",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "quota exceeded") }),
    );
    let addr = spawn_stub(stub).await;
    let client = runpod_client(&format!("http://{addr}/v2")).await;

    let err = client.submit(&empty_request()).await.unwrap_err();
    match err {
        BackendError::Upstream { status, body } => {
            assert_eq!(status, 500);
            assert!(body.contains("quota exceeded"));
        }
        other => panic!("expected Upstream error, got {other:?}"),
    }
}

#[tokio::test]
async fn runpod_submission_without_id_is_a_protocol_error() {
    let stub = Router::new().route(
        "/v2/ep-upscale/run",
        post(|| async { Json(json!({"status": "IN_QUEUE"})) }),
    );
    let addr = spawn_stub(stub).await;
    let client = runpod_client(&format!("http://{addr}/v2")).await;

    let err = client.submit(&empty_request()).await.unwrap_err();
    assert!(matches!(err, BackendError::Protocol(_)));
}

#[tokio::test]
async fn runpod_non_json_body_is_a_protocol_error() {
    let stub = Router::new().route(
        "/v2/ep-upscale/status/{id}",
        get(|| async { "<html>maintenance</html>" }),
    );
    let addr = spawn_stub(stub).await;
    let client = runpod_client(&format!("http://{addr}/v2")).await;

    let err = client.poll_status("job-1").await.unwrap_err();
    assert!(matches!(err, BackendError::Protocol(_)));
}

#[tokio::test]
async fn lifecycle_converges_through_polling() {
    let addr = spawn_stub(runpod_stub()).await;
    let client = Arc::new(runpod_client(&format!("http://{addr}/v2")).await);
    let store = Arc::new(InMemoryWebhookStore::new(Duration::from_secs(3600)));
    let lifecycle = JobLifecycle::new(client, store, fast_settings());

    let submitted = lifecycle.submit(&empty_request()).await.unwrap();
    assert_eq!(submitted.status, JobStatus::Queued);

    let result = lifecycle
        .watch(submitted.run_id, CancellationToken::new(), |_| {})
        .await;

    assert_eq!(result.status, JobStatus::Completed);
    assert_eq!(result.assets.len(), 1);
    assert_eq!(
        result.assets[0].url,
        "https://bucket.s3.amazonaws.com/out.mp4"
    );
    assert_eq!(result.assets[0].filename, "out.mp4");
}

#[tokio::test]
async fn runpod_sync_run_times_out_against_a_slow_endpoint() {
    let stub = Router::new().route(
        "/v2/ep-upscale/runsync",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"id": "job-1", "status": "COMPLETED"}))
        }),
    );
    let addr = spawn_stub(stub).await;

    let mut config = test_config();
    config.runpod_base_url = format!("http://{addr}/v2");
    config.sync_timeout_secs = 1;
    let client = RunPodClient::from_config(&config, RunPodEndpoint::Upscale).unwrap();

    let err = client.submit_sync(&empty_request()).await.unwrap_err();
    assert!(matches!(err, BackendError::Timeout(_)));
}

#[tokio::test]
async fn runpod_cancel_round_trips() {
    let addr = spawn_stub(runpod_stub()).await;
    let client = runpod_client(&format!("http://{addr}/v2")).await;
    client.cancel("job-1").await.unwrap();
}

#[tokio::test]
async fn missing_endpoint_configuration_fails_loudly() {
    let mut config = test_config();
    config.runpod_api_key = None;
    let err = RunPodClient::from_config(&config, RunPodEndpoint::Upscale).unwrap_err();
    assert!(matches!(err, BackendError::Configuration(_)));
}

/// ComfyDeploy stub whose poller never terminates: completion can only
/// arrive through the webhook, which must win the race.
fn comfydeploy_stub() -> Router {
    Router::new()
        .route(
            "/api/run/deployment/queue",
            post(|| async { Json(json!({"run_id": "abc123"})) }),
        )
        .route(
            "/api/run/{id}",
            get(|Path(id): Path<String>| async move {
                Json(json!({"run_id": id, "status": "running"}))
            }),
        )
}

#[tokio::test]
async fn webhook_delivery_completes_a_run_the_poller_still_sees_running() {
    let addr = spawn_stub(comfydeploy_stub()).await;

    let mut config = test_config();
    config.comfydeploy_base_url = format!("http://{addr}");
    let state = test_state(config);
    let app = genrelay::routes::api_router(state.clone());

    let backend = state.backend_for(BackendBinding::ComfyDeploy).unwrap();
    let lifecycle = JobLifecycle::new(backend, state.webhook_store.clone(), fast_settings());

    let watch = tokio::spawn({
        let lifecycle = lifecycle;
        async move {
            lifecycle
                .watch("abc123".to_string(), CancellationToken::new(), |_| {})
                .await
        }
    });

    // Let a few polls observe "running", then push the completion webhook
    // through the public ingress.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let payload = json!({
        "run_id": "abc123",
        "status": "success",
        "outputs": [{"data": {"images": [{"url": "https://cdn.example.com/x.png", "filename": "x.png"}]}}]
    });
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/v1/webhook")
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(payload.to_string()))
        .unwrap();
    let response = tower::ServiceExt::oneshot(app, request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let result = watch.await.unwrap();
    assert_eq!(result.status, JobStatus::Completed);
    assert_eq!(result.assets.len(), 1);
    assert_eq!(result.assets[0].filename, "x.png");
}

#[tokio::test]
async fn comfydeploy_status_vocabulary_round_trips_through_the_adapter() {
    let stub = Router::new().route(
        "/api/run/{id}",
        get(|Path(_): Path<String>| async move {
            Json(json!({"run_id": "abc123", "status": "uploading"}))
        }),
    );
    let addr = spawn_stub(stub).await;

    let mut config = test_config();
    config.comfydeploy_base_url = format!("http://{addr}");
    let state = test_state(config);
    let backend = state.backend_for(BackendBinding::ComfyDeploy).unwrap();

    let update = backend.poll_status("abc123").await.unwrap();
    assert_eq!(update.status, JobStatus::Running);
}
