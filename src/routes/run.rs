use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use axum::extract::{Multipart, Path, State};
use axum::Json;

use crate::app_state::AppState;
use crate::models::job::{JobRequest, JobResult, JobStatus, SlotValue};
use crate::models::run::{RunSubmitResponse, StatusResponse};
use crate::routes::ApiError;
use crate::services::backend::JobBackend;
use crate::services::extract::extract_assets;
use crate::workflows::{self, BackendBinding, SlotKind, WorkflowSpec};

/// POST /api/v1/run — submit a generation job.
///
/// Multipart body: one part per input slot, plus an optional `workflow_id`
/// part selecting the catalog entry (the default workflow otherwise).
/// On success the run is registered and a lifecycle watcher starts
/// reconciling its status in the background.
pub async fn submit_run(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<RunSubmitResponse>, ApiError> {
    let (workflow, request) = parse_submission(multipart).await?;

    let lifecycle = state.lifecycle_for(workflow.backend)?;
    let submitted = lifecycle.submit(&request).await?;

    metrics::counter!("generation_jobs_total").increment(1);
    metrics::gauge!("generation_jobs_active").increment(1.0);

    let run_id = submitted.run_id.clone();
    let cancel = state.registry.register(submitted, workflow.backend);
    let registry = state.registry.clone();

    tokio::spawn({
        let run_id = run_id.clone();
        async move {
            let started = Instant::now();
            let final_result = lifecycle
                .watch(run_id, cancel, |snapshot| registry.update(snapshot))
                .await;
            registry.update(&final_result);

            metrics::gauge!("generation_jobs_active").decrement(1.0);
            metrics::histogram!("generation_job_seconds")
                .record(started.elapsed().as_secs_f64());
            match final_result.status {
                JobStatus::Completed => {
                    metrics::counter!("generation_jobs_completed").increment(1)
                }
                JobStatus::Failed => metrics::counter!("generation_jobs_failed").increment(1),
                // Cancelled before reaching a terminal state.
                _ => {}
            }
        }
    });

    Ok(Json(RunSubmitResponse {
        success: true,
        run_id,
    }))
}

/// GET /api/v1/workflows — the catalog, as the form UI renders it.
pub async fn list_workflows() -> Json<serde_json::Value> {
    let items: Vec<_> = workflows::catalog()
        .iter()
        .map(|workflow| {
            serde_json::json!({
                "id": workflow.id,
                "name": workflow.name,
                "description": workflow.description,
                "slots": workflow.slots.iter().map(|slot| {
                    serde_json::json!({
                        "name": slot.name,
                        "kind": match slot.kind {
                            SlotKind::Image => "image",
                            SlotKind::Text => "text",
                            SlotKind::Number { .. } => "number",
                            SlotKind::Choice { .. } => "choice",
                        },
                        "required": slot.required,
                        "default": slot.default,
                    })
                }).collect::<Vec<_>>(),
            })
        })
        .collect();
    Json(serde_json::json!({ "workflows": items }))
}

/// GET /api/v1/status/{run_id} — one live upstream poll, normalized.
pub async fn live_status(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    // Runs submitted through this instance carry their backend binding in
    // the registry; anything else is assumed to be an orchestration run.
    let binding = state
        .registry
        .backend_of(&run_id)
        .unwrap_or(BackendBinding::ComfyDeploy);
    let backend = state.backend_for(binding)?;

    let update = backend.poll_status(&run_id).await?;
    let images = if update.status == JobStatus::Completed {
        update
            .raw_output
            .as_ref()
            .map(extract_assets)
            .filter(|assets| !assets.is_empty())
    } else {
        None
    };

    Ok(Json(StatusResponse {
        run_id,
        status: update.status,
        images,
        error: update.error,
    }))
}

/// GET /api/v1/runs/{run_id} — current watcher snapshot.
pub async fn run_snapshot(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<JobResult>, ApiError> {
    state
        .registry
        .snapshot(&run_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("unknown run {run_id}")))
}

/// DELETE /api/v1/runs/{run_id} — stop the watcher loop. The upstream job
/// keeps running; use the provider cancel route to stop it there too.
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.registry.cancel(&run_id) {
        return Err(ApiError::NotFound(format!("unknown run {run_id}")));
    }
    Ok(Json(serde_json::json!({ "success": true })))
}

/// POST /api/v1/runpod/cancel/{run_id} — cancel the job upstream.
pub async fn cancel_upstream(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(binding) = state.registry.backend_of(&run_id) else {
        return Err(ApiError::NotFound(format!("unknown run {run_id}")));
    };
    let BackendBinding::RunPod(endpoint) = binding else {
        return Err(ApiError::Validation(
            "upstream cancellation is only available for serverless runs".to_string(),
        ));
    };

    state.runpod(endpoint)?.cancel(&run_id).await?;
    state.registry.cancel(&run_id);
    Ok(Json(serde_json::json!({ "success": true })))
}

/// Collect multipart parts and shape them into a canonical job request
/// according to the workflow's slot declarations.
async fn parse_submission(
    mut multipart: Multipart,
) -> Result<(&'static WorkflowSpec, JobRequest), ApiError> {
    let mut files: HashMap<String, (Vec<u8>, Option<String>)> = HashMap::new();
    let mut texts: HashMap<String, String> = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("malformed multipart body: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if field.file_name().is_some() {
            let mime = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::Validation(format!("failed to read {name}: {e}")))?;
            if !bytes.is_empty() {
                files.insert(name, (bytes.to_vec(), mime));
            }
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::Validation(format!("failed to read {name}: {e}")))?;
            texts.insert(name, value);
        }
    }

    let workflow = match texts.remove("workflow_id") {
        Some(id) => workflows::find(&id)
            .ok_or_else(|| ApiError::Validation(format!("unknown workflow {id}")))?,
        None => workflows::default_workflow(),
    };

    let mut slots = BTreeMap::new();
    for slot in workflow.slots {
        match slot.kind {
            SlotKind::Image => {
                let Some((bytes, mime)) = files.remove(slot.name) else {
                    if slot.required {
                        return Err(ApiError::Validation(format!(
                            "{} is required",
                            slot.name
                        )));
                    }
                    continue;
                };
                // Reject anything that does not decode as a known raster
                // format before it is shipped upstream.
                let format = image::guess_format(&bytes)
                    .map_err(|_| ApiError::UnsupportedMedia(slot.name.to_string()))?;
                let mime = mime.unwrap_or_else(|| format.to_mime_type().to_string());
                slots.insert(slot.name.to_string(), SlotValue::Image { bytes, mime });
            }
            SlotKind::Text => {
                let value = texts
                    .remove(slot.name)
                    .filter(|v| !v.trim().is_empty())
                    .or_else(|| slot.default.map(str::to_string));
                match value {
                    Some(value) => {
                        slots.insert(slot.name.to_string(), SlotValue::Text(value));
                    }
                    None if slot.required => {
                        return Err(ApiError::Validation(format!(
                            "{} is required",
                            slot.name
                        )));
                    }
                    None => {}
                }
            }
            SlotKind::Number { min, max } => {
                let raw = texts
                    .remove(slot.name)
                    .or_else(|| slot.default.map(str::to_string));
                match raw {
                    Some(raw) => {
                        let value: f64 = raw.parse().map_err(|_| {
                            ApiError::Validation(format!("{} must be a number", slot.name))
                        })?;
                        if !(min..=max).contains(&value) {
                            return Err(ApiError::Validation(format!(
                                "{} must be between {min} and {max}",
                                slot.name
                            )));
                        }
                        slots.insert(slot.name.to_string(), SlotValue::Number(value));
                    }
                    None if slot.required => {
                        return Err(ApiError::Validation(format!(
                            "{} is required",
                            slot.name
                        )));
                    }
                    None => {}
                }
            }
            SlotKind::Choice { options } => {
                let value = texts
                    .remove(slot.name)
                    .filter(|v| !v.is_empty())
                    .or_else(|| slot.default.map(str::to_string));
                match value {
                    Some(value) => {
                        if !options.contains(&value.as_str()) {
                            return Err(ApiError::Validation(format!(
                                "{} must be one of: {}",
                                slot.name,
                                options.join(", ")
                            )));
                        }
                        slots.insert(slot.name.to_string(), SlotValue::Choice(value));
                    }
                    None if slot.required => {
                        return Err(ApiError::Validation(format!(
                            "{} is required",
                            slot.name
                        )));
                    }
                    None => {}
                }
            }
        }
    }

    Ok((
        workflow,
        JobRequest {
            workflow_id: workflow.id.to_string(),
            slots,
        },
    ))
}
