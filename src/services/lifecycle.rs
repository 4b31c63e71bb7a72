//! Job lifecycle watcher.
//!
//! One watcher runs per submitted job. It races two independent status
//! sources — the webhook record store (push) and the provider's status
//! endpoint (pull) — at a fixed cadence until one of them reports a
//! terminal state.
//!
//! Correctness rules:
//! - first-terminal-wins: the first source to report `completed`/`failed`
//!   is authoritative; later contradictory signals are discarded;
//! - the webhook store is consulted before the poller on every tick, so a
//!   webhook arriving in the same tick as a poller terminal wins the tie;
//! - errors from either source during a tick are logged and swallowed; a
//!   transient failure must never abort a job that is still in flight;
//! - the loop is cooperative: a cancellation token is honored between
//!   ticks, and cancelling the loop does not cancel the upstream job.
//!
//! A configurable overall deadline bounds the loop so a stuck upstream job
//! cannot be polled forever; expiry is surfaced as `failed`.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::models::job::{JobRequest, JobResult, JobStatus};
use crate::services::backend::{BackendError, JobBackend};
use crate::services::extract::extract_assets;
use crate::services::webhook_store::WebhookStore;

#[derive(Debug, Clone, Copy)]
pub struct LifecycleSettings {
    /// Cadence of the reconciliation loop.
    pub poll_interval: Duration,
    /// Overall deadline before a run is surfaced as failed.
    pub job_deadline: Duration,
}

impl LifecycleSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            job_deadline: Duration::from_secs(config.job_deadline_secs),
        }
    }
}

pub struct JobLifecycle {
    backend: Arc<dyn JobBackend>,
    store: Arc<dyn WebhookStore>,
    settings: LifecycleSettings,
}

impl JobLifecycle {
    pub fn new(
        backend: Arc<dyn JobBackend>,
        store: Arc<dyn WebhookStore>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            backend,
            store,
            settings,
        }
    }

    /// Submit the request upstream. A submission error aborts the job
    /// immediately — no watch loop is started for it.
    pub async fn submit(&self, request: &JobRequest) -> Result<JobResult, BackendError> {
        let run_id = self.backend.submit(request).await?;
        tracing::info!(
            run_id = %run_id,
            backend = self.backend.name(),
            workflow_id = %request.workflow_id,
            "Run submitted"
        );
        Ok(JobResult::queued(run_id))
    }

    /// Reconcile one run until it reaches a terminal state, the deadline
    /// expires, or the token is cancelled. `progress` is invoked with every
    /// snapshot, including the final one.
    pub async fn watch<F>(
        &self,
        run_id: String,
        cancel: CancellationToken,
        mut progress: F,
    ) -> JobResult
    where
        F: FnMut(&JobResult) + Send,
    {
        let mut result = JobResult::queued(run_id);
        let deadline = Instant::now() + self.settings.job_deadline;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(run_id = %result.run_id, "Watch cancelled before terminal state");
                    return result;
                }
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }

            if Instant::now() >= deadline {
                result.status = JobStatus::Failed;
                result.error = Some(format!(
                    "no terminal status after {}s; giving up (the upstream job may still be running)",
                    self.settings.job_deadline.as_secs()
                ));
                tracing::warn!(run_id = %result.run_id, "Watch deadline expired");
                progress(&result);
                return result;
            }

            // Webhook record first: it wins any tie against the poller.
            match self.store.get(&result.run_id).await {
                Ok(Some(record)) => {
                    if record.status.is_terminal() {
                        result.status = record.status;
                        result.assets = record.assets;
                        result.error = record.error;
                        tracing::info!(
                            run_id = %result.run_id,
                            status = %result.status,
                            assets = result.assets.len(),
                            "Terminal status adopted from webhook"
                        );
                        progress(&result);
                        return result;
                    }
                    advance(&mut result, record.status);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(run_id = %result.run_id, error = %e, "Webhook store read failed, continuing");
                }
            }

            // Poller fallback.
            match self.backend.poll_status(&result.run_id).await {
                Ok(update) => {
                    if update.status.is_terminal() {
                        result.status = update.status;
                        if update.status == JobStatus::Completed {
                            result.assets = update
                                .raw_output
                                .as_ref()
                                .map(extract_assets)
                                .unwrap_or_default();
                        }
                        result.error = update.error;
                        tracing::info!(
                            run_id = %result.run_id,
                            status = %result.status,
                            assets = result.assets.len(),
                            "Terminal status adopted from poller"
                        );
                        progress(&result);
                        return result;
                    }
                    advance(&mut result, update.status);
                }
                Err(e) => {
                    tracing::warn!(run_id = %result.run_id, error = %e, "Status poll failed, continuing");
                }
            }

            progress(&result);
        }
    }
}

/// Adopt the more advanced of two non-terminal statuses, so the UI can show
/// `running` as soon as either source observes it.
fn advance(result: &mut JobResult, observed: JobStatus) {
    if observed.rank() > result.status.rank() {
        result.status = observed;
    }
}
