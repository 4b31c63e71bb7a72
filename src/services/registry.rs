//! In-process registry of watched runs.
//!
//! Each submission registers its run here; the lifecycle watcher writes a
//! fresh snapshot every tick and the UI reads it back cheaply without
//! hitting the provider. The registry enforces the terminal-state latch:
//! once a run's stored status is terminal, no later update is applied.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::models::job::JobResult;
use crate::workflows::BackendBinding;

/// How long terminal runs stay readable before being swept.
const TERMINAL_RETENTION: Duration = Duration::from_secs(60 * 60);

struct RunEntry {
    result: JobResult,
    backend: BackendBinding,
    cancel: CancellationToken,
    updated_at: Instant,
}

#[derive(Default)]
pub struct RunRegistry {
    runs: RwLock<HashMap<String, RunEntry>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly submitted run and hand back the token its
    /// watcher should honor. Terminal entries past retention are swept on
    /// the way in.
    pub fn register(&self, result: JobResult, backend: BackendBinding) -> CancellationToken {
        let cancel = CancellationToken::new();
        let mut runs = self.runs.write().expect("run registry lock poisoned");
        runs.retain(|_, entry| {
            !entry.result.status.is_terminal()
                || entry.updated_at.elapsed() < TERMINAL_RETENTION
        });
        runs.insert(
            result.run_id.clone(),
            RunEntry {
                result,
                backend,
                cancel: cancel.clone(),
                updated_at: Instant::now(),
            },
        );
        cancel
    }

    /// Apply a watcher snapshot. Ignored for unknown runs and for runs that
    /// already latched a terminal state.
    pub fn update(&self, result: &JobResult) {
        let mut runs = self.runs.write().expect("run registry lock poisoned");
        if let Some(entry) = runs.get_mut(&result.run_id) {
            if entry.result.status.is_terminal() {
                return;
            }
            entry.result = result.clone();
            entry.updated_at = Instant::now();
        }
    }

    pub fn snapshot(&self, run_id: &str) -> Option<JobResult> {
        let runs = self.runs.read().expect("run registry lock poisoned");
        runs.get(run_id).map(|entry| entry.result.clone())
    }

    pub fn backend_of(&self, run_id: &str) -> Option<BackendBinding> {
        let runs = self.runs.read().expect("run registry lock poisoned");
        runs.get(run_id).map(|entry| entry.backend)
    }

    /// Stop the watcher loop for a run. This does not cancel the upstream
    /// job. Returns false for unknown runs.
    pub fn cancel(&self, run_id: &str) -> bool {
        let runs = self.runs.read().expect("run registry lock poisoned");
        match runs.get(run_id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::{JobStatus, MediaAsset};

    fn completed(run_id: &str) -> JobResult {
        JobResult {
            run_id: run_id.to_string(),
            status: JobStatus::Completed,
            assets: vec![MediaAsset {
                url: "https://cdn/x.png".to_string(),
                filename: "x.png".to_string(),
            }],
            error: None,
        }
    }

    #[test]
    fn snapshot_tracks_updates() {
        let registry = RunRegistry::new();
        registry.register(JobResult::queued("r1"), BackendBinding::ComfyDeploy);

        let mut running = JobResult::queued("r1");
        running.status = JobStatus::Running;
        registry.update(&running);

        assert_eq!(
            registry.snapshot("r1").unwrap().status,
            JobStatus::Running
        );
    }

    #[test]
    fn terminal_status_latches() {
        let registry = RunRegistry::new();
        registry.register(JobResult::queued("r1"), BackendBinding::ComfyDeploy);
        registry.update(&completed("r1"));

        // A contradictory late signal must not unseat the terminal state.
        let mut late = JobResult::queued("r1");
        late.status = JobStatus::Failed;
        late.error = Some("late poller failure".to_string());
        registry.update(&late);

        let snapshot = registry.snapshot("r1").unwrap();
        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(snapshot.assets.len(), 1);
        assert!(snapshot.error.is_none());
    }

    #[test]
    fn cancel_unknown_run_is_false() {
        let registry = RunRegistry::new();
        assert!(!registry.cancel("missing"));
    }

    #[test]
    fn cancel_fires_the_watcher_token() {
        let registry = RunRegistry::new();
        let token = registry.register(JobResult::queued("r1"), BackendBinding::ComfyDeploy);
        assert!(!token.is_cancelled());
        assert!(registry.cancel("r1"));
        assert!(token.is_cancelled());
    }
}
