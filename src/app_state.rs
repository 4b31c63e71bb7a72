use std::sync::{Arc, OnceLock};

use sqlx::PgPool;

use crate::config::AppConfig;
use crate::services::auth::AuthService;
use crate::services::backend::{BackendError, JobBackend};
use crate::services::comfydeploy::ComfyDeployClient;
use crate::services::lifecycle::{JobLifecycle, LifecycleSettings};
use crate::services::registry::RunRegistry;
use crate::services::runpod::RunPodClient;
use crate::services::webhook_store::WebhookStore;
use crate::workflows::{BackendBinding, RunPodEndpoint};

/// Shared application state passed to all route handlers.
///
/// Provider clients are built lazily on first use so that a deployment with
/// only one provider configured boots fine; a submission against the
/// unconfigured one surfaces `BackendError::Configuration` at that point.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: PgPool,
    pub webhook_store: Arc<dyn WebhookStore>,
    pub registry: Arc<RunRegistry>,
    pub auth: Arc<AuthService>,
    pub lifecycle_settings: LifecycleSettings,
    comfydeploy: Arc<OnceLock<Arc<ComfyDeployClient>>>,
    runpod_upscale: Arc<OnceLock<Arc<RunPodClient>>>,
    runpod_aitalk: Arc<OnceLock<Arc<RunPodClient>>>,
}

impl AppState {
    pub fn new(config: AppConfig, db: PgPool, webhook_store: Arc<dyn WebhookStore>) -> Self {
        let lifecycle_settings = LifecycleSettings::from_config(&config);
        let auth = Arc::new(AuthService::from_config(&config));
        Self {
            config: Arc::new(config),
            db,
            webhook_store,
            registry: Arc::new(RunRegistry::new()),
            auth,
            lifecycle_settings,
            comfydeploy: Arc::new(OnceLock::new()),
            runpod_upscale: Arc::new(OnceLock::new()),
            runpod_aitalk: Arc::new(OnceLock::new()),
        }
    }

    fn comfydeploy(&self) -> Result<Arc<ComfyDeployClient>, BackendError> {
        if let Some(client) = self.comfydeploy.get() {
            return Ok(client.clone());
        }
        let client = Arc::new(ComfyDeployClient::from_config(&self.config)?);
        // Another task may have initialized between our get() and set().
        let _ = self.comfydeploy.set(client);
        Ok(self.comfydeploy.get().expect("just initialized").clone())
    }

    /// Concrete RunPod client for one endpoint, also used by the upstream
    /// cancel route.
    pub fn runpod(&self, endpoint: RunPodEndpoint) -> Result<Arc<RunPodClient>, BackendError> {
        let cell = match endpoint {
            RunPodEndpoint::Upscale => &self.runpod_upscale,
            RunPodEndpoint::AiTalk => &self.runpod_aitalk,
        };
        if let Some(client) = cell.get() {
            return Ok(client.clone());
        }
        let client = Arc::new(RunPodClient::from_config(&self.config, endpoint)?);
        let _ = cell.set(client);
        Ok(cell.get().expect("just initialized").clone())
    }

    pub fn backend_for(&self, binding: BackendBinding) -> Result<Arc<dyn JobBackend>, BackendError> {
        Ok(match binding {
            BackendBinding::ComfyDeploy => self.comfydeploy()? as Arc<dyn JobBackend>,
            BackendBinding::RunPod(endpoint) => self.runpod(endpoint)? as Arc<dyn JobBackend>,
        })
    }

    pub fn lifecycle_for(&self, binding: BackendBinding) -> Result<JobLifecycle, BackendError> {
        Ok(JobLifecycle::new(
            self.backend_for(binding)?,
            self.webhook_store.clone(),
            self.lifecycle_settings,
        ))
    }
}
