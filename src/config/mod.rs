use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string (user accounts)
    pub database_url: String,

    /// Optional Redis connection string; when set, webhook records are kept
    /// in Redis instead of the in-process map
    #[serde(default)]
    pub redis_url: Option<String>,

    /// ComfyDeploy API key
    #[serde(default)]
    pub comfydeploy_api_key: Option<String>,

    /// ComfyDeploy deployment ID for the default workflow
    #[serde(default)]
    pub comfydeploy_deployment_id: Option<String>,

    /// ComfyDeploy API base URL override
    #[serde(default = "default_comfydeploy_base_url")]
    pub comfydeploy_base_url: String,

    /// RunPod API key (shared across endpoints)
    #[serde(default)]
    pub runpod_api_key: Option<String>,

    /// RunPod serverless endpoint ID for the upscale workflow
    #[serde(default)]
    pub runpod_endpoint_id: Option<String>,

    /// RunPod serverless endpoint ID for the talking-head workflow
    #[serde(default)]
    pub runpod_aitalk_endpoint_id: Option<String>,

    /// RunPod API base URL override
    #[serde(default = "default_runpod_base_url")]
    pub runpod_base_url: String,

    /// Public base URL of this service, used to build the webhook callback
    /// URL handed to ComfyDeploy. Webhook delivery is disabled when unset;
    /// status then converges through polling alone.
    #[serde(default)]
    pub webhook_base_url: Option<String>,

    /// HS256 secret for session tokens
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// Static API key guarding the user-creation endpoint
    #[serde(default)]
    pub admin_api_key: Option<String>,

    /// Cadence of the status reconciliation loop, in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Overall deadline for a watched job before it is surfaced as failed,
    /// in seconds
    #[serde(default = "default_job_deadline_secs")]
    pub job_deadline_secs: u64,

    /// Retention window for stored webhook records, in seconds
    #[serde(default = "default_webhook_retention_secs")]
    pub webhook_retention_secs: u64,

    /// Deadline for the synchronous RunPod run variant, in seconds
    #[serde(default = "default_sync_timeout_secs")]
    pub sync_timeout_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_comfydeploy_base_url() -> String {
    "https://api.comfydeploy.com".to_string()
}

fn default_runpod_base_url() -> String {
    "https://api.runpod.ai/v2".to_string()
}

fn default_poll_interval_secs() -> u64 {
    3
}

fn default_job_deadline_secs() -> u64 {
    30 * 60
}

fn default_webhook_retention_secs() -> u64 {
    60 * 60
}

fn default_sync_timeout_secs() -> u64 {
    5 * 60
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
