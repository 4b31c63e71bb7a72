mod app_state;
mod config;
mod db;
mod models;
mod routes;
mod services;
mod workflows;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use services::webhook_store::{InMemoryWebhookStore, RedisWebhookStore, WebhookStore};

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing genrelay server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!("generation_jobs_total", "Total generation jobs submitted");
    metrics::describe_counter!(
        "generation_jobs_completed",
        "Total generation jobs that completed"
    );
    metrics::describe_counter!(
        "generation_jobs_failed",
        "Total generation jobs that failed"
    );
    metrics::describe_gauge!(
        "generation_jobs_active",
        "Generation jobs currently being watched"
    );
    metrics::describe_histogram!(
        "generation_job_seconds",
        "Time from submission to terminal status"
    );
    metrics::describe_counter!("webhook_deliveries_total", "Webhook deliveries received");

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Webhook record store: Redis when configured, in-process map otherwise
    let retention = Duration::from_secs(config.webhook_retention_secs);
    let webhook_store: Arc<dyn WebhookStore> = match config.redis_url.as_deref() {
        Some(redis_url) => {
            tracing::info!("Using Redis webhook record store");
            Arc::new(
                RedisWebhookStore::new(redis_url, retention)
                    .expect("Failed to initialize Redis webhook store"),
            )
        }
        None => {
            tracing::info!("Using in-memory webhook record store");
            Arc::new(InMemoryWebhookStore::new(retention))
        }
    };

    // Create shared application state
    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(config, db_pool, webhook_store);

    // Build API routes
    let app = Router::new()
        // Static UI (embedded at compile time)
        .route("/", get(|| async { Html(include_str!("../static/index.html")) }))
        .merge(routes::api_router(state))
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES));

    tracing::info!("Starting genrelay on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
