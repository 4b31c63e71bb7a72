pub mod auth;
pub mod health;
pub mod metrics;
pub mod run;
pub mod webhook;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::Serialize;

use crate::app_state::AppState;
use crate::services::auth::AuthError;
use crate::services::backend::BackendError;

/// Error envelope returned by every API route.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Validation(String),

    #[error("unsupported media type: {0}")]
    UnsupportedMedia(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Backend(BackendError::Configuration(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Backend(BackendError::Upstream { .. }) => StatusCode::BAD_GATEWAY,
            ApiError::Backend(BackendError::Protocol(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Backend(BackendError::Http(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Backend(BackendError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Auth(AuthError::InvalidCredentials) => StatusCode::UNAUTHORIZED,
            ApiError::Auth(AuthError::InvalidToken) => StatusCode::UNAUTHORIZED,
            ApiError::Auth(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedMedia(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Assemble the API router. The prometheus scrape route and the global
/// tower layers are attached in `main`, so tests can drive this router
/// directly.
pub fn api_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/v1/run", post(run::submit_run))
        .route("/api/v1/workflows", get(run::list_workflows))
        .route("/api/v1/status/{run_id}", get(run::live_status))
        .route(
            "/api/v1/runs/{run_id}",
            get(run::run_snapshot).delete(run::cancel_run),
        )
        .route("/api/v1/runpod/cancel/{run_id}", post(run::cancel_upstream))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/users", post(auth::create_user))
        // Provider push ingress must stay reachable without a session
        // token; the query side checks the bearer itself.
        .route(
            "/api/v1/webhook",
            post(webhook::ingest).get(webhook::query),
        )
        .merge(protected)
        .with_state(state)
}
