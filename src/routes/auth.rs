use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::db::queries;
use crate::models::user::{
    CreateUserRequest, CreateUserResponse, LoginRequest, LoginResponse,
};
use crate::routes::ApiError;
use crate::services::auth::{bearer_token, AuthError};

/// POST /api/v1/auth/login — exchange credentials for a session token.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    request
        .validate()
        .map_err(|report| ApiError::Validation(report.to_string()))?;

    let found = queries::find_user_by_username(&state.db, &request.username).await?;
    let Some(found) = found else {
        // Same failure as a wrong password; do not reveal which usernames
        // exist.
        return Err(ApiError::Auth(AuthError::InvalidCredentials));
    };

    if !state
        .auth
        .verify_password(&request.password, &found.password_hash)
    {
        return Err(ApiError::Auth(AuthError::InvalidCredentials));
    }

    let token = state.auth.issue_token(&found.user)?;
    tracing::info!(username = %found.user.username, "User logged in");

    Ok(Json(LoginResponse {
        success: true,
        token,
        user: found.user,
    }))
}

/// POST /api/v1/auth/users — create an account. Guarded by the static
/// admin API key, not by a session token.
pub async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<CreateUserResponse>), ApiError> {
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .ok_or(ApiError::Auth(AuthError::InvalidToken))?;
    state.auth.verify_admin_key(presented)?;

    request
        .validate()
        .map_err(|report| ApiError::Validation(report.to_string()))?;

    if queries::username_exists(&state.db, &request.username).await? {
        return Err(ApiError::Conflict(format!(
            "username {} already exists",
            request.username
        )));
    }

    let password_hash = state.auth.hash_password(&request.password)?;
    let user = queries::create_user(
        &state.db,
        &request.username,
        &password_hash,
        request.email.as_deref(),
    )
    .await?;

    tracing::info!(username = %user.username, "User created");

    Ok((
        StatusCode::CREATED,
        Json(CreateUserResponse {
            success: true,
            user,
        }),
    ))
}

/// Session gate applied to the protected routes: a valid bearer token is
/// required, its claims are attached to the request for handlers that want
/// the caller's identity.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .ok_or(ApiError::Auth(AuthError::InvalidToken))?;

    let claims = state.auth.verify_token(token)?;
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}
