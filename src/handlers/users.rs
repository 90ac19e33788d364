// handlers/users.rs - account registration and token acquisition

use axum::extract::{rejection::JsonRejection, State};
use axum::Json;

use crate::app::AppState;
use crate::database::models::{LoginRequest, RegisterUser, UserProfile};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::TokenResponse;

/// POST /users/register
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterUser>, JsonRejection>,
) -> ApiResult<UserProfile> {
    let Json(registration) = payload.map_err(|e| ApiError::invalid_json(e.body_text()))?;
    let profile = state.users.register(registration).await?;
    Ok(ApiResponse::created(profile))
}

/**
 * POST /users/login - exchange username and password for a bearer token
 *
 * ```json
 * { "token": "eyJhbGciOiJIUzI1NiI...", "token_type": "bearer", "expires_in": 86400 }
 * ```
 */
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<TokenResponse> {
    let Json(request) = payload.map_err(|e| ApiError::invalid_json(e.body_text()))?;
    Ok(ApiResponse::success(state.users.login(request).await?))
}

/// GET /users/me
pub async fn me(State(state): State<AppState>, user: AuthUser) -> ApiResult<UserProfile> {
    Ok(ApiResponse::success(state.users.profile(user.user_id).await?))
}
