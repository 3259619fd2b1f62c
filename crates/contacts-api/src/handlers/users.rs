//! User profile handlers

use crate::auth::{AvatarRequest, CurrentUser, UserResponse};
use crate::error::AppError;
use crate::extract::JsonBody;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Extension, Json};
use std::sync::Arc;
use validator::Validate;

/// Get current user profile
#[utoipa::path(
    get,
    path = "/api/users/me",
    tag = "users",
    responses(
        (status = 200, description = "Current user profile", body = UserResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn me_handler(Extension(user): Extension<CurrentUser>) -> impl IntoResponse {
    Json(UserResponse::from(&user))
}

/// Replace the caller's avatar URL
#[utoipa::path(
    patch,
    path = "/api/users/avatar",
    tag = "users",
    request_body = AvatarRequest,
    responses(
        (status = 200, description = "Avatar updated", body = UserResponse),
        (status = 400, description = "Invalid URL", body = crate::error::ApiError),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_avatar_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    JsonBody(request): JsonBody<AvatarRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;
    let updated = state.auth.update_avatar(&user, &request.avatar_url).await?;

    Ok(Json(UserResponse::from(&updated)))
}
