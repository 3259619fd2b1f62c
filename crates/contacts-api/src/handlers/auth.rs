//! Authentication API handlers
//!
//! Signup, login, refresh-token rotation, email confirmation and logout.

use crate::audit::AuditContext;
use crate::auth::{
    bearer_token, CurrentUser, LoginForm, MessageResponse, RequestEmail, SignupRequest,
    TokenResponse, UserResponse,
};
use crate::error::AppError;
use crate::extract::{FormBody, JsonBody, PathParam};
use crate::state::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;
use validator::Validate;

/// Register a new user account
///
/// The account starts unconfirmed; a confirmation link is sent to the
/// given address.
#[utoipa::path(
    post,
    path = "/api/auth/signup",
    tag = "auth",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User registered successfully", body = UserResponse),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 409, description = "Account already exists", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    JsonBody(request): JsonBody<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;

    let ctx = AuditContext::from_headers(&headers);
    let user = state.auth.signup(request, &ctx).await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

/// Login with email and password
///
/// OAuth2 password form: `username` carries the email address.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 401, description = "Unknown email, unconfirmed email or invalid password", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    FormBody(form): FormBody<LoginForm>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = AuditContext::from_headers(&headers);
    let pair = state.auth.login(&form.username, &form.password, &ctx).await?;

    Ok(Json(pair))
}

/// Exchange the current refresh token for a new token pair
///
/// The refresh token is sent as the bearer credential. Presenting any
/// token other than the current one revokes the session.
#[utoipa::path(
    get,
    path = "/api/auth/refresh_token",
    tag = "auth",
    responses(
        (status = 200, description = "Token refreshed successfully", body = TokenResponse),
        (status = 401, description = "Invalid refresh token", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let token = bearer_token(&headers).ok_or(AppError::Unauthenticated)?;
    let ctx = AuditContext::from_headers(&headers);
    let pair = state.auth.refresh(token, &ctx).await?;

    Ok(Json(pair))
}

/// Confirm an email address
#[utoipa::path(
    get,
    path = "/api/auth/confirmed_email/{token}",
    tag = "auth",
    params(
        ("token" = String, Path, description = "Email confirmation token")
    ),
    responses(
        (status = 200, description = "Email confirmed", body = MessageResponse),
        (status = 400, description = "Verification error", body = crate::error::ApiError),
        (status = 401, description = "Invalid or expired token", body = crate::error::ApiError),
    )
)]
pub async fn confirmed_email_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    PathParam(token): PathParam<String>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = AuditContext::from_headers(&headers);
    let message = state.auth.confirm_email(&token, &ctx).await?;

    Ok(Json(MessageResponse::new(message)))
}

/// Request a new confirmation email
#[utoipa::path(
    post,
    path = "/api/auth/request_email",
    tag = "auth",
    request_body = RequestEmail,
    responses(
        (status = 200, description = "Confirmation email queued", body = MessageResponse),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
    )
)]
pub async fn request_email_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<RequestEmail>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;
    let message = state.auth.request_email(&request.email).await?;

    Ok(Json(MessageResponse::new(message)))
}

/// Logout current session
///
/// Revokes the stored refresh token. Access tokens stay valid until they expire.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Logout successful", body = MessageResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let ctx = AuditContext::from_headers(&headers);
    state.auth.logout(&user, &ctx).await?;

    Ok(Json(MessageResponse::new("Logged out successfully")))
}
