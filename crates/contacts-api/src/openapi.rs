//! OpenAPI document

use crate::auth::{
    AvatarRequest, CurrentUser, LoginForm, MessageResponse, RequestEmail, SignupRequest,
    TokenResponse, UserResponse,
};
use crate::error::ApiError;
use crate::handlers::{auth, contacts, health, users};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::refresh_handler,
        auth::confirmed_email_handler,
        auth::request_email_handler,
        auth::logout_handler,
        contacts::list_contacts,
        contacts::list_all_contacts,
        contacts::get_contact,
        contacts::create_contact,
        contacts::update_contact,
        contacts::delete_contact,
        users::me_handler,
        users::update_avatar_handler,
        health::health_check,
        health::readiness_check
    ),
    components(
        schemas(
            ApiError,
            SignupRequest,
            LoginForm,
            TokenResponse,
            RequestEmail,
            MessageResponse,
            AvatarRequest,
            UserResponse,
            CurrentUser,
            contacts::ContactBody,
            contacts::ContactUpdateBody,
            contacts::ContactResponse,
            health::HealthResponse,
            health::ReadinessResponse,
            health::ReadinessChecks
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Signup, login, token refresh and email confirmation"),
        (name = "contacts", description = "Per-user contact book"),
        (name = "users", description = "User profile"),
        (name = "health", description = "Liveness and readiness probes")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by protected paths
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
