//! Request and response models for authentication and user endpoints

use contacts_core::{Role, User};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Identity resolved by the authentication gate
///
/// Also the value stored in the session cache, so it never carries the
/// password hash or the refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub avatar: Option<String>,
    #[schema(value_type = String, example = "user")]
    pub role: Role,
    pub confirmed: bool,
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            avatar: user.avatar.clone(),
            role: user.role,
            confirmed: user.confirmed,
        }
    }
}

/// Signup request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SignupRequest {
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    #[validate(email, length(max = 255))]
    pub email: String,
    #[validate(length(min = 6, max = 18))]
    pub password: String,
}

/// OAuth2 password form; `username` carries the email address
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Token pair returned by login and refresh
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Always "bearer"
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String, refresh_token: String) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
        }
    }
}

/// Request for a new confirmation email
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RequestEmail {
    #[validate(email)]
    pub email: String,
}

/// Avatar update request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AvatarRequest {
    #[validate(url, length(max = 255))]
    pub avatar_url: String,
}

/// Public user profile
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub avatar: Option<String>,
    #[schema(value_type = String, example = "user")]
    pub role: Role,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            avatar: user.avatar.clone(),
            role: user.role,
        }
    }
}

impl From<&CurrentUser> for UserResponse {
    fn from(user: &CurrentUser) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            avatar: user.avatar.clone(),
            role: user.role,
        }
    }
}

/// Plain message response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
