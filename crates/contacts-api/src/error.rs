//! API error handling

use axum::{
    extract::rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new("NOT_FOUND", format!("{resource} not found"))
    }

    pub fn unauthenticated() -> Self {
        Self::new("UNAUTHENTICATED", "Could not validate credentials")
    }

    pub fn forbidden() -> Self {
        Self::new("FORBIDDEN", "FORBIDDEN")
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("could not validate credentials")]
    Unauthenticated,

    #[error("email not confirmed")]
    EmailNotConfirmed,

    #[error("invalid password")]
    InvalidCredentials,

    #[error("invalid refresh token")]
    InvalidRefreshToken,

    #[error("forbidden")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::Unauthenticated => {
                let mut response =
                    (StatusCode::UNAUTHORIZED, Json(ApiError::unauthenticated())).into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                return response;
            }
            AppError::EmailNotConfirmed => (
                StatusCode::UNAUTHORIZED,
                ApiError::new("EMAIL_NOT_CONFIRMED", "Email not confirmed"),
            ),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                ApiError::new("INVALID_CREDENTIALS", "Invalid password"),
            ),
            AppError::InvalidRefreshToken => (
                StatusCode::UNAUTHORIZED,
                ApiError::new("INVALID_REFRESH_TOKEN", "Invalid refresh token"),
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, ApiError::forbidden()),
            AppError::NotFound(resource) => (StatusCode::NOT_FOUND, ApiError::not_found(&resource)),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, ApiError::new("CONFLICT", msg)),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ApiError::new("VALIDATION_ERROR", msg),
            ),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::new("DATABASE_ERROR", "Database operation failed"),
                )
            }
            AppError::Cache(msg) => {
                tracing::error!(error = %msg, "Session cache operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::new("CACHE_ERROR", "Session cache operation failed"),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, ApiError::internal_error())
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<crate::cache::CacheError> for AppError {
    fn from(err: crate::cache::CacheError) -> Self {
        AppError::Cache(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<FormRejection> for AppError {
    fn from(rejection: FormRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<contacts_core::ContactsError> for AppError {
    fn from(err: contacts_core::ContactsError) -> Self {
        use contacts_core::ContactsError;

        match err {
            ContactsError::NotFound(msg) => AppError::NotFound(msg),
            ContactsError::Conflict(msg) => AppError::Conflict(msg),
            ContactsError::ValidationError(msg) => AppError::Validation(msg),
            ContactsError::DatabaseError(msg) => AppError::Database(msg),
            ContactsError::CacheError(msg) => AppError::Cache(msg),
            ContactsError::ConfigError(msg) => {
                AppError::Internal(format!("Configuration error: {msg}"))
            }
            ContactsError::Other(err) => AppError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contacts_core::ContactsError;

    #[test]
    fn test_unauthenticated_sets_bearer_challenge() {
        let response = AppError::Unauthenticated.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::EmailNotConfirmed, StatusCode::UNAUTHORIZED),
            (AppError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (AppError::InvalidRefreshToken, StatusCode::UNAUTHORIZED),
            (AppError::Forbidden, StatusCode::FORBIDDEN),
            (AppError::NotFound("Contact".into()), StatusCode::NOT_FOUND),
            (AppError::Conflict("dup".into()), StatusCode::CONFLICT),
            (AppError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (
                AppError::Database("down".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[tokio::test]
    async fn test_json_rejection_becomes_validation_error() {
        use axum::body::Body;
        use axum::extract::FromRequest;
        use axum::http::Request;

        #[derive(Debug, serde::Deserialize)]
        struct Payload {
            #[allow(dead_code)]
            name: String,
        }

        let request = Request::builder()
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let rejection = Json::<Payload>::from_request(request, &()).await.unwrap_err();
        let error = AppError::from(rejection);
        assert!(matches!(&error, AppError::Validation(msg) if msg.contains("name")));
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_core_error_mapping() {
        assert!(matches!(
            AppError::from(ContactsError::ValidationError("limit".into())),
            AppError::Validation(_)
        ));
        assert!(matches!(
            AppError::from(ContactsError::CacheError("redis".into())),
            AppError::Cache(_)
        ));
        assert!(matches!(
            AppError::from(ContactsError::Conflict("dup".into())),
            AppError::Conflict(_)
        ));
    }
}
