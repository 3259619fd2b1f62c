//! Security audit logging for authentication events
//!
//! All audit events are logged at INFO level with the "audit" target,
//! so they can be filtered and routed separately from application logs:
//!
//! ```text
//! RUST_LOG=audit=info,contacts_api=warn
//! ```

use axum::http::HeaderMap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Security audit events for authentication and authorization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Successful account creation
    RegistrationSuccess {
        user_id: i64,
        email: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Rejected account creation
    RegistrationFailure {
        email: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Successful user login
    LoginSuccess {
        user_id: i64,
        email: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Failed login attempt
    LoginFailure {
        email: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Refresh token exchanged for a new pair
    TokenRefresh {
        user_id: i64,
        email: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// A refresh token that is no longer current was presented;
    /// the stored token has been revoked
    RefreshTokenReuse {
        user_id: i64,
        email: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Email address confirmed through a confirmation link
    EmailConfirmed {
        user_id: i64,
        email: String,
        ip_address: Option<String>,
    },

    /// User logout
    Logout {
        user_id: i64,
        email: String,
        ip_address: Option<String>,
    },

    /// Access denied due to insufficient permissions
    AccessDenied {
        user_id: i64,
        email: String,
        role: String,
        resource: String,
        required_roles: Vec<String>,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Invalid, expired or wrongly scoped token used
    InvalidToken {
        ip_address: Option<String>,
        user_agent: Option<String>,
        reason: String,
    },
}

impl AuditEvent {
    fn summary(&self) -> &'static str {
        match self {
            AuditEvent::RegistrationSuccess { .. } => "Registration successful",
            AuditEvent::RegistrationFailure { .. } => "Registration failed",
            AuditEvent::LoginSuccess { .. } => "Login successful",
            AuditEvent::LoginFailure { .. } => "Login failed",
            AuditEvent::TokenRefresh { .. } => "Token refresh",
            AuditEvent::RefreshTokenReuse { .. } => "Refresh token reuse, session revoked",
            AuditEvent::EmailConfirmed { .. } => "Email confirmed",
            AuditEvent::Logout { .. } => "User logout",
            AuditEvent::AccessDenied { .. } => "Access denied",
            AuditEvent::InvalidToken { .. } => "Invalid token",
        }
    }

    fn email(&self) -> Option<&str> {
        match self {
            AuditEvent::RegistrationSuccess { email, .. }
            | AuditEvent::RegistrationFailure { email, .. }
            | AuditEvent::LoginSuccess { email, .. }
            | AuditEvent::LoginFailure { email, .. }
            | AuditEvent::TokenRefresh { email, .. }
            | AuditEvent::RefreshTokenReuse { email, .. }
            | AuditEvent::EmailConfirmed { email, .. }
            | AuditEvent::Logout { email, .. }
            | AuditEvent::AccessDenied { email, .. } => Some(email),
            AuditEvent::InvalidToken { .. } => None,
        }
    }

    fn ip_address(&self) -> Option<&str> {
        match self {
            AuditEvent::RegistrationSuccess { ip_address, .. }
            | AuditEvent::RegistrationFailure { ip_address, .. }
            | AuditEvent::LoginSuccess { ip_address, .. }
            | AuditEvent::LoginFailure { ip_address, .. }
            | AuditEvent::TokenRefresh { ip_address, .. }
            | AuditEvent::RefreshTokenReuse { ip_address, .. }
            | AuditEvent::EmailConfirmed { ip_address, .. }
            | AuditEvent::Logout { ip_address, .. }
            | AuditEvent::AccessDenied { ip_address, .. }
            | AuditEvent::InvalidToken { ip_address, .. } => ip_address.as_deref(),
        }
    }
}

/// Client metadata captured from the request for audit records
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    /// Client IP address (extracted from request headers)
    pub ip_address: Option<String>,
    /// User agent string (extracted from request headers)
    pub user_agent: Option<String>,
}

impl AuditContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            ip_address: extract_ip_address(headers),
            user_agent: extract_user_agent(headers),
        }
    }
}

/// Log a security audit event with structured fields
///
/// The event is also serialized to JSON in the `event` field for log
/// aggregators:
///
/// ```json
/// {"event_type":"login_success","user_id":42,"email":"user@example.com","ip_address":"192.168.1.1","user_agent":"Mozilla/5.0"}
/// ```
pub fn audit_log(event: &AuditEvent) {
    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    info!(
        target: "audit",
        timestamp = %Utc::now(),
        event = %event_json,
        email = ?event.email(),
        ip_address = ?event.ip_address(),
        "{}",
        event.summary()
    );
}

/// Extract IP address from request headers
///
/// Checks X-Forwarded-For, then X-Real-IP.
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    // First entry of the chain is the client
    if let Some(xff) = headers.get("x-forwarded-for") {
        if let Ok(xff_str) = xff.to_str() {
            if let Some(first_ip) = xff_str.split(',').next() {
                return Some(first_ip.trim().to_string());
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return Some(ip_str.to_string());
        }
    }

    None
}

/// Extract user agent from request headers
pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}
