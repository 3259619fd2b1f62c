//! Contacts Core - Domain records, repository traits, and shared types
//!
//! This crate defines the abstractions the API server is built on:
//! - User and contact records
//! - Roles used for route authorization
//! - Common error types
//! - Repository traits for the credential store and the contacts table
//! - Configuration management
//! - PostgreSQL and in-memory store implementations

pub mod config;
pub mod memory;
pub mod postgres;

pub use config::{
    AppConfig, AuthConfig, CacheConfig, ConfigError, DatabaseConfig, RateLimitConfig,
};
pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for store and configuration operations
#[derive(Error, Debug)]
pub enum ContactsError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ContactsError>;

// ============================================================================
// Roles
// ============================================================================

/// Access role attached to every user account
///
/// New accounts start as `User`. Moderators and admins can list every
/// contact in the system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Moderator,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::User, Role::Moderator, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ContactsError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            other => Err(ContactsError::ValidationError(format!(
                "unknown role: {other}"
            ))),
        }
    }
}

// ============================================================================
// Users
// ============================================================================

/// User account as stored in the credential store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Argon2id PHC string, never serialized in responses
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub confirmed: bool,
    /// Current refresh token; at most one is valid per user
    #[serde(skip_serializing, default)]
    pub refresh_token: Option<String>,
    pub avatar: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a user at signup
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub avatar: Option<String>,
}

// ============================================================================
// Contacts
// ============================================================================

/// Address-book entry owned by exactly one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub lastname: String,
    pub email: String,
    pub phone: String,
    pub birthdate: NaiveDate,
    pub others_info: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Writable contact fields, used for both create and full update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactDraft {
    pub name: String,
    pub lastname: String,
    pub email: String,
    pub phone: String,
    pub birthdate: NaiveDate,
    pub others_info: Option<String>,
    pub completed: bool,
}

/// Pagination and search parameters for contact listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactQuery {
    pub limit: i64,
    pub offset: i64,
    /// Case-insensitive substring matched against name, lastname, or email
    pub search: Option<String>,
}

impl Default for ContactQuery {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
            search: None,
        }
    }
}

impl ContactQuery {
    pub const DEFAULT_LIMIT: i64 = 10;
    pub const MIN_LIMIT: i64 = 10;
    pub const MAX_LIMIT: i64 = 500;

    /// Build a query, rejecting out-of-range pagination
    pub fn new(limit: Option<i64>, offset: Option<i64>, search: Option<String>) -> Result<Self> {
        let limit = limit.unwrap_or(Self::DEFAULT_LIMIT);
        if !(Self::MIN_LIMIT..=Self::MAX_LIMIT).contains(&limit) {
            return Err(ContactsError::ValidationError(format!(
                "limit must be between {} and {}",
                Self::MIN_LIMIT,
                Self::MAX_LIMIT
            )));
        }

        let offset = offset.unwrap_or(0);
        if offset < 0 {
            return Err(ContactsError::ValidationError(
                "offset must be greater than or equal to 0".to_string(),
            ));
        }

        let search = search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            limit,
            offset,
            search,
        })
    }

    /// Whether a contact matches the search term
    pub fn matches(&self, contact: &Contact) -> bool {
        match &self.search {
            None => true,
            Some(term) => {
                let term = term.to_lowercase();
                [&contact.name, &contact.lastname, &contact.email]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&term))
            }
        }
    }
}

// ============================================================================
// Repository Traits
// ============================================================================

/// Credential store operations
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Look up a user by email
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Insert a new unconfirmed user; fails with `Conflict` on duplicate email
    async fn create_user(&self, user: NewUser) -> Result<User>;

    /// Overwrite (or clear) the stored refresh token
    async fn update_refresh_token(&self, user_id: i64, token: Option<&str>) -> Result<()>;

    /// Atomically replace the stored refresh token if it equals `presented`
    ///
    /// Returns `false` when the stored token differs, including when a
    /// concurrent caller already rotated it.
    async fn rotate_refresh_token(
        &self,
        user_id: i64,
        presented: &str,
        replacement: &str,
    ) -> Result<bool>;

    /// Set the confirmation flag; idempotent
    async fn confirm_email(&self, email: &str) -> Result<()>;

    /// Replace the avatar URL and return the updated user
    async fn update_avatar(&self, email: &str, url: Option<&str>) -> Result<User>;

    /// Change a user's role and return the updated user
    async fn set_role(&self, email: &str, role: Role) -> Result<User>;

    /// Connectivity check for readiness probes
    async fn ping(&self) -> Result<()>;
}

/// Contact access layer
///
/// Every operation except `list_all` is filtered by owner.
#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn list_contacts(&self, owner_id: i64, query: &ContactQuery) -> Result<Vec<Contact>>;

    /// Unfiltered listing for privileged roles
    async fn list_all(&self, query: &ContactQuery) -> Result<Vec<Contact>>;

    async fn get_contact(&self, owner_id: i64, contact_id: i64) -> Result<Option<Contact>>;

    async fn create_contact(&self, owner_id: i64, draft: ContactDraft) -> Result<Contact>;

    async fn update_contact(
        &self,
        owner_id: i64,
        contact_id: i64,
        draft: ContactDraft,
    ) -> Result<Option<Contact>>;

    async fn delete_contact(&self, owner_id: i64, contact_id: i64) -> Result<Option<Contact>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(name: &str, lastname: &str, email: &str) -> Contact {
        let now = Utc::now();
        Contact {
            id: 1,
            user_id: 1,
            name: name.to_string(),
            lastname: lastname.to_string(),
            email: email.to_string(),
            phone: "+380501234567".to_string(),
            birthdate: NaiveDate::from_ymd_opt(1990, 5, 17).unwrap(),
            others_info: None,
            completed: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_role_parse_and_display() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" Moderator ".parse::<Role>().unwrap(), Role::Moderator);
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert!("root".parse::<Role>().is_err());
        assert_eq!(Role::Moderator.to_string(), "moderator");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Admin).unwrap();
        assert_eq!(json, "\"admin\"");
        assert_eq!(Role::default(), Role::User);
    }

    #[test]
    fn test_contact_query_defaults() {
        let query = ContactQuery::new(None, None, None).unwrap();
        assert_eq!(query, ContactQuery::default());
    }

    #[test]
    fn test_contact_query_limit_bounds() {
        assert!(ContactQuery::new(Some(9), None, None).is_err());
        assert!(ContactQuery::new(Some(10), None, None).is_ok());
        assert!(ContactQuery::new(Some(500), None, None).is_ok());
        assert!(ContactQuery::new(Some(501), None, None).is_err());
        assert!(ContactQuery::new(None, Some(-1), None).is_err());
    }

    #[test]
    fn test_contact_query_blank_search_is_ignored() {
        let query = ContactQuery::new(None, None, Some("   ".to_string())).unwrap();
        assert!(query.search.is_none());
    }

    #[test]
    fn test_contact_query_matches_case_insensitively() {
        let c = contact("John", "Smith", "john.smith@example.com");

        let by_name = ContactQuery::new(None, None, Some("JOH".to_string())).unwrap();
        let by_lastname = ContactQuery::new(None, None, Some("mit".to_string())).unwrap();
        let by_email = ContactQuery::new(None, None, Some("EXAMPLE.com".to_string())).unwrap();
        let miss = ContactQuery::new(None, None, Some("jane".to_string())).unwrap();

        assert!(by_name.matches(&c));
        assert!(by_lastname.matches(&c));
        assert!(by_email.matches(&c));
        assert!(!miss.matches(&c));
    }

    #[test]
    fn test_user_secrets_not_serialized() {
        let now = Utc::now();
        let user = User {
            id: 7,
            username: "john".to_string(),
            email: "john@example.com".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            confirmed: true,
            refresh_token: Some("refresh".to_string()),
            avatar: None,
            role: Role::User,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(!json.contains("refresh_token"));
        assert!(json.contains("john@example.com"));
    }
}
