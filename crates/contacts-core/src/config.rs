//! Contacts Configuration Management
//!
//! Handles configuration from environment variables and TOML files,
//! with sensible defaults for development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Credential store connection
    pub database: DatabaseConfig,

    /// Session cache configuration
    pub cache: CacheConfig,

    /// Token signing and lifetimes
    pub auth: AuthConfig,

    /// Per-client limits on the profile endpoints
    pub rate_limit: RateLimitConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = parse_env("API_PORT")? {
            self.server.port = port;
        }
        if let Ok(url) = std::env::var("PUBLIC_URL") {
            self.server.public_url = url;
        }
        // CORS origins from environment variable (comma-separated)
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // PostgreSQL
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = Some(url).filter(|u| !u.is_empty());
        }
        if let Some(size) = parse_env("DATABASE_MAX_CONNECTIONS")? {
            self.database.max_connections = size;
        }

        // Redis
        if let Ok(url) = std::env::var("REDIS_URL") {
            self.cache.redis_url = Some(url).filter(|u| !u.is_empty());
        }
        if let Some(ttl) = parse_env("CACHE_TTL_SECS")? {
            self.cache.ttl_secs = ttl;
        }

        // JWT
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Ok(algorithm) = std::env::var("JWT_ALGORITHM") {
            self.auth.jwt_algorithm = algorithm;
        }
        if let Some(secs) = parse_env("JWT_ACCESS_EXPIRATION_SECS")? {
            self.auth.access_token_ttl_secs = secs;
        }
        if let Some(secs) = parse_env("JWT_REFRESH_EXPIRATION_SECS")? {
            self.auth.refresh_token_ttl_secs = secs;
        }
        if let Some(secs) = parse_env("JWT_EMAIL_EXPIRATION_SECS")? {
            self.auth.email_token_ttl_secs = secs;
        }

        // Rate limiting
        if let Some(enabled) = parse_env("RATE_LIMIT_ENABLED")? {
            self.rate_limit.enabled = enabled;
        }
        if let Some(secs) = parse_env("RATE_LIMIT_PERIOD_SECS")? {
            self.rate_limit.period_secs = secs;
        }
        if let Some(burst) = parse_env("RATE_LIMIT_BURST")? {
            self.rate_limit.burst_size = burst;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.json_format = format.eq_ignore_ascii_case("json");
        }

        Ok(())
    }

    /// Reject configurations the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::MissingRequired("JWT_SECRET".to_string()));
        }

        if !matches!(self.auth.jwt_algorithm.as_str(), "HS256" | "HS384" | "HS512") {
            return Err(ConfigError::InvalidValue {
                key: "JWT_ALGORITHM".to_string(),
                value: self.auth.jwt_algorithm.clone(),
            });
        }

        let ttls = [
            ("JWT_ACCESS_EXPIRATION_SECS", self.auth.access_token_ttl_secs),
            ("JWT_REFRESH_EXPIRATION_SECS", self.auth.refresh_token_ttl_secs),
            ("JWT_EMAIL_EXPIRATION_SECS", self.auth.email_token_ttl_secs),
            ("CACHE_TTL_SECS", self.cache.ttl_secs),
        ];
        for (key, value) in ttls {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }

        if self.rate_limit.enabled
            && (self.rate_limit.period_secs == 0 || self.rate_limit.burst_size == 0)
        {
            return Err(ConfigError::InvalidValue {
                key: "RATE_LIMIT_PERIOD_SECS/RATE_LIMIT_BURST".to_string(),
                value: format!(
                    "{}/{}",
                    self.rate_limit.period_secs, self.rate_limit.burst_size
                ),
            });
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Externally visible base URL, used in confirmation links
    pub public_url: String,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_url: "http://localhost:8080/".to_string(),
            // Empty by default - set via CORS_ORIGINS env var
            cors_origins: vec![],
        }
    }
}

/// Credential store connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL; the in-memory store is used when unset
    pub url: Option<String>,

    /// PostgreSQL connection pool size
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

/// Session cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Redis URL; an in-process cache is used when unset
    pub redis_url: Option<String>,

    /// Prefix prepended to every cache key
    pub key_prefix: String,

    /// Time-to-live for cached identities (in seconds)
    pub ttl_secs: u64,

    /// Maximum entries held by the in-process cache
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            key_prefix: "contacts:user".to_string(),
            ttl_secs: 300,
            max_capacity: 10_000,
        }
    }
}

/// Rate limiting for `/api/users/*`
///
/// Each route has its own budget per client IP: `burst_size` requests, with
/// one more allowed every `period_secs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub period_secs: u64,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period_secs: 20,
            burst_size: 1,
        }
    }
}

/// Token signing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Symmetric signing secret shared by every token kind
    pub jwt_secret: String,

    /// HMAC algorithm name (HS256, HS384, HS512)
    pub jwt_algorithm: String,

    /// Access token lifetime (default: 15 minutes)
    pub access_token_ttl_secs: u64,

    /// Refresh token lifetime (default: 7 days)
    pub refresh_token_ttl_secs: u64,

    /// Email confirmation token lifetime (default: 1 day)
    pub email_token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "development-secret-key-change-in-production".to_string(),
            jwt_algorithm: "HS256".to_string(),
            access_token_ttl_secs: 15 * 60,
            refresh_token_ttl_secs: 7 * 24 * 60 * 60,
            email_token_ttl_secs: 24 * 60 * 60,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
