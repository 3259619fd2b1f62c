//! JWT token generation and validation
//!
//! Access, refresh and email-confirmation tokens share one HMAC secret.
//! Access and refresh tokens carry a `scope` claim so one kind can never be
//! presented in place of the other.

use contacts_core::AuthConfig;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Purpose tag embedded in access and refresh tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenScope {
    #[serde(rename = "access_token")]
    Access,
    #[serde(rename = "refresh_token")]
    Refresh,
}

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - user email
    pub sub: String,
    /// Issued at timestamp (Unix epoch)
    pub iat: u64,
    /// Expiration timestamp (Unix epoch)
    pub exp: u64,
    /// Unique token identifier; keeps tokens issued in the same second distinct
    pub jti: String,
    /// Absent on email-confirmation tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<TokenScope>,
}

/// JWT token generation and validation errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode JWT: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid token format")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Invalid scope for token, expected {expected:?}")]
    WrongScope { expected: TokenScope },

    #[error("System time error: {0}")]
    SystemTimeError(#[from] std::time::SystemTimeError),
}

/// Issues and validates every token kind
#[derive(Clone)]
pub struct TokenService {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
    email_ttl_secs: u64,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("algorithm", &self.algorithm)
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .field("email_ttl_secs", &self.email_ttl_secs)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Build from the `auth` configuration section
    pub fn new(config: &AuthConfig) -> Result<Self, JwtError> {
        let algorithm = match config.jwt_algorithm.as_str() {
            "HS256" => Algorithm::HS256,
            "HS384" => Algorithm::HS384,
            "HS512" => Algorithm::HS512,
            other => return Err(JwtError::UnsupportedAlgorithm(other.to_string())),
        };

        Ok(Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_ttl_secs: config.access_token_ttl_secs,
            refresh_ttl_secs: config.refresh_token_ttl_secs,
            email_ttl_secs: config.email_token_ttl_secs,
        })
    }

    pub fn issue_access_token(&self, subject: &str) -> Result<String, JwtError> {
        self.issue(subject, self.access_ttl_secs, Some(TokenScope::Access))
    }

    pub fn issue_refresh_token(&self, subject: &str) -> Result<String, JwtError> {
        self.issue(subject, self.refresh_ttl_secs, Some(TokenScope::Refresh))
    }

    pub fn issue_email_token(&self, subject: &str) -> Result<String, JwtError> {
        self.issue(subject, self.email_ttl_secs, None)
    }

    fn issue(
        &self,
        subject: &str,
        ttl_secs: u64,
        scope: Option<TokenScope>,
    ) -> Result<String, JwtError> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

        let claims = Claims {
            sub: subject.to_string(),
            iat: now,
            exp: now + ttl_secs,
            jti: Uuid::new_v4().to_string(),
            scope,
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Decode and check signature and expiry, returning the full claims
    pub fn decode(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::ExpiredToken,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::InvalidSignature,
                _ => JwtError::InvalidToken,
            }
        })?;

        Ok(token_data.claims)
    }

    /// Validate a scoped token and return its subject
    pub fn verify(&self, token: &str, expected: TokenScope) -> Result<String, JwtError> {
        let claims = self.decode(token)?;
        if claims.scope != Some(expected) {
            return Err(JwtError::WrongScope { expected });
        }
        Ok(claims.sub)
    }

    /// Validate an email-confirmation token and return its subject
    ///
    /// Only signature and expiry are checked.
    pub fn verify_email_token(&self, token: &str) -> Result<String, JwtError> {
        Ok(self.decode(token)?.sub)
    }
}
