//! Authentication service layer
//!
//! Business logic for signup, login, refresh-token rotation, email
//! confirmation and identity resolution. Storage, cache and mail are
//! reached through trait objects so the same service runs against
//! PostgreSQL/Redis in production and in-memory backends in tests.

use super::jwt::{TokenScope, TokenService};
use super::models::{CurrentUser, SignupRequest, TokenResponse};
use super::password::{hash_password, verify_password};
use crate::audit::{audit_log, AuditContext, AuditEvent};
use crate::cache::SessionCache;
use crate::error::AppError;
use crate::mail::{dispatch_confirmation, ConfirmationEmail, Mailer};
use contacts_core::{ContactsError, NewUser, User, UserRepository};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    cache: Arc<dyn SessionCache>,
    mailer: Arc<dyn Mailer>,
    tokens: TokenService,
    public_url: String,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        cache: Arc<dyn SessionCache>,
        mailer: Arc<dyn Mailer>,
        tokens: TokenService,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            users,
            cache,
            mailer,
            tokens,
            public_url: public_url.into(),
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Register a new, unconfirmed user and send the confirmation email
    ///
    /// The request is expected to be validated already.
    pub async fn signup(&self, request: SignupRequest, ctx: &AuditContext) -> Result<User, AppError> {
        if self.users.find_by_email(&request.email).await?.is_some() {
            audit_log(&AuditEvent::RegistrationFailure {
                email: request.email.clone(),
                reason: "Email already registered".to_string(),
                ip_address: ctx.ip_address.clone(),
                user_agent: ctx.user_agent.clone(),
            });
            return Err(AppError::Conflict("Account already exists".to_string()));
        }

        let password_hash = hash_password(&request.password)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {e}")))?;

        let new_user = NewUser {
            avatar: Some(gravatar_url(&request.email)),
            username: request.username,
            email: request.email,
            password_hash,
        };

        // A concurrent signup can still win the race at the unique index
        let user = self.users.create_user(new_user).await.map_err(|e| match e {
            ContactsError::Conflict(_) => AppError::Conflict("Account already exists".to_string()),
            other => AppError::from(other),
        })?;

        audit_log(&AuditEvent::RegistrationSuccess {
            user_id: user.id,
            email: user.email.clone(),
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
        });

        self.send_confirmation(&user);
        Ok(user)
    }

    /// Exchange email and password for a token pair
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        ctx: &AuditContext,
    ) -> Result<TokenResponse, AppError> {
        let reject = |reason: &str, error: AppError| {
            audit_log(&AuditEvent::LoginFailure {
                email: email.to_string(),
                reason: reason.to_string(),
                ip_address: ctx.ip_address.clone(),
                user_agent: ctx.user_agent.clone(),
            });
            Err(error)
        };

        let Some(user) = self.users.find_by_email(email).await? else {
            return reject("Unknown email", AppError::Unauthenticated);
        };

        if !user.confirmed {
            return reject("Email not confirmed", AppError::EmailNotConfirmed);
        }

        let password_valid = verify_password(password, &user.password_hash)
            .map_err(|e| AppError::Internal(format!("Failed to verify password: {e}")))?;
        if !password_valid {
            return reject("Invalid password", AppError::InvalidCredentials);
        }

        let pair = self.issue_pair(&user.email)?;
        self.users
            .update_refresh_token(user.id, Some(&pair.refresh_token))
            .await?;

        audit_log(&AuditEvent::LoginSuccess {
            user_id: user.id,
            email: user.email,
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
        });

        Ok(pair)
    }

    /// Rotate a refresh token
    ///
    /// The presented token must be the one currently stored for the user.
    /// Anything else, including a token that lost a concurrent rotation,
    /// revokes the stored token so the whole session has to log in again.
    pub async fn refresh(&self, token: &str, ctx: &AuditContext) -> Result<TokenResponse, AppError> {
        let email = self
            .tokens
            .verify(token, TokenScope::Refresh)
            .map_err(|e| self.invalid_token(ctx, e.to_string()))?;

        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(AppError::Unauthenticated)?;

        let pair = self.issue_pair(&user.email)?;

        let rotated = self
            .users
            .rotate_refresh_token(user.id, token, &pair.refresh_token)
            .await?;

        if !rotated {
            self.users.update_refresh_token(user.id, None).await?;
            audit_log(&AuditEvent::RefreshTokenReuse {
                user_id: user.id,
                email: user.email,
                ip_address: ctx.ip_address.clone(),
                user_agent: ctx.user_agent.clone(),
            });
            return Err(AppError::InvalidRefreshToken);
        }

        audit_log(&AuditEvent::TokenRefresh {
            user_id: user.id,
            email: user.email,
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
        });

        Ok(pair)
    }

    /// Confirm an email address from a confirmation link
    pub async fn confirm_email(&self, token: &str, ctx: &AuditContext) -> Result<&'static str, AppError> {
        let email = self
            .tokens
            .verify_email_token(token)
            .map_err(|e| self.invalid_token(ctx, e.to_string()))?;

        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or_else(|| AppError::Validation("Verification error".to_string()))?;

        if user.confirmed {
            return Ok("Verification has already been passed");
        }

        self.users.confirm_email(&email).await?;
        self.cache.evict(&email).await?;

        audit_log(&AuditEvent::EmailConfirmed {
            user_id: user.id,
            email,
            ip_address: ctx.ip_address.clone(),
        });

        Ok("Verification successful")
    }

    /// Re-send the confirmation email
    ///
    /// Unknown addresses get the same answer as unconfirmed ones.
    pub async fn request_email(&self, email: &str) -> Result<&'static str, AppError> {
        match self.users.find_by_email(email).await? {
            Some(user) if user.confirmed => Ok("Your email is already confirmed"),
            Some(user) => {
                self.send_confirmation(&user);
                Ok("Check your email for confirmation.")
            }
            None => {
                tracing::debug!(email = %email, "Confirmation requested for unknown address");
                Ok("Check your email for confirmation.")
            }
        }
    }

    /// Revoke the stored refresh token and drop the cached identity
    pub async fn logout(&self, user: &CurrentUser, ctx: &AuditContext) -> Result<(), AppError> {
        self.users.update_refresh_token(user.id, None).await?;
        self.cache.evict(&user.email).await?;

        audit_log(&AuditEvent::Logout {
            user_id: user.id,
            email: user.email.clone(),
            ip_address: ctx.ip_address.clone(),
        });

        Ok(())
    }

    /// Resolve the identity behind an access token
    ///
    /// The session cache is consulted first; on a miss the credential store
    /// is queried and the snapshot written back.
    pub async fn authenticate(&self, token: &str, ctx: &AuditContext) -> Result<CurrentUser, AppError> {
        let email = self
            .tokens
            .verify(token, TokenScope::Access)
            .map_err(|e| self.invalid_token(ctx, e.to_string()))?;

        if let Some(user) = self.cache.get(&email).await? {
            return Ok(user);
        }

        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(AppError::Unauthenticated)?;

        let identity = CurrentUser::from(&user);
        self.cache.put(&identity).await?;
        Ok(identity)
    }

    /// Persist a new avatar URL and write the refreshed identity through to the cache
    pub async fn update_avatar(&self, user: &CurrentUser, url: &str) -> Result<CurrentUser, AppError> {
        let updated = self.users.update_avatar(&user.email, Some(url)).await?;
        let identity = CurrentUser::from(&updated);
        self.cache.put(&identity).await?;
        Ok(identity)
    }

    fn issue_pair(&self, email: &str) -> Result<TokenResponse, AppError> {
        let access_token = self
            .tokens
            .issue_access_token(email)
            .map_err(|e| AppError::Internal(format!("Failed to generate access token: {e}")))?;
        let refresh_token = self
            .tokens
            .issue_refresh_token(email)
            .map_err(|e| AppError::Internal(format!("Failed to generate refresh token: {e}")))?;

        Ok(TokenResponse::bearer(access_token, refresh_token))
    }

    fn send_confirmation(&self, user: &User) {
        let token = match self.tokens.issue_email_token(&user.email) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(email = %user.email, error = %e, "Failed to issue confirmation token");
                return;
            }
        };

        dispatch_confirmation(
            Arc::clone(&self.mailer),
            ConfirmationEmail {
                to: user.email.clone(),
                username: user.username.clone(),
                base_url: self.public_url.clone(),
                token,
            },
        );
    }

    fn invalid_token(&self, ctx: &AuditContext, reason: String) -> AppError {
        audit_log(&AuditEvent::InvalidToken {
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
            reason,
        });
        AppError::Unauthenticated
    }
}

/// Gravatar URL derived from the normalized email
pub fn gravatar_url(email: &str) -> String {
    let digest = Sha256::digest(email.trim().to_lowercase().as_bytes());
    format!("https://www.gravatar.com/avatar/{digest:x}")
}
