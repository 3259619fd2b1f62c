//! Confirmation email dispatch
//!
//! Delivery mechanics live behind [`Mailer`]. The shipped [`LogMailer`]
//! writes the confirmation link to the log.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Mail dispatch errors
#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail delivery failed: {0}")]
    Delivery(String),
}

/// Confirmation message for a freshly registered (or re-requesting) user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationEmail {
    pub to: String,
    pub username: String,
    /// Public base URL of the API, with trailing slash
    pub base_url: String,
    pub token: String,
}

impl ConfirmationEmail {
    /// Link the recipient follows to confirm the address
    pub fn link(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{base}/api/auth/confirmed_email/{}", self.token)
    }
}

/// Outbound mail transport
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_confirmation(&self, email: ConfirmationEmail) -> Result<(), MailError>;
}

/// Mailer that logs the confirmation link instead of sending it
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_confirmation(&self, email: ConfirmationEmail) -> Result<(), MailError> {
        tracing::info!(
            to = %email.to,
            username = %email.username,
            link = %email.link(),
            "Confirmation email"
        );
        Ok(())
    }
}

/// Send in a detached task; failures are logged and never retried
pub fn dispatch_confirmation(mailer: Arc<dyn Mailer>, email: ConfirmationEmail) -> JoinHandle<()> {
    tokio::spawn(async move {
        let to = email.to.clone();
        if let Err(e) = mailer.send_confirmation(email).await {
            tracing::warn!(to = %to, error = %e, "Failed to send confirmation email");
        }
    })
}

/// Mailer that forwards every message to a channel, for tests
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Clone)]
pub struct ChannelMailer {
    sender: tokio::sync::mpsc::UnboundedSender<ConfirmationEmail>,
}

#[cfg(any(test, feature = "test-utils"))]
impl ChannelMailer {
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<ConfirmationEmail>) {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl Mailer for ChannelMailer {
    async fn send_confirmation(&self, email: ConfirmationEmail) -> Result<(), MailError> {
        self.sender
            .send(email)
            .map_err(|e| MailError::Delivery(e.to_string()))
    }
}
