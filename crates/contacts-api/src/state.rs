//! Application state management

use crate::auth::{AuthService, JwtError, TokenService};
use crate::cache::SessionCache;
use crate::mail::Mailer;
use contacts_core::{AppConfig, ContactRepository, UserRepository};
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    /// Authentication service
    pub auth: AuthService,
    /// Credential store
    pub users: Arc<dyn UserRepository>,
    /// Contact access layer
    pub contacts: Arc<dyn ContactRepository>,
    /// Session cache
    pub cache: Arc<dyn SessionCache>,
}

impl AppState {
    /// Wire the services over the given backends
    pub fn new(
        config: AppConfig,
        users: Arc<dyn UserRepository>,
        contacts: Arc<dyn ContactRepository>,
        cache: Arc<dyn SessionCache>,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, JwtError> {
        let tokens = TokenService::new(&config.auth)?;
        let auth = AuthService::new(
            Arc::clone(&users),
            Arc::clone(&cache),
            mailer,
            tokens,
            config.server.public_url.clone(),
        );

        Ok(Self {
            config,
            start_time: Instant::now(),
            auth,
            users,
            contacts,
            cache,
        })
    }

    /// State over the in-memory store and the in-process cache
    #[cfg(any(test, feature = "test-utils"))]
    pub fn in_memory(config: AppConfig, mailer: Arc<dyn Mailer>) -> Result<Self, JwtError> {
        let store = Arc::new(contacts_core::MemoryStore::new());
        let cache = Arc::new(crate::cache::MokaSessionCache::new(&config.cache));
        Self::new(config, store.clone(), store, cache, mailer)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
