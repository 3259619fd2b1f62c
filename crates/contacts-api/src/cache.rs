//! Session cache for resolved user identities
//!
//! A lookaside cache keyed by email. Entries are JSON snapshots of
//! [`CurrentUser`] and expire after the configured TTL (300 s by default).
//! The credential store stays authoritative; the cache only saves a
//! database round trip per authenticated request.
//!
//! Two backends are provided:
//! - [`RedisSessionCache`] for shared deployments
//! - [`MokaSessionCache`], an in-process cache used when no Redis URL is set

use crate::auth::CurrentUser;
use async_trait::async_trait;
use contacts_core::CacheConfig;
use moka::future::Cache;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Session cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Failed to (de)serialize cached identity: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Identity cache operations
#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Cached identity for `email`, if present and unexpired
    async fn get(&self, email: &str) -> Result<Option<CurrentUser>, CacheError>;

    /// Store (or overwrite) the snapshot for `user.email` with the configured TTL
    async fn put(&self, user: &CurrentUser) -> Result<(), CacheError>;

    /// Drop the entry for `email`
    async fn evict(&self, email: &str) -> Result<(), CacheError>;

    /// Connectivity check for readiness probes
    async fn ping(&self) -> Result<(), CacheError>;
}

fn cache_key(prefix: &str, email: &str) -> String {
    format!("{prefix}:{email}")
}

// ============================================================================
// Redis
// ============================================================================

/// Redis-backed session cache
#[derive(Clone)]
pub struct RedisSessionCache {
    conn: ConnectionManager,
    key_prefix: String,
    ttl_secs: u64,
}

impl RedisSessionCache {
    /// Connect to Redis; the connection manager reconnects on its own
    pub async fn connect(url: &str, config: &CacheConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self {
            conn,
            key_prefix: config.key_prefix.clone(),
            ttl_secs: config.ttl_secs,
        })
    }
}

#[async_trait]
impl SessionCache for RedisSessionCache {
    async fn get(&self, email: &str) -> Result<Option<CurrentUser>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(cache_key(&self.key_prefix, email)).await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, user: &CurrentUser) -> Result<(), CacheError> {
        let json = serde_json::to_string(user)?;
        let mut conn = self.conn.clone();

        redis::cmd("SET")
            .arg(cache_key(&self.key_prefix, &user.email))
            .arg(json)
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn evict(&self, email: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(cache_key(&self.key_prefix, email)).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}

// ============================================================================
// In-process (moka)
// ============================================================================

/// Cache statistics
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

/// In-process session cache
///
/// Thread-safe and suitable for async contexts. Entries expire after the
/// configured time-to-live regardless of access.
#[derive(Clone)]
pub struct MokaSessionCache {
    cache: Cache<String, String>,
    key_prefix: String,
    stats: Arc<CacheStats>,
}

impl MokaSessionCache {
    pub fn new(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(Duration::from_secs(config.ttl_secs))
            .build();

        Self {
            cache,
            key_prefix: config.key_prefix.clone(),
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl SessionCache for MokaSessionCache {
    async fn get(&self, email: &str) -> Result<Option<CurrentUser>, CacheError> {
        match self.cache.get(&cache_key(&self.key_prefix, email)).await {
            Some(json) => {
                self.stats.record_hit();
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => {
                self.stats.record_miss();
                Ok(None)
            }
        }
    }

    async fn put(&self, user: &CurrentUser) -> Result<(), CacheError> {
        let json = serde_json::to_string(user)?;
        self.cache
            .insert(cache_key(&self.key_prefix, &user.email), json)
            .await;
        self.stats.record_write();
        Ok(())
    }

    async fn evict(&self, email: &str) -> Result<(), CacheError> {
        self.cache
            .invalidate(&cache_key(&self.key_prefix, email))
            .await;
        self.stats.record_eviction();
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
