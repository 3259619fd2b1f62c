//! Contacts API Server
//!
//! REST API server for per-user contact books.

use anyhow::Context;
use contacts_api::cache::{MokaSessionCache, RedisSessionCache, SessionCache};
use contacts_api::mail::LogMailer;
use contacts_api::{create_router, state::AppState};
use contacts_core::{AppConfig, ContactRepository, MemoryStore, PgStore, UserRepository};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration: optional TOML file, environment on top
    let config = match std::env::var("CONTACTS_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };
    config.validate()?;

    init_tracing(&config);

    let (users, contacts) = connect_store(&config).await?;
    let cache = connect_cache(&config).await?;

    // Create application state
    let state = AppState::new(config.clone(), users, contacts, cache, Arc::new(LogMailer))
        .context("Failed to initialise token service")?;

    let app = create_router(Arc::new(state));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Contacts API Server starting on http://{}", addr);
    tracing::info!("OpenAPI document at http://{}/api-docs/openapi.json", addr);

    // Peer addresses back the rate limiter when no forwarding headers are set
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "contacts_api=debug,tower_http=debug,audit=info,{}",
            config.logging.level
        )
        .into()
    });

    if config.logging.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn connect_store(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn UserRepository>, Arc<dyn ContactRepository>)> {
    match &config.database.url {
        Some(url) => {
            let store = Arc::new(
                PgStore::new(url, config.database.max_connections)
                    .await
                    .context("Failed to connect to PostgreSQL")?,
            );
            store.ensure_schema().await?;
            tracing::info!("Using PostgreSQL credential store");
            let users: Arc<dyn UserRepository> = store.clone();
            let contacts: Arc<dyn ContactRepository> = store;
            Ok((users, contacts))
        }
        None => {
            tracing::warn!("DATABASE_URL is not set, using the in-memory store; data is lost on restart");
            let store = Arc::new(MemoryStore::new());
            let users: Arc<dyn UserRepository> = store.clone();
            let contacts: Arc<dyn ContactRepository> = store;
            Ok((users, contacts))
        }
    }
}

async fn connect_cache(config: &AppConfig) -> anyhow::Result<Arc<dyn SessionCache>> {
    match &config.cache.redis_url {
        Some(url) => {
            let cache = RedisSessionCache::connect(url, &config.cache)
                .await
                .context("Failed to connect to Redis")?;
            tracing::info!("Using Redis session cache");
            let cache: Arc<dyn SessionCache> = Arc::new(cache);
            Ok(cache)
        }
        None => {
            tracing::warn!("REDIS_URL is not set, using the in-process session cache");
            let cache: Arc<dyn SessionCache> = Arc::new(MokaSessionCache::new(&config.cache));
            Ok(cache)
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
