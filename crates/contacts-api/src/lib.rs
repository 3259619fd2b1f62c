//! Contacts API - REST server
//!
//! HTTP endpoints for account signup and confirmation, JWT sessions with
//! refresh-token rotation, and per-user contact books.

pub mod audit;
pub mod auth;
pub mod cache;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod mail;
pub mod openapi;
pub mod rate_limit;
pub mod routes;
pub mod state;

use axum::{http::HeaderValue, routing::get, Json, Router};
use state::AppState;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

/// Build the full application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(openapi::ApiDoc::openapi()) }),
        )
        .nest("/api", routes::api_routes(Arc::clone(&state)))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Router over the in-memory store, in-process cache and log mailer
#[cfg(any(test, feature = "test-utils"))]
pub fn create_router_for_testing() -> Router {
    let state = AppState::in_memory(
        contacts_core::AppConfig::default(),
        Arc::new(mail::LogMailer),
    )
    .expect("default auth configuration is valid");
    create_router(Arc::new(state))
}

/// CORS for the configured origins; permissive when none are set
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}
