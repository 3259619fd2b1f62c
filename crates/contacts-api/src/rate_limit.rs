//! Per-client rate limiting for individual routes
//!
//! Clients are keyed by IP using `SmartIpKeyExtractor`, which reads
//! `X-Forwarded-For`, `X-Real-IP` and `Forwarded` before falling back to the
//! peer address. Requests over budget get `429 Too Many Requests`.

use axum::routing::MethodRouter;
use contacts_core::RateLimitConfig;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};

/// Wrap `route` in its own limiter
///
/// Every call creates a separate budget, so two routes wrapped separately
/// never share quota.
pub fn rate_limited<S>(route: MethodRouter<S>, config: &RateLimitConfig) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    if !config.enabled {
        return route;
    }

    let Some(governor) = GovernorConfigBuilder::default()
        .period(Duration::from_secs(config.period_secs))
        .burst_size(config.burst_size)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
    else {
        tracing::warn!(
            period_secs = config.period_secs,
            burst_size = config.burst_size,
            "Invalid rate limit settings, route left unlimited"
        );
        return route;
    };

    route.route_layer(GovernorLayer {
        config: Arc::new(governor),
    })
}
