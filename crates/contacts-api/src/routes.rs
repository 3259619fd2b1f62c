//! API route definitions

use crate::auth::{auth_middleware, require_any_role};
use crate::handlers::{auth, contacts, users};
use crate::rate_limit::rate_limited;
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use contacts_core::Role;
use std::sync::Arc;

/// Roles allowed to list every contact
pub const PRIVILEGED_ROLES: &[Role] = &[Role::Moderator, Role::Admin];

/// Create routes mounted under `/api`
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let limits = state.config.rate_limit.clone();

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh_token", get(auth::refresh_handler))
        .route(
            "/auth/confirmed_email/:token",
            get(auth::confirmed_email_handler),
        )
        .route("/auth/request_email", post(auth::request_email_handler));

    // Role-gated routes; the authentication layer below wraps them as well
    let privileged_routes = Router::new()
        .route("/contacts/all", get(contacts::list_all_contacts))
        .route_layer(middleware::from_fn(require_any_role(PRIVILEGED_ROLES)));

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout_handler))
        .route(
            "/contacts",
            get(contacts::list_contacts).post(contacts::create_contact),
        )
        .route(
            "/contacts/:contact_id",
            get(contacts::get_contact)
                .put(contacts::update_contact)
                .delete(contacts::delete_contact),
        )
        .route("/users/me", rate_limited(get(users::me_handler), &limits))
        .route(
            "/users/avatar",
            rate_limited(patch(users::update_avatar_handler), &limits),
        )
        .merge(privileged_routes)
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new().merge(public_routes).merge(protected_routes)
}
