//! Authentication and role-authorization middleware
//!
//! `auth_middleware` resolves the bearer token into a [`CurrentUser`] and
//! stores it in request extensions. `require_any_role` is layered on
//! individual routes after it and checks the resolved role against a fixed
//! allow-set.

use super::models::CurrentUser;
use crate::audit::{audit_log, AuditContext, AuditEvent};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use contacts_core::Role;
use std::sync::Arc;

/// Extract the token from an `Authorization: Bearer <token>` header
///
/// The scheme is matched case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();

    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/// Authentication middleware that requires a valid access token
///
/// # Usage
///
/// ```ignore
/// use axum::{middleware, routing::get, Router};
/// use contacts_api::auth::auth_middleware;
///
/// let app = Router::new()
///     .route("/protected", get(protected_handler))
///     .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));
/// ```
///
/// Handlers then take `Extension<CurrentUser>`.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ctx = AuditContext::from_headers(request.headers());

    let token = bearer_token(request.headers())
        .map(str::to_string)
        .ok_or(AppError::Unauthenticated)?;

    let user = state.auth.authenticate(&token, &ctx).await?;
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Permit iff the caller's role is in `allowed`
pub fn authorize(user: &CurrentUser, allowed: &[Role]) -> Result<(), AppError> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

/// Type alias for role middleware future
type RoleMiddlewareFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, AppError>> + Send>>;

/// Middleware factory for role-based access control
///
/// Must run after [`auth_middleware`]; a request without a resolved
/// identity is treated as unauthenticated.
///
/// ```ignore
/// let app = Router::new()
///     .route("/contacts/all", get(list_all_contacts))
///     .route_layer(middleware::from_fn(require_any_role(&[Role::Moderator, Role::Admin])));
/// ```
pub fn require_any_role(
    allowed: &'static [Role],
) -> impl Fn(Request, Next) -> RoleMiddlewareFuture + Clone {
    move |request: Request, next: Next| {
        Box::pin(async move {
            let user = request
                .extensions()
                .get::<CurrentUser>()
                .ok_or(AppError::Unauthenticated)?
                .clone();

            if let Err(denied) = authorize(&user, allowed) {
                let ctx = AuditContext::from_headers(request.headers());
                audit_log(&AuditEvent::AccessDenied {
                    user_id: user.id,
                    email: user.email,
                    role: user.role.to_string(),
                    resource: request.uri().path().to_string(),
                    required_roles: allowed.iter().map(Role::to_string).collect(),
                    ip_address: ctx.ip_address,
                    user_agent: ctx.user_agent,
                });
                return Err(denied);
            }

            Ok(next.run(request).await)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use proptest::prelude::*;

    fn user_with(role: Role) -> CurrentUser {
        CurrentUser {
            id: 1,
            username: "john".to_string(),
            email: "john@example.com".to_string(),
            avatar: None,
            role,
            confirmed: true,
        }
    }

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&headers("Bearer abc.def")), Some("abc.def"));
        assert_eq!(bearer_token(&headers("bearer abc.def")), Some("abc.def"));
        assert_eq!(bearer_token(&headers("Basic dXNlcjpwYXNz")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&headers("Bearer")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_privileged_allow_set() {
        let allowed = [Role::Moderator, Role::Admin];
        assert!(authorize(&user_with(Role::Admin), &allowed).is_ok());
        assert!(authorize(&user_with(Role::Moderator), &allowed).is_ok());
        assert!(matches!(
            authorize(&user_with(Role::User), &allowed),
            Err(AppError::Forbidden)
        ));
    }

    fn role_strategy() -> impl Strategy<Value = Role> {
        prop::sample::select(Role::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_authorize_permits_iff_member(
            role in role_strategy(),
            allowed in prop::sample::subsequence(Role::ALL.to_vec(), 0..=Role::ALL.len()),
        ) {
            let permitted = authorize(&user_with(role), &allowed).is_ok();
            prop_assert_eq!(permitted, allowed.contains(&role));
        }
    }
}
