//! API Integration Tests
//!
//! Every test runs the full router over the in-memory store and the
//! in-process session cache. Confirmation emails are captured through a
//! channel mailer.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use contacts_api::cache::MokaSessionCache;
use contacts_api::mail::{ChannelMailer, ConfirmationEmail};
use contacts_api::{auth::TokenService, create_router, create_router_for_testing, state::AppState};
use contacts_core::{
    AppConfig, AuthConfig, MemoryStore, NewUser, Result as CoreResult, Role, User, UserRepository,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tower::ServiceExt;

// =============================================================================
// Harness
// =============================================================================

/// Credential store wrapper that counts identity lookups
struct CountingUsers {
    inner: MemoryStore,
    lookups: AtomicUsize,
}

impl CountingUsers {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            lookups: AtomicUsize::new(0),
        }
    }

    fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.lookups.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserRepository for CountingUsers {
    async fn find_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_email(email).await
    }

    async fn create_user(&self, user: NewUser) -> CoreResult<User> {
        self.inner.create_user(user).await
    }

    async fn update_refresh_token(&self, user_id: i64, token: Option<&str>) -> CoreResult<()> {
        self.inner.update_refresh_token(user_id, token).await
    }

    async fn rotate_refresh_token(
        &self,
        user_id: i64,
        presented: &str,
        replacement: &str,
    ) -> CoreResult<bool> {
        self.inner
            .rotate_refresh_token(user_id, presented, replacement)
            .await
    }

    async fn confirm_email(&self, email: &str) -> CoreResult<()> {
        self.inner.confirm_email(email).await
    }

    async fn update_avatar(&self, email: &str, url: Option<&str>) -> CoreResult<User> {
        self.inner.update_avatar(email, url).await
    }

    async fn set_role(&self, email: &str, role: Role) -> CoreResult<User> {
        self.inner.set_role(email, role).await
    }

    async fn ping(&self) -> CoreResult<()> {
        self.inner.ping().await
    }
}

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    inbox: UnboundedReceiver<ConfirmationEmail>,
}

/// App with the profile rate limit switched off
fn test_app() -> TestApp {
    let mut config = AppConfig::default();
    config.rate_limit.enabled = false;
    test_app_with(config)
}

fn test_app_with(config: AppConfig) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let (mailer, inbox) = ChannelMailer::new();
    let cache = Arc::new(MokaSessionCache::new(&config.cache));

    let state =
        AppState::new(config, store.clone(), store.clone(), cache, Arc::new(mailer)).unwrap();

    TestApp {
        router: create_router(Arc::new(state)),
        store,
        inbox,
    }
}

/// Helper to create a test request
fn create_json_request(
    method: &str,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    match body {
        Some(json_body) => builder
            .body(Body::from(serde_json::to_string(&json_body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn login_request(email: &str, password: &str) -> Request<Body> {
    let form = format!(
        "username={}&password={}",
        email.replace('@', "%40"),
        password
    );
    Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(Body::from(form))
        .unwrap()
}

/// Send a request and decode the JSON body (`Value::Null` when empty)
async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };

    (status, json)
}

async fn signup(router: &Router, email: &str) -> (StatusCode, Value) {
    send(
        router,
        create_json_request(
            "POST",
            "/api/auth/signup",
            Some(json!({
                "username": "tester",
                "email": email,
                "password": "secret1"
            })),
            None,
        ),
    )
    .await
}

/// Signup, follow the confirmation link and log in; returns (access, refresh)
async fn register_and_login(
    router: &Router,
    inbox: &mut UnboundedReceiver<ConfirmationEmail>,
    email: &str,
) -> (String, String) {
    let (status, _) = signup(router, email).await;
    assert_eq!(status, StatusCode::CREATED);

    let message = inbox.recv().await.expect("confirmation email");
    assert_eq!(message.to, email);

    let (status, _) = send(
        router,
        create_json_request(
            "GET",
            &format!("/api/auth/confirmed_email/{}", message.token),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, tokens) = send(router, login_request(email, "secret1")).await;
    assert_eq!(status, StatusCode::OK);

    (
        tokens["access_token"].as_str().unwrap().to_string(),
        tokens["refresh_token"].as_str().unwrap().to_string(),
    )
}

fn contact_json(name: &str) -> Value {
    json!({
        "name": name,
        "lastname": "Smith",
        "email": format!("{}@example.com", name.to_lowercase()),
        "phone": "+380501234567",
        "birthdate": "1990-05-17"
    })
}

// =============================================================================
// Health Check Tests
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = create_router_for_testing();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_readiness_check() {
    let app = create_router_for_testing();
    let (status, json) = send(&app, create_json_request("GET", "/ready", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ready"], true);
    assert_eq!(json["checks"]["database"], true);
    assert_eq!(json["checks"]["cache"], true);
}

#[tokio::test]
async fn test_openapi_document() {
    let app = create_router_for_testing();
    let (status, json) = send(
        &app,
        create_json_request("GET", "/api-docs/openapi.json", None, None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/api/auth/signup"].is_object());
}

// =============================================================================
// Auth Flow Tests
// =============================================================================

#[tokio::test]
async fn test_signup_confirm_login_flow() {
    let mut app = test_app();
    let email = "flow@example.com";

    let (status, user) = signup(&app.router, email).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user["email"], email);
    assert_eq!(user["role"], "user");
    assert!(user["avatar"]
        .as_str()
        .unwrap()
        .starts_with("https://www.gravatar.com/avatar/"));
    assert!(user.get("password_hash").is_none());

    // Unconfirmed accounts cannot log in
    let (status, error) = send(&app.router, login_request(email, "secret1")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error["code"], "EMAIL_NOT_CONFIRMED");

    let message = app.inbox.recv().await.unwrap();
    assert!(message
        .link()
        .ends_with(&format!("/api/auth/confirmed_email/{}", message.token)));

    let confirm_uri = format!("/api/auth/confirmed_email/{}", message.token);
    let (status, body) = send(
        &app.router,
        create_json_request("GET", &confirm_uri, None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Verification successful");

    let (_, body) = send(
        &app.router,
        create_json_request("GET", &confirm_uri, None, None),
    )
    .await;
    assert_eq!(body["message"], "Verification has already been passed");

    let (status, error) = send(&app.router, login_request(email, "wrong-password")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error["code"], "INVALID_CREDENTIALS");

    let (status, tokens) = send(&app.router, login_request(email, "secret1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tokens["token_type"], "bearer");

    let service = TokenService::new(&AuthConfig::default()).unwrap();
    let access = service
        .decode(tokens["access_token"].as_str().unwrap())
        .unwrap();
    let refresh = service
        .decode(tokens["refresh_token"].as_str().unwrap())
        .unwrap();
    assert_eq!(access.sub, email);
    assert_eq!(access.exp - access.iat, 15 * 60);
    assert_eq!(refresh.exp - refresh.iat, 7 * 24 * 60 * 60);
}

#[tokio::test]
async fn test_login_unknown_email() {
    let app = test_app();
    let (status, error) = send(&app.router, login_request("ghost@example.com", "secret1")).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn test_signup_validation_and_duplicate() {
    let app = test_app();

    let (status, error) = send(
        &app.router,
        create_json_request(
            "POST",
            "/api/auth/signup",
            Some(json!({
                "username": "tester",
                "email": "short@example.com",
                "password": "12345"
            })),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "VALIDATION_ERROR");

    let (status, _) = signup(&app.router, "dup@example.com").await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, error) = signup(&app.router, "dup@example.com").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["message"], "Account already exists");
}

#[tokio::test]
async fn test_confirm_with_invalid_token() {
    let app = test_app();
    let (status, _) = send(
        &app.router,
        create_json_request("GET", "/api/auth/confirmed_email/not-a-token", None, None),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_request_email() {
    let mut app = test_app();

    let request = |email: &str| {
        create_json_request(
            "POST",
            "/api/auth/request_email",
            Some(json!({ "email": email })),
            None,
        )
    };

    let (status, body) = send(&app.router, request("ghost@example.com")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Check your email for confirmation.");
    assert!(app.inbox.try_recv().is_err());

    signup(&app.router, "pending@example.com").await;
    app.inbox.recv().await.unwrap();

    let (_, body) = send(&app.router, request("pending@example.com")).await;
    assert_eq!(body["message"], "Check your email for confirmation.");
    let resent = app.inbox.recv().await.unwrap();
    assert_eq!(resent.to, "pending@example.com");

    app.store.confirm_email("pending@example.com").await.unwrap();
    let (_, body) = send(&app.router, request("pending@example.com")).await;
    assert_eq!(body["message"], "Your email is already confirmed");
}

// =============================================================================
// Refresh Token Tests
// =============================================================================

#[tokio::test]
async fn test_refresh_rotation_and_replay() {
    let mut app = test_app();
    let (access, first) = register_and_login(&app.router, &mut app.inbox, "rot@example.com").await;

    // An access token is not a refresh token
    let (status, error) = send(
        &app.router,
        create_json_request("GET", "/api/auth/refresh_token", None, Some(&access)),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error["code"], "UNAUTHENTICATED");

    let (status, rotated) = send(
        &app.router,
        create_json_request("GET", "/api/auth/refresh_token", None, Some(&first)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let second = rotated["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(second, first);

    // Replaying the redeemed token revokes the session
    let (status, error) = send(
        &app.router,
        create_json_request("GET", "/api/auth/refresh_token", None, Some(&first)),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error["code"], "INVALID_REFRESH_TOKEN");

    let (status, error) = send(
        &app.router,
        create_json_request("GET", "/api/auth/refresh_token", None, Some(&second)),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error["code"], "INVALID_REFRESH_TOKEN");
}

#[tokio::test]
async fn test_logout_revokes_refresh_token() {
    let mut app = test_app();
    let (access, refresh) =
        register_and_login(&app.router, &mut app.inbox, "bye@example.com").await;

    let (status, _) = send(
        &app.router,
        create_json_request("POST", "/api/auth/logout", None, Some(&access)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, error) = send(
        &app.router,
        create_json_request("GET", "/api/auth/refresh_token", None, Some(&refresh)),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error["code"], "INVALID_REFRESH_TOKEN");
}

// =============================================================================
// Authentication Gate Tests
// =============================================================================

#[tokio::test]
async fn test_protected_routes_require_access_token() {
    let mut app = test_app();

    let response = app
        .router
        .clone()
        .oneshot(create_json_request("GET", "/api/contacts", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "Bearer"
    );

    let (_, refresh) = register_and_login(&app.router, &mut app.inbox, "gate@example.com").await;
    let (status, _) = send(
        &app.router,
        create_json_request("GET", "/api/contacts", None, Some(&refresh)),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app.router,
        create_json_request("GET", "/api/contacts", None, Some("garbage")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cached_identity_skips_store_until_expiry() {
    let mut config = AppConfig::default();
    config.cache.ttl_secs = 1;
    config.rate_limit.enabled = false;

    let users = Arc::new(CountingUsers::new());
    let contacts = Arc::new(MemoryStore::new());
    let (mailer, mut inbox) = ChannelMailer::new();
    let cache = Arc::new(MokaSessionCache::new(&config.cache));
    let state = AppState::new(config, users.clone(), contacts, cache, Arc::new(mailer)).unwrap();
    let router = create_router(Arc::new(state));

    let (access, _) = register_and_login(&router, &mut inbox, "cache@example.com").await;
    users.reset();

    let me = || create_json_request("GET", "/api/users/me", None, Some(&access));

    let (status, _) = send(&router, me()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.lookups(), 1);

    let (status, _) = send(&router, me()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.lookups(), 1);

    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;

    let (status, _) = send(&router, me()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.lookups(), 2);
}

// =============================================================================
// Contact Tests
// =============================================================================

#[tokio::test]
async fn test_contact_crud() {
    let mut app = test_app();
    let (token, _) = register_and_login(&app.router, &mut app.inbox, "crud@example.com").await;

    let (status, created) = send(
        &app.router,
        create_json_request("POST", "/api/contacts", Some(contact_json("Anna")), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["completed"], false);
    assert_eq!(created["birthdate"], "1990-05-17");
    let id = created["id"].as_i64().unwrap();

    let uri = format!("/api/contacts/{id}");
    let (status, fetched) = send(&app.router, create_json_request("GET", &uri, None, Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], "Anna");

    let mut update = contact_json("Annabel");
    update["completed"] = json!(true);
    update["others_info"] = json!("Met at the conference");
    let (status, updated) = send(
        &app.router,
        create_json_request("PUT", &uri, Some(update), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Annabel");
    assert_eq!(updated["completed"], true);

    // Update requires `completed`
    let (status, error) = send(
        &app.router,
        create_json_request("PUT", &uri, Some(contact_json("Annabel")), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "VALIDATION_ERROR");

    let (status, _) = send(&app.router, create_json_request("DELETE", &uri, None, Some(&token))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, error) = send(&app.router, create_json_request("GET", &uri, None, Some(&token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["code"], "NOT_FOUND");

    let (status, _) = send(
        &app.router,
        create_json_request("GET", "/api/contacts/0", None, Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_contact_validation() {
    let mut app = test_app();
    let (token, _) = register_and_login(&app.router, &mut app.inbox, "valid@example.com").await;

    let mut invalid = contact_json("Anna");
    invalid["phone"] = json!("123");
    let (status, error) = send(
        &app.router,
        create_json_request("POST", "/api/contacts", Some(invalid), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_contacts_are_isolated_between_owners() {
    let mut app = test_app();
    let (alice, _) = register_and_login(&app.router, &mut app.inbox, "alice@example.com").await;
    let (bob, _) = register_and_login(&app.router, &mut app.inbox, "bob@example.com").await;

    let (_, created) = send(
        &app.router,
        create_json_request("POST", "/api/contacts", Some(contact_json("Anna")), Some(&alice)),
    )
    .await;
    let uri = format!("/api/contacts/{}", created["id"]);

    let (status, _) = send(&app.router, create_json_request("GET", &uri, None, Some(&bob))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let mut update = contact_json("Hijack");
    update["completed"] = json!(true);
    let (status, _) = send(
        &app.router,
        create_json_request("PUT", &uri, Some(update), Some(&bob)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app.router, create_json_request("DELETE", &uri, None, Some(&bob))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, listed) = send(
        &app.router,
        create_json_request("GET", "/api/contacts", None, Some(&bob)),
    )
    .await;
    assert_eq!(listed.as_array().unwrap().len(), 0);

    let (status, listed) = send(
        &app.router,
        create_json_request("GET", "/api/contacts", None, Some(&alice)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_pagination_and_search() {
    let mut app = test_app();
    let (token, _) = register_and_login(&app.router, &mut app.inbox, "page@example.com").await;

    for i in 0..12 {
        let (status, _) = send(
            &app.router,
            create_json_request(
                "POST",
                "/api/contacts",
                Some(contact_json(&format!("Name{i:02}"))),
                Some(&token),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, first_page) = send(
        &app.router,
        create_json_request("GET", "/api/contacts", None, Some(&token)),
    )
    .await;
    assert_eq!(first_page.as_array().unwrap().len(), 10);

    let (_, second_page) = send(
        &app.router,
        create_json_request("GET", "/api/contacts?limit=10&offset=10", None, Some(&token)),
    )
    .await;
    assert_eq!(second_page.as_array().unwrap().len(), 2);

    let (_, found) = send(
        &app.router,
        create_json_request("GET", "/api/contacts?query=NAME1", None, Some(&token)),
    )
    .await;
    assert_eq!(found.as_array().unwrap().len(), 2);

    for uri in [
        "/api/contacts?limit=9",
        "/api/contacts?limit=501",
        "/api/contacts?offset=-1",
    ] {
        let (status, error) = send(&app.router, create_json_request("GET", uri, None, Some(&token))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(error["code"], "VALIDATION_ERROR");
    }
}

// =============================================================================
// Role Gate Tests
// =============================================================================

#[tokio::test]
async fn test_all_contacts_requires_privileged_role() {
    let mut app = test_app();
    let (alice, _) = register_and_login(&app.router, &mut app.inbox, "alice@example.com").await;
    let (bob, _) = register_and_login(&app.router, &mut app.inbox, "bob@example.com").await;

    // Role assigned before carol's first authenticated request
    let (carol, _) = register_and_login(&app.router, &mut app.inbox, "carol@example.com").await;
    app.store
        .set_role("carol@example.com", Role::Moderator)
        .await
        .unwrap();

    for token in [&alice, &bob] {
        send(
            &app.router,
            create_json_request("POST", "/api/contacts", Some(contact_json("Anna")), Some(token)),
        )
        .await;
    }

    let (status, error) = send(
        &app.router,
        create_json_request("GET", "/api/contacts/all", None, Some(&alice)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error["message"], "FORBIDDEN");

    let (status, all) = send(
        &app.router,
        create_json_request("GET", "/api/contacts/all", None, Some(&carol)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (status, _) = send(
        &app.router,
        create_json_request("GET", "/api/contacts/all", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// User Profile Tests
// =============================================================================

#[tokio::test]
async fn test_avatar_update_writes_through_cache() {
    let mut app = test_app();
    let (token, _) = register_and_login(&app.router, &mut app.inbox, "pic@example.com").await;

    // Warm the cache
    let (status, me) = send(
        &app.router,
        create_json_request("GET", "/api/users/me", None, Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "pic@example.com");

    let (status, updated) = send(
        &app.router,
        create_json_request(
            "PATCH",
            "/api/users/avatar",
            Some(json!({ "avatar_url": "https://cdn.example.com/pic.png" })),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["avatar"], "https://cdn.example.com/pic.png");

    let (_, me) = send(
        &app.router,
        create_json_request("GET", "/api/users/me", None, Some(&token)),
    )
    .await;
    assert_eq!(me["avatar"], "https://cdn.example.com/pic.png");

    let (status, _) = send(
        &app.router,
        create_json_request(
            "PATCH",
            "/api/users/avatar",
            Some(json!({ "avatar_url": "not a url" })),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Longer than the avatar column
    let long_url = format!("https://cdn.example.com/{}.png", "a".repeat(300));
    let (status, error) = send(
        &app.router,
        create_json_request(
            "PATCH",
            "/api/users/avatar",
            Some(json!({ "avatar_url": long_url })),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_profile_routes_are_rate_limited_per_client() {
    let mut app = test_app_with(AppConfig::default());
    let (token, _) = register_and_login(&app.router, &mut app.inbox, "busy@example.com").await;

    let from = |method: &str, uri: &str, body: Option<Value>, ip: &str| {
        let mut request = create_json_request(method, uri, body, Some(&token));
        request
            .headers_mut()
            .insert("X-Forwarded-For", ip.parse().unwrap());
        request
    };

    let (status, _) = send(&app.router, from("GET", "/api/users/me", None, "198.51.100.7")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app.router, from("GET", "/api/users/me", None, "198.51.100.7")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // Another client has its own budget
    let (status, _) = send(&app.router, from("GET", "/api/users/me", None, "198.51.100.8")).await;
    assert_eq!(status, StatusCode::OK);

    // The avatar route does not share the budget of /users/me
    let (status, _) = send(
        &app.router,
        from(
            "PATCH",
            "/api/users/avatar",
            Some(json!({ "avatar_url": "https://cdn.example.com/busy.png" })),
            "198.51.100.7",
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

// =============================================================================
// Malformed Input Tests
// =============================================================================

#[tokio::test]
async fn test_malformed_requests_return_validation_errors() {
    let mut app = test_app();
    let (token, _) = register_and_login(&app.router, &mut app.inbox, "bad@example.com").await;

    let missing_password = create_json_request(
        "POST",
        "/api/auth/signup",
        Some(json!({ "username": "tester", "email": "nopass@example.com" })),
        None,
    );
    let missing_form_field = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(Body::from("username=bad%40example.com"))
        .unwrap();
    let bad_limit = create_json_request("GET", "/api/contacts?limit=abc", None, Some(&token));
    let bad_id = create_json_request("GET", "/api/contacts/abc", None, Some(&token));
    let broken_json = Request::builder()
        .method("POST")
        .uri("/api/contacts")
        .header("Content-Type", "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from("{\"name\":"))
        .unwrap();

    for request in [
        missing_password,
        missing_form_field,
        bad_limit,
        bad_id,
        broken_json,
    ] {
        let uri = request.uri().to_string();
        let (status, error) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(error["code"], "VALIDATION_ERROR", "{uri}");
        assert!(error["message"].as_str().is_some_and(|m| !m.is_empty()));
    }
}
