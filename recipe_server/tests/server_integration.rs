//! Integration tests for the HTTP server.
//!
//! Drives the full router against the in-memory store: registration, login,
//! logout, the authentication middleware, password reset and rate limiting.

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use recipe_auth::auth::{AuthConfig, ResetDelivery};
use recipe_auth::db::Store;
use recipe_auth::mail::{Mailer, MemoryMailer};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt; // For `oneshot` method

fn test_config(delivery: ResetDelivery) -> AuthConfig {
    let mut config = AuthConfig::new(
        "server_session_secret_for_testing_only",
        "server_reset_secret_for_testing_only__",
    );
    config.reset_delivery = delivery;
    config.hash_memory_kib = 8;
    config.hash_iterations = 1;
    config
}

/// Helper to create a test router over a fresh in-memory store
fn create_test_server(delivery: ResetDelivery) -> (axum::Router, Arc<MemoryMailer>) {
    let mailer = Arc::new(MemoryMailer::new());
    let state = recipe_server::api::AppState::new(
        Store::memory(),
        mailer.clone() as Arc<dyn Mailer>,
        &test_config(delivery),
        None,
    )
    .expect("Failed to build app state");

    (recipe_server::api::create_router(state, &[]), mailer)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn bearer_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

async fn register_and_login(app: &axum::Router, email: &str, password: &str) -> String {
    let (status, _) = send(
        app,
        json_request(
            "POST",
            "/auth/register",
            json!({ "name": "Server Cook", "email": email, "password": password }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        app,
        json_request("POST", "/auth/login", json!({ "email": email, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

// ============================================================================
// Health Check Tests
// ============================================================================

#[tokio::test]
async fn test_health_check_endpoint() {
    let (app, _) = create_test_server(ResetDelivery::Email);

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"]["backend"], "memory");
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let (app, _) = create_test_server(ResetDelivery::Email);

    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "trace-me-42")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "trace-me-42");
}

// ============================================================================
// Registration & Login Tests
// ============================================================================

#[tokio::test]
async fn test_register_response_shape() {
    let (app, _) = create_test_server(ResetDelivery::Email);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/auth/register",
            json!({ "name": "Julia", "email": "Julia@Example.com", "password": "souffle" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["email"], "julia@example.com");
    assert!(body["data"].get("password").is_none());
    assert!(uuid::Uuid::parse_str(body["data"]["user_id"].as_str().unwrap()).is_ok());
}

#[tokio::test]
async fn test_register_duplicate_is_conflict() {
    let (app, _) = create_test_server(ResetDelivery::Email);
    let payload = json!({ "name": "Dup", "email": "dup@example.com", "password": "password" });

    let (first, _) = send(&app, json_request("POST", "/auth/register", payload.clone())).await;
    let (second, body) = send(&app, json_request("POST", "/auth/register", payload)).await;

    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(body["error"], "User already exists");
}

#[tokio::test]
async fn test_register_invalid_input() {
    let (app, _) = create_test_server(ResetDelivery::Email);

    let (status, body) = send(
        &app,
        json_request("POST", "/auth/register", json!({ "email": "missing@fields.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid input"));

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/auth/register",
            json!({ "name": "Short", "email": "short@example.com", "password": "123" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_failure_is_generic() {
    let (app, _) = create_test_server(ResetDelivery::Email);
    register_and_login(&app, "known@example.com", "password").await;

    let (wrong_status, wrong_body) = send(
        &app,
        json_request(
            "POST",
            "/auth/login",
            json!({ "email": "known@example.com", "password": "nope-nope" }),
        ),
    )
    .await;
    let (unknown_status, unknown_body) = send(
        &app,
        json_request(
            "POST",
            "/auth/login",
            json!({ "email": "ghost@example.com", "password": "password" }),
        ),
    )
    .await;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_body, unknown_body);
}

// ============================================================================
// Session Tests
// ============================================================================

#[tokio::test]
async fn test_protected_route_requires_bearer() {
    let (app, _) = create_test_server(ResetDelivery::Email);

    let request = Request::builder()
        .uri("/auth/me")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Authorization header missing");

    let request = Request::builder()
        .uri("/auth/me")
        .header("authorization", "Token abc")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid Authorization header format");
}

#[tokio::test]
async fn test_me_and_profile_update() {
    let (app, _) = create_test_server(ResetDelivery::Email);
    let token = register_and_login(&app, "me@example.com", "password").await;

    let (status, body) = send(&app, bearer_request("GET", "/auth/me", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "me@example.com");

    let request = Request::builder()
        .method("PUT")
        .uri("/auth/profile")
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "bio": "Bread and butter", "avatar_url": "/uploads/me.png" }).to_string(),
        ))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["bio"], "Bread and butter");
    assert_eq!(body["data"]["avatar_url"], "/uploads/me.png");
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let (app, _) = create_test_server(ResetDelivery::Email);
    let token = register_and_login(&app, "bye@example.com", "password").await;

    let (status, _) = send(&app, bearer_request("POST", "/auth/logout", &token)).await;
    assert_eq!(status, StatusCode::OK);

    // Second logout of the same token is still a success
    let (status, body) = send(&app, bearer_request("POST", "/auth/logout", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logout successful, token blacklisted");

    let (status, body) = send(&app, bearer_request("GET", "/auth/me", &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Token has been revoked");
}

#[tokio::test]
async fn test_concurrent_logouts_both_succeed() {
    let (app, _) = create_test_server(ResetDelivery::Email);
    let token = register_and_login(&app, "race@example.com", "password").await;

    let (first, second) = tokio::join!(
        send(&app, bearer_request("POST", "/auth/logout", &token)),
        send(&app, bearer_request("POST", "/auth/logout", &token)),
    );
    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(second.0, StatusCode::OK);

    let (status, _) = send(&app, bearer_request("GET", "/auth/me", &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_rejects_forged_token() {
    let (app, _) = create_test_server(ResetDelivery::Email);

    let (status, _) = send(&app, bearer_request("POST", "/auth/logout", "a.b.c")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/auth/logout")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Password Reset Tests
// ============================================================================

#[tokio::test]
async fn test_development_reset_flow() {
    let (app, mailer) = create_test_server(ResetDelivery::ReturnToken);
    register_and_login(&app, "a@x.com", "oldpass").await;

    let (status, body) = send(
        &app,
        json_request("POST", "/auth/forgot-password", json!({ "email": "a@x.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(mailer.sent().is_empty());
    let reset_token = body["reset_token"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/auth/reset-password",
            json!({ "token": reset_token, "new_password": "newpass" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        json_request("POST", "/auth/login", json!({ "email": "a@x.com", "password": "newpass" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The token cannot be used a second time
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/auth/reset-password",
            json!({ "token": reset_token, "new_password": "thirdpass" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid or expired reset token");
}

#[tokio::test]
async fn test_email_reset_hides_token() {
    let (app, mailer) = create_test_server(ResetDelivery::Email);
    register_and_login(&app, "mail@example.com", "oldpass").await;

    let (status, body) = send(
        &app,
        json_request("POST", "/auth/forgot-password", json!({ "email": "mail@example.com" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.get("reset_token").is_none());
    assert_eq!(mailer.sent().len(), 1);
}

#[tokio::test]
async fn test_forgot_password_unknown_email() {
    let (app, _) = create_test_server(ResetDelivery::Email);

    let (status, _) = send(
        &app,
        json_request("POST", "/auth/forgot-password", json!({ "email": "nobody@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Rate Limiting Tests
// ============================================================================

fn login_attempt(peer: &str, forwarded_for: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json");
    if let Some(forwarded_for) = forwarded_for {
        builder = builder.header("x-forwarded-for", forwarded_for);
    }

    let mut request = builder
        .body(Body::from(
            json!({ "email": "x@example.com", "password": "password" }).to_string(),
        ))
        .unwrap();
    let addr: SocketAddr = peer.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

#[tokio::test]
async fn test_login_rate_limited_per_client() {
    let (app, _) = create_test_server(ResetDelivery::Email);

    for _ in 0..5 {
        let (status, _) = send(&app, login_attempt("198.51.100.1:5000", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let response = app
        .clone()
        .oneshot(login_attempt("198.51.100.1:5001", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));

    // Another client is unaffected
    let (status, _) = send(&app, login_attempt("198.51.100.2:5000", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Other endpoints are not limited
    let (status, _) = send(
        &app,
        json_request("POST", "/auth/forgot-password", json!({ "email": "x@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rotating_forwarded_for_does_not_reset_budget() {
    let (app, _) = create_test_server(ResetDelivery::Email);

    for i in 0..5 {
        let spoofed = format!("203.0.113.{i}");
        let (status, _) = send(&app, login_attempt("198.51.100.9:4000", Some(&spoofed))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, _) = send(
        &app,
        login_attempt("198.51.100.9:4000", Some("203.0.113.200")),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_forwarded_for_honoured_behind_trusted_proxy() {
    let mailer = Arc::new(MemoryMailer::new());
    let state = recipe_server::api::AppState::new(
        Store::memory(),
        mailer as Arc<dyn Mailer>,
        &test_config(ResetDelivery::Email),
        None,
    )
    .expect("Failed to build app state")
    .with_trusted_proxy(true);
    let app = recipe_server::api::create_router(state, &[]);

    // Every request arrives from the proxy's address
    for _ in 0..5 {
        let (status, _) = send(&app, login_attempt("10.0.0.1:4000", Some("203.0.113.1"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, _) = send(&app, login_attempt("10.0.0.1:4000", Some("203.0.113.1"))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let (status, _) = send(&app, login_attempt("10.0.0.1:4000", Some("203.0.113.2"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
