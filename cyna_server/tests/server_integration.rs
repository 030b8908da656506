//! Integration tests for the HTTP API.
//!
//! Drives the full router against the in-memory store: login, bearer
//! resolution, registration, profile updates and the 2FA endpoints.

use argon2::Params;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use cyna::AuthManager;
use cyna::auth::{RegisterRequest, totp};
use cyna::db::MemoryAuthStore;
use cyna_server::api::{AppState, create_router, request_id::REQUEST_ID_HEADER};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt; // For `oneshot` method

const MASTER: &str = "server-test-master-secret";

/// Helper to create a test server over a fresh in-memory store
fn create_test_server(
    store: MemoryAuthStore,
    master_secret: Option<&str>,
) -> (axum::Router, Arc<AuthManager>, Arc<MemoryAuthStore>) {
    let store = Arc::new(store);
    let auth_manager = Arc::new(
        AuthManager::new(
            store.clone(),
            "test_pepper_for_testing_only".to_string(),
            master_secret.map(str::to_string),
        )
        .with_hash_params(Params::new(1024, 1, 1, None).unwrap()),
    );

    let state = AppState {
        auth_manager: auth_manager.clone(),
        database: None,
    };

    (create_router(state), auth_manager, store)
}

async fn register(auth: &AuthManager, email: &str, password: &str) -> i64 {
    auth.register(RegisterRequest {
        email: email.to_string(),
        password: password.to_string(),
        first_name: Some("Test".to_string()),
        last_name: None,
        phone: None,
    })
    .await
    .unwrap()
    .id
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn bearer_request(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"));

    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn login_token(app: &axum::Router, email: &str, password: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/login",
            json!({"email": email, "password": password}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["token"]
        .as_str()
        .expect("Login should return a token")
        .to_string()
}

fn now_unix() -> u64 {
    chrono::Utc::now().timestamp() as u64
}

// ============================================================================
// Health Check Tests
// ============================================================================

#[tokio::test]
async fn test_health_check_endpoint() {
    let (app, _, _) = create_test_server(MemoryAuthStore::new(), None);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_404_for_invalid_endpoint() {
    let (app, _, _) = create_test_server(MemoryAuthStore::new(), None);

    let response = app
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_paths_are_404_without_bearer() {
    let (app, _, _) = create_test_server(MemoryAuthStore::new(), None);

    for (method, uri) in [
        ("GET", "/api/nope"),
        ("POST", "/api/user/unknown"),
        ("GET", "/api/user/2fa"),
    ] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{method} {uri}");
    }
}

#[tokio::test]
async fn test_request_id_echoed() {
    let (app, _, _) = create_test_server(MemoryAuthStore::new(), None);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(REQUEST_ID_HEADER, "req-abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-abc");

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
}

// ============================================================================
// Login Tests
// ============================================================================

#[tokio::test]
async fn test_login_returns_token_and_user_id() {
    let (app, auth, _) = create_test_server(MemoryAuthStore::new().with_next_id(42), None);
    register(&auth, "alice@example.com", "correct-horse").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/login",
            json!({"email": "alice@example.com", "password": "correct-horse"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user_id"], 42);
    let token = body["token"].as_str().unwrap();
    assert_eq!(token.len(), 64);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    assert!(body.get("requires_2fa").is_none());

    let response = app
        .oneshot(bearer_request("GET", "/api/me", token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let profile = body_json(response).await;
    assert_eq!(profile["id"], 42);
    assert_eq!(profile["email"], "alice@example.com");
    assert!(profile.get("password_hash").is_none());
}

#[tokio::test]
async fn test_login_mounted_under_api() {
    let (app, auth, _) = create_test_server(MemoryAuthStore::new(), None);
    register(&auth, "bob@example.com", "password-123").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/login",
            json!({"email": "bob@example.com", "password": "password-123"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_invalid_login_returns_error() {
    let (app, auth, _) = create_test_server(MemoryAuthStore::new(), None);
    register(&auth, "carol@example.com", "password-123").await;

    for (email, password) in [
        ("carol@example.com", "wrong-password"),
        ("nobody@example.com", "password-123"),
    ] {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/login",
                json!({"email": email, "password": password}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "Invalid credentials");
    }
}

#[tokio::test]
async fn test_malformed_json_request() {
    let (app, _, _) = create_test_server(MemoryAuthStore::new(), None);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{invalid json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Invalid request");

    let response = app
        .oneshot(json_request("POST", "/login", json!({"email": "x@example.com"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_legacy_password_field_accepted() {
    let (app, auth, _) = create_test_server(MemoryAuthStore::new(), None);
    register(&auth, "dave@example.com", "password-123").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/login",
            json!({"email": "dave@example.com", "mot_de_passe": "password-123"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ============================================================================
// Bearer Tests
// ============================================================================

#[tokio::test]
async fn test_protected_route_requires_bearer() {
    let (app, _, _) = create_test_server(MemoryAuthStore::new(), None);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/me").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/me")
                .header(header::AUTHORIZATION, "Basic abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(bearer_request("GET", "/api/me", "deadbeef", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Unauthorized");
}

#[tokio::test]
async fn test_api_token_bearer() {
    let (app, auth, _) = create_test_server(MemoryAuthStore::new(), None);
    let owner = register(&auth, "erin@example.com", "password-123").await;
    let token = auth.bootstrap_api_token().await.unwrap().unwrap();

    let response = app
        .oneshot(bearer_request("GET", "/api/me", &token.key, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["id"], owner);
}

#[tokio::test]
async fn test_master_secret_bearer_acts_as_admin() {
    let (app, auth, store) = create_test_server(MemoryAuthStore::new(), Some(MASTER));
    register(&auth, "client@example.com", "password-123").await;
    let admin = register(&auth, "admin@example.com", "password-123").await;
    store.set_role(admin, "admin");

    let response = app
        .oneshot(bearer_request("GET", "/api/me", MASTER, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], admin);
    assert_eq!(body["role"], "admin");
}

// ============================================================================
// Registration Tests
// ============================================================================

#[tokio::test]
async fn test_register_endpoint() {
    let (app, _, _) = create_test_server(MemoryAuthStore::new(), None);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/register",
            json!({"email": "frank@example.com", "password": "password-123", "first_name": "Frank"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["email"], "frank@example.com");
    assert_eq!(body["role"], "client");
    assert_eq!(body["first_name"], "Frank");

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/register",
            json!({"email": "frank@example.com", "password": "password-456"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/register",
            json!({"email": "grace@example.com", "password": "short"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_email_exists_endpoint() {
    let (app, auth, _) = create_test_server(MemoryAuthStore::new(), None);
    register(&auth, "heidi@example.com", "password-123").await;

    let get = |uri: &'static str| Request::builder().uri(uri).body(Body::empty()).unwrap();

    let response = app
        .clone()
        .oneshot(get("/api/accounts/exists?email=heidi@example.com"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["exists"], true);

    let response = app
        .clone()
        .oneshot(get("/api/accounts/exists?email=ivan@example.com"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["exists"], false);

    let response = app.oneshot(get("/api/accounts/exists")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_legacy_registration_routes() {
    let (app, _, _) = create_test_server(MemoryAuthStore::new(), None);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/utilisateurs",
            json!({
                "email": "leon@example.com",
                "mot_de_passe": "password-123",
                "prenom": "Leon",
                "nom": "Durand",
                "telephone": "0612345678"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["email"], "leon@example.com");
    assert_eq!(body["first_name"], "Leon");
    assert_eq!(body["last_name"], "Durand");
    assert_eq!(body["phone"], "0612345678");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/utilisateurs/exists?email=leon@example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["exists"], true);

    login_token(&app, "leon@example.com", "password-123").await;
}

#[tokio::test]
async fn test_register_rejects_colon_in_email() {
    let (app, _, _) = create_test_server(MemoryAuthStore::new(), None);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/register",
            json!({"email": "a:b@example.com", "password": "password-123"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ============================================================================
// Profile Tests
// ============================================================================

#[tokio::test]
async fn test_update_profile_endpoint() {
    let (app, auth, _) = create_test_server(MemoryAuthStore::new(), None);
    let id = register(&auth, "mallory@example.com", "password-123").await;
    register(&auth, "niaj@example.com", "password-123").await;
    let token = login_token(&app, "mallory@example.com", "password-123").await;

    let response = app
        .clone()
        .oneshot(bearer_request(
            "PUT",
            "/api/user/profile",
            &token,
            Some(json!({
                "email": "mallory.new@example.com",
                "prenom": "Mallory",
                "nom": "Petit",
                "telephone": "0700000000"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], id);
    assert_eq!(body["email"], "mallory.new@example.com");
    assert_eq!(body["first_name"], "Mallory");
    assert_eq!(body["last_name"], "Petit");
    assert_eq!(body["phone"], "0700000000");

    let response = app
        .clone()
        .oneshot(bearer_request("GET", "/api/user/profile", &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["email"], "mallory.new@example.com");

    let response = app
        .clone()
        .oneshot(bearer_request(
            "PUT",
            "/api/user/profile",
            &token,
            Some(json!({"email": "niaj@example.com"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .oneshot(json_request(
            "PUT",
            "/api/user/profile",
            json!({"email": "nobody@example.com"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Two-Factor Tests
// ============================================================================

#[tokio::test]
async fn test_two_factor_enrollment_and_login() {
    let (app, auth, store) = create_test_server(MemoryAuthStore::new(), None);
    register(&auth, "judy@example.com", "password-123").await;
    let token = login_token(&app, "judy@example.com", "password-123").await;

    // Setup returns material but stores nothing.
    let response = app
        .clone()
        .oneshot(bearer_request("POST", "/api/user/2fa/setup", &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let setup = body_json(response).await;
    let secret = setup["secret"].as_str().unwrap().to_string();
    assert!(setup["otpauth_url"].as_str().unwrap().starts_with("otpauth://totp/"));
    assert!(setup["qr_code"].as_str().unwrap().starts_with("data:image/png;base64,"));
    assert_eq!(store.session_count(), 1);

    // Wrong code is refused.
    let response = app
        .clone()
        .oneshot(bearer_request(
            "POST",
            "/api/user/2fa/verify",
            &token,
            Some(json!({"secret": secret, "code": "not-a-code"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let code = totp::code_at(&secret, now_unix()).unwrap();
    let response = app
        .clone()
        .oneshot(bearer_request(
            "POST",
            "/api/user/2fa/verify",
            &token,
            Some(json!({"secret": secret, "code": code})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Password alone now asks for the second factor.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/login",
            json!({"email": "judy@example.com", "password": "password-123"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body, json!({"requires_2fa": true}));
    assert_eq!(store.session_count(), 1);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/login",
            json!({"email": "judy@example.com", "password": "password-123", "totp_code": "000000x"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Invalid 2FA code");

    let code = totp::code_at(&secret, now_unix()).unwrap();
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/login",
            json!({"email": "judy@example.com", "password": "password-123", "totp_code": code}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["token"].is_string());

    // Removing 2FA restores password-only login.
    let response = app
        .clone()
        .oneshot(bearer_request("DELETE", "/api/user/2fa/remove", &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    login_token(&app, "judy@example.com", "password-123").await;
}

#[tokio::test]
async fn test_two_factor_routes_require_bearer() {
    let (app, _, _) = create_test_server(MemoryAuthStore::new(), None);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/user/2fa/setup")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
