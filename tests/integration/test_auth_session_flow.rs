//! Account and session lifecycle tests, including the single-active-session
//! rule and cookie handling.

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{Value, json};
use sqlx::sqlite::SqlitePoolOptions;

use diagram_sync_api::routes::{self, AppState};
use diagram_sync_api::services::jwt_service::JwtService;

const TEST_SECRET: &str = "test-secret-key-at-least-32-chars";

async fn test_server() -> TestServer {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations failed");

    let state = AppState::new(pool, JwtService::new(TEST_SECRET), None);
    TestServer::new(routes::create_router(state)).unwrap()
}

fn bearer(token: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("authorization"),
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    )
}

fn cookie(token: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("cookie"),
        HeaderValue::from_str(&format!("auth_token={}", token)).unwrap(),
    )
}

async fn signup(server: &TestServer, email: &str, password: &str) -> Value {
    let response = server
        .post("/sync/api/auth/signup")
        .json(&json!({
            "email": email,
            "password": password,
            "name": "Test User",
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    response.json::<Value>()
}

#[tokio::test]
async fn test_signup_returns_token_and_cookie() {
    let server = test_server().await;

    let response = server
        .post("/sync/api/auth/signup")
        .json(&json!({
            "email": "a@example.com",
            "password": "password123",
            "name": "Alice",
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);

    let body = response.json::<Value>();
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(body["user"]["email"], "a@example.com");
    assert_eq!(body["user"]["name"], "Alice");

    let set_cookie = response
        .headers()
        .get("set-cookie")
        .expect("signup should set the session cookie")
        .to_str()
        .unwrap();
    assert!(set_cookie.starts_with("auth_token="));
    assert!(set_cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn test_signup_validation() {
    let server = test_server().await;

    let response = server
        .post("/sync/api/auth/signup")
        .json(&json!({ "email": "not-an-email", "password": "password123" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = server
        .post("/sync/api/auth/signup")
        .json(&json!({ "email": "a@example.com", "password": "short" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    signup(&server, "a@example.com", "password123").await;
    let response = server
        .post("/sync/api/auth/signup")
        .json(&json!({ "email": "a@example.com", "password": "password123" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    // A body that does not deserialize gets the same structured shape.
    let response = server
        .post("/sync/api/auth/signup")
        .json(&json!({ "email": "b@example.com" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "VALIDATION");
}

#[tokio::test]
async fn test_login_rejects_bad_credentials() {
    let server = test_server().await;
    signup(&server, "a@example.com", "password123").await;

    let response = server
        .post("/sync/api/auth/login")
        .json(&json!({ "email": "a@example.com", "password": "wrong-password" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["code"], "INVALID_CREDENTIALS");

    let response = server
        .post("/sync/api/auth/login")
        .json(&json!({ "email": "nobody@example.com", "password": "password123" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_supersedes_previous_session() {
    let server = test_server().await;
    let first = signup(&server, "a@example.com", "password123").await;
    let first_token = first["token"].as_str().unwrap().to_string();

    // First session works.
    let (name, value) = bearer(&first_token);
    let response = server.get("/sync/api/auth/me").add_header(name, value).await;
    assert_eq!(response.status_code(), StatusCode::OK);

    // Logging in from another device mints a new token.
    let response = server
        .post("/sync/api/auth/login")
        .json(&json!({ "email": "a@example.com", "password": "password123" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let second_token = response.json::<Value>()["token"]
        .as_str()
        .unwrap()
        .to_string();
    assert_ne!(first_token, second_token);

    // The first token is still validly signed but no longer current.
    let (name, value) = bearer(&first_token);
    let response = server.get("/sync/api/auth/me").add_header(name, value).await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["code"], "SESSION_EXPIRED");

    let (name, value) = bearer(&second_token);
    let response = server.get("/sync/api/auth/me").add_header(name, value).await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_logout_invalidates_the_session() {
    let server = test_server().await;
    let body = signup(&server, "a@example.com", "password123").await;
    let token = body["token"].as_str().unwrap().to_string();

    let (name, value) = bearer(&token);
    let response = server
        .post("/sync/api/auth/logout")
        .add_header(name.clone(), value.clone())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    // The cookie is cleared and the token no longer authenticates.
    let set_cookie = response
        .headers()
        .get("set-cookie")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(set_cookie.contains("Max-Age=0"));

    let response = server.get("/sync/api/auth/me").add_header(name, value).await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cookie_authenticates_and_outranks_bearer() {
    let server = test_server().await;
    let body = signup(&server, "a@example.com", "password123").await;
    let token = body["token"].as_str().unwrap().to_string();

    // Cookie alone is enough.
    let (c_name, c_value) = cookie(&token);
    let response = server
        .get("/sync/api/auth/me")
        .add_header(c_name.clone(), c_value.clone())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    // With both present the cookie wins, so a stale bearer is harmless.
    let (b_name, b_value) = bearer("garbage-token");
    let response = server
        .get("/sync/api/auth/me")
        .add_header(c_name, c_value)
        .add_header(b_name, b_value)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["email"], "a@example.com");
}

#[tokio::test]
async fn test_forged_token_is_rejected() {
    let server = test_server().await;
    signup(&server, "a@example.com", "password123").await;

    let forged = JwtService::new("another-secret-key-at-least-32-chars")
        .generate_token(1, "a@example.com")
        .unwrap();
    let (name, value) = bearer(&forged);
    let response = server.get("/sync/api/auth/me").add_header(name, value).await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["code"], "AUTH_REQUIRED");
}

#[tokio::test]
async fn test_profile_update_and_password_change() {
    let server = test_server().await;
    let body = signup(&server, "a@example.com", "password123").await;
    let token = body["token"].as_str().unwrap().to_string();
    let (name, value) = bearer(&token);

    let response = server
        .put("/sync/api/auth/me")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "name": "Renamed" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["name"], "Renamed");

    let response = server
        .put("/sync/api/auth/password")
        .add_header(name.clone(), value.clone())
        .json(&json!({
            "current_password": "wrong",
            "new_password": "newpassword1",
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = server
        .put("/sync/api/auth/password")
        .add_header(name.clone(), value.clone())
        .json(&json!({
            "current_password": "password123",
            "new_password": "newpassword1",
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    // Old password no longer works; the new one does.
    let response = server
        .post("/sync/api/auth/login")
        .json(&json!({ "email": "a@example.com", "password": "password123" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    let response = server
        .post("/sync/api/auth/login")
        .json(&json!({ "email": "a@example.com", "password": "newpassword1" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_oidc_disabled_when_unconfigured() {
    let server = test_server().await;

    let response = server.get("/sync/api/auth/oidc/enabled").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["enabled"], false);

    let response = server.get("/sync/api/auth/oidc/login").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[serial_test::serial]
async fn test_app_state_init_creates_database() {
    // SAFETY: serialized with other env-mutating tests.
    unsafe {
        std::env::set_var("APP_ENV", "development");
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sync.db");
    let state = AppState::init(path.to_str().unwrap())
        .await
        .expect("init should create the database");
    assert!(path.exists());
    assert!(state.oidc.is_none());

    let server = TestServer::new(routes::create_router(state)).unwrap();
    let response = server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    unsafe {
        std::env::remove_var("APP_ENV");
    }
}
