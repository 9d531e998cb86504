//! Account routes: signup, login, logout, profile, password change.
//!
//! Login and signup mint a session token, store it as the account's sole
//! current token, and set it as an HttpOnly cookie alongside returning it in
//! the response body for clients that prefer bearer headers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::SET_COOKIE;
use axum::response::{AppendHeaders, IntoResponse};
use axum::routing::{get, post, put};
use axum_extra::extract::WithRejection;
use serde_json::json;

use super::app_state::AppState;
use super::auth_context::{AUTH_COOKIE, AuthContext};
use super::error::ApiError;
use crate::models::{
    AuthResponse, ChangePasswordRequest, LoginRequest, SignupRequest, UpdateProfileRequest,
    UserResponse,
};
use crate::storage::users;

const COOKIE_MAX_AGE_SECONDS: i64 = 7 * 24 * 60 * 60;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me).put(update_profile))
        .route("/password", put(change_password))
}

pub(super) fn session_cookie(token: &str) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        AUTH_COOKIE, token, COOKIE_MAX_AGE_SECONDS
    );
    let app_env = std::env::var("APP_ENV").unwrap_or_default();
    if app_env.to_lowercase() == "production" {
        cookie.push_str("; Secure");
    }
    cookie
}

fn clear_session_cookie() -> String {
    format!("{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax", AUTH_COOKIE)
}

fn validate_credentials(email: &str, password: &str) -> Result<(), ApiError> {
    if !email.contains('@') {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    if password.len() < 6 {
        return Err(ApiError::bad_request(
            "Password must be at least 6 characters",
        ));
    }
    Ok(())
}

async fn signup(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<SignupRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    validate_credentials(&req.email, &req.password)?;

    let mut conn = state.pool.acquire().await.map_err(storage_failure)?;

    if users::find_by_email(&mut conn, &req.email).await?.is_some() {
        return Err(ApiError::bad_request("Email already registered"));
    }

    let password_hash = bcrypt::hash(&req.password, bcrypt::DEFAULT_COST)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;

    let name = if req.name.is_empty() {
        req.email.clone()
    } else {
        req.name.clone()
    };

    let user = users::create(
        &mut conn,
        users::NewUser {
            email: &req.email,
            password_hash: &password_hash,
            name: &name,
            auth_provider: "local",
            oidc_subject: None,
            oidc_issuer: None,
        },
    )
    .await?;

    let token = mint_session(&state, &mut conn, user.id, &user.email).await?;

    Ok((
        StatusCode::CREATED,
        AppendHeaders([(SET_COOKIE, session_cookie(&token))]),
        Json(AuthResponse {
            token,
            user: UserResponse::from(&user),
        }),
    ))
}

async fn login(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let mut conn = state.pool.acquire().await.map_err(storage_failure)?;

    let user = users::find_by_email(&mut conn, &req.email)
        .await?
        .ok_or_else(invalid_credentials)?;

    let valid = bcrypt::verify(&req.password, &user.password_hash)
        .map_err(|e| ApiError::internal(format!("Failed to verify password: {}", e)))?;
    if !valid {
        return Err(invalid_credentials());
    }

    let token = mint_session(&state, &mut conn, user.id, &user.email).await?;

    Ok((
        AppendHeaders([(SET_COOKIE, session_cookie(&token))]),
        Json(AuthResponse {
            token,
            user: UserResponse::from(&user),
        }),
    ))
}

async fn logout(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<impl IntoResponse, ApiError> {
    let mut conn = state.pool.acquire().await.map_err(storage_failure)?;
    users::clear_current_token(&mut conn, auth.user_id).await?;

    Ok((
        AppendHeaders([(SET_COOKIE, clear_session_cookie())]),
        Json(json!({ "message": "Logged out successfully" })),
    ))
}

async fn me(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<UserResponse>, ApiError> {
    let mut conn = state.pool.acquire().await.map_err(storage_failure)?;
    let user = users::find_by_id(&mut conn, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(UserResponse::from(&user)))
}

async fn update_profile(
    State(state): State<AppState>,
    auth: AuthContext,
    WithRejection(Json(req), _): WithRejection<Json<UpdateProfileRequest>, ApiError>,
) -> Result<Json<UserResponse>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("Name cannot be empty"));
    }

    let mut conn = state.pool.acquire().await.map_err(storage_failure)?;
    users::update_profile(&mut conn, auth.user_id, req.name.trim()).await?;

    let user = users::find_by_id(&mut conn, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(UserResponse::from(&user)))
}

async fn change_password(
    State(state): State<AppState>,
    auth: AuthContext,
    WithRejection(Json(req), _): WithRejection<Json<ChangePasswordRequest>, ApiError>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.new_password.len() < 6 {
        return Err(ApiError::bad_request(
            "Password must be at least 6 characters",
        ));
    }

    let mut conn = state.pool.acquire().await.map_err(storage_failure)?;
    let user = users::find_by_id(&mut conn, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let valid = bcrypt::verify(&req.current_password, &user.password_hash)
        .map_err(|e| ApiError::internal(format!("Failed to verify password: {}", e)))?;
    if !valid {
        return Err(ApiError::bad_request("Current password is incorrect"));
    }

    let password_hash = bcrypt::hash(&req.new_password, bcrypt::DEFAULT_COST)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;
    users::update_password(&mut conn, auth.user_id, &password_hash).await?;

    Ok(Json(json!({ "message": "Password updated successfully" })))
}

/// Mint a token and make it the account's sole live session.
pub(super) async fn mint_session(
    state: &AppState,
    conn: &mut sqlx::SqliteConnection,
    user_id: i64,
    email: &str,
) -> Result<String, ApiError> {
    let token = state
        .jwt
        .generate_token(user_id, email)
        .map_err(|e| ApiError::internal(format!("Failed to generate token: {}", e)))?;
    users::set_current_token(conn, user_id, &token).await?;
    Ok(token)
}

fn invalid_credentials() -> ApiError {
    ApiError::new(
        StatusCode::UNAUTHORIZED,
        "INVALID_CREDENTIALS",
        "Invalid email or password",
    )
}

fn storage_failure(e: sqlx::Error) -> ApiError {
    tracing::error!("Failed to acquire connection: {}", e);
    ApiError::internal("Internal server error")
}
