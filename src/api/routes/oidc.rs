//! OIDC login routes.
//!
//! The login route issues a random CSRF state, stores it in a short-lived
//! cookie, and redirects to the provider; the callback checks the state,
//! resolves the external identity to an account, and starts a session.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::response::{AppendHeaders, IntoResponse, Redirect};
use axum::routing::get;
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::json;

use super::app_state::AppState;
use super::auth;
use super::error::ApiError;
use crate::services::oidc_service;

const STATE_COOKIE: &str = "oidc_state";

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/login", get(login))
        .route("/callback", get(callback))
        .route("/enabled", get(enabled))
}

async fn enabled(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "enabled": state.oidc.is_some() }))
}

async fn login(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let oidc = state
        .oidc
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("OIDC is not enabled"))?;

    let csrf_state = format!("{:032x}", rand::random::<u128>());
    let cookie = format!(
        "{}={}; Path=/; Max-Age=600; HttpOnly; SameSite=Lax",
        STATE_COOKIE, csrf_state
    );
    let url = oidc.authorize_url(&csrf_state);

    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        Redirect::temporary(&url),
    ))
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let oidc = state
        .oidc
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("OIDC is not enabled"))?;

    if let Some(error) = query.error {
        return Err(ApiError::bad_request(format!("Provider error: {}", error)));
    }

    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing authorization code"))?;

    let expected_state = jar
        .get(STATE_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| ApiError::bad_request("Missing state cookie"))?;
    if query.state.as_deref() != Some(expected_state.as_str()) {
        return Err(ApiError::bad_request("State mismatch"));
    }

    let identity = oidc.exchange_code(&code).await.map_err(|e| {
        tracing::error!("OIDC code exchange failed: {}", e);
        ApiError::bad_request("Failed to authenticate with provider")
    })?;

    let mut conn = state.pool.acquire().await.map_err(|e| {
        tracing::error!("Failed to acquire connection: {}", e);
        ApiError::internal("Internal server error")
    })?;

    let user = oidc_service::resolve_account(&mut conn, &identity).await?;
    let token = auth::mint_session(&state, &mut conn, user.id, &user.email).await?;

    let session_cookie = auth::session_cookie(&token);
    let clear_state = format!("{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax", STATE_COOKIE);

    let frontend = std::env::var("FRONTEND_URL").unwrap_or_else(|_| "/".to_string());

    Ok((
        AppendHeaders([(SET_COOKIE, session_cookie), (SET_COOKIE, clear_state)]),
        Redirect::temporary(&frontend),
    ))
}
