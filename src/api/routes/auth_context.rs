//! Authentication context extractor.
//!
//! Accepts the session cookie first, then a bearer token. A token must be
//! signed and unexpired AND equal the account's stored current token;
//! anything older has been superseded by a login on another device.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::CookieJar;

use super::app_state::AppState;
use super::error::ApiError;
use crate::services::jwt_service::JwtService;
use crate::storage::users;

/// Name of the session cookie set on login.
pub const AUTH_COOKIE: &str = "auth_token";

/// Authenticated account extracted from the request.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub user_id: i64,
    pub email: String,
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);

        // Cookie takes precedence over the Authorization header.
        let cookie_token = jar.get(AUTH_COOKIE).map(|c| c.value().to_string());
        let token = match cookie_token {
            Some(token) => token,
            None => parts
                .headers
                .get("authorization")
                .and_then(|h| h.to_str().ok())
                .and_then(JwtService::extract_bearer_token)
                .map(str::to_string)
                .ok_or_else(ApiError::auth_required)?,
        };

        let claims = state.jwt.validate_token(&token).map_err(|e| {
            tracing::warn!("JWT validation failed: {}", e);
            ApiError::auth_required()
        })?;

        let mut conn = state.pool.acquire().await.map_err(|e| {
            tracing::error!("Failed to acquire connection: {}", e);
            ApiError::internal("Internal server error")
        })?;

        let user = users::find_by_id(&mut conn, claims.user_id)
            .await
            .map_err(ApiError::from)?
            .ok_or_else(ApiError::auth_required)?;

        // Single active session: only the most recently minted token counts.
        if user.current_token.as_deref() != Some(token.as_str()) {
            return Err(ApiError::session_expired());
        }

        Ok(AuthContext {
            user_id: user.id,
            email: user.email,
        })
    }
}
