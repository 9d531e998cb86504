//! JWT service for session token generation and validation.
//!
//! Tokens are HS256-signed and live for 7 days. A token being signed and
//! unexpired is necessary but not sufficient for authentication: the session
//! authority additionally requires it to equal the account's stored current
//! token (single active session per account).

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

const TOKEN_ISSUER: &str = "diagram-sync-api";

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account identifier
    pub user_id: i64,
    /// Account email
    pub email: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Issuer
    pub iss: String,
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_duration: Duration,
}

impl JwtService {
    /// Create a new JWT service with the given secret (at least 32 bytes).
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_duration: Duration::days(7),
        }
    }

    /// Create a JWT service from environment variables.
    ///
    /// In production (APP_ENV != "development") this panics if JWT_SECRET is
    /// not set or too short; in development it falls back to an insecure
    /// default with a warning.
    ///
    /// # Panics
    /// Panics in production if JWT_SECRET is missing or shorter than 32 bytes.
    pub fn from_env() -> Self {
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "production".to_string());
        let is_development = app_env.to_lowercase() == "development";

        let secret = match std::env::var("JWT_SECRET") {
            Ok(s) => s,
            Err(_) => {
                if is_development {
                    warn!(
                        "JWT_SECRET not set! Using default secret for development. DO NOT USE IN PRODUCTION!"
                    );
                    "dev-secret-do-not-use-in-production-change-me-now".to_string()
                } else {
                    panic!(
                        "CRITICAL: JWT_SECRET environment variable is required in production. Set APP_ENV=development to use default secret."
                    );
                }
            }
        };

        if secret.len() < 32 {
            if is_development {
                warn!("JWT_SECRET is less than 32 characters. Consider using a longer secret.");
            } else {
                panic!("CRITICAL: JWT_SECRET must be at least 32 characters in production.");
            }
        }

        Self::new(&secret)
    }

    /// Mint a session token for an account.
    pub fn generate_token(&self, user_id: i64, email: &str) -> Result<String, String> {
        let now = Utc::now();
        let claims = Claims {
            user_id,
            email: email.to_string(),
            exp: (now + self.token_duration).timestamp(),
            iat: now.timestamp(),
            iss: TOKEN_ISSUER.to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| format!("Failed to encode token: {}", e))
    }

    /// Decode and validate a token (signature and expiration).
    pub fn validate_token(&self, token: &str) -> Result<Claims, String> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    "Token has expired".to_string()
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    "Invalid token format".to_string()
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    "Invalid token signature".to_string()
                }
                _ => format!("Token validation failed: {}", e),
            })
    }

    /// Extract bearer token from an Authorization header value.
    pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
        auth_header.strip_prefix("Bearer ")
    }
}

/// Shared JWT service for use across the application
pub type SharedJwtService = Arc<JwtService>;
