//! OIDC service for single sign-on via any standards-compliant provider.
//!
//! Endpoints are resolved once at startup from the issuer's discovery
//! document. Account resolution order on callback: existing account with the
//! same subject, then linking onto a local account with the provider's email,
//! then creating a fresh account.

use anyhow::{Context, Result};
use rand::RngCore;
use serde::Deserialize;
use sqlx::SqliteConnection;
use tracing::{info, warn};

use crate::models::User;
use crate::storage::{StorageError, users};

/// Static provider settings, read from the environment.
#[derive(Clone)]
pub struct OidcConfig {
    pub issuer: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

impl OidcConfig {
    /// Read provider settings from the environment. Returns `None` when the
    /// required variables are absent, which disables OIDC entirely.
    pub fn from_env() -> Option<Self> {
        let issuer = std::env::var("OIDC_ISSUER").ok()?;
        let client_id = std::env::var("OIDC_CLIENT_ID").ok()?;
        let client_secret = std::env::var("OIDC_CLIENT_SECRET").ok()?;
        let redirect_url = std::env::var("OIDC_REDIRECT_URL").ok()?;
        if issuer.is_empty() || client_id.is_empty() {
            return None;
        }
        Some(Self {
            issuer,
            client_id,
            client_secret,
            redirect_url,
        })
    }
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    authorization_endpoint: String,
    token_endpoint: String,
    userinfo_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[allow(dead_code)]
    token_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    email: Option<String>,
    name: Option<String>,
    preferred_username: Option<String>,
}

/// Identity asserted by the provider after a successful callback.
#[derive(Debug, Clone)]
pub struct ExternalIdentity {
    pub issuer: String,
    pub subject: String,
    pub email: String,
    pub name: String,
}

#[derive(Clone)]
pub struct OidcService {
    config: OidcConfig,
    authorization_endpoint: String,
    token_endpoint: String,
    userinfo_endpoint: String,
    http_client: reqwest::Client,
}

impl OidcService {
    /// Fetch the issuer's discovery document and build the service.
    pub async fn discover(config: OidcConfig) -> Result<Self> {
        let http_client = reqwest::Client::new();
        let discovery_url = format!(
            "{}/.well-known/openid-configuration",
            config.issuer.trim_end_matches('/')
        );

        let response = http_client
            .get(&discovery_url)
            .send()
            .await
            .context("Failed to fetch OIDC discovery document")?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("OIDC discovery failed: {}", error_text));
        }

        let document: DiscoveryDocument = response
            .json()
            .await
            .context("Failed to parse OIDC discovery document")?;

        info!("OIDC provider discovered: {}", config.issuer);

        Ok(Self {
            config,
            authorization_endpoint: document.authorization_endpoint,
            token_endpoint: document.token_endpoint,
            userinfo_endpoint: document.userinfo_endpoint,
            http_client,
        })
    }

    /// Generate the provider authorization URL with an explicit `state`
    /// value. The caller stores the state in a cookie and checks it on
    /// callback.
    pub fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope=openid+profile+email&state={}",
            self.authorization_endpoint,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_url),
            urlencoding::encode(state)
        )
    }

    /// Exchange an authorization code for the provider's view of the user.
    pub async fn exchange_code(&self, code: &str) -> Result<ExternalIdentity> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_url.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.token_endpoint)
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .context("Failed to send token request to OIDC provider")?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "OIDC token exchange failed: {}",
                error_text
            ));
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("Failed to parse OIDC token response")?;

        self.fetch_user_info(&token.access_token).await
    }

    async fn fetch_user_info(&self, access_token: &str) -> Result<ExternalIdentity> {
        let response = self
            .http_client
            .get(&self.userinfo_endpoint)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await
            .context("Failed to fetch userinfo from OIDC provider")?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("OIDC userinfo failed: {}", error_text));
        }

        let info: UserInfo = response
            .json()
            .await
            .context("Failed to parse OIDC userinfo response")?;

        let email = info
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| anyhow::anyhow!("OIDC provider did not supply an email"))?;

        let name = info
            .name
            .or(info.preferred_username)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| email.clone());

        Ok(ExternalIdentity {
            issuer: self.config.issuer.clone(),
            subject: info.sub,
            email,
            name,
        })
    }
}

/// Map an external identity to a local account.
///
/// Resolution order: an account already bound to the subject wins; otherwise
/// an account with the same email is linked to the identity; otherwise a new
/// account is created. Created accounts get an unguessable random credential
/// so password login stays closed for them.
pub async fn resolve_account(
    conn: &mut SqliteConnection,
    identity: &ExternalIdentity,
) -> Result<User, StorageError> {
    if let Some(user) = users::find_by_oidc_subject(conn, &identity.subject).await? {
        return Ok(user);
    }

    if let Some(user) = users::find_by_email(conn, &identity.email).await? {
        warn!(
            "Linking OIDC identity to existing account: {}",
            identity.email
        );
        users::link_oidc(conn, user.id, &identity.issuer, &identity.subject).await?;
        return users::find_by_id(conn, user.id)
            .await?
            .ok_or_else(|| StorageError::not_found("user"));
    }

    let mut credential = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut credential);
    let password_hash = bcrypt::hash(credential, bcrypt::DEFAULT_COST)
        .map_err(|e| StorageError::Other(format!("failed to hash credential: {e}")))?;

    info!("Creating account from OIDC identity: {}", identity.email);
    users::create(
        conn,
        users::NewUser {
            email: &identity.email,
            password_hash: &password_hash,
            name: &identity.name,
            auth_provider: "oidc",
            oidc_subject: Some(&identity.subject),
            oidc_issuer: Some(&identity.issuer),
        },
    )
    .await
}
