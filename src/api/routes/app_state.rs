//! Application state management.
//!
//! Defines the AppState struct that holds all shared application state:
//! the database pool, the sync coordinator, the JWT service, and the
//! optional OIDC provider.

use std::str::FromStr;
use std::sync::Arc;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

use crate::services::jwt_service::{JwtService, SharedJwtService};
use crate::services::oidc_service::{OidcConfig, OidcService};
use crate::services::sync_service::SyncService;
use crate::storage::StorageError;

/// Application state shared across all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection pool
    pub pool: SqlitePool,
    /// Sync coordinator for diagram protocols
    pub sync: SyncService,
    /// JWT service for session tokens
    pub jwt: SharedJwtService,
    /// OIDC provider, present only when configured
    pub oidc: Option<Arc<OidcService>>,
}

impl AppState {
    /// Assemble state from already-built parts. Used by tests.
    pub fn new(pool: SqlitePool, jwt: JwtService, oidc: Option<Arc<OidcService>>) -> Self {
        Self {
            sync: SyncService::new(pool.clone()),
            pool,
            jwt: Arc::new(jwt),
            oidc,
        }
    }

    /// Open (creating if necessary) the SQLite database at `database_path`,
    /// run migrations, and build full application state from the
    /// environment.
    pub async fn init(database_path: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", database_path))
            .map_err(|e| StorageError::Other(format!("invalid database path: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StorageError::Other(format!("migration failed: {}", e)))?;

        info!("Database ready at {}", database_path);

        let oidc = match OidcConfig::from_env() {
            Some(config) => match OidcService::discover(config).await {
                Ok(service) => Some(Arc::new(service)),
                Err(e) => {
                    tracing::error!("OIDC configured but discovery failed: {}", e);
                    None
                }
            },
            None => {
                info!("OIDC not configured, single sign-on disabled");
                None
            }
        };

        Ok(Self::new(pool, JwtService::from_env(), oidc))
    }
}
