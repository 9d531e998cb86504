//! API routes module - organizes all route handlers.
//!
//! Diagram and account endpoints are nested under /sync/api to match the
//! client's base path.

pub mod app_state;
pub mod auth;
pub mod auth_context;
pub mod diagrams;
pub mod error;
pub mod oidc;

use axum::Router;
use axum::routing::get;
use serde_json::{Value, json};

pub use app_state::AppState;
pub use auth_context::AuthContext;
pub use error::ApiError;

/// Create the main API router combining all route modules.
pub fn create_router(app_state: AppState) -> Router {
    let api = Router::new()
        .nest("/auth", auth::router())
        .nest("/auth/oidc", oidc::router())
        .nest("/diagrams", diagrams::router());

    Router::new()
        .route("/health", get(health_check))
        .route("/sync/api/health", get(health_check))
        .nest("/sync/api", api)
        .with_state(app_state)
}

async fn health_check() -> axum::Json<Value> {
    axum::Json(json!({
        "status": "ok",
        "service": "diagram-sync-api",
    }))
}
