//! Diagram sync routes: push, sync, snapshot, pull, history management.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use serde_json::{Value, json};

use super::app_state::AppState;
use super::auth_context::AuthContext;
use super::error::ApiError;
use crate::models::{
    DiagramDocument, DiagramSummary, MutationResponse, PullAllResponse, SnapshotRequest,
    VersionSummary,
};
use crate::services::sync_service::PushOutcome;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/", get(list))
        .route("/push", post(push))
        .route("/sync", post(sync))
        .route("/pull-all", get(pull_all))
        .route("/pull/{diagram_id}", get(pull))
        .route("/{diagram_id}", get(get_diagram).delete(delete_diagram))
        .route("/{diagram_id}/versions", get(versions))
        .route("/{diagram_id}/versions/{version}", delete(delete_version))
        .route("/{diagram_id}/snapshot", post(snapshot))
}

fn require_id(doc: &DiagramDocument) -> Result<(), ApiError> {
    if doc.id.is_empty() {
        return Err(ApiError::bad_request("Diagram id is required"));
    }
    Ok(())
}

async fn push(
    State(state): State<AppState>,
    auth: AuthContext,
    WithRejection(Json(doc), _): WithRejection<Json<DiagramDocument>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    require_id(&doc)?;

    let result = state.sync.push(auth.user_id, &doc).await?;
    let (status, message) = match result.outcome {
        PushOutcome::Created => (StatusCode::CREATED, "Diagram created successfully"),
        PushOutcome::Restored => (StatusCode::OK, "Diagram restored successfully"),
        PushOutcome::Updated => (StatusCode::OK, "Diagram updated successfully"),
    };

    Ok((
        status,
        Json(MutationResponse {
            message: message.to_string(),
            diagram_id: result.external_id,
            version: result.version,
            is_new: None,
        }),
    ))
}

async fn sync(
    State(state): State<AppState>,
    auth: AuthContext,
    WithRejection(Json(doc), _): WithRejection<Json<DiagramDocument>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    require_id(&doc)?;

    let result = state.sync.sync(auth.user_id, &doc).await?;
    let status = if result.is_new {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(MutationResponse {
            message: "Diagram synced successfully".to_string(),
            diagram_id: result.external_id,
            version: result.version,
            is_new: Some(result.is_new),
        }),
    ))
}

async fn snapshot(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(diagram_id): Path<String>,
    WithRejection(Json(req), _): WithRejection<Json<SnapshotRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .sync
        .snapshot(auth.user_id, &diagram_id, &req.description)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MutationResponse {
            message: "Snapshot created successfully".to_string(),
            diagram_id: result.external_id,
            version: result.version,
            is_new: None,
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct PullQuery {
    version: Option<String>,
}

async fn pull(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(diagram_id): Path<String>,
    Query(query): Query<PullQuery>,
) -> Result<Json<Value>, ApiError> {
    // An unparseable version is a client error, not a missing version.
    let version = match query.version.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<i64>()
                .map_err(|_| ApiError::bad_request("Invalid version number"))?,
        ),
    };

    let doc = state.sync.pull(auth.user_id, &diagram_id, version).await?;
    Ok(Json(doc))
}

async fn pull_all(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<PullAllResponse>, ApiError> {
    let diagrams = state.sync.pull_all(auth.user_id).await?;
    let count = diagrams.len();
    Ok(Json(PullAllResponse { diagrams, count }))
}

async fn list(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<DiagramSummary>>, ApiError> {
    let diagrams = state.sync.list(auth.user_id).await?;
    Ok(Json(diagrams.iter().map(DiagramSummary::from).collect()))
}

async fn get_diagram(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(diagram_id): Path<String>,
) -> Result<Json<DiagramSummary>, ApiError> {
    let diagram = state.sync.get(auth.user_id, &diagram_id).await?;
    Ok(Json(DiagramSummary::from(&diagram)))
}

async fn delete_diagram(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(diagram_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.sync.delete_diagram(auth.user_id, &diagram_id).await?;
    Ok(Json(json!({ "message": "Diagram deleted successfully" })))
}

async fn versions(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(diagram_id): Path<String>,
) -> Result<Json<Vec<VersionSummary>>, ApiError> {
    let versions = state.sync.versions(auth.user_id, &diagram_id).await?;
    Ok(Json(versions.iter().map(VersionSummary::from).collect()))
}

async fn delete_version(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((diagram_id, version)): Path<(String, i64)>,
) -> Result<Json<Value>, ApiError> {
    state
        .sync
        .delete_version(auth.user_id, &diagram_id, version)
        .await?;
    Ok(Json(json!({ "message": "Version deleted successfully" })))
}
