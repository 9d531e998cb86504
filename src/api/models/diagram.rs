//! Diagram registry rows, version history rows, and sync wire types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Diagram registry row.
///
/// `diagram_id` is the client-chosen stable identifier; `id` is the
/// store-assigned one. `version` is the authoritative current version
/// counter. A non-null `deleted_at` marks a soft-deleted diagram, which is
/// excluded from normal lookups but restorable by a later push.
#[derive(Debug, Clone, FromRow)]
pub struct Diagram {
    pub id: i64,
    pub diagram_id: String,
    pub user_id: i64,
    pub name: String,
    pub database_type: String,
    pub database_edition: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Version history row. Immutable once written, except that the sync
/// protocol overwrites `data` of the latest row in place.
#[derive(Debug, Clone, FromRow)]
pub struct DiagramVersion {
    pub id: i64,
    pub diagram_id: i64,
    pub version: i64,
    pub data: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Push/sync request body in the client's JSON backup format.
///
/// The engine only interprets the identity and metadata fields; everything
/// else (tables, relationships, areas, notes, custom types, ...) is captured
/// by the flattened map and stored verbatim as the version payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagramDocument {
    pub id: String,
    pub name: String,
    #[serde(rename = "databaseType", default)]
    pub database_type: String,
    #[serde(
        rename = "databaseEdition",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub database_edition: String,
    /// Optional version description, stored alongside the snapshot.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(flatten)]
    pub document: serde_json::Map<String, serde_json::Value>,
}

/// Registry metadata carried by push/sync requests.
#[derive(Debug, Clone)]
pub struct DiagramMeta {
    pub name: String,
    pub database_type: String,
    pub database_edition: String,
}

impl From<&DiagramDocument> for DiagramMeta {
    fn from(doc: &DiagramDocument) -> Self {
        Self {
            name: doc.name.clone(),
            database_type: doc.database_type.clone(),
            database_edition: doc.database_edition.clone(),
        }
    }
}

/// Response body for push, sync, snapshot and delete operations.
#[derive(Debug, Serialize)]
pub struct MutationResponse {
    pub message: String,
    pub diagram_id: String,
    pub version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_new: Option<bool>,
}

/// Diagram metadata as returned by list and get endpoints.
#[derive(Debug, Serialize)]
pub struct DiagramSummary {
    pub id: i64,
    pub diagram_id: String,
    pub name: String,
    pub database_type: String,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Diagram> for DiagramSummary {
    fn from(d: &Diagram) -> Self {
        Self {
            id: d.id,
            diagram_id: d.diagram_id.clone(),
            name: d.name.clone(),
            database_type: d.database_type.clone(),
            version: d.version,
            created_at: d.created_at.to_rfc3339(),
            updated_at: d.updated_at.to_rfc3339(),
        }
    }
}

/// Version metadata as returned by the version-history endpoint.
#[derive(Debug, Serialize)]
pub struct VersionSummary {
    pub id: i64,
    pub version: i64,
    pub description: String,
    pub created_at: String,
}

impl From<&DiagramVersion> for VersionSummary {
    fn from(v: &DiagramVersion) -> Self {
        Self {
            id: v.id,
            version: v.version,
            description: v.description.clone(),
            created_at: v.created_at.to_rfc3339(),
        }
    }
}

/// Bulk pull response: full documents for every live diagram.
#[derive(Debug, Serialize)]
pub struct PullAllResponse {
    pub diagrams: Vec<serde_json::Value>,
    pub count: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct SnapshotRequest {
    #[serde(default)]
    pub description: String,
}
