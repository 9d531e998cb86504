//! Sync coordinator: the push/sync/snapshot write protocols and the
//! pull/pull-all read protocols.
//!
//! Every write protocol runs inside a single transaction spanning the
//! registry update and all version-store writes; if any step fails the
//! transaction is rolled back whole and no partial version is ever visible.
//! Concurrent pushes to the same diagram are serialized by SQLite's
//! transaction locking; the engine adds no expected-version precondition, so
//! the later commit wins.

use serde_json::Value;
use sqlx::SqlitePool;
use tracing::warn;

use crate::models::{Diagram, DiagramDocument, DiagramMeta, DiagramVersion};
use crate::storage::{StorageError, diagrams};

const DEFAULT_SNAPSHOT_DESCRIPTION: &str = "Manual snapshot";
const INITIAL_SYNC_DESCRIPTION: &str = "Initial sync";

/// How a push landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Identifier never seen before; diagram created at version 1.
    Created,
    /// Identifier belonged to a soft-deleted diagram; restored at version 1.
    Restored,
    /// Live diagram updated; counter bumped.
    Updated,
}

#[derive(Debug)]
pub struct PushResult {
    pub outcome: PushOutcome,
    pub external_id: String,
    pub version: i64,
}

#[derive(Debug)]
pub struct SyncResult {
    pub external_id: String,
    pub version: i64,
    pub is_new: bool,
}

#[derive(Debug, Clone)]
pub struct SyncService {
    pool: SqlitePool,
}

impl SyncService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Explicit save. Creates history: a never-seen identifier gets a new
    /// diagram at version 1, a soft-deleted one is restored at version 1
    /// (prior-life history discarded), and a live one gets its counter
    /// bumped and a new version written, followed by retention pruning.
    pub async fn push(
        &self,
        user_id: i64,
        doc: &DiagramDocument,
    ) -> Result<PushResult, StorageError> {
        let data = serialize_document(doc)?;
        let meta = DiagramMeta::from(doc);

        let mut tx = self.pool.begin().await?;
        let existing = diagrams::find_by_external_id(&mut tx, user_id, &doc.id, true).await?;

        let result = match existing {
            None => {
                let diagram = diagrams::create(&mut tx, user_id, &doc.id, &meta).await?;
                diagrams::insert_version(&mut tx, diagram.id, 1, &data, &doc.description).await?;
                PushResult {
                    outcome: PushOutcome::Created,
                    external_id: diagram.diagram_id,
                    version: 1,
                }
            }
            Some(diagram) if diagram.deleted_at.is_some() => {
                let diagram = diagrams::restore(&mut tx, &diagram, &meta).await?;
                diagrams::insert_version(&mut tx, diagram.id, 1, &data, &doc.description).await?;
                PushResult {
                    outcome: PushOutcome::Restored,
                    external_id: diagram.diagram_id,
                    version: 1,
                }
            }
            Some(diagram) => {
                let diagram = diagrams::touch(&mut tx, &diagram, &meta).await?;
                let diagram = diagrams::bump_version(&mut tx, &diagram).await?;
                diagrams::insert_version(
                    &mut tx,
                    diagram.id,
                    diagram.version,
                    &data,
                    &doc.description,
                )
                .await?;
                diagrams::prune_versions(&mut tx, diagram.id).await?;
                PushResult {
                    outcome: PushOutcome::Updated,
                    external_id: diagram.diagram_id,
                    version: diagram.version,
                }
            }
        };

        tx.commit().await?;
        Ok(result)
    }

    /// Implicit background save. Never grows history: an existing live
    /// diagram keeps its counter and has the latest version's payload
    /// overwritten in place. A missing identifier is created like push
    /// would, marked as an initial sync. Soft-deleted diagrams are not
    /// restored here; the lookup skips them, so a fresh diagram is created
    /// alongside the deleted row.
    pub async fn sync(
        &self,
        user_id: i64,
        doc: &DiagramDocument,
    ) -> Result<SyncResult, StorageError> {
        let data = serialize_document(doc)?;
        let meta = DiagramMeta::from(doc);

        let mut tx = self.pool.begin().await?;
        let existing = diagrams::find_by_external_id(&mut tx, user_id, &doc.id, false).await?;

        let result = match existing {
            None => {
                let diagram = diagrams::create(&mut tx, user_id, &doc.id, &meta).await?;
                diagrams::insert_version(&mut tx, diagram.id, 1, &data, INITIAL_SYNC_DESCRIPTION)
                    .await?;
                SyncResult {
                    external_id: diagram.diagram_id,
                    version: 1,
                    is_new: true,
                }
            }
            Some(diagram) => {
                let diagram = diagrams::touch(&mut tx, &diagram, &meta).await?;
                diagrams::update_version_data(&mut tx, diagram.id, diagram.version, &data).await?;
                SyncResult {
                    external_id: diagram.diagram_id,
                    version: diagram.version,
                    is_new: false,
                }
            }
        };

        tx.commit().await?;
        Ok(result)
    }

    /// Manual checkpoint. Bumps the counter and writes a new version whose
    /// payload is copied verbatim from the current latest version; no client
    /// payload is involved.
    pub async fn snapshot(
        &self,
        user_id: i64,
        external_id: &str,
        description: &str,
    ) -> Result<PushResult, StorageError> {
        let description = if description.is_empty() {
            DEFAULT_SNAPSHOT_DESCRIPTION
        } else {
            description
        };

        let mut tx = self.pool.begin().await?;
        let diagram = diagrams::find_by_external_id(&mut tx, user_id, external_id, false)
            .await?
            .ok_or_else(|| StorageError::not_found("diagram"))?;
        let latest = diagrams::latest_version(&mut tx, diagram.id)
            .await?
            .ok_or_else(|| StorageError::not_found("version"))?;

        let diagram = diagrams::bump_version(&mut tx, &diagram).await?;
        diagrams::insert_version(&mut tx, diagram.id, diagram.version, &latest.data, description)
            .await?;
        diagrams::prune_versions(&mut tx, diagram.id).await?;
        tx.commit().await?;

        Ok(PushResult {
            outcome: PushOutcome::Updated,
            external_id: diagram.diagram_id,
            version: diagram.version,
        })
    }

    /// Fetch one diagram's document: the exact version when a number is
    /// given, otherwise the latest. The stored payload is returned with the
    /// resolved version number injected.
    pub async fn pull(
        &self,
        user_id: i64,
        external_id: &str,
        version: Option<i64>,
    ) -> Result<Value, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let diagram = diagrams::find_by_external_id(&mut conn, user_id, external_id, false)
            .await?
            .ok_or_else(|| StorageError::not_found("diagram"))?;

        let row = match version {
            Some(number) => diagrams::version_by_number(&mut conn, diagram.id, number).await?,
            None => diagrams::latest_version(&mut conn, diagram.id).await?,
        }
        .ok_or_else(|| StorageError::not_found("version"))?;

        let mut doc = decode_payload(&row)?;
        doc.insert("version".to_string(), Value::from(row.version));
        Ok(Value::Object(doc))
    }

    /// Bulk pull for initial sync: latest document for every live diagram,
    /// with the diagram's counter and internal identifier injected. Diagrams
    /// whose latest version is missing or undecodable are skipped rather
    /// than failing the whole batch.
    pub async fn pull_all(&self, user_id: i64) -> Result<Vec<Value>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let diagrams_list = diagrams::list_for_user(&mut conn, user_id).await?;

        let mut result = Vec::new();
        for diagram in diagrams_list {
            let Some(row) = diagrams::latest_version(&mut conn, diagram.id).await? else {
                continue;
            };
            let mut doc = match decode_payload(&row) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(
                        diagram_id = %diagram.diagram_id,
                        "skipping diagram with undecodable payload: {e}"
                    );
                    continue;
                }
            };
            doc.insert("version".to_string(), Value::from(diagram.version));
            doc.insert("server_id".to_string(), Value::from(diagram.id));
            result.push(Value::Object(doc));
        }
        Ok(result)
    }

    /// All live diagrams for the account, most recently updated first.
    pub async fn list(&self, user_id: i64) -> Result<Vec<Diagram>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        diagrams::list_for_user(&mut conn, user_id).await
    }

    /// One diagram's registry metadata.
    pub async fn get(&self, user_id: i64, external_id: &str) -> Result<Diagram, StorageError> {
        let mut conn = self.pool.acquire().await?;
        diagrams::find_by_external_id(&mut conn, user_id, external_id, false)
            .await?
            .ok_or_else(|| StorageError::not_found("diagram"))
    }

    /// Version history metadata, newest first.
    pub async fn versions(
        &self,
        user_id: i64,
        external_id: &str,
    ) -> Result<Vec<DiagramVersion>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let diagram = diagrams::find_by_external_id(&mut conn, user_id, external_id, false)
            .await?
            .ok_or_else(|| StorageError::not_found("diagram"))?;
        diagrams::list_versions(&mut conn, diagram.id).await
    }

    /// Remove one historical version. Refuses to delete the only remaining
    /// version and the current latest one; both are validation errors, not
    /// server faults.
    pub async fn delete_version(
        &self,
        user_id: i64,
        external_id: &str,
        version: i64,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        let diagram = diagrams::find_by_external_id(&mut tx, user_id, external_id, false)
            .await?
            .ok_or_else(|| StorageError::not_found("diagram"))?;

        let count = diagrams::count_versions(&mut tx, diagram.id).await?;
        if count <= 1 {
            return Err(StorageError::validation(
                "Cannot delete the only remaining version",
            ));
        }
        if version == diagram.version {
            return Err(StorageError::validation(
                "Cannot delete the latest version. Create a new snapshot first.",
            ));
        }

        if !diagrams::delete_version(&mut tx, diagram.id, version).await? {
            return Err(StorageError::not_found("version"));
        }
        tx.commit().await?;
        Ok(())
    }

    /// Hard-delete a diagram and its entire history.
    pub async fn delete_diagram(&self, user_id: i64, external_id: &str) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        let diagram = diagrams::find_by_external_id(&mut tx, user_id, external_id, false)
            .await?
            .ok_or_else(|| StorageError::not_found("diagram"))?;
        diagrams::hard_delete(&mut tx, diagram.id).await?;
        tx.commit().await?;
        Ok(())
    }
}

fn serialize_document(doc: &DiagramDocument) -> Result<String, StorageError> {
    serde_json::to_string(doc)
        .map_err(|e| StorageError::Other(format!("failed to serialize diagram: {e}")))
}

fn decode_payload(row: &DiagramVersion) -> Result<serde_json::Map<String, Value>, StorageError> {
    match serde_json::from_str(&row.data) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(StorageError::Other(
            "diagram payload is not a JSON object".to_string(),
        )),
        Err(e) => Err(StorageError::Other(format!(
            "failed to parse diagram payload: {e}"
        ))),
    }
}
