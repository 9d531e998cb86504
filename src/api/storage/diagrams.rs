//! Diagram registry and version store.
//!
//! The registry maps (client-chosen identifier, account) to the current
//! diagram row; the version store keeps the bounded per-diagram history of
//! full-document snapshots.

use chrono::Utc;
use sqlx::SqliteConnection;

use crate::models::{Diagram, DiagramMeta, DiagramVersion};

use super::StorageError;

/// Number of versions retained per diagram after any counter bump.
pub const RETAINED_VERSIONS: i64 = 10;

const DIAGRAM_COLUMNS: &str = "id, diagram_id, user_id, name, database_type, \
     database_edition, version, created_at, updated_at, deleted_at";

const VERSION_COLUMNS: &str = "id, diagram_id, version, data, description, created_at";

/// Look up a diagram by its client-chosen identifier, scoped to one account.
///
/// With `include_deleted` the lookup also sees soft-deleted rows, preferring
/// a live row when both exist for the same identifier (a soft-deleted row
/// can share its identifier with a live successor created by sync).
pub async fn find_by_external_id(
    conn: &mut SqliteConnection,
    user_id: i64,
    external_id: &str,
    include_deleted: bool,
) -> Result<Option<Diagram>, StorageError> {
    let sql = if include_deleted {
        format!(
            "SELECT {DIAGRAM_COLUMNS} FROM diagrams \
             WHERE diagram_id = ? AND user_id = ? \
             ORDER BY (deleted_at IS NULL) DESC, id LIMIT 1"
        )
    } else {
        format!(
            "SELECT {DIAGRAM_COLUMNS} FROM diagrams \
             WHERE diagram_id = ? AND user_id = ? AND deleted_at IS NULL"
        )
    };

    let diagram = sqlx::query_as::<_, Diagram>(&sql)
        .bind(external_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(diagram)
}

/// Create a new diagram with the version counter at 1.
pub async fn create(
    conn: &mut SqliteConnection,
    user_id: i64,
    external_id: &str,
    meta: &DiagramMeta,
) -> Result<Diagram, StorageError> {
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO diagrams \
         (diagram_id, user_id, name, database_type, database_edition, version, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(external_id)
    .bind(user_id)
    .bind(&meta.name)
    .bind(&meta.database_type)
    .bind(&meta.database_edition)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(Diagram {
        id: result.last_insert_rowid(),
        diagram_id: external_id.to_string(),
        user_id,
        name: meta.name.clone(),
        database_type: meta.database_type.clone(),
        database_edition: meta.database_edition.clone(),
        version: 1,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    })
}

/// Restore a soft-deleted diagram: clear the deleted flag, reset the counter
/// to 1, refresh metadata, and discard every version from its prior life so
/// stale history can never surface again.
pub async fn restore(
    conn: &mut SqliteConnection,
    diagram: &Diagram,
    meta: &DiagramMeta,
) -> Result<Diagram, StorageError> {
    let now = Utc::now();
    sqlx::query(
        "UPDATE diagrams \
         SET deleted_at = NULL, version = 1, name = ?, database_type = ?, \
             database_edition = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(&meta.name)
    .bind(&meta.database_type)
    .bind(&meta.database_edition)
    .bind(now)
    .bind(diagram.id)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM diagram_versions WHERE diagram_id = ?")
        .bind(diagram.id)
        .execute(&mut *conn)
        .await?;

    Ok(Diagram {
        name: meta.name.clone(),
        database_type: meta.database_type.clone(),
        database_edition: meta.database_edition.clone(),
        version: 1,
        updated_at: now,
        deleted_at: None,
        ..diagram.clone()
    })
}

/// Increment the version counter and refresh the updated timestamp.
pub async fn bump_version(
    conn: &mut SqliteConnection,
    diagram: &Diagram,
) -> Result<Diagram, StorageError> {
    let now = Utc::now();
    sqlx::query("UPDATE diagrams SET version = version + 1, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(diagram.id)
        .execute(&mut *conn)
        .await?;

    Ok(Diagram {
        version: diagram.version + 1,
        updated_at: now,
        ..diagram.clone()
    })
}

/// Refresh metadata and the updated timestamp without touching the counter.
pub async fn touch(
    conn: &mut SqliteConnection,
    diagram: &Diagram,
    meta: &DiagramMeta,
) -> Result<Diagram, StorageError> {
    let now = Utc::now();
    sqlx::query(
        "UPDATE diagrams \
         SET name = ?, database_type = ?, database_edition = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(&meta.name)
    .bind(&meta.database_type)
    .bind(&meta.database_edition)
    .bind(now)
    .bind(diagram.id)
    .execute(&mut *conn)
    .await?;

    Ok(Diagram {
        name: meta.name.clone(),
        database_type: meta.database_type.clone(),
        database_edition: meta.database_edition.clone(),
        updated_at: now,
        ..diagram.clone()
    })
}

/// Mark a diagram deleted. The row and its versions are retained; only push
/// can bring it back.
pub async fn soft_delete(conn: &mut SqliteConnection, id: i64) -> Result<(), StorageError> {
    sqlx::query("UPDATE diagrams SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Hard-delete a diagram and all of its versions.
pub async fn hard_delete(conn: &mut SqliteConnection, id: i64) -> Result<(), StorageError> {
    sqlx::query("DELETE FROM diagram_versions WHERE diagram_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM diagrams WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// All live diagrams for an account, most recently updated first.
pub async fn list_for_user(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> Result<Vec<Diagram>, StorageError> {
    let sql = format!(
        "SELECT {DIAGRAM_COLUMNS} FROM diagrams \
         WHERE user_id = ? AND deleted_at IS NULL \
         ORDER BY updated_at DESC"
    );
    let diagrams = sqlx::query_as::<_, Diagram>(&sql)
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(diagrams)
}

/// Append a version snapshot.
pub async fn insert_version(
    conn: &mut SqliteConnection,
    diagram_id: i64,
    version: i64,
    data: &str,
    description: &str,
) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT INTO diagram_versions (diagram_id, version, data, description, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(diagram_id)
    .bind(version)
    .bind(data)
    .bind(description)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// The version row with the highest version number, if any.
pub async fn latest_version(
    conn: &mut SqliteConnection,
    diagram_id: i64,
) -> Result<Option<DiagramVersion>, StorageError> {
    let sql = format!(
        "SELECT {VERSION_COLUMNS} FROM diagram_versions \
         WHERE diagram_id = ? ORDER BY version DESC LIMIT 1"
    );
    let version = sqlx::query_as::<_, DiagramVersion>(&sql)
        .bind(diagram_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(version)
}

/// A specific version row by version number.
pub async fn version_by_number(
    conn: &mut SqliteConnection,
    diagram_id: i64,
    version: i64,
) -> Result<Option<DiagramVersion>, StorageError> {
    let sql = format!(
        "SELECT {VERSION_COLUMNS} FROM diagram_versions \
         WHERE diagram_id = ? AND version = ?"
    );
    let row = sqlx::query_as::<_, DiagramVersion>(&sql)
        .bind(diagram_id)
        .bind(version)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

/// Overwrite the payload of an existing version row in place, refreshing its
/// timestamp. Used by sync, which never mints a new version number. A
/// missing row is not an error; sync tolerates history that was pruned or
/// never written.
pub async fn update_version_data(
    conn: &mut SqliteConnection,
    diagram_id: i64,
    version: i64,
    data: &str,
) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE diagram_versions SET data = ?, created_at = ? \
         WHERE diagram_id = ? AND version = ?",
    )
    .bind(data)
    .bind(Utc::now())
    .bind(diagram_id)
    .bind(version)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Version history, newest first.
pub async fn list_versions(
    conn: &mut SqliteConnection,
    diagram_id: i64,
) -> Result<Vec<DiagramVersion>, StorageError> {
    let sql = format!(
        "SELECT {VERSION_COLUMNS} FROM diagram_versions \
         WHERE diagram_id = ? ORDER BY version DESC"
    );
    let versions = sqlx::query_as::<_, DiagramVersion>(&sql)
        .bind(diagram_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(versions)
}

pub async fn count_versions(
    conn: &mut SqliteConnection,
    diagram_id: i64,
) -> Result<i64, StorageError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM diagram_versions WHERE diagram_id = ?")
            .bind(diagram_id)
            .fetch_one(&mut *conn)
            .await?;
    Ok(count)
}

/// Delete a single historical version row.
pub async fn delete_version(
    conn: &mut SqliteConnection,
    diagram_id: i64,
    version: i64,
) -> Result<bool, StorageError> {
    let result = sqlx::query("DELETE FROM diagram_versions WHERE diagram_id = ? AND version = ?")
        .bind(diagram_id)
        .bind(version)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Retention rule: keep only the `RETAINED_VERSIONS` highest version
/// numbers. Runs inside the same transaction as the write that bumped the
/// counter.
pub async fn prune_versions(
    conn: &mut SqliteConnection,
    diagram_id: i64,
) -> Result<(), StorageError> {
    sqlx::query(
        "DELETE FROM diagram_versions \
         WHERE diagram_id = ? AND id NOT IN ( \
             SELECT id FROM diagram_versions \
             WHERE diagram_id = ? ORDER BY version DESC LIMIT ?)",
    )
    .bind(diagram_id)
    .bind(diagram_id)
    .bind(RETAINED_VERSIONS)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
