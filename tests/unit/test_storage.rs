//! Storage layer tests against an in-memory SQLite database.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{SqliteConnection, SqlitePool};

use diagram_sync_api::models::{DiagramDocument, DiagramMeta};
use diagram_sync_api::storage::diagrams::{self, RETAINED_VERSIONS};
use diagram_sync_api::storage::{StorageError, users};

async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations failed");
    pool
}

async fn test_user(conn: &mut SqliteConnection, email: &str) -> i64 {
    let user = users::create(
        conn,
        users::NewUser {
            email,
            password_hash: "hash",
            name: "Test User",
            auth_provider: "local",
            oidc_subject: None,
            oidc_issuer: None,
        },
    )
    .await
    .expect("failed to create user");
    user.id
}

fn meta(name: &str) -> DiagramMeta {
    DiagramMeta {
        name: name.to_string(),
        database_type: "postgresql".to_string(),
        database_edition: String::new(),
    }
}

#[tokio::test]
async fn test_create_and_find_by_external_id() {
    let pool = test_pool().await;
    let mut conn = pool.acquire().await.unwrap();
    let user_id = test_user(&mut conn, "a@example.com").await;

    let created = diagrams::create(&mut conn, user_id, "diag-1", &meta("Orders"))
        .await
        .unwrap();
    assert_eq!(created.version, 1);
    assert_eq!(created.diagram_id, "diag-1");

    let found = diagrams::find_by_external_id(&mut conn, user_id, "diag-1", false)
        .await
        .unwrap()
        .expect("diagram should exist");
    assert_eq!(found.id, created.id);
    assert_eq!(found.name, "Orders");
}

#[tokio::test]
async fn test_lookup_is_scoped_to_account() {
    let pool = test_pool().await;
    let mut conn = pool.acquire().await.unwrap();
    let alice = test_user(&mut conn, "alice@example.com").await;
    let bob = test_user(&mut conn, "bob@example.com").await;

    diagrams::create(&mut conn, alice, "diag-1", &meta("Private"))
        .await
        .unwrap();

    let found = diagrams::find_by_external_id(&mut conn, bob, "diag-1", false)
        .await
        .unwrap();
    assert!(found.is_none(), "other accounts must not see the diagram");

    // Both accounts can use the same external identifier.
    let bobs = diagrams::create(&mut conn, bob, "diag-1", &meta("Also private"))
        .await
        .unwrap();
    assert_eq!(bobs.diagram_id, "diag-1");
}

#[tokio::test]
async fn test_soft_delete_hides_from_live_lookups() {
    let pool = test_pool().await;
    let mut conn = pool.acquire().await.unwrap();
    let user_id = test_user(&mut conn, "a@example.com").await;

    let diagram = diagrams::create(&mut conn, user_id, "diag-1", &meta("Orders"))
        .await
        .unwrap();
    diagrams::soft_delete(&mut conn, diagram.id).await.unwrap();

    let live = diagrams::find_by_external_id(&mut conn, user_id, "diag-1", false)
        .await
        .unwrap();
    assert!(live.is_none());

    let any = diagrams::find_by_external_id(&mut conn, user_id, "diag-1", true)
        .await
        .unwrap()
        .expect("deleted diagram should still be findable");
    assert!(any.deleted_at.is_some());

    let listed = diagrams::list_for_user(&mut conn, user_id).await.unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn test_include_deleted_prefers_live_row() {
    let pool = test_pool().await;
    let mut conn = pool.acquire().await.unwrap();
    let user_id = test_user(&mut conn, "a@example.com").await;

    // A deleted row and a live successor can share the external identifier.
    let first = diagrams::create(&mut conn, user_id, "diag-1", &meta("Old"))
        .await
        .unwrap();
    diagrams::soft_delete(&mut conn, first.id).await.unwrap();
    let second = diagrams::create(&mut conn, user_id, "diag-1", &meta("New"))
        .await
        .unwrap();

    let found = diagrams::find_by_external_id(&mut conn, user_id, "diag-1", true)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, second.id);
    assert!(found.deleted_at.is_none());
}

#[tokio::test]
async fn test_restore_resets_counter_and_purges_history() {
    let pool = test_pool().await;
    let mut conn = pool.acquire().await.unwrap();
    let user_id = test_user(&mut conn, "a@example.com").await;

    let diagram = diagrams::create(&mut conn, user_id, "diag-1", &meta("Orders"))
        .await
        .unwrap();
    diagrams::insert_version(&mut conn, diagram.id, 1, "{}", "").await.unwrap();
    let diagram = diagrams::bump_version(&mut conn, &diagram).await.unwrap();
    diagrams::insert_version(&mut conn, diagram.id, 2, "{}", "").await.unwrap();
    diagrams::soft_delete(&mut conn, diagram.id).await.unwrap();

    let restored = diagrams::restore(&mut conn, &diagram, &meta("Orders v2"))
        .await
        .unwrap();
    assert_eq!(restored.version, 1);
    assert!(restored.deleted_at.is_none());
    assert_eq!(restored.name, "Orders v2");

    // Prior-life versions are gone.
    let count = diagrams::count_versions(&mut conn, diagram.id).await.unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_prune_keeps_highest_versions() {
    let pool = test_pool().await;
    let mut conn = pool.acquire().await.unwrap();
    let user_id = test_user(&mut conn, "a@example.com").await;

    let diagram = diagrams::create(&mut conn, user_id, "diag-1", &meta("Orders"))
        .await
        .unwrap();
    for v in 1..=15 {
        diagrams::insert_version(&mut conn, diagram.id, v, "{}", "").await.unwrap();
    }

    diagrams::prune_versions(&mut conn, diagram.id).await.unwrap();

    let versions = diagrams::list_versions(&mut conn, diagram.id).await.unwrap();
    assert_eq!(versions.len() as i64, RETAINED_VERSIONS);
    assert_eq!(versions.first().unwrap().version, 15);
    assert_eq!(versions.last().unwrap().version, 6);
}

#[tokio::test]
async fn test_update_version_data_overwrites_in_place() {
    let pool = test_pool().await;
    let mut conn = pool.acquire().await.unwrap();
    let user_id = test_user(&mut conn, "a@example.com").await;

    let diagram = diagrams::create(&mut conn, user_id, "diag-1", &meta("Orders"))
        .await
        .unwrap();
    diagrams::insert_version(&mut conn, diagram.id, 1, r#"{"a":1}"#, "").await.unwrap();

    diagrams::update_version_data(&mut conn, diagram.id, 1, r#"{"a":2}"#)
        .await
        .unwrap();

    let latest = diagrams::latest_version(&mut conn, diagram.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.version, 1);
    assert_eq!(latest.data, r#"{"a":2}"#);
    assert_eq!(
        diagrams::count_versions(&mut conn, diagram.id).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn test_delete_version_reports_missing_rows() {
    let pool = test_pool().await;
    let mut conn = pool.acquire().await.unwrap();
    let user_id = test_user(&mut conn, "a@example.com").await;

    let diagram = diagrams::create(&mut conn, user_id, "diag-1", &meta("Orders"))
        .await
        .unwrap();
    diagrams::insert_version(&mut conn, diagram.id, 1, "{}", "").await.unwrap();

    assert!(diagrams::delete_version(&mut conn, diagram.id, 1).await.unwrap());
    assert!(!diagrams::delete_version(&mut conn, diagram.id, 1).await.unwrap());
    assert!(!diagrams::delete_version(&mut conn, diagram.id, 99).await.unwrap());
}

#[tokio::test]
async fn test_hard_delete_removes_diagram_and_history() {
    let pool = test_pool().await;
    let mut conn = pool.acquire().await.unwrap();
    let user_id = test_user(&mut conn, "a@example.com").await;

    let diagram = diagrams::create(&mut conn, user_id, "diag-1", &meta("Orders"))
        .await
        .unwrap();
    diagrams::insert_version(&mut conn, diagram.id, 1, "{}", "").await.unwrap();

    diagrams::hard_delete(&mut conn, diagram.id).await.unwrap();

    let found = diagrams::find_by_external_id(&mut conn, user_id, "diag-1", true)
        .await
        .unwrap();
    assert!(found.is_none());
    assert_eq!(
        diagrams::count_versions(&mut conn, diagram.id).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_user_current_token_lifecycle() {
    let pool = test_pool().await;
    let mut conn = pool.acquire().await.unwrap();
    let user_id = test_user(&mut conn, "a@example.com").await;

    users::set_current_token(&mut conn, user_id, "tok-1").await.unwrap();
    let user = users::find_by_id(&mut conn, user_id).await.unwrap().unwrap();
    assert_eq!(user.current_token.as_deref(), Some("tok-1"));

    // A new token replaces the old one outright.
    users::set_current_token(&mut conn, user_id, "tok-2").await.unwrap();
    let user = users::find_by_id(&mut conn, user_id).await.unwrap().unwrap();
    assert_eq!(user.current_token.as_deref(), Some("tok-2"));

    users::clear_current_token(&mut conn, user_id).await.unwrap();
    let user = users::find_by_id(&mut conn, user_id).await.unwrap().unwrap();
    assert!(user.current_token.is_none());
}

#[tokio::test]
async fn test_duplicate_email_rejected_by_schema() {
    let pool = test_pool().await;
    let mut conn = pool.acquire().await.unwrap();
    test_user(&mut conn, "a@example.com").await;

    let result = users::create(
        &mut conn,
        users::NewUser {
            email: "a@example.com",
            password_hash: "hash",
            name: "Duplicate",
            auth_provider: "local",
            oidc_subject: None,
            oidc_issuer: None,
        },
    )
    .await;
    assert!(matches!(result, Err(StorageError::Database(_))));
}

#[tokio::test]
async fn test_document_round_trips_unknown_fields() {
    let raw = r#"{
        "id": "diag-1",
        "name": "Orders",
        "databaseType": "postgresql",
        "tables": [{"id": "t1", "name": "orders"}],
        "relationships": []
    }"#;

    let doc: DiagramDocument = serde_json::from_str(raw).unwrap();
    assert_eq!(doc.id, "diag-1");
    assert_eq!(doc.database_type, "postgresql");
    assert!(doc.document.contains_key("tables"));

    let back = serde_json::to_value(&doc).unwrap();
    assert_eq!(back["databaseType"], "postgresql");
    assert_eq!(back["tables"][0]["name"], "orders");
    // Empty optional metadata stays absent rather than serializing as "".
    assert!(back.get("databaseEdition").is_none());
}
