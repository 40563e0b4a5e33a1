//! Integration tests for schema initialization using in-memory SurrealDB.

mod common;

use surrealdb::Surreal;
use surrealdb::engine::local::Mem;

#[tokio::test]
async fn schema_migration_applies_successfully() {
    let db = common::setup().await;

    let mut result = db.query("INFO FOR DB").await.unwrap();
    let info: Option<surrealdb_types::Value> = result.take(0).unwrap();
    let info_str = format!("{:?}", info.expect("INFO FOR DB should return a value"));

    for table in [
        "institution",
        "user",
        "compliance_resource",
        "assignment",
        "audit_log",
        "invite",
        "invite_event",
        "engagement_transition",
        "_migration",
    ] {
        assert!(info_str.contains(table), "missing {table} table");
    }
}

#[tokio::test]
async fn migration_is_idempotent() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    comply_db::run_migrations(&db).await.unwrap();
    comply_db::run_migrations(&db).await.unwrap();

    let mut result = db.query("SELECT * FROM _migration").await.unwrap();
    let records: Vec<surrealdb_types::Value> = result.take(0).unwrap();
    assert_eq!(records.len(), comply_db::latest_version() as usize);
}

#[tokio::test]
async fn unique_index_prevents_duplicate_assignments() {
    let db = common::setup().await;

    let insert = "CREATE assignment SET resource_type = 'SUBMISSION', \
                  resource_id = 'r-1', assigned_to = 'u-1', assigned_by = 'u-2', \
                  assignment_role = 'REVIEWER', status = 'ACTIVE'";
    db.query(insert).await.unwrap().check().unwrap();
    let duplicate = db.query(insert).await.unwrap().check();
    assert!(duplicate.is_err(), "duplicate assignment tuple should be rejected");
}

#[tokio::test]
async fn unknown_role_is_rejected_by_schema() {
    let db = common::setup().await;

    let result = db
        .query(
            "CREATE user SET email = 'x@example.org', display_name = 'X', \
             role = 'SUPERUSER', status = 'ACTIVE', password_hash = 'h'",
        )
        .await
        .unwrap()
        .check();
    assert!(result.is_err(), "role outside the closed set should be rejected");
}
