//! Integration tests for the audited mutation executor.

mod common;

use std::cell::Cell;

use comply_core::context::AccessContext;
use comply_core::error::ComplyError;
use comply_core::models::audit::{ChangeType, EntityType};
use comply_core::models::resource::{ResourceStatus, ResourceType, UpdateResource};
use comply_core::models::role::Role;
use comply_core::rbac::{self, Capability};
use comply_core::repository::{
    AuditLogFilter, AuditLogRepository, Pagination, ResourceRepository,
};
use comply_db::repository::{SurrealAuditLogRepository, SurrealResourceRepository};
use comply_db::service::ResourceService;
use comply_db::{AuditedExecutor, MutationRequest, MutationTx};
use surrealdb::Surreal;
use surrealdb::engine::local::Db;
use uuid::Uuid;

async fn audit_count(db: &Surreal<Db>) -> u64 {
    SurrealAuditLogRepository::new(db.clone())
        .list(AuditLogFilter::default(), Pagination::default())
        .await
        .unwrap()
        .total
}

#[tokio::test]
async fn multi_field_mutation_shares_one_mutation_id() {
    let db = common::setup().await;
    let institution = common::seed_institution(&db, "Ubuntu College", "Gauteng").await;
    let admin = common::seed_user(&db, Role::InstitutionAdmin, Some(institution), &[]).await;
    let resource =
        common::seed_resource(&db, ResourceType::Readiness, institution, ResourceStatus::Draft)
            .await;

    let executor = AuditedExecutor::new(db.clone());
    let request = MutationRequest::new(EntityType::Readiness, ChangeType::Update)
        .entity(resource)
        .institution(Some(institution))
        .reason(Some("annual refresh".into()));
    executor
        .mutate(
            &admin,
            request,
            async |ctx: &AccessContext| rbac::require(ctx.role, Capability::ResourceEdit),
            async |tx: &mut MutationTx<Db>| {
                tx.update(EntityType::Readiness, resource)
                    .set("title", "Seeded resource", "Readiness 2026")
                    .set("data", serde_json::json!({}), serde_json::json!({"sites": 2}))
                    .set("status", "DRAFT", "DRAFT")
                    .stage();
                Ok(())
            },
        )
        .await
        .unwrap();

    let entries = SurrealAuditLogRepository::new(db.clone())
        .list(
            AuditLogFilter {
                entity_id: Some(resource),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap()
        .items;

    // Unchanged status is neither written nor audited.
    assert_eq!(entries.len(), 2);
    let fields: Vec<&str> = entries.iter().map(|e| e.field_name.as_str()).collect();
    assert_eq!(fields, vec!["data", "title"]);
    assert_eq!(entries[0].mutation_id, entries[1].mutation_id);
    for entry in &entries {
        assert_eq!(entry.changed_by, admin.user_id);
        assert_eq!(entry.role_at_time, Role::InstitutionAdmin);
        assert_eq!(entry.change_type, ChangeType::Update);
        assert_eq!(entry.institution_id, Some(institution));
        assert_eq!(entry.reason.as_deref(), Some("annual refresh"));
        assert_eq!(entry.timestamp, entries[0].timestamp);
    }
    assert_eq!(entries[0].new_value.as_deref(), Some(r#"{"sites":2}"#));
    assert_eq!(entries[1].old_value.as_deref(), Some("Seeded resource"));

    let stored = SurrealResourceRepository::new(db.clone())
        .get_by_id(ResourceType::Readiness, resource)
        .await
        .unwrap();
    assert_eq!(stored.title, "Readiness 2026");
    assert_eq!(stored.data, serde_json::json!({"sites": 2}));
}

#[tokio::test]
async fn closure_error_discards_staged_writes() {
    let db = common::setup().await;
    let institution = common::seed_institution(&db, "Ubuntu College", "Gauteng").await;
    let admin = common::seed_user(&db, Role::InstitutionAdmin, Some(institution), &[]).await;
    let resource =
        common::seed_resource(&db, ResourceType::Readiness, institution, ResourceStatus::Draft)
            .await;

    let executor = AuditedExecutor::new(db.clone());
    let result: Result<(), _> = executor
        .mutate(
            &admin,
            MutationRequest::new(EntityType::Readiness, ChangeType::Update).entity(resource),
            async |_: &AccessContext| Ok::<(), ComplyError>(()),
            async |tx: &mut MutationTx<Db>| {
                tx.update(EntityType::Readiness, resource)
                    .set("title", "Seeded resource", "Never written")
                    .stage();
                Err(ComplyError::validation("second step failed"))
            },
        )
        .await;

    assert!(matches!(result, Err(ComplyError::Validation { .. })));
    let stored = SurrealResourceRepository::new(db.clone())
        .get_by_id(ResourceType::Readiness, resource)
        .await
        .unwrap();
    assert_eq!(stored.title, "Seeded resource");
    assert_eq!(audit_count(&db).await, 0);
}

#[tokio::test]
async fn missing_row_aborts_the_whole_transaction() {
    let db = common::setup().await;
    let institution = common::seed_institution(&db, "Ubuntu College", "Gauteng").await;
    let admin = common::seed_user(&db, Role::PlatformAdmin, None, &[]).await;
    let resource =
        common::seed_resource(&db, ResourceType::Submission, institution, ResourceStatus::Draft)
            .await;
    let missing = Uuid::new_v4();

    let executor = AuditedExecutor::new(db.clone());
    let result = executor
        .mutate(
            &admin,
            MutationRequest::new(EntityType::Submission, ChangeType::Update),
            async |_: &AccessContext| Ok::<(), ComplyError>(()),
            async |tx: &mut MutationTx<Db>| {
                tx.update(EntityType::Submission, resource)
                    .set("title", "Seeded resource", "Renamed")
                    .stage();
                tx.update(EntityType::Submission, missing)
                    .set("title", "Ghost", "Still a ghost?")
                    .stage();
                Ok(())
            },
        )
        .await;

    match result {
        Err(ComplyError::NotFound { id, .. }) => assert_eq!(id, missing.to_string()),
        other => panic!("expected NOT_FOUND, got {other:?}"),
    }
    let stored = SurrealResourceRepository::new(db.clone())
        .get_by_id(ResourceType::Submission, resource)
        .await
        .unwrap();
    assert_eq!(stored.title, "Seeded resource");
    assert_eq!(audit_count(&db).await, 0);
}

#[tokio::test]
async fn soft_deleted_rows_fail_the_guard() {
    let db = common::setup().await;
    let institution = common::seed_institution(&db, "Ubuntu College", "Gauteng").await;
    let admin = common::seed_user(&db, Role::InstitutionAdmin, Some(institution), &[]).await;
    let service = ResourceService::new(db.clone());
    let resource =
        common::seed_resource(&db, ResourceType::Readiness, institution, ResourceStatus::Draft)
            .await;

    service
        .delete(&admin, ResourceType::Readiness, resource, None)
        .await
        .unwrap();

    let executor = AuditedExecutor::new(db.clone());
    let result = executor
        .mutate(
            &admin,
            MutationRequest::new(EntityType::Readiness, ChangeType::Update),
            async |_: &AccessContext| Ok::<(), ComplyError>(()),
            async |tx: &mut MutationTx<Db>| {
                tx.update(EntityType::Readiness, resource)
                    .set("title", "Seeded resource", "Resurrected")
                    .stage();
                Ok(())
            },
        )
        .await;
    assert!(matches!(result, Err(ComplyError::NotFound { .. })));
    // Only the deletion itself was audited.
    assert_eq!(audit_count(&db).await, 1);
}

#[tokio::test]
async fn failed_capability_check_stages_nothing() {
    let db = common::setup().await;
    let institution = common::seed_institution(&db, "Ubuntu College", "Gauteng").await;
    let staff = common::seed_user(&db, Role::InstitutionStaff, Some(institution), &[]).await;
    let resource =
        common::seed_resource(&db, ResourceType::Submission, institution, ResourceStatus::Draft)
            .await;

    let ran = Cell::new(false);
    let executor = AuditedExecutor::new(db.clone());
    let result = executor
        .mutate(
            &staff,
            MutationRequest::new(EntityType::Submission, ChangeType::StatusChange),
            async |ctx: &AccessContext| rbac::require(ctx.role, Capability::ResourceSubmit),
            async |tx: &mut MutationTx<Db>| {
                ran.set(true);
                tx.update(EntityType::Submission, resource)
                    .set("status", "DRAFT", "SUBMITTED")
                    .stage();
                Ok(())
            },
        )
        .await;

    assert!(matches!(result, Err(ComplyError::Forbidden { .. })));
    assert!(!ran.get());
    assert_eq!(audit_count(&db).await, 0);
}

#[tokio::test]
async fn unchanged_update_commits_nothing() {
    let db = common::setup().await;
    let institution = common::seed_institution(&db, "Ubuntu College", "Gauteng").await;
    let admin = common::seed_user(&db, Role::InstitutionAdmin, Some(institution), &[]).await;
    let resource =
        common::seed_resource(&db, ResourceType::Readiness, institution, ResourceStatus::Draft)
            .await;
    let service = ResourceService::new(db.clone());

    let before = service
        .get(&admin, ResourceType::Readiness, resource)
        .await
        .unwrap();
    let after = service
        .update(
            &admin,
            ResourceType::Readiness,
            resource,
            UpdateResource {
                title: Some("Seeded resource".into()),
                data: Some(serde_json::json!({})),
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(after.updated_at, before.updated_at);
    assert_eq!(audit_count(&db).await, 0);
}

#[tokio::test]
async fn unaudited_writes_are_refused() {
    let db = common::setup().await;
    let admin = common::seed_user(&db, Role::PlatformAdmin, None, &[]).await;

    let executor = AuditedExecutor::new(db.clone());
    let result = executor
        .mutate(
            &admin,
            MutationRequest::new(EntityType::Institution, ChangeType::Create),
            async |_: &AccessContext| Ok::<(), ComplyError>(()),
            async |tx: &mut MutationTx<Db>| {
                tx.stage_raw("CREATE institution SET name = 'Shadow', province = 'Gauteng';");
                Ok(())
            },
        )
        .await;

    assert!(matches!(result, Err(ComplyError::Internal(_))));
    let mut rows = db
        .query("SELECT * FROM institution WHERE name = 'Shadow'")
        .await
        .unwrap();
    let rows: Vec<surrealdb_types::Value> = rows.take(0).unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn secret_fields_are_written_but_not_audited() {
    let db = common::setup().await;
    let admin = common::seed_user(&db, Role::PlatformAdmin, None, &[]).await;
    let user_id = Uuid::new_v4();

    let executor = AuditedExecutor::new(db.clone());
    executor
        .mutate(
            &admin,
            MutationRequest::new(EntityType::User, ChangeType::Create).entity(user_id),
            async |_: &AccessContext| Ok::<(), ComplyError>(()),
            async |tx: &mut MutationTx<Db>| {
                tx.create(EntityType::User, user_id)
                    .field("email", "sipho@example.org")
                    .field("display_name", "Sipho")
                    .field("role", Role::QctoReviewer)
                    .field("institution_id", None::<Uuid>)
                    .field("status", "ACTIVE")
                    .secret_field("password_hash", "$argon2id$fake")
                    .stage();
                Ok(())
            },
        )
        .await
        .unwrap();

    let entries = SurrealAuditLogRepository::new(db.clone())
        .list(
            AuditLogFilter {
                entity_id: Some(user_id),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap()
        .items;
    let fields: Vec<&str> = entries.iter().map(|e| e.field_name.as_str()).collect();
    assert_eq!(fields, vec!["display_name", "email", "role", "status"]);
    assert!(entries.iter().all(|e| e.change_type == ChangeType::Create));
    assert!(entries.iter().all(|e| e.old_value.is_none()));
}
