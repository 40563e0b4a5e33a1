//! Integration tests for the compliance resource workflow.

mod common;

use comply_core::error::ComplyError;
use comply_core::models::audit::{ChangeType, EntityType};
use comply_core::models::resource::{CreateResource, ResourceStatus, ResourceType, UpdateResource};
use comply_core::models::role::Role;
use comply_core::repository::{AuditLogFilter, Pagination};
use comply_db::service::{AuditTrailService, ResourceService};
use uuid::Uuid;

#[tokio::test]
async fn submit_writes_exactly_one_status_entry() {
    let db = common::setup().await;
    let institution = common::seed_institution(&db, "Ubuntu College", "Gauteng").await;
    let admin = common::seed_user(&db, Role::InstitutionAdmin, Some(institution), &[]).await;
    let platform = common::seed_user(&db, Role::PlatformAdmin, None, &[]).await;
    let resource =
        common::seed_resource(&db, ResourceType::Submission, institution, ResourceStatus::Draft)
            .await;

    let resources = ResourceService::new(db.clone());
    let submitted = resources
        .transition(
            &admin,
            ResourceType::Submission,
            resource,
            ResourceStatus::Submitted,
            None,
        )
        .await
        .unwrap();
    assert_eq!(submitted.status, ResourceStatus::Submitted);

    let trail = AuditTrailService::new(db.clone())
        .list(
            &platform,
            AuditLogFilter {
                entity_type: Some(EntityType::Submission),
                entity_id: Some(resource),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(trail.total, 1);
    let entry = &trail.items[0];
    assert_eq!(entry.field_name, "status");
    assert_eq!(entry.old_value.as_deref(), Some("DRAFT"));
    assert_eq!(entry.new_value.as_deref(), Some("SUBMITTED"));
    assert_eq!(entry.change_type, ChangeType::StatusChange);
    assert_eq!(entry.changed_by, admin.user_id);
}

#[tokio::test]
async fn create_records_every_initial_field() {
    let db = common::setup().await;
    let institution = common::seed_institution(&db, "Ubuntu College", "Gauteng").await;
    let staff = common::seed_user(&db, Role::InstitutionStaff, Some(institution), &[]).await;

    let resources = ResourceService::new(db.clone());
    let created = resources
        .create(
            &staff,
            CreateResource {
                resource_type: ResourceType::Attendance,
                institution_id: institution,
                title: "  Week 12 register ".into(),
                data: Some(serde_json::json!({"present": 31})),
            },
        )
        .await
        .unwrap();

    assert_eq!(created.title, "Week 12 register");
    assert_eq!(created.status, ResourceStatus::Draft);
    assert_eq!(created.created_by, staff.user_id);
    assert_eq!(created.data["present"], 31);
}

#[tokio::test]
async fn create_for_another_institution_is_forbidden() {
    let db = common::setup().await;
    let own = common::seed_institution(&db, "Ubuntu College", "Gauteng").await;
    let other = common::seed_institution(&db, "Karoo Skills", "Western Cape").await;
    let admin = common::seed_user(&db, Role::InstitutionAdmin, Some(own), &[]).await;

    let err = ResourceService::new(db.clone())
        .create(
            &admin,
            CreateResource {
                resource_type: ResourceType::Readiness,
                institution_id: other,
                title: "Readiness".into(),
                data: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ComplyError::Forbidden { .. }));
}

#[tokio::test]
async fn staff_cannot_submit() {
    let db = common::setup().await;
    let institution = common::seed_institution(&db, "Ubuntu College", "Gauteng").await;
    let staff = common::seed_user(&db, Role::InstitutionStaff, Some(institution), &[]).await;
    let resource =
        common::seed_resource(&db, ResourceType::Readiness, institution, ResourceStatus::Draft)
            .await;

    let err = ResourceService::new(db.clone())
        .transition(
            &staff,
            ResourceType::Readiness,
            resource,
            ResourceStatus::Submitted,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ComplyError::Forbidden { .. }));
}

#[tokio::test]
async fn reviewer_moves_assigned_submission_through_review() {
    let db = common::setup().await;
    let institution = common::seed_institution(&db, "Ubuntu College", "Gauteng").await;
    let reviewer = common::seed_user(&db, Role::QctoReviewer, None, &["Gauteng"]).await;
    let resource = common::seed_resource(
        &db,
        ResourceType::Submission,
        institution,
        ResourceStatus::Submitted,
    )
    .await;
    common::seed_assignment(
        &db,
        ResourceType::Submission,
        resource,
        reviewer.user_id,
        comply_core::models::assignment::AssignmentStatus::Active,
    )
    .await;

    let resources = ResourceService::new(db.clone());
    for to in [ResourceStatus::UnderReview, ResourceStatus::Approved] {
        let moved = resources
            .transition(&reviewer, ResourceType::Submission, resource, to, None)
            .await
            .unwrap();
        assert_eq!(moved.status, to);
    }

    // Approved is terminal.
    let err = resources
        .transition(
            &reviewer,
            ResourceType::Submission,
            resource,
            ResourceStatus::Returned,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ComplyError::Validation { .. }));
}

#[tokio::test]
async fn submitted_resources_are_not_editable() {
    let db = common::setup().await;
    let institution = common::seed_institution(&db, "Ubuntu College", "Gauteng").await;
    let admin = common::seed_user(&db, Role::InstitutionAdmin, Some(institution), &[]).await;
    let resource = common::seed_resource(
        &db,
        ResourceType::Readiness,
        institution,
        ResourceStatus::Submitted,
    )
    .await;

    let resources = ResourceService::new(db.clone());
    let err = resources
        .update(
            &admin,
            ResourceType::Readiness,
            resource,
            UpdateResource {
                title: Some("Edited after submit".into()),
                data: None,
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ComplyError::Validation { .. }));

    let err = resources
        .delete(&admin, ResourceType::Readiness, resource, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ComplyError::Validation { .. }));
}

#[tokio::test]
async fn unknown_resource_reads_as_forbidden_on_write() {
    let db = common::setup().await;
    let institution = common::seed_institution(&db, "Ubuntu College", "Gauteng").await;
    let admin = common::seed_user(&db, Role::InstitutionAdmin, Some(institution), &[]).await;

    let err = ResourceService::new(db.clone())
        .transition(
            &admin,
            ResourceType::Readiness,
            Uuid::new_v4(),
            ResourceStatus::Submitted,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ComplyError::Forbidden { .. }));
}
