//! Integration tests for user administration.

mod common;

use comply_core::error::ComplyError;
use comply_core::models::role::Role;
use comply_core::models::user::{CreateUser, UpdateProfile, UserStatus};
use comply_core::repository::{AuditLogFilter, AuditLogRepository, Pagination};
use comply_db::repository::SurrealAuditLogRepository;
use comply_db::service::UserService;

fn staff_for(institution_id: uuid::Uuid, email: &str) -> CreateUser {
    CreateUser {
        email: email.into(),
        display_name: "Ayanda".into(),
        role: Role::InstitutionStaff,
        institution_id: Some(institution_id),
        assigned_regions: Vec::new(),
        password: "a long enough passphrase".into(),
    }
}

#[tokio::test]
async fn bootstrap_only_once() {
    let db = common::setup().await;
    let users = UserService::new(db.clone());

    let admin = users
        .bootstrap_platform_admin("Root@Example.org", "Root", "a long enough passphrase")
        .await
        .unwrap();
    assert_eq!(admin.role, Role::PlatformAdmin);
    assert_eq!(admin.email, "root@example.org");

    let trail = SurrealAuditLogRepository::new(db.clone())
        .list(
            AuditLogFilter {
                entity_id: Some(admin.id),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert!(trail.items.iter().all(|e| e.changed_by == admin.id));
    assert!(trail.items.iter().all(|e| e.field_name != "password_hash"));

    let err = users
        .bootstrap_platform_admin("second@example.org", "Second", "a long enough passphrase")
        .await
        .unwrap_err();
    assert!(matches!(err, ComplyError::AlreadyExists { .. }));
}

#[tokio::test]
async fn institution_admin_manages_own_institution_only() {
    let db = common::setup().await;
    let own = common::seed_institution(&db, "Ubuntu College", "Gauteng").await;
    let other = common::seed_institution(&db, "Karoo Skills", "Western Cape").await;
    let admin = common::seed_user(&db, Role::InstitutionAdmin, Some(own), &[]).await;
    let users = UserService::new(db.clone());

    let created = users
        .create_user(&admin, staff_for(own, "ayanda@example.org"))
        .await
        .unwrap();
    assert_eq!(created.institution_id, Some(own));

    let err = users
        .create_user(&admin, staff_for(other, "sibusiso@example.org"))
        .await
        .unwrap_err();
    assert!(matches!(err, ComplyError::Forbidden { .. }));

    let err = users
        .create_user(
            &admin,
            CreateUser {
                role: Role::QctoReviewer,
                institution_id: None,
                ..staff_for(own, "regulator@example.org")
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ComplyError::Forbidden { .. }));

    let err = users
        .create_user(&admin, staff_for(own, "AYANDA@example.org"))
        .await
        .unwrap_err();
    assert!(matches!(err, ComplyError::AlreadyExists { .. }));

    let listed = users.list(&admin, Pagination::default()).await.unwrap();
    assert!(listed.items.iter().all(|u| u.institution_id == Some(own)));
}

#[tokio::test]
async fn role_binding_is_validated() {
    let db = common::setup().await;
    let platform = common::seed_user(&db, Role::PlatformAdmin, None, &[]).await;
    let users = UserService::new(db.clone());

    let err = users
        .create_user(
            &platform,
            CreateUser {
                institution_id: None,
                ..staff_for(uuid::Uuid::new_v4(), "orphan@example.org")
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ComplyError::Validation { .. }));
}

#[tokio::test]
async fn regions_are_normalized_for_regulators() {
    let db = common::setup().await;
    let institution = common::seed_institution(&db, "Ubuntu College", "Gauteng").await;
    let qcto_admin = common::seed_user(&db, Role::QctoAdmin, None, &[]).await;
    let reviewer = common::seed_user(&db, Role::QctoReviewer, None, &[]).await;
    let staff = common::seed_user(&db, Role::InstitutionStaff, Some(institution), &[]).await;
    let users = UserService::new(db.clone());

    let updated = users
        .set_regions(
            &qcto_admin,
            reviewer.user_id,
            vec![" Limpopo".into(), "Gauteng".into(), "".into(), "Limpopo".into()],
            Some("territory change".into()),
        )
        .await
        .unwrap();
    assert_eq!(updated.assigned_regions, vec!["Gauteng", "Limpopo"]);

    let err = users
        .set_regions(&qcto_admin, staff.user_id, vec!["Gauteng".into()], None)
        .await
        .unwrap_err();
    assert!(matches!(err, ComplyError::Validation { .. }));

    let err = users
        .set_regions(&reviewer, reviewer.user_id, vec!["Gauteng".into()], None)
        .await
        .unwrap_err();
    assert!(matches!(err, ComplyError::Forbidden { .. }));
}

#[tokio::test]
async fn self_service_limits() {
    let db = common::setup().await;
    let institution = common::seed_institution(&db, "Ubuntu College", "Gauteng").await;
    let admin = common::seed_user(&db, Role::InstitutionAdmin, Some(institution), &[]).await;
    let users = UserService::new(db.clone());

    let err = users
        .delete_user(&admin, admin.user_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ComplyError::Forbidden { .. }));

    let err = users
        .change_role(&admin, admin.user_id, Role::InstitutionStaff, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ComplyError::Forbidden { .. }));

    let renamed = users
        .update_profile(
            &admin,
            UpdateProfile {
                display_name: Some("  Nomsa  ".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.display_name, "Nomsa");
}

#[tokio::test]
async fn suspended_then_deleted() {
    let db = common::setup().await;
    let institution = common::seed_institution(&db, "Ubuntu College", "Gauteng").await;
    let admin = common::seed_user(&db, Role::InstitutionAdmin, Some(institution), &[]).await;
    let staff = common::seed_user(&db, Role::InstitutionStaff, Some(institution), &[]).await;
    let users = UserService::new(db.clone());

    let suspended = users
        .change_status(
            &admin,
            staff.user_id,
            UserStatus::Suspended,
            Some("left the institution".into()),
        )
        .await
        .unwrap();
    assert_eq!(suspended.status, UserStatus::Suspended);

    users
        .delete_user(&admin, staff.user_id, None)
        .await
        .unwrap();
    let err = users.get(&admin, staff.user_id).await.unwrap_err();
    assert!(matches!(err, ComplyError::NotFound { .. }));
}

#[tokio::test]
async fn capability_is_checked_before_any_lookup() {
    let db = common::setup().await;
    let institution = common::seed_institution(&db, "Ubuntu College", "Gauteng").await;
    let staff = common::seed_user(&db, Role::InstitutionStaff, Some(institution), &[]).await;
    let student = common::seed_user(&db, Role::Student, Some(institution), &[]).await;
    let users = UserService::new(db.clone());

    // Seeded users get `<id>@example.org`.
    let taken = format!("{}@example.org", staff.user_id);
    for email in [taken.as_str(), "nobody@example.org"] {
        let err = users
            .create_user(&student, staff_for(institution, email))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ComplyError::Forbidden { .. }),
            "{email}: {err:?}"
        );
    }

    for target in [staff.user_id, uuid::Uuid::new_v4()] {
        let err = users.get(&student, target).await.unwrap_err();
        assert!(matches!(err, ComplyError::Forbidden { .. }));
        let err = users
            .change_status(&student, target, UserStatus::Suspended, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ComplyError::Forbidden { .. }));
        let err = users
            .change_role(&student, target, Role::InstitutionAdmin, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ComplyError::Forbidden { .. }));
        let err = users
            .set_regions(&student, target, vec!["Gauteng".into()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ComplyError::Forbidden { .. }));
        let err = users.delete_user(&student, target, None).await.unwrap_err();
        assert!(matches!(err, ComplyError::Forbidden { .. }));
    }
}
