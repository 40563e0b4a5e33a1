//! Shared fixtures for the integration suites: an in-memory database with
//! migrations applied and raw seeding helpers that bypass the services.

#![allow(dead_code)]

use comply_core::context::{AccessContext, AuthMode};
use comply_core::models::assignment::AssignmentStatus;
use comply_core::models::resource::{ResourceStatus, ResourceType};
use comply_core::models::role::Role;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

pub async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    comply_db::run_migrations(&db).await.unwrap();
    db
}

pub async fn seed_institution(db: &Surreal<Db>, name: &str, province: &str) -> Uuid {
    let id = Uuid::new_v4();
    db.query("CREATE type::record('institution', $id) SET name = $name, province = $province")
        .bind(("id", id.to_string()))
        .bind(("name", name.to_string()))
        .bind(("province", province.to_string()))
        .await
        .unwrap()
        .check()
        .unwrap();
    id
}

/// Insert an active user and return the context they would resolve to.
pub async fn seed_user(
    db: &Surreal<Db>,
    role: Role,
    institution_id: Option<Uuid>,
    regions: &[&str],
) -> AccessContext {
    let id = Uuid::new_v4();
    let regions: Vec<String> = regions.iter().map(|r| r.to_string()).collect();
    let institution = if institution_id.is_some() {
        "$institution_id"
    } else {
        "NONE"
    };
    db.query(format!(
        "CREATE type::record('user', $id) SET email = $email, \
         display_name = 'Test User', role = $role, \
         institution_id = {institution}, status = 'ACTIVE', \
         assigned_regions = $regions, password_hash = 'not-a-hash'"
    ))
    .bind(("id", id.to_string()))
    .bind(("email", format!("{id}@example.org")))
    .bind(("role", role.as_str().to_string()))
    .bind(("institution_id", institution_id.map(|i| i.to_string())))
    .bind(("regions", regions.clone()))
    .await
    .unwrap()
    .check()
    .unwrap();

    AccessContext {
        user_id: id,
        role,
        institution_id,
        assigned_regions: regions,
        auth_mode: AuthMode::Session,
    }
}

pub async fn seed_resource(
    db: &Surreal<Db>,
    resource_type: ResourceType,
    institution_id: Uuid,
    status: ResourceStatus,
) -> Uuid {
    let id = Uuid::new_v4();
    db.query(
        "CREATE type::record('compliance_resource', $id) SET \
         resource_type = $resource_type, institution_id = $institution_id, \
         title = 'Seeded resource', status = $status, data = {}, \
         created_by = $created_by",
    )
    .bind(("id", id.to_string()))
    .bind(("resource_type", resource_type.as_str().to_string()))
    .bind(("institution_id", institution_id.to_string()))
    .bind(("status", status.as_str().to_string()))
    .bind(("created_by", Uuid::new_v4().to_string()))
    .await
    .unwrap()
    .check()
    .unwrap();
    id
}

pub async fn seed_assignment(
    db: &Surreal<Db>,
    resource_type: ResourceType,
    resource_id: Uuid,
    assigned_to: Uuid,
    status: AssignmentStatus,
) -> Uuid {
    let id = Uuid::new_v4();
    db.query(
        "CREATE type::record('assignment', $id) SET \
         resource_type = $resource_type, resource_id = $resource_id, \
         assigned_to = $assigned_to, assigned_by = $assigned_by, \
         assignment_role = 'REVIEWER', status = $status",
    )
    .bind(("id", id.to_string()))
    .bind(("resource_type", resource_type.as_str().to_string()))
    .bind(("resource_id", resource_id.to_string()))
    .bind(("assigned_to", assigned_to.to_string()))
    .bind(("assigned_by", Uuid::new_v4().to_string()))
    .bind(("status", status.as_str().to_string()))
    .await
    .unwrap()
    .check()
    .unwrap();
    id
}
