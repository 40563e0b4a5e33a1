//! SurrealDB implementation of [`AssignmentRepository`].

use chrono::{DateTime, Utc};
use comply_core::error::ComplyResult;
use comply_core::models::assignment::{Assignment, AssignmentRole, AssignmentStatus};
use comply_core::models::resource::ResourceType;
use comply_core::repository::AssignmentRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{first_or_not_found, parse_enum, parse_uuid};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct AssignmentRow {
    record_id: String,
    resource_type: String,
    resource_id: String,
    assigned_to: String,
    assigned_by: String,
    assignment_role: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AssignmentRow {
    fn try_into_assignment(self) -> Result<Assignment, DbError> {
        Ok(Assignment {
            id: parse_uuid(&self.record_id)?,
            resource_type: parse_enum(&self.resource_type)?,
            resource_id: parse_uuid(&self.resource_id)?,
            assigned_to: parse_uuid(&self.assigned_to)?,
            assigned_by: parse_uuid(&self.assigned_by)?,
            assignment_role: parse_enum(&self.assignment_role)?,
            status: parse_enum(&self.status)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct SurrealAssignmentRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAssignmentRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AssignmentRepository for SurrealAssignmentRepository<C> {
    async fn get_by_id(&self, id: Uuid) -> ComplyResult<Assignment> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('assignment', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AssignmentRow> = result.take(0).map_err(DbError::from)?;
        Ok(first_or_not_found(rows, "assignment", id)?.try_into_assignment()?)
    }

    async fn find(
        &self,
        resource_type: ResourceType,
        resource_id: Uuid,
        assigned_to: Uuid,
        assignment_role: AssignmentRole,
    ) -> ComplyResult<Option<Assignment>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM assignment \
                 WHERE resource_type = $resource_type AND resource_id = $resource_id \
                 AND assigned_to = $assigned_to AND assignment_role = $assignment_role",
            )
            .bind(("resource_type", resource_type.as_str().to_string()))
            .bind(("resource_id", resource_id.to_string()))
            .bind(("assigned_to", assigned_to.to_string()))
            .bind(("assignment_role", assignment_role.as_str().to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AssignmentRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .next()
            .map(AssignmentRow::try_into_assignment)
            .transpose()?)
    }

    async fn list_for_user(
        &self,
        assigned_to: Uuid,
        resource_type: Option<ResourceType>,
        status: AssignmentStatus,
    ) -> ComplyResult<Vec<Assignment>> {
        let type_filter = if resource_type.is_some() {
            " AND resource_type = $resource_type"
        } else {
            ""
        };
        let mut result = self
            .db
            .query(format!(
                "SELECT meta::id(id) AS record_id, * FROM assignment \
                 WHERE assigned_to = $assigned_to AND status = $status{type_filter} \
                 ORDER BY created_at DESC"
            ))
            .bind(("assigned_to", assigned_to.to_string()))
            .bind(("status", status.as_str().to_string()))
            .bind(("resource_type", resource_type.map(|t| t.as_str().to_string())))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AssignmentRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(AssignmentRow::try_into_assignment)
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}
