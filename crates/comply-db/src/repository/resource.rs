//! SurrealDB implementation of [`ResourceRepository`].
//!
//! Visibility filters are rendered into the `WHERE` clause so that
//! listing and single-resource checks agree.

use chrono::{DateTime, Utc};
use comply_core::access::{ResourceFacts, ScopeFilter};
use comply_core::error::ComplyResult;
use comply_core::models::lifecycle::Lifecycle;
use comply_core::models::resource::{ComplianceResource, ResourceType};
use comply_core::repository::{PaginatedResult, Pagination, ResourceRepository};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{CountRow, first_or_not_found, parse_enum, parse_uuid, total_from};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct ResourceRow {
    record_id: String,
    resource_type: String,
    institution_id: String,
    title: String,
    status: String,
    data: serde_json::Value,
    created_by: String,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ResourceRow {
    fn try_into_resource(self) -> Result<ComplianceResource, DbError> {
        Ok(ComplianceResource {
            id: parse_uuid(&self.record_id)?,
            resource_type: parse_enum(&self.resource_type)?,
            institution_id: parse_uuid(&self.institution_id)?,
            title: self.title,
            status: parse_enum(&self.status)?,
            data: self.data,
            created_by: parse_uuid(&self.created_by)?,
            lifecycle: Lifecycle::from_deleted_at(self.deleted_at),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct OwnerRow {
    institution_id: String,
}

#[derive(Debug, SurrealValue)]
struct ProvinceRow {
    province: String,
}

/// A `WHERE` clause with its bound values.
struct Clause {
    sql: Vec<&'static str>,
    binds: Vec<(&'static str, serde_json::Value)>,
}

/// Render a scope filter, or `None` when it admits nothing.
fn scope_clause(filter: &ScopeFilter, resource_type: Option<ResourceType>) -> Option<Clause> {
    let mut clause = Clause {
        sql: vec!["deleted_at = NONE"],
        binds: Vec::new(),
    };
    if let Some(rt) = resource_type {
        clause.sql.push("resource_type = $resource_type");
        clause.binds.push(("resource_type", rt.as_str().into()));
    }

    match filter {
        ScopeFilter::DenyAll => return None,
        ScopeFilter::Unrestricted => {}
        ScopeFilter::Institution { institution_id } => {
            clause.sql.push("institution_id = $scope_institution");
            clause
                .binds
                .push(("scope_institution", institution_id.to_string().into()));
        }
        ScopeFilter::Assigned { user_id, regions } => {
            clause.sql.push(
                "meta::id(id) IN (SELECT VALUE resource_id FROM assignment \
                 WHERE assigned_to = $scope_user AND status = 'ACTIVE')",
            );
            clause.binds.push(("scope_user", user_id.to_string().into()));
            if let Some(regions) = regions {
                clause.sql.push(
                    "institution_id IN (SELECT VALUE meta::id(id) FROM institution \
                     WHERE province IN $scope_regions)",
                );
                clause
                    .binds
                    .push(("scope_regions", serde_json::Value::from(regions.clone())));
            }
        }
    }
    Some(clause)
}

#[derive(Clone)]
pub struct SurrealResourceRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealResourceRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> ResourceRepository for SurrealResourceRepository<C> {
    async fn get_by_id(
        &self,
        resource_type: ResourceType,
        id: Uuid,
    ) -> ComplyResult<ComplianceResource> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('compliance_resource', $id) \
                 WHERE deleted_at = NONE AND resource_type = $resource_type",
            )
            .bind(("id", id.to_string()))
            .bind(("resource_type", resource_type.as_str().to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ResourceRow> = result.take(0).map_err(DbError::from)?;
        let row = first_or_not_found(rows, resource_type.as_str(), id)?;
        Ok(row.try_into_resource()?)
    }

    async fn read_facts(
        &self,
        resource_type: ResourceType,
        id: Uuid,
        user_id: Uuid,
    ) -> ComplyResult<Option<ResourceFacts>> {
        let mut result = self
            .db
            .query(
                "SELECT institution_id FROM type::record('compliance_resource', $id) \
                 WHERE deleted_at = NONE AND resource_type = $resource_type; \
                 SELECT count() AS total FROM assignment \
                 WHERE resource_type = $resource_type AND resource_id = $id \
                 AND assigned_to = $user_id AND status = 'ACTIVE' GROUP ALL;",
            )
            .bind(("id", id.to_string()))
            .bind(("resource_type", resource_type.as_str().to_string()))
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let owners: Vec<OwnerRow> = result.take(0).map_err(DbError::from)?;
        let assignments: Vec<CountRow> = result.take(1).map_err(DbError::from)?;
        let Some(owner) = owners.into_iter().next() else {
            return Ok(None);
        };

        let mut result = self
            .db
            .query("SELECT province FROM type::record('institution', $id)")
            .bind(("id", owner.institution_id.clone()))
            .await
            .map_err(DbError::from)?;
        let provinces: Vec<ProvinceRow> = result.take(0).map_err(DbError::from)?;

        Ok(Some(ResourceFacts {
            institution_id: parse_uuid(&owner.institution_id)?,
            province: provinces.into_iter().next().map(|p| p.province),
            has_active_assignment: total_from(assignments) > 0,
        }))
    }

    async fn list_visible(
        &self,
        filter: &ScopeFilter,
        resource_type: Option<ResourceType>,
        pagination: Pagination,
    ) -> ComplyResult<PaginatedResult<ComplianceResource>> {
        let Some(clause) = scope_clause(filter, resource_type) else {
            return Ok(PaginatedResult {
                items: Vec::new(),
                total: 0,
                offset: pagination.offset,
                limit: pagination.limit,
            });
        };
        let where_sql = clause.sql.join(" AND ");

        let mut query = self
            .db
            .query(format!(
                "SELECT count() AS total FROM compliance_resource \
                 WHERE {where_sql} GROUP ALL; \
                 SELECT meta::id(id) AS record_id, * FROM compliance_resource \
                 WHERE {where_sql} ORDER BY created_at DESC \
                 LIMIT $limit START $offset;"
            ))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset));
        for (name, value) in clause.binds {
            query = query.bind((name, value));
        }
        let mut result = query.await.map_err(DbError::from)?;

        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let rows: Vec<ResourceRow> = result.take(1).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(ResourceRow::try_into_resource)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total: total_from(count_rows),
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_all_renders_no_query() {
        assert!(scope_clause(&ScopeFilter::DenyAll, None).is_none());
    }

    #[test]
    fn region_restricted_filter_binds_regions() {
        let filter = ScopeFilter::Assigned {
            user_id: Uuid::new_v4(),
            regions: Some(vec!["Gauteng".into()]),
        };
        let clause = scope_clause(&filter, Some(ResourceType::Readiness)).unwrap();
        assert_eq!(clause.sql.len(), 4);
        assert!(clause.binds.iter().any(|(name, _)| *name == "scope_regions"));
    }
}
