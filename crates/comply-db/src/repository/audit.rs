//! SurrealDB implementation of [`AuditLogRepository`]. Read-only: audit
//! rows are written exclusively by the audited mutation executor.

use chrono::{DateTime, Utc};
use comply_core::error::ComplyResult;
use comply_core::models::audit::AuditLogEntry;
use comply_core::repository::{AuditLogFilter, AuditLogRepository, PaginatedResult, Pagination};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;

use super::{CountRow, parse_enum, parse_opt_uuid, parse_uuid, total_from};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct AuditLogRow {
    record_id: String,
    mutation_id: String,
    entity_type: String,
    entity_id: String,
    field_name: String,
    old_value: Option<String>,
    new_value: Option<String>,
    changed_by: String,
    role_at_time: String,
    change_type: String,
    institution_id: Option<String>,
    reason: Option<String>,
    timestamp: DateTime<Utc>,
}

impl AuditLogRow {
    fn try_into_entry(self) -> Result<AuditLogEntry, DbError> {
        Ok(AuditLogEntry {
            id: parse_uuid(&self.record_id)?,
            mutation_id: parse_uuid(&self.mutation_id)?,
            entity_type: parse_enum(&self.entity_type)?,
            entity_id: parse_uuid(&self.entity_id)?,
            field_name: self.field_name,
            old_value: self.old_value,
            new_value: self.new_value,
            changed_by: parse_uuid(&self.changed_by)?,
            role_at_time: parse_enum(&self.role_at_time)?,
            change_type: parse_enum(&self.change_type)?,
            institution_id: parse_opt_uuid(self.institution_id)?,
            reason: self.reason,
            timestamp: self.timestamp,
        })
    }
}

#[derive(Clone)]
pub struct SurrealAuditLogRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAuditLogRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AuditLogRepository for SurrealAuditLogRepository<C> {
    async fn list(
        &self,
        filter: AuditLogFilter,
        pagination: Pagination,
    ) -> ComplyResult<PaginatedResult<AuditLogEntry>> {
        let mut conditions = vec!["true"];
        if filter.entity_type.is_some() {
            conditions.push("entity_type = $entity_type");
        }
        if filter.entity_id.is_some() {
            conditions.push("entity_id = $entity_id");
        }
        if filter.changed_by.is_some() {
            conditions.push("changed_by = $changed_by");
        }
        if filter.mutation_id.is_some() {
            conditions.push("mutation_id = $mutation_id");
        }
        let where_sql = conditions.join(" AND ");

        let mut result = self
            .db
            .query(format!(
                "SELECT count() AS total FROM audit_log WHERE {where_sql} GROUP ALL; \
                 SELECT meta::id(id) AS record_id, * FROM audit_log WHERE {where_sql} \
                 ORDER BY timestamp ASC, field_name ASC LIMIT $limit START $offset;"
            ))
            .bind((
                "entity_type",
                filter.entity_type.map(|t| t.as_str().to_string()),
            ))
            .bind(("entity_id", filter.entity_id.map(|id| id.to_string())))
            .bind(("changed_by", filter.changed_by.map(|id| id.to_string())))
            .bind(("mutation_id", filter.mutation_id.map(|id| id.to_string())))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let rows: Vec<AuditLogRow> = result.take(1).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(AuditLogRow::try_into_entry)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total: total_from(count_rows),
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
