//! SurrealDB implementation of [`InstitutionRepository`].

use chrono::{DateTime, Utc};
use comply_core::error::ComplyResult;
use comply_core::models::institution::Institution;
use comply_core::models::lifecycle::Lifecycle;
use comply_core::repository::{InstitutionRepository, PaginatedResult, Pagination};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{CountRow, first_or_not_found, parse_uuid, total_from};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct InstitutionRow {
    record_id: String,
    name: String,
    province: String,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InstitutionRow {
    fn try_into_institution(self) -> Result<Institution, DbError> {
        Ok(Institution {
            id: parse_uuid(&self.record_id)?,
            name: self.name,
            province: self.province,
            lifecycle: Lifecycle::from_deleted_at(self.deleted_at),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct SurrealInstitutionRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealInstitutionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> InstitutionRepository for SurrealInstitutionRepository<C> {
    async fn get_by_id(&self, id: Uuid) -> ComplyResult<Institution> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('institution', $id) WHERE deleted_at = NONE",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<InstitutionRow> = result.take(0).map_err(DbError::from)?;
        Ok(first_or_not_found(rows, "institution", id)?.try_into_institution()?)
    }

    async fn list(&self, pagination: Pagination) -> ComplyResult<PaginatedResult<Institution>> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM institution \
                 WHERE deleted_at = NONE GROUP ALL; \
                 SELECT meta::id(id) AS record_id, * FROM institution \
                 WHERE deleted_at = NONE ORDER BY name ASC \
                 LIMIT $limit START $offset;",
            )
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let rows: Vec<InstitutionRow> = result.take(1).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(InstitutionRow::try_into_institution)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total: total_from(count_rows),
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
