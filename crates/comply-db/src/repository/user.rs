//! SurrealDB implementation of [`UserRepository`].

use chrono::{DateTime, Utc};
use comply_core::error::ComplyResult;
use comply_core::models::lifecycle::Lifecycle;
use comply_core::models::role::Role;
use comply_core::models::user::{User, normalize_email};
use comply_core::repository::{PaginatedResult, Pagination, UserRepository};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{CountRow, first_or_not_found, parse_enum, parse_opt_uuid, parse_uuid, total_from};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct UserRow {
    record_id: String,
    email: String,
    display_name: String,
    role: String,
    institution_id: Option<String>,
    status: String,
    assigned_regions: Vec<String>,
    password_hash: String,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn try_into_user(self) -> Result<User, DbError> {
        Ok(User {
            id: parse_uuid(&self.record_id)?,
            email: self.email,
            display_name: self.display_name,
            role: parse_enum(&self.role)?,
            institution_id: parse_opt_uuid(self.institution_id)?,
            status: parse_enum(&self.status)?,
            assigned_regions: self.assigned_regions,
            password_hash: self.password_hash,
            lifecycle: Lifecycle::from_deleted_at(self.deleted_at),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the User repository.
#[derive(Clone)]
pub struct SurrealUserRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealUserRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> UserRepository for SurrealUserRepository<C> {
    async fn get_by_id(&self, id: Uuid) -> ComplyResult<User> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM type::record('user', $id) \
                 WHERE deleted_at = NONE",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        Ok(first_or_not_found(rows, "user", id)?.try_into_user()?)
    }

    async fn get_by_email(&self, email: &str) -> ComplyResult<User> {
        let email = normalize_email(email);
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM user \
                 WHERE email = $email AND deleted_at = NONE",
            )
            .bind(("email", email.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        Ok(first_or_not_found(rows, "user", format!("email={email}"))?.try_into_user()?)
    }

    async fn email_exists(&self, email: &str) -> ComplyResult<bool> {
        // Soft-deleted users still hold their address.
        let mut result = self
            .db
            .query("SELECT count() AS total FROM user WHERE email = $email GROUP ALL")
            .bind(("email", normalize_email(email)))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(total_from(rows) > 0)
    }

    async fn count_with_role(&self, role: Role) -> ComplyResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM user \
                 WHERE role = $role AND deleted_at = NONE GROUP ALL",
            )
            .bind(("role", role.as_str().to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(total_from(rows))
    }

    async fn list(
        &self,
        institution_id: Option<Uuid>,
        pagination: Pagination,
    ) -> ComplyResult<PaginatedResult<User>> {
        let filter = match institution_id {
            Some(_) => "deleted_at = NONE AND institution_id = $institution_id",
            None => "deleted_at = NONE",
        };
        let institution = institution_id.map(|id| id.to_string());

        let mut count_result = self
            .db
            .query(format!(
                "SELECT count() AS total FROM user WHERE {filter} GROUP ALL"
            ))
            .bind(("institution_id", institution.clone()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = total_from(count_rows);

        let mut result = self
            .db
            .query(format!(
                "SELECT meta::id(id) AS record_id, * FROM user WHERE {filter} \
                 ORDER BY created_at ASC LIMIT $limit START $offset"
            ))
            .bind(("institution_id", institution))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(UserRow::try_into_user)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
