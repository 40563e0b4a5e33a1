//! SurrealDB repository implementations.

mod assignment;
mod audit;
mod institution;
mod invite;
mod resource;
mod user;

use std::fmt::Display;
use std::str::FromStr;

use surrealdb::IndexedResults as Response;
use surrealdb_types::SurrealValue;
use uuid::Uuid;

pub use assignment::SurrealAssignmentRepository;
pub use audit::SurrealAuditLogRepository;
pub use institution::SurrealInstitutionRepository;
pub use invite::SurrealInviteRepository;
pub use resource::SurrealResourceRepository;
pub use user::SurrealUserRepository;

use crate::error::DbError;

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
pub(crate) struct CountRow {
    pub(crate) total: u64,
}

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| DbError::decode("invalid UUID", e))
}

pub(crate) fn parse_opt_uuid(value: Option<String>) -> Result<Option<Uuid>, DbError> {
    value.as_deref().map(parse_uuid).transpose()
}

/// Decode a stored enum name.
pub(crate) fn parse_enum<T>(value: &str) -> Result<T, DbError>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse().map_err(|e| DbError::decode("invalid enum value", e))
}

pub(crate) fn first_or_not_found<T>(
    rows: Vec<T>,
    entity: &str,
    id: impl ToString,
) -> Result<T, DbError> {
    rows.into_iter().next().ok_or_else(|| DbError::NotFound {
        entity: entity.into(),
        id: id.to_string(),
    })
}

pub(crate) fn total_from(rows: Vec<CountRow>) -> u64 {
    rows.first().map(|r| r.total).unwrap_or(0)
}

/// Fail with the most telling statement error, if any statement failed.
pub(crate) fn check_response(response: &mut Response) -> Result<(), DbError> {
    let errors: Vec<String> = response
        .take_errors()
        .into_values()
        .map(|e| e.to_string())
        .collect();
    if errors.is_empty() {
        return Ok(());
    }
    Err(DbError::from_statement_errors(errors))
}
