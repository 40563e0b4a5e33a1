//! Database-specific error types and conversions.

use comply_core::error::ComplyError;

/// Marker thrown by existence guards inside audited transactions.
pub(crate) const NOT_FOUND_MARKER: &str = "NOT_FOUND:";

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Corrupt row: {0}")]
    Decode(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("{entity} already exists")]
    Conflict { entity: String },
}

impl DbError {
    /// Turn a failed statement's message into a typed error.
    ///
    /// Guards raise `NOT_FOUND:<table>:<id>`; unique indexes report that
    /// the index "already contains" a value.
    pub(crate) fn classify(message: String) -> Self {
        if let Some(pos) = message.find(NOT_FOUND_MARKER) {
            let rest = &message[pos + NOT_FOUND_MARKER.len()..];
            let mut parts = rest.splitn(2, ':');
            let entity = parts.next().unwrap_or_default().to_string();
            let id: String = parts
                .next()
                .unwrap_or_default()
                .chars()
                .take_while(|c| c.is_ascii_hexdigit() || *c == '-')
                .collect();
            return DbError::NotFound { entity, id };
        }
        if message.contains("already contains") {
            let entity = message
                .split('`')
                .nth(1)
                .and_then(|idx| idx.strip_prefix("idx_"))
                .and_then(|idx| idx.split('_').next())
                .unwrap_or("record")
                .to_string();
            return DbError::Conflict { entity };
        }
        DbError::Query(message)
    }

    /// Pick the statement error that explains a failed transaction. The
    /// other statements only report that the transaction was cancelled.
    pub(crate) fn from_statement_errors(errors: Vec<String>) -> Self {
        let pick = errors
            .iter()
            .find(|e| e.contains(NOT_FOUND_MARKER))
            .or_else(|| errors.iter().find(|e| e.contains("already contains")))
            .or_else(|| {
                errors
                    .iter()
                    .find(|e| !e.contains("not executed due to a failed transaction"))
            })
            .or_else(|| errors.first())
            .cloned()
            .unwrap_or_default();
        DbError::classify(pick)
    }

    pub(crate) fn decode(what: &str, err: impl std::fmt::Display) -> Self {
        DbError::Decode(format!("{what}: {err}"))
    }
}

impl From<DbError> for ComplyError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ComplyError::NotFound { entity, id },
            DbError::Conflict { entity } => ComplyError::AlreadyExists { entity },
            other => ComplyError::Database(other.to_string()),
        }
    }
}
