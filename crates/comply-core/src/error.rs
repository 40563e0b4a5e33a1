//! Error types for the compliance core.
//!
//! Every layer converts its own error type into [`ComplyError`]. At the
//! request boundary [`ComplyError::to_api_error`] maps it to the stable
//! `{code, message, http_status}` shape returned to callers.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComplyError {
    #[error("Authentication required: {reason}")]
    Unauthenticated { reason: String },

    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ComplyResult<T> = Result<T, ComplyError>;

impl ComplyError {
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated {
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// The stable error code reported to callers.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unauthenticated { .. } => ErrorCode::Unauthenticated,
            Self::Forbidden { .. } => ErrorCode::Forbidden,
            Self::Validation { .. } | Self::AlreadyExists { .. } => ErrorCode::ValidationError,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Database(_) | Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthenticated { .. } => 401,
            Self::Forbidden { .. } => 403,
            Self::Validation { .. } => 400,
            Self::AlreadyExists { .. } => 409,
            Self::NotFound { .. } => 404,
            Self::Database(_) | Self::Internal(_) => 500,
        }
    }

    /// Map to the boundary shape.
    ///
    /// Internal failures are logged here and replaced with a generic
    /// message so storage details never reach the caller.
    pub fn to_api_error(&self) -> ApiError {
        let message = match self {
            Self::Database(_) | Self::Internal(_) => {
                tracing::error!(error = %self, "Request failed with internal error");
                GENERIC_INTERNAL_MESSAGE.to_string()
            }
            other => other.to_string(),
        };
        ApiError {
            code: self.code(),
            message,
            http_status: self.http_status(),
        }
    }
}

const GENERIC_INTERNAL_MESSAGE: &str = "An unexpected error occurred";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthenticated,
    Forbidden,
    ValidationError,
    NotFound,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Forbidden => "FORBIDDEN",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// Error payload returned across the request boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub http_status: u16,
}

impl From<ComplyError> for ApiError {
    fn from(err: ComplyError) -> Self {
        err.to_api_error()
    }
}
