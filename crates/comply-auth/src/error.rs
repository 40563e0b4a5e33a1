//! Authentication error types.

use comply_core::error::ComplyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no credentials supplied")]
    MissingCredentials,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is not active")]
    AccountInactive,

    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("token role no longer matches the account")]
    RoleMismatch,

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl From<AuthError> for ComplyError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Crypto(msg) => ComplyError::Internal(msg),
            other => ComplyError::unauthenticated(other.to_string()),
        }
    }
}
