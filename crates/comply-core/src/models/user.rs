//! User (principal) domain model.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lifecycle::Lifecycle;
use super::role::Role;
use crate::error::{ComplyError, ComplyResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Inactive,
    Suspended,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "ACTIVE",
            UserStatus::Inactive => "INACTIVE",
            UserStatus::Suspended => "SUSPENDED",
        }
    }
}

impl FromStr for UserStatus {
    type Err = ComplyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(UserStatus::Active),
            "INACTIVE" => Ok(UserStatus::Inactive),
            "SUSPENDED" => Ok(UserStatus::Suspended),
            other => Err(ComplyError::validation(format!("unknown user status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    /// Owning institution; present exactly for institution-bound roles.
    pub institution_id: Option<Uuid>,
    pub status: UserStatus,
    /// Provinces a region-restricted regulator may see.
    pub assigned_regions: Vec<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub lifecycle: Lifecycle,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether this user may currently authenticate.
    pub fn can_sign_in(&self) -> bool {
        self.status == UserStatus::Active && self.lifecycle.is_active()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub institution_id: Option<Uuid>,
    pub assigned_regions: Vec<String>,
    /// Raw password (hashed with Argon2id before storage).
    pub password: String,
}

/// Fields a user may change on their own profile.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateProfile {
    pub display_name: Option<String>,
}

/// Check that a role and an institution binding agree.
pub fn validate_role_binding(role: Role, institution_id: Option<Uuid>) -> ComplyResult<()> {
    match (role.requires_institution(), institution_id) {
        (true, None) => Err(ComplyError::validation(format!(
            "role {role} requires an institution"
        ))),
        (false, Some(_)) => Err(ComplyError::validation(format!(
            "role {role} cannot belong to an institution"
        ))),
        _ => Ok(()),
    }
}

/// Minimal e-mail shape check: one `@`, non-empty local part, dotted domain.
pub fn validate_email(email: &str) -> ComplyResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ComplyError::validation(format!("invalid e-mail address: {email}")))
    }
}

/// Canonical form used for uniqueness checks.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}
