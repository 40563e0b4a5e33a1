//! Per-request access context.
//!
//! Built once per request by the resolver in `comply-auth` and passed by
//! reference through every service call. There is no ambient or
//! anonymous context.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::role::Role;
use crate::models::user::User;

/// How the principal proved who they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthMode {
    /// Signed session token.
    Session,
    /// Development bypass token (never available in production).
    DevBypass,
    /// Possession of an invite secret during acceptance.
    InviteToken,
    /// Operator command creating the first platform administrator.
    Bootstrap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessContext {
    pub user_id: Uuid,
    pub role: Role,
    pub institution_id: Option<Uuid>,
    pub assigned_regions: Vec<String>,
    pub auth_mode: AuthMode,
}

impl AccessContext {
    pub fn for_user(user: &User, auth_mode: AuthMode) -> Self {
        Self {
            user_id: user.id,
            role: user.role,
            institution_id: user.institution_id,
            assigned_regions: user.assigned_regions.clone(),
            auth_mode,
        }
    }

    /// Whether this principal belongs to `institution_id`.
    pub fn is_member_of(&self, institution_id: Uuid) -> bool {
        self.institution_id == Some(institution_id)
    }
}
