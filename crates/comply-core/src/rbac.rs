//! Role/capability table.
//!
//! Static data: every role maps to a fixed capability set and a set of
//! areas. Matches are exhaustive, so adding a role without deciding its
//! grants does not compile. Anything not listed is denied.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ComplyError, ComplyResult};
use crate::models::role::Role;

/// A named permission checked before a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    ResourceEdit,
    ResourceSubmit,
    AttendanceCapture,
    QctoRequestCreate,
    QctoReview,
    QctoAudit,
    QctoAssign,
    InviteUsers,
    UserManage,
    InstitutionManage,
    AuditLogView,
    ProfileEdit,
}

impl Capability {
    pub const ALL: [Capability; 12] = [
        Capability::ResourceEdit,
        Capability::ResourceSubmit,
        Capability::AttendanceCapture,
        Capability::QctoRequestCreate,
        Capability::QctoReview,
        Capability::QctoAudit,
        Capability::QctoAssign,
        Capability::InviteUsers,
        Capability::UserManage,
        Capability::InstitutionManage,
        Capability::AuditLogView,
        Capability::ProfileEdit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ResourceEdit => "RESOURCE_EDIT",
            Capability::ResourceSubmit => "RESOURCE_SUBMIT",
            Capability::AttendanceCapture => "ATTENDANCE_CAPTURE",
            Capability::QctoRequestCreate => "QCTO_REQUEST_CREATE",
            Capability::QctoReview => "QCTO_REVIEW",
            Capability::QctoAudit => "QCTO_AUDIT",
            Capability::QctoAssign => "QCTO_ASSIGN",
            Capability::InviteUsers => "INVITE_USERS",
            Capability::UserManage => "USER_MANAGE",
            Capability::InstitutionManage => "INSTITUTION_MANAGE",
            Capability::AuditLogView => "AUDIT_LOG_VIEW",
            Capability::ProfileEdit => "PROFILE_EDIT",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = ComplyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ComplyError::validation(format!("unknown capability: {s}")))
    }
}

/// Top-level application areas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Area {
    PlatformAdmin,
    Qcto,
    Institution,
    Student,
}

impl Area {
    pub const ALL: [Area; 4] = [Area::PlatformAdmin, Area::Qcto, Area::Institution, Area::Student];

    pub fn as_str(&self) -> &'static str {
        match self {
            Area::PlatformAdmin => "PLATFORM_ADMIN",
            Area::Qcto => "QCTO",
            Area::Institution => "INSTITUTION",
            Area::Student => "STUDENT",
        }
    }
}

impl FromStr for Area {
    type Err = ComplyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Area::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ComplyError::validation(format!("unknown area: {s}")))
    }
}

use Capability as C;

/// Capabilities granted to each role.
pub fn capabilities(role: Role) -> &'static [Capability] {
    match role {
        Role::PlatformAdmin => &[
            C::ResourceEdit,
            C::ResourceSubmit,
            C::AttendanceCapture,
            C::QctoRequestCreate,
            C::QctoReview,
            C::QctoAudit,
            C::QctoAssign,
            C::InviteUsers,
            C::UserManage,
            C::InstitutionManage,
            C::AuditLogView,
            C::ProfileEdit,
        ],
        Role::QctoSuperAdmin => &[
            C::QctoRequestCreate,
            C::QctoReview,
            C::QctoAudit,
            C::QctoAssign,
            C::InviteUsers,
            C::UserManage,
            C::AuditLogView,
            C::ProfileEdit,
        ],
        Role::QctoAdmin => &[
            C::QctoRequestCreate,
            C::QctoReview,
            C::QctoAudit,
            C::QctoAssign,
            C::InviteUsers,
            C::AuditLogView,
            C::ProfileEdit,
        ],
        Role::QctoUser => &[C::QctoRequestCreate, C::ProfileEdit],
        Role::QctoReviewer => &[C::QctoReview, C::ProfileEdit],
        Role::QctoAuditor => &[C::QctoAudit, C::AuditLogView, C::ProfileEdit],
        Role::QctoViewer => &[C::ProfileEdit],
        Role::InstitutionAdmin => &[
            C::ResourceEdit,
            C::ResourceSubmit,
            C::AttendanceCapture,
            C::InviteUsers,
            C::UserManage,
            C::ProfileEdit,
        ],
        Role::InstitutionStaff => &[C::ResourceEdit, C::AttendanceCapture, C::ProfileEdit],
        Role::Student => &[C::ProfileEdit],
    }
}

/// Areas each role may enter.
pub fn areas(role: Role) -> &'static [Area] {
    match role {
        Role::PlatformAdmin => &Area::ALL,
        Role::QctoSuperAdmin
        | Role::QctoAdmin
        | Role::QctoUser
        | Role::QctoReviewer
        | Role::QctoAuditor
        | Role::QctoViewer => &[Area::Qcto],
        Role::InstitutionAdmin | Role::InstitutionStaff => &[Area::Institution],
        Role::Student => &[Area::Student],
    }
}

pub fn has_capability(role: Role, capability: Capability) -> bool {
    capabilities(role).contains(&capability)
}

pub fn can_access_area(role: Role, area: Area) -> bool {
    areas(role).contains(&area)
}

/// String entry point; unknown roles or capabilities are denied.
pub fn has_capability_named(role: &str, capability: &str) -> bool {
    match (role.parse::<Role>(), capability.parse::<Capability>()) {
        (Ok(role), Ok(capability)) => has_capability(role, capability),
        _ => false,
    }
}

/// String entry point; unknown roles or areas are denied.
pub fn can_access_area_named(role: &str, area: &str) -> bool {
    match (role.parse::<Role>(), area.parse::<Area>()) {
        (Ok(role), Ok(area)) => can_access_area(role, area),
        _ => false,
    }
}

/// Assert a capability, failing with `Forbidden`.
pub fn require(role: Role, capability: Capability) -> ComplyResult<()> {
    if has_capability(role, capability) {
        Ok(())
    } else {
        Err(ComplyError::forbidden(format!(
            "role {role} lacks capability {capability}"
        )))
    }
}
