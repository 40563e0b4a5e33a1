//! Principal roles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ComplyError;

/// The closed set of principal roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    PlatformAdmin,
    QctoSuperAdmin,
    QctoAdmin,
    QctoUser,
    QctoReviewer,
    QctoAuditor,
    QctoViewer,
    InstitutionAdmin,
    InstitutionStaff,
    Student,
}

impl Role {
    pub const ALL: [Role; 10] = [
        Role::PlatformAdmin,
        Role::QctoSuperAdmin,
        Role::QctoAdmin,
        Role::QctoUser,
        Role::QctoReviewer,
        Role::QctoAuditor,
        Role::QctoViewer,
        Role::InstitutionAdmin,
        Role::InstitutionStaff,
        Role::Student,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::PlatformAdmin => "PLATFORM_ADMIN",
            Role::QctoSuperAdmin => "QCTO_SUPER_ADMIN",
            Role::QctoAdmin => "QCTO_ADMIN",
            Role::QctoUser => "QCTO_USER",
            Role::QctoReviewer => "QCTO_REVIEWER",
            Role::QctoAuditor => "QCTO_AUDITOR",
            Role::QctoViewer => "QCTO_VIEWER",
            Role::InstitutionAdmin => "INSTITUTION_ADMIN",
            Role::InstitutionStaff => "INSTITUTION_STAFF",
            Role::Student => "STUDENT",
        }
    }

    /// Roles that see every resource regardless of ownership,
    /// assignment or region.
    pub fn is_admin_bypass(&self) -> bool {
        matches!(
            self,
            Role::PlatformAdmin | Role::QctoSuperAdmin | Role::QctoAdmin
        )
    }

    /// Roles whose visibility is bounded by their own institution.
    pub fn is_institution_scoped(&self) -> bool {
        matches!(self, Role::InstitutionAdmin | Role::InstitutionStaff)
    }

    /// Regulator roles that need an explicit assignment to see a resource.
    pub fn requires_assignment(&self) -> bool {
        matches!(
            self,
            Role::QctoUser | Role::QctoReviewer | Role::QctoAuditor | Role::QctoViewer
        )
    }

    /// Regulator roles additionally limited to their assigned provinces.
    pub fn is_region_restricted(&self) -> bool {
        matches!(
            self,
            Role::QctoUser | Role::QctoReviewer | Role::QctoAuditor
        )
    }

    pub fn is_regulator(&self) -> bool {
        matches!(
            self,
            Role::QctoSuperAdmin
                | Role::QctoAdmin
                | Role::QctoUser
                | Role::QctoReviewer
                | Role::QctoAuditor
                | Role::QctoViewer
        )
    }

    /// Roles that must be bound to an institution.
    pub fn requires_institution(&self) -> bool {
        matches!(
            self,
            Role::InstitutionAdmin | Role::InstitutionStaff | Role::Student
        )
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ComplyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| ComplyError::validation(format!("unknown role: {s}")))
    }
}
