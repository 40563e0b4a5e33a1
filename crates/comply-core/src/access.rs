//! Read-visibility decisions for compliance resources.
//!
//! The decision is pure: callers gather the [`ResourceFacts`] (owner,
//! owner's province, whether an active assignment exists) and ask
//! [`decide_read`]. [`scope_filter_for`] expresses the same rules as a
//! predicate the storage layer can push into list queries.
//!
//! Order of evaluation:
//! 1. administrative bypass roles always see everything;
//! 2. institution-scoped roles see their own institution's resources;
//! 3. assignment-scoped regulator roles need an active assignment and,
//!    when region-restricted, an owner inside their assigned provinces;
//! 4. everyone else is denied.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::AccessContext;

/// What the decision needs to know about one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFacts {
    pub institution_id: Uuid,
    /// Province of the owning institution, if it is known.
    pub province: Option<String>,
    /// Whether an ACTIVE assignment links the principal to the resource.
    pub has_active_assignment: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantReason {
    AdminBypass,
    InstitutionOwner,
    Assignment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    OtherInstitution,
    NoAssignment,
    NoAssignedRegions,
    OutsideAssignedRegions,
    RoleCannotRead,
}

impl DenyReason {
    pub fn describe(&self) -> &'static str {
        match self {
            DenyReason::OtherInstitution => "resource belongs to another institution",
            DenyReason::NoAssignment => "no active assignment for this resource",
            DenyReason::NoAssignedRegions => "no regions are assigned to this user",
            DenyReason::OutsideAssignedRegions => {
                "resource is outside the user's assigned regions"
            }
            DenyReason::RoleCannotRead => "role cannot read compliance resources",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadDecision {
    Granted(GrantReason),
    Denied(DenyReason),
}

impl ReadDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, ReadDecision::Granted(_))
    }
}

pub fn decide_read(ctx: &AccessContext, facts: &ResourceFacts) -> ReadDecision {
    let role = ctx.role;

    if role.is_admin_bypass() {
        return ReadDecision::Granted(GrantReason::AdminBypass);
    }

    if role.is_institution_scoped() {
        return if ctx.is_member_of(facts.institution_id) {
            ReadDecision::Granted(GrantReason::InstitutionOwner)
        } else {
            ReadDecision::Denied(DenyReason::OtherInstitution)
        };
    }

    if role.requires_assignment() {
        if role.is_region_restricted() {
            // An empty region list means no access, never "all regions".
            if ctx.assigned_regions.is_empty() {
                return ReadDecision::Denied(DenyReason::NoAssignedRegions);
            }
            let in_region = facts
                .province
                .as_deref()
                .is_some_and(|p| ctx.assigned_regions.iter().any(|r| r == p));
            if !in_region {
                return ReadDecision::Denied(DenyReason::OutsideAssignedRegions);
            }
        }
        return if facts.has_active_assignment {
            ReadDecision::Granted(GrantReason::Assignment)
        } else {
            ReadDecision::Denied(DenyReason::NoAssignment)
        };
    }

    ReadDecision::Denied(DenyReason::RoleCannotRead)
}

/// A storage-independent predicate describing which resources a
/// principal may list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeFilter {
    Unrestricted,
    Institution {
        institution_id: Uuid,
    },
    Assigned {
        user_id: Uuid,
        /// `None` when the role is not region-restricted.
        regions: Option<Vec<String>>,
    },
    DenyAll,
}

pub fn scope_filter_for(ctx: &AccessContext) -> ScopeFilter {
    let role = ctx.role;

    if role.is_admin_bypass() {
        return ScopeFilter::Unrestricted;
    }

    if role.is_institution_scoped() {
        return match ctx.institution_id {
            Some(institution_id) => ScopeFilter::Institution { institution_id },
            None => ScopeFilter::DenyAll,
        };
    }

    if role.requires_assignment() {
        if role.is_region_restricted() {
            if ctx.assigned_regions.is_empty() {
                return ScopeFilter::DenyAll;
            }
            return ScopeFilter::Assigned {
                user_id: ctx.user_id,
                regions: Some(ctx.assigned_regions.clone()),
            };
        }
        return ScopeFilter::Assigned {
            user_id: ctx.user_id,
            regions: None,
        };
    }

    ScopeFilter::DenyAll
}

impl ScopeFilter {
    /// Evaluate the predicate against known facts. Agrees with
    /// [`decide_read`] for the context it was built from.
    pub fn admits(&self, facts: &ResourceFacts) -> bool {
        match self {
            ScopeFilter::Unrestricted => true,
            ScopeFilter::Institution { institution_id } => facts.institution_id == *institution_id,
            ScopeFilter::Assigned { regions, .. } => {
                let in_region = match regions {
                    Some(regions) => facts
                        .province
                        .as_deref()
                        .is_some_and(|p| regions.iter().any(|r| r == p)),
                    None => true,
                };
                in_region && facts.has_active_assignment
            }
            ScopeFilter::DenyAll => false,
        }
    }
}
