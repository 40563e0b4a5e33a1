//! Reviewer/auditor assignment domain model.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::resource::ResourceType;
use crate::error::ComplyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentRole {
    Reviewer,
    Auditor,
}

impl AssignmentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentRole::Reviewer => "REVIEWER",
            AssignmentRole::Auditor => "AUDITOR",
        }
    }
}

impl FromStr for AssignmentRole {
    type Err = ComplyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REVIEWER" => Ok(AssignmentRole::Reviewer),
            "AUDITOR" => Ok(AssignmentRole::Auditor),
            other => Err(ComplyError::validation(format!(
                "unknown assignment role: {other}"
            ))),
        }
    }
}

/// Assignments are never deleted; removal flips the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Active,
    Removed,
    Completed,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Active => "ACTIVE",
            AssignmentStatus::Removed => "REMOVED",
            AssignmentStatus::Completed => "COMPLETED",
        }
    }
}

impl FromStr for AssignmentStatus {
    type Err = ComplyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(AssignmentStatus::Active),
            "REMOVED" => Ok(AssignmentStatus::Removed),
            "COMPLETED" => Ok(AssignmentStatus::Completed),
            other => Err(ComplyError::validation(format!(
                "unknown assignment status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub resource_type: ResourceType,
    pub resource_id: Uuid,
    pub assigned_to: Uuid,
    pub assigned_by: Uuid,
    pub assignment_role: AssignmentRole,
    pub status: AssignmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAssignment {
    pub resource_type: ResourceType,
    pub resource_id: Uuid,
    pub assigned_to: Uuid,
    pub assignment_role: AssignmentRole,
}

/// Whose assignments a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssigneeSelector {
    Me,
    User(Uuid),
}

/// Assignment list query. `status` defaults to `ACTIVE` when omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentQuery {
    pub user: AssigneeSelector,
    pub resource_type: Option<ResourceType>,
    pub status: Option<AssignmentStatus>,
}

impl AssignmentQuery {
    pub fn mine() -> Self {
        Self {
            user: AssigneeSelector::Me,
            resource_type: None,
            status: None,
        }
    }

    pub fn effective_status(&self) -> AssignmentStatus {
        self.status.unwrap_or(AssignmentStatus::Active)
    }
}

/// Row returned by assignment queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentSummary {
    pub id: Uuid,
    pub resource_type: ResourceType,
    pub resource_id: Uuid,
    pub assignment_role: AssignmentRole,
    pub status: AssignmentStatus,
    pub created_at: DateTime<Utc>,
}

impl From<Assignment> for AssignmentSummary {
    fn from(a: Assignment) -> Self {
        Self {
            id: a.id,
            resource_type: a.resource_type,
            resource_id: a.resource_id,
            assignment_role: a.assignment_role,
            status: a.status,
            created_at: a.created_at,
        }
    }
}
