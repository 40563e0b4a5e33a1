//! Compliance resource domain model.
//!
//! Readiness records, submissions, regulator requests and attendance
//! records share one shape: an owning institution, a workflow status
//! and a free-form JSON payload.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lifecycle::Lifecycle;
use crate::error::ComplyError;
use crate::rbac::Capability;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    Readiness,
    Submission,
    QctoRequest,
    Attendance,
}

impl ResourceType {
    pub const ALL: [ResourceType; 4] = [
        ResourceType::Readiness,
        ResourceType::Submission,
        ResourceType::QctoRequest,
        ResourceType::Attendance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Readiness => "READINESS",
            ResourceType::Submission => "SUBMISSION",
            ResourceType::QctoRequest => "QCTO_REQUEST",
            ResourceType::Attendance => "ATTENDANCE",
        }
    }

    /// Capability needed to create a resource of this type.
    pub fn create_capability(&self) -> Capability {
        match self {
            ResourceType::Readiness | ResourceType::Submission => Capability::ResourceEdit,
            ResourceType::Attendance => Capability::AttendanceCapture,
            ResourceType::QctoRequest => Capability::QctoRequestCreate,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = ComplyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ComplyError::validation(format!("unknown resource type: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    Draft,
    Submitted,
    UnderReview,
    Approved,
    Rejected,
    Returned,
}

impl ResourceStatus {
    pub const ALL: [ResourceStatus; 6] = [
        ResourceStatus::Draft,
        ResourceStatus::Submitted,
        ResourceStatus::UnderReview,
        ResourceStatus::Approved,
        ResourceStatus::Rejected,
        ResourceStatus::Returned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Draft => "DRAFT",
            ResourceStatus::Submitted => "SUBMITTED",
            ResourceStatus::UnderReview => "UNDER_REVIEW",
            ResourceStatus::Approved => "APPROVED",
            ResourceStatus::Rejected => "REJECTED",
            ResourceStatus::Returned => "RETURNED",
        }
    }

    /// Whether the institution may still edit the payload.
    pub fn is_editable(&self) -> bool {
        matches!(self, ResourceStatus::Draft | ResourceStatus::Returned)
    }

    /// Capability required to move from `self` to `to`, or `None` if the
    /// workflow has no such edge.
    pub fn transition_capability(&self, to: ResourceStatus) -> Option<Capability> {
        use ResourceStatus::*;
        match (self, to) {
            (Draft, Submitted) | (Returned, Submitted) => Some(Capability::ResourceSubmit),
            (Submitted, UnderReview)
            | (Submitted, Returned)
            | (UnderReview, Approved)
            | (UnderReview, Rejected)
            | (UnderReview, Returned) => Some(Capability::QctoReview),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceStatus {
    type Err = ComplyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceStatus::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ComplyError::validation(format!("unknown resource status: {s}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceResource {
    pub id: Uuid,
    pub resource_type: ResourceType,
    pub institution_id: Uuid,
    pub title: String,
    pub status: ResourceStatus,
    pub data: serde_json::Value,
    pub created_by: Uuid,
    pub lifecycle: Lifecycle,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResource {
    pub resource_type: ResourceType,
    pub institution_id: Uuid,
    pub title: String,
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateResource {
    pub title: Option<String>,
    pub data: Option<serde_json::Value>,
}
