//! Repository trait definitions for data access abstraction.
//!
//! Repositories are read-side: every state change to users, institutions,
//! resources and assignments goes through the audited mutation executor in
//! `comply-db`. The one exception is invite delivery bookkeeping, which is
//! driven by mail transport events rather than a principal and is not
//! field-audited.
//!
//! All reads exclude soft-deleted rows.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::access::{ResourceFacts, ScopeFilter};
use crate::engagement::FunnelStep;
use crate::error::ComplyResult;
use crate::models::{
    assignment::{Assignment, AssignmentRole, AssignmentStatus},
    audit::{AuditLogEntry, EntityType},
    institution::Institution,
    invite::{EngagementTransition, Invite, InviteEvent, InviteEventType},
    resource::{ComplianceResource, ResourceType},
    role::Role,
    user::User,
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Principals & tenants
// ---------------------------------------------------------------------------

pub trait UserRepository: Send + Sync {
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = ComplyResult<User>> + Send;
    /// Lookup by normalized e-mail.
    fn get_by_email(&self, email: &str) -> impl Future<Output = ComplyResult<User>> + Send;
    fn email_exists(&self, email: &str) -> impl Future<Output = ComplyResult<bool>> + Send;
    fn count_with_role(&self, role: Role) -> impl Future<Output = ComplyResult<u64>> + Send;
    /// Users of one institution, or every user when `institution_id` is `None`.
    fn list(
        &self,
        institution_id: Option<Uuid>,
        pagination: Pagination,
    ) -> impl Future<Output = ComplyResult<PaginatedResult<User>>> + Send;
}

pub trait InstitutionRepository: Send + Sync {
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = ComplyResult<Institution>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = ComplyResult<PaginatedResult<Institution>>> + Send;
}

// ---------------------------------------------------------------------------
// Compliance resources & assignments
// ---------------------------------------------------------------------------

pub trait ResourceRepository: Send + Sync {
    fn get_by_id(
        &self,
        resource_type: ResourceType,
        id: Uuid,
    ) -> impl Future<Output = ComplyResult<ComplianceResource>> + Send;

    /// Everything the visibility decision needs about one resource, from
    /// the point of view of `user_id`. `None` when the resource is missing
    /// or soft-deleted.
    fn read_facts(
        &self,
        resource_type: ResourceType,
        id: Uuid,
        user_id: Uuid,
    ) -> impl Future<Output = ComplyResult<Option<ResourceFacts>>> + Send;

    /// Resources admitted by `filter`, newest first.
    fn list_visible(
        &self,
        filter: &ScopeFilter,
        resource_type: Option<ResourceType>,
        pagination: Pagination,
    ) -> impl Future<Output = ComplyResult<PaginatedResult<ComplianceResource>>> + Send;
}

pub trait AssignmentRepository: Send + Sync {
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = ComplyResult<Assignment>> + Send;

    /// The single row for a uniqueness tuple, whatever its status.
    fn find(
        &self,
        resource_type: ResourceType,
        resource_id: Uuid,
        assigned_to: Uuid,
        assignment_role: AssignmentRole,
    ) -> impl Future<Output = ComplyResult<Option<Assignment>>> + Send;

    fn list_for_user(
        &self,
        assigned_to: Uuid,
        resource_type: Option<ResourceType>,
        status: AssignmentStatus,
    ) -> impl Future<Output = ComplyResult<Vec<Assignment>>> + Send;
}

// ---------------------------------------------------------------------------
// Audit log (append-only)
// ---------------------------------------------------------------------------

/// Filter for audit trail queries.
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<Uuid>,
    pub changed_by: Option<Uuid>,
    pub mutation_id: Option<Uuid>,
}

pub trait AuditLogRepository: Send + Sync {
    /// Entries matching `filter`, oldest first.
    fn list(
        &self,
        filter: AuditLogFilter,
        pagination: Pagination,
    ) -> impl Future<Output = ComplyResult<PaginatedResult<AuditLogEntry>>> + Send;
}

// ---------------------------------------------------------------------------
// Invites
// ---------------------------------------------------------------------------

pub trait InviteRepository: Send + Sync {
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = ComplyResult<Invite>> + Send;
    fn get_by_token_hash(
        &self,
        token_hash: &str,
    ) -> impl Future<Output = ComplyResult<Invite>> + Send;

    /// A non-terminal invite for this e-mail, if any.
    fn find_open_by_email(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> impl Future<Output = ComplyResult<Option<Invite>>> + Send;

    fn has_event(
        &self,
        invite_id: Uuid,
        event_type: InviteEventType,
        occurred_at: DateTime<Utc>,
    ) -> impl Future<Output = ComplyResult<bool>> + Send;

    /// Persist the machine state of `invite`, append `funnel` to its
    /// history and, when given, record `event` as processed. All in one
    /// transaction; a duplicate `event` aborts it and returns `false`.
    fn record_transition(
        &self,
        invite: &Invite,
        event: Option<&InviteEvent>,
        funnel: &[FunnelStep],
    ) -> impl Future<Output = ComplyResult<bool>> + Send;

    /// Funnel history, oldest first.
    fn history(
        &self,
        invite_id: Uuid,
    ) -> impl Future<Output = ComplyResult<Vec<EngagementTransition>>> + Send;
}
