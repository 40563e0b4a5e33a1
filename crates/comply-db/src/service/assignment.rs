//! Reviewer/auditor assignments.

use comply_core::context::AccessContext;
use comply_core::error::{ComplyError, ComplyResult};
use comply_core::models::assignment::{
    AssigneeSelector, Assignment, AssignmentQuery, AssignmentStatus, AssignmentSummary,
    CreateAssignment,
};
use comply_core::models::audit::{ChangeType, EntityType};
use comply_core::models::user::UserStatus;
use comply_core::rbac::{self, Capability};
use comply_core::repository::{AssignmentRepository, ResourceRepository, UserRepository};
use surrealdb::{Connection, Surreal};
use tracing::debug;
use uuid::Uuid;

use crate::audited::{AuditedExecutor, MutationRequest, MutationTx};
use crate::repository::{
    SurrealAssignmentRepository, SurrealResourceRepository, SurrealUserRepository,
};

#[derive(Clone)]
pub struct AssignmentService<C: Connection> {
    executor: AuditedExecutor<C>,
    assignments: SurrealAssignmentRepository<C>,
    resources: SurrealResourceRepository<C>,
    users: SurrealUserRepository<C>,
}

impl<C: Connection> AssignmentService<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self {
            executor: AuditedExecutor::new(db.clone()),
            assignments: SurrealAssignmentRepository::new(db.clone()),
            resources: SurrealResourceRepository::new(db.clone()),
            users: SurrealUserRepository::new(db),
        }
    }

    /// Assign a regulator user to a resource.
    ///
    /// Assigning an already active tuple is a no-op; a removed or completed
    /// tuple is reactivated rather than duplicated.
    pub async fn assign(
        &self,
        ctx: &AccessContext,
        input: CreateAssignment,
    ) -> ComplyResult<Assignment> {
        rbac::require(ctx.role, Capability::QctoAssign)?;
        let resource = self
            .resources
            .get_by_id(input.resource_type, input.resource_id)
            .await?;
        let existing = self
            .assignments
            .find(
                input.resource_type,
                input.resource_id,
                input.assigned_to,
                input.assignment_role,
            )
            .await?;

        let id = existing.as_ref().map(|a| a.id).unwrap_or_else(Uuid::new_v4);
        let change_type = if existing.is_some() {
            ChangeType::StatusChange
        } else {
            ChangeType::Create
        };
        let request = MutationRequest::new(EntityType::Assignment, change_type)
            .entity(id)
            .institution(Some(resource.institution_id));

        self.executor
            .mutate(
                ctx,
                request,
                async |ctx: &AccessContext| rbac::require(ctx.role, Capability::QctoAssign),
                async |tx: &mut MutationTx<C>| {
                    let assignee = self.users.get_by_id(input.assigned_to).await?;
                    if !assignee.role.requires_assignment() {
                        return Err(ComplyError::validation(format!(
                            "role {} cannot hold assignments",
                            assignee.role
                        )));
                    }
                    if assignee.status != UserStatus::Active {
                        return Err(ComplyError::validation("assignee is not active"));
                    }

                    match existing {
                        Some(current) if current.status == AssignmentStatus::Active => {
                            debug!(assignment_id = %current.id, "Assignment already active");
                        }
                        Some(current) => {
                            tx.update(EntityType::Assignment, current.id)
                                .set(
                                    "status",
                                    current.status.as_str(),
                                    AssignmentStatus::Active.as_str(),
                                )
                                .set("assigned_by", current.assigned_by, ctx.user_id)
                                .stage();
                        }
                        None => {
                            tx.create(EntityType::Assignment, id)
                                .field("resource_type", input.resource_type.as_str())
                                .field("resource_id", input.resource_id)
                                .field("assigned_to", input.assigned_to)
                                .field("assigned_by", ctx.user_id)
                                .field("assignment_role", input.assignment_role.as_str())
                                .field("status", AssignmentStatus::Active.as_str())
                                .stage();
                        }
                    }
                    Ok(())
                },
            )
            .await?;

        self.assignments.get_by_id(id).await
    }

    /// Withdraw an active assignment.
    pub async fn remove(
        &self,
        ctx: &AccessContext,
        id: Uuid,
        reason: Option<String>,
    ) -> ComplyResult<Assignment> {
        self.set_status(ctx, id, AssignmentStatus::Removed, reason)
            .await
    }

    /// Mark an assignment done. Allowed for the assignee and for
    /// QCTO_ASSIGN holders.
    pub async fn complete(
        &self,
        ctx: &AccessContext,
        id: Uuid,
        reason: Option<String>,
    ) -> ComplyResult<Assignment> {
        self.set_status(ctx, id, AssignmentStatus::Completed, reason)
            .await
    }

    async fn set_status(
        &self,
        ctx: &AccessContext,
        id: Uuid,
        to: AssignmentStatus,
        reason: Option<String>,
    ) -> ComplyResult<Assignment> {
        // Without QCTO_ASSIGN only the assignee may complete, and a missing
        // assignment reads the same as someone else's.
        let may_assign = rbac::has_capability(ctx.role, Capability::QctoAssign);
        if !may_assign && to != AssignmentStatus::Completed {
            rbac::require(ctx.role, Capability::QctoAssign)?;
        }
        let current = match self.assignments.get_by_id(id).await {
            Err(ComplyError::NotFound { .. }) if !may_assign => {
                return Err(ComplyError::forbidden("not the assignee"));
            }
            other => other?,
        };
        if !may_assign && current.assigned_to != ctx.user_id {
            return Err(ComplyError::forbidden("not the assignee"));
        }
        let resource = self
            .resources
            .get_by_id(current.resource_type, current.resource_id)
            .await?;
        let request = MutationRequest::new(EntityType::Assignment, ChangeType::StatusChange)
            .entity(id)
            .institution(Some(resource.institution_id))
            .reason(reason);

        self.executor
            .mutate(
                ctx,
                request,
                async |ctx: &AccessContext| {
                    let is_assignee = ctx.user_id == current.assigned_to;
                    if to == AssignmentStatus::Completed && is_assignee {
                        return Ok(());
                    }
                    rbac::require(ctx.role, Capability::QctoAssign)
                },
                async |tx: &mut MutationTx<C>| {
                    let current = self.assignments.get_by_id(id).await?;
                    match (current.status, to) {
                        (AssignmentStatus::Active, _) => {}
                        (from, to) if from == to => return Ok(()),
                        (from, to) => {
                            return Err(ComplyError::validation(format!(
                                "cannot move assignment from {} to {}",
                                from.as_str(),
                                to.as_str()
                            )));
                        }
                    }
                    tx.update(EntityType::Assignment, id)
                        .set("status", current.status.as_str(), to.as_str())
                        .stage();
                    Ok(())
                },
            )
            .await?;

        self.assignments.get_by_id(id).await
    }

    /// Assignments of the caller or, with QCTO_ASSIGN, of another user.
    pub async fn query(
        &self,
        ctx: &AccessContext,
        query: AssignmentQuery,
    ) -> ComplyResult<Vec<AssignmentSummary>> {
        let assigned_to = match query.user {
            AssigneeSelector::Me => ctx.user_id,
            AssigneeSelector::User(id) if id == ctx.user_id => id,
            AssigneeSelector::User(id) => {
                rbac::require(ctx.role, Capability::QctoAssign)?;
                id
            }
        };

        let rows = self
            .assignments
            .list_for_user(assigned_to, query.resource_type, query.effective_status())
            .await?;
        Ok(rows.into_iter().map(AssignmentSummary::from).collect())
    }
}
