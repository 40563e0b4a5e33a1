//! Compliance resource workflow: authoring, status transitions and
//! soft deletion, all through the audited executor.

use comply_core::context::AccessContext;
use comply_core::error::{ComplyError, ComplyResult};
use comply_core::models::audit::{ChangeType, EntityType};
use comply_core::models::resource::{
    ComplianceResource, CreateResource, ResourceStatus, ResourceType, UpdateResource,
};
use comply_core::rbac;
use comply_core::repository::{
    InstitutionRepository, PaginatedResult, Pagination, ResourceRepository,
};
use surrealdb::{Connection, Surreal};
use uuid::Uuid;

use super::{VisibilityService, required_text};
use crate::audited::{AuditedExecutor, MutationRequest, MutationTx};
use crate::repository::{SurrealInstitutionRepository, SurrealResourceRepository};

#[derive(Clone)]
pub struct ResourceService<C: Connection> {
    executor: AuditedExecutor<C>,
    resources: SurrealResourceRepository<C>,
    institutions: SurrealInstitutionRepository<C>,
    visibility: VisibilityService<C>,
}

impl<C: Connection> ResourceService<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self {
            executor: AuditedExecutor::new(db.clone()),
            resources: SurrealResourceRepository::new(db.clone()),
            institutions: SurrealInstitutionRepository::new(db.clone()),
            visibility: VisibilityService::new(db),
        }
    }

    pub async fn get(
        &self,
        ctx: &AccessContext,
        resource_type: ResourceType,
        id: Uuid,
    ) -> ComplyResult<ComplianceResource> {
        self.visibility
            .assert_can_read(ctx, resource_type, id)
            .await?;
        self.resources.get_by_id(resource_type, id).await
    }

    pub async fn list(
        &self,
        ctx: &AccessContext,
        resource_type: Option<ResourceType>,
        pagination: Pagination,
    ) -> ComplyResult<PaginatedResult<ComplianceResource>> {
        self.visibility
            .list_visible(ctx, resource_type, pagination)
            .await
    }

    /// Create a resource in `DRAFT`. Institution roles may only create for
    /// their own institution.
    pub async fn create(
        &self,
        ctx: &AccessContext,
        input: CreateResource,
    ) -> ComplyResult<ComplianceResource> {
        let resource_type = input.resource_type;
        let institution_id = input.institution_id;
        let title = required_text("title", &input.title)?;
        let data = input
            .data
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
        if !data.is_object() {
            return Err(ComplyError::validation("data must be a JSON object"));
        }

        let id = Uuid::new_v4();
        let entity_type = EntityType::from(resource_type);
        let request = MutationRequest::new(entity_type, ChangeType::Create)
            .entity(id)
            .institution(Some(institution_id));

        self.executor
            .mutate(
                ctx,
                request,
                async |ctx: &AccessContext| {
                    rbac::require(ctx.role, resource_type.create_capability())?;
                    if ctx.role.is_institution_scoped() && !ctx.is_member_of(institution_id) {
                        return Err(ComplyError::forbidden(
                            "cannot create resources for another institution",
                        ));
                    }
                    Ok(())
                },
                async |tx: &mut MutationTx<C>| {
                    self.institutions.get_by_id(institution_id).await?;
                    tx.create(entity_type, id)
                        .field("resource_type", resource_type.as_str())
                        .field("institution_id", institution_id)
                        .field("title", title)
                        .field("status", ResourceStatus::Draft.as_str())
                        .field("data", data)
                        .field("created_by", ctx.user_id)
                        .stage();
                    Ok(())
                },
            )
            .await?;

        self.resources.get_by_id(resource_type, id).await
    }

    /// Edit title and payload. Only `DRAFT` and `RETURNED` resources are
    /// editable.
    pub async fn update(
        &self,
        ctx: &AccessContext,
        resource_type: ResourceType,
        id: Uuid,
        input: UpdateResource,
        reason: Option<String>,
    ) -> ComplyResult<ComplianceResource> {
        let title = input
            .title
            .as_deref()
            .map(|t| required_text("title", t))
            .transpose()?;
        if input.data.as_ref().is_some_and(|d| !d.is_object()) {
            return Err(ComplyError::validation("data must be a JSON object"));
        }

        let entity_type = EntityType::from(resource_type);
        let current = self.load_for_write(resource_type, id).await?;
        let request = MutationRequest::new(entity_type, ChangeType::Update)
            .entity(id)
            .institution(Some(current.institution_id))
            .reason(reason);

        self.executor
            .mutate(
                ctx,
                request,
                async |ctx: &AccessContext| self.assert_can_write(ctx, resource_type, id).await,
                async |tx: &mut MutationTx<C>| {
                    let current = self.resources.get_by_id(resource_type, id).await?;
                    if !current.status.is_editable() {
                        return Err(ComplyError::validation(format!(
                            "resource in status {} cannot be edited",
                            current.status
                        )));
                    }
                    let mut update = tx.update(entity_type, id);
                    if let Some(title) = title {
                        update = update.set("title", current.title, title);
                    }
                    if let Some(data) = input.data {
                        update = update.set("data", current.data, data);
                    }
                    update.stage();
                    Ok(())
                },
            )
            .await?;

        self.resources.get_by_id(resource_type, id).await
    }

    /// Move a resource along its workflow. The capability depends on the
    /// edge: institution-side submits need RESOURCE_SUBMIT, regulator
    /// decisions need QCTO_REVIEW.
    pub async fn transition(
        &self,
        ctx: &AccessContext,
        resource_type: ResourceType,
        id: Uuid,
        to: ResourceStatus,
        reason: Option<String>,
    ) -> ComplyResult<ComplianceResource> {
        let entity_type = EntityType::from(resource_type);
        let current = self.load_for_write(resource_type, id).await?;
        let request = MutationRequest::new(entity_type, ChangeType::StatusChange)
            .entity(id)
            .institution(Some(current.institution_id))
            .reason(reason);

        self.executor
            .mutate(
                ctx,
                request,
                async |ctx: &AccessContext| {
                    self.visibility
                        .assert_can_read(ctx, resource_type, id)
                        .await?;
                    match current.status.transition_capability(to) {
                        Some(capability) => rbac::require(ctx.role, capability),
                        None => Err(invalid_transition(current.status, to)),
                    }
                },
                async |tx: &mut MutationTx<C>| {
                    let current = self.resources.get_by_id(resource_type, id).await?;
                    if current.status.transition_capability(to).is_none() {
                        return Err(invalid_transition(current.status, to));
                    }
                    tx.update(entity_type, id)
                        .set("status", current.status.as_str(), to.as_str())
                        .stage();
                    Ok(())
                },
            )
            .await?;

        self.resources.get_by_id(resource_type, id).await
    }

    /// Soft-delete a resource that is still in `DRAFT`.
    pub async fn delete(
        &self,
        ctx: &AccessContext,
        resource_type: ResourceType,
        id: Uuid,
        reason: Option<String>,
    ) -> ComplyResult<()> {
        let entity_type = EntityType::from(resource_type);
        let current = self.load_for_write(resource_type, id).await?;
        let request = MutationRequest::new(entity_type, ChangeType::Delete)
            .entity(id)
            .institution(Some(current.institution_id))
            .reason(reason);

        self.executor
            .mutate(
                ctx,
                request,
                async |ctx: &AccessContext| self.assert_can_write(ctx, resource_type, id).await,
                async |tx: &mut MutationTx<C>| {
                    let current = self.resources.get_by_id(resource_type, id).await?;
                    if current.status != ResourceStatus::Draft {
                        return Err(ComplyError::validation(
                            "only draft resources can be deleted",
                        ));
                    }
                    tx.soft_delete(entity_type, id);
                    Ok(())
                },
            )
            .await
    }

    /// Authoring capability for the type plus the read decision.
    async fn assert_can_write(
        &self,
        ctx: &AccessContext,
        resource_type: ResourceType,
        id: Uuid,
    ) -> ComplyResult<()> {
        rbac::require(ctx.role, resource_type.create_capability())?;
        self.visibility
            .assert_can_read(ctx, resource_type, id)
            .await
    }

    /// Load the current row for building the mutation request. A missing
    /// resource is reported as FORBIDDEN, the same as an invisible one.
    async fn load_for_write(
        &self,
        resource_type: ResourceType,
        id: Uuid,
    ) -> ComplyResult<ComplianceResource> {
        match self.resources.get_by_id(resource_type, id).await {
            Err(ComplyError::NotFound { .. }) => Err(ComplyError::forbidden(format!(
                "not permitted to access {resource_type} {id}"
            ))),
            other => other,
        }
    }
}

fn invalid_transition(from: ResourceStatus, to: ResourceStatus) -> ComplyError {
    ComplyError::validation(format!("cannot move resource from {from} to {to}"))
}
