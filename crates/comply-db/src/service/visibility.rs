//! Read visibility for compliance resources.

use comply_core::access::{ReadDecision, decide_read, scope_filter_for};
use comply_core::context::AccessContext;
use comply_core::error::{ComplyError, ComplyResult};
use comply_core::models::resource::{ComplianceResource, ResourceType};
use comply_core::repository::{PaginatedResult, Pagination, ResourceRepository};
use surrealdb::{Connection, Surreal};
use tracing::debug;
use uuid::Uuid;

use crate::repository::SurrealResourceRepository;

#[derive(Clone)]
pub struct VisibilityService<C: Connection> {
    resources: SurrealResourceRepository<C>,
}

impl<C: Connection> VisibilityService<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self {
            resources: SurrealResourceRepository::new(db),
        }
    }

    /// Whether `ctx` may read the resource. Missing and soft-deleted
    /// resources are not readable.
    pub async fn can_read(
        &self,
        ctx: &AccessContext,
        resource_type: ResourceType,
        id: Uuid,
    ) -> ComplyResult<bool> {
        let Some(facts) = self
            .resources
            .read_facts(resource_type, id, ctx.user_id)
            .await?
        else {
            return Ok(false);
        };

        match decide_read(ctx, &facts) {
            ReadDecision::Granted(_) => Ok(true),
            ReadDecision::Denied(reason) => {
                debug!(
                    user_id = %ctx.user_id,
                    role = %ctx.role,
                    resource_type = %resource_type,
                    resource_id = %id,
                    reason = reason.describe(),
                    "Read denied"
                );
                Ok(false)
            }
        }
    }

    /// Like [`can_read`](Self::can_read) but fails with FORBIDDEN. A
    /// missing resource is reported the same way, so existence does not
    /// leak to callers who could not see it.
    pub async fn assert_can_read(
        &self,
        ctx: &AccessContext,
        resource_type: ResourceType,
        id: Uuid,
    ) -> ComplyResult<()> {
        if self.can_read(ctx, resource_type, id).await? {
            Ok(())
        } else {
            Err(ComplyError::forbidden(format!(
                "not permitted to access {resource_type} {id}"
            )))
        }
    }

    pub async fn list_visible(
        &self,
        ctx: &AccessContext,
        resource_type: Option<ResourceType>,
        pagination: Pagination,
    ) -> ComplyResult<PaginatedResult<ComplianceResource>> {
        let filter = scope_filter_for(ctx);
        self.resources
            .list_visible(&filter, resource_type, pagination)
            .await
    }
}
