//! Audit trail queries.

use comply_core::context::AccessContext;
use comply_core::error::{ComplyError, ComplyResult};
use comply_core::models::audit::{AuditLogEntry, EntityType};
use comply_core::models::resource::ResourceType;
use comply_core::rbac::{self, Capability};
use comply_core::repository::{AuditLogFilter, AuditLogRepository, PaginatedResult, Pagination};
use surrealdb::{Connection, Surreal};

use super::VisibilityService;
use crate::repository::SurrealAuditLogRepository;

#[derive(Clone)]
pub struct AuditTrailService<C: Connection> {
    audit: SurrealAuditLogRepository<C>,
    visibility: VisibilityService<C>,
}

impl<C: Connection> AuditTrailService<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self {
            audit: SurrealAuditLogRepository::new(db.clone()),
            visibility: VisibilityService::new(db),
        }
    }

    /// Audit entries matching `filter`, oldest first.
    ///
    /// Administrative roles may query freely. Everyone else holding
    /// AUDIT_LOG_VIEW must name one compliance resource they can read.
    pub async fn list(
        &self,
        ctx: &AccessContext,
        filter: AuditLogFilter,
        pagination: Pagination,
    ) -> ComplyResult<PaginatedResult<AuditLogEntry>> {
        rbac::require(ctx.role, Capability::AuditLogView)?;

        if !ctx.role.is_admin_bypass() {
            let target = filter
                .entity_type
                .and_then(resource_type_of)
                .zip(filter.entity_id);
            let Some((resource_type, id)) = target else {
                return Err(ComplyError::forbidden(
                    "audit queries must name a compliance resource",
                ));
            };
            self.visibility
                .assert_can_read(ctx, resource_type, id)
                .await?;
        }

        self.audit.list(filter, pagination).await
    }
}

fn resource_type_of(entity_type: EntityType) -> Option<ResourceType> {
    ResourceType::ALL
        .into_iter()
        .find(|rt| EntityType::from(*rt) == entity_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_resource_entities_map_to_resource_types() {
        assert_eq!(
            resource_type_of(EntityType::Submission),
            Some(ResourceType::Submission)
        );
        assert_eq!(resource_type_of(EntityType::User), None);
        assert_eq!(resource_type_of(EntityType::Invite), None);
    }
}
