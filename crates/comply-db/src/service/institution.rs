//! Institution registration and lookup.

use comply_core::context::AccessContext;
use comply_core::error::{ComplyError, ComplyResult};
use comply_core::models::audit::{ChangeType, EntityType};
use comply_core::models::institution::{CreateInstitution, Institution};
use comply_core::rbac::{self, Capability};
use comply_core::repository::{InstitutionRepository, PaginatedResult, Pagination};
use surrealdb::{Connection, Surreal};
use uuid::Uuid;

use super::required_text;
use crate::audited::{AuditedExecutor, MutationRequest, MutationTx};
use crate::repository::SurrealInstitutionRepository;

#[derive(Clone)]
pub struct InstitutionService<C: Connection> {
    executor: AuditedExecutor<C>,
    institutions: SurrealInstitutionRepository<C>,
}

impl<C: Connection> InstitutionService<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self {
            executor: AuditedExecutor::new(db.clone()),
            institutions: SurrealInstitutionRepository::new(db),
        }
    }

    pub async fn create(
        &self,
        ctx: &AccessContext,
        input: CreateInstitution,
    ) -> ComplyResult<Institution> {
        let name = required_text("name", &input.name)?;
        let province = required_text("province", &input.province)?;

        let id = Uuid::new_v4();
        let request = MutationRequest::new(EntityType::Institution, ChangeType::Create)
            .entity(id)
            .institution(Some(id));

        self.executor
            .mutate(
                ctx,
                request,
                async |ctx: &AccessContext| rbac::require(ctx.role, Capability::InstitutionManage),
                async |tx: &mut MutationTx<C>| {
                    tx.create(EntityType::Institution, id)
                        .field("name", name)
                        .field("province", province)
                        .stage();
                    Ok(())
                },
            )
            .await?;

        self.institutions.get_by_id(id).await
    }

    /// Members of an institution only see their own.
    pub async fn get(&self, ctx: &AccessContext, id: Uuid) -> ComplyResult<Institution> {
        if ctx.role.requires_institution() && !ctx.is_member_of(id) {
            return Err(ComplyError::forbidden(format!(
                "not permitted to access institution {id}"
            )));
        }
        self.institutions.get_by_id(id).await
    }

    pub async fn list(
        &self,
        ctx: &AccessContext,
        pagination: Pagination,
    ) -> ComplyResult<PaginatedResult<Institution>> {
        if ctx.role.requires_institution() {
            let items = match ctx.institution_id {
                Some(id) => vec![self.institutions.get_by_id(id).await?],
                None => Vec::new(),
            };
            return Ok(PaginatedResult {
                total: items.len() as u64,
                items,
                offset: 0,
                limit: pagination.limit,
            });
        }
        self.institutions.list(pagination).await
    }
}
