//! User administration and self-service profile edits.

use comply_core::context::{AccessContext, AuthMode};
use comply_core::error::{ComplyError, ComplyResult};
use comply_core::models::audit::{ChangeType, EntityType};
use comply_core::models::role::Role;
use comply_core::models::user::{
    CreateUser, UpdateProfile, User, UserStatus, normalize_email, validate_email,
    validate_role_binding,
};
use comply_core::rbac::{self, Capability};
use comply_core::repository::{PaginatedResult, Pagination, UserRepository};
use surrealdb::{Connection, Surreal};
use tracing::info;
use uuid::Uuid;

use super::required_text;
use crate::audited::{AuditedExecutor, MutationRequest, MutationTx};
use crate::password::{hash_password, validate_password};
use crate::repository::SurrealUserRepository;

#[derive(Clone)]
pub struct UserService<C: Connection> {
    executor: AuditedExecutor<C>,
    users: SurrealUserRepository<C>,
    pepper: Option<String>,
}

impl<C: Connection> UserService<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self::with_pepper(db, None)
    }

    pub fn with_pepper(db: Surreal<C>, pepper: Option<String>) -> Self {
        Self {
            executor: AuditedExecutor::new(db.clone()),
            users: SurrealUserRepository::new(db),
            pepper,
        }
    }

    pub async fn get(&self, ctx: &AccessContext, id: Uuid) -> ComplyResult<User> {
        if id == ctx.user_id {
            return self.users.get_by_id(id).await;
        }
        rbac::require(ctx.role, Capability::UserManage)?;
        let user = self.users.get_by_id(id).await?;
        ensure_can_manage(ctx, user.role, user.institution_id)?;
        Ok(user)
    }

    /// Users the caller may manage: their own institution for institution
    /// admins, everyone otherwise.
    pub async fn list(
        &self,
        ctx: &AccessContext,
        pagination: Pagination,
    ) -> ComplyResult<PaginatedResult<User>> {
        rbac::require(ctx.role, Capability::UserManage)?;
        let institution_id = if ctx.role.is_institution_scoped() {
            ctx.institution_id
        } else {
            None
        };
        self.users.list(institution_id, pagination).await
    }

    pub async fn create_user(&self, ctx: &AccessContext, input: CreateUser) -> ComplyResult<User> {
        ensure_can_manage(ctx, input.role, input.institution_id)?;
        let new_user = NewUser::prepare(input, self.pepper.as_deref())?;
        if self.users.email_exists(&new_user.email).await? {
            return Err(ComplyError::AlreadyExists {
                entity: format!("user with email {}", new_user.email),
            });
        }

        let id = Uuid::new_v4();
        let (role, institution_id) = (new_user.role, new_user.institution_id);
        let request = MutationRequest::new(EntityType::User, ChangeType::Create)
            .entity(id)
            .institution(institution_id);

        self.executor
            .mutate(
                ctx,
                request,
                async |ctx: &AccessContext| ensure_can_manage(ctx, role, institution_id),
                async |tx: &mut MutationTx<C>| {
                    new_user.stage(tx, id);
                    Ok(())
                },
            )
            .await?;

        self.users.get_by_id(id).await
    }

    /// Create the first platform administrator. Fails once any platform
    /// administrator exists. The new user is recorded as its own actor.
    pub async fn bootstrap_platform_admin(
        &self,
        email: &str,
        display_name: &str,
        password: &str,
    ) -> ComplyResult<User> {
        let new_user = NewUser::prepare(
            CreateUser {
                email: email.to_string(),
                display_name: display_name.to_string(),
                role: Role::PlatformAdmin,
                institution_id: None,
                assigned_regions: Vec::new(),
                password: password.to_string(),
            },
            self.pepper.as_deref(),
        )?;

        let id = Uuid::new_v4();
        let ctx = AccessContext {
            user_id: id,
            role: Role::PlatformAdmin,
            institution_id: None,
            assigned_regions: Vec::new(),
            auth_mode: AuthMode::Bootstrap,
        };
        let request = MutationRequest::new(EntityType::User, ChangeType::Create)
            .entity(id)
            .reason(Some("bootstrap".to_string()));

        self.executor
            .mutate(
                &ctx,
                request,
                async |_: &AccessContext| {
                    if self.users.count_with_role(Role::PlatformAdmin).await? > 0 {
                        return Err(ComplyError::AlreadyExists {
                            entity: "platform administrator".into(),
                        });
                    }
                    Ok(())
                },
                async |tx: &mut MutationTx<C>| {
                    if self.users.email_exists(&new_user.email).await? {
                        return Err(ComplyError::AlreadyExists {
                            entity: format!("user with email {}", new_user.email),
                        });
                    }
                    new_user.stage(tx, id);
                    Ok(())
                },
            )
            .await?;

        info!(user_id = %id, "Platform administrator bootstrapped");
        self.users.get_by_id(id).await
    }

    pub async fn change_role(
        &self,
        ctx: &AccessContext,
        id: Uuid,
        role: Role,
        reason: Option<String>,
    ) -> ComplyResult<User> {
        ensure_may_administer(ctx, id, "cannot change your own role")?;
        let current = self.users.get_by_id(id).await?;
        validate_role_binding(role, current.institution_id)?;
        let request = MutationRequest::new(EntityType::User, ChangeType::Update)
            .entity(id)
            .institution(current.institution_id)
            .reason(reason);

        self.executor
            .mutate(
                ctx,
                request,
                async |ctx: &AccessContext| {
                    if ctx.user_id == id {
                        return Err(ComplyError::forbidden("cannot change your own role"));
                    }
                    ensure_can_manage(ctx, current.role, current.institution_id)?;
                    ensure_can_manage(ctx, role, current.institution_id)
                },
                async |tx: &mut MutationTx<C>| {
                    tx.update(EntityType::User, id)
                        .set("role", current.role, role)
                        .stage();
                    Ok(())
                },
            )
            .await?;

        self.users.get_by_id(id).await
    }

    pub async fn change_status(
        &self,
        ctx: &AccessContext,
        id: Uuid,
        status: UserStatus,
        reason: Option<String>,
    ) -> ComplyResult<User> {
        ensure_may_administer(ctx, id, "cannot change your own status")?;
        let current = self.users.get_by_id(id).await?;
        let request = MutationRequest::new(EntityType::User, ChangeType::StatusChange)
            .entity(id)
            .institution(current.institution_id)
            .reason(reason);

        self.executor
            .mutate(
                ctx,
                request,
                async |ctx: &AccessContext| {
                    if ctx.user_id == id {
                        return Err(ComplyError::forbidden("cannot change your own status"));
                    }
                    ensure_can_manage(ctx, current.role, current.institution_id)
                },
                async |tx: &mut MutationTx<C>| {
                    tx.update(EntityType::User, id)
                        .set("status", current.status.as_str(), status.as_str())
                        .stage();
                    Ok(())
                },
            )
            .await?;

        self.users.get_by_id(id).await
    }

    /// Replace the provinces a regulator user may see. Names are trimmed,
    /// de-duplicated and sorted.
    pub async fn set_regions(
        &self,
        ctx: &AccessContext,
        id: Uuid,
        regions: Vec<String>,
        reason: Option<String>,
    ) -> ComplyResult<User> {
        rbac::require(ctx.role, Capability::QctoAssign)?;
        let regions = normalize_regions(regions);
        let current = self.users.get_by_id(id).await?;
        if !current.role.is_regulator() {
            return Err(ComplyError::validation(format!(
                "role {} has no assigned regions",
                current.role
            )));
        }
        let request = MutationRequest::new(EntityType::User, ChangeType::Update)
            .entity(id)
            .reason(reason);

        self.executor
            .mutate(
                ctx,
                request,
                async |ctx: &AccessContext| rbac::require(ctx.role, Capability::QctoAssign),
                async |tx: &mut MutationTx<C>| {
                    tx.update(EntityType::User, id)
                        .set("assigned_regions", current.assigned_regions, regions)
                        .stage();
                    Ok(())
                },
            )
            .await?;

        self.users.get_by_id(id).await
    }

    /// Edit the caller's own profile.
    pub async fn update_profile(
        &self,
        ctx: &AccessContext,
        input: UpdateProfile,
    ) -> ComplyResult<User> {
        let display_name = input
            .display_name
            .as_deref()
            .map(|n| required_text("display_name", n))
            .transpose()?;
        let id = ctx.user_id;
        let request = MutationRequest::new(EntityType::User, ChangeType::Update)
            .entity(id)
            .institution(ctx.institution_id);

        self.executor
            .mutate(
                ctx,
                request,
                async |ctx: &AccessContext| rbac::require(ctx.role, Capability::ProfileEdit),
                async |tx: &mut MutationTx<C>| {
                    let current = self.users.get_by_id(id).await?;
                    if let Some(name) = display_name {
                        tx.update(EntityType::User, id)
                            .set("display_name", current.display_name, name)
                            .stage();
                    }
                    Ok(())
                },
            )
            .await?;

        self.users.get_by_id(id).await
    }

    pub async fn delete_user(
        &self,
        ctx: &AccessContext,
        id: Uuid,
        reason: Option<String>,
    ) -> ComplyResult<()> {
        ensure_may_administer(ctx, id, "cannot delete your own account")?;
        let current = self.users.get_by_id(id).await?;
        let request = MutationRequest::new(EntityType::User, ChangeType::Delete)
            .entity(id)
            .institution(current.institution_id)
            .reason(reason);

        self.executor
            .mutate(
                ctx,
                request,
                async |ctx: &AccessContext| {
                    if ctx.user_id == id {
                        return Err(ComplyError::forbidden("cannot delete your own account"));
                    }
                    ensure_can_manage(ctx, current.role, current.institution_id)
                },
                async |tx: &mut MutationTx<C>| {
                    tx.soft_delete(EntityType::User, id);
                    Ok(())
                },
            )
            .await
    }
}

/// Validated input for a new user row.
struct NewUser {
    email: String,
    display_name: String,
    role: Role,
    institution_id: Option<Uuid>,
    assigned_regions: Vec<String>,
    password_hash: String,
}

impl NewUser {
    fn prepare(input: CreateUser, pepper: Option<&str>) -> ComplyResult<Self> {
        let email = normalize_email(&input.email);
        validate_email(&email)?;
        validate_role_binding(input.role, input.institution_id)?;
        validate_password(&input.password)?;
        Ok(Self {
            email,
            display_name: required_text("display_name", &input.display_name)?,
            role: input.role,
            institution_id: input.institution_id,
            assigned_regions: normalize_regions(input.assigned_regions),
            password_hash: hash_password(&input.password, pepper)?,
        })
    }

    fn stage<C: Connection>(self, tx: &mut MutationTx<C>, id: Uuid) {
        tx.create(EntityType::User, id)
            .field("email", self.email)
            .field("display_name", self.display_name)
            .field("role", self.role)
            .field("institution_id", self.institution_id)
            .field("status", UserStatus::Active.as_str())
            .field("assigned_regions", self.assigned_regions)
            .secret_field("password_hash", self.password_hash)
            .stage();
    }
}

/// Scope rule for user administration: USER_MANAGE, only platform admins
/// touch platform admins, and institution admins stay inside their own
/// institution's roles.
pub(crate) fn ensure_can_manage(
    ctx: &AccessContext,
    role: Role,
    institution_id: Option<Uuid>,
) -> ComplyResult<()> {
    rbac::require(ctx.role, Capability::UserManage)?;
    if role == Role::PlatformAdmin && ctx.role != Role::PlatformAdmin {
        return Err(ComplyError::forbidden(
            "only platform administrators manage platform administrators",
        ));
    }
    if ctx.role.is_institution_scoped() {
        let own_institution = institution_id.is_some_and(|id| ctx.is_member_of(id));
        if !role.requires_institution() || !own_institution {
            return Err(ComplyError::forbidden(
                "institution administrators manage their own institution's users only",
            ));
        }
    }
    Ok(())
}

/// Checks that need no lookup of the target account. Must run before the
/// target is read.
fn ensure_may_administer(
    ctx: &AccessContext,
    target: Uuid,
    self_denial: &str,
) -> ComplyResult<()> {
    rbac::require(ctx.role, Capability::UserManage)?;
    if ctx.user_id == target {
        return Err(ComplyError::forbidden(self_denial));
    }
    Ok(())
}

pub(crate) fn normalize_regions(regions: Vec<String>) -> Vec<String> {
    let mut regions: Vec<String> = regions
        .into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();
    regions.sort();
    regions.dedup();
    regions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(role: Role, institution_id: Option<Uuid>) -> AccessContext {
        AccessContext {
            user_id: Uuid::new_v4(),
            role,
            institution_id,
            assigned_regions: Vec::new(),
            auth_mode: AuthMode::Session,
        }
    }

    #[test]
    fn institution_admin_stays_in_own_institution() {
        let own = Uuid::new_v4();
        let admin = ctx(Role::InstitutionAdmin, Some(own));
        assert!(ensure_can_manage(&admin, Role::InstitutionStaff, Some(own)).is_ok());
        assert!(ensure_can_manage(&admin, Role::Student, Some(own)).is_ok());
        assert!(ensure_can_manage(&admin, Role::InstitutionStaff, Some(Uuid::new_v4())).is_err());
        assert!(ensure_can_manage(&admin, Role::QctoReviewer, None).is_err());
    }

    #[test]
    fn platform_admins_are_reserved() {
        let qcto = ctx(Role::QctoSuperAdmin, None);
        assert!(ensure_can_manage(&qcto, Role::PlatformAdmin, None).is_err());
        assert!(ensure_can_manage(&qcto, Role::QctoReviewer, None).is_ok());
        let platform = ctx(Role::PlatformAdmin, None);
        assert!(ensure_can_manage(&platform, Role::PlatformAdmin, None).is_ok());
    }

    #[test]
    fn staff_cannot_manage_users() {
        let own = Uuid::new_v4();
        let staff = ctx(Role::InstitutionStaff, Some(own));
        assert!(ensure_can_manage(&staff, Role::Student, Some(own)).is_err());
    }

    #[test]
    fn regions_are_normalized() {
        let regions = normalize_regions(vec![
            " Limpopo".into(),
            "Gauteng".into(),
            "Limpopo ".into(),
            "  ".into(),
        ]);
        assert_eq!(regions, vec!["Gauteng".to_string(), "Limpopo".to_string()]);
    }
}
