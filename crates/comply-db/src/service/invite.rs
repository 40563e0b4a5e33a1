//! Invite issuing, delivery tracking and acceptance.
//!
//! Issuing and acceptance are audited mutations. Delivery events are
//! driven by the mail transport, not by a principal, and are persisted
//! through [`InviteRepository::record_transition`].

use std::collections::HashSet;

use chrono::Utc;
use comply_core::context::{AccessContext, AuthMode};
use comply_core::engagement::{self, InvitePolicy, InviteState, Outcome};
use comply_core::error::{ComplyError, ComplyResult};
use comply_core::models::audit::{ChangeType, EntityType};
use comply_core::models::invite::{
    AcceptInvite, EngagementTransition, Invite, InviteEvent, InviteEventType, InviteStatus,
    InviteTransitionResult, IssuedInvite, NewInvite,
};
use comply_core::models::role::Role;
use comply_core::models::user::{
    User, UserStatus, normalize_email, validate_email, validate_role_binding,
};
use comply_core::rbac::{self, Capability};
use comply_core::repository::{InstitutionRepository, InviteRepository, UserRepository};
use surrealdb::{Connection, Surreal};
use tracing::{debug, info};
use uuid::Uuid;

use super::required_text;
use crate::audited::{AuditedExecutor, MutationRequest, MutationTx};
use crate::password::{hash_password, validate_password};
use crate::repository::{
    SurrealInstitutionRepository, SurrealInviteRepository, SurrealUserRepository,
};
use crate::secret::{generate_token, hash_token};

#[derive(Clone)]
pub struct InviteService<C: Connection> {
    executor: AuditedExecutor<C>,
    invites: SurrealInviteRepository<C>,
    users: SurrealUserRepository<C>,
    institutions: SurrealInstitutionRepository<C>,
    policy: InvitePolicy,
    pepper: Option<String>,
}

/// An invite validated and ready to stage.
struct PendingInvite {
    id: Uuid,
    email: String,
    role: Role,
    institution_id: Option<Uuid>,
    raw_token: String,
    token_hash: String,
    state: InviteState,
}

impl<C: Connection> InviteService<C> {
    pub fn new(db: Surreal<C>, policy: InvitePolicy) -> Self {
        Self {
            executor: AuditedExecutor::new(db.clone()),
            invites: SurrealInviteRepository::new(db.clone()),
            users: SurrealUserRepository::new(db.clone()),
            institutions: SurrealInstitutionRepository::new(db),
            policy,
            pepper: None,
        }
    }

    /// Pepper used when hashing the password chosen at acceptance.
    pub fn with_pepper(mut self, pepper: Option<String>) -> Self {
        self.pepper = pepper;
        self
    }

    pub fn policy(&self) -> &InvitePolicy {
        &self.policy
    }

    /// Issue invites in batches of `policy.batch_size`, one audited
    /// mutation per batch. The raw secrets are returned once and never
    /// stored.
    ///
    /// The whole request is validated before the first batch commits; a
    /// database failure in a later batch leaves earlier batches issued.
    pub async fn create_bulk(
        &self,
        ctx: &AccessContext,
        requests: Vec<NewInvite>,
    ) -> ComplyResult<Vec<IssuedInvite>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        for request in &requests {
            authorize_invite(ctx, request.role, request.institution_id)?;
        }

        let now = Utc::now();
        let mut seen = HashSet::new();
        let mut pending = Vec::with_capacity(requests.len());
        for request in requests {
            let email = normalize_email(&request.email);
            validate_email(&email)?;
            validate_role_binding(request.role, request.institution_id)?;
            if !seen.insert(email.clone()) {
                return Err(ComplyError::AlreadyExists {
                    entity: format!("invite for {email} in this batch"),
                });
            }
            if self.users.email_exists(&email).await? {
                return Err(ComplyError::AlreadyExists {
                    entity: format!("user with email {email}"),
                });
            }
            if self.invites.find_open_by_email(&email, now).await?.is_some() {
                return Err(ComplyError::AlreadyExists {
                    entity: format!("open invite for {email}"),
                });
            }
            if let Some(institution_id) = request.institution_id {
                self.institutions.get_by_id(institution_id).await?;
            }

            let raw_token = generate_token();
            pending.push(PendingInvite {
                id: Uuid::new_v4(),
                email,
                role: request.role,
                institution_id: request.institution_id,
                token_hash: hash_token(&raw_token),
                raw_token,
                state: InviteState::queued(now, &self.policy),
            });
        }

        let mut issued = Vec::with_capacity(pending.len());
        for batch in pending.chunks(self.policy.batch_size.max(1)) {
            self.issue_batch(ctx, batch).await?;
            for item in batch {
                issued.push(IssuedInvite {
                    invite: self.invites.get_by_id(item.id).await?,
                    raw_token: item.raw_token.clone(),
                });
            }
        }

        info!(
            user_id = %ctx.user_id,
            count = issued.len(),
            "Invites issued"
        );
        Ok(issued)
    }

    async fn issue_batch(&self, ctx: &AccessContext, batch: &[PendingInvite]) -> ComplyResult<()> {
        let first_institution = batch.first().and_then(|p| p.institution_id);
        let shared_institution = batch
            .iter()
            .all(|p| p.institution_id == first_institution)
            .then_some(first_institution)
            .flatten();
        let request = MutationRequest::new(EntityType::Invite, ChangeType::Create)
            .institution(shared_institution);

        self.executor
            .mutate(
                ctx,
                request,
                async |ctx: &AccessContext| {
                    batch
                        .iter()
                        .try_for_each(|p| authorize_invite(ctx, p.role, p.institution_id))
                },
                async |tx: &mut MutationTx<C>| {
                    for item in batch {
                        tx.create(EntityType::Invite, item.id)
                            .field("email", item.email.as_str())
                            .field("role", item.role)
                            .field("institution_id", item.institution_id)
                            .field("invited_by", ctx.user_id)
                            .secret_field("token_hash", item.token_hash.as_str())
                            .field("status", item.state.status.as_str())
                            .field("attempts", item.state.attempts)
                            .field("max_attempts", item.state.max_attempts)
                            .field("expires_at", item.state.expires_at)
                            .field("engagement_state", item.state.engagement_state.as_str())
                            .field("engagement_score", item.state.engagement_score)
                            .stage();
                    }
                    Ok(())
                },
            )
            .await
    }

    /// Apply one delivery or engagement event. Replaying an event that was
    /// already processed returns the current state without writing.
    pub async fn apply_event(&self, event: InviteEvent) -> ComplyResult<InviteTransitionResult> {
        if event.event_type == InviteEventType::Accepted {
            return Err(ComplyError::validation(
                "invites are accepted through the acceptance flow",
            ));
        }

        let mut invite = self.invites.get_by_id(event.invite_id).await?;
        if self
            .invites
            .has_event(invite.id, event.event_type, event.timestamp)
            .await?
        {
            debug!(invite_id = %invite.id, event = %event.event_type, "Invite event replayed");
            return Ok(transition_result(&invite, true));
        }

        let transition = engagement::apply_event(
            &invite.state(),
            event.event_type,
            event.timestamp,
            Utc::now(),
            &self.policy,
        )?;
        invite.apply_state(&transition.state);

        let recorded = self
            .invites
            .record_transition(&invite, Some(&event), &transition.funnel)
            .await?;
        if !recorded {
            let current = self.invites.get_by_id(invite.id).await?;
            return Ok(transition_result(&current, true));
        }

        debug!(
            invite_id = %invite.id,
            event = %event.event_type,
            status = %invite.status,
            engagement_state = %invite.engagement_state,
            outcome = ?transition.outcome,
            "Invite event applied"
        );
        Ok(transition_result(&invite, false))
    }

    /// Load an invite, applying lazy expiry and dormancy.
    pub async fn get(&self, ctx: &AccessContext, id: Uuid) -> ComplyResult<Invite> {
        let invite = self.invites.get_by_id(id).await?;
        authorize_invite(ctx, invite.role, invite.institution_id)?;
        self.refreshed(invite).await
    }

    /// Engagement funnel history, oldest first.
    pub async fn history(
        &self,
        ctx: &AccessContext,
        id: Uuid,
    ) -> ComplyResult<Vec<EngagementTransition>> {
        let invite = self.get(ctx, id).await?;
        self.invites.history(invite.id).await
    }

    async fn refreshed(&self, mut invite: Invite) -> ComplyResult<Invite> {
        let transition = engagement::refresh(&invite.state(), Utc::now(), &self.policy);
        if transition.dirty {
            invite.apply_state(&transition.state);
            self.invites
                .record_transition(&invite, None, &transition.funnel)
                .await?;
        }
        Ok(invite)
    }

    /// Redeem an invite secret: create the account and mark the invite
    /// accepted in one audited transaction.
    pub async fn accept(&self, input: AcceptInvite) -> ComplyResult<User> {
        let display_name = required_text("display_name", &input.display_name)?;
        validate_password(&input.password)?;

        let invite = match self
            .invites
            .get_by_token_hash(&hash_token(&input.raw_token))
            .await
        {
            Err(ComplyError::NotFound { .. }) => {
                return Err(ComplyError::unauthenticated("invalid invite token"));
            }
            other => other?,
        };

        let invite = self.refreshed(invite).await?;
        match invite.status {
            InviteStatus::Expired => return Err(ComplyError::validation("invite has expired")),
            InviteStatus::Accepted => {
                return Err(ComplyError::validation("invite was already accepted"));
            }
            _ => {}
        }
        if self.users.email_exists(&invite.email).await? {
            return Err(ComplyError::AlreadyExists {
                entity: format!("user with email {}", invite.email),
            });
        }

        let now = Utc::now();
        let transition = engagement::apply_event(
            &invite.state(),
            InviteEventType::Accepted,
            now,
            now,
            &self.policy,
        )?;
        if transition.outcome != Outcome::Advanced {
            return Err(ComplyError::validation(format!(
                "invite in status {} cannot be accepted",
                invite.status
            )));
        }
        let accepted = transition.state;
        let funnel = transition.funnel;
        let next_seq = self.invites.history(invite.id).await?.len();
        let password_hash = hash_password(&input.password, self.pepper.as_deref())?;

        let user_id = Uuid::new_v4();
        let ctx = AccessContext {
            user_id,
            role: invite.role,
            institution_id: invite.institution_id,
            assigned_regions: Vec::new(),
            auth_mode: AuthMode::InviteToken,
        };
        let request = MutationRequest::new(EntityType::Invite, ChangeType::StatusChange)
            .entity(invite.id)
            .institution(invite.institution_id);

        self.executor
            .mutate(
                &ctx,
                request,
                // Holding the secret is the credential.
                async |_: &AccessContext| Ok::<(), ComplyError>(()),
                async |tx: &mut MutationTx<C>| {
                    tx.create(EntityType::User, user_id)
                        .field("email", invite.email.as_str())
                        .field("display_name", display_name)
                        .field("role", invite.role)
                        .field("institution_id", invite.institution_id)
                        .field("status", UserStatus::Active.as_str())
                        .field("assigned_regions", Vec::<String>::new())
                        .secret_field("password_hash", password_hash)
                        .stage();

                    tx.update(EntityType::Invite, invite.id)
                        .set("status", invite.status.as_str(), accepted.status.as_str())
                        .set("accepted_user_id", invite.accepted_user_id, Some(user_id))
                        .set(
                            "engagement_state",
                            invite.engagement_state.as_str(),
                            accepted.engagement_state.as_str(),
                        )
                        .set(
                            "engagement_score",
                            invite.engagement_score,
                            accepted.engagement_score,
                        )
                        .stage();

                    let invite_id = tx.param(invite.id.to_string());
                    let at = tx.date_param(now);
                    tx.stage_raw(format!(
                        "UPDATE type::record('invite', {invite_id}) SET last_activity_at = {at}, dormant_from = NONE;"
                    ));
                    tx.stage_raw(format!(
                        "CREATE invite_event SET invite_id = {invite_id}, \
                         event_type = '{}', occurred_at = {at};",
                        InviteEventType::Accepted.as_str()
                    ));
                    for (i, step) in funnel.iter().enumerate() {
                        let from = tx.param(step.from.as_str());
                        let to = tx.param(step.to.as_str());
                        let step_at = tx.date_param(step.at);
                        let reason = tx.param(step.reason.as_str());
                        let seq = tx.param((next_seq + i) as u64);
                        tx.stage_raw(format!(
                            "CREATE engagement_transition SET invite_id = {invite_id}, \
                             from_state = {from}, to_state = {to}, at = {step_at}, \
                             reason = {reason}, seq = {seq};"
                        ));
                    }
                    Ok(())
                },
            )
            .await?;

        info!(invite_id = %invite.id, user_id = %user_id, "Invite accepted");
        self.users.get_by_id(user_id).await
    }
}

/// Who may invite whom: INVITE_USERS, platform admins only by platform
/// admins, institution admins only into their own institution's roles.
fn authorize_invite(
    ctx: &AccessContext,
    role: Role,
    institution_id: Option<Uuid>,
) -> ComplyResult<()> {
    rbac::require(ctx.role, Capability::InviteUsers)?;
    if role == Role::PlatformAdmin && ctx.role != Role::PlatformAdmin {
        return Err(ComplyError::forbidden(
            "only platform administrators invite platform administrators",
        ));
    }
    if ctx.role.is_institution_scoped() {
        let own_institution = institution_id.is_some_and(|id| ctx.is_member_of(id));
        if !role.requires_institution() || !own_institution {
            return Err(ComplyError::forbidden(
                "institution administrators invite into their own institution only",
            ));
        }
    }
    Ok(())
}

fn transition_result(invite: &Invite, replayed: bool) -> InviteTransitionResult {
    InviteTransitionResult {
        status: invite.status,
        engagement_state: invite.engagement_state,
        engagement_score: invite.engagement_score,
        replayed,
    }
}
