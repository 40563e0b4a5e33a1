//! SurrealDB implementation of [`InviteRepository`].
//!
//! Invite creation and acceptance are audited mutations. Delivery
//! bookkeeping (status, attempts, funnel history, processed events) is
//! written here in its own transaction; the unique index on processed
//! events makes concurrent replays of one event collapse to a single
//! application.

use chrono::{DateTime, Utc};
use comply_core::engagement::FunnelStep;
use comply_core::error::ComplyResult;
use comply_core::models::invite::{
    EngagementTransition, Invite, InviteEvent, InviteEventType,
};
use comply_core::models::user::normalize_email;
use comply_core::repository::InviteRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use super::{
    CountRow, check_response, first_or_not_found, parse_enum, parse_opt_uuid, parse_uuid,
    total_from,
};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct InviteRow {
    record_id: String,
    email: String,
    role: String,
    institution_id: Option<String>,
    invited_by: String,
    token_hash: String,
    status: String,
    attempts: u32,
    max_attempts: u32,
    expires_at: DateTime<Utc>,
    engagement_state: String,
    engagement_score: u32,
    last_activity_at: Option<DateTime<Utc>>,
    dormant_from: Option<String>,
    accepted_user_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InviteRow {
    fn try_into_invite(self) -> Result<Invite, DbError> {
        Ok(Invite {
            id: parse_uuid(&self.record_id)?,
            email: self.email,
            role: parse_enum(&self.role)?,
            institution_id: parse_opt_uuid(self.institution_id)?,
            invited_by: parse_uuid(&self.invited_by)?,
            token_hash: self.token_hash,
            status: parse_enum(&self.status)?,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            expires_at: self.expires_at,
            engagement_state: parse_enum(&self.engagement_state)?,
            engagement_score: self.engagement_score,
            last_activity_at: self.last_activity_at,
            dormant_from: self
                .dormant_from
                .as_deref()
                .map(parse_enum)
                .transpose()?,
            accepted_user_id: parse_opt_uuid(self.accepted_user_id)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct TransitionRow {
    invite_id: String,
    from_state: String,
    to_state: String,
    at: DateTime<Utc>,
    reason: String,
}

impl TransitionRow {
    fn try_into_transition(self) -> Result<EngagementTransition, DbError> {
        Ok(EngagementTransition {
            invite_id: parse_uuid(&self.invite_id)?,
            from_state: parse_enum(&self.from_state)?,
            to_state: parse_enum(&self.to_state)?,
            at: self.at,
            reason: self.reason,
        })
    }
}

#[derive(Clone)]
pub struct SurrealInviteRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealInviteRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn one(&self, sql: &str, key: &'static str, value: String) -> ComplyResult<Vec<Invite>> {
        let mut result = self
            .db
            .query(sql)
            .bind((key, value))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<InviteRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(InviteRow::try_into_invite)
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}

impl<C: Connection> InviteRepository for SurrealInviteRepository<C> {
    async fn get_by_id(&self, id: Uuid) -> ComplyResult<Invite> {
        let rows = self
            .one(
                "SELECT meta::id(id) AS record_id, * FROM type::record('invite', $id)",
                "id",
                id.to_string(),
            )
            .await?;
        Ok(first_or_not_found(rows, "invite", id)?)
    }

    async fn get_by_token_hash(&self, token_hash: &str) -> ComplyResult<Invite> {
        let rows = self
            .one(
                "SELECT meta::id(id) AS record_id, * FROM invite \
                 WHERE token_hash = $token_hash",
                "token_hash",
                token_hash.to_string(),
            )
            .await?;
        // Never echo the hash back in errors.
        Ok(first_or_not_found(rows, "invite", "token")?)
    }

    async fn find_open_by_email(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> ComplyResult<Option<Invite>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM invite \
                 WHERE email = $email \
                 AND status NOT IN ['ACCEPTED', 'FAILED', 'EXPIRED'] \
                 AND expires_at > $now \
                 ORDER BY created_at DESC LIMIT 1",
            )
            .bind(("email", normalize_email(email)))
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<InviteRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .next()
            .map(InviteRow::try_into_invite)
            .transpose()?)
    }

    async fn has_event(
        &self,
        invite_id: Uuid,
        event_type: InviteEventType,
        occurred_at: DateTime<Utc>,
    ) -> ComplyResult<bool> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM invite_event \
                 WHERE invite_id = $invite_id AND event_type = $event_type \
                 AND occurred_at = $occurred_at GROUP ALL",
            )
            .bind(("invite_id", invite_id.to_string()))
            .bind(("event_type", event_type.as_str().to_string()))
            .bind(("occurred_at", occurred_at))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(total_from(rows) > 0)
    }

    async fn record_transition(
        &self,
        invite: &Invite,
        event: Option<&InviteEvent>,
        funnel: &[FunnelStep],
    ) -> ComplyResult<bool> {
        let invite_id = invite.id.to_string();

        let mut count = self
            .db
            .query(
                "SELECT count() AS total FROM engagement_transition \
                 WHERE invite_id = $invite_id GROUP ALL",
            )
            .bind(("invite_id", invite_id.clone()))
            .await
            .map_err(DbError::from)?;
        let next_seq = total_from(count.take(0).map_err(DbError::from)?);

        let mut sql = String::from("BEGIN TRANSACTION;\n");
        if event.is_some() {
            sql.push_str(
                "CREATE invite_event SET invite_id = $invite_id, \
                 event_type = $event_type, occurred_at = $occurred_at;\n",
            );
        }
        let last_activity = if invite.last_activity_at.is_some() {
            "$last_activity_at"
        } else {
            "NONE"
        };
        let dormant_from = if invite.dormant_from.is_some() {
            "$dormant_from"
        } else {
            "NONE"
        };
        sql.push_str(&format!(
            "UPDATE type::record('invite', $invite_id) SET \
             status = $status, attempts = $attempts, \
             max_attempts = $max_attempts, expires_at = $expires_at, \
             engagement_state = $engagement_state, \
             engagement_score = $engagement_score, \
             last_activity_at = {last_activity}, \
             dormant_from = {dormant_from}, updated_at = time::now();\n"
        ));
        for i in 0..funnel.len() {
            sql.push_str(&format!(
                "CREATE engagement_transition SET invite_id = $invite_id, \
                 from_state = $from_{i}, to_state = $to_{i}, at = $at_{i}, \
                 reason = $reason_{i}, seq = $seq_{i};\n"
            ));
        }
        sql.push_str("COMMIT TRANSACTION;");

        let mut query = self
            .db
            .query(sql)
            .bind(("invite_id", invite_id))
            .bind(("status", invite.status.as_str().to_string()))
            .bind(("attempts", invite.attempts))
            .bind(("max_attempts", invite.max_attempts))
            .bind(("expires_at", invite.expires_at))
            .bind(("engagement_state", invite.engagement_state.as_str().to_string()))
            .bind(("engagement_score", invite.engagement_score))
            .bind(("last_activity_at", invite.last_activity_at))
            .bind((
                "dormant_from",
                invite.dormant_from.map(|s| s.as_str().to_string()),
            ));
        if let Some(event) = event {
            query = query
                .bind(("event_type", event.event_type.as_str().to_string()))
                .bind(("occurred_at", event.timestamp));
        }
        for (i, step) in funnel.iter().enumerate() {
            query = query
                .bind((format!("from_{i}"), step.from.as_str().to_string()))
                .bind((format!("to_{i}"), step.to.as_str().to_string()))
                .bind((format!("at_{i}"), step.at))
                .bind((format!("reason_{i}"), step.reason.clone()))
                .bind((format!("seq_{i}"), next_seq + i as u64));
        }

        let mut response = query.await.map_err(DbError::from)?;
        match check_response(&mut response) {
            Ok(()) => Ok(true),
            Err(DbError::Conflict { .. }) if event.is_some() => {
                debug!(invite_id = %invite.id, "Invite event already recorded");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn history(&self, invite_id: Uuid) -> ComplyResult<Vec<EngagementTransition>> {
        let mut result = self
            .db
            .query(
                "SELECT * FROM engagement_transition WHERE invite_id = $invite_id \
                 ORDER BY seq ASC",
            )
            .bind(("invite_id", invite_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<TransitionRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(TransitionRow::try_into_transition)
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}
