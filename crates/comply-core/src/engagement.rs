//! Invite delivery lifecycle and engagement funnel.
//!
//! Two independent axes are tracked for every invite:
//!
//! - **delivery status** (`QUEUED → SENDING → SENT → DELIVERED → OPENED →
//!   ACCEPTED`, with `RETRYING`, `FAILED` and `EXPIRED` side states), driven
//!   by mail-transport events;
//! - **engagement funnel** (`UNCONTACTED → … → ACTIVE`, with `DORMANT`),
//!   driven by what the recipient does.
//!
//! Everything here is a pure function of the current [`InviteState`], the
//! event and the clock. Persistence (history rows, replay detection) is the
//! caller's job.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ComplyError;
use crate::models::invite::{EngagementState, InviteEventType, InviteStatus};

/// Points added to the engagement score per event, capped at [`MAX_SCORE`].
pub const MAX_SCORE: u32 = 100;

/// Tunables for invite delivery and engagement tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvitePolicy {
    /// Days an invite stays valid after creation.
    pub expiry_days: i64,
    /// Delivery attempts before an invite is permanently `FAILED`.
    pub max_attempts: u32,
    /// Invites inserted per transaction during bulk creation.
    pub batch_size: usize,
    /// Days without recipient activity before the funnel goes `DORMANT`.
    pub dormant_after_days: i64,
}

impl Default for InvitePolicy {
    fn default() -> Self {
        Self {
            expiry_days: 7,
            max_attempts: 3,
            batch_size: 50,
            dormant_after_days: 14,
        }
    }
}

impl InvitePolicy {
    pub fn expiry(&self) -> Duration {
        Duration::days(self.expiry_days)
    }

    pub fn dormant_after(&self) -> Duration {
        Duration::days(self.dormant_after_days)
    }
}

/// The part of an invite the state machine reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteState {
    pub status: InviteStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub expires_at: DateTime<Utc>,
    pub engagement_state: EngagementState,
    pub engagement_score: u32,
    /// Last recipient activity, or first contact if there was none.
    pub last_activity_at: Option<DateTime<Utc>>,
    /// Funnel stage held when the invite went `DORMANT`.
    pub dormant_from: Option<EngagementState>,
}

impl InviteState {
    /// State of a freshly queued invite.
    pub fn queued(now: DateTime<Utc>, policy: &InvitePolicy) -> Self {
        Self {
            status: InviteStatus::Queued,
            attempts: 0,
            max_attempts: policy.max_attempts,
            expires_at: now + policy.expiry(),
            engagement_state: EngagementState::Uncontacted,
            engagement_score: 0,
            last_activity_at: None,
            dormant_from: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        !matches!(
            self.status,
            InviteStatus::Accepted | InviteStatus::Failed
        ) && now >= self.expires_at
    }
}

/// One move along the engagement funnel, to be appended to history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelStep {
    pub from: EngagementState,
    pub to: EngagementState,
    pub at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The event moved the delivery status, attempts or funnel.
    Advanced,
    /// Stale or duplicate event; nothing about the event was applied.
    Unchanged,
    /// The invite is expired; the event was ignored.
    Expired,
}

/// Result of running the machine once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: InviteState,
    pub funnel: Vec<FunnelStep>,
    pub outcome: Outcome,
    /// Whether `state` differs from the input and must be persisted. Can be
    /// true for `Unchanged`/`Expired` when lazy expiry or dormancy applied.
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("delivery attempts exhausted ({attempts}/{max_attempts})")]
    AttemptsExhausted { attempts: u32, max_attempts: u32 },

    #[error("event {event} is not valid while invite is {status}")]
    InvalidTransition {
        status: InviteStatus,
        event: InviteEventType,
    },
}

impl From<TransitionError> for ComplyError {
    fn from(err: TransitionError) -> Self {
        ComplyError::validation(err.to_string())
    }
}

/// Apply time-based changes: expiry and funnel dormancy.
pub fn refresh(state: &InviteState, now: DateTime<Utc>, policy: &InvitePolicy) -> Transition {
    let mut next = state.clone();
    let mut funnel = Vec::new();

    if next.is_expired_at(now) && next.status != InviteStatus::Expired {
        next.status = InviteStatus::Expired;
    }

    let inactive = next
        .last_activity_at
        .is_some_and(|last| now - last >= policy.dormant_after());
    if inactive
        && !matches!(
            next.engagement_state,
            EngagementState::Active | EngagementState::Dormant
        )
    {
        funnel.push(FunnelStep {
            from: next.engagement_state,
            to: EngagementState::Dormant,
            at: now,
            reason: "INACTIVITY".into(),
        });
        next.dormant_from = Some(next.engagement_state);
        next.engagement_state = EngagementState::Dormant;
    }

    let outcome = if next.status == InviteStatus::Expired {
        Outcome::Expired
    } else {
        Outcome::Unchanged
    };
    let dirty = next != *state;
    Transition {
        state: next,
        funnel,
        outcome,
        dirty,
    }
}

/// Apply one delivery or engagement event.
///
/// Expiry and dormancy are evaluated against `now` first. Events on an
/// expired invite are ignored. Stale events (the invite is already past
/// the state the event would produce) return [`Outcome::Unchanged`].
pub fn apply_event(
    state: &InviteState,
    event: InviteEventType,
    occurred_at: DateTime<Utc>,
    now: DateTime<Utc>,
    policy: &InvitePolicy,
) -> Result<Transition, TransitionError> {
    let refreshed = refresh(state, now, policy);
    if refreshed.outcome == Outcome::Expired {
        return Ok(Transition {
            dirty: refreshed.state != *state,
            ..refreshed
        });
    }

    let mut next = refreshed.state;
    let mut funnel = refreshed.funnel;
    let before = next.clone();

    let status = next_status(&mut next, event)?;
    next.status = status;

    if let Some(target) = funnel_target(event) {
        advance_funnel(&mut next, target, event, occurred_at, &mut funnel);
    }

    let advanced = next != before;
    if advanced {
        next.engagement_score = (next.engagement_score + score_for(event)).min(MAX_SCORE);
    }
    // Transport events only start the dormancy clock.
    let first_contact = next.last_activity_at.is_none()
        && next.engagement_state != EngagementState::Uncontacted;
    if advanced && (is_recipient_activity(event) || first_contact) {
        next.last_activity_at = Some(
            next.last_activity_at
                .map_or(occurred_at, |last| last.max(occurred_at)),
        );
    }

    let dirty = next != *state;
    Ok(Transition {
        state: next,
        funnel,
        outcome: if advanced {
            Outcome::Advanced
        } else {
            Outcome::Unchanged
        },
        dirty,
    })
}

/// Ordering along the happy delivery path. Side states map onto the
/// position they re-enter from.
fn delivery_rank(status: InviteStatus) -> u8 {
    match status {
        InviteStatus::Queued | InviteStatus::Retrying => 0,
        InviteStatus::Sending => 1,
        InviteStatus::Sent => 2,
        InviteStatus::Delivered => 3,
        InviteStatus::Opened => 4,
        InviteStatus::Accepted | InviteStatus::Failed | InviteStatus::Expired => 5,
    }
}

fn next_status(
    state: &mut InviteState,
    event: InviteEventType,
) -> Result<InviteStatus, TransitionError> {
    use InviteEventType as E;
    use InviteStatus as S;

    let status = state.status;
    let invalid = || TransitionError::InvalidTransition { status, event };

    match status {
        S::Accepted | S::Expired => return Ok(status),
        S::Failed => {
            return match event {
                E::SendStarted => Err(TransitionError::AttemptsExhausted {
                    attempts: state.attempts,
                    max_attempts: state.max_attempts,
                }),
                _ => Ok(status),
            };
        }
        _ => {}
    }

    let rank = delivery_rank(status);
    let next = match event {
        E::SendStarted => match status {
            S::Queued | S::Retrying => S::Sending,
            _ => status,
        },
        E::Sent => match status {
            S::Sending => S::Sent,
            _ if rank > delivery_rank(S::Sending) => status,
            _ => return Err(invalid()),
        },
        E::Delivered => match status {
            S::Sent => S::Delivered,
            _ if rank > delivery_rank(S::Sent) => status,
            _ => return Err(invalid()),
        },
        E::Opened | E::Clicked | E::Viewed => match status {
            S::Sent | S::Delivered => S::Opened,
            S::Opened => status,
            _ => return Err(invalid()),
        },
        E::Accepted => match status {
            S::Sent | S::Delivered | S::Opened => S::Accepted,
            _ => return Err(invalid()),
        },
        E::Failed => match status {
            S::Queued | S::Retrying | S::Sending | S::Sent => {
                state.attempts += 1;
                if state.attempts < state.max_attempts {
                    S::Retrying
                } else {
                    S::Failed
                }
            }
            // Delivery already confirmed.
            _ => status,
        },
        E::Bounced => match status {
            S::Opened => status,
            _ => S::Failed,
        },
    };
    Ok(next)
}

fn funnel_target(event: InviteEventType) -> Option<EngagementState> {
    match event {
        InviteEventType::Sent | InviteEventType::Delivered => Some(EngagementState::Contacted),
        InviteEventType::Opened => Some(EngagementState::Engaged),
        InviteEventType::Clicked => Some(EngagementState::Evaluating),
        InviteEventType::Viewed => Some(EngagementState::Ready),
        InviteEventType::Accepted => Some(EngagementState::Active),
        InviteEventType::SendStarted | InviteEventType::Failed | InviteEventType::Bounced => None,
    }
}

fn is_recipient_activity(event: InviteEventType) -> bool {
    matches!(
        event,
        InviteEventType::Opened
            | InviteEventType::Clicked
            | InviteEventType::Viewed
            | InviteEventType::Accepted
    )
}

fn advance_funnel(
    state: &mut InviteState,
    target: EngagementState,
    event: InviteEventType,
    at: DateTime<Utc>,
    funnel: &mut Vec<FunnelStep>,
) {
    let current = state.engagement_state;
    let (moves, to) = match (current.rank(), target.rank()) {
        (Some(from), Some(to)) => (to > from, target),
        // Dormant: only the recipient's own activity wakes the funnel, and
        // it resumes no lower than where it stopped.
        (None, _) => {
            let resume = state
                .dormant_from
                .filter(|prior| prior.rank() > target.rank())
                .unwrap_or(target);
            (is_recipient_activity(event), resume)
        }
        (Some(_), None) => (false, target),
    };
    if !moves {
        return;
    }
    funnel.push(FunnelStep {
        from: current,
        to,
        at,
        reason: event.as_str().to_string(),
    });
    state.engagement_state = to;
    state.dormant_from = None;
}

fn score_for(event: InviteEventType) -> u32 {
    match event {
        InviteEventType::Delivered => 5,
        InviteEventType::Opened => 10,
        InviteEventType::Clicked => 15,
        InviteEventType::Viewed => 20,
        InviteEventType::Accepted => 50,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use InviteEventType as E;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn step(
        state: &InviteState,
        event: InviteEventType,
        minutes: i64,
    ) -> Result<Transition, TransitionError> {
        let at = t0() + Duration::minutes(minutes);
        apply_event(state, event, at, at, &InvitePolicy::default())
    }

    fn run(events: &[InviteEventType]) -> InviteState {
        let mut state = InviteState::queued(t0(), &InvitePolicy::default());
        for (i, event) in events.iter().enumerate() {
            state = step(&state, *event, i as i64).unwrap().state;
        }
        state
    }

    #[test]
    fn happy_path_reaches_accepted_and_active() {
        let state = run(&[E::SendStarted, E::Sent, E::Delivered, E::Opened, E::Accepted]);
        assert_eq!(state.status, InviteStatus::Accepted);
        assert_eq!(state.engagement_state, EngagementState::Active);
        assert_eq!(state.engagement_score, 5 + 10 + 50);
    }

    #[test]
    fn three_failures_exhaust_attempts() {
        let state = run(&[
            E::SendStarted,
            E::Failed,
            E::SendStarted,
            E::Failed,
            E::SendStarted,
            E::Failed,
        ]);
        assert_eq!(state.status, InviteStatus::Failed);
        assert_eq!(state.attempts, 3);

        let err = step(&state, E::SendStarted, 100).unwrap_err();
        assert_eq!(
            err,
            TransitionError::AttemptsExhausted {
                attempts: 3,
                max_attempts: 3
            }
        );

        // Further failure reports do not keep counting.
        let again = step(&state, E::Failed, 101).unwrap();
        assert_eq!(again.outcome, Outcome::Unchanged);
        assert_eq!(again.state.attempts, 3);
    }

    #[test]
    fn failure_below_limit_retries() {
        let state = run(&[E::SendStarted, E::Failed]);
        assert_eq!(state.status, InviteStatus::Retrying);
        assert_eq!(state.attempts, 1);
        let state = step(&state, E::SendStarted, 10).unwrap().state;
        assert_eq!(state.status, InviteStatus::Sending);
    }

    #[test]
    fn bounce_is_terminal() {
        let state = run(&[E::SendStarted, E::Sent, E::Bounced]);
        assert_eq!(state.status, InviteStatus::Failed);
        assert!(matches!(
            step(&state, E::SendStarted, 50),
            Err(TransitionError::AttemptsExhausted { .. })
        ));
    }

    #[test]
    fn open_from_sent_proves_delivery() {
        let state = run(&[E::SendStarted, E::Sent, E::Opened]);
        assert_eq!(state.status, InviteStatus::Opened);
        assert_eq!(state.engagement_state, EngagementState::Engaged);
    }

    #[test]
    fn stale_events_are_noops() {
        let state = run(&[E::SendStarted, E::Sent, E::Delivered]);
        let stale = step(&state, E::Sent, 30).unwrap();
        assert_eq!(stale.outcome, Outcome::Unchanged);
        assert!(!stale.dirty);
        assert!(stale.funnel.is_empty());
        assert_eq!(stale.state, state);
    }

    #[test]
    fn out_of_order_event_is_rejected() {
        let state = InviteState::queued(t0(), &InvitePolicy::default());
        assert!(matches!(
            step(&state, E::Delivered, 1),
            Err(TransitionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn funnel_never_moves_backwards() {
        let state = run(&[E::SendStarted, E::Sent, E::Viewed]);
        assert_eq!(state.engagement_state, EngagementState::Ready);
        let opened = step(&state, E::Opened, 30).unwrap();
        assert_eq!(opened.outcome, Outcome::Unchanged);
        assert_eq!(opened.state.engagement_state, EngagementState::Ready);
        assert_eq!(opened.state.engagement_score, state.engagement_score);
    }

    #[test]
    fn funnel_moves_are_recorded_in_order() {
        let mut state = run(&[E::SendStarted]);
        let mut history = Vec::new();
        for (i, event) in [E::Sent, E::Opened, E::Clicked, E::Viewed, E::Accepted]
            .into_iter()
            .enumerate()
        {
            let t = step(&state, event, 10 + i as i64).unwrap();
            history.extend(t.funnel);
            state = t.state;
        }
        let path: Vec<_> = history.iter().map(|s| s.to).collect();
        assert_eq!(
            path,
            vec![
                EngagementState::Contacted,
                EngagementState::Engaged,
                EngagementState::Evaluating,
                EngagementState::Ready,
                EngagementState::Active,
            ]
        );
        assert_eq!(history[0].from, EngagementState::Uncontacted);
        assert_eq!(history[1].reason, "OPENED");
    }

    #[test]
    fn score_is_capped() {
        let mut state = run(&[E::SendStarted, E::Sent]);
        state.engagement_score = 90;
        let t = step(&state, E::Accepted, 5).unwrap();
        assert_eq!(t.state.engagement_score, MAX_SCORE);
    }

    #[test]
    fn expired_invite_ignores_events() {
        let policy = InvitePolicy::default();
        let state = run(&[E::SendStarted, E::Sent]);
        let later = t0() + Duration::days(8);

        let t = apply_event(&state, E::Opened, later, later, &policy).unwrap();
        assert_eq!(t.outcome, Outcome::Expired);
        assert_eq!(t.state.status, InviteStatus::Expired);
        assert!(t.dirty);

        let again = apply_event(&t.state, E::Accepted, later, later, &policy).unwrap();
        assert_eq!(again.outcome, Outcome::Expired);
        assert!(!again.dirty);
    }

    #[test]
    fn accepted_invites_never_expire() {
        let state = run(&[E::SendStarted, E::Sent, E::Accepted]);
        let t = refresh(&state, t0() + Duration::days(30), &InvitePolicy::default());
        assert_eq!(t.state.status, InviteStatus::Accepted);
    }

    #[test]
    fn inactivity_goes_dormant_and_activity_reactivates() {
        let policy = InvitePolicy {
            expiry_days: 60,
            ..InvitePolicy::default()
        };
        let mut state = InviteState::queued(t0(), &policy);
        for (i, event) in [E::SendStarted, E::Sent, E::Opened].into_iter().enumerate() {
            let at = t0() + Duration::minutes(i as i64);
            state = apply_event(&state, event, at, at, &policy).unwrap().state;
        }

        let later = t0() + Duration::days(15);
        let dormant = refresh(&state, later, &policy);
        assert_eq!(dormant.state.engagement_state, EngagementState::Dormant);
        assert_eq!(dormant.funnel.len(), 1);
        assert_eq!(dormant.funnel[0].from, EngagementState::Engaged);

        let delivered = apply_event(&dormant.state, E::Delivered, later, later, &policy).unwrap();
        assert_eq!(delivered.state.engagement_state, EngagementState::Dormant);

        let clicked = apply_event(&dormant.state, E::Clicked, later, later, &policy).unwrap();
        assert_eq!(clicked.state.engagement_state, EngagementState::Evaluating);
        assert_eq!(clicked.outcome, Outcome::Advanced);
    }

    #[test]
    fn waking_from_dormancy_never_loses_ground() {
        let policy = InvitePolicy {
            expiry_days: 60,
            ..InvitePolicy::default()
        };
        let mut state = InviteState::queued(t0(), &policy);
        for (i, event) in [E::SendStarted, E::Sent, E::Viewed].into_iter().enumerate() {
            let at = t0() + Duration::minutes(i as i64);
            state = apply_event(&state, event, at, at, &policy).unwrap().state;
        }
        assert_eq!(state.engagement_state, EngagementState::Ready);

        let later = t0() + Duration::days(15);
        let dormant = refresh(&state, later, &policy).state;
        assert_eq!(dormant.dormant_from, Some(EngagementState::Ready));

        let opened = apply_event(&dormant, E::Opened, later, later, &policy).unwrap();
        assert_eq!(opened.state.engagement_state, EngagementState::Ready);
        assert_eq!(opened.state.dormant_from, None);
        assert_eq!(opened.funnel.len(), 1);
        assert_eq!(opened.funnel[0].from, EngagementState::Dormant);
        assert_eq!(opened.funnel[0].to, EngagementState::Ready);

        let accepted = apply_event(&dormant, E::Accepted, later, later, &policy).unwrap();
        assert_eq!(accepted.state.engagement_state, EngagementState::Active);
    }

    #[test]
    fn transport_events_do_not_count_as_activity() {
        let policy = InvitePolicy {
            expiry_days: 60,
            ..InvitePolicy::default()
        };
        let contacted_at = t0() + Duration::minutes(1);
        let mut state = InviteState::queued(t0(), &policy);
        state = apply_event(&state, E::SendStarted, t0(), t0(), &policy)
            .unwrap()
            .state;
        assert_eq!(state.last_activity_at, None);
        state = apply_event(&state, E::Sent, contacted_at, contacted_at, &policy)
            .unwrap()
            .state;
        assert_eq!(state.last_activity_at, Some(contacted_at));

        // A delivery receipt days later leaves the dormancy clock alone.
        let delivered_at = t0() + Duration::days(10);
        state = apply_event(&state, E::Delivered, delivered_at, delivered_at, &policy)
            .unwrap()
            .state;
        assert_eq!(state.status, InviteStatus::Delivered);
        assert_eq!(state.last_activity_at, Some(contacted_at));

        let dormant = refresh(&state, t0() + Duration::days(15), &policy);
        assert_eq!(dormant.state.engagement_state, EngagementState::Dormant);

        let opened_at = t0() + Duration::days(16);
        let opened = apply_event(&dormant.state, E::Opened, opened_at, opened_at, &policy).unwrap();
        assert_eq!(opened.state.last_activity_at, Some(opened_at));
    }
}
