//! Invite domain model.
//!
//! An invite tracks two independent things: whether the e-mail
//! mechanically arrived (`status`) and whether the recipient is engaging
//! (`engagement_state`). See [`crate::engagement`] for the transitions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::role::Role;
use crate::engagement::InviteState;
use crate::error::ComplyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InviteStatus {
    Queued,
    Sending,
    Sent,
    Delivered,
    Opened,
    Accepted,
    Failed,
    Retrying,
    Expired,
}

impl InviteStatus {
    pub const ALL: [InviteStatus; 9] = [
        InviteStatus::Queued,
        InviteStatus::Sending,
        InviteStatus::Sent,
        InviteStatus::Delivered,
        InviteStatus::Opened,
        InviteStatus::Accepted,
        InviteStatus::Failed,
        InviteStatus::Retrying,
        InviteStatus::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Queued => "QUEUED",
            InviteStatus::Sending => "SENDING",
            InviteStatus::Sent => "SENT",
            InviteStatus::Delivered => "DELIVERED",
            InviteStatus::Opened => "OPENED",
            InviteStatus::Accepted => "ACCEPTED",
            InviteStatus::Failed => "FAILED",
            InviteStatus::Retrying => "RETRYING",
            InviteStatus::Expired => "EXPIRED",
        }
    }

    /// States from which nothing further happens.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InviteStatus::Accepted | InviteStatus::Failed | InviteStatus::Expired
        )
    }
}

impl fmt::Display for InviteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InviteStatus {
    type Err = ComplyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InviteStatus::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| ComplyError::validation(format!("unknown invite status: {s}")))
    }
}

/// Recipient engagement funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngagementState {
    Uncontacted,
    Contacted,
    Engaged,
    Evaluating,
    Ready,
    Active,
    Dormant,
}

impl EngagementState {
    pub const ALL: [EngagementState; 7] = [
        EngagementState::Uncontacted,
        EngagementState::Contacted,
        EngagementState::Engaged,
        EngagementState::Evaluating,
        EngagementState::Ready,
        EngagementState::Active,
        EngagementState::Dormant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementState::Uncontacted => "UNCONTACTED",
            EngagementState::Contacted => "CONTACTED",
            EngagementState::Engaged => "ENGAGED",
            EngagementState::Evaluating => "EVALUATING",
            EngagementState::Ready => "READY",
            EngagementState::Active => "ACTIVE",
            EngagementState::Dormant => "DORMANT",
        }
    }

    /// Position along the funnel. `Dormant` sits outside it.
    pub fn rank(&self) -> Option<u8> {
        match self {
            EngagementState::Uncontacted => Some(0),
            EngagementState::Contacted => Some(1),
            EngagementState::Engaged => Some(2),
            EngagementState::Evaluating => Some(3),
            EngagementState::Ready => Some(4),
            EngagementState::Active => Some(5),
            EngagementState::Dormant => None,
        }
    }
}

impl fmt::Display for EngagementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngagementState {
    type Err = ComplyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EngagementState::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| ComplyError::validation(format!("unknown engagement state: {s}")))
    }
}

/// Delivery and engagement events reported by mail trackers and the
/// acceptance flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InviteEventType {
    SendStarted,
    Sent,
    Delivered,
    Opened,
    Clicked,
    Viewed,
    Accepted,
    Failed,
    Bounced,
}

impl InviteEventType {
    pub const ALL: [InviteEventType; 9] = [
        InviteEventType::SendStarted,
        InviteEventType::Sent,
        InviteEventType::Delivered,
        InviteEventType::Opened,
        InviteEventType::Clicked,
        InviteEventType::Viewed,
        InviteEventType::Accepted,
        InviteEventType::Failed,
        InviteEventType::Bounced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InviteEventType::SendStarted => "SEND_STARTED",
            InviteEventType::Sent => "SENT",
            InviteEventType::Delivered => "DELIVERED",
            InviteEventType::Opened => "OPENED",
            InviteEventType::Clicked => "CLICKED",
            InviteEventType::Viewed => "VIEWED",
            InviteEventType::Accepted => "ACCEPTED",
            InviteEventType::Failed => "FAILED",
            InviteEventType::Bounced => "BOUNCED",
        }
    }
}

impl fmt::Display for InviteEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InviteEventType {
    type Err = ComplyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InviteEventType::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| ComplyError::validation(format!("unknown invite event: {s}")))
    }
}

/// A delivery or engagement event for one invite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteEvent {
    pub invite_id: Uuid,
    pub event_type: InviteEventType,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invite {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub institution_id: Option<Uuid>,
    pub invited_by: Uuid,
    /// SHA-256 of the single-use secret; the secret itself is never stored.
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub status: InviteStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub expires_at: DateTime<Utc>,
    pub engagement_state: EngagementState,
    pub engagement_score: u32,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub dormant_from: Option<EngagementState>,
    pub accepted_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invite {
    /// The state-machine view of this invite.
    pub fn state(&self) -> InviteState {
        InviteState {
            status: self.status,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            expires_at: self.expires_at,
            engagement_state: self.engagement_state,
            engagement_score: self.engagement_score,
            last_activity_at: self.last_activity_at,
            dormant_from: self.dormant_from,
        }
    }

    /// Copy a machine state back onto this invite.
    pub fn apply_state(&mut self, state: &InviteState) {
        self.status = state.status;
        self.attempts = state.attempts;
        self.max_attempts = state.max_attempts;
        self.expires_at = state.expires_at;
        self.engagement_state = state.engagement_state;
        self.engagement_score = state.engagement_score;
        self.last_activity_at = state.last_activity_at;
        self.dormant_from = state.dormant_from;
    }
}

/// Request to invite one recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvite {
    pub email: String,
    pub role: Role,
    pub institution_id: Option<Uuid>,
}

/// A freshly created invite together with its raw secret.
///
/// The raw secret is only held long enough to hand it to the mailer.
#[derive(Debug, Clone)]
pub struct IssuedInvite {
    pub invite: Invite,
    pub raw_token: String,
}

/// Input for accepting an invite.
#[derive(Debug, Clone)]
pub struct AcceptInvite {
    pub raw_token: String,
    pub display_name: String,
    pub password: String,
}

/// One appended step of the engagement funnel history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementTransition {
    pub invite_id: Uuid,
    pub from_state: EngagementState,
    pub to_state: EngagementState,
    pub at: DateTime<Utc>,
    pub reason: String,
}

/// Outcome reported to the caller of an invite transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteTransitionResult {
    pub status: InviteStatus,
    pub engagement_state: EngagementState,
    pub engagement_score: u32,
    /// True when the event had already been processed.
    pub replayed: bool,
}
