//! Access sessions and their state machine.
//!
//! Transitions here are pure: each returns a new session with `version` bumped, leaving the
//! store to decide whether the write wins.

use crate::errors::{PrivacyError, Result};
use crate::identity::{RequesterId, ValidatorId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No approvals yet.
    Pending,
    /// Some approvals, below the threshold.
    Active,
    Approved,
    Expired,
    Rejected,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Approved | SessionStatus::Expired | SessionStatus::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Active => "active",
            SessionStatus::Approved => "approved",
            SessionStatus::Expired => "expired",
            SessionStatus::Rejected => "rejected",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeMember {
    pub validator: ValidatorId,
    pub has_approved: bool,
    pub approved_at: Option<DateTime<Utc>>,
    /// Commitment to the member's key share. Never the share itself.
    pub share_commitment: Option<String>,
}

impl CommitteeMember {
    pub fn new(validator: ValidatorId) -> Self {
        Self {
            validator,
            has_approved: false,
            approved_at: None,
            share_commitment: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub validator: ValidatorId,
    pub reason: String,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessSession {
    pub id: Uuid,
    pub record_id: Uuid,
    pub requester: RequesterId,
    pub justification: String,
    pub committee: Vec<CommitteeMember>,
    pub threshold: u32,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection: Option<Rejection>,
    /// Bumped on every write; the store only accepts a write against the version it read.
    pub version: u64,
}

impl AccessSession {
    pub fn approval_count(&self) -> u32 {
        self.committee.iter().filter(|m| m.has_approved).count() as u32
    }

    pub fn approving_members(&self) -> impl Iterator<Item = &CommitteeMember> {
        self.committee.iter().filter(|m| m.has_approved)
    }

    pub fn is_member(&self, validator: &ValidatorId) -> bool {
        self.committee.iter().any(|m| &m.validator == validator)
    }

    /// Still open but past its deadline.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && now >= self.expires_at
    }

    /// Record one approval.
    ///
    /// Approvals after the threshold is reached are still recorded until the deadline; the status
    /// stays `Approved`.
    pub fn with_approval(&self, validator: &ValidatorId, share_commitment: &str, now: DateTime<Utc>) -> Result<Self> {
        match self.status {
            SessionStatus::Expired | SessionStatus::Rejected => {
                return Err(PrivacyError::State(format!("session {} is {}", self.id, self.status.as_str())));
            }
            SessionStatus::Approved if now >= self.expires_at => {
                return Err(PrivacyError::State(format!("session {} has passed its deadline", self.id)));
            }
            _ if self.is_expired_at(now) => {
                return Err(PrivacyError::State(format!("session {} has expired", self.id)));
            }
            _ => {}
        }

        let mut next = self.clone();
        let member = next
            .committee
            .iter_mut()
            .find(|m| &m.validator == validator)
            .ok_or_else(|| PrivacyError::Unauthorized(format!("{validator} is not on the committee for session {}", self.id)))?;

        if member.has_approved {
            return Err(PrivacyError::DuplicateApproval { subject: self.id, validator: validator.clone() });
        }

        member.has_approved = true;
        member.approved_at = Some(now);
        member.share_commitment = Some(share_commitment.to_string());

        if next.status != SessionStatus::Approved {
            if next.approval_count() >= next.threshold {
                next.status = SessionStatus::Approved;
                next.approved_at = Some(now);
            } else {
                next.status = SessionStatus::Active;
            }
        }

        next.version += 1;
        Ok(next)
    }

    /// Explicit denial by a committee member. Only open sessions can be rejected.
    pub fn with_rejection(&self, validator: &ValidatorId, reason: &str, now: DateTime<Utc>) -> Result<Self> {
        if self.status.is_terminal() {
            return Err(PrivacyError::State(format!("session {} is {}", self.id, self.status.as_str())));
        }
        if self.is_expired_at(now) {
            return Err(PrivacyError::State(format!("session {} has expired", self.id)));
        }
        if !self.is_member(validator) {
            return Err(PrivacyError::Unauthorized(format!(
                "{validator} is not on the committee for session {}",
                self.id
            )));
        }

        let mut next = self.clone();
        next.status = SessionStatus::Rejected;
        next.rejection = Some(Rejection {
            validator: validator.clone(),
            reason: reason.to_string(),
            at: now,
        });
        next.version += 1;
        Ok(next)
    }

    /// The session flipped to `Expired`. Callers check [`Self::is_expired_at`] first.
    pub fn expired(&self) -> Self {
        let mut next = self.clone();
        next.status = SessionStatus::Expired;
        next.version += 1;
        next
    }
}
