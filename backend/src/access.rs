//! K-of-N committee gate in front of decryption rights.
//!
//! Every mutation follows the same shape: read the session, compute the next state with a pure
//! transition, and write it back with compare-and-swap on the session version. A lost race
//! re-reads and re-applies, so concurrent approvals never overwrite each other and exactly one
//! writer observes the transition to `Approved`.

use crate::errors::{PrivacyError, Result};
use crate::identity::{RequesterId, ValidatorId};
use crate::registry::{form_committee, ValidatorRegistry};
use crate::session::{AccessSession, CommitteeMember, SessionStatus};
use crate::store::SessionStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub const MIN_JUSTIFICATION_CHARS: usize = 50;
pub const MAX_JUSTIFICATION_CHARS: usize = 500;

/// Most successful writes a session can ever receive: one approval per member plus one flip to
/// `Rejected` or `Expired`. A lost compare-and-swap means one of them landed, so a writer that
/// has lost more often than this is facing a store that is not honouring versions.
fn write_bound(session: &AccessSession) -> usize {
    session.committee.len() + 1
}

#[derive(Clone, Debug)]
pub struct AccessPolicy {
    pub default_committee_size: usize,
    pub default_threshold: u32,
    pub session_timeout: Duration,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            default_committee_size: 5,
            default_threshold: 3,
            session_timeout: Duration::hours(24),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub validator: ValidatorId,
    pub share_commitment: String,
    pub approved_at: DateTime<Utc>,
}

/// Proof that a requester may now reconstruct the record key.
///
/// Reconstruction itself happens elsewhere, from the listed share commitments.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecryptionResult {
    pub session_id: Uuid,
    pub record_id: Uuid,
    pub requester: RequesterId,
    pub approved_at: DateTime<Utc>,
    pub approvals: Vec<ApprovalRecord>,
}

pub struct AccessControlService {
    store: Arc<dyn SessionStore>,
    registry: Arc<dyn ValidatorRegistry>,
    policy: AccessPolicy,
}

impl AccessControlService {
    pub fn new(store: Arc<dyn SessionStore>, registry: Arc<dyn ValidatorRegistry>, policy: AccessPolicy) -> Self {
        Self { store, registry, policy }
    }

    pub async fn request_access(
        &self,
        requester: &RequesterId,
        record_id: Uuid,
        justification: &str,
        preferred_threshold: Option<u32>,
    ) -> Result<AccessSession> {
        let chars = justification.chars().count();
        if chars < MIN_JUSTIFICATION_CHARS {
            return Err(PrivacyError::Validation(format!(
                "justification must be at least {MIN_JUSTIFICATION_CHARS} characters"
            )));
        }
        if chars > MAX_JUSTIFICATION_CHARS {
            return Err(PrivacyError::Validation(format!(
                "justification must be at most {MAX_JUSTIFICATION_CHARS} characters"
            )));
        }

        let threshold = preferred_threshold.unwrap_or(self.policy.default_threshold);
        if threshold == 0 {
            return Err(PrivacyError::Validation("threshold must be at least 1".to_string()));
        }
        let committee_size = (threshold as usize + 2).max(self.policy.default_committee_size);

        let id = Uuid::new_v4();
        let eligible = self.registry.eligible_validators(record_id).await?;
        let committee = form_committee(eligible, requester, committee_size, id)?;

        let now = Utc::now();
        let session = AccessSession {
            id,
            record_id,
            requester: requester.clone(),
            justification: justification.to_string(),
            committee: committee.into_iter().map(CommitteeMember::new).collect(),
            threshold,
            status: SessionStatus::Pending,
            created_at: now,
            expires_at: now + self.policy.session_timeout,
            approved_at: None,
            rejection: None,
            version: 0,
        };

        if !self.store.insert(&session).await? {
            tracing::error!(session_id = %id, "session id collision");
            return Err(PrivacyError::Internal);
        }

        tracing::info!(
            session_id = %id,
            %record_id,
            %requester,
            threshold,
            committee_size,
            "access session opened"
        );
        Ok(session)
    }

    pub async fn approve(
        &self,
        session_id: Uuid,
        validator: &ValidatorId,
        share_commitment: &str,
    ) -> Result<AccessSession> {
        if share_commitment.trim().is_empty() {
            return Err(PrivacyError::Validation("share commitment is required".to_string()));
        }

        let (before, after) = self
            .mutate(session_id, |s, now| s.with_approval(validator, share_commitment, now))
            .await?;

        tracing::info!(
            %session_id,
            %validator,
            approvals = after.approval_count(),
            threshold = after.threshold,
            "approval recorded"
        );
        if before.status != SessionStatus::Approved && after.status == SessionStatus::Approved {
            tracing::info!(%session_id, record_id = %after.record_id, "access session approved");
        }

        Ok(after)
    }

    /// Explicit denial by a committee member.
    pub async fn reject(&self, session_id: Uuid, validator: &ValidatorId, reason: &str) -> Result<AccessSession> {
        if reason.trim().is_empty() {
            return Err(PrivacyError::Validation("rejection reason is required".to_string()));
        }

        let (_, after) = self
            .mutate(session_id, |s, now| s.with_rejection(validator, reason.trim(), now))
            .await?;

        tracing::info!(%session_id, %validator, "access session rejected");
        Ok(after)
    }

    pub async fn decrypt(&self, session_id: Uuid, requester: &RequesterId) -> Result<DecryptionResult> {
        let session = self.load(session_id).await?;

        if &session.requester != requester {
            tracing::warn!(%session_id, %requester, "decrypt attempted by non-requester");
            return Err(PrivacyError::Unauthorized(format!("{requester} did not request session {session_id}")));
        }

        let now = Utc::now();
        if session.is_expired_at(now) {
            self.expire_if_due(session, now).await?;
            return Err(PrivacyError::State(format!("session {session_id} has expired")));
        }

        if session.status != SessionStatus::Approved {
            return Err(PrivacyError::State(format!(
                "session {session_id} is {} with {}/{} approvals",
                session.status.as_str(),
                session.approval_count(),
                session.threshold
            )));
        }

        let approved_at = session.approved_at.ok_or_else(|| {
            tracing::error!(%session_id, "approved session without approval time");
            PrivacyError::Internal
        })?;

        let approvals = session
            .approving_members()
            .map(|m| ApprovalRecord {
                validator: m.validator.clone(),
                share_commitment: m.share_commitment.clone().unwrap_or_default(),
                approved_at: m.approved_at.unwrap_or(approved_at),
            })
            .collect();

        tracing::info!(%session_id, %requester, "decryption rights released");

        Ok(DecryptionResult {
            session_id,
            record_id: session.record_id,
            requester: session.requester,
            approved_at,
            approvals,
        })
    }

    /// Withdraw an open request. The session is removed, not marked.
    pub async fn cancel(&self, session_id: Uuid, requester: &RequesterId) -> Result<()> {
        let mut lost = 0;
        loop {
            let session = self.load(session_id).await?;

            if &session.requester != requester {
                return Err(PrivacyError::Unauthorized(format!("{requester} did not request session {session_id}")));
            }

            let now = Utc::now();
            if session.is_expired_at(now) {
                self.expire_if_due(session, now).await?;
                return Err(PrivacyError::State(format!("session {session_id} has expired")));
            }

            if !matches!(session.status, SessionStatus::Pending | SessionStatus::Active) {
                return Err(PrivacyError::State(format!(
                    "session {session_id} is {} and cannot be cancelled",
                    session.status.as_str()
                )));
            }

            if self.store.remove_if_version(session_id, session.version).await? {
                tracing::info!(%session_id, %requester, "access session cancelled");
                return Ok(());
            }

            lost += 1;
            if lost > write_bound(&session) {
                tracing::error!(%session_id, lost, "cancel gave up after repeated version conflicts");
                return Err(PrivacyError::Internal);
            }
        }
    }

    /// Flip every past-due open session to `Expired`. Returns how many this call flipped.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut expired = 0;

        for session in self.store.list_open().await? {
            if session.is_expired_at(now) && self.expire_if_due(session, now).await? {
                expired += 1;
            }
        }

        if expired > 0 {
            tracing::info!(expired, "expired access sessions swept");
        }
        Ok(expired)
    }

    /// Current session state, with lazy expiry applied.
    pub async fn get_session(&self, session_id: Uuid) -> Result<AccessSession> {
        let session = self.load(session_id).await?;
        let now = Utc::now();
        if session.is_expired_at(now) {
            self.expire_if_due(session, now).await?;
            return self.load(session_id).await;
        }
        Ok(session)
    }

    /// Validators the registry admits for `record_id`, for votes as well as committees.
    pub async fn eligible_validators(&self, record_id: Uuid) -> Result<Vec<ValidatorId>> {
        self.registry.eligible_validators(record_id).await
    }

    pub async fn sessions_for_record(&self, record_id: Uuid) -> Result<Vec<AccessSession>> {
        self.store.list_for_record(record_id).await
    }

    pub async fn has_approved_session(&self, record_id: Uuid) -> Result<bool> {
        let sessions = self.sessions_for_record(record_id).await?;
        Ok(sessions.iter().any(|s| s.status == SessionStatus::Approved))
    }

    async fn load(&self, session_id: Uuid) -> Result<AccessSession> {
        self.store
            .get(session_id)
            .await?
            .ok_or_else(|| PrivacyError::NotFound(format!("session {session_id}")))
    }

    /// Read, transition, compare-and-swap; retried while other writers win.
    ///
    /// Returns the session as read and as written by the winning attempt.
    async fn mutate<F>(&self, session_id: Uuid, transition: F) -> Result<(AccessSession, AccessSession)>
    where
        F: Fn(&AccessSession, DateTime<Utc>) -> Result<AccessSession> + Send,
    {
        let mut lost = 0;
        loop {
            let current = self.load(session_id).await?;
            let now = Utc::now();

            if current.is_expired_at(now) {
                self.expire_if_due(current, now).await?;
                return Err(PrivacyError::State(format!("session {session_id} has expired")));
            }

            let next = transition(&current, now)?;
            if self.store.compare_and_swap(current.version, &next).await? {
                return Ok((current, next));
            }

            lost += 1;
            if lost > write_bound(&current) {
                tracing::error!(%session_id, lost, "gave up after repeated version conflicts");
                return Err(PrivacyError::Internal);
            }
            tracing::debug!(%session_id, lost, "session version conflict, retrying");
        }
    }

    /// Mark `session` expired if it is still open and past due.
    ///
    /// Returns `true` only for the writer that performed the flip.
    async fn expire_if_due(&self, mut session: AccessSession, now: DateTime<Utc>) -> Result<bool> {
        let mut lost = 0;
        loop {
            if !session.is_expired_at(now) {
                return Ok(false);
            }

            if self.store.compare_and_swap(session.version, &session.expired()).await? {
                tracing::info!(session_id = %session.id, record_id = %session.record_id, "access session expired");
                return Ok(true);
            }

            lost += 1;
            if lost > write_bound(&session) {
                tracing::error!(session_id = %session.id, lost, "expiry gave up after repeated version conflicts");
                return Err(PrivacyError::Internal);
            }

            match self.store.get(session.id).await? {
                Some(latest) => session = latest,
                None => return Ok(false),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StaticValidatorRegistry;
    use crate::store::MemorySessionStore;

    const JUSTIFICATION: &str =
        "Retrospective cohort study on treatment response in moderate chronic migraine cases.";

    fn service_with(policy: AccessPolicy, validators: usize) -> AccessControlService {
        let registry = StaticValidatorRegistry::new(
            (0..validators).map(|i| ValidatorId::new(format!("v{i}"))).collect(),
        );
        AccessControlService::new(Arc::new(MemorySessionStore::new()), Arc::new(registry), policy)
    }

    fn service() -> AccessControlService {
        service_with(AccessPolicy::default(), 8)
    }

    fn requester() -> RequesterId {
        RequesterId::new("researcher-1")
    }

    #[tokio::test]
    async fn justification_bounds_are_enforced() {
        let svc = service();
        let short = "too short";
        let long = "x".repeat(MAX_JUSTIFICATION_CHARS + 1);
        for j in [short, long.as_str()] {
            let err = svc.request_access(&requester(), Uuid::new_v4(), j, None).await.unwrap_err();
            assert!(matches!(err, PrivacyError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn justification_is_counted_and_stored_as_submitted() {
        let svc = service();
        let padded = format!("  {}  ", "j".repeat(MIN_JUSTIFICATION_CHARS));
        let s = svc.request_access(&requester(), Uuid::new_v4(), &padded, None).await.unwrap();
        assert_eq!(s.justification, padded);

        let just_short = "j".repeat(MIN_JUSTIFICATION_CHARS - 1);
        let err = svc.request_access(&requester(), Uuid::new_v4(), &just_short, None).await.unwrap_err();
        assert!(matches!(err, PrivacyError::Validation(_)));
    }

    #[tokio::test]
    async fn committee_size_covers_threshold_plus_two() {
        let svc = service();
        let s = svc.request_access(&requester(), Uuid::new_v4(), JUSTIFICATION, Some(5)).await.unwrap();
        assert_eq!(s.committee.len(), 7);
        assert_eq!(s.threshold, 5);
        assert_eq!(s.status, SessionStatus::Pending);

        let s = svc.request_access(&requester(), Uuid::new_v4(), JUSTIFICATION, None).await.unwrap();
        assert_eq!(s.committee.len(), 5);
        assert_eq!(s.threshold, 3);
        assert_eq!(s.expires_at - s.created_at, Duration::hours(24));
    }

    #[tokio::test]
    async fn zero_threshold_and_thin_registry_are_rejected() {
        let svc = service();
        let err = svc.request_access(&requester(), Uuid::new_v4(), JUSTIFICATION, Some(0)).await.unwrap_err();
        assert!(matches!(err, PrivacyError::Validation(_)));

        let thin = service_with(AccessPolicy::default(), 4);
        let err = thin.request_access(&requester(), Uuid::new_v4(), JUSTIFICATION, None).await.unwrap_err();
        assert!(matches!(err, PrivacyError::Validation(_)));
    }

    #[tokio::test]
    async fn empty_share_commitment_is_rejected() {
        let svc = service();
        let s = svc.request_access(&requester(), Uuid::new_v4(), JUSTIFICATION, None).await.unwrap();
        let member = s.committee[0].validator.clone();
        assert!(matches!(svc.approve(s.id, &member, "  ").await, Err(PrivacyError::Validation(_))));
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let svc = service();
        let id = Uuid::new_v4();
        assert!(matches!(svc.approve(id, &"v0".into(), "c").await, Err(PrivacyError::NotFound(_))));
        assert!(matches!(svc.decrypt(id, &requester()).await, Err(PrivacyError::NotFound(_))));
        assert!(matches!(svc.cancel(id, &requester()).await, Err(PrivacyError::NotFound(_))));
    }

    #[tokio::test]
    async fn only_requester_may_decrypt_or_cancel() {
        let svc = service();
        let s = svc.request_access(&requester(), Uuid::new_v4(), JUSTIFICATION, Some(1)).await.unwrap();
        svc.approve(s.id, &s.committee[0].validator, "c0").await.unwrap();

        let stranger = RequesterId::new("someone-else");
        assert!(matches!(svc.decrypt(s.id, &stranger).await, Err(PrivacyError::Unauthorized(_))));
        assert!(matches!(svc.cancel(s.id, &stranger).await, Err(PrivacyError::Unauthorized(_))));

        let result = svc.decrypt(s.id, &requester()).await.unwrap();
        assert_eq!(result.approvals.len(), 1);
        assert_eq!(result.approvals[0].share_commitment, "c0");
    }

    #[tokio::test]
    async fn cancel_removes_open_sessions_only() {
        let svc = service();
        let open = svc.request_access(&requester(), Uuid::new_v4(), JUSTIFICATION, None).await.unwrap();
        svc.cancel(open.id, &requester()).await.unwrap();
        assert!(matches!(svc.get_session(open.id).await, Err(PrivacyError::NotFound(_))));

        let done = svc.request_access(&requester(), Uuid::new_v4(), JUSTIFICATION, Some(1)).await.unwrap();
        svc.approve(done.id, &done.committee[0].validator, "c").await.unwrap();
        assert!(matches!(svc.cancel(done.id, &requester()).await, Err(PrivacyError::State(_))));
    }

    #[tokio::test]
    async fn rejection_is_terminal() {
        let svc = service();
        let s = svc.request_access(&requester(), Uuid::new_v4(), JUSTIFICATION, None).await.unwrap();
        let rejected = svc.reject(s.id, &s.committee[1].validator, "scope too broad").await.unwrap();
        assert_eq!(rejected.status, SessionStatus::Rejected);

        let err = svc.approve(s.id, &s.committee[0].validator, "c").await.unwrap_err();
        assert!(matches!(err, PrivacyError::State(_)));
        assert!(matches!(svc.decrypt(s.id, &requester()).await, Err(PrivacyError::State(_))));
    }

    #[tokio::test]
    async fn late_approval_flips_session_to_expired() {
        let policy = AccessPolicy { session_timeout: Duration::zero(), ..AccessPolicy::default() };
        let svc = service_with(policy, 8);
        let s = svc.request_access(&requester(), Uuid::new_v4(), JUSTIFICATION, None).await.unwrap();

        let err = svc.approve(s.id, &s.committee[0].validator, "c").await.unwrap_err();
        assert!(matches!(err, PrivacyError::State(_)));
        assert_eq!(svc.get_session(s.id).await.unwrap().status, SessionStatus::Expired);
        assert_eq!(svc.sweep_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn approved_sessions_are_not_swept() {
        let svc = service();
        let s = svc.request_access(&requester(), Uuid::new_v4(), JUSTIFICATION, Some(1)).await.unwrap();
        svc.approve(s.id, &s.committee[0].validator, "c").await.unwrap();
        assert_eq!(svc.sweep_expired().await.unwrap(), 0);
        assert!(svc.has_approved_session(s.record_id).await.unwrap());
    }
}
