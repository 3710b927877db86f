//! Submission, validation and research-access workflows over the three privacy services.
//!
//! Every workflow returns an ordered audit log. Steps that can run independently (proofs and
//! compression) run concurrently, but their log entries always appear in the documented order.
//! A failed step is recorded as `failed`, dependent steps as `skipped`, and whatever completed
//! before the failure is kept.

use crate::access::AccessControlService;
use crate::audit::{OperationKind, OperationStatus, PrivacyOperation};
use crate::compression::{CompressedCommitment, CompressionService};
use crate::errors::{PrivacyError, Result};
use crate::identity::{RequesterId, ValidatorId};
use crate::proof::{PredicateProof, ProofService};
use crate::record::{CaseStudyRecord, ClinicalFacts, EncryptedPayload, EncryptionScheme, ProofParameters};
use crate::score::{PrivacyScore, ScoreFeatures};
use crate::session::AccessSession;
use crate::store::RecordStore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;
use zk_proofs::digest::{digest_parts, fr_to_hex};
use zk_proofs::types::PredicateKind;

pub const DEFAULT_COMPRESSION_RATIO: u32 = 10;

/// Proofs a record needs on file before research access stops listing missing predicates.
pub const MIN_PROOFS_FOR_ACCESS: usize = 2;

// Consensus rules for validator votes on a record.
pub const MIN_VOTES_FOR_DECISION: u32 = 5;
pub const APPROVAL_PERCENT: u32 = 75;
pub const REJECTION_PERCENT: u32 = 25;

const CID_LEN: usize = 46;
const CID_PREFIX: &str = "Qm";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SubmissionOptions {
    pub generate_proofs: bool,
    pub compression_ratio: u32,
}

impl Default for SubmissionOptions {
    fn default() -> Self {
        Self {
            generate_proofs: true,
            compression_ratio: DEFAULT_COMPRESSION_RATIO,
        }
    }
}

/// Public view of a registered record: metadata and artifacts, never clinical values.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnhancedRecord {
    pub record_id: Uuid,
    pub content_id: Option<String>,
    pub metadata_hash: String,
    pub scheme: EncryptionScheme,
    pub proofs: Vec<PredicateProof>,
    pub commitment: CompressedCommitment,
}

#[derive(Clone, Debug, Serialize)]
pub struct SubmissionResult {
    pub success: bool,
    pub privacy_score: PrivacyScore,
    pub operations: Vec<PrivacyOperation>,
    pub enhanced_record: Option<EnhancedRecord>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vote {
    Approve,
    Reject,
    FurtherReview,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationTally {
    pub approvals: u32,
    pub rejections: u32,
    pub further_review: u32,
    /// Share of approvals among decisive votes, 0-100.
    pub reputation_score: u32,
    pub status: ValidationStatus,
}

impl ValidationTally {
    pub fn record(&mut self, vote: Vote) {
        match vote {
            Vote::Approve => self.approvals += 1,
            Vote::Reject => self.rejections += 1,
            Vote::FurtherReview => self.further_review += 1,
        }

        let decisive = self.approvals + self.rejections;
        if decisive > 0 {
            self.reputation_score = self.approvals * 100 / decisive;
        }

        if decisive >= MIN_VOTES_FOR_DECISION {
            if self.reputation_score >= APPROVAL_PERCENT {
                self.status = ValidationStatus::Approved;
            } else if self.reputation_score < REJECTION_PERCENT {
                self.status = ValidationStatus::Rejected;
            }
        }
    }
}

/// What the orchestrator retains per record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordPrivacyState {
    /// Bumped on every write; the record store compares it before replacing a state.
    pub version: u64,
    pub record: EnhancedRecord,
    pub features: ScoreFeatures,
    pub operations: Vec<PrivacyOperation>,
    pub tally: ValidationTally,
    pub votes: BTreeMap<ValidatorId, Vote>,
}

#[derive(Clone, Deserialize)]
pub struct ValidationInputs {
    pub vote: Vote,
    pub facts: ClinicalFacts,
    #[serde(default)]
    pub proof_params: ProofParameters,
    #[serde(default = "default_compression_ratio")]
    pub compression_ratio: u32,
}

fn default_compression_ratio() -> u32 {
    DEFAULT_COMPRESSION_RATIO
}

#[derive(Clone, Debug, Serialize)]
pub struct ValidationOutcome {
    pub success: bool,
    pub operations: Vec<PrivacyOperation>,
    pub proofs: Vec<PredicateProof>,
    pub commitment: Option<CompressedCommitment>,
    pub tally: ValidationTally,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RecordPrivacyStats {
    /// Predicates with a genuine, verified proof on file.
    pub proofs_on_file: Vec<PredicateKind>,
    pub compressed: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessRequirements {
    pub min_validators: u32,
    pub min_proofs: usize,
    pub compression_required: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ResearchAccessResponse {
    pub session: AccessSession,
    pub required_proofs: Vec<PredicateKind>,
    pub requirements: AccessRequirements,
}

pub struct PrivacyOrchestrator {
    proofs: ProofService,
    compression: CompressionService,
    access: AccessControlService,
    records: Arc<dyn RecordStore>,
}

impl PrivacyOrchestrator {
    pub fn new(
        proofs: ProofService,
        compression: CompressionService,
        access: AccessControlService,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            proofs,
            compression,
            access,
            records,
        }
    }

    pub fn compression(&self) -> &CompressionService {
        &self.compression
    }

    pub fn access(&self) -> &AccessControlService {
        &self.access
    }

    pub async fn submit_with_privacy(
        &self,
        record: CaseStudyRecord,
        options: SubmissionOptions,
    ) -> Result<SubmissionResult> {
        let record_id = record.id;
        if self.records.get(record_id).await?.is_some() {
            return Err(already_submitted(record_id));
        }

        let mut operations = Vec::with_capacity(3);
        let mut features = ScoreFeatures::default();

        if let Err(reason) = check_encryption(&record.payload) {
            tracing::warn!(%record_id, %reason, "encryption bookkeeping failed");
            operations.push(PrivacyOperation::new(
                OperationKind::Encryption,
                "encryption",
                OperationStatus::Failed,
                json!({ "error": reason }),
            ));
            operations.push(skipped(OperationKind::ZkProof, "proofs", "encryption failed"));
            operations.push(skipped(OperationKind::Compression, "compression", "encryption failed"));
            return Ok(SubmissionResult {
                success: false,
                privacy_score: features.score(),
                operations,
                enhanced_record: None,
            });
        }

        operations.push(PrivacyOperation::new(
            OperationKind::Encryption,
            "encryption",
            OperationStatus::Success,
            json!({
                "scheme": record.payload.scheme,
                "ciphertext_size": record.payload.size(),
                "content_id": record.payload.content_id,
            }),
        ));
        features.encryption = true;

        let proof_set = async {
            if options.generate_proofs {
                Some(self.proofs.generate_record_proof_set(&record.facts, &record.proof_params).await)
            } else {
                None
            }
        };
        let (proof_results, compressed) = tokio::join!(
            proof_set,
            self.compression.compress(record_id, &record.payload, options.compression_ratio),
        );

        let (proof_op, proofs) = match proof_results {
            Some(results) => proof_operation(results),
            None => (skipped(OperationKind::ZkProof, "proofs", "not requested"), Vec::new()),
        };
        features.proofs = proof_op.status.completed();
        let proofs_ok = proof_op.status != OperationStatus::Failed;
        operations.push(proof_op);

        let (compression_op, commitment) = compression_operation(compressed);
        features.compression = compression_op.status.completed();
        operations.push(compression_op);

        let privacy_score = features.score();

        let Some(commitment) = commitment else {
            tracing::warn!(%record_id, "compression failed, record not registered");
            return Ok(SubmissionResult {
                success: false,
                privacy_score,
                operations,
                enhanced_record: None,
            });
        };

        let enhanced = EnhancedRecord {
            record_id,
            content_id: record.payload.content_id.clone(),
            metadata_hash: record.payload.metadata_hash.clone(),
            scheme: record.payload.scheme,
            proofs,
            commitment,
        };

        let state = RecordPrivacyState {
            version: 0,
            record: enhanced.clone(),
            features,
            operations: operations.clone(),
            tally: ValidationTally::default(),
            votes: BTreeMap::new(),
        };
        if !self.records.insert(&state).await? {
            return Err(already_submitted(record_id));
        }

        tracing::info!(%record_id, score = privacy_score.score, "record registered");

        Ok(SubmissionResult {
            success: proofs_ok,
            privacy_score,
            operations,
            enhanced_record: Some(enhanced),
        })
    }

    /// Score for a registered record, including committee gating once an access session for it
    /// has been approved.
    pub async fn privacy_score(&self, record_id: Uuid) -> Result<PrivacyScore> {
        let mut features = self.record_state(record_id).await?.features;
        features.committee_gating = self.access.has_approved_session(record_id).await?;
        Ok(features.score())
    }

    pub async fn record_state(&self, record_id: Uuid) -> Result<RecordPrivacyState> {
        self.records
            .get(record_id)
            .await?
            .ok_or_else(|| PrivacyError::NotFound(format!("record {record_id}")))
    }

    pub async fn record_stats(&self, record_id: Uuid) -> Result<RecordPrivacyStats> {
        let state = self.record_state(record_id).await?;
        let proofs_on_file = state
            .record
            .proofs
            .iter()
            .filter(|p| p.verified && !p.is_degraded())
            .map(|p| p.predicate)
            .collect();

        Ok(RecordPrivacyStats {
            proofs_on_file,
            compressed: !state.record.commitment.is_simulated(),
        })
    }

    /// Record a validator's vote with the same proof and compression steps as a submission.
    ///
    /// Only validators the registry admits for the record may vote, and each of them once.
    pub async fn validate_with_privacy(
        &self,
        validator: &ValidatorId,
        record_id: Uuid,
        inputs: ValidationInputs,
    ) -> Result<ValidationOutcome> {
        let state = self.record_state(record_id).await?;
        let eligible = self.access.eligible_validators(record_id).await?;
        if !eligible.contains(validator) {
            tracing::warn!(%record_id, %validator, "vote from validator outside the registry");
            return Err(PrivacyError::Unauthorized(format!(
                "{validator} is not an eligible validator for record {record_id}"
            )));
        }
        if state.votes.contains_key(validator) {
            return Err(PrivacyError::DuplicateApproval { subject: record_id, validator: validator.clone() });
        }

        let vote_payload = vote_payload(record_id, validator, inputs.vote)?;

        let (proof_results, compressed) = tokio::join!(
            self.proofs.generate_record_proof_set(&inputs.facts, &inputs.proof_params),
            self.compression.compress(record_id, &vote_payload, inputs.compression_ratio),
        );

        let mut operations = Vec::with_capacity(3);

        let (proof_op, proofs) = proof_operation(proof_results);
        let proofs_ok = proof_op.status != OperationStatus::Failed;
        operations.push(proof_op);

        let (compression_op, commitment) = compression_operation(compressed);
        operations.push(compression_op);

        if commitment.is_none() {
            operations.push(skipped(OperationKind::Validation, "validation", "compression failed"));
            let tally = self.record_state(record_id).await?.tally;
            return Ok(ValidationOutcome {
                success: false,
                operations,
                proofs,
                commitment,
                tally,
            });
        }

        // Each lost swap is another eligible validator's vote landing.
        let mut lost = 0;
        let (tally, validation_op) = loop {
            let current = self.record_state(record_id).await?;
            if current.votes.contains_key(validator) {
                return Err(PrivacyError::DuplicateApproval { subject: record_id, validator: validator.clone() });
            }

            let mut next = current.clone();
            next.version += 1;
            next.votes.insert(validator.clone(), inputs.vote);
            next.tally.record(inputs.vote);

            let op = PrivacyOperation::new(
                OperationKind::Validation,
                "validation",
                OperationStatus::Success,
                json!({ "validator": validator, "vote": inputs.vote, "tally": next.tally }),
            );
            next.operations.extend(operations.iter().cloned());
            next.operations.push(op.clone());

            if self.records.compare_and_swap(current.version, &next).await? {
                break (next.tally, op);
            }

            lost += 1;
            if lost > eligible.len() {
                tracing::error!(%record_id, lost, "record version kept moving, giving up");
                return Err(PrivacyError::Internal);
            }
        };
        operations.push(validation_op);

        tracing::info!(
            %record_id,
            %validator,
            vote = ?inputs.vote,
            approvals = tally.approvals,
            rejections = tally.rejections,
            status = ?tally.status,
            "validation recorded"
        );

        Ok(ValidationOutcome {
            success: proofs_ok,
            operations,
            proofs,
            commitment,
            tally,
        })
    }

    pub async fn request_research_access(
        &self,
        requester: &RequesterId,
        record_id: Uuid,
        justification: &str,
        stats: &RecordPrivacyStats,
        preferred_threshold: Option<u32>,
    ) -> Result<ResearchAccessResponse> {
        let session = self
            .access
            .request_access(requester, record_id, justification, preferred_threshold)
            .await?;

        let required_proofs = if stats.proofs_on_file.len() < MIN_PROOFS_FOR_ACCESS {
            PredicateKind::ALL
                .into_iter()
                .filter(|k| !stats.proofs_on_file.contains(k))
                .collect()
        } else {
            Vec::new()
        };

        let requirements = AccessRequirements {
            min_validators: session.threshold,
            min_proofs: MIN_PROOFS_FOR_ACCESS,
            compression_required: true,
        };

        Ok(ResearchAccessResponse {
            session,
            required_proofs,
            requirements,
        })
    }
}

/// Bookkeeping checks on a payload the caller already encrypted.
fn check_encryption(payload: &EncryptedPayload) -> std::result::Result<(), String> {
    if payload.ciphertext.is_empty() {
        return Err("ciphertext is empty".to_string());
    }
    if payload.metadata_hash.len() != 64 || !payload.metadata_hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err("metadata_hash must be 64 hex characters".to_string());
    }
    if let Some(cid) = &payload.content_id {
        if cid.len() != CID_LEN || !cid.starts_with(CID_PREFIX) {
            return Err(format!("content_id must be a {CID_LEN}-character CID starting with {CID_PREFIX}"));
        }
    }
    Ok(())
}

fn already_submitted(record_id: Uuid) -> PrivacyError {
    PrivacyError::Validation(format!("record {record_id} was already submitted"))
}

fn skipped(kind: OperationKind, service: &str, reason: &str) -> PrivacyOperation {
    PrivacyOperation::new(kind, service, OperationStatus::Skipped, json!({ "reason": reason }))
}

fn proof_operation(results: Vec<Result<PredicateProof>>) -> (PrivacyOperation, Vec<PredicateProof>) {
    let mut proofs = Vec::with_capacity(results.len());
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(proof) => proofs.push(proof),
            Err(e) => errors.push(e.to_string()),
        }
    }

    let status = if !errors.is_empty() {
        OperationStatus::Failed
    } else if proofs.iter().any(|p| p.is_degraded()) {
        OperationStatus::Degraded
    } else {
        OperationStatus::Success
    };

    let summary: Vec<_> = proofs
        .iter()
        .map(|p| json!({ "predicate": p.predicate, "verified": p.verified, "degraded": p.is_degraded() }))
        .collect();

    let op = PrivacyOperation::new(
        OperationKind::ZkProof,
        "proofs",
        status,
        json!({ "proofs": summary, "errors": errors }),
    );
    (op, proofs)
}

fn compression_operation(result: Result<CompressedCommitment>) -> (PrivacyOperation, Option<CompressedCommitment>) {
    match result {
        Ok(commitment) => {
            let status = if commitment.is_simulated() {
                OperationStatus::Degraded
            } else {
                OperationStatus::Success
            };
            let op = PrivacyOperation::new(
                OperationKind::Compression,
                "compression",
                status,
                json!({
                    "original_size": commitment.original_size,
                    "compressed_size": commitment.compressed_size,
                    "achieved_ratio": commitment.achieved_ratio,
                    "error": commitment.error(),
                }),
            );
            (op, Some(commitment))
        }
        Err(e) => {
            let op = PrivacyOperation::new(
                OperationKind::Compression,
                "compression",
                OperationStatus::Failed,
                json!({ "error": e.to_string() }),
            );
            (op, None)
        }
    }
}

#[derive(Serialize)]
struct VotePayload<'a> {
    record_id: Uuid,
    validator: &'a ValidatorId,
    vote: Vote,
}

fn vote_payload(record_id: Uuid, validator: &ValidatorId, vote: Vote) -> Result<EncryptedPayload> {
    let bytes = serde_json::to_vec(&VotePayload { record_id, validator, vote }).map_err(|e| {
        tracing::error!(error = %e, "failed to encode vote");
        PrivacyError::Internal
    })?;
    let metadata_hash = fr_to_hex(&digest_parts(&[bytes.as_slice()]));

    Ok(EncryptedPayload {
        ciphertext: bytes,
        content_id: None,
        metadata_hash,
        scheme: EncryptionScheme::Custom,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_needs_five_decisive_votes() {
        let mut tally = ValidationTally::default();
        for _ in 0..4 {
            tally.record(Vote::Approve);
        }
        tally.record(Vote::FurtherReview);
        assert_eq!(tally.status, ValidationStatus::Pending);
        assert_eq!(tally.reputation_score, 100);

        tally.record(Vote::Reject);
        assert_eq!(tally.reputation_score, 80);
        assert_eq!(tally.status, ValidationStatus::Approved);
    }

    #[test]
    fn tally_rejects_below_a_quarter() {
        let mut tally = ValidationTally::default();
        tally.record(Vote::Approve);
        for _ in 0..4 {
            tally.record(Vote::Reject);
        }
        assert_eq!(tally.reputation_score, 20);
        assert_eq!(tally.status, ValidationStatus::Rejected);
    }

    #[test]
    fn tally_stays_pending_when_split() {
        let mut tally = ValidationTally::default();
        for vote in [Vote::Approve, Vote::Approve, Vote::Reject, Vote::Reject, Vote::Approve] {
            tally.record(vote);
        }
        assert_eq!(tally.reputation_score, 60);
        assert_eq!(tally.status, ValidationStatus::Pending);
    }

    fn payload() -> EncryptedPayload {
        EncryptedPayload {
            ciphertext: vec![1; 64],
            content_id: Some(format!("Qm{}", "a".repeat(44))),
            metadata_hash: "f".repeat(64),
            scheme: EncryptionScheme::ChaCha20Poly1305,
        }
    }

    #[test]
    fn encryption_bookkeeping_checks() {
        assert!(check_encryption(&payload()).is_ok());

        let mut p = payload();
        p.content_id = Some("bafy-not-a-v0-cid".to_string());
        assert!(check_encryption(&p).is_err());

        let mut p = payload();
        p.metadata_hash = "zz".repeat(32);
        assert!(check_encryption(&p).is_err());

        let mut p = payload();
        p.ciphertext.clear();
        assert!(check_encryption(&p).is_err());
    }

    #[test]
    fn vote_payload_is_custom_scheme_with_hex_hash() {
        let p = vote_payload(Uuid::new_v4(), &ValidatorId::new("v1"), Vote::Approve).unwrap();
        assert_eq!(p.scheme, EncryptionScheme::Custom);
        assert!(check_encryption(&p).is_ok());
    }
}
