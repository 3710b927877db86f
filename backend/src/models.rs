use crate::audit::PrivacyOperation;
use crate::compression::CompressionEstimate;
use crate::identity::{RequesterId, ValidatorId};
use crate::orchestrator::{
    EnhancedRecord, PrivacyOrchestrator, RecordPrivacyStats, SubmissionOptions, ValidationInputs, ValidationTally,
};
use crate::record::{ClinicalFacts, EncryptionScheme, ProofParameters};
use crate::score::PrivacyScore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Deserialize)]
pub struct SubmitRecordRequest {
    /// Caller-chosen id; a fresh one is assigned when absent.
    pub record_id: Option<Uuid>,
    /// Ciphertext produced by the submitter, base64 (standard alphabet).
    pub ciphertext_b64: String,
    pub content_id: Option<String>,
    pub metadata_hash: String,
    pub scheme: EncryptionScheme,
    /// Used only to build proofs; never stored or echoed back.
    pub facts: ClinicalFacts,
    #[serde(default)]
    pub proof_params: ProofParameters,
    #[serde(default)]
    pub options: SubmissionOptions,
}

#[derive(Debug, Serialize)]
pub struct RecordPrivacyResponse {
    pub record_id: Uuid,
    pub privacy_score: PrivacyScore,
    pub stats: RecordPrivacyStats,
    pub record: EnhancedRecord,
    pub tally: ValidationTally,
    pub operations: Vec<PrivacyOperation>,
}

impl RecordPrivacyResponse {
    pub async fn load(orchestrator: &PrivacyOrchestrator, record_id: Uuid) -> crate::errors::Result<Self> {
        let state = orchestrator.record_state(record_id).await?;
        Ok(Self {
            record_id,
            privacy_score: orchestrator.privacy_score(record_id).await?,
            stats: orchestrator.record_stats(record_id).await?,
            record: state.record,
            tally: state.tally,
            operations: state.operations,
        })
    }
}

#[derive(Deserialize)]
pub struct ValidationRequest {
    pub validator: ValidatorId,
    #[serde(flatten)]
    pub inputs: ValidationInputs,
}

#[derive(Debug, Deserialize)]
pub struct AccessRequest {
    pub requester: RequesterId,
    pub record_id: Uuid,
    pub justification: String,
    pub threshold: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub validator: ValidatorId,
    pub share_commitment: String,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub validator: ValidatorId,
    pub reason: String,
}

/// Body for requester-only actions (decrypt, cancel).
#[derive(Debug, Deserialize)]
pub struct RequesterRequest {
    pub requester: RequesterId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub session_id: Uuid,
    pub cancelled: bool,
}

#[derive(Debug, Deserialize)]
pub struct EstimateRequest {
    pub size_bytes: u64,
    pub ratio: u32,
}

#[derive(Debug, Serialize)]
pub struct EstimateResponse {
    #[serde(flatten)]
    pub estimate: CompressionEstimate,
    pub max_ratio: u32,
}
