//! Case-study records as they enter the orchestrator.
//!
//! The payload is opaque ciphertext produced by the submitter. The clinical facts travel with
//! it only long enough to build proofs: they are never serialized, logged or stored.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use zk_proofs::constants::COMPLETENESS_FIELDS;
use zk_proofs::types::PredicateInputs;

/// Encryption scheme the submitter used for the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionScheme {
    Aes256Gcm,
    ChaCha20Poly1305,
    Custom,
}

/// Opaque encrypted payload plus the metadata needed to reference it.
#[derive(Clone, Serialize, Deserialize)]
pub struct EncryptedPayload {
    #[serde(skip)]
    pub ciphertext: Vec<u8>,
    /// IPFS CID of the stored ciphertext, when it lives off-chain.
    pub content_id: Option<String>,
    /// Hex-encoded SHA-256 of the cleartext metadata (64 chars).
    pub metadata_hash: String,
    pub scheme: EncryptionScheme,
}

impl fmt::Debug for EncryptedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedPayload")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("content_id", &self.content_id)
            .field("metadata_hash", &self.metadata_hash)
            .field("scheme", &self.scheme)
            .finish()
    }
}

impl EncryptedPayload {
    pub fn size(&self) -> u64 {
        self.ciphertext.len() as u64
    }
}

/// Cleartext clinical values, used transiently to build predicate proofs.
#[derive(Clone, Deserialize)]
pub struct ClinicalFacts {
    pub baseline_severity: u8,
    pub outcome_severity: u8,
    pub duration_days: u16,
    pub cost: u32,
    /// Presence of the documented fields: diagnosis, treatment, outcome, follow-up, consent.
    pub documented_fields: [bool; COMPLETENESS_FIELDS],
}

impl fmt::Debug for ClinicalFacts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ClinicalFacts { .. }")
    }
}

impl ClinicalFacts {
    /// Inputs for all four predicates, in [`zk_proofs::types::PredicateKind::ALL`] order.
    pub fn predicate_inputs(&self, params: &ProofParameters) -> [PredicateInputs; 4] {
        [
            PredicateInputs::Improvement {
                baseline_severity: self.baseline_severity,
                outcome_severity: self.outcome_severity,
                improvement_percent: params.improvement_percent,
            },
            PredicateInputs::DurationRange {
                duration_days: self.duration_days,
                min_days: params.min_duration_days,
                max_days: params.max_duration_days,
            },
            PredicateInputs::Completeness {
                fields: self.documented_fields,
                required: params.required_fields,
            },
            PredicateInputs::CostRange {
                cost: self.cost,
                min_cost: params.min_cost,
                max_cost: params.max_cost,
            },
        ]
    }
}

/// Public parameters the record is proven against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProofParameters {
    pub improvement_percent: u8,
    pub min_duration_days: u16,
    pub max_duration_days: u16,
    pub required_fields: u8,
    pub min_cost: u32,
    pub max_cost: u32,
}

impl Default for ProofParameters {
    fn default() -> Self {
        Self {
            improvement_percent: 20,
            min_duration_days: 1,
            max_duration_days: 365,
            required_fields: 3,
            min_cost: 1,
            max_cost: 1_000_000,
        }
    }
}

/// A case study submitted for privacy processing. Immutable once submitted.
#[derive(Clone, Debug)]
pub struct CaseStudyRecord {
    pub id: Uuid,
    pub payload: EncryptedPayload,
    pub facts: ClinicalFacts,
    pub proof_params: ProofParameters,
}

#[cfg(test)]
mod tests {
    use super::*;
    use zk_proofs::types::PredicateKind;

    fn facts() -> ClinicalFacts {
        ClinicalFacts {
            baseline_severity: 9,
            outcome_severity: 4,
            duration_days: 120,
            cost: 48_213,
            documented_fields: [true, true, true, false, true],
        }
    }

    #[test]
    fn predicate_inputs_follow_kind_order() {
        let inputs = facts().predicate_inputs(&ProofParameters::default());
        let kinds: Vec<_> = inputs.iter().map(|i| i.kind()).collect();
        assert_eq!(kinds, PredicateKind::ALL.to_vec());
        assert!(inputs.iter().all(|i| i.evaluate()));
    }

    #[test]
    fn debug_never_prints_clinical_values() {
        let rendered = format!("{:?}", facts());
        assert!(!rendered.contains("48213"));
        assert!(!rendered.contains("120"));
    }

    #[test]
    fn payload_debug_shows_length_only() {
        let payload = EncryptedPayload {
            ciphertext: vec![0xAB; 300],
            content_id: None,
            metadata_hash: "0".repeat(64),
            scheme: EncryptionScheme::Aes256Gcm,
        };
        let rendered = format!("{payload:?}");
        assert!(rendered.contains("ciphertext_len: 300"));
        assert!(!rendered.contains("171"));
    }
}
