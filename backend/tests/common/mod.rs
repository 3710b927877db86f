#![allow(dead_code)]

use async_trait::async_trait;
use privacy_backend::access::{AccessControlService, AccessPolicy};
use privacy_backend::compression::{
    BackendCompression, CompressionBackend, CompressionOptions, CompressionService, DEFAULT_MAX_COMPRESSION_RATIO,
};
use privacy_backend::errors::BackendError;
use privacy_backend::identity::ValidatorId;
use privacy_backend::orchestrator::PrivacyOrchestrator;
use privacy_backend::proof::{ProofService, ProverBackend};
use privacy_backend::record::{CaseStudyRecord, ClinicalFacts, EncryptedPayload, EncryptionScheme, ProofParameters};
use privacy_backend::registry::StaticValidatorRegistry;
use privacy_backend::store::{MemoryRecordStore, MemorySessionStore, RecordStore, SessionStore};
use std::sync::Arc;
use uuid::Uuid;
use zk_proofs::circuit::PredicateCircuit;
use zk_proofs::types::{PredicateInputs, PredicatePublic};

pub const JUSTIFICATION: &str =
    "Multi-site observational study of symptom improvement after twelve weeks of therapy.";

/// Prover double: the "proof" is the result bit.
pub struct FakeProver;

#[async_trait]
impl ProverBackend for FakeProver {
    async fn execute(&self, inputs: &PredicateInputs) -> Result<PredicateCircuit, BackendError> {
        Ok(PredicateCircuit::from_inputs(inputs))
    }

    async fn generate_proof(&self, witness: PredicateCircuit) -> Result<Vec<u8>, BackendError> {
        Ok(vec![witness.holds() as u8])
    }

    async fn verify_proof(&self, _public: &PredicatePublic, holds: bool, proof: &[u8]) -> Result<bool, BackendError> {
        Ok(proof == [holds as u8])
    }
}

/// Compression double returning a fixed account per record.
pub struct FakeCompressor;

#[async_trait]
impl CompressionBackend for FakeCompressor {
    async fn compress(
        &self,
        _payload: &EncryptedPayload,
        options: &CompressionOptions,
    ) -> Result<BackendCompression, BackendError> {
        Ok(BackendCompression {
            account: format!("compressed-{}", options.record_id),
            proof: vec![7; 8],
            merkle_root: "11".repeat(32),
        })
    }
}

pub fn validators(n: usize) -> Vec<ValidatorId> {
    (0..n).map(|i| ValidatorId::new(format!("validator-{i}"))).collect()
}

pub fn access_service(store: Arc<dyn SessionStore>, policy: AccessPolicy) -> AccessControlService {
    access_service_with(store, policy, 10)
}

pub fn access_service_with(store: Arc<dyn SessionStore>, policy: AccessPolicy, registry_size: usize) -> AccessControlService {
    AccessControlService::new(store, Arc::new(StaticValidatorRegistry::new(validators(registry_size))), policy)
}

/// Orchestrator with real-evidence fakes for both backends and in-memory stores.
pub fn orchestrator() -> PrivacyOrchestrator {
    orchestrator_over(Arc::new(MemorySessionStore::new()), Arc::new(MemoryRecordStore::new()))
}

pub fn orchestrator_over(sessions: Arc<dyn SessionStore>, records: Arc<dyn RecordStore>) -> PrivacyOrchestrator {
    PrivacyOrchestrator::new(
        ProofService::new(Some(Arc::new(FakeProver))),
        CompressionService::new(Some(Arc::new(FakeCompressor)), DEFAULT_MAX_COMPRESSION_RATIO),
        access_service(sessions, AccessPolicy::default()),
        records,
    )
}

pub fn facts() -> ClinicalFacts {
    ClinicalFacts {
        baseline_severity: 8,
        outcome_severity: 3,
        duration_days: 84,
        cost: 2_400,
        documented_fields: [true, true, true, true, false],
    }
}

pub fn record() -> CaseStudyRecord {
    CaseStudyRecord {
        id: Uuid::new_v4(),
        payload: EncryptedPayload {
            ciphertext: vec![0x5a; 4096],
            content_id: Some(format!("Qm{}", "x".repeat(44))),
            metadata_hash: "3f".repeat(32),
            scheme: EncryptionScheme::Aes256Gcm,
        },
        facts: facts(),
        proof_params: ProofParameters::default(),
    }
}
