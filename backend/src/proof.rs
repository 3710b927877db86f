//! Predicate proofs over private clinical values.
//!
//! `ProofService` validates inputs, hands them to a [`ProverBackend`], and falls back to a
//! natively evaluated, clearly labelled simulated result when no backend can produce a proof.

use crate::errors::{BackendError, PrivacyError, Result};
use crate::record::{ClinicalFacts, ProofParameters};
use ark_bn254::Bn254;
use ark_groth16::{ProvingKey, VerifyingKey};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use zk_proofs::circuit::PredicateCircuit;
use zk_proofs::constants::{MAX_DURATION_DAYS, MAX_IMPROVEMENT_PERCENT, SEVERITY_MAX, SEVERITY_MIN};
use zk_proofs::groth16::{
    deserialize_pk, deserialize_proof, deserialize_vk, prove_predicate, serialize_pk, serialize_proof,
    serialize_vk, setup_keys, verify_predicate_proof, ZkError,
};
use zk_proofs::types::{PredicateInputs, PredicateKind, PredicatePublic};

/// What backs a proof's `verified` flag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProofEvidence {
    /// A zero-knowledge proof a third party can check against the public parameters.
    Real { proof_b64: String },
    /// No proof exists; `verified` was evaluated locally over the cleartext inputs.
    Simulated { reason: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PredicateProof {
    pub predicate: PredicateKind,
    pub public_params: PredicatePublic,
    pub verified: bool,
    pub evidence: ProofEvidence,
    pub generated_at: DateTime<Utc>,
}

impl PredicateProof {
    pub fn is_degraded(&self) -> bool {
        matches!(self.evidence, ProofEvidence::Simulated { .. })
    }
}

/// External prover, one circuit per predicate kind.
#[async_trait]
pub trait ProverBackend: Send + Sync {
    /// Assign the witness for `inputs`.
    async fn execute(&self, inputs: &PredicateInputs) -> std::result::Result<PredicateCircuit, BackendError>;

    /// Produce opaque proof bytes for an assigned witness.
    async fn generate_proof(&self, witness: PredicateCircuit) -> std::result::Result<Vec<u8>, BackendError>;

    /// Check `proof` against the public parameters and claimed result.
    async fn verify_proof(
        &self,
        public: &PredicatePublic,
        holds: bool,
        proof: &[u8],
    ) -> std::result::Result<bool, BackendError>;
}

#[derive(Clone)]
pub struct PredicateKeys {
    pub pk: Arc<ProvingKey<Bn254>>,
    pub vk: Arc<VerifyingKey<Bn254>>,
}

/// Groth16 over BN254 with keys generated per predicate on first use.
pub struct Groth16Prover {
    keys_dir: Option<PathBuf>,
    keys: [OnceCell<PredicateKeys>; 4],
}

impl Groth16Prover {
    /// `keys_dir` caches keys across restarts; `None` keeps them in memory only.
    pub fn new(keys_dir: Option<PathBuf>) -> Self {
        Self {
            keys_dir,
            keys: std::array::from_fn(|_| OnceCell::new()),
        }
    }

    /// Keys for `kind`, loaded from the cache directory or generated on first use.
    pub async fn ensure_keys(&self, kind: PredicateKind) -> std::result::Result<PredicateKeys, BackendError> {
        let keys_dir = self.keys_dir.clone();

        self.keys[kind.index()]
            .get_or_try_init(|| async move {
                match tokio::task::spawn_blocking(move || load_or_setup_keys(kind, keys_dir)).await {
                    Ok(keys) => keys,
                    Err(e) => Err(BackendError::Failed(format!("key setup task: {e}"))),
                }
            })
            .await
            .cloned()
    }
}

fn load_or_setup_keys(
    kind: PredicateKind,
    keys_dir: Option<PathBuf>,
) -> std::result::Result<PredicateKeys, BackendError> {
    let io = |e: std::io::Error| BackendError::Failed(format!("key cache: {e}"));

    let paths = match &keys_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(io)?;
            Some((dir.join(format!("{kind}_pk.bin")), dir.join(format!("{kind}_vk.bin"))))
        }
        None => None,
    };

    if let Some((pk_path, vk_path)) = &paths {
        if pk_path.exists() && vk_path.exists() {
            let pk = deserialize_pk(&std::fs::read(pk_path).map_err(io)?)?;
            let vk = deserialize_vk(&std::fs::read(vk_path).map_err(io)?)?;
            tracing::debug!(predicate = %kind, "loaded cached proving keys");
            return Ok(PredicateKeys { pk: Arc::new(pk), vk: Arc::new(vk) });
        }
    }

    // Local setup: whoever holds this RNG's output can forge proofs for `kind`.
    let mut rng = OsRng;
    let (pk, vk) = setup_keys(kind, &mut rng)?;
    tracing::info!(predicate = %kind, "generated proving keys");

    if let Some((pk_path, vk_path)) = &paths {
        std::fs::write(pk_path, serialize_pk(&pk)?).map_err(io)?;
        std::fs::write(vk_path, serialize_vk(&vk)?).map_err(io)?;
    }

    Ok(PredicateKeys { pk: Arc::new(pk), vk: Arc::new(vk) })
}

#[async_trait]
impl ProverBackend for Groth16Prover {
    async fn execute(&self, inputs: &PredicateInputs) -> std::result::Result<PredicateCircuit, BackendError> {
        Ok(PredicateCircuit::from_inputs(inputs))
    }

    async fn generate_proof(&self, witness: PredicateCircuit) -> std::result::Result<Vec<u8>, BackendError> {
        let keys = self.ensure_keys(witness.kind()).await?;

        tokio::task::spawn_blocking(move || -> std::result::Result<Vec<u8>, BackendError> {
            let mut rng = OsRng;
            let proof = prove_predicate(&mut rng, &keys.pk, witness)?;
            Ok(serialize_proof(&proof)?)
        })
        .await
        .map_err(|e| BackendError::Failed(format!("proving task: {e}")))?
    }

    async fn verify_proof(
        &self,
        public: &PredicatePublic,
        holds: bool,
        proof: &[u8],
    ) -> std::result::Result<bool, BackendError> {
        let keys = self.ensure_keys(public.kind()).await?;
        let proof = deserialize_proof(proof)?;

        match verify_predicate_proof(&keys.vk, &proof, public, holds) {
            Ok(()) => Ok(true),
            Err(ZkError::VerificationFailed) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Range checks applied before any backend sees the inputs.
pub fn validate_inputs(inputs: &PredicateInputs) -> Result<()> {
    let invalid = |msg: String| Err(PrivacyError::Validation(msg));

    match *inputs {
        PredicateInputs::Improvement {
            baseline_severity,
            outcome_severity,
            improvement_percent,
        } => {
            let severity = SEVERITY_MIN..=SEVERITY_MAX;
            if !severity.contains(&baseline_severity) || !severity.contains(&outcome_severity) {
                return invalid(format!("severity must be between {SEVERITY_MIN} and {SEVERITY_MAX}"));
            }
            if improvement_percent > MAX_IMPROVEMENT_PERCENT {
                return invalid(format!("improvement_percent must be at most {MAX_IMPROVEMENT_PERCENT}"));
            }
        }
        PredicateInputs::DurationRange { min_days, max_days, .. } => {
            if min_days > max_days {
                return invalid("min_duration_days must not exceed max_duration_days".to_string());
            }
            if max_days > MAX_DURATION_DAYS {
                return invalid(format!("max_duration_days must be at most {MAX_DURATION_DAYS}"));
            }
        }
        PredicateInputs::Completeness { fields, required } => {
            if required as usize > fields.len() {
                return invalid(format!("required_fields must be at most {}", fields.len()));
            }
        }
        PredicateInputs::CostRange { min_cost, max_cost, .. } => {
            if min_cost > max_cost {
                return invalid("min_cost must not exceed max_cost".to_string());
            }
        }
    }

    Ok(())
}

pub struct ProofService {
    backend: Option<Arc<dyn ProverBackend>>,
}

impl ProofService {
    pub fn new(backend: Option<Arc<dyn ProverBackend>>) -> Self {
        Self { backend }
    }

    /// Prove one predicate.
    ///
    /// Invalid inputs are rejected up front. Backend failures degrade to a simulated proof.
    pub async fn generate_proof(&self, inputs: &PredicateInputs) -> Result<PredicateProof> {
        validate_inputs(inputs)?;

        let predicate = inputs.kind();
        let public_params = inputs.public();

        let (verified, evidence) = match self.prove(inputs, &public_params).await {
            Ok((verified, bytes)) => {
                let proof_b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
                (verified, ProofEvidence::Real { proof_b64 })
            }
            Err(e) => {
                tracing::warn!(%predicate, error = %e, "prover unavailable, falling back to simulated proof");
                let reason = PrivacyError::from(e).to_string();
                (inputs.evaluate(), ProofEvidence::Simulated { reason })
            }
        };

        tracing::debug!(%predicate, verified, degraded = matches!(evidence, ProofEvidence::Simulated { .. }), "predicate proof generated");

        Ok(PredicateProof {
            predicate,
            public_params,
            verified,
            evidence,
            generated_at: Utc::now(),
        })
    }

    async fn prove(
        &self,
        inputs: &PredicateInputs,
        public: &PredicatePublic,
    ) -> std::result::Result<(bool, Vec<u8>), BackendError> {
        let backend = self.backend.as_ref().ok_or(BackendError::NotConfigured)?;

        let witness = backend.execute(inputs).await?;
        let bytes = backend.generate_proof(witness).await?;
        // A proof of a false predicate is still a valid proof, just not of `holds == true`.
        let verified = backend.verify_proof(public, true, &bytes).await?;
        Ok((verified, bytes))
    }

    /// Prove all four predicates for a record concurrently.
    ///
    /// Results are in [`PredicateKind::ALL`] order.
    pub async fn generate_record_proof_set(
        &self,
        facts: &ClinicalFacts,
        params: &ProofParameters,
    ) -> Vec<Result<PredicateProof>> {
        let [improvement, duration, completeness, cost] = facts.predicate_inputs(params);

        let (improvement, duration, completeness, cost) = tokio::join!(
            self.generate_proof(&improvement),
            self.generate_proof(&duration),
            self.generate_proof(&completeness),
            self.generate_proof(&cost),
        );

        vec![improvement, duration, completeness, cost]
    }

    /// Re-check a proof as a third party would.
    ///
    /// Simulated proofs never verify, whatever their `verified` flag says.
    pub async fn verify(&self, proof: &PredicateProof) -> bool {
        let ProofEvidence::Real { proof_b64 } = &proof.evidence else {
            return false;
        };
        let Some(backend) = &self.backend else {
            return false;
        };
        let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(proof_b64) else {
            return false;
        };

        match backend.verify_proof(&proof.public_params, true, &bytes).await {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!(predicate = %proof.predicate, error = %e, "proof verification unavailable");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fake backend: "proves" by encoding the result bit.
    #[derive(Default)]
    struct FakeProver {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProverBackend for FakeProver {
        async fn execute(&self, inputs: &PredicateInputs) -> std::result::Result<PredicateCircuit, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PredicateCircuit::from_inputs(inputs))
        }

        async fn generate_proof(&self, witness: PredicateCircuit) -> std::result::Result<Vec<u8>, BackendError> {
            Ok(vec![witness.holds() as u8])
        }

        async fn verify_proof(
            &self,
            _public: &PredicatePublic,
            holds: bool,
            proof: &[u8],
        ) -> std::result::Result<bool, BackendError> {
            Ok(proof == [holds as u8])
        }
    }

    struct BrokenProver;

    #[async_trait]
    impl ProverBackend for BrokenProver {
        async fn execute(&self, _inputs: &PredicateInputs) -> std::result::Result<PredicateCircuit, BackendError> {
            Err(BackendError::Failed("artifact missing".to_string()))
        }

        async fn generate_proof(&self, _witness: PredicateCircuit) -> std::result::Result<Vec<u8>, BackendError> {
            unreachable!()
        }

        async fn verify_proof(
            &self,
            _public: &PredicatePublic,
            _holds: bool,
            _proof: &[u8],
        ) -> std::result::Result<bool, BackendError> {
            Err(BackendError::Failed("artifact missing".to_string()))
        }
    }

    fn improvement(b: u8, o: u8, p: u8) -> PredicateInputs {
        PredicateInputs::Improvement {
            baseline_severity: b,
            outcome_severity: o,
            improvement_percent: p,
        }
    }

    #[tokio::test]
    async fn out_of_range_severity_never_reaches_backend() {
        let fake = Arc::new(FakeProver::default());
        let service = ProofService::new(Some(fake.clone()));

        for inputs in [improvement(0, 3, 10), improvement(11, 3, 10), improvement(5, 3, 101)] {
            let err = service.generate_proof(&inputs).await.unwrap_err();
            assert!(matches!(err, PrivacyError::Validation(_)));
        }
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn inverted_ranges_are_rejected() {
        let service = ProofService::new(None);
        let duration = PredicateInputs::DurationRange { duration_days: 10, min_days: 30, max_days: 7 };
        let cost = PredicateInputs::CostRange { cost: 10, min_cost: 100, max_cost: 1 };
        let long = PredicateInputs::DurationRange { duration_days: 10, min_days: 1, max_days: 4000 };
        let fields = PredicateInputs::Completeness { fields: [true; 5], required: 6 };

        for inputs in [duration, cost, long, fields] {
            assert!(matches!(service.generate_proof(&inputs).await, Err(PrivacyError::Validation(_))));
        }
    }

    #[tokio::test]
    async fn real_backend_produces_real_evidence() {
        let service = ProofService::new(Some(Arc::new(FakeProver::default())));

        let proof = service.generate_proof(&improvement(8, 2, 50)).await.unwrap();
        assert!(proof.verified);
        assert!(!proof.is_degraded());
        assert!(service.verify(&proof).await);

        let failing = service.generate_proof(&improvement(8, 7, 50)).await.unwrap();
        assert!(!failing.verified);
        assert!(!service.verify(&failing).await);
    }

    #[tokio::test]
    async fn missing_backend_degrades_to_simulated() {
        let service = ProofService::new(None);
        let proof = service.generate_proof(&improvement(8, 2, 50)).await.unwrap();

        assert!(proof.verified);
        assert!(proof.is_degraded());
        assert!(!service.verify(&proof).await);
    }

    #[tokio::test]
    async fn failing_backend_degrades_with_reason() {
        let service = ProofService::new(Some(Arc::new(BrokenProver)));
        let proof = service.generate_proof(&improvement(8, 7, 50)).await.unwrap();

        assert!(!proof.verified);
        match &proof.evidence {
            ProofEvidence::Simulated { reason } => {
                assert!(reason.starts_with("backend unavailable"));
                assert!(reason.contains("artifact missing"));
            }
            other => panic!("expected simulated evidence, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn simulated_proof_cannot_be_upgraded_by_tampering_flag() {
        let service = ProofService::new(Some(Arc::new(FakeProver::default())));
        let mut proof = ProofService::new(None).generate_proof(&improvement(8, 7, 50)).await.unwrap();
        proof.verified = true;
        assert!(!service.verify(&proof).await);
    }

    #[tokio::test]
    async fn record_proof_set_returns_all_four_in_order() {
        let service = ProofService::new(Some(Arc::new(FakeProver::default())));
        let facts = ClinicalFacts {
            baseline_severity: 7,
            outcome_severity: 3,
            duration_days: 0,
            cost: 900,
            documented_fields: [true, true, false, false, false],
        };

        let set = service.generate_record_proof_set(&facts, &ProofParameters::default()).await;
        let kinds: Vec<_> = set.iter().map(|r| r.as_ref().unwrap().predicate).collect();
        assert_eq!(kinds, PredicateKind::ALL.to_vec());

        let verified: Vec<_> = set.iter().map(|r| r.as_ref().unwrap().verified).collect();
        assert_eq!(verified, vec![true, false, false, true]);
    }

    #[tokio::test]
    async fn invalid_member_of_proof_set_does_not_sink_the_others() {
        let service = ProofService::new(None);
        let facts = ClinicalFacts {
            baseline_severity: 12,
            outcome_severity: 3,
            duration_days: 30,
            cost: 900,
            documented_fields: [true; 5],
        };

        let set = service.generate_record_proof_set(&facts, &ProofParameters::default()).await;
        assert!(matches!(set[0], Err(PrivacyError::Validation(_))));
        assert!(set[1..].iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn groth16_prover_proves_and_caches_keys() {
        let dir = tempfile::tempdir().unwrap();
        let keys_dir = dir.path().join("keys");
        let prover = Arc::new(Groth16Prover::new(Some(keys_dir.clone())));
        let service = ProofService::new(Some(prover));

        let inputs = PredicateInputs::Completeness { fields: [true, true, true, false, false], required: 3 };
        let proof = service.generate_proof(&inputs).await.unwrap();
        assert!(proof.verified);
        assert!(!proof.is_degraded());

        assert!(keys_dir.join("completeness_pk.bin").exists());
        assert!(keys_dir.join("completeness_vk.bin").exists());

        // A fresh prover loads the cached keys and accepts the earlier proof.
        let reloaded = ProofService::new(Some(Arc::new(Groth16Prover::new(Some(keys_dir)))));
        assert!(reloaded.verify(&proof).await);
    }
}
