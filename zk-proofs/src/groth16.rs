//! Groth16 prover/verifier orchestration for the predicate circuits.
//!
//! Each predicate kind has its own circuit shape and therefore its own key pair. Keys are
//! generated locally from the caller's RNG, so whoever ran setup could forge proofs. Replace
//! [`setup_keys`] with keys from a setup ceremony before trusting third-party verification.

use crate::circuit::PredicateCircuit;
use crate::types::{PredicateKind, PredicatePublic};
use ark_bn254::Bn254;
use ark_groth16::{prepare_verifying_key, Groth16, Proof, ProvingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use rand::RngCore;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZkError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("proof verification failed")]
    VerificationFailed,

    #[error("arkworks error: {0}")]
    Ark(String),
}

/// Generate a Groth16 keypair for one predicate kind.
///
/// The constraint shape only depends on the kind, so this must be run once per kind.
pub fn setup_keys(
    kind: PredicateKind,
    rng: &mut impl RngCore,
) -> Result<(ProvingKey<Bn254>, VerifyingKey<Bn254>), ZkError> {
    let circuit = PredicateCircuit::placeholder(kind);

    let pk = Groth16::<Bn254>::generate_random_parameters_with_reduction(circuit, rng)
        .map_err(|e| ZkError::Ark(format!("{e}")))?;

    let vk = pk.vk.clone();
    Ok((pk, vk))
}

/// Prove that the circuit's witness yields its public result.
pub fn prove_predicate(
    rng: &mut impl RngCore,
    pk: &ProvingKey<Bn254>,
    circuit: PredicateCircuit,
) -> Result<Proof<Bn254>, ZkError> {
    Groth16::<Bn254>::create_random_proof_with_reduction(circuit, pk, rng)
        .map_err(|e| ZkError::Ark(format!("{e}")))
}

/// Verify a predicate proof against its public parameters and claimed result.
pub fn verify_predicate_proof(
    vk: &VerifyingKey<Bn254>,
    proof: &Proof<Bn254>,
    public: &PredicatePublic,
    holds: bool,
) -> Result<(), ZkError> {
    let public_inputs = public.to_field_elems(holds);
    let pvk = prepare_verifying_key(vk);
    let ok = Groth16::<Bn254>::verify_proof(&pvk, proof, &public_inputs)
        .map_err(|e| ZkError::Ark(format!("{e}")))?;
    if !ok {
        return Err(ZkError::VerificationFailed);
    }
    Ok(())
}

/// Serialize a proving key to bytes.
pub fn serialize_pk(pk: &ProvingKey<Bn254>) -> Result<Vec<u8>, ZkError> {
    let mut out = Vec::new();
    pk.serialize_compressed(&mut out)
        .map_err(|e| ZkError::Serialization(format!("{e}")))?;
    Ok(out)
}

pub fn deserialize_pk(bytes: &[u8]) -> Result<ProvingKey<Bn254>, ZkError> {
    ProvingKey::<Bn254>::deserialize_compressed(bytes)
        .map_err(|e| ZkError::Serialization(format!("{e}")))
}

pub fn serialize_vk(vk: &VerifyingKey<Bn254>) -> Result<Vec<u8>, ZkError> {
    let mut out = Vec::new();
    vk.serialize_compressed(&mut out)
        .map_err(|e| ZkError::Serialization(format!("{e}")))?;
    Ok(out)
}

pub fn deserialize_vk(bytes: &[u8]) -> Result<VerifyingKey<Bn254>, ZkError> {
    VerifyingKey::<Bn254>::deserialize_compressed(bytes)
        .map_err(|e| ZkError::Serialization(format!("{e}")))
}

pub fn serialize_proof(proof: &Proof<Bn254>) -> Result<Vec<u8>, ZkError> {
    let mut out = Vec::new();
    proof
        .serialize_compressed(&mut out)
        .map_err(|e| ZkError::Serialization(format!("{e}")))?;
    Ok(out)
}

pub fn deserialize_proof(bytes: &[u8]) -> Result<Proof<Bn254>, ZkError> {
    Proof::<Bn254>::deserialize_compressed(bytes)
        .map_err(|e| ZkError::Serialization(format!("{e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PredicateInputs;
    use rand::rngs::OsRng;

    fn sample_inputs() -> Vec<PredicateInputs> {
        vec![
            PredicateInputs::Improvement {
                baseline_severity: 8,
                outcome_severity: 3,
                improvement_percent: 20,
            },
            PredicateInputs::DurationRange { duration_days: 90, min_days: 1, max_days: 365 },
            PredicateInputs::Completeness { fields: [true, true, false, true, false], required: 3 },
            PredicateInputs::CostRange { cost: 12_500, min_cost: 1, max_cost: 1_000_000 },
        ]
    }

    #[test]
    fn prove_and_verify_each_predicate() {
        let mut rng = OsRng;
        for inputs in sample_inputs() {
            let (pk, vk) = setup_keys(inputs.kind(), &mut rng).unwrap();
            let circuit = PredicateCircuit::from_inputs(&inputs);
            assert!(circuit.holds());

            let proof = prove_predicate(&mut rng, &pk, circuit).unwrap();
            verify_predicate_proof(&vk, &proof, &inputs.public(), true).unwrap();

            // A verifier claiming the opposite result must fail.
            assert!(verify_predicate_proof(&vk, &proof, &inputs.public(), false).is_err());
        }
    }

    #[test]
    fn proof_does_not_verify_under_other_parameters() {
        let mut rng = OsRng;
        let inputs = PredicateInputs::DurationRange { duration_days: 30, min_days: 7, max_days: 60 };
        let (pk, vk) = setup_keys(PredicateKind::DurationRange, &mut rng).unwrap();
        let proof = prove_predicate(&mut rng, &pk, PredicateCircuit::from_inputs(&inputs)).unwrap();

        let other = PredicatePublic::DurationRange { min_days: 7, max_days: 61 };
        assert!(verify_predicate_proof(&vk, &proof, &other, true).is_err());
    }

    #[test]
    fn proof_bytes_survive_serialization() {
        let mut rng = OsRng;
        let inputs = PredicateInputs::Completeness { fields: [true; 5], required: 5 };
        let (pk, vk) = setup_keys(PredicateKind::Completeness, &mut rng).unwrap();
        let proof = prove_predicate(&mut rng, &pk, PredicateCircuit::from_inputs(&inputs)).unwrap();

        let proof = deserialize_proof(&serialize_proof(&proof).unwrap()).unwrap();
        let vk = deserialize_vk(&serialize_vk(&vk).unwrap()).unwrap();
        verify_predicate_proof(&vk, &proof, &inputs.public(), true).unwrap();
    }
}
