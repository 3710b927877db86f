//! Crate-wide constants used by the predicate circuits and host-side orchestration.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::{find_poseidon_ark_and_mds, PoseidonConfig};
use ark_ff::PrimeField;

/// Inclusive bounds for a symptom severity score.
pub const SEVERITY_MIN: u8 = 1;
pub const SEVERITY_MAX: u8 = 10;

/// Upper bound for the target improvement percentage.
pub const MAX_IMPROVEMENT_PERCENT: u8 = 100;

/// Number of documentation fields checked by the completeness predicate.
pub const COMPLETENESS_FIELDS: usize = 5;

/// Longest treatment window accepted by the duration predicate (ten years).
pub const MAX_DURATION_DAYS: u16 = 3650;

// Bit widths used when range-constraining witnesses.
//
// Every comparison gadget requires both operands to fit in the stated width,
// so these must cover the full domain of the corresponding Rust integer type.
pub const SEVERITY_BITS: usize = 8;
pub const QUOTIENT_BITS: usize = 16;
pub const REMAINDER_BITS: usize = 7;
pub const COUNT_BITS: usize = 3;
pub const DURATION_BITS: usize = 16;
pub const COST_BITS: usize = 32;

// Width-3 Poseidon sponge over BN254::Fr. Merkle nodes absorb exactly one rate's worth.
//
// NOTE: the round constants are derived at runtime, not pinned. Pin them before any
// commitment produced here is anchored on a ledger.
pub const POSEIDON_RATE: usize = 2;
pub const POSEIDON_CAPACITY: usize = 1;
pub const POSEIDON_FULL_ROUNDS: usize = 8;
pub const POSEIDON_PARTIAL_ROUNDS: usize = 57;

/// Poseidon S-box exponent (alpha).
pub const POSEIDON_ALPHA: u64 = 5;

/// Poseidon parameters for BN254::Fr, derived from the grain LFSR with seed 0.
pub fn poseidon_config() -> PoseidonConfig<Fr> {
    let prime_bits = Fr::MODULUS_BIT_SIZE as u64;

    let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
        prime_bits,
        POSEIDON_RATE,
        POSEIDON_FULL_ROUNDS as u64,
        POSEIDON_PARTIAL_ROUNDS as u64,
        0,
    );

    PoseidonConfig::new(
        POSEIDON_FULL_ROUNDS,
        POSEIDON_PARTIAL_ROUNDS,
        POSEIDON_ALPHA,
        mds,
        ark,
        POSEIDON_RATE,
        POSEIDON_CAPACITY,
    )
}
