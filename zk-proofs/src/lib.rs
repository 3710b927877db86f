//! ZK layer for the privacy-preserving case-study ledger.
//!
//! - [`circuit`]: R1CS circuits for the four case-study predicates over private clinical values.
//! - [`groth16`]: per-predicate key setup, proving and verification.
//! - [`digest`]: Poseidon digests used for commitments and integrity checks.

pub mod constants;
pub mod circuit;
pub mod digest;
pub mod groth16;
pub mod types;
