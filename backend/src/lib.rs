//! Privacy layer for the case-study ledger.
//!
//! Four services, leaves first:
//! - [`proof::ProofService`]: predicate proofs over private clinical values.
//! - [`compression::CompressionService`]: compact commitments to encrypted payloads.
//! - [`access::AccessControlService`]: K-of-N committee sessions gating decryption.
//! - [`orchestrator::PrivacyOrchestrator`]: submission, validation and research-access workflows.
//!
//! The HTTP surface in [`api`] exposes them to the outside world.

pub mod access;
pub mod api;
pub mod audit;
pub mod compression;
pub mod config;
pub mod db;
pub mod errors;
pub mod identity;
pub mod models;
pub mod orchestrator;
pub mod proof;
pub mod record;
pub mod registry;
pub mod score;
pub mod session;
pub mod state;
pub mod store;
