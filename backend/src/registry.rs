//! Committee formation from a registry of eligible validators.

use crate::errors::{PrivacyError, Result};
use crate::identity::{RequesterId, ValidatorId};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use uuid::Uuid;

/// Source of validators eligible to sit on a record's committee.
///
/// Staking, reputation and any other eligibility rules live behind this trait.
#[async_trait]
pub trait ValidatorRegistry: Send + Sync {
    async fn eligible_validators(&self, record_id: Uuid) -> Result<Vec<ValidatorId>>;
}

/// Fixed validator set, the same for every record.
pub struct StaticValidatorRegistry {
    validators: Vec<ValidatorId>,
}

impl StaticValidatorRegistry {
    pub fn new(validators: Vec<ValidatorId>) -> Self {
        Self { validators }
    }
}

#[async_trait]
impl ValidatorRegistry for StaticValidatorRegistry {
    async fn eligible_validators(&self, _record_id: Uuid) -> Result<Vec<ValidatorId>> {
        Ok(self.validators.clone())
    }
}

/// Derive the committee shuffle seed from the session id.
///
/// The same session always draws the same committee from the same eligible set.
pub fn committee_seed(session_id: Uuid) -> [u8; 32] {
    let mut seed = [0u8; 32];
    seed[..16].copy_from_slice(session_id.as_bytes());
    seed[16..].copy_from_slice(b"access-committee");
    seed
}

/// Pick `size` distinct validators, never the requester.
pub fn form_committee(
    mut eligible: Vec<ValidatorId>,
    requester: &RequesterId,
    size: usize,
    session_id: Uuid,
) -> Result<Vec<ValidatorId>> {
    eligible.sort();
    eligible.dedup();
    eligible.retain(|v| v.as_str() != requester.as_str());

    if eligible.len() < size {
        return Err(PrivacyError::Validation(format!(
            "committee needs {size} validators, only {} eligible",
            eligible.len()
        )));
    }

    let mut rng = ChaCha20Rng::from_seed(committee_seed(session_id));
    eligible.shuffle(&mut rng);
    eligible.truncate(size);
    Ok(eligible)
}
