//! 0-100 privacy score over the protections applied to a record.

use serde::{Deserialize, Serialize};

pub const ENCRYPTION_WEIGHT: u32 = 20;
pub const PROOFS_WEIGHT: u32 = 30;
pub const COMPRESSION_WEIGHT: u32 = 20;
pub const COMMITTEE_GATING_WEIGHT: u32 = 30;

pub const MAX_SCORE: u32 = 100;

/// Which protections were actually exercised for a record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreFeatures {
    pub encryption: bool,
    pub proofs: bool,
    pub compression: bool,
    /// An access session for the record reached `Approved`.
    pub committee_gating: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyScore {
    pub score: u32,
    pub features: ScoreFeatures,
}

impl ScoreFeatures {
    pub fn score(self) -> PrivacyScore {
        let weighted = [
            (self.encryption, ENCRYPTION_WEIGHT),
            (self.proofs, PROOFS_WEIGHT),
            (self.compression, COMPRESSION_WEIGHT),
            (self.committee_gating, COMMITTEE_GATING_WEIGHT),
        ];
        let score = weighted
            .iter()
            .filter(|(on, _)| *on)
            .map(|(_, w)| w)
            .sum::<u32>()
            .min(MAX_SCORE);

        PrivacyScore { score, features: self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_add_up() {
        let base = ScoreFeatures { encryption: true, proofs: true, compression: true, committee_gating: false };
        assert_eq!(base.score().score, 70);
        assert_eq!(ScoreFeatures { committee_gating: true, ..base }.score().score, 100);
        assert_eq!(ScoreFeatures { proofs: false, ..base }.score().score, 40);
        assert_eq!(ScoreFeatures::default().score().score, 0);
    }
}
