//! Types shared between the predicate circuits and the host-side prover/verifier.

use crate::constants::COMPLETENESS_FIELDS;
use ark_bn254::Fr;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The four fixed predicates a case study can be proven against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateKind {
    Improvement,
    DurationRange,
    Completeness,
    CostRange,
}

impl PredicateKind {
    pub const ALL: [PredicateKind; 4] = [
        PredicateKind::Improvement,
        PredicateKind::DurationRange,
        PredicateKind::Completeness,
        PredicateKind::CostRange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PredicateKind::Improvement => "improvement",
            PredicateKind::DurationRange => "duration_range",
            PredicateKind::Completeness => "completeness",
            PredicateKind::CostRange => "cost_range",
        }
    }

    /// Position in [`PredicateKind::ALL`].
    pub fn index(&self) -> usize {
        match self {
            PredicateKind::Improvement => 0,
            PredicateKind::DurationRange => 1,
            PredicateKind::Completeness => 2,
            PredicateKind::CostRange => 3,
        }
    }
}

impl fmt::Display for PredicateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Private values plus public parameters for a single predicate.
///
/// Deliberately not `Serialize`: these values only exist while a proof is being built.
#[derive(Clone)]
pub enum PredicateInputs {
    Improvement {
        baseline_severity: u8,
        outcome_severity: u8,
        improvement_percent: u8,
    },
    DurationRange {
        duration_days: u16,
        min_days: u16,
        max_days: u16,
    },
    Completeness {
        fields: [bool; COMPLETENESS_FIELDS],
        required: u8,
    },
    CostRange {
        cost: u32,
        min_cost: u32,
        max_cost: u32,
    },
}

impl fmt::Debug for PredicateInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateInputs")
            .field("kind", &self.kind())
            .field("public", &self.public())
            .finish_non_exhaustive()
    }
}

impl PredicateInputs {
    pub fn kind(&self) -> PredicateKind {
        match self {
            PredicateInputs::Improvement { .. } => PredicateKind::Improvement,
            PredicateInputs::DurationRange { .. } => PredicateKind::DurationRange,
            PredicateInputs::Completeness { .. } => PredicateKind::Completeness,
            PredicateInputs::CostRange { .. } => PredicateKind::CostRange,
        }
    }

    /// The parameters a verifier sees.
    pub fn public(&self) -> PredicatePublic {
        match *self {
            PredicateInputs::Improvement { improvement_percent, .. } => {
                PredicatePublic::Improvement { improvement_percent }
            }
            PredicateInputs::DurationRange { min_days, max_days, .. } => {
                PredicatePublic::DurationRange { min_days, max_days }
            }
            PredicateInputs::Completeness { required, .. } => PredicatePublic::Completeness { required },
            PredicateInputs::CostRange { min_cost, max_cost, .. } => {
                PredicatePublic::CostRange { min_cost, max_cost }
            }
        }
    }

    /// Evaluate the predicate natively.
    ///
    /// This MUST match the circuit's logic.
    pub fn evaluate(&self) -> bool {
        match *self {
            PredicateInputs::Improvement {
                baseline_severity,
                outcome_severity,
                improvement_percent,
            } => improvement_holds(
                baseline_severity as u64,
                outcome_severity as u64,
                improvement_percent as u64,
            ),
            PredicateInputs::DurationRange { duration_days, min_days, max_days } => {
                bounded_holds(duration_days as u64, min_days as u64, max_days as u64)
            }
            PredicateInputs::Completeness { fields, required } => completeness_holds(&fields, required as u64),
            PredicateInputs::CostRange { cost, min_cost, max_cost } => {
                bounded_holds(cost as u64, min_cost as u64, max_cost as u64)
            }
        }
    }
}

/// Public parameters of a predicate proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PredicatePublic {
    Improvement { improvement_percent: u8 },
    DurationRange { min_days: u16, max_days: u16 },
    Completeness { required: u8 },
    CostRange { min_cost: u32, max_cost: u32 },
}

impl PredicatePublic {
    pub fn kind(&self) -> PredicateKind {
        match self {
            PredicatePublic::Improvement { .. } => PredicateKind::Improvement,
            PredicatePublic::DurationRange { .. } => PredicateKind::DurationRange,
            PredicatePublic::Completeness { .. } => PredicateKind::Completeness,
            PredicatePublic::CostRange { .. } => PredicateKind::CostRange,
        }
    }

    /// Public-input vector expected by Groth16.
    ///
    /// ORDERING MUST MATCH the circuits' `new_input` allocation order:
    /// parameters first, then the predicate result.
    pub fn to_field_elems(&self, holds: bool) -> Vec<Fr> {
        let mut v = match *self {
            PredicatePublic::Improvement { improvement_percent } => vec![Fr::from(improvement_percent as u64)],
            PredicatePublic::DurationRange { min_days, max_days } => {
                vec![Fr::from(min_days as u64), Fr::from(max_days as u64)]
            }
            PredicatePublic::Completeness { required } => vec![Fr::from(required as u64)],
            PredicatePublic::CostRange { min_cost, max_cost } => {
                vec![Fr::from(min_cost as u64), Fr::from(max_cost as u64)]
            }
        };
        v.push(Fr::from(holds as u64));
        v
    }
}

/// `max(0, b - o) >= max(1, floor(b * p / 100))`
pub fn improvement_holds(baseline: u64, outcome: u64, percent: u64) -> bool {
    let improvement = baseline.saturating_sub(outcome);
    let required = (baseline * percent / 100).max(1);
    improvement >= required
}

/// `v > 0 && min <= v <= max`
pub fn bounded_holds(value: u64, min: u64, max: u64) -> bool {
    value > 0 && min <= value && value <= max
}

/// `count(true) >= required`
pub fn completeness_holds(fields: &[bool], required: u64) -> bool {
    fields.iter().filter(|f| **f).count() as u64 >= required
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn improvement_requires_at_least_one_point() {
        // 3 * 10 / 100 == 0, raised to 1.
        assert!(improvement_holds(3, 2, 10));
        assert!(!improvement_holds(3, 3, 0));
        assert!(!improvement_holds(1, 1, 0));
    }

    #[test]
    fn improvement_threshold_is_floored() {
        // 10 * 50 / 100 == 5
        assert!(improvement_holds(10, 5, 50));
        assert!(!improvement_holds(10, 6, 50));
        // 7 * 33 / 100 == 2.31 -> 2
        assert!(improvement_holds(7, 5, 33));
        assert!(!improvement_holds(7, 6, 33));
    }

    #[test]
    fn worsening_never_counts_as_improvement() {
        assert!(!improvement_holds(2, 9, 0));
    }

    #[test]
    fn bounded_rejects_zero_even_when_in_range() {
        assert!(!bounded_holds(0, 0, 10));
        assert!(bounded_holds(1, 0, 10));
        assert!(bounded_holds(10, 10, 10));
        assert!(!bounded_holds(11, 1, 10));
        assert!(!bounded_holds(4, 5, 10));
    }

    #[test]
    fn completeness_counts_true_fields() {
        let fields = [true, false, true, true, false];
        assert!(completeness_holds(&fields, 3));
        assert!(!completeness_holds(&fields, 4));
        assert!(completeness_holds(&fields, 0));
    }

    #[test]
    fn public_inputs_end_with_result_bit() {
        let public = PredicatePublic::DurationRange { min_days: 7, max_days: 90 };
        let elems = public.to_field_elems(true);
        assert_eq!(elems, vec![Fr::from(7u64), Fr::from(90u64), Fr::from(1u64)]);
    }

    #[test]
    fn debug_output_hides_private_values() {
        let inputs = PredicateInputs::CostRange { cost: 4321, min_cost: 1, max_cost: 9000 };
        let rendered = format!("{inputs:?}");
        assert!(!rendered.contains("4321"));
        assert!(rendered.contains("CostRange"));
    }
}
