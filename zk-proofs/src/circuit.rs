//! R1CS circuits for the case-study predicates.
//!
//! What every circuit proves:
//! 1) The prover knows private clinical values (severities, duration, cost, documentation flags).
//! 2) Evaluating the predicate over those values with the public parameters yields the public
//!    result bit `holds`.
//!
//! Privacy: the clinical values are witnesses (never public). Only the parameters and the
//! predicate result are public.

use crate::constants::{
    COST_BITS, COUNT_BITS, DURATION_BITS, QUOTIENT_BITS, REMAINDER_BITS, SEVERITY_BITS,
};
use crate::types::{PredicateInputs, PredicateKind};
use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};

fn constant(v: u64) -> FpVar<Fr> {
    FpVar::<Fr>::constant(Fr::from(v))
}

/// Convert little-endian boolean bits into an FpVar.
fn bits_le_to_fp(bits_le: &[Boolean<Fr>]) -> Result<FpVar<Fr>, SynthesisError> {
    let mut acc = constant(0);
    let mut coeff = constant(1);

    for b in bits_le {
        // b ? coeff : 0
        let term = b.select(&coeff, &constant(0))?;
        acc += term;
        coeff += coeff.clone();
    }

    Ok(acc)
}

/// Enforce that `v` fits in `n` bits and return its `n` little-endian bits.
///
/// The bits are fresh witnesses; reconstructing them must give back `v`. Since `2^n` is far
/// below the field modulus this pins `v` to an `n`-bit integer.
fn constrain_bits(
    cs: &ConstraintSystemRef<Fr>,
    v: &FpVar<Fr>,
    n: usize,
) -> Result<Vec<Boolean<Fr>>, SynthesisError> {
    let mut bits = Vec::with_capacity(n);
    for i in 0..n {
        let bit = Boolean::new_witness(cs.clone(), || {
            let value = v.value()?;
            Ok(value.into_bigint().get_bit(i))
        })?;
        bits.push(bit);
    }

    let reconstructed = bits_le_to_fp(&bits)?;
    reconstructed.enforce_equal(v)?;
    Ok(bits)
}

/// Boolean gadget: `a >= b` where both operands are already constrained to `n` bits.
///
/// `a - b + 2^n` lies in `[1, 2^(n+1))`; bit `n` is set exactly when `a >= b`.
fn geq(
    cs: &ConstraintSystemRef<Fr>,
    a: &FpVar<Fr>,
    b: &FpVar<Fr>,
    n: usize,
) -> Result<Boolean<Fr>, SynthesisError> {
    let shifted = a - b + constant(1u64 << n);
    let bits = constrain_bits(cs, &shifted, n + 1)?;
    Ok(bits[n].clone())
}

/// Proves `max(0, baseline - outcome) >= max(1, floor(baseline * percent / 100))`.
#[derive(Clone, Debug)]
pub struct ImprovementCircuit {
    /// Private: severity before treatment.
    pub baseline: u64,
    /// Private: severity after treatment.
    pub outcome: u64,
    /// Public: required improvement as a percentage of the baseline.
    pub percent: u64,
    /// Public: predicate result.
    pub holds: bool,
}

impl ConstraintSynthesizer<Fr> for ImprovementCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        // IMPORTANT: Public input ordering MUST match `PredicatePublic::to_field_elems`.
        let percent = FpVar::<Fr>::new_input(cs.clone(), || Ok(Fr::from(self.percent)))?;
        let holds = Boolean::new_input(cs.clone(), || Ok(self.holds))?;

        let baseline = FpVar::<Fr>::new_witness(cs.clone(), || Ok(Fr::from(self.baseline)))?;
        let outcome = FpVar::<Fr>::new_witness(cs.clone(), || Ok(Fr::from(self.outcome)))?;

        constrain_bits(&cs, &baseline, SEVERITY_BITS)?;
        constrain_bits(&cs, &outcome, SEVERITY_BITS)?;
        constrain_bits(&cs, &percent, SEVERITY_BITS)?;

        // floor(baseline * percent / 100) via quotient/remainder witnesses.
        let product = self.baseline * self.percent;
        let quotient = FpVar::<Fr>::new_witness(cs.clone(), || Ok(Fr::from(product / 100)))?;
        let remainder = FpVar::<Fr>::new_witness(cs.clone(), || Ok(Fr::from(product % 100)))?;
        constrain_bits(&cs, &quotient, QUOTIENT_BITS)?;
        constrain_bits(&cs, &remainder, REMAINDER_BITS)?;

        geq(&cs, &constant(99), &remainder, REMAINDER_BITS)?.enforce_equal(&Boolean::constant(true))?;
        let recombined = &quotient * &constant(100) + &remainder;
        (&baseline * &percent).enforce_equal(&recombined)?;

        // improvement = baseline >= outcome ? baseline - outcome : 0
        let improved = geq(&cs, &baseline, &outcome, SEVERITY_BITS)?;
        let improvement = improved.select(&(&baseline - &outcome), &constant(0))?;

        // required = quotient >= 1 ? quotient : 1
        let nonzero = geq(&cs, &quotient, &constant(1), QUOTIENT_BITS)?;
        let required = nonzero.select(&quotient, &constant(1))?;

        let computed = geq(&cs, &improvement, &required, QUOTIENT_BITS)?;
        computed.enforce_equal(&holds)?;

        Ok(())
    }
}

/// Proves `value > 0 && min <= value <= max` for a value of `bits` width.
///
/// Shared by the duration and cost predicates; each uses its own width and therefore its
/// own proving key.
#[derive(Clone, Debug)]
pub struct BoundedValueCircuit {
    /// Private: the measured value.
    pub value: u64,
    /// Public: inclusive lower bound.
    pub min: u64,
    /// Public: inclusive upper bound.
    pub max: u64,
    pub bits: usize,
    /// Public: predicate result.
    pub holds: bool,
}

impl ConstraintSynthesizer<Fr> for BoundedValueCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let min = FpVar::<Fr>::new_input(cs.clone(), || Ok(Fr::from(self.min)))?;
        let max = FpVar::<Fr>::new_input(cs.clone(), || Ok(Fr::from(self.max)))?;
        let holds = Boolean::new_input(cs.clone(), || Ok(self.holds))?;

        let value = FpVar::<Fr>::new_witness(cs.clone(), || Ok(Fr::from(self.value)))?;

        constrain_bits(&cs, &value, self.bits)?;
        constrain_bits(&cs, &min, self.bits)?;
        constrain_bits(&cs, &max, self.bits)?;

        let positive = geq(&cs, &value, &constant(1), self.bits)?;
        let above_min = geq(&cs, &value, &min, self.bits)?;
        let below_max = geq(&cs, &max, &value, self.bits)?;

        let computed = Boolean::kary_and(&[positive, above_min, below_max])?;
        computed.enforce_equal(&holds)?;

        Ok(())
    }
}

/// Proves that at least `required` of the documentation flags are set.
#[derive(Clone, Debug)]
pub struct CompletenessCircuit {
    /// Private: which documentation fields are present.
    pub fields: Vec<bool>,
    /// Public: minimum number of present fields.
    pub required: u64,
    /// Public: predicate result.
    pub holds: bool,
}

impl ConstraintSynthesizer<Fr> for CompletenessCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let required = FpVar::<Fr>::new_input(cs.clone(), || Ok(Fr::from(self.required)))?;
        let holds = Boolean::new_input(cs.clone(), || Ok(self.holds))?;

        constrain_bits(&cs, &required, COUNT_BITS)?;

        let mut count = constant(0);
        for field in self.fields {
            let present = Boolean::new_witness(cs.clone(), || Ok(field))?;
            count += present.select(&constant(1), &constant(0))?;
        }

        let computed = geq(&cs, &count, &required, COUNT_BITS)?;
        computed.enforce_equal(&holds)?;

        Ok(())
    }
}

/// A circuit for any of the four predicates, with its witness filled in.
///
/// This is the "witness" a prover backend produces from [`PredicateInputs`].
#[derive(Clone, Debug)]
pub enum PredicateCircuit {
    Improvement(ImprovementCircuit),
    DurationRange(BoundedValueCircuit),
    Completeness(CompletenessCircuit),
    CostRange(BoundedValueCircuit),
}

impl PredicateCircuit {
    /// Assign the witness and the natively evaluated result.
    pub fn from_inputs(inputs: &PredicateInputs) -> Self {
        let holds = inputs.evaluate();
        match *inputs {
            PredicateInputs::Improvement {
                baseline_severity,
                outcome_severity,
                improvement_percent,
            } => PredicateCircuit::Improvement(ImprovementCircuit {
                baseline: baseline_severity as u64,
                outcome: outcome_severity as u64,
                percent: improvement_percent as u64,
                holds,
            }),
            PredicateInputs::DurationRange { duration_days, min_days, max_days } => {
                PredicateCircuit::DurationRange(BoundedValueCircuit {
                    value: duration_days as u64,
                    min: min_days as u64,
                    max: max_days as u64,
                    bits: DURATION_BITS,
                    holds,
                })
            }
            PredicateInputs::Completeness { fields, required } => {
                PredicateCircuit::Completeness(CompletenessCircuit {
                    fields: fields.to_vec(),
                    required: required as u64,
                    holds,
                })
            }
            PredicateInputs::CostRange { cost, min_cost, max_cost } => {
                PredicateCircuit::CostRange(BoundedValueCircuit {
                    value: cost as u64,
                    min: min_cost as u64,
                    max: max_cost as u64,
                    bits: COST_BITS,
                    holds,
                })
            }
        }
    }

    /// A satisfying instance used only to derive the circuit shape during setup.
    pub fn placeholder(kind: PredicateKind) -> Self {
        let inputs = match kind {
            PredicateKind::Improvement => PredicateInputs::Improvement {
                baseline_severity: 1,
                outcome_severity: 1,
                improvement_percent: 0,
            },
            PredicateKind::DurationRange => PredicateInputs::DurationRange {
                duration_days: 1,
                min_days: 1,
                max_days: 1,
            },
            PredicateKind::Completeness => PredicateInputs::Completeness {
                fields: [false; crate::constants::COMPLETENESS_FIELDS],
                required: 0,
            },
            PredicateKind::CostRange => PredicateInputs::CostRange {
                cost: 1,
                min_cost: 1,
                max_cost: 1,
            },
        };
        Self::from_inputs(&inputs)
    }

    pub fn kind(&self) -> PredicateKind {
        match self {
            PredicateCircuit::Improvement(_) => PredicateKind::Improvement,
            PredicateCircuit::DurationRange(_) => PredicateKind::DurationRange,
            PredicateCircuit::Completeness(_) => PredicateKind::Completeness,
            PredicateCircuit::CostRange(_) => PredicateKind::CostRange,
        }
    }

    pub fn holds(&self) -> bool {
        match self {
            PredicateCircuit::Improvement(c) => c.holds,
            PredicateCircuit::DurationRange(c) | PredicateCircuit::CostRange(c) => c.holds,
            PredicateCircuit::Completeness(c) => c.holds,
        }
    }
}

impl ConstraintSynthesizer<Fr> for PredicateCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        match self {
            PredicateCircuit::Improvement(c) => c.generate_constraints(cs),
            PredicateCircuit::DurationRange(c) | PredicateCircuit::CostRange(c) => c.generate_constraints(cs),
            PredicateCircuit::Completeness(c) => c.generate_constraints(cs),
        }
    }
}
