//! Scoreboard: predicts, compares, and records verdicts.
//!
//! Scoring is split in two so that concurrent workers never hold a lock while
//! running the reference model:
//! 1. **Checker:** Immutable. Turns a pairing outcome into a `Verdict` by
//!    predicting the expected output and comparing it field by field.
//! 2. **Scoreboard:** Mutable record of verdicts keyed by (stage, sequence) with
//!    running pass/fail/drop tallies and the agreement rate.
//!
//! A field passes when its deviation is at most
//! `max(abs_tol, rel_tol * |expected|)`; equality passes. Phases are angles and
//! use `abs_tol` alone. A verdict passes when every compared field passes.
//!
//! Outputs cross the DUT boundary as fixed-point values, so the checker scores
//! them against the configuration's least-significant step: default
//! tolerances are widened to the rounding error of that step, and phases of
//! values within two steps of zero are not compared.

use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::{PI, TAU};
use std::fmt;

use num_complex::Complex64;
use serde::Serialize;
use tracing::debug;

use crate::common::error::Annotation;
use crate::common::matrix::CMatrix;
use crate::config::{SessionOptions, ToleranceField, ToleranceProfile};
use crate::model::{Expected, ReferenceModel};
use crate::pairing::{DropReason, MatchedPair, PairOutcome};
use crate::transaction::{Payload, ScenarioKind, SeqNum, Stage};

/// Verdict category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    /// Every field within tolerance.
    Pass,
    /// At least one field out of tolerance.
    Fail,
    /// Output missing and not whitelisted.
    Dropped,
    /// Output missing, but the drop was injected or whitelisted.
    ExpectedDrop,
    /// The reference model rejected the input.
    ModelError,
    /// Output still pending when the session was cancelled.
    Abandoned,
}

impl VerdictKind {
    /// Lowercase name used in text reports.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Dropped => "dropped",
            Self::ExpectedDrop => "expected_drop",
            Self::ModelError => "model_error",
            Self::Abandoned => "abandoned",
        }
    }
}

/// Deviation of one compared field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldDeviation {
    /// Compared field.
    pub field: ToleranceField,
    /// Observed deviation.
    pub deviation: f64,
    /// Effective tolerance for that element.
    pub tolerance: f64,
    /// Element position (row, column).
    pub position: (usize, usize),
}

impl FieldDeviation {
    /// Whether the deviation is outside its tolerance. Equality is inside.
    pub fn exceeds(&self) -> bool {
        !(self.deviation <= self.tolerance)
    }

    /// How far the deviation is into its tolerance (1.0 at the boundary).
    fn ratio(&self) -> f64 {
        if self.deviation.is_nan() {
            f64::INFINITY
        } else if self.tolerance > 0.0 {
            self.deviation / self.tolerance
        } else if self.deviation > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }
}

/// Outcome of scoring one pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    /// Sequence number.
    pub seq: SeqNum,
    /// Stage scored.
    pub stage: Stage,
    /// Scenario the stimulus was drawn from.
    pub scenario: ScenarioKind,
    /// Category.
    pub kind: VerdictKind,
    /// Worst field deviation (the failing one for `Fail`).
    pub worst: Option<FieldDeviation>,
    /// Numeric annotation from the reference model.
    pub annotation: Option<Annotation>,
    /// Cause of a missing output.
    pub drop_reason: Option<DropReason>,
    /// Free-form detail for failures and model errors.
    pub detail: Option<String>,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:<9} {:<13} {}", self.seq, self.stage, self.kind.label(), self.scenario)?;
        if let Some(w) = &self.worst {
            write!(
                f,
                " {}={:.3e} (tol {:.3e} at {},{})",
                w.field, w.deviation, w.tolerance, w.position.0, w.position.1
            )?;
        }
        if let Some(reason) = self.drop_reason {
            write!(f, " reason={reason:?}")?;
        }
        if let Some(a) = &self.annotation {
            write!(f, " {a}")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

/// Counts per verdict category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    /// Passing verdicts.
    pub pass: u64,
    /// Failing verdicts.
    pub fail: u64,
    /// Unwaived drops.
    pub dropped: u64,
    /// Waived drops.
    pub expected_drops: u64,
    /// Reference-model errors.
    pub model_errors: u64,
    /// Pending at cancellation.
    pub abandoned: u64,
    /// Verdicts carrying an annotation.
    pub annotated: u64,
}

impl Tally {
    fn add(&mut self, v: &Verdict) {
        match v.kind {
            VerdictKind::Pass => self.pass += 1,
            VerdictKind::Fail => self.fail += 1,
            VerdictKind::Dropped => self.dropped += 1,
            VerdictKind::ExpectedDrop => self.expected_drops += 1,
            VerdictKind::ModelError => self.model_errors += 1,
            VerdictKind::Abandoned => self.abandoned += 1,
        }
        if v.annotation.is_some() {
            self.annotated += 1;
        }
    }

    /// Verdicts counted.
    pub const fn total(&self) -> u64 {
        self.pass + self.fail + self.dropped + self.expected_drops + self.model_errors + self.abandoned
    }

    /// Agreement in percent: `pass / (pass + fail + dropped)`.
    ///
    /// Waived drops, model errors, and abandoned outputs are not scored. With
    /// nothing scored the rate is 100.
    pub fn agreement_rate(&self) -> f64 {
        let scored = self.pass + self.fail + self.dropped;
        if scored == 0 {
            100.0
        } else {
            100.0 * self.pass as f64 / scored as f64
        }
    }
}

/// Field-by-field comparison against a tolerance profile.
#[derive(Debug, Clone)]
pub struct Comparator {
    profile: ToleranceProfile,
    phase_floor: f64,
}

impl Comparator {
    /// Creates a comparator.
    pub const fn new(profile: ToleranceProfile, phase_floor: f64) -> Self {
        Self { profile, phase_floor }
    }

    /// Compares `actual` against `expected` with no fixed-point rounding.
    ///
    /// Returns the worst deviation, or an error message when the payload kind
    /// or shape does not match the prediction.
    pub fn compare(&self, expected: &Expected, actual: &Payload) -> Result<Option<FieldDeviation>, String> {
        self.compare_quantised(expected, actual, 0.0)
    }

    /// Compares `actual`, rounded to multiples of `step`, against `expected`.
    pub fn compare_quantised(
        &self,
        expected: &Expected,
        actual: &Payload,
        step: f64,
    ) -> Result<Option<FieldDeviation>, String> {
        match (expected, actual) {
            (Expected::Encoded(e), Payload::Encoded(a)) => self.compare_symbols(
                e,
                a,
                (ToleranceField::SymbolMagnitude, ToleranceField::SymbolPhase),
                step,
            ),
            (Expected::Detected(e), Payload::Detected(a)) => {
                let soft = self.compare_symbols(
                    &e.detection.soft,
                    &a.soft,
                    (ToleranceField::SymbolMagnitude, ToleranceField::SymbolPhase),
                    step,
                )?;
                let ser = self.symbol_error_rate(&e.detection.hard, &a.hard)?;
                Ok(worse(soft, Some(ser)))
            }
            (Expected::Estimate(e), Payload::Estimate(a)) => self.compare_symbols(
                &e.estimate,
                a,
                (ToleranceField::EstimateMagnitude, ToleranceField::EstimatePhase),
                step,
            ),
            _ => Err("output payload kind does not match the stage".into()),
        }
    }

    fn compare_symbols(
        &self,
        expected: &CMatrix,
        actual: &CMatrix,
        (magnitude, phase): (ToleranceField, ToleranceField),
        step: f64,
    ) -> Result<Option<FieldDeviation>, String> {
        if expected.shape() != actual.shape() {
            return Err(format!(
                "output shape {:?} differs from expected {:?}",
                actual.shape(),
                expected.shape()
            ));
        }
        let phase_gate = self.phase_floor.max(2.0 * step);
        let mag_tol = self.profile.resolve(magnitude, step, phase_gate);
        let phase_tol = self.profile.resolve(phase, step, phase_gate).abs_tol;
        let mut worst = None;
        let cols = expected.cols().max(1);
        for (i, (e, a)) in expected.as_slice().iter().zip(actual.as_slice()).enumerate() {
            let position = (i / cols, i % cols);
            let (em, am) = (e.norm(), a.norm());
            let dev = FieldDeviation {
                field: magnitude,
                deviation: (am - em).abs(),
                tolerance: mag_tol.bound(em),
                position,
            };
            worst = worse(worst, Some(dev));
            if em > phase_gate && am > phase_gate {
                let dev = FieldDeviation {
                    field: phase,
                    deviation: phase_difference(*e, *a),
                    tolerance: phase_tol,
                    position,
                };
                worst = worse(worst, Some(dev));
            }
        }
        Ok(worst)
    }

    fn symbol_error_rate(&self, expected: &[Vec<u16>], actual: &[Vec<u16>]) -> Result<FieldDeviation, String> {
        if expected.len() != actual.len() || expected.iter().zip(actual).any(|(e, a)| e.len() != a.len()) {
            return Err("hard decision shape differs from expected".into());
        }
        let total: usize = expected.iter().map(Vec::len).sum();
        let errors = expected
            .iter()
            .flatten()
            .zip(actual.iter().flatten())
            .filter(|(e, a)| e != a)
            .count();
        let rate = if total == 0 { 0.0 } else { errors as f64 / total as f64 };
        Ok(FieldDeviation {
            field: ToleranceField::SymbolErrorRate,
            deviation: rate,
            tolerance: self.profile.get(ToleranceField::SymbolErrorRate).bound(0.0),
            position: (0, 0),
        })
    }
}

/// Wrapped absolute phase difference in `[0, π]`.
fn phase_difference(e: Complex64, a: Complex64) -> f64 {
    let d = (a.arg() - e.arg()).rem_euclid(TAU);
    if d > PI { TAU - d } else { d }
}

/// Picks the deviation that is further into (or past) its tolerance.
fn worse(a: Option<FieldDeviation>, b: Option<FieldDeviation>) -> Option<FieldDeviation> {
    match (a, b) {
        (Some(x), Some(y)) => {
            let (x_out, y_out) = (x.exceeds(), y.exceeds());
            if x_out != y_out {
                return Some(if x_out { x } else { y });
            }
            Some(if y.ratio() > x.ratio() { y } else { x })
        }
        (x, None) => x,
        (None, y) => y,
    }
}

/// Immutable scoring logic shared by every worker.
#[derive(Debug, Clone)]
pub struct Checker {
    model: ReferenceModel,
    comparator: Comparator,
    expected_drops: BTreeSet<u64>,
}

impl Checker {
    /// Builds a checker from the session options.
    pub fn new(options: &SessionOptions) -> Self {
        Self {
            model: ReferenceModel::new(),
            comparator: Comparator::new(options.tolerance_profile.clone(), options.phase_floor),
            expected_drops: options.expected_drops.clone(),
        }
    }

    /// Scores one pairing outcome.
    pub fn evaluate(&self, outcome: &PairOutcome) -> Verdict {
        match outcome {
            PairOutcome::Matched(pair) => self.evaluate_pair(pair),
            PairOutcome::Dropped { stage, input, reason } => {
                let stimulus = input.as_stimulus();
                let waived = self.expected_drops.contains(&input.seq.0) || stimulus.is_some_and(|s| s.drops(*stage));
                let kind = match reason {
                    DropReason::Abandoned => VerdictKind::Abandoned,
                    _ if waived => VerdictKind::ExpectedDrop,
                    _ => VerdictKind::Dropped,
                };
                Verdict {
                    seq: input.seq,
                    stage: *stage,
                    scenario: stimulus.map_or(ScenarioKind::Nominal, |s| s.scenario),
                    kind,
                    worst: None,
                    annotation: None,
                    drop_reason: Some(*reason),
                    detail: None,
                }
            }
        }
    }

    fn evaluate_pair(&self, pair: &MatchedPair) -> Verdict {
        let mut verdict = Verdict {
            seq: pair.input.seq,
            stage: pair.stage,
            scenario: ScenarioKind::Nominal,
            kind: VerdictKind::ModelError,
            worst: None,
            annotation: None,
            drop_reason: None,
            detail: None,
        };
        let Some(stimulus) = pair.input.as_stimulus() else {
            verdict.detail = Some("paired input carries no stimulus".into());
            return verdict;
        };
        verdict.scenario = stimulus.scenario;

        let expected = match self.model.predict(&pair.input.config, pair.stage, stimulus) {
            Ok(e) => e,
            Err(e) => {
                verdict.detail = Some(e.to_string());
                return verdict;
            }
        };
        verdict.annotation = expected.annotation().cloned();

        let step = pair.input.config.fixed_point_step();
        match self.comparator.compare_quantised(&expected, &pair.output.payload, step) {
            Ok(worst) => {
                verdict.kind = if worst.is_some_and(|w| w.exceeds()) {
                    VerdictKind::Fail
                } else {
                    VerdictKind::Pass
                };
                verdict.worst = worst;
            }
            Err(msg) => {
                verdict.kind = VerdictKind::Fail;
                verdict.detail = Some(msg);
            }
        }
        verdict
    }
}

/// Record of every verdict in a session.
#[derive(Debug, Default)]
pub struct Scoreboard {
    verdicts: BTreeMap<(Stage, SeqNum), Verdict>,
    tally: Tally,
    per_stage: [Tally; 3],
}

impl Scoreboard {
    /// Creates an empty scoreboard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a verdict. A second verdict for the same (stage, seq) is ignored.
    ///
    /// Returns true when the verdict was recorded.
    pub fn record(&mut self, verdict: Verdict) -> bool {
        let key = (verdict.stage, verdict.seq);
        if self.verdicts.contains_key(&key) {
            return false;
        }
        self.tally.add(&verdict);
        self.per_stage[verdict.stage.index()].add(&verdict);
        debug!(
            target: "mimoverif::scoreboard",
            seq = verdict.seq.0,
            stage = %verdict.stage,
            kind = ?verdict.kind,
            annotated = verdict.annotation.is_some(),
            agreement = self.tally.agreement_rate(),
            "verdict recorded"
        );
        let _ = self.verdicts.insert(key, verdict);
        true
    }

    /// Session-wide tally.
    pub const fn tally(&self) -> Tally {
        self.tally
    }

    /// Tally of one stage.
    pub const fn stage_tally(&self, stage: Stage) -> Tally {
        self.per_stage[stage.index()]
    }

    /// Running agreement rate in percent.
    pub fn agreement_rate(&self) -> f64 {
        self.tally.agreement_rate()
    }

    /// Verdicts ordered by stage then sequence number.
    pub fn verdicts(&self) -> impl Iterator<Item = &Verdict> {
        self.verdicts.values()
    }

    /// Verdict for one pair.
    pub fn get(&self, stage: Stage, seq: SeqNum) -> Option<&Verdict> {
        self.verdicts.get(&(stage, seq))
    }

    /// Verdicts that count against the session.
    pub fn failures(&self) -> impl Iterator<Item = &Verdict> {
        self.verdicts
            .values()
            .filter(|v| matches!(v.kind, VerdictKind::Fail | VerdictKind::Dropped | VerdictKind::ModelError))
    }
}
