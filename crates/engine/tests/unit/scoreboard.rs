//! # Scoreboard Tests
//!
//! Tolerance boundaries, verdict classification of matched and dropped pairs,
//! and drop waiving.

use std::collections::BTreeSet;
use std::sync::Arc;

use mimoverif_core::common::CMatrix;
use mimoverif_core::config::*;
use mimoverif_core::model::{Expected, ReferenceModel};
use mimoverif_core::pairing::{DropReason, MatchedPair, PairOutcome};
use mimoverif_core::scoreboard::{Checker, Comparator, Scoreboard, VerdictKind};
use mimoverif_core::stimulus::StimulusGenerator;
use mimoverif_core::transaction::{Payload, SeqNum, Stage, Transaction};
use num_complex::Complex64;
use proptest::prelude::*;
use rstest::rstest;

fn single(re: f64) -> CMatrix {
    CMatrix::from_rows(&[vec![Complex64::new(re, 0.0)]]).unwrap()
}

fn inputs(n: usize) -> Vec<Transaction> {
    let opts = SessionOptions {
        transaction_count: n,
        seed: 9,
        ..SessionOptions::default()
    };
    StimulusGenerator::new(Arc::new(Configuration::default()), &opts).collect()
}

fn predicted(input: &Transaction, stage: Stage) -> Payload {
    let expected = ReferenceModel::new()
        .predict(&input.config, stage, input.as_stimulus().unwrap())
        .unwrap();
    match expected {
        Expected::Encoded(m) => Payload::Encoded(m),
        Expected::Detected(r) => Payload::Detected(r.detection),
        Expected::Estimate(r) => Payload::Estimate(r.estimate),
    }
}

fn matched(input: &Transaction, stage: Stage, payload: Payload) -> PairOutcome {
    PairOutcome::Matched(MatchedPair {
        stage,
        input: input.clone(),
        output: Transaction::output(input, input.tick + 1, stage.output_port(), payload),
    })
}

proptest! {
    #[test]
    fn prop_magnitude_passes_iff_within_abs_tolerance(tol_steps in 0u32..64, dev_steps in 0u32..64) {
        let tol = f64::from(tol_steps) / 64.0;
        let dev = f64::from(dev_steps) / 64.0;
        let profile = ToleranceProfile::default()
            .with(ToleranceField::SymbolMagnitude, Tolerance::new(tol, 0.0))
            .with(ToleranceField::SymbolPhase, Tolerance::new(4.0, 0.0));
        let cmp = Comparator::new(profile, 0.05);
        let worst = cmp
            .compare(&Expected::Encoded(single(1.0)), &Payload::Encoded(single(1.0 + dev)))
            .unwrap()
            .unwrap();
        prop_assert_eq!(worst.deviation, dev);
        prop_assert_eq!(worst.exceeds(), dev_steps > tol_steps);
    }
}

#[test]
fn test_relative_tolerance_scales_with_expected_magnitude() {
    let profile = ToleranceProfile::default()
        .with(ToleranceField::SymbolMagnitude, Tolerance::new(0.0, 0.25))
        .with(ToleranceField::SymbolPhase, Tolerance::new(4.0, 0.0));
    let cmp = Comparator::new(profile, 0.05);
    let at_bound = cmp
        .compare(&Expected::Encoded(single(4.0)), &Payload::Encoded(single(5.0)))
        .unwrap()
        .unwrap();
    assert!(!at_bound.exceeds());
    let past = cmp
        .compare(&Expected::Encoded(single(1.0)), &Payload::Encoded(single(1.5)))
        .unwrap()
        .unwrap();
    assert!(past.exceeds());
}

#[test]
fn test_phase_tolerance_does_not_depend_on_expected_angle() {
    let profile = ToleranceProfile::default().with(ToleranceField::SymbolPhase, Tolerance::new(0.1, 0.0));
    let cmp = Comparator::new(profile, 0.05);
    for angle in [0.05, 1.5, 3.0, -3.1] {
        let e = Complex64::from_polar(1.0, angle);
        let near = cmp
            .compare(
                &Expected::Encoded(CMatrix::from_rows(&[vec![e]]).unwrap()),
                &Payload::Encoded(CMatrix::from_rows(&[vec![Complex64::from_polar(1.0, angle + 0.08)]]).unwrap()),
            )
            .unwrap()
            .unwrap();
        assert!(!near.exceeds(), "angle {angle}");
        let far = cmp
            .compare(
                &Expected::Encoded(CMatrix::from_rows(&[vec![e]]).unwrap()),
                &Payload::Encoded(CMatrix::from_rows(&[vec![Complex64::from_polar(1.0, angle + 0.15)]]).unwrap()),
            )
            .unwrap()
            .unwrap();
        assert!(far.exceeds(), "angle {angle}");
        assert_eq!(far.field, ToleranceField::SymbolPhase);
        assert_eq!(far.tolerance, 0.1);
    }
}

#[test]
fn test_fixed_point_rounding_is_within_default_tolerance() {
    let cmp = Comparator::new(ToleranceProfile::default(), 0.05);
    let expected = Expected::Encoded(CMatrix::from_rows(&[vec![Complex64::new(0.3, 0.3)]]).unwrap());
    let rounded = Payload::Encoded(CMatrix::from_rows(&[vec![Complex64::new(0.3125, 0.3125)]]).unwrap());
    assert!(cmp.compare(&expected, &rounded).unwrap().unwrap().exceeds());
    let w = cmp.compare_quantised(&expected, &rounded, 0.0625).unwrap().unwrap();
    assert!(!w.exceeds());
    assert_eq!(w.tolerance, 0.0625);
}

#[rstest]
fn test_exact_prediction_passes(#[values(Stage::Encoder, Stage::Decoder, Stage::ChannelEstimator)] stage: Stage) {
    let input = inputs(1).remove(0);
    let checker = Checker::new(&SessionOptions::default());
    let verdict = checker.evaluate(&matched(&input, stage, predicted(&input, stage)));
    assert_eq!(verdict.kind, VerdictKind::Pass);
    assert_eq!(verdict.stage, stage);
    assert!(verdict.worst.is_some_and(|w| w.deviation == 0.0));
}

#[test]
fn test_corrupted_output_fails() {
    let input = inputs(1).remove(0);
    let (tx, width) = (input.config.tx_antennas, input.config.symbol_width);
    let checker = Checker::new(&SessionOptions::default());
    let verdict = checker.evaluate(&matched(&input, Stage::Encoder, Payload::Encoded(CMatrix::zeros(tx, width))));
    assert_eq!(verdict.kind, VerdictKind::Fail);
    assert!(verdict.worst.is_some_and(|w| w.exceeds()));
}

#[test]
fn test_wrong_shape_fails_with_detail() {
    let input = inputs(1).remove(0);
    let checker = Checker::new(&SessionOptions::default());
    let verdict = checker.evaluate(&matched(&input, Stage::ChannelEstimator, Payload::Estimate(single(1.0))));
    assert_eq!(verdict.kind, VerdictKind::Fail);
    assert!(verdict.detail.is_some());
}

#[rstest]
#[case(DropReason::Timeout, false, VerdictKind::Dropped)]
#[case(DropReason::Skipped, false, VerdictKind::Dropped)]
#[case(DropReason::Timeout, true, VerdictKind::ExpectedDrop)]
#[case(DropReason::Evicted, true, VerdictKind::ExpectedDrop)]
#[case(DropReason::Abandoned, true, VerdictKind::Abandoned)]
fn test_drop_classification(#[case] reason: DropReason, #[case] whitelisted: bool, #[case] kind: VerdictKind) {
    let input = inputs(1).remove(0);
    let options = SessionOptions {
        expected_drops: if whitelisted { BTreeSet::from([input.seq.0]) } else { BTreeSet::new() },
        ..SessionOptions::default()
    };
    let verdict = Checker::new(&options).evaluate(&PairOutcome::Dropped {
        stage: Stage::Decoder,
        input,
        reason,
    });
    assert_eq!(verdict.kind, kind);
    assert_eq!(verdict.drop_reason, Some(reason));
}

#[test]
fn test_scoreboard_tallies_per_stage() {
    let ins = inputs(4);
    let checker = Checker::new(&SessionOptions::default());
    let mut sb = Scoreboard::new();
    for input in &ins {
        assert!(sb.record(checker.evaluate(&matched(input, Stage::Encoder, predicted(input, Stage::Encoder)))));
    }
    assert!(sb.record(checker.evaluate(&PairOutcome::Dropped {
        stage: Stage::Decoder,
        input: ins[2].clone(),
        reason: DropReason::Timeout,
    })));

    assert_eq!(sb.stage_tally(Stage::Encoder).pass, 4);
    assert_eq!(sb.stage_tally(Stage::Decoder).dropped, 1);
    assert_eq!(sb.tally().total(), 5);
    assert!((sb.agreement_rate() - 80.0).abs() < 1e-12);
    let failures: Vec<_> = sb.failures().map(|v| (v.stage, v.seq)).collect();
    assert_eq!(failures, vec![(Stage::Decoder, SeqNum(2))]);
    assert!(sb.get(Stage::Encoder, SeqNum(3)).is_some());
    assert!(sb.get(Stage::ChannelEstimator, SeqNum(3)).is_none());
}
