//! # Coverage Model Tests
//!
//! Monotonic bin counts, replay idempotence, merging across sessions, error
//! injection bins, and corner-case tracking.

use std::sync::Arc;

use mimoverif_core::common::CMatrix;
use mimoverif_core::config::{Configuration, SessionOptions};
use mimoverif_core::coverage::{CoverageModel, CoverageSpace, Dimension, Sample};
use mimoverif_core::stimulus::StimulusGenerator;
use mimoverif_core::transaction::{ErrorInjection, Payload, Port, ScenarioKind, SeqNum, Stage, Stimulus, Transaction};
use proptest::prelude::*;

fn stimuli(cfg: &Configuration, seed: u64, n: usize) -> Vec<Transaction> {
    let opts = SessionOptions {
        transaction_count: n,
        seed,
        corner_case_weight: 0.6,
        ..SessionOptions::default()
    };
    StimulusGenerator::new(Arc::new(cfg.clone()), &opts).collect()
}

fn four_by_four() -> Configuration {
    Configuration {
        tx_antennas: 4,
        rx_antennas: 4,
        num_data_streams: 2,
        ..Configuration::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_counts_never_decrease(seed in any::<u64>()) {
        let cfg = four_by_four();
        let mut model = CoverageModel::for_configuration(&cfg);
        let mut previous: Vec<u64> = model.iter().map(|(_, h)| h).collect();
        let mut percent = model.percent();
        for txn in stimuli(&cfg, seed, 30) {
            prop_assert!(model.sample(&txn));
            let now: Vec<u64> = model.iter().map(|(_, h)| h).collect();
            prop_assert!(now.iter().zip(&previous).all(|(n, p)| n >= p));
            prop_assert!(model.percent() >= percent);
            previous = now;
            percent = model.percent();
        }
    }

    #[test]
    fn prop_replay_is_idempotent(seed in any::<u64>()) {
        let cfg = four_by_four();
        let txns = stimuli(&cfg, seed, 20);
        let mut model = CoverageModel::for_configuration(&cfg);
        for t in &txns {
            let _ = model.sample(t);
        }
        let once = model.summary();
        for t in &txns {
            prop_assert!(!model.sample(t));
        }
        prop_assert_eq!(model.summary(), once);
    }

    #[test]
    fn prop_no_bin_exceeds_sample_count(seed in any::<u64>(), n in 1usize..40) {
        let cfg = four_by_four();
        let mut model = CoverageModel::for_configuration(&cfg);
        for t in stimuli(&cfg, seed, n) {
            let _ = model.sample(&t);
        }
        let samples = model.summary().samples;
        prop_assert_eq!(samples, n as u64);
        prop_assert!(model.iter().all(|(_, h)| h <= samples));
        prop_assert_eq!(model.hits("antennas=4x4"), Some(samples));
    }
}

fn eight_by_eight() -> Configuration {
    Configuration {
        tx_antennas: 8,
        rx_antennas: 8,
        num_data_streams: 8,
        ..Configuration::default()
    }
}

fn first_stimulus(cfg: &Configuration) -> Stimulus {
    stimuli(cfg, 5, 1)[0].as_stimulus().unwrap().clone()
}

#[test]
fn test_every_declared_dimension_has_bins() {
    let model = CoverageModel::for_configuration(&four_by_four());
    for dim in Dimension::ALL.into_iter().filter(|d| *d != Dimension::Injection) {
        assert!(!model.space().values(dim).is_empty(), "{} has no bins", dim.name());
    }
    assert!(model.space().values(Dimension::Injection).is_empty());
    assert_eq!(model.percent(), 0.0);
    assert!(!model.all_corner_cases_hit());
}

#[test]
fn test_merge_combines_two_configurations() {
    let a_cfg = four_by_four();
    let b_cfg = Configuration::default();
    let mut a = CoverageModel::for_configuration(&a_cfg);
    let mut b = CoverageModel::for_configuration(&b_cfg);
    for t in stimuli(&a_cfg, 1, 10) {
        let _ = a.sample(&t);
    }
    for t in stimuli(&b_cfg, 2, 10) {
        let _ = b.sample(&t);
    }

    let mut merged = CoverageModel::new(CoverageSpace::full());
    merged.merge(&a);
    merged.merge(&b);
    assert_eq!(merged.hits("antennas=4x4"), Some(10));
    assert_eq!(merged.hits("antennas=2x2"), Some(10));
    assert_eq!(merged.summary().samples, 20);
    assert!(merged.percent() < a.percent());
}

#[test]
fn test_non_stimulus_transaction_ignored() {
    let cfg = four_by_four();
    let input = stimuli(&cfg, 3, 1).remove(0);
    let output = Transaction::output(&input, 1, Port::EstimateOutput, Payload::Estimate(CMatrix::zeros(4, 4)));
    let mut model = CoverageModel::for_configuration(&cfg);
    assert!(!model.sample(&output));
    assert_eq!(model.summary().samples, 0);
}

#[test]
fn test_injected_stimulus_hits_injection_bins() {
    let cfg = Configuration {
        error_injection_enabled: true,
        ..four_by_four()
    };
    let mut model = CoverageModel::for_configuration(&cfg);
    assert_eq!(model.space().values(Dimension::Injection).len(), 4);

    let mut st = first_stimulus(&cfg);
    st.injection = Some(ErrorInjection::DropOutput(Stage::Decoder));
    assert!(model.record(SeqNum(0), &Sample::from_stimulus(&cfg, &st)));
    st.injection = None;
    assert!(model.record(SeqNum(1), &Sample::from_stimulus(&cfg, &st)));

    assert_eq!(model.hits("injection=drop_decoder"), Some(1));
    assert_eq!(model.hits("injection=none"), Some(1));
    assert_eq!(model.hits("injection=drop_encoder"), Some(0));
    assert_eq!(model.hits("antennas=4x4,injection=drop_decoder"), Some(1));
    assert_eq!(model.category_percent("injection"), Some(50.0));
    assert_eq!(model.summary().undefined_hits, 0);
}

#[test]
fn test_injection_not_sampled_when_disabled() {
    let cfg = four_by_four();
    let mut model = CoverageModel::for_configuration(&cfg);
    let mut st = first_stimulus(&cfg);
    st.injection = Some(ErrorInjection::DropOutput(Stage::Encoder));
    assert!(model.record(SeqNum(0), &Sample::from_stimulus(&cfg, &st)));
    assert_eq!(model.hits("injection=drop_encoder"), None);
    assert_eq!(model.category_percent("injection"), None);
    assert_eq!(model.summary().undefined_hits, 0);
}

#[test]
fn test_max_antennas_corner_case_tracked() {
    let small = four_by_four();
    let large = eight_by_eight();
    assert!(
        !CoverageSpace::for_configuration(&small)
            .corner_cases()
            .any(|k| k == ScenarioKind::MaxAntennas)
    );
    assert!(CoverageSpace::full().corner_cases().any(|k| k == ScenarioKind::MaxAntennas));

    let mut small_model = CoverageModel::for_configuration(&small);
    for t in stimuli(&small, 4, 3) {
        let _ = small_model.sample(&t);
    }
    let mut large_model = CoverageModel::for_configuration(&large);
    for t in stimuli(&large, 4, 3) {
        let _ = large_model.sample(&t);
    }
    let max_antennas = |m: &CoverageModel| {
        m.summary()
            .corner_cases
            .iter()
            .find(|c| c.scenario == ScenarioKind::MaxAntennas)
            .map(|c| c.hits)
    };
    assert_eq!(max_antennas(&large_model), Some(3));

    let mut merged = CoverageModel::new(CoverageSpace::full());
    merged.merge(&small_model);
    assert_eq!(max_antennas(&merged), Some(0));
    assert!(!merged.all_corner_cases_hit());
    merged.merge(&large_model);
    assert_eq!(max_antennas(&merged), Some(3));
}
