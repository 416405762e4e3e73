//! # Stimulus Generator Tests
//!
//! Legality of every emitted stimulus, seeded determinism, corner-case
//! weighting, and error-injection marking.

use std::sync::Arc;

use mimoverif_core::config::*;
use mimoverif_core::model::check_stimulus;
use mimoverif_core::stimulus::{ScenarioWeights, StimulusGenerator};
use mimoverif_core::transaction::ScenarioKind;
use proptest::prelude::*;

fn arb_configuration() -> impl Strategy<Value = Configuration> {
    let antennas = prop::sample::select(VALID_ANTENNA_COUNTS.to_vec());
    (
        antennas.clone(),
        antennas,
        prop::sample::select(Modulation::ALL.to_vec()),
        prop::sample::select(vec![PilotPattern::Block, PilotPattern::Dft, PilotPattern::Repeated]),
        1usize..8,
        any::<bool>(),
    )
        .prop_flat_map(|(tx, rx, m, p, width, inject)| {
            (1..=tx.min(rx)).prop_map(move |streams| Configuration {
                tx_antennas: tx,
                rx_antennas: rx,
                num_data_streams: streams,
                symbol_width: width,
                modulation_scheme: m,
                pilot_pattern: p,
                error_injection_enabled: inject,
                ..Configuration::default()
            })
        })
}

fn arb_directed() -> impl Strategy<Value = Vec<ScenarioKind>> {
    prop::collection::vec(
        prop_oneof![
            Just(ScenarioKind::Nominal),
            Just(ScenarioKind::MaxStreams),
            Just(ScenarioKind::SingularChannel),
            Just(ScenarioKind::IllConditionedChannel),
            Just(ScenarioKind::ExtremeNoise),
            (1usize..=8).prop_map(ScenarioKind::Streams),
        ],
        1..6,
    )
}

fn options(seed: u64, mode: GenerationMode, directed: Vec<ScenarioKind>) -> SessionOptions {
    SessionOptions {
        transaction_count: 24,
        seed,
        mode,
        directed,
        injection_rate: 0.5,
        ..SessionOptions::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_generator_never_emits_illegal_stimulus(
        cfg in arb_configuration(),
        seed in any::<u64>(),
        mode in prop::sample::select(vec![GenerationMode::Random, GenerationMode::Directed, GenerationMode::Mixed]),
        directed in arb_directed(),
    ) {
        prop_assert!(cfg.validate().is_ok());
        let opts = options(seed, mode, directed);
        let txns: Vec<_> = StimulusGenerator::new(Arc::new(cfg.clone()), &opts).collect();
        prop_assert_eq!(txns.len(), opts.transaction_count);
        for t in &txns {
            let s = t.as_stimulus().unwrap();
            prop_assert!(check_stimulus(&cfg, s).is_ok());
            prop_assert!(s.active_streams >= 1 && s.active_streams <= cfg.num_data_streams);
            prop_assert!(s.symbols.iter().flatten().all(|&l| usize::from(l) < cfg.modulation_scheme.order()));
            if !cfg.error_injection_enabled {
                prop_assert!(s.injection.is_none());
            }
        }
    }

    #[test]
    fn prop_same_seed_same_sequence(cfg in arb_configuration(), seed in any::<u64>()) {
        let opts = options(seed, GenerationMode::Random, Vec::new());
        let a: Vec<_> = StimulusGenerator::new(Arc::new(cfg.clone()), &opts).collect();
        let b: Vec<_> = StimulusGenerator::new(Arc::new(cfg), &opts).collect();
        prop_assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            prop_assert_eq!(x.seq, y.seq);
            prop_assert_eq!(x.fingerprint, y.fingerprint);
            prop_assert_eq!(x.as_stimulus(), y.as_stimulus());
        }
    }
}

#[test]
fn test_different_seeds_diverge() {
    let cfg = Arc::new(Configuration::default());
    let a: Vec<u64> = StimulusGenerator::new(Arc::clone(&cfg), &options(1, GenerationMode::Random, Vec::new()))
        .map(|t| t.fingerprint)
        .collect();
    let b: Vec<u64> = StimulusGenerator::new(cfg, &options(2, GenerationMode::Random, Vec::new()))
        .map(|t| t.fingerprint)
        .collect();
    assert_ne!(a, b);
}

#[test]
fn test_corner_cases_outweigh_uniform_sampling() {
    let cfg = Configuration {
        tx_antennas: 4,
        rx_antennas: 4,
        num_data_streams: 4,
        ..Configuration::default()
    };
    let w = ScenarioWeights::new(&cfg, 0.5);
    let corner: f64 = ScenarioKind::CORNER_CASES.iter().map(|k| w.probability(*k)).sum();
    assert!((corner - 0.5).abs() < 1e-12);
    assert!(w.probability(ScenarioKind::SingularChannel) > w.probability(ScenarioKind::MaxStreams));
}

#[test]
fn test_directed_corner_cases_are_realised() {
    let cfg = Arc::new(Configuration {
        tx_antennas: 4,
        rx_antennas: 4,
        num_data_streams: 4,
        ..Configuration::default()
    });
    let opts = options(
        5,
        GenerationMode::Directed,
        vec![ScenarioKind::MaxStreams, ScenarioKind::ExtremeNoise],
    );
    for t in StimulusGenerator::new(cfg, &opts) {
        let s = t.as_stimulus().unwrap();
        match s.scenario {
            ScenarioKind::MaxStreams => assert_eq!(s.active_streams, 4),
            ScenarioKind::ExtremeNoise => assert_eq!(s.noise_class, NoiseClass::Extreme),
            other => panic!("unexpected scenario {other}"),
        }
    }
}

#[test]
fn test_injection_marks_some_transactions() {
    let cfg = Arc::new(Configuration {
        error_injection_enabled: true,
        ..Configuration::default()
    });
    let opts = SessionOptions {
        transaction_count: 200,
        injection_rate: 0.25,
        ..SessionOptions::default()
    };
    let marked = StimulusGenerator::new(cfg, &opts)
        .filter(|t| t.as_stimulus().is_some_and(|s| s.injection.is_some()))
        .count();
    assert!(marked > 10 && marked < 100, "{marked} of 200 marked");
}
