//! # Reference Model Tests
//!
//! Constellations, encoding, detection, and channel estimation across the
//! supported modulations, antenna configurations, and detectors.

use mimoverif_core::VerifyError;
use mimoverif_core::common::{Annotation, CMatrix};
use mimoverif_core::config::*;
use mimoverif_core::model::{Constellation, Expected, ReferenceModel};
use mimoverif_core::stimulus::realize;
use mimoverif_core::transaction::{ScenarioKind, Stage, Stimulus};
use num_complex::Complex64;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rstest::rstest;

fn config(tx: usize, rx: usize, streams: usize) -> Configuration {
    Configuration {
        tx_antennas: tx,
        rx_antennas: rx,
        num_data_streams: streams,
        noise_level_class: NoiseClass::Noiseless,
        ..Configuration::default()
    }
}

fn draw(cfg: &Configuration, kind: ScenarioKind, seed: u64) -> Stimulus {
    let mut rng = StdRng::seed_from_u64(seed);
    realize(&mut rng, kind, cfg, 0.0).unwrap()
}

fn max_diff(a: &CMatrix, b: &CMatrix) -> f64 {
    a.as_slice()
        .iter()
        .zip(b.as_slice())
        .map(|(x, y)| (x - y).norm())
        .fold(0.0, f64::max)
}

#[rstest]
fn test_constellation_unit_energy_and_slicing(
    #[values(Modulation::Bpsk, Modulation::Qpsk, Modulation::Qam16, Modulation::Qam64)] m: Modulation,
) {
    let c = Constellation::new(m);
    assert_eq!(c.points().len(), m.order());
    let energy = c.points().iter().map(Complex64::norm_sqr).sum::<f64>() / m.order() as f64;
    assert!((energy - 1.0).abs() < 1e-12);
    for label in 0..m.order() as u16 {
        let p = c.map(label).unwrap();
        assert_eq!(c.slice(p), label);
        assert_eq!(c.slice(p * 1.01), label);
    }
    assert!(c.map(m.order() as u16).is_none());
}

#[rstest]
#[case(Modulation::Qpsk)]
#[case(Modulation::Qam16)]
#[case(Modulation::Qam64)]
fn test_adjacent_points_differ_in_one_bit(#[case] m: Modulation) {
    let c = Constellation::new(m);
    let pts = c.points();
    let min_dist = pts
        .iter()
        .enumerate()
        .flat_map(|(i, a)| pts[i + 1..].iter().map(move |b| (a - b).norm()))
        .fold(f64::INFINITY, f64::min);
    for (i, a) in pts.iter().enumerate() {
        for (j, b) in pts.iter().enumerate().skip(i + 1) {
            if (a - b).norm() < min_dist * 1.001 {
                assert_eq!((i ^ j).count_ones(), 1, "{m:?} labels {i} and {j}");
            }
        }
    }
}

#[rstest]
fn test_noiseless_detection_recovers_symbols(
    #[values((1, 1, 1), (2, 2, 2), (2, 4, 2), (4, 4, 2), (4, 4, 4), (8, 8, 4))] dims: (usize, usize, usize),
    #[values(DetectionAlgorithm::ZeroForcing, DetectionAlgorithm::Mmse)] algorithm: DetectionAlgorithm,
) {
    let (tx, rx, streams) = dims;
    let cfg = Configuration {
        detection_algorithm: algorithm,
        modulation_scheme: Modulation::Qam16,
        ..config(tx, rx, streams)
    };
    let stim = draw(&cfg, ScenarioKind::MaxStreams, 11);
    let Expected::Detected(result) = ReferenceModel::new().predict(&cfg, Stage::Decoder, &stim).unwrap() else {
        panic!("decoder prediction has the wrong kind");
    };
    assert_eq!(result.detection.hard, stim.symbols);
    assert!(result.annotation.is_none());
}

#[test]
fn test_encoder_cycles_streams_over_antennas() {
    let cfg = config(4, 4, 2);
    let stim = draw(&cfg, ScenarioKind::MaxStreams, 3);
    let x = ReferenceModel::new().encode(&cfg, &stim).unwrap();
    assert_eq!(x.shape(), (4, cfg.symbol_width));
    for t in 0..cfg.symbol_width {
        assert_eq!(x.get(0, t), x.get(2, t));
        assert_eq!(x.get(1, t), x.get(3, t));
    }
}

#[rstest]
#[case(DetectionAlgorithm::ZeroForcing)]
#[case(DetectionAlgorithm::Mmse)]
fn test_singular_channel_is_annotated_not_fatal(#[case] algorithm: DetectionAlgorithm) {
    let cfg = Configuration {
        detection_algorithm: algorithm,
        ..config(2, 2, 2)
    };
    let stim = draw(&cfg, ScenarioKind::SingularChannel, 5);
    let expected = ReferenceModel::new().predict(&cfg, Stage::Decoder, &stim).unwrap();
    let Some(Annotation::SingularChannelMatrix { condition_number }) = expected.annotation() else {
        panic!("singular channel was not annotated");
    };
    assert!(*condition_number >= 1e6);
    let Expected::Detected(result) = expected else {
        panic!("decoder prediction has the wrong kind");
    };
    assert!(result.detection.soft.is_finite());
}

#[rstest]
fn test_noiseless_estimate_recovers_channel(
    #[values(PilotPattern::Block, PilotPattern::Dft, PilotPattern::Repeated)] pattern: PilotPattern,
    #[values((2, 2, 1), (4, 8, 2))] dims: (usize, usize, usize),
) {
    let (tx, rx, streams) = dims;
    let cfg = Configuration {
        pilot_pattern: pattern,
        ..config(tx, rx, streams)
    };
    let stim = draw(&cfg, ScenarioKind::Nominal, 9);
    let est = ReferenceModel::new().estimate(&cfg, &stim).unwrap();
    assert!(max_diff(&est.estimate, &stim.channel) < 1e-9);
}

#[test]
fn test_predictions_are_pure() {
    let cfg = Configuration {
        noise_level_class: NoiseClass::High,
        ..config(4, 4, 4)
    };
    let stim = draw(&cfg, ScenarioKind::Nominal, 21);
    let model = ReferenceModel::new();
    for stage in Stage::ALL {
        assert_eq!(
            model.predict(&cfg, stage, &stim).unwrap(),
            model.predict(&cfg, stage, &stim).unwrap()
        );
    }
}

#[test]
fn test_shape_mismatch_rejected() {
    let cfg = config(2, 2, 2);
    let mut stim = draw(&cfg, ScenarioKind::Nominal, 1);
    stim.channel = CMatrix::zeros(4, 4);
    let err = ReferenceModel::new().predict(&cfg, Stage::Decoder, &stim).unwrap_err();
    assert!(matches!(err, VerifyError::ModelInputShapeMismatch { what: "channel", .. }));
}
