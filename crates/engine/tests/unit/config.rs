//! # Configuration Tests
//!
//! Defaults, JSON loading, enum aliases, and validation.

use std::io::Write;

use mimoverif_core::VerifyError;
use mimoverif_core::config::*;
use pretty_assertions::assert_eq;
use rstest::rstest;

#[test]
fn test_configuration_defaults() {
    let c = Configuration::default();
    assert_eq!(c.tx_antennas, 2);
    assert_eq!(c.rx_antennas, 2);
    assert_eq!(c.num_data_streams, 2);
    assert_eq!(c.symbol_width, 4);
    assert_eq!(c.data_width, 16);
    assert_eq!(c.modulation_scheme, Modulation::Qpsk);
    assert_eq!(c.detection_algorithm, DetectionAlgorithm::ZeroForcing);
    assert_eq!(c.pilot_pattern, PilotPattern::Block);
    assert_eq!(c.noise_level_class, NoiseClass::Medium);
    assert!(!c.error_injection_enabled);
}

#[test]
fn test_session_option_defaults() {
    let o = SessionOptions::default();
    assert_eq!(o.transaction_count, 100);
    assert_eq!(o.seed, 1);
    assert_eq!(o.mode, GenerationMode::Random);
    assert_eq!(o.coverage_target, 90.0);
    assert_eq!(o.corner_case_weight, 0.3);
    assert_eq!(o.agreement_threshold, 99.9);
    assert_eq!(o.pairing.window, 64);
    assert_eq!(o.pairing.timeout_ticks, 32);
    assert_eq!(o.max_in_flight, 16);
    assert_eq!(o.scoring_workers, 2);
}

#[test]
fn test_empty_document_yields_defaults() {
    let cfg = SessionConfig::from_json_str("{}").unwrap();
    assert_eq!(cfg, SessionConfig::default());
}

#[rstest]
#[case("\"BPSK\"", Modulation::Bpsk)]
#[case("\"QPSK\"", Modulation::Qpsk)]
#[case("\"16QAM\"", Modulation::Qam16)]
#[case("\"Qam64\"", Modulation::Qam64)]
fn test_modulation_aliases(#[case] json: &str, #[case] expected: Modulation) {
    let m: Modulation = serde_json::from_str(json).unwrap();
    assert_eq!(m, expected);
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "configuration": {{ "tx_antennas": 4, "rx_antennas": 4, "num_data_streams": 2 }},
            "options": {{ "seed": 42, "transaction_count": 100, "tolerance_profile": {{
                "symbol_magnitude": {{ "abs_tol": 0.01, "rel_tol": 0.0 }}
            }} }}
        }}"#
    )
    .unwrap();

    let cfg = SessionConfig::load(file.path()).unwrap();
    assert_eq!(cfg.configuration.antenna_label(), "4x4");
    assert_eq!(cfg.options.seed, 42);
    assert_eq!(
        cfg.options.tolerance_profile.get(ToleranceField::SymbolMagnitude),
        Tolerance::new(0.01, 0.0)
    );
    assert_eq!(
        cfg.options.tolerance_profile.get(ToleranceField::SymbolPhase),
        ToleranceField::SymbolPhase.default_tolerance()
    );
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = SessionConfig::load(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, VerifyError::Io(_)));
}

#[test]
fn test_malformed_json_is_json_error() {
    assert!(matches!(SessionConfig::from_json_str("{ nope"), Err(VerifyError::Json(_))));
}

#[rstest]
#[case::bad_antennas(r#"{"configuration": {"tx_antennas": 3}}"#)]
#[case::too_many_streams(r#"{"configuration": {"tx_antennas": 2, "rx_antennas": 8, "num_data_streams": 4}}"#)]
#[case::zero_streams(r#"{"configuration": {"num_data_streams": 0}}"#)]
#[case::wide_symbols(r#"{"configuration": {"symbol_width": 4096}}"#)]
#[case::narrow_data(r#"{"configuration": {"data_width": 2}}"#)]
#[case::weight(r#"{"options": {"corner_case_weight": 1.5}}"#)]
#[case::coverage(r#"{"options": {"coverage_target": 120.0}}"#)]
#[case::window(r#"{"options": {"pairing": {"window": 0}}}"#)]
#[case::workers(r#"{"options": {"scoring_workers": 0}}"#)]
#[case::directed_without_list(r#"{"options": {"mode": "directed"}}"#)]
#[case::negative_tolerance(r#"{"options": {"tolerance_profile": {"symbol_phase": {"abs_tol": -1.0, "rel_tol": 0.0}}}}"#)]
#[case::relative_phase(r#"{"options": {"tolerance_profile": {"estimate_phase": {"abs_tol": 0.01, "rel_tol": 0.1}}}}"#)]
fn test_invalid_documents_rejected(#[case] json: &str) {
    assert!(matches!(
        SessionConfig::from_json_str(json),
        Err(VerifyError::ConfigurationInvalid(_))
    ));
}

#[test]
fn test_tolerance_bound_uses_larger_term() {
    let t = Tolerance::new(1e-3, 0.5);
    assert_eq!(t.bound(0.001), 1e-3);
    assert_eq!(t.bound(-4.0), 2.0);
    assert!(t.accepts(2.0, 4.0));
    assert!(!t.accepts(2.000_000_1, 4.0));
}

#[rstest]
#[case(4, 1.0)]
#[case(8, 0.0625)]
#[case(16, 1.0 / 4096.0)]
#[case(32, 1.0 / 268_435_456.0)]
fn test_fixed_point_step_follows_data_width(#[case] data_width: u32, #[case] step: f64) {
    let cfg = Configuration {
        data_width,
        ..Configuration::default()
    };
    assert_eq!(cfg.fractional_bits(), data_width - FIXED_POINT_INTEGER_BITS);
    assert_eq!(cfg.fixed_point_step(), step);
}

#[test]
fn test_default_tolerances_widen_to_fixed_point_step() {
    let profile = ToleranceProfile::default();
    let coarse = profile.resolve(ToleranceField::SymbolMagnitude, 0.0625, 0.125);
    assert_eq!(coarse, Tolerance::new(0.0625, 1e-3));
    let fine = profile.resolve(ToleranceField::SymbolMagnitude, 1.0 / 4096.0, 0.05);
    assert_eq!(fine, ToleranceField::SymbolMagnitude.default_tolerance());
    let phase = profile.resolve(ToleranceField::EstimatePhase, 0.0625, 0.125);
    assert!((phase.abs_tol - (0.0625 * std::f64::consts::FRAC_1_SQRT_2 / 0.125).asin()).abs() < 1e-15);
    assert_eq!(profile.resolve(ToleranceField::SymbolErrorRate, 1.0, 2.0), Tolerance::new(0.0, 0.0));
}

#[test]
fn test_explicit_tolerance_is_not_widened() {
    let profile = ToleranceProfile::default().with(ToleranceField::SymbolMagnitude, Tolerance::new(1e-4, 0.0));
    assert!(profile.overrides(ToleranceField::SymbolMagnitude));
    assert_eq!(
        profile.resolve(ToleranceField::SymbolMagnitude, 1.0, 2.0),
        Tolerance::new(1e-4, 0.0)
    );
}

#[test]
fn test_noise_variance_follows_snr() {
    assert_eq!(NoiseClass::Noiseless.noise_variance(), 0.0);
    assert!((NoiseClass::Medium.noise_variance() - 0.01).abs() < 1e-15);
    assert!((NoiseClass::Extreme.noise_variance() - 1.0).abs() < 1e-15);
}
