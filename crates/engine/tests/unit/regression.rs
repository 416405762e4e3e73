//! # Regression Tests
//!
//! Back-to-back sessions with merged coverage and per-session verdicts.

use mimoverif_core::DeviceUnderTest;
use mimoverif_core::config::SessionConfig;
use mimoverif_core::dut::{DutFaults, SoftwareDut};
use mimoverif_core::regression::Regression;
use mimoverif_core::session::SessionStatus;
use mimoverif_core::transaction::ScenarioKind;

use crate::common::harness::TestSession;

fn config(tx: usize, rx: usize, streams: usize, seed: u64) -> SessionConfig {
    TestSession::new().antennas(tx, rx, streams).seed(seed).transactions(15).config
}

#[test]
fn test_regression_merges_coverage_over_configurations() {
    let regression = Regression::new()
        .with_session(config(1, 1, 1, 1))
        .with_session(config(2, 4, 2, 2))
        .with_session(config(8, 8, 4, 3));
    assert_eq!(regression.len(), 3);

    let report = regression.run().unwrap();
    assert!(report.passed);
    assert_eq!(report.failed_sessions().count(), 0);
    assert_eq!(report.coverage.samples, 45);
    let antennas = report.coverage.categories.iter().find(|c| c.name == "antennas").unwrap();
    assert_eq!(antennas.hit, 3);
    assert!(report.coverage.overall_percent < 100.0);
    let max_antennas = report
        .coverage
        .corner_cases
        .iter()
        .find(|c| c.scenario == ScenarioKind::MaxAntennas)
        .unwrap();
    assert_eq!(max_antennas.hits, 15);
    let injection = report.coverage.categories.iter().find(|c| c.name == "injection").unwrap();
    assert_eq!(injection.hit, 0);
}

#[test]
fn test_faulty_session_fails_regression() {
    let regression = Regression::new()
        .with_session(config(2, 2, 2, 1))
        .with_session(config(4, 4, 2, 2));
    let report = regression
        .run_with(|c| -> Box<dyn DeviceUnderTest> {
            if c.configuration.tx_antennas == 4 {
                let mut faults = DutFaults::default();
                let _ = faults.dropped.insert(3);
                Box::new(SoftwareDut::with_faults(faults))
            } else {
                Box::new(SoftwareDut::new())
            }
        })
        .unwrap();

    assert!(!report.passed);
    let failed: Vec<_> = report.failed_sessions().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].configuration.antenna_label(), "4x4");
    assert_eq!(failed[0].status, SessionStatus::Failed);
}

#[test]
fn test_cancelled_regression_skips_remaining_sessions() {
    let regression = Regression::new().with_session(config(2, 2, 2, 1));
    regression.cancel_token().cancel();
    let report = regression.run().unwrap();
    assert!(report.sessions.is_empty());
    assert!(!report.passed);
}

#[test]
fn test_empty_regression_passes_vacuously() {
    let regression = Regression::new();
    assert!(regression.is_empty());
    let report = regression.run().unwrap();
    assert!(report.passed);
    assert_eq!(report.coverage.samples, 0);
}
