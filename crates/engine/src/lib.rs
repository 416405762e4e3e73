//! MIMO pipeline verification engine.
//!
//! This crate checks a MIMO encoder/decoder/channel-estimator pipeline against a
//! bit-reproducible reference model, with the following:
//! 1. **Model:** Spatial-multiplexing encoder, ZF/MMSE detector, and least-squares channel estimator.
//! 2. **Stimulus:** Seeded constrained-random and directed scenario generation with weighted corner cases.
//! 3. **Pairing:** Sequence-indexed correlation of applied inputs with observed outputs, with timeouts.
//! 4. **Scoring:** Per-field tolerance comparison, verdicts, and running agreement rate.
//! 5. **Coverage:** Declared bins, crosses, and individually tracked corner cases.
//! 6. **Session:** Threaded orchestration against a clocked device under test, with cancellation and reports.

/// Common types (errors, complex matrices, fingerprints).
pub mod common;
/// Pipeline configuration and session options (defaults, enums, validation).
pub mod config;
/// Coverage space, bins, and hit counters.
pub mod coverage;
/// Device-under-test trait and the software pipeline model.
pub mod dut;
/// Reference model of the encoder, detector, and channel estimator.
pub mod model;
/// Input/output pairing buffers.
pub mod pairing;
/// Multi-session regressions.
pub mod regression;
/// Session report and text rendering.
pub mod report;
/// Verdicts, comparison, and aggregation.
pub mod scoreboard;
/// Session orchestration.
pub mod session;
/// Stimulus generation.
pub mod stimulus;
/// Transactions, stages, ports, and scenario kinds.
pub mod transaction;

/// Engine error type and result alias.
pub use crate::common::{Result, VerifyError};
/// Pipeline configuration and the session configuration document.
pub use crate::config::{Configuration, SessionConfig, SessionOptions};
/// Device-under-test boundary and its software implementation.
pub use crate::dut::{DeviceUnderTest, DutFaults, SoftwareDut};
/// Session report.
pub use crate::report::SessionReport;
/// Session entry points.
pub use crate::session::{CancelToken, Session, SessionStatus};
