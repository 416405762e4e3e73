//! Configuration system for verification sessions.
//!
//! This module defines every structure and enum used to parameterize a run:
//! 1. **Defaults:** Baseline scenario and session constants.
//! 2. **Scenario:** `Configuration`, the immutable description of the MIMO
//!    pipeline under test (antennas, streams, modulation, detection, pilots, noise).
//! 3. **Session:** `SessionOptions`, the knobs of the engine itself (seed, mode,
//!    tolerances, coverage target, pairing window, concurrency).
//! 4. **Loading:** `SessionConfig`, the JSON document accepted by the CLI.
//!
//! Every invariant is checked by `validate`, which reports
//! `VerifyError::ConfigurationInvalid` before any transaction is generated.

use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::{FRAC_1_SQRT_2, PI};
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::error::{Result, VerifyError};
use crate::transaction::ScenarioKind;

/// Default configuration constants.
///
/// These values define the baseline scenario and session when a JSON document
/// leaves a field out.
mod defaults {
    /// Default transmit antenna count.
    pub const TX_ANTENNAS: usize = 2;

    /// Default receive antenna count.
    pub const RX_ANTENNAS: usize = 2;

    /// Default number of spatial streams.
    pub const NUM_DATA_STREAMS: usize = 2;

    /// Symbol periods carried by one transaction.
    pub const SYMBOL_WIDTH: usize = 4;

    /// Fixed-point width of each I/Q component at the DUT boundary.
    pub const DATA_WIDTH: u32 = 16;

    /// Transactions generated per session.
    pub const TRANSACTION_COUNT: usize = 100;

    /// Default random seed.
    pub const SEED: u64 = 1;

    /// Coverage goal in percent.
    pub const COVERAGE_TARGET: f64 = 90.0;

    /// Probability mass given to corner-case scenarios.
    pub const CORNER_CASE_WEIGHT: f64 = 0.3;

    /// Agreement rate (percent) below which a session fails.
    pub const AGREEMENT_THRESHOLD: f64 = 99.9;

    /// Fraction of transactions marked for error injection when enabled.
    pub const INJECTION_RATE: f64 = 0.05;

    /// Pending-input capacity of each pairing buffer.
    pub const PAIRING_WINDOW: usize = 64;

    /// Driver ticks an input may wait for its output.
    pub const PAIRING_TIMEOUT: u64 = 32;

    /// Inputs allowed in flight before the driver stalls.
    pub const MAX_IN_FLIGHT: usize = 16;

    /// Scoring worker threads.
    pub const SCORING_WORKERS: usize = 2;

    /// Magnitude below which phase is not compared.
    pub const PHASE_FLOOR: f64 = 0.05;

    /// Largest accepted symbol width.
    pub const MAX_SYMBOL_WIDTH: usize = 1024;
}

/// Antenna counts a configuration may use.
pub const VALID_ANTENNA_COUNTS: [usize; 4] = [1, 2, 4, 8];

/// Largest antenna count on either side of the link.
pub const MAX_ANTENNAS: usize = VALID_ANTENNA_COUNTS[VALID_ANTENNA_COUNTS.len() - 1];

/// Integer bits (including sign) of each I/Q component at the DUT boundary.
/// The remaining `data_width - FIXED_POINT_INTEGER_BITS` bits are fractional.
pub const FIXED_POINT_INTEGER_BITS: u32 = 4;

/// Constellation used on every stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Modulation {
    /// Binary phase-shift keying.
    #[serde(alias = "BPSK", alias = "bpsk")]
    Bpsk,
    /// Quadrature phase-shift keying.
    #[default]
    #[serde(alias = "QPSK", alias = "qpsk")]
    Qpsk,
    /// 16-point square QAM.
    #[serde(alias = "16QAM", alias = "QAM16", alias = "qam16")]
    Qam16,
    /// 64-point square QAM.
    #[serde(alias = "64QAM", alias = "QAM64", alias = "qam64")]
    Qam64,
}

impl Modulation {
    /// Every modulation, in increasing order.
    pub const ALL: [Self; 4] = [Self::Bpsk, Self::Qpsk, Self::Qam16, Self::Qam64];

    /// Bits carried by one symbol.
    pub const fn bits_per_symbol(self) -> u32 {
        match self {
            Self::Bpsk => 1,
            Self::Qpsk => 2,
            Self::Qam16 => 4,
            Self::Qam64 => 6,
        }
    }

    /// Number of constellation points.
    pub const fn order(self) -> usize {
        1 << self.bits_per_symbol()
    }

    /// Label used in coverage keys and reports.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Bpsk => "BPSK",
            Self::Qpsk => "QPSK",
            Self::Qam16 => "16QAM",
            Self::Qam64 => "64QAM",
        }
    }
}

/// Linear MIMO detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum DetectionAlgorithm {
    /// Zero-forcing: `W = (HᴴH)⁻¹Hᴴ`.
    #[default]
    #[serde(alias = "ZF", alias = "zf")]
    ZeroForcing,
    /// Minimum mean-square error: `W = (HᴴH + σ²I)⁻¹Hᴴ`.
    #[serde(alias = "MMSE", alias = "mmse")]
    Mmse,
}

impl DetectionAlgorithm {
    /// Every detector.
    pub const ALL: [Self; 2] = [Self::ZeroForcing, Self::Mmse];

    /// Label used in coverage keys and reports.
    pub const fn label(self) -> &'static str {
        match self {
            Self::ZeroForcing => "ZF",
            Self::Mmse => "MMSE",
        }
    }
}

/// Pilot arrangement used for channel estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum PilotPattern {
    /// One pilot slot per transmit antenna, antenna `a` active in slot `a`.
    #[default]
    Block,
    /// Columns of a `tx`-point DFT matrix, all antennas active every slot.
    Dft,
    /// The block pattern sent twice; least squares averages the repetitions.
    Repeated,
}

impl PilotPattern {
    /// Every pilot pattern.
    pub const ALL: [Self; 3] = [Self::Block, Self::Dft, Self::Repeated];

    /// Pilot slots needed for `tx` transmit antennas.
    pub const fn slots(self, tx: usize) -> usize {
        match self {
            Self::Block | Self::Dft => tx,
            Self::Repeated => 2 * tx,
        }
    }

    /// Label used in coverage keys and reports.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Dft => "dft",
            Self::Repeated => "repeated",
        }
    }
}

/// Receiver noise level class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum NoiseClass {
    /// No additive noise.
    Noiseless,
    /// 30 dB SNR.
    Low,
    /// 20 dB SNR.
    #[default]
    Medium,
    /// 10 dB SNR.
    High,
    /// 0 dB SNR.
    Extreme,
}

impl NoiseClass {
    /// Every noise class, from quiet to loud.
    pub const ALL: [Self; 5] = [Self::Noiseless, Self::Low, Self::Medium, Self::High, Self::Extreme];

    /// Per-antenna SNR in dB (`None` for noiseless).
    pub const fn snr_db(self) -> Option<f64> {
        match self {
            Self::Noiseless => None,
            Self::Low => Some(30.0),
            Self::Medium => Some(20.0),
            Self::High => Some(10.0),
            Self::Extreme => Some(0.0),
        }
    }

    /// Noise variance `σ² = 1 / SNR` for unit signal power.
    pub fn noise_variance(self) -> f64 {
        self.snr_db().map_or(0.0, |db| 10f64.powf(-db / 10.0))
    }

    /// Label used in coverage keys and reports.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Noiseless => "noiseless",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Extreme => "extreme",
        }
    }
}

/// Immutable description of one test scenario.
///
/// # Examples
///
/// ```
/// use mimoverif_core::config::{Configuration, Modulation};
///
/// let cfg = Configuration {
///     tx_antennas: 4,
///     rx_antennas: 4,
///     num_data_streams: 2,
///     modulation_scheme: Modulation::Qpsk,
///     ..Configuration::default()
/// };
/// assert!(cfg.validate().is_ok());
/// assert_eq!(cfg.antenna_label(), "4x4");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Transmit antennas (1, 2, 4 or 8).
    #[serde(default = "Configuration::default_tx_antennas")]
    pub tx_antennas: usize,

    /// Receive antennas (1, 2, 4 or 8).
    #[serde(default = "Configuration::default_rx_antennas")]
    pub rx_antennas: usize,

    /// Maximum spatial streams, `1 ..= min(tx, rx)`.
    #[serde(default = "Configuration::default_num_data_streams")]
    pub num_data_streams: usize,

    /// Symbol periods per transaction.
    #[serde(default = "Configuration::default_symbol_width")]
    pub symbol_width: usize,

    /// Fixed-point bits per I/Q component at the DUT boundary.
    #[serde(default = "Configuration::default_data_width")]
    pub data_width: u32,

    /// Constellation.
    #[serde(default)]
    pub modulation_scheme: Modulation,

    /// Detector used by the decoder.
    #[serde(default)]
    pub detection_algorithm: DetectionAlgorithm,

    /// Pilot arrangement for channel estimation.
    #[serde(default)]
    pub pilot_pattern: PilotPattern,

    /// Nominal receiver noise class.
    #[serde(default)]
    pub noise_level_class: NoiseClass,

    /// Whether the generator may mark transactions for deliberate output drops.
    #[serde(default)]
    pub error_injection_enabled: bool,
}

impl Configuration {
    fn default_tx_antennas() -> usize {
        defaults::TX_ANTENNAS
    }

    fn default_rx_antennas() -> usize {
        defaults::RX_ANTENNAS
    }

    fn default_num_data_streams() -> usize {
        defaults::NUM_DATA_STREAMS
    }

    fn default_symbol_width() -> usize {
        defaults::SYMBOL_WIDTH
    }

    fn default_data_width() -> u32 {
        defaults::DATA_WIDTH
    }

    /// Largest stream count the antenna pair can carry.
    pub fn stream_limit(&self) -> usize {
        self.tx_antennas.min(self.rx_antennas)
    }

    /// Fractional bits of each I/Q component at the DUT boundary.
    pub fn fractional_bits(&self) -> u32 {
        self.data_width.saturating_sub(FIXED_POINT_INTEGER_BITS).min(31)
    }

    /// Value of one least-significant bit at the DUT boundary.
    pub fn fixed_point_step(&self) -> f64 {
        f64::from(1u32 << self.fractional_bits()).recip()
    }

    /// Whether either side uses [`MAX_ANTENNAS`].
    pub const fn uses_max_antennas(&self) -> bool {
        self.tx_antennas == MAX_ANTENNAS || self.rx_antennas == MAX_ANTENNAS
    }

    /// `"{tx}x{rx}"`, the MIMO mode label.
    pub fn antenna_label(&self) -> String {
        format!("{}x{}", self.tx_antennas, self.rx_antennas)
    }

    /// Checks every configuration invariant.
    pub fn validate(&self) -> Result<()> {
        for (name, n) in [("tx_antennas", self.tx_antennas), ("rx_antennas", self.rx_antennas)] {
            if !VALID_ANTENNA_COUNTS.contains(&n) {
                return Err(invalid(format!("{name}={n} not in {VALID_ANTENNA_COUNTS:?}")));
            }
        }
        if self.num_data_streams == 0 || self.num_data_streams > self.stream_limit() {
            return Err(invalid(format!(
                "num_data_streams={} outside 1..={}",
                self.num_data_streams,
                self.stream_limit()
            )));
        }
        if self.symbol_width == 0 || self.symbol_width > defaults::MAX_SYMBOL_WIDTH {
            return Err(invalid(format!(
                "symbol_width={} outside 1..={}",
                self.symbol_width,
                defaults::MAX_SYMBOL_WIDTH
            )));
        }
        if !(4..=32).contains(&self.data_width) {
            return Err(invalid(format!("data_width={} outside 4..=32", self.data_width)));
        }
        Ok(())
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            tx_antennas: defaults::TX_ANTENNAS,
            rx_antennas: defaults::RX_ANTENNAS,
            num_data_streams: defaults::NUM_DATA_STREAMS,
            symbol_width: defaults::SYMBOL_WIDTH,
            data_width: defaults::DATA_WIDTH,
            modulation_scheme: Modulation::default(),
            detection_algorithm: DetectionAlgorithm::default(),
            pilot_pattern: PilotPattern::default(),
            noise_level_class: NoiseClass::default(),
            error_injection_enabled: false,
        }
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tx={},rx={},streams={},{},{},pilots={},noise={}",
            self.tx_antennas,
            self.rx_antennas,
            self.num_data_streams,
            self.modulation_scheme.label(),
            self.detection_algorithm.label(),
            self.pilot_pattern.label(),
            self.noise_level_class.label()
        )
    }
}

/// How the stimulus generator picks scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Seeded weighted-random scenarios.
    #[default]
    Random,
    /// The directed list, cycled to the transaction count.
    Directed,
    /// The directed list first, then random scenarios.
    Mixed,
}

/// Absolute/relative tolerance for one compared field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    /// Absolute tolerance.
    #[serde(default)]
    pub abs_tol: f64,
    /// Tolerance relative to the expected magnitude. Must be zero for phase
    /// fields, whose deviation is already an angle.
    #[serde(default)]
    pub rel_tol: f64,
}

impl Tolerance {
    /// Creates a tolerance.
    pub const fn new(abs_tol: f64, rel_tol: f64) -> Self {
        Self { abs_tol, rel_tol }
    }

    /// Effective bound for one element: `max(abs_tol, rel_tol * |expected|)`.
    pub fn bound(&self, expected_magnitude: f64) -> f64 {
        self.abs_tol.max(self.rel_tol * expected_magnitude.abs())
    }

    /// Returns true when `deviation` is within the bound (equality passes).
    pub fn accepts(&self, deviation: f64, expected_magnitude: f64) -> bool {
        deviation <= self.bound(expected_magnitude)
    }
}

/// Field a tolerance applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToleranceField {
    /// Magnitude of encoded or soft-detected symbols.
    SymbolMagnitude,
    /// Phase (radians) of encoded or soft-detected symbols.
    SymbolPhase,
    /// Fraction of hard decisions that disagree within one transaction.
    SymbolErrorRate,
    /// Magnitude of channel-estimate entries.
    EstimateMagnitude,
    /// Phase (radians) of channel-estimate entries.
    EstimatePhase,
}

impl ToleranceField {
    /// Every field.
    pub const ALL: [Self; 5] = [
        Self::SymbolMagnitude,
        Self::SymbolPhase,
        Self::SymbolErrorRate,
        Self::EstimateMagnitude,
        Self::EstimatePhase,
    ];

    /// Built-in tolerance when a profile leaves the field out.
    ///
    /// Magnitudes are held tighter than phases; hard decisions must agree
    /// exactly. The scoreboard widens these to the configured fixed-point
    /// step, see [`ToleranceProfile::resolve`].
    pub const fn default_tolerance(self) -> Tolerance {
        match self {
            Self::SymbolMagnitude => Tolerance::new(1e-3, 1e-3),
            Self::SymbolPhase => Tolerance::new(1e-2, 0.0),
            Self::SymbolErrorRate => Tolerance::new(0.0, 0.0),
            Self::EstimateMagnitude => Tolerance::new(2e-3, 1e-3),
            Self::EstimatePhase => Tolerance::new(2e-2, 0.0),
        }
    }

    /// Whether the field is an angle. Angles take an absolute tolerance only.
    pub const fn is_phase(self) -> bool {
        matches!(self, Self::SymbolPhase | Self::EstimatePhase)
    }

    /// Field name as written in tolerance profiles.
    pub const fn name(self) -> &'static str {
        match self {
            Self::SymbolMagnitude => "symbol_magnitude",
            Self::SymbolPhase => "symbol_phase",
            Self::SymbolErrorRate => "symbol_error_rate",
            Self::EstimateMagnitude => "estimate_magnitude",
            Self::EstimatePhase => "estimate_phase",
        }
    }
}

impl fmt::Display for ToleranceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mapping of compared field to tolerance.
///
/// Fields missing from the map use [`ToleranceField::default_tolerance`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToleranceProfile {
    fields: BTreeMap<ToleranceField, Tolerance>,
}

impl ToleranceProfile {
    /// Overrides the tolerance of one field.
    #[must_use]
    pub fn with(mut self, field: ToleranceField, tolerance: Tolerance) -> Self {
        let _ = self.fields.insert(field, tolerance);
        self
    }

    /// Tolerance in force for `field`.
    pub fn get(&self, field: ToleranceField) -> Tolerance {
        self.fields
            .get(&field)
            .copied()
            .unwrap_or_else(|| field.default_tolerance())
    }

    /// Whether the profile sets `field` explicitly.
    pub fn overrides(&self, field: ToleranceField) -> bool {
        self.fields.contains_key(&field)
    }

    /// Tolerance for `field` on a datapath whose least-significant bit is
    /// worth `step`, with phases compared only above `phase_gate`.
    ///
    /// Explicit entries are returned unchanged. Built-in defaults are widened
    /// to what rounding both components to `step` can cause: at most one step
    /// of magnitude, and `asin(step / (√2 · phase_gate))` of phase.
    pub fn resolve(&self, field: ToleranceField, step: f64, phase_gate: f64) -> Tolerance {
        if self.overrides(field) || step <= 0.0 {
            return self.get(field);
        }
        let base = field.default_tolerance();
        let rounding = match field {
            ToleranceField::SymbolMagnitude | ToleranceField::EstimateMagnitude => step,
            ToleranceField::SymbolPhase | ToleranceField::EstimatePhase if phase_gate > 0.0 => {
                (step * FRAC_1_SQRT_2 / phase_gate).min(1.0).asin()
            }
            ToleranceField::SymbolPhase | ToleranceField::EstimatePhase => PI,
            ToleranceField::SymbolErrorRate => 0.0,
        };
        Tolerance::new(base.abs_tol.max(rounding), base.rel_tol)
    }

    fn validate(&self) -> Result<()> {
        for field in ToleranceField::ALL {
            let t = self.get(field);
            let ok = |v: f64| v.is_finite() && v >= 0.0;
            if !ok(t.abs_tol) || !ok(t.rel_tol) {
                return Err(invalid(format!("tolerance for {field} must be finite and >= 0")));
            }
            if field.is_phase() && t.rel_tol != 0.0 {
                return Err(invalid(format!("tolerance for {field} is an angle and takes abs_tol only")));
            }
        }
        Ok(())
    }
}

/// Pairing buffer options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingOptions {
    /// Pending inputs held per stage before the oldest is evicted as dropped.
    #[serde(default = "PairingOptions::default_window")]
    pub window: usize,

    /// Driver ticks an input waits for its output before it is dropped.
    #[serde(default = "PairingOptions::default_timeout_ticks")]
    pub timeout_ticks: u64,

    /// Whether outputs must also match their input's content fingerprint.
    #[serde(default)]
    pub reorder_tolerant: bool,
}

impl PairingOptions {
    fn default_window() -> usize {
        defaults::PAIRING_WINDOW
    }

    fn default_timeout_ticks() -> u64 {
        defaults::PAIRING_TIMEOUT
    }
}

impl Default for PairingOptions {
    fn default() -> Self {
        Self {
            window: defaults::PAIRING_WINDOW,
            timeout_ticks: defaults::PAIRING_TIMEOUT,
            reorder_tolerant: false,
        }
    }
}

/// Session-level options of the verification engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Stimulus transactions to generate.
    #[serde(default = "SessionOptions::default_transaction_count")]
    pub transaction_count: usize,

    /// Seed of the stimulus generator.
    #[serde(default = "SessionOptions::default_seed")]
    pub seed: u64,

    /// Scenario selection policy.
    #[serde(default)]
    pub mode: GenerationMode,

    /// Directed scenario list used by `directed` and `mixed` modes.
    #[serde(default)]
    pub directed: Vec<ScenarioKind>,

    /// Per-field comparison tolerances.
    #[serde(default)]
    pub tolerance_profile: ToleranceProfile,

    /// Magnitude below which phases are not compared.
    #[serde(default = "SessionOptions::default_phase_floor")]
    pub phase_floor: f64,

    /// Coverage goal in percent.
    #[serde(default = "SessionOptions::default_coverage_target")]
    pub coverage_target: f64,

    /// Probability mass of corner-case scenarios in random draws, `[0, 1]`.
    #[serde(default = "SessionOptions::default_corner_case_weight")]
    pub corner_case_weight: f64,

    /// Agreement rate in percent below which the session fails.
    #[serde(default = "SessionOptions::default_agreement_threshold")]
    pub agreement_threshold: f64,

    /// Fraction of transactions marked for error injection, `[0, 1]`.
    #[serde(default = "SessionOptions::default_injection_rate")]
    pub injection_rate: f64,

    /// Pairing buffer options.
    #[serde(default)]
    pub pairing: PairingOptions,

    /// Inputs in flight before the driver applies backpressure.
    #[serde(default = "SessionOptions::default_max_in_flight")]
    pub max_in_flight: usize,

    /// Scoring worker threads.
    #[serde(default = "SessionOptions::default_scoring_workers")]
    pub scoring_workers: usize,

    /// Sequence numbers whose missing outputs are expected (whitelist).
    #[serde(default)]
    pub expected_drops: BTreeSet<u64>,
}

impl SessionOptions {
    fn default_transaction_count() -> usize {
        defaults::TRANSACTION_COUNT
    }

    fn default_seed() -> u64 {
        defaults::SEED
    }

    fn default_phase_floor() -> f64 {
        defaults::PHASE_FLOOR
    }

    fn default_coverage_target() -> f64 {
        defaults::COVERAGE_TARGET
    }

    fn default_corner_case_weight() -> f64 {
        defaults::CORNER_CASE_WEIGHT
    }

    fn default_agreement_threshold() -> f64 {
        defaults::AGREEMENT_THRESHOLD
    }

    fn default_injection_rate() -> f64 {
        defaults::INJECTION_RATE
    }

    fn default_max_in_flight() -> usize {
        defaults::MAX_IN_FLIGHT
    }

    fn default_scoring_workers() -> usize {
        defaults::SCORING_WORKERS
    }

    /// Checks every session option.
    pub fn validate(&self) -> Result<()> {
        let unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        let percent = |v: f64| v.is_finite() && (0.0..=100.0).contains(&v);

        if !unit(self.corner_case_weight) {
            return Err(invalid(format!(
                "corner_case_weight={} outside [0, 1]",
                self.corner_case_weight
            )));
        }
        if !unit(self.injection_rate) {
            return Err(invalid(format!("injection_rate={} outside [0, 1]", self.injection_rate)));
        }
        if !percent(self.coverage_target) {
            return Err(invalid(format!("coverage_target={} outside [0, 100]", self.coverage_target)));
        }
        if !percent(self.agreement_threshold) {
            return Err(invalid(format!(
                "agreement_threshold={} outside [0, 100]",
                self.agreement_threshold
            )));
        }
        if !self.phase_floor.is_finite() || self.phase_floor < 0.0 {
            return Err(invalid("phase_floor must be finite and >= 0".into()));
        }
        if self.pairing.window == 0 || self.pairing.timeout_ticks == 0 {
            return Err(invalid("pairing window and timeout must be non-zero".into()));
        }
        if self.max_in_flight == 0 || self.scoring_workers == 0 {
            return Err(invalid("max_in_flight and scoring_workers must be non-zero".into()));
        }
        if self.mode != GenerationMode::Random && self.directed.is_empty() {
            return Err(invalid(format!("{:?} mode needs a non-empty directed list", self.mode)));
        }
        self.tolerance_profile.validate()
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            transaction_count: defaults::TRANSACTION_COUNT,
            seed: defaults::SEED,
            mode: GenerationMode::default(),
            directed: Vec::new(),
            tolerance_profile: ToleranceProfile::default(),
            phase_floor: defaults::PHASE_FLOOR,
            coverage_target: defaults::COVERAGE_TARGET,
            corner_case_weight: defaults::CORNER_CASE_WEIGHT,
            agreement_threshold: defaults::AGREEMENT_THRESHOLD,
            injection_rate: defaults::INJECTION_RATE,
            pairing: PairingOptions::default(),
            max_in_flight: defaults::MAX_IN_FLIGHT,
            scoring_workers: defaults::SCORING_WORKERS,
            expected_drops: BTreeSet::new(),
        }
    }
}

/// Root document: a scenario plus engine options.
///
/// # Examples
///
/// ```
/// use mimoverif_core::config::{Modulation, SessionConfig};
///
/// let json = r#"{
///     "configuration": {
///         "tx_antennas": 4,
///         "rx_antennas": 4,
///         "num_data_streams": 2,
///         "modulation_scheme": "16QAM",
///         "detection_algorithm": "MMSE"
///     },
///     "options": { "seed": 42, "transaction_count": 10 }
/// }"#;
///
/// let cfg = SessionConfig::from_json_str(json).unwrap();
/// assert_eq!(cfg.configuration.modulation_scheme, Modulation::Qam16);
/// assert_eq!(cfg.options.seed, 42);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Scenario description.
    #[serde(default)]
    pub configuration: Configuration,
    /// Engine options.
    #[serde(default)]
    pub options: SessionOptions,
}

impl SessionConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads, parses, and validates a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Validates both halves.
    pub fn validate(&self) -> Result<()> {
        self.configuration.validate()?;
        self.options.validate()
    }
}

fn invalid(msg: String) -> VerifyError {
    VerifyError::ConfigurationInvalid(msg)
}
