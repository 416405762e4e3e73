//! Transactions flowing through the DUT boundary.
//!
//! A transaction is an immutable, sequence-numbered record of symbol data seen at
//! one interface point of the pipeline. Stimulus transactions are created by the
//! generator; output transactions are observed from the device under test and
//! carry the fingerprint of the stimulus they were derived from.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::common::fingerprint::Fingerprinter;
use crate::common::matrix::CMatrix;
use crate::config::{Configuration, NoiseClass};

/// Per-session sequence number assigned at stimulus generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeqNum(pub u64);

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Pipeline stage whose output is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Spatial-multiplexing encoder.
    Encoder,
    /// Linear MIMO detector.
    Decoder,
    /// Pilot-based channel estimator.
    ChannelEstimator,
}

impl Stage {
    /// Every stage in pipeline order.
    pub const ALL: [Self; 3] = [Self::Encoder, Self::Decoder, Self::ChannelEstimator];

    /// Dense index, used for per-stage arrays.
    pub const fn index(self) -> usize {
        match self {
            Self::Encoder => 0,
            Self::Decoder => 1,
            Self::ChannelEstimator => 2,
        }
    }

    /// Port on which this stage's output is observed.
    pub const fn output_port(self) -> Port {
        match self {
            Self::Encoder => Port::EncoderOutput,
            Self::Decoder => Port::DecoderOutput,
            Self::ChannelEstimator => Port::EstimateOutput,
        }
    }

    /// Short label for reports.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Encoder => "encoder",
            Self::Decoder => "decoder",
            Self::ChannelEstimator => "estimator",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// Interface point a transaction was applied to or observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Port {
    /// Stimulus applied to the encoder.
    EncoderInput,
    /// Encoded antenna symbols (also the decoder's input before the channel).
    EncoderOutput,
    /// Soft and hard detected symbols.
    DecoderOutput,
    /// Estimated channel matrix.
    EstimateOutput,
}

impl Port {
    /// Stage whose output appears on this port, if any.
    pub const fn stage(self) -> Option<Stage> {
        match self {
            Self::EncoderInput => None,
            Self::EncoderOutput => Some(Stage::Encoder),
            Self::DecoderOutput => Some(Stage::Decoder),
            Self::EstimateOutput => Some(Stage::ChannelEstimator),
        }
    }
}

/// Named scenario a stimulus was drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    /// Random stream count, Rayleigh channel, configured noise class.
    Nominal,
    /// Every configured stream active.
    MaxStreams,
    /// Rank-deficient channel matrix.
    SingularChannel,
    /// Channel with two nearly collinear columns.
    IllConditionedChannel,
    /// Receiver noise at the loudest class.
    ExtremeNoise,
    /// Nominal draw on a configuration at the largest antenna count. Never
    /// drawn at random; the coverage model tracks it from the configuration.
    MaxAntennas,
    /// Exactly this many active streams (directed lists only).
    Streams(usize),
}

impl ScenarioKind {
    /// Scenarios the random generator draws as corner cases.
    pub const CORNER_CASES: [Self; 4] = [
        Self::SingularChannel,
        Self::IllConditionedChannel,
        Self::MaxStreams,
        Self::ExtremeNoise,
    ];

    /// Corner cases the coverage model tracks individually.
    pub const COVERAGE_CORNER_CASES: [Self; 5] = [
        Self::SingularChannel,
        Self::IllConditionedChannel,
        Self::MaxStreams,
        Self::ExtremeNoise,
        Self::MaxAntennas,
    ];

    /// Returns true for corner-case scenarios.
    pub const fn is_corner_case(self) -> bool {
        matches!(
            self,
            Self::SingularChannel
                | Self::IllConditionedChannel
                | Self::MaxStreams
                | Self::ExtremeNoise
                | Self::MaxAntennas
        )
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nominal => f.write_str("nominal"),
            Self::MaxStreams => f.write_str("max_streams"),
            Self::SingularChannel => f.write_str("singular_channel"),
            Self::IllConditionedChannel => f.write_str("ill_conditioned_channel"),
            Self::ExtremeNoise => f.write_str("extreme_noise"),
            Self::MaxAntennas => f.write_str("max_antennas"),
            Self::Streams(n) => write!(f, "streams={n}"),
        }
    }
}

/// Deliberate fault the generator asks the DUT to exhibit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorInjection {
    /// The given stage must not emit an output for this transaction.
    DropOutput(Stage),
}

/// Content of one stimulus: data symbols plus the channel it travels through.
///
/// The channel and noise realisations are part of the stimulus so that the
/// reference model stays a pure function of its inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stimulus {
    /// Scenario this stimulus was drawn from.
    pub scenario: ScenarioKind,
    /// Active spatial streams, `1 ..= num_data_streams`.
    pub active_streams: usize,
    /// Noise class the realisations were drawn with.
    pub noise_class: NoiseClass,
    /// Gray-labelled symbol indices, `active_streams` rows of `symbol_width`.
    pub symbols: Vec<Vec<u16>>,
    /// Channel matrix `H`, rx × tx.
    pub channel: CMatrix,
    /// Additive noise on data symbols, rx × `symbol_width`.
    pub noise: CMatrix,
    /// Additive noise on pilot slots, rx × pilot slots.
    pub pilot_noise: CMatrix,
    /// Requested fault, if this transaction was marked for error injection.
    pub injection: Option<ErrorInjection>,
}

impl Stimulus {
    /// FNV-1a hash over the stimulus content.
    pub fn fingerprint(&self) -> u64 {
        let mut h = Fingerprinter::new();
        h.write_u64(self.active_streams as u64);
        for row in &self.symbols {
            for &s in row {
                h.write_bytes(&s.to_le_bytes());
            }
        }
        for m in [&self.channel, &self.noise, &self.pilot_noise] {
            h.write_u64(m.rows() as u64);
            h.write_u64(m.cols() as u64);
            for &z in m.as_slice() {
                h.write_complex(z);
            }
        }
        h.finish()
    }

    /// Returns true if `stage` was asked to drop its output.
    pub fn drops(&self, stage: Stage) -> bool {
        self.injection == Some(ErrorInjection::DropOutput(stage))
    }
}

/// Soft and hard detector output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Soft symbol estimates, active streams × `symbol_width`.
    pub soft: CMatrix,
    /// Hard decisions (Gray labels), same shape as `soft`.
    pub hard: Vec<Vec<u16>>,
}

/// Data carried by a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// Applied stimulus.
    Stimulus(Box<Stimulus>),
    /// Encoded antenna symbols, tx × `symbol_width`.
    Encoded(CMatrix),
    /// Detector output.
    Detected(Detection),
    /// Channel estimate, rx × tx.
    Estimate(CMatrix),
}

/// A timestamped, sequence-numbered record at one interface point.
#[derive(Debug, Clone)]
pub struct Transaction {
    /// Sequence number shared by a stimulus and all outputs derived from it.
    pub seq: SeqNum,
    /// Driver tick at which the transaction was applied or observed.
    pub tick: u64,
    /// Interface point.
    pub port: Port,
    /// Configuration active when the stimulus was generated.
    pub config: Arc<Configuration>,
    /// For stimuli, the content fingerprint; for outputs, the fingerprint of
    /// the stimulus they were derived from.
    pub fingerprint: u64,
    /// Symbol data.
    pub payload: Payload,
}

impl Transaction {
    /// Creates a stimulus transaction on the encoder input.
    pub fn stimulus(seq: SeqNum, tick: u64, config: Arc<Configuration>, stimulus: Stimulus) -> Self {
        let fingerprint = stimulus.fingerprint();
        Self {
            seq,
            tick,
            port: Port::EncoderInput,
            config,
            fingerprint,
            payload: Payload::Stimulus(Box::new(stimulus)),
        }
    }

    /// Creates an output transaction derived from `origin`.
    pub fn output(origin: &Self, tick: u64, port: Port, payload: Payload) -> Self {
        Self {
            seq: origin.seq,
            tick,
            port,
            config: Arc::clone(&origin.config),
            fingerprint: origin.fingerprint,
            payload,
        }
    }

    /// The stimulus, when this is an applied input.
    pub fn as_stimulus(&self) -> Option<&Stimulus> {
        match &self.payload {
            Payload::Stimulus(s) => Some(s),
            _ => None,
        }
    }

    /// Stage whose output this transaction is, if any.
    pub const fn stage(&self) -> Option<Stage> {
        self.port.stage()
    }
}
