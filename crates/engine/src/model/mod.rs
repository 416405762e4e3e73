//! Reference model of the MIMO pipeline.
//!
//! The reference model predicts what each pipeline stage should produce for a
//! given stimulus. It is a pure function of the configuration and the stimulus:
//! the channel and noise realisations travel inside the stimulus, and no state
//! is kept between calls, so identical inputs give bit-identical outputs.
//!
//! 1. **Constellations:** Gray-labelled BPSK/QPSK/16QAM/64QAM tables.
//! 2. **Encoder:** Spatial multiplexing with antenna cycling.
//! 3. **Detector:** Zero-forcing and MMSE with a regularised singular fallback.
//! 4. **Estimator:** Least-squares channel estimation over known pilots.

/// Constellation tables and slicing.
pub mod constellation;

/// Linear detection.
pub mod detector;

/// Spatial-multiplexing encoder.
pub mod encoder;

/// Pilot-based channel estimation.
pub mod estimator;

use crate::common::error::{Annotation, Result, VerifyError};
use crate::common::matrix::{CMatrix, SINGULAR_THRESHOLD};
use crate::config::Configuration;
use crate::transaction::{Payload, Stage, Stimulus};

pub use constellation::Constellation;
pub use detector::DetectionResult;
pub use estimator::EstimateResult;

/// Expected output of one stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Expected {
    /// Encoded antenna symbols.
    Encoded(CMatrix),
    /// Detector output and diagnostics.
    Detected(DetectionResult),
    /// Channel estimate and diagnostics.
    Estimate(EstimateResult),
}

impl Expected {
    /// Numeric annotation attached to the prediction.
    pub fn annotation(&self) -> Option<&Annotation> {
        match self {
            Self::Encoded(_) => None,
            Self::Detected(r) => r.annotation.as_ref(),
            Self::Estimate(r) => r.annotation.as_ref(),
        }
    }

    /// Converts the prediction into an output payload.
    pub fn into_payload(self) -> Payload {
        match self {
            Self::Encoded(x) => Payload::Encoded(x),
            Self::Detected(r) => Payload::Detected(r.detection),
            Self::Estimate(r) => Payload::Estimate(r.estimate),
        }
    }
}

/// Stateless predictor for the encoder, decoder, and channel estimator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceModel;

impl ReferenceModel {
    /// Creates a reference model.
    pub const fn new() -> Self {
        Self
    }

    /// Expected encoder output `x = P s` (tx × `symbol_width`).
    pub fn encode(&self, config: &Configuration, stimulus: &Stimulus) -> Result<CMatrix> {
        check_stimulus(config, stimulus)?;
        let constellation = Constellation::new(config.modulation_scheme);
        encoder::encode(&constellation, &stimulus.symbols, config.tx_antennas, config.symbol_width)
    }

    /// Symbols seen by the receiver, `y = H x + n` (rx × `symbol_width`).
    pub fn transmit(&self, config: &Configuration, stimulus: &Stimulus, encoded: &CMatrix) -> Result<CMatrix> {
        check_shape("encoded symbols", (config.tx_antennas, config.symbol_width), encoded)?;
        Ok(detector::propagate(&stimulus.channel, encoded, &stimulus.noise))
    }

    /// Expected detector output for received symbols `y`.
    pub fn decode(&self, config: &Configuration, stimulus: &Stimulus, received: &CMatrix) -> Result<DetectionResult> {
        check_stimulus(config, stimulus)?;
        check_shape("received symbols", (config.rx_antennas, config.symbol_width), received)?;
        let constellation = Constellation::new(config.modulation_scheme);
        let h_eff = stimulus
            .channel
            .mul(&encoder::precoder(config.tx_antennas, stimulus.active_streams));
        let mut result = detector::detect(
            &constellation,
            &h_eff,
            received,
            config.detection_algorithm,
            stimulus.noise_class.noise_variance(),
        );
        // A rank-deficient H can still give a full-rank H·P with fewer streams.
        if result.annotation.is_none() {
            result.annotation = singular_channel(&stimulus.channel);
        }
        Ok(result)
    }

    /// Expected channel estimate from the stimulus pilots.
    pub fn estimate(&self, config: &Configuration, stimulus: &Stimulus) -> Result<EstimateResult> {
        check_stimulus(config, stimulus)?;
        estimator::estimate(&stimulus.channel, config.pilot_pattern, &stimulus.pilot_noise)
    }

    /// Expected output of `stage` for `stimulus`.
    pub fn predict(&self, config: &Configuration, stage: Stage, stimulus: &Stimulus) -> Result<Expected> {
        match stage {
            Stage::Encoder => self.encode(config, stimulus).map(Expected::Encoded),
            Stage::Decoder => {
                let x = self.encode(config, stimulus)?;
                let y = self.transmit(config, stimulus, &x)?;
                self.decode(config, stimulus, &y).map(Expected::Detected)
            }
            Stage::ChannelEstimator => self.estimate(config, stimulus).map(Expected::Estimate),
        }
    }
}

/// Annotation for a channel at or past [`SINGULAR_THRESHOLD`].
pub fn singular_channel(channel: &CMatrix) -> Option<Annotation> {
    let condition_number = channel.condition_number();
    (condition_number >= SINGULAR_THRESHOLD).then_some(Annotation::SingularChannelMatrix { condition_number })
}

/// Checks a stimulus against the dimensions implied by `config`.
pub fn check_stimulus(config: &Configuration, stimulus: &Stimulus) -> Result<()> {
    let streams = stimulus.active_streams;
    if streams == 0 || streams > config.num_data_streams || stimulus.symbols.len() != streams {
        return Err(VerifyError::ModelInputShapeMismatch {
            what: "symbol streams",
            expected: (config.num_data_streams, config.symbol_width),
            actual: (stimulus.symbols.len(), stimulus.symbols.first().map_or(0, Vec::len)),
        });
    }
    if let Some(row) = stimulus.symbols.iter().find(|r| r.len() != config.symbol_width) {
        return Err(VerifyError::ModelInputShapeMismatch {
            what: "symbol streams",
            expected: (streams, config.symbol_width),
            actual: (streams, row.len()),
        });
    }
    check_shape("channel", (config.rx_antennas, config.tx_antennas), &stimulus.channel)?;
    check_shape("noise", (config.rx_antennas, config.symbol_width), &stimulus.noise)?;
    check_shape(
        "pilot noise",
        (config.rx_antennas, config.pilot_pattern.slots(config.tx_antennas)),
        &stimulus.pilot_noise,
    )
}

fn check_shape(what: &'static str, expected: (usize, usize), m: &CMatrix) -> Result<()> {
    if m.shape() == expected {
        Ok(())
    } else {
        Err(VerifyError::ModelInputShapeMismatch {
            what,
            expected,
            actual: m.shape(),
        })
    }
}
