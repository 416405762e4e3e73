//! Verification error taxonomy and numeric annotations.
//!
//! This module defines how failures travel through the engine. It provides:
//! 1. **Errors:** `VerifyError`, covering configuration rejection, model shape
//!    mismatches, pairing exhaustion, and config-file loading.
//! 2. **Annotations:** Non-fatal numeric findings (singular channels) that are
//!    carried into verdicts instead of aborting a computation.
//!
//! Per-transaction problems never abort a session; only `ConfigurationInvalid`
//! and `PairingBufferExhausted` stop a run early.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Errors raised by the verification engine.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// A configuration or session option violates an invariant.
    ///
    /// Fatal at session start: no transaction is generated.
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// A vector or matrix handed to the reference model disagrees with the
    /// dimensions implied by the active configuration.
    ///
    /// Fatal to that single computation only.
    #[error("model input shape mismatch: {what} is {actual:?}, expected {expected:?}")]
    ModelInputShapeMismatch {
        /// Which operand was malformed.
        what: &'static str,
        /// Shape required by the configuration (rows, cols).
        expected: (usize, usize),
        /// Shape actually supplied (rows, cols).
        actual: (usize, usize),
    },

    /// A symbol label does not exist in the configured constellation.
    #[error("symbol label {label} outside constellation of order {order}")]
    SymbolOutOfRange {
        /// Offending label.
        label: u16,
        /// Constellation size.
        order: usize,
    },

    /// A channel matrix was singular or ill-conditioned.
    ///
    /// The reference model reports this as an [`Annotation`]; the variant exists
    /// so callers that insist on well-conditioned channels can promote it.
    #[error("singular channel matrix (condition number {0:e})")]
    SingularChannelMatrix(f64),

    /// An output for the given sequence number did not arrive in time.
    #[error("pairing timeout for sequence {0}")]
    PairingTimeout(u64),

    /// More early outputs were parked than the pairing window can hold.
    #[error("pairing buffer exhausted: {parked} early outputs parked, capacity {capacity}")]
    PairingBufferExhausted {
        /// Number of outputs waiting for their input.
        parked: usize,
        /// Configured window capacity.
        capacity: usize,
    },

    /// A transaction matched no declared coverage bin.
    #[error("no coverage bin declared for {dimension}={value}")]
    CoverageBinUndefined {
        /// Dimension name.
        dimension: String,
        /// Offending value label.
        value: String,
    },

    /// The session was cancelled before completion.
    #[error("session cancelled")]
    Cancelled,

    /// A worker thread panicked.
    #[error("internal error: {0}")]
    Internal(String),

    /// Reading a configuration file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing a configuration document failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Engine-wide result alias.
pub type Result<T> = std::result::Result<T, VerifyError>;

/// Non-fatal numeric finding attached to a model result and its verdict.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Annotation {
    /// The channel (or its estimate) was singular or badly conditioned and a
    /// regularised fallback was used.
    SingularChannelMatrix {
        /// Estimated 2-norm condition number; `f64::INFINITY` when the Gram
        /// matrix could not be inverted.
        condition_number: f64,
    },
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingularChannelMatrix { condition_number } => {
                write!(f, "SingularChannelMatrix(cond={condition_number:.3e})")
            }
        }
    }
}
