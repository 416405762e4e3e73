//! Least-squares channel estimation from known pilots.

use std::f64::consts::PI;

use num_complex::Complex64;

use crate::common::error::{Annotation, Result, VerifyError};
use crate::common::matrix::{CMatrix, SINGULAR_THRESHOLD};
use crate::config::PilotPattern;

/// Channel estimate with its numeric diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimateResult {
    /// Estimated channel, rx × tx.
    pub estimate: CMatrix,
    /// Condition number of the estimate.
    pub condition_number: f64,
    /// Set when the channel or its estimate is singular.
    pub annotation: Option<Annotation>,
}

/// Known pilot symbols `X_p` (tx × slots) for a pattern.
pub fn pilot_matrix(pattern: PilotPattern, tx: usize) -> CMatrix {
    match pattern {
        PilotPattern::Block => CMatrix::identity(tx),
        PilotPattern::Dft => CMatrix::from_fn(tx, tx, |a, k| {
            Complex64::from_polar(1.0, -2.0 * PI * (a * k) as f64 / tx as f64)
        }),
        PilotPattern::Repeated => CMatrix::from_fn(tx, 2 * tx, |a, k| {
            if k % tx == a {
                Complex64::new(1.0, 0.0)
            } else {
                Complex64::new(0.0, 0.0)
            }
        }),
    }
}

/// Least-squares estimate `Ĥ = Y_p X_pᴴ (X_p X_pᴴ)⁻¹`.
pub fn least_squares(received: &CMatrix, pilots: &CMatrix) -> Result<CMatrix> {
    if received.cols() != pilots.cols() {
        return Err(VerifyError::ModelInputShapeMismatch {
            what: "received pilots",
            expected: (received.rows(), pilots.cols()),
            actual: received.shape(),
        });
    }
    let ph = pilots.hermitian();
    let inv = pilots
        .mul(&ph)
        .inverse()
        .ok_or_else(|| VerifyError::Internal("pilot pattern is not full rank".into()))?;
    Ok(received.mul(&ph).mul(&inv))
}

/// Estimates `H` from `Y_p = H X_p + N_p`.
///
/// The result is annotated when either the true channel or the estimate is
/// singular; pilot noise alone usually lifts a rank-deficient `H` to full rank.
pub fn estimate(channel: &CMatrix, pattern: PilotPattern, pilot_noise: &CMatrix) -> Result<EstimateResult> {
    let pilots = pilot_matrix(pattern, channel.cols());
    let expected = (channel.rows(), pilots.cols());
    if pilot_noise.shape() != expected {
        return Err(VerifyError::ModelInputShapeMismatch {
            what: "pilot noise",
            expected,
            actual: pilot_noise.shape(),
        });
    }
    let received = channel.mul(&pilots).add(pilot_noise);
    let estimate = least_squares(&received, &pilots)?;
    let condition_number = estimate.condition_number();
    let annotation = super::singular_channel(channel).or_else(|| {
        (condition_number >= SINGULAR_THRESHOLD).then_some(Annotation::SingularChannelMatrix { condition_number })
    });
    Ok(EstimateResult {
        estimate,
        condition_number,
        annotation,
    })
}
