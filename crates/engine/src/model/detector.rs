//! Linear MIMO detection (zero-forcing and MMSE).

use super::constellation::Constellation;
use crate::common::error::Annotation;
use crate::common::matrix::{CMatrix, SINGULAR_THRESHOLD};
use crate::config::DetectionAlgorithm;
use crate::transaction::Detection;

/// Relative Tikhonov load applied to a singular Gram matrix.
const TIKHONOV_SCALE: f64 = 1e-6;

/// Smallest absolute Tikhonov load, used when the Gram trace is zero.
const TIKHONOV_FLOOR: f64 = 1e-12;

/// Detector output with its numeric diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    /// Soft estimates and hard decisions.
    pub detection: Detection,
    /// Condition number of the effective channel.
    pub condition_number: f64,
    /// Set when the regularised fallback was used.
    pub annotation: Option<Annotation>,
}

/// Linear filter `W` (streams × rx) for the effective channel `h_eff`.
///
/// ZF uses `(HᴴH)⁻¹Hᴴ` and MMSE `(HᴴH + σ²I)⁻¹Hᴴ`. When the effective channel
/// is singular the Gram matrix is loaded with `1e-6 · trace / n` and the
/// result is annotated instead of failing.
pub fn filter(
    h_eff: &CMatrix,
    algorithm: DetectionAlgorithm,
    noise_variance: f64,
) -> (CMatrix, f64, Option<Annotation>) {
    let n = h_eff.cols();
    let hh = h_eff.hermitian();
    let gram = hh.mul(h_eff);
    let load = match algorithm {
        DetectionAlgorithm::ZeroForcing => 0.0,
        DetectionAlgorithm::Mmse => noise_variance,
    };
    let condition_number = h_eff.condition_number();

    let direct = if condition_number < SINGULAR_THRESHOLD {
        gram.add_diagonal(load).inverse()
    } else {
        None
    };

    let (inv, annotation) = match direct {
        Some(inv) => (inv, None),
        None => {
            let lambda = (TIKHONOV_SCALE * gram.trace_re() / n.max(1) as f64).max(TIKHONOV_FLOOR);
            let inv = gram
                .add_diagonal(load + lambda)
                .inverse()
                .unwrap_or_else(|| CMatrix::zeros(n, n));
            (inv, Some(Annotation::SingularChannelMatrix { condition_number }))
        }
    };

    (inv.mul(&hh), condition_number, annotation)
}

/// Applies the filter to received symbols `y` (rx × width) and slices.
pub fn detect(
    constellation: &Constellation,
    h_eff: &CMatrix,
    received: &CMatrix,
    algorithm: DetectionAlgorithm,
    noise_variance: f64,
) -> DetectionResult {
    let (w, condition_number, annotation) = filter(h_eff, algorithm, noise_variance);
    let soft = w.mul(received);
    let hard = (0..soft.rows())
        .map(|s| (0..soft.cols()).map(|t| constellation.slice(soft.get(s, t))).collect())
        .collect();
    DetectionResult {
        detection: Detection { soft, hard },
        condition_number,
        annotation,
    }
}

/// Received symbols `y = H x + n`.
pub fn propagate(channel: &CMatrix, transmitted: &CMatrix, noise: &CMatrix) -> CMatrix {
    channel.mul(transmitted).add(noise)
}
