//! Spatial-multiplexing encoder.
//!
//! Antenna `a` carries stream `a mod streams`, scaled so that the total
//! transmit power equals the number of active streams.

use num_complex::Complex64;

use super::constellation::Constellation;
use crate::common::error::{Result, VerifyError};
use crate::common::matrix::CMatrix;

/// Precoder `P` (tx × streams) implementing antenna cycling.
pub fn precoder(tx: usize, streams: usize) -> CMatrix {
    let gain = (streams as f64 / tx as f64).sqrt();
    CMatrix::from_fn(tx, streams, |a, s| {
        if streams > 0 && a % streams == s {
            Complex64::new(gain, 0.0)
        } else {
            Complex64::new(0.0, 0.0)
        }
    })
}

/// Maps Gray labels to constellation points, one row per stream.
pub fn modulate(constellation: &Constellation, symbols: &[Vec<u16>], width: usize) -> Result<CMatrix> {
    let mut out = CMatrix::zeros(symbols.len(), width);
    for (s, row) in symbols.iter().enumerate() {
        if row.len() != width {
            return Err(VerifyError::ModelInputShapeMismatch {
                what: "symbol stream",
                expected: (symbols.len(), width),
                actual: (symbols.len(), row.len()),
            });
        }
        for (t, &label) in row.iter().enumerate() {
            let point = constellation.map(label).ok_or(VerifyError::SymbolOutOfRange {
                label,
                order: constellation.points().len(),
            })?;
            out.set(s, t, point);
        }
    }
    Ok(out)
}

/// Encodes stream symbols onto `tx` antennas: `x = P s`.
pub fn encode(constellation: &Constellation, symbols: &[Vec<u16>], tx: usize, width: usize) -> Result<CMatrix> {
    let s = modulate(constellation, symbols, width)?;
    Ok(precoder(tx, symbols.len()).mul(&s))
}
