//! Gray-labelled square constellations with unit average energy.

use num_complex::Complex64;

use crate::config::Modulation;

/// Lookup table from Gray label to constellation point.
#[derive(Debug, Clone, PartialEq)]
pub struct Constellation {
    modulation: Modulation,
    points: Vec<Complex64>,
}

impl Constellation {
    /// Builds the table for `modulation`.
    ///
    /// For QAM the label is split into an in-phase half (high bits) and a
    /// quadrature half (low bits); each half is Gray-decoded to a level on a
    /// `2^k`-point PAM axis. BPSK maps label 0 to `+1` and label 1 to `-1`.
    pub fn new(modulation: Modulation) -> Self {
        let points = match modulation {
            Modulation::Bpsk => vec![Complex64::new(1.0, 0.0), Complex64::new(-1.0, 0.0)],
            _ => {
                let half = modulation.bits_per_symbol() / 2;
                let order = modulation.order();
                let scale = (2.0 * (order as f64 - 1.0) / 3.0).sqrt().recip();
                (0..order)
                    .map(|label| {
                        let label = label as u32;
                        let i = pam_level(label >> half, half);
                        let q = pam_level(label & ((1 << half) - 1), half);
                        Complex64::new(i * scale, q * scale)
                    })
                    .collect()
            }
        };
        Self { modulation, points }
    }

    /// Modulation this table was built for.
    pub const fn modulation(&self) -> Modulation {
        self.modulation
    }

    /// All points, indexed by label.
    pub fn points(&self) -> &[Complex64] {
        &self.points
    }

    /// Point for `label`, or `None` when the label is out of range.
    pub fn map(&self, label: u16) -> Option<Complex64> {
        self.points.get(usize::from(label)).copied()
    }

    /// Label of the point nearest to `z`.
    ///
    /// Ties resolve to the lower label. Non-finite input slices to label 0.
    pub fn slice(&self, z: Complex64) -> u16 {
        let mut best = 0usize;
        let mut best_d = f64::INFINITY;
        for (i, p) in self.points.iter().enumerate() {
            let d = (z - p).norm_sqr();
            if d < best_d {
                best_d = d;
                best = i;
            }
        }
        best as u16
    }
}

/// Amplitude `2l - (2^k - 1)` of the level whose Gray code is `gray`.
fn pam_level(gray: u32, bits: u32) -> f64 {
    let mut level = gray;
    let mut shift = gray >> 1;
    while shift != 0 {
        level ^= shift;
        shift >>= 1;
    }
    2.0 * f64::from(level) - f64::from((1u32 << bits) - 1)
}
