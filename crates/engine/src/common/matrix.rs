//! Dense complex matrices for the reference model.
//!
//! Channel matrices, precoders, detector weights, and pilot blocks are all
//! small (at most 8x8 plus a time axis), so a flat row-major `Vec<Complex64>`
//! is used instead of a general linear-algebra dependency.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Condition number at or above which a channel counts as ill-conditioned.
pub const ILL_CONDITIONED_THRESHOLD: f64 = 1e2;

/// Condition number at or above which a channel counts as singular.
pub const SINGULAR_THRESHOLD: f64 = 1e6;

/// Relative pivot threshold (squared magnitude) for Gauss-Jordan inversion.
const PIVOT_EPSILON: f64 = 1e-24;

const ZERO: Complex64 = Complex64::new(0.0, 0.0);
const ONE: Complex64 = Complex64::new(1.0, 0.0);

/// Row-major complex matrix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CMatrix {
    rows: usize,
    cols: usize,
    data: Vec<Complex64>,
}

impl CMatrix {
    /// Creates a `rows x cols` matrix of zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![ZERO; rows * cols],
        }
    }

    /// Creates an `n x n` identity matrix.
    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.data[i * n + i] = ONE;
        }
        m
    }

    /// Creates a matrix from flat row-major data.
    ///
    /// Returns `None` when `data.len() != rows * cols`.
    pub fn from_flat(rows: usize, cols: usize, data: Vec<Complex64>) -> Option<Self> {
        (data.len() == rows * cols).then_some(Self { rows, cols, data })
    }

    /// Creates a matrix from a list of equally long rows.
    ///
    /// Returns `None` for ragged input.
    pub fn from_rows(rows: &[Vec<Complex64>]) -> Option<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != cols) {
            return None;
        }
        let data = rows.iter().flatten().copied().collect();
        Some(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// Builds a matrix element-by-element.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> Complex64) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Self { rows, cols, data }
    }

    /// Number of rows.
    #[inline]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[inline]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`.
    #[inline]
    pub const fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Flat row-major view of the elements.
    #[inline]
    pub fn as_slice(&self) -> &[Complex64] {
        &self.data
    }

    /// Mutable flat row-major view of the elements.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [Complex64] {
        &mut self.data
    }

    /// Element `(r, c)`.
    #[inline]
    pub fn get(&self, r: usize, c: usize) -> Complex64 {
        self.data[r * self.cols + c]
    }

    /// Sets element `(r, c)`.
    #[inline]
    pub fn set(&mut self, r: usize, c: usize, val: Complex64) {
        self.data[r * self.cols + c] = val;
    }

    /// Conjugate transpose.
    pub fn hermitian(&self) -> Self {
        Self::from_fn(self.cols, self.rows, |r, c| self.get(c, r).conj())
    }

    /// Matrix product `self * other`.
    pub fn mul(&self, other: &Self) -> Self {
        debug_assert_eq!(self.cols, other.rows, "inner dimensions must agree");
        let mut out = Self::zeros(self.rows, other.cols);
        for r in 0..self.rows {
            for k in 0..self.cols {
                let a = self.get(r, k);
                if a == ZERO {
                    continue;
                }
                for c in 0..other.cols {
                    out.data[r * other.cols + c] += a * other.get(k, c);
                }
            }
        }
        out
    }

    /// Element-wise sum.
    pub fn add(&self, other: &Self) -> Self {
        debug_assert_eq!(self.shape(), other.shape());
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| *a + *b)
            .collect();
        Self {
            rows: self.rows,
            cols: self.cols,
            data,
        }
    }

    /// Multiplies every element by a real scalar.
    pub fn scale(&self, s: f64) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|x| *x * s).collect(),
        }
    }

    /// Returns `self + lambda * I` for a square matrix.
    pub fn add_diagonal(&self, lambda: f64) -> Self {
        let mut out = self.clone();
        for i in 0..self.rows.min(self.cols) {
            out.data[i * self.cols + i] += lambda;
        }
        out
    }

    /// Real part of the trace.
    pub fn trace_re(&self) -> f64 {
        (0..self.rows.min(self.cols)).map(|i| self.get(i, i).re).sum()
    }

    /// Frobenius norm.
    pub fn frobenius_norm(&self) -> f64 {
        self.data.iter().map(Complex64::norm_sqr).sum::<f64>().sqrt()
    }

    /// Largest element-wise magnitude.
    pub fn max_abs(&self) -> f64 {
        self.data.iter().map(|x| x.norm()).fold(0.0, f64::max)
    }

    /// Returns true when every element is finite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|x| x.re.is_finite() && x.im.is_finite())
    }

    /// Inverts a square matrix with Gauss-Jordan elimination and partial pivoting.
    ///
    /// Returns `None` when the matrix is not square or a pivot falls below the
    /// relative singularity threshold.
    pub fn inverse(&self) -> Option<Self> {
        if self.rows != self.cols {
            return None;
        }
        let n = self.rows;
        if n == 0 {
            return Some(Self::zeros(0, 0));
        }
        let scale = self.data.iter().map(Complex64::norm_sqr).fold(0.0, f64::max);
        if scale == 0.0 {
            return None;
        }
        let threshold = scale * PIVOT_EPSILON;

        let width = 2 * n;
        let mut aug = vec![ZERO; n * width];
        for r in 0..n {
            for c in 0..n {
                aug[r * width + c] = self.get(r, c);
            }
            aug[r * width + n + r] = ONE;
        }

        for col in 0..n {
            let (pivot_row, pivot_mag) = (col..n)
                .map(|r| (r, aug[r * width + col].norm_sqr()))
                .fold((col, -1.0), |best, cand| if cand.1 > best.1 { cand } else { best });
            if pivot_mag < threshold {
                return None;
            }
            if pivot_row != col {
                for j in 0..width {
                    aug.swap(col * width + j, pivot_row * width + j);
                }
            }

            let pivot_inv = ONE / aug[col * width + col];
            for j in 0..width {
                aug[col * width + j] *= pivot_inv;
            }

            for r in 0..n {
                if r == col {
                    continue;
                }
                let factor = aug[r * width + col];
                if factor == ZERO {
                    continue;
                }
                for j in 0..width {
                    let v = aug[col * width + j];
                    aug[r * width + j] -= factor * v;
                }
            }
        }

        let inv = Self::from_fn(n, n, |r, c| aug[r * width + n + c]);
        inv.is_finite().then_some(inv)
    }

    /// Gram matrix over the smaller dimension: `HᴴH` when `rows >= cols`,
    /// otherwise `HHᴴ`.
    pub fn gram(&self) -> Self {
        let h = self.hermitian();
        if self.rows >= self.cols {
            h.mul(self)
        } else {
            self.mul(&h)
        }
    }

    /// Estimated 2-norm condition number.
    ///
    /// Uses `sqrt(‖G‖_F · ‖G⁻¹‖_F)` over the Gram matrix `G`, an upper bound of
    /// `κ₂(H)` within a factor of `sqrt(n)`. Returns infinity when `G` cannot
    /// be inverted.
    pub fn condition_number(&self) -> f64 {
        let g = self.gram();
        match g.inverse() {
            Some(inv) => (g.frobenius_norm() * inv.frobenius_norm()).sqrt(),
            None => f64::INFINITY,
        }
    }
}

impl fmt::Display for CMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..self.rows {
            write!(f, "[")?;
            for c in 0..self.cols {
                let v = self.get(r, c);
                if c > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:+.4}{:+.4}i", v.re, v.im)?;
            }
            writeln!(f, "]")?;
        }
        Ok(())
    }
}

/// Conditioning class of a channel matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelCondition {
    /// Condition number below [`ILL_CONDITIONED_THRESHOLD`].
    WellConditioned,
    /// Condition number between the two thresholds.
    IllConditioned,
    /// Condition number at or above [`SINGULAR_THRESHOLD`], or not invertible.
    Singular,
}

impl ChannelCondition {
    /// Every class, in increasing severity.
    pub const ALL: [Self; 3] = [Self::WellConditioned, Self::IllConditioned, Self::Singular];

    /// Classifies a condition number.
    pub fn classify(condition_number: f64) -> Self {
        if condition_number.is_nan() || condition_number >= SINGULAR_THRESHOLD {
            Self::Singular
        } else if condition_number >= ILL_CONDITIONED_THRESHOLD {
            Self::IllConditioned
        } else {
            Self::WellConditioned
        }
    }

    /// Short label used in coverage bin keys.
    pub const fn label(self) -> &'static str {
        match self {
            Self::WellConditioned => "well",
            Self::IllConditioned => "ill",
            Self::Singular => "singular",
        }
    }
}
