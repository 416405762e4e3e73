//! Common utilities and types shared by every verification component.
//!
//! This module provides the fundamental building blocks of the engine:
//! 1. **Error Handling:** The `VerifyError` taxonomy and non-fatal numeric annotations.
//! 2. **Linear Algebra:** A small dense complex matrix type with inversion and
//!    condition-number estimation.
//! 3. **Fingerprints:** FNV-1a content hashes used to correlate transactions.

/// Error types and annotations.
pub mod error;

/// FNV-1a content fingerprints.
pub mod fingerprint;

/// Dense complex matrices and channel conditioning.
pub mod matrix;

pub use error::{Annotation, Result, VerifyError};
pub use fingerprint::Fingerprinter;
pub use matrix::{CMatrix, ChannelCondition};
