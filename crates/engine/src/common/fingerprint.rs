//! Content fingerprints for transaction correlation.
//!
//! A 64-bit FNV-1a hash over the raw bit patterns of symbol data. Outputs
//! carry the fingerprint of the input they were produced from, which lets the
//! pairing buffer reject outputs whose sequence number aliases a different
//! input when stages are allowed to reorder.

use num_complex::Complex64;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Incremental FNV-1a hasher.
#[derive(Clone, Copy, Debug)]
pub struct Fingerprinter {
    state: u64,
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

impl Fingerprinter {
    /// Starts a new fingerprint.
    pub const fn new() -> Self {
        Self { state: FNV_OFFSET }
    }

    /// Mixes raw bytes into the fingerprint.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.state ^= u64::from(b);
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
    }

    /// Mixes a `u64` in little-endian order.
    pub fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    /// Mixes a complex sample by its IEEE-754 bit pattern.
    pub fn write_complex(&mut self, z: Complex64) {
        self.write_u64(z.re.to_bits());
        self.write_u64(z.im.to_bits());
    }

    /// Final fingerprint value.
    pub const fn finish(self) -> u64 {
        self.state
    }
}
