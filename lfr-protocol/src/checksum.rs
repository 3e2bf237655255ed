//! Byte-wise Fletcher checksum.
//!
//! Both halves are accumulated modulo 256 (not 255), so the update is a pair
//! of wrapping byte additions. The high byte is the running sum of the input,
//! the low byte is the running sum of the high byte.

/// Folds one byte into a running checksum.
pub fn fletcher(acc: u16, byte: u8) -> u16 {
    let [msb, lsb] = acc.to_be_bytes();
    let msb = msb.wrapping_add(byte);
    let lsb = lsb.wrapping_add(msb);
    u16::from_be_bytes([msb, lsb])
}

/// Computes the checksum of `bytes`, seeded at zero.
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0, |acc, &b| fletcher(acc, b))
}

/// Incremental checksum accumulator.
///
/// Every frame starts from a fresh accumulator; values are never chained
/// across frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Checksum(u16);

impl Checksum {
    pub fn new() -> Self {
        Self(0)
    }

    /// Folds one byte into the accumulator.
    pub fn update(&mut self, byte: u8) {
        self.0 = fletcher(self.0, byte);
    }

    pub fn update_slice(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.update(b);
        }
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }
}
