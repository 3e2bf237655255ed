//! Radio settings and their wire blob.
//!
//! Blob layout (version 1, 7 bytes):
//!
//! ```text
//! +---------+----------------------+-------------------+
//! | version | frequency_hz (u32 BE)| tx_power (u16 BE) |
//! +---------+----------------------+-------------------+
//! ```

use crate::error::CoreError;

/// Current settings blob version.
pub const SETTINGS_VERSION: u8 = 1;

/// Encoded size of a version 1 blob.
pub const SETTINGS_BLOB_LEN: usize = 7;

/// Volatile radio settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioSettings {
    /// Carrier frequency in Hz.
    pub frequency_hz: u32,
    /// Transmit power (PA gate bias, arbitrary units).
    pub tx_power: u16,
}

impl RadioSettings {
    /// Factory settings.
    pub const DEFAULT: RadioSettings = RadioSettings {
        frequency_hz: 435_000_000,
        tx_power: 0x0064,
    };

    pub fn to_blob(&self) -> [u8; SETTINGS_BLOB_LEN] {
        let mut blob = [0u8; SETTINGS_BLOB_LEN];
        blob[0] = SETTINGS_VERSION;
        blob[1..5].copy_from_slice(&self.frequency_hz.to_be_bytes());
        blob[5..7].copy_from_slice(&self.tx_power.to_be_bytes());
        blob
    }

    /// Parses a blob. The first byte is the version tag.
    pub fn from_blob(blob: &[u8]) -> Result<Self, CoreError> {
        let version = match blob.first() {
            Some(&v) => v,
            None => {
                return Err(CoreError::SettingsLength {
                    len: 0,
                    expected: SETTINGS_BLOB_LEN,
                })
            }
        };
        if version != SETTINGS_VERSION {
            return Err(CoreError::UnsupportedSettingsVersion { version });
        }
        if blob.len() != SETTINGS_BLOB_LEN {
            return Err(CoreError::SettingsLength {
                len: blob.len(),
                expected: SETTINGS_BLOB_LEN,
            });
        }

        Ok(Self {
            frequency_hz: u32::from_be_bytes([blob[1], blob[2], blob[3], blob[4]]),
            tx_power: u16::from_be_bytes([blob[5], blob[6]]),
        })
    }
}

impl Default for RadioSettings {
    fn default() -> Self {
        Self::DEFAULT
    }
}
