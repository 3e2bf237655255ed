//! Core error types.

use crate::transmitter::TransmitError;
use lfr_protocol::ErrorCode;
use thiserror::Error;

/// Errors raised by command handlers.
///
/// Every variant maps onto a wire [`ErrorCode`]; handlers never fail in a
/// way the peer cannot be told about.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("transmit failed: {0}")]
    Transmit(#[from] TransmitError),

    #[error("payload of {len} bytes does not fit the command")]
    PayloadLength { len: usize },

    #[error("unsupported settings version {version}")]
    UnsupportedSettingsVersion { version: u8 },

    #[error("settings blob is {len} bytes, expected {expected}")]
    SettingsLength { len: usize, expected: usize },

    #[error("settings store not available")]
    StoreUnavailable,

    #[error("settings store error: {reason}")]
    Store { reason: String },
}

impl CoreError {
    /// Returns whether the peer may resend the same command.
    pub fn is_retryable(&self) -> bool {
        self.error_code().is_retryable()
    }

    /// Returns the code carried in the error reply.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            CoreError::Transmit(e) => e.error_code(),
            CoreError::PayloadLength { .. } => ErrorCode::InvalidLength,
            CoreError::UnsupportedSettingsVersion { .. } => ErrorCode::InvalidParam,
            CoreError::SettingsLength { .. } => ErrorCode::InvalidLength,
            CoreError::StoreUnavailable => ErrorCode::NotImplemented,
            CoreError::Store { .. } => ErrorCode::Internal,
        }
    }
}
