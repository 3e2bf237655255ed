//! Protocol error types and error codes.

use std::fmt;
use thiserror::Error;

/// Errors raised by the command frame parser.
///
/// Each variant has already reset the parser; the stream stays usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid command id {0:#04x}")]
    InvalidCommand(u8),

    #[error("invalid payload length {len} for command {command:#04x}")]
    InvalidLength { command: u8, len: u8 },

    #[error("checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },
}

impl ParseError {
    /// Returns the code reported to the peer in the error reply.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ParseError::InvalidCommand(_) => ErrorCode::InvalidCommand,
            ParseError::InvalidLength { .. } => ErrorCode::InvalidLength,
            ParseError::ChecksumMismatch { .. } => ErrorCode::ChecksumMismatch,
        }
    }
}

/// Errors raised by the KISS decoder. Each one discards the current frame only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KissError {
    #[error("KISS frame exceeds {max} byte buffer")]
    Overflow { max: usize },

    #[error("invalid KISS transpose byte {0:#04x}")]
    InvalidTranspose(u8),

    #[error("unknown KISS command {0:#04x}")]
    UnknownCommand(u8),

    #[error("KISS payload too long: {len} bytes (max {max})")]
    PayloadTooLong { len: usize, max: usize },
}

/// Errors raised while decoding reply frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReplyError {
    #[error("reply checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("reply command {0:#04x} does not carry the reply bit")]
    NotAReply(u8),
}

/// Protocol-level errors that can occur while encoding or moving frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("payload too long: {len} bytes (max {max})")]
    PayloadTooLong { len: usize, max: usize },

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("KISS error: {0}")]
    Kiss(#[from] KissError),

    #[error("reply error: {0}")]
    Reply(#[from] ReplyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable error codes carried as the single payload byte of an error reply.
///
/// These values are part of the wire contract. The low codes are the radio
/// driver's own error numbers; the command link adds its own above them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    // Radio driver errors
    Timeout = 0x01,
    WrongPart = 0x02,
    InvalidParam = 0x03,
    InvalidState = 0x04,
    TooLong = 0x05,
    Busy = 0x07,
    RxTimeout = 0x08,

    // Command link errors
    InvalidCommand = 0x13,
    InvalidLength = 0x14,
    ChecksumMismatch = 0x16,

    // System errors
    Internal = 0x7E,
    NotImplemented = 0x7F,
}

impl ErrorCode {
    /// Decodes a wire value.
    pub fn from_u8(code: u8) -> Option<Self> {
        Some(match code {
            0x01 => ErrorCode::Timeout,
            0x02 => ErrorCode::WrongPart,
            0x03 => ErrorCode::InvalidParam,
            0x04 => ErrorCode::InvalidState,
            0x05 => ErrorCode::TooLong,
            0x07 => ErrorCode::Busy,
            0x08 => ErrorCode::RxTimeout,
            0x13 => ErrorCode::InvalidCommand,
            0x14 => ErrorCode::InvalidLength,
            0x16 => ErrorCode::ChecksumMismatch,
            0x7E => ErrorCode::Internal,
            0x7F => ErrorCode::NotImplemented,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns whether the peer may simply resend the same command.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::Busy | ErrorCode::Timeout | ErrorCode::ChecksumMismatch
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Timeout => write!(f, "TIMEOUT"),
            ErrorCode::WrongPart => write!(f, "WRONG_PART"),
            ErrorCode::InvalidParam => write!(f, "INVALID_PARAM"),
            ErrorCode::InvalidState => write!(f, "INVALID_STATE"),
            ErrorCode::TooLong => write!(f, "TOO_LONG"),
            ErrorCode::Busy => write!(f, "BUSY"),
            ErrorCode::RxTimeout => write!(f, "RX_TIMEOUT"),
            ErrorCode::InvalidCommand => write!(f, "INVALID_COMMAND"),
            ErrorCode::InvalidLength => write!(f, "INVALID_LENGTH"),
            ErrorCode::ChecksumMismatch => write!(f, "CHECKSUM_MISMATCH"),
            ErrorCode::Internal => write!(f, "INTERNAL_ERROR"),
            ErrorCode::NotImplemented => write!(f, "NOT_IMPLEMENTED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ErrorCode; 12] = [
        ErrorCode::Timeout,
        ErrorCode::WrongPart,
        ErrorCode::InvalidParam,
        ErrorCode::InvalidState,
        ErrorCode::TooLong,
        ErrorCode::Busy,
        ErrorCode::RxTimeout,
        ErrorCode::InvalidCommand,
        ErrorCode::InvalidLength,
        ErrorCode::ChecksumMismatch,
        ErrorCode::Internal,
        ErrorCode::NotImplemented,
    ];

    #[test]
    fn test_error_code_wire_values() {
        assert_eq!(ErrorCode::InvalidCommand.as_u8(), 0x13);
        assert_eq!(ErrorCode::InvalidLength.as_u8(), 0x14);
        assert_eq!(ErrorCode::ChecksumMismatch.as_u8(), 0x16);
        assert_eq!(ErrorCode::NotImplemented.as_u8(), 127);

        for code in ALL {
            assert!(code.as_u8() > 0);
            assert_eq!(ErrorCode::from_u8(code.as_u8()), Some(code));
        }
    }

    #[test]
    fn test_unknown_error_code() {
        assert_eq!(ErrorCode::from_u8(0x00), None);
        assert_eq!(ErrorCode::from_u8(0x06), None);
        assert_eq!(ErrorCode::from_u8(0xFF), None);
    }

    #[test]
    fn test_error_code_retryable() {
        assert!(ErrorCode::Busy.is_retryable());
        assert!(ErrorCode::ChecksumMismatch.is_retryable());

        assert!(!ErrorCode::InvalidCommand.is_retryable());
        assert!(!ErrorCode::InvalidLength.is_retryable());
        assert!(!ErrorCode::NotImplemented.is_retryable());
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(format!("{}", ErrorCode::Busy), "BUSY");
        assert_eq!(
            format!("{}", ErrorCode::ChecksumMismatch),
            "CHECKSUM_MISMATCH"
        );
        assert_eq!(format!("{}", ErrorCode::Internal), "INTERNAL_ERROR");
        assert_eq!(format!("{}", ErrorCode::NotImplemented), "NOT_IMPLEMENTED");
    }

    #[test]
    fn test_parse_error_codes() {
        assert_eq!(
            ParseError::InvalidCommand(0x55).error_code(),
            ErrorCode::InvalidCommand
        );
        assert_eq!(
            ParseError::InvalidLength {
                command: 0x26,
                len: 3
            }
            .error_code(),
            ErrorCode::InvalidLength
        );
        assert_eq!(
            ParseError::ChecksumMismatch {
                expected: 1,
                actual: 2
            }
            .error_code(),
            ErrorCode::ChecksumMismatch
        );
    }

    #[test]
    fn test_error_display() {
        let err = ParseError::InvalidCommand(0x55);
        assert!(err.to_string().contains("0x55"));

        let err = ParseError::ChecksumMismatch {
            expected: 0xABCD,
            actual: 0x1234,
        };
        let msg = err.to_string();
        assert!(msg.contains("abcd"));
        assert!(msg.contains("1234"));

        let err = KissError::Overflow { max: 512 };
        assert!(err.to_string().contains("512"));

        let err = ProtocolError::PayloadTooLong { len: 300, max: 255 };
        assert!(err.to_string().contains("300"));
    }
}
