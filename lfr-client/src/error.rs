//! Client error types.

use lfr_protocol::ErrorCode;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] lfr_protocol::ProtocolError),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("request timeout")]
    Timeout,

    #[error("radio error: {code} (status 0x{status:02x})")]
    Radio { code: ErrorCode, status: u8 },

    #[error("unexpected reply 0x{actual:02x} to command 0x{expected:02x}")]
    UnexpectedReply { expected: u8, actual: u8 },

    #[error("malformed reply: {0}")]
    MalformedReply(String),
}

impl ClientError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Io(_) => true,
            ClientError::Timeout => true,
            ClientError::ConnectionClosed => true,
            ClientError::Radio { code, .. } => code.is_retryable(),
            _ => false,
        }
    }

    /// Returns the radio error code, if the radio answered with one.
    pub fn radio_code(&self) -> Option<ErrorCode> {
        match self {
            ClientError::Radio { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<lfr_protocol::ReplyError> for ClientError {
    fn from(err: lfr_protocol::ReplyError) -> Self {
        ClientError::Protocol(err.into())
    }
}
