//! Reply frames.
//!
//! Reply layout (7 bytes overhead + payload):
//!
//! ```text
//! +---------+---------+--------+----------+--------+-----------+--------+--------+
//! | sync_hi | sync_lo | status | cmd|0x80 |  len   | payload   | chk_hi | chk_lo |
//! +---------+---------+--------+----------+--------+-----------+--------+--------+
//! ```
//!
//! The checksum covers `status`, `cmd`, `len` and `payload`, seeded at zero.
//! An error reply is a reply to `REPLY_ERR` carrying exactly one byte, the
//! [`ErrorCode`].

use crate::checksum::Checksum;
use crate::command::{REPLY_ERR, RXDATA};
use crate::error::{ErrorCode, ProtocolError, ReplyError};
use crate::frame::{ByteSink, SYNC_HI, SYNC_LO};
use crate::{MAX_PAYLOAD_LEN, REPLY_BIT};
use bytes::{Bytes, BytesMut};
use std::convert::Infallible;
use thiserror::Error;

/// Bytes of framing around the payload of a reply.
pub const REPLY_OVERHEAD: usize = 7;

/// Command byte of every error reply.
pub const ERROR_REPLY_ID: u8 = REPLY_ERR | REPLY_BIT;

/// Errors raised while pushing a reply into a sink.
#[derive(Debug, Error)]
pub enum EncodeError<E> {
    #[error("payload too long: {len} bytes (max {max})")]
    PayloadTooLong { len: usize, max: usize },

    #[error("sink error: {0}")]
    Sink(E),
}

impl From<EncodeError<Infallible>> for ProtocolError {
    fn from(err: EncodeError<Infallible>) -> Self {
        match err {
            EncodeError::PayloadTooLong { len, max } => ProtocolError::PayloadTooLong { len, max },
            EncodeError::Sink(never) => match never {},
        }
    }
}

impl From<EncodeError<std::io::Error>> for ProtocolError {
    fn from(err: EncodeError<std::io::Error>) -> Self {
        match err {
            EncodeError::PayloadTooLong { len, max } => ProtocolError::PayloadTooLong { len, max },
            EncodeError::Sink(e) => ProtocolError::Io(e),
        }
    }
}

/// Emits a success reply for `command_id` through `sink`, one byte at a time.
///
/// The reply bit is set on `command_id` here; callers pass the request id.
/// An oversized payload is rejected before anything is emitted.
pub fn encode_reply<S: ByteSink>(
    sink: &mut S,
    status: u8,
    command_id: u8,
    payload: &[u8],
) -> Result<(), EncodeError<S::Error>> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(EncodeError::PayloadTooLong {
            len: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    sink.put(SYNC_HI).map_err(EncodeError::Sink)?;
    sink.put(SYNC_LO).map_err(EncodeError::Sink)?;

    let mut chk = Checksum::new();
    let header = [status, command_id | REPLY_BIT, payload.len() as u8];
    for &b in header.iter().chain(payload) {
        chk.update(b);
        sink.put(b).map_err(EncodeError::Sink)?;
    }

    for b in chk.value().to_be_bytes() {
        sink.put(b).map_err(EncodeError::Sink)?;
    }
    Ok(())
}

/// Emits an error reply carrying `code`.
pub fn encode_error<S: ByteSink>(
    sink: &mut S,
    status: u8,
    code: ErrorCode,
) -> Result<(), EncodeError<S::Error>> {
    encode_reply(sink, status, REPLY_ERR, &[code.as_u8()])
}

/// A reply produced by a handler, before the status byte is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Success reply to `command` (request id, reply bit not yet set).
    Success { command: u8, payload: Bytes },
    /// Error reply.
    Error(ErrorCode),
}

impl Reply {
    /// Empty success reply.
    pub fn ok(command: u8) -> Self {
        Reply::Success {
            command,
            payload: Bytes::new(),
        }
    }

    pub fn with_payload(command: u8, payload: impl Into<Bytes>) -> Self {
        Reply::Success {
            command,
            payload: payload.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Writes the reply into any sink.
    pub fn encode_into<S: ByteSink>(
        &self,
        sink: &mut S,
        status: u8,
    ) -> Result<(), EncodeError<S::Error>> {
        match self {
            Reply::Success { command, payload } => encode_reply(sink, status, *command, payload),
            Reply::Error(code) => encode_error(sink, status, *code),
        }
    }

    /// Encodes the reply into a fresh buffer.
    pub fn encode(&self, status: u8) -> Result<BytesMut, ProtocolError> {
        let len = match self {
            Reply::Success { payload, .. } => payload.len(),
            Reply::Error(_) => 1,
        };
        let mut buf = BytesMut::with_capacity(REPLY_OVERHEAD + len);
        self.encode_into(&mut buf, status)?;
        Ok(buf)
    }
}

/// A reply frame as decoded on the ground side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyFrame {
    /// Status register at the time of the reply.
    pub status: u8,
    /// Command byte as sent, reply bit included.
    pub command: u8,
    pub payload: Bytes,
}

impl ReplyFrame {
    /// Request id this frame replies to.
    pub fn base_command(&self) -> u8 {
        self.command & !REPLY_BIT
    }

    pub fn is_error(&self) -> bool {
        self.command == ERROR_REPLY_ID
    }

    /// Returns true for unsolicited received-packet frames.
    pub fn is_rx_data(&self) -> bool {
        self.base_command() == RXDATA
    }

    /// Error code of an error reply. `None` for success replies and for
    /// error replies with an unknown or missing code.
    pub fn error_code(&self) -> Option<ErrorCode> {
        if !self.is_error() {
            return None;
        }
        self.payload.first().copied().and_then(ErrorCode::from_u8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Sync0,
    Sync1,
    Status,
    Command,
    Length,
    Payload,
    ChecksumHi,
    ChecksumLo,
}

/// Streaming reply decoder.
///
/// Resynchronises on the sync word exactly like [`crate::CommandParser`]
/// does for requests.
pub struct ReplyDecoder {
    state: DecodeState,
    status: u8,
    command: u8,
    len: usize,
    payload: BytesMut,
    received: u16,
    computed: Checksum,
}

impl ReplyDecoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Sync0,
            status: 0,
            command: 0,
            len: 0,
            payload: BytesMut::with_capacity(MAX_PAYLOAD_LEN),
            received: 0,
            computed: Checksum::new(),
        }
    }

    /// Consumes one byte; returns a frame when the byte completes one.
    pub fn push(&mut self, byte: u8) -> Result<Option<ReplyFrame>, ReplyError> {
        match self.state {
            DecodeState::Sync0 => {
                if byte == SYNC_HI {
                    self.state = DecodeState::Sync1;
                }
            }
            DecodeState::Sync1 => {
                if byte == SYNC_LO {
                    self.state = DecodeState::Status;
                } else if byte != SYNC_HI {
                    self.state = DecodeState::Sync0;
                }
            }
            DecodeState::Status => {
                self.computed.reset();
                self.computed.update(byte);
                self.status = byte;
                self.state = DecodeState::Command;
            }
            DecodeState::Command => {
                if byte & REPLY_BIT == 0 {
                    self.reset();
                    return Err(ReplyError::NotAReply(byte));
                }
                self.computed.update(byte);
                self.command = byte;
                self.state = DecodeState::Length;
            }
            DecodeState::Length => {
                self.computed.update(byte);
                self.len = byte as usize;
                self.payload.clear();
                self.state = if byte == 0 {
                    DecodeState::ChecksumHi
                } else {
                    DecodeState::Payload
                };
            }
            DecodeState::Payload => {
                self.computed.update(byte);
                self.payload.extend_from_slice(&[byte]);
                if self.payload.len() == self.len {
                    self.state = DecodeState::ChecksumHi;
                }
            }
            DecodeState::ChecksumHi => {
                self.received = u16::from(byte) << 8;
                self.state = DecodeState::ChecksumLo;
            }
            DecodeState::ChecksumLo => {
                let received = self.received | u16::from(byte);
                let computed = self.computed.value();
                let frame = ReplyFrame {
                    status: self.status,
                    command: self.command,
                    payload: self.payload.split().freeze(),
                };
                self.reset();

                if received != computed {
                    return Err(ReplyError::ChecksumMismatch {
                        expected: computed,
                        actual: received,
                    });
                }
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }

    /// Feeds a slice and collects every frame or error, in order.
    pub fn push_slice(&mut self, data: &[u8]) -> Vec<Result<ReplyFrame, ReplyError>> {
        data.iter()
            .filter_map(|&b| self.push(b).transpose())
            .collect()
    }

    pub fn reset(&mut self) {
        self.state = DecodeState::Sync0;
        self.len = 0;
        self.payload.clear();
        self.received = 0;
        self.computed.reset();
    }
}

impl Default for ReplyDecoder {
    fn default() -> Self {
        Self::new()
    }
}
