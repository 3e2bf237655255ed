//! Command frame format.
//!
//! Request layout (6 bytes overhead + payload):
//!
//! ```text
//! +---------+---------+--------+--------+-----------+--------+--------+
//! | sync_hi | sync_lo |  cmd   |  len   | payload   | chk_hi | chk_lo |
//! |  0xBE   |  0xEF   | 1 byte | 1 byte | len bytes | 1 byte | 1 byte |
//! +---------+---------+--------+--------+-----------+--------+--------+
//! ```
//!
//! The checksum covers `cmd`, `len` and `payload`, seeded at zero. A request
//! always has the high bit of `cmd` clear.

use crate::checksum::Checksum;
use crate::command::Command;
use crate::error::ProtocolError;
use crate::MAX_PAYLOAD_LEN;
use bytes::{BufMut, Bytes, BytesMut};
use std::convert::Infallible;

/// First sync byte.
pub const SYNC_HI: u8 = 0xBE;

/// Second sync byte.
pub const SYNC_LO: u8 = 0xEF;

/// Bytes of framing around the payload of a request.
pub const REQUEST_OVERHEAD: usize = 6;

/// A single-byte output sink.
///
/// Encoders push every emitted byte through `put`, one at a time, so a
/// transport can forward bytes without the encoder buffering a frame.
pub trait ByteSink {
    type Error;

    fn put(&mut self, byte: u8) -> Result<(), Self::Error>;
}

impl ByteSink for Vec<u8> {
    type Error = Infallible;

    fn put(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.push(byte);
        Ok(())
    }
}

impl ByteSink for BytesMut {
    type Error = Infallible;

    fn put(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.put_u8(byte);
        Ok(())
    }
}

impl<S: ByteSink + ?Sized> ByteSink for &mut S {
    type Error = S::Error;

    fn put(&mut self, byte: u8) -> Result<(), Self::Error> {
        (**self).put(byte)
    }
}

/// A validated command frame, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    /// The command to execute.
    pub command: Command,
    /// Payload bytes; length already satisfies the command's rule.
    pub payload: Bytes,
}

impl CommandFrame {
    pub fn new(command: Command, payload: impl Into<Bytes>) -> Self {
        Self {
            command,
            payload: payload.into(),
        }
    }

    /// Encodes the frame as it appears on the uplink.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        encode_command(self.command, &self.payload)
    }
}

/// Encodes a request frame.
///
/// The payload length is checked against the maximum but not against the
/// command's length rule, so tests and tools can build frames the parser
/// must reject.
pub fn encode_command(command: Command, payload: &[u8]) -> Result<BytesMut, ProtocolError> {
    encode_raw(command.id(), payload)
}

/// Encodes a request frame with an arbitrary command byte.
pub fn encode_raw(command_id: u8, payload: &[u8]) -> Result<BytesMut, ProtocolError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLong {
            len: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    let mut buf = BytesMut::with_capacity(REQUEST_OVERHEAD + payload.len());
    buf.put_u8(SYNC_HI);
    buf.put_u8(SYNC_LO);

    let mut chk = Checksum::new();
    for &b in [command_id, payload.len() as u8].iter().chain(payload) {
        chk.update(b);
        buf.put_u8(b);
    }

    buf.put_u16(chk.value());
    Ok(buf)
}
