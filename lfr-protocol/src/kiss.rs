//! KISS framing for raw radio payloads.
//!
//! ```text
//! FEND | 0x00 | escaped payload | FEND
//! ```
//!
//! Inside a frame `FEND` is sent as `FESC TFEND` and `FESC` as `FESC TFESC`,
//! so a bare `FEND` only ever appears as a frame boundary.

use crate::error::KissError;
use crate::frame::ByteSink;
use crate::MAX_PAYLOAD_LEN;
use bytes::{BufMut, Bytes, BytesMut};

/// Frame delimiter.
pub const FEND: u8 = 0xC0;
/// Escape byte.
pub const FESC: u8 = 0xDB;
/// Transposed `FEND`.
pub const TFEND: u8 = 0xDC;
/// Transposed `FESC`.
pub const TFESC: u8 = 0xDD;

/// KISS command for a data frame on port 0.
pub const CMD_DATA: u8 = 0x00;

/// Capacity of the decode buffer, command byte included.
pub const KISS_BUF_SIZE: usize = 512;

/// Writes a data frame carrying `payload` into `sink`.
pub fn encode_into<S: ByteSink>(sink: &mut S, payload: &[u8]) -> Result<(), S::Error> {
    sink.put(FEND)?;
    sink.put(CMD_DATA)?;
    for &b in payload {
        match b {
            FEND => {
                sink.put(FESC)?;
                sink.put(TFEND)?;
            }
            FESC => {
                sink.put(FESC)?;
                sink.put(TFESC)?;
            }
            _ => sink.put(b)?,
        }
    }
    sink.put(FEND)
}

/// Encodes a data frame into a fresh buffer.
pub fn encode(payload: &[u8]) -> BytesMut {
    let escapes = payload.iter().filter(|&&b| b == FEND || b == FESC).count();
    let mut buf = BytesMut::with_capacity(payload.len() + escapes + 3);

    buf.put_u8(FEND);
    buf.put_u8(CMD_DATA);
    for &b in payload {
        match b {
            FEND => buf.put_slice(&[FESC, TFEND]),
            FESC => buf.put_slice(&[FESC, TFESC]),
            _ => buf.put_u8(b),
        }
    }
    buf.put_u8(FEND);
    buf
}

/// Streaming KISS decoder, one per byte stream.
///
/// Bytes are unescaped as they arrive. After an error the rest of the
/// current frame is dropped up to the next `FEND`, so a damaged frame never
/// surfaces as a shorter bogus one.
pub struct KissDecoder {
    buf: BytesMut,
    escaped: bool,
    discarding: bool,
}

impl KissDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(KISS_BUF_SIZE),
            escaped: false,
            discarding: false,
        }
    }

    /// Consumes one byte; returns the payload of a completed data frame.
    pub fn push(&mut self, byte: u8) -> Result<Option<Bytes>, KissError> {
        if byte == FEND {
            return self.end_frame();
        }

        if self.discarding {
            return Ok(None);
        }

        let value = if self.escaped {
            self.escaped = false;
            match byte {
                TFEND => FEND,
                TFESC => FESC,
                other => return Err(self.abort(KissError::InvalidTranspose(other))),
            }
        } else if byte == FESC {
            self.escaped = true;
            return Ok(None);
        } else {
            byte
        };

        if self.buf.len() == KISS_BUF_SIZE {
            return Err(self.abort(KissError::Overflow { max: KISS_BUF_SIZE }));
        }
        self.buf.put_u8(value);
        Ok(None)
    }

    /// Feeds a slice and collects every payload or error, in order.
    pub fn push_slice(&mut self, data: &[u8]) -> Vec<Result<Bytes, KissError>> {
        data.iter()
            .filter_map(|&b| self.push(b).transpose())
            .collect()
    }

    /// Drops any partial frame.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.escaped = false;
        self.discarding = false;
    }

    /// Returns true while dropping the tail of a damaged frame.
    pub fn is_discarding(&self) -> bool {
        self.discarding
    }

    fn abort(&mut self, err: KissError) -> KissError {
        self.buf.clear();
        self.escaped = false;
        self.discarding = true;
        err
    }

    fn end_frame(&mut self) -> Result<Option<Bytes>, KissError> {
        if self.discarding {
            self.reset();
            return Ok(None);
        }
        if self.escaped {
            self.reset();
            return Err(KissError::InvalidTranspose(FEND));
        }
        if self.buf.is_empty() {
            return Ok(None);
        }

        let mut frame = self.buf.split();
        self.reset();

        let command = frame[0];
        if command != CMD_DATA {
            return Err(KissError::UnknownCommand(command));
        }

        let payload = frame.split_off(1);
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(KissError::PayloadTooLong {
                len: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        Ok(Some(payload.freeze()))
    }
}

impl Default for KissDecoder {
    fn default() -> Self {
        Self::new()
    }
}
