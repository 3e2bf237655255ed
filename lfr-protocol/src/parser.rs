//! Incremental command frame parser.
//!
//! The parser consumes one byte at a time and never blocks. Each state is
//! named for the byte it expects next. Any completed frame or rejection
//! returns the machine to [`ParserState::Sync0`]; nothing from a rejected
//! frame is retained.

use crate::checksum::Checksum;
use crate::command::Command;
use crate::error::ParseError;
use crate::frame::{CommandFrame, SYNC_HI, SYNC_LO};
use crate::MAX_PAYLOAD_LEN;
use bytes::Bytes;

/// Parser state, named for the byte expected next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    Sync0,
    Sync1,
    Command,
    Length,
    Payload,
    ChecksumHi,
    ChecksumLo,
}

/// Per-stream command frame parser.
///
/// One instance per connection; instances share nothing.
pub struct CommandParser {
    state: ParserState,
    command: Command,
    len: u8,
    offset: usize,
    payload: [u8; MAX_PAYLOAD_LEN],
    received: u16,
    computed: Checksum,
}

impl CommandParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Sync0,
            command: Command::Nop,
            len: 0,
            offset: 0,
            payload: [0; MAX_PAYLOAD_LEN],
            received: 0,
            computed: Checksum::new(),
        }
    }

    /// Consumes one byte.
    ///
    /// Returns `Ok(Some(frame))` when the byte completes a valid frame,
    /// `Ok(None)` if more input is needed (including while hunting for
    /// sync), or `Err` when the frame is rejected. The parser has already
    /// reset itself when a frame or an error is returned.
    pub fn push(&mut self, byte: u8) -> Result<Option<CommandFrame>, ParseError> {
        match self.state {
            ParserState::Sync0 => {
                if byte == SYNC_HI {
                    self.state = ParserState::Sync1;
                }
            }
            ParserState::Sync1 => {
                if byte == SYNC_LO {
                    self.state = ParserState::Command;
                } else if byte != SYNC_HI {
                    // A repeated SYNC_HI keeps us here so "SSy" still syncs.
                    self.state = ParserState::Sync0;
                }
            }
            ParserState::Command => match Command::from_id(byte) {
                Some(command) => {
                    self.command = command;
                    self.computed.reset();
                    self.computed.update(byte);
                    self.state = ParserState::Length;
                }
                None => {
                    self.reset();
                    return Err(ParseError::InvalidCommand(byte));
                }
            },
            ParserState::Length => {
                if !self.command.length_rule().accepts(byte) {
                    let command = self.command.id();
                    self.reset();
                    return Err(ParseError::InvalidLength { command, len: byte });
                }
                self.computed.update(byte);
                self.len = byte;
                self.offset = 0;
                self.state = if byte == 0 {
                    ParserState::ChecksumHi
                } else {
                    ParserState::Payload
                };
            }
            ParserState::Payload => {
                self.payload[self.offset] = byte;
                self.computed.update(byte);
                self.offset += 1;
                if self.offset == self.len as usize {
                    self.state = ParserState::ChecksumHi;
                }
            }
            ParserState::ChecksumHi => {
                self.received = u16::from(byte) << 8;
                self.state = ParserState::ChecksumLo;
            }
            ParserState::ChecksumLo => {
                let received = self.received | u16::from(byte);
                let computed = self.computed.value();
                let frame = CommandFrame {
                    command: self.command,
                    payload: Bytes::copy_from_slice(&self.payload[..self.len as usize]),
                };
                self.reset();

                if received != computed {
                    return Err(ParseError::ChecksumMismatch {
                        expected: computed,
                        actual: received,
                    });
                }
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }

    /// Feeds a slice and collects every frame or error it produced, in order.
    pub fn push_slice(&mut self, data: &[u8]) -> Vec<Result<CommandFrame, ParseError>> {
        data.iter()
            .filter_map(|&b| self.push(b).transpose())
            .collect()
    }

    /// Abandons any partial frame and waits for sync again.
    pub fn reset(&mut self) {
        self.state = ParserState::Sync0;
        self.len = 0;
        self.offset = 0;
        self.received = 0;
        self.computed.reset();
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Returns true while hunting for the first sync byte.
    pub fn is_idle(&self) -> bool {
        self.state == ParserState::Sync0
    }
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{encode_command, encode_raw};
    use proptest::prelude::*;

    fn feed(parser: &mut CommandParser, data: &[u8]) -> Vec<Result<CommandFrame, ParseError>> {
        parser.push_slice(data)
    }

    #[test]
    fn test_nop_frame() {
        let mut parser = CommandParser::new();
        let results = feed(&mut parser, &[0xBE, 0xEF, 0x00, 0x00, 0x00, 0x00]);

        assert_eq!(results.len(), 1);
        let frame = results[0].clone().unwrap();
        assert_eq!(frame.command, Command::Nop);
        assert!(frame.payload.is_empty());
        assert!(parser.is_idle());
    }

    #[test]
    fn test_state_walk() {
        let mut parser = CommandParser::new();
        let encoded = encode_command(Command::SetTxPwr, &[0x00, 0x64]).unwrap();
        let expected = [
            ParserState::Sync1,
            ParserState::Command,
            ParserState::Length,
            ParserState::Payload,
            ParserState::Payload,
            ParserState::ChecksumHi,
            ParserState::ChecksumLo,
        ];

        for (byte, state) in encoded.iter().zip(expected) {
            assert_eq!(parser.push(*byte).unwrap(), None);
            assert_eq!(parser.state(), state);
        }

        let frame = parser.push(encoded[7]).unwrap().unwrap();
        assert_eq!(frame.command, Command::SetTxPwr);
        assert_eq!(&frame.payload[..], &[0x00, 0x64]);
        assert_eq!(parser.state(), ParserState::Sync0);
    }

    #[test]
    fn test_zero_length_skips_payload() {
        let mut parser = CommandParser::new();
        for b in [0xBE, 0xEF, 0x25, 0x00] {
            parser.push(b).unwrap();
        }
        assert_eq!(parser.state(), ParserState::ChecksumHi);
    }

    #[test]
    fn test_noise_before_sync_is_ignored() {
        let mut parser = CommandParser::new();
        let mut data = vec![0x00, 0x11, 0xEF, 0xC0, 0xBE, 0x42];
        data.extend_from_slice(&encode_command(Command::Nop, &[]).unwrap());

        let results = feed(&mut parser, &data);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap().command, Command::Nop);
    }

    #[test]
    fn test_overlapping_sync() {
        // "SSy": a repeated first sync byte must not lose the frame.
        let mut parser = CommandParser::new();
        let mut data = vec![0xBE];
        data.extend_from_slice(&encode_command(Command::Nop, &[]).unwrap());

        let results = feed(&mut parser, &data);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());

        let mut parser = CommandParser::new();
        parser.push(0xBE).unwrap();
        parser.push(0xBE).unwrap();
        parser.push(0xBE).unwrap();
        assert_eq!(parser.state(), ParserState::Sync1);
    }

    #[test]
    fn test_invalid_command() {
        let mut parser = CommandParser::new();
        let mut data = vec![0xBE, 0xEF, 0x55];
        data.extend_from_slice(&encode_command(Command::Nop, &[]).unwrap());

        let results = feed(&mut parser, &data);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], Err(ParseError::InvalidCommand(0x55)));
        assert_eq!(results[1].as_ref().unwrap().command, Command::Nop);
    }

    #[test]
    fn test_reply_ids_are_not_requests() {
        let mut parser = CommandParser::new();
        let results = feed(&mut parser, &[0xBE, 0xEF, 0x80]);
        assert_eq!(results, vec![Err(ParseError::InvalidCommand(0x80))]);

        let results = feed(&mut parser, &[0xBE, 0xEF, 0x11]);
        assert_eq!(results, vec![Err(ParseError::InvalidCommand(0x11))]);
    }

    #[test]
    fn test_invalid_length() {
        let mut parser = CommandParser::new();
        let results = feed(&mut parser, &[0xBE, 0xEF, 0x26, 0x03]);
        assert_eq!(
            results,
            vec![Err(ParseError::InvalidLength {
                command: 0x26,
                len: 3
            })]
        );
        assert!(parser.is_idle());

        let results = feed(&mut parser, &[0xBE, 0xEF, 0x10, 0x00]);
        assert_eq!(
            results,
            vec![Err(ParseError::InvalidLength {
                command: 0x10,
                len: 0
            })]
        );

        let results = feed(&mut parser, &[0xBE, 0xEF, 0x00, 0x01]);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn test_checksum_mismatch_then_recovery() {
        let mut parser = CommandParser::new();
        let mut bad = encode_command(Command::ReadTxPwr, &[]).unwrap();
        let n = bad.len();
        bad[n - 1] ^= 0x01;

        let mut data = bad.to_vec();
        data.extend_from_slice(&encode_command(Command::ReadTxPwr, &[]).unwrap());

        let results = feed(&mut parser, &data);
        assert_eq!(results.len(), 2);
        assert!(matches!(
            results[0],
            Err(ParseError::ChecksumMismatch { .. })
        ));
        assert_eq!(results[1].as_ref().unwrap().command, Command::ReadTxPwr);
    }

    #[test]
    fn test_back_to_back_frames_dispatch_in_order() {
        // The first frame's payload ends with something that looks like sync.
        let first = encode_command(Command::TxData, &[0x01, 0xBE, 0xEF]).unwrap();
        let second = encode_command(Command::SetFreq, &[0x19, 0xEE, 0x4B, 0x80]).unwrap();

        let mut data = first.to_vec();
        data.extend_from_slice(&second);

        let mut parser = CommandParser::new();
        let frames: Vec<_> = feed(&mut parser, &data)
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].command, Command::TxData);
        assert_eq!(&frames[0].payload[..], &[0x01, 0xBE, 0xEF]);
        assert_eq!(frames[1].command, Command::SetFreq);
    }

    #[test]
    fn test_max_length_payload() {
        let payload: Vec<u8> = (0..=254u8).collect();
        let encoded = encode_command(Command::TxData, &payload).unwrap();

        let mut parser = CommandParser::new();
        let results = feed(&mut parser, &encoded);
        assert_eq!(results.len(), 1);
        assert_eq!(&results[0].as_ref().unwrap().payload[..], &payload[..]);
    }

    #[test]
    fn test_checksum_is_not_chained_across_frames() {
        let mut parser = CommandParser::new();
        let a = encode_command(Command::SetTxPwr, &[0x12, 0x34]).unwrap();
        let b = encode_command(Command::SetTxPwr, &[0x12, 0x34]).unwrap();
        assert!(feed(&mut parser, &a)[0].is_ok());
        assert!(feed(&mut parser, &b)[0].is_ok());
    }

    #[test]
    fn test_reset_discards_partial_frame() {
        let mut parser = CommandParser::new();
        for b in [0xBE, 0xEF, 0x10, 0x05, 0x01] {
            parser.push(b).unwrap();
        }
        assert_eq!(parser.state(), ParserState::Payload);

        parser.reset();
        assert!(parser.is_idle());

        let results = feed(&mut parser, &encode_command(Command::Nop, &[]).unwrap());
        assert!(results[0].is_ok());
    }

    #[test]
    fn test_raw_garbage_never_panics() {
        let mut parser = CommandParser::new();
        let mut data = Vec::new();
        for i in 0..4096u32 {
            data.push((i.wrapping_mul(2654435761) >> 13) as u8);
        }
        data.extend_from_slice(&[0xBE, 0xEF, 0x10, 0xFF]);
        data.extend(std::iter::repeat(0xAB).take(300));
        let _ = feed(&mut parser, &data);

        parser.reset();
        let results = feed(&mut parser, &encode_raw(0x00, &[]).unwrap());
        assert!(results[0].is_ok());
    }

    proptest! {
        #[test]
        fn prop_arbitrary_input_then_reset_parses_next_frame(
            noise in proptest::collection::vec(any::<u8>(), 0..2048),
            payload in proptest::collection::vec(any::<u8>(), 1..=MAX_PAYLOAD_LEN),
        ) {
            let mut parser = CommandParser::new();
            let _ = parser.push_slice(&noise);

            parser.reset();
            let frame = encode_command(Command::TxData, &payload).unwrap();
            let results = parser.push_slice(&frame);
            prop_assert_eq!(results.len(), 1);
            let parsed = results[0].as_ref().unwrap();
            prop_assert_eq!(parsed.command, Command::TxData);
            prop_assert_eq!(&parsed.payload[..], &payload[..]);
            prop_assert!(parser.is_idle());
        }
    }
}
