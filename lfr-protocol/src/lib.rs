//! # lfr-protocol
//!
//! Wire protocol implementation for the Little Free Radio command link.
//!
//! This crate provides:
//! - The byte-wise Fletcher checksum shared by requests and replies
//! - The closed command table and per-command payload length rules
//! - An incremental, resynchronising command frame parser
//! - Reply and error frame encoding (and decoding, for the ground side)
//! - KISS framing for raw radio payloads
//! - Error codes carried in error replies

pub mod checksum;
pub mod command;
pub mod error;
pub mod frame;
pub mod kiss;
pub mod parser;
pub mod reply;

pub use checksum::{checksum, fletcher, Checksum};
pub use command::{Command, LengthRule};
pub use error::{ErrorCode, KissError, ParseError, ProtocolError, ReplyError};
pub use frame::{encode_command, encode_raw, ByteSink, CommandFrame, SYNC_HI, SYNC_LO};
pub use kiss::KissDecoder;
pub use parser::{CommandParser, ParserState};
pub use reply::{encode_error, encode_reply, EncodeError, Reply, ReplyDecoder, ReplyFrame};

/// Maximum payload length of a command or reply frame.
pub const MAX_PAYLOAD_LEN: usize = 255;

/// Bit set on the command id of every reply.
pub const REPLY_BIT: u8 = 0x80;

/// Default TCP port of the emulated UART.
pub const DEFAULT_UART_PORT: u16 = 52100;

/// Default TCP port of the KISS modem.
pub const DEFAULT_KISS_PORT: u16 = 52001;
