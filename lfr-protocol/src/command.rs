//! Command table.
//!
//! `Command` is closed: an id is valid exactly when `Command::from_id` maps
//! it, and every variant carries its own length rule. Dispatchers match on
//! the enum, so the accepted set and the handled set cannot drift apart.

use std::fmt;

/// Reply id used for received radio packets. Never accepted as a request.
pub const RXDATA: u8 = 0x11;

/// Reserved id for internal errors.
pub const INTERNAL_ERR: u8 = 0x7E;

/// Reserved id for error replies (sent with the reply bit set).
pub const REPLY_ERR: u8 = 0x7F;

/// Commands accepted on the uplink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    // System group
    Nop = 0x00,
    Reset = 0x01,

    // Data group
    TxData = 0x10,
    TxAbort = 0x12,
    TxPsr = 0x13,

    // Configuration group
    GetCfg = 0x20,
    SetCfg = 0x21,
    SaveCfg = 0x22,
    CfgDefault = 0x23,
    SetFreq = 0x24,
    ReadTxPwr = 0x25,
    SetTxPwr = 0x26,

    // Status group
    GetQueueDepth = 0x32,
}

/// Payload length accepted for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthRule {
    /// No payload.
    Zero,
    /// Exactly this many bytes.
    Exact(u8),
    /// At least one byte.
    NonZero,
}

impl LengthRule {
    pub fn accepts(&self, len: u8) -> bool {
        match *self {
            LengthRule::Zero => len == 0,
            LengthRule::Exact(n) => len == n,
            LengthRule::NonZero => len > 0,
        }
    }
}

impl Command {
    /// Every command, in id order.
    pub const ALL: [Command; 13] = [
        Command::Nop,
        Command::Reset,
        Command::TxData,
        Command::TxAbort,
        Command::TxPsr,
        Command::GetCfg,
        Command::SetCfg,
        Command::SaveCfg,
        Command::CfgDefault,
        Command::SetFreq,
        Command::ReadTxPwr,
        Command::SetTxPwr,
        Command::GetQueueDepth,
    ];

    /// Validates a command id.
    pub fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            0x00 => Command::Nop,
            0x01 => Command::Reset,
            0x10 => Command::TxData,
            0x12 => Command::TxAbort,
            0x13 => Command::TxPsr,
            0x20 => Command::GetCfg,
            0x21 => Command::SetCfg,
            0x22 => Command::SaveCfg,
            0x23 => Command::CfgDefault,
            0x24 => Command::SetFreq,
            0x25 => Command::ReadTxPwr,
            0x26 => Command::SetTxPwr,
            0x32 => Command::GetQueueDepth,
            _ => return None,
        })
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Returns the payload length rule for this command.
    pub fn length_rule(self) -> LengthRule {
        match self {
            Command::SetTxPwr => LengthRule::Exact(2),
            Command::SetFreq => LengthRule::Exact(4),
            Command::TxData | Command::SetCfg => LengthRule::NonZero,
            Command::Nop
            | Command::Reset
            | Command::TxAbort
            | Command::TxPsr
            | Command::GetCfg
            | Command::SaveCfg
            | Command::CfgDefault
            | Command::ReadTxPwr
            | Command::GetQueueDepth => LengthRule::Zero,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Nop => "NOP",
            Command::Reset => "RESET",
            Command::TxData => "TXDATA",
            Command::TxAbort => "TX_ABORT",
            Command::TxPsr => "TX_PSR",
            Command::GetCfg => "GET_CFG",
            Command::SetCfg => "SET_CFG",
            Command::SaveCfg => "SAVE_CFG",
            Command::CfgDefault => "CFG_DEFAULT",
            Command::SetFreq => "SET_FREQ",
            Command::ReadTxPwr => "READ_TXPWR",
            Command::SetTxPwr => "SET_TXPWR",
            Command::GetQueueDepth => "GET_QUEUE_DEPTH",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
