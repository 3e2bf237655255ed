//! # lfr-client
//!
//! Ground-station client for the Little Free Radio.
//!
//! This crate provides:
//! - TCP connection to the emulated UART with connect and request timeouts
//! - Reply decoding, with received packets kept apart from command replies
//! - A typed async API for every command
//! - Automatic resend of transmissions the radio answers BUSY to

pub mod client;
pub mod connection;
pub mod error;

pub use client::Client;
pub use connection::{Connection, ConnectionConfig};
pub use error::ClientError;
