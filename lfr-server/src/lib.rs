//! # lfr-server
//!
//! Transport adapter for the Little Free Radio command link.
//!
//! This crate provides:
//! - The emulated UART listener (one commanding client at a time)
//! - The KISS modem connection for transmit and receive
//! - A single readiness-multiplexed loop feeding bytes into the core
//! - The bounded transmit queue behind the core's `Transmitter`
//! - YAML and environment configuration

pub mod config;
pub mod error;
pub mod queue;
pub mod server;
pub mod session;

pub use config::{Config, ConfigError, NetworkConfig, RadioConfig, TransmitConfig};
pub use error::ServerError;
pub use queue::{tx_queue, QueueTransmitter, TxQueue};
pub use server::{Server, ServerConfig, ServerStats};
pub use session::Session;
