//! # lfr-core
//!
//! Radio-side command handling for the Little Free Radio.
//!
//! This crate provides:
//! - The device context (status register, active settings, settings store)
//! - The transmitter interface used by data commands
//! - The closed command dispatcher and its handlers
//! - The sans-IO command link and receive path that tie the protocol
//!   codecs to the dispatcher

pub mod device;
pub mod dispatch;
pub mod error;
pub mod link;
pub mod settings;
pub mod status;
pub mod store;
pub mod transmitter;

pub use device::Device;
pub use dispatch::{Dispatcher, Response};
pub use error::CoreError;
pub use link::{CommandLink, LinkEvent, RxEvent, RxPath};
pub use settings::RadioSettings;
pub use status::SystemStatus;
pub use store::{MemoryStore, NullStore, SettingsStore};
pub use transmitter::{TransmitError, Transmitter};
