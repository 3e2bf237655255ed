//! Device context.
//!
//! Everything a handler may read or change lives here: the status register,
//! the active settings and the settings store. One `Device` per simulated
//! radio; nothing is global.

use crate::error::CoreError;
use crate::settings::RadioSettings;
use crate::status::SystemStatus;
use crate::store::{MemoryStore, SettingsStore};

/// Radio-side state shared by all handlers.
pub struct Device {
    status: SystemStatus,
    settings: RadioSettings,
    store: Box<dyn SettingsStore>,
    boots: u32,
}

impl Device {
    /// Creates a device, booting from whatever the store holds.
    pub fn new(store: Box<dyn SettingsStore>) -> Self {
        let settings = store.load().unwrap_or_default();
        Self {
            status: SystemStatus::new(),
            settings,
            store,
            boots: 1,
        }
    }

    pub fn status(&self) -> SystemStatus {
        self.status
    }

    pub fn status_mut(&mut self) -> &mut SystemStatus {
        &mut self.status
    }

    pub fn settings(&self) -> &RadioSettings {
        &self.settings
    }

    /// Number of boots, including the initial one.
    pub fn boot_count(&self) -> u32 {
        self.boots
    }

    pub fn set_tx_power(&mut self, tx_power: u16) {
        tracing::info!("SET_TXPWR: {:#06x}", tx_power);
        self.settings.tx_power = tx_power;
        self.status.set(SystemStatus::CONFIG_DIRTY);
    }

    pub fn set_frequency(&mut self, frequency_hz: u32) {
        tracing::info!("SET_FREQ: {} Hz", frequency_hz);
        self.settings.frequency_hz = frequency_hz;
        self.status.set(SystemStatus::CONFIG_DIRTY);
    }

    /// Replaces the active settings wholesale.
    pub fn apply_settings(&mut self, settings: RadioSettings) {
        tracing::info!(
            "Settings applied: {} Hz, power {:#06x}",
            settings.frequency_hz,
            settings.tx_power
        );
        self.settings = settings;
        self.status.set(SystemStatus::CONFIG_DIRTY);
    }

    /// Loads the factory settings into the active set. The store is untouched.
    pub fn load_defaults(&mut self) {
        self.apply_settings(RadioSettings::DEFAULT);
    }

    /// Writes the active settings to the store.
    pub fn save(&mut self) -> Result<(), CoreError> {
        self.store.save(&self.settings)?;
        self.status.clear(SystemStatus::CONFIG_DIRTY);
        Ok(())
    }

    /// Simulated restart: volatile state is lost and settings come back
    /// from the store (or factory defaults).
    pub fn reboot(&mut self) {
        self.settings = self.store.load().unwrap_or_default();
        self.status = SystemStatus::new();
        self.boots += 1;
        tracing::info!("Device reset (boot {})", self.boots);
    }

    /// Returns the status byte for an outgoing reply.
    ///
    /// `TX_BUSY` is refreshed from `queue_depth` first. `RX_OVERRUN` is
    /// read-to-clear: it is reported in exactly one reply.
    pub fn take_status(&mut self, queue_depth: u16) -> u8 {
        self.status.assign(SystemStatus::TX_BUSY, queue_depth > 0);
        let bits = self.status.bits();
        self.status.clear(SystemStatus::RX_OVERRUN);
        bits
    }

    /// Updates the status register after a command, right before its reply.
    pub fn finish_command(&mut self, ok: bool, queue_depth: u16) {
        self.status.assign(SystemStatus::LAST_CMD_OK, ok);
        self.status.assign(SystemStatus::TX_BUSY, queue_depth > 0);
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::new(Box::new(MemoryStore::new()))
    }
}
