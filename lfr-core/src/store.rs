//! Settings persistence interface.

use crate::error::CoreError;
use crate::settings::RadioSettings;

/// Non-volatile home of the radio settings.
pub trait SettingsStore: Send {
    /// Returns the saved settings, if any were ever saved.
    fn load(&self) -> Option<RadioSettings>;

    fn save(&mut self, settings: &RadioSettings) -> Result<(), CoreError>;
}

/// Store that keeps the saved copy in memory.
///
/// Survives [`crate::Device::reboot`] but not the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    saved: Option<RadioSettings>,
    saves: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `settings`.
    pub fn with_settings(settings: RadioSettings) -> Self {
        Self {
            saved: Some(settings),
            saves: 0,
        }
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> u64 {
        self.saves
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> Option<RadioSettings> {
        self.saved
    }

    fn save(&mut self, settings: &RadioSettings) -> Result<(), CoreError> {
        self.saved = Some(*settings);
        self.saves += 1;
        tracing::debug!("Settings saved: {:?}", settings);
        Ok(())
    }
}

/// Store for hardware without non-volatile memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl SettingsStore for NullStore {
    fn load(&self) -> Option<RadioSettings> {
        None
    }

    fn save(&mut self, _settings: &RadioSettings) -> Result<(), CoreError> {
        Err(CoreError::StoreUnavailable)
    }
}
