//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via LFR_CONFIG)
//! 3. Environment variables

use lfr_core::RadioSettings;
use lfr_protocol::{DEFAULT_KISS_PORT, DEFAULT_UART_PORT};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Settings the radio boots with.
    pub radio: RadioConfig,
    /// Transmit queue configuration.
    pub transmit: TransmitConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("LFR_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.network.apply_env_overrides();
        self.radio.apply_env_overrides();
        self.transmit.apply_env_overrides();
    }

    /// Checks values that parse but cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.uart_bind_addr == self.network.kiss_addr {
            return Err(ConfigError::ValidationError(format!(
                "uart_bind_addr and kiss_addr are both {}",
                self.network.kiss_addr
            )));
        }
        if self.transmit.queue_depth == 0 {
            return Err(ConfigError::ValidationError(
                "transmit.queue_depth must be at least 1".to_string(),
            ));
        }
        if self.transmit.queue_depth > u16::MAX as usize {
            return Err(ConfigError::ValidationError(format!(
                "transmit.queue_depth {} exceeds {}",
                self.transmit.queue_depth,
                u16::MAX
            )));
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the emulated UART listens on.
    #[serde(with = "socket_addr_serde")]
    pub uart_bind_addr: SocketAddr,
    /// Address of the KISS modem to connect to.
    #[serde(with = "socket_addr_serde")]
    pub kiss_addr: SocketAddr,
    /// Reset a half-received command frame after this many milliseconds
    /// without input (0 = never).
    pub frame_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);
        Self {
            uart_bind_addr: SocketAddr::new(localhost, DEFAULT_UART_PORT),
            kiss_addr: SocketAddr::new(localhost, DEFAULT_KISS_PORT),
            frame_timeout_ms: 0,
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("LFR_UART_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.uart_bind_addr = parsed;
            }
        }

        if let Ok(addr) = std::env::var("LFR_KISS_ADDR") {
            if let Ok(parsed) = addr.parse() {
                self.kiss_addr = parsed;
            }
        }

        if let Ok(timeout) = std::env::var("LFR_FRAME_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.frame_timeout_ms = ms;
            }
        }
    }

    /// Returns the frame timeout, or `None` when disabled.
    pub fn frame_timeout(&self) -> Option<Duration> {
        match self.frame_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// Radio settings applied at boot when nothing has been saved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Carrier frequency in Hz.
    pub frequency_hz: u32,
    /// Transmit power (PA gate bias).
    pub tx_power: u16,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            frequency_hz: RadioSettings::DEFAULT.frequency_hz,
            tx_power: RadioSettings::DEFAULT.tx_power,
        }
    }
}

impl RadioConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(freq) = std::env::var("LFR_FREQUENCY_HZ") {
            if let Ok(hz) = freq.parse() {
                self.frequency_hz = hz;
            }
        }

        if let Ok(power) = std::env::var("LFR_TX_POWER") {
            if let Some(value) = parse_u16(&power) {
                self.tx_power = value;
            }
        }
    }

    pub fn settings(&self) -> RadioSettings {
        RadioSettings {
            frequency_hz: self.frequency_hz,
            tx_power: self.tx_power,
        }
    }
}

/// Transmit queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmitConfig {
    /// Payloads that may wait for the modem before TXDATA answers BUSY.
    pub queue_depth: usize,
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self { queue_depth: 16 }
    }
}

impl TransmitConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(depth) = std::env::var("LFR_TX_QUEUE_DEPTH") {
            if let Ok(n) = depth.parse() {
                self.queue_depth = n;
            }
        }
    }
}

/// Parses decimal or `0x`-prefixed hex.
fn parse_u16(s: &str) -> Option<u16> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
