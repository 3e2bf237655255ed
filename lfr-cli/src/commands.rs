//! Command execution.

use crate::{Commands, ConfigAction};
use colored::Colorize;
use lfr_client::Client;
use lfr_core::SystemStatus;
use std::time::Duration;

/// Length of the numbered test beacon.
const BEACON_LEN: usize = 104;

/// How long `rx` waits between polls of the connection.
const RX_POLL: Duration = Duration::from_secs(1);

/// Executes a command and returns the formatted output.
pub async fn execute(client: &Client, cmd: Commands) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Nop => {
            client.nop().await?;
            Ok(format!("{} {}", "OK".green(), status_line(client.last_status())))
        }

        Commands::Reset => {
            client.reset().await?;
            Ok("Reset sent".yellow().to_string())
        }

        Commands::Tx { text, count } => {
            for i in 0..count {
                let data = match &text {
                    Some(text) => text.clone(),
                    None => beacon(i + 1),
                };
                println!("{} {}", "TX>".cyan(), data);
                client.tx(data.as_bytes()).await?;
                println!("Sent {} byte(s)", data.len());
            }
            Ok(format!("{} {} packet(s)", "Sent".green(), count))
        }

        // Streams until interrupted, handled by `receive`
        Commands::Rx { count } => receive(client, count).await,

        Commands::Txpwr { value: None } => {
            let power = client.tx_power().await?;
            Ok(format!("TX power: {} (0x{:04x})", power.to_string().cyan(), power))
        }

        Commands::Txpwr { value: Some(value) } => {
            let power = parse_u16(&value)?;
            client.set_tx_power(power).await?;
            Ok(format!("{} TX power to 0x{:04x}", "Set".green(), power))
        }

        Commands::Freq { hz } => {
            client.set_frequency(hz).await?;
            Ok(format!("{} frequency to {}", "Set".green(), format_hz(hz)))
        }

        Commands::Config { action } => match action {
            ConfigAction::Get => {
                let settings = client.settings().await?;
                Ok(format!(
                    "{}\n  Frequency: {}\n  TX power:  0x{:04x}",
                    "Radio settings".bold(),
                    format_hz(settings.frequency_hz).cyan(),
                    settings.tx_power
                ))
            }
            ConfigAction::Set { freq, power } => {
                let mut settings = client.settings().await?;
                if let Some(hz) = freq {
                    settings.frequency_hz = hz;
                }
                if let Some(power) = power {
                    settings.tx_power = parse_u16(&power)?;
                }
                client.set_settings(&settings).await?;
                Ok(format!(
                    "{} settings ({}, 0x{:04x})",
                    "Applied".green(),
                    format_hz(settings.frequency_hz),
                    settings.tx_power
                ))
            }
            ConfigAction::Save => {
                client.save_settings().await?;
                Ok(format!("{} settings", "Saved".green()))
            }
            ConfigAction::Default => {
                client.default_settings().await?;
                Ok(format!("{} factory settings", "Restored".green()))
            }
        },

        Commands::Queue => {
            let depth = client.queue_depth().await?;
            Ok(format!("TX queue depth: {}", depth.to_string().cyan()))
        }

        Commands::Abort => {
            client.abort_tx().await?;
            Ok(format!("{} queued transmissions", "Aborted".green()))
        }

        Commands::Psr => {
            client.tx_psr().await?;
            Ok(format!("{} PN9 test sequence", "Queued".green()))
        }

        // Handled directly in main.rs (no radio connection needed)
        Commands::Channel { .. } => unreachable!(),
    }
}

/// Prints received packets until `count` have arrived.
pub async fn receive(
    client: &Client,
    count: Option<u32>,
) -> Result<String, Box<dyn std::error::Error>> {
    let mut received = 0u32;
    while count.map_or(true, |n| received < n) {
        if let Some(packet) = client.rx(RX_POLL).await? {
            received += 1;
            println!("{} {}", "RX>".cyan(), String::from_utf8_lossy(&packet));
            println!("Received {} packet(s)", received);
        }
    }
    Ok(format!("{} {} packet(s)", "Received".green(), received))
}

/// Numbered beacon: `KC2QOL <n> ` padded with `x`.
fn beacon(n: u32) -> String {
    let mut data = format!("KC2QOL {} ", n);
    while data.len() < BEACON_LEN {
        data.push('x');
    }
    data
}

/// Parses decimal or `0x`-prefixed hex.
fn parse_u16(s: &str) -> Result<u16, std::num::ParseIntError> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

fn format_hz(hz: u32) -> String {
    format!("{:.3} MHz", hz as f64 / 1_000_000.0)
}

fn status_line(status: u8) -> String {
    format!("(status {})", SystemStatus::from_bits(status))
        .dimmed()
        .to_string()
}
