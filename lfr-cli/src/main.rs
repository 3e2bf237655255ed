//! lfr-cli - Ground-station command-line tool for the Little Free Radio
//!
//! Sends one command per invocation, streams received packets, or runs the
//! lossy channel simulator that sits between the radio and the ground.

mod channel;
mod commands;

use channel::{Channel, ChannelConfig};
use clap::{Parser, Subcommand};
use colored::Colorize;
use lfr_client::{Client, ConnectionConfig};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lfr-cli")]
#[command(about = "Ground-station tool for the Little Free Radio command link")]
#[command(version)]
struct Cli {
    /// Radio UART socket address
    #[arg(short, long, default_value = "127.0.0.1:52100", env = "LFR_RADIO")]
    radio: SocketAddr,

    /// Reply timeout in milliseconds
    #[arg(short, long, default_value = "5000")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check the radio is alive
    Nop,

    /// Reboot the radio (no reply)
    Reset,

    /// Transmit a payload, or numbered beacons when no text is given
    Tx {
        /// Text to send
        text: Option<String>,

        /// Number of packets
        #[arg(short = 'n', long, default_value = "1")]
        count: u32,
    },

    /// Print received packets
    Rx {
        /// Stop after this many packets
        #[arg(short = 'n', long)]
        count: Option<u32>,
    },

    /// Read, or set, the transmit power
    Txpwr {
        /// New power (decimal or 0x-prefixed hex)
        value: Option<String>,
    },

    /// Set the carrier frequency
    Freq {
        /// Frequency in Hz
        hz: u32,
    },

    /// Radio configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show how many payloads are waiting to be transmitted
    Queue,

    /// Drop every queued transmission
    Abort,

    /// Transmit the pseudo-random test sequence
    Psr,

    /// Run the lossy radio channel simulator
    Channel {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0")]
        bind: IpAddr,

        /// Port the radio's KISS modem link connects to
        #[arg(long, default_value = "52001")]
        sat_port: u16,

        /// Port ground KISS clients connect to
        #[arg(long, default_value = "52002")]
        gnd_port: u16,

        /// Percent of ground-to-satellite frames lost
        #[arg(long, default_value = "1.0")]
        uplink_loss: f64,

        /// Percent of satellite-to-ground frames lost
        #[arg(long, default_value = "1.0")]
        downlink_loss: f64,

        /// Air bit rate in bits per second
        #[arg(long, default_value = "10000")]
        bitrate: u32,

        /// Seed for the loss model
        #[arg(long)]
        seed: Option<u64>,

        /// Do not hex-dump frames
        #[arg(short, long)]
        quiet: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the active settings
    Get,

    /// Change the active settings
    Set {
        /// Frequency in Hz
        #[arg(long)]
        freq: Option<u32>,

        /// Transmit power (decimal or 0x-prefixed hex)
        #[arg(long)]
        power: Option<String>,
    },

    /// Persist the active settings
    Save,

    /// Restore factory settings
    Default,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // The channel simulator does not talk to the radio
    if let Commands::Channel {
        bind,
        sat_port,
        gnd_port,
        uplink_loss,
        downlink_loss,
        bitrate,
        seed,
        quiet,
    } = cli.command
    {
        let channel = Channel::new(ChannelConfig {
            sat_addr: SocketAddr::new(bind, sat_port),
            gnd_addr: SocketAddr::new(bind, gnd_port),
            uplink_loss,
            downlink_loss,
            bitrate,
            seed,
            dump: !quiet,
        });
        eprintln!(
            "{} satellite on {}, ground on {}",
            "Channel".green(),
            sat_port,
            gnd_port
        );
        tokio::select! {
            result = channel.run() => result?,
            _ = tokio::signal::ctrl_c() => eprintln!("\n{}", "Stopping channel...".dimmed()),
        }
        return Ok(());
    }

    let config =
        ConnectionConfig::new(cli.radio).with_request_timeout(Duration::from_millis(cli.timeout));
    let client = Client::new(config);

    client.connect().await.map_err(|e| {
        eprintln!("{}: {}", "Connection failed".red(), e);
        e
    })?;

    let result = match cli.command {
        Commands::Rx { count } => {
            tokio::select! {
                result = commands::receive(&client, count) => result,
                _ = tokio::signal::ctrl_c() => Ok(String::new()),
            }
        }
        cmd => commands::execute(&client, cmd).await,
    };

    match result {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }

    client.close().await?;
    Ok(())
}
