//! Lossy radio channel simulator.
//!
//! Satellite-side clients (the `lfr` daemon's modem link) and ground-side
//! clients connect to separate listeners and exchange KISS frames. Every
//! frame is held for its air time, then dropped with a configurable
//! probability or forwarded to all clients on the other side.

use bytes::Bytes;
use colored::Colorize;
use lfr_protocol::{kiss, KissDecoder};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Fixed per-frame overhead on air, in bytes (preamble, sync, length, CRC).
const AIR_OVERHEAD_BYTES: usize = 9;

/// Radio turnaround added to every frame.
const TURNAROUND: Duration = Duration::from_millis(4);

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Which end of the link a client sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Satellite,
    Ground,
}

impl Side {
    fn other(self) -> Side {
        match self {
            Side::Satellite => Side::Ground,
            Side::Ground => Side::Satellite,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Side::Satellite => "SAT>",
            Side::Ground => "GND>",
        }
    }
}

/// Channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub sat_addr: SocketAddr,
    pub gnd_addr: SocketAddr,
    /// Percentage of ground-to-satellite frames lost.
    pub uplink_loss: f64,
    /// Percentage of satellite-to-ground frames lost.
    pub downlink_loss: f64,
    /// Air bit rate in bits per second.
    pub bitrate: u32,
    /// Seed for the loss model; random when unset.
    pub seed: Option<u64>,
    /// Print a hex dump of every frame.
    pub dump: bool,
}

/// Time a frame of `len` payload bytes spends on air.
pub fn air_time(len: usize, bitrate: u32) -> Duration {
    let bits = ((len + AIR_OVERHEAD_BYTES) * 8) as u64;
    Duration::from_micros(bits * 1_000_000 / u64::from(bitrate.max(1))) + TURNAROUND
}

/// Drops frames with a fixed probability.
pub struct LossModel {
    rng: StdRng,
}

impl LossModel {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Returns true if a frame survives a channel losing `loss_percent`.
    pub fn delivers(&mut self, loss_percent: f64) -> bool {
        self.rng.gen::<f64>() * 100.0 < 100.0 - loss_percent
    }
}

/// Classic 16-column hex dump with an ASCII gutter.
pub fn hexdump(data: &[u8]) -> String {
    let mut lines = Vec::new();
    for (i, chunk) in data.chunks(16).enumerate() {
        let mut hex = String::new();
        for (j, b) in chunk.iter().enumerate() {
            if j == 8 {
                hex.push(' ');
            }
            if j > 0 {
                hex.push(' ');
            }
            hex.push_str(&format!("{:02x}", b));
        }
        let ascii: String = chunk
            .iter()
            .map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                }
            })
            .collect();
        lines.push(format!("{:04x}:  {:<48}  |{}|", i * 16, hex, ascii));
    }
    lines.join("\n")
}

enum ChannelEvent {
    Frame { from: Side, payload: Bytes },
    Closed { side: Side, id: u64 },
}

/// The simulator.
pub struct Channel {
    config: ChannelConfig,
    loss: LossModel,
    clients: HashMap<Side, HashMap<u64, OwnedWriteHalf>>,
    next_id: u64,
}

impl Channel {
    pub fn new(config: ChannelConfig) -> Self {
        let loss = LossModel::new(config.seed);
        Self {
            config,
            loss,
            clients: HashMap::new(),
            next_id: 0,
        }
    }

    /// Binds both listeners and runs forever.
    pub async fn run(self) -> std::io::Result<()> {
        let sat = TcpListener::bind(self.config.sat_addr).await?;
        let gnd = TcpListener::bind(self.config.gnd_addr).await?;
        self.serve(sat, gnd).await
    }

    /// Runs on already bound listeners.
    pub async fn serve(mut self, sat: TcpListener, gnd: TcpListener) -> std::io::Result<()> {
        tracing::info!("Listening for satellite on {}", sat.local_addr()?);
        tracing::info!("Listening for ground on {}", gnd.local_addr()?);

        let (events_tx, mut events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        loop {
            tokio::select! {
                result = sat.accept() => {
                    let (stream, addr) = result?;
                    tracing::info!("Satellite ({}) connected", addr);
                    self.attach(Side::Satellite, stream, events_tx.clone());
                }
                result = gnd.accept() => {
                    let (stream, addr) = result?;
                    tracing::info!("Ground ({}) connected", addr);
                    self.attach(Side::Ground, stream, events_tx.clone());
                }
                Some(event) = events_rx.recv() => {
                    match event {
                        ChannelEvent::Frame { from, payload } => self.forward(from, payload).await,
                        ChannelEvent::Closed { side, id } => {
                            if let Some(clients) = self.clients.get_mut(&side) {
                                clients.remove(&id);
                            }
                            tracing::info!("{:?} client {} went offline", side, id);
                        }
                    }
                }
            }
        }
    }

    fn attach(&mut self, side: Side, stream: TcpStream, events: mpsc::Sender<ChannelEvent>) {
        let id = self.next_id;
        self.next_id += 1;

        let (mut reader, writer) = stream.into_split();
        self.clients.entry(side).or_default().insert(id, writer);

        tokio::spawn(async move {
            let mut decoder = KissDecoder::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = match reader.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                for result in decoder.push_slice(&buf[..n]) {
                    match result {
                        Ok(payload) => {
                            let event = ChannelEvent::Frame { from: side, payload };
                            if events.send(event).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => tracing::warn!("{:?} sent a bad KISS frame: {}", side, e),
                    }
                }
            }
            let _ = events.send(ChannelEvent::Closed { side, id }).await;
        });
    }

    async fn forward(&mut self, from: Side, payload: Bytes) {
        tokio::time::sleep(air_time(payload.len(), self.config.bitrate)).await;

        let loss = match from {
            Side::Ground => self.config.uplink_loss,
            Side::Satellite => self.config.downlink_loss,
        };
        let delivered = self.loss.delivers(loss);

        if self.config.dump {
            let text = format!("{}\n{}", from.label(), hexdump(&payload));
            if delivered {
                println!("{}", text);
            } else {
                println!("{}", text.red().bold());
            }
        }
        if !delivered {
            tracing::debug!("{:?} frame of {} bytes lost", from, payload.len());
            return;
        }

        let frame = kiss::encode(&payload);
        let mut dead = Vec::new();
        if let Some(clients) = self.clients.get_mut(&from.other()) {
            for (&id, writer) in clients.iter_mut() {
                if writer.write_all(&frame).await.is_err() {
                    dead.push(id);
                }
            }
            for id in dead {
                clients.remove(&id);
            }
        }
    }
}
