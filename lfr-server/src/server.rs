//! UART/KISS bridge server.
//!
//! One task, one `select!` loop: UART input, modem input, new UART
//! clients, the transmit queue, the frame timeout and shutdown all wake the
//! same loop, which feeds bytes through the core and writes whatever comes
//! out.

use crate::config::Config;
use crate::error::ServerError;
use crate::queue::tx_queue;
use crate::session::Session;
use bytes::BytesMut;
use lfr_core::{Device, LinkEvent, MemoryStore, RadioSettings, RxEvent, RxPath};
use lfr_protocol::{kiss, ProtocolError};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

const READ_BUF_SIZE: usize = 1024;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the emulated UART listens on.
    pub uart_bind_addr: SocketAddr,
    /// KISS modem to connect to.
    pub kiss_addr: SocketAddr,
    /// Abandon a half-received frame after this long without input.
    pub frame_timeout: Option<Duration>,
    /// Transmit queue capacity.
    pub tx_queue_depth: usize,
    /// Settings the device boots with.
    pub settings: RadioSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ServerConfig {
    pub fn new(uart_bind_addr: SocketAddr, kiss_addr: SocketAddr) -> Self {
        Self {
            uart_bind_addr,
            kiss_addr,
            ..Default::default()
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            uart_bind_addr: config.network.uart_bind_addr,
            kiss_addr: config.network.kiss_addr,
            frame_timeout: config.network.frame_timeout(),
            tx_queue_depth: config.transmit.queue_depth,
            settings: config.radio.settings(),
        }
    }

    pub fn with_frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = Some(timeout);
        self
    }

    pub fn with_tx_queue_depth(mut self, depth: usize) -> Self {
        self.tx_queue_depth = depth;
        self
    }

    pub fn with_settings(mut self, settings: RadioSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub frames_dispatched: AtomicU64,
    pub frames_rejected: AtomicU64,
    pub frame_timeouts: AtomicU64,
    pub kiss_frames_received: AtomicU64,
    pub kiss_frames_dropped: AtomicU64,
    pub rx_replies_dropped: AtomicU64,
    pub tx_frames: AtomicU64,
    pub tx_bytes: AtomicU64,
    pub tx_errors: AtomicU64,
}

/// KISS-encodes one payload and writes it to the modem.
///
/// The payload was already acknowledged, so a failed write is logged and
/// counted rather than ending the server. A dead modem shows up as EOF on
/// the read side.
async fn send_to_modem<W>(writer: &mut W, payload: &[u8], stats: &ServerStats) -> bool
where
    W: AsyncWrite + Unpin,
{
    let frame = kiss::encode(payload);
    match writer.write_all(&frame).await {
        Ok(()) => {
            stats.tx_frames.fetch_add(1, Ordering::Relaxed);
            stats.tx_bytes.fetch_add(payload.len() as u64, Ordering::Relaxed);
            tracing::debug!("Sent {} byte payload to modem", payload.len());
            true
        }
        Err(e) => {
            stats.tx_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Modem write failed, dropping {} byte payload: {}", payload.len(), e);
            false
        }
    }
}

impl ServerStats {
    fn record_link_event(&self, event: &LinkEvent) {
        match event {
            LinkEvent::Pending => {}
            LinkEvent::Replied { .. } | LinkEvent::Silent { .. } => {
                self.frames_dispatched.fetch_add(1, Ordering::Relaxed);
            }
            LinkEvent::Rejected(_) => {
                self.frames_rejected.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn record_rx_event(&self, event: &RxEvent) {
        match event {
            RxEvent::Pending => {}
            RxEvent::Delivered(_) => {
                self.kiss_frames_received.fetch_add(1, Ordering::Relaxed);
            }
            RxEvent::Dropped(_) => {
                self.kiss_frames_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// The lfr transport adapter.
pub struct Server {
    config: ServerConfig,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Binds the UART listener and runs until shutdown or a fatal error.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.uart_bind_addr).await?;
        self.serve(listener).await
    }

    /// Runs on an already bound UART listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let kiss_addr = self.config.kiss_addr;
        let modem = TcpStream::connect(kiss_addr)
            .await
            .map_err(|source| ServerError::ModemConnect {
                addr: kiss_addr,
                source,
            })?;
        let (mut modem_read, mut modem_write) = modem.into_split();

        tracing::info!(
            "UART listening on {}, KISS modem at {}",
            listener.local_addr()?,
            kiss_addr
        );
        self.running.store(true, Ordering::SeqCst);
        let result = self.event_loop(&listener, &mut modem_read, &mut modem_write).await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn event_loop(
        &self,
        listener: &TcpListener,
        modem_read: &mut tokio::net::tcp::OwnedReadHalf,
        modem_write: &mut tokio::net::tcp::OwnedWriteHalf,
    ) -> Result<(), ServerError> {
        let store = MemoryStore::with_settings(self.config.settings);
        let mut device = Device::new(Box::new(store));
        let (mut transmitter, mut queue) = tx_queue(self.config.tx_queue_depth);
        let mut rx_path = RxPath::new();
        let mut session: Option<Session> = None;
        let mut shutdown_rx = self.shutdown.subscribe();

        let mut uart_buf = [0u8; READ_BUF_SIZE];
        let mut modem_buf = [0u8; READ_BUF_SIZE];

        loop {
            let deadline = session
                .as_ref()
                .and_then(|s| s.frame_deadline(self.config.frame_timeout));

            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if let Some(old) = session.take() {
                                tracing::info!(
                                    "[{}] Replaced by new client {} after {:?}",
                                    old.remote_addr,
                                    addr,
                                    old.age()
                                );
                            }
                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            let new = Session::new(stream, addr);
                            tracing::info!("[{}] UART client connected (session {})", addr, new.id);
                            session = Some(new);
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }

                result = read_uart(&mut session, &mut uart_buf) => {
                    let mut drop_session = false;
                    if let Some(s) = session.as_mut() {
                        match result {
                            Ok(0) => {
                                tracing::info!(
                                    "[{}] UART client disconnected ({} bytes, {} frames)",
                                    s.remote_addr,
                                    s.bytes_in(),
                                    s.frame_count()
                                );
                                drop_session = true;
                            }
                            Ok(n) => {
                                tracing::debug!("[{}] Received {} bytes", s.remote_addr, n);
                                let mut out = BytesMut::new();
                                let events = s
                                    .link_mut()
                                    .process_slice(&uart_buf[..n], &mut device, &mut transmitter, &mut out)
                                    .map_err(ProtocolError::from)?;

                                for event in &events {
                                    self.stats.record_link_event(event);
                                    log_link_event(s.remote_addr, event, device.status());
                                }
                                s.record_input(n, events.len());

                                if !out.is_empty() {
                                    if let Err(e) = s.stream.write_all(&out).await {
                                        tracing::warn!("[{}] Write error: {}", s.remote_addr, e);
                                        drop_session = true;
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::warn!("[{}] Read error: {}", s.remote_addr, e);
                                drop_session = true;
                            }
                        }
                    }
                    if drop_session {
                        session = None;
                    }
                }

                result = modem_read.read(&mut modem_buf) => {
                    let n = match result {
                        Ok(0) => {
                            tracing::error!("KISS modem closed the connection");
                            return Err(ServerError::ModemClosed(self.config.kiss_addr));
                        }
                        Ok(n) => n,
                        Err(e) => return Err(ServerError::Io(e)),
                    };

                    let mut out = BytesMut::new();
                    let events = rx_path
                        .process_slice(&modem_buf[..n], &mut device, &transmitter, &mut out)
                        .map_err(ProtocolError::from)?;
                    for event in &events {
                        self.stats.record_rx_event(event);
                    }

                    if !out.is_empty() {
                        let mut drop_session = false;
                        match session.as_mut() {
                            Some(s) => {
                                tracing::debug!("[{}] Forwarding {} bytes of RXDATA", s.remote_addr, out.len());
                                if let Err(e) = s.stream.write_all(&out).await {
                                    tracing::warn!("[{}] Write error: {}", s.remote_addr, e);
                                    drop_session = true;
                                }
                            }
                            None => {
                                tracing::warn!("No UART client, dropping {} bytes of RXDATA", out.len());
                                self.stats.rx_replies_dropped.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        if drop_session {
                            session = None;
                        }
                    }
                }

                Some(payload) = queue.next() => {
                    send_to_modem(modem_write, &payload, &self.stats).await;
                }

                _ = tokio::time::sleep_until(deadline.unwrap_or_else(tokio::time::Instant::now)), if deadline.is_some() => {
                    if let Some(s) = session.as_mut() {
                        tracing::warn!("[{}] Frame timeout, discarding partial frame", s.remote_addr);
                        s.link_mut().reset();
                        self.stats.frame_timeouts.fetch_add(1, Ordering::Relaxed);
                    }
                }

                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Reads from the current UART client, or waits forever when there is none.
async fn read_uart(session: &mut Option<Session>, buf: &mut [u8]) -> std::io::Result<usize> {
    match session {
        Some(s) => s.stream.read(buf).await,
        None => std::future::pending().await,
    }
}

fn log_link_event(addr: SocketAddr, event: &LinkEvent, status: lfr_core::SystemStatus) {
    match event {
        LinkEvent::Pending => {}
        LinkEvent::Replied { command, ok } => {
            tracing::info!(
                "[{}] {}: {} (status {})",
                addr,
                command,
                if *ok { "OK" } else { "ERROR" },
                status
            );
        }
        LinkEvent::Silent { command } => {
            tracing::info!("[{}] {}: no reply", addr, command);
        }
        LinkEvent::Rejected(err) => {
            tracing::warn!("[{}] Rejected: {}", addr, err);
        }
    }
}
