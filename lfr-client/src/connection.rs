//! Connection management.

use crate::error::ClientError;
use bytes::Bytes;
use lfr_protocol::{encode_command, Command, ReplyDecoder, ReplyFrame};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Default read buffer size.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// UART socket address.
    pub addr: SocketAddr,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// How long to wait for a command's reply.
    pub request_timeout: Duration,
    /// How many times `tx` resends a payload the radio answered BUSY to.
    pub busy_retries: u32,
    /// Pause between BUSY retries.
    pub busy_backoff: Duration,
}

impl ConnectionConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            busy_retries: 50,
            busy_backoff: Duration::from_millis(20),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_busy_retries(mut self, retries: u32) -> Self {
        self.busy_retries = retries;
        self
    }

    pub fn with_busy_backoff(mut self, backoff: Duration) -> Self {
        self.busy_backoff = backoff;
        self
    }
}

/// Read side state. Command replies and received packets share one byte
/// stream, so whoever holds this lock owns the decoder.
struct ReadState {
    reader: Option<OwnedReadHalf>,
    decoder: ReplyDecoder,
    /// Decoded frames not yet consumed.
    frames: VecDeque<ReplyFrame>,
    /// RXDATA payloads that arrived while waiting for a command reply.
    received: VecDeque<Bytes>,
}

/// A connection to the radio's UART socket.
///
/// Requests are strictly serialised: the radio answers in order and
/// replies carry no id, so a request holds the read side until its reply
/// arrives.
pub struct Connection {
    config: ConnectionConfig,
    writer: Mutex<Option<OwnedWriteHalf>>,
    read: Mutex<ReadState>,
    /// Status byte of the last reply.
    last_status: AtomicU8,
    connected: AtomicBool,
}

impl Connection {
    /// Creates a new connection (not yet connected).
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            writer: Mutex::new(None),
            read: Mutex::new(ReadState {
                reader: None,
                decoder: ReplyDecoder::new(),
                frames: VecDeque::new(),
                received: VecDeque::new(),
            }),
            last_status: AtomicU8::new(0),
            connected: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Connects to the radio.
    pub async fn connect(&self) -> Result<(), ClientError> {
        tracing::debug!("Connecting to {}...", self.config.addr);

        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(self.config.addr),
        )
        .await
        .map_err(|_| {
            tracing::debug!("Connection timeout");
            ClientError::Timeout
        })?
        .map_err(|e| {
            tracing::debug!("Connection failed: {}", e);
            ClientError::Io(e)
        })?;

        stream.set_nodelay(true).ok();

        let (read_half, write_half) = stream.into_split();
        *self.writer.lock().await = Some(write_half);
        {
            let mut read = self.read.lock().await;
            read.reader = Some(read_half);
            read.decoder.reset();
            read.frames.clear();
            read.received.clear();
        }

        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!("Connected to {}", self.config.addr);
        Ok(())
    }

    /// Sends a command without waiting for a reply.
    pub async fn send(&self, command: Command, payload: &[u8]) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let frame = encode_command(command, payload)?;
        self.write(&frame).await
    }

    /// Sends a command and waits for its reply.
    ///
    /// Error replies are returned as frames; turning them into errors is up
    /// to the caller. RXDATA frames arriving in the meantime are queued for
    /// [`Connection::recv`].
    pub async fn request(
        &self,
        command: Command,
        payload: &[u8],
    ) -> Result<ReplyFrame, ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let frame = encode_command(command, payload)?;

        let mut read = self.read.lock().await;
        self.write(&frame).await?;
        tracing::debug!("Sent {} ({} bytes), waiting for reply", command, frame.len());

        let reply = tokio::time::timeout(self.config.request_timeout, async {
            loop {
                let reply = self.next_frame(&mut read).await?;
                if reply.is_rx_data() {
                    read.received.push_back(reply.payload);
                    continue;
                }
                return Ok::<_, ClientError>(reply);
            }
        })
        .await
        .map_err(|_| {
            tracing::debug!("{} timed out", command);
            ClientError::Timeout
        })??;

        self.last_status.store(reply.status, Ordering::SeqCst);
        Ok(reply)
    }

    /// Waits for the next received packet.
    ///
    /// Returns `Ok(None)` if nothing arrives within `timeout`.
    pub async fn recv(&self, timeout: Duration) -> Result<Option<Bytes>, ClientError> {
        let mut read = self.read.lock().await;
        if let Some(packet) = read.received.pop_front() {
            return Ok(Some(packet));
        }
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let result = tokio::time::timeout(timeout, async {
            loop {
                let frame = self.next_frame(&mut read).await?;
                if frame.is_rx_data() {
                    self.last_status.store(frame.status, Ordering::SeqCst);
                    return Ok::<_, ClientError>(frame.payload);
                }
                tracing::warn!(
                    "Discarding unsolicited reply 0x{:02x} while waiting for RXDATA",
                    frame.command
                );
            }
        })
        .await;

        match result {
            Ok(packet) => packet.map(Some),
            Err(_) => Ok(None),
        }
    }

    async fn write(&self, data: &[u8]) -> Result<(), ClientError> {
        let mut writer_guard = self.writer.lock().await;
        let writer = writer_guard.as_mut().ok_or(ClientError::NotConnected)?;
        writer.write_all(data).await.map_err(ClientError::Io)
    }

    async fn next_frame(&self, read: &mut ReadState) -> Result<ReplyFrame, ClientError> {
        let mut buf = [0u8; DEFAULT_READ_BUFFER_SIZE];
        loop {
            if let Some(frame) = read.frames.pop_front() {
                return Ok(frame);
            }

            let reader = read.reader.as_mut().ok_or(ClientError::NotConnected)?;
            let n = reader.read(&mut buf).await.map_err(ClientError::Io)?;
            if n == 0 {
                tracing::debug!("Connection closed by radio");
                self.connected.store(false, Ordering::SeqCst);
                return Err(ClientError::ConnectionClosed);
            }
            tracing::debug!("Read {} bytes", n);

            let mut first_error = None;
            for result in read.decoder.push_slice(&buf[..n]) {
                match result {
                    Ok(frame) => read.frames.push_back(frame),
                    Err(e) => {
                        tracing::warn!("Bad reply frame: {}", e);
                        first_error.get_or_insert(e);
                    }
                }
            }
            if let Some(e) = first_error {
                return Err(e.into());
            }
        }
    }

    /// Status byte carried by the most recent reply.
    pub fn last_status(&self) -> u8 {
        self.last_status.load(Ordering::SeqCst)
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        tracing::debug!("Closing connection...");
        self.connected.store(false, Ordering::SeqCst);

        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }

        let mut read = self.read.lock().await;
        read.reader = None;
        read.frames.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lfr_protocol::{encode_reply, ErrorCode};
    use tokio::net::TcpListener;

    #[test]
    fn test_config_defaults() {
        let config = ConnectionConfig::new("127.0.0.1:52100".parse().unwrap());
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.busy_retries, 50);

        let config = config
            .with_busy_retries(0)
            .with_request_timeout(Duration::from_millis(10));
        assert_eq!(config.busy_retries, 0);
        assert_eq!(config.request_timeout, Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_not_connected() {
        let conn = Connection::new(ConnectionConfig::new("127.0.0.1:1".parse().unwrap()));
        assert!(!conn.is_connected());
        assert!(matches!(
            conn.request(Command::Nop, &[]).await,
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_rxdata_before_reply_is_queued() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let radio = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 16];
            let n = stream.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], &[0xBE, 0xEF, 0x00, 0x00, 0x00, 0x00]);

            let mut out = Vec::new();
            encode_reply(&mut out, 0x01, 0x11, b"pkt").unwrap();
            encode_reply(&mut out, 0x01, 0x00, &[]).unwrap();
            stream.write_all(&out).await.unwrap();
            stream
        });

        let conn = Connection::new(ConnectionConfig::new(addr));
        conn.connect().await.unwrap();
        let reply = conn.request(Command::Nop, &[]).await.unwrap();
        assert_eq!(reply.command, 0x80);
        assert_eq!(conn.last_status(), 0x01);

        let packet = conn.recv(Duration::from_millis(100)).await.unwrap();
        assert_eq!(packet, Some(Bytes::from_static(b"pkt")));
        radio.await.unwrap();
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let radio = tokio::spawn(async move { listener.accept().await.unwrap().0 });

        let config =
            ConnectionConfig::new(addr).with_request_timeout(Duration::from_millis(50));
        let conn = Connection::new(config);
        conn.connect().await.unwrap();
        let _stream = radio.await.unwrap();

        assert!(matches!(
            conn.request(Command::Nop, &[]).await,
            Err(ClientError::Timeout)
        ));
        assert_eq!(conn.recv(Duration::from_millis(20)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_closed_by_radio() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let radio = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let conn = Connection::new(ConnectionConfig::new(addr));
        conn.connect().await.unwrap();
        radio.await.unwrap();

        let err = conn.request(Command::Nop, &[]).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::ConnectionClosed | ClientError::Io(_)
        ));
        assert_ne!(err.radio_code(), Some(ErrorCode::Busy));
    }
}
