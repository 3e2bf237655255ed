//! High-level client API.

use crate::connection::{Connection, ConnectionConfig};
use crate::error::ClientError;
use bytes::Bytes;
use lfr_core::RadioSettings;
use lfr_protocol::{Command, ErrorCode, ReplyFrame};
use std::sync::Arc;
use std::time::Duration;

/// High-level client for the Little Free Radio.
pub struct Client {
    conn: Arc<Connection>,
}

impl Client {
    /// Creates a new client with the given configuration.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            conn: Arc::new(Connection::new(config)),
        }
    }

    /// Connects to the radio.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.conn.connect().await
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.conn.close().await
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> Arc<Connection> {
        self.conn.clone()
    }

    /// Status byte carried by the most recent reply.
    pub fn last_status(&self) -> u8 {
        self.conn.last_status()
    }

    // =========================================================================
    // Helper methods
    // =========================================================================

    async fn request(&self, command: Command, payload: &[u8]) -> Result<Bytes, ClientError> {
        let reply = self.conn.request(command, payload).await?;
        check_reply(command, reply)
    }

    async fn request_u16(&self, command: Command) -> Result<u16, ClientError> {
        let payload = self.request(command, &[]).await?;
        match payload[..] {
            [hi, lo] => Ok(u16::from_be_bytes([hi, lo])),
            _ => Err(ClientError::MalformedReply(format!(
                "{} returned {} bytes, expected 2",
                command,
                payload.len()
            ))),
        }
    }

    // =========================================================================
    // System
    // =========================================================================

    /// Checks that the radio is alive.
    pub async fn nop(&self) -> Result<(), ClientError> {
        self.request(Command::Nop, &[]).await?;
        Ok(())
    }

    /// Reboots the radio. It sends no reply.
    pub async fn reset(&self) -> Result<(), ClientError> {
        self.conn.send(Command::Reset, &[]).await
    }

    // =========================================================================
    // Transmit / receive
    // =========================================================================

    /// Queues a payload for transmission, resending while the radio is busy.
    pub async fn tx(&self, data: &[u8]) -> Result<(), ClientError> {
        let config = self.conn.config();
        let mut attempts = 0;
        loop {
            match self.request(Command::TxData, data).await {
                Err(ClientError::Radio {
                    code: ErrorCode::Busy,
                    ..
                }) if attempts < config.busy_retries => {
                    attempts += 1;
                    tracing::debug!("Radio busy, retry {}/{}", attempts, config.busy_retries);
                    tokio::time::sleep(config.busy_backoff).await;
                }
                result => return result.map(|_| ()),
            }
        }
    }

    /// Waits up to `timeout` for a received packet.
    pub async fn rx(&self, timeout: Duration) -> Result<Option<Bytes>, ClientError> {
        self.conn.recv(timeout).await
    }

    /// Drops every queued transmission.
    pub async fn abort_tx(&self) -> Result<(), ClientError> {
        self.request(Command::TxAbort, &[]).await?;
        Ok(())
    }

    /// Transmits the pseudo-random test sequence.
    pub async fn tx_psr(&self) -> Result<(), ClientError> {
        self.request(Command::TxPsr, &[]).await?;
        Ok(())
    }

    /// Returns the number of payloads waiting to be transmitted.
    pub async fn queue_depth(&self) -> Result<u16, ClientError> {
        self.request_u16(Command::GetQueueDepth).await
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Reads the transmit power.
    pub async fn tx_power(&self) -> Result<u16, ClientError> {
        self.request_u16(Command::ReadTxPwr).await
    }

    pub async fn set_tx_power(&self, power: u16) -> Result<(), ClientError> {
        self.request(Command::SetTxPwr, &power.to_be_bytes()).await?;
        Ok(())
    }

    pub async fn set_frequency(&self, frequency_hz: u32) -> Result<(), ClientError> {
        self.request(Command::SetFreq, &frequency_hz.to_be_bytes())
            .await?;
        Ok(())
    }

    /// Reads the active settings.
    pub async fn settings(&self) -> Result<RadioSettings, ClientError> {
        let blob = self.request(Command::GetCfg, &[]).await?;
        RadioSettings::from_blob(&blob).map_err(|e| ClientError::MalformedReply(e.to_string()))
    }

    /// Replaces the active settings.
    pub async fn set_settings(&self, settings: &RadioSettings) -> Result<(), ClientError> {
        self.request(Command::SetCfg, &settings.to_blob()).await?;
        Ok(())
    }

    /// Persists the active settings.
    pub async fn save_settings(&self) -> Result<(), ClientError> {
        self.request(Command::SaveCfg, &[]).await?;
        Ok(())
    }

    /// Restores factory settings.
    pub async fn default_settings(&self) -> Result<(), ClientError> {
        self.request(Command::CfgDefault, &[]).await?;
        Ok(())
    }
}

/// Turns an error reply into [`ClientError::Radio`] and checks the reply
/// answers `command`.
fn check_reply(command: Command, reply: ReplyFrame) -> Result<Bytes, ClientError> {
    if reply.is_error() {
        return match reply.error_code() {
            Some(code) => Err(ClientError::Radio {
                code,
                status: reply.status,
            }),
            None => Err(ClientError::MalformedReply(format!(
                "error reply with unknown code {:?}",
                reply.payload.first()
            ))),
        };
    }
    if reply.base_command() != command.id() {
        return Err(ClientError::UnexpectedReply {
            expected: command.id(),
            actual: reply.command,
        });
    }
    Ok(reply.payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lfr_core::transmitter::LoopbackTransmitter;
    use lfr_core::{CommandLink, Device, LinkEvent, Transmitter};
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one client with a real command link and a loopback
    /// transmitter that reports BUSY for the first `busy` sends.
    async fn spawn_radio(busy: usize) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut link = CommandLink::new();
            let mut device = Device::default();
            let mut tx = LoopbackTransmitter::with_capacity(1);
            let mut busy_left = busy;
            if busy_left > 0 {
                tx.send(b"filler").unwrap();
            }

            let mut buf = [0u8; 512];
            loop {
                let n = match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                let mut out = Vec::new();
                for &byte in &buf[..n] {
                    let event = link.process(byte, &mut device, &mut tx, &mut out).unwrap();
                    if matches!(event, LinkEvent::Replied { .. }) && busy_left > 0 {
                        busy_left -= 1;
                        if busy_left == 0 {
                            tx.take();
                        }
                    }
                }
                if stream.write_all(&out).await.is_err() {
                    return;
                }
            }
        });

        addr
    }

    async fn connect(addr: SocketAddr) -> Client {
        let config = ConnectionConfig::new(addr).with_busy_backoff(Duration::from_millis(1));
        let client = Client::new(config);
        client.connect().await.unwrap();
        client
    }

    #[test]
    fn test_client_creation() {
        let config = ConnectionConfig::new("127.0.0.1:52100".parse().unwrap());
        let client = Client::new(config);
        assert!(!client.is_connected());
    }

    #[test]
    fn test_check_reply() {
        let ok = ReplyFrame {
            status: 1,
            command: 0xA5,
            payload: Bytes::from_static(&[0x00, 0x64]),
        };
        assert_eq!(
            check_reply(Command::ReadTxPwr, ok.clone()).unwrap(),
            Bytes::from_static(&[0x00, 0x64])
        );
        assert!(matches!(
            check_reply(Command::Nop, ok),
            Err(ClientError::UnexpectedReply {
                expected: 0x00,
                actual: 0xA5
            })
        ));

        let err = ReplyFrame {
            status: 0,
            command: 0xFF,
            payload: Bytes::from_static(&[0x07]),
        };
        assert_eq!(
            check_reply(Command::TxData, err).unwrap_err().radio_code(),
            Some(ErrorCode::Busy)
        );
    }

    #[tokio::test]
    async fn test_settings_round_trip() {
        let client = connect(spawn_radio(0).await).await;

        client.nop().await.unwrap();
        assert_eq!(client.tx_power().await.unwrap(), 0x0064);

        client.set_tx_power(0x0123).await.unwrap();
        client.set_frequency(437_500_000).await.unwrap();
        let settings = client.settings().await.unwrap();
        assert_eq!(settings.tx_power, 0x0123);
        assert_eq!(settings.frequency_hz, 437_500_000);

        client.default_settings().await.unwrap();
        assert_eq!(client.settings().await.unwrap(), RadioSettings::DEFAULT);

        client.set_settings(&settings).await.unwrap();
        client.save_settings().await.unwrap();
        assert_eq!(client.tx_power().await.unwrap(), 0x0123);
    }

    #[tokio::test]
    async fn test_tx_and_queue_depth() {
        let client = connect(spawn_radio(0).await).await;
        client.tx(b"KC2QOL 1").await.unwrap();
        assert_eq!(client.queue_depth().await.unwrap(), 1);
        client.abort_tx().await.unwrap();
        assert_eq!(client.queue_depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tx_retries_on_busy() {
        let client = connect(spawn_radio(2).await).await;
        client.tx(b"hello").await.unwrap();
    }

    #[tokio::test]
    async fn test_tx_gives_up_after_retries() {
        let addr = spawn_radio(10).await;
        let config = ConnectionConfig::new(addr)
            .with_busy_retries(2)
            .with_busy_backoff(Duration::from_millis(1));
        let client = Client::new(config);
        client.connect().await.unwrap();

        let err = client.tx(b"hello").await.unwrap_err();
        assert_eq!(err.radio_code(), Some(ErrorCode::Busy));
    }

    #[tokio::test]
    async fn test_empty_tx_is_rejected() {
        let client = connect(spawn_radio(0).await).await;
        let err = client.tx(&[]).await.unwrap_err();
        assert_eq!(err.radio_code(), Some(ErrorCode::InvalidLength));
    }
}
