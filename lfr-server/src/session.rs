//! UART client session.

use lfr_core::CommandLink;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;
use uuid::Uuid;

/// The commanding client currently attached to the emulated UART.
///
/// Each session owns its own [`CommandLink`], so a replaced client never
/// leaves a partial frame behind for the next one.
pub struct Session {
    /// Unique session ID.
    pub id: String,

    /// Remote address.
    pub remote_addr: SocketAddr,

    pub(crate) stream: TcpStream,

    link: CommandLink,

    created_at: Instant,

    last_input: Instant,

    bytes_in: u64,

    frames: u64,
}

impl Session {
    /// Creates a new session.
    pub fn new(stream: TcpStream, remote_addr: SocketAddr) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("[{}] set_nodelay failed: {}", remote_addr, e);
        }
        let now = Instant::now();
        Self {
            id: Uuid::new_v4().to_string(),
            remote_addr,
            stream,
            link: CommandLink::new(),
            created_at: now,
            last_input: now,
            bytes_in: 0,
            frames: 0,
        }
    }

    pub fn link_mut(&mut self) -> &mut CommandLink {
        &mut self.link
    }

    /// Records `n` bytes of input, of which `frames` completed a frame.
    pub fn record_input(&mut self, n: usize, frames: usize) {
        self.bytes_in += n as u64;
        self.frames += frames as u64;
        self.last_input = Instant::now();
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Returns the session age.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// When a half-received frame should be abandoned, if one is pending.
    pub fn frame_deadline(&self, timeout: Option<Duration>) -> Option<Instant> {
        if self.link.is_idle() {
            return None;
        }
        timeout.map(|t| self.last_input + t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (TcpStream, TcpStream, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        (client, server, peer)
    }

    #[tokio::test]
    async fn test_session_creation() {
        let (_client, server, peer) = connected_pair().await;
        let session = Session::new(server, peer);
        assert_eq!(session.remote_addr, peer);
        assert_eq!(session.bytes_in(), 0);
        assert!(Uuid::parse_str(&session.id).is_ok());
    }

    #[tokio::test]
    async fn test_frame_deadline_only_mid_frame() {
        let (_client, server, peer) = connected_pair().await;
        let mut session = Session::new(server, peer);
        let timeout = Some(Duration::from_millis(100));
        assert_eq!(session.frame_deadline(timeout), None);

        let mut device = lfr_core::Device::default();
        let mut tx = lfr_core::transmitter::LoopbackTransmitter::new();
        let mut out = Vec::new();
        session
            .link_mut()
            .process_slice(&[0xBE, 0xEF], &mut device, &mut tx, &mut out)
            .unwrap();
        session.record_input(2, 0);

        assert!(session.frame_deadline(timeout).is_some());
        assert_eq!(session.frame_deadline(None), None);
        assert_eq!(session.bytes_in(), 2);
    }
}
