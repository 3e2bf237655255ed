//! Transmit interface.
//!
//! The dispatcher hands payloads to a [`Transmitter`] and reports success as
//! soon as the bytes are accepted. Nothing here waits for the air.

use lfr_protocol::ErrorCode;
use thiserror::Error;

/// Why a payload was not accepted for transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransmitError {
    #[error("transmit queue full")]
    Busy,

    #[error("transmitter closed")]
    Closed,
}

impl TransmitError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            TransmitError::Busy => ErrorCode::Busy,
            TransmitError::Closed => ErrorCode::InvalidParam,
        }
    }
}

/// Outgoing radio sink.
///
/// Implementations must not block: `send` either accepts the payload
/// immediately or fails.
pub trait Transmitter {
    /// Queues a payload for transmission.
    fn send(&mut self, payload: &[u8]) -> Result<(), TransmitError>;

    /// Drops every queued payload. Returns how many were dropped.
    fn abort(&mut self) -> usize;

    /// Number of payloads accepted but not yet on the air.
    fn queue_depth(&self) -> u16;
}

impl<T: Transmitter + ?Sized> Transmitter for &mut T {
    fn send(&mut self, payload: &[u8]) -> Result<(), TransmitError> {
        (**self).send(payload)
    }

    fn abort(&mut self) -> usize {
        (**self).abort()
    }

    fn queue_depth(&self) -> u16 {
        (**self).queue_depth()
    }
}

/// In-memory transmitter used by tests and simulations.
#[derive(Debug, Default)]
pub struct LoopbackTransmitter {
    /// Payloads accepted and not yet taken.
    pub queue: Vec<Vec<u8>>,
    /// Maximum queued payloads; `None` is unbounded.
    pub capacity: Option<usize>,
    /// When set, every send fails with [`TransmitError::Closed`].
    pub closed: bool,
}

impl LoopbackTransmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Removes and returns everything queued so far.
    pub fn take(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.queue)
    }
}

impl Transmitter for LoopbackTransmitter {
    fn send(&mut self, payload: &[u8]) -> Result<(), TransmitError> {
        if self.closed {
            return Err(TransmitError::Closed);
        }
        if self.capacity.is_some_and(|cap| self.queue.len() >= cap) {
            return Err(TransmitError::Busy);
        }
        self.queue.push(payload.to_vec());
        Ok(())
    }

    fn abort(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }

    fn queue_depth(&self) -> u16 {
        self.queue.len().min(u16::MAX as usize) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_send_and_take() {
        let mut tx = LoopbackTransmitter::new();
        tx.send(b"one").unwrap();
        tx.send(b"two").unwrap();
        assert_eq!(tx.queue_depth(), 2);

        let sent = tx.take();
        assert_eq!(sent, vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(tx.queue_depth(), 0);
    }

    #[test]
    fn test_loopback_busy_when_full() {
        let mut tx = LoopbackTransmitter::with_capacity(1);
        tx.send(b"a").unwrap();
        assert_eq!(tx.send(b"b"), Err(TransmitError::Busy));
        assert_eq!(tx.abort(), 1);
        assert!(tx.send(b"c").is_ok());
    }

    #[test]
    fn test_loopback_closed() {
        let mut tx = LoopbackTransmitter {
            closed: true,
            ..Default::default()
        };
        assert_eq!(tx.send(b"a"), Err(TransmitError::Closed));
    }

    #[test]
    fn test_forwarding_through_mut_ref() {
        let mut tx = LoopbackTransmitter::new();
        {
            let mut by_ref = &mut tx;
            Transmitter::send(&mut by_ref, b"x").unwrap();
            assert_eq!(Transmitter::queue_depth(&by_ref), 1);
        }
        assert_eq!(tx.queue.len(), 1);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(TransmitError::Busy.error_code(), ErrorCode::Busy);
        assert_eq!(TransmitError::Closed.error_code(), ErrorCode::InvalidParam);
    }
}
