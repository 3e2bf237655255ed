//! Bounded transmit queue between the dispatcher and the modem writer.
//!
//! The dispatcher side never waits: a full queue is reported as
//! [`TransmitError::Busy`]. An abort empties the queue in place, so the
//! freed slots are usable by the very next send.

use bytes::Bytes;
use lfr_core::{TransmitError, Transmitter};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

struct Shared {
    frames: Mutex<VecDeque<Bytes>>,
    capacity: usize,
    notify: Notify,
    transmitter_dropped: AtomicBool,
    queue_dropped: AtomicBool,
}

/// Dispatcher side of the queue.
pub struct QueueTransmitter {
    shared: Arc<Shared>,
}

/// Modem side of the queue.
pub struct TxQueue {
    shared: Arc<Shared>,
}

/// Creates a queue holding at most `depth` payloads.
pub fn tx_queue(depth: usize) -> (QueueTransmitter, TxQueue) {
    let capacity = depth.max(1);
    let shared = Arc::new(Shared {
        frames: Mutex::new(VecDeque::with_capacity(capacity)),
        capacity,
        notify: Notify::new(),
        transmitter_dropped: AtomicBool::new(false),
        queue_dropped: AtomicBool::new(false),
    });
    (
        QueueTransmitter {
            shared: shared.clone(),
        },
        TxQueue { shared },
    )
}

impl Transmitter for QueueTransmitter {
    fn send(&mut self, payload: &[u8]) -> Result<(), TransmitError> {
        if self.shared.queue_dropped.load(Ordering::Acquire) {
            return Err(TransmitError::Closed);
        }
        {
            let mut frames = self.shared.frames.lock();
            if frames.len() >= self.shared.capacity {
                return Err(TransmitError::Busy);
            }
            frames.push_back(Bytes::copy_from_slice(payload));
        }
        self.shared.notify.notify_one();
        Ok(())
    }

    fn abort(&mut self) -> usize {
        let mut frames = self.shared.frames.lock();
        let dropped = frames.len();
        frames.clear();
        if dropped > 0 {
            tracing::debug!("Aborted {} queued frame(s)", dropped);
        }
        dropped
    }

    fn queue_depth(&self) -> u16 {
        self.shared.frames.lock().len().min(u16::MAX as usize) as u16
    }
}

impl Drop for QueueTransmitter {
    fn drop(&mut self) {
        self.shared.transmitter_dropped.store(true, Ordering::Release);
        self.shared.notify.notify_one();
    }
}

impl TxQueue {
    /// Waits for the next payload to put on the air.
    ///
    /// Returns `None` once the transmitter is dropped and the queue is
    /// empty. Cancel safe.
    pub async fn next(&mut self) -> Option<Bytes> {
        loop {
            if let Some(payload) = self.shared.frames.lock().pop_front() {
                return Some(payload);
            }
            if self.shared.transmitter_dropped.load(Ordering::Acquire) {
                return None;
            }
            // notify_one stores a permit, so a send between the check and
            // this await still wakes us.
            self.shared.notify.notified().await;
        }
    }
}

impl Drop for TxQueue {
    fn drop(&mut self) {
        self.shared.queue_dropped.store(true, Ordering::Release);
    }
}
