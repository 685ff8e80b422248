//! Opaque message-bus seams.
//!
//! The pipeline consumes and produces whole byte messages; the actual
//! socket transport lives outside the core. `loopback` provides an
//! in-process pair used by tests and by single-process deployments.

use std::sync::Arc;
use std::time::Duration;

use fsift_queue::BoundedQueue;

use crate::error::{ProtoError, ProtoResult};

/// Blocking source of bus messages (frames in, or metadata in).
pub trait MessageSource: Send {
    /// Receive one whole message, waiting up to `timeout`.
    ///
    /// `Ok(None)` means the timeout elapsed; `Err(ProtoError::Closed)`
    /// means the peer is gone and drained.
    fn recv_timeout(&mut self, timeout: Duration) -> ProtoResult<Option<Vec<u8>>>;
}

/// Blocking sink for bus messages (frames out, or metadata out).
pub trait MessageSink: Send {
    /// Send one whole message.
    fn send(&mut self, payload: &[u8]) -> ProtoResult<()>;

    /// Close the sink; receivers drain what was sent, then see `Closed`.
    fn close(&mut self) {}
}

/// Sending half of an in-process bus.
pub struct LoopbackSender {
    queue: Arc<BoundedQueue<Vec<u8>>>,
    send_timeout: Duration,
}

/// Receiving half of an in-process bus.
pub struct LoopbackReceiver {
    queue: Arc<BoundedQueue<Vec<u8>>>,
}

/// Create a connected in-process sender/receiver pair with a bounded
/// backlog.
pub fn loopback(capacity: usize) -> (LoopbackSender, LoopbackReceiver) {
    let queue = Arc::new(BoundedQueue::new(capacity));
    (
        LoopbackSender {
            queue: Arc::clone(&queue),
            send_timeout: Duration::from_millis(100),
        },
        LoopbackReceiver { queue },
    )
}

impl MessageSink for LoopbackSender {
    fn send(&mut self, payload: &[u8]) -> ProtoResult<()> {
        if self.queue.push_timeout(payload.to_vec(), self.send_timeout) {
            Ok(())
        } else {
            Err(ProtoError::Closed)
        }
    }

    fn close(&mut self) {
        self.queue.stop();
    }
}

impl MessageSource for LoopbackReceiver {
    fn recv_timeout(&mut self, timeout: Duration) -> ProtoResult<Option<Vec<u8>>> {
        match self.queue.pop_timeout(timeout) {
            Some(payload) => Ok(Some(payload)),
            None if self.queue.is_stopped() && self.queue.is_empty() => Err(ProtoError::Closed),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_millis(20);

    #[test]
    fn test_loopback_delivers_in_order() {
        let (mut tx, mut rx) = loopback(8);
        tx.send(b"one").unwrap();
        tx.send(b"two").unwrap();
        assert_eq!(rx.recv_timeout(SHORT).unwrap().unwrap(), b"one");
        assert_eq!(rx.recv_timeout(SHORT).unwrap().unwrap(), b"two");
    }

    #[test]
    fn test_loopback_timeout_is_none() {
        let (_tx, mut rx) = loopback(8);
        assert!(rx.recv_timeout(SHORT).unwrap().is_none());
    }

    #[test]
    fn test_loopback_close_drains_then_errors() {
        let (mut tx, mut rx) = loopback(8);
        tx.send(b"last").unwrap();
        tx.close();
        assert!(tx.send(b"after close").is_err());
        assert_eq!(rx.recv_timeout(SHORT).unwrap().unwrap(), b"last");
        assert!(matches!(rx.recv_timeout(SHORT), Err(ProtoError::Closed)));
    }

    #[test]
    fn test_loopback_backpressure_drops_at_sender() {
        let (mut tx, _rx) = loopback(1);
        tx.send(b"fits").unwrap();
        assert!(matches!(tx.send(b"overflow"), Err(ProtoError::Closed)));
    }
}
