//! Bounded outbound queue owned by a single transport
//!
//! The queue is the system's sole backpressure mechanism: a producer that
//! exceeds capacity suspends until the consumer loop frees a slot, so
//! command issuance is throttled to transport throughput and no accepted
//! frame is ever dropped.

use tokio::sync::mpsc;

use crate::errors::TransportError;

/// Default queue capacity, one queue per transport instance
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 5;

/// Create a bounded outbound queue with the given capacity
pub fn outbound_queue(capacity: usize) -> (OutboundQueue, OutboundReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        OutboundQueue { tx },
        OutboundReceiver { rx, retained: None },
    )
}

// ----------------------------------------------------------------------------
// Producer Half
// ----------------------------------------------------------------------------

/// Producer half of the outbound queue. Cheap to clone; concurrent
/// producers are serialized by the channel's own insertion discipline.
#[derive(Clone)]
pub struct OutboundQueue {
    tx: mpsc::Sender<Vec<u8>>,
}

impl OutboundQueue {
    /// Append a frame, suspending while the queue is full
    pub async fn push(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| TransportError::QueueClosed)
    }
}

// ----------------------------------------------------------------------------
// Consumer Half
// ----------------------------------------------------------------------------

/// Consumer half, drained only by the owning transport's consumer loop.
/// A frame whose write failed can be retained and is handed out again
/// before anything newer.
pub struct OutboundReceiver {
    rx: mpsc::Receiver<Vec<u8>>,
    retained: Option<Vec<u8>>,
}

impl OutboundReceiver {
    /// Next frame in FIFO order, a retained frame first. Returns `None`
    /// once all producers are gone and the queue is drained.
    pub async fn next(&mut self) -> Option<Vec<u8>> {
        if let Some(frame) = self.retained.take() {
            return Some(frame);
        }
        self.rx.recv().await
    }

    /// Put back a frame whose write failed so it is retried on the next
    /// connected cycle
    pub fn retain(&mut self, frame: Vec<u8>) {
        self.retained = Some(frame);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_fifo_order() {
        let (queue, mut rx) = outbound_queue(5);
        queue.push(vec![1]).await.unwrap();
        queue.push(vec![2]).await.unwrap();
        queue.push(vec![3]).await.unwrap();

        assert_eq!(rx.next().await, Some(vec![1]));
        assert_eq!(rx.next().await, Some(vec![2]));
        assert_eq!(rx.next().await, Some(vec![3]));
    }

    #[tokio::test]
    async fn test_sixth_push_suspends_until_drained() {
        let (queue, mut rx) = outbound_queue(5);
        for i in 0..5u8 {
            queue.push(vec![i]).await.unwrap();
        }

        // Queue is at capacity: the sixth push must suspend, not fail.
        let pending = queue.push(vec![5]);
        tokio::pin!(pending);
        assert!(timeout(Duration::from_millis(50), &mut pending)
            .await
            .is_err());

        // Draining one slot lets the suspended push complete.
        assert_eq!(rx.next().await, Some(vec![0]));
        timeout(Duration::from_secs(1), &mut pending)
            .await
            .expect("push should resume after a slot frees")
            .unwrap();
    }

    #[tokio::test]
    async fn test_retained_frame_comes_first() {
        let (queue, mut rx) = outbound_queue(5);
        queue.push(vec![1]).await.unwrap();
        queue.push(vec![2]).await.unwrap();

        let frame = rx.next().await.unwrap();
        assert_eq!(frame, vec![1]);

        // Simulate a failed write: the frame goes back to the front.
        rx.retain(frame);
        assert_eq!(rx.next().await, Some(vec![1]));
        assert_eq!(rx.next().await, Some(vec![2]));
    }

    #[tokio::test]
    async fn test_closed_queue_reports_error() {
        let (queue, rx) = outbound_queue(5);
        drop(rx);
        assert!(matches!(
            queue.push(vec![1]).await,
            Err(TransportError::QueueClosed)
        ));
    }
}
