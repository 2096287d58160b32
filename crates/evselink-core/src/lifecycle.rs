//! Lifecycle entry points callable from any component
//!
//! The watchdog and the transports request recovery through a
//! [`LifecycleHandle`] without knowing anything about the orchestrator's
//! internals; the orchestrator drains the paired receiver.

use tokio::sync::mpsc;
use tracing::trace;

// ----------------------------------------------------------------------------
// Requests
// ----------------------------------------------------------------------------

/// Recovery and termination requests routed to the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleRequest {
    /// Re-run the connection sequence in place without terminating the
    /// process. Carries an optional replacement target address.
    Restart { address: Option<String> },
    /// Unrecoverable failure; the process terminates with a non-zero
    /// status after cleanup.
    FatalExit { message: String },
    /// Graceful termination (signal-driven); the process exits zero.
    Shutdown,
}

/// Receiver half owned by the orchestrator
pub type LifecycleReceiver = mpsc::UnboundedReceiver<LifecycleRequest>;

// ----------------------------------------------------------------------------
// Handle
// ----------------------------------------------------------------------------

/// Cloneable handle for issuing lifecycle requests
#[derive(Debug, Clone)]
pub struct LifecycleHandle {
    tx: mpsc::UnboundedSender<LifecycleRequest>,
}

impl LifecycleHandle {
    /// Create a handle and the receiver the orchestrator drains
    pub fn channel() -> (Self, LifecycleReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Request an in-place restart of the connection sequence
    pub fn restart(&self, address: Option<String>) {
        self.send(LifecycleRequest::Restart { address });
    }

    /// Request fatal termination with a diagnostic message
    pub fn fatal_exit(&self, message: impl Into<String>) {
        self.send(LifecycleRequest::FatalExit {
            message: message.into(),
        });
    }

    /// Request graceful termination
    pub fn shutdown(&self) {
        self.send(LifecycleRequest::Shutdown);
    }

    fn send(&self, request: LifecycleRequest) {
        // The receiver disappears during teardown; late requests are moot.
        if self.tx.send(request).is_err() {
            trace!("lifecycle receiver gone, request dropped");
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_requests_arrive_in_order() {
        let (handle, mut rx) = LifecycleHandle::channel();
        handle.restart(None);
        handle.fatal_exit("boom");
        handle.shutdown();

        assert_eq!(
            rx.recv().await,
            Some(LifecycleRequest::Restart { address: None })
        );
        assert_eq!(
            rx.recv().await,
            Some(LifecycleRequest::FatalExit {
                message: "boom".to_string()
            })
        );
        assert_eq!(rx.recv().await, Some(LifecycleRequest::Shutdown));
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped_is_silent() {
        let (handle, rx) = LifecycleHandle::channel();
        drop(rx);
        // Must not panic or error out.
        handle.restart(Some("192.168.1.50:8080".to_string()));
    }
}
