//! Liveness watchdog for the active transport
//!
//! A repeating, cancellable timer task rather than a self-rescheduling
//! callback chain, so cancellation on teardown is deterministic. The
//! watchdog never inspects payload content; it only watches chunk arrival
//! timing through the shared [`LinkStatus`], and its timeout is identical
//! across transport kinds.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::lifecycle::LifecycleHandle;
use crate::status::LinkStatus;

// ----------------------------------------------------------------------------
// Watchdog
// ----------------------------------------------------------------------------

/// Per-transport liveness timer. Every inbound chunk postpones expiry by
/// a full timeout window; expiry requests a restart and rearms.
pub struct Watchdog {
    timeout: Duration,
    status: Arc<LinkStatus>,
    lifecycle: LifecycleHandle,
}

impl Watchdog {
    pub fn new(timeout: Duration, status: Arc<LinkStatus>, lifecycle: LifecycleHandle) -> Self {
        Self {
            timeout,
            status,
            lifecycle,
        }
    }

    /// Run the deadline checks until the task is aborted. Each cycle arms
    /// a check at now + timeout; the check fires a restart request only
    /// while the link is CONNECTED and no inbound chunk arrived for a
    /// whole window, then rearms either way.
    pub async fn run(self) {
        debug!(timeout_secs = self.timeout.as_secs(), "watchdog armed");
        let mut last_fired: Option<Instant> = None;
        loop {
            tokio::time::sleep(self.timeout).await;

            // Liveness only applies to a live link. While establish or
            // await_peer is still working, their own retry and waiting
            // discipline governs; only retry exhaustion may end it.
            if !self.status.is_connected() {
                continue;
            }

            let silence = self.status.since_last_inbound();
            // After firing, hold off a full window so a restart that is
            // still in flight is not requested again immediately.
            let recently_fired = last_fired.is_some_and(|at| at.elapsed() <= self.timeout);
            if silence > self.timeout && !recently_fired {
                warn!(
                    silence_secs = silence.as_secs(),
                    "no inbound data within the watchdog window, requesting restart"
                );
                self.lifecycle.restart(None);
                last_fired = Some(Instant::now());
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleRequest;
    use crate::status::ConnectionState;

    const TIMEOUT: Duration = Duration::from_secs(35);

    /// Let the spawned watchdog task observe timers that fired during a
    /// paused-time advance
    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    /// Spawn a watchdog over a CONNECTED link and let it register its
    /// first deadline before the test starts advancing time
    async fn spawn_watchdog() -> (
        Arc<LinkStatus>,
        tokio::sync::mpsc::UnboundedReceiver<LifecycleRequest>,
        tokio::task::JoinHandle<()>,
    ) {
        let status = Arc::new(LinkStatus::new());
        status.set_state(ConnectionState::Connected);
        let (handle, rx) = LifecycleHandle::channel();
        let watchdog = Watchdog::new(TIMEOUT, Arc::clone(&status), handle);
        let task = tokio::spawn(watchdog.run());
        settle().await;
        (status, rx, task)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_continuous_silence() {
        let (_status, mut rx, task) = spawn_watchdog().await;

        tokio::time::advance(TIMEOUT + Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(
            rx.try_recv().ok(),
            Some(LifecycleRequest::Restart { address: None })
        );

        // No second request within the next window.
        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert!(rx.try_recv().is_err());

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_chunk_postpones_expiry() {
        let (status, mut rx, task) = spawn_watchdog().await;

        // One byte 30 s in restarts the silence clock.
        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;
        status.mark_inbound();

        // 34 s later the original deadline has long passed, but the reset
        // holds it back.
        tokio::time::advance(Duration::from_secs(34)).await;
        settle().await;
        assert!(rx.try_recv().is_err());

        // A full window after the chunk, it fires.
        tokio::time::advance(Duration::from_secs(40)).await;
        settle().await;
        assert_eq!(
            rx.try_recv().ok(),
            Some(LifecycleRequest::Restart { address: None })
        );

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_traffic_never_fires() {
        let (status, mut rx, task) = spawn_watchdog().await;

        for _ in 0..10 {
            tokio::time::advance(Duration::from_secs(20)).await;
            settle().await;
            status.mark_inbound();
        }
        assert!(rx.try_recv().is_err());

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_until_link_is_connected() {
        let status = Arc::new(LinkStatus::new());
        let (handle, mut rx) = LifecycleHandle::channel();
        let watchdog = Watchdog::new(TIMEOUT, Arc::clone(&status), handle);
        let task = tokio::spawn(watchdog.run());
        settle().await;

        // A dial stuck in its retry budget, or a passive transport
        // awaiting a peer, runs far past the window without a restart.
        for _ in 0..10 {
            tokio::time::advance(TIMEOUT + Duration::from_secs(1)).await;
            settle().await;
        }
        assert!(rx.try_recv().is_err());

        // Once the link is up the usual silence window applies. The
        // check cadence is not aligned with the connect, so span two
        // checks to guarantee one sees a full window of silence.
        status.set_state(ConnectionState::Connected);
        status.mark_inbound();
        tokio::time::advance(TIMEOUT * 2).await;
        settle().await;
        assert_eq!(
            rx.try_recv().ok(),
            Some(LifecycleRequest::Restart { address: None })
        );

        task.abort();
    }
}
