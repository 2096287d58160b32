//! Active TCP transport dialing the wallbox

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use evselink_core::{
    outbound_queue, ConnectionState, LinkConfig, LinkStatus, NotificationSink, OutboundQueue,
    OutboundReceiver, Transport, TransportError, TransportKind,
};

// ----------------------------------------------------------------------------
// TCP Client Transport
// ----------------------------------------------------------------------------

/// Dials the wallbox at a fixed `host:port`, retrying up to the configured
/// attempt budget. Exhausting the budget is a fatal connection failure;
/// everything after a successful connect recovers locally.
pub struct TcpClientTransport {
    endpoint: String,
    config: LinkConfig,
    status: Arc<LinkStatus>,
    sink: Arc<dyn NotificationSink>,
    queue: OutboundQueue,
    outbound: Mutex<OutboundReceiver>,
    writer: Mutex<Option<OwnedWriteHalf>>,
}

impl TcpClientTransport {
    pub fn new(endpoint: String, config: LinkConfig, sink: Arc<dyn NotificationSink>) -> Self {
        let (queue, outbound) = outbound_queue(config.outbound_capacity);
        Self {
            endpoint,
            config,
            status: Arc::new(LinkStatus::new()),
            sink,
            queue,
            outbound: Mutex::new(outbound),
            writer: Mutex::new(None),
        }
    }

    /// Dial the endpoint with the configured retry budget. Returns the
    /// read half; the write half is stored for the consumer loop.
    async fn establish(&self) -> Result<OwnedReadHalf, TransportError> {
        self.status.set_state(ConnectionState::Connecting);
        let mut last_error = String::new();

        for attempt in 1..=self.config.connect_attempts {
            info!(endpoint = %self.endpoint, attempt, "connecting");
            match timeout(self.config.connect_timeout, TcpStream::connect(&self.endpoint)).await {
                Ok(Ok(stream)) => {
                    let (reader, writer) = stream.into_split();
                    *self.writer.lock().await = Some(writer);
                    self.status.set_peer(self.endpoint.clone());
                    self.status.mark_inbound();
                    self.status.set_state(ConnectionState::Connected);
                    info!(endpoint = %self.endpoint, "connected");
                    return Ok(reader);
                }
                Ok(Err(e)) => {
                    error!(attempt, error = %e, "connect attempt failed");
                    last_error = e.to_string();
                }
                Err(_) => {
                    error!(attempt, "connect attempt timed out");
                    last_error = "connect timed out".to_string();
                }
            }
            tokio::time::sleep(self.config.retry_backoff).await;
        }

        self.status.set_state(ConnectionState::Disconnected);
        Err(TransportError::RetriesExhausted {
            endpoint: self.endpoint.clone(),
            attempts: self.config.connect_attempts,
            reason: last_error,
        })
    }

    /// Downgrade to DISCONNECTED and drop the peer handle
    async fn drop_link(&self) {
        self.status.set_state(ConnectionState::Disconnected);
        self.status.clear_peer();
        *self.writer.lock().await = None;
    }
}

#[async_trait]
impl Transport for TcpClientTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::TcpClient
    }

    fn status(&self) -> Arc<LinkStatus> {
        Arc::clone(&self.status)
    }

    async fn run(&self) -> Result<(), TransportError> {
        let mut buf = vec![0u8; self.config.read_buffer_size];

        'reconnect: loop {
            let mut reader = self.establish().await?;

            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => {
                        warn!(endpoint = %self.endpoint, "connection closed by device");
                        self.drop_link().await;
                        tokio::time::sleep(self.config.reconnect_pause).await;
                        continue 'reconnect;
                    }
                    Ok(n) => {
                        self.status.mark_inbound();
                        self.sink.notify(&self.endpoint, &buf[..n]).await;
                    }
                    Err(e) => {
                        error!(endpoint = %self.endpoint, error = %e, "read error");
                        self.drop_link().await;
                        tokio::time::sleep(self.config.reconnect_pause).await;
                        continue 'reconnect;
                    }
                }
            }
        }
    }

    async fn drain_outbound(&self) -> Result<(), TransportError> {
        let mut rx = self.outbound.lock().await;

        loop {
            // Idle without dequeuing while the link is down so frames
            // queue up instead of being lost.
            if !self.status.is_connected() {
                tokio::time::sleep(self.config.idle_poll).await;
                continue;
            }

            let Some(frame) = rx.next().await else {
                return Ok(());
            };

            let mut writer = self.writer.lock().await;
            let result = match writer.as_mut() {
                Some(w) => w.write_all(&frame).await,
                None => Err(std::io::Error::from(std::io::ErrorKind::NotConnected)),
            };
            drop(writer);

            match result {
                Ok(()) => debug!(len = frame.len(), "wrote frame"),
                Err(e) => {
                    error!(error = %e, "write failed, marking link down");
                    rx.retain(frame);
                    self.drop_link().await;
                }
            }
        }
    }

    async fn enqueue_outbound(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.queue.push(frame).await
    }

    async fn teardown(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.status.set_state(ConnectionState::Disconnected);
        self.status.clear_peer();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
