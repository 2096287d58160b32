//! Passive TCP transport awaiting a connection from the wallbox

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use evselink_core::{
    outbound_queue, ConnectionState, LinkConfig, LinkStatus, NotificationSink, OutboundQueue,
    OutboundReceiver, Transport, TransportError, TransportKind,
};

/// Cadence of the "still waiting" notice while no peer has connected
const WAITING_NOTICE_INTERVAL: Duration = Duration::from_secs(30);

// ----------------------------------------------------------------------------
// TCP Server Transport
// ----------------------------------------------------------------------------

/// Listens on a fixed port and treats the first inbound connection as the
/// device. Awaiting a peer never exhausts a retry budget. Exactly one
/// peer is tracked: while a peer is live no further connection is
/// accepted, so a live peer is never pre-empted; replacements happen only
/// after the link dropped. The listener survives restart cycles.
pub struct TcpServerTransport {
    listen_port: u16,
    config: LinkConfig,
    status: Arc<LinkStatus>,
    sink: Arc<dyn NotificationSink>,
    queue: OutboundQueue,
    outbound: Mutex<OutboundReceiver>,
    listener: Mutex<Option<TcpListener>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
}

impl TcpServerTransport {
    pub fn new(listen_port: u16, config: LinkConfig, sink: Arc<dyn NotificationSink>) -> Self {
        let (queue, outbound) = outbound_queue(config.outbound_capacity);
        Self {
            listen_port,
            config,
            status: Arc::new(LinkStatus::new()),
            sink,
            queue,
            outbound: Mutex::new(outbound),
            listener: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    /// Address the listener is bound to, once it is
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.listener
            .lock()
            .await
            .as_ref()
            .and_then(|l| l.local_addr().ok())
    }

    /// Block until the wallbox connects. Binds the listener on first use
    /// and keeps it across disconnect and restart cycles.
    async fn await_peer(&self) -> Result<(OwnedReadHalf, String), TransportError> {
        self.status.set_state(ConnectionState::Connecting);

        let mut guard = self.listener.lock().await;
        if guard.is_none() {
            let listener = TcpListener::bind(("0.0.0.0", self.listen_port)).await?;
            info!(port = self.listen_port, "listening for wallbox connection");
            *guard = Some(listener);
        }
        let listener = guard.as_ref().ok_or(TransportError::NotConnected)?;

        let mut waiting = tokio::time::interval(WAITING_NOTICE_INTERVAL);
        waiting.tick().await; // first tick completes immediately

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let label = addr.to_string();
                        let (reader, writer) = stream.into_split();
                        *self.writer.lock().await = Some(writer);
                        self.status.set_peer(label.clone());
                        self.status.mark_inbound();
                        self.status.set_state(ConnectionState::Connected);
                        info!(peer = %label, "wallbox connected");
                        return Ok((reader, label));
                    }
                    Err(e) => {
                        error!(error = %e, "accept failed");
                        tokio::time::sleep(self.config.reconnect_pause).await;
                    }
                },
                _ = waiting.tick() => {
                    info!(port = self.listen_port, "waiting for wallbox to connect ...");
                }
            }
        }
    }

    async fn drop_link(&self) {
        self.status.set_state(ConnectionState::Disconnected);
        self.status.clear_peer();
        *self.writer.lock().await = None;
    }
}

#[async_trait]
impl Transport for TcpServerTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::TcpServer
    }

    fn status(&self) -> Arc<LinkStatus> {
        Arc::clone(&self.status)
    }

    async fn run(&self) -> Result<(), TransportError> {
        let mut buf = vec![0u8; self.config.read_buffer_size];

        // A fresh cycle starts without a peer; rediscovery fixes a new one.
        self.drop_link().await;

        loop {
            let (mut reader, label) = self.await_peer().await?;

            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => {
                        warn!(peer = %label, "connection closed by device");
                        self.drop_link().await;
                        break;
                    }
                    Ok(n) => {
                        self.status.mark_inbound();
                        self.sink.notify(&label, &buf[..n]).await;
                    }
                    Err(e) => {
                        error!(peer = %label, error = %e, "read error");
                        self.drop_link().await;
                        break;
                    }
                }
            }
        }
    }

    async fn drain_outbound(&self) -> Result<(), TransportError> {
        let mut rx = self.outbound.lock().await;

        loop {
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
        // Dropping the listener closes the socket.
        *self.listener.lock().await = None;
        self.status.set_state(ConnectionState::Disconnected);
        self.status.clear_peer();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
