//! UDP broadcast transport discovering the wallbox passively

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use evselink_core::{
    outbound_queue, ConnectionState, LinkConfig, LinkStatus, NotificationSink, OutboundQueue,
    OutboundReceiver, Transport, TransportError, TransportKind,
};

/// Cadence of the "still waiting" notice while no peer has been discovered
const WAITING_NOTICE_INTERVAL: Duration = Duration::from_secs(30);

// ----------------------------------------------------------------------------
// UDP Broadcast Transport
// ----------------------------------------------------------------------------

/// Binds a broadcast-enabled datagram socket and waits for the wallbox to
/// announce itself. The first inbound datagram fixes the peer address;
/// datagrams from any other source are dropped while the peer is live and
/// the address stays frozen until a full disconnect cycle. The socket
/// survives restart cycles.
pub struct UdpBroadcastTransport {
    listen_port: u16,
    config: LinkConfig,
    status: Arc<LinkStatus>,
    sink: Arc<dyn NotificationSink>,
    queue: OutboundQueue,
    outbound: Mutex<OutboundReceiver>,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    peer_addr: Mutex<Option<SocketAddr>>,
}

impl UdpBroadcastTransport {
    pub fn new(listen_port: u16, config: LinkConfig, sink: Arc<dyn NotificationSink>) -> Self {
        let (queue, outbound) = outbound_queue(config.outbound_capacity);
        Self {
            listen_port,
            config,
            status: Arc::new(LinkStatus::new()),
            sink,
            queue,
            outbound: Mutex::new(outbound),
            socket: Mutex::new(None),
            peer_addr: Mutex::new(None),
        }
    }

    /// Address the socket is bound to, once it is
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.socket
            .lock()
            .await
            .as_ref()
            .and_then(|s| s.local_addr().ok())
    }

    /// Bind the socket on first use and keep it across cycles
    async fn ensure_socket(&self) -> Result<Arc<UdpSocket>, TransportError> {
        let mut guard = self.socket.lock().await;
        if let Some(socket) = guard.as_ref() {
            return Ok(Arc::clone(socket));
        }
        let socket = UdpSocket::bind(("0.0.0.0", self.listen_port)).await?;
        socket.set_broadcast(true)?;
        info!(port = self.listen_port, "listening for wallbox broadcast");
        let socket = Arc::new(socket);
        *guard = Some(Arc::clone(&socket));
        Ok(socket)
    }

    async fn drop_link(&self) {
        self.status.set_state(ConnectionState::Disconnected);
        self.status.clear_peer();
        *self.peer_addr.lock().await = None;
    }
}

#[async_trait]
impl Transport for UdpBroadcastTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Udp
    }

    fn status(&self) -> Arc<LinkStatus> {
        Arc::clone(&self.status)
    }

    async fn run(&self) -> Result<(), TransportError> {
        let socket = self.ensure_socket().await?;
        let mut buf = vec![0u8; self.config.read_buffer_size];

        // A fresh cycle rediscovers the peer from scratch.
        self.drop_link().await;
        self.status.set_state(ConnectionState::Connecting);

        let mut waiting = tokio::time::interval(WAITING_NOTICE_INTERVAL);
        waiting.tick().await;

        loop {
            tokio::select! {
                received = socket.recv_from(&mut buf) => match received {
                    Ok((0, addr)) => {
                        if self.peer_addr.lock().await.as_ref() == Some(&addr) {
                            warn!(peer = %addr, "empty datagram from device, dropping link");
                            self.drop_link().await;
                            self.status.set_state(ConnectionState::Connecting);
                        }
                    }
                    Ok((n, addr)) => {
                        if !self.status.is_connected() {
                            // First inbound data fixes the active peer.
                            *self.peer_addr.lock().await = Some(addr);
                            self.status.set_peer(addr.to_string());
                            self.status.set_state(ConnectionState::Connected);
                            info!(peer = %addr, "wallbox discovered via broadcast");
                        } else if self.peer_addr.lock().await.as_ref() != Some(&addr) {
                            // The active peer is frozen until a full
                            // disconnect cycle.
                            debug!(source = %addr, "datagram from non-active source dropped");
                            continue;
                        }
                        self.status.mark_inbound();
                        self.sink.notify(&addr.to_string(), &buf[..n]).await;
                    }
                    Err(e) => {
                        error!(error = %e, "recv error");
                        self.drop_link().await;
                        self.status.set_state(ConnectionState::Connecting);
                        tokio::time::sleep(self.config.reconnect_pause).await;
                    }
                },
                _ = waiting.tick() => {
                    if !self.status.is_connected() {
                        info!(port = self.listen_port, "waiting for wallbox broadcast ...");
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

            let socket = self.socket.lock().await.as_ref().map(Arc::clone);
            let peer = *self.peer_addr.lock().await;
            let result = match (socket, peer) {
                (Some(socket), Some(peer)) => socket.send_to(&frame, peer).await.map(|_| ()),
                _ => Err(std::io::Error::from(std::io::ErrorKind::NotConnected)),
            };

            match result {
                Ok(()) => debug!(len = frame.len(), "sent datagram"),
                Err(e) => {
                    error!(error = %e, "send failed, marking link down");
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
        *self.socket.lock().await = None;
        self.drop_link().await;
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
