//! BLE client transport implementation

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, ValueNotification,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::{Stream, StreamExt};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use evselink_core::{
    outbound_queue, ConnectionState, LinkConfig, LinkStatus, NotificationSink, OutboundQueue,
    OutboundReceiver, Transport, TransportError, TransportKind,
};

use crate::config::BleConfig;
use crate::protocol::{
    EVSE_NOTIFY_CHARACTERISTIC_UUID, EVSE_SERVICE_UUID, EVSE_WRITE_CHARACTERISTIC_UUID,
};

type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

// ----------------------------------------------------------------------------
// BLE Transport
// ----------------------------------------------------------------------------

/// Dials the wallbox identified by its BLE MAC address. The GATT
/// notification stream is the inbound read path; outbound frames are
/// chunked characteristic writes. Retry budget and timeouts come from the
/// shared `LinkConfig`, identical to the network client transport.
pub struct BleTransport {
    address: String,
    config: LinkConfig,
    ble_config: BleConfig,
    status: Arc<LinkStatus>,
    sink: Arc<dyn NotificationSink>,
    queue: OutboundQueue,
    outbound: Mutex<OutboundReceiver>,
    adapter: Mutex<Option<Adapter>>,
    peer: Mutex<Option<(Peripheral, Characteristic)>>,
}

impl BleTransport {
    pub fn new(
        address: String,
        config: LinkConfig,
        ble_config: BleConfig,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let (queue, outbound) = outbound_queue(config.outbound_capacity);
        Self {
            address,
            config,
            ble_config,
            status: Arc::new(LinkStatus::new()),
            sink,
            queue,
            outbound: Mutex::new(outbound),
            adapter: Mutex::new(None),
            peer: Mutex::new(None),
        }
    }

    /// First available adapter, created once and reused
    async fn adapter(&self) -> Result<Adapter, TransportError> {
        let mut guard = self.adapter.lock().await;
        if let Some(adapter) = guard.as_ref() {
            return Ok(adapter.clone());
        }
        let manager = Manager::new()
            .await
            .map_err(|e| TransportError::Adapter(format!("failed to create BLE manager: {e}")))?;
        let adapters = manager
            .adapters()
            .await
            .map_err(|e| TransportError::Adapter(format!("failed to list BLE adapters: {e}")))?;
        let adapter = adapters
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Adapter("no BLE adapter available".to_string()))?;
        info!("BLE adapter initialized");
        *guard = Some(adapter.clone());
        Ok(adapter)
    }

    /// Scan for the configured MAC address
    async fn locate_peripheral(&self, adapter: &Adapter) -> Result<Option<Peripheral>, TransportError> {
        adapter
            .start_scan(ScanFilter {
                services: vec![EVSE_SERVICE_UUID],
            })
            .await
            .map_err(|e| TransportError::Adapter(format!("failed to start scan: {e}")))?;
        tokio::time::sleep(self.ble_config.scan_timeout).await;
        let _ = adapter.stop_scan().await;

        let peripherals = adapter
            .peripherals()
            .await
            .map_err(|e| TransportError::Adapter(format!("failed to list peripherals: {e}")))?;
        Ok(peripherals
            .into_iter()
            .find(|p| p.address().to_string().eq_ignore_ascii_case(&self.address)))
    }

    /// One bounded connect attempt: scan, connect, discover the serial
    /// service, subscribe to notifications
    async fn attempt_connect(&self, adapter: &Adapter) -> Result<NotificationStream, TransportError> {
        let peripheral = self
            .locate_peripheral(adapter)
            .await?
            .ok_or_else(|| TransportError::Adapter(format!("device {} not found", self.address)))?;

        timeout(self.config.connect_timeout, peripheral.connect())
            .await
            .map_err(|_| TransportError::Adapter("connect timed out".to_string()))?
            .map_err(|e| TransportError::Adapter(format!("connect failed: {e}")))?;

        peripheral
            .discover_services()
            .await
            .map_err(|e| TransportError::Adapter(format!("service discovery failed: {e}")))?;

        let characteristics = peripheral.characteristics();
        let notify_char = characteristics
            .iter()
            .find(|c| c.uuid == EVSE_NOTIFY_CHARACTERISTIC_UUID)
            .cloned()
            .ok_or_else(|| {
                TransportError::Adapter("notify characteristic not found".to_string())
            })?;
        let write_char = characteristics
            .iter()
            .find(|c| c.uuid == EVSE_WRITE_CHARACTERISTIC_UUID)
            .cloned()
            .ok_or_else(|| TransportError::Adapter("write characteristic not found".to_string()))?;

        peripheral
            .subscribe(&notify_char)
            .await
            .map_err(|e| TransportError::Adapter(format!("subscribe failed: {e}")))?;
        let stream = peripheral
            .notifications()
            .await
            .map_err(|e| TransportError::Adapter(format!("notification stream failed: {e}")))?;

        *self.peer.lock().await = Some((peripheral, write_char));
        Ok(stream)
    }

    /// Connect with the configured retry budget
    async fn establish(&self) -> Result<NotificationStream, TransportError> {
        self.status.set_state(ConnectionState::Connecting);
        let adapter = self.adapter().await?;
        let mut last_error = String::new();

        for attempt in 1..=self.config.connect_attempts {
            info!(address = %self.address, attempt, "connecting");
            match self.attempt_connect(&adapter).await {
                Ok(stream) => {
                    self.status.set_peer(self.address.clone());
                    self.status.mark_inbound();
                    self.status.set_state(ConnectionState::Connected);
                    info!(address = %self.address, "connected");
                    return Ok(stream);
                }
                Err(e) => {
                    error!(attempt, error = %e, "connect attempt failed");
                    last_error = e.to_string();
                }
            }
            tokio::time::sleep(self.config.retry_backoff).await;
        }

        self.status.set_state(ConnectionState::Disconnected);
        Err(TransportError::RetriesExhausted {
            endpoint: self.address.clone(),
            attempts: self.config.connect_attempts,
            reason: last_error,
        })
    }

    async fn drop_link(&self) {
        self.status.set_state(ConnectionState::Disconnected);
        self.status.clear_peer();
        if let Some((peripheral, _)) = self.peer.lock().await.take() {
            let _ = peripheral.disconnect().await;
        }
    }
}

#[async_trait]
impl Transport for BleTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Ble
    }

    fn status(&self) -> Arc<LinkStatus> {
        Arc::clone(&self.status)
    }

    async fn run(&self) -> Result<(), TransportError> {
        loop {
            let mut stream = self.establish().await?;

            while let Some(notification) = stream.next().await {
                if notification.uuid != EVSE_NOTIFY_CHARACTERISTIC_UUID {
                    continue;
                }
                self.status.mark_inbound();
                self.sink.notify(&self.address, &notification.value).await;
            }

            warn!(address = %self.address, "notification stream ended, reconnecting");
            self.drop_link().await;
            tokio::time::sleep(self.config.reconnect_pause).await;
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

            let peer = self.peer.lock().await;
            let result = match peer.as_ref() {
                Some((peripheral, write_char)) => {
                    let mut outcome = Ok(());
                    for chunk in frame.chunks(self.ble_config.max_write_size) {
                        if let Err(e) = peripheral
                            .write(write_char, chunk, WriteType::WithoutResponse)
                            .await
                        {
                            outcome = Err(e);
                            break;
                        }
                    }
                    outcome
                }
                None => Err(btleplug::Error::NotConnected),
            };
            drop(peer);

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
        self.drop_link().await;
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
