//! rumqttc-backed implementation of the bridge hook

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, LastWill, MqttOptions, Packet, QoS};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use evselink_core::{
    Availability, BridgeError, CommandHandler, DeviceInfo, DiscoveryPayload, MqttBridge,
};

use crate::settings::MqttSettings;
use crate::topics;

type HandlerSlot = Arc<RwLock<Option<Arc<dyn CommandHandler>>>>;

// ----------------------------------------------------------------------------
// Bridge
// ----------------------------------------------------------------------------

/// MQTT bridge backed by a rumqttc client and a spawned event-loop task.
///
/// The broker link is opened once at process start and survives wallbox
/// restarts; the `connected` flag tracks whether discovery has been
/// published for the current device so the orchestrator activates the
/// bridge at most once per connection cycle.
pub struct RumqttBridge {
    client: AsyncClient,
    serial: String,
    connected: AtomicBool,
    handler: HandlerSlot,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl RumqttBridge {
    /// Open the broker connection and start the event-loop task. The
    /// last will marks the device offline if the process dies without a
    /// clean shutdown.
    pub fn connect(settings: &MqttSettings, serial: &str) -> Self {
        let client_id = format!("evselink-{serial}");
        let mut options = MqttOptions::new(client_id, &settings.host, settings.port);
        options.set_keep_alive(settings.keep_alive());
        options.set_last_will(LastWill::new(
            topics::availability_topic(serial),
            Availability::Offline.as_str(),
            QoS::AtLeastOnce,
            true,
        ));
        if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
            options.set_credentials(user, pass);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 10);
        let handler: HandlerSlot = Arc::new(RwLock::new(None));

        let task_handler = Arc::clone(&handler);
        let broker = format!("{}:{}", settings.host, settings.port);
        let event_task = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!(broker = %broker, "MQTT broker connected");
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let handler = {
                            let guard = task_handler
                                .read()
                                .unwrap_or_else(|e| e.into_inner());
                            guard.clone()
                        };
                        match handler {
                            Some(handler) => {
                                handler.dispatch(&publish.topic, &publish.payload).await;
                            }
                            None => {
                                debug!(topic = %publish.topic, "no command handler registered, dropping message");
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(broker = %broker, error = %e, "MQTT event loop error, retrying");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self {
            client,
            serial: serial.to_string(),
            connected: AtomicBool::new(false),
            handler,
            event_task: Mutex::new(Some(event_task)),
        }
    }

    /// Publish decoded wallbox state, called by the protocol decoder
    pub async fn publish_state(&self, payload: &serde_json::Value) -> Result<(), BridgeError> {
        if !self.is_connected() {
            return Err(BridgeError::NotConnected);
        }
        self.client
            .publish(
                topics::state_topic(&self.serial),
                QoS::AtLeastOnce,
                false,
                payload.to_string(),
            )
            .await
            .map_err(|e| BridgeError::Client(e.to_string()))
    }
}

/// Minimal retained device description built from the handshake identity.
/// Empty until the serial is known; the orchestrator only activates the
/// bridge after the handshake completes.
pub(crate) fn discovery_payloads(info: &DeviceInfo) -> Vec<DiscoveryPayload> {
    let Some(serial) = info.serial.as_deref() else {
        return Vec::new();
    };
    let payload = serde_json::json!({
        "serial": serial,
        "hardware_version": info.hardware_version,
        "software_version": info.software_version,
        "availability_topic": topics::availability_topic(serial),
        "command_topic": topics::command_topic(serial),
        "state_topic": topics::state_topic(serial),
    });
    vec![DiscoveryPayload {
        topic: topics::discovery_topic(serial),
        payload: payload.to_string(),
    }]
}

#[async_trait]
impl MqttBridge for RumqttBridge {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn build_discovery_payloads(&self, info: &DeviceInfo) -> Vec<DiscoveryPayload> {
        discovery_payloads(info)
    }

    async fn publish_discovery(&self, payloads: Vec<DiscoveryPayload>) -> Result<(), BridgeError> {
        for DiscoveryPayload { topic, payload } in payloads {
            self.client
                .publish(topic.clone(), QoS::AtLeastOnce, true, payload)
                .await
                .map_err(|e| BridgeError::Client(e.to_string()))?;
            debug!(topic = %topic, "published discovery message");
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn command_topic(&self, serial: &str) -> String {
        topics::command_topic(serial)
    }

    async fn subscribe(&self, topic: &str) -> Result<(), BridgeError> {
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| BridgeError::Client(e.to_string()))?;
        info!(topic = %topic, "subscribed to command topic");
        Ok(())
    }

    fn set_command_handler(&self, handler: Arc<dyn CommandHandler>) {
        let mut guard = self.handler.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(handler);
    }

    async fn publish_availability(
        &self,
        serial: &str,
        availability: Availability,
    ) -> Result<(), BridgeError> {
        self.client
            .publish(
                topics::availability_topic(serial),
                QoS::AtLeastOnce,
                true,
                availability.as_str(),
            )
            .await
            .map_err(|e| BridgeError::Client(e.to_string()))?;
        info!(serial = %serial, availability = availability.as_str(), "published availability");
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "MQTT disconnect failed");
        }
        let task = {
            let mut guard = self.event_task.lock().unwrap_or_else(|e| e.into_inner());
            guard.take()
        };
        if let Some(task) = task {
            task.abort();
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
