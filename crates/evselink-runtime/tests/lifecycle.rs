//! End-to-end lifecycle tests with scripted transports and a mock bridge
//!
//! Exercises the orchestrator against the full contract: fatal exit on
//! connect-retry exhaustion, watchdog-driven restart with handshake
//! reset, graceful shutdown, restart address override, and one-shot
//! bridge activation once the handshake completes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use evselink_core::{
    Availability, BridgeError, CommandHandler, ConnectionState, DeviceInfo, DeviceState,
    DiscoveryPayload, LinkConfig, LinkStatus, MqttBridge, Transport, TransportError,
    TransportKind,
};
use evselink_runtime::{BridgeFactory, ExitOutcome, Orchestrator, TransportFactory};

// ----------------------------------------------------------------------------
// Scripted Transport
// ----------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum Script {
    /// Establish fails with an exhausted retry budget
    FailEstablish,
    /// Spends the full retry budget dialing a blackholed endpoint
    /// before failing, every attempt running into its timeout
    SlowFailEstablish,
    /// Connects, delivers one inbound mark, then stays silent
    ConnectThenSilence,
    /// Connects and keeps marking inbound traffic every second
    ConnectAndStream,
}

struct ScriptedTransport {
    script: Script,
    status: Arc<LinkStatus>,
}

impl ScriptedTransport {
    fn new(script: Script) -> Self {
        Self {
            script,
            status: Arc::new(LinkStatus::new()),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::TcpClient
    }

    fn status(&self) -> Arc<LinkStatus> {
        Arc::clone(&self.status)
    }

    async fn run(&self) -> Result<(), TransportError> {
        match self.script {
            Script::FailEstablish => Err(TransportError::RetriesExhausted {
                endpoint: "192.168.1.40:8080".to_string(),
                attempts: 5,
                reason: "connection refused".to_string(),
            }),
            Script::SlowFailEstablish => {
                self.status.set_state(ConnectionState::Connecting);
                // 5 attempts x 15 s timeout plus 2 s backoff each.
                tokio::time::sleep(Duration::from_secs(85)).await;
                self.status.set_state(ConnectionState::Disconnected);
                Err(TransportError::RetriesExhausted {
                    endpoint: "192.168.1.40:8080".to_string(),
                    attempts: 5,
                    reason: "connect timed out".to_string(),
                })
            }
            Script::ConnectThenSilence => {
                self.status.set_state(ConnectionState::Connected);
                self.status.mark_inbound();
                std::future::pending().await
            }
            Script::ConnectAndStream => {
                self.status.set_state(ConnectionState::Connected);
                loop {
                    self.status.mark_inbound();
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn drain_outbound(&self) -> Result<(), TransportError> {
        std::future::pending().await
    }

    async fn enqueue_outbound(&self, _frame: Vec<u8>) -> Result<(), TransportError> {
        Ok(())
    }

    async fn teardown(&self) {
        self.status.set_state(ConnectionState::Disconnected);
        self.status.clear_peer();
    }
}

/// Factory that records every provisioning call and its address override
struct FactoryLog {
    calls: Mutex<Vec<Option<String>>>,
}

impl FactoryLog {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn last_override(&self) -> Option<String> {
        self.calls.lock().unwrap().last().cloned().flatten()
    }
}

fn scripted_factory(script: Script, log: Arc<FactoryLog>) -> TransportFactory {
    Box::new(move |address| {
        log.calls
            .lock()
            .unwrap()
            .push(address.map(str::to_string));
        Arc::new(ScriptedTransport::new(script))
    })
}

// ----------------------------------------------------------------------------
// Mock Bridge
// ----------------------------------------------------------------------------

#[derive(Default)]
struct MockBridge {
    connected: AtomicBool,
    discovery: Mutex<Vec<DiscoveryPayload>>,
    subscriptions: Mutex<Vec<String>>,
    availability: Mutex<Vec<String>>,
}

#[async_trait]
impl MqttBridge for MockBridge {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn build_discovery_payloads(&self, info: &DeviceInfo) -> Vec<DiscoveryPayload> {
        let serial = info.serial.clone().unwrap_or_default();
        vec![DiscoveryPayload {
            topic: format!("evselink/{serial}/config"),
            payload: "{}".to_string(),
        }]
    }

    async fn publish_discovery(&self, payloads: Vec<DiscoveryPayload>) -> Result<(), BridgeError> {
        self.discovery.lock().unwrap().extend(payloads);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn command_topic(&self, serial: &str) -> String {
        format!("evselink/{serial}/command")
    }

    async fn subscribe(&self, topic: &str) -> Result<(), BridgeError> {
        self.subscriptions.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    fn set_command_handler(&self, _handler: Arc<dyn CommandHandler>) {}

    async fn publish_availability(
        &self,
        _serial: &str,
        availability: Availability,
    ) -> Result<(), BridgeError> {
        self.availability
            .lock()
            .unwrap()
            .push(availability.as_str().to_string());
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

fn mock_bridge_factory(bridge: Arc<MockBridge>) -> BridgeFactory {
    Box::new(move |_info| Arc::clone(&bridge) as Arc<dyn MqttBridge>)
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

/// Poll a condition until it holds or the test deadline passes
async fn wait_for<F: Fn() -> bool>(condition: F) {
    timeout(Duration::from_secs(120), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ----------------------------------------------------------------------------
// Scenarios
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_connect_retry_exhaustion_is_fatal() {
    let log = FactoryLog::new();
    let (orchestrator, _lifecycle) = Orchestrator::new(
        LinkConfig::default(),
        DeviceState::shared(),
        scripted_factory(Script::FailEstablish, Arc::clone(&log)),
        None,
    );

    let outcome = timeout(Duration::from_secs(60), orchestrator.run())
        .await
        .expect("orchestrator did not exit");

    assert_eq!(outcome.exit_code(), 1);
    match outcome {
        ExitOutcome::Fatal(message) => {
            assert!(message.contains("5 attempts"), "got: {message}");
        }
        ExitOutcome::Graceful => panic!("expected a fatal exit"),
    }
    assert_eq!(log.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_retry_budget_is_not_preempted_by_watchdog() {
    let log = FactoryLog::new();
    let (orchestrator, _lifecycle) = Orchestrator::new(
        LinkConfig::default(),
        DeviceState::shared(),
        scripted_factory(Script::SlowFailEstablish, Arc::clone(&log)),
        None,
    );

    // The dial outlives the watchdog window by far; the cycle still
    // ends in the transport's own fatal failure, on the first and only
    // transport instance, instead of looping through restarts.
    let outcome = timeout(Duration::from_secs(600), orchestrator.run())
        .await
        .expect("orchestrator did not exit");

    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(log.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_silence_restarts_and_resets_handshake() {
    let log = FactoryLog::new();
    let device = DeviceState::shared();
    {
        let mut state = device.write().await;
        state.initialized = true;
        state.logged_in = true;
        state.info.serial = Some("EVSE12345".to_string());
    }

    let (orchestrator, lifecycle) = Orchestrator::new(
        LinkConfig::default(),
        Arc::clone(&device),
        scripted_factory(Script::ConnectThenSilence, Arc::clone(&log)),
        None,
    );
    let runner = tokio::spawn(orchestrator.run());

    // 35 s of silence fires the watchdog; a second cycle gets provisioned.
    let probe = Arc::clone(&log);
    wait_for(move || probe.count() >= 2).await;

    // The restart reset the session flags but kept the identity.
    {
        let state = device.read().await;
        assert!(!state.initialized);
        assert!(!state.logged_in);
        assert_eq!(state.info.serial.as_deref(), Some("EVSE12345"));
    }

    lifecycle.shutdown();
    let outcome = timeout(Duration::from_secs(60), runner)
        .await
        .expect("orchestrator did not exit")
        .expect("orchestrator panicked");
    assert_eq!(outcome, ExitOutcome::Graceful);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_request_exits_zero() {
    let log = FactoryLog::new();
    let (orchestrator, lifecycle) = Orchestrator::new(
        LinkConfig::default(),
        DeviceState::shared(),
        scripted_factory(Script::ConnectAndStream, Arc::clone(&log)),
        None,
    );
    let runner = tokio::spawn(orchestrator.run());

    lifecycle.shutdown();

    let outcome = timeout(Duration::from_secs(60), runner)
        .await
        .expect("orchestrator did not exit")
        .expect("orchestrator panicked");
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(log.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_restart_address_override_reaches_factory() {
    let log = FactoryLog::new();
    let (orchestrator, lifecycle) = Orchestrator::new(
        LinkConfig::default(),
        DeviceState::shared(),
        scripted_factory(Script::ConnectAndStream, Arc::clone(&log)),
        None,
    );
    let runner = tokio::spawn(orchestrator.run());

    let probe = Arc::clone(&log);
    wait_for(move || probe.count() >= 1).await;
    lifecycle.restart(Some("10.0.0.9:3333".to_string()));

    let probe = Arc::clone(&log);
    wait_for(move || probe.count() >= 2).await;
    assert_eq!(log.last_override().as_deref(), Some("10.0.0.9:3333"));

    lifecycle.shutdown();
    let _ = timeout(Duration::from_secs(60), runner).await;
}

#[tokio::test(start_paused = true)]
async fn test_bridge_activates_once_identity_complete() {
    let bridge = Arc::new(MockBridge::default());
    let log = FactoryLog::new();
    let device = DeviceState::shared();
    {
        let mut state = device.write().await;
        state.initialized = true;
        state.logged_in = true;
        state.info.serial = Some("SN1".to_string());
        state.info.hardware_version = Some("1.3".to_string());
        state.info.software_version = Some("2.7.1".to_string());
    }

    let (orchestrator, lifecycle) = Orchestrator::new(
        LinkConfig::default(),
        device,
        scripted_factory(Script::ConnectAndStream, Arc::clone(&log)),
        Some(mock_bridge_factory(Arc::clone(&bridge))),
    );
    let runner = tokio::spawn(orchestrator.run());

    let probe = Arc::clone(&bridge);
    wait_for(move || probe.is_connected()).await;

    assert_eq!(bridge.discovery.lock().unwrap().len(), 1);
    assert_eq!(
        bridge.subscriptions.lock().unwrap().as_slice(),
        ["evselink/SN1/command"]
    );
    assert_eq!(
        bridge.availability.lock().unwrap().as_slice(),
        ["online"]
    );

    lifecycle.shutdown();
    let outcome = timeout(Duration::from_secs(60), runner)
        .await
        .expect("orchestrator did not exit")
        .expect("orchestrator panicked");
    assert_eq!(outcome, ExitOutcome::Graceful);

    // Termination announces the device offline exactly once.
    assert_eq!(
        bridge.availability.lock().unwrap().as_slice(),
        ["online", "offline"]
    );
    assert_eq!(bridge.discovery.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_synthesizes_software_version() {
    let bridge = Arc::new(MockBridge::default());
    let log = FactoryLog::new();
    let device = DeviceState::shared();
    {
        let mut state = device.write().await;
        state.initialized = true;
        state.fallback = true;
        state.info.serial = Some("SN2".to_string());
        state.info.hardware_version = Some("1.1".to_string());
    }

    let (orchestrator, lifecycle) = Orchestrator::new(
        LinkConfig::default(),
        Arc::clone(&device),
        scripted_factory(Script::ConnectAndStream, Arc::clone(&log)),
        Some(mock_bridge_factory(Arc::clone(&bridge))),
    );
    let runner = tokio::spawn(orchestrator.run());

    let probe = Arc::clone(&bridge);
    wait_for(move || probe.is_connected()).await;

    // Identity was completed from the hardware version.
    assert_eq!(
        device.read().await.info.software_version.as_deref(),
        Some("1.1")
    );

    lifecycle.shutdown();
    let _ = timeout(Duration::from_secs(60), runner).await;
}
