//! Connection-cycle orchestrator
//!
//! Single-threaded supervisor for one wallbox link: provisions the
//! transport, spawns the read, drain and watchdog tasks, polls the
//! handshake toward bridge activation and drains lifecycle requests.
//! Restart requests rebuild the cycle in place; fatal and shutdown
//! requests tear everything down and yield the process exit outcome.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use evselink_core::{
    Availability, DeviceInfo, LifecycleHandle, LifecycleReceiver, LifecycleRequest, LinkConfig,
    MqttBridge, SharedDeviceState, Transport, TransportError, Watchdog,
};

// ----------------------------------------------------------------------------
// Factories
// ----------------------------------------------------------------------------

/// Builds the transport for a connection cycle. Client kinds construct a
/// fresh instance (the argument overrides the dial target after a restart
/// carried a replacement address); passive kinds return the same instance
/// every cycle so the bound socket survives restarts.
pub type TransportFactory = Box<dyn Fn(Option<&str>) -> Arc<dyn Transport> + Send + Sync>;

/// Builds the MQTT bridge once the handshake has produced the device
/// identity. Invoked at most once per process; the bridge outlives
/// connection restarts.
pub type BridgeFactory = Box<dyn Fn(&DeviceInfo) -> Arc<dyn MqttBridge> + Send + Sync>;

// ----------------------------------------------------------------------------
// Phase and Outcome
// ----------------------------------------------------------------------------

/// Coarse lifecycle phase, used for logging and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Connecting,
    AwaitingHandshake,
    AwaitingVersion,
    BridgeActive,
    Idle,
    Restarting,
    Terminated,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Starting => "starting",
            Phase::Connecting => "connecting",
            Phase::AwaitingHandshake => "awaiting-handshake",
            Phase::AwaitingVersion => "awaiting-version",
            Phase::BridgeActive => "bridge-active",
            Phase::Idle => "idle",
            Phase::Restarting => "restarting",
            Phase::Terminated => "terminated",
        };
        write!(f, "{name}")
    }
}

/// Process exit outcome produced by [`Orchestrator::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Signal-driven shutdown, exit status zero
    Graceful,
    /// Unrecoverable failure, non-zero exit status
    Fatal(String),
}

impl ExitOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            ExitOutcome::Graceful => 0,
            ExitOutcome::Fatal(_) => 1,
        }
    }
}

/// How a supervised cycle ended
enum CycleEnd {
    Restart,
    Exit(ExitOutcome),
}

// ----------------------------------------------------------------------------
// Orchestrator
// ----------------------------------------------------------------------------

/// Owns the wallbox connection lifecycle from process start to exit
pub struct Orchestrator {
    config: LinkConfig,
    device: SharedDeviceState,
    transport_factory: TransportFactory,
    bridge_factory: Option<BridgeFactory>,

    lifecycle: LifecycleHandle,
    requests: LifecycleReceiver,

    phase: Phase,
    transport: Option<Arc<dyn Transport>>,
    bridge: Option<Arc<dyn MqttBridge>>,
    bridge_activated: bool,
    address_override: Option<String>,

    run_task: Option<JoinHandle<Result<(), TransportError>>>,
    drain_task: Option<JoinHandle<Result<(), TransportError>>>,
    watchdog_task: Option<JoinHandle<()>>,
}

impl Orchestrator {
    /// Create the orchestrator and the lifecycle handle used to route
    /// signals and external requests into it
    pub fn new(
        config: LinkConfig,
        device: SharedDeviceState,
        transport_factory: TransportFactory,
        bridge_factory: Option<BridgeFactory>,
    ) -> (Self, LifecycleHandle) {
        let (lifecycle, requests) = LifecycleHandle::channel();
        let orchestrator = Self {
            config,
            device,
            transport_factory,
            bridge_factory,
            lifecycle: lifecycle.clone(),
            requests,
            phase: Phase::Starting,
            transport: None,
            bridge: None,
            bridge_activated: false,
            address_override: None,
            run_task: None,
            drain_task: None,
            watchdog_task: None,
        };
        (orchestrator, lifecycle)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run connection cycles until a terminal request or a fatal
    /// transport failure
    pub async fn run(mut self) -> ExitOutcome {
        loop {
            self.start_cycle();
            match self.supervise().await {
                CycleEnd::Restart => self.restart().await,
                CycleEnd::Exit(outcome) => {
                    self.terminate(&outcome).await;
                    return outcome;
                }
            }
        }
    }

    /// Provision the transport and spawn the per-cycle tasks
    fn start_cycle(&mut self) {
        self.set_phase(Phase::Connecting);
        let transport = (self.transport_factory)(self.address_override.as_deref());
        info!(kind = %transport.kind(), "starting connection cycle");

        let status = transport.status();

        let reader = Arc::clone(&transport);
        self.run_task = Some(tokio::spawn(async move { reader.run().await }));

        let drainer = Arc::clone(&transport);
        self.drain_task = Some(tokio::spawn(async move { drainer.drain_outbound().await }));

        let watchdog = Watchdog::new(self.config.watchdog_timeout, status, self.lifecycle.clone());
        self.watchdog_task = Some(tokio::spawn(watchdog.run()));

        self.transport = Some(transport);
    }

    /// Supervise the running cycle until it ends
    async fn supervise(&mut self) -> CycleEnd {
        let mut poll = interval(self.config.poll_interval);

        loop {
            tokio::select! {
                request = self.requests.recv() => {
                    let Some(request) = request else {
                        // All handles dropped; nothing can request work anymore.
                        return CycleEnd::Exit(ExitOutcome::Graceful);
                    };
                    if let Some(end) = self.collapse_requests(request) {
                        return end;
                    }
                }

                result = read_loop_result(&mut self.run_task) => {
                    return self.handle_read_loop_end(result);
                }

                _ = poll.tick() => {
                    self.advance_handshake().await;
                }
            }
        }
    }

    /// Drain every pending request and pick the outcome. Terminal
    /// requests win over restarts; stacked restarts collapse into one,
    /// keeping the most recent address override.
    fn collapse_requests(&mut self, first: LifecycleRequest) -> Option<CycleEnd> {
        let mut pending = vec![first];
        while let Ok(request) = self.requests.try_recv() {
            pending.push(request);
        }

        let mut restart_address: Option<Option<String>> = None;
        for request in pending {
            match request {
                LifecycleRequest::Shutdown => {
                    return Some(CycleEnd::Exit(ExitOutcome::Graceful));
                }
                LifecycleRequest::FatalExit { message } => {
                    return Some(CycleEnd::Exit(ExitOutcome::Fatal(message)));
                }
                LifecycleRequest::Restart { address } => {
                    if restart_address.is_some() {
                        debug!("coalescing duplicate restart request");
                    }
                    restart_address = Some(address);
                }
            }
        }

        restart_address.map(|address| {
            if let Some(address) = address {
                info!(address = %address, "restart carries a new target address");
                self.address_override = Some(address);
            }
            CycleEnd::Restart
        })
    }

    fn handle_read_loop_end(
        &mut self,
        result: Result<Result<(), TransportError>, tokio::task::JoinError>,
    ) -> CycleEnd {
        self.run_task = None;
        match result {
            Ok(Err(e)) => {
                error!(error = %e, "transport failed");
                CycleEnd::Exit(ExitOutcome::Fatal(e.to_string()))
            }
            Ok(Ok(())) => {
                CycleEnd::Exit(ExitOutcome::Fatal("read loop stopped unexpectedly".to_string()))
            }
            Err(e) if e.is_cancelled() => CycleEnd::Restart,
            Err(e) => CycleEnd::Exit(ExitOutcome::Fatal(format!("read loop panicked: {e}"))),
        }
    }

    /// Walk the handshake toward bridge activation. Called once per poll
    /// interval; every step is idempotent so a failed broker publish is
    /// simply retried on the next tick.
    async fn advance_handshake(&mut self) {
        // The handshake only runs over a live link.
        let connected = self
            .transport
            .as_ref()
            .map(|t| t.status().is_connected())
            .unwrap_or(false);
        if !connected {
            return;
        }

        let (initialized, needs_fallback, identity_complete) = {
            let state = self.device.read().await;
            (
                state.initialized,
                state.fallback
                    && state.info.software_version.is_none()
                    && state.info.hardware_version.is_some(),
                state.identity_complete(),
            )
        };

        if !initialized {
            self.set_phase(Phase::AwaitingHandshake);
            return;
        }

        if !identity_complete {
            if needs_fallback {
                let mut state = self.device.write().await;
                state.apply_fallback_version();
                info!(
                    version = state.info.software_version.as_deref().unwrap_or(""),
                    "synthesized software version from hardware version"
                );
            } else {
                self.set_phase(Phase::AwaitingVersion);
                return;
            }
        }

        let info = self.device.read().await.info.clone();
        let Some(serial) = info.serial.clone() else {
            self.set_phase(Phase::AwaitingVersion);
            return;
        };

        let bridge = match self.bridge.clone() {
            Some(bridge) => bridge,
            None => {
                let Some(factory) = self.bridge_factory.as_ref() else {
                    // Running without a broker; the handshake is done
                    // and there is nothing to activate.
                    self.set_phase(Phase::Idle);
                    return;
                };
                let bridge = factory(&info);
                self.bridge = Some(Arc::clone(&bridge));
                bridge
            }
        };

        // The bridge outlives restarts; activate it at most once.
        if bridge.is_connected() {
            self.set_phase(Phase::Idle);
            return;
        }

        let payloads = bridge.build_discovery_payloads(&info);
        if let Err(e) = bridge.publish_discovery(payloads).await {
            warn!(error = %e, "discovery publish failed, retrying next poll");
            return;
        }
        let topic = bridge.command_topic(&serial);
        if let Err(e) = bridge.subscribe(&topic).await {
            warn!(error = %e, "command subscription failed");
        }
        if let Err(e) = bridge
            .publish_availability(&serial, Availability::Online)
            .await
        {
            warn!(error = %e, "availability publish failed");
        }

        self.bridge_activated = true;
        self.set_phase(Phase::BridgeActive);
        info!(serial = %serial, "bridge active");
    }

    /// Abort the per-cycle tasks and release the transport. On restart,
    /// passive transports skip teardown so their bound listener/socket
    /// survives into the next cycle; the fresh read loop drops the stale
    /// peer itself.
    async fn stop_cycle(&mut self, release_passive: bool) {
        if let Some(task) = self.run_task.take() {
            task.abort();
            let _ = task.await;
        }
        if let Some(task) = self.drain_task.take() {
            task.abort();
            let _ = task.await;
        }
        if let Some(task) = self.watchdog_task.take() {
            task.abort();
            let _ = task.await;
        }
        if let Some(transport) = self.transport.take() {
            if release_passive || !transport.kind().is_passive() {
                transport.teardown().await;
            }
        }
    }

    /// In-place restart: stop the cycle and reset the handshake state so
    /// the next cycle re-runs discovery deterministically
    async fn restart(&mut self) {
        self.set_phase(Phase::Restarting);
        warn!("restarting connection cycle");
        self.stop_cycle(false).await;
        self.device.write().await.reset_for_restart();
    }

    /// Final teardown on process exit
    async fn terminate(&mut self, outcome: &ExitOutcome) {
        match outcome {
            ExitOutcome::Graceful => info!("shutting down"),
            ExitOutcome::Fatal(message) => error!(reason = %message, "terminating after fatal failure"),
        }

        self.stop_cycle(true).await;

        if let Some(bridge) = self.bridge.take() {
            if self.bridge_activated {
                let serial = self.device.read().await.info.serial.clone();
                if let Some(serial) = serial {
                    if let Err(e) = bridge
                        .publish_availability(&serial, Availability::Offline)
                        .await
                    {
                        debug!(error = %e, "offline availability publish failed");
                    }
                }
            }
            bridge.disconnect().await;
        }

        self.set_phase(Phase::Terminated);
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!(from = %self.phase, to = %phase, "phase transition");
            self.phase = phase;
        }
    }
}

/// Await the read-loop task if present; pends forever otherwise so the
/// supervisor select never sees a spurious completion
async fn read_loop_result(
    task: &mut Option<JoinHandle<Result<(), TransportError>>>,
) -> Result<Result<(), TransportError>, tokio::task::JoinError> {
    match task.as_mut() {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
