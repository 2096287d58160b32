//! evselink - EVSE wallbox to MQTT gateway

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use evselink_ble::BleTransport;
use evselink_cli::{
    cli::{Cli, TransportArg},
    config::AppConfig,
    error::Result,
    sink::{LoggingCommandHandler, LoggingSink},
};
use evselink_core::{
    DeviceState, LifecycleHandle, MqttBridge, NotificationSink, Transport,
};
use evselink_mqtt::{MqttSettings, RumqttBridge};
use evselink_net::{TcpClientTransport, TcpServerTransport, UdpBroadcastTransport};
use evselink_runtime::{BridgeFactory, Orchestrator, TransportFactory};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let outcome = match run(cli).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("startup failed: {e}");
            std::process::exit(1);
        }
    };

    std::process::exit(outcome.exit_code());
}

async fn run(cli: Cli) -> Result<evselink_runtime::ExitOutcome> {
    let config = load_configuration(&cli)?.apply_cli(&cli);
    config.validate()?;

    let endpoint = cli.endpoint()?;
    let sink: Arc<dyn NotificationSink> = Arc::new(LoggingSink);

    let device = DeviceState::shared();
    device.write().await.energy_unit = cli.unit.as_str().to_string();

    let transport_factory = build_transport_factory(&cli, &config, endpoint, sink);
    let bridge_factory = if cli.no_mqtt {
        None
    } else {
        Some(build_bridge_factory(config.mqtt.clone()))
    };

    let (orchestrator, lifecycle) = Orchestrator::new(
        config.link.clone(),
        device,
        transport_factory,
        bridge_factory,
    );

    tokio::spawn(route_signals(lifecycle));

    info!(transport = %cli.transport.kind(), "evselink gateway starting");
    Ok(orchestrator.run().await)
}

/// Build the per-cycle transport factory. Client transports are
/// reconstructed every cycle, honoring a restart's address override;
/// passive transports are created once so the bound socket survives
/// restarts.
fn build_transport_factory(
    cli: &Cli,
    config: &AppConfig,
    endpoint: String,
    sink: Arc<dyn NotificationSink>,
) -> TransportFactory {
    let link = config.link.clone();
    match cli.transport {
        TransportArg::Ble => {
            let ble = config.ble.clone();
            Box::new(move |address| {
                let target = address.unwrap_or(&endpoint).to_string();
                Arc::new(BleTransport::new(
                    target,
                    link.clone(),
                    ble.clone(),
                    Arc::clone(&sink),
                )) as Arc<dyn Transport>
            })
        }
        TransportArg::TcpClient => Box::new(move |address| {
            let target = address.unwrap_or(&endpoint).to_string();
            Arc::new(TcpClientTransport::new(
                target,
                link.clone(),
                Arc::clone(&sink),
            )) as Arc<dyn Transport>
        }),
        TransportArg::TcpServer => {
            let transport: Arc<dyn Transport> =
                Arc::new(TcpServerTransport::new(cli.port, link, sink));
            Box::new(move |_| Arc::clone(&transport))
        }
        TransportArg::Udp => {
            let transport: Arc<dyn Transport> =
                Arc::new(UdpBroadcastTransport::new(cli.port, link, sink));
            Box::new(move |_| Arc::clone(&transport))
        }
    }
}

/// Build the bridge factory invoked once the handshake has produced the
/// device identity
fn build_bridge_factory(settings: MqttSettings) -> BridgeFactory {
    Box::new(move |info| {
        let serial = info.serial.clone().unwrap_or_else(|| "unknown".to_string());
        let bridge = Arc::new(RumqttBridge::connect(&settings, &serial));
        bridge.set_command_handler(Arc::new(LoggingCommandHandler));
        bridge as Arc<dyn MqttBridge>
    })
}

/// Route termination signals into a graceful shutdown request
async fn route_signals(lifecycle: LifecycleHandle) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("termination signal received, shutting down");
    lifecycle.shutdown();
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Load configuration from file or use defaults
fn load_configuration(cli: &Cli) -> Result<AppConfig> {
    if let Some(config_path) = &cli.config {
        info!("loading configuration from: {config_path}");
        AppConfig::load_from_file(config_path)
    } else {
        Ok(AppConfig::default())
    }
}
