//! chatbridge relay
//!
//! Bridges a single messaging-network session to local WebSocket consumers.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;

use chatbridge_core::BridgeConfig;
use chatbridge_core::config::{expand_home, load_config};
use chatbridge_core::tracing_init::init_tracing;
use chatbridge_relay::engine::{ProcessEngine, ProcessEngineConfig};
use chatbridge_relay::registry::ClientRegistry;
use chatbridge_relay::server::{RelayServer, spawn_event_bridge};
use chatbridge_relay::session::{SessionConfig, SessionManager};

/// Session events buffered between the session manager and the fan-out.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long the listener gets to wind down on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "chatbridge-relay")]
#[command(version, about = "chatbridge relay - messaging session to WebSocket bridge")]
struct Args {
    /// Port to listen on (overrides BRIDGE_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Authentication-state directory (overrides AUTH_DIR)
    #[arg(long)]
    auth_dir: Option<PathBuf>,

    /// Session Engine sidecar executable (overrides BRIDGE_ENGINE_CMD)
    #[arg(long)]
    engine_cmd: Option<PathBuf>,

    /// Extra argument for the engine sidecar; repeatable
    #[arg(long = "engine-arg")]
    engine_args: Vec<String>,

    /// JSON settings file
    #[arg(long, env = "BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "BRIDGE_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn apply_to(self, config: &mut BridgeConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(dir) = self.auth_dir {
            config.auth_dir = expand_home(&dir);
        }
        if let Some(cmd) = self.engine_cmd {
            config.engine.command = Some(cmd);
        }
        if !self.engine_args.is_empty() {
            config.engine.args = self.engine_args;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("chatbridge_relay", &args.log_level, args.log_json);

    let mut config = load_config(args.config.as_deref())?;
    args.apply_to(&mut config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        auth_dir = %config.auth_dir.display(),
        "Starting chatbridge-relay"
    );

    let command = config
        .engine
        .command
        .clone()
        .context("No Session Engine configured; pass --engine-cmd or set BRIDGE_ENGINE_CMD")?;
    let engine = ProcessEngine::new(ProcessEngineConfig {
        command,
        args: config.engine.args.clone(),
        auth_dir: config.auth_dir.clone(),
        send_timeout: config.engine.send_timeout(),
        terminate_timeout: config.engine.terminate_timeout(),
    });

    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let session = SessionManager::new(
        Arc::new(engine),
        SessionConfig::from(&config.session),
        events_tx,
    );
    let registry = ClientRegistry::new();
    let bridge = spawn_event_bridge(events_rx, registry.clone());

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    let relay = RelayServer::new(addr, registry, session.clone())
        .start()
        .await?;
    info!(url = %format!("ws://localhost:{}", relay.local_addr().port()), "Relay ready");

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    // The `true` parameter unsets $NOTIFY_SOCKET so the engine sidecar
    // doesn't inherit it.
    #[cfg(unix)]
    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])?;

    session
        .connect()
        .await
        .context("Failed to start Session Engine")?;

    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
    }

    relay.shutdown(SHUTDOWN_GRACE).await;
    drop(session);
    bridge.abort();

    info!("Relay stopped");
    Ok(())
}
