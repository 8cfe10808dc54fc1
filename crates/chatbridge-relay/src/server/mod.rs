//! Relay server: WebSocket endpoint for consumers plus `/health`.
//!
//! Each consumer gets a socket writer fed by a bounded queue; session events
//! reach consumers through the event bridge.

pub mod bridge;
pub mod dispatch;
pub mod health;
pub mod ws;

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

pub use bridge::spawn_event_bridge;

use crate::registry::ClientRegistry;
use crate::session::SessionManager;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: ClientRegistry,
    pub session: SessionManager,
    /// Cancelled once shutdown begins; consumers stop reading commands.
    pub shutdown: CancellationToken,
    /// One task per upgraded consumer socket.
    pub consumers: TaskTracker,
}

/// Relay server errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The consumer-facing relay server.
pub struct RelayServer {
    addr: SocketAddr,
    state: AppState,
}

impl RelayServer {
    pub fn new(addr: SocketAddr, registry: ClientRegistry, session: SessionManager) -> Self {
        Self {
            addr,
            state: AppState {
                registry,
                session,
                shutdown: CancellationToken::new(),
                consumers: TaskTracker::new(),
            },
        }
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(ws::ws_handler))
            .route("/ws", get(ws::ws_handler))
            .route("/health", get(health::health_handler))
            .with_state(self.state.clone())
    }

    /// Bind the listen address and start serving in the background.
    pub async fn start(self) -> Result<RunningRelay, RelayError> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|source| RelayError::Bind {
                addr: self.addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;
        let router = self.router();

        let stop = self.state.shutdown.clone();
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(stop.cancelled_owned())
                .await
        });

        info!(addr = %local_addr, "Relay listening");
        Ok(RunningRelay {
            local_addr,
            state: self.state,
            task,
        })
    }
}

/// Handle to a started relay server.
pub struct RunningRelay {
    local_addr: SocketAddr,
    state: AppState,
    task: JoinHandle<std::io::Result<()>>,
}

impl RunningRelay {
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Ordered shutdown: close every consumer, stop accepting, wait for
    /// in-flight commands, then tear the session down.
    ///
    /// `grace` bounds the whole wait before the session is disconnected.
    pub async fn shutdown(self, grace: Duration) {
        let deadline = Instant::now() + grace;

        self.state.registry.close_all().await;
        self.state.shutdown.cancel();
        self.state.consumers.close();

        match tokio::time::timeout_at(deadline, self.task).await {
            Ok(Ok(Ok(()))) => info!("Relay listener stopped"),
            Ok(Ok(Err(e))) => warn!(error = %e, "Relay listener failed"),
            Ok(Err(e)) => warn!(error = %e, "Relay listener task panicked"),
            Err(_) => warn!(grace_secs = grace.as_secs(), "Relay listener did not stop in time"),
        }

        if tokio::time::timeout_at(deadline, self.state.consumers.wait())
            .await
            .is_err()
        {
            warn!(
                remaining = self.state.consumers.len(),
                "Consumer tasks still running at shutdown deadline"
            );
        } else {
            debug!("All consumer tasks finished");
        }

        self.state.session.disconnect().await;
    }
}
