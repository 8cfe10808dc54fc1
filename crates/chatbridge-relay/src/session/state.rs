//! Session state management.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::engine::EngineHandle;

/// Lifecycle state of the single engine session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No engine connection and nothing scheduled.
    Disconnected,
    /// Engine connection opened, waiting for it to report open or a pairing code.
    Connecting,
    /// A pairing code is out with the operator.
    AwaitingPairing,
    Connected,
    /// Connection lost; exactly one reconnect attempt is scheduled.
    ReconnectPending,
}

impl SessionState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingPairing => "awaiting_pairing",
            Self::Connected => "connected",
            Self::ReconnectPending => "reconnect_pending",
        }
    }

    /// Whether an engine handle exists in this state.
    pub const fn is_live(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::AwaitingPairing | Self::Connected
        )
    }

    /// Whether the connect/pairing handshake is still running.
    pub const fn in_handshake(self) -> bool {
        matches!(self, Self::Connecting | Self::AwaitingPairing)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable session slot owned by the manager.
///
/// `handle` is present exactly when `state.is_live()`; `reconnect_timer` is
/// present exactly when `state` is `ReconnectPending`.
pub(crate) struct SessionSlot {
    pub state: SessionState,
    /// Bumped for every new engine connection and on teardown; events tagged
    /// with an older generation are stale.
    pub generation: u64,
    pub handle: Option<Arc<dyn EngineHandle>>,
    pub reconnect_timer: Option<JoinHandle<()>>,
    pub handshake_timer: Option<JoinHandle<()>>,
}

impl SessionSlot {
    pub const fn new() -> Self {
        Self {
            state: SessionState::Disconnected,
            generation: 0,
            handle: None,
            reconnect_timer: None,
            handshake_timer: None,
        }
    }

    /// Enter `Connecting` under a fresh generation and return it.
    pub fn begin_connecting(&mut self) -> u64 {
        self.generation += 1;
        self.state = SessionState::Connecting;
        self.generation
    }

    pub fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }

    pub fn cancel_handshake(&mut self) {
        if let Some(timer) = self.handshake_timer.take() {
            timer.abort();
        }
    }
}
