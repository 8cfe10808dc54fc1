//! Session manager types.

use std::time::Duration;

use chatbridge_core::config::SessionSettings;

use crate::engine::EngineError;

/// Configuration for the session manager.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Fixed delay before a transient close is retried.
    pub reconnect_delay: Duration,
    /// Bounded wait between handshake signals (`None` = unbounded).
    pub handshake_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            handshake_timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl From<&SessionSettings> for SessionConfig {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            reconnect_delay: settings.reconnect_delay(),
            handshake_timeout: settings.handshake_timeout(),
        }
    }
}

/// Session manager errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Not connected")]
    NotConnected,

    #[error("Send failed: {0}")]
    Send(#[source] EngineError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}
