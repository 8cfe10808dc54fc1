//! Session Engine collaborator interface.
//!
//! The Session Engine owns the encrypted protocol with the remote messaging
//! network. The relay only drives it through [`SessionEngine`] and the
//! per-connection [`EngineHandle`], and observes it through [`EngineEvent`]s.

pub mod process;
#[cfg(test)]
pub(crate) mod testing;
mod wire;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use chatbridge_core::Envelope;

pub use process::{ProcessEngine, ProcessEngineConfig};

/// Close status the engine reports when the account was logged out remotely.
pub const LOGGED_OUT_STATUS: u16 = 401;

/// Opaque credential material owned by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials(pub serde_json::Value);

/// Why the engine connection closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The account was logged out; only operator re-pairing recovers.
    LoggedOut,
    /// Anything else: network loss, restart requests, expired pairing codes.
    Other {
        status_code: Option<u16>,
        message: Option<String>,
    },
}

impl CloseReason {
    /// Classify an engine close status code.
    pub fn from_status(status_code: Option<u16>, message: Option<String>) -> Self {
        if status_code == Some(LOGGED_OUT_STATUS) {
            Self::LoggedOut
        } else {
            Self::Other {
                status_code,
                message,
            }
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            status_code: None,
            message: Some(message.into()),
        }
    }

    pub const fn is_logged_out(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }

    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::LoggedOut => Some(LOGGED_OUT_STATUS),
            Self::Other { status_code, .. } => *status_code,
        }
    }
}

/// Connection state transition reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionUpdate {
    Open,
    Close(CloseReason),
}

/// Kind of inbound batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchKind {
    /// Live messages that should be surfaced.
    Notify,
    /// History appended during sync.
    Append,
    Other(String),
}

impl BatchKind {
    pub fn parse(kind: &str) -> Self {
        match kind {
            "notify" => Self::Notify,
            "append" => Self::Append,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Notification raised by a live engine connection, in engine order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    PairingCode(String),
    Connection(ConnectionUpdate),
    CredentialsChanged(Credentials),
    InboundBatch {
        kind: BatchKind,
        envelopes: Vec<Envelope>,
    },
}

/// A freshly opened engine connection.
pub struct EngineConnection {
    pub handle: Arc<dyn EngineHandle>,
    /// Ends when the engine connection is gone.
    pub events: mpsc::Receiver<EngineEvent>,
}

/// Entry point into the Session Engine.
#[async_trait]
pub trait SessionEngine: Send + Sync {
    /// Load persisted credentials, if any.
    async fn load_credentials(&self) -> Result<Option<Credentials>, EngineError>;

    /// Persist credentials handed out by [`EngineEvent::CredentialsChanged`].
    async fn save_credentials(&self, credentials: &Credentials) -> Result<(), EngineError>;

    /// Open a new engine connection.
    async fn connect(&self, credentials: Option<Credentials>)
    -> Result<EngineConnection, EngineError>;
}

/// Operations on one live engine connection.
#[async_trait]
pub trait EngineHandle: Send + Sync {
    /// Dispatch a text message; resolves once the engine acknowledges it.
    async fn send_text(&self, to: &str, text: &str) -> Result<(), EngineError>;

    /// Tear the connection down. Safe to call more than once.
    async fn terminate(&self);
}

/// Errors from the Session Engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to start engine: {reason}")]
    Spawn { reason: String },

    #[error("Engine connection closed")]
    Closed,

    #[error("Engine did not acknowledge within {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Rejected(String),

    #[error("Credential store error: {0}")]
    Credentials(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_401_is_logout() {
        assert!(CloseReason::from_status(Some(401), None).is_logged_out());
        assert!(!CloseReason::from_status(Some(428), None).is_logged_out());
        assert!(!CloseReason::from_status(None, Some("eof".into())).is_logged_out());
    }

    #[test]
    fn batch_kind_parse() {
        assert_eq!(BatchKind::parse("notify"), BatchKind::Notify);
        assert_eq!(BatchKind::parse("append"), BatchKind::Append);
        assert_eq!(BatchKind::parse("x"), BatchKind::Other("x".into()));
    }
}
