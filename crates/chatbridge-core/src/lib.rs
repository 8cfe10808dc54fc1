//! `chatbridge` Core Library
//!
//! Shared functionality for `chatbridge` components:
//! - Relay wire protocol (consumer commands and broadcast events)
//! - Envelope decoding and message normalization
//! - Configuration resolution and hierarchy
//! - Common error types

pub mod config;
pub mod envelope;
pub mod error;
pub mod normalize;
pub mod protocol;
pub mod tracing_init;

pub use config::BridgeConfig;
pub use envelope::{Envelope, MessageContent};
pub use error::{Error, Result};
pub use normalize::normalize;
pub use protocol::{ConnectionStatus, InboundMessage, OutboundCommand, ProtocolError, RelayEvent};
