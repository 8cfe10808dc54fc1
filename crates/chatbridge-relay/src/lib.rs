//! chatbridge relay library
//!
//! Core functionality for the relay:
//! - Session Engine interface and the sidecar process adapter
//! - Session lifecycle: connect, pairing, reconnect and logout
//! - Consumer registry with bounded per-consumer queues
//! - WebSocket server, command dispatch and event fan-out

pub mod engine;
pub mod registry;
pub mod server;
pub mod session;
