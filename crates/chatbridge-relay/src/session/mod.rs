//! Session lifecycle management.
//!
//! Owns the single Session Engine connection: connect, pairing, loss
//! detection, fixed-delay reconnect and terminal logout. Engine notifications
//! are translated into relay events.

pub mod manager;
pub mod state;
pub mod types;

pub use manager::SessionManager;
pub use state::SessionState;
pub use types::{SessionConfig, SessionError};
