//! Consumer command dispatch.

use tracing::{debug, warn};

use chatbridge_core::{OutboundCommand, RelayEvent};

use crate::session::SessionManager;

/// Handle one consumer frame and produce the answer for that consumer.
///
/// Malformed frames and failed sends become `error` events; they never reach
/// other consumers.
pub async fn handle_frame(frame: &str, session: &SessionManager) -> RelayEvent {
    let command = match OutboundCommand::parse(frame) {
        Ok(command) => command,
        Err(e) => {
            warn!(error = %e, len = frame.len(), "Rejected consumer frame");
            return RelayEvent::error(e);
        }
    };

    match command {
        OutboundCommand::Send { to, text } => match session.send_message(&to, &text).await {
            Ok(()) => {
                debug!(to = %to, "Send acknowledged");
                RelayEvent::Sent { to }
            }
            Err(e) => {
                warn!(to = %to, error = %e, "Send failed");
                RelayEvent::error(e)
            }
        },
    }
}
