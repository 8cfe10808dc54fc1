//! Relay wire protocol.
//!
//! JSON text frames exchanged with relay consumers. Consumers send
//! [`OutboundCommand`]s; the relay answers and broadcasts [`RelayEvent`]s.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Normalized inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub id: String,
    pub sender: String,
    pub content: String,
    pub timestamp: i64,
    pub is_group: bool,
}

/// Session connectivity as reported to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// Event sent from the relay to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RelayEvent {
    /// Inbound chat message (broadcast).
    Message(InboundMessage),
    /// Session connectivity change (broadcast).
    Status { status: ConnectionStatus },
    /// Pairing code for the operator (broadcast).
    #[serde(rename = "qr")]
    PairingCode { qr: String },
    /// Failure answer to a single consumer.
    Error { error: String },
    /// Acknowledgement of a dispatched send, to the issuing consumer only.
    Sent { to: String },
}

impl RelayEvent {
    pub const fn status(status: ConnectionStatus) -> Self {
        Self::Status { status }
    }

    pub fn error(error: impl ToString) -> Self {
        Self::Error {
            error: error.to_string(),
        }
    }

    /// Serialize to a wire frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Validated consumer command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundCommand {
    /// Send a text message to `to`.
    Send { to: String, text: String },
}

impl OutboundCommand {
    /// Parse and validate a consumer frame.
    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        let command: Self =
            serde_json::from_str(frame).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        command.validate()?;
        Ok(command)
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            Self::Send { to, text } => {
                if to.trim().is_empty() {
                    return Err(ProtocolError::EmptyField("to"));
                }
                if text.is_empty() {
                    return Err(ProtocolError::EmptyField("text"));
                }
                Ok(())
            }
        }
    }
}

/// A consumer frame that could not be turned into a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Malformed command: {0}")]
    Malformed(String),

    #[error("Command field '{0}' must not be empty")]
    EmptyField(&'static str),

    #[error("Frame is not valid UTF-8")]
    NotUtf8,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn parses_send_command() {
        let cmd = OutboundCommand::parse(r#"{"type":"send","to":"123@s.whatsapp.net","text":"yo"}"#)
            .unwrap();
        assert_eq!(
            cmd,
            OutboundCommand::Send {
                to: "123@s.whatsapp.net".into(),
                text: "yo".into()
            }
        );
    }

    #[test]
    fn unknown_command_type_is_malformed() {
        let err = OutboundCommand::parse(r#"{"type":"delete","id":"x"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn missing_fields_are_malformed() {
        let err = OutboundCommand::parse(r#"{"type":"send","to":"a"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));

        let err = OutboundCommand::parse("not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn empty_fields_are_rejected() {
        assert_eq!(
            OutboundCommand::parse(r#"{"type":"send","to":"","text":"hi"}"#).unwrap_err(),
            ProtocolError::EmptyField("to")
        );
        assert_eq!(
            OutboundCommand::parse(r#"{"type":"send","to":"a@s.whatsapp.net","text":""}"#)
                .unwrap_err(),
            ProtocolError::EmptyField("text")
        );
    }

    #[test]
    fn message_event_flattens_fields() {
        let event = RelayEvent::Message(InboundMessage {
            id: "ABC".into(),
            sender: "1@g.us".into(),
            content: "[Image] lunch".into(),
            timestamp: 17,
            is_group: true,
        });
        let value: Value = serde_json::from_str(&event.to_frame().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "message",
                "id": "ABC",
                "sender": "1@g.us",
                "content": "[Image] lunch",
                "timestamp": 17,
                "isGroup": true
            })
        );
    }

    #[test]
    fn control_events_match_wire_shapes() {
        let frame = |e: RelayEvent| serde_json::from_str::<Value>(&e.to_frame().unwrap()).unwrap();

        assert_eq!(
            frame(RelayEvent::status(ConnectionStatus::Connected)),
            json!({"type": "status", "status": "connected"})
        );
        assert_eq!(
            frame(RelayEvent::PairingCode { qr: "2@abc".into() }),
            json!({"type": "qr", "qr": "2@abc"})
        );
        assert_eq!(
            frame(RelayEvent::error("Not connected")),
            json!({"type": "error", "error": "Not connected"})
        );
        assert_eq!(
            frame(RelayEvent::Sent { to: "1@s.whatsapp.net".into() }),
            json!({"type": "sent", "to": "1@s.whatsapp.net"})
        );
    }
}
