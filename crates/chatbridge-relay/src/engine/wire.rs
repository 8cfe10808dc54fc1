//! NDJSON line protocol spoken with the sidecar engine process.
//!
//! Implements tolerant reader pattern: unknown fields ignored, unknown types
//! surfaced as [`SidecarMessage::Unknown`] for the caller to log.

use serde_json::{Value, json};
use tracing::warn;

use chatbridge_core::envelope::parse_envelope;

use super::{BatchKind, CloseReason, ConnectionUpdate, Credentials, EngineEvent};

/// Browser identity announced to the remote network.
const CLIENT_NAME: &str = "chatbridge";

/// A decoded line from the engine's stdout.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum SidecarMessage {
    Event(EngineEvent),
    Ack {
        request_id: String,
        error: Option<String>,
    },
    Unknown {
        msg_type: String,
    },
}

/// Parse a single line from the engine's stdout.
pub(super) fn parse_line(line: &str) -> Result<SidecarMessage, chatbridge_core::Error> {
    let raw: Value = serde_json::from_str(line)?;
    let msg_type = raw
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| chatbridge_core::Error::Envelope("Missing 'type' field".into()))?;

    let message = match msg_type {
        "qr" => SidecarMessage::Event(EngineEvent::PairingCode(str_field(&raw, "qr"))),
        "connection" => parse_connection(&raw),
        "creds.update" => SidecarMessage::Event(EngineEvent::CredentialsChanged(Credentials(
            raw.get("creds").cloned().unwrap_or(Value::Null),
        ))),
        "messages.upsert" => parse_upsert(&raw),
        "ack" => SidecarMessage::Ack {
            request_id: str_field(&raw, "requestId"),
            error: raw
                .get("error")
                .and_then(Value::as_str)
                .map(String::from),
        },
        other => SidecarMessage::Unknown {
            msg_type: other.to_string(),
        },
    };
    Ok(message)
}

fn str_field(raw: &Value, name: &str) -> String {
    raw.get(name)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn parse_connection(raw: &Value) -> SidecarMessage {
    match raw.get("connection").and_then(Value::as_str) {
        Some("open") => SidecarMessage::Event(EngineEvent::Connection(ConnectionUpdate::Open)),
        Some("close") => {
            let status_code = raw
                .get("statusCode")
                .and_then(Value::as_u64)
                .and_then(|c| u16::try_from(c).ok());
            let message = raw.get("error").and_then(Value::as_str).map(String::from);
            SidecarMessage::Event(EngineEvent::Connection(ConnectionUpdate::Close(
                CloseReason::from_status(status_code, message),
            )))
        }
        other => SidecarMessage::Unknown {
            msg_type: format!("connection:{}", other.unwrap_or("?")),
        },
    }
}

fn parse_upsert(raw: &Value) -> SidecarMessage {
    let kind = BatchKind::parse(raw.get("kind").and_then(Value::as_str).unwrap_or("notify"));
    let envelopes = raw
        .get("messages")
        .and_then(Value::as_array)
        .map(|messages| {
            messages
                .iter()
                .filter_map(|m| match parse_envelope(m) {
                    Ok(env) => Some(env),
                    Err(e) => {
                        warn!(error = %e, "Skipping undecodable envelope");
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    SidecarMessage::Event(EngineEvent::InboundBatch { kind, envelopes })
}

/// Line asking the engine to open its connection.
pub(super) fn connect_line(auth_dir: &str, credentials: Option<&Credentials>) -> String {
    json!({
        "type": "connect",
        "authDir": auth_dir,
        "credentials": credentials.map_or(Value::Null, |c| c.0.clone()),
        "browser": [CLIENT_NAME, "cli", env!("CARGO_PKG_VERSION")],
        "syncFullHistory": false,
        "markOnlineOnConnect": false,
    })
    .to_string()
}

pub(super) fn send_line(request_id: &str, to: &str, text: &str) -> String {
    json!({"type": "send", "requestId": request_id, "to": to, "text": text}).to_string()
}

pub(super) fn terminate_line() -> String {
    json!({"type": "terminate"}).to_string()
}
