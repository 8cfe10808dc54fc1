//! Envelope decoder for Session Engine message records.
//!
//! Implements tolerant reader pattern: unknown fields ignored, unknown content
//! shapes kept by name so callers can log them.

use serde_json::Value;

use super::types::{Envelope, MessageContent};
use crate::error::{Error, Result};

/// Decode a raw envelope record.
///
/// Only the `key` object is mandatory; everything else falls back to an empty
/// value so a partially-populated record still yields an envelope.
pub fn parse_envelope(raw: &Value) -> Result<Envelope> {
    let key = raw
        .get("key")
        .filter(|v| v.is_object())
        .ok_or_else(|| Error::Envelope("Missing 'key' object".into()))?;

    let id = str_field(key, "id");
    let remote_jid = str_field(key, "remoteJid");
    let from_me = key.get("fromMe").and_then(Value::as_bool).unwrap_or(false);
    let timestamp = parse_timestamp(raw.get("messageTimestamp"));
    let content = parse_content(raw.get("message"));

    Ok(Envelope {
        id,
        remote_jid,
        from_me,
        timestamp,
        content,
    })
}

/// Parse a wire timestamp in seconds.
///
/// Engines emit plain numbers, numeric strings, or 64-bit `{low, high}`
/// objects. Anything else is `0`.
pub fn parse_timestamp(val: Option<&Value>) -> i64 {
    match val {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_u64().and_then(|u| i64::try_from(u).ok()))
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        Some(Value::Object(obj)) => {
            let low = obj.get("low").and_then(Value::as_i64).unwrap_or(0);
            let high = obj.get("high").and_then(Value::as_i64).unwrap_or(0);
            (high << 32) | (low & 0xFFFF_FFFF)
        }
        _ => 0,
    }
}

fn str_field(obj: &Value, name: &str) -> String {
    obj.get(name)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn non_empty(val: Option<&Value>) -> Option<String> {
    val.and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn present(msg: &Value, shape: &str) -> bool {
    msg.get(shape).is_some_and(|v| !v.is_null())
}

/// Pick the content shape, first applicable wins:
/// text, extended text, captioned image, captioned video, captioned document,
/// audio. Media without a caption only counts when nothing else applies.
fn parse_content(message: Option<&Value>) -> MessageContent {
    let Some(msg) = message.filter(|m| m.is_object()) else {
        return MessageContent::Empty;
    };

    if let Some(text) = non_empty(msg.get("conversation")) {
        return MessageContent::Conversation(text);
    }
    if let Some(text) = non_empty(msg.pointer("/extendedTextMessage/text")) {
        return MessageContent::ExtendedText(text);
    }
    if let Some(caption) = non_empty(msg.pointer("/imageMessage/caption")) {
        return MessageContent::Image {
            caption: Some(caption),
        };
    }
    if let Some(caption) = non_empty(msg.pointer("/videoMessage/caption")) {
        return MessageContent::Video {
            caption: Some(caption),
        };
    }
    if let Some(caption) = non_empty(msg.pointer("/documentMessage/caption")) {
        return MessageContent::Document {
            caption: Some(caption),
        };
    }
    if present(msg, "audioMessage") {
        return MessageContent::Audio;
    }

    if present(msg, "imageMessage") {
        return MessageContent::Image { caption: None };
    }
    if present(msg, "videoMessage") {
        return MessageContent::Video { caption: None };
    }
    if present(msg, "documentMessage") {
        return MessageContent::Document { caption: None };
    }

    let kinds: Vec<String> = msg
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, _)| k.clone())
                .collect()
        })
        .unwrap_or_default();
    if kinds.is_empty() {
        MessageContent::Empty
    } else {
        MessageContent::Unsupported(kinds)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope_with(message: Value) -> Value {
        json!({
            "key": {"remoteJid": "123@s.whatsapp.net", "fromMe": false, "id": "ABC"},
            "message": message,
            "messageTimestamp": 1_700_000_000
        })
    }

    #[test]
    fn parses_key_fields() {
        let env = parse_envelope(&envelope_with(json!({"conversation": "hi"}))).unwrap();
        assert_eq!(env.id, "ABC");
        assert_eq!(env.remote_jid, "123@s.whatsapp.net");
        assert!(!env.from_me);
        assert_eq!(env.timestamp, 1_700_000_000);
        assert_eq!(env.content, MessageContent::Conversation("hi".into()));
    }

    #[test]
    fn missing_key_is_an_error() {
        let err = parse_envelope(&json!({"message": {"conversation": "hi"}})).unwrap_err();
        assert!(matches!(err, Error::Envelope(_)));
    }

    #[test]
    fn missing_id_and_jid_default_to_empty() {
        let env = parse_envelope(&json!({"key": {}, "message": {"conversation": "x"}})).unwrap();
        assert_eq!(env.id, "");
        assert_eq!(env.remote_jid, "");
        assert_eq!(env.timestamp, 0);
    }

    #[test]
    fn conversation_beats_every_other_shape() {
        let env = parse_envelope(&envelope_with(json!({
            "conversation": "plain",
            "extendedTextMessage": {"text": "quoted"},
            "imageMessage": {"caption": "pic"},
            "audioMessage": {}
        })))
        .unwrap();
        assert_eq!(env.content, MessageContent::Conversation("plain".into()));
    }

    #[test]
    fn empty_conversation_falls_through_to_extended_text() {
        let env = parse_envelope(&envelope_with(json!({
            "conversation": "",
            "extendedTextMessage": {"text": "reply"}
        })))
        .unwrap();
        assert_eq!(env.content, MessageContent::ExtendedText("reply".into()));
    }

    #[test]
    fn captionless_image_yields_to_captioned_video() {
        let env = parse_envelope(&envelope_with(json!({
            "imageMessage": {"mimetype": "image/jpeg"},
            "videoMessage": {"caption": "clip"}
        })))
        .unwrap();
        assert_eq!(
            env.content,
            MessageContent::Video {
                caption: Some("clip".into())
            }
        );
    }

    #[test]
    fn captionless_image_yields_to_audio() {
        let env = parse_envelope(&envelope_with(json!({
            "imageMessage": {},
            "audioMessage": {"seconds": 4}
        })))
        .unwrap();
        assert_eq!(env.content, MessageContent::Audio);
    }

    #[test]
    fn lone_captionless_document_is_kept_without_caption() {
        let env = parse_envelope(&envelope_with(json!({
            "documentMessage": {"fileName": "a.pdf"}
        })))
        .unwrap();
        assert_eq!(env.content, MessageContent::Document { caption: None });
    }

    #[test]
    fn unknown_shapes_are_listed() {
        let env = parse_envelope(&envelope_with(json!({
            "stickerMessage": {"url": "x"}
        })))
        .unwrap();
        assert_eq!(
            env.content,
            MessageContent::Unsupported(vec!["stickerMessage".into()])
        );
    }

    #[test]
    fn null_or_missing_message_is_empty() {
        let env = parse_envelope(&envelope_with(Value::Null)).unwrap();
        assert_eq!(env.content, MessageContent::Empty);

        let env = parse_envelope(&json!({"key": {"remoteJid": "a"}})).unwrap();
        assert_eq!(env.content, MessageContent::Empty);
    }

    #[test]
    fn timestamp_forms() {
        assert_eq!(parse_timestamp(Some(&json!(42))), 42);
        assert_eq!(parse_timestamp(Some(&json!("1700000001"))), 1_700_000_001);
        assert_eq!(
            parse_timestamp(Some(&json!({"low": 1_700_000_002, "high": 0, "unsigned": true}))),
            1_700_000_002
        );
        assert_eq!(parse_timestamp(Some(&json!("soon"))), 0);
        assert_eq!(parse_timestamp(None), 0);
    }
}
