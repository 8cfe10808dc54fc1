//! Message normalization.
//!
//! Maps a decoded [`Envelope`] to the canonical text form consumers receive,
//! or to nothing when the envelope must not surface as a message.

use crate::envelope::{Envelope, MessageContent};
use crate::protocol::InboundMessage;

/// Placeholder content for voice notes and audio clips.
pub const VOICE_PLACEHOLDER: &str = "[Voice Message]";

/// Normalize an envelope into an [`InboundMessage`].
///
/// Returns `None` for self-originated envelopes, broadcast status updates,
/// and envelopes without representable content.
pub fn normalize(envelope: &Envelope) -> Option<InboundMessage> {
    if envelope.from_me || envelope.is_status_broadcast() {
        return None;
    }

    let content = canonical_text(&envelope.content)?;

    Some(InboundMessage {
        id: envelope.id.clone(),
        sender: envelope.remote_jid.clone(),
        content,
        timestamp: envelope.timestamp,
        is_group: envelope.is_group(),
    })
}

/// Canonical text for a content shape.
///
/// Media captions carry a bracketed type tag so consumers can tell them apart
/// from authored text.
pub fn canonical_text(content: &MessageContent) -> Option<String> {
    let text = match content {
        MessageContent::Conversation(text) | MessageContent::ExtendedText(text) => text.clone(),
        MessageContent::Image { caption: Some(c) } => format!("[Image] {c}"),
        MessageContent::Video { caption: Some(c) } => format!("[Video] {c}"),
        MessageContent::Document { caption: Some(c) } => format!("[Document] {c}"),
        MessageContent::Audio => VOICE_PLACEHOLDER.to_string(),
        MessageContent::Image { caption: None }
        | MessageContent::Video { caption: None }
        | MessageContent::Document { caption: None }
        | MessageContent::Empty
        | MessageContent::Unsupported(_) => return None,
    };
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::envelope::parse_envelope;
    use serde_json::{Value, json};

    fn envelope(jid: &str, from_me: bool, content: MessageContent) -> Envelope {
        Envelope {
            id: "ID1".into(),
            remote_jid: jid.into(),
            from_me,
            timestamp: 1_700_000_000,
            content,
        }
    }

    fn decode(message: Value, jid: &str) -> Envelope {
        parse_envelope(&json!({
            "key": {"remoteJid": jid, "fromMe": false, "id": "ID1"},
            "message": message,
            "messageTimestamp": 1_700_000_000
        }))
        .unwrap()
    }

    #[test]
    fn plain_text_from_direct_chat() {
        let msg = normalize(&decode(json!({"conversation": "hi"}), "123@s.whatsapp.net")).unwrap();
        assert_eq!(msg.content, "hi");
        assert!(!msg.is_group);
        assert_eq!(msg.sender, "123@s.whatsapp.net");
        assert_eq!(msg.id, "ID1");
        assert_eq!(msg.timestamp, 1_700_000_000);
    }

    #[test]
    fn image_caption_in_group() {
        let msg = normalize(&decode(
            json!({"imageMessage": {"caption": "lunch"}}),
            "120363000000@g.us",
        ))
        .unwrap();
        assert_eq!(msg.content, "[Image] lunch");
        assert!(msg.is_group);
    }

    #[test]
    fn precedence_table() {
        let cases = [
            (json!({"conversation": "a"}), "a"),
            (json!({"extendedTextMessage": {"text": "b"}}), "b"),
            (json!({"imageMessage": {"caption": "c"}}), "[Image] c"),
            (json!({"videoMessage": {"caption": "d"}}), "[Video] d"),
            (json!({"documentMessage": {"caption": "e"}}), "[Document] e"),
            (json!({"audioMessage": {"ptt": true}}), "[Voice Message]"),
            (json!({"audioMessage": {"caption": "ignored"}}), "[Voice Message]"),
            (
                json!({"extendedTextMessage": {"text": "quoted"}, "imageMessage": {"caption": "x"}}),
                "quoted",
            ),
            (
                json!({"videoMessage": {"caption": "v"}, "documentMessage": {"caption": "d"}}),
                "[Video] v",
            ),
            (
                json!({"documentMessage": {"caption": "doc"}, "audioMessage": {}}),
                "[Document] doc",
            ),
        ];

        for (message, expected) in cases {
            let env = decode(message.clone(), "9@s.whatsapp.net");
            let got = normalize(&env).map(|m| m.content);
            assert_eq!(got.as_deref(), Some(expected), "message: {message}");
        }
    }

    #[test]
    fn unrepresentable_content_is_dropped() {
        for message in [
            json!({"imageMessage": {}}),
            json!({"videoMessage": {"caption": ""}}),
            json!({"stickerMessage": {}}),
            json!({}),
            Value::Null,
        ] {
            let env = decode(message.clone(), "9@s.whatsapp.net");
            assert!(normalize(&env).is_none(), "message: {message}");
        }
    }

    #[test]
    fn self_originated_and_status_are_dropped() {
        let shapes = [
            MessageContent::Conversation("hi".into()),
            MessageContent::Image {
                caption: Some("pic".into()),
            },
            MessageContent::Audio,
        ];
        for content in shapes {
            assert!(normalize(&envelope("1@s.whatsapp.net", true, content.clone())).is_none());
            assert!(normalize(&envelope("status@broadcast", false, content.clone())).is_none());
            assert!(normalize(&envelope("1@s.whatsapp.net", false, content)).is_some());
        }
    }

    #[test]
    fn group_flag_comes_only_from_suffix() {
        let text = MessageContent::Conversation("x".into());
        assert!(normalize(&envelope("42@g.us", false, text.clone())).unwrap().is_group);
        assert!(!normalize(&envelope("42@g.us.example", false, text.clone())).unwrap().is_group);
        assert!(!normalize(&envelope("42@s.whatsapp.net", false, text)).unwrap().is_group);
    }
}
