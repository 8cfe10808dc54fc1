//! Envelope types decoded from the Session Engine's message records.

/// Address suffix carried by group conversations.
pub const GROUP_SUFFIX: &str = "@g.us";

/// Reserved address used for broadcast status updates.
pub const STATUS_BROADCAST: &str = "status@broadcast";

/// A decoded inbound envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Wire-assigned message id (may be empty).
    pub id: String,
    /// Remote conversation address.
    pub remote_jid: String,
    /// Whether this account sent the message.
    pub from_me: bool,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub content: MessageContent,
}

impl Envelope {
    /// Whether the sender address is a group conversation.
    pub fn is_group(&self) -> bool {
        self.remote_jid.ends_with(GROUP_SUFFIX)
    }

    /// Whether the envelope comes from the broadcast status address.
    pub fn is_status_broadcast(&self) -> bool {
        self.remote_jid == STATUS_BROADCAST
    }
}

/// Content shape of an envelope, one case per recognised shape.
///
/// Decoding already applied shape precedence, so at most one case is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    /// Plain text.
    Conversation(String),
    /// Quoted or extended text (replies, link previews).
    ExtendedText(String),
    Image { caption: Option<String> },
    Video { caption: Option<String> },
    Document { caption: Option<String> },
    /// Voice note or audio clip.
    Audio,
    /// Envelope carried no message body.
    Empty,
    /// Only shapes this bridge does not represent (stickers, reactions, ...).
    Unsupported(Vec<String>),
}

impl MessageContent {
    /// Short name for logging.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Conversation(_) => "conversation",
            Self::ExtendedText(_) => "extended_text",
            Self::Image { .. } => "image",
            Self::Video { .. } => "video",
            Self::Document { .. } => "document",
            Self::Audio => "audio",
            Self::Empty => "empty",
            Self::Unsupported(_) => "unsupported",
        }
    }
}
