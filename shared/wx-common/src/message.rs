//! Message Types
//!
//! Typed views of the platform's callback messages. Inbound messages are a
//! closed tagged union dispatched on an explicit kind tag: the router matches
//! on [`MsgTag`] (and [`EventKind`] for events) rather than on open-ended
//! subtyping.

use serde::{Deserialize, Serialize};

/// Discriminant for [`MessageKind`], used by dispatch rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MsgTag {
    Text,
    Image,
    Voice,
    Link,
    Event,
}

impl std::fmt::Display for MsgTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Voice => "voice",
            Self::Link => "link",
            Self::Event => "event",
        };
        f.write_str(s)
    }
}

/// Event subtypes delivered as `event`-kind messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Subscribe,
    Unsubscribe,
    Click,
    View,
    Scan,
    Location,
}

/// Kind-specific payload of an inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageKind {
    Text {
        content: String,
    },
    Image {
        pic_url: String,
        media_id: String,
    },
    Voice {
        media_id: String,
        format: String,
    },
    Link {
        title: String,
        description: String,
        url: String,
    },
    Event {
        event: EventKind,
        /// Content key for events that carry one (e.g. the menu-click
        /// identifier for `Click`/`View`).
        event_key: Option<String>,
    },
}

impl MessageKind {
    /// The kind tag rules match against.
    #[must_use]
    pub fn tag(&self) -> MsgTag {
        match self {
            Self::Text { .. } => MsgTag::Text,
            Self::Image { .. } => MsgTag::Image,
            Self::Voice { .. } => MsgTag::Voice,
            Self::Link { .. } => MsgTag::Link,
            Self::Event { .. } => MsgTag::Event,
        }
    }
}

/// A decrypted, parsed callback message.
///
/// Produced once per callback by the XML layer, consumed exactly once by the
/// router, then discarded. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Sender account (the platform user).
    pub from_user: String,
    /// Recipient account (the application).
    pub to_user: String,
    /// Platform creation timestamp (unix seconds).
    pub create_time: i64,
    /// Platform message id; absent for events.
    pub msg_id: Option<i64>,
    /// Kind-specific payload.
    pub kind: MessageKind,
}

impl InboundMessage {
    /// Convenience constructor for a text message.
    #[must_use]
    pub fn text(from_user: &str, to_user: &str, content: &str) -> Self {
        Self {
            from_user: from_user.to_string(),
            to_user: to_user.to_string(),
            create_time: 0,
            msg_id: None,
            kind: MessageKind::Text {
                content: content.to_string(),
            },
        }
    }

    /// Convenience constructor for an event message.
    #[must_use]
    pub fn event(from_user: &str, to_user: &str, event: EventKind, event_key: Option<&str>) -> Self {
        Self {
            from_user: from_user.to_string(),
            to_user: to_user.to_string(),
            create_time: 0,
            msg_id: None,
            kind: MessageKind::Event {
                event,
                event_key: event_key.map(ToString::to_string),
            },
        }
    }

    /// The event content key, when this is an event carrying one.
    #[must_use]
    pub fn event_key(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::Event { event_key, .. } => event_key.as_deref(),
            _ => None,
        }
    }
}

/// A reply produced by a handler, destined for re-encryption and the HTTP
/// response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutboundMessage {
    Text {
        from_user: String,
        to_user: String,
        content: String,
    },
    Image {
        from_user: String,
        to_user: String,
        media_id: String,
    },
    Voice {
        from_user: String,
        to_user: String,
        media_id: String,
    },
}

impl OutboundMessage {
    /// Build a text reply to `msg`, swapping sender and recipient.
    #[must_use]
    pub fn text_reply(msg: &InboundMessage, content: &str) -> Self {
        Self::Text {
            from_user: msg.to_user.clone(),
            to_user: msg.from_user.clone(),
            content: content.to_string(),
        }
    }

    /// Recipient of this reply.
    #[must_use]
    pub fn to_user(&self) -> &str {
        match self {
            Self::Text { to_user, .. } | Self::Image { to_user, .. } | Self::Voice { to_user, .. } => {
                to_user
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tag_matches_variant() {
        let msg = InboundMessage::text("u1", "app1", "hi");
        assert_eq!(msg.kind.tag(), MsgTag::Text);

        let ev = InboundMessage::event("u1", "app1", EventKind::Click, Some("MENU_1"));
        assert_eq!(ev.kind.tag(), MsgTag::Event);
        assert_eq!(ev.event_key(), Some("MENU_1"));
    }

    #[test]
    fn text_reply_swaps_addresses() {
        let msg = InboundMessage::text("u1", "app1", "ping");
        let reply = OutboundMessage::text_reply(&msg, "pong");
        assert_eq!(
            reply,
            OutboundMessage::Text {
                from_user: "app1".into(),
                to_user: "u1".into(),
                content: "pong".into(),
            }
        );
    }
}
