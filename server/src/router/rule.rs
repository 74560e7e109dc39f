//! Dispatch Rules
//!
//! A rule binds a match predicate to one or more handlers. Rules are
//! registered once at startup through the builder and are immutable and
//! shared read-only across all concurrent dispatches afterwards.

use std::sync::Arc;

use wx_common::{EventKind, InboundMessage, MessageKind, MsgTag};

use super::handler::MessageHandler;
use super::RouterBuilder;

type CustomPredicate = Arc<dyn Fn(&InboundMessage) -> bool + Send + Sync>;

/// Match predicate over message kind, event subtype, and content key.
///
/// All configured conditions must hold; a matcher with no conditions matches
/// every message.
#[derive(Clone, Default)]
pub struct RuleMatcher {
    pub(super) tag: Option<MsgTag>,
    pub(super) event: Option<EventKind>,
    pub(super) event_key: Option<String>,
    pub(super) custom: Option<CustomPredicate>,
}

impl RuleMatcher {
    pub(super) fn matches(&self, msg: &InboundMessage) -> bool {
        if let Some(tag) = self.tag {
            if msg.kind.tag() != tag {
                return false;
            }
        }
        if let Some(event) = self.event {
            match &msg.kind {
                MessageKind::Event { event: got, .. } if *got == event => {}
                _ => return false,
            }
        }
        if let Some(key) = &self.event_key {
            if msg.event_key() != Some(key.as_str()) {
                return false;
            }
        }
        if let Some(custom) = &self.custom {
            if !custom(msg) {
                return false;
            }
        }
        true
    }
}

impl std::fmt::Debug for RuleMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleMatcher")
            .field("tag", &self.tag)
            .field("event", &self.event)
            .field("event_key", &self.event_key)
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

/// One registered predicate-to-handlers binding.
#[derive(Clone)]
pub(super) struct Rule {
    pub(super) matcher: RuleMatcher,
    pub(super) handlers: Vec<Arc<dyn MessageHandler>>,
    /// A matching re-entrant rule does not terminate dispatch; later rules
    /// still see the message.
    pub(super) reenter: bool,
    /// Fire-and-forget: handlers run on the worker pool and the rule's
    /// dispatch result is always `None`.
    pub(super) asynchronous: bool,
}

/// Fluent builder for a single rule; call [`end`](Self::end) to register it.
///
/// Registration order is dispatch order: register more specific predicates
/// before more general ones.
pub struct RuleBuilder<'a> {
    router: &'a mut RouterBuilder,
    matcher: RuleMatcher,
    handlers: Vec<Arc<dyn MessageHandler>>,
    reenter: bool,
    asynchronous: bool,
}

impl<'a> RuleBuilder<'a> {
    pub(super) fn new(router: &'a mut RouterBuilder) -> Self {
        Self {
            router,
            matcher: RuleMatcher::default(),
            handlers: Vec::new(),
            reenter: false,
            asynchronous: false,
        }
    }

    /// Match only messages of the given kind.
    #[must_use]
    pub fn msg_tag(mut self, tag: MsgTag) -> Self {
        self.matcher.tag = Some(tag);
        self
    }

    /// Match only events of the given subtype (implies kind = event).
    #[must_use]
    pub fn event(mut self, event: EventKind) -> Self {
        self.matcher.tag = Some(MsgTag::Event);
        self.matcher.event = Some(event);
        self
    }

    /// Match only events carrying the given content key.
    #[must_use]
    pub fn event_key(mut self, key: &str) -> Self {
        self.matcher.event_key = Some(key.to_string());
        self
    }

    /// Additional custom predicate, ANDed with the other conditions.
    #[must_use]
    pub fn matcher<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&InboundMessage) -> bool + Send + Sync + 'static,
    {
        self.matcher.custom = Some(Arc::new(predicate));
        self
    }

    /// Append a handler; handlers run in registration order within the rule.
    #[must_use]
    pub fn handler<H>(self, handler: H) -> Self
    where
        H: MessageHandler + 'static,
    {
        self.handler_arc(Arc::new(handler))
    }

    /// Append an already-shared handler.
    #[must_use]
    pub fn handler_arc(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Mark the rule re-entrant: a match does not terminate dispatch.
    #[must_use]
    pub fn reenter(mut self) -> Self {
        self.reenter = true;
        self
    }

    /// Mark the rule asynchronous: handlers are submitted to the worker pool
    /// fire-and-forget and the rule's dispatch result is always `None`.
    #[must_use]
    pub fn asynchronous(mut self) -> Self {
        self.asynchronous = true;
        self
    }

    /// Register the rule with the router builder.
    pub fn end(self) {
        self.router.push(Rule {
            matcher: self.matcher,
            handlers: self.handlers,
            reenter: self.reenter,
            asynchronous: self.asynchronous,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_matcher_matches_everything() {
        let m = RuleMatcher::default();
        assert!(m.matches(&InboundMessage::text("u", "a", "hi")));
        assert!(m.matches(&InboundMessage::event("u", "a", EventKind::Subscribe, None)));
    }

    #[test]
    fn tag_and_event_conditions_are_anded() {
        let m = RuleMatcher {
            tag: Some(MsgTag::Event),
            event: Some(EventKind::Click),
            event_key: Some("MENU_1".into()),
            custom: None,
        };

        assert!(m.matches(&InboundMessage::event("u", "a", EventKind::Click, Some("MENU_1"))));
        assert!(!m.matches(&InboundMessage::event("u", "a", EventKind::Click, Some("MENU_2"))));
        assert!(!m.matches(&InboundMessage::event("u", "a", EventKind::View, Some("MENU_1"))));
        assert!(!m.matches(&InboundMessage::text("u", "a", "MENU_1")));
    }

    #[test]
    fn custom_predicate_applies() {
        let m = RuleMatcher {
            tag: Some(MsgTag::Text),
            custom: Some(Arc::new(|msg: &InboundMessage| {
                matches!(&msg.kind, MessageKind::Text { content } if content.starts_with('/'))
            })),
            ..RuleMatcher::default()
        };

        assert!(m.matches(&InboundMessage::text("u", "a", "/help")));
        assert!(!m.matches(&InboundMessage::text("u", "a", "help")));
    }
}
