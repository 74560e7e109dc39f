//! Message Handler Trait

use async_trait::async_trait;
use wx_common::{InboundMessage, OutboundMessage};

use super::context::DispatchContext;

/// Application-supplied processing for a dispatched message.
///
/// Handlers receive the inbound message and the per-dispatch context, and
/// return an optional reply. Returning `Ok(None)` is a valid "no reply"
/// outcome; returning `Err` aborts the remaining handlers of the same rule
/// (but never the router itself).
///
/// Implementations must be `Send + Sync`: the same handler instance serves
/// unbounded concurrent dispatches.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        msg: &InboundMessage,
        ctx: &mut DispatchContext,
    ) -> anyhow::Result<Option<OutboundMessage>>;
}
