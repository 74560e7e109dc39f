//! Router Concurrency Tests
//!
//! The rule table is immutable after build, so one router instance behind
//! an `Arc` must serve many concurrent dispatches without interference.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use wx_common::{EventKind, InboundMessage, MsgTag, OutboundMessage};
use wx_server::router::{DispatchContext, MessageHandler, MessageRouter};

struct CountingEcho {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl MessageHandler for CountingEcho {
    async fn handle(
        &self,
        msg: &InboundMessage,
        ctx: &mut DispatchContext,
    ) -> anyhow::Result<Option<OutboundMessage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Prove the context is private to this dispatch: it must never
        // already contain our marker.
        assert!(ctx.get("marker").is_none());
        ctx.insert("marker", true);
        Ok(Some(OutboundMessage::text_reply(msg, "echo")))
    }
}

#[tokio::test]
async fn concurrent_dispatches_are_independent() {
    let calls = Arc::new(AtomicUsize::new(0));

    let mut builder = MessageRouter::builder();
    builder
        .rule()
        .msg_tag(MsgTag::Text)
        .handler(CountingEcho {
            calls: Arc::clone(&calls),
        })
        .end();
    let router = Arc::new(builder.build());

    let mut tasks = Vec::new();
    for i in 0..100 {
        let router = Arc::clone(&router);
        tasks.push(tokio::spawn(async move {
            let msg = InboundMessage::text(&format!("user{i}"), "app1", "ping");
            router.route(msg).await
        }));
    }

    for (i, task) in tasks.into_iter().enumerate() {
        let outcome = task.await.expect("task panicked");
        match outcome.reply {
            Some(OutboundMessage::Text { to_user, .. }) => {
                assert_eq!(to_user, format!("user{i}"));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }
    assert_eq!(calls.load(Ordering::SeqCst), 100);
}

#[tokio::test]
async fn async_handlers_run_at_most_once_per_dispatch() {
    let calls = Arc::new(AtomicUsize::new(0));

    let mut builder = MessageRouter::builder().async_pool(4, 128);
    builder
        .rule()
        .event(EventKind::Subscribe)
        .handler(CountingEcho {
            calls: Arc::clone(&calls),
        })
        .asynchronous()
        .end();
    let router = Arc::new(builder.build());

    for _ in 0..20 {
        let outcome = router
            .route(InboundMessage::event("u1", "app1", EventKind::Subscribe, None))
            .await;
        assert!(outcome.reply.is_none());
    }

    // 20 dispatches, one fire-and-forget invocation each.
    for _ in 0..100 {
        if calls.load(Ordering::SeqCst) == 20 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected 20 async invocations, saw {}",
        calls.load(Ordering::SeqCst)
    );
}
