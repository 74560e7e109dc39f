//! Message Router
//!
//! Owns an ordered, immutable rule table and dispatches one decrypted
//! message through it deterministically. Rule evaluation order is fixed at
//! registration time; first match wins unless the matched rule is marked
//! re-entrant. The router itself holds no mutable state after `build()`, so
//! a single instance behind an `Arc` serves unbounded concurrent dispatches.

mod context;
mod handler;
mod pool;
mod rule;

use thiserror::Error;
use tracing::warn;
use wx_common::{InboundMessage, OutboundMessage};

pub use context::DispatchContext;
pub use handler::MessageHandler;
pub use pool::Backpressure;
pub use rule::{RuleBuilder, RuleMatcher};

use pool::WorkerPool;
use rule::Rule;

/// A handler error captured during dispatch, identified by rule and handler
/// position in registration order.
#[derive(Debug, Error)]
#[error("handler {handler} of rule {rule} failed: {source}")]
pub struct HandlerFailure {
    pub rule: usize,
    pub handler: usize,
    #[source]
    pub source: anyhow::Error,
}

/// Result of routing one message.
///
/// `reply: None` with empty `failures` is the defined "no reply" outcome
/// (no rule matched, or the terminal rule produced no output) - not an
/// error. Whether `failures` become an HTTP error is the caller's policy.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub reply: Option<OutboundMessage>,
    pub failures: Vec<HandlerFailure>,
}

/// Ordered rule table plus optional worker pool for asynchronous rules.
pub struct MessageRouter {
    rules: Vec<Rule>,
    pool: Option<WorkerPool>,
}

impl MessageRouter {
    #[must_use]
    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    /// Dispatch one message through the rule table.
    ///
    /// Iterates rules in registration order. A matching non-re-entrant rule
    /// terminates dispatch and its final handler output becomes the result;
    /// a matching re-entrant rule lets iteration continue, always feeding
    /// the original message forward (inter-handler data travels through the
    /// per-dispatch context instead). A handler error aborts only the
    /// remaining handlers of its own rule and is recorded in the outcome.
    pub async fn route(&self, msg: InboundMessage) -> DispatchOutcome {
        let mut ctx = DispatchContext::new();
        let mut failures = Vec::new();
        // Latest reply produced by a re-entrant rule, used when iteration
        // runs off the end of the table without hitting a terminal rule.
        let mut carried_reply: Option<OutboundMessage> = None;

        for (rule_idx, rule) in self.rules.iter().enumerate() {
            if !rule.matcher.matches(&msg) {
                continue;
            }

            if rule.asynchronous {
                self.submit_async(rule_idx, rule, &msg).await;
                if rule.reenter {
                    continue;
                }
                return DispatchOutcome {
                    reply: None,
                    failures,
                };
            }

            let mut reply = None;
            for (handler_idx, handler) in rule.handlers.iter().enumerate() {
                match handler.handle(&msg, &mut ctx).await {
                    Ok(out) => reply = out,
                    Err(source) => {
                        warn!(
                            rule = rule_idx,
                            handler = handler_idx,
                            error = %source,
                            "handler failed; skipping remaining handlers of this rule"
                        );
                        failures.push(HandlerFailure {
                            rule: rule_idx,
                            handler: handler_idx,
                            source,
                        });
                        reply = None;
                        break;
                    }
                }
            }

            if !rule.reenter {
                return DispatchOutcome { reply, failures };
            }
            if reply.is_some() {
                carried_reply = reply;
            }
        }

        DispatchOutcome {
            reply: carried_reply,
            failures,
        }
    }

    /// Fire-and-forget submission of a rule's handlers to the worker pool.
    ///
    /// Handlers are submitted in registration order within a single job, so
    /// they still run in order and at most once even though completion is
    /// not awaited.
    async fn submit_async(&self, rule_idx: usize, rule: &Rule, msg: &InboundMessage) {
        let Some(pool) = &self.pool else {
            warn!(
                rule = rule_idx,
                "asynchronous rule matched but no worker pool is configured; invocation dropped"
            );
            return;
        };

        let handlers = rule.handlers.clone();
        let msg = msg.clone();
        let accepted = pool
            .submit(Box::pin(async move {
                let mut ctx = DispatchContext::new();
                for (handler_idx, handler) in handlers.iter().enumerate() {
                    if let Err(source) = handler.handle(&msg, &mut ctx).await {
                        warn!(
                            rule = rule_idx,
                            handler = handler_idx,
                            error = %source,
                            "asynchronous handler failed"
                        );
                        break;
                    }
                }
            }))
            .await;

        if !accepted {
            warn!(rule = rule_idx, "asynchronous rule invocation dropped");
        }
    }
}

/// Builds the immutable rule table. Rules dispatch in the order they were
/// registered; register specific predicates before catch-alls.
#[derive(Default)]
pub struct RouterBuilder {
    rules: Vec<Rule>,
    pool_size: Option<usize>,
    queue_depth: usize,
    backpressure: Backpressure,
}

impl RouterBuilder {
    /// Start registering a new rule; finish it with [`RuleBuilder::end`].
    pub fn rule(&mut self) -> RuleBuilder<'_> {
        RuleBuilder::new(self)
    }

    /// Configure the worker pool used by asynchronous rules.
    ///
    /// Without this, a pool of [`DEFAULT_POOL_SIZE`] workers is created only
    /// when at least one asynchronous rule is registered.
    #[must_use]
    pub fn async_pool(mut self, workers: usize, queue_depth: usize) -> Self {
        self.pool_size = Some(workers);
        self.queue_depth = queue_depth;
        self
    }

    /// Backpressure policy when the asynchronous queue is full.
    #[must_use]
    pub fn backpressure(mut self, policy: Backpressure) -> Self {
        self.backpressure = policy;
        self
    }

    /// Freeze the rule table.
    ///
    /// Spawns the worker pool if any rule is asynchronous, so this must run
    /// inside a tokio runtime in that case.
    #[must_use]
    pub fn build(self) -> MessageRouter {
        let needs_pool = self.rules.iter().any(|r| r.asynchronous);
        let pool = needs_pool.then(|| {
            WorkerPool::new(
                self.pool_size.unwrap_or(DEFAULT_POOL_SIZE),
                if self.queue_depth == 0 {
                    DEFAULT_QUEUE_DEPTH
                } else {
                    self.queue_depth
                },
                self.backpressure,
            )
        });

        MessageRouter {
            rules: self.rules,
            pool,
        }
    }

    pub(crate) fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }
}

/// Worker count when asynchronous rules exist but no pool was configured.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Queue depth when asynchronous rules exist but no pool was configured.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;
