//! Worker Pool for Asynchronous Rules
//!
//! Fixed-size pool of tokio tasks fed from a bounded queue. Jobs are
//! submitted in registration order by the dispatching call; completion order
//! across workers is not guaranteed, which is exactly the fire-and-forget
//! contract asynchronous rules get.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// What to do when the job queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backpressure {
    /// Block the dispatching call until queue space frees up.
    #[default]
    Block,
    /// Drop the invocation. At-most-once still holds; the handler simply
    /// never runs for this message.
    Reject,
}

pub(super) type Job = BoxFuture<'static, ()>;

/// Bounded queue plus fixed worker set. Cheap to clone; all clones feed the
/// same queue.
#[derive(Clone)]
pub(super) struct WorkerPool {
    tx: mpsc::Sender<Job>,
    backpressure: Backpressure,
}

impl WorkerPool {
    /// Spawn `workers` tasks sharing a queue of depth `queue_depth`.
    ///
    /// Must be called from within a tokio runtime.
    pub(super) fn new(workers: usize, queue_depth: usize, backpressure: Backpressure) -> Self {
        let (tx, rx) = mpsc::channel::<Job>(queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));

        for worker in 0..workers.max(1) {
            let rx = Arc::clone(&rx);
            tokio::spawn(async move {
                debug!(worker, "async rule worker started");
                loop {
                    // Hold the lock only while receiving, not while running
                    // the job, so workers drain the queue concurrently.
                    let job = rx.lock().await.recv().await;
                    match job {
                        Some(job) => job.await,
                        None => break,
                    }
                }
                debug!(worker, "async rule worker stopped");
            });
        }

        Self { tx, backpressure }
    }

    /// Submit a job according to the backpressure policy. Returns `false`
    /// when the job was dropped.
    pub(super) async fn submit(&self, job: Job) -> bool {
        match self.backpressure {
            Backpressure::Block => self.tx.send(job).await.is_ok(),
            Backpressure::Reject => match self.tx.try_send(job) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("async rule queue full; invocation dropped");
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            },
        }
    }
}
