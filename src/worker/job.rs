//! Job values
//!
//! A job is one unit of asynchronous work: a re-invocable async task (it may
//! run several times under the retry policy), an optional retry predicate,
//! and an optional outcome channel. The pool never inspects a job's internal
//! logic.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::oneshot;

/// Result of one job attempt, and of the job overall.
pub type JobResult = Result<(), anyhow::Error>;

type TaskFn = dyn Fn() -> BoxFuture<'static, JobResult> + Send + Sync;
type RetryPredicate = dyn Fn(&anyhow::Error) -> bool + Send + Sync;

/// One unit of asynchronous work submitted to the worker pool.
pub struct Job {
    id: String,
    task: Arc<TaskFn>,
    retry_if: Option<Arc<RetryPredicate>>,
    outcome_tx: Option<oneshot::Sender<JobResult>>,
}

impl Job {
    /// Create a job from a caller-supplied id and an async task.
    ///
    /// The id is used for log correlation only; uniqueness is not enforced.
    /// The task must be re-invocable: each retry calls it again from scratch.
    pub fn new<F, Fut>(id: impl Into<String>, task: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        Job {
            id: id.into(),
            task: Arc::new(move || task().boxed()),
            retry_if: None,
            outcome_tx: None,
        }
    }

    /// Restrict retries to failures the predicate accepts. Without a
    /// predicate every failure is retried up to the pool's budget.
    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&anyhow::Error) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Some(Arc::new(predicate));
        self
    }

    /// Attach an outcome channel and return its receiving half.
    ///
    /// The final result (after all retries) is delivered exactly once. If
    /// the pool abandons the job during forced shutdown, the channel closes
    /// without a value.
    pub fn outcome(&mut self) -> JobOutcome {
        let (tx, rx) = oneshot::channel();
        self.outcome_tx = Some(tx);
        JobOutcome { rx }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn run(&self) -> BoxFuture<'static, JobResult> {
        (self.task)()
    }

    pub(crate) fn should_retry(&self, err: &anyhow::Error) -> bool {
        match &self.retry_if {
            Some(predicate) => predicate(err),
            None => true,
        }
    }

    /// Deliver the final result to the outcome channel, if one was attached.
    pub(crate) fn finish(self, result: JobResult) {
        if let Some(tx) = self.outcome_tx {
            // Receiver may have been dropped; that is the caller's choice.
            let _ = tx.send(result);
        }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("has_retry_predicate", &self.retry_if.is_some())
            .field("has_outcome", &self.outcome_tx.is_some())
            .finish()
    }
}

/// Receiving half of a job's outcome channel.
pub struct JobOutcome {
    rx: oneshot::Receiver<JobResult>,
}

impl JobOutcome {
    /// Wait for the job's final result. Returns `None` if the job was
    /// abandoned before completion (forced pool shutdown).
    pub async fn wait(self) -> Option<JobResult> {
        self.rx.await.ok()
    }
}
