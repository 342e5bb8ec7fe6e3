//! Worker Pool
//!
//! Bounded-concurrency executor for best-effort side work: a fixed set of
//! workers pulling from a bounded queue, linear retry backoff, cooperative
//! drain on shutdown with forced cancellation at the timeout, and
//! mutex-guarded statistics.
//!
//! State machine: `Stopped -> Running -> Draining -> Stopped`. A pool is
//! single-use; there is no transition back to `Running`.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::error::PoolError;
use super::job::{Job, JobResult};

/// Base delay for retry backoff; attempt `n` sleeps `n * RETRY_BASE_DELAY`.
/// Linear, not exponential: delays grow as 100ms, 200ms, 300ms, ...
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Snapshot of pool counters and gauges. Eventually consistent with
/// in-flight work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Jobs accepted by `submit`/`submit_blocking` since construction.
    pub submitted_jobs: u64,
    /// Jobs that eventually succeeded.
    pub completed_jobs: u64,
    /// Jobs that exhausted their attempts (or hit a non-retryable error).
    pub failed_jobs: u64,
    /// Workers currently executing a job.
    pub active_workers: usize,
    /// Jobs waiting in the queue, including submissions currently parked
    /// for space. Stays accurate while a shutdown drains the queue.
    pub queued_jobs: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    Stopped,
    Running,
    Draining,
}

/// Counters, gauges and the state machine, all behind one mutex.
struct StateInner {
    state: PoolState,
    started: bool,
    submitted: u64,
    completed: u64,
    failed: u64,
    active: usize,
    queued: usize,
}

struct Shared {
    state: StdMutex<StateInner>,
    cancel_tx: watch::Sender<bool>,
    drain_tx: watch::Sender<bool>,
    max_retries: u32,
}

/// Bounded-concurrency job executor.
pub struct WorkerPool {
    worker_count: usize,
    shared: Arc<Shared>,
    queue_tx: StdMutex<Option<mpsc::Sender<Job>>>,
    queue_rx: Arc<TokioMutex<mpsc::Receiver<Job>>>,
    handles: StdMutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Construct a stopped pool with a bounded queue of `queue_capacity`
    /// jobs. Each job is attempted up to `max_retries + 1` times.
    pub fn new(worker_count: usize, queue_capacity: usize, max_retries: u32) -> Self {
        assert!(worker_count > 0, "worker_count must be at least 1");
        assert!(queue_capacity > 0, "queue_capacity must be at least 1");

        let (queue_tx, queue_rx) = mpsc::channel(queue_capacity);
        let (cancel_tx, _) = watch::channel(false);
        let (drain_tx, _) = watch::channel(false);

        info!(
            workers = worker_count,
            queue_capacity, max_retries, "Worker pool created"
        );

        WorkerPool {
            worker_count,
            shared: Arc::new(Shared {
                state: StdMutex::new(StateInner {
                    state: PoolState::Stopped,
                    started: false,
                    submitted: 0,
                    completed: 0,
                    failed: 0,
                    active: 0,
                    queued: 0,
                }),
                cancel_tx,
                drain_tx,
                max_retries,
            }),
            queue_tx: StdMutex::new(Some(queue_tx)),
            queue_rx: Arc::new(TokioMutex::new(queue_rx)),
            handles: StdMutex::new(Vec::new()),
        }
    }

    /// Launch the workers. A pool starts at most once; calling `start` on a
    /// pool that already ran is a logged no-op.
    pub fn start(&self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.started {
                warn!("Worker pool already started; ignoring");
                return;
            }
            state.started = true;
            state.state = PoolState::Running;
        }

        let mut handles = self.handles.lock().unwrap();
        for worker_id in 0..self.worker_count {
            let queue = self.queue_rx.clone();
            let cancel = self.shared.cancel_tx.subscribe();
            let shared = self.shared.clone();
            handles.push(tokio::spawn(worker_loop(worker_id, queue, cancel, shared)));
        }

        info!(workers = self.worker_count, "Worker pool started");
    }

    /// Non-blocking enqueue. Fails fast with [`PoolError::QueueFull`] when
    /// the queue has no capacity and [`PoolError::Cancelled`] when the pool
    /// is not running.
    pub fn submit(&self, job: Job) -> Result<(), PoolError> {
        if !self.is_running() {
            return Err(PoolError::Cancelled);
        }

        let guard = self.queue_tx.lock().unwrap();
        let Some(tx) = guard.as_ref() else {
            return Err(PoolError::Cancelled);
        };

        // The gauge is raised before the send so the dequeue-side decrement
        // can never observe it at zero.
        self.add_queued();
        let job_id = job.id().to_string();
        match tx.try_send(job) {
            Ok(()) => {
                drop(guard);
                self.record_submitted();
                debug!(job_id = %job_id, "Job enqueued");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                self.sub_queued();
                warn!(job_id = %job.id(), "Queue full, job rejected");
                Err(PoolError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.sub_queued();
                Err(PoolError::Cancelled)
            }
        }
    }

    /// Enqueue, waiting for queue space. Returns [`PoolError::Cancelled`] if
    /// the pool stops accepting work while waiting: a shutdown entered while
    /// the caller is parked cancels the submission rather than letting the
    /// cloned sender slip one more job past the closed queue.
    pub async fn submit_blocking(&self, job: Job) -> Result<(), PoolError> {
        if !self.is_running() {
            return Err(PoolError::Cancelled);
        }

        // Clone the sender so the lock is not held across the await.
        let tx = {
            let guard = self.queue_tx.lock().unwrap();
            guard.as_ref().cloned()
        };
        let Some(tx) = tx else {
            return Err(PoolError::Cancelled);
        };

        let mut cancel = self.shared.cancel_tx.subscribe();
        let mut drain = self.shared.drain_tx.subscribe();
        // Subscribe-then-check closes the race with a shutdown that signals
        // between the is_running check and the select below.
        if *drain.borrow() {
            return Err(PoolError::Cancelled);
        }

        let job_id = job.id().to_string();
        self.add_queued();

        let result = tokio::select! {
            _ = cancel.changed() => Err(PoolError::Cancelled),
            _ = drain.changed() => Err(PoolError::Cancelled),
            sent = tx.send(job) => match sent {
                Ok(()) => {
                    self.record_submitted();
                    debug!(job_id = %job_id, "Job enqueued (blocking mode)");
                    Ok(())
                }
                Err(_) => Err(PoolError::Cancelled),
            },
        };

        if result.is_err() {
            self.sub_queued();
        }
        result
    }

    /// Stop accepting jobs, drain the queue, and wait for workers up to
    /// `timeout`. On expiry all outstanding work is force-cancelled (jobs
    /// may be abandoned mid-retry) and [`PoolError::ShutdownTimeout`] is
    /// returned. Either way the pool ends `Stopped` and cannot restart.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), PoolError> {
        info!("Worker pool shutting down");
        {
            let mut state = self.shared.state.lock().unwrap();
            state.state = PoolState::Draining;
        }

        // Wake callers parked in submit_blocking; their cloned senders must
        // not enqueue anything once the drain has begun.
        let _ = self.shared.drain_tx.send(true);

        // Closing the queue: dropping the only long-lived sender lets
        // workers drain remaining jobs and exit on end-of-input.
        {
            let mut guard = self.queue_tx.lock().unwrap();
            guard.take();
        }

        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock().unwrap();
            guard.drain(..).collect()
        };

        let drain = futures::future::join_all(handles);
        let result = match tokio::time::timeout(timeout, drain).await {
            Ok(_) => {
                info!("All workers drained");
                Ok(())
            }
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Shutdown timeout elapsed, force-cancelling workers"
                );
                let _ = self.shared.cancel_tx.send(true);
                Err(PoolError::ShutdownTimeout)
            }
        };

        {
            let mut state = self.shared.state.lock().unwrap();
            state.state = PoolState::Stopped;
        }

        result
    }

    /// Consistent snapshot of counters plus the queue depth.
    pub fn stats(&self) -> PoolStats {
        // The depth gauge is maintained on both sides of the channel
        // (raised at submission, lowered at dequeue), so it keeps reporting
        // undrained jobs after shutdown has taken the sender away.
        let state = self.shared.state.lock().unwrap();
        PoolStats {
            submitted_jobs: state.submitted,
            completed_jobs: state.completed,
            failed_jobs: state.failed,
            active_workers: state.active,
            queued_jobs: state.queued,
        }
    }

    fn is_running(&self) -> bool {
        self.shared.state.lock().unwrap().state == PoolState::Running
    }

    fn record_submitted(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.submitted += 1;
    }

    fn add_queued(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.queued += 1;
    }

    fn sub_queued(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.queued -= 1;
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<TokioMutex<mpsc::Receiver<Job>>>,
    mut cancel: watch::Receiver<bool>,
    shared: Arc<Shared>,
) {
    debug!(worker = worker_id, "Worker started");

    loop {
        let job = {
            let mut rx = queue.lock().await;
            tokio::select! {
                _ = cancel.changed() => {
                    debug!(worker = worker_id, "Worker cancelled");
                    return;
                }
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => {
                        // Queue closed and drained: graceful end-of-input.
                        debug!(worker = worker_id, "Queue closed, worker exiting");
                        return;
                    }
                },
            }
        };

        {
            let mut state = shared.state.lock().unwrap();
            state.queued -= 1;
        }

        execute_job(worker_id, job, &mut cancel, &shared).await;
    }
}

/// Run one job to its final outcome under the retry policy.
///
/// A cancel signal abandons the job wherever it is: mid-attempt, or during a
/// backoff sleep. Abandoned jobs count neither as completed nor failed, and
/// their outcome channel closes without a value.
async fn execute_job(
    worker_id: usize,
    job: Job,
    cancel: &mut watch::Receiver<bool>,
    shared: &Shared,
) {
    {
        let mut state = shared.state.lock().unwrap();
        state.active += 1;
    }

    let started = Instant::now();
    let max_retries = shared.max_retries;
    let mut attempt: u32 = 0;

    let result: JobResult = loop {
        if attempt > 0 {
            warn!(
                worker = worker_id,
                job_id = %job.id(),
                attempt,
                "Retrying job"
            );
            let delay = RETRY_BASE_DELAY * attempt;
            tokio::select! {
                _ = cancel.changed() => {
                    release_active(shared);
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let attempt_result = tokio::select! {
            _ = cancel.changed() => {
                release_active(shared);
                return;
            }
            res = job.run() => res,
        };

        match attempt_result {
            Ok(()) => break Ok(()),
            Err(e) => {
                if !job.should_retry(&e) {
                    break Err(e);
                }
                if attempt >= max_retries {
                    break Err(e);
                }
                attempt += 1;
            }
        }
    };

    let elapsed = started.elapsed();
    {
        let mut state = shared.state.lock().unwrap();
        state.active -= 1;
        match &result {
            Ok(()) => state.completed += 1,
            Err(_) => state.failed += 1,
        }
    }

    match &result {
        Ok(()) => debug!(
            worker = worker_id,
            job_id = %job.id(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Job completed"
        ),
        Err(e) => error!(
            worker = worker_id,
            job_id = %job.id(),
            elapsed_ms = elapsed.as_millis() as u64,
            error = %e,
            "Job failed after all attempts"
        ),
    }

    job.finish(result);
}

fn release_active(shared: &Shared) {
    let mut state = shared.state.lock().unwrap();
    state.active -= 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_pool_is_stopped_with_zero_stats() {
        let pool = WorkerPool::new(2, 8, 1);
        let stats = pool.stats();
        assert_eq!(stats, PoolStats::default());
        assert!(!pool.is_running());
    }

    #[tokio::test]
    async fn test_submit_before_start_is_cancelled() {
        let pool = WorkerPool::new(1, 1, 0);
        let job = Job::new("early", || async { Ok(()) });
        assert_eq!(pool.submit(job), Err(PoolError::Cancelled));

        let job = Job::new("early-blocking", || async { Ok(()) });
        assert_eq!(pool.submit_blocking(job).await, Err(PoolError::Cancelled));
    }

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let pool = WorkerPool::new(1, 1, 0);
        pool.start();
        pool.start();
        assert!(pool.handles.lock().unwrap().len() == 1);
        pool.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_cancelled() {
        let pool = WorkerPool::new(1, 4, 0);
        pool.start();
        pool.shutdown(Duration::from_secs(1)).await.unwrap();

        let job = Job::new("late", || async { Ok(()) });
        assert_eq!(pool.submit(job), Err(PoolError::Cancelled));
    }
}
