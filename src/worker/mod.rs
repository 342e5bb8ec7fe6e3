//! Job Queue / Worker Pool
//!
//! One bounded concurrency domain for best-effort side work (cache
//! invalidation, deferred transaction creation). Constructed once at process
//! start and injected into the services that need it.

pub mod error;
pub mod job;
pub mod pool;

pub use error::PoolError;
pub use job::{Job, JobOutcome, JobResult};
pub use pool::{PoolStats, WorkerPool, RETRY_BASE_DELAY};
