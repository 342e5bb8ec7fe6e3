//! Worker pool error types

use thiserror::Error;

/// Submission and shutdown failures of the worker pool.
///
/// Job-internal failures never appear here: they are reported through the
/// job's outcome channel and the pool statistics only.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    #[error("job queue is full")]
    QueueFull,

    #[error("worker pool is not accepting jobs")]
    Cancelled,

    #[error("worker pool shutdown timed out")]
    ShutdownTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(PoolError::QueueFull.to_string(), "job queue is full");
        assert_eq!(
            PoolError::ShutdownTimeout.to_string(),
            "worker pool shutdown timed out"
        );
    }
}
