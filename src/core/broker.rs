//! Broker façade: the single entry point for pushing jobs and managing the
//! worker pools.

use std::time::Duration;

use async_trait::async_trait;

use crate::core::{Job, JobError, JobRequest, Prefixer, WorkersList};

/// Routes job requests to the queue of their worker type and owns the pools
/// executing them.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Start one pool per configured worker type.
    ///
    /// # Errors
    ///
    /// `JobError::AlreadyStarted` on a second call.
    fn start_workers(&self, workers: WorkersList) -> Result<(), JobError>;

    /// Stop accepting jobs and wait for the running ones, up to `deadline`.
    ///
    /// # Errors
    ///
    /// `JobError::ShutdownDeadline` when jobs were still running at the
    /// deadline; they are abandoned in the `Running` state.
    async fn shutdown_workers(&self, deadline: Duration) -> Result<(), JobError>;

    /// Create a job for `db` and enqueue it, or fold it into a pending
    /// debounced duplicate.
    ///
    /// # Errors
    ///
    /// `UnknownWorker`, `ReservedWorker`, `Shutdown`, or a persistence
    /// failure.
    async fn push_job(&self, db: &dyn Prefixer, request: JobRequest) -> Result<Job, JobError>;

    /// Jobs of a worker type that are queued or running.
    ///
    /// # Errors
    ///
    /// `JobError::UnknownWorker`.
    fn worker_queue_len(&self, worker_type: &str) -> Result<usize, JobError>;

    /// Whether only the stack may push jobs of this type.
    ///
    /// # Errors
    ///
    /// `JobError::UnknownWorker`.
    fn worker_is_reserved(&self, worker_type: &str) -> Result<bool, JobError>;

    /// Configured worker types, sorted.
    fn workers_types(&self) -> Vec<String>;
}
