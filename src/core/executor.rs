//! Worker handler trait and the context handed to each execution.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;

use crate::core::{Hub, Job, JobError, Prefixer, RealtimeEvent, Verb, JOBS_LOGS_DOCTYPE};

/// Failure reported by a handler.
///
/// Retryable failures are attempted again while the job has attempts left;
/// permanent ones end the job immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    message: String,
    retryable: bool,
}

impl HandlerError {
    /// Retryable failure.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), retryable: true }
    }

    /// Failure that must not be retried.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self { message: message.into(), retryable: false }
    }

    /// Human-readable reason, stored as the job error.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether another attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HandlerError {}

impl From<JobError> for HandlerError {
    fn from(err: JobError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{err:#}"))
    }
}

/// Task code run for one worker type.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use job_broker::core::{HandlerError, WorkerContext, WorkerHandler};
///
/// struct Thumbnail;
///
/// #[derive(serde::Deserialize)]
/// struct ThumbnailMessage {
///     file_id: String,
/// }
///
/// #[async_trait]
/// impl WorkerHandler for Thumbnail {
///     async fn execute(&self, ctx: WorkerContext) -> Result<(), HandlerError> {
///         let msg: ThumbnailMessage = ctx.unmarshal_message()?;
///         ctx.info(format!("resizing {}", msg.file_id));
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait WorkerHandler: Send + Sync + 'static {
    /// Run one attempt of a job.
    ///
    /// The future is dropped when the attempt exceeds its timeout.
    async fn execute(&self, ctx: WorkerContext) -> Result<(), HandlerError>;
}

/// Adapter turning an async closure into a [`WorkerHandler`].
pub struct HandlerFn<F>(pub F);

#[async_trait]
impl<F, Fut> WorkerHandler for HandlerFn<F>
where
    F: Fn(WorkerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn execute(&self, ctx: WorkerContext) -> Result<(), HandlerError> {
        (self.0)(ctx).await
    }
}

/// Wrap an async closure as a shared handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn WorkerHandler>
where
    F: Fn(WorkerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(HandlerFn(f))
}

/// Severity of a handler log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Debug.
    Debug,
    /// Info.
    Info,
    /// Warning.
    Warn,
    /// Error.
    Error,
}

/// Everything a handler sees of the job it runs.
#[derive(Clone)]
pub struct WorkerContext {
    job: Job,
    attempt: u32,
    worker_id: String,
    hub: Arc<dyn Hub>,
    cancel: watch::Receiver<bool>,
}

impl WorkerContext {
    pub(crate) fn new(
        job: Job,
        attempt: u32,
        worker_id: String,
        hub: Arc<dyn Hub>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self { job, attempt, worker_id, hub, cancel }
    }

    /// Snapshot of the job taken before this attempt.
    #[must_use]
    pub const fn job(&self) -> &Job {
        &self.job
    }

    /// 1-based attempt number.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Identifier of the executing slot, e.g. `thumbnail/2`.
    #[must_use]
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Decode the job message.
    ///
    /// # Errors
    ///
    /// `MessageNil` or `MessageUnmarshal`.
    pub fn unmarshal_message<T: DeserializeOwned>(&self) -> Result<T, JobError> {
        self.job.message.unmarshal()
    }

    /// Decode the triggering realtime event.
    ///
    /// # Errors
    ///
    /// `MessageNil` or `MessageUnmarshal`.
    pub fn unmarshal_event<T: DeserializeOwned>(&self) -> Result<T, JobError> {
        self.job.event.unmarshal()
    }

    /// Decode the triggering webhook body.
    ///
    /// # Errors
    ///
    /// `MessageNil` or `MessageUnmarshal`.
    pub fn unmarshal_payload<T: DeserializeOwned>(&self) -> Result<T, JobError> {
        self.job.payload.unmarshal()
    }

    /// Whether the pool is shutting down.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves once the pool starts shutting down.
    pub async fn cancelled(&self) {
        let mut cancel = self.cancel.clone();
        // A closed channel means the broker is gone, which also cancels.
        let _ = cancel.wait_for(|stop| *stop).await;
    }

    /// Log a line for this job, forwarded to the tenant hub when the job asks
    /// for it.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        let job = &self.job;
        match level {
            LogLevel::Debug => tracing::debug!(job_id = %job.job_id, worker = %job.worker_type, "{message}"),
            LogLevel::Info => tracing::info!(job_id = %job.job_id, worker = %job.worker_type, "{message}"),
            LogLevel::Warn => tracing::warn!(job_id = %job.job_id, worker = %job.worker_type, "{message}"),
            LogLevel::Error => tracing::error!(job_id = %job.job_id, worker = %job.worker_type, "{message}"),
        }
        if !job.forward_logs {
            return;
        }
        self.hub.publish(
            job,
            RealtimeEvent {
                prefix: job.db_prefix().to_owned(),
                verb: Verb::Notified,
                doc_type: JOBS_LOGS_DOCTYPE.to_owned(),
                doc_id: job.job_id.clone(),
                doc: json!({
                    "level": level,
                    "message": message,
                    "worker": job.worker_type,
                    "time": Utc::now(),
                }),
            },
        );
    }

    /// Log at info level.
    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    /// Log at warn level.
    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    /// Log at error level.
    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("job_id", &self.job.job_id)
            .field("attempt", &self.attempt)
            .field("worker_id", &self.worker_id)
            .finish_non_exhaustive()
    }
}
