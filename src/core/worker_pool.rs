//! Bounded-concurrency execution of the jobs of one worker type.
//!
//! A `WorkerPool` runs `concurrency` slots as independent tokio tasks. Each
//! slot pulls the next job from the worker type's queue and drives it to a
//! terminal state:
//!
//! - `ack_consumed` before every attempt
//! - the handler runs in its own task, aborted once the attempt's timeout
//!   expires; a panic counts as a failure
//! - failures are retried sequentially in the same slot after an exponential
//!   delay while attempts remain, then the job is nacked with the last reason
//! - `max_exec_time` bounds the whole run: every attempt's timeout shrinks to
//!   what is left of it and no attempt starts once it is spent
//!
//! Slots stop picking jobs once the shutdown signal is raised; a job already
//! picked is still driven to its end.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::{HandlerError, Job, JobQueue, Services, WorkerContext, WorkerHandler};

/// Attempt budget used when neither the job nor the worker sets one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Attempts used when neither the job nor the worker sets a count.
pub const DEFAULT_MAX_EXEC_COUNT: u32 = 1;
/// Base delay between two attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(60);
/// Upper bound of the exponential retry delay.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

/// Runtime configuration of one worker type.
#[derive(Clone)]
pub struct WorkerConfig {
    /// Worker type name.
    pub worker_type: String,
    /// Number of execution slots; zero disables execution.
    pub concurrency: usize,
    /// Attempts per job unless the job overrides it.
    pub max_exec_count: u32,
    /// Budget of one attempt unless the job overrides it.
    pub timeout: Duration,
    /// Base delay before a retry.
    pub retry_delay: Duration,
    /// Total time a job may spend across its attempts; each attempt's
    /// timeout is capped by what remains of it.
    pub max_exec_time: Option<Duration>,
    /// Only the stack may push jobs of this type.
    pub reserved: bool,
    /// Task code.
    pub handler: Arc<dyn WorkerHandler>,
}

impl WorkerConfig {
    /// Configuration with platform defaults and a single slot.
    pub fn new(worker_type: impl Into<String>, handler: Arc<dyn WorkerHandler>) -> Self {
        Self {
            worker_type: worker_type.into(),
            concurrency: 1,
            max_exec_count: DEFAULT_MAX_EXEC_COUNT,
            timeout: DEFAULT_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_exec_time: None,
            reserved: false,
            handler,
        }
    }

    /// Set the number of slots.
    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the default attempt count.
    #[must_use]
    pub const fn with_max_exec_count(mut self, max_exec_count: u32) -> Self {
        self.max_exec_count = max_exec_count;
        self
    }

    /// Set the default attempt budget.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the base retry delay.
    #[must_use]
    pub const fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Cap the total execution time of a job.
    #[must_use]
    pub const fn with_max_exec_time(mut self, max_exec_time: Duration) -> Self {
        self.max_exec_time = Some(max_exec_time);
        self
    }

    /// Budget left for the next attempt of a job started `elapsed` ago.
    ///
    /// `None` once `max_exec_time` is spent.
    #[must_use]
    pub fn attempt_budget(&self, timeout: Duration, elapsed: Duration) -> Option<Duration> {
        match self.max_exec_time {
            None => Some(timeout),
            Some(limit) => {
                let left = limit.saturating_sub(elapsed);
                (!left.is_zero()).then(|| timeout.min(left))
            }
        }
    }

    /// Reserve the type for the stack.
    #[must_use]
    pub const fn reserved(mut self) -> Self {
        self.reserved = true;
        self
    }

    /// Attempts allowed for `job`.
    #[must_use]
    pub fn max_exec_count_for(&self, job: &Job) -> u32 {
        job.options
            .map(|opts| opts.max_exec_count)
            .filter(|count| *count > 0)
            .unwrap_or(self.max_exec_count)
            .max(1)
    }

    /// Budget of one attempt of `job`.
    #[must_use]
    pub fn timeout_for(&self, job: &Job) -> Duration {
        job.options
            .map(|opts| opts.timeout)
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or(self.timeout)
    }

    /// Delay before attempt `attempt + 1`, doubling from the base delay.
    #[must_use]
    pub fn retry_delay_for(&self, attempt: u32) -> Duration {
        let factor = 1_u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.retry_delay.saturating_mul(factor).min(MAX_RETRY_DELAY)
    }
}

impl fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("worker_type", &self.worker_type)
            .field("concurrency", &self.concurrency)
            .field("max_exec_count", &self.max_exec_count)
            .field("timeout", &self.timeout)
            .field("retry_delay", &self.retry_delay)
            .field("max_exec_time", &self.max_exec_time)
            .field("reserved", &self.reserved)
            .finish_non_exhaustive()
    }
}

/// Worker types handed to `start_workers`.
pub type WorkersList = Vec<WorkerConfig>;

/// Statistics about one pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of slots.
    pub worker_count: usize,
    /// Jobs currently held by a slot.
    pub running_jobs: u64,
    /// Jobs waiting in the queue.
    pub queued_jobs: u64,
    /// Jobs that ended `Done`.
    pub completed_jobs: u64,
    /// Jobs that ended `Errored`.
    pub errored_jobs: u64,
    /// Attempts that were retried.
    pub retried_attempts: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub running_jobs: AtomicU64,
    pub completed_jobs: AtomicU64,
    pub errored_jobs: AtomicU64,
    pub retried_attempts: AtomicU64,
}

impl PoolCounters {
    fn snapshot(&self, worker_count: usize, queued_jobs: usize) -> PoolStats {
        PoolStats {
            worker_count,
            running_jobs: self.running_jobs.load(Ordering::Relaxed),
            queued_jobs: queued_jobs as u64,
            completed_jobs: self.completed_jobs.load(Ordering::Relaxed),
            errored_jobs: self.errored_jobs.load(Ordering::Relaxed),
            retried_attempts: self.retried_attempts.load(Ordering::Relaxed),
        }
    }
}

/// Shared state of every slot of a pool.
struct Slot {
    worker_id: String,
    config: Arc<WorkerConfig>,
    queue: Arc<dyn JobQueue>,
    services: Services,
    counters: Arc<PoolCounters>,
    shutdown: watch::Receiver<bool>,
}

/// Execution slots of one worker type.
pub struct WorkerPool {
    config: Arc<WorkerConfig>,
    queue: Arc<dyn JobQueue>,
    counters: Arc<PoolCounters>,
    slots: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `config.concurrency` slots on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn start(
        config: WorkerConfig,
        queue: Arc<dyn JobQueue>,
        services: Services,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let config = Arc::new(config);
        let counters = Arc::new(PoolCounters::default());

        let slots = (0..config.concurrency)
            .map(|idx| {
                let slot = Slot {
                    worker_id: format!("{}/{idx}", config.worker_type),
                    config: Arc::clone(&config),
                    queue: Arc::clone(&queue),
                    services: services.clone(),
                    counters: Arc::clone(&counters),
                    shutdown: shutdown.clone(),
                };
                tokio::spawn(slot.run())
            })
            .collect();

        info!(
            worker = %config.worker_type,
            concurrency = config.concurrency,
            max_exec_count = config.max_exec_count,
            timeout = ?config.timeout,
            "worker pool started"
        );

        Self {
            config,
            queue,
            counters,
            slots: Mutex::new(slots),
        }
    }

    /// Worker type served by this pool.
    #[must_use]
    pub fn worker_type(&self) -> &str {
        &self.config.worker_type
    }

    /// Configuration of the pool.
    #[must_use]
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Jobs currently held by a slot.
    #[must_use]
    pub fn running(&self) -> usize {
        usize::try_from(self.counters.running_jobs.load(Ordering::Relaxed)).unwrap_or(usize::MAX)
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot(self.config.concurrency, self.queue.len())
    }

    /// Take the slot handles, leaving the pool without any. Used by shutdown
    /// to wait for the slots.
    pub fn take_slots(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.slots.lock())
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("worker_type", &self.config.worker_type)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Slot {
    async fn run(mut self) {
        debug!(worker_id = %self.worker_id, "slot started");
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            if let Some(job) = self.queue.try_pop().await {
                self.counters.running_jobs.fetch_add(1, Ordering::Relaxed);
                self.process(job).await;
                self.counters.running_jobs.fetch_sub(1, Ordering::Relaxed);
                continue;
            }
            tokio::select! {
                () = self.queue.notified() => {}
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        debug!(worker_id = %self.worker_id, "slot stopped");
    }

    async fn process(&self, mut job: Job) {
        let max_exec_count = self.config.max_exec_count_for(&job);
        let timeout = self.config.timeout_for(&job);
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let Some(budget) = self.config.attempt_budget(timeout, started.elapsed()) else {
                self.fail(&mut job, attempt - 1, &HandlerError::new("job exceeded its max execution time"))
                    .await;
                return;
            };
            if let Err(err) = job.ack_consumed(&self.services).await {
                error!(job_id = %job.job_id, domain = %job.domain, error = %err, "could not mark job as running");
                return;
            }

            let ctx = WorkerContext::new(
                job.clone(),
                attempt,
                self.worker_id.clone(),
                Arc::clone(&self.services.hub),
                self.shutdown.clone(),
            );
            let failure = match self.execute_once(ctx, budget).await {
                Ok(()) => {
                    debug!(job_id = %job.job_id, attempt, "job succeeded");
                    if let Err(err) = job.ack(&self.services).await {
                        error!(job_id = %job.job_id, domain = %job.domain, error = %err, "could not ack job");
                    }
                    self.counters.completed_jobs.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(failure) => failure,
            };

            let delay = self.config.retry_delay_for(attempt);
            let out_of_time = self
                .config
                .attempt_budget(timeout, started.elapsed() + delay)
                .is_none();
            if failure.is_retryable() && attempt < max_exec_count && !out_of_time {
                warn!(
                    job_id = %job.job_id,
                    worker = %job.worker_type,
                    attempt,
                    max_exec_count,
                    error = %failure,
                    "job failed, retrying in {delay:?}"
                );
                self.counters.retried_attempts.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(delay).await;
                continue;
            }

            self.fail(&mut job, attempt, &failure).await;
            return;
        }
    }

    async fn fail(&self, job: &mut Job, attempt: u32, failure: &HandlerError) {
        warn!(job_id = %job.job_id, worker = %job.worker_type, attempt, error = %failure, "job errored");
        if let Err(err) = job.nack(&self.services, failure.message()).await {
            error!(job_id = %job.job_id, domain = %job.domain, error = %err, "could not nack job");
        }
        self.counters.errored_jobs.fetch_add(1, Ordering::Relaxed);
    }

    async fn execute_once(&self, ctx: WorkerContext, timeout: Duration) -> Result<(), HandlerError> {
        let handler = Arc::clone(&self.config.handler);
        let mut task = tokio::spawn(async move { handler.execute(ctx).await });

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) if join_err.is_panic() => {
                let panic = join_err.into_panic();
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_owned());
                Err(HandlerError::new(format!("job panicked: {reason}")))
            }
            Ok(Err(_)) => Err(HandlerError::new("job cancelled")),
            Err(_) => {
                task.abort();
                Err(HandlerError::new(format!("job timed out after {timeout:?}")))
            }
        }
    }
}
