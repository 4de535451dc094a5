//! Broker keeping its queues in process memory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::core::{
    Broker, Job, JobError, JobQueue, JobRequest, Origin, PoolStats, Prefixer, Services, WorkerPool,
    WorkersList,
};
use crate::infra::queue::InMemoryQueue;

struct Registered {
    queue: Arc<dyn JobQueue>,
    pool: WorkerPool,
    reserved: bool,
}

/// In-memory broker: one [`InMemoryQueue`] and one [`WorkerPool`] per worker
/// type, sharing the same store and hub.
pub struct InMemoryBroker {
    services: Services,
    workers: RwLock<HashMap<String, Registered>>,
    shutdown: watch::Sender<bool>,
    started: AtomicBool,
    closed: AtomicBool,
}

impl InMemoryBroker {
    /// Create a broker without workers; call [`Broker::start_workers`] next.
    #[must_use]
    pub fn new(services: Services) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            services,
            workers: RwLock::new(HashMap::new()),
            shutdown,
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Services shared with the pools.
    #[must_use]
    pub const fn services(&self) -> &Services {
        &self.services
    }

    /// Statistics of a worker type's pool.
    #[must_use]
    pub fn stats(&self, worker_type: &str) -> Option<PoolStats> {
        self.workers.read().get(worker_type).map(|w| w.pool.stats())
    }

    fn running(&self) -> usize {
        self.workers.read().values().map(|w| w.pool.running()).sum()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    fn start_workers(&self, workers: WorkersList) -> Result<(), JobError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(JobError::Shutdown);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(JobError::AlreadyStarted);
        }

        let mut unique: WorkersList = Vec::with_capacity(workers.len());
        for config in workers {
            if let Some(pos) = unique.iter().position(|c| c.worker_type == config.worker_type) {
                warn!(worker = %config.worker_type, "worker type configured twice, keeping the last one");
                unique.remove(pos);
            }
            unique.push(config);
        }

        let mut registry = self.workers.write();
        for config in unique {
            let worker_type = config.worker_type.clone();
            let reserved = config.reserved;
            let queue: Arc<dyn JobQueue> = Arc::new(InMemoryQueue::new());
            let pool = WorkerPool::start(
                config,
                Arc::clone(&queue),
                self.services.clone(),
                self.shutdown.subscribe(),
            );
            registry.insert(worker_type, Registered { queue, pool, reserved });
        }
        info!(workers = registry.len(), "workers started");
        Ok(())
    }

    async fn shutdown_workers(&self, deadline: Duration) -> Result<(), JobError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!(?deadline, "shutting down workers");

        let mut handles = Vec::new();
        {
            let workers = self.workers.read();
            for worker in workers.values() {
                worker.queue.close();
                handles.extend(worker.pool.take_slots());
            }
        }
        self.shutdown.send_replace(true);

        let drained = tokio::time::timeout(deadline, async {
            for handle in &mut handles {
                // A slot that panicked has nothing left to wait for.
                let _ = handle.await;
            }
        })
        .await;

        if drained.is_ok() {
            info!("workers stopped");
            return Ok(());
        }

        let abandoned = self.running();
        for handle in &handles {
            handle.abort();
        }
        warn!(abandoned, "shutdown deadline expired, running jobs abandoned");
        Err(JobError::ShutdownDeadline { abandoned })
    }

    async fn push_job(&self, db: &dyn Prefixer, request: JobRequest) -> Result<Job, JobError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(JobError::Shutdown);
        }

        let (queue, reserved) = {
            let workers = self.workers.read();
            let worker = workers
                .get(&request.worker_type)
                .ok_or_else(|| JobError::UnknownWorker(request.worker_type.clone()))?;
            (Arc::clone(&worker.queue), worker.reserved)
        };
        if reserved && request.origin == Origin::Client {
            return Err(JobError::ReservedWorker(request.worker_type));
        }

        let job = Job::new(db, request);
        let pushed = queue.push(&self.services, job).await?;
        let job = pushed.into_job();
        debug!(job_id = %job.job_id, domain = %job.domain, worker = %job.worker_type, "job pushed");
        Ok(job)
    }

    fn worker_queue_len(&self, worker_type: &str) -> Result<usize, JobError> {
        self.workers
            .read()
            .get(worker_type)
            .map(|w| w.queue.len() + w.pool.running())
            .ok_or_else(|| JobError::UnknownWorker(worker_type.to_owned()))
    }

    fn worker_is_reserved(&self, worker_type: &str) -> Result<bool, JobError> {
        self.workers
            .read()
            .get(worker_type)
            .map(|w| w.reserved)
            .ok_or_else(|| JobError::UnknownWorker(worker_type.to_owned()))
    }

    fn workers_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.workers.read().keys().cloned().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{handler_fn, Tenant, WorkerConfig};
    use crate::infra::realtime::InMemoryHub;
    use crate::infra::store::InMemoryStore;

    fn broker() -> InMemoryBroker {
        InMemoryBroker::new(Services::new(Arc::new(InMemoryStore::new()), Arc::new(InMemoryHub::new())))
    }

    fn noop(worker_type: &str) -> WorkerConfig {
        WorkerConfig::new(worker_type, handler_fn(|_ctx| async { Ok(()) }))
    }

    #[tokio::test]
    async fn workers_start_once() {
        let broker = broker();
        broker.start_workers(vec![noop("thumbnail"), noop("sendmail").reserved()]).unwrap();
        assert!(matches!(broker.start_workers(vec![]), Err(JobError::AlreadyStarted)));

        assert_eq!(broker.workers_types(), ["sendmail", "thumbnail"]);
        assert!(broker.worker_is_reserved("sendmail").unwrap());
        assert!(!broker.worker_is_reserved("thumbnail").unwrap());
        assert!(matches!(broker.worker_is_reserved("nope"), Err(JobError::UnknownWorker(_))));
        broker.shutdown_workers(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_worker_type_keeps_the_last_entry() {
        let broker = broker();
        let replaced = handler_fn(|_ctx| async { Ok(()) });
        broker
            .start_workers(vec![
                WorkerConfig::new("thumbnail", Arc::clone(&replaced)).with_concurrency(3),
                noop("thumbnail").with_concurrency(2),
            ])
            .unwrap();

        assert_eq!(broker.workers_types(), ["thumbnail"]);
        assert_eq!(broker.stats("thumbnail").unwrap().worker_count, 2);
        // No slot of the replaced entry was spawned.
        assert_eq!(Arc::strong_count(&replaced), 1);
        broker.shutdown_workers(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn pushes_are_validated() {
        let broker = broker();
        broker.start_workers(vec![noop("sendmail").reserved()]).unwrap();
        let tenant = Tenant::new("alice.example.net");

        let err = broker.push_job(&tenant, JobRequest::new("unknown")).await.unwrap_err();
        assert!(matches!(err, JobError::UnknownWorker(name) if name == "unknown"));

        let err = broker
            .push_job(&tenant, JobRequest::new("sendmail").from_client())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::ReservedWorker(_)));

        broker.push_job(&tenant, JobRequest::new("sendmail")).await.unwrap();

        broker.shutdown_workers(Duration::from_secs(1)).await.unwrap();
        let err = broker.push_job(&tenant, JobRequest::new("sendmail")).await.unwrap_err();
        assert!(matches!(err, JobError::Shutdown));
    }
}
