//! In-memory FIFO queue with debounce merging.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::core::{DebounceKey, Job, JobError, JobQueue, Pushed, Services};

#[derive(Default)]
struct Pending {
    jobs: VecDeque<Job>,
    /// Debounce key to the id of the pending job holding it.
    debounce: HashMap<DebounceKey, String>,
}

/// In-memory queue of one worker type.
///
/// Pushes are serialized: the duplicate check, the persistence of the job and
/// its insertion happen under one lock so two concurrent debounced requests
/// cannot both be queued.
#[derive(Default)]
pub struct InMemoryQueue {
    pending: Mutex<Pending>,
    len: AtomicUsize,
    notify: Notify,
    closed: AtomicBool,
}

impl InMemoryQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `job` into the pending job registered under `key`, if it is still
    /// queued.
    async fn merge(
        svc: &Services,
        pending: &mut Pending,
        key: &DebounceKey,
        job: &Job,
    ) -> Result<Option<Pushed>, JobError> {
        let Some(id) = pending.debounce.get(key).cloned() else {
            return Ok(None);
        };
        let Some(existing) = pending.jobs.iter_mut().find(|queued| queued.job_id == id) else {
            pending.debounce.remove(key);
            return Ok(None);
        };

        existing.message = job.message.clone();
        existing.event = job.event.clone();
        existing.payload = job.payload.clone();
        existing.debounced = true;
        existing.update(svc).await?;
        debug!(job_id = %existing.job_id, trigger_id = %key.trigger_id, "debounced job request");

        let merged = existing.clone();
        // A recreated record carries a new id.
        pending.debounce.insert(key.clone(), merged.job_id.clone());
        Ok(Some(Pushed::Merged(merged)))
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    async fn push(&self, svc: &Services, mut job: Job) -> Result<Pushed, JobError> {
        if self.is_closed() {
            return Err(JobError::Shutdown);
        }
        let mut pending = self.pending.lock().await;

        let key = DebounceKey::of(&job);
        if let Some(key) = &key {
            if let Some(merged) = Self::merge(svc, &mut pending, key, &job).await? {
                return Ok(merged);
            }
        }

        job.create(svc).await?;
        if let Some(key) = key {
            pending.debounce.insert(key, job.job_id.clone());
        }
        pending.jobs.push_back(job.clone());
        self.len.fetch_add(1, Ordering::Relaxed);
        drop(pending);

        self.notify.notify_one();
        Ok(Pushed::Queued(job))
    }

    async fn try_pop(&self) -> Option<Job> {
        let mut pending = self.pending.lock().await;
        let job = pending.jobs.pop_front()?;
        if let Some(key) = DebounceKey::of(&job) {
            if pending.debounce.get(&key) == Some(&job.job_id) {
                pending.debounce.remove(&key);
            }
        }
        self.len.fetch_sub(1, Ordering::Relaxed);
        // Notify keeps a single permit: pass the wakeup on while jobs remain.
        if !pending.jobs.is_empty() {
            self.notify.notify_one();
        }
        Some(job)
    }

    async fn notified(&self) {
        if self.is_closed() {
            return;
        }
        self.notify.notified().await;
    }

    fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
