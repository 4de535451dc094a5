//! Queue abstraction for one worker type.

use async_trait::async_trait;

use crate::core::{Job, JobError, Prefixer, Services};

/// Identity of debounce-eligible work: same tenant, worker type and trigger.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DebounceKey {
    /// Tenant storage prefix.
    pub prefix: String,
    /// Worker type.
    pub worker_type: String,
    /// Originating trigger.
    pub trigger_id: String,
}

impl DebounceKey {
    /// Key of a job, when it is eligible for debouncing.
    #[must_use]
    pub fn of(job: &Job) -> Option<Self> {
        if !job.debounced {
            return None;
        }
        let trigger_id = job.trigger_id.as_deref().filter(|id| !id.is_empty())?;
        Some(Self {
            prefix: job.db_prefix().to_owned(),
            worker_type: job.worker_type.clone(),
            trigger_id: trigger_id.to_owned(),
        })
    }
}

/// Outcome of a push.
#[derive(Debug, Clone)]
pub enum Pushed {
    /// A new job was persisted and appended.
    Queued(Job),
    /// The request was folded into an already pending job.
    Merged(Job),
}

impl Pushed {
    /// The job that will run.
    #[must_use]
    pub fn into_job(self) -> Job {
        match self {
            Self::Queued(job) | Self::Merged(job) => job,
        }
    }
}

/// Pending jobs of one worker type, in dispatch order.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Persist `job` and append it, or merge it into a pending duplicate.
    async fn push(&self, svc: &Services, job: Job) -> Result<Pushed, JobError>;

    /// Remove and return the next job, if any.
    async fn try_pop(&self) -> Option<Job>;

    /// Resolves when a job may have become available.
    async fn notified(&self);

    /// Number of pending jobs.
    fn len(&self) -> usize;

    /// Whether no job is pending.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refuse further pushes and wake every waiter.
    fn close(&self);

    /// Whether `close` was called.
    fn is_closed(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{JobRequest, Tenant};

    #[test]
    fn only_debounced_jobs_with_a_trigger_have_a_key() {
        let tenant = Tenant::new("alice.example.net");
        let mut req = JobRequest::new("thumbnail").with_trigger("t1");
        assert!(DebounceKey::of(&Job::new(&tenant, req.clone())).is_none());

        req.debounced = true;
        let key = DebounceKey::of(&Job::new(&tenant, req.clone())).unwrap();
        assert_eq!(key.trigger_id, "t1");
        assert_eq!(key.prefix, "alice.example.net");

        req.trigger_id = None;
        assert!(DebounceKey::of(&Job::new(&tenant, req)).is_none());
    }
}
