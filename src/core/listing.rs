//! Job history queries.
//!
//! These read the store directly and are independent of the live queues.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::core::{
    AllDocsRequest, FindRequest, Job, JobError, Prefixer, Selector, Services, State, StoreError, JOBS_DOCTYPE,
};

/// Index used by [`get_queued_jobs`].
pub const BY_WORKER_AND_STATE_INDEX: &str = "by-worker-and-state";
/// Maximum number of jobs returned by [`get_queued_jobs`].
pub const QUEUED_JOBS_LIMIT: usize = 200;
/// Rows requested per page by [`get_all_jobs`].
pub const ALL_JOBS_PAGE_SIZE: usize = 10_001;
/// Default number of jobs kept per state by [`get_lasts_jobs`].
pub const DEFAULT_STATE_LIMIT: usize = 50;

/// Per-state caps of [`get_lasts_jobs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateLimits {
    /// Cap of queued jobs.
    pub queued: usize,
    /// Cap of running jobs.
    pub running: usize,
    /// Cap of done jobs.
    pub done: usize,
    /// Cap of errored jobs.
    pub errored: usize,
}

impl StateLimits {
    /// Same cap for every state.
    #[must_use]
    pub const fn uniform(limit: usize) -> Self {
        Self { queued: limit, running: limit, done: limit, errored: limit }
    }

    /// Cap of `state`.
    #[must_use]
    pub const fn for_state(&self, state: State) -> usize {
        match state {
            State::Queued => self.queued,
            State::Running => self.running,
            State::Done => self.done,
            State::Errored => self.errored,
        }
    }
}

impl Default for StateLimits {
    fn default() -> Self {
        Self::uniform(DEFAULT_STATE_LIMIT)
    }
}

fn decode(docs: Vec<Value>) -> Result<Vec<Job>, JobError> {
    docs.into_iter()
        .map(|doc| serde_json::from_value(doc).map_err(|e| JobError::Store(StoreError::from(e))))
        .collect()
}

/// Queued or running jobs of a worker type, at most [`QUEUED_JOBS_LIMIT`].
///
/// # Errors
///
/// Propagates store failures.
pub async fn get_queued_jobs(svc: &Services, db: &dyn Prefixer, worker_type: &str) -> Result<Vec<Job>, JobError> {
    let req = FindRequest {
        use_index: Some(BY_WORKER_AND_STATE_INDEX.to_owned()),
        selector: Selector::And(vec![
            Selector::equal("worker", worker_type),
            // the index only covers documents having a state
            Selector::exists("state"),
            Selector::Or(vec![
                Selector::equal("state", State::Queued.as_str()),
                Selector::equal("state", State::Running.as_str()),
            ]),
        ]),
        limit: QUEUED_JOBS_LIMIT,
    };
    decode(svc.store.find_docs(db, JOBS_DOCTYPE, &req).await?)
}

/// Every job of the tenant, in id order.
///
/// # Errors
///
/// Propagates store failures.
pub async fn get_all_jobs(svc: &Services, db: &dyn Prefixer) -> Result<Vec<Job>, JobError> {
    get_all_jobs_paged(svc, db, ALL_JOBS_PAGE_SIZE).await
}

/// [`get_all_jobs`] with an explicit page size (at least 2).
///
/// The last row of each page is held back and used as the start key of the
/// next request, which returns it again as its first row. A page holding only
/// that row ends the walk.
///
/// # Errors
///
/// Propagates store failures.
pub async fn get_all_jobs_paged(svc: &Services, db: &dyn Prefixer, page_size: usize) -> Result<Vec<Job>, JobError> {
    let mut all = Vec::new();
    let mut start_key = String::new();

    loop {
        let req = AllDocsRequest { limit: page_size.max(2), start_key };
        let mut page = decode(svc.store.all_docs(db, JOBS_DOCTYPE, &req).await?)?;
        let Some(last) = page.pop() else {
            return Ok(all);
        };
        let last_page = page.is_empty();
        all.append(&mut page);
        if last_page {
            all.push(last);
            return Ok(all);
        }
        start_key = last.job_id;
    }
}

/// Jobs queued strictly before `date`.
#[must_use]
pub fn filter_jobs_before_date(jobs: &[Job], date: DateTime<Utc>) -> Vec<&Job> {
    jobs.iter().filter(|job| job.queued_at < date).collect()
}

/// Jobs of `worker_type` in `state`, in input order, stopping at `limit`.
/// A zero limit keeps every match.
#[must_use]
pub fn filter_by_worker_and_state<'a>(jobs: &'a [Job], worker_type: &str, state: State, limit: usize) -> Vec<&'a Job> {
    let matching = jobs
        .iter()
        .filter(|job| job.worker_type == worker_type && job.state == state);
    if limit == 0 {
        matching.collect()
    } else {
        matching.take(limit).collect()
    }
}

/// Oldest jobs of `worker_type` per state, grouped queued, running, done then
/// errored, each group capped by `limits`. `jobs` is sorted by `queued_at`.
pub fn get_lasts_jobs<'a>(jobs: &'a mut [Job], worker_type: &str, limits: &StateLimits) -> Vec<&'a Job> {
    jobs.sort_by(|a, b| a.queued_at.cmp(&b.queued_at));
    let jobs: &'a [Job] = jobs;
    State::ALL
        .into_iter()
        .flat_map(|state| filter_by_worker_and_state(jobs, worker_type, state, limits.for_state(state)))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::core::{JobRequest, Tenant};

    fn job(worker: &str, state: State, minutes_ago: i64) -> Job {
        let mut job = Job::new(&Tenant::new("alice.example.net"), JobRequest::new(worker));
        job.state = state;
        job.queued_at = Utc::now() - Duration::minutes(minutes_ago);
        job
    }

    #[test]
    fn limit_stops_the_filter() {
        let jobs: Vec<Job> = (0..5).map(|n| job("thumbnail", State::Done, n)).collect();
        assert_eq!(filter_by_worker_and_state(&jobs, "thumbnail", State::Done, 3).len(), 3);
        assert_eq!(filter_by_worker_and_state(&jobs, "thumbnail", State::Done, 0).len(), 5);
        assert!(filter_by_worker_and_state(&jobs, "sendmail", State::Done, 3).is_empty());
    }

    #[test]
    fn lasts_jobs_are_grouped_by_state_and_capped() {
        let mut jobs = Vec::new();
        for n in 0..60 {
            jobs.push(job("thumbnail", State::Done, n));
        }
        jobs.push(job("thumbnail", State::Errored, 1));
        jobs.push(job("thumbnail", State::Queued, 2));
        jobs.push(job("sendmail", State::Queued, 3));

        let lasts = get_lasts_jobs(&mut jobs, "thumbnail", &StateLimits::default());
        assert_eq!(lasts.len(), 52);
        assert_eq!(lasts[0].state, State::Queued);
        assert!(lasts[1..51].iter().all(|j| j.state == State::Done));
        assert_eq!(lasts[51].state, State::Errored);
        assert!(lasts[1..51].windows(2).all(|w| w[0].queued_at <= w[1].queued_at));
    }

    #[test]
    fn custom_state_limits() {
        let mut jobs: Vec<Job> = (0..4).map(|n| job("thumbnail", State::Running, n)).collect();
        let limits = StateLimits { running: 1, ..StateLimits::default() };
        assert_eq!(get_lasts_jobs(&mut jobs, "thumbnail", &limits).len(), 1);
        assert_eq!(StateLimits::uniform(7).for_state(State::Errored), 7);
    }

    #[test]
    fn before_date_is_strict() {
        let jobs = vec![job("thumbnail", State::Done, 10), job("thumbnail", State::Done, 1)];
        let cutoff = jobs[1].queued_at;
        let older = filter_jobs_before_date(&jobs, cutoff);
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].queued_at, jobs[0].queued_at);
    }
}
