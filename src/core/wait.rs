//! Blocking wait on a job's terminal state.

use std::time::Duration;

use tracing::warn;

use crate::core::{get, Job, JobError, Prefixer, Services, State, JOBS_DOCTYPE};

/// Bound of [`wait_until_done`].
pub const WAIT_UNTIL_DONE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Wait until `job` is done, for at most [`WAIT_UNTIL_DONE_TIMEOUT`].
///
/// # Errors
///
/// `JobError::Failed` when the job ends errored. Reaching the bound is not an
/// error.
pub async fn wait_until_done(svc: &Services, db: &dyn Prefixer, job: &Job) -> Result<(), JobError> {
    wait_until_done_timeout(svc, db, job, WAIT_UNTIL_DONE_TIMEOUT).await
}

/// Wait until `job` is done, for at most `timeout`.
///
/// The subscription is opened before the current state is read so that a
/// transition happening in between is not missed.
///
/// # Errors
///
/// `JobError::Failed` when the job ends errored, `JobError::Hub` when the
/// subscription closes early, or a store failure while reading the job.
pub async fn wait_until_done_timeout(
    svc: &Services,
    db: &dyn Prefixer,
    job: &Job,
    timeout: Duration,
) -> Result<(), JobError> {
    let mut sub = svc.hub.subscriber(db);
    sub.watch(JOBS_DOCTYPE, job.id());

    let current = get(svc, db, job.id()).await?;
    match current.state {
        State::Done => return Ok(()),
        State::Errored => return Err(failure(current.error)),
        State::Queued | State::Running => {}
    }

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            event = sub.recv() => {
                let Some(event) = event else {
                    return Err(JobError::Hub("subscription closed".into()));
                };
                match event.state() {
                    Some("done") => return Ok(()),
                    Some("errored") => {
                        let reason = get(svc, db, job.id()).await.ok().and_then(|job| job.error);
                        return Err(failure(reason));
                    }
                    _ => {}
                }
            }
            () = &mut deadline => {
                warn!(job_id = %job.job_id, domain = %job.domain, ?timeout, "stopped waiting for job");
                return Ok(());
            }
        }
    }
}

fn failure(reason: Option<String>) -> JobError {
    JobError::Failed(reason.unwrap_or_else(|| "job errored".to_owned()))
}
