//! Job record and its state machine.
//!
//! A job is created `Queued` by [`Job::new`], moved to `Running` by
//! [`Job::ack_consumed`] and ends either `Done` ([`Job::ack`]) or `Errored`
//! ([`Job::nack`]). Each transition is persisted and announced on the
//! tenant's hub.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::{
    Event, JobError, Message, Payload, Prefixer, RealtimeEvent, Services, StoreError, Verb,
};
use crate::util::serde::{duration_nanos, is_false, zero_time};

/// Document type of job records.
pub const JOBS_DOCTYPE: &str = "io.jobs";

/// Document type of forwarded handler logs.
pub const JOBS_LOGS_DOCTYPE: &str = "io.jobs.logs";

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    /// Waiting for a worker slot.
    Queued,
    /// Handed to a handler.
    Running,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Errored,
}

impl State {
    /// States in listing order.
    pub const ALL: [Self; 4] = [Self::Queued, Self::Running, Self::Done, Self::Errored];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Errored => "errored",
        }
    }

    /// Whether no further transition can happen.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Errored)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution properties of a job. Zero values fall back to the worker's
/// configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Maximum number of attempts.
    pub max_exec_count: u32,
    /// Wall-clock budget of one attempt.
    #[serde(with = "duration_nanos")]
    pub timeout: Duration,
}

/// Who produced a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Origin {
    /// The stack itself (triggers, internal flows).
    #[default]
    Stack,
    /// An external client; reserved worker types are refused.
    Client,
}

/// Input of job creation.
#[derive(Debug, Clone, Default)]
pub struct JobRequest {
    /// Worker type selecting the queue and handler.
    pub worker_type: String,
    /// Trigger that produced the request.
    pub trigger_id: Option<String>,
    /// Handler input.
    pub message: Message,
    /// Realtime event snapshot, for event-triggered jobs.
    pub event: Event,
    /// Webhook body, for webhook-triggered jobs.
    pub payload: Payload,
    /// User-initiated execution.
    pub manual: bool,
    /// Eligible for debouncing with a pending job of the same trigger.
    pub debounced: bool,
    /// Stream handler logs to the tenant hub.
    pub forward_logs: bool,
    /// Execution policy override.
    pub options: Option<JobOptions>,
    /// Producer of the request.
    pub origin: Origin,
}

impl JobRequest {
    /// Request for `worker_type` with an empty message.
    pub fn new(worker_type: impl Into<String>) -> Self {
        Self { worker_type: worker_type.into(), ..Self::default() }
    }

    /// Set the handler message.
    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.message = message;
        self
    }

    /// Set the originating trigger.
    #[must_use]
    pub fn with_trigger(mut self, trigger_id: impl Into<String>) -> Self {
        self.trigger_id = Some(trigger_id.into());
        self
    }

    /// Set the execution policy.
    #[must_use]
    pub const fn with_options(mut self, options: JobOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Mark the request as coming from an external client.
    #[must_use]
    pub const fn from_client(mut self) -> Self {
        self.origin = Origin::Client;
        self
    }

    /// Values of a permission-checked field.
    #[must_use]
    pub fn fetch(&self, field: &str) -> Vec<String> {
        match field {
            "worker" => vec![self.worker_type.clone()],
            _ => Vec::new(),
        }
    }
}

/// Persisted job record.
///
/// `Clone` copies the options and every blob; clones never share buffers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Store-assigned id.
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub job_id: String,
    /// Store revision.
    #[serde(rename = "_rev", default, skip_serializing_if = "String::is_empty")]
    pub job_rev: String,
    /// Tenant domain.
    pub domain: String,
    /// Tenant storage prefix; the domain is used when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prefix: String,
    /// Worker type.
    #[serde(rename = "worker")]
    pub worker_type: String,
    /// Originating trigger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<String>,
    /// Handler input.
    #[serde(default)]
    pub message: Message,
    /// Realtime event snapshot.
    #[serde(default)]
    pub event: Event,
    /// Webhook body.
    #[serde(default, skip_serializing_if = "Payload::is_empty")]
    pub payload: Payload,
    /// User-initiated execution.
    #[serde(rename = "manual_execution", default, skip_serializing_if = "is_false")]
    pub manual: bool,
    /// This execution absorbed duplicate requests.
    #[serde(default, skip_serializing_if = "is_false")]
    pub debounced: bool,
    /// Execution policy override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<JobOptions>,
    /// Lifecycle state.
    pub state: State,
    /// Creation time.
    pub queued_at: DateTime<Utc>,
    /// Start of the latest attempt.
    #[serde(default, with = "zero_time")]
    pub started_at: Option<DateTime<Utc>>,
    /// Time the job reached a terminal state.
    #[serde(default, with = "zero_time")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure reason, set only when errored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stream handler logs to the tenant hub.
    #[serde(default, skip_serializing_if = "is_false")]
    pub forward_logs: bool,
}

impl Prefixer for Job {
    fn db_prefix(&self) -> &str {
        if self.prefix.is_empty() {
            &self.domain
        } else {
            &self.prefix
        }
    }

    fn domain_name(&self) -> &str {
        &self.domain
    }
}

impl Job {
    /// Build a queued job from a request.
    pub fn new(db: &dyn Prefixer, req: JobRequest) -> Self {
        Self {
            job_id: String::new(),
            job_rev: String::new(),
            domain: db.domain_name().to_owned(),
            prefix: db.db_prefix().to_owned(),
            worker_type: req.worker_type,
            trigger_id: req.trigger_id,
            message: req.message,
            event: req.event,
            payload: req.payload,
            manual: req.manual,
            debounced: req.debounced,
            options: req.options,
            state: State::Queued,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
            forward_logs: req.forward_logs,
        }
    }

    /// Store id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.job_id
    }

    /// Store revision.
    #[must_use]
    pub fn rev(&self) -> &str {
        &self.job_rev
    }

    /// Span carrying the job's identity.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::debug_span!(
            "job",
            domain = %self.domain,
            job_id = %self.job_id,
            worker = %self.worker_type,
        )
    }

    /// Values of a permission-checked field.
    #[must_use]
    pub fn fetch(&self, field: &str) -> Vec<String> {
        match field {
            "worker" => vec![self.worker_type.clone()],
            "state" => vec![self.state.to_string()],
            _ => Vec::new(),
        }
    }

    /// Mark the job as consumed by a worker and persist it.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn ack_consumed(&mut self, svc: &Services) -> Result<(), JobError> {
        tracing::debug!(job_id = %self.job_id, domain = %self.domain, "ack_consume");
        self.started_at = Some(Utc::now());
        self.state = State::Running;
        self.update(svc).await
    }

    /// Mark the job as done and persist it.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn ack(&mut self, svc: &Services) -> Result<(), JobError> {
        tracing::debug!(job_id = %self.job_id, domain = %self.domain, "ack");
        self.finished_at = Some(Utc::now());
        self.state = State::Done;
        self.event.clear();
        self.payload.clear();
        self.update(svc).await
    }

    /// Mark the job as errored with `error_message` and persist it.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn nack(&mut self, svc: &Services, error_message: impl Into<String>) -> Result<(), JobError> {
        tracing::debug!(job_id = %self.job_id, domain = %self.domain, "nack");
        self.finished_at = Some(Utc::now());
        self.state = State::Errored;
        self.error = Some(error_message.into());
        self.event.clear();
        self.payload.clear();
        self.update(svc).await
    }

    /// Persist the current state.
    ///
    /// When the record or its whole collection is gone (the tenant's job
    /// history was reset meanwhile), the job is created again under a new id.
    ///
    /// # Errors
    ///
    /// Propagates any other persistence failure.
    pub async fn update(&mut self, svc: &Services) -> Result<(), JobError> {
        let doc = serde_json::to_value(&*self).map_err(StoreError::from)?;
        let result = svc
            .store
            .update_doc(&*self, JOBS_DOCTYPE, &self.job_id, &self.job_rev, doc)
            .await;
        match result {
            Ok(meta) => {
                self.job_rev = meta.rev;
                self.publish(svc, Verb::Updated);
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                tracing::warn!(
                    job_id = %self.job_id,
                    domain = %self.domain,
                    "job record vanished, creating it again"
                );
                self.job_id.clear();
                self.job_rev.clear();
                self.create(svc).await
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Create the record; the store assigns id and revision.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn create(&mut self, svc: &Services) -> Result<(), JobError> {
        let doc = serde_json::to_value(&*self).map_err(StoreError::from)?;
        let meta = svc.store.create_doc(&*self, JOBS_DOCTYPE, doc).await?;
        self.job_id = meta.id;
        self.job_rev = meta.rev;
        self.publish(svc, Verb::Created);
        Ok(())
    }

    fn publish(&self, svc: &Services, verb: Verb) {
        svc.hub.publish(
            self,
            RealtimeEvent {
                prefix: self.db_prefix().to_owned(),
                verb,
                doc_type: JOBS_DOCTYPE.to_owned(),
                doc_id: self.job_id.clone(),
                doc: json!({ "state": self.state }),
            },
        );
    }
}

/// Load a job by id.
///
/// # Errors
///
/// `JobError::NotFound` when no such job exists for the tenant; other store
/// failures are propagated.
pub async fn get(svc: &Services, db: &dyn Prefixer, job_id: &str) -> Result<Job, JobError> {
    match svc.store.get_doc(db, JOBS_DOCTYPE, job_id).await {
        Ok(doc) => Ok(serde_json::from_value(doc).map_err(StoreError::from)?),
        Err(err) if err.is_not_found() => Err(JobError::NotFound),
        Err(err) => Err(err.into()),
    }
}
