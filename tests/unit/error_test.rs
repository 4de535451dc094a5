//! Tests for error types

use job_broker::core::{HandlerError, JobError, StoreError};

#[test]
fn test_not_found_error() {
    let err = JobError::NotFound;
    assert_eq!(format!("{}", err), "job not found");
}

#[test]
fn test_unknown_worker_error() {
    let err = JobError::UnknownWorker("thumbnail".to_string());
    assert_eq!(format!("{}", err), "unknown worker type: thumbnail");
}

#[test]
fn test_shutdown_deadline_error() {
    let err = JobError::ShutdownDeadline { abandoned: 3 };
    assert_eq!(format!("{}", err), "shutdown deadline expired with 3 running executions");
}

#[test]
fn test_store_error_is_transparent() {
    let err: JobError = StoreError::Conflict("io.jobs/j1".to_string()).into();
    assert_eq!(format!("{}", err), "conflict: io.jobs/j1");
    assert!(matches!(err, JobError::Store(StoreError::Conflict(_))));
}

#[test]
fn test_handler_error_from_job_error() {
    let err: HandlerError = JobError::MessageUnmarshal.into();
    assert!(err.is_retryable());
    assert_eq!(err.message(), "could not unmarshal message");
}

#[test]
fn test_handler_error_from_anyhow() {
    let err: HandlerError = anyhow::anyhow!("smtp refused").context("sending mail").into();
    assert_eq!(err.message(), "sending mail: smtp refused");
}
