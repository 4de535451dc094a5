//! Tests for builder modules

use job_broker::builders::{build_broker, build_workers_list};
use job_broker::config::JobsConfig;
use job_broker::core::{handler_fn, JobError, Services};
use job_broker::infra::{InMemoryHub, InMemoryStore};
use std::sync::Arc;
use std::time::Duration;

fn services() -> Services {
    Services::new(Arc::new(InMemoryStore::new()), Arc::new(InMemoryHub::new()))
}

#[test]
fn test_workers_list_from_config() {
    let config = JobsConfig::from_json_str(
        r#"{"default_concurrency": 3, "workers": {"sendmail": {"reserved": true}, "thumbnail": true}}"#,
    )
    .expect("valid config");

    let workers = build_workers_list(&config, |_| Some(handler_fn(|_ctx| async { Ok(()) }))).expect("workers");
    assert_eq!(workers.len(), 2);
    assert!(workers[0].reserved);
    assert_eq!(workers[0].concurrency, 3);
    assert_eq!(workers[1].worker_type, "thumbnail");
}

#[tokio::test]
async fn test_build_broker_starts_workers() {
    let config = JobsConfig::from_json_str(r#"{"workers": {"sendmail": {"reserved": true}, "unzip": false}}"#)
        .expect("valid config");

    let broker = build_broker(&config, services(), |_| Some(handler_fn(|_ctx| async { Ok(()) })))
        .expect("broker");
    assert_eq!(broker.workers_types(), ["sendmail", "unzip"]);
    assert!(broker.worker_is_reserved("sendmail").expect("known worker"));
    assert!(matches!(broker.start_workers(Vec::new()), Err(JobError::AlreadyStarted)));
    broker.shutdown_workers(Duration::from_secs(1)).await.expect("shutdown");
}
