//! Tests for configuration validation

use job_broker::config::{JobsConfig, WorkerEntry, WorkerSettings};
use std::time::Duration;

#[test]
fn test_worker_settings_validation() {
    let valid = WorkerSettings {
        concurrency: Some(2),
        max_exec_count: Some(3),
        timeout: Some(Duration::from_secs(30)),
        ..WorkerSettings::default()
    };
    assert!(valid.validate().is_ok());
}

#[test]
fn test_worker_settings_invalid_max_exec_count() {
    let invalid = WorkerSettings {
        max_exec_count: Some(0),
        ..WorkerSettings::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_worker_settings_invalid_timeout() {
    let invalid = WorkerSettings {
        timeout: Some(Duration::ZERO),
        ..WorkerSettings::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_jobs_config_rejects_empty_worker_name() {
    let mut config = JobsConfig::default();
    config.workers.insert(String::new(), WorkerEntry::Enabled(true));
    assert!(config.validate().is_err());
}

#[test]
fn test_jobs_config_from_json() {
    let json = r#"{
        "default_timeout": "1m",
        "default_max_exec_count": 2,
        "workers": {
            "konnector": {
                "concurrency": 4,
                "max_exec_time": "5m",
                "reserved": false
            },
            "unzip": true
        }
    }"#;

    let config = JobsConfig::from_json_str(json).expect("valid config");
    let resolved = config.resolve();
    assert_eq!(resolved.len(), 2);
    assert_eq!(resolved[0].worker_type, "konnector");
    assert_eq!(resolved[0].concurrency, 4);
    assert_eq!(resolved[0].max_exec_count, 2);
    assert_eq!(resolved[0].timeout, Duration::from_secs(60));
    assert_eq!(resolved[0].max_exec_time, Some(Duration::from_secs(300)));
    assert_eq!(resolved[1].worker_type, "unzip");
}

#[test]
fn test_jobs_config_from_file() {
    let path = std::env::temp_dir().join(format!("job-broker-config-{}.json", std::process::id()));
    std::fs::write(&path, r#"{"workers": {"sendmail": {"concurrency": 1}}}"#).expect("write config");

    let config = JobsConfig::from_file(path.to_str().expect("utf-8 path")).expect("load config");
    assert_eq!(config.resolve()[0].concurrency, 1);

    std::fs::write(&path, r#"{"workers": {"sendmail": {"timeout": "soon"}}}"#).expect("write config");
    assert!(JobsConfig::from_file(path.to_str().expect("utf-8 path")).is_err());
    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_jobs_config_missing_file() {
    assert!(JobsConfig::from_file("/nonexistent/job-broker.json").is_err());
}
