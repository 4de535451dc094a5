//! Tests for utility functions

use job_broker::util::serde::{duration_nanos, zero_time};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Record {
    #[serde(default, with = "zero_time")]
    at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(with = "duration_nanos")]
    timeout: Duration,
}

#[test]
fn test_zero_time_round_trip() {
    let record = Record { at: None, timeout: Duration::from_millis(1500) };
    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["at"], "0001-01-01T00:00:00Z");
    assert_eq!(json["timeout"], 1_500_000_000_u64);
    assert_eq!(serde_json::from_value::<Record>(json).unwrap(), record);
}

#[test]
fn test_zero_time_accepts_missing_field() {
    let record: Record = serde_json::from_str(r#"{"timeout": 0}"#).unwrap();
    assert_eq!(record.at, None);
}

#[test]
fn test_init_tracing_is_idempotent() {
    job_broker::util::init_tracing();
    job_broker::util::init_tracing_with("debug");
}
