//! Tests for opaque job blobs

use job_broker::core::{JobError, Message, Payload};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize, PartialEq)]
struct MailMessage {
    mode: String,
}

#[test]
fn test_message_unmarshal() {
    let msg = Message::new(&json!({"mode": "noreply"})).unwrap();
    let decoded: MailMessage = msg.unmarshal().unwrap();
    assert_eq!(decoded.mode, "noreply");
}

#[test]
fn test_empty_message_is_nil() {
    let msg = Message::default();
    assert!(matches!(msg.unmarshal::<MailMessage>(), Err(JobError::MessageNil)));
}

#[test]
fn test_wrong_shape_fails_to_unmarshal() {
    let msg = Message::new(&json!({"other": 1})).unwrap();
    assert!(matches!(msg.unmarshal::<MailMessage>(), Err(JobError::MessageUnmarshal)));
}

#[test]
fn test_legacy_envelope_decodes_like_plain_json() {
    // base64 of {"mode":"noreply"}
    let legacy: Message = serde_json::from_str(r#"{"Data": "eyJtb2RlIjoibm9yZXBseSJ9", "Type": "json"}"#).unwrap();
    let plain: Message = serde_json::from_str(r#"{"mode":"noreply"}"#).unwrap();
    assert_eq!(legacy, plain);
}

#[test]
fn test_null_payload_is_empty() {
    let payload: Payload = serde_json::from_str("null").unwrap();
    assert!(payload.is_empty());
}
