//! Opaque JSON blobs carried by jobs.
//!
//! The core never looks inside a `Message`, `Event` or `Payload`: they are
//! raw JSON bytes that only the worker handler decodes, through `unmarshal`.
//! Each blob owns its bytes, so cloning a job never aliases them.

use std::fmt;

use base64::Engine as _;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;

use crate::core::JobError;

macro_rules! opaque_blob {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Default, PartialEq, Eq)]
        pub struct $name(Vec<u8>);

        impl $name {
            /// Encode `data` as JSON.
            ///
            /// # Errors
            ///
            /// Returns the serializer error when `data` cannot be encoded.
            pub fn new<T: Serialize + ?Sized>(data: &T) -> Result<Self, serde_json::Error> {
                serde_json::to_vec(data).map(Self)
            }

            /// Wrap raw JSON bytes.
            ///
            /// # Errors
            ///
            /// Returns an error when `bytes` is not a valid JSON document.
            pub fn from_json(bytes: impl Into<Vec<u8>>) -> Result<Self, serde_json::Error> {
                let bytes = bytes.into();
                serde_json::from_slice::<&RawValue>(&bytes)?;
                Ok(Self(bytes))
            }

            /// Raw JSON bytes; empty when absent.
            #[must_use]
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            /// Whether the blob is absent.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Drop the content.
            pub fn clear(&mut self) {
                self.0 = Vec::new();
            }

            /// Decode the blob into `T`.
            ///
            /// # Errors
            ///
            /// `JobError::MessageNil` when the blob is absent,
            /// `JobError::MessageUnmarshal` when it does not decode as `T`.
            pub fn unmarshal<T: DeserializeOwned>(&self) -> Result<T, JobError> {
                if self.0.is_empty() {
                    return Err(JobError::MessageNil);
                }
                serde_json::from_slice(&self.0).map_err(|_| JobError::MessageUnmarshal)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.0.is_empty() {
                    return f.write_str(concat!(stringify!($name), "(nil)"));
                }
                write!(f, "{}({})", stringify!($name), String::from_utf8_lossy(&self.0))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if self.0.is_empty() {
                    return serializer.serialize_none();
                }
                let raw: &RawValue =
                    serde_json::from_slice(&self.0).map_err(serde::ser::Error::custom)?;
                raw.serialize(serializer)
            }
        }
    };
}

opaque_blob!(
    /// JSON-encoded job message, interpreted by the worker handler.
    Message
);

opaque_blob!(
    /// JSON-encoded realtime event that triggered the job.
    Event
);

opaque_blob!(
    /// JSON-encoded webhook body that triggered the job.
    Payload
);

fn raw_bytes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Box<RawValue>>, D::Error> {
    Option::<Box<RawValue>>::deserialize(deserializer)
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(raw_bytes(deserializer)?.map_or_else(Self::default, |raw| Self(raw.get().as_bytes().to_vec())))
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(raw_bytes(deserializer)?.map_or_else(Self::default, |raw| Self(raw.get().as_bytes().to_vec())))
    }
}

/// Envelope written by older producers: `{"Data": <base64 JSON>, "Type": "json"}`.
#[derive(Deserialize)]
struct LegacyEnvelope {
    #[serde(rename = "Data", default)]
    data: Option<String>,
    #[serde(rename = "Type")]
    kind: String,
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let Some(raw) = raw_bytes(deserializer)? else {
            return Ok(Self::default());
        };
        match serde_json::from_str::<LegacyEnvelope>(raw.get()) {
            Ok(envelope) if envelope.kind == "json" => {
                let encoded = envelope
                    .data
                    .ok_or_else(|| D::Error::custom("legacy message without data"))?;
                let inner = base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(D::Error::custom)?;
                Self::from_json(inner).map_err(D::Error::custom)
            }
            _ => Ok(Self(raw.get().as_bytes().to_vec())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct MailMessage {
        mode: String,
        subject: String,
    }

    #[test]
    fn unmarshal_reports_nil_and_malformed() {
        assert!(matches!(Message::default().unmarshal::<MailMessage>(), Err(JobError::MessageNil)));

        let msg = Message::new(&json!({"mode": "noreply"})).unwrap();
        assert!(matches!(msg.unmarshal::<MailMessage>(), Err(JobError::MessageUnmarshal)));
    }

    #[test]
    fn message_round_trip_through_serde() {
        let value = json!({"mode": "noreply", "subject": "hello", "parts": [1, 2, {"a": null}]});
        let msg = Message::new(&value).unwrap();
        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.unmarshal::<serde_json::Value>().unwrap(), value);
    }

    #[test]
    fn legacy_envelope_decodes_to_inner_data() {
        let inner = br#"{"mode":"noreply","subject":"legacy"}"#;
        let data = base64::engine::general_purpose::STANDARD.encode(inner);
        let legacy = format!(r#"{{"Data":"{data}","Type":"json"}}"#);

        let from_legacy: Message = serde_json::from_str(&legacy).unwrap();
        let from_plain: Message = serde_json::from_slice(inner).unwrap();
        assert_eq!(from_legacy, from_plain);
        assert_eq!(
            from_legacy.unmarshal::<MailMessage>().unwrap(),
            MailMessage { mode: "noreply".into(), subject: "legacy".into() }
        );
    }

    #[test]
    fn objects_with_other_type_are_kept_verbatim() {
        let plain = r#"{"Type":"text","Data":"aGk="}"#;
        let msg: Message = serde_json::from_str(plain).unwrap();
        assert_eq!(msg.as_bytes(), plain.as_bytes());
    }

    #[test]
    fn null_decodes_to_empty_and_encodes_back_to_null() {
        let event: Event = serde_json::from_str("null").unwrap();
        assert!(event.is_empty());
        assert_eq!(serde_json::to_string(&event).unwrap(), "null");
    }

    #[test]
    fn clones_do_not_share_bytes() {
        let original = Payload::new(&json!({"k": "v"})).unwrap();
        let mut cloned = original.clone();
        cloned.clear();
        assert!(!original.is_empty());
        assert!(cloned.is_empty());
    }
}
