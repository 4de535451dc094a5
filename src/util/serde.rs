//! Serde helpers for the persisted job record.

/// Skip predicate for boolean flags written only when set.
#[allow(clippy::trivially_copy_pass_by_ref)]
#[must_use]
pub const fn is_false(value: &bool) -> bool {
    !*value
}

/// Optional timestamps stored as RFC 3339, where the unset value is written
/// as the zero time `0001-01-01T00:00:00Z` (older records use it too).
pub mod zero_time {
    use chrono::{DateTime, Datelike, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Zero time literal.
    pub const ZERO: &str = "0001-01-01T00:00:00Z";

    /// Serialize `None` as the zero time.
    ///
    /// # Errors
    ///
    /// Propagates the serializer error.
    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(at) => serializer.serialize_str(&at.to_rfc3339()),
            None => serializer.serialize_str(ZERO),
        }
    }

    /// Deserialize the zero time, `null` or a missing field as `None`.
    ///
    /// # Errors
    ///
    /// Fails on strings that are not RFC 3339 timestamps.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let at = DateTime::parse_from_rfc3339(&raw)
            .map_err(serde::de::Error::custom)?
            .with_timezone(&Utc);
        Ok((at.year() > 1).then_some(at))
    }
}

/// Durations stored as integer nanoseconds.
pub mod duration_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as nanoseconds, saturating at `u64::MAX`.
    ///
    /// # Errors
    ///
    /// Propagates the serializer error.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_nanos()).unwrap_or(u64::MAX))
    }

    /// Deserialize from nanoseconds.
    ///
    /// # Errors
    ///
    /// Fails on negative or non-integer values.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_nanos)
    }
}
