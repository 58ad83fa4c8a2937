//! Webhook task value and its wire codec.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{RelayError, RelayResult};

/// Opaque payload bytes.
///
/// Serialized as a base64 string so arbitrary bytes survive the JSON codec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Payload(Vec<u8>);

impl Payload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lossy UTF-8 rendering for log lines.
    pub fn preview(&self, max: usize) -> String {
        let text = String::from_utf8_lossy(&self.0);
        if text.chars().count() <= max {
            text.into_owned()
        } else {
            let mut cut: String = text.chars().take(max).collect();
            cut.push('…');
            cut
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Payload)
            .map_err(serde::de::Error::custom)
    }
}

/// A unit of delivery work.
///
/// Tasks are values: there is no id, and `attempt_count` is the only retry
/// state. It travels inside the encoded task through the broker and the
/// retry schedule, and never decreases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub payload: Payload,
    /// Number of failed delivery attempts so far.
    #[serde(default)]
    pub attempt_count: u32,
    /// Set by the broker on first enqueue when absent.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Task {
    /// A fresh task with no failed attempts.
    pub fn new(payload: impl Into<Payload>) -> Self {
        Self {
            payload: payload.into(),
            attempt_count: 0,
            created_at: None,
        }
    }

    pub fn with_attempt_count(mut self, attempt_count: u32) -> Self {
        self.attempt_count = attempt_count;
        self
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Stamp `created_at` with the current time if it has never been set.
    pub fn ensure_created_at(&mut self) {
        if self.created_at.is_none() {
            self.created_at = Some(Utc::now());
        }
    }

    /// Record one more failed attempt and return the new count.
    pub fn record_failure(&mut self) -> u32 {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.attempt_count
    }

    /// Whether this task has used up `max_attempts`.
    pub fn is_exhausted(&self, max_attempts: u32) -> bool {
        self.attempt_count >= max_attempts
    }

    pub fn encode(&self) -> RelayResult<String> {
        serde_json::to_string(self).map_err(|e| RelayError::serialization(e.to_string()))
    }

    pub fn decode(raw: &str) -> RelayResult<Self> {
        serde_json::from_str(raw).map_err(|e| RelayError::serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_preserves_payload_and_attempts() {
        let task = Task::new(vec![0u8, 159, 146, 150, b'{'])
            .with_attempt_count(3)
            .with_created_at(Utc::now());

        let decoded = Task::decode(&task.encode().unwrap()).unwrap();
        assert_eq!(decoded, task);
    }

    #[test]
    fn payload_is_base64_on_the_wire() {
        let encoded = Task::new("hello").encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["payload"], "aGVsbG8=");
        assert_eq!(value["attempt_count"], 0);
        assert!(value["created_at"].is_null());
    }

    #[test]
    fn missing_optional_fields_default() {
        let task = Task::decode(r#"{"payload":"aGk="}"#).unwrap();
        assert_eq!(task.payload.as_bytes(), b"hi");
        assert_eq!(task.attempt_count, 0);
        assert!(task.created_at.is_none());
    }

    #[test]
    fn malformed_input_is_a_serialization_error() {
        assert!(matches!(
            Task::decode("not json"),
            Err(RelayError::Serialization(_))
        ));
        assert!(matches!(
            Task::decode(r#"{"payload":"%%%"}"#),
            Err(RelayError::Serialization(_))
        ));
    }

    #[test]
    fn ensure_created_at_only_sets_once() {
        let at = Utc::now() - chrono::Duration::hours(1);
        let mut task = Task::new("x").with_created_at(at);
        task.ensure_created_at();
        assert_eq!(task.created_at, Some(at));

        let mut fresh = Task::new("x");
        fresh.ensure_created_at();
        assert!(fresh.created_at.is_some());
    }

    #[test]
    fn failures_saturate_and_exhaust() {
        let mut task = Task::new("x").with_attempt_count(u32::MAX);
        assert_eq!(task.record_failure(), u32::MAX);

        let mut task = Task::new("x");
        assert!(!task.is_exhausted(2));
        task.record_failure();
        task.record_failure();
        assert!(task.is_exhausted(2));
    }

    #[test]
    fn preview_truncates_long_payloads() {
        let payload = Payload::from("abcdef");
        assert_eq!(payload.preview(10), "abcdef");
        assert_eq!(payload.preview(3), "abc…");
    }
}
