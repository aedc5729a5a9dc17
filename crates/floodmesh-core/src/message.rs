//! Flooded messages and their wire format
//!
//! A message travels as a single JSON object per datagram, with no framing:
//!
//! ```text
//! {"id": "…", "src": "node1", "payload": {"temperature": 24.3},
//!  "hop": 1, "ttl": 10, "ts": 1700000000.5}
//! ```

use std::collections::BTreeMap;
use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Opaque unique identifier of a flooded message
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Create a fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Named numeric sensor fields carried by a message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorPayload(BTreeMap<String, f64>);

impl SensorPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reading, replacing any previous value for the same field
    pub fn with(mut self, field: impl Into<String>, value: f64) -> Self {
        self.0.insert(field.into(), value);
        self
    }

    pub fn get(&self, field: &str) -> Option<f64> {
        self.0.get(field).copied()
    }
}

impl<K: Into<String>, const N: usize> From<[(K, f64); N]> for SensorPayload {
    fn from(fields: [(K, f64); N]) -> Self {
        Self(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// A sensor reading being flooded through the mesh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier, fixed at origination
    pub id: MessageId,
    /// Node that originated the message
    #[serde(rename = "src")]
    pub source: String,
    /// The sensor reading
    pub payload: SensorPayload,
    /// Number of nodes that have handled this copy (1 at the origin)
    pub hop: u32,
    /// Remaining relay budget
    pub ttl: i32,
    /// UNIX time of origination in seconds
    #[serde(rename = "ts")]
    pub origin_time: f64,
}

impl Message {
    /// Create a new message at its origin
    pub fn originate(source: impl Into<String>, payload: SensorPayload, ttl: i32) -> Self {
        Self {
            id: MessageId::generate(),
            source: source.into(),
            payload,
            hop: 1,
            ttl,
            origin_time: unix_timestamp(Utc::now()),
        }
    }

    /// The copy handed on by a relaying node: one more hop, one less TTL
    pub fn relayed(&self) -> Self {
        Self {
            hop: self.hop.saturating_add(1),
            ttl: self.ttl.saturating_sub(1),
            ..self.clone()
        }
    }

    /// Whether this copy may still be rebroadcast
    pub fn can_relay(&self) -> bool {
        self.ttl > 0
    }

    /// Serialize to a datagram payload
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse a datagram payload
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let message: Self = serde_json::from_slice(data)?;

        if message.id.as_str().is_empty() {
            return Err(DecodeError::Invalid("empty message id".to_string()));
        }
        if message.hop == 0 {
            return Err(DecodeError::Invalid("hop must be at least 1".to_string()));
        }

        Ok(message)
    }
}

/// Fractional UNIX seconds, the timestamp format used on the wire and in the event log
pub fn unix_timestamp(time: DateTime<Utc>) -> f64 {
    time.timestamp_micros() as f64 / 1_000_000.0
}
