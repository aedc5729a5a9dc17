//! Receipt events

use std::net::{IpAddr, SocketAddr};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::message::{Message, MessageId, SensorPayload, unix_timestamp};

/// One accepted receipt of a message at a node
///
/// Serialized as one line of the node's event log. The field names are the
/// schema consumed by downstream analytics and must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Node that accepted the message
    #[serde(rename = "node")]
    pub receiving_node: String,
    /// IP address of the immediate sender
    #[serde(rename = "from")]
    pub sender_address: IpAddr,
    /// Identifier of the accepted message
    #[serde(rename = "msg_id")]
    pub message_id: MessageId,
    /// Hop count after this node's increment
    pub hop: u32,
    /// TTL after this node's decrement
    #[serde(rename = "ttl")]
    pub ttl_remaining: i32,
    /// The sensor reading
    pub payload: SensorPayload,
    /// UNIX time of receipt in seconds
    #[serde(rename = "timestamp")]
    pub receipt_time: f64,
}

impl LogEvent {
    /// Record the receipt of `message` (already hop/ttl-updated) from `sender`
    pub fn receipt(
        receiving_node: impl Into<String>,
        sender: SocketAddr,
        message: &Message,
    ) -> Self {
        Self {
            receiving_node: receiving_node.into(),
            sender_address: sender.ip(),
            message_id: message.id.clone(),
            hop: message.hop,
            ttl_remaining: message.ttl,
            payload: message.payload.clone(),
            receipt_time: unix_timestamp(Utc::now()),
        }
    }

    /// Serialize as a single event log line, without the trailing newline
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
