//! Error types for the floodmesh network
//!
//! Each error type maps to one failure scope. Only [`BindError`] and
//! [`ConfigError`] stop a node; everything else is handled where it occurs
//! and the node keeps running in degraded form.

use thiserror::Error;

/// Top-level error for node start-up
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Bind error: {0}")]
    Bind(#[from] BindError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Peer discovery failed
///
/// Never fatal: the previous peer set stays in use and the lookup is
/// retried at the next scheduled refresh.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Lookup of {name} failed: {reason}")]
    Lookup { name: String, reason: String },

    #[error("Lookup of {name} returned no peers")]
    NoPeers { name: String },
}

/// The listening socket could not be acquired
#[derive(Debug, Error)]
pub enum BindError {
    #[error("Failed to bind UDP port {port}: {source}")]
    Io {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// Transmission to a single target failed
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Send to {target} failed: {source}")]
    Io {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Peer {target} is unreachable")]
    Unreachable { target: String },

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A datagram could not be received
#[derive(Debug, Error)]
pub enum RecvError {
    #[error("Receive failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport closed")]
    Closed,
}

/// An inbound datagram is not a valid message
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid message: {0}")]
    Invalid(String),
}

/// Appending to the event log failed
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Event log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Event serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration rejected at start-up
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Node name must not be empty")]
    EmptyNodeName,

    #[error("Invalid peer endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Discovery name must not be empty")]
    EmptyDiscoveryName,

    #[error("Initial TTL must be positive, got {0}")]
    InvalidTtl(i32),

    #[error("Loss probability must be within [0, 1], got {0}")]
    InvalidLossProbability(f64),

    #[error("Invalid fan-out bounds: min {min}, max {max}")]
    InvalidFanOut { min: usize, max: usize },

    #[error("Invalid fan-out: {0}")]
    UnparsableFanOut(String),

    #[error("{0} must be non-zero")]
    ZeroDuration(&'static str),

    #[error("Dedup cache capacity must be non-zero")]
    ZeroDedupCapacity,
}

/// Result type alias for node start-up
pub type NodeResult<T> = Result<T, NodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_error_display() {
        let err = ResolutionError::Lookup {
            name: "mesh-node".to_string(),
            reason: "timeout".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("mesh-node"));
        assert!(msg.contains("timeout"));

        let err = ResolutionError::NoPeers {
            name: "mesh-node".to_string(),
        };
        assert!(format!("{}", err).contains("no peers"));
    }

    #[test]
    fn test_bind_error_display() {
        let err = BindError::Io {
            port: 5001,
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("5001"));
        assert!(msg.contains("in use"));
    }

    #[test]
    fn test_config_error_display() {
        assert!(format!("{}", ConfigError::InvalidTtl(0)).contains("0"));
        assert!(format!("{}", ConfigError::InvalidLossProbability(1.5)).contains("1.5"));
        let zero = ConfigError::ZeroDuration("origination interval");
        assert!(format!("{}", zero).contains("origination interval"));

        let err = ConfigError::InvalidFanOut { min: 4, max: 2 };
        let msg = format!("{}", err);
        assert!(msg.contains("4"));
        assert!(msg.contains("2"));
    }

    #[test]
    fn test_error_conversions() {
        let bind_err = BindError::Io {
            port: 1,
            source: std::io::Error::other("denied"),
        };
        let node_err: NodeError = bind_err.into();
        assert!(matches!(node_err, NodeError::Bind(_)));

        let node_err: NodeError = ConfigError::EmptyNodeName.into();
        assert!(matches!(node_err, NodeError::Config(_)));
        assert!(format!("{}", node_err).contains("Configuration error"));
    }
}
