//! # Floodmesh Core
//!
//! Core types, errors and transport traits for the floodmesh sensor network.
//!
//! Every node in the mesh speaks the same tiny protocol: one JSON [`Message`]
//! per UDP datagram, relayed to neighbors until its TTL runs out. This crate
//! holds the pieces shared by every node and by the test harnesses:
//!
//! ## Key Types
//!
//! - [`Message`]: The flooded sensor reading as it travels on the wire
//! - [`LogEvent`]: The record a node appends when it accepts a message
//! - [`PeerEndpoint`] / [`PeerSet`]: Neighbor addressing and snapshots
//!
//! ## Key Traits
//!
//! - [`DatagramTransport`]: Fire-and-forget datagram send/receive, implemented
//!   over UDP by `floodmesh-node` and in memory by [`MockNetwork`]

pub mod error;
pub mod event;
pub mod message;
pub mod mock_transport;
pub mod peer;
pub mod transport;

// Re-export main types
pub use error::*;
pub use event::*;
pub use message::*;
pub use mock_transport::*;
pub use peer::*;
pub use transport::*;
