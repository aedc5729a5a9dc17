//! Datagram transport abstraction
//!
//! The [`DatagramTransport`] trait is the only way the protocol engine touches
//! the network. It lets the same forwarding and origination logic run over a
//! real UDP socket and over [`MockNetwork`](crate::MockNetwork) in tests.
//!
//! ## Implementations
//!
//! - [`MockSocket`](crate::MockSocket): In-memory transport (in this crate)
//! - `UdpTransport`: Real UDP socket (in the floodmesh-node crate)

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::error::{RecvError, SendError};
use crate::peer::PeerEndpoint;

/// Maximum datagram size a node accepts
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// Unreliable, unacknowledged datagram transport
///
/// Sends are fire-and-forget: success means the datagram left this node,
/// not that anyone received it.
#[async_trait]
pub trait DatagramTransport: Send + Sync {
    /// Send one datagram to `target`
    async fn send_to(&self, data: &[u8], target: &PeerEndpoint) -> Result<(), SendError>;

    /// Wait for the next inbound datagram
    ///
    /// Returns the payload and the sender's address.
    async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), RecvError>;

    /// Address this transport is bound to, if known
    fn local_addr(&self) -> Option<SocketAddr>;
}
