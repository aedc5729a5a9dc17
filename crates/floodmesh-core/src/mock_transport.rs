//! Mock transport implementation for testing
//!
//! Provides an in-memory datagram network for exercising the forwarding and
//! origination logic without real sockets.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use floodmesh_core::{DatagramTransport, MockNetwork, PeerEndpoint};
//!
//! let network = MockNetwork::new();
//! let a = network.bind(PeerEndpoint::new("nodeA", 5000), "10.0.0.1:5000".parse()?);
//! let b = network.bind(PeerEndpoint::new("nodeB", 5000), "10.0.0.2:5000".parse()?);
//!
//! a.send_to(b"hello", b.endpoint()).await?;
//! let (data, from) = b.recv_from().await?;
//! assert_eq!(from, a.local_addr().unwrap());
//! ```
//!
//! Like UDP, datagrams addressed to an endpoint nobody is bound to vanish
//! without an error, and a full inbox drops the datagram. Endpoints can be
//! marked unreachable to make sends fail explicitly.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{RecvError, SendError};
use crate::peer::PeerEndpoint;
use crate::transport::DatagramTransport;

type Datagram = (Vec<u8>, SocketAddr);

/// A datagram that left a mock socket
#[derive(Debug, Clone)]
pub struct SentDatagram {
    /// Address of the sending socket
    pub from: SocketAddr,
    /// Endpoint it was addressed to
    pub to: PeerEndpoint,
    /// The payload
    pub data: Vec<u8>,
}

struct NetworkInner {
    /// Inbox senders of bound sockets
    mailboxes: DashMap<PeerEndpoint, mpsc::Sender<Datagram>>,
    /// Endpoints whose sends fail
    unreachable: Mutex<HashSet<PeerEndpoint>>,
    /// Every datagram successfully sent, in send order
    sent: Mutex<Vec<SentDatagram>>,
    /// Inbox capacity per socket
    buffer_size: usize,
}

/// A shared in-memory datagram network
#[derive(Clone)]
pub struct MockNetwork {
    inner: Arc<NetworkInner>,
}

impl Default for MockNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNetwork {
    /// Create an empty network with the default inbox capacity
    pub fn new() -> Self {
        Self::with_buffer_size(1024)
    }

    /// Create an empty network with a specific inbox capacity
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            inner: Arc::new(NetworkInner {
                mailboxes: DashMap::new(),
                unreachable: Mutex::new(HashSet::new()),
                sent: Mutex::new(Vec::new()),
                buffer_size,
            }),
        }
    }

    /// Bind a socket reachable at `endpoint` that reports `addr` as its source address
    ///
    /// Rebinding an endpoint replaces the previous socket's inbox.
    pub fn bind(&self, endpoint: PeerEndpoint, addr: SocketAddr) -> MockSocket {
        let (tx, rx) = mpsc::channel(self.inner.buffer_size);
        self.inner.mailboxes.insert(endpoint.clone(), tx);

        MockSocket {
            endpoint,
            addr,
            network: self.clone(),
            inbox: tokio::sync::Mutex::new(rx),
        }
    }

    /// Make sends to `endpoint` fail (or succeed again)
    pub fn set_unreachable(&self, endpoint: &PeerEndpoint, unreachable: bool) {
        let mut set = self.inner.unreachable.lock();
        if unreachable {
            set.insert(endpoint.clone());
        } else {
            set.remove(endpoint);
        }
    }

    /// Deliver a raw datagram to `to` as if it came from `from`
    ///
    /// Returns false if nobody is bound at `to` or its inbox is full.
    pub fn inject(&self, to: &PeerEndpoint, data: Vec<u8>, from: SocketAddr) -> bool {
        match self.inner.mailboxes.get(to) {
            Some(tx) => tx.try_send((data, from)).is_ok(),
            None => false,
        }
    }

    /// All datagrams sent so far
    pub fn sent(&self) -> Vec<SentDatagram> {
        self.inner.sent.lock().clone()
    }

    /// Datagrams sent by the socket bound with source address `from`
    pub fn sent_from(&self, from: SocketAddr) -> Vec<SentDatagram> {
        self.inner
            .sent
            .lock()
            .iter()
            .filter(|d| d.from == from)
            .cloned()
            .collect()
    }

    /// Forget the send history
    pub fn clear_sent(&self) {
        self.inner.sent.lock().clear();
    }

    fn deliver(
        &self,
        from: SocketAddr,
        target: &PeerEndpoint,
        data: &[u8],
    ) -> Result<(), SendError> {
        if self.inner.unreachable.lock().contains(target) {
            return Err(SendError::Unreachable {
                target: target.to_string(),
            });
        }

        self.inner.sent.lock().push(SentDatagram {
            from,
            to: target.clone(),
            data: data.to_vec(),
        });

        if let Some(tx) = self.inner.mailboxes.get(target) {
            // Full or closed inbox: the datagram is lost, as with UDP
            let _ = tx.try_send((data.to_vec(), from));
        }

        Ok(())
    }
}

/// A socket on a [`MockNetwork`]
pub struct MockSocket {
    /// Endpoint other sockets address us by
    endpoint: PeerEndpoint,
    /// Source address reported to receivers
    addr: SocketAddr,
    /// The network we are bound to
    network: MockNetwork,
    /// Incoming datagrams
    inbox: tokio::sync::Mutex<mpsc::Receiver<Datagram>>,
}

impl MockSocket {
    /// Endpoint other sockets address us by
    pub fn endpoint(&self) -> &PeerEndpoint {
        &self.endpoint
    }
}

#[async_trait]
impl DatagramTransport for MockSocket {
    async fn send_to(&self, data: &[u8], target: &PeerEndpoint) -> Result<(), SendError> {
        self.network.deliver(self.addr, target, data)
    }

    async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), RecvError> {
        let mut inbox = self.inbox.lock().await;
        inbox.recv().await.ok_or(RecvError::Closed)
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, last], 5000))
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let network = MockNetwork::new();
        let a = network.bind(PeerEndpoint::new("nodeA", 5000), addr(1));
        let b = network.bind(PeerEndpoint::new("nodeB", 5000), addr(2));

        a.send_to(b"hello", b.endpoint()).await.unwrap();
        let (data, from) = b.recv_from().await.unwrap();

        assert_eq!(data, b"hello");
        assert_eq!(from, addr(1));
        assert_eq!(network.sent_from(addr(1)).len(), 1);
    }

    #[test]
    fn test_inject_delivers_without_sender_socket() {
        let network = MockNetwork::new();
        let b = network.bind(PeerEndpoint::new("nodeB", 5000), addr(2));

        assert!(network.inject(b.endpoint(), b"raw".to_vec(), addr(9)));
        assert!(!network.inject(&PeerEndpoint::new("ghost", 5000), b"raw".to_vec(), addr(9)));

        let (data, from) = tokio_test::block_on(b.recv_from()).unwrap();
        assert_eq!(data, b"raw");
        assert_eq!(from, addr(9));
        assert!(network.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_to_nobody_is_silent() {
        let network = MockNetwork::new();
        let a = network.bind(PeerEndpoint::new("nodeA", 5000), addr(1));

        let result = a.send_to(b"void", &PeerEndpoint::new("ghost", 5000)).await;
        assert!(result.is_ok());
        assert_eq!(network.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails() {
        let network = MockNetwork::new();
        let a = network.bind(PeerEndpoint::new("nodeA", 5000), addr(1));
        let b = network.bind(PeerEndpoint::new("nodeB", 5000), addr(2));

        network.set_unreachable(b.endpoint(), true);
        let result = a.send_to(b"x", b.endpoint()).await;
        assert!(matches!(result, Err(SendError::Unreachable { .. })));
        assert!(network.sent().is_empty());

        network.set_unreachable(b.endpoint(), false);
        assert!(a.send_to(b"x", b.endpoint()).await.is_ok());
    }

    #[tokio::test]
    async fn test_full_inbox_drops() {
        let network = MockNetwork::with_buffer_size(1);
        let a = network.bind(PeerEndpoint::new("nodeA", 5000), addr(1));
        let b = network.bind(PeerEndpoint::new("nodeB", 5000), addr(2));

        a.send_to(b"first", b.endpoint()).await.unwrap();
        a.send_to(b"second", b.endpoint()).await.unwrap();

        let (data, _) = b.recv_from().await.unwrap();
        assert_eq!(data, b"first");

        // "second" was dropped, so the inbox has room for exactly one more
        assert!(network.inject(b.endpoint(), b"third".to_vec(), addr(1)));
        assert!(!network.inject(b.endpoint(), b"fourth".to_vec(), addr(1)));

        let (data, _) = b.recv_from().await.unwrap();
        assert_eq!(data, b"third");
    }
}
