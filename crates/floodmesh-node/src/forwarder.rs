//! Flood forwarder
//!
//! Runs on every node. Each inbound datagram is decoded, checked against the
//! dedup cache, logged once, and rebroadcast while its TTL lasts:
//!
//! ```text
//! datagram -> decode -> first sighting? -> hop+1, ttl-1 -> log -> ttl > 0? -> fan out
//!               |             |                                      |
//!           Malformed     Duplicate                               Terminal
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, instrument, trace, warn};

use floodmesh_core::{DatagramTransport, LogEvent, Message, PeerEndpoint, RecvError};

use crate::event_log::EventSink;
use crate::fanout::{FanOut, deliver};
use crate::state::{NodeState, NodeStats};

/// Pause after a receive error before trying again
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// What became of one inbound datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Could not be decoded; nothing changed
    Malformed,
    /// Already seen; nothing changed
    Duplicate,
    /// Accepted and logged, TTL exhausted
    Terminal,
    /// Accepted, logged and rebroadcast
    Relayed { sent: usize, failed: usize },
}

/// Receive loop of a node
pub struct FloodForwarder {
    state: Arc<NodeState>,
    transport: Arc<dyn DatagramTransport>,
    events: Arc<dyn EventSink>,
    fanout: FanOut,
    /// Leave the immediate sender out of the relay targets
    exclude_sender: bool,
}

impl FloodForwarder {
    pub fn new(
        state: Arc<NodeState>,
        transport: Arc<dyn DatagramTransport>,
        events: Arc<dyn EventSink>,
        fanout: FanOut,
        exclude_sender: bool,
    ) -> Self {
        Self {
            state,
            transport,
            events,
            fanout,
            exclude_sender,
        }
    }

    /// Receive and handle datagrams until the transport closes
    ///
    /// Peer refreshes run elsewhere (see [`PeerDirectory::keep_fresh`]); this
    /// loop only reads the current snapshot.
    ///
    /// [`PeerDirectory::keep_fresh`]: crate::directory::PeerDirectory::keep_fresh
    #[instrument(name = "forwarder", skip_all)]
    pub async fn run(self) {
        info!("Forwarder listening");

        loop {
            match self.transport.recv_from().await {
                Ok((data, from)) => {
                    self.handle_datagram(&data, from).await;
                }
                Err(RecvError::Closed) => {
                    info!("Transport closed, forwarder stopping");
                    return;
                }
                Err(e) => {
                    error!(error = %e, "Receive failed");
                    tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                }
            }
        }
    }

    /// Process one inbound datagram from `from`
    pub async fn handle_datagram(&self, data: &[u8], from: SocketAddr) -> Disposition {
        let stats = &self.state.stats;
        NodeStats::incr(&stats.received);

        let message = match Message::decode(data) {
            Ok(message) => message,
            Err(e) => {
                warn!(from = %from, error = %e, "Discarding malformed datagram");
                NodeStats::incr(&stats.malformed);
                return Disposition::Malformed;
            }
        };

        if !self.state.dedup.test_and_insert(&message.id) {
            trace!(msg_id = %message.id, from = %from, "Duplicate");
            NodeStats::incr(&stats.duplicates);
            return Disposition::Duplicate;
        }

        let message = message.relayed();
        info!(
            msg_id = %message.id,
            from = %from.ip(),
            hop = message.hop,
            ttl = message.ttl,
            "Received message"
        );

        let event = LogEvent::receipt(&self.state.node_id, from, &message);
        match self.events.append(&event).await {
            Ok(()) => NodeStats::incr(&stats.logged),
            Err(e) => {
                warn!(msg_id = %message.id, error = %e, "Failed to persist event");
                NodeStats::incr(&stats.persist_failures);
            }
        }

        if !message.can_relay() {
            debug!(msg_id = %message.id, "TTL exhausted, not relaying");
            NodeStats::incr(&stats.terminal);
            return Disposition::Terminal;
        }

        let data = match message.encode() {
            Ok(data) => data,
            Err(e) => {
                error!(msg_id = %message.id, error = %e, "Failed to encode relay copy");
                return Disposition::Relayed { sent: 0, failed: 0 };
            }
        };

        let targets = self.fanout.select(self.candidates(from));
        let delivery = deliver(self.transport.as_ref(), &data, &targets).await;
        NodeStats::add(&stats.relayed, delivery.sent);
        NodeStats::add(&stats.send_failures, delivery.failed);

        debug!(
            msg_id = %message.id,
            sent = delivery.sent,
            failed = delivery.failed,
            "Relayed message"
        );
        Disposition::Relayed {
            sent: delivery.sent,
            failed: delivery.failed,
        }
    }

    fn candidates(&self, from: SocketAddr) -> Vec<PeerEndpoint> {
        let snapshot = self.state.peers.snapshot();
        snapshot
            .endpoints()
            .filter(|peer| !(self.exclude_sender && peer.matches_ip(from.ip())))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::DedupCache;
    use crate::directory::PeerDirectory;
    use crate::event_log::MemoryEventLog;
    use async_trait::async_trait;
    use floodmesh_core::{MockNetwork, PersistError, SendError, SensorPayload};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn addr(last: u8) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, last], 5000))
    }

    fn endpoint(last: u8) -> PeerEndpoint {
        PeerEndpoint::new(format!("10.0.0.{}", last), 5000)
    }

    struct Fixture {
        network: MockNetwork,
        forwarder: FloodForwarder,
        events: Arc<MemoryEventLog>,
        state: Arc<NodeState>,
    }

    async fn node_state(peers: Vec<PeerEndpoint>) -> Arc<NodeState> {
        let directory = PeerDirectory::fixed(peers);
        directory.resolve().await.unwrap();
        Arc::new(NodeState::new("node1", DedupCache::default(), directory))
    }

    async fn fixture(peers: Vec<PeerEndpoint>, exclude_sender: bool) -> Fixture {
        let network = MockNetwork::new();
        let socket = Arc::new(network.bind(endpoint(1), addr(1)));
        let state = node_state(peers).await;
        let events = Arc::new(MemoryEventLog::new());
        let forwarder = FloodForwarder::new(
            Arc::clone(&state),
            socket,
            events.clone(),
            FanOut::All,
            exclude_sender,
        );

        Fixture {
            network,
            forwarder,
            events,
            state,
        }
    }

    fn message(ttl: i32) -> Message {
        Message::originate("node9", SensorPayload::from([("temperature", 25.0)]), ttl)
    }

    #[tokio::test]
    async fn test_relays_with_updated_counters() {
        let f = fixture(vec![endpoint(2), endpoint(3)], false).await;
        let original = message(5);

        let disposition = f
            .forwarder
            .handle_datagram(&original.encode().unwrap(), addr(2))
            .await;
        assert_eq!(disposition, Disposition::Relayed { sent: 2, failed: 0 });

        let events = f.events.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].hop, 2);
        assert_eq!(events[0].ttl_remaining, 4);
        assert_eq!(events[0].sender_address, addr(2).ip());

        let sent = f.network.sent_from(addr(1));
        assert_eq!(sent.len(), 2);
        let copy = Message::decode(&sent[0].data).unwrap();
        assert_eq!(copy.id, original.id);
        assert_eq!((copy.hop, copy.ttl), (2, 4));
    }

    #[tokio::test]
    async fn test_duplicate_is_noop() {
        let f = fixture(vec![endpoint(2)], false).await;
        let data = message(5).encode().unwrap();

        f.forwarder.handle_datagram(&data, addr(2)).await;
        f.network.clear_sent();

        assert_eq!(f.forwarder.handle_datagram(&data, addr(3)).await, Disposition::Duplicate);
        assert_eq!(f.events.len(), 1);
        assert!(f.network.sent().is_empty());
        assert_eq!(f.state.stats.snapshot().duplicates, 1);
    }

    #[tokio::test]
    async fn test_last_hop_logs_without_sending() {
        let f = fixture(vec![endpoint(2)], false).await;

        let disposition = f
            .forwarder
            .handle_datagram(&message(1).encode().unwrap(), addr(2))
            .await;

        assert_eq!(disposition, Disposition::Terminal);
        assert_eq!(f.events.events()[0].ttl_remaining, 0);
        assert!(f.network.sent().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_leaves_state_untouched() {
        let f = fixture(vec![endpoint(2)], false).await;

        let inputs: [&[u8]; 3] = [b"not json", br#"{"id":"x"}"#, b""];
        for data in inputs {
            assert_eq!(f.forwarder.handle_datagram(data, addr(2)).await, Disposition::Malformed);
        }

        assert!(f.state.dedup.is_empty());
        assert!(f.events.is_empty());
        assert_eq!(f.state.stats.snapshot().malformed, 3);
    }

    #[tokio::test]
    async fn test_exclude_sender() {
        let f = fixture(vec![endpoint(2), endpoint(3)], true).await;

        let disposition = f
            .forwarder
            .handle_datagram(&message(5).encode().unwrap(), addr(2))
            .await;

        assert_eq!(disposition, Disposition::Relayed { sent: 1, failed: 0 });
        assert_eq!(f.network.sent()[0].to, endpoint(3));
    }

    #[tokio::test]
    async fn test_failed_target_does_not_block_others() {
        let f = fixture(vec![endpoint(2), endpoint(3), endpoint(4)], false).await;
        f.network.set_unreachable(&endpoint(3), true);

        let disposition = f
            .forwarder
            .handle_datagram(&message(5).encode().unwrap(), addr(9))
            .await;

        assert_eq!(disposition, Disposition::Relayed { sent: 2, failed: 1 });
        assert_eq!(f.state.stats.snapshot().send_failures, 1);
    }

    /// Sink whose every append fails
    struct FailingSink;

    #[async_trait]
    impl EventSink for FailingSink {
        async fn append(&self, _event: &LogEvent) -> Result<(), PersistError> {
            Err(PersistError::Io(std::io::Error::other("disk full")))
        }
    }

    #[tokio::test]
    async fn test_persist_failure_still_relays() {
        let network = MockNetwork::new();
        let socket = Arc::new(network.bind(endpoint(1), addr(1)));
        let state = node_state(vec![endpoint(2), endpoint(3)]).await;
        let forwarder = FloodForwarder::new(
            Arc::clone(&state),
            socket,
            Arc::new(FailingSink),
            FanOut::All,
            false,
        );

        let disposition = forwarder
            .handle_datagram(&message(5).encode().unwrap(), addr(9))
            .await;
        assert_eq!(disposition, Disposition::Relayed { sent: 2, failed: 0 });

        let stats = state.stats.snapshot();
        assert_eq!(stats.persist_failures, 1);
        assert_eq!(stats.logged, 0);
        assert_eq!(stats.relayed, 2);
        assert_eq!(network.sent_from(addr(1)).len(), 2);
    }

    /// Transport whose receives always fail
    #[derive(Default)]
    struct BrokenTransport {
        recvs: AtomicUsize,
    }

    #[async_trait]
    impl DatagramTransport for BrokenTransport {
        async fn send_to(&self, _data: &[u8], target: &PeerEndpoint) -> Result<(), SendError> {
            Err(SendError::Unreachable {
                target: target.to_string(),
            })
        }

        async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), RecvError> {
            self.recvs.fetch_add(1, Ordering::SeqCst);
            Err(RecvError::Io(std::io::Error::other("socket error")))
        }

        fn local_addr(&self) -> Option<SocketAddr> {
            None
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_errors_back_off() {
        let transport = Arc::new(BrokenTransport::default());
        let forwarder = FloodForwarder::new(
            node_state(vec![endpoint(2)]).await,
            transport.clone(),
            Arc::new(MemoryEventLog::new()),
            FanOut::All,
            false,
        );

        let task = tokio::spawn(forwarder.run());
        tokio::time::sleep(RECV_ERROR_BACKOFF * 5 + RECV_ERROR_BACKOFF / 2).await;
        task.abort();

        assert_eq!(transport.recvs.load(Ordering::SeqCst), 6);
    }
}
