//! # Floodmesh Node
//!
//! Flood routing node for the floodmesh sensor network.
//!
//! This crate provides [`FloodNode`], which ties together:
//! - A [`PeerDirectory`] of neighbors, fixed or discovered through DNS
//! - A bounded [`DedupCache`] so each message is handled once per node
//! - The [`FloodForwarder`] receive loop, run on every node
//! - The [`MessageOriginator`], run on the seed node only
//! - An [`EventSink`] receiving one [`LogEvent`](floodmesh_core::LogEvent) per accepted message
//!
//! ## Example
//!
//! ```rust,ignore
//! use floodmesh_node::{FloodNode, NodeConfig};
//!
//! let config = NodeConfig::discovery("node1", 5000).with_seed(true);
//! let node = FloodNode::bind(config).await?;
//! let stats = node.run().await;
//! ```

pub mod config;
pub mod dedup;
pub mod directory;
pub mod event_log;
pub mod fanout;
pub mod forwarder;
pub mod loss;
pub mod originator;
pub mod state;
pub mod transport;

pub use config::{NodeConfig, PeerSource};
pub use dedup::{DedupCache, DedupConfig};
pub use directory::{DnsResolver, PeerDirectory, PeerResolver};
pub use event_log::{EventSink, JsonlEventLog, MemoryEventLog};
pub use fanout::{Delivery, FanOut};
pub use forwarder::{Disposition, FloodForwarder};
pub use loss::LossSimulator;
pub use originator::{Cycle, MessageOriginator, OriginatorConfig};
pub use state::{NodeState, NodeStats, StatsSnapshot};
pub use transport::UdpTransport;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{Instrument, info, warn};

use floodmesh_core::{DatagramTransport, NodeResult};

/// A single mesh node
pub struct FloodNode {
    config: NodeConfig,
    state: Arc<NodeState>,
    transport: Arc<dyn DatagramTransport>,
    events: Arc<dyn EventSink>,
}

impl FloodNode {
    /// Validate `config`, bind its UDP port and resolve the initial peers
    ///
    /// Failing to bind is fatal. Failing to resolve peers is not: the node
    /// starts with an empty peer set and retries on the next refresh.
    pub async fn bind(config: NodeConfig) -> NodeResult<Self> {
        config.validate()?;

        let transport = UdpTransport::bind(config.listen_port).await?;
        info!(
            node = %config.node_id,
            addr = ?transport.local_addr(),
            "Bound UDP socket"
        );

        let events = Arc::new(JsonlEventLog::new(&config.event_log));
        let peers = directory_for(&config).await;
        Ok(Self::assemble(config, Arc::new(transport), events, peers).await)
    }

    /// Build a node over caller-supplied parts, e.g. a mock transport
    pub async fn with_parts(
        config: NodeConfig,
        transport: Arc<dyn DatagramTransport>,
        events: Arc<dyn EventSink>,
        peers: PeerDirectory,
    ) -> NodeResult<Self> {
        config.validate()?;
        Ok(Self::assemble(config, transport, events, peers).await)
    }

    async fn assemble(
        config: NodeConfig,
        transport: Arc<dyn DatagramTransport>,
        events: Arc<dyn EventSink>,
        peers: PeerDirectory,
    ) -> Self {
        let state = Arc::new(NodeState::new(
            config.node_id.clone(),
            DedupCache::new(config.dedup),
            peers,
        ));

        match state.peers.resolve().await {
            Ok(set) => info!(node = %state.node_id, peers = set.len(), "Resolved initial peers"),
            Err(e) => warn!(
                node = %state.node_id,
                error = %e,
                "Initial peer resolution failed, starting with no peers"
            ),
        }

        Self {
            config,
            state,
            transport,
            events,
        }
    }

    /// Start the forwarder, the peer refresher of a discovery node and the
    /// originator of a seed node
    pub fn spawn(self) -> NodeHandle {
        let span = floodmesh_logging::node_span(&self.state.node_id);

        let forwarder = FloodForwarder::new(
            Arc::clone(&self.state),
            Arc::clone(&self.transport),
            Arc::clone(&self.events),
            self.config.fanout,
            self.config.exclude_sender,
        );
        let forwarder = tokio::spawn(forwarder.run().instrument(span.clone()));

        let refresher = self.state.peers.refresh_interval().map(|interval| {
            let state = Arc::clone(&self.state);
            info!(
                node = %state.node_id,
                interval_secs = interval.as_secs_f64(),
                "Peer refresher starting"
            );
            tokio::spawn(async move { state.peers.keep_fresh().await }.instrument(span.clone()))
        });

        let originator = self.config.seed.then(|| {
            let originator = MessageOriginator::new(
                Arc::clone(&self.state),
                Arc::clone(&self.transport),
                LossSimulator::new(self.config.loss_probability),
                self.config.originator(),
            );
            tokio::spawn(originator.run().instrument(span.clone()))
        });

        info!(
            node = %self.state.node_id,
            seed = self.config.seed,
            discovery = self.config.is_discovery(),
            "Node started"
        );

        NodeHandle {
            state: self.state,
            forwarder,
            refresher,
            originator,
        }
    }

    /// Run until a task ends or Ctrl-C is received
    pub async fn run(self) -> StatsSnapshot {
        self.spawn().wait().await
    }
}

/// Handle to a running node
pub struct NodeHandle {
    state: Arc<NodeState>,
    forwarder: JoinHandle<()>,
    refresher: Option<JoinHandle<()>>,
    originator: Option<JoinHandle<()>>,
}

impl NodeHandle {
    pub fn state(&self) -> &Arc<NodeState> {
        &self.state
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.state.stats.snapshot()
    }

    /// Wait for the forwarder or originator to end or for Ctrl-C, then shut down
    pub async fn wait(self) -> StatsSnapshot {
        let Self {
            state,
            mut forwarder,
            refresher,
            mut originator,
        } = self;

        tokio::select! {
            _ = &mut forwarder => warn!(node = %state.node_id, "Forwarder task ended"),
            _ = async {
                match originator.as_mut() {
                    Some(handle) => {
                        let _ = handle.await;
                    }
                    None => std::future::pending::<()>().await,
                }
            } => warn!(node = %state.node_id, "Originator task ended"),
            _ = ctrl_c() => info!(node = %state.node_id, "Received Ctrl-C"),
        }

        Self {
            state,
            forwarder,
            refresher,
            originator,
        }
        .shutdown()
    }

    /// Abort every task and return the final counters
    pub fn shutdown(self) -> StatsSnapshot {
        self.forwarder.abort();
        for task in self.refresher.iter().chain(self.originator.iter()) {
            task.abort();
        }

        let stats = self.state.stats.snapshot();
        info!(
            node = %self.state.node_id,
            received = stats.received,
            duplicates = stats.duplicates,
            malformed = stats.malformed,
            logged = stats.logged,
            relayed = stats.relayed,
            terminal = stats.terminal,
            originated = stats.originated,
            loss_drops = stats.loss_drops,
            send_failures = stats.send_failures,
            persist_failures = stats.persist_failures,
            "Node stopped"
        );
        stats
    }
}

/// Build the peer directory `config` asks for
pub async fn directory_for(config: &NodeConfig) -> PeerDirectory {
    match &config.peers {
        PeerSource::Static(peers) => PeerDirectory::fixed(peers.clone()),
        PeerSource::Discovery {
            name,
            port,
            refresh_interval,
        } => {
            let local_addrs = match &config.local_addrs {
                Some(addrs) => addrs.clone(),
                None => directory::local_addresses().await,
            };
            PeerDirectory::discovered(
                Arc::new(DnsResolver::new(name.clone())),
                *port,
                local_addrs,
                *refresh_interval,
            )
        }
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
