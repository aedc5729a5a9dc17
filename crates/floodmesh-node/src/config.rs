//! Configuration for a flood mesh node

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use floodmesh_core::{ConfigError, PeerEndpoint};

use crate::dedup::DedupConfig;
use crate::fanout::FanOut;
use crate::originator::OriginatorConfig;

/// Default discovery name of the headless service fronting all nodes
pub const DEFAULT_DISCOVERY_NAME: &str = "mesh-node.default.svc.cluster.local";

/// Default UDP listen port
pub const DEFAULT_LISTEN_PORT: u16 = 5000;

/// Where a node's neighbors come from
#[derive(Debug, Clone, PartialEq)]
pub enum PeerSource {
    /// A fixed list, e.g. generated alongside a compose topology
    Static(Vec<PeerEndpoint>),
    /// Every address registered under `name`, re-resolved periodically
    Discovery {
        name: String,
        /// Port every discovered peer listens on
        port: u16,
        refresh_interval: Duration,
    },
}

/// Configuration for a FloodNode
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Name this node logs under
    pub node_id: String,
    /// UDP port to listen on, on all interfaces
    pub listen_port: u16,
    /// Whether this node originates messages
    pub seed: bool,
    pub peers: PeerSource,
    /// TTL given to originated messages
    pub initial_ttl: i32,
    pub fanout: FanOut,
    /// Leave the immediate sender out of relay targets
    pub exclude_sender: bool,
    /// Probability an origination cycle is skipped
    pub loss_probability: f64,
    pub origination_interval: Duration,
    pub warmup: Duration,
    pub dedup: DedupConfig,
    /// Path of the JSONL event log
    pub event_log: PathBuf,
    /// Own addresses to exclude from discovered peers; detected from the
    /// hostname when unset
    pub local_addrs: Option<Vec<IpAddr>>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::static_mesh("nodeX", DEFAULT_LISTEN_PORT, Vec::new())
    }
}

impl NodeConfig {
    /// Fixed-neighbor mesh: flood to every neighbor, ttl 10, one message per 10 s
    pub fn static_mesh(
        node_id: impl Into<String>,
        listen_port: u16,
        peers: Vec<PeerEndpoint>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            listen_port,
            seed: false,
            peers: PeerSource::Static(peers),
            initial_ttl: 10,
            fanout: FanOut::All,
            exclude_sender: false,
            loss_probability: 0.0,
            origination_interval: Duration::from_secs(10),
            warmup: Duration::from_secs(3),
            dedup: DedupConfig::default(),
            event_log: PathBuf::from("events.json"),
            local_addrs: None,
        }
    }

    /// Discovered mesh: random 2-4 fan-out, ttl 25, one message per second,
    /// 2% source loss, peers refreshed every 5 minutes
    pub fn discovery(node_id: impl Into<String>, listen_port: u16) -> Self {
        Self {
            peers: PeerSource::Discovery {
                name: DEFAULT_DISCOVERY_NAME.to_string(),
                port: listen_port,
                refresh_interval: Duration::from_secs(300),
            },
            initial_ttl: 25,
            fanout: FanOut::Random { min: 2, max: 4 },
            exclude_sender: true,
            loss_probability: 0.02,
            origination_interval: Duration::from_secs(1),
            ..Self::static_mesh(node_id, listen_port, Vec::new())
        }
    }

    /// Parse a comma separated `host:port` list, dropping invalid entries
    /// with a warning
    pub fn peers_from_list(list: &str) -> Vec<PeerEndpoint> {
        PeerEndpoint::parse_list(list)
            .filter_map(|entry| match entry {
                Ok(endpoint) => Some(endpoint),
                Err(e) => {
                    warn!(error = %e, "Skipping peer entry");
                    None
                }
            })
            .collect()
    }

    /// Set whether this node originates messages
    pub fn with_seed(mut self, seed: bool) -> Self {
        self.seed = seed;
        self
    }

    /// Set the TTL of originated messages
    pub fn with_initial_ttl(mut self, ttl: i32) -> Self {
        self.initial_ttl = ttl;
        self
    }

    /// Set the fan-out policy
    pub fn with_fanout(mut self, fanout: FanOut) -> Self {
        self.fanout = fanout;
        self
    }

    pub fn with_exclude_sender(mut self, exclude: bool) -> Self {
        self.exclude_sender = exclude;
        self
    }

    /// Set the source loss probability
    pub fn with_loss_probability(mut self, probability: f64) -> Self {
        self.loss_probability = probability;
        self
    }

    pub fn with_origination_interval(mut self, interval: Duration) -> Self {
        self.origination_interval = interval;
        self
    }

    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    /// Set the dedup cache bounds
    pub fn with_dedup(mut self, dedup: DedupConfig) -> Self {
        self.dedup = dedup;
        self
    }

    /// Set the event log path
    pub fn with_event_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.event_log = path.into();
        self
    }

    /// Set the discovery name, keeping the other discovery settings
    ///
    /// Switches a static config to discovery with default port and refresh.
    pub fn with_discovery_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.peers = match self.peers {
            PeerSource::Discovery {
                port,
                refresh_interval,
                ..
            } => PeerSource::Discovery {
                name,
                port,
                refresh_interval,
            },
            PeerSource::Static(_) => PeerSource::Discovery {
                name,
                port: self.listen_port,
                refresh_interval: Duration::from_secs(300),
            },
        };
        self
    }

    /// Set the peer refresh interval; no effect on static configs
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        if let PeerSource::Discovery {
            refresh_interval, ..
        } = &mut self.peers
        {
            *refresh_interval = interval;
        }
        self
    }

    /// Pin the addresses excluded from discovered peers
    pub fn with_local_addrs(mut self, addrs: Vec<IpAddr>) -> Self {
        self.local_addrs = Some(addrs);
        self
    }

    /// Whether neighbors are discovered rather than fixed
    pub fn is_discovery(&self) -> bool {
        matches!(self.peers, PeerSource::Discovery { .. })
    }

    /// Originator settings derived from this config
    pub fn originator(&self) -> OriginatorConfig {
        OriginatorConfig {
            initial_ttl: self.initial_ttl,
            interval: self.origination_interval,
            warmup: self.warmup,
            fanout: self.fanout,
        }
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_id.trim().is_empty() {
            return Err(ConfigError::EmptyNodeName);
        }
        if self.initial_ttl <= 0 {
            return Err(ConfigError::InvalidTtl(self.initial_ttl));
        }
        if !(0.0..=1.0).contains(&self.loss_probability) {
            return Err(ConfigError::InvalidLossProbability(self.loss_probability));
        }
        self.fanout.validate()?;

        if self.origination_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("origination interval"));
        }
        if self.dedup.capacity == 0 {
            return Err(ConfigError::ZeroDedupCapacity);
        }
        if self.dedup.retention.is_zero() {
            return Err(ConfigError::ZeroDuration("dedup retention"));
        }

        if let PeerSource::Discovery {
            name,
            refresh_interval,
            ..
        } = &self.peers
        {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyDiscoveryName);
            }
            if refresh_interval.is_zero() {
                return Err(ConfigError::ZeroDuration("refresh interval"));
            }
        }

        Ok(())
    }
}
