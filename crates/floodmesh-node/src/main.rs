//! Floodmesh node binary
//!
//! Every option can also be set through the environment, so container
//! topologies configure nodes with `NODE_NAME`, `LISTEN_PORT`, `START_NODE`
//! and `NEXT_NODES`.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, ValueEnum};
use tracing::info;

use floodmesh_logging::{LogConfig, MeshSubscriberBuilder};
use floodmesh_node::{FanOut, FloodNode, NodeConfig};

/// How neighbors are found
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PeerMode {
    /// Use the fixed NEXT_NODES list
    Static,
    /// Resolve DISCOVERY_NAME periodically
    Discovery,
}

#[derive(Parser)]
#[command(
    name = "floodmesh-node",
    about = "Flood routing sensor mesh node",
    version
)]
struct Cli {
    /// Name this node logs under
    #[arg(long, env = "NODE_NAME", default_value = "nodeX")]
    node_name: String,

    /// UDP port to listen on
    #[arg(long, env = "LISTEN_PORT", default_value_t = 5000)]
    listen_port: u16,

    /// Originate messages from this node
    #[arg(
        long,
        env = "START_NODE",
        default_value = "false",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    start_node: bool,

    /// Neighbor selection; static when NEXT_NODES is set, discovery otherwise
    #[arg(long, env = "PEER_MODE", value_enum)]
    mode: Option<PeerMode>,

    /// Fixed neighbors as host:port,host:port
    #[arg(long, env = "NEXT_NODES")]
    next_nodes: Option<String>,

    /// Name resolved to find neighbors in discovery mode
    #[arg(long, env = "DISCOVERY_NAME")]
    discovery_name: Option<String>,

    /// Seconds between peer refreshes in discovery mode
    #[arg(long, env = "REFRESH_INTERVAL_SECS")]
    refresh_interval_secs: Option<u64>,

    /// TTL of originated messages
    #[arg(long, env = "INITIAL_TTL")]
    initial_ttl: Option<i32>,

    /// Neighbors per copy: "all", a count, or a range like "2-4"
    #[arg(long, env = "FANOUT")]
    fanout: Option<FanOut>,

    /// Probability an origination cycle is skipped
    #[arg(long, env = "LOSS_PROBABILITY")]
    loss_probability: Option<f64>,

    /// Milliseconds between originated messages
    #[arg(long, env = "ORIGINATION_INTERVAL_MS")]
    origination_interval_ms: Option<u64>,

    /// Own address to exclude from discovered peers (repeatable); detected
    /// from the hostname when absent
    #[arg(long, env = "LOCAL_ADDRS", value_delimiter = ',')]
    local_addr: Vec<IpAddr>,

    /// Event log path
    #[arg(long, env = "EVENT_LOG", default_value = "events.json")]
    event_log: PathBuf,

    /// Human-readable console logs instead of JSONL
    #[arg(long, env = "LOG_PRETTY")]
    pretty: bool,

    /// Also write diagnostics as JSONL files in this directory
    #[arg(long, env = "LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Logging preset for the chosen flags
    ///
    /// `--log-dir` selects the production preset, with files named after the
    /// node; otherwise `--pretty` selects the development preset.
    fn log_config(&self) -> LogConfig {
        let mut config = match &self.log_dir {
            Some(dir) => LogConfig::production(dir.clone()),
            None if self.pretty => LogConfig::development(),
            None => LogConfig::default(),
        };
        if let Some(file) = config.file.as_mut() {
            file.prefix = self.node_name.clone();
        }
        config
    }

    fn node_config(&self) -> NodeConfig {
        let next_nodes = self.next_nodes.as_deref().unwrap_or("");
        let mode = self.mode.unwrap_or(if next_nodes.trim().is_empty() {
            PeerMode::Discovery
        } else {
            PeerMode::Static
        });

        let mut config = match mode {
            PeerMode::Static => NodeConfig::static_mesh(
                self.node_name.clone(),
                self.listen_port,
                NodeConfig::peers_from_list(next_nodes),
            ),
            PeerMode::Discovery => NodeConfig::discovery(self.node_name.clone(), self.listen_port),
        };

        config = config
            .with_seed(self.start_node)
            .with_event_log(self.event_log.clone());

        if let Some(name) = &self.discovery_name {
            if mode == PeerMode::Discovery {
                config = config.with_discovery_name(name.clone());
            }
        }
        if let Some(secs) = self.refresh_interval_secs {
            config = config.with_refresh_interval(Duration::from_secs(secs));
        }
        if let Some(ttl) = self.initial_ttl {
            config = config.with_initial_ttl(ttl);
        }
        if let Some(fanout) = self.fanout {
            config = config.with_fanout(fanout);
        }
        if let Some(p) = self.loss_probability {
            config = config.with_loss_probability(p);
        }
        if let Some(ms) = self.origination_interval_ms {
            config = config.with_origination_interval(Duration::from_millis(ms));
        }
        if !self.local_addr.is_empty() {
            config = config.with_local_addrs(self.local_addr.clone());
        }

        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut logging = MeshSubscriberBuilder::new()
        .with_config(cli.log_config())
        .with_pretty_console(cli.pretty);
    if cli.verbose {
        logging = logging.with_level("debug");
    }
    let _guard = logging.init().context("failed to initialize logging")?;

    let config = cli.node_config();
    info!(
        node = %config.node_id,
        port = config.listen_port,
        seed = config.seed,
        ttl = config.initial_ttl,
        fanout = %config.fanout,
        "Starting node"
    );

    let node = FloodNode::bind(config).await.context("failed to start node")?;
    node.run().await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use floodmesh_logging::RotationStrategy;
    use floodmesh_node::PeerSource;

    /// Flags as parsed with nothing set
    fn cli() -> Cli {
        Cli {
            node_name: "nodeX".to_string(),
            listen_port: 5000,
            start_node: false,
            mode: None,
            next_nodes: None,
            discovery_name: None,
            refresh_interval_secs: None,
            initial_ttl: None,
            fanout: None,
            loss_probability: None,
            origination_interval_ms: None,
            local_addr: Vec::new(),
            event_log: PathBuf::from("events.json"),
            pretty: false,
            log_dir: None,
            verbose: false,
        }
    }

    #[test]
    fn test_next_nodes_selects_static_mesh() {
        let config = Cli {
            node_name: "node1".to_string(),
            next_nodes: Some("node2:5002,node3:5003".to_string()),
            start_node: true,
            ..cli()
        }
        .node_config();

        assert!(config.seed);
        assert_eq!(config.initial_ttl, 10);
        assert!(matches!(&config.peers, PeerSource::Static(peers) if peers.len() == 2));
    }

    #[test]
    fn test_defaults_to_discovery() {
        let config = Cli {
            discovery_name: Some("peers.local".to_string()),
            fanout: Some(FanOut::Random { min: 3, max: 3 }),
            initial_ttl: Some(7),
            ..cli()
        }
        .node_config();

        assert!(!config.seed);
        assert_eq!(config.initial_ttl, 7);
        assert_eq!(config.fanout, FanOut::Random { min: 3, max: 3 });
        assert!(matches!(
            &config.peers,
            PeerSource::Discovery { name, .. } if name == "peers.local"
        ));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_dir_selects_production_preset() {
        let config = Cli {
            node_name: "node4".to_string(),
            log_dir: Some(PathBuf::from("/var/log/mesh")),
            ..cli()
        }
        .log_config();

        assert_eq!(config.default_level, "info");
        assert!(!config.console.pretty);
        let file = config.file.unwrap();
        assert_eq!(file.directory, PathBuf::from("/var/log/mesh"));
        assert_eq!(file.prefix, "node4");
        assert_eq!(file.rotation, RotationStrategy::Daily);
    }

    #[test]
    fn test_pretty_selects_development_preset() {
        let config = Cli {
            pretty: true,
            ..cli()
        }
        .log_config();

        assert_eq!(config.default_level, "debug");
        assert!(config.console.pretty);
        assert!(config.file.is_none());

        assert!(!cli().log_config().console.pretty);
    }
}
