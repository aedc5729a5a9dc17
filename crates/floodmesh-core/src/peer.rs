//! Neighbor addressing

use std::collections::BTreeMap;
use std::fmt::Display;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Instant;

use crate::error::ConfigError;

/// Network endpoint of a neighbor
///
/// The host may be an IP literal or a name resolved at send time
/// (e.g. a container service name).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerEndpoint {
    pub host: String,
    pub port: u16,
}

impl PeerEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The host as an IP address, if it is a literal
    pub fn ip(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }

    /// Whether this endpoint's host is the literal address `ip`
    pub fn matches_ip(&self, ip: IpAddr) -> bool {
        self.ip() == Some(ip)
    }

    /// Parse a comma separated `host:port` list entry by entry
    ///
    /// Blank entries are skipped; each remaining entry yields its own result
    /// so callers can drop bad entries without losing the good ones.
    pub fn parse_list(list: &str) -> impl Iterator<Item = Result<Self, ConfigError>> + '_ {
        list.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::parse)
    }
}

impl FromStr for PeerEndpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidEndpoint(s.to_string());

        let (host, port) = s.trim().rsplit_once(':').ok_or_else(invalid)?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;

        Ok(Self::new(host, port))
    }
}

impl Display for PeerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Immutable snapshot of a node's neighbors
///
/// Keyed by neighbor identifier. A refresh builds a new set and swaps it in
/// whole; a set is never edited after construction.
#[derive(Debug, Clone, Default)]
pub struct PeerSet {
    peers: BTreeMap<String, PeerEndpoint>,
    refreshed_at: Option<Instant>,
}

impl PeerSet {
    /// An empty set that has never been resolved
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a set from explicit endpoints, keyed by their `host:port` form
    pub fn from_endpoints(endpoints: impl IntoIterator<Item = PeerEndpoint>) -> Self {
        Self {
            peers: endpoints
                .into_iter()
                .map(|endpoint| (endpoint.to_string(), endpoint))
                .collect(),
            refreshed_at: None,
        }
    }

    /// Build a set from identifier/endpoint pairs
    pub fn from_entries(entries: impl IntoIterator<Item = (String, PeerEndpoint)>) -> Self {
        Self {
            peers: entries.into_iter().collect(),
            refreshed_at: None,
        }
    }

    /// Stamp the set with the instant of the resolution that produced it
    pub fn refreshed(mut self, at: Instant) -> Self {
        self.refreshed_at = Some(at);
        self
    }

    pub fn refreshed_at(&self) -> Option<Instant> {
        self.refreshed_at
    }

    pub fn get(&self, id: &str) -> Option<&PeerEndpoint> {
        self.peers.get(id)
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &PeerEndpoint> {
        self.peers.values()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
