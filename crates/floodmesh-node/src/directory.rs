//! Peer directory
//!
//! Resolves the set of neighbors a node may send to. Two policies:
//!
//! - **Static**: the configured endpoint list, fixed at start-up
//! - **Dynamic**: the addresses behind a discovery name (e.g. a headless
//!   Kubernetes service), re-resolved every refresh interval, excluding the
//!   node's own addresses
//!
//! Readers get an immutable [`PeerSet`] snapshot. A successful refresh swaps
//! in a whole new set; a failed one leaves the previous set in place, so a
//! node keeps flooding over stale peers rather than going silent.
//!
//! Refreshes are paced by the last attempt, successful or not. A failing
//! lookup is retried one interval later, never once per caller.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use floodmesh_core::{PeerEndpoint, PeerSet, ResolutionError};

/// Name resolution against a discovery service
#[async_trait]
pub trait PeerResolver: Send + Sync {
    /// The name being resolved, for diagnostics
    fn name(&self) -> &str;

    /// Look up every address currently registered under the name
    async fn lookup(&self) -> Result<Vec<IpAddr>, ResolutionError>;
}

/// DNS-backed resolver
#[derive(Debug, Clone)]
pub struct DnsResolver {
    name: String,
}

impl DnsResolver {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl PeerResolver for DnsResolver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self) -> Result<Vec<IpAddr>, ResolutionError> {
        let addrs = tokio::net::lookup_host((self.name.as_str(), 0))
            .await
            .map_err(|e| ResolutionError::Lookup {
                name: self.name.clone(),
                reason: e.to_string(),
            })?;

        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Addresses this host is known by, used to keep a node out of its own peer set
///
/// Resolves the machine's hostname; returns an empty list if that fails.
pub async fn local_addresses() -> Vec<IpAddr> {
    let Some(host) = hostname::get().ok().and_then(|h| h.into_string().ok()) else {
        warn!("Could not determine hostname; own address will not be excluded from peers");
        return Vec::new();
    };

    match tokio::net::lookup_host((host.as_str(), 0)).await {
        Ok(addrs) => {
            let mut ips: Vec<IpAddr> = addrs.map(|addr| addr.ip()).collect();
            ips.sort();
            ips.dedup();
            debug!(host = %host, addrs = ?ips, "Resolved local addresses");
            ips
        }
        Err(e) => {
            warn!(host = %host, error = %e, "Could not resolve own hostname");
            Vec::new()
        }
    }
}

enum Policy {
    Static(Vec<PeerEndpoint>),
    Dynamic {
        resolver: Arc<dyn PeerResolver>,
        /// Port every discovered peer listens on
        port: u16,
        /// Our own addresses, never used as peers
        local_addrs: Vec<IpAddr>,
        refresh_interval: Duration,
    },
}

/// The neighbors of one node
pub struct PeerDirectory {
    policy: Policy,
    current: RwLock<Arc<PeerSet>>,
    last_attempt: Mutex<Option<Instant>>,
    refreshing: AtomicBool,
}

impl PeerDirectory {
    /// A directory over a fixed endpoint list
    pub fn fixed(endpoints: Vec<PeerEndpoint>) -> Self {
        Self::with_policy(Policy::Static(endpoints))
    }

    /// A directory populated by periodic lookups through `resolver`
    pub fn discovered(
        resolver: Arc<dyn PeerResolver>,
        port: u16,
        local_addrs: Vec<IpAddr>,
        refresh_interval: Duration,
    ) -> Self {
        Self::with_policy(Policy::Dynamic {
            resolver,
            port,
            local_addrs,
            refresh_interval,
        })
    }

    fn with_policy(policy: Policy) -> Self {
        Self {
            policy,
            current: RwLock::new(Arc::new(PeerSet::empty())),
            last_attempt: Mutex::new(None),
            refreshing: AtomicBool::new(false),
        }
    }

    /// Time between refreshes; `None` for a static directory
    pub fn refresh_interval(&self) -> Option<Duration> {
        match &self.policy {
            Policy::Static(_) => None,
            Policy::Dynamic {
                refresh_interval, ..
            } => Some(*refresh_interval),
        }
    }

    /// The current peer set
    pub fn snapshot(&self) -> Arc<PeerSet> {
        Arc::clone(&self.current.read())
    }

    /// Resolve once and install the result
    ///
    /// On failure the current set is left untouched. Either way the attempt
    /// starts a new refresh interval.
    pub async fn resolve(&self) -> Result<Arc<PeerSet>, ResolutionError> {
        self.resolve_at(Instant::now()).await
    }

    async fn resolve_at(&self, now: Instant) -> Result<Arc<PeerSet>, ResolutionError> {
        *self.last_attempt.lock() = Some(now);

        let set = match &self.policy {
            Policy::Static(endpoints) => PeerSet::from_endpoints(endpoints.iter().cloned()),
            Policy::Dynamic {
                resolver,
                port,
                local_addrs,
                ..
            } => {
                let peers: BTreeMap<String, PeerEndpoint> = resolver
                    .lookup()
                    .await?
                    .into_iter()
                    .filter(|ip| !local_addrs.contains(ip))
                    .map(|ip| (ip.to_string(), PeerEndpoint::new(ip.to_string(), *port)))
                    .collect();

                if peers.is_empty() {
                    return Err(ResolutionError::NoPeers {
                        name: resolver.name().to_string(),
                    });
                }
                PeerSet::from_entries(peers)
            }
        };

        let set = Arc::new(set.refreshed(Instant::now()));
        *self.current.write() = Arc::clone(&set);
        Ok(set)
    }

    /// Re-resolve if the refresh interval has elapsed since the last attempt
    ///
    /// Returns whether a new set was installed. Static directories never
    /// refresh. A lookup already in flight from another task is not doubled.
    pub async fn refresh_if_due(&self, now: Instant) -> bool {
        let Some(interval) = self.refresh_interval() else {
            return false;
        };

        let due = match *self.last_attempt.lock() {
            Some(at) => now.saturating_duration_since(at) >= interval,
            None => true,
        };
        due && self.refresh(now).await
    }

    /// Refresh once per interval, forever
    ///
    /// Spawned as its own task so lookups never hold up the receive loop.
    /// Returns immediately for a static directory.
    pub async fn keep_fresh(&self) {
        let Some(interval) = self.refresh_interval() else {
            return;
        };

        loop {
            tokio::time::sleep(interval).await;
            self.refresh(Instant::now()).await;
        }
    }

    async fn refresh(&self, now: Instant) -> bool {
        let Policy::Dynamic { resolver, .. } = &self.policy else {
            return false;
        };
        if self.refreshing.swap(true, Ordering::AcqRel) {
            return false;
        }

        let result = self.resolve_at(now).await;
        self.refreshing.store(false, Ordering::Release);

        match result {
            Ok(set) => {
                info!(name = %resolver.name(), peers = set.len(), "Refreshed peer set");
                true
            }
            Err(e) => {
                warn!(
                    error = %e,
                    stale_peers = self.snapshot().len(),
                    "Peer refresh failed, keeping previous peer set"
                );
                false
            }
        }
    }
}
