//! Shared per-node state
//!
//! The originator and forwarder tasks share exactly this: the dedup cache,
//! the peer directory and the counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::dedup::DedupCache;
use crate::directory::PeerDirectory;

/// State shared by the tasks of one node
pub struct NodeState {
    pub node_id: String,
    pub dedup: DedupCache,
    pub peers: PeerDirectory,
    pub stats: NodeStats,
}

impl NodeState {
    pub fn new(node_id: impl Into<String>, dedup: DedupCache, peers: PeerDirectory) -> Self {
        Self {
            node_id: node_id.into(),
            dedup,
            peers,
            stats: NodeStats::default(),
        }
    }
}

/// Counters for a running node
#[derive(Debug, Default)]
pub struct NodeStats {
    /// Datagrams received
    pub received: AtomicU64,
    /// Datagrams dropped as already seen
    pub duplicates: AtomicU64,
    /// Datagrams that failed to decode
    pub malformed: AtomicU64,
    /// Events appended to the event log
    pub logged: AtomicU64,
    /// Events the event log failed to persist
    pub persist_failures: AtomicU64,
    /// Copies sent by the forwarder
    pub relayed: AtomicU64,
    /// Sends that failed, from either task
    pub send_failures: AtomicU64,
    /// Messages accepted whose TTL ran out here
    pub terminal: AtomicU64,
    /// Messages created by the originator
    pub originated: AtomicU64,
    /// Origination cycles skipped by the loss simulator
    pub loss_drops: AtomicU64,
}

impl NodeStats {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            received: load(&self.received),
            duplicates: load(&self.duplicates),
            malformed: load(&self.malformed),
            logged: load(&self.logged),
            persist_failures: load(&self.persist_failures),
            relayed: load(&self.relayed),
            send_failures: load(&self.send_failures),
            terminal: load(&self.terminal),
            originated: load(&self.originated),
            loss_drops: load(&self.loss_drops),
        }
    }
}

/// Point-in-time copy of [`NodeStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub duplicates: u64,
    pub malformed: u64,
    pub logged: u64,
    pub persist_failures: u64,
    pub relayed: u64,
    pub send_failures: u64,
    pub terminal: u64,
    pub originated: u64,
    pub loss_drops: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reads_counters() {
        let stats = NodeStats::default();
        NodeStats::incr(&stats.received);
        NodeStats::incr(&stats.received);
        NodeStats::add(&stats.relayed, 3);

        let snap = stats.snapshot();
        assert_eq!(snap.received, 2);
        assert_eq!(snap.relayed, 3);
        assert_eq!(snap.duplicates, 0);

        let json = serde_json::to_value(snap).unwrap();
        assert_eq!(json["relayed"], 3);
    }
}
