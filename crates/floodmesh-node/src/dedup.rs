//! Duplicate suppression
//!
//! The dedup cache is the single gate in front of logging and rebroadcast:
//! a message id passes [`DedupCache::test_and_insert`] once per node, every
//! later copy is dropped before any other processing.
//!
//! The cache is bounded. Ids are evicted in arrival order once `capacity` is
//! reached, and ids older than `retention` are expired. Both bounds must
//! outlast the lifetime of a flood, or a late copy of an evicted id would be
//! accepted a second time.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use floodmesh_core::MessageId;

/// Bounds for the dedup cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupConfig {
    /// Maximum number of ids remembered
    pub capacity: usize,
    /// How long an id is remembered
    pub retention: Duration,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            capacity: 65_536,
            retention: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Default)]
struct SeenIds {
    ids: HashSet<MessageId>,
    /// Arrival order, oldest first
    order: VecDeque<(MessageId, Instant)>,
}

impl SeenIds {
    fn expire(&mut self, now: Instant, retention: Duration) {
        while let Some((_, at)) = self.order.front() {
            if now.saturating_duration_since(*at) < retention {
                break;
            }
            if let Some((id, _)) = self.order.pop_front() {
                self.ids.remove(&id);
            }
        }
    }

    fn evict_to(&mut self, capacity: usize) {
        while self.ids.len() >= capacity {
            match self.order.pop_front() {
                Some((id, _)) => {
                    self.ids.remove(&id);
                }
                None => break,
            }
        }
    }
}

/// Message ids already processed by this node
///
/// Shared by the originator and forwarder tasks; all access goes through one
/// lock so test-and-insert is atomic.
#[derive(Debug)]
pub struct DedupCache {
    seen: Mutex<SeenIds>,
    config: DedupConfig,
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DedupConfig::default())
    }
}

impl DedupCache {
    pub fn new(config: DedupConfig) -> Self {
        Self {
            seen: Mutex::new(SeenIds::default()),
            config,
        }
    }

    /// Record `id` if it is new
    ///
    /// Returns `true` on first sighting (and records it), `false` if the id
    /// is already present, in which case nothing changes.
    pub fn test_and_insert(&self, id: &MessageId) -> bool {
        self.test_and_insert_at(id, Instant::now())
    }

    /// [`test_and_insert`](Self::test_and_insert) with an explicit clock reading
    pub fn test_and_insert_at(&self, id: &MessageId, now: Instant) -> bool {
        let mut seen = self.seen.lock();
        seen.expire(now, self.config.retention);

        if seen.ids.contains(id) {
            return false;
        }

        seen.evict_to(self.config.capacity);
        seen.ids.insert(id.clone());
        seen.order.push_back((id.clone(), now));
        true
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.seen.lock().ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.seen.lock().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
