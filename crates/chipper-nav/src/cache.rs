use chipper_core::BlockPos;
use log::debug;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CachedPath {
    path: Vec<BlockPos>,
    created: Instant,
}

/// Search results keyed by the literal `(start, end)` pair.
///
/// Entries are never modified after insertion. An entry older than the TTL
/// is treated as absent and purged once the cache outgrows its capacity.
#[derive(Debug, Clone)]
pub struct PathCache {
    entries: HashMap<(BlockPos, BlockPos), CachedPath>,
    ttl: Duration,
    capacity: usize,
}

impl PathCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            capacity,
        }
    }

    /// Returns a copy of the cached path if it is still fresh at `now`.
    pub fn get(&self, start: BlockPos, end: BlockPos, now: Instant) -> Option<Vec<BlockPos>> {
        self.entries
            .get(&(start, end))
            .filter(|cached| self.is_fresh(cached, now))
            .map(|cached| cached.path.clone())
    }

    /// Stores a path, purging expired entries first when the cache is over capacity.
    pub fn insert(&mut self, start: BlockPos, end: BlockPos, path: Vec<BlockPos>, now: Instant) {
        if self.entries.len() > self.capacity {
            self.prune(now);
        }
        self.entries.insert(
            (start, end),
            CachedPath {
                path,
                created: now,
            },
        );
    }

    /// Drops every entry that expired by `now`.
    pub fn prune(&mut self, now: Instant) {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, cached| now.saturating_duration_since(cached.created) < ttl);
        debug!(
            "Pruned {} expired paths",
            before.saturating_sub(self.entries.len())
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_fresh(&self, cached: &CachedPath, now: Instant) -> bool {
        now.saturating_duration_since(cached.created) < self.ttl
    }
}
