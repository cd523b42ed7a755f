use crate::astar::search;
use crate::cache::PathCache;
use chipper_core::config::PathfinderConfig;
use chipper_core::{BlockPos, WorldQuery};
use log::debug;
use std::time::Instant;

/// Cached, bounded path search owned by one agent's reactive loop.
#[derive(Debug, Clone)]
pub struct Pathfinder {
    config: PathfinderConfig,
    cache: PathCache,
    searches: u64,
}

impl Default for Pathfinder {
    fn default() -> Self {
        Self::new(PathfinderConfig::default())
    }
}

impl Pathfinder {
    pub fn new(config: PathfinderConfig) -> Self {
        let cache = PathCache::new(config.cache_ttl, config.cache_capacity);
        Self {
            config,
            cache,
            searches: 0,
        }
    }

    /// Finds a path from `start` to `end`, answering from the cache when possible.
    ///
    /// # Arguments
    ///
    /// * `world` - The world to search in.
    /// * `start` - Cell the agent stands in.
    /// * `end` - Cell to reach.
    /// * `budget` - Requested node budget.
    /// * `now` - Current time, used for cache freshness.
    ///
    /// # Returns
    ///
    /// The waypoints after `start` up to `end`, or `None` if the search gave up.
    pub fn find_path(
        &mut self,
        world: &dyn WorldQuery,
        start: BlockPos,
        end: BlockPos,
        budget: usize,
        now: Instant,
    ) -> Option<Vec<BlockPos>> {
        if let Some(path) = self.cache.get(start, end, now) {
            return Some(path);
        }

        self.searches += 1;
        match search(world, start, end, budget, &self.config) {
            Some(outcome) => {
                debug!(
                    "Path {} -> {}: {} waypoints, cost {:.1}, {} nodes",
                    start,
                    end,
                    outcome.path.len(),
                    outcome.cost,
                    outcome.visited
                );
                self.cache.insert(start, end, outcome.path.clone(), now);
                Some(outcome.path)
            }
            None => {
                debug!("No path {} -> {} within budget", start, end);
                None
            }
        }
    }

    /// Like [`Pathfinder::find_path`], degrading to [`direct_path`] when no path is found.
    pub fn find_path_or_direct(
        &mut self,
        world: &dyn WorldQuery,
        start: BlockPos,
        end: BlockPos,
        budget: usize,
        now: Instant,
    ) -> Vec<BlockPos> {
        self.find_path(world, start, end, budget, now)
            .unwrap_or_else(|| direct_path(start, end))
    }

    /// Number of searches actually run, cache hits excluded.
    pub fn searches(&self) -> u64 {
        self.searches
    }

    pub fn cache(&self) -> &PathCache {
        &self.cache
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

/// A straight interpolated line from `start` to `end` that ignores obstructions.
///
/// Intermediate waypoints stay on the start level. The result is never empty
/// and always ends at `end`.
pub fn direct_path(start: BlockPos, end: BlockPos) -> Vec<BlockPos> {
    let dx = end.x - start.x;
    let dz = end.z - start.z;
    let steps = dx.abs().max(dz.abs());

    let mut path: Vec<BlockPos> = (1..=steps)
        .map(|i| BlockPos::new(start.x + dx * i / steps, start.y, start.z + dz * i / steps))
        .collect();
    if path.last() != Some(&end) {
        path.push(end);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use chipper_core::grid::{Block, VoxelGrid};
    use std::time::Duration;

    #[test]
    fn test_repeated_query_hits_cache() {
        let world = VoxelGrid::flat(10, -1);
        let mut pathfinder = Pathfinder::default();
        let now = Instant::now();
        let goal = BlockPos::new(5, 0, 3);

        let first = pathfinder.find_path(&world, BlockPos::ORIGIN, goal, 1000, now);
        let second = pathfinder.find_path(
            &world,
            BlockPos::ORIGIN,
            goal,
            1000,
            now + Duration::from_secs(5),
        );
        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(pathfinder.searches(), 1);
    }

    #[test]
    fn test_expired_entry_is_searched_again() {
        let mut world = VoxelGrid::flat(10, -1);
        let mut pathfinder = Pathfinder::default();
        let now = Instant::now();
        let goal = BlockPos::new(5, 0, 0);

        let before = pathfinder
            .find_path(&world, BlockPos::ORIGIN, goal, 1000, now)
            .unwrap();
        world.fill(BlockPos::new(3, 0, -10), BlockPos::new(3, 0, 10), Block::Stone);

        let cached = pathfinder
            .find_path(&world, BlockPos::ORIGIN, goal, 1000, now + Duration::from_secs(9))
            .unwrap();
        assert_eq!(cached, before);

        let after = pathfinder
            .find_path(&world, BlockPos::ORIGIN, goal, 1000, now + Duration::from_secs(11))
            .unwrap();
        assert_eq!(pathfinder.searches(), 2);
        assert_ne!(after, before);
        assert_eq!(after.last(), Some(&goal));
    }

    #[test]
    fn test_failed_search_is_not_cached() {
        let mut world = VoxelGrid::flat(10, -1);
        let goal = BlockPos::new(5, 0, 0);
        for cell in goal.horizontal_ring() {
            world.fill(cell, cell.up_by(2), Block::Stone);
        }
        let mut pathfinder = Pathfinder::default();
        let now = Instant::now();

        assert!(pathfinder.find_path(&world, BlockPos::ORIGIN, goal, 1000, now).is_none());
        assert!(pathfinder.cache().is_empty());

        let fallback = pathfinder.find_path_or_direct(&world, BlockPos::ORIGIN, goal, 1000, now);
        assert_eq!(fallback.last(), Some(&goal));
        assert_eq!(pathfinder.searches(), 2);
    }

    #[test]
    fn test_direct_path_interpolates() {
        let path = direct_path(BlockPos::ORIGIN, BlockPos::new(4, 0, 2));
        assert_eq!(path.len(), 4);
        assert_eq!(path[0], BlockPos::new(1, 0, 0));
        assert_eq!(path[1], BlockPos::new(2, 0, 1));
        assert_eq!(path.last(), Some(&BlockPos::new(4, 0, 2)));
    }

    #[test]
    fn test_direct_path_is_never_empty() {
        assert_eq!(direct_path(BlockPos::ORIGIN, BlockPos::ORIGIN), vec![BlockPos::ORIGIN]);
        assert_eq!(
            direct_path(BlockPos::ORIGIN, BlockPos::new(0, 3, 0)),
            vec![BlockPos::new(0, 3, 0)]
        );
        let climb = direct_path(BlockPos::ORIGIN, BlockPos::new(2, 1, 0));
        assert_eq!(
            climb,
            vec![BlockPos::new(1, 0, 0), BlockPos::new(2, 0, 0), BlockPos::new(2, 1, 0)]
        );
    }
}
