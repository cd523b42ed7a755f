//! # A* search over the block lattice
//!
//! A bounded, real-time search meant to be called from a tick loop.
//!
//! ## Features
//!
//! - **Cardinal lattice**: expands the four horizontal neighbours only
//! - **Step resolution**: a neighbour without floor drops one level, a blocked
//!   neighbour with room above is climbed one level
//! - **Euclidean heuristic**: priority is `g + h`, ties go to the node queued first
//! - **Node budget**: the search gives up once it expanded more nodes than the
//!   budget, the budget itself is capped by [`PathfinderConfig::node_budget_ceiling`]

use chipper_core::config::PathfinderConfig;
use chipper_core::{BlockPos, WorldQuery};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Result of a successful search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    /// Waypoints from the first step after the start up to and including the goal.
    pub path: Vec<BlockPos>,
    /// Accumulated movement cost of the path.
    pub cost: f64,
    /// Nodes expanded before the goal was reached.
    pub visited: usize,
}

/// A node of the search tree. Parents are indices into the node arena.
#[derive(Debug)]
struct SearchNode {
    position: BlockPos,
    parent: Option<usize>,
    g_cost: f64,
    h_cost: f64,
}

impl SearchNode {
    fn f_cost(&self) -> f64 {
        self.g_cost + self.h_cost
    }
}

/// Entry of the open set.
#[derive(Debug, Clone, Copy)]
struct OpenEntry {
    f_cost: f64,
    sequence: u64,
    node: usize,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed on both keys: BinaryHeap pops the greatest entry.
        other
            .f_cost
            .partial_cmp(&self.f_cost)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Finds a path from `start` to `goal`.
///
/// # Arguments
///
/// * `world` - The world to search in.
/// * `start` - Cell the agent stands in.
/// * `goal` - Cell to reach.
/// * `budget` - Requested node budget, capped by the configured ceiling.
/// * `config` - Movement costs and the budget ceiling.
///
/// # Returns
///
/// The path and its cost, or `None` if the budget ran out or the goal is unreachable.
pub fn search(
    world: &dyn WorldQuery,
    start: BlockPos,
    goal: BlockPos,
    budget: usize,
    config: &PathfinderConfig,
) -> Option<SearchOutcome> {
    let max_nodes = budget.min(config.node_budget_ceiling);

    let mut nodes = vec![SearchNode {
        position: start,
        parent: None,
        g_cost: 0.0,
        h_cost: heuristic(start, goal),
    }];
    let mut node_index = HashMap::from([(start, 0usize)]);
    let mut closed_set = HashSet::new();
    let mut open_set = BinaryHeap::new();
    open_set.push(OpenEntry {
        f_cost: nodes[0].f_cost(),
        sequence: 0,
        node: 0,
    });
    let mut sequence = 1u64;
    let mut visited = 0usize;

    while let Some(entry) = open_set.pop() {
        let current = entry.node;
        let current_pos = nodes[current].position;
        if !closed_set.insert(current_pos) {
            // Superseded by a cheaper entry that was expanded already
            continue;
        }

        visited += 1;
        if visited > max_nodes {
            return None;
        }

        if current_pos == goal {
            return Some(SearchOutcome {
                path: reconstruct_path(&nodes, current),
                cost: nodes[current].g_cost,
                visited,
            });
        }

        for direct in current_pos.horizontal_neighbors() {
            let Some(next) = resolve_step(world, current_pos, direct) else {
                continue;
            };
            if closed_set.contains(&next) {
                continue;
            }

            let tentative_g = nodes[current].g_cost + movement_cost(current_pos, next, config);
            let index = match node_index.get(&next) {
                Some(&index) if nodes[index].g_cost <= tentative_g => continue,
                Some(&index) => {
                    nodes[index].g_cost = tentative_g;
                    nodes[index].parent = Some(current);
                    index
                }
                None => {
                    nodes.push(SearchNode {
                        position: next,
                        parent: Some(current),
                        g_cost: tentative_g,
                        h_cost: heuristic(next, goal),
                    });
                    node_index.insert(next, nodes.len() - 1);
                    nodes.len() - 1
                }
            };

            open_set.push(OpenEntry {
                f_cost: nodes[index].f_cost(),
                sequence,
                node: index,
            });
            sequence += 1;
        }
    }

    None
}

/// Resolves the cell actually entered when stepping from `from` towards `direct`.
fn resolve_step(world: &dyn WorldQuery, from: BlockPos, direct: BlockPos) -> Option<BlockPos> {
    if world.is_traversable(direct) {
        let below = direct.down();
        if world.is_traversable(below) {
            Some(below)
        } else {
            Some(direct)
        }
    } else {
        let above = direct.up();
        (world.is_traversable(above) && world.is_traversable(from.up())).then_some(above)
    }
}

/// Steps that also change level cost the diagonal rate.
fn movement_cost(from: BlockPos, to: BlockPos, config: &PathfinderConfig) -> f64 {
    if from.manhattan_distance(to) > 1 {
        config.diagonal_cost
    } else {
        config.straight_cost
    }
}

fn heuristic(from: BlockPos, to: BlockPos) -> f64 {
    from.distance(to)
}

/// Walks the parent chain back from `goal`, leaving the start out.
fn reconstruct_path(nodes: &[SearchNode], goal: usize) -> Vec<BlockPos> {
    let mut path = Vec::new();
    let mut current = Some(goal);
    while let Some(index) = current {
        let node = &nodes[index];
        if node.parent.is_none() {
            break;
        }
        path.push(node.position);
        current = node.parent;
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use chipper_core::grid::{Block, VoxelGrid};

    fn assert_lattice_adjacent(start: BlockPos, path: &[BlockPos]) {
        let mut previous = start;
        for &waypoint in path {
            let horizontal = (waypoint.x - previous.x).abs() + (waypoint.z - previous.z).abs();
            assert_eq!(horizontal, 1, "{} -> {}", previous, waypoint);
            assert!((waypoint.y - previous.y).abs() <= 1);
            previous = waypoint;
        }
    }

    #[test]
    fn test_straight_path_on_flat_ground() {
        let world = VoxelGrid::flat(10, -1);
        let config = PathfinderConfig::default();
        let outcome = search(
            &world,
            BlockPos::new(0, 0, 0),
            BlockPos::new(5, 0, 0),
            1000,
            &config,
        )
        .unwrap();

        let expected: Vec<BlockPos> = (1..=5).map(|x| BlockPos::new(x, 0, 0)).collect();
        assert_eq!(outcome.path, expected);
        assert!((outcome.cost - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_climbs_over_low_wall() {
        let mut world = VoxelGrid::flat(10, -1);
        world.fill(BlockPos::new(2, 0, -10), BlockPos::new(2, 0, 10), Block::Stone);
        let config = PathfinderConfig::default();
        let start = BlockPos::new(0, 0, 0);
        let goal = BlockPos::new(4, 0, 0);

        let outcome = search(&world, start, goal, 1000, &config).unwrap();
        assert_lattice_adjacent(start, &outcome.path);
        assert_eq!(outcome.path.last(), Some(&goal));
        assert!(outcome.path.contains(&BlockPos::new(2, 1, 0)));
        assert!(outcome.cost > 4.0);
    }

    #[test]
    fn test_steps_down_into_ditch() {
        let mut world = VoxelGrid::flat(10, -1);
        world.set(BlockPos::new(2, -1, 0), Block::Air);
        world.set(BlockPos::new(2, -2, 0), Block::Soil);
        let config = PathfinderConfig::default();
        let start = BlockPos::new(2, 0, -3);
        let goal = BlockPos::new(2, -1, 0);

        let outcome = search(&world, start, goal, 1000, &config).unwrap();
        assert_lattice_adjacent(start, &outcome.path);
        assert_eq!(outcome.path.last(), Some(&goal));
    }

    #[test]
    fn test_enclosed_goal_exhausts_budget() {
        let mut world = VoxelGrid::flat(10, -1);
        let goal = BlockPos::new(5, 0, 0);
        for cell in goal.horizontal_ring() {
            world.fill(cell, cell.up_by(2), Block::Stone);
        }
        let config = PathfinderConfig::default();
        assert!(search(&world, BlockPos::ORIGIN, goal, 1000, &config).is_none());
    }

    #[test]
    fn test_budget_is_capped_by_ceiling() {
        let world = VoxelGrid::flat(10, -1);
        let config = PathfinderConfig {
            node_budget_ceiling: 3,
            ..PathfinderConfig::default()
        };
        let goal = BlockPos::new(5, 0, 0);
        assert!(search(&world, BlockPos::ORIGIN, goal, 1000, &config).is_none());

        let roomy = PathfinderConfig::default();
        let outcome = search(&world, BlockPos::ORIGIN, goal, 1000, &roomy).unwrap();
        assert!(outcome.visited <= roomy.node_budget_ceiling);
    }

    #[test]
    fn test_start_equals_goal() {
        let world = VoxelGrid::flat(2, -1);
        let config = PathfinderConfig::default();
        let outcome = search(&world, BlockPos::ORIGIN, BlockPos::ORIGIN, 10, &config).unwrap();
        assert!(outcome.path.is_empty());
        assert_eq!(outcome.cost, 0.0);
    }
}
