//! World analysis used by the task state machine: tree recognition, line of
//! sight and leaf probes, standing spots and target scoring.

use chipper_core::config::ScoringWeights;
use chipper_core::world::{EYE_HEIGHT, EntityInfo};
use chipper_core::{BlockPos, Vec3, WorldQuery};
use cgmath::InnerSpace;
use log::debug;
use std::collections::HashSet;

/// How far below a log soil is looked for.
const ROOT_DEPTH: i32 = 3;
/// Step of the obstructing leaf probe.
const LEAF_PROBE_STEP: f64 = 0.3;
/// Step of the leaf counting probe.
const LEAF_COUNT_STEP: f64 = 0.5;
/// Spacing of the obstacle samples between the agent and a target.
const OBSTACLE_STEP: f64 = 2.0;

/// Eye position of an agent standing in `pos`.
pub fn eye_of(pos: BlockPos) -> Vec3 {
    Vec3::new(
        pos.x as f64 + 0.5,
        pos.y as f64 + EYE_HEIGHT,
        pos.z as f64 + 0.5,
    )
}

/// Whether `log` is the bottom part of a tree.
///
/// Either soil is found below it within a few blocks, going down through
/// further logs, or it stands on nothing next to at least two other logs,
/// as the base of a wide trunk does.
pub fn is_tree_base(world: &dyn WorldQuery, log: BlockPos) -> bool {
    for depth in 1..=ROOT_DEPTH {
        let below = log.down_by(depth);
        if world.is_soil(below) {
            return true;
        }
        if !world.is_log(below) {
            break;
        }
    }

    if world.is_solid(log.down()) {
        return false;
    }
    let neighbouring_logs = log
        .horizontal_ring()
        .into_iter()
        .filter(|pos| world.is_log(*pos))
        .count();
    neighbouring_logs >= 2
}

/// Whether an agent standing in `from` can see `to` from its eyes.
pub fn has_line_of_sight(world: &dyn WorldQuery, from: BlockPos, to: BlockPos) -> bool {
    world
        .raycast(eye_of(from), to.center())
        .is_none_or(|hit| hit == to)
}

/// Samples of the segment between the centers of `from.up()` and `to`.
fn probe_points(from: BlockPos, to: BlockPos, step: f64) -> impl Iterator<Item = BlockPos> {
    let start = from.up().center();
    let delta = to.center() - start;
    let length = delta.magnitude();
    let direction = if length > f64::EPSILON {
        delta / length
    } else {
        delta
    };
    let samples = if length > 1.5 {
        ((length - 1.5) / step).ceil() as usize
    } else {
        0
    };
    (0..samples)
        .map(move |i| 1.0 + i as f64 * step)
        .take_while(move |d| *d < length - 0.5)
        .map(move |d| BlockPos::containing(start + direction * d))
}

/// The first leaf between an agent standing in `from` and `tree`.
pub fn find_obstructing_leaf(
    world: &dyn WorldQuery,
    from: BlockPos,
    tree: BlockPos,
) -> Option<BlockPos> {
    probe_points(from, tree, LEAF_PROBE_STEP).find(|pos| world.is_leaf(*pos))
}

pub fn should_clear_leaves_first(world: &dyn WorldQuery, from: BlockPos, tree: BlockPos) -> bool {
    find_obstructing_leaf(world, from, tree).is_some()
}

/// Leaf samples between `from` and `to`, a leaf crossed by several samples counts several times.
pub fn count_obstructing_leaves(world: &dyn WorldQuery, from: BlockPos, to: BlockPos) -> usize {
    probe_points(from, to, LEAF_COUNT_STEP)
        .filter(|pos| world.is_leaf(*pos))
        .count()
}

/// Free feet and head cells above solid ground.
pub fn is_valid_position(world: &dyn WorldQuery, pos: BlockPos) -> bool {
    !world.is_solid(pos) && !world.is_solid(pos.up()) && world.is_solid(pos.down())
}

/// Whether an agent could stand at `pos` or one step above or below it.
fn is_passable(world: &dyn WorldQuery, pos: BlockPos) -> bool {
    [pos, pos.up(), pos.down()]
        .into_iter()
        .any(|p| is_valid_position(world, p))
}

/// Whether at least three horizontal directions around `pos` are blocked.
pub fn is_stuck_in_hole(world: &dyn WorldQuery, pos: BlockPos) -> bool {
    pos.horizontal_neighbors()
        .into_iter()
        .filter(|n| !is_passable(world, *n))
        .count()
        >= 3
}

/// Whether a sample along the straight line from `from` to `to` is impassable.
pub fn has_obstacles_between(world: &dyn WorldQuery, from: BlockPos, to: BlockPos) -> bool {
    let start = from.center();
    let delta = to.center() - start;
    let length = delta.magnitude();
    if length <= OBSTACLE_STEP {
        return false;
    }
    let direction = delta / length;
    let mut d = OBSTACLE_STEP;
    while d < length {
        if !is_passable(world, BlockPos::containing(start + direction * d)) {
            return true;
        }
        d += OBSTACLE_STEP;
    }
    false
}

/// Whether reaching `to` from `from` takes more than walking straight.
pub fn needs_navigation(
    world: &dyn WorldQuery,
    from: BlockPos,
    to: BlockPos,
    height_threshold: i32,
) -> bool {
    (to.y - from.y).abs() > height_threshold
        || is_stuck_in_hole(world, from)
        || has_obstacles_between(world, from, to)
}

/// How a candidate's distance affects its score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreMode {
    /// Closer candidates win.
    Nearest,
    /// Further candidates win, to leave an exhausted area.
    Explore,
}

/// Scores a candidate target seen from `from`. Higher is better.
///
/// # Arguments
///
/// * `world` - The world to probe.
/// * `from` - Cell the agent stands in.
/// * `target` - The candidate.
/// * `attempts` - How often the candidate was already tried.
/// * `weights` - Score weights.
/// * `mode` - Whether distance is penalised or rewarded.
///
/// # Returns
///
/// The candidate's score.
pub fn score_target(
    world: &dyn WorldQuery,
    from: BlockPos,
    target: BlockPos,
    attempts: u32,
    weights: &ScoringWeights,
    mode: ScoreMode,
) -> f64 {
    let distance_sq = from.squared_distance(target);
    let mut score = weights.base;
    score += match mode {
        ScoreMode::Nearest => -distance_sq * weights.distance,
        ScoreMode::Explore => distance_sq.sqrt() * weights.exploration,
    };

    let height = (target.y - from.y).abs();
    if height > weights.height_threshold {
        score -= height as f64 * weights.height;
    }
    score -= count_obstructing_leaves(world, from, target) as f64 * weights.leaf;
    if has_line_of_sight(world, from, target) {
        score += weights.line_of_sight;
    }
    if needs_navigation(world, from, target, weights.height_threshold) {
        score -= weights.navigation;
    }
    score - attempts as f64 * weights.attempt
}

/// The highest scored candidate, the first one wins ties.
pub fn best_scored(candidates: impl IntoIterator<Item = (BlockPos, f64)>) -> Option<BlockPos> {
    candidates
        .into_iter()
        .fold(None, |best: Option<(BlockPos, f64)>, (pos, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((pos, score)),
        })
        .map(|(pos, _)| pos)
}

/// Tree bases in the box of `radius` around `origin`, `below` blocks down and `above` blocks up.
pub fn tree_bases(
    world: &dyn WorldQuery,
    origin: BlockPos,
    radius: i32,
    below: i32,
    above: i32,
) -> Vec<BlockPos> {
    let mut bases = Vec::new();
    for x in -radius..=radius {
        for z in -radius..=radius {
            for y in -below..=above {
                let pos = origin.offset(x, y, z);
                if world.is_log(pos) && is_tree_base(world, pos) {
                    bases.push(pos);
                }
            }
        }
    }
    bases
}

/// Logs around `around` on growing rings up to `max_radius`, stopping at the first ring with any.
pub fn logs_near(
    world: &dyn WorldQuery,
    around: BlockPos,
    max_radius: i32,
    accept: impl Fn(BlockPos) -> bool,
) -> Vec<BlockPos> {
    for radius in 1..=max_radius {
        let mut found = Vec::new();
        for x in -radius..=radius {
            for y in -2..=4 {
                for z in -radius..=radius {
                    let pos = around.offset(x, y, z);
                    if world.is_log(pos) && accept(pos) && !found.contains(&pos) {
                        found.push(pos);
                    }
                }
            }
        }
        if !found.is_empty() {
            return found;
        }
    }
    Vec::new()
}

/// The next log of the tree once `current` can no longer be mined.
///
/// Candidates are gathered above, beside, diagonally above and finally in a
/// small box around `current`. The first one hidden behind at most two leaves
/// wins, else the closest one.
pub fn find_next_log(world: &dyn WorldQuery, current: BlockPos) -> Option<BlockPos> {
    let ring = current.horizontal_ring();
    let mut candidates: Vec<BlockPos> = Vec::new();
    let mut push = |pos: BlockPos| {
        if pos != current && world.is_log(pos) && !candidates.contains(&pos) {
            candidates.push(pos);
        }
    };

    (1..=4).map(|dy| current.up_by(dy)).for_each(&mut push);
    ring.into_iter().for_each(&mut push);
    for dy in 1..=3 {
        ring.into_iter().map(|pos| pos.up_by(dy)).for_each(&mut push);
    }
    for x in -2..=2 {
        for z in -2..=2 {
            for y in -1..=3 {
                push(current.offset(x, y, z));
            }
        }
    }

    debug!("{} log candidates around {}", candidates.len(), current);
    if let Some(easy) = candidates
        .iter()
        .find(|c| count_obstructing_leaves(world, current, **c) <= 2)
    {
        return Some(*easy);
    }
    candidates.into_iter().min_by(|a, b| {
        current
            .squared_distance(*a)
            .total_cmp(&current.squared_distance(*b))
    })
}

/// Another log near the agent, not much further away than `current`.
pub fn find_alternative_log(
    world: &dyn WorldQuery,
    from: BlockPos,
    current: BlockPos,
    radius: i32,
) -> Option<BlockPos> {
    let limit = from.squared_distance(current) + 4.0;
    for x in -radius..=radius {
        for y in -2..=5 {
            for z in -radius..=radius {
                let pos = from.offset(x, y, z);
                if pos != current && world.is_log(pos) && from.squared_distance(pos) <= limit {
                    return Some(pos);
                }
            }
        }
    }
    None
}

/// A spot to stand on with a clear view of `target`.
///
/// Walks from `from` towards the target first, then tries the eight compass
/// points around it at growing distances.
pub fn find_better_position(
    world: &dyn WorldQuery,
    from: BlockPos,
    target: BlockPos,
) -> Option<BlockPos> {
    let start = from.center();
    let delta = target.center() - start;
    if delta.magnitude2() > f64::EPSILON {
        let direction = delta.normalize();
        let walked = (1..=4)
            .map(|d| BlockPos::containing(start + direction * d as f64))
            .find(|pos| is_valid_position(world, *pos) && has_line_of_sight(world, *pos, target));
        if walked.is_some() {
            return walked;
        }
    }

    for radius in 2..=4 {
        for angle in (0..360).step_by(45) {
            let radians = (angle as f64).to_radians();
            let dx = (radius as f64 * radians.cos()).round() as i32;
            let dz = (radius as f64 * radians.sin()).round() as i32;
            let pos = target.offset(dx, 0, dz);
            if is_valid_position(world, pos) && has_line_of_sight(world, pos, target) {
                return Some(pos);
            }
        }
    }
    None
}

/// A spot around the tree base with no leaf in the way, or one closer to the blocking leaf.
pub fn find_better_leaf_position(
    world: &dyn WorldQuery,
    from: BlockPos,
    tree: BlockPos,
) -> Option<BlockPos> {
    for x in -2..=2 {
        for z in -2..=2 {
            let pos = tree.offset(x, 0, z);
            if !is_valid_position(world, pos) {
                continue;
            }
            match find_obstructing_leaf(world, pos, tree) {
                None => return Some(pos),
                Some(leaf) if pos.squared_distance(leaf) < from.squared_distance(leaf) => {
                    return Some(pos);
                }
                Some(_) => {}
            }
        }
    }
    None
}

/// The leaf closest to the agent around its line of sight to `tree`, skipping `skip`.
pub fn find_alternative_leaf(
    world: &dyn WorldQuery,
    from: BlockPos,
    tree: BlockPos,
    skip: &HashSet<BlockPos>,
) -> Option<BlockPos> {
    let mut candidates = Vec::new();
    for center in probe_points(from, tree, LEAF_COUNT_STEP) {
        for x in -1..=1 {
            for y in -1..=1 {
                for z in -1..=1 {
                    let pos = center.offset(x, y, z);
                    if world.is_leaf(pos) && !skip.contains(&pos) {
                        candidates.push(pos);
                    }
                }
            }
        }
    }
    candidates
        .into_iter()
        .min_by(|a, b| from.squared_distance(*a).total_cmp(&from.squared_distance(*b)))
}

/// The closest collectible item within `radius` of `position`.
pub fn nearest_item(world: &dyn WorldQuery, position: Vec3, radius: f64) -> Option<EntityInfo> {
    world
        .entities_within(position, radius, &|e| e.is_collectible())
        .into_iter()
        .min_by(|a, b| {
            (a.position - position)
                .magnitude2()
                .total_cmp(&(b.position - position).magnitude2())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chipper_core::grid::{Block, VoxelGrid};

    fn world_with_tree(base: BlockPos, height: i32, crown: bool) -> VoxelGrid {
        let mut world = VoxelGrid::flat(12, -1);
        world.plant_tree(base, height, crown);
        world
    }

    #[test]
    fn test_tree_base_on_soil() {
        let world = world_with_tree(BlockPos::new(3, 0, 0), 5, false);
        assert!(is_tree_base(&world, BlockPos::new(3, 0, 0)));
        assert!(is_tree_base(&world, BlockPos::new(3, 2, 0)));
        assert!(!is_tree_base(&world, BlockPos::new(3, 4, 0)));
    }

    #[test]
    fn test_tree_base_of_floating_wide_trunk() {
        let mut world = VoxelGrid::new();
        world.set(BlockPos::new(0, 5, 0), Block::Log);
        world.set(BlockPos::new(1, 5, 0), Block::Log);
        assert!(!is_tree_base(&world, BlockPos::new(0, 5, 0)));
        world.set(BlockPos::new(0, 5, 1), Block::Log);
        assert!(is_tree_base(&world, BlockPos::new(0, 5, 0)));
    }

    #[test]
    fn test_leaf_probe_finds_blocking_leaf() {
        let mut world = world_with_tree(BlockPos::new(3, 0, 0), 1, false);
        world.set(BlockPos::new(2, 0, 0), Block::Leaf);
        assert_eq!(
            find_obstructing_leaf(&world, BlockPos::ORIGIN, BlockPos::new(3, 0, 0)),
            Some(BlockPos::new(2, 0, 0))
        );
        assert!(count_obstructing_leaves(&world, BlockPos::ORIGIN, BlockPos::new(3, 0, 0)) >= 1);
        assert!(!has_line_of_sight(&world, BlockPos::ORIGIN, BlockPos::new(3, 0, 0)));

        world.set(BlockPos::new(2, 0, 0), Block::Air);
        assert_eq!(
            find_obstructing_leaf(&world, BlockPos::ORIGIN, BlockPos::new(3, 0, 0)),
            None
        );
        assert!(has_line_of_sight(&world, BlockPos::ORIGIN, BlockPos::new(3, 0, 0)));
    }

    #[test]
    fn test_stone_blocks_sight_but_is_not_a_leaf() {
        let mut world = world_with_tree(BlockPos::new(3, 0, 0), 1, false);
        world.fill(BlockPos::new(2, 0, -1), BlockPos::new(2, 2, 1), Block::Stone);
        assert!(!has_line_of_sight(&world, BlockPos::ORIGIN, BlockPos::new(3, 0, 0)));
        assert!(!should_clear_leaves_first(&world, BlockPos::ORIGIN, BlockPos::new(3, 0, 0)));
    }

    #[test]
    fn test_open_field_needs_no_navigation() {
        let world = VoxelGrid::flat(12, -1);
        assert!(!is_stuck_in_hole(&world, BlockPos::ORIGIN));
        assert!(!needs_navigation(&world, BlockPos::ORIGIN, BlockPos::new(8, 0, 0), 3));
        assert!(needs_navigation(&world, BlockPos::ORIGIN, BlockPos::new(8, 5, 0), 3));
    }

    #[test]
    fn test_wall_needs_navigation() {
        let mut world = VoxelGrid::flat(12, -1);
        world.fill(BlockPos::new(4, 0, -3), BlockPos::new(4, 3, 3), Block::Stone);
        assert!(has_obstacles_between(&world, BlockPos::ORIGIN, BlockPos::new(8, 0, 0)));
    }

    #[test]
    fn test_hole_is_detected() {
        let mut world = VoxelGrid::flat(12, -1);
        world.fill(BlockPos::new(-1, 0, -1), BlockPos::new(1, 3, 1), Block::Stone);
        world.set(BlockPos::ORIGIN, Block::Air);
        world.set(BlockPos::ORIGIN.up(), Block::Air);
        assert!(is_stuck_in_hole(&world, BlockPos::ORIGIN));
    }

    #[test]
    fn test_visible_candidate_outscores_hidden_one() {
        let mut world = VoxelGrid::flat(12, -1);
        world.set(BlockPos::new(3, 0, 0), Block::Log);
        world.set(BlockPos::new(0, 0, 3), Block::Log);
        world.set(BlockPos::new(0, 0, 2), Block::Leaf);
        let weights = ScoringWeights::default();

        let visible = score_target(&world, BlockPos::ORIGIN, BlockPos::new(3, 0, 0), 0, &weights, ScoreMode::Nearest);
        let hidden = score_target(&world, BlockPos::ORIGIN, BlockPos::new(0, 0, 3), 0, &weights, ScoreMode::Nearest);
        assert!(visible > hidden);

        let retried = score_target(&world, BlockPos::ORIGIN, BlockPos::new(3, 0, 0), 2, &weights, ScoreMode::Nearest);
        assert!(retried < hidden);
    }

    #[test]
    fn test_explore_mode_prefers_distant_candidates() {
        let world = VoxelGrid::flat(24, -1);
        let weights = ScoringWeights::default();
        let near = BlockPos::new(3, 0, 0);
        let far = BlockPos::new(20, 0, 0);
        let score = |pos, mode| score_target(&world, BlockPos::ORIGIN, pos, 0, &weights, mode);
        assert!(score(near, ScoreMode::Nearest) > score(far, ScoreMode::Nearest));
        assert!(score(far, ScoreMode::Explore) > score(near, ScoreMode::Explore));
    }

    #[test]
    fn test_best_scored_keeps_first_of_ties() {
        let a = BlockPos::new(1, 0, 0);
        let b = BlockPos::new(2, 0, 0);
        assert_eq!(best_scored([(a, -50.0), (b, -50.0)]), Some(a));
        assert_eq!(best_scored([(a, -50.0), (b, -10.0)]), Some(b));
        assert_eq!(best_scored(Vec::new()), None);
    }

    #[test]
    fn test_next_log_prefers_the_one_above() {
        let world = world_with_tree(BlockPos::new(3, 0, 0), 4, false);
        assert_eq!(
            find_next_log(&world, BlockPos::new(3, 0, 0)),
            Some(BlockPos::new(3, 1, 0))
        );
        let lonely = world_with_tree(BlockPos::new(3, 0, 0), 1, false);
        assert_eq!(find_next_log(&lonely, BlockPos::new(3, 0, 0)), None);
    }

    #[test]
    fn test_better_position_has_sight() {
        let mut world = VoxelGrid::flat(12, -1);
        let tree = BlockPos::new(4, 0, 0);
        world.set(tree, Block::Log);
        world.fill(BlockPos::new(2, 0, -1), BlockPos::new(2, 3, 1), Block::Stone);
        let spot = find_better_position(&world, BlockPos::ORIGIN, tree).unwrap();
        assert!(is_valid_position(&world, spot));
        assert!(has_line_of_sight(&world, spot, tree));
    }

    #[test]
    fn test_alternative_leaf_skips_problematic() {
        let mut world = VoxelGrid::flat(12, -1);
        let tree = BlockPos::new(4, 0, 0);
        world.set(tree, Block::Log);
        world.set(BlockPos::new(2, 1, 0), Block::Leaf);
        world.set(BlockPos::new(3, 0, 0), Block::Leaf);

        let mut skip = HashSet::new();
        let first = find_alternative_leaf(&world, BlockPos::ORIGIN, tree, &skip).unwrap();
        assert_eq!(first, BlockPos::new(2, 1, 0));
        skip.insert(first);
        assert_eq!(
            find_alternative_leaf(&world, BlockPos::ORIGIN, tree, &skip),
            Some(BlockPos::new(3, 0, 0))
        );
    }

    #[test]
    fn test_nearest_item() {
        let mut world = VoxelGrid::flat(12, -1);
        world.spawn_item(Vec3::new(6.5, 0.2, 0.5));
        let close = world.spawn_item(Vec3::new(2.5, 0.2, 0.5));
        world.spawn_item(Vec3::new(30.5, 0.2, 0.5));
        let found = nearest_item(&world, Vec3::new(0.5, 0.0, 0.5), 10.0).unwrap();
        assert_eq!(found.id, close);
    }
}
