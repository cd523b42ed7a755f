//! A headless world for the chipper agent: a generated forest, a kinematic
//! body that follows movement intents, and block breaking with item drops.

use chipper_bt::MovementIntents;
use chipper_core::grid::{Block, VoxelGrid};
use chipper_core::{AgentId, AgentSnapshot, BlockPos, Interaction, Rotation, Vec3, WorldQuery};
use log::{debug, info};
use rand::Rng;

/// Half width of the generated floor.
pub const WORLD_HALF_EXTENT: i32 = 24;
/// Trees are never planted this close to the spawn point.
const SPAWN_CLEARANCE: i32 = 3;
const WALK_SPEED: f64 = 0.15;
const SPRINT_SPEED: f64 = 0.22;
const FALL_SPEED: f64 = 0.4;
/// Items closer than this to the body are picked up.
pub const PICKUP_RADIUS: f64 = 2.5;

/// A soil floor with `trees` randomly placed trees.
///
/// # Arguments
///
/// * `rng` - Source of tree positions and heights.
/// * `trees` - Number of trees to plant, trees that would touch another one are skipped.
///
/// # Returns
///
/// The generated world.
pub fn generate_forest(rng: &mut impl Rng, trees: usize) -> VoxelGrid {
    let mut world = VoxelGrid::flat(WORLD_HALF_EXTENT, -1);
    let reach = WORLD_HALF_EXTENT - 3;
    let mut planted = 0;
    for _ in 0..trees {
        let base = BlockPos::new(rng.random_range(-reach..=reach), 0, rng.random_range(-reach..=reach));
        if base.x.abs() < SPAWN_CLEARANCE && base.z.abs() < SPAWN_CLEARANCE {
            continue;
        }
        if base.horizontal_ring().iter().any(|p| !world.is_air(*p)) || !world.is_air(base) {
            continue;
        }
        world.plant_tree(base, rng.random_range(4..=6), rng.random_bool(0.7));
        planted += 1;
    }
    info!("Planted {} trees, {} logs", planted, world.log_count());
    world
}

/// Breaks blocks over several ticks, the way a player holding the attack key does.
#[derive(Debug, Default)]
pub struct SimInteraction {
    breaking: Option<(BlockPos, u32)>,
    broken: Vec<BlockPos>,
}

impl SimInteraction {
    /// Attack ticks needed to break a log.
    const LOG_HITS: u32 = 8;

    /// Blocks finished since the last call.
    pub fn take_broken(&mut self) -> Vec<BlockPos> {
        std::mem::take(&mut self.broken)
    }

    fn hit(&mut self, pos: BlockPos) {
        let hits = match self.breaking {
            Some((current, hits)) if current == pos => hits + 1,
            _ => 1,
        };
        if hits >= Self::LOG_HITS {
            self.broken.push(pos);
            self.breaking = None;
        } else {
            self.breaking = Some((pos, hits));
        }
    }
}

impl Interaction for SimInteraction {
    fn attack_block(&mut self, pos: BlockPos) {
        self.hit(pos);
    }

    fn update_breaking_progress(&mut self, pos: BlockPos) {
        self.hit(pos);
    }

    fn cancel_breaking(&mut self) {
        self.breaking = None;
    }
}

/// The world, the agent's body and its interaction state.
#[derive(Debug)]
pub struct Simulation {
    pub world: VoxelGrid,
    pub body: AgentSnapshot,
    pub interaction: SimInteraction,
    pub collected: usize,
}

impl Simulation {
    pub fn new(world: VoxelGrid, agent: AgentId) -> Self {
        Self {
            world,
            body: AgentSnapshot::new(agent, Vec3::new(0.5, 0.0, 0.5)),
            interaction: SimInteraction::default(),
            collected: 0,
        }
    }

    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.body.rotation = rotation;
    }

    /// Advances the body by one tick of `intents`, then applies finished
    /// breaks and picks up nearby items.
    pub fn step(&mut self, intents: &MovementIntents) {
        if let Some(look) = intents.look {
            self.body.rotation = look;
        }
        self.walk(intents);
        self.fall();
        for pos in self.interaction.take_broken() {
            if let Some(block) = self.world.break_block(pos) {
                debug!("Agent broke {:?} at {}", block, pos);
            }
        }
        self.pick_up();
    }

    fn walk(&mut self, intents: &MovementIntents) {
        let yaw = f64::from(self.body.rotation.yaw).to_radians();
        let forward = Vec3::new(-yaw.sin(), 0.0, yaw.cos());
        let left = Vec3::new(yaw.cos(), 0.0, yaw.sin());

        let mut direction = Vec3::new(0.0, 0.0, 0.0);
        if intents.forward {
            direction += forward;
        }
        if intents.back {
            direction -= forward;
        }
        if intents.left {
            direction += left;
        }
        if intents.right {
            direction -= left;
        }
        let speed = if intents.sprint { SPRINT_SPEED } else { WALK_SPEED };
        let next = self.body.position + direction * speed;
        let cell = BlockPos::containing(next);

        if self.world.is_traversable(cell) {
            self.body.position = next;
        } else if intents.jump && self.body.on_ground && self.world.is_traversable(cell.up()) {
            self.body.position = Vec3::new(next.x, f64::from(cell.y + 1), next.z);
        }
    }

    fn fall(&mut self) {
        let below = BlockPos::containing(self.body.position - Vec3::new(0.0, 0.01, 0.0));
        if self.world.is_solid(below) {
            self.body.position.y = self.body.position.y.floor();
            self.body.on_ground = true;
        } else {
            self.body.position.y -= FALL_SPEED;
            let landing = BlockPos::containing(self.body.position);
            if self.world.is_solid(landing) {
                self.body.position.y = f64::from(landing.y + 1);
            }
            self.body.on_ground = false;
        }
    }

    fn pick_up(&mut self) {
        let near: Vec<u64> = self
            .world
            .entities_within(self.body.position, PICKUP_RADIUS, &|e| e.is_collectible())
            .iter()
            .map(|e| e.id)
            .collect();
        for id in near {
            if self.world.remove_entity(id).is_some() {
                self.collected += 1;
                info!("Picked up item {} ({} collected)", id, self.collected);
            }
        }
    }

    /// Logs still standing in the world.
    pub fn logs_left(&self) -> usize {
        self.world.log_count()
    }

    pub fn block(&self, pos: BlockPos) -> Block {
        self.world.get(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_forest_keeps_spawn_clear() {
        let mut rng = StdRng::seed_from_u64(7);
        let world = generate_forest(&mut rng, 30);
        assert!(world.log_count() > 0);
        for x in -2..=2 {
            for z in -2..=2 {
                assert!(!world.is_log(BlockPos::new(x, 0, z)));
            }
        }
    }

    #[test]
    fn test_log_breaks_after_enough_hits() {
        let mut world = VoxelGrid::flat(4, -1);
        let log = BlockPos::new(1, 0, 0);
        world.set(log, Block::Log);
        let mut sim = Simulation::new(world, AgentId(1));

        sim.interaction.attack_block(log);
        for _ in 1..SimInteraction::LOG_HITS {
            sim.step(&MovementIntents::default());
            assert_eq!(sim.block(log), Block::Log);
            sim.interaction.update_breaking_progress(log);
        }
        sim.step(&MovementIntents::default());
        assert_eq!(sim.block(log), Block::Air);
        assert_eq!(sim.collected, 1);
    }

    #[test]
    fn test_cancel_restarts_breaking() {
        let mut interaction = SimInteraction::default();
        let log = BlockPos::new(0, 0, 3);
        for _ in 1..SimInteraction::LOG_HITS {
            interaction.update_breaking_progress(log);
        }
        interaction.cancel_breaking();
        interaction.update_breaking_progress(log);
        assert!(interaction.take_broken().is_empty());
    }

    #[test]
    fn test_walking_forward_follows_yaw() {
        let world = VoxelGrid::flat(4, -1);
        let mut sim = Simulation::new(world, AgentId(1));
        let intents = MovementIntents {
            forward: true,
            look: Some(Rotation::new(0.0, 0.0)),
            ..MovementIntents::default()
        };
        sim.step(&intents);
        assert!((sim.body.position.z - (0.5 + WALK_SPEED)).abs() < 1e-9);
        assert!((sim.body.position.x - 0.5).abs() < 1e-9);
        assert!(sim.body.on_ground);
    }

    #[test]
    fn test_walls_stop_the_body() {
        let mut world = VoxelGrid::flat(4, -1);
        world.fill(BlockPos::new(-1, 0, 1), BlockPos::new(1, 1, 1), Block::Stone);
        let mut sim = Simulation::new(world, AgentId(1));
        let intents = MovementIntents {
            forward: true,
            look: Some(Rotation::new(0.0, 0.0)),
            ..MovementIntents::default()
        };
        for _ in 0..10 {
            sim.step(&intents);
        }
        assert!(sim.body.position.z < 1.0);
    }
}
