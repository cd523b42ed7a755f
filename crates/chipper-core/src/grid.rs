//! An in-memory voxel world.
//!
//! [`VoxelGrid`] is a sparse block map plus a flat entity list. It implements
//! [`WorldQuery`] and is what the simulations and the tests run against.

use crate::geometry::{BlockPos, Vec3};
use crate::world::{EntityInfo, EntityKind, WorldQuery};
use cgmath::InnerSpace;
use log::debug;
use std::collections::HashMap;

/// Distance between raycast samples.
const RAY_STEP: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Block {
    #[default]
    Air,
    Log,
    Leaf,
    Soil,
    Stone,
}

impl Block {
    pub fn is_solid(self) -> bool {
        !matches!(self, Block::Air)
    }
}

#[derive(Debug, Clone, Default)]
pub struct VoxelGrid {
    blocks: HashMap<BlockPos, Block>,
    entities: Vec<EntityInfo>,
    next_entity_id: u64,
}

impl VoxelGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// A square soil floor of `half_extent` blocks around the origin, its top at `floor_y`.
    pub fn flat(half_extent: i32, floor_y: i32) -> Self {
        let mut grid = Self::new();
        grid.fill(
            BlockPos::new(-half_extent, floor_y, -half_extent),
            BlockPos::new(half_extent, floor_y, half_extent),
            Block::Soil,
        );
        grid
    }

    pub fn get(&self, pos: BlockPos) -> Block {
        self.blocks.get(&pos).copied().unwrap_or_default()
    }

    pub fn set(&mut self, pos: BlockPos, block: Block) {
        if block == Block::Air {
            self.blocks.remove(&pos);
        } else {
            self.blocks.insert(pos, block);
        }
    }

    /// Fills the inclusive box spanned by `min` and `max`.
    pub fn fill(&mut self, min: BlockPos, max: BlockPos, block: Block) {
        for x in min.x..=max.x {
            for y in min.y..=max.y {
                for z in min.z..=max.z {
                    self.set(BlockPos::new(x, y, z), block);
                }
            }
        }
    }

    /// Grows a trunk of `height` logs on `base` and, optionally, a leaf crown.
    ///
    /// # Returns
    ///
    /// The trunk positions from bottom to top.
    pub fn plant_tree(&mut self, base: BlockPos, height: i32, crown: bool) -> Vec<BlockPos> {
        let trunk: Vec<BlockPos> = (0..height).map(|dy| base.up_by(dy)).collect();
        if crown {
            if let Some(&top) = trunk.last() {
                for dx in -2..=2 {
                    for dz in -2..=2 {
                        for dy in -1..=1 {
                            if dx * dx + dz * dz + dy * dy > 5 {
                                continue;
                            }
                            let pos = top.offset(dx, dy, dz);
                            if self.get(pos) == Block::Air {
                                self.set(pos, Block::Leaf);
                            }
                        }
                    }
                }
                self.set(top.up(), Block::Leaf);
            }
        }
        for &pos in &trunk {
            self.set(pos, Block::Log);
        }
        trunk
    }

    /// Removes a block. Broken logs drop a collectible item.
    ///
    /// # Returns
    ///
    /// The block that was removed, `None` if the cell was already empty.
    pub fn break_block(&mut self, pos: BlockPos) -> Option<Block> {
        let block = self.blocks.remove(&pos)?;
        if block == Block::Log {
            self.spawn_item(pos.center());
        }
        debug!("Broke {:?} at {}", block, pos);
        Some(block)
    }

    /// Spawns a collectible item and returns its id.
    pub fn spawn_item(&mut self, position: Vec3) -> u64 {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        self.entities.push(EntityInfo {
            id,
            kind: EntityKind::Item,
            position,
            alive: true,
            can_pick_up: true,
        });
        id
    }

    pub fn remove_entity(&mut self, id: u64) -> Option<EntityInfo> {
        let index = self.entities.iter().position(|e| e.id == id)?;
        Some(self.entities.swap_remove(index))
    }

    pub fn entities(&self) -> &[EntityInfo] {
        &self.entities
    }

    /// Number of log blocks left in the world.
    pub fn log_count(&self) -> usize {
        self.blocks.values().filter(|b| **b == Block::Log).count()
    }
}

impl WorldQuery for VoxelGrid {
    fn is_log(&self, pos: BlockPos) -> bool {
        self.get(pos) == Block::Log
    }

    fn is_leaf(&self, pos: BlockPos) -> bool {
        self.get(pos) == Block::Leaf
    }

    fn is_solid(&self, pos: BlockPos) -> bool {
        self.get(pos).is_solid()
    }

    fn is_air(&self, pos: BlockPos) -> bool {
        self.get(pos) == Block::Air
    }

    fn is_soil(&self, pos: BlockPos) -> bool {
        self.get(pos) == Block::Soil
    }

    fn raycast(&self, from: Vec3, to: Vec3) -> Option<BlockPos> {
        let delta = to - from;
        let length = delta.magnitude();
        let end = BlockPos::containing(to);
        if length < f64::EPSILON {
            return (!self.is_air(end)).then_some(end);
        }

        let direction = delta / length;
        let steps = (length / RAY_STEP).ceil() as usize;
        let mut last = None;
        for i in 0..=steps {
            let travelled = (i as f64 * RAY_STEP).min(length);
            let cell = BlockPos::containing(from + direction * travelled);
            if last == Some(cell) {
                continue;
            }
            last = Some(cell);
            if !self.is_air(cell) {
                return Some(cell);
            }
        }
        None
    }

    fn entities_within(
        &self,
        center: Vec3,
        radius: f64,
        predicate: &dyn Fn(&EntityInfo) -> bool,
    ) -> Vec<EntityInfo> {
        let radius_sq = radius * radius;
        self.entities
            .iter()
            .filter(|e| (e.position - center).magnitude2() <= radius_sq)
            .filter(|e| predicate(e))
            .copied()
            .collect()
    }
}
