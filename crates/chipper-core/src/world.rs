//! Contracts of the world collaborators the agent perceives and acts through.

use crate::geometry::{BlockPos, Rotation, Vec3};
use std::fmt;

/// Height of the agent's eyes above its feet.
pub const EYE_HEIGHT: f64 = 1.62;

/// Identity of a controlled agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(pub u64);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent-{}", self.0)
    }
}

/// Observable body state of an agent for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentSnapshot {
    pub id: AgentId,
    /// Position of the agent's feet.
    pub position: Vec3,
    pub rotation: Rotation,
    pub on_ground: bool,
}

impl AgentSnapshot {
    pub fn new(id: AgentId, position: Vec3) -> Self {
        Self {
            id,
            position,
            rotation: Rotation::default(),
            on_ground: true,
        }
    }

    /// The block the agent's feet are in.
    pub fn block_pos(&self) -> BlockPos {
        BlockPos::containing(self.position)
    }

    pub fn eye_position(&self) -> Vec3 {
        self.position + Vec3::new(0.0, EYE_HEIGHT, 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A dropped item that can be picked up.
    Item,
    Other,
}

/// Entity snapshot returned by proximity queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityInfo {
    pub id: u64,
    pub kind: EntityKind,
    pub position: Vec3,
    pub alive: bool,
    pub can_pick_up: bool,
}

impl EntityInfo {
    /// Whether the entity is a live item the agent is allowed to collect.
    pub fn is_collectible(&self) -> bool {
        self.kind == EntityKind::Item && self.alive && self.can_pick_up
    }
}

/// Read-only view of the voxel world.
///
/// Block classification, solidity, a raycast primitive and entity proximity
/// queries are all the decision-making core ever needs from the world.
pub trait WorldQuery {
    fn is_log(&self, pos: BlockPos) -> bool;

    fn is_leaf(&self, pos: BlockPos) -> bool;

    fn is_solid(&self, pos: BlockPos) -> bool;

    fn is_air(&self, pos: BlockPos) -> bool;

    /// Ground a tree can grow from (dirt-like blocks).
    fn is_soil(&self, pos: BlockPos) -> bool;

    /// Whether an agent could occupy `pos`: both the feet and the head cell are free.
    fn is_traversable(&self, pos: BlockPos) -> bool {
        !self.is_solid(pos) && !self.is_solid(pos.up())
    }

    /// Casts a ray and returns the first non-air block between `from` and `to`.
    ///
    /// # Arguments
    ///
    /// * `from` - Origin of the ray.
    /// * `to` - End point of the ray, the block containing it is included.
    ///
    /// # Returns
    ///
    /// The first obstruction, or `None` if the segment is clear.
    fn raycast(&self, from: Vec3, to: Vec3) -> Option<BlockPos>;

    /// All entities within `radius` of `center` accepted by `predicate`.
    fn entities_within(
        &self,
        center: Vec3,
        radius: f64,
        predicate: &dyn Fn(&EntityInfo) -> bool,
    ) -> Vec<EntityInfo>;
}

/// Block interaction collaborator used by the mining action.
pub trait Interaction {
    /// Starts breaking the block at `pos`.
    fn attack_block(&mut self, pos: BlockPos);

    /// Continues breaking the block at `pos`.
    fn update_breaking_progress(&mut self, pos: BlockPos);

    fn cancel_breaking(&mut self);
}
