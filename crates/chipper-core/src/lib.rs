//! Core functionalities shared by the chipper agent crates.
//!
//! Holds the lattice geometry, the configuration, the contracts of the
//! external collaborators (world queries, block interaction, the
//! synchronization channel) and an in-memory voxel grid implementing them.

#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod errors;
pub mod event;
pub mod geometry;
pub mod grid;
pub mod sync;
pub mod world;

pub use geometry::{BlockPos, Rotation, Vec3};
pub use world::{AgentId, AgentSnapshot, Interaction, WorldQuery};

/// Number of discrete world ticks elapsed, used by every tick-counted timeout.
pub type Ticks = u32;
