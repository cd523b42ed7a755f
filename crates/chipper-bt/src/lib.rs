//! Reactive control loop of the chipper agent.
//!
//! A fixed behavior tree ([`leaves::chop_tree`]) is evaluated by a throttled
//! [`Controller`] against an [`AgentLocalContext`]. Leaves read the
//! authoritative task state through the synchronization channel and answer
//! with [`MovementIntents`] and block interactions.

#![forbid(unsafe_code)]

pub mod context;
pub mod controller;
pub mod leaves;
pub mod node;

pub use context::{AgentLocalContext, MovementIntents, TickContext};
pub use controller::{Controller, HudSnapshot};
pub use leaves::{Leaf, chop_tree};
pub use node::{Behavior, Node, Status};
