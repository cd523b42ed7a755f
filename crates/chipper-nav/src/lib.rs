//! Navigation for the chipper agent.
//!
//! [`Pathfinder`] wraps a bounded A* search ([`astar`]) and a TTL result
//! cache ([`cache`]). Callers that cannot live with a missing path fall back
//! to [`direct_path`].

#![forbid(unsafe_code)]

pub mod astar;
pub mod cache;
pub mod pathfinder;

pub use astar::{SearchOutcome, search};
pub use cache::PathCache;
pub use pathfinder::{Pathfinder, direct_path};
