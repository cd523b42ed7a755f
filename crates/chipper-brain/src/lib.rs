//! Authoritative side of the chipper agent.
//!
//! Every active agent owns an [`AgentBrain`]: a task state machine plus the
//! failure intelligence it consults. Brains live in a shared
//! [`BrainRegistry`] and are only mutated by the [`TaskLoop`]. The reactive
//! loop talks to them through a [`BrainChannel`], which answers queries from
//! the registry and queues notifications for the next authoritative tick.

#![forbid(unsafe_code)]

pub mod channel;
pub mod errors;
pub mod intelligence;
pub mod machine;
pub mod probes;
pub mod registry;
pub mod task;
pub mod task_loop;

pub use channel::{BrainChannel, NotificationReceiver, NotificationSender, notification_queue};
pub use errors::{BrainError, BrainResult};
pub use intelligence::Intelligence;
pub use machine::{AgentBrain, Surroundings};
pub use registry::BrainRegistry;
pub use task::{Task, TaskState};
pub use task_loop::TaskLoop;
