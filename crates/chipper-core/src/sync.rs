//! The synchronization channel between the reactive and the authoritative loop.
//!
//! The reactive loop only ever sees the task state machine through
//! [`TaskChannel`]: read-mostly queries, fire-and-forget notifications and the
//! activation controls used by the command surface.

use crate::event::Notification;
use crate::geometry::{BlockPos, Vec3};
use crate::world::AgentId;
use std::fmt;

/// What the task state machine is currently reasoning about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ThinkingState {
    Scanning,
    Pathfinding,
    Analyzing,
    Chopping,
    ClearingObstacles,
    Repositioning,
    Collecting,
    ProblemSolving,
    StuckRecovery,
    #[default]
    Idle,
}

impl ThinkingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThinkingState::Scanning => "scanning",
            ThinkingState::Pathfinding => "pathfinding",
            ThinkingState::Analyzing => "analyzing",
            ThinkingState::Chopping => "chopping",
            ThinkingState::ClearingObstacles => "clearing_obstacles",
            ThinkingState::Repositioning => "repositioning",
            ThinkingState::Collecting => "collecting",
            ThinkingState::ProblemSolving => "problem_solving",
            ThinkingState::StuckRecovery => "stuck_recovery",
            ThinkingState::Idle => "idle",
        }
    }

    /// Human readable description for status displays.
    pub fn description(&self) -> &'static str {
        match self {
            ThinkingState::Scanning => "Scanning for trees",
            ThinkingState::Pathfinding => "Finding path",
            ThinkingState::Analyzing => "Analyzing situation",
            ThinkingState::Chopping => "Chopping wood",
            ThinkingState::ClearingObstacles => "Clearing obstacles",
            ThinkingState::Repositioning => "Repositioning",
            ThinkingState::Collecting => "Collecting items",
            ThinkingState::ProblemSolving => "Solving problem",
            ThinkingState::StuckRecovery => "Recovering from stuck",
            ThinkingState::Idle => "Idle",
        }
    }
}

impl fmt::Display for ThinkingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Query, notification and control contract of the authoritative side.
///
/// Implementations must tolerate calls from the reactive loop while the
/// authoritative loop is ticking. Notifications never block.
pub trait TaskChannel: Send + Sync {
    /// Creates the agent's task state. Starting an active agent is a no-op.
    fn start(&self, agent: AgentId);

    /// Drops the agent's task state. Idempotent.
    fn stop(&self, agent: AgentId);

    fn is_active(&self, agent: AgentId) -> bool;

    /// One line summary of the agent's task and statistics.
    fn status(&self, agent: AgentId) -> String;

    /// The position the agent should currently head for, if any.
    ///
    /// Reposition targets win over tree targets, which win over item targets.
    fn active_target(&self, agent: AgentId) -> Option<Vec3>;

    /// The block the agent should currently break: the leaf while clearing
    /// leaves, the tree otherwise.
    fn mining_target(&self, agent: AgentId) -> Option<BlockPos>;

    fn is_repositioning(&self, agent: AgentId) -> bool;

    fn is_clearing_leaves(&self, agent: AgentId) -> bool;

    fn thinking_state(&self, agent: AgentId) -> ThinkingState;

    /// Queues a notification for the agent's next authoritative tick.
    fn notify(&self, agent: AgentId, notification: Notification);

    fn notify_mining_progress(&self, agent: AgentId) {
        self.notify(agent, Notification::MiningProgress);
    }

    fn notify_line_of_sight_failure(&self, agent: AgentId) {
        self.notify(agent, Notification::LineOfSightFailure);
    }

    fn force_new_target(&self, agent: AgentId) {
        self.notify(agent, Notification::ForceNewTarget);
    }
}
