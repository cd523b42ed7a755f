use crate::world::AgentId;

/// Fire-and-forget report from the reactive loop to the task state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// The mining target is being broken, credit progress to the current task.
    MiningProgress,
    /// A raycast towards the mining target hit something else.
    LineOfSightFailure,
    /// Mining timed out, the current log should be replaced.
    ForceNewTarget,
}

/// A notification addressed to one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentEvent {
    pub agent: AgentId,
    pub notification: Notification,
}

impl AgentEvent {
    pub fn new(agent: AgentId, notification: Notification) -> Self {
        Self {
            agent,
            notification,
        }
    }
}
