use chipper_core::AgentId;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum BrainError {
    /// The agent has no task state, it was never started or was stopped.
    #[error("{0} is not active")]
    UnknownAgent(AgentId),

    /// The authoritative loop dropped its end of the notification queue.
    #[error("Notification queue disconnected")]
    Disconnected,
}

pub type BrainResult<T> = Result<T, BrainError>;
