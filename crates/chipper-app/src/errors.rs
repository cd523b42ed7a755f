use chipper_brain::BrainError;
use chipper_core::AgentId;
use chipper_core::errors::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("{0} has no controller")]
    NoController(AgentId),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Brain error: {0}")]
    Brain(#[from] BrainError),
}

pub type AppResult<T> = Result<T, AppError>;
