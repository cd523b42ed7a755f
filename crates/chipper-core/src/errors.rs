use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CoreError {
    /// A configuration value is out of its meaningful range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
