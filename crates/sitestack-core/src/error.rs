//! Error types for SiteStack.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid logical id '{0}': must be 1-255 ASCII letters or digits")]
    InvalidLogicalId(String),

    #[error("duplicate stage: {0}")]
    DuplicateStage(String),

    #[error("artifact contract violated: {0}")]
    ArtifactContract(String),

    #[error("unknown reference: {0}")]
    UnknownReference(String),

    #[error("dependency cycle: {0}")]
    DependencyCycle(String),

    #[error("stack has {0} validation error(s)")]
    Validation(usize),

    #[error("state is locked by {0}")]
    StateLocked(String),

    #[error("state error: {0}")]
    State(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
