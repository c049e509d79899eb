use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActumError {
    #[error("storage error: {0}")]
    Storage(String),

    /// A uniqueness constraint (sequence or event id) was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("scorer error: {0}")]
    Scorer(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ActumResult<T> = Result<T, ActumError>;
