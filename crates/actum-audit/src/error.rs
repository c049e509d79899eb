use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    /// The store rejected a pending event. The event is discarded and the
    /// chain tail is unchanged.
    #[error("audit write failed: {0}")]
    WriteFailure(String),

    #[error("tamper detected at sequence {sequence}: {reason}")]
    TamperDetected { sequence: u64, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("audit writer has shut down")]
    WriterClosed,

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid signing secret: {0}")]
    InvalidSecret(String),
}

impl From<actum_core::ActumError> for AuditError {
    fn from(e: actum_core::ActumError) -> Self {
        match e {
            actum_core::ActumError::Storage(m) => AuditError::Storage(m),
            actum_core::ActumError::Serialization(m) => AuditError::Serialization(m),
            other => AuditError::Storage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(e: serde_json::Error) -> Self {
        AuditError::Serialization(e.to_string())
    }
}

pub type AuditResult<T> = Result<T, AuditError>;
