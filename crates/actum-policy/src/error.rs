use std::fmt;
use thiserror::Error;

/// Input rejected before detection. No audit event is ever created for
/// a request that fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("input text is empty")]
    EmptyInput,

    #[error("{what} is {actual} bytes, limit is {limit}")]
    InputTooLarge {
        what: &'static str,
        limit: usize,
        actual: usize,
    },

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("unsupported input type: {0}")]
    UnsupportedInputType(String),
}

/// Single error enum for all policy engine operations.
///
/// Detector and scorer failures are not errors: they degrade to "no signal".
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("no active policy pack")]
    NoActivePack,

    #[error("unknown policy version: {0}")]
    UnknownPolicyVersion(String),

    #[error("policy load error: {0}")]
    LoadError(String),

    #[error("deserialization error: {0}")]
    DeserializationError(String),

    #[error("invalid policy pack: {0}")]
    InvalidPack(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

/// Discriminator for PolicyError variants, used to tell input problems
/// apart from configuration faults at the service boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyErrorKind {
    Validation,
    NoActivePack,
    UnknownPolicyVersion,
    LoadError,
    DeserializationError,
    InvalidPack,
    InternalError,
}

impl PolicyError {
    pub fn kind(&self) -> PolicyErrorKind {
        match self {
            PolicyError::Validation(_) => PolicyErrorKind::Validation,
            PolicyError::NoActivePack => PolicyErrorKind::NoActivePack,
            PolicyError::UnknownPolicyVersion(_) => PolicyErrorKind::UnknownPolicyVersion,
            PolicyError::LoadError(_) => PolicyErrorKind::LoadError,
            PolicyError::DeserializationError(_) => PolicyErrorKind::DeserializationError,
            PolicyError::InvalidPack(_) => PolicyErrorKind::InvalidPack,
            PolicyError::InternalError(_) => PolicyErrorKind::InternalError,
        }
    }
}

impl fmt::Display for PolicyErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyErrorKind::Validation => write!(f, "ValidationError"),
            PolicyErrorKind::NoActivePack => write!(f, "NoActivePack"),
            PolicyErrorKind::UnknownPolicyVersion => write!(f, "UnknownPolicyVersion"),
            PolicyErrorKind::LoadError => write!(f, "LoadError"),
            PolicyErrorKind::DeserializationError => write!(f, "DeserializationError"),
            PolicyErrorKind::InvalidPack => write!(f, "InvalidPack"),
            PolicyErrorKind::InternalError => write!(f, "InternalError"),
        }
    }
}

pub type PolicyResult<T> = Result<T, PolicyError>;
