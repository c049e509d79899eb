use axum::http::StatusCode;
use thiserror::Error;

use actum_audit::AuditError;
use actum_policy::{PolicyError, ValidationError};

/// Error type for the Actum service, aggregating errors from the policy
/// and audit crates.
///
/// Every variant maps to one HTTP status and one `kind` string; handlers
/// never pick a status themselves.
#[derive(Debug, Error)]
pub enum RootError {
    #[error("{0}")]
    Policy(#[from] PolicyError),

    #[error("{0}")]
    Audit(#[from] AuditError),

    #[error("core error: {0}")]
    Core(#[from] actum_core::ActumError),

    /// Malformed request body or query string.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Request body exceeded the transport limit before validation ran.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<ValidationError> for RootError {
    fn from(e: ValidationError) -> Self {
        RootError::Policy(PolicyError::Validation(e))
    }
}

impl From<serde_json::Error> for RootError {
    fn from(e: serde_json::Error) -> Self {
        RootError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for RootError {
    fn from(e: toml::de::Error) -> Self {
        RootError::Config(format!("TOML parse error: {}", e))
    }
}

impl RootError {
    pub fn status(&self) -> StatusCode {
        match self {
            RootError::Policy(PolicyError::Validation(v)) => match v {
                ValidationError::InputTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                ValidationError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                ValidationError::EmptyInput | ValidationError::UnsupportedInputType(_) => {
                    StatusCode::BAD_REQUEST
                }
            },
            RootError::Policy(PolicyError::NoActivePack)
            | RootError::Policy(PolicyError::UnknownPolicyVersion(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            RootError::Policy(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RootError::Audit(AuditError::TamperDetected { .. }) => StatusCode::CONFLICT,
            RootError::Audit(AuditError::NotFound(_)) => StatusCode::NOT_FOUND,
            RootError::Audit(AuditError::InvalidRequest(_)) => StatusCode::BAD_REQUEST,
            RootError::Audit(AuditError::WriterClosed) => StatusCode::SERVICE_UNAVAILABLE,
            RootError::Audit(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RootError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RootError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            RootError::Core(_)
            | RootError::Internal(_)
            | RootError::Config(_)
            | RootError::Io(_)
            | RootError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Category reported to clients alongside the message.
    pub fn kind(&self) -> String {
        match self {
            RootError::Policy(e) => e.kind().to_string(),
            RootError::Audit(e) => match e {
                AuditError::WriteFailure(_) => "WriteFailure",
                AuditError::TamperDetected { .. } => "TamperDetected",
                AuditError::NotFound(_) => "NotFound",
                AuditError::InvalidRequest(_) => "InvalidRequest",
                AuditError::WriterClosed => "WriterClosed",
                AuditError::Storage(_)
                | AuditError::Serialization(_)
                | AuditError::InvalidSecret(_) => "StorageError",
            }
            .to_string(),
            RootError::BadRequest(_) => "InvalidRequest".to_string(),
            RootError::PayloadTooLarge(_) => "ValidationError".to_string(),
            RootError::Config(_) => "ConfigError".to_string(),
            RootError::Core(_)
            | RootError::Internal(_)
            | RootError::Io(_)
            | RootError::Serialization(_) => "InternalError".to_string(),
        }
    }
}

pub type RootResult<T> = Result<T, RootError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_error_display() {
        let err = RootError::Internal("something broke".into());
        assert_eq!(err.to_string(), "internal error: something broke");
    }

    #[test]
    fn test_root_error_config() {
        let err = RootError::Config("missing hmac_secret".into());
        assert_eq!(err.to_string(), "configuration error: missing hmac_secret");
        assert_eq!(err.kind(), "ConfigError");
    }

    #[test]
    fn test_validation_statuses() {
        let empty: RootError = ValidationError::EmptyInput.into();
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
        assert_eq!(empty.kind(), "ValidationError");

        let large: RootError = ValidationError::InputTooLarge {
            what: "text",
            limit: 10,
            actual: 11,
        }
        .into();
        assert_eq!(large.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let media: RootError = ValidationError::UnsupportedMediaType("gif".into()).into();
        assert_eq!(media.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let input_type: RootError =
            ValidationError::UnsupportedInputType("audio".into()).into();
        assert_eq!(input_type.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_policy_faults_are_unavailable() {
        let err: RootError = PolicyError::NoActivePack.into();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.kind(), "NoActivePack");
        assert_eq!(err.to_string(), "no active policy pack");

        let err: RootError = PolicyError::UnknownPolicyVersion("v0".into()).into();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_audit_statuses() {
        let err: RootError = AuditError::TamperDetected {
            sequence: 3,
            reason: "signature mismatch".into(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.kind(), "TamperDetected");

        let err: RootError = AuditError::WriteFailure("disk full".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.kind(), "WriteFailure");

        let err: RootError = AuditError::NotFound("audit event evt-x".into()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err: RootError = AuditError::InvalidRequest("limit".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_root_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: RootError = io_err.into();
        assert!(err.to_string().contains("file missing"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_root_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: RootError = json_err.into();
        assert!(matches!(err, RootError::Serialization(_)));
    }

    #[test]
    fn test_root_error_from_toml() {
        let toml_err = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let err: RootError = toml_err.into();
        assert!(matches!(err, RootError::Config(_)));
    }
}
