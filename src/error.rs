use thiserror::Error;

/// Engine error types
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed or out-of-range input, rejected at the boundary
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not enough history/labels to compute or train; recoverable by the caller
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// No active model for the equipment type; callers fall back to the static rule
    #[error("No trained model for equipment type '{0}'")]
    ModelNotTrained(String),

    /// No qualified technician could be assigned; surfaced for escalation
    #[error("No available technician: {0}")]
    NoAvailableTechnician(String),

    /// Illegal incident status transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// Entity lookup failures
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage backend errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Retraining task was cancelled before activation
    #[error("Retraining cancelled: {0}")]
    Cancelled(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal computation errors, fatal to the single request
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            EngineError::Validation(_) => "VALIDATION_ERROR",
            EngineError::InsufficientData(_) => "INSUFFICIENT_DATA",
            EngineError::ModelNotTrained(_) => "MODEL_NOT_TRAINED",
            EngineError::NoAvailableTechnician(_) => "NO_AVAILABLE_TECHNICIAN",
            EngineError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::Storage(_) => "STORAGE_ERROR",
            EngineError::Serialization(_) => "SERIALIZATION_ERROR",
            EngineError::Configuration(_) => "CONFIGURATION_ERROR",
            EngineError::Cancelled(_) => "RETRAIN_CANCELLED",
            EngineError::Io(_) => "IO_ERROR",
            EngineError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller can recover by retrying with more data or a fallback path
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::InsufficientData(_)
                | EngineError::ModelNotTrained(_)
                | EngineError::NoAvailableTechnician(_)
        )
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for EngineError {
    fn from(err: validator::ValidationErrors) -> Self {
        EngineError::Validation(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            EngineError::Validation("test".to_string()).error_code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            EngineError::ModelNotTrained("pump".to_string()).error_code(),
            "MODEL_NOT_TRAINED"
        );
        assert_eq!(
            EngineError::NoAvailableTechnician("empty roster".to_string()).error_code(),
            "NO_AVAILABLE_TECHNICIAN"
        );
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(EngineError::InsufficientData("x".to_string()).is_recoverable());
        assert!(EngineError::ModelNotTrained("x".to_string()).is_recoverable());
        assert!(!EngineError::Internal("x".to_string()).is_recoverable());
        assert!(!EngineError::Validation("x".to_string()).is_recoverable());
    }

    #[test]
    fn test_display_includes_context() {
        let err = EngineError::ModelNotTrained("compressor".to_string());
        assert!(err.to_string().contains("compressor"));
    }
}
