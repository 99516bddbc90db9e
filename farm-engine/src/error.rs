//! Error types for the farm engine

use thiserror::Error;

/// Main error type for farm engine operations
#[derive(Debug, Error, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum FarmError {
    #[error("Network error: {details}")]
    NetworkError { details: String },

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Timeout occurred: {operation} after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("No execution context host configured for {url}")]
    ContextUnavailable { url: String },

    #[error("Execution context {url} did not become ready: {reason}")]
    ContextFailed { url: String, reason: String },

    #[error("Dispatcher dropped the operation before it completed")]
    DispatcherClosed,

    #[error("Farm templates missing: {reason}")]
    MissingTemplates { reason: String },

    #[error("Command rejected: {reason}")]
    CommandRejected { reason: String },

    #[error("Session invalid: {reason}")]
    SessionInvalid { reason: String },

    #[error("Configuration error: {component} - {reason}")]
    ConfigurationError { component: String, reason: String },

    #[error("Serialization error: {error}")]
    SerializationError { error: String },
}

impl FarmError {
    pub fn network(details: impl Into<String>) -> Self {
        Self::NetworkError { details: details.into() }
    }

    pub fn configuration(component: &str, reason: impl Into<String>) -> Self {
        Self::ConfigurationError {
            component: component.to_string(),
            reason: reason.into(),
        }
    }

    pub fn missing_templates(reason: impl Into<String>) -> Self {
        Self::MissingTemplates { reason: reason.into() }
    }

    /// Check if the error is worth another attempt
    pub fn is_recoverable(&self) -> bool {
        match self {
            FarmError::NetworkError { .. } => true,
            FarmError::Timeout { .. } => true,
            FarmError::ContextFailed { .. } => true,
            FarmError::HttpStatus { status, .. } => *status >= 500 || *status == 429,

            FarmError::RetriesExhausted { .. } => false,
            FarmError::ContextUnavailable { .. } => false,
            FarmError::DispatcherClosed => false,
            FarmError::MissingTemplates { .. } => false,
            FarmError::CommandRejected { .. } => false,
            FarmError::SessionInvalid { .. } => false,
            FarmError::ConfigurationError { .. } => false,
            FarmError::SerializationError { .. } => false,
        }
    }

    /// Get error category for grouping in logs
    pub fn category(&self) -> ErrorCategory {
        match self {
            FarmError::NetworkError { .. }
            | FarmError::HttpStatus { .. }
            | FarmError::Timeout { .. }
            | FarmError::RetriesExhausted { .. }
            | FarmError::ContextUnavailable { .. }
            | FarmError::ContextFailed { .. }
            | FarmError::DispatcherClosed => ErrorCategory::Infrastructure,

            FarmError::ConfigurationError { .. } => ErrorCategory::Configuration,

            FarmError::SessionInvalid { .. } => ErrorCategory::Authentication,

            FarmError::MissingTemplates { .. }
            | FarmError::CommandRejected { .. }
            | FarmError::SerializationError { .. } => ErrorCategory::Runtime,
        }
    }
}

/// Error categories for grouping and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Infrastructure,
    Configuration,
    Authentication,
    Runtime,
}

impl From<serde_json::Error> for FarmError {
    fn from(error: serde_json::Error) -> Self {
        FarmError::SerializationError {
            error: error.to_string(),
        }
    }
}

impl From<toml::de::Error> for FarmError {
    fn from(error: toml::de::Error) -> Self {
        FarmError::ConfigurationError {
            component: "config file".to_string(),
            reason: error.to_string(),
        }
    }
}

impl From<std::io::Error> for FarmError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::TimedOut => FarmError::Timeout {
                operation: "I/O operation".to_string(),
                duration_ms: 0,
            },
            std::io::ErrorKind::NotFound => FarmError::ConfigurationError {
                component: "File system".to_string(),
                reason: format!("File not found: {}", error),
            },
            _ => FarmError::NetworkError {
                details: error.to_string(),
            },
        }
    }
}

/// Result type for farm engine operations
pub type FarmResult<T> = Result<T, FarmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_http_statuses() {
        let server = FarmError::HttpStatus { status: 503, url: "u".to_string() };
        let throttled = FarmError::HttpStatus { status: 429, url: "u".to_string() };
        let forbidden = FarmError::HttpStatus { status: 403, url: "u".to_string() };

        assert!(server.is_recoverable());
        assert!(throttled.is_recoverable());
        assert!(!forbidden.is_recoverable());
    }

    #[test]
    fn test_categories() {
        assert_eq!(FarmError::network("reset").category(), ErrorCategory::Infrastructure);
        assert_eq!(
            FarmError::configuration("dispatcher", "zero lanes").category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            FarmError::SessionInvalid { reason: "no token".to_string() }.category(),
            ErrorCategory::Authentication
        );
    }

    #[test]
    fn test_io_conversion() {
        let err: FarmError = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow").into();
        assert!(matches!(err, FarmError::Timeout { .. }));
        assert!(err.is_recoverable());

        let err: FarmError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, FarmError::ConfigurationError { .. }));
    }
}
