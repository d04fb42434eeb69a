// Error types for the breakpoint core
//
// Session failures keep "disconnected" distinguishable from everything else,
// since a disconnected target is not an error from the core's point of view.

use crate::types::BreakpointId;
use thiserror::Error;

pub type BreakpointResult<T> = Result<T, BreakpointError>;

#[derive(Debug, Error)]
pub enum BreakpointError {
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Invalid type name pattern: {0:?}")]
    InvalidPattern(String),

    #[error("Invalid breakpoint: {0}")]
    InvalidSpec(String),

    #[error("Unknown breakpoint {0}")]
    UnknownBreakpoint(BreakpointId),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failure reading or writing a persisted breakpoint attribute
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("attribute {key:?}: {message}")]
pub struct PersistenceError {
    pub key: String,
    pub message: String,
}

impl PersistenceError {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("VM disconnected")]
    Disconnected,

    #[error("{0}")]
    Failed(String),
}

impl SessionError {
    pub fn is_disconnected(&self) -> bool {
        matches!(self, SessionError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = BreakpointError::from(PersistenceError::new("enabled", "store is read-only"));
        assert_eq!(
            err.to_string(),
            "Persistence error: attribute \"enabled\": store is read-only"
        );
    }

    #[test]
    fn test_disconnected_is_distinguishable() {
        assert!(SessionError::Disconnected.is_disconnected());
        assert!(!SessionError::Failed("INVALID_CLASS".to_string()).is_disconnected());
    }
}
