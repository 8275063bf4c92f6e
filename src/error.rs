use crate::types::OperationKind;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarnessError>;

/// Context for a non-success status returned by the security engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFailure {
    /// Operation that was being executed, `None` during initialization
    pub kind: Option<OperationKind>,
    /// Identifier of the frame source fed to the engine
    pub source_id: String,
    /// Signed status code, never zero
    pub status: i32,
    /// Engine's symbolic name for `status`
    pub status_name: String,
}

impl EngineFailure {
    /// Failure reported by `initialize`, before any frame was fed
    pub fn initialization(status: i32, status_name: impl Into<String>) -> Self {
        Self {
            kind: None,
            source_id: "-".to_string(),
            status,
            status_name: status_name.into(),
        }
    }
}

impl fmt::Display for EngineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Some(kind) => write!(
                f,
                "{} on {} returned status {} ({})",
                kind, self.source_id, self.status, self.status_name
            ),
            None => write!(
                f,
                "engine initialization returned status {} ({})",
                self.status, self.status_name
            ),
        }
    }
}

/// Failure taxonomy shared by every harness component
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HarnessError {
    /// Frame file missing or unreadable
    #[error("frame source '{source_id}' unavailable: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    /// Malformed hexadecimal input
    #[error("invalid hex encoding: {reason}")]
    InvalidEncoding { reason: String },

    /// Operation kind recognized but not backed by the engine
    #[error("{kind} is not implemented")]
    NotImplemented { kind: OperationKind },

    /// Missing or out-of-range run configuration parameter
    #[error("invalid configuration for '{field}': {reason}")]
    ConfigurationInvalid { field: String, reason: String },

    #[error("engine failure: {0}")]
    EngineFailure(EngineFailure),
}

impl HarnessError {
    pub fn configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        HarnessError::ConfigurationInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether the sequence engine stops at this error
    pub fn aborts_sequence(&self) -> bool {
        matches!(self, HarnessError::EngineFailure(_))
    }
}

impl From<EngineFailure> for HarnessError {
    fn from(failure: EngineFailure) -> Self {
        HarnessError::EngineFailure(failure)
    }
}
