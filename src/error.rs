//! Custom error types for autofire.
//!
//! This module provides structured error types using `thiserror` for better
//! error handling and more informative error messages.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::engine::EngineState;

/// Main error type for autofire operations.
#[derive(Error, Debug)]
pub enum AutofireError {
    /// The requested lifecycle operation is not valid in the current state.
    #[error("cannot {operation} while engine is {state}")]
    InvalidState {
        operation: String,
        state: EngineState,
    },

    /// `start()` was called without any enabled actions configured.
    #[error("no enabled actions configured")]
    NoActionsConfigured,

    /// The action sender reported itself unavailable.
    #[error("action sender is not available")]
    SenderUnavailable,

    /// An action definition failed validation.
    #[error("invalid action '{id}': {reason}")]
    InvalidAction { id: String, reason: String },

    /// The worker task did not confirm startup within the bounded wait.
    #[error("worker did not confirm startup within {waited:?}")]
    WorkerUnresponsive { waited: Duration },

    /// The worker task did not exit within the shutdown timeout.
    #[error("worker did not exit within {waited:?}")]
    ShutdownTimeout { waited: Duration },

    /// Configuration validation error.
    #[error("configuration error: {0}")]
    ConfigValidation(String),

    /// Error reading or parsing a configuration file.
    #[error("failed to load config from '{path}': {reason}")]
    ConfigLoad { path: String, reason: String },

    /// Error writing a configuration file.
    #[error("failed to save config to '{path}': {reason}")]
    ConfigSave { path: String, reason: String },

    /// Error parsing a duration string.
    #[error("invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for autofire operations.
pub type Result<T> = std::result::Result<T, AutofireError>;

impl AutofireError {
    /// Create a new InvalidState error.
    pub fn invalid_state(operation: impl Into<String>, state: EngineState) -> Self {
        Self::InvalidState {
            operation: operation.into(),
            state,
        }
    }

    /// Create a new InvalidAction error.
    pub fn invalid_action(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAction {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create a new WorkerUnresponsive error.
    pub fn worker_unresponsive(waited: Duration) -> Self {
        Self::WorkerUnresponsive { waited }
    }

    /// Create a new ShutdownTimeout error.
    pub fn shutdown_timeout(waited: Duration) -> Self {
        Self::ShutdownTimeout { waited }
    }

    /// Create a new ConfigValidation error.
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation(message.into())
    }

    /// Create a new ConfigLoad error.
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new ConfigSave error.
    pub fn config_save(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigSave {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new InvalidDuration error.
    pub fn invalid_duration(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDuration {
            value: value.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AutofireError::invalid_state("start", EngineState::Running);
        assert_eq!(err.to_string(), "cannot start while engine is running");

        let err = AutofireError::invalid_action("loot", "interval out of range");
        assert_eq!(
            err.to_string(),
            "invalid action 'loot': interval out of range"
        );

        let err = AutofireError::config_validation("actions cannot be empty");
        assert_eq!(
            err.to_string(),
            "configuration error: actions cannot be empty"
        );

        let err = AutofireError::shutdown_timeout(Duration::from_secs(5));
        assert!(err.to_string().contains("5s"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: AutofireError = io_err.into();
        assert!(matches!(err, AutofireError::Io(_)));
    }
}
