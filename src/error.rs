//! Error types for the automation engine
//!
//! One taxonomy for the whole engine: evaluation problems are non-fatal and
//! surface as "condition not met", everything else maps to a typed variant the
//! API layer can translate into a status code.

use thiserror::Error;

/// Main error type for automation engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Condition evaluation failed: {message}")]
    ConditionEvaluation { message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    #[error("Command {command_id} timed out after {timeout_ms}ms")]
    CommandTimeout { command_id: String, timeout_ms: u64 },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Program {program_id} is already running")]
    AlreadyRunning { program_id: String },

    #[error("Command {command_id} exceeded max retries ({max_retries})")]
    MaxRetriesExceeded {
        command_id: String,
        max_retries: u32,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl EngineError {
    /// Create condition evaluation error
    pub fn condition_evaluation<S: Into<String>>(message: S) -> Self {
        Self::ConditionEvaluation {
            message: message.into(),
        }
    }

    /// Create validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create already-running error
    pub fn already_running<S: Into<String>>(program_id: S) -> Self {
        Self::AlreadyRunning {
            program_id: program_id.into(),
        }
    }

    /// Create not-found error
    pub fn not_found<S: Into<String>>(kind: &'static str, id: S) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Create internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error leaves the engine in a healthy state.
    ///
    /// Every variant here is recoverable by design: the engine never
    /// terminates the process on a single rule/program/command failure.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, EngineError::Config(_))
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
