//! Unified error types for Stagehand

use thiserror::Error;

/// Unified error type for all Stagehand operations
#[derive(Error, Debug)]
pub enum StagehandError {
    // Task errors
    #[error("Task execution failed: {0}")]
    TaskExecution(String),

    #[error("Elevation unavailable: {0}")]
    ElevationUnavailable(String),

    // Orchestration errors
    #[error("Orchestration invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl StagehandError {
    /// Whether this error is a programming error inside the orchestrator
    /// rather than a runtime condition of some task.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }
}

/// Result type alias using StagehandError
pub type Result<T> = std::result::Result<T, StagehandError>;
