//! Error types for the automation engine

use thiserror::Error;

/// Errors that can occur in the automation engine
#[derive(Error, Debug)]
pub enum AutomationError {
    /// Rule not found
    #[error("Rule not found: {0}")]
    NotFound(String),

    /// A rule with the same id is already registered
    #[error("Rule already exists: {0}")]
    DuplicateRule(String),

    /// Invalid trigger configuration
    #[error("Invalid trigger: {0}")]
    InvalidTrigger(String),

    /// Invalid condition configuration
    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    /// Invalid action configuration
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Invalid time format
    #[error("Invalid time format: {0}")]
    InvalidTimeFormat(String),

    /// A side-effect collaborator reported a failure
    #[error("Action handler failed: {0}")]
    HandlerFailed(String),

    /// IO error (persistence)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
