//! Error types for pacing primitives

use thiserror::Error;

/// Errors surfaced by pacing primitives
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacerError {
    #[error("Pacer {key} is disabled")]
    Disabled { key: String },

    #[error("Queue is full (max size {max_size})")]
    QueueFull { max_size: usize },

    #[error("Item was aborted before it settled")]
    Aborted,

    #[error("Worker failed: {0}")]
    WorkerFailure(String),

    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),
}

impl PacerError {
    /// Admission refused the item; the worker never ran
    pub fn is_rejection(&self) -> bool {
        matches!(self, PacerError::Disabled { .. } | PacerError::QueueFull { .. })
    }

    /// The worker ran and did not produce a result
    pub fn is_worker_error(&self) -> bool {
        matches!(self, PacerError::WorkerFailure(_) | PacerError::WorkerPanicked(_))
    }
}

/// Result alias for pacer operations
pub type PacerResult<T> = Result<T, PacerError>;
