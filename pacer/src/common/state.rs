//! Base state and the trait every primitive implements

use serde::{Deserialize, Serialize};

use super::status::PacerStatus;

/// State fields shared by all primitives
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacerState {
    /// Number of times the wrapped function ran
    pub execution_count: u64,

    /// Current lifecycle status
    pub status: PacerStatus,
}

/// Uniform view over any pacing primitive
pub trait Pacer {
    /// Identifier from the options, if any
    fn key(&self) -> Option<String>;

    /// Whether the primitive currently accepts work
    fn is_enabled(&self) -> bool;

    /// Base state snapshot
    fn pacer_state(&self) -> PacerState;

    fn status(&self) -> PacerStatus {
        self.pacer_state().status
    }

    fn execution_count(&self) -> u64 {
        self.pacer_state().execution_count
    }
}
