//! Queue configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::common::PacerOptions;
use crate::error::{PacerError, PacerResult};

/// End of the queue an item is added to or taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueuePosition {
    Front,
    #[default]
    Back,
}

impl std::fmt::Display for QueuePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Front => write!(f, "front"),
            Self::Back => write!(f, "back"),
        }
    }
}

impl std::str::FromStr for QueuePosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "front" => Ok(Self::Front),
            "back" => Ok(Self::Back),
            _ => Err(format!("Unknown queue position: {}", s)),
        }
    }
}

/// Serializable queue settings shared by [`Queuer`](super::Queuer) and
/// [`AsyncQueuer`](super::AsyncQueuer)
///
/// `concurrency` and `throw_on_error` only apply to the async variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct QueuerConfig {
    #[serde(flatten)]
    pub pacer: PacerOptions,

    /// Maximum pending items; `None` is unbounded
    pub max_size: Option<usize>,

    /// Maximum in-flight worker invocations
    pub concurrency: usize,

    /// Delay between dispatches in milliseconds
    pub wait_ms: u64,

    /// Start draining immediately after construction
    pub started: bool,

    /// Default insertion end
    pub add_items_to: QueuePosition,

    /// Dequeue end: `front` is FIFO, `back` is LIFO
    pub get_items_from: QueuePosition,

    /// Time-to-live for pending items in milliseconds
    pub expiration_ms: Option<u64>,

    /// Propagate worker failures to the caller's pending result
    pub throw_on_error: bool,
}

impl Default for QueuerConfig {
    fn default() -> Self {
        Self {
            pacer: PacerOptions::default(),
            max_size: None,
            concurrency: 1,
            wait_ms: 0,
            started: true,
            add_items_to: QueuePosition::Back,
            get_items_from: QueuePosition::Front,
            expiration_ms: None,
            throw_on_error: false,
        }
    }
}

impl QueuerConfig {
    /// Delay between dispatches
    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    /// Time-to-live for pending items, if configured
    pub fn expiration_duration(&self) -> Option<Duration> {
        self.expiration_ms.map(Duration::from_millis)
    }

    /// Reject settings the engine cannot honor
    pub fn validate(&self) -> PacerResult<()> {
        if self.max_size == Some(0) {
            return Err(PacerError::InvalidOptions("max-size must be at least 1".to_string()));
        }
        if self.concurrency == 0 {
            return Err(PacerError::InvalidOptions("concurrency must be at least 1".to_string()));
        }
        Ok(())
    }
}
