//! Pacer - client-side pacing primitives
//!
//! Regulates how often and in what order a caller-supplied function runs in
//! response to bursts of calls.
//!
//! # Modules
//!
//! - [`queue`] - bounded FIFO/LIFO/priority queues with sync and async workers
//! - [`rate_limit`] - fixed and sliding window rate limiting
//! - [`common`] - status, options and state shared by every primitive
//! - [`error`] - error taxonomy
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod common;
pub mod config;
pub mod error;
pub mod queue;
pub mod rate_limit;
pub mod simulate;

// Re-export commonly used types
pub use common::{Pacer, PacerOptions, PacerState, PacerStatus};
pub use config::{Config, SimulationConfig};
pub use error::{PacerError, PacerResult};
pub use queue::{
    AbortController, AbortSignal, AsyncQueuer, AsyncQueuerOptions, AsyncQueuerState, PendingResult, QueuePosition,
    QueuedItem, Queuer, QueuerConfig, QueuerOptions, QueuerState,
};
pub use rate_limit::{RateLimiter, RateLimiterConfig, RateLimiterOptions, RateLimiterState, WindowType};
