//! Rate limiting
//!
//! A sibling primitive to the queuers built on the same base options and
//! state. Calls over the limit are rejected rather than queued.

mod config;
mod core;

pub use config::{RateLimiterConfig, WindowType};
pub use core::{RateLimiter, RateLimiterOptions, RateLimiterState};
