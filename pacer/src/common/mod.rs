//! Base types shared by every pacing primitive
//!
//! Each primitive (queuer, async queuer, rate limiter) carries the same
//! `enabled`/`key` options and exposes the same `status`/`execution_count`
//! state, so callers can treat them uniformly through [`Pacer`].

mod options;
mod state;
mod status;

pub use options::PacerOptions;
pub use state::{Pacer, PacerState};
pub use status::PacerStatus;
