//! Queuing engine
//!
//! A bounded, priority-aware FIFO/LIFO buffer that hands items to a worker.
//! [`Queuer`] runs a synchronous worker inline on the caller's turn;
//! [`AsyncQueuer`] runs async workers on Tokio tasks under a concurrency cap.
//!
//! Both share the same [`QueuerConfig`], ordering rules and lazy expiration:
//! stale items are only evicted when something reads past them.

mod async_queuer;
mod config;
mod item;
mod options;
mod queuer;
mod signal;
mod state;
mod store;

pub use async_queuer::{AsyncQueuer, AsyncWorker, PendingResult};
pub use config::{QueuePosition, QueuerConfig};
pub use item::QueuedItem;
pub use options::{AsyncQueuerOptions, ItemCallback, PriorityFn, QueuerOptions, RunningCallback};
pub use queuer::Queuer;
pub use signal::{AbortController, AbortSignal};
pub use state::{AsyncQueuerState, QueuerState};
pub use store::{QueueStore, Taken};
