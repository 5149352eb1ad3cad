//! Queue item with its bookkeeping metadata

use tokio::time::Instant;

/// A value held by the queue together with its enqueue metadata
#[derive(Debug, Clone)]
pub struct QueuedItem<T> {
    /// Monotonic id assigned at admission
    pub id: u64,
    pub value: T,
    /// When the item was admitted
    pub added_at: Instant,
    /// Priority from `get_priority`; lower runs first
    pub priority: Option<i64>,
}

impl<T> QueuedItem<T> {
    pub fn new(id: u64, value: T, priority: Option<i64>) -> Self {
        Self {
            id,
            value,
            added_at: Instant::now(),
            priority,
        }
    }

    /// Whether the item has outlived `ttl` as of `now`
    pub fn is_expired(&self, ttl: std::time::Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.added_at) > ttl
    }
}
