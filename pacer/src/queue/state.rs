//! Immutable state snapshots published by the queuers
//!
//! A snapshot is built when it is observed: by `state()`, by a live
//! subscriber, or by an `on_items_change` callback. A snapshot held by a
//! caller never changes underneath it.

use std::sync::Arc;

use crate::common::{PacerState, PacerStatus};

use super::item::QueuedItem;

/// Running totals kept by both queuers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct QueueCounters {
    pub add_item_count: u64,
    pub execution_count: u64,
    pub rejection_count: u64,
    pub expiration_count: u64,
    pub error_count: u64,
    pub success_count: u64,
    pub settle_count: u64,
}

/// Snapshot of a synchronous [`Queuer`](super::Queuer)
#[derive(Debug, Clone)]
pub struct QueuerState<T> {
    /// Pending items in queue order (front to back)
    pub items: Arc<[QueuedItem<T>]>,
    pub size: usize,
    pub is_empty: bool,
    pub is_full: bool,
    pub is_running: bool,
    /// A wait timer is armed for the next dispatch
    pub pending_tick: bool,
    pub status: PacerStatus,
    pub add_item_count: u64,
    pub execution_count: u64,
    pub rejection_count: u64,
    pub expiration_count: u64,
}

impl<T> QueuerState<T> {
    pub fn pacer_state(&self) -> PacerState {
        PacerState {
            execution_count: self.execution_count,
            status: self.status,
        }
    }

    /// Values of the pending items, front to back
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.items.iter().map(|it| &it.value)
    }
}

impl<T> Default for QueuerState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new().into(),
            size: 0,
            is_empty: true,
            is_full: false,
            is_running: false,
            pending_tick: false,
            status: PacerStatus::Idle,
            add_item_count: 0,
            execution_count: 0,
            rejection_count: 0,
            expiration_count: 0,
        }
    }
}

/// Snapshot of an [`AsyncQueuer`](super::AsyncQueuer)
#[derive(Debug, Clone)]
pub struct AsyncQueuerState<T, R> {
    /// Pending items in queue order (front to back)
    pub items: Arc<[QueuedItem<T>]>,
    /// Items whose worker invocation has not settled, in dispatch order
    pub active_items: Vec<QueuedItem<T>>,
    pub size: usize,
    pub is_empty: bool,
    pub is_full: bool,
    pub is_running: bool,
    pub pending_tick: bool,
    pub status: PacerStatus,
    /// Result of the most recent successful invocation
    pub last_result: Option<R>,
    pub add_item_count: u64,
    pub execution_count: u64,
    pub rejection_count: u64,
    pub expiration_count: u64,
    pub error_count: u64,
    pub success_count: u64,
    pub settle_count: u64,
}

impl<T, R> AsyncQueuerState<T, R> {
    pub fn pacer_state(&self) -> PacerState {
        PacerState {
            execution_count: self.execution_count,
            status: self.status,
        }
    }

    /// Nothing pending and nothing in flight
    pub fn is_idle(&self) -> bool {
        self.items.is_empty() && self.active_items.is_empty()
    }

    /// Values of the pending items, front to back
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.items.iter().map(|it| &it.value)
    }
}

impl<T, R> Default for AsyncQueuerState<T, R> {
    fn default() -> Self {
        Self {
            items: Vec::new().into(),
            active_items: Vec::new(),
            size: 0,
            is_empty: true,
            is_full: false,
            is_running: false,
            pending_tick: false,
            status: PacerStatus::Idle,
            last_result: None,
            add_item_count: 0,
            execution_count: 0,
            rejection_count: 0,
            expiration_count: 0,
            error_count: 0,
            success_count: 0,
            settle_count: 0,
        }
    }
}
