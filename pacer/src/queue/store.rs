//! Ordered storage for pending items
//!
//! The store is a double-ended buffer. Without priorities, items are placed at
//! the requested end and taken from the configured dequeue end. With
//! priorities, the buffer is kept sorted so that the lowest priority value sits
//! at the dequeue end; ties keep arrival order relative to the insertion end.
//!
//! A shared, immutable view of the items is built on demand and kept until the
//! next mutation, so repeated snapshots between mutations cost one allocation.

use std::cmp::Reverse;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::config::QueuePosition;
use super::item::QueuedItem;
use super::options::PriorityFn;

/// Result of taking the next live item
#[derive(Debug)]
pub struct Taken<T> {
    /// First non-expired item at the dequeue end
    pub item: Option<QueuedItem<T>>,
    /// Items evicted on the way because they outlived their TTL
    pub expired: Vec<QueuedItem<T>>,
}

/// Pending items in queue order (front to back)
#[derive(Debug)]
pub struct QueueStore<T> {
    items: VecDeque<QueuedItem<T>>,
    next_id: u64,
    /// Front-to-back view built by `shared`; dropped on every mutation
    view: Option<Arc<[QueuedItem<T>]>>,
}

impl<T> Default for QueueStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> QueueStore<T> {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
            next_id: 1,
            view: None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert a value and return its id
    ///
    /// `take_from` is the dequeue end, needed to decide which way priorities
    /// are sorted. Items without a priority rank as 0 against prioritized ones.
    pub fn insert(&mut self, value: T, priority: Option<i64>, position: QueuePosition, take_from: QueuePosition) -> u64 {
        self.view = None;
        let id = self.next_id;
        self.next_id += 1;
        let item = QueuedItem::new(id, value, priority);

        let Some(p) = priority else {
            debug!(id, %position, "QueueStore::insert: positional");
            match position {
                QueuePosition::Front => self.items.push_front(item),
                QueuePosition::Back => self.items.push_back(item),
            }
            return id;
        };

        let rank = |it: &QueuedItem<T>| it.priority.unwrap_or(0);
        // Lowest value belongs at the dequeue end. Inserting from the dequeue end
        // goes ahead of equal priorities; inserting from the far end goes behind them.
        let index = match (take_from, position) {
            (QueuePosition::Front, QueuePosition::Back) => self.items.partition_point(|it| rank(it) <= p),
            (QueuePosition::Front, QueuePosition::Front) => self.items.partition_point(|it| rank(it) < p),
            (QueuePosition::Back, QueuePosition::Back) => self.items.partition_point(|it| rank(it) >= p),
            (QueuePosition::Back, QueuePosition::Front) => self.items.partition_point(|it| rank(it) > p),
        };
        debug!(id, priority = p, index, "QueueStore::insert: by priority");
        self.items.insert(index, item);
        id
    }

    /// Remove the next live item from `from`, evicting expired ones on the way
    pub fn take(&mut self, from: QueuePosition, ttl: Option<Duration>) -> Taken<T> {
        self.view = None;
        let now = Instant::now();
        let mut expired = Vec::new();

        loop {
            let next = match from {
                QueuePosition::Front => self.items.pop_front(),
                QueuePosition::Back => self.items.pop_back(),
            };
            match next {
                Some(item) if ttl.is_some_and(|ttl| item.is_expired(ttl, now)) => {
                    debug!(id = item.id, "QueueStore::take: item expired");
                    expired.push(item);
                }
                item => return Taken { item, expired },
            }
        }
    }

    /// Remove every item in dequeue order, returning `(live, expired)`
    pub fn take_all(&mut self, from: QueuePosition, ttl: Option<Duration>) -> (Vec<QueuedItem<T>>, Vec<QueuedItem<T>>) {
        self.view = None;
        let now = Instant::now();
        let mut live = Vec::with_capacity(self.items.len());
        let mut expired = Vec::new();

        while let Some(item) = match from {
            QueuePosition::Front => self.items.pop_front(),
            QueuePosition::Back => self.items.pop_back(),
        } {
            if ttl.is_some_and(|ttl| item.is_expired(ttl, now)) {
                expired.push(item);
            } else {
                live.push(item);
            }
        }

        (live, expired)
    }

    /// Next item at `from` without removing it or checking expiry
    pub fn peek(&self, from: QueuePosition) -> Option<&QueuedItem<T>> {
        match from {
            QueuePosition::Front => self.items.front(),
            QueuePosition::Back => self.items.back(),
        }
    }

    /// Items front to back
    pub fn iter(&self) -> impl Iterator<Item = &QueuedItem<T>> {
        self.items.iter()
    }

    /// Drop every pending item and return them
    pub fn clear(&mut self) -> Vec<QueuedItem<T>> {
        self.view = None;
        self.items.drain(..).collect()
    }

    /// Recompute every item's priority with `get_priority`
    ///
    /// Without a function the items lose their priorities and keep their
    /// current positions.
    pub fn reprioritize(&mut self, get_priority: Option<&PriorityFn<T>>) {
        self.view = None;
        for item in self.items.iter_mut() {
            item.priority = get_priority.map(|f| f(&item.value));
        }
    }

    /// Stable re-sort so the lowest priority sits at the `take_from` end
    pub fn resort(&mut self, take_from: QueuePosition) {
        if !self.items.iter().any(|it| it.priority.is_some()) {
            return;
        }
        self.view = None;
        let items = self.items.make_contiguous();
        match take_from {
            QueuePosition::Front => items.sort_by_key(|it| it.priority.unwrap_or(0)),
            QueuePosition::Back => items.sort_by_key(|it| Reverse(it.priority.unwrap_or(0))),
        }
        debug!(len = items.len(), %take_from, "QueueStore::resort: reordered");
    }
}

impl<T: Clone> QueueStore<T> {
    /// Shared view of the pending items, front to back
    pub fn shared(&mut self) -> Arc<[QueuedItem<T>]> {
        if let Some(view) = &self.view {
            return Arc::clone(view);
        }
        let view: Arc<[QueuedItem<T>]> = self.items.iter().cloned().collect();
        self.view = Some(Arc::clone(&view));
        view
    }
}
