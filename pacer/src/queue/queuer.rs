//! Synchronous queuer
//!
//! Items are processed on the caller's turn: `add_item`, `start`, `flush` and
//! `tick` run the worker inline. Only one caller drains at a time; items added
//! by other threads meanwhile are picked up by the drainer. With a non-zero
//! `wait`, dispatches are at least `wait` apart. A Tokio timer (when a runtime
//! is available) wakes the queue when the wait is over; without a runtime the
//! caller drives it by calling [`Queuer::tick`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::common::{Pacer, PacerState, PacerStatus};
use crate::error::{PacerError, PacerResult};

use super::config::QueuePosition;
use super::item::QueuedItem;
use super::options::{QueuerOptions, same_priority_fn};
use super::state::{QueueCounters, QueuerState};
use super::store::{QueueStore, Taken};

type WorkerFn<T> = Box<dyn Fn(T) + Send + Sync>;

/// State guarded by the queuer's lock
struct Inner<T> {
    options: QueuerOptions<T>,
    store: QueueStore<T>,
    running: bool,
    counters: QueueCounters,
    /// A caller is running the drain loop
    draining: bool,
    /// When the paced drain loop last took an item
    last_dispatch: Option<Instant>,
    /// Armed wake-up timer and its generation
    timer: Option<(u64, JoinHandle<()>)>,
    timer_gen: u64,
}

impl<T: Clone> Inner<T> {
    fn snapshot(&mut self) -> QueuerState<T> {
        let size = self.store.len();
        QueuerState {
            items: self.store.shared(),
            size,
            is_empty: size == 0,
            is_full: self.options.config.max_size.is_some_and(|max| size >= max),
            is_running: self.running,
            pending_tick: self.timer.is_some(),
            status: self.status(),
            add_item_count: self.counters.add_item_count,
            execution_count: self.counters.execution_count,
            rejection_count: self.counters.rejection_count,
            expiration_count: self.counters.expiration_count,
        }
    }
}

impl<T> Inner<T> {
    fn status(&self) -> PacerStatus {
        PacerStatus::from_flags(self.options.config.pacer.enabled, self.running)
    }

    fn cancel_timer(&mut self) {
        if let Some((_, handle)) = self.timer.take() {
            handle.abort();
        }
    }
}

/// Releases the drain flag when a worker panics mid-drain
struct DrainGuard<'a, T>(&'a Shared<T>);

impl<T> Drop for DrainGuard<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.inner.lock().draining = false;
        }
    }
}

/// Callback work collected under the lock and fired after it is released
struct Notices<T> {
    callbacks: QueuerOptions<T>,
    rejected: Option<T>,
    expired: Vec<QueuedItem<T>>,
    items_changed: Option<Arc<QueuerState<T>>>,
    running_changed: Option<bool>,
}

impl<T> Notices<T> {
    fn new(callbacks: QueuerOptions<T>) -> Self {
        Self {
            callbacks,
            rejected: None,
            expired: Vec::new(),
            items_changed: None,
            running_changed: None,
        }
    }

    fn fire(&self) {
        if let (Some(item), Some(cb)) = (&self.rejected, &self.callbacks.on_reject) {
            cb(item);
        }
        if let Some(cb) = &self.callbacks.on_expire {
            for item in &self.expired {
                cb(&item.value);
            }
        }
        if let (Some(state), Some(cb)) = (&self.items_changed, &self.callbacks.on_items_change) {
            cb(state);
        }
        if let (Some(running), Some(cb)) = (self.running_changed, &self.callbacks.on_is_running_change) {
            cb(running);
        }
    }
}

struct Shared<T> {
    worker: WorkerFn<T>,
    inner: Mutex<Inner<T>>,
    state_tx: watch::Sender<Arc<QueuerState<T>>>,
}

/// Bounded FIFO/LIFO queue that runs a synchronous worker per item
///
/// Cloning yields another handle to the same queue.
pub struct Queuer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Queuer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Queuer<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a queuer around `worker`
    pub fn new(worker: impl Fn(T) + Send + Sync + 'static, options: QueuerOptions<T>) -> PacerResult<Self> {
        debug!(config = ?options.config, "Queuer::new: called");
        options.config.validate()?;

        let running = options.config.started && options.config.pacer.enabled;
        let mut inner = Inner {
            options,
            store: QueueStore::new(),
            running,
            counters: QueueCounters::default(),
            draining: false,
            last_dispatch: None,
            timer: None,
            timer_gen: 0,
        };
        let (state_tx, _) = watch::channel(Arc::new(inner.snapshot()));

        Ok(Self {
            shared: Arc::new(Shared {
                worker: Box::new(worker),
                inner: Mutex::new(inner),
                state_tx,
            }),
        })
    }

    /// Build and send a snapshot if anyone is watching
    fn publish(&self, inner: &mut Inner<T>) -> Option<Arc<QueuerState<T>>> {
        let watched = self.shared.state_tx.receiver_count() > 0;
        if !watched && inner.options.on_items_change.is_none() {
            return None;
        }
        let snapshot = Arc::new(inner.snapshot());
        if watched {
            self.shared.state_tx.send_replace(Arc::clone(&snapshot));
        }
        Some(snapshot)
    }

    /// Add an item at the default position
    ///
    /// Returns `Ok(false)` when the queue is full.
    pub fn add_item(&self, item: T) -> PacerResult<bool> {
        self.enqueue(item, None, true)
    }

    /// Add an item at `position` (or the configured default)
    pub fn enqueue(&self, item: T, position: Option<QueuePosition>, notify: bool) -> PacerResult<bool> {
        debug!(?position, notify, "Queuer::enqueue: called");
        let mut inner = self.shared.inner.lock();
        let mut notices = Notices::new(inner.options.clone());
        let config = notices.callbacks.config.clone();

        if !config.pacer.enabled {
            debug!("Queuer::enqueue: disabled, refusing");
            return Err(PacerError::Disabled {
                key: config.pacer.key_or_default().to_string(),
            });
        }

        if let Some(max_size) = config.max_size
            && inner.store.len() >= max_size
        {
            warn!(key = config.pacer.key_or_default(), max_size, "Queue full, rejecting item");
            inner.counters.rejection_count += 1;
            self.publish(&mut inner);
            drop(inner);
            notices.rejected = Some(item);
            notices.fire();
            return Ok(false);
        }

        let priority = notices.callbacks.get_priority.as_ref().map(|f| f(&item));
        let position = position.unwrap_or(config.add_items_to);
        let id = inner.store.insert(item, priority, position, config.get_items_from);
        inner.counters.add_item_count += 1;
        debug!(id, ?priority, %position, size = inner.store.len(), "Queuer::enqueue: item added");

        let snapshot = self.publish(&mut inner);
        drop(inner);
        if notify {
            notices.items_changed = snapshot;
        }
        notices.fire();

        self.tick();
        Ok(true)
    }

    /// Dispatch items while running, keeping dispatches at least `wait` apart
    ///
    /// Returns at once if another caller is already draining.
    pub fn tick(&self) {
        debug!("Queuer::tick: called");
        {
            let mut inner = self.shared.inner.lock();
            if inner.draining {
                debug!("Queuer::tick: already draining");
                return;
            }
            inner.draining = true;
        }

        let _guard = DrainGuard(&*self.shared);
        while let Some((value, callbacks)) = self.take_for_dispatch() {
            self.run_worker(value, &callbacks);
        }
    }

    /// Take the next item for the drain loop and reserve its pacing slot
    ///
    /// Ends the drain when stopped, waiting out `wait`, or out of items.
    fn take_for_dispatch(&self) -> Option<(T, QueuerOptions<T>)> {
        let mut inner = self.shared.inner.lock();
        if !inner.running || inner.store.is_empty() {
            inner.draining = false;
            return None;
        }

        let now = Instant::now();
        let wait = inner.options.config.wait();
        if let Some(ready_at) = inner.last_dispatch.map(|last| last + wait)
            && now < ready_at
        {
            debug!(remaining = ?(ready_at - now), "Queuer::take_for_dispatch: waiting");
            if inner.timer.is_none() {
                self.arm_timer(&mut inner, ready_at - now);
                self.publish(&mut inner);
            }
            inner.draining = false;
            return None;
        }

        let taken = self.take_locked(&mut inner, None, true);
        if taken.item.is_none() {
            inner.draining = false;
        } else {
            inner.last_dispatch = Some(now);
            if !wait.is_zero() {
                inner.cancel_timer();
                self.arm_timer(&mut inner, wait);
            }
        }
        self.finish_take(inner, taken)
    }

    fn arm_timer(&self, inner: &mut Inner<T>, delay: Duration) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                inner.timer_gen += 1;
                let generation = inner.timer_gen;
                let queuer = self.clone();
                let task = handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    queuer.on_timer(generation);
                });
                debug!(?delay, generation, "Queuer::arm_timer: armed");
                inner.timer = Some((generation, task));
            }
            Err(_) => {
                warn!(?delay, "No Tokio runtime for wait timer; call tick() once the wait is over");
            }
        }
    }

    fn on_timer(&self, generation: u64) {
        debug!(generation, "Queuer::on_timer: called");
        {
            let mut inner = self.shared.inner.lock();
            if !inner.timer.as_ref().is_some_and(|(current, _)| *current == generation) {
                debug!(generation, "Queuer::on_timer: stale timer");
                return;
            }
            inner.timer = None;
            self.publish(&mut inner);
        }
        self.tick();
    }

    fn run_worker(&self, value: T, callbacks: &QueuerOptions<T>) {
        (self.shared.worker)(value.clone());
        if let Some(cb) = &callbacks.on_execute {
            cb(&value);
        }
    }

    /// Remove the next live item and run the worker on it now
    ///
    /// Ignores `wait` and the running flag. Returns false when no live item is
    /// left.
    pub fn execute(&self, position: Option<QueuePosition>) -> bool {
        debug!(?position, "Queuer::execute: called");
        let Some((value, callbacks)) = self.take_next(position, true) else {
            return false;
        };
        self.run_worker(value, &callbacks);
        true
    }

    /// Remove the next live item without running the worker
    pub fn get_next_item(&self, position: Option<QueuePosition>) -> Option<T> {
        debug!(?position, "Queuer::get_next_item: called");
        self.take_next(position, false).map(|(value, _)| value)
    }

    fn take_next(&self, position: Option<QueuePosition>, count_execution: bool) -> Option<(T, QueuerOptions<T>)> {
        let mut inner = self.shared.inner.lock();
        let taken = self.take_locked(&mut inner, position, count_execution);
        self.finish_take(inner, taken)
    }

    fn take_locked(&self, inner: &mut Inner<T>, position: Option<QueuePosition>, count_execution: bool) -> Taken<T> {
        let from = position.unwrap_or(inner.options.config.get_items_from);
        let ttl = inner.options.config.expiration_duration();
        let taken = inner.store.take(from, ttl);

        if !taken.expired.is_empty() {
            warn!(count = taken.expired.len(), "Evicted expired items");
            inner.counters.expiration_count += taken.expired.len() as u64;
        }
        if taken.item.is_some() && count_execution {
            inner.counters.execution_count += 1;
        }
        taken
    }

    /// Publish the result of a take, release the lock and fire callbacks
    fn finish_take(&self, mut inner: MutexGuard<'_, Inner<T>>, taken: Taken<T>) -> Option<(T, QueuerOptions<T>)> {
        let changed = taken.item.is_some() || !taken.expired.is_empty();
        let snapshot = if changed { self.publish(&mut inner) } else { None };
        let mut notices = Notices::new(inner.options.clone());
        drop(inner);

        notices.expired = taken.expired;
        notices.items_changed = snapshot;
        notices.fire();

        taken.item.map(|item| (item.value, notices.callbacks))
    }

    /// Run up to `count` items immediately (all when `None`), ignoring `wait`
    pub fn flush(&self, count: Option<usize>, position: Option<QueuePosition>) -> usize {
        debug!(?count, ?position, "Queuer::flush: called");
        let limit = {
            let mut inner = self.shared.inner.lock();
            inner.cancel_timer();
            self.publish(&mut inner);
            count.unwrap_or(inner.store.len())
        };

        let mut executed = 0;
        while executed < limit && self.execute(position) {
            executed += 1;
        }
        debug!(executed, "Queuer::flush: done");

        self.tick();
        executed
    }

    /// Hand every pending item to `batch` in dequeue order as one call
    pub fn flush_as_batch(&self, batch: impl FnOnce(Vec<T>)) -> usize {
        debug!("Queuer::flush_as_batch: called");
        let mut inner = self.shared.inner.lock();
        let mut notices = Notices::new(inner.options.clone());
        inner.cancel_timer();

        let from = inner.options.config.get_items_from;
        let ttl = inner.options.config.expiration_duration();
        let (live, expired) = inner.store.take_all(from, ttl);
        inner.counters.expiration_count += expired.len() as u64;
        inner.counters.execution_count += live.len() as u64;
        let snapshot = self.publish(&mut inner);
        drop(inner);

        let count = live.len();
        notices.expired = expired;
        notices.items_changed = snapshot;
        notices.fire();

        if count > 0 {
            batch(live.into_iter().map(|item| item.value).collect());
        }
        count
    }

    /// Begin draining the queue
    pub fn start(&self) {
        debug!("Queuer::start: called");
        {
            let mut inner = self.shared.inner.lock();
            if !inner.options.config.pacer.enabled {
                warn!(key = inner.options.config.pacer.key_or_default(), "Cannot start a disabled queuer");
                return;
            }
            if inner.running {
                return;
            }
            inner.running = true;
            info!(key = inner.options.config.pacer.key_or_default(), "Queuer started");
            self.publish(&mut inner);
            let mut notices = Notices::new(inner.options.clone());
            drop(inner);
            notices.running_changed = Some(true);
            notices.fire();
        }
        self.tick();
    }

    /// Stop draining; pending items stay queued
    pub fn stop(&self) {
        debug!("Queuer::stop: called");
        let mut inner = self.shared.inner.lock();
        if !inner.running {
            return;
        }
        inner.running = false;
        inner.cancel_timer();
        info!(key = inner.options.config.pacer.key_or_default(), "Queuer stopped");
        self.publish(&mut inner);
        let mut notices = Notices::new(inner.options.clone());
        drop(inner);
        notices.running_changed = Some(false);
        notices.fire();
    }

    /// Drop every pending item; counters are kept
    pub fn clear(&self) {
        debug!("Queuer::clear: called");
        let mut inner = self.shared.inner.lock();
        inner.store.clear();
        inner.cancel_timer();
        let snapshot = self.publish(&mut inner);
        let mut notices = Notices::new(inner.options.clone());
        drop(inner);
        notices.items_changed = snapshot;
        notices.fire();
    }

    /// Drop every pending item and zero the counters
    pub fn reset(&self) {
        debug!("Queuer::reset: called");
        let mut inner = self.shared.inner.lock();
        inner.store.clear();
        inner.cancel_timer();
        inner.counters = QueueCounters::default();
        inner.last_dispatch = None;
        let snapshot = self.publish(&mut inner);
        let mut notices = Notices::new(inner.options.clone());
        drop(inner);
        notices.items_changed = snapshot;
        notices.fire();
    }

    /// Atomically replace options; fields `update` leaves alone keep their values
    ///
    /// Disabling stops the queuer. Re-enabling leaves it idle until `start`.
    /// Changing `get_items_from` or `get_priority` re-sorts the pending items.
    pub fn set_options(&self, update: impl FnOnce(&mut QueuerOptions<T>)) -> PacerResult<()> {
        debug!("Queuer::set_options: called");
        let mut inner = self.shared.inner.lock();
        let mut next = inner.options.clone();
        update(&mut next);
        next.config.validate()?;

        let priority_changed = !same_priority_fn(&inner.options.get_priority, &next.get_priority);
        let take_end_changed = inner.options.config.get_items_from != next.config.get_items_from;
        let get_priority = next.get_priority.clone();
        let take_from = next.config.get_items_from;

        let was_running = inner.running;
        inner.options = next;
        if priority_changed {
            inner.store.reprioritize(get_priority.as_ref());
        }
        if priority_changed || take_end_changed {
            debug!(priority_changed, %take_from, "Queuer::set_options: re-sorting pending items");
            inner.store.resort(take_from);
        }
        if !inner.options.config.pacer.enabled && inner.running {
            info!(key = inner.options.config.pacer.key_or_default(), "Queuer disabled, stopping");
            inner.running = false;
            inner.cancel_timer();
        }
        let running = inner.running;
        self.publish(&mut inner);

        let mut notices = Notices::new(inner.options.clone());
        drop(inner);
        if was_running && !running {
            notices.running_changed = Some(false);
        }
        notices.fire();

        if running {
            self.tick();
        }
        Ok(())
    }

    /// Current options
    pub fn options(&self) -> QueuerOptions<T> {
        self.shared.inner.lock().options.clone()
    }

    /// Current state snapshot
    pub fn state(&self) -> Arc<QueuerState<T>> {
        Arc::new(self.shared.inner.lock().snapshot())
    }

    /// Receive every new state snapshot, starting from the current one
    pub fn subscribe(&self) -> watch::Receiver<Arc<QueuerState<T>>> {
        let mut inner = self.shared.inner.lock();
        self.shared.state_tx.send_replace(Arc::new(inner.snapshot()));
        self.shared.state_tx.subscribe()
    }

    /// Pending values in queue order
    pub fn peek_all_items(&self) -> Vec<T> {
        self.shared.inner.lock().store.iter().map(|it| it.value.clone()).collect()
    }

    /// Next value that would be dequeued; expiry is not checked
    pub fn peek_next_item(&self, position: Option<QueuePosition>) -> Option<T> {
        let inner = self.shared.inner.lock();
        let from = position.unwrap_or(inner.options.config.get_items_from);
        inner.store.peek(from).map(|it| it.value.clone())
    }

    pub fn size(&self) -> usize {
        self.shared.inner.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.inner.lock().store.is_empty()
    }

    pub fn is_full(&self) -> bool {
        let inner = self.shared.inner.lock();
        inner.options.config.max_size.is_some_and(|max| inner.store.len() >= max)
    }

    pub fn is_running(&self) -> bool {
        self.shared.inner.lock().running
    }

    /// Nothing pending and no caller inside the drain loop
    pub fn is_idle(&self) -> bool {
        let inner = self.shared.inner.lock();
        inner.store.is_empty() && !inner.draining
    }
}

impl<T> Pacer for Queuer<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn key(&self) -> Option<String> {
        self.shared.inner.lock().options.config.pacer.key.clone()
    }

    fn is_enabled(&self) -> bool {
        self.shared.inner.lock().options.config.pacer.enabled
    }

    fn pacer_state(&self) -> PacerState {
        let inner = self.shared.inner.lock();
        PacerState {
            execution_count: inner.counters.execution_count,
            status: inner.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueuerConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn recording(config: QueuerConfig) -> (Queuer<u32>, Arc<Mutex<Vec<u32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let queuer = Queuer::new(move |item| sink.lock().push(item), QueuerOptions::new(config)).unwrap();
        (queuer, seen)
    }

    fn stopped() -> QueuerConfig {
        QueuerConfig {
            started: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_started_queuer_runs_immediately() {
        let (queuer, seen) = recording(QueuerConfig::default());
        assert!(queuer.add_item(1).unwrap());
        assert!(queuer.add_item(2).unwrap());

        assert_eq!(*seen.lock(), vec![1, 2]);
        let state = queuer.state();
        assert_eq!(state.execution_count, 2);
        assert_eq!(state.add_item_count, 2);
        assert!(state.is_empty);
        assert_eq!(state.status, PacerStatus::Running);
    }

    #[test]
    fn test_size_counts_pending_items() {
        let (queuer, seen) = recording(stopped());
        for i in 0..5 {
            queuer.add_item(i).unwrap();
        }
        assert_eq!(queuer.size(), 5);
        assert_eq!(queuer.state().size, 5);
        assert_eq!(queuer.state().items.len(), 5);
        assert!(seen.lock().is_empty());
        assert_eq!(queuer.state().status, PacerStatus::Idle);
    }

    #[test]
    fn test_rejects_newest_when_full() {
        let rejected = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&rejected);
        let options = QueuerOptions::new(QueuerConfig {
            max_size: Some(2),
            started: false,
            ..Default::default()
        })
        .on_reject(move |item: &u32| sink.lock().push(*item));
        let queuer = Queuer::new(|_| {}, options).unwrap();

        assert!(queuer.add_item(1).unwrap());
        assert!(queuer.add_item(2).unwrap());
        assert!(!queuer.add_item(3).unwrap());
        assert!(!queuer.add_item(4).unwrap());

        assert_eq!(queuer.peek_all_items(), vec![1, 2]);
        assert_eq!(*rejected.lock(), vec![3, 4]);
        let state = queuer.state();
        assert_eq!(state.rejection_count, 2);
        assert_eq!(state.add_item_count, 2);
        assert!(state.is_full);
    }

    #[test]
    fn test_lifo_execution_order() {
        let (queuer, seen) = recording(QueuerConfig {
            started: false,
            get_items_from: QueuePosition::Back,
            ..Default::default()
        });
        for i in [1, 2, 3] {
            queuer.add_item(i).unwrap();
        }
        queuer.start();
        assert_eq!(*seen.lock(), vec![3, 2, 1]);
    }

    #[test]
    fn test_fifo_execution_order() {
        let (queuer, seen) = recording(stopped());
        for i in [1, 2, 3] {
            queuer.add_item(i).unwrap();
        }
        queuer.start();
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn test_priority_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let options = QueuerOptions::new(stopped()).get_priority(|item: &u32| i64::from(*item % 10));
        let queuer = Queuer::new(move |item| sink.lock().push(item), options).unwrap();
        for i in [13, 11, 12, 21] {
            queuer.add_item(i).unwrap();
        }
        queuer.start();
        assert_eq!(*seen.lock(), vec![11, 21, 12, 13]);
    }

    #[test]
    fn test_enqueue_at_front() {
        let (queuer, _) = recording(stopped());
        queuer.add_item(1).unwrap();
        queuer.add_item(2).unwrap();
        queuer.enqueue(0, Some(QueuePosition::Front), true).unwrap();
        assert_eq!(queuer.peek_all_items(), vec![0, 1, 2]);
        assert_eq!(queuer.peek_next_item(None), Some(0));
        assert_eq!(queuer.peek_next_item(Some(QueuePosition::Back)), Some(2));
    }

    #[test]
    fn test_disabled_refuses_items() {
        let (queuer, _) = recording(QueuerConfig {
            pacer: crate::common::PacerOptions {
                enabled: false,
                key: Some("jobs".to_string()),
            },
            ..Default::default()
        });
        let err = queuer.add_item(1).unwrap_err();
        assert_eq!(err, PacerError::Disabled { key: "jobs".to_string() });
        assert_eq!(queuer.state().status, PacerStatus::Disabled);
        assert!(!queuer.is_running());
    }

    #[test]
    fn test_expiration_is_lazy() {
        let expired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&expired);
        let options = QueuerOptions::new(QueuerConfig {
            started: false,
            expiration_ms: Some(20),
            ..Default::default()
        })
        .on_expire(move |_: &u32| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let queuer = Queuer::new(|_| {}, options).unwrap();
        queuer.add_item(1).unwrap();
        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(queuer.state().expiration_count, 0);
        assert_eq!(queuer.size(), 1);

        assert_eq!(queuer.get_next_item(None), None);
        assert_eq!(queuer.state().expiration_count, 1);
        assert_eq!(expired.load(Ordering::SeqCst), 1);
        assert!(queuer.is_empty());
    }

    #[test]
    fn test_clear_keeps_counters_reset_zeroes_them() {
        let (queuer, _) = recording(stopped());
        for i in 0..3 {
            queuer.add_item(i).unwrap();
        }
        queuer.execute(None);

        queuer.clear();
        let state = queuer.state();
        assert_eq!(state.size, 0);
        assert_eq!(state.add_item_count, 3);
        assert_eq!(state.execution_count, 1);

        queuer.add_item(9).unwrap();
        queuer.reset();
        let state = queuer.state();
        assert_eq!(state.size, 0);
        assert_eq!(state.add_item_count, 0);
        assert_eq!(state.execution_count, 0);
    }

    #[test]
    fn test_disable_stops_and_enable_stays_idle() {
        let (queuer, seen) = recording(QueuerConfig::default());
        assert!(queuer.is_running());

        queuer.set_options(|o| o.config.pacer.enabled = false).unwrap();
        assert!(!queuer.is_running());
        assert_eq!(queuer.state().status, PacerStatus::Disabled);

        queuer.set_options(|o| o.config.pacer.enabled = true).unwrap();
        assert_eq!(queuer.state().status, PacerStatus::Idle);
        queuer.add_item(5).unwrap();
        assert!(seen.lock().is_empty());

        queuer.start();
        assert_eq!(*seen.lock(), vec![5]);
    }

    #[test]
    fn test_set_options_keeps_untouched_fields() {
        let (queuer, _) = recording(QueuerConfig {
            max_size: Some(4),
            wait_ms: 10,
            ..Default::default()
        });
        queuer.set_options(|o| o.config.concurrency = 3).unwrap();
        let options = queuer.options();
        assert_eq!(options.config.max_size, Some(4));
        assert_eq!(options.config.wait_ms, 10);
        assert_eq!(options.config.concurrency, 3);

        assert!(queuer.set_options(|o| o.config.max_size = Some(0)).is_err());
        assert_eq!(queuer.options().config.max_size, Some(4));
    }

    #[test]
    fn test_flush_and_flush_as_batch() {
        let (queuer, seen) = recording(stopped());
        for i in 0..5 {
            queuer.add_item(i).unwrap();
        }
        assert_eq!(queuer.flush(Some(2), None), 2);
        assert_eq!(*seen.lock(), vec![0, 1]);

        let batches = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&batches);
        assert_eq!(queuer.flush_as_batch(move |items| sink.lock().push(items)), 3);
        assert_eq!(*batches.lock(), vec![vec![2, 3, 4]]);
        assert_eq!(queuer.state().execution_count, 5);
        assert!(queuer.is_empty());
    }

    #[test]
    fn test_callbacks_see_new_snapshot() {
        let sizes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sizes);
        let running = Arc::new(Mutex::new(Vec::new()));
        let running_sink = Arc::clone(&running);
        let options = QueuerOptions::new(stopped())
            .on_items_change(move |state: &QueuerState<u32>| sink.lock().push(state.size))
            .on_is_running_change(move |flag| running_sink.lock().push(flag));
        let queuer = Queuer::new(|_| {}, options).unwrap();

        queuer.add_item(1).unwrap();
        queuer.add_item(2).unwrap();
        queuer.enqueue(3, None, false).unwrap();
        queuer.start();
        queuer.stop();

        assert_eq!(*sizes.lock(), vec![1, 2, 2, 1, 0]);
        assert_eq!(*running.lock(), vec![true, false]);
    }

    #[test]
    fn test_snapshots_are_immutable() {
        let (queuer, _) = recording(stopped());
        queuer.add_item(1).unwrap();
        let before = queuer.state();
        queuer.add_item(2).unwrap();
        assert_eq!(before.size, 1);
        assert_eq!(queuer.state().size, 2);
    }

    #[test]
    fn test_wait_without_runtime_needs_manual_tick() {
        let (queuer, seen) = recording(QueuerConfig {
            started: false,
            wait_ms: 50,
            ..Default::default()
        });
        for i in 0..3 {
            queuer.add_item(i).unwrap();
        }
        queuer.start();
        // No runtime: one dispatch per tick once the wait is over
        assert_eq!(*seen.lock(), vec![0]);
        queuer.tick();
        assert_eq!(*seen.lock(), vec![0]);

        std::thread::sleep(Duration::from_millis(60));
        queuer.tick();
        assert_eq!(*seen.lock(), vec![0, 1]);
    }

    #[test]
    fn test_wait_applies_to_items_added_after_start() {
        let (queuer, seen) = recording(QueuerConfig {
            wait_ms: 1000,
            ..Default::default()
        });
        for i in 1..=3 {
            queuer.add_item(i).unwrap();
        }
        assert_eq!(*seen.lock(), vec![1]);
        assert_eq!(queuer.size(), 2);
        assert_eq!(queuer.state().execution_count, 1);
    }

    #[tokio::test]
    async fn test_wait_paces_items_added_while_running() {
        let (queuer, seen) = recording(QueuerConfig {
            wait_ms: 40,
            ..Default::default()
        });
        for i in 0..3 {
            queuer.add_item(i).unwrap();
        }
        assert_eq!(*seen.lock(), vec![0]);

        tokio::time::sleep(Duration::from_millis(20)).await;
        queuer.tick();
        assert_eq!(*seen.lock(), vec![0]);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_wait_holds_across_threads() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let options = QueuerOptions::new(QueuerConfig {
            wait_ms: 1000,
            ..Default::default()
        });
        let queuer = Queuer::new(
            move |item: u32| {
                std::thread::sleep(Duration::from_millis(50));
                sink.lock().push(item);
            },
            options,
        )
        .unwrap();

        let first = queuer.clone();
        let handle = std::thread::spawn(move || first.add_item(1).unwrap());
        std::thread::sleep(Duration::from_millis(20));
        queuer.add_item(2).unwrap();
        handle.join().unwrap();

        assert_eq!(*seen.lock(), vec![1]);
        assert_eq!(queuer.peek_all_items(), vec![2]);
    }

    #[test]
    fn test_worker_never_overlaps_across_threads() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));
        let (a, p, d) = (Arc::clone(&active), Arc::clone(&peak), Arc::clone(&done));
        let queuer = Queuer::new(
            move |_: u32| {
                let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(1));
                a.fetch_sub(1, Ordering::SeqCst);
                d.fetch_add(1, Ordering::SeqCst);
            },
            QueuerOptions::new(QueuerConfig::default()),
        )
        .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let queuer = queuer.clone();
                std::thread::spawn(move || {
                    for i in 0..10 {
                        queuer.add_item(t * 10 + i).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(done.load(Ordering::SeqCst), 40);
        assert_eq!(queuer.state().execution_count, 40);
        assert!(queuer.is_idle());
    }

    #[test]
    fn test_changing_take_end_keeps_priority_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let options = QueuerOptions::new(stopped()).get_priority(|item: &u32| i64::from(*item));
        let queuer = Queuer::new(move |item| sink.lock().push(item), options).unwrap();
        for i in [5, 1, 3] {
            queuer.add_item(i).unwrap();
        }

        queuer.set_options(|o| o.config.get_items_from = QueuePosition::Back).unwrap();
        queuer.start();
        assert_eq!(*seen.lock(), vec![1, 3, 5]);
    }

    #[test]
    fn test_installing_priority_reorders_pending_items() {
        let (queuer, seen) = recording(stopped());
        for i in [13, 11, 12] {
            queuer.add_item(i).unwrap();
        }

        queuer
            .set_options(|o| o.get_priority = Some(Arc::new(|item: &u32| i64::from(*item % 10))))
            .unwrap();
        assert_eq!(queuer.peek_next_item(None), Some(11));
        queuer.start();
        assert_eq!(*seen.lock(), vec![11, 12, 13]);
    }

    #[test]
    fn test_snapshots_share_items_until_mutation() {
        let (queuer, _) = recording(stopped());
        queuer.add_item(1).unwrap();
        let first = queuer.state();
        let again = queuer.state();
        assert!(Arc::ptr_eq(&first.items, &again.items));

        queuer.add_item(2).unwrap();
        assert_eq!(queuer.state().items.len(), 2);
        assert_eq!(first.items.len(), 1);
    }

    #[tokio::test]
    async fn test_wait_spaces_dispatches() {
        let (queuer, seen) = recording(QueuerConfig {
            started: false,
            wait_ms: 40,
            ..Default::default()
        });
        for i in 0..3 {
            queuer.add_item(i).unwrap();
        }
        queuer.start();
        assert_eq!(*seen.lock(), vec![0]);
        assert!(queuer.state().pending_tick);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
        assert!(!queuer.state().pending_tick);
    }

    proptest::proptest! {
        #[test]
        fn prop_admission_accounting(max_size in 1usize..20, attempts in 0usize..40) {
            let (queuer, _) = recording(QueuerConfig {
                max_size: Some(max_size),
                ..stopped()
            });
            let accepted = (0..attempts as u32).filter(|n| queuer.add_item(*n).unwrap()).count();

            let expected = attempts.min(max_size);
            proptest::prop_assert_eq!(accepted, expected);
            proptest::prop_assert_eq!(queuer.size(), expected);
            let state = queuer.state();
            proptest::prop_assert_eq!(state.add_item_count, expected as u64);
            proptest::prop_assert_eq!(state.rejection_count, (attempts - expected) as u64);
        }
    }

    #[tokio::test]
    async fn test_subscribe_receives_updates() {
        let (queuer, _) = recording(stopped());
        let mut rx = queuer.subscribe();
        queuer.add_item(7).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().size, 1);
    }
}
