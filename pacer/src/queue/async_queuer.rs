//! Asynchronous queuer
//!
//! Workers are futures run on their own Tokio tasks, up to `concurrency` at a
//! time. Every admitted item gets a [`PendingResult`] that resolves once that
//! item's worker invocation settles.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{Notify, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::common::{Pacer, PacerState, PacerStatus};
use crate::error::{PacerError, PacerResult};

use super::config::QueuePosition;
use super::item::QueuedItem;
use super::options::{AsyncQueuerOptions, same_priority_fn};
use super::signal::{AbortController, AbortSignal};
use super::state::{AsyncQueuerState, QueueCounters};
use super::store::QueueStore;

/// Boxed async worker: receives the item and the abort signal of its invocation
pub type AsyncWorker<T, R> = Arc<dyn Fn(T, AbortSignal) -> BoxFuture<'static, eyre::Result<R>> + Send + Sync>;

type Resolver<R> = oneshot::Sender<PacerResult<Option<R>>>;

/// Future for one admitted item
///
/// Resolves to `Ok(Some(result))` on success, `Ok(None)` when the worker
/// failed and `throw_on_error` is off, or an error. If the item is discarded
/// before it runs (cleared, reset, taken, expired) it resolves to
/// [`PacerError::Aborted`].
#[derive(Debug)]
pub struct PendingResult<R> {
    id: u64,
    rx: oneshot::Receiver<PacerResult<Option<R>>>,
}

impl<R> PendingResult<R> {
    /// Id of the queued item this result belongs to
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl<R> Future for PendingResult<R> {
    type Output = PacerResult<Option<R>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(PacerError::Aborted)))
    }
}

/// How a worker invocation ended
enum Outcome<R> {
    Success(R),
    Failed(eyre::Report),
    Panicked(String),
}

/// Result of one dispatch attempt
enum Dispatch {
    Started(JoinHandle<()>),
    Empty,
    AtCapacity,
    Paused,
}

struct Inner<T, R> {
    options: AsyncQueuerOptions<T, R>,
    store: QueueStore<T>,
    running: bool,
    counters: QueueCounters,
    /// Invocations that have not settled; not touched by `clear`
    in_flight: usize,
    active: Vec<QueuedItem<T>>,
    pending_resolvers: HashMap<u64, Resolver<R>>,
    active_resolvers: HashMap<u64, Resolver<R>>,
    abort: AbortController,
    last_result: Option<R>,
    /// When the paced dispatcher last started an item
    last_dispatch: Option<Instant>,
    timer: Option<(u64, JoinHandle<()>)>,
    timer_gen: u64,
}

impl<T: Clone, R: Clone> Inner<T, R> {
    fn snapshot(&mut self) -> AsyncQueuerState<T, R> {
        let size = self.store.len();
        AsyncQueuerState {
            items: self.store.shared(),
            active_items: self.active.clone(),
            size,
            is_empty: size == 0,
            is_full: self.options.config.max_size.is_some_and(|max| size >= max),
            is_running: self.running,
            pending_tick: self.timer.is_some(),
            status: self.status(),
            last_result: self.last_result.clone(),
            add_item_count: self.counters.add_item_count,
            execution_count: self.counters.execution_count,
            rejection_count: self.counters.rejection_count,
            expiration_count: self.counters.expiration_count,
            error_count: self.counters.error_count,
            success_count: self.counters.success_count,
            settle_count: self.counters.settle_count,
        }
    }
}

impl<T, R> Inner<T, R> {
    fn status(&self) -> PacerStatus {
        PacerStatus::from_flags(self.options.config.pacer.enabled, self.running)
    }

    fn cancel_timer(&mut self) {
        if let Some((_, handle)) = self.timer.take() {
            handle.abort();
        }
    }

    /// Drop every pending item; their callers see `Aborted`
    fn discard_pending(&mut self) -> usize {
        let dropped = self.store.clear().len();
        self.pending_resolvers.clear();
        dropped
    }
}

/// Callback work collected under the lock and fired after it is released
struct Notices<T, R> {
    callbacks: AsyncQueuerOptions<T, R>,
    expired: Vec<QueuedItem<T>>,
    items_changed: Option<Arc<AsyncQueuerState<T, R>>>,
    running_changed: Option<bool>,
}

impl<T, R> Notices<T, R> {
    fn new(callbacks: AsyncQueuerOptions<T, R>) -> Self {
        Self {
            callbacks,
            expired: Vec::new(),
            items_changed: None,
            running_changed: None,
        }
    }

    fn fire(self) {
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

struct Shared<T, R> {
    worker: AsyncWorker<T, R>,
    inner: Mutex<Inner<T, R>>,
    state_tx: watch::Sender<Arc<AsyncQueuerState<T, R>>>,
    /// Woken whenever an invocation settles
    slot_freed: Notify,
}

/// Bounded queue that runs an async worker per item under a concurrency cap
///
/// Cloning yields another handle to the same queue. Dispatch spawns Tokio
/// tasks, so items only run inside a runtime.
pub struct AsyncQueuer<T, R> {
    shared: Arc<Shared<T, R>>,
}

impl<T, R> Clone for AsyncQueuer<T, R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, R> AsyncQueuer<T, R>
where
    T: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// Create a queuer around an async `worker`
    pub fn new<F, Fut>(worker: F, options: AsyncQueuerOptions<T, R>) -> PacerResult<Self>
    where
        F: Fn(T, AbortSignal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = eyre::Result<R>> + Send + 'static,
    {
        let worker: AsyncWorker<T, R> = Arc::new(move |item, signal| worker(item, signal).boxed());
        Self::with_worker(worker, options)
    }

    /// Create a queuer around an already boxed worker
    pub fn with_worker(worker: AsyncWorker<T, R>, options: AsyncQueuerOptions<T, R>) -> PacerResult<Self> {
        debug!(config = ?options.config, "AsyncQueuer::new: called");
        options.config.validate()?;

        let running = options.config.started && options.config.pacer.enabled;
        let mut inner = Inner {
            options,
            store: QueueStore::new(),
            running,
            counters: QueueCounters::default(),
            in_flight: 0,
            active: Vec::new(),
            pending_resolvers: HashMap::new(),
            active_resolvers: HashMap::new(),
            abort: AbortController::new(),
            last_result: None,
            last_dispatch: None,
            timer: None,
            timer_gen: 0,
        };
        let (state_tx, _) = watch::channel(Arc::new(inner.snapshot()));

        Ok(Self {
            shared: Arc::new(Shared {
                worker,
                inner: Mutex::new(inner),
                state_tx,
                slot_freed: Notify::new(),
            }),
        })
    }

    /// Build and send a snapshot if anyone is watching
    fn publish(&self, inner: &mut Inner<T, R>) -> Option<Arc<AsyncQueuerState<T, R>>> {
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

    /// Add an item at the default position and wait until it settles
    pub async fn add_item(&self, item: T) -> PacerResult<Option<R>> {
        self.enqueue(item, None, true)?.await
    }

    /// Admit an item without waiting for it
    ///
    /// Admission errors (`Disabled`, `QueueFull`) are returned immediately.
    pub fn enqueue(&self, item: T, position: Option<QueuePosition>, notify: bool) -> PacerResult<PendingResult<R>> {
        debug!(?position, notify, "AsyncQueuer::enqueue: called");
        let mut inner = self.shared.inner.lock();
        let mut notices = Notices::new(inner.options.clone());
        let config = notices.callbacks.config.clone();

        if !config.pacer.enabled {
            debug!("AsyncQueuer::enqueue: disabled, refusing");
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
            if let Some(cb) = &notices.callbacks.on_reject {
                cb(&item);
            }
            return Err(PacerError::QueueFull { max_size });
        }

        let priority = notices.callbacks.get_priority.as_ref().map(|f| f(&item));
        let position = position.unwrap_or(config.add_items_to);
        let id = inner.store.insert(item, priority, position, config.get_items_from);
        let (tx, rx) = oneshot::channel();
        inner.pending_resolvers.insert(id, tx);
        inner.counters.add_item_count += 1;
        debug!(id, ?priority, %position, size = inner.store.len(), "AsyncQueuer::enqueue: item added");

        let snapshot = self.publish(&mut inner);
        drop(inner);
        if notify {
            notices.items_changed = snapshot;
        }
        notices.fire();

        self.tick();
        Ok(PendingResult { id, rx })
    }

    /// Dispatch items while running and below the concurrency cap,
    /// keeping dispatches at least `wait` apart
    pub fn tick(&self) {
        debug!("AsyncQueuer::tick: called");
        while let Dispatch::Started(_) = self.dispatch_one(None, false) {}
    }

    /// Move one item from pending to active and spawn its worker
    ///
    /// `force` dispatches even when stopped or inside the `wait` window, and
    /// does not reserve a pacing slot.
    fn dispatch_one(&self, position: Option<QueuePosition>, force: bool) -> Dispatch {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No Tokio runtime; async items cannot be dispatched");
            return Dispatch::Paused;
        };

        let mut inner = self.shared.inner.lock();
        let config = inner.options.config.clone();
        if !config.pacer.enabled || (!force && !inner.running) {
            return Dispatch::Paused;
        }
        if inner.in_flight >= config.concurrency {
            debug!(in_flight = inner.in_flight, "AsyncQueuer::dispatch_one: at capacity");
            return Dispatch::AtCapacity;
        }

        let now = Instant::now();
        let wait = config.wait();
        if !force
            && let Some(ready_at) = inner.last_dispatch.map(|last| last + wait)
            && now < ready_at
        {
            debug!(remaining = ?(ready_at - now), "AsyncQueuer::dispatch_one: waiting");
            if inner.timer.is_none() && !inner.store.is_empty() {
                self.arm_timer(&mut inner, ready_at - now);
                self.publish(&mut inner);
            }
            return Dispatch::Paused;
        }

        let from = position.unwrap_or(config.get_items_from);
        let taken = inner.store.take(from, config.expiration_duration());
        let mut notices = Notices::new(inner.options.clone());
        if !taken.expired.is_empty() {
            warn!(count = taken.expired.len(), "Evicted expired items");
            inner.counters.expiration_count += taken.expired.len() as u64;
            for item in &taken.expired {
                inner.pending_resolvers.remove(&item.id);
            }
        }

        let Some(item) = taken.item else {
            if !taken.expired.is_empty() {
                notices.items_changed = self.publish(&mut inner);
                drop(inner);
                notices.expired = taken.expired;
                notices.fire();
            }
            return Dispatch::Empty;
        };

        if !force {
            inner.last_dispatch = Some(now);
            if !wait.is_zero() {
                inner.cancel_timer();
                self.arm_timer(&mut inner, wait);
            }
        }
        inner.in_flight += 1;
        inner.active.push(item.clone());
        if let Some(tx) = inner.pending_resolvers.remove(&item.id) {
            inner.active_resolvers.insert(item.id, tx);
        }
        let signal = inner.abort.signal();
        debug!(id = item.id, in_flight = inner.in_flight, "AsyncQueuer::dispatch_one: dispatched");

        notices.items_changed = self.publish(&mut inner);
        drop(inner);
        notices.expired = taken.expired;
        notices.fire();

        Dispatch::Started(handle.spawn(self.clone().run_item(item, signal)))
    }

    async fn run_item(self, item: QueuedItem<T>, signal: AbortSignal) {
        let worker = Arc::clone(&self.shared.worker);
        let value = item.value.clone();
        let outcome = match tokio::spawn(async move { worker(value, signal).await }).await {
            Ok(Ok(result)) => Outcome::Success(result),
            Ok(Err(report)) => Outcome::Failed(report),
            Err(join_err) => Outcome::Panicked(panic_message(join_err)),
        };
        self.settle(item, outcome);
    }

    fn settle(&self, item: QueuedItem<T>, outcome: Outcome<R>) {
        debug!(id = item.id, "AsyncQueuer::settle: called");
        let mut inner = self.shared.inner.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        if let Some(index) = inner.active.iter().position(|it| it.id == item.id) {
            inner.active.remove(index);
        }
        inner.counters.settle_count += 1;

        let throw = inner.options.config.throw_on_error;
        let reply = match &outcome {
            Outcome::Success(result) => {
                inner.counters.execution_count += 1;
                inner.counters.success_count += 1;
                inner.last_result = Some(result.clone());
                Ok(Some(result.clone()))
            }
            Outcome::Failed(report) => {
                warn!(id = item.id, error = %report, "Worker failed");
                inner.counters.error_count += 1;
                if throw {
                    Err(PacerError::WorkerFailure(report.to_string()))
                } else {
                    Ok(None)
                }
            }
            Outcome::Panicked(message) => {
                warn!(id = item.id, %message, "Worker panicked");
                inner.counters.error_count += 1;
                if throw {
                    Err(PacerError::WorkerPanicked(message.clone()))
                } else {
                    Ok(None)
                }
            }
        };

        let resolver = inner.active_resolvers.remove(&item.id);
        let snapshot = self.publish(&mut inner);
        let callbacks = inner.options.clone();
        drop(inner);

        if let Some(tx) = resolver
            && tx.send(reply).is_err()
        {
            debug!(id = item.id, "AsyncQueuer::settle: caller went away");
        }

        match outcome {
            Outcome::Success(result) => {
                if let Some(cb) = &callbacks.on_execute {
                    cb(&item.value);
                }
                if let Some(cb) = &callbacks.on_success {
                    cb(&result, &item.value);
                }
            }
            Outcome::Failed(report) => {
                if let Some(cb) = &callbacks.on_error {
                    cb(&report, &item.value);
                }
            }
            Outcome::Panicked(message) => {
                if let Some(cb) = &callbacks.on_error {
                    cb(&eyre::eyre!("worker panicked: {message}"), &item.value);
                }
            }
        }
        if let Some(cb) = &callbacks.on_settled {
            cb(&item.value);
        }
        if let (Some(cb), Some(snapshot)) = (&callbacks.on_items_change, &snapshot) {
            cb(snapshot);
        }

        self.shared.slot_freed.notify_waiters();
        self.tick();
    }

    fn arm_timer(&self, inner: &mut Inner<T, R>, delay: Duration) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        inner.timer_gen += 1;
        let generation = inner.timer_gen;
        let queuer = self.clone();
        let task = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            queuer.on_timer(generation);
        });
        debug!(?delay, generation, "AsyncQueuer::arm_timer: armed");
        inner.timer = Some((generation, task));
    }

    fn on_timer(&self, generation: u64) {
        debug!(generation, "AsyncQueuer::on_timer: called");
        {
            let mut inner = self.shared.inner.lock();
            if !inner.timer.as_ref().is_some_and(|(current, _)| *current == generation) {
                debug!(generation, "AsyncQueuer::on_timer: stale timer");
                return;
            }
            inner.timer = None;
            self.publish(&mut inner);
        }
        self.tick();
    }

    /// Remove the next live item without running the worker
    ///
    /// The item's caller sees `Aborted`.
    pub fn get_next_item(&self, position: Option<QueuePosition>) -> Option<T> {
        debug!(?position, "AsyncQueuer::get_next_item: called");
        let mut inner = self.shared.inner.lock();
        let mut notices = Notices::new(inner.options.clone());
        let from = position.unwrap_or(inner.options.config.get_items_from);
        let ttl = inner.options.config.expiration_duration();
        let taken = inner.store.take(from, ttl);

        if !taken.expired.is_empty() {
            warn!(count = taken.expired.len(), "Evicted expired items");
            inner.counters.expiration_count += taken.expired.len() as u64;
            for item in &taken.expired {
                inner.pending_resolvers.remove(&item.id);
            }
        }
        if let Some(item) = &taken.item {
            inner.pending_resolvers.remove(&item.id);
        }

        let changed = taken.item.is_some() || !taken.expired.is_empty();
        let snapshot = self.publish(&mut inner);
        drop(inner);
        notices.expired = taken.expired;
        if changed {
            notices.items_changed = snapshot;
        }
        notices.fire();

        taken.item.map(|item| item.value)
    }

    /// Run up to `count` items now (all when `None`) and wait for them to settle
    ///
    /// Ignores `wait` and the running flag, never the concurrency cap.
    pub async fn flush(&self, count: Option<usize>, position: Option<QueuePosition>) -> usize {
        debug!(?count, ?position, "AsyncQueuer::flush: called");
        let limit = {
            let mut inner = self.shared.inner.lock();
            inner.cancel_timer();
            self.publish(&mut inner);
            count.unwrap_or(inner.store.len())
        };

        let mut handles = Vec::new();
        while handles.len() < limit {
            let slot_freed = self.shared.slot_freed.notified();
            match self.dispatch_one(position, true) {
                Dispatch::Started(handle) => handles.push(handle),
                Dispatch::AtCapacity => slot_freed.await,
                Dispatch::Empty | Dispatch::Paused => break,
            }
        }

        let dispatched = handles.len();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Flushed item task failed");
            }
        }
        debug!(dispatched, "AsyncQueuer::flush: done");

        self.tick();
        dispatched
    }

    /// Begin draining the queue
    pub fn start(&self) {
        debug!("AsyncQueuer::start: called");
        let mut inner = self.shared.inner.lock();
        if !inner.options.config.pacer.enabled {
            warn!(key = inner.options.config.pacer.key_or_default(), "Cannot start a disabled queuer");
            return;
        }
        if inner.running {
            return;
        }
        inner.running = true;
        info!(key = inner.options.config.pacer.key_or_default(), "AsyncQueuer started");
        self.publish(&mut inner);
        let mut notices = Notices::new(inner.options.clone());
        drop(inner);
        notices.running_changed = Some(true);
        notices.fire();

        self.tick();
    }

    /// Stop pulling new items; in-flight invocations keep running
    pub fn stop(&self) {
        debug!("AsyncQueuer::stop: called");
        let mut inner = self.shared.inner.lock();
        if !inner.running {
            return;
        }
        inner.running = false;
        inner.cancel_timer();
        info!(
            key = inner.options.config.pacer.key_or_default(),
            in_flight = inner.in_flight,
            "AsyncQueuer stopped"
        );
        self.publish(&mut inner);
        let mut notices = Notices::new(inner.options.clone());
        drop(inner);
        notices.running_changed = Some(false);
        notices.fire();
    }

    /// Trip the abort signal of every in-flight invocation
    ///
    /// Their callers see `Aborted` immediately; the workers are not stopped and
    /// still update the counters when they settle.
    pub fn abort(&self) {
        debug!("AsyncQueuer::abort: called");
        let resolvers: Vec<Resolver<R>> = {
            let mut inner = self.shared.inner.lock();
            inner.abort.abort();
            inner.abort = AbortController::new();
            info!(in_flight = inner.in_flight, "AsyncQueuer aborted in-flight items");
            inner.active_resolvers.drain().map(|(_, tx)| tx).collect()
        };
        for tx in resolvers {
            // Caller may have dropped its future already
            let _ = tx.send(Err(PacerError::Aborted));
        }
    }

    /// Drop pending items and active bookkeeping; counters are kept
    pub fn clear(&self) {
        debug!("AsyncQueuer::clear: called");
        let mut inner = self.shared.inner.lock();
        let dropped = inner.discard_pending();
        inner.active.clear();
        inner.cancel_timer();
        debug!(dropped, "AsyncQueuer::clear: pending items discarded");
        let snapshot = self.publish(&mut inner);
        let mut notices = Notices::new(inner.options.clone());
        drop(inner);
        notices.items_changed = snapshot;
        notices.fire();
    }

    /// Drop pending items, active bookkeeping and the last result; zero the counters
    pub fn reset(&self) {
        debug!("AsyncQueuer::reset: called");
        let mut inner = self.shared.inner.lock();
        inner.discard_pending();
        inner.active.clear();
        inner.cancel_timer();
        inner.counters = QueueCounters::default();
        inner.last_result = None;
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
    pub fn set_options(&self, update: impl FnOnce(&mut AsyncQueuerOptions<T, R>)) -> PacerResult<()> {
        debug!("AsyncQueuer::set_options: called");
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
            debug!(priority_changed, %take_from, "AsyncQueuer::set_options: re-sorting pending items");
            inner.store.resort(take_from);
        }
        if !inner.options.config.pacer.enabled && inner.running {
            info!(key = inner.options.config.pacer.key_or_default(), "AsyncQueuer disabled, stopping");
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

        // A raised cap may free slots
        if running {
            self.tick();
        }
        Ok(())
    }

    /// Current options
    pub fn options(&self) -> AsyncQueuerOptions<T, R> {
        self.shared.inner.lock().options.clone()
    }

    /// Current state snapshot
    pub fn state(&self) -> Arc<AsyncQueuerState<T, R>> {
        Arc::new(self.shared.inner.lock().snapshot())
    }

    /// Receive every new state snapshot, starting from the current one
    pub fn subscribe(&self) -> watch::Receiver<Arc<AsyncQueuerState<T, R>>> {
        let mut inner = self.shared.inner.lock();
        self.shared.state_tx.send_replace(Arc::new(inner.snapshot()));
        self.shared.state_tx.subscribe()
    }

    /// Pending values in queue order
    pub fn peek_all_items(&self) -> Vec<T> {
        self.shared.inner.lock().store.iter().map(|it| it.value.clone()).collect()
    }

    /// Values whose worker invocation has not settled, in dispatch order
    pub fn peek_active_items(&self) -> Vec<T> {
        self.shared.inner.lock().active.iter().map(|it| it.value.clone()).collect()
    }

    /// Next value that would be dispatched; expiry is not checked
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

    /// Nothing pending and nothing in flight
    pub fn is_idle(&self) -> bool {
        let inner = self.shared.inner.lock();
        inner.store.is_empty() && inner.in_flight == 0
    }
}

impl<T, R> Pacer for AsyncQueuer<T, R>
where
    T: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
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

/// Extract a readable message from a failed worker task
fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return "worker task was cancelled".to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
