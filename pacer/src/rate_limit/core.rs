//! Rate limiter core

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::common::{Pacer, PacerState, PacerStatus};
use crate::error::PacerResult;
use crate::queue::ItemCallback;

use super::config::{RateLimiterConfig, WindowType};

/// Options for a [`RateLimiter`]
pub struct RateLimiterOptions<T> {
    pub config: RateLimiterConfig,
    pub on_execute: Option<ItemCallback<T>>,
    pub on_reject: Option<ItemCallback<T>>,
}

impl<T> RateLimiterOptions<T> {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            on_execute: None,
            on_reject: None,
        }
    }

    pub fn on_execute(mut self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_execute = Some(Arc::new(f));
        self
    }

    pub fn on_reject(mut self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_reject = Some(Arc::new(f));
        self
    }
}

impl<T> Default for RateLimiterOptions<T> {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}

impl<T> Clone for RateLimiterOptions<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            on_execute: self.on_execute.clone(),
            on_reject: self.on_reject.clone(),
        }
    }
}

impl<T> std::fmt::Debug for RateLimiterOptions<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiterOptions")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Snapshot of a [`RateLimiter`]
#[derive(Debug, Clone, Default)]
pub struct RateLimiterState {
    pub execution_count: u64,
    pub rejection_count: u64,
    /// Executions still counted against the current window, oldest first
    pub execution_times: Vec<Instant>,
    pub status: PacerStatus,
    /// The limit is used up for the current window
    pub is_exceeded: bool,
}

impl RateLimiterState {
    pub fn pacer_state(&self) -> PacerState {
        PacerState {
            execution_count: self.execution_count,
            status: self.status,
        }
    }
}

struct Inner<T> {
    options: RateLimiterOptions<T>,
    execution_times: VecDeque<Instant>,
    /// Start of the current fixed window
    window_start: Option<Instant>,
    execution_count: u64,
    rejection_count: u64,
}

impl<T> Inner<T> {
    /// Drop executions that no longer count against the limit
    fn prune(&mut self, now: Instant) {
        let window = self.options.config.window();
        match self.options.config.window_type {
            WindowType::Sliding => {
                while self
                    .execution_times
                    .front()
                    .is_some_and(|t| now.saturating_duration_since(*t) >= window)
                {
                    self.execution_times.pop_front();
                }
            }
            WindowType::Fixed => {
                if self
                    .window_start
                    .is_some_and(|start| now.saturating_duration_since(start) >= window)
                {
                    self.window_start = None;
                    self.execution_times.clear();
                }
            }
        }
    }

    fn remaining(&self) -> u32 {
        let used = u32::try_from(self.execution_times.len()).unwrap_or(u32::MAX);
        self.options.config.limit.saturating_sub(used)
    }

    fn until_next_window(&self, now: Instant) -> Duration {
        if self.remaining() > 0 {
            return Duration::ZERO;
        }
        let window = self.options.config.window();
        let anchor = match self.options.config.window_type {
            WindowType::Sliding => self.execution_times.front().copied(),
            WindowType::Fixed => self.window_start,
        };
        anchor
            .map(|start| window.saturating_sub(now.saturating_duration_since(start)))
            .unwrap_or(Duration::ZERO)
    }

    fn snapshot(&self) -> RateLimiterState {
        RateLimiterState {
            execution_count: self.execution_count,
            rejection_count: self.rejection_count,
            execution_times: self.execution_times.iter().copied().collect(),
            status: PacerStatus::from_flags(self.options.config.pacer.enabled, false),
            is_exceeded: self.remaining() == 0,
        }
    }
}

/// Runs a function at most `limit` times per window, rejecting the excess
///
/// Cloning yields another handle to the same limiter.
pub struct RateLimiter<T> {
    func: Arc<dyn Fn(T) + Send + Sync>,
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for RateLimiter<T> {
    fn clone(&self) -> Self {
        Self {
            func: Arc::clone(&self.func),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> RateLimiter<T> {
    pub fn new(func: impl Fn(T) + Send + Sync + 'static, options: RateLimiterOptions<T>) -> PacerResult<Self> {
        debug!(config = ?options.config, "RateLimiter::new: called");
        options.config.validate()?;
        Ok(Self {
            func: Arc::new(func),
            inner: Arc::new(Mutex::new(Inner {
                options,
                execution_times: VecDeque::new(),
                window_start: None,
                execution_count: 0,
                rejection_count: 0,
            })),
        })
    }

    /// Run `func(item)` if the window has room
    ///
    /// Returns false when disabled or over the limit.
    pub fn maybe_execute(&self, item: T) -> bool {
        debug!("RateLimiter::maybe_execute: called");
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let options = inner.options.clone();

        if !options.config.pacer.enabled {
            debug!("RateLimiter::maybe_execute: disabled");
            return false;
        }

        inner.prune(now);
        if inner.remaining() == 0 {
            inner.rejection_count += 1;
            let retry_after = inner.until_next_window(now);
            warn!(key = options.config.pacer.key_or_default(), ?retry_after, "Rate limit exceeded");
            drop(inner);
            if let Some(cb) = &options.on_reject {
                cb(&item);
            }
            return false;
        }

        if inner.window_start.is_none() {
            inner.window_start = Some(now);
        }
        inner.execution_times.push_back(now);
        inner.execution_count += 1;
        drop(inner);

        (self.func)(item.clone());
        if let Some(cb) = &options.on_execute {
            cb(&item);
        }
        true
    }

    /// Executions still allowed in the current window
    pub fn remaining_in_window(&self) -> u32 {
        let mut inner = self.inner.lock();
        inner.prune(Instant::now());
        inner.remaining()
    }

    /// Milliseconds until another execution would be allowed; 0 when one is allowed now
    pub fn ms_until_next_window(&self) -> u64 {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.prune(now);
        u64::try_from(inner.until_next_window(now).as_millis()).unwrap_or(u64::MAX)
    }

    /// Forget every recorded execution and zero the counters
    pub fn reset(&self) {
        debug!("RateLimiter::reset: called");
        let mut inner = self.inner.lock();
        inner.execution_times.clear();
        inner.window_start = None;
        inner.execution_count = 0;
        inner.rejection_count = 0;
    }

    pub fn state(&self) -> RateLimiterState {
        let mut inner = self.inner.lock();
        inner.prune(Instant::now());
        inner.snapshot()
    }

    /// Atomically replace options; fields `update` leaves alone keep their values
    pub fn set_options(&self, update: impl FnOnce(&mut RateLimiterOptions<T>)) -> PacerResult<()> {
        debug!("RateLimiter::set_options: called");
        let mut inner = self.inner.lock();
        let mut next = inner.options.clone();
        update(&mut next);
        next.config.validate()?;
        if next.config.pacer.enabled != inner.options.config.pacer.enabled {
            info!(
                key = next.config.pacer.key_or_default(),
                enabled = next.config.pacer.enabled,
                "RateLimiter toggled"
            );
        }
        inner.options = next;
        Ok(())
    }
}

impl<T: Clone> Pacer for RateLimiter<T> {
    fn key(&self) -> Option<String> {
        self.inner.lock().options.config.pacer.key.clone()
    }

    fn is_enabled(&self) -> bool {
        self.inner.lock().options.config.pacer.enabled
    }

    fn pacer_state(&self) -> PacerState {
        self.state().pacer_state()
    }
}
