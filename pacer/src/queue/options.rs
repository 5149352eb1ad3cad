//! Runtime options for the queuers: settings plus callback slots

use std::sync::Arc;

use super::config::QueuerConfig;
use super::state::{AsyncQueuerState, QueuerState};

/// Maps an item to its priority; lower values are dequeued first
pub type PriorityFn<T> = Arc<dyn Fn(&T) -> i64 + Send + Sync>;

/// Whether two optional priority functions are the same function
pub(crate) fn same_priority_fn<T>(a: &Option<PriorityFn<T>>, b: &Option<PriorityFn<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Callback receiving a single item
pub type ItemCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Callback receiving the running flag after it changed
pub type RunningCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Options for a synchronous [`Queuer`](super::Queuer)
pub struct QueuerOptions<T> {
    pub config: QueuerConfig,
    pub get_priority: Option<PriorityFn<T>>,
    pub on_execute: Option<ItemCallback<T>>,
    pub on_reject: Option<ItemCallback<T>>,
    pub on_expire: Option<ItemCallback<T>>,
    pub on_items_change: Option<Arc<dyn Fn(&QueuerState<T>) + Send + Sync>>,
    pub on_is_running_change: Option<RunningCallback>,
}

impl<T> QueuerOptions<T> {
    pub fn new(config: QueuerConfig) -> Self {
        Self {
            config,
            get_priority: None,
            on_execute: None,
            on_reject: None,
            on_expire: None,
            on_items_change: None,
            on_is_running_change: None,
        }
    }

    pub fn get_priority(mut self, f: impl Fn(&T) -> i64 + Send + Sync + 'static) -> Self {
        self.get_priority = Some(Arc::new(f));
        self
    }

    pub fn on_execute(mut self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_execute = Some(Arc::new(f));
        self
    }

    pub fn on_reject(mut self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_reject = Some(Arc::new(f));
        self
    }

    pub fn on_expire(mut self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_expire = Some(Arc::new(f));
        self
    }

    pub fn on_items_change(mut self, f: impl Fn(&QueuerState<T>) + Send + Sync + 'static) -> Self {
        self.on_items_change = Some(Arc::new(f));
        self
    }

    pub fn on_is_running_change(mut self, f: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.on_is_running_change = Some(Arc::new(f));
        self
    }
}

impl<T> Default for QueuerOptions<T> {
    fn default() -> Self {
        Self::new(QueuerConfig::default())
    }
}

impl<T> Clone for QueuerOptions<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            get_priority: self.get_priority.clone(),
            on_execute: self.on_execute.clone(),
            on_reject: self.on_reject.clone(),
            on_expire: self.on_expire.clone(),
            on_items_change: self.on_items_change.clone(),
            on_is_running_change: self.on_is_running_change.clone(),
        }
    }
}

impl<T> std::fmt::Debug for QueuerOptions<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuerOptions")
            .field("config", &self.config)
            .field("get_priority", &self.get_priority.is_some())
            .finish_non_exhaustive()
    }
}

/// Options for an [`AsyncQueuer`](super::AsyncQueuer)
pub struct AsyncQueuerOptions<T, R> {
    pub config: QueuerConfig,
    pub get_priority: Option<PriorityFn<T>>,
    pub on_execute: Option<ItemCallback<T>>,
    pub on_reject: Option<ItemCallback<T>>,
    pub on_expire: Option<ItemCallback<T>>,
    pub on_success: Option<Arc<dyn Fn(&R, &T) + Send + Sync>>,
    pub on_error: Option<Arc<dyn Fn(&eyre::Report, &T) + Send + Sync>>,
    pub on_settled: Option<ItemCallback<T>>,
    pub on_items_change: Option<Arc<dyn Fn(&AsyncQueuerState<T, R>) + Send + Sync>>,
    pub on_is_running_change: Option<RunningCallback>,
}

impl<T, R> AsyncQueuerOptions<T, R> {
    pub fn new(config: QueuerConfig) -> Self {
        Self {
            config,
            get_priority: None,
            on_execute: None,
            on_reject: None,
            on_expire: None,
            on_success: None,
            on_error: None,
            on_settled: None,
            on_items_change: None,
            on_is_running_change: None,
        }
    }

    pub fn get_priority(mut self, f: impl Fn(&T) -> i64 + Send + Sync + 'static) -> Self {
        self.get_priority = Some(Arc::new(f));
        self
    }

    pub fn on_execute(mut self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_execute = Some(Arc::new(f));
        self
    }

    pub fn on_reject(mut self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_reject = Some(Arc::new(f));
        self
    }

    pub fn on_expire(mut self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_expire = Some(Arc::new(f));
        self
    }

    pub fn on_success(mut self, f: impl Fn(&R, &T) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&eyre::Report, &T) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_settled(mut self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_settled = Some(Arc::new(f));
        self
    }

    pub fn on_items_change(mut self, f: impl Fn(&AsyncQueuerState<T, R>) + Send + Sync + 'static) -> Self {
        self.on_items_change = Some(Arc::new(f));
        self
    }

    pub fn on_is_running_change(mut self, f: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.on_is_running_change = Some(Arc::new(f));
        self
    }
}

impl<T, R> Default for AsyncQueuerOptions<T, R> {
    fn default() -> Self {
        Self::new(QueuerConfig::default())
    }
}

impl<T, R> Clone for AsyncQueuerOptions<T, R> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            get_priority: self.get_priority.clone(),
            on_execute: self.on_execute.clone(),
            on_reject: self.on_reject.clone(),
            on_expire: self.on_expire.clone(),
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            on_settled: self.on_settled.clone(),
            on_items_change: self.on_items_change.clone(),
            on_is_running_change: self.on_is_running_change.clone(),
        }
    }
}

impl<T, R> std::fmt::Debug for AsyncQueuerOptions<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncQueuerOptions")
            .field("config", &self.config)
            .field("get_priority", &self.get_priority.is_some())
            .finish_non_exhaustive()
    }
}
