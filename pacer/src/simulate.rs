//! Synthetic workload runner behind `pacer simulate`

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use colored::Colorize;
use eyre::{Context, Result};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::cli::SimulateArgs;
use crate::common::PacerStatus;
use crate::config::{Config, SimulationConfig};
use crate::error::PacerError;
use crate::queue::{AbortSignal, AsyncQueuer, AsyncQueuerOptions, AsyncQueuerState, QueuePosition, QueuerConfig};

/// Final counters of a simulation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueReport {
    pub key: String,
    pub items: usize,
    pub added: u64,
    pub rejected: u64,
    pub executed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub expired: u64,
    pub settled: u64,
    /// Callers whose item was discarded before it ran
    pub aborted: usize,
    pub peak_active: usize,
    pub elapsed_ms: u64,
    pub status: PacerStatus,
}

impl QueueReport {
    /// Human-readable summary
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{} {}\n", "Simulation".bold(), self.key.cyan()));
        out.push_str(&format!("  items:       {}\n", self.items));
        out.push_str(&format!("  added:       {}\n", self.added));
        out.push_str(&format!("  rejected:    {}\n", colorize_count(self.rejected, false)));
        out.push_str(&format!("  executed:    {}\n", self.executed));
        out.push_str(&format!("  succeeded:   {}\n", colorize_count(self.succeeded, true)));
        out.push_str(&format!("  failed:      {}\n", colorize_count(self.failed, false)));
        out.push_str(&format!("  expired:     {}\n", colorize_count(self.expired, false)));
        out.push_str(&format!("  settled:     {}\n", self.settled));
        out.push_str(&format!("  aborted:     {}\n", self.aborted));
        out.push_str(&format!("  peak active: {}\n", self.peak_active));
        out.push_str(&format!("  elapsed:     {}ms\n", self.elapsed_ms));
        out.push_str(&format!("  status:      {}\n", self.status));
        out
    }
}

fn colorize_count(count: u64, good: bool) -> String {
    let text = count.to_string();
    match (count, good) {
        (0, _) => text,
        (_, true) => text.green().to_string(),
        (_, false) => text.yellow().to_string(),
    }
}

/// Merge command-line overrides into the file configuration
pub fn resolve(args: &SimulateArgs, config: &Config) -> (QueuerConfig, SimulationConfig) {
    debug!(?args, "resolve: called");
    let mut queue = config.queue.clone();
    let mut simulation = config.simulation.clone();

    if let Some(items) = args.items {
        simulation.items = items;
    }
    if let Some(duration_ms) = args.duration_ms {
        simulation.duration_ms = duration_ms;
    }
    if let Some(jitter_ms) = args.jitter_ms {
        simulation.jitter_ms = jitter_ms;
    }
    if let Some(fail_every) = args.fail_every {
        simulation.fail_every = fail_every;
    }
    if let Some(concurrency) = args.concurrency {
        queue.concurrency = concurrency;
    }
    if args.max_size.is_some() {
        queue.max_size = args.max_size;
    }
    if let Some(wait_ms) = args.wait_ms {
        queue.wait_ms = wait_ms;
    }
    if args.lifo {
        queue.get_items_from = QueuePosition::Back;
    }
    if args.expiration_ms.is_some() {
        queue.expiration_ms = args.expiration_ms;
    }
    if queue.pacer.key.is_none() {
        queue.pacer.key = Some("simulate".to_string());
    }

    (queue, simulation)
}

/// Enqueue every synthetic item, start the queue and wait for all of them
pub async fn run(queue: QueuerConfig, simulation: SimulationConfig) -> Result<QueueReport> {
    info!(?queue, ?simulation, "Starting simulation");
    let key = queue.pacer.key_or_default().to_string();
    let duration = Duration::from_millis(simulation.duration_ms);
    let jitter_ms = simulation.jitter_ms;
    let fail_every = simulation.fail_every;

    let peak = Arc::new(AtomicUsize::new(0));
    let peak_sink = Arc::clone(&peak);
    let options = AsyncQueuerOptions::new(QueuerConfig {
        started: false,
        ..queue
    })
    .on_items_change(move |state: &AsyncQueuerState<usize, usize>| {
        peak_sink.fetch_max(state.active_items.len(), Ordering::SeqCst);
    });

    let worker = move |index: usize, _signal: AbortSignal| {
        let extra = if jitter_ms > 0 {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };
        async move {
            tokio::time::sleep(duration + extra).await;
            if fail_every > 0 && index % fail_every == 0 {
                eyre::bail!("item {index} failed by design");
            }
            Ok(index)
        }
    };
    let queuer = AsyncQueuer::new(worker, options).context("Failed to build queue")?;

    let started = tokio::time::Instant::now();
    let mut pending = Vec::with_capacity(simulation.items);
    for index in 0..simulation.items {
        match queuer.enqueue(index, None, true) {
            Ok(result) => pending.push(result),
            Err(PacerError::QueueFull { .. }) => debug!(index, "run: item rejected"),
            Err(e) => return Err(e).context("Failed to enqueue item"),
        }
    }

    queuer.start();
    let results = futures::future::join_all(pending).await;
    let aborted = results
        .iter()
        .filter(|r| matches!(r, Err(PacerError::Aborted)))
        .count();
    queuer.stop();

    let state = queuer.state();
    let report = QueueReport {
        key,
        items: simulation.items,
        added: state.add_item_count,
        rejected: state.rejection_count,
        executed: state.execution_count,
        succeeded: state.success_count,
        failed: state.error_count,
        expired: state.expiration_count,
        settled: state.settle_count,
        aborted,
        peak_active: peak.load(Ordering::SeqCst),
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        status: state.status,
    };
    info!(?report, "Simulation finished");
    Ok(report)
}
