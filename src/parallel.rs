//! Batch execution of independent simulations.
//!
//! Every configuration in a batch gets its own model instance, driver and
//! recorder, but all of them share one [`SimContext`] and therefore one
//! time base. With the `parallel` feature the runs execute on rayon worker
//! threads; without it they run one after another.
//!
//! # Feature Flag
//!
//! Parallel execution requires the `parallel` feature:
//! ```toml
//! [dependencies]
//! kvsim = { version = "0.1", features = ["parallel"] }
//! ```

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::SimConfig;
use crate::context::SimContext;
use crate::error::SimResult;
use crate::runner::Simulation;
use crate::stats::{RunStats, Timer};

/// Results of a batch, in the order the configurations were given.
#[derive(Debug)]
pub struct BatchOutcome {
    pub results: Vec<SimResult<RunStats>>,
    /// Wall-clock time of the whole batch in milliseconds
    pub wall_time_ms: f64,
}

impl BatchOutcome {
    /// Number of runs that completed without error.
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    /// Number of runs that failed.
    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// Exports a per-run overview as JSON.
    pub fn export_stats(&self) -> serde_json::Value {
        let runs: Vec<serde_json::Value> = self
            .results
            .iter()
            .map(|result| match result {
                Ok(stats) => serde_json::json!({
                    "name": stats.metadata.name,
                    "variant": stats.metadata.variant,
                    "cycles": stats.model.cycles,
                    "transactions": stats.driver.transactions(),
                }),
                Err(e) => serde_json::json!({ "error": e.to_string() }),
            })
            .collect();

        serde_json::json!({
            "batch": {
                "runs": self.results.len(),
                "succeeded": self.succeeded(),
                "failed": self.failed(),
                "wall_time_ms": self.wall_time_ms,
                "parallel": cfg!(feature = "parallel"),
            },
            "runs": runs,
        })
    }
}

/// Runs batches of simulations against one shared context.
#[derive(Debug, Default)]
pub struct BatchRunner {
    /// Number of worker threads (0 = rayon default)
    #[cfg_attr(not(feature = "parallel"), allow(dead_code))]
    num_threads: usize,
}

impl BatchRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of worker threads.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }

    /// Gives every traced run whose trace path is shared with another run
    /// its own file, `<stem>-run-<index>.<ext>`, next to the original.
    fn assign_trace_paths(configs: &mut [SimConfig]) {
        let mut uses: HashMap<PathBuf, usize> = HashMap::new();
        for config in configs.iter().filter(|c| c.trace.enabled) {
            *uses.entry(config.trace.path.clone()).or_default() += 1;
        }

        for (index, config) in configs.iter_mut().enumerate() {
            if !config.trace.enabled || uses.get(&config.trace.path).copied().unwrap_or(0) < 2 {
                continue;
            }
            let path = per_run_path(&config.trace.path, index);
            tracing::debug!(
                run = index,
                shared = %config.trace.path.display(),
                path = %path.display(),
                "Trace path shared within batch, using per-run file"
            );
            config.trace.path = path;
        }
    }

    fn run_one(ctx: &Arc<SimContext>, index: usize, config: SimConfig) -> SimResult<RunStats> {
        let result = Simulation::with_context(ctx, config)
            .and_then(|sim| sim.with_name(format!("run-{}", index)).run());
        if let Err(e) = &result {
            tracing::warn!(run = index, error = %e, "Batch run failed");
        }
        result
    }

    /// Runs every configuration sequentially.
    #[cfg(not(feature = "parallel"))]
    pub fn run(&self, ctx: &Arc<SimContext>, configs: Vec<SimConfig>) -> BatchOutcome {
        let mut configs = configs;
        Self::assign_trace_paths(&mut configs);

        let timer = Timer::start();
        tracing::info!(runs = configs.len(), "Starting sequential batch");

        let results = configs
            .into_iter()
            .enumerate()
            .map(|(i, config)| Self::run_one(ctx, i, config))
            .collect();

        BatchOutcome {
            results,
            wall_time_ms: timer.elapsed_ms(),
        }
    }

    /// Runs every configuration on the rayon thread pool.
    #[cfg(feature = "parallel")]
    pub fn run(&self, ctx: &Arc<SimContext>, configs: Vec<SimConfig>) -> BatchOutcome {
        if self.num_threads > 0 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(self.num_threads)
                .build_global()
                .ok(); // Ignore if already configured
        }

        let mut configs = configs;
        Self::assign_trace_paths(&mut configs);

        let timer = Timer::start();
        tracing::info!(runs = configs.len(), "Starting parallel batch");

        let results = configs
            .into_par_iter()
            .enumerate()
            .map(|(i, config)| Self::run_one(ctx, i, config))
            .collect();

        BatchOutcome {
            results,
            wall_time_ms: timer.elapsed_ms(),
        }
    }
}

fn per_run_path(path: &Path, index: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "trace".to_string());
    let name = match path.extension() {
        Some(ext) => format!("{}-run-{}.{}", stem, index, ext.to_string_lossy()),
        None => format!("{}-run-{}", stem, index),
    };
    path.with_file_name(name)
}

/// Runs `configs` against `ctx` with default batch settings.
pub fn run_batch(ctx: &Arc<SimContext>, configs: Vec<SimConfig>) -> BatchOutcome {
    BatchRunner::new().run(ctx, configs)
}
