//! Configured simulation runs.
//!
//! A [`Simulation`] turns a [`SimConfig`] into a context, a model instance,
//! a transaction driver and an optional trace recorder, then runs the
//! configured workload. The recorder is finalized on every exit path: by
//! `close` on success and by its `Drop` when the run fails part-way.

use std::sync::Arc;

use crate::config::SimConfig;
use crate::context::{ContextConfig, SimContext};
use crate::driver::TransactionDriver;
use crate::error::SimResult;
use crate::model::{ClockedModel, ModelInstance};
use crate::stats::{ModelSummary, RunStats, Timer};
use crate::trace::{TraceDestination, TraceRecorder};
use crate::workload::run_workload;

/// A ready-to-run simulation built from a configuration.
#[derive(Debug)]
pub struct Simulation {
    name: String,
    config: SimConfig,
    driver: TransactionDriver<ModelInstance>,
    recorder: Option<TraceRecorder>,
}

impl Simulation {
    /// Builds a simulation on a fresh context whose trace capture follows
    /// `config.trace.enabled`.
    pub fn from_config(config: SimConfig) -> SimResult<Self> {
        let ctx = SimContext::new(ContextConfig::new().with_trace(config.trace.enabled));
        Self::with_context(&ctx, config)
    }

    /// Builds a simulation on a shared context.
    ///
    /// Fails with `RecordingUnavailable` if the configuration asks for a
    /// trace and `ctx` has capture disabled.
    pub fn with_context(ctx: &Arc<SimContext>, config: SimConfig) -> SimResult<Self> {
        config.validate()?;

        let model = ModelInstance::with_capacity(ctx, config.model.variant, config.model.capacity)
            .with_clock_period(config.simulation.clock_period);
        let mut driver = TransactionDriver::new(model).with_max_cycles(config.simulation.max_cycles);

        let recorder = if config.trace.enabled {
            let destination = TraceDestination::File(config.trace.path.clone());
            Some(TraceRecorder::attach(driver.model_mut(), destination)?)
        } else {
            None
        };

        tracing::info!(
            variant = %config.model.variant,
            capacity = driver.model().capacity(),
            clock_period = config.simulation.clock_period,
            traced = recorder.is_some(),
            "Simulation created"
        );

        Ok(Self {
            name: String::new(),
            config,
            driver,
            recorder,
        })
    }

    /// Sets the name reported in the run statistics.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the configuration this simulation was built from.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Returns the transaction driver.
    pub fn driver(&self) -> &TransactionDriver<ModelInstance> {
        &self.driver
    }

    /// Returns the transaction driver for manual transactions before `run`.
    pub fn driver_mut(&mut self) -> &mut TransactionDriver<ModelInstance> {
        &mut self.driver
    }

    /// Runs the configured workload and closes the trace.
    pub fn run(mut self) -> SimResult<RunStats> {
        let mut stats = RunStats::new().with_name(self.name.clone());
        stats.metadata.variant = self.config.model.variant.to_string();
        stats.record_start();
        let timer = Timer::start();

        let report = match &self.config.workload {
            Some(workload) => Some(run_workload(workload, &mut self.driver)?),
            None => None,
        };

        stats.trace = match self.recorder.take() {
            Some(recorder) => Some(recorder.close()?),
            None => None,
        };

        let model = self.driver.model();
        stats.model = ModelSummary {
            final_time: model.now(),
            cycles: model.cycles(),
            busy_cycles: model.stats().busy_cycles,
            occupancy: model.occupancy(),
            capacity: model.capacity(),
        };
        stats.driver = self.driver.stats().clone();
        stats.workload = report;
        stats.record_end();
        stats.compute_timing(timer.elapsed_ms());

        tracing::info!(
            cycles = stats.model.cycles,
            transactions = stats.driver.transactions(),
            wall_ms = stats.timing.total_wall_time_ms,
            "Simulation finished"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SimConfigBuilder, WorkloadConfig};
    use crate::cores::ModelVariant;
    use crate::error::SimError;

    #[test]
    fn test_run_fill() {
        let config = SimConfigBuilder::new()
            .variant(ModelVariant::Kvs)
            .capacity(128)
            .workload(WorkloadConfig::Fill { count: 50 })
            .build()
            .unwrap();

        let stats = Simulation::from_config(config)
            .unwrap()
            .with_name("fill")
            .run()
            .unwrap();
        assert_eq!(stats.metadata.name, "fill");
        assert_eq!(stats.metadata.variant, "kvs");
        assert_eq!(stats.driver.inserts, 50);
        assert_eq!(stats.driver.lookup_hits, 50);
        assert_eq!(stats.model.occupancy, 50);
        assert!(stats.trace.is_none());
        assert_eq!(stats.workload.unwrap().lookups_matched, 50);
    }

    #[test]
    fn test_run_with_trace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.vcd");
        let config = SimConfigBuilder::new()
            .capacity(64)
            .trace(&path)
            .workload(WorkloadConfig::Fill { count: 4 })
            .build()
            .unwrap();

        let stats = Simulation::from_config(config).unwrap().run().unwrap();
        let trace = stats.trace.unwrap();
        assert_eq!(trace.snapshots as u64, stats.model.cycles);
        assert!(path.exists());
        assert!(std::fs::read_to_string(&path).unwrap().contains("$enddefinitions"));
    }

    #[test]
    fn test_shared_context_without_capture() {
        let ctx = SimContext::create();
        let config = SimConfigBuilder::new().trace("unused.vcd").build().unwrap();

        let err = Simulation::with_context(&ctx, config).unwrap_err();
        assert!(matches!(err, SimError::RecordingUnavailable));
    }

    #[test]
    fn test_manual_transactions_before_run() {
        let config = SimConfigBuilder::new().capacity(16).build().unwrap();
        let mut sim = Simulation::from_config(config).unwrap();
        sim.driver_mut().insert(3, 4).unwrap();

        let stats = sim.run().unwrap();
        assert!(stats.workload.is_none());
        assert_eq!(stats.driver.inserts, 1);
        assert_eq!(stats.model.occupancy, 1);
    }
}
