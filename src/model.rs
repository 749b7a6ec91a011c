//! Model instances and the `ClockedModel` trait.
//!
//! A `ModelInstance` binds one hardware core to a simulation context. It
//! owns the live signal state and advances the core one rising clock edge
//! per [`step`](ClockedModel::step) call:
//!
//! 1. drive `clk` high and hand the current inputs to the core
//! 2. publish the core's outputs
//! 3. advance the context's time by one clock period
//! 4. append one snapshot to the attached trace recorder, if any
//!
//! Setting input lines has no observable effect until the next step.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::context::SimContext;
use crate::cores::{HardwareCore, ModelVariant};
use crate::error::{SimError, SimResult};
use crate::signal::{InputLines, OutputLines, SignalPort};
use crate::trace::TraceSink;
use crate::types::{Cycles, SimTime, DEFAULT_CLOCK_PERIOD, MIN_CLOCK_PERIOD};

/// A model that can be driven one clock edge at a time.
///
/// The transaction driver is written against this trait only, so any core
/// exposing the key/value signal contract can be driven by it.
pub trait ClockedModel: SignalPort {
    /// Advances the model by exactly one clock edge and returns the new
    /// simulation time.
    fn step(&mut self) -> SimTime;

    /// Returns the model to its power-on state: store empty, all inputs
    /// deasserted, `busy = 0`, `valid = 0`.
    fn reset(&mut self);

    /// Number of clock edges since creation or the last reset.
    fn cycles(&self) -> Cycles;

    /// Current simulation time.
    fn now(&self) -> SimTime;
}

/// Statistics collected by a model instance.
#[derive(Clone, Debug, Default)]
pub struct ModelStats {
    /// Clock edges evaluated
    pub cycles: Cycles,
    /// Edges on which `busy` was high after evaluation
    pub busy_cycles: Cycles,
    /// Edges on which at least one request line was high
    pub request_cycles: Cycles,
    /// Trace snapshots handed to a recorder
    pub snapshots_recorded: u64,
    /// Number of resets, not counting the implicit one at creation
    pub resets: u64,
}

/// An exclusively owned, clock-steppable hardware model.
pub struct ModelInstance {
    ctx: Arc<SimContext>,
    variant: Option<ModelVariant>,
    core: Box<dyn HardwareCore>,
    inputs: InputLines,
    outputs: OutputLines,
    clock_period: SimTime,
    trace: Option<Arc<Mutex<TraceSink>>>,
    stats: ModelStats,
}

impl ModelInstance {
    /// Instantiates a model of `variant` with its default capacity.
    pub fn create(ctx: &Arc<SimContext>, variant: ModelVariant) -> Self {
        Self::with_capacity(ctx, variant, None)
    }

    /// Instantiates a model of `variant` with an explicit capacity.
    pub fn with_capacity(
        ctx: &Arc<SimContext>,
        variant: ModelVariant,
        capacity: Option<usize>,
    ) -> Self {
        let mut model = Self::with_core(ctx, variant.create_core(capacity));
        model.variant = Some(variant);
        model
    }

    /// Instantiates a model around a caller-supplied core.
    pub fn with_core(ctx: &Arc<SimContext>, core: Box<dyn HardwareCore>) -> Self {
        let mut model = Self {
            ctx: Arc::clone(ctx),
            variant: None,
            core,
            inputs: InputLines::default(),
            outputs: OutputLines::default(),
            clock_period: DEFAULT_CLOCK_PERIOD,
            trace: None,
            stats: ModelStats::default(),
        };
        model.reset_state();
        tracing::debug!(
            core = model.core.name(),
            capacity = model.core.capacity(),
            "Model instance created"
        );
        model
    }

    /// Sets the clock period (in `SimTime` units) used to advance time.
    ///
    /// Periods below [`MIN_CLOCK_PERIOD`] are raised to it so that the
    /// clock has a distinct low phase.
    pub fn with_clock_period(mut self, period: SimTime) -> Self {
        self.clock_period = period.max(MIN_CLOCK_PERIOD);
        self
    }

    /// Returns the clock period.
    pub fn clock_period(&self) -> SimTime {
        self.clock_period
    }

    /// Returns the context this model was created from.
    pub fn context(&self) -> &Arc<SimContext> {
        &self.ctx
    }

    /// Returns the variant tag, if the model was built from one.
    pub fn variant(&self) -> Option<ModelVariant> {
        self.variant
    }

    /// Returns the core's short name.
    pub fn core_name(&self) -> &'static str {
        self.core.name()
    }

    /// Number of live entries in the store.
    pub fn occupancy(&self) -> usize {
        self.core.occupancy()
    }

    /// Number of storage slots in the store.
    pub fn capacity(&self) -> usize {
        self.core.capacity()
    }

    /// Returns the collected statistics.
    pub fn stats(&self) -> &ModelStats {
        &self.stats
    }

    /// Returns true if an open trace recorder is fed by this model.
    pub fn is_traced(&self) -> bool {
        self.trace.as_ref().map_or(false, |sink| sink.lock().is_open())
    }

    /// Connects a trace sink. Fails if an open one is already connected.
    pub(crate) fn attach_trace(&mut self, sink: Arc<Mutex<TraceSink>>) -> SimResult<()> {
        if self.is_traced() {
            return Err(SimError::TraceAlreadyAttached);
        }
        self.trace = Some(sink);
        Ok(())
    }

    /// Exports statistics as JSON.
    pub fn export_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "core": self.core.name(),
            "clock_period": self.clock_period,
            "current_time": self.ctx.now(),
            "cycles": self.stats.cycles,
            "busy_cycles": self.stats.busy_cycles,
            "request_cycles": self.stats.request_cycles,
            "snapshots_recorded": self.stats.snapshots_recorded,
            "resets": self.stats.resets,
            "occupancy": self.core.occupancy(),
            "capacity": self.core.capacity(),
        })
    }

    fn reset_state(&mut self) {
        self.core.reset();
        self.inputs = InputLines::default();
        self.outputs = OutputLines::default();
        self.stats.cycles = 0;
    }

    fn record(&mut self, time: SimTime) {
        let state = self.signal_state();
        let recorded = match &self.trace {
            None => return,
            Some(sink) => {
                let mut sink = sink.lock();
                if sink.is_open() {
                    sink.record(time, self.clock_period, state);
                    true
                } else {
                    false
                }
            }
        };

        if recorded {
            self.stats.snapshots_recorded += 1;
        } else {
            tracing::debug!("Trace recorder closed, detaching from model");
            self.trace = None;
        }
    }
}

impl SignalPort for ModelInstance {
    fn inputs(&self) -> &InputLines {
        &self.inputs
    }

    fn inputs_mut(&mut self) -> &mut InputLines {
        &mut self.inputs
    }

    fn outputs(&self) -> OutputLines {
        self.outputs
    }
}

impl ClockedModel for ModelInstance {
    fn step(&mut self) -> SimTime {
        self.inputs.clk = true;
        self.outputs = self.core.clock_edge(&self.inputs);
        let time = self.ctx.advance(self.clock_period);

        self.stats.cycles += 1;
        if self.outputs.busy {
            self.stats.busy_cycles += 1;
        }
        if self.inputs.has_request() {
            self.stats.request_cycles += 1;
        }

        tracing::trace!(
            time,
            busy = self.outputs.busy,
            valid = self.outputs.valid,
            value = self.outputs.value,
            "Clock edge"
        );

        self.record(time);
        self.inputs.clk = false;
        time
    }

    fn reset(&mut self) {
        self.reset_state();
        self.stats.resets += 1;
        tracing::debug!(core = self.core.name(), "Model instance reset");
    }

    fn cycles(&self) -> Cycles {
        self.stats.cycles
    }

    fn now(&self) -> SimTime {
        self.ctx.now()
    }
}

impl std::fmt::Debug for ModelInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelInstance")
            .field("core", &self.core.name())
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("clock_period", &self.clock_period)
            .field("cycles", &self.stats.cycles)
            .finish()
    }
}
