//! Process-wide simulation context.
//!
//! The `SimContext` owns the global simulation time and the trace-capture
//! switch. Model instances hold an `Arc` to the context they were created
//! from, so the context always outlives them.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::types::SimTime;

/// Construction-time configuration of a [`SimContext`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Whether trace recorders may be attached to models of this context
    #[serde(default)]
    pub trace_enabled: bool,
}

impl ContextConfig {
    /// Creates a configuration with trace capture disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables trace capture.
    pub fn with_trace(mut self, enabled: bool) -> Self {
        self.trace_enabled = enabled;
        self
    }
}

/// Shared simulation environment.
///
/// Time only moves forward, through [`SimContext::advance`]. Several model
/// instances may share one context for a unified time base; each of their
/// steps then receives a distinct, strictly increasing timestamp.
#[derive(Debug, Default)]
pub struct SimContext {
    config: ContextConfig,
    time: AtomicU64,
}

impl SimContext {
    /// Creates a context with trace capture disabled.
    pub fn create() -> Arc<Self> {
        Self::new(ContextConfig::default())
    }

    /// Creates a context from an explicit configuration.
    pub fn new(config: ContextConfig) -> Arc<Self> {
        tracing::debug!(trace_enabled = config.trace_enabled, "Simulation context created");
        Arc::new(Self {
            config,
            time: AtomicU64::new(0),
        })
    }

    /// Returns the construction-time configuration.
    pub fn config(&self) -> ContextConfig {
        self.config
    }

    /// Returns true if trace recorders may be attached.
    pub fn trace_enabled(&self) -> bool {
        self.config.trace_enabled
    }

    /// Returns the current simulation time.
    pub fn now(&self) -> SimTime {
        self.time.load(Ordering::Acquire)
    }

    /// Advances time by `delta` and returns the new time.
    pub fn advance(&self, delta: SimTime) -> SimTime {
        self.time.fetch_add(delta, Ordering::AcqRel) + delta
    }
}
