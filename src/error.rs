//! Error types for the simulation bridge.

use thiserror::Error;

use crate::config::ConfigError;
use crate::signal::RequestKind;
use crate::types::{Cycles, Key, Value};

/// Errors that can occur while driving or observing a model instance.
#[derive(Debug, Error)]
pub enum SimError {
    /// Conflicting request lines, or a transaction issued before the driver
    /// returned to `Idle`.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// `busy` stayed asserted past the configured cycle bound.
    ///
    /// The model instance is left mid-request and must be reset.
    #[error("{request} did not complete within {cycles} cycles (busy still asserted)")]
    SimulationTimeout { request: RequestKind, cycles: Cycles },

    /// Trace attach attempted while capture is disabled on the context.
    #[error("trace capture is disabled on this simulation context")]
    RecordingUnavailable,

    /// The model already feeds an open trace recorder.
    #[error("model instance already has an open trace recorder")]
    TraceAlreadyAttached,

    /// Writing the waveform failed.
    #[error("trace output error: {0}")]
    Trace(#[from] std::io::Error),

    /// Loading or validating configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A lookup disagreed with the reference map of a workload.
    #[error("lookup of key {key:#010x} returned {observed:?}, expected {expected:?}")]
    Mismatch {
        key: Key,
        expected: Option<Value>,
        observed: Option<Value>,
    },
}

/// Result type alias for simulation operations.
pub type SimResult<T> = std::result::Result<T, SimError>;
