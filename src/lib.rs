//! # kvsim
//!
//! A clock-accurate driver for hash-map and key/value-store hardware models.
//!
//! ## Design Principles
//!
//! - **Signal-Level Port**: Models expose a fixed set of named input and output
//!   lines (`clk`, `insert`, `ins_key`, ..., `busy`, `valid`, `value`).
//!   Nothing changes until the model is stepped one clock edge.
//! - **Shared Timeline**: Every model instance takes its time from one
//!   [`SimContext`], which may be shared across threads.
//! - **Busy/Valid Handshake**: The [`TransactionDriver`] turns insert, lookup,
//!   modify and delete requests into cycle-accurate signal sequences and
//!   works with any [`ClockedModel`].
//! - **Waveform Capture**: A [`TraceRecorder`](trace::TraceRecorder) records
//!   every clock edge and streams it to a VCD file as the model runs.
//!
//! ## Features
//!
//! - `parallel` - Run batches of simulations on rayon worker threads
//!
//! ## Quick Start
//!
//! ```rust
//! use kvsim::{ModelInstance, ModelVariant, SimContext, TransactionDriver};
//!
//! let ctx = SimContext::create();
//! let model = ModelInstance::create(&ctx, ModelVariant::HashMap);
//! let mut driver = TransactionDriver::new(model);
//!
//! driver.insert(1, 100).unwrap();
//! assert_eq!(driver.lookup(1).unwrap(), Some(100));
//! assert_eq!(driver.lookup(42).unwrap(), None);
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use kvsim::{SimConfig, Simulation};
//!
//! let config = SimConfig::from_yaml_file("simulation.yaml")?;
//! let stats = Simulation::from_config(config)?.run()?;
//! println!("{}", stats.summary());
//! ```

pub mod types;
pub mod error;
pub mod signal;
pub mod context;
pub mod cores;
pub mod model;
pub mod trace;
pub mod driver;
pub mod config;
pub mod stats;
pub mod workload;
pub mod runner;
pub mod parallel;

// Re-export commonly used types
pub use types::{Cycles, Key, SimTime, Value, Word};
pub use error::{SimError, SimResult};
pub use signal::{Direction, InputLines, OutputLines, RequestKind, SignalLine, SignalPort, SignalState};
pub use context::{ContextConfig, SimContext};
pub use cores::{HardwareCore, ModelVariant};
pub use model::{ClockedModel, ModelInstance, ModelStats};
pub use trace::{TraceDestination, TraceRecorder, TraceSummary};
pub use driver::{DriverState, DriverStats, Request, TransactionDriver, TransactionOutcome};
pub use config::{ConfigError, SimConfig, SimConfigBuilder, WorkloadConfig};
pub use stats::{RunStats, Timer};
pub use workload::{Workload, WorkloadReport};
pub use runner::Simulation;
pub use parallel::{run_batch, BatchOutcome, BatchRunner};

/// Initialize the tracing subscriber for logging.
///
/// Call this at the start of your program to enable logging. `RUST_LOG`
/// takes precedence over `level` when set.
///
/// # Example
///
/// ```rust,ignore
/// kvsim::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
