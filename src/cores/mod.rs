//! Behavioral hardware cores.
//!
//! A core is the opaque clocked logic behind a model instance. It sees the
//! input lines once per rising clock edge and publishes new output lines.
//! Both cores shipped here honour the same signal contract and differ only
//! in internal latency and capacity.
//!
//! # Available Cores
//!
//! - [`HashMapCore`] - Open-addressing table probing one slot per cycle
//! - [`KvsCore`] - Key-value store front end (request latch) over a hash-map core

pub mod hashmap;
pub mod kvs;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::signal::{InputLines, OutputLines, RequestKind};
use crate::types::{Key, Value};

pub use hashmap::HashMapCore;
pub use kvs::KvsCore;

/// Clocked logic evaluated by a model instance.
pub trait HardwareCore: Send {
    /// Short name used for waveform scopes and logs.
    fn name(&self) -> &'static str;

    /// Returns the core to its power-on state: empty store, `busy = 0`,
    /// `valid = 0`.
    fn reset(&mut self);

    /// Evaluates one rising clock edge with the given inputs and returns the
    /// outputs visible after the edge.
    fn clock_edge(&mut self, inputs: &InputLines) -> OutputLines;

    /// Number of live entries.
    fn occupancy(&self) -> usize;

    /// Number of storage slots.
    fn capacity(&self) -> usize;
}

/// Selects which core a model instance is built around.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    /// Bare hash-map core
    #[default]
    HashMap,
    /// Key-value store core built on the hash-map core
    Kvs,
}

impl ModelVariant {
    /// Builds a core of this variant. `None` selects the variant's default
    /// capacity.
    pub fn create_core(self, capacity: Option<usize>) -> Box<dyn HardwareCore> {
        let capacity = capacity.unwrap_or(self.default_capacity());
        match self {
            ModelVariant::HashMap => Box::new(HashMapCore::new(capacity)),
            ModelVariant::Kvs => Box::new(KvsCore::new(capacity)),
        }
    }

    /// Slot count used when no capacity is configured.
    pub fn default_capacity(self) -> usize {
        match self {
            ModelVariant::HashMap => HashMapCore::DEFAULT_CAPACITY,
            ModelVariant::Kvs => KvsCore::DEFAULT_CAPACITY,
        }
    }

    /// Fewest clock edges any transaction takes on this variant, counted
    /// from the edge that samples the request.
    pub fn min_transaction_cycles(self) -> u64 {
        match self {
            ModelVariant::HashMap => 2,
            ModelVariant::Kvs => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ModelVariant::HashMap => "hashmap",
            ModelVariant::Kvs => "kvs",
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A request latched from the input lines on the accepting edge.
///
/// When several request lines are high the core honours the first one in
/// [`RequestKind::ALL`] order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct LatchedRequest {
    pub kind: RequestKind,
    pub key: Key,
    pub value: Value,
}

impl LatchedRequest {
    pub fn sample(inputs: &InputLines) -> Option<Self> {
        let kind = RequestKind::ALL
            .iter()
            .copied()
            .find(|kind| inputs.request(*kind))?;
        let (key, value) = match kind {
            RequestKind::Insert => (inputs.ins_key, inputs.ins_value),
            RequestKind::Lookup | RequestKind::Delete => (inputs.key, 0),
            RequestKind::Modify => (inputs.key, inputs.mod_value),
        };
        Some(Self { kind, key, value })
    }

    /// Input lines asserting only this request.
    pub fn to_inputs(self) -> InputLines {
        let mut inputs = InputLines::default();
        inputs.set_request(self.kind, true);
        match self.kind {
            RequestKind::Insert => {
                inputs.ins_key = self.key;
                inputs.ins_value = self.value;
            }
            RequestKind::Lookup | RequestKind::Delete => inputs.key = self.key,
            RequestKind::Modify => {
                inputs.key = self.key;
                inputs.mod_value = self.value;
            }
        }
        inputs
    }
}
