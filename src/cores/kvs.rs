//! Key-value store core.
//!
//! Wraps a [`HashMapCore`] behind a request latch: the accepting edge only
//! registers the request, the following edge hands it to the inner core, and
//! the inner core's result is forwarded on the edge it completes. The
//! external signal contract is identical to the bare hash-map core; requests
//! take one extra cycle.

use crate::cores::{HardwareCore, HashMapCore, LatchedRequest};
use crate::signal::{InputLines, OutputLines};

#[derive(Clone, Copy, Debug)]
enum KvsState {
    Idle,
    Latched(InputLines),
    Running(InputLines),
    Holding,
}

/// Key-value store core with a registered request stage.
#[derive(Debug)]
pub struct KvsCore {
    inner: HashMapCore,
    state: KvsState,
    outputs: OutputLines,
}

impl KvsCore {
    /// Default number of slots.
    pub const DEFAULT_CAPACITY: usize = 1 << 16;

    pub fn new(capacity: usize) -> Self {
        Self {
            inner: HashMapCore::new(capacity),
            state: KvsState::Idle,
            outputs: OutputLines::default(),
        }
    }

    /// The underlying hash-map core.
    pub fn inner(&self) -> &HashMapCore {
        &self.inner
    }
}

impl Default for KvsCore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl HardwareCore for KvsCore {
    fn name(&self) -> &'static str {
        "kvs"
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.state = KvsState::Idle;
        self.outputs = OutputLines::default();
    }

    fn clock_edge(&mut self, inputs: &InputLines) -> OutputLines {
        match self.state {
            KvsState::Idle => {
                if let Some(request) = LatchedRequest::sample(inputs) {
                    self.outputs.busy = true;
                    if request.kind.is_read() {
                        self.outputs.valid = false;
                    }
                    self.state = KvsState::Latched(request.to_inputs());
                }
            }
            KvsState::Latched(latched) => {
                self.inner.clock_edge(&latched);
                self.state = KvsState::Running(latched);
            }
            KvsState::Running(latched) => {
                let out = self.inner.clock_edge(&latched);
                if !out.busy {
                    if latched.lookup {
                        self.outputs.valid = out.valid;
                        self.outputs.value = out.value;
                    }
                    self.outputs.busy = false;
                    self.state = KvsState::Holding;
                }
            }
            KvsState::Holding => {
                if !inputs.has_request() {
                    // Release the inner core with an idle edge.
                    self.inner.clock_edge(&InputLines::default());
                    self.state = KvsState::Idle;
                }
            }
        }
        self.outputs
    }

    fn occupancy(&self) -> usize {
        self.inner.occupancy()
    }

    fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}
