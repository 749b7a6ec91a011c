//! Hash-map core.
//!
//! An open-addressing table with linear probing. The core accepts one
//! request per transaction, then examines one slot per clock edge until the
//! key is found, an empty slot ends the probe sequence, or the whole table
//! has been visited. `busy` is high from the accepting edge until the edge
//! on which the result becomes visible, so it is always held for at least
//! one full cycle.
//!
//! After completing, the core holds its outputs until every request line is
//! low again; only then does it accept the next request.

use crate::cores::{HardwareCore, LatchedRequest};
use crate::signal::{InputLines, OutputLines, RequestKind};
use crate::types::{Key, Value};

/// Multiplier for the Fibonacci hash of keys.
const GOLDEN_RATIO_32: u32 = 0x9E37_79B1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    Empty,
    Tombstone,
    Occupied { key: Key, value: Value },
}

/// An in-flight probe sequence.
#[derive(Clone, Copy, Debug)]
struct Probe {
    request: LatchedRequest,
    index: usize,
    probes: usize,
    first_free: Option<usize>,
}

#[derive(Clone, Copy, Debug)]
enum CoreState {
    Idle,
    Probing(Probe),
    Holding,
}

/// Open-addressing hash-map core.
#[derive(Debug)]
pub struct HashMapCore {
    table: Vec<Slot>,
    mask: usize,
    state: CoreState,
    outputs: OutputLines,
    occupied: usize,
    dropped_inserts: u64,
}

impl HashMapCore {
    /// Default number of slots.
    pub const DEFAULT_CAPACITY: usize = 1 << 15;

    /// Creates a core with `capacity` slots, rounded up to a power of two.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        Self {
            table: vec![Slot::Empty; capacity],
            mask: capacity - 1,
            state: CoreState::Idle,
            outputs: OutputLines::default(),
            occupied: 0,
            dropped_inserts: 0,
        }
    }

    /// Number of inserts discarded because no slot was free.
    pub fn dropped_inserts(&self) -> u64 {
        self.dropped_inserts
    }

    /// Returns true while a probe sequence is running.
    pub fn is_probing(&self) -> bool {
        matches!(self.state, CoreState::Probing(_))
    }

    fn home_slot(&self, key: Key) -> usize {
        let h = key.wrapping_mul(GOLDEN_RATIO_32);
        (h ^ (h >> 16)) as usize & self.mask
    }

    fn accept(&mut self, request: LatchedRequest) {
        self.outputs.busy = true;
        if request.kind.is_read() {
            self.outputs.valid = false;
        }
        self.state = CoreState::Probing(Probe {
            request,
            index: self.home_slot(request.key),
            probes: 0,
            first_free: None,
        });
    }

    fn probe(&mut self, mut probe: Probe) {
        match self.table[probe.index] {
            Slot::Occupied { key, value } if key == probe.request.key => {
                self.complete_found(probe, value);
                return;
            }
            Slot::Empty => {
                let free = probe.first_free.unwrap_or(probe.index);
                self.complete_absent(probe.request, Some(free));
                return;
            }
            Slot::Tombstone => {
                probe.first_free.get_or_insert(probe.index);
            }
            Slot::Occupied { .. } => {}
        }

        probe.probes += 1;
        if probe.probes >= self.table.len() {
            self.complete_absent(probe.request, probe.first_free);
        } else {
            probe.index = (probe.index + 1) & self.mask;
            self.state = CoreState::Probing(probe);
        }
    }

    fn complete_found(&mut self, probe: Probe, stored: Value) {
        let request = probe.request;
        match request.kind {
            RequestKind::Insert | RequestKind::Modify => {
                self.table[probe.index] = Slot::Occupied {
                    key: request.key,
                    value: request.value,
                };
            }
            RequestKind::Lookup => {
                self.outputs.valid = true;
                self.outputs.value = stored;
            }
            RequestKind::Delete => {
                self.table[probe.index] = Slot::Tombstone;
                self.occupied -= 1;
            }
        }
        self.finish();
    }

    fn complete_absent(&mut self, request: LatchedRequest, free: Option<usize>) {
        match request.kind {
            RequestKind::Insert => match free {
                Some(index) => {
                    self.table[index] = Slot::Occupied {
                        key: request.key,
                        value: request.value,
                    };
                    self.occupied += 1;
                }
                None => {
                    self.dropped_inserts += 1;
                    tracing::warn!(
                        key = request.key,
                        capacity = self.table.len(),
                        "Hash-map core full, insert dropped"
                    );
                }
            },
            RequestKind::Lookup => self.outputs.valid = false,
            RequestKind::Modify | RequestKind::Delete => {}
        }
        self.finish();
    }

    fn finish(&mut self) {
        self.outputs.busy = false;
        self.state = CoreState::Holding;
    }
}

impl Default for HashMapCore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl HardwareCore for HashMapCore {
    fn name(&self) -> &'static str {
        "hashmap"
    }

    fn reset(&mut self) {
        self.table.fill(Slot::Empty);
        self.state = CoreState::Idle;
        self.outputs = OutputLines::default();
        self.occupied = 0;
        self.dropped_inserts = 0;
    }

    fn clock_edge(&mut self, inputs: &InputLines) -> OutputLines {
        match self.state {
            CoreState::Idle => {
                if let Some(request) = LatchedRequest::sample(inputs) {
                    self.accept(request);
                }
            }
            CoreState::Probing(probe) => self.probe(probe),
            CoreState::Holding => {
                if !inputs.has_request() {
                    self.state = CoreState::Idle;
                }
            }
        }
        self.outputs
    }

    fn occupancy(&self) -> usize {
        self.occupied
    }

    fn capacity(&self) -> usize {
        self.table.len()
    }
}
