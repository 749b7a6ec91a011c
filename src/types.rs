//! Core type definitions for the simulation bridge.
//!
//! This module defines the fundamental scalar types shared by the context,
//! the model instances, the trace recorder and the transaction driver.

/// Simulation time unit (nanoseconds of simulated time).
///
/// Every clock edge and every trace snapshot is stamped with a `SimTime`
/// taken from the shared [`SimContext`](crate::context::SimContext), giving
/// all model instances a unified timeline.
pub type SimTime = u64;

/// A 32-bit data word as carried on the `ins_key`, `ins_value`, `key`,
/// `mod_value` and `value` lines.
pub type Word = u32;

/// Key operand of a transaction.
pub type Key = Word;

/// Value operand or result of a transaction.
pub type Value = Word;

/// Number of clock cycles.
pub type Cycles = u64;

/// Default clock period: one low and one high phase of 1 ns each.
pub const DEFAULT_CLOCK_PERIOD: SimTime = 2;

/// Shortest clock period with distinct high and low phases.
pub const MIN_CLOCK_PERIOD: SimTime = 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_aliases() {
        let time: SimTime = 1000;
        let key: Key = 42;
        let value: Value = u32::MAX;
        let cycles: Cycles = 7;

        assert_eq!(time, 1000);
        assert_eq!(key, 42);
        assert_eq!(value, 0xFFFF_FFFF);
        assert_eq!(cycles, 7);
        assert_eq!(DEFAULT_CLOCK_PERIOD % 2, 0);
    }
}
