//! Signal lines and the `SignalPort` trait.
//!
//! A model instance talks to the outside world only through a fixed set of
//! named, fixed-width lines. Inputs are set by the caller and become
//! effective on the next clock edge; outputs are updated by the model on
//! each edge.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{SimError, SimResult};
use crate::types::Word;

/// Direction of a signal line, seen from the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Driven by the caller
    Input,
    /// Driven by the model
    Output,
}

/// Every line of the key/value store signal contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalLine {
    Clk,
    Insert,
    InsKey,
    InsValue,
    Lookup,
    Key,
    Modify,
    ModValue,
    Del,
    Busy,
    Valid,
    Value,
}

impl SignalLine {
    /// All lines in contract order. Waveform dumps use this order.
    pub const ALL: [SignalLine; 12] = [
        SignalLine::Clk,
        SignalLine::Insert,
        SignalLine::InsKey,
        SignalLine::InsValue,
        SignalLine::Lookup,
        SignalLine::Key,
        SignalLine::Modify,
        SignalLine::ModValue,
        SignalLine::Del,
        SignalLine::Busy,
        SignalLine::Valid,
        SignalLine::Value,
    ];

    /// The line's name as it appears in the hardware description.
    pub fn name(self) -> &'static str {
        match self {
            SignalLine::Clk => "clk",
            SignalLine::Insert => "insert",
            SignalLine::InsKey => "ins_key",
            SignalLine::InsValue => "ins_value",
            SignalLine::Lookup => "lookup",
            SignalLine::Key => "key",
            SignalLine::Modify => "modify",
            SignalLine::ModValue => "mod_value",
            SignalLine::Del => "del",
            SignalLine::Busy => "busy",
            SignalLine::Valid => "valid",
            SignalLine::Value => "value",
        }
    }

    /// Width of the line in bits.
    pub fn width(self) -> u32 {
        match self {
            SignalLine::InsKey
            | SignalLine::InsValue
            | SignalLine::Key
            | SignalLine::ModValue
            | SignalLine::Value => 32,
            _ => 1,
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            SignalLine::Busy | SignalLine::Valid | SignalLine::Value => Direction::Output,
            _ => Direction::Input,
        }
    }

    /// Bit mask covering the line's width.
    pub fn mask(self) -> Word {
        if self.width() >= 32 {
            Word::MAX
        } else {
            (1 << self.width()) - 1
        }
    }

    /// Looks a line up by its hardware name.
    pub fn from_name(name: &str) -> Option<SignalLine> {
        Self::ALL.iter().copied().find(|line| line.name() == name)
    }
}

impl fmt::Display for SignalLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The four request lines a transaction can assert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Insert,
    Lookup,
    Modify,
    Delete,
}

impl RequestKind {
    /// All request kinds, in the priority order the cores accept them.
    pub const ALL: [RequestKind; 4] = [
        RequestKind::Insert,
        RequestKind::Lookup,
        RequestKind::Modify,
        RequestKind::Delete,
    ];

    /// The request line this kind asserts.
    pub fn line(self) -> SignalLine {
        match self {
            RequestKind::Insert => SignalLine::Insert,
            RequestKind::Lookup => SignalLine::Lookup,
            RequestKind::Modify => SignalLine::Modify,
            RequestKind::Delete => SignalLine::Del,
        }
    }

    /// Whether the transaction produces a `valid`/`value` result.
    pub fn is_read(self) -> bool {
        matches!(self, RequestKind::Lookup)
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestKind::Insert => "insert",
            RequestKind::Lookup => "lookup",
            RequestKind::Modify => "modify",
            RequestKind::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Caller-driven input lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputLines {
    pub clk: bool,
    pub insert: bool,
    pub ins_key: Word,
    pub ins_value: Word,
    pub lookup: bool,
    pub key: Word,
    pub modify: bool,
    pub mod_value: Word,
    pub del: bool,
}

impl InputLines {
    /// Returns the request kinds whose lines are currently asserted.
    pub fn asserted_requests(&self) -> Vec<RequestKind> {
        RequestKind::ALL
            .iter()
            .copied()
            .filter(|kind| self.request(*kind))
            .collect()
    }

    /// Returns true if any request line is asserted.
    pub fn has_request(&self) -> bool {
        self.insert || self.lookup || self.modify || self.del
    }

    /// Returns the level of one request line.
    pub fn request(&self, kind: RequestKind) -> bool {
        match kind {
            RequestKind::Insert => self.insert,
            RequestKind::Lookup => self.lookup,
            RequestKind::Modify => self.modify,
            RequestKind::Delete => self.del,
        }
    }

    /// Drives one request line.
    pub fn set_request(&mut self, kind: RequestKind, level: bool) {
        match kind {
            RequestKind::Insert => self.insert = level,
            RequestKind::Lookup => self.lookup = level,
            RequestKind::Modify => self.modify = level,
            RequestKind::Delete => self.del = level,
        }
    }

    /// Deasserts every request line, leaving operands untouched.
    pub fn clear_requests(&mut self) {
        self.insert = false;
        self.lookup = false;
        self.modify = false;
        self.del = false;
    }
}

/// Model-driven output lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLines {
    pub busy: bool,
    pub valid: bool,
    pub value: Word,
}

/// A full snapshot of every line of one model instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalState {
    pub inputs: InputLines,
    pub outputs: OutputLines,
}

impl SignalState {
    /// Reads any line as a word (1-bit lines read as 0 or 1).
    pub fn get(&self, line: SignalLine) -> Word {
        let i = &self.inputs;
        let o = &self.outputs;
        match line {
            SignalLine::Clk => i.clk as Word,
            SignalLine::Insert => i.insert as Word,
            SignalLine::InsKey => i.ins_key,
            SignalLine::InsValue => i.ins_value,
            SignalLine::Lookup => i.lookup as Word,
            SignalLine::Key => i.key,
            SignalLine::Modify => i.modify as Word,
            SignalLine::ModValue => i.mod_value,
            SignalLine::Del => i.del as Word,
            SignalLine::Busy => o.busy as Word,
            SignalLine::Valid => o.valid as Word,
            SignalLine::Value => o.value,
        }
    }
}

/// The typed get/set surface of a model instance.
///
/// Implementors only expose their input and output records; the typed
/// accessors are provided. Writes take effect on the next clock edge.
pub trait SignalPort {
    /// Current input levels.
    fn inputs(&self) -> &InputLines;

    /// Mutable access to the input levels.
    fn inputs_mut(&mut self) -> &mut InputLines;

    /// Output levels published by the last clock edge.
    fn outputs(&self) -> OutputLines;

    /// Snapshot of every line.
    fn signal_state(&self) -> SignalState {
        SignalState {
            inputs: *self.inputs(),
            outputs: self.outputs(),
        }
    }

    /// Reads any line.
    fn peek(&self, line: SignalLine) -> Word {
        self.signal_state().get(line)
    }

    /// Drives an input line, masking the value to the line width.
    ///
    /// Fails with `InvalidRequest` for output lines.
    fn poke(&mut self, line: SignalLine, value: Word) -> SimResult<()> {
        let value = value & line.mask();
        let bit = value != 0;
        let inputs = self.inputs_mut();
        match line {
            SignalLine::Clk => inputs.clk = bit,
            SignalLine::Insert => inputs.insert = bit,
            SignalLine::InsKey => inputs.ins_key = value,
            SignalLine::InsValue => inputs.ins_value = value,
            SignalLine::Lookup => inputs.lookup = bit,
            SignalLine::Key => inputs.key = value,
            SignalLine::Modify => inputs.modify = bit,
            SignalLine::ModValue => inputs.mod_value = value,
            SignalLine::Del => inputs.del = bit,
            SignalLine::Busy | SignalLine::Valid | SignalLine::Value => {
                return Err(SimError::InvalidRequest(format!(
                    "cannot drive output line `{}`",
                    line
                )));
            }
        }
        Ok(())
    }

    fn set_insert(&mut self, level: bool) {
        self.inputs_mut().insert = level;
    }

    fn set_ins_key(&mut self, key: Word) {
        self.inputs_mut().ins_key = key;
    }

    fn set_ins_value(&mut self, value: Word) {
        self.inputs_mut().ins_value = value;
    }

    fn set_lookup(&mut self, level: bool) {
        self.inputs_mut().lookup = level;
    }

    fn set_key(&mut self, key: Word) {
        self.inputs_mut().key = key;
    }

    fn set_modify(&mut self, level: bool) {
        self.inputs_mut().modify = level;
    }

    fn set_mod_value(&mut self, value: Word) {
        self.inputs_mut().mod_value = value;
    }

    fn set_del(&mut self, level: bool) {
        self.inputs_mut().del = level;
    }

    fn busy(&self) -> bool {
        self.outputs().busy
    }

    fn valid(&self) -> bool {
        self.outputs().valid
    }

    fn value(&self) -> Word {
        self.outputs().value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Lines {
        inputs: InputLines,
        outputs: OutputLines,
    }

    impl SignalPort for Lines {
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

    #[test]
    fn test_line_table() {
        assert_eq!(SignalLine::ALL.len(), 12);
        let outputs: Vec<_> = SignalLine::ALL
            .iter()
            .filter(|l| l.direction() == Direction::Output)
            .map(|l| l.name())
            .collect();
        assert_eq!(outputs, vec!["busy", "valid", "value"]);
        assert_eq!(SignalLine::InsKey.width(), 32);
        assert_eq!(SignalLine::Del.width(), 1);
        assert_eq!(SignalLine::Del.mask(), 1);
        assert_eq!(SignalLine::Value.mask(), u32::MAX);
        assert_eq!(SignalLine::from_name("mod_value"), Some(SignalLine::ModValue));
        assert_eq!(SignalLine::from_name("nope"), None);
    }

    #[test]
    fn test_asserted_requests() {
        let mut inputs = InputLines::default();
        assert!(!inputs.has_request());

        inputs.set_request(RequestKind::Lookup, true);
        inputs.set_request(RequestKind::Delete, true);
        assert_eq!(
            inputs.asserted_requests(),
            vec![RequestKind::Lookup, RequestKind::Delete]
        );

        inputs.clear_requests();
        assert!(inputs.asserted_requests().is_empty());
    }

    #[test]
    fn test_poke_and_peek() {
        let mut port = Lines::default();
        port.poke(SignalLine::Key, 0xDEAD_BEEF).unwrap();
        port.poke(SignalLine::Lookup, 7).unwrap();

        assert_eq!(port.peek(SignalLine::Key), 0xDEAD_BEEF);
        assert_eq!(port.peek(SignalLine::Lookup), 1);
        assert!(port.inputs().lookup);

        let err = port.poke(SignalLine::Busy, 1).unwrap_err();
        assert!(matches!(err, SimError::InvalidRequest(_)));
    }

    #[test]
    fn test_typed_accessors() {
        let mut port = Lines::default();
        port.set_insert(true);
        port.set_ins_key(5);
        port.set_ins_value(9);
        assert_eq!(port.inputs().asserted_requests(), vec![RequestKind::Insert]);

        port.outputs = OutputLines {
            busy: true,
            valid: false,
            value: 3,
        };
        assert!(port.busy());
        assert!(!port.valid());
        assert_eq!(port.value(), 3);
        assert_eq!(port.signal_state().get(SignalLine::InsValue), 9);
    }

    #[test]
    fn test_request_kind_lines() {
        assert_eq!(RequestKind::Delete.line(), SignalLine::Del);
        assert!(RequestKind::Lookup.is_read());
        assert!(!RequestKind::Modify.is_read());
        assert_eq!(RequestKind::Modify.to_string(), "modify");
    }
}
