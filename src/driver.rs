//! Transaction driver.
//!
//! The `TransactionDriver` carries one request at a time through the
//! busy/valid handshake of a [`ClockedModel`]:
//!
//! ```text
//! Idle --begin--> RequestAsserted --step--> WaitingOnBusy --busy==0--> ResultReady --step--> Idle
//!                                               |    ^
//!                                               +----+ busy==1: step again
//!                                               |
//!                                               +--cycle bound hit--> Indeterminate --reset--> Idle
//! ```
//!
//! The driver is generic over the model, so the hash-map core, the kvs core
//! and any other implementation of the signal contract share one protocol.
//!
//! # Example
//!
//! ```
//! use kvsim::{ModelInstance, ModelVariant, SimContext, TransactionDriver};
//!
//! let ctx = SimContext::create();
//! let model = ModelInstance::create(&ctx, ModelVariant::HashMap);
//! let mut driver = TransactionDriver::new(model).with_max_cycles(Some(1_000));
//!
//! driver.insert(1, 100).unwrap();
//! assert_eq!(driver.lookup(1).unwrap(), Some(100));
//! assert_eq!(driver.lookup(2).unwrap(), None);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::model::ClockedModel;
use crate::signal::{InputLines, RequestKind};
use crate::types::{Cycles, Key, SimTime, Value};

/// A host-side request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Request {
    Insert { key: Key, value: Value },
    Lookup { key: Key },
    Modify { key: Key, value: Value },
    Delete { key: Key },
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::Insert { .. } => RequestKind::Insert,
            Request::Lookup { .. } => RequestKind::Lookup,
            Request::Modify { .. } => RequestKind::Modify,
            Request::Delete { .. } => RequestKind::Delete,
        }
    }

    pub fn key(&self) -> Key {
        match *self {
            Request::Insert { key, .. }
            | Request::Lookup { key }
            | Request::Modify { key, .. }
            | Request::Delete { key } => key,
        }
    }

    /// Builds a request from raw input lines.
    ///
    /// Exactly one request line must be asserted; its operands are taken
    /// from the matching operand lines.
    pub fn from_lines(lines: &InputLines) -> SimResult<Self> {
        let asserted = lines.asserted_requests();
        match asserted.as_slice() {
            [] => Err(SimError::InvalidRequest(
                "no request line asserted".to_string(),
            )),
            [kind] => Ok(match kind {
                RequestKind::Insert => Request::Insert {
                    key: lines.ins_key,
                    value: lines.ins_value,
                },
                RequestKind::Lookup => Request::Lookup { key: lines.key },
                RequestKind::Modify => Request::Modify {
                    key: lines.key,
                    value: lines.mod_value,
                },
                RequestKind::Delete => Request::Delete { key: lines.key },
            }),
            many => Err(SimError::InvalidRequest(format!(
                "conflicting request lines asserted: {}",
                many.iter()
                    .map(|k| k.line().name())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    /// Drives the operand lines and the request line on `inputs`.
    fn assert_on(&self, inputs: &mut InputLines) {
        match *self {
            Request::Insert { key, value } => {
                inputs.ins_key = key;
                inputs.ins_value = value;
            }
            Request::Lookup { key } | Request::Delete { key } => inputs.key = key,
            Request::Modify { key, value } => {
                inputs.key = key;
                inputs.mod_value = value;
            }
        }
        inputs.set_request(self.kind(), true);
    }
}

/// Protocol state of the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverState {
    /// No request line asserted
    Idle,
    /// Request and operands driven, first edge not yet taken
    RequestAsserted(RequestKind),
    /// Stepping until `busy` deasserts
    WaitingOnBusy(RequestKind),
    /// `busy` deasserted, result being sampled
    ResultReady(RequestKind),
    /// A transaction was abandoned mid-flight; the model needs a reset
    Indeterminate,
}

/// Result of a completed transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutcome {
    pub request: Request,
    /// For lookups: `Some(value)` if `valid` was high, `None` if the key was
    /// absent. Always `None` for other requests.
    pub result: Option<Value>,
    /// Clock edges from assertion to return to `Idle`, inclusive of the
    /// deassertion edge
    pub cycles: Cycles,
    /// Edges on which `busy` was observed high
    pub busy_cycles: Cycles,
    /// Time of the first edge of the transaction
    pub started_at: SimTime,
    /// Time of the deassertion edge
    pub completed_at: SimTime,
}

/// Counters kept by the driver across transactions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverStats {
    pub inserts: u64,
    pub lookups: u64,
    pub lookup_hits: u64,
    pub lookup_misses: u64,
    pub modifies: u64,
    pub deletes: u64,
    /// Clock edges taken inside transactions
    pub transaction_cycles: Cycles,
    /// Clock edges taken by `idle`
    pub idle_cycles: Cycles,
    /// Longest single transaction in cycles
    pub max_transaction_cycles: Cycles,
    pub rejected: u64,
    pub timeouts: u64,
}

impl DriverStats {
    /// Completed transactions of any kind.
    pub fn transactions(&self) -> u64 {
        self.inserts + self.lookups + self.modifies + self.deletes
    }

    fn record(&mut self, outcome: &TransactionOutcome) {
        match outcome.request.kind() {
            RequestKind::Insert => self.inserts += 1,
            RequestKind::Lookup => {
                self.lookups += 1;
                if outcome.result.is_some() {
                    self.lookup_hits += 1;
                } else {
                    self.lookup_misses += 1;
                }
            }
            RequestKind::Modify => self.modifies += 1,
            RequestKind::Delete => self.deletes += 1,
        }
        self.transaction_cycles += outcome.cycles;
        self.max_transaction_cycles = self.max_transaction_cycles.max(outcome.cycles);
    }
}

#[derive(Clone, Copy, Debug)]
struct InFlight {
    request: Request,
    cycles: Cycles,
    busy_cycles: Cycles,
    started_at: SimTime,
}

/// Drives insert / lookup / modify / delete transactions on a model.
pub struct TransactionDriver<M: ClockedModel> {
    model: M,
    state: DriverState,
    in_flight: Option<InFlight>,
    max_cycles: Option<Cycles>,
    stats: DriverStats,
}

impl<M: ClockedModel> TransactionDriver<M> {
    /// Creates a driver with no cycle bound.
    pub fn new(model: M) -> Self {
        Self {
            model,
            state: DriverState::Idle,
            in_flight: None,
            max_cycles: None,
            stats: DriverStats::default(),
        }
    }

    /// Bounds how many edges a transaction may wait on `busy`.
    ///
    /// `None` waits forever. Exceeding the bound fails with
    /// `SimulationTimeout` and leaves the driver `Indeterminate`.
    pub fn with_max_cycles(mut self, max_cycles: Option<Cycles>) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    pub fn max_cycles(&self) -> Option<Cycles> {
        self.max_cycles
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Mutable access to the model, e.g. for attaching a trace recorder or
    /// poking lines directly. Lines left asserted here make the next
    /// transaction fail with `InvalidRequest`.
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    /// Resets the model and returns the driver to `Idle`.
    pub fn reset(&mut self) {
        self.model.reset();
        self.state = DriverState::Idle;
        self.in_flight = None;
        tracing::debug!("Transaction driver reset");
    }

    /// Asserts `request` and takes the first clock edge.
    ///
    /// Fails with `InvalidRequest`, without touching any input line, if the
    /// driver is not `Idle` or a request line is already asserted on the
    /// model.
    pub fn begin(&mut self, request: Request) -> SimResult<()> {
        if self.state != DriverState::Idle {
            return self.reject(format!(
                "{} issued while driver is {:?}",
                request.kind(),
                self.state
            ));
        }
        let asserted = self.model.inputs().asserted_requests();
        if !asserted.is_empty() {
            return self.reject(format!(
                "{} issued while request line(s) already asserted: {}",
                request.kind(),
                asserted
                    .iter()
                    .map(|k| k.line().name())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        let kind = request.kind();
        request.assert_on(self.model.inputs_mut());
        self.state = DriverState::RequestAsserted(kind);
        tracing::debug!(request = ?request, "Request asserted");

        let started_at = self.model.step();
        self.in_flight = Some(InFlight {
            request,
            cycles: 1,
            busy_cycles: 0,
            started_at,
        });
        self.state = DriverState::WaitingOnBusy(kind);
        Ok(())
    }

    /// Samples `busy` and advances the transaction by one edge.
    ///
    /// Returns `Ok(None)` while the model is busy and the outcome once the
    /// driver is back in `Idle`.
    pub fn poll(&mut self) -> SimResult<Option<TransactionOutcome>> {
        let kind = match self.state {
            DriverState::WaitingOnBusy(kind) => kind,
            other => {
                return Err(SimError::InvalidRequest(format!(
                    "poll called while driver is {:?}",
                    other
                )))
            }
        };
        let Some(mut in_flight) = self.in_flight else {
            return Err(SimError::InvalidRequest(
                "no transaction in flight".to_string(),
            ));
        };

        if self.model.busy() {
            in_flight.busy_cycles += 1;
            if let Some(max) = self.max_cycles {
                if in_flight.cycles >= max {
                    self.state = DriverState::Indeterminate;
                    self.in_flight = None;
                    self.stats.timeouts += 1;
                    tracing::warn!(
                        request = %kind,
                        cycles = in_flight.cycles,
                        "Transaction timed out with busy asserted"
                    );
                    return Err(SimError::SimulationTimeout {
                        request: kind,
                        cycles: in_flight.cycles,
                    });
                }
            }
            self.model.step();
            in_flight.cycles += 1;
            self.in_flight = Some(in_flight);
            return Ok(None);
        }

        self.state = DriverState::ResultReady(kind);
        let result = if kind.is_read() && self.model.valid() {
            Some(self.model.value())
        } else {
            None
        };

        self.model.inputs_mut().set_request(kind, false);
        let completed_at = self.model.step();
        in_flight.cycles += 1;

        let outcome = TransactionOutcome {
            request: in_flight.request,
            result,
            cycles: in_flight.cycles,
            busy_cycles: in_flight.busy_cycles,
            started_at: in_flight.started_at,
            completed_at,
        };
        self.stats.record(&outcome);
        self.in_flight = None;
        self.state = DriverState::Idle;

        tracing::debug!(
            request = %kind,
            cycles = outcome.cycles,
            result = ?outcome.result,
            "Transaction complete"
        );
        Ok(Some(outcome))
    }

    /// Runs `request` to completion.
    pub fn execute(&mut self, request: Request) -> SimResult<TransactionOutcome> {
        self.begin(request)?;
        loop {
            if let Some(outcome) = self.poll()? {
                return Ok(outcome);
            }
        }
    }

    /// Runs the request encoded by raw input lines.
    ///
    /// Anything other than exactly one asserted request line is rejected
    /// before an input line is touched.
    pub fn submit_lines(&mut self, lines: &InputLines) -> SimResult<TransactionOutcome> {
        let request = match Request::from_lines(lines) {
            Ok(request) => request,
            Err(e) => {
                self.stats.rejected += 1;
                return Err(e);
            }
        };
        self.execute(request)
    }

    pub fn insert(&mut self, key: Key, value: Value) -> SimResult<()> {
        self.execute(Request::Insert { key, value }).map(|_| ())
    }

    /// Looks `key` up. `Ok(None)` means the key is absent.
    pub fn lookup(&mut self, key: Key) -> SimResult<Option<Value>> {
        self.execute(Request::Lookup { key }).map(|o| o.result)
    }

    pub fn modify(&mut self, key: Key, value: Value) -> SimResult<()> {
        self.execute(Request::Modify { key, value }).map(|_| ())
    }

    pub fn delete(&mut self, key: Key) -> SimResult<()> {
        self.execute(Request::Delete { key }).map(|_| ())
    }

    /// Takes `cycles` clock edges with no request asserted.
    pub fn idle(&mut self, cycles: Cycles) -> SimResult<()> {
        if self.state != DriverState::Idle {
            return self.reject(format!("idle requested while driver is {:?}", self.state));
        }
        for _ in 0..cycles {
            self.model.step();
        }
        self.stats.idle_cycles += cycles;
        Ok(())
    }

    fn reject<T>(&mut self, reason: String) -> SimResult<T> {
        self.stats.rejected += 1;
        tracing::debug!(reason = %reason, "Request rejected");
        Err(SimError::InvalidRequest(reason))
    }
}

impl<M: ClockedModel + std::fmt::Debug> std::fmt::Debug for TransactionDriver<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionDriver")
            .field("model", &self.model)
            .field("state", &self.state)
            .field("max_cycles", &self.max_cycles)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimContext;
    use crate::cores::ModelVariant;
    use crate::model::ModelInstance;
    use crate::signal::{OutputLines, SignalPort};

    fn driver(variant: ModelVariant) -> TransactionDriver<ModelInstance> {
        let ctx = SimContext::create();
        TransactionDriver::new(ModelInstance::with_capacity(&ctx, variant, Some(64)))
            .with_max_cycles(Some(1_000))
    }

    /// A model that raises busy on request and never lowers it.
    #[derive(Default)]
    struct StuckModel {
        inputs: InputLines,
        outputs: OutputLines,
        cycles: Cycles,
    }

    impl SignalPort for StuckModel {
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

    impl ClockedModel for StuckModel {
        fn step(&mut self) -> SimTime {
            if self.inputs.has_request() {
                self.outputs.busy = true;
            }
            self.cycles += 1;
            self.cycles
        }

        fn reset(&mut self) {
            *self = Self::default();
        }

        fn cycles(&self) -> Cycles {
            self.cycles
        }

        fn now(&self) -> SimTime {
            self.cycles
        }
    }

    #[test]
    fn test_request_from_lines() {
        let mut lines = InputLines::default();
        assert!(Request::from_lines(&lines).is_err());

        lines.modify = true;
        lines.key = 5;
        lines.mod_value = 10;
        assert_eq!(
            Request::from_lines(&lines).unwrap(),
            Request::Modify { key: 5, value: 10 }
        );

        lines.insert = true;
        let err = Request::from_lines(&lines).unwrap_err();
        assert!(err.to_string().contains("insert, modify"));
    }

    #[test]
    fn test_request_serde() {
        let req: Request = serde_json::from_str(r#"{"op":"insert","key":1,"value":2}"#).unwrap();
        assert_eq!(req, Request::Insert { key: 1, value: 2 });
        assert_eq!(req.kind(), RequestKind::Insert);
        assert_eq!(req.key(), 1);
    }

    #[test]
    fn test_state_sequence() {
        let mut driver = driver(ModelVariant::HashMap);
        assert_eq!(driver.state(), DriverState::Idle);

        driver.begin(Request::Insert { key: 1, value: 2 }).unwrap();
        assert_eq!(driver.state(), DriverState::WaitingOnBusy(RequestKind::Insert));
        assert!(driver.model().busy());

        let outcome = loop {
            if let Some(outcome) = driver.poll().unwrap() {
                break outcome;
            }
        };
        assert_eq!(driver.state(), DriverState::Idle);
        assert!(!driver.model().inputs().has_request());
        assert!(outcome.busy_cycles >= 1);
        assert!(outcome.completed_at > outcome.started_at);
        assert_eq!(outcome.result, None);
    }

    #[test]
    fn test_begin_rejects_when_not_idle() {
        let mut driver = driver(ModelVariant::Kvs);
        driver.begin(Request::Lookup { key: 1 }).unwrap();
        let before = *driver.model().inputs();

        let err = driver.begin(Request::Delete { key: 2 }).unwrap_err();
        assert!(matches!(err, SimError::InvalidRequest(_)));
        assert_eq!(*driver.model().inputs(), before);
        assert_eq!(driver.stats().rejected, 1);
    }

    #[test]
    fn test_begin_rejects_stray_request_line() {
        let mut driver = driver(ModelVariant::HashMap);
        driver.model_mut().set_del(true);

        let err = driver.insert(1, 1).unwrap_err();
        assert!(err.to_string().contains("del"));
        assert!(!driver.model().inputs().insert);
        assert_eq!(driver.model().cycles(), 0);
    }

    #[test]
    fn test_poll_requires_transaction() {
        let mut driver = driver(ModelVariant::HashMap);
        assert!(matches!(driver.poll(), Err(SimError::InvalidRequest(_))));
    }

    #[test]
    fn test_timeout_then_reset() {
        let mut driver = TransactionDriver::new(StuckModel::default()).with_max_cycles(Some(8));

        let err = driver.lookup(1).unwrap_err();
        match err {
            SimError::SimulationTimeout { request, cycles } => {
                assert_eq!(request, RequestKind::Lookup);
                assert_eq!(cycles, 8);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(driver.state(), DriverState::Indeterminate);
        assert_eq!(driver.stats().timeouts, 1);

        assert!(matches!(driver.insert(1, 1), Err(SimError::InvalidRequest(_))));
        assert!(matches!(driver.idle(1), Err(SimError::InvalidRequest(_))));

        driver.reset();
        assert_eq!(driver.state(), DriverState::Idle);
        assert!(!driver.model().inputs().has_request());
    }

    #[test]
    fn test_idle_steps_without_request() {
        let mut driver = driver(ModelVariant::HashMap);
        driver.idle(4).unwrap();
        assert_eq!(driver.model().cycles(), 4);
        assert_eq!(driver.stats().idle_cycles, 4);
        assert_eq!(driver.stats().transactions(), 0);
    }

    #[test]
    fn test_stats() {
        let mut driver = driver(ModelVariant::HashMap);
        driver.insert(1, 1).unwrap();
        driver.lookup(1).unwrap();
        driver.lookup(2).unwrap();
        driver.modify(1, 3).unwrap();
        driver.delete(1).unwrap();

        let stats = driver.stats();
        assert_eq!(stats.transactions(), 5);
        assert_eq!(stats.lookup_hits, 1);
        assert_eq!(stats.lookup_misses, 1);
        assert_eq!(stats.transaction_cycles, driver.model().cycles());
        assert!(stats.max_transaction_cycles >= 3);
    }
}
