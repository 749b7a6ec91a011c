//! Workloads that drive a model through the transaction driver.
//!
//! Every workload keeps its own record of what the store should contain and
//! checks each lookup against it. A disagreement ends the run with
//! [`SimError::Mismatch`].

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::config::{ScriptStep, WorkloadConfig};
use crate::driver::TransactionDriver;
use crate::error::{SimError, SimResult};
use crate::model::ClockedModel;
use crate::types::{Key, Value};

/// Number of recently touched keys remembered by the randomized workload.
pub const RECENT_KEYS: usize = 100;

/// Counters reported by a finished workload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadReport {
    /// Workload kind (`fill`, `random` or `script`)
    pub kind: String,
    pub lookups_checked: u64,
    pub lookups_matched: u64,
    pub modifications: u64,
    pub deletes: u64,
    pub idles: u64,
    pub recents: u64,
    pub inserts: u64,
}

impl WorkloadReport {
    fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            ..Self::default()
        }
    }

    /// Compares a lookup result with the expected one.
    fn check(&mut self, key: Key, expected: Option<Value>, observed: Option<Value>) -> SimResult<()> {
        self.lookups_checked += 1;
        if expected != observed {
            tracing::error!(key, ?expected, ?observed, "Lookup mismatch");
            return Err(SimError::Mismatch {
                key,
                expected,
                observed,
            });
        }
        if expected.is_some() {
            self.lookups_matched += 1;
        }
        Ok(())
    }
}

/// A sequence of transactions run to completion against one model.
pub trait Workload {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Runs the workload, returning its counters.
    fn run<M: ClockedModel>(&mut self, driver: &mut TransactionDriver<M>) -> SimResult<WorkloadReport>;
}

/// Inserts `key = i * i`, `value = i` for every `i < count`, then reads
/// every key back.
#[derive(Clone, Debug)]
pub struct FillWorkload {
    count: u32,
}

impl FillWorkload {
    pub fn new(count: u32) -> Self {
        Self { count }
    }

    fn key(i: u32) -> Key {
        i.wrapping_mul(i)
    }
}

impl Workload for FillWorkload {
    fn name(&self) -> &'static str {
        "fill"
    }

    fn run<M: ClockedModel>(&mut self, driver: &mut TransactionDriver<M>) -> SimResult<WorkloadReport> {
        let mut report = WorkloadReport::new(self.name());

        for i in 0..self.count {
            driver.insert(Self::key(i), i)?;
            report.inserts += 1;
        }
        tracing::info!(count = self.count, "Finished fill");

        for i in 0..self.count {
            let key = Self::key(i);
            let observed = driver.lookup(key)?;
            report.check(key, Some(i), observed)?;
        }
        tracing::info!(checked = report.lookups_checked, "Finished readback");

        Ok(report)
    }
}

/// Reference contents with O(1) random selection and removal.
#[derive(Debug, Default)]
struct ReferenceMap {
    entries: Vec<(Key, Value)>,
    index: HashMap<Key, usize>,
}

impl ReferenceMap {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get(&self, key: Key) -> Option<Value> {
        self.index.get(&key).map(|&i| self.entries[i].1)
    }

    fn contains(&self, key: Key) -> bool {
        self.index.contains_key(&key)
    }

    fn insert(&mut self, key: Key, value: Value) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    fn entry_at(&self, i: usize) -> (Key, Value) {
        self.entries[i]
    }

    fn set_at(&mut self, i: usize, value: Value) {
        self.entries[i].1 = value;
    }

    fn swap_remove_at(&mut self, i: usize) {
        let (key, _) = self.entries.swap_remove(i);
        self.index.remove(&key);
        if let Some(&(moved, _)) = self.entries.get(i) {
            self.index.insert(moved, i);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Operation {
    Idle,
    LookupPresent,
    LookupModify,
    LookupDelete,
    LookupAny,
    LookupRecent,
}

const WITHOUT_RECENT: &[Operation] = &[
    Operation::Idle,
    Operation::LookupPresent,
    Operation::LookupModify,
    Operation::LookupDelete,
    Operation::LookupAny,
];

const WITH_RECENT: &[Operation] = &[
    Operation::Idle,
    Operation::LookupPresent,
    Operation::LookupModify,
    Operation::LookupDelete,
    Operation::LookupAny,
    Operation::LookupRecent,
];

/// Seeded randomized stress against a reference map.
///
/// The store is first filled with `prefill` unique random keys. Each of the
/// following `operations` rounds picks one of: idle, lookup of a present key
/// (optionally followed by a modify or a delete of it), lookup of a random
/// key, lookup of a recently touched key. While the store holds fewer than
/// `prefill` keys, each round also inserts a fresh key on a coin flip.
#[derive(Debug)]
pub struct RandomWorkload {
    rng: StdRng,
    prefill: usize,
    operations: usize,
    reference: ReferenceMap,
    recents: VecDeque<Key>,
}

impl RandomWorkload {
    pub fn new(seed: u64, prefill: usize, operations: usize) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            prefill,
            operations,
            reference: ReferenceMap::default(),
            recents: VecDeque::with_capacity(RECENT_KEYS),
        }
    }

    fn fresh_key(&mut self) -> Key {
        loop {
            let key = self.rng.gen::<Key>();
            if !self.reference.contains(key) {
                return key;
            }
        }
    }

    fn touch(&mut self, key: Key) {
        while self.recents.len() >= RECENT_KEYS {
            self.recents.pop_front();
        }
        self.recents.push_back(key);
    }

    fn insert_fresh<M: ClockedModel>(&mut self, driver: &mut TransactionDriver<M>) -> SimResult<Key> {
        let key = self.fresh_key();
        let value = self.rng.gen::<Value>();
        driver.insert(key, value)?;
        self.reference.insert(key, value);
        Ok(key)
    }

    fn lookup_present<M: ClockedModel>(
        &mut self,
        op: Operation,
        driver: &mut TransactionDriver<M>,
        report: &mut WorkloadReport,
    ) -> SimResult<()> {
        if self.reference.is_empty() {
            return self.lookup_any(driver, report);
        }

        let i = self.rng.gen_range(0..self.reference.len());
        let (key, value) = self.reference.entry_at(i);
        let observed = driver.lookup(key)?;
        report.check(key, Some(value), observed)?;

        match op {
            Operation::LookupModify => {
                let new_value = self.rng.gen::<Value>();
                driver.modify(key, new_value)?;
                self.reference.set_at(i, new_value);
                report.modifications += 1;
            }
            Operation::LookupDelete => {
                driver.delete(key)?;
                self.reference.swap_remove_at(i);
                report.modifications += 1;
                report.deletes += 1;
            }
            _ => {}
        }

        self.touch(key);
        Ok(())
    }

    fn lookup_any<M: ClockedModel>(
        &mut self,
        driver: &mut TransactionDriver<M>,
        report: &mut WorkloadReport,
    ) -> SimResult<()> {
        let key = self.rng.gen::<Key>();
        let observed = driver.lookup(key)?;
        report.check(key, self.reference.get(key), observed)
    }

    fn lookup_recent<M: ClockedModel>(
        &mut self,
        driver: &mut TransactionDriver<M>,
        report: &mut WorkloadReport,
    ) -> SimResult<()> {
        if self.recents.is_empty() {
            return self.lookup_any(driver, report);
        }
        let key = self.recents[self.rng.gen_range(0..self.recents.len())];
        let observed = driver.lookup(key)?;
        report.check(key, self.reference.get(key), observed)?;
        report.recents += 1;
        Ok(())
    }
}

impl Workload for RandomWorkload {
    fn name(&self) -> &'static str {
        "random"
    }

    fn run<M: ClockedModel>(&mut self, driver: &mut TransactionDriver<M>) -> SimResult<WorkloadReport> {
        let mut report = WorkloadReport::new(self.name());

        while self.reference.len() < self.prefill {
            self.insert_fresh(driver)?;
        }
        tracing::info!(entries = self.reference.len(), "Finished pre-fill");

        for round in 0..self.operations {
            let options = if self.recents.is_empty() {
                WITHOUT_RECENT
            } else {
                WITH_RECENT
            };
            let op = options
                .choose(&mut self.rng)
                .copied()
                .unwrap_or(Operation::Idle);

            match op {
                Operation::Idle => {
                    driver.idle(1)?;
                    report.idles += 1;
                }
                Operation::LookupPresent | Operation::LookupModify | Operation::LookupDelete => {
                    self.lookup_present(op, driver, &mut report)?;
                }
                Operation::LookupAny => self.lookup_any(driver, &mut report)?,
                Operation::LookupRecent => self.lookup_recent(driver, &mut report)?,
            }

            if self.reference.len() < self.prefill && self.rng.gen::<bool>() {
                let key = self.insert_fresh(driver)?;
                report.inserts += 1;
                self.touch(key);
            }

            if (round + 1) % 10_000 == 0 {
                tracing::debug!(round = round + 1, entries = self.reference.len(), "Random workload progress");
            }
        }

        tracing::info!(
            operations = self.operations,
            checked = report.lookups_checked,
            matched = report.lookups_matched,
            "Finished randomized operations"
        );
        Ok(report)
    }
}

/// Runs an ordered list of steps, checking lookup expectations.
#[derive(Clone, Debug)]
pub struct ScriptWorkload {
    steps: Vec<ScriptStep>,
}

impl ScriptWorkload {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self { steps }
    }
}

impl Workload for ScriptWorkload {
    fn name(&self) -> &'static str {
        "script"
    }

    fn run<M: ClockedModel>(&mut self, driver: &mut TransactionDriver<M>) -> SimResult<WorkloadReport> {
        let mut report = WorkloadReport::new(self.name());

        for (n, step) in self.steps.iter().enumerate() {
            tracing::debug!(step = n, ?step, "Script step");
            match *step {
                ScriptStep::Insert { key, value } => {
                    driver.insert(key, value)?;
                    report.inserts += 1;
                }
                ScriptStep::Lookup { key, expect } => {
                    let observed = driver.lookup(key)?;
                    if let Some(expect) = expect {
                        report.check(key, expect.as_result(), observed)?;
                    }
                }
                ScriptStep::Modify { key, value } => {
                    driver.modify(key, value)?;
                    report.modifications += 1;
                }
                ScriptStep::Delete { key } => {
                    driver.delete(key)?;
                    report.deletes += 1;
                }
                ScriptStep::Idle { cycles } => {
                    driver.idle(cycles)?;
                    report.idles += cycles;
                }
            }
        }

        Ok(report)
    }
}

/// Builds and runs the workload described by `config`.
pub fn run_workload<M: ClockedModel>(
    config: &WorkloadConfig,
    driver: &mut TransactionDriver<M>,
) -> SimResult<WorkloadReport> {
    match config {
        WorkloadConfig::Fill { count } => FillWorkload::new(*count).run(driver),
        WorkloadConfig::Random {
            seed,
            prefill,
            operations,
        } => RandomWorkload::new(*seed, *prefill, *operations).run(driver),
        WorkloadConfig::Script { steps } => ScriptWorkload::new(steps.clone()).run(driver),
    }
}
