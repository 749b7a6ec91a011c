//! Statistics collection and export for simulation runs.
//!
//! This module gathers driver, model, workload and trace statistics into a
//! single [`RunStats`] record with JSON, CSV and human-readable exports.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use crate::driver::DriverStats;
use crate::trace::TraceSummary;
use crate::types::{Cycles, SimTime};
use crate::workload::WorkloadReport;

/// Aggregate statistics for a simulation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Run metadata
    pub metadata: RunMetadata,

    /// Transaction driver counters
    pub driver: DriverStats,

    /// Model instance counters
    pub model: ModelSummary,

    /// Workload counters, if a workload ran
    pub workload: Option<WorkloadReport>,

    /// Trace summary, if a trace was recorded
    pub trace: Option<TraceSummary>,

    /// Timing statistics
    pub timing: TimingStats,
}

/// Metadata about the run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Run name/description
    pub name: String,

    /// Model variant name
    pub variant: String,

    /// Start time (wall clock)
    pub start_time: Option<String>,

    /// End time (wall clock)
    pub end_time: Option<String>,

    /// Crate version
    pub version: String,

    /// Configuration file used (if any)
    pub config_file: Option<String>,
}

/// Model-level statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModelSummary {
    /// Simulation time after the last edge
    pub final_time: SimTime,

    /// Clock edges evaluated
    pub cycles: Cycles,

    /// Edges with `busy` high
    pub busy_cycles: Cycles,

    /// Live entries at the end of the run
    pub occupancy: usize,

    /// Storage slots
    pub capacity: usize,
}

/// Timing/performance statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TimingStats {
    /// Total wall-clock time in milliseconds
    pub total_wall_time_ms: f64,

    /// Clock edges per wall-clock second
    pub cycles_per_second: f64,

    /// Completed transactions per wall-clock second
    pub transactions_per_second: f64,
}

impl RunStats {
    /// Creates a new empty statistics container.
    pub fn new() -> Self {
        Self {
            metadata: RunMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..RunMetadata::default()
            },
            ..Self::default()
        }
    }

    /// Sets the run name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = name.into();
        self
    }

    /// Records the start time.
    pub fn record_start(&mut self) {
        self.metadata.start_time = Some(wall_clock_now());
    }

    /// Records the end time.
    pub fn record_end(&mut self) {
        self.metadata.end_time = Some(wall_clock_now());
    }

    /// Updates timing statistics based on wall clock time.
    pub fn compute_timing(&mut self, wall_time_ms: f64) {
        self.timing.total_wall_time_ms = wall_time_ms;

        if wall_time_ms > 0.0 {
            let seconds = wall_time_ms / 1000.0;
            self.timing.cycles_per_second = self.model.cycles as f64 / seconds;
            self.timing.transactions_per_second = self.driver.transactions() as f64 / seconds;
        }
    }

    /// Exports statistics to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Exports statistics to JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Exports summary statistics to CSV.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();

        // Header
        csv.push_str("metric,value\n");

        // Model stats
        csv.push_str(&format!("final_time,{}\n", self.model.final_time));
        csv.push_str(&format!("cycles,{}\n", self.model.cycles));
        csv.push_str(&format!("busy_cycles,{}\n", self.model.busy_cycles));
        csv.push_str(&format!("occupancy,{}\n", self.model.occupancy));
        csv.push_str(&format!("capacity,{}\n", self.model.capacity));

        // Driver stats
        let d = &self.driver;
        csv.push_str(&format!("transactions,{}\n", d.transactions()));
        csv.push_str(&format!("inserts,{}\n", d.inserts));
        csv.push_str(&format!("lookups,{}\n", d.lookups));
        csv.push_str(&format!("lookup_hits,{}\n", d.lookup_hits));
        csv.push_str(&format!("lookup_misses,{}\n", d.lookup_misses));
        csv.push_str(&format!("modifies,{}\n", d.modifies));
        csv.push_str(&format!("deletes,{}\n", d.deletes));
        csv.push_str(&format!("max_transaction_cycles,{}\n", d.max_transaction_cycles));
        csv.push_str(&format!("rejected,{}\n", d.rejected));
        csv.push_str(&format!("timeouts,{}\n", d.timeouts));

        if let Some(trace) = &self.trace {
            csv.push_str(&format!("trace_snapshots,{}\n", trace.snapshots));
        }

        // Timing stats
        csv.push_str(&format!("wall_time_ms,{:.2}\n", self.timing.total_wall_time_ms));
        csv.push_str(&format!("cycles_per_second,{:.2}\n", self.timing.cycles_per_second));

        csv
    }

    /// Exports summary statistics to CSV file.
    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())
    }

    /// Writes a human-readable summary to a writer.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "=== Simulation Statistics ===")?;
        writeln!(w)?;

        if !self.metadata.name.is_empty() {
            writeln!(w, "Name: {}", self.metadata.name)?;
        }
        if !self.metadata.variant.is_empty() {
            writeln!(w, "Model: {}", self.metadata.variant)?;
        }
        if let Some(ref start) = self.metadata.start_time {
            writeln!(w, "Started: {}", start)?;
        }
        if let Some(ref end) = self.metadata.end_time {
            writeln!(w, "Ended: {}", end)?;
        }
        writeln!(w)?;

        writeln!(w, "--- Model ---")?;
        writeln!(w, "Final simulation time: {}", self.model.final_time)?;
        writeln!(w, "Cycles: {}", self.model.cycles)?;
        writeln!(w, "Busy cycles: {}", self.model.busy_cycles)?;
        writeln!(w, "Occupancy: {}/{}", self.model.occupancy, self.model.capacity)?;
        writeln!(w)?;

        let d = &self.driver;
        writeln!(w, "--- Transactions ---")?;
        writeln!(w, "Inserts: {}", d.inserts)?;
        writeln!(w, "Lookups: {} ({} hit, {} miss)", d.lookups, d.lookup_hits, d.lookup_misses)?;
        writeln!(w, "Modifies: {}", d.modifies)?;
        writeln!(w, "Deletes: {}", d.deletes)?;
        writeln!(w, "Longest transaction: {} cycles", d.max_transaction_cycles)?;
        writeln!(w, "Rejected: {}, Timeouts: {}", d.rejected, d.timeouts)?;
        writeln!(w)?;

        if let Some(ref report) = self.workload {
            writeln!(w, "--- Workload ({}) ---", report.kind)?;
            writeln!(w, "Num lookups checked: {}", report.lookups_checked)?;
            writeln!(w, "Num lookups matched: {}", report.lookups_matched)?;
            writeln!(w, "Num modifications:   {}", report.modifications)?;
            writeln!(w, "Num deletes:         {}", report.deletes)?;
            writeln!(w, "Num idles:           {}", report.idles)?;
            writeln!(w, "Num recents:         {}", report.recents)?;
            writeln!(w, "Num inserts:         {}", report.inserts)?;
            writeln!(w)?;
        }

        if let Some(ref trace) = self.trace {
            writeln!(w, "--- Trace ---")?;
            writeln!(w, "Snapshots: {}", trace.snapshots)?;
            writeln!(w, "Bytes: {}", trace.bytes)?;
            writeln!(w)?;
        }

        writeln!(w, "--- Timing ---")?;
        writeln!(w, "Wall time: {:.2} ms", self.timing.total_wall_time_ms)?;
        writeln!(w, "Cycles/sec: {:.2}", self.timing.cycles_per_second)?;
        writeln!(w, "Transactions/sec: {:.2}", self.timing.transactions_per_second)?;

        Ok(())
    }

    /// Returns a summary string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_summary(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// A simple timer for measuring wall-clock time.
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    /// Starts a new timer.
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Returns elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns elapsed time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

/// Returns current timestamp as seconds since the Unix epoch.
fn wall_clock_now() -> String {
    let now = std::time::SystemTime::now();
    let duration = now.duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
    format!("{}s", duration.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_creation() {
        let stats = RunStats::new().with_name("Test Simulation");

        assert_eq!(stats.metadata.name, "Test Simulation");
        assert_eq!(stats.metadata.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_stats_json_export() {
        let mut stats = RunStats::new();
        stats.model.final_time = 1000;
        stats.driver.inserts = 17;

        let json = stats.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["model"]["final_time"], 1000);
        assert_eq!(value["driver"]["inserts"], 17);
        assert!(value["trace"].is_null());
    }

    #[test]
    fn test_stats_csv_export() {
        let mut stats = RunStats::new();
        stats.model.cycles = 1000;
        stats.driver.lookups = 5;
        stats.driver.lookup_hits = 3;

        let csv = stats.to_csv();
        assert!(csv.starts_with("metric,value\n"));
        assert!(csv.contains("cycles,1000"));
        assert!(csv.contains("lookup_hits,3"));
        assert!(csv.contains("transactions,5"));
        assert!(!csv.contains("trace_snapshots"));
    }

    #[test]
    fn test_compute_timing() {
        let mut stats = RunStats::new();
        stats.model.cycles = 2000;
        stats.driver.inserts = 10;
        stats.compute_timing(500.0);

        assert_eq!(stats.timing.cycles_per_second, 4000.0);
        assert_eq!(stats.timing.transactions_per_second, 20.0);
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let elapsed = timer.elapsed_ms();
        assert!(elapsed >= 10.0);
    }

    #[test]
    fn test_summary_output() {
        let mut stats = RunStats::new().with_name("Summary Test");
        stats.metadata.variant = "kvs".to_string();
        stats.model.final_time = 1000;
        stats.workload = Some(WorkloadReport {
            kind: "fill".to_string(),
            lookups_checked: 4,
            lookups_matched: 4,
            ..WorkloadReport::default()
        });

        let summary = stats.summary();
        assert!(summary.contains("Summary Test"));
        assert!(summary.contains("Model: kvs"));
        assert!(summary.contains("1000"));
        assert!(summary.contains("Num lookups matched: 4"));
    }
}
