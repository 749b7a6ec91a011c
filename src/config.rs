//! Configuration system for simulation runs.
//!
//! This module provides YAML/JSON configuration file support for describing
//! a run declaratively: which core to instantiate, how to clock it, whether
//! to trace it, and which workload to drive through it.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! simulation:
//!   clock_period: 2
//!   max_cycles: 100000
//!   log_level: info
//!
//! trace:
//!   enabled: true
//!   path: dump.vcd
//!
//! model:
//!   variant: kvs
//!   capacity: 1024
//!
//! workload:
//!   type: script
//!   steps:
//!     - op: insert
//!       key: 1
//!       value: 100
//!     - op: lookup
//!       key: 1
//!       expect: 100
//!     - op: lookup
//!       key: 2
//!       expect: absent
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::cores::ModelVariant;
use crate::types::{Cycles, Key, SimTime, Value, DEFAULT_CLOCK_PERIOD, MIN_CLOCK_PERIOD};

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Global simulation parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Clock period in SimTime units
    #[serde(default = "default_clock_period")]
    pub clock_period: SimTime,

    /// Cycle bound per transaction; `null` waits forever.
    ///
    /// Counts clock edges from the one that samples the request, so it can
    /// be no lower than the variant's shortest transaction (2 edges on the
    /// hash-map core, 3 on the KVS core).
    #[serde(default = "default_max_cycles")]
    pub max_cycles: Option<Cycles>,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Output directory for statistics
    #[serde(default)]
    pub output_dir: Option<String>,
}

fn default_clock_period() -> SimTime {
    DEFAULT_CLOCK_PERIOD
}

fn default_max_cycles() -> Option<Cycles> {
    Some(100_000)
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            clock_period: default_clock_period(),
            max_cycles: default_max_cycles(),
            log_level: default_log_level(),
            output_dir: None,
        }
    }
}

/// Waveform capture parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceParams {
    /// Enables trace capture on the simulation context
    #[serde(default)]
    pub enabled: bool,

    /// VCD output path
    #[serde(default = "default_trace_path")]
    pub path: PathBuf,
}

fn default_trace_path() -> PathBuf {
    PathBuf::from("dump.vcd")
}

impl Default for TraceParams {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_trace_path(),
        }
    }
}

/// Model instance parameters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    /// Which core to instantiate
    #[serde(default)]
    pub variant: ModelVariant,

    /// Number of storage slots; the variant's default when omitted
    #[serde(default)]
    pub capacity: Option<usize>,
}

impl ModelParams {
    /// Slot count the model will actually be built with.
    pub fn effective_capacity(&self) -> usize {
        self.capacity.unwrap_or(self.variant.default_capacity())
    }
}

/// Expected result of a scripted lookup.
///
/// Written as a plain number (`expect: 100`) or the word `absent`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ExpectationRepr", into = "ExpectationRepr")]
pub enum Expectation {
    /// `valid` must be low
    Absent,
    /// `valid` must be high and `value` equal to this
    Value(Value),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ExpectationRepr {
    Value(Value),
    Word(String),
}

impl TryFrom<ExpectationRepr> for Expectation {
    type Error = String;

    fn try_from(repr: ExpectationRepr) -> Result<Self, Self::Error> {
        match repr {
            ExpectationRepr::Value(v) => Ok(Expectation::Value(v)),
            ExpectationRepr::Word(w) if w.eq_ignore_ascii_case("absent") => {
                Ok(Expectation::Absent)
            }
            ExpectationRepr::Word(w) => Err(format!(
                "expected a value or `absent`, found `{}`",
                w
            )),
        }
    }
}

impl From<Expectation> for ExpectationRepr {
    fn from(expect: Expectation) -> Self {
        match expect {
            Expectation::Absent => ExpectationRepr::Word("absent".to_string()),
            Expectation::Value(v) => ExpectationRepr::Value(v),
        }
    }
}

impl Expectation {
    /// The lookup result this expectation describes.
    pub fn as_result(self) -> Option<Value> {
        match self {
            Expectation::Absent => None,
            Expectation::Value(v) => Some(v),
        }
    }
}

/// One step of a scripted workload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ScriptStep {
    Insert {
        key: Key,
        value: Value,
    },
    Lookup {
        key: Key,
        #[serde(default)]
        expect: Option<Expectation>,
    },
    Modify {
        key: Key,
        value: Value,
    },
    Delete {
        key: Key,
    },
    Idle {
        cycles: Cycles,
    },
}

/// Workload to drive through the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkloadConfig {
    /// Insert `key = i * i`, `value = i` for `i < count`, then read back
    Fill { count: u32 },
    /// Seeded randomized stress against a reference map
    Random {
        #[serde(default)]
        seed: u64,
        prefill: usize,
        operations: usize,
    },
    /// Ordered list of transactions
    Script { steps: Vec<ScriptStep> },
}

impl WorkloadConfig {
    /// Validates the workload against the model it will run on.
    pub fn validate(&self, model: &ModelParams) -> ConfigResult<()> {
        match self {
            WorkloadConfig::Fill { count } => {
                let capacity = model.effective_capacity();
                if *count as usize > capacity {
                    return Err(ConfigError::Validation(format!(
                        "Fill count {} exceeds model capacity {}",
                        count, capacity
                    )));
                }
            }
            WorkloadConfig::Random { prefill, .. } => {
                if *prefill == 0 {
                    return Err(ConfigError::Validation(
                        "Random workload needs a non-zero prefill".to_string(),
                    ));
                }
                let capacity = model.effective_capacity();
                if *prefill > capacity {
                    return Err(ConfigError::Validation(format!(
                        "Random prefill {} exceeds model capacity {}",
                        prefill, capacity
                    )));
                }
            }
            WorkloadConfig::Script { steps } => {
                if steps.is_empty() {
                    tracing::warn!("Script workload has no steps");
                }
            }
        }
        Ok(())
    }
}

/// Complete simulation configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Global simulation parameters
    #[serde(default)]
    pub simulation: SimulationParams,

    /// Waveform capture
    #[serde(default)]
    pub trace: TraceParams,

    /// Model instance
    #[serde(default)]
    pub model: ModelParams,

    /// Workload; none runs nothing
    #[serde(default)]
    pub workload: Option<WorkloadConfig>,
}

impl SimConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.simulation.clock_period < MIN_CLOCK_PERIOD {
            return Err(ConfigError::Validation(format!(
                "clock_period must be at least {}, got {}",
                MIN_CLOCK_PERIOD,
                self.simulation.clock_period
            )));
        }

        if let Some(max_cycles) = self.simulation.max_cycles {
            let min = self.model.variant.min_transaction_cycles();
            if max_cycles < min {
                return Err(ConfigError::Validation(format!(
                    "max_cycles {} is below the shortest {} transaction ({} cycles; use null for no bound)",
                    max_cycles, self.model.variant, min
                )));
            }
        }

        if let Some(capacity) = self.model.capacity {
            if capacity == 0 || !capacity.is_power_of_two() {
                return Err(ConfigError::Validation(format!(
                    "Model capacity must be a non-zero power of two, got {}",
                    capacity
                )));
            }
        }

        if self.trace.enabled && self.trace.path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "Trace enabled but no trace path given".to_string(),
            ));
        }

        if let Some(workload) = &self.workload {
            workload.validate(&self.model)?;
        }

        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Saves configuration to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builder for creating SimConfig programmatically.
#[derive(Default)]
pub struct SimConfigBuilder {
    config: SimConfig,
}

impl SimConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the clock period.
    pub fn clock_period(mut self, period: SimTime) -> Self {
        self.config.simulation.clock_period = period;
        self
    }

    /// Sets the per-transaction cycle bound.
    pub fn max_cycles(mut self, max_cycles: Option<Cycles>) -> Self {
        self.config.simulation.max_cycles = max_cycles;
        self
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.simulation.log_level = level.into();
        self
    }

    /// Enables trace capture into `path`.
    pub fn trace(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.trace.enabled = true;
        self.config.trace.path = path.into();
        self
    }

    /// Selects the model variant.
    pub fn variant(mut self, variant: ModelVariant) -> Self {
        self.config.model.variant = variant;
        self
    }

    /// Sets the model capacity.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.model.capacity = Some(capacity);
        self
    }

    /// Sets the workload.
    pub fn workload(mut self, workload: WorkloadConfig) -> Self {
        self.config.workload = Some(workload);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<SimConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimConfig::new();
        assert_eq!(config.simulation.clock_period, 2);
        assert_eq!(config.simulation.max_cycles, Some(100_000));
        assert_eq!(config.model.variant, ModelVariant::HashMap);
        assert!(!config.trace.enabled);
        assert!(config.workload.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
simulation:
  clock_period: 10
  max_cycles: 500
  log_level: debug

trace:
  enabled: true
  path: out/trace.vcd

model:
  variant: kvs
  capacity: 1024

workload:
  type: script
  steps:
    - op: insert
      key: 1
      value: 100
    - op: lookup
      key: 1
      expect: 100
    - op: lookup
      key: 2
      expect: absent
    - op: idle
      cycles: 3
"#;

        let config = SimConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.simulation.clock_period, 10);
        assert_eq!(config.simulation.max_cycles, Some(500));
        assert_eq!(config.model.variant, ModelVariant::Kvs);
        assert_eq!(config.trace.path, PathBuf::from("out/trace.vcd"));

        let Some(WorkloadConfig::Script { steps }) = &config.workload else {
            panic!("expected script workload");
        };
        assert_eq!(steps.len(), 4);
        assert_eq!(
            steps[1],
            ScriptStep::Lookup {
                key: 1,
                expect: Some(Expectation::Value(100))
            }
        );
        assert_eq!(
            steps[2],
            ScriptStep::Lookup {
                key: 2,
                expect: Some(Expectation::Absent)
            }
        );
    }

    #[test]
    fn test_json_parsing() {
        let json = r#"{
            "simulation": { "max_cycles": null },
            "model": { "variant": "hashmap" },
            "workload": { "type": "random", "seed": 7, "prefill": 100, "operations": 1000 }
        }"#;

        let config = SimConfig::from_json(json).unwrap();
        assert_eq!(config.simulation.max_cycles, None);
        assert_eq!(
            config.workload,
            Some(WorkloadConfig::Random {
                seed: 7,
                prefill: 100,
                operations: 1000
            })
        );
    }

    #[test]
    fn test_builder() {
        let config = SimConfigBuilder::new()
            .clock_period(4)
            .variant(ModelVariant::Kvs)
            .capacity(256)
            .trace("wave.vcd")
            .workload(WorkloadConfig::Fill { count: 100 })
            .build()
            .unwrap();

        assert_eq!(config.simulation.clock_period, 4);
        assert!(config.trace.enabled);
        assert_eq!(config.model.capacity, Some(256));
    }

    #[test]
    fn test_validation_clock_period() {
        let result = SimConfigBuilder::new().clock_period(1).build();
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validation_capacity() {
        let yaml = r#"
model:
  capacity: 1000
"#;
        assert!(SimConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_validation_fill_exceeds_capacity() {
        let result = SimConfigBuilder::new()
            .capacity(64)
            .workload(WorkloadConfig::Fill { count: 65 })
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_fill_exceeds_default_capacity() {
        let result = SimConfigBuilder::new()
            .workload(WorkloadConfig::Fill { count: 32_769 })
            .build();
        assert!(matches!(result, Err(ConfigError::Validation(_))));

        let result = SimConfigBuilder::new()
            .workload(WorkloadConfig::Random {
                prefill: 32_769,
                operations: 10,
                seed: 1,
            })
            .build();
        assert!(matches!(result, Err(ConfigError::Validation(_))));

        // The KVS core defaults to twice as many slots.
        let config = SimConfigBuilder::new()
            .variant(ModelVariant::Kvs)
            .workload(WorkloadConfig::Fill { count: 32_769 })
            .build()
            .unwrap();
        assert_eq!(config.model.effective_capacity(), 1 << 16);
    }

    #[test]
    fn test_validation_max_cycles_floor() {
        let result = SimConfigBuilder::new().max_cycles(Some(1)).build();
        assert!(matches!(result, Err(ConfigError::Validation(_))));
        assert!(SimConfigBuilder::new().max_cycles(Some(2)).build().is_ok());

        let kvs = || SimConfigBuilder::new().variant(ModelVariant::Kvs);
        assert!(kvs().max_cycles(Some(2)).build().is_err());
        assert!(kvs().max_cycles(Some(3)).build().is_ok());
        assert!(kvs().max_cycles(None).build().is_ok());
    }

    #[test]
    fn test_bad_expectation() {
        let yaml = r#"
workload:
  type: script
  steps:
    - op: lookup
      key: 1
      expect: maybe
"#;
        assert!(SimConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_unknown_format() {
        let result = SimConfig::from_file("config.toml");
        assert!(matches!(result, Err(ConfigError::UnknownFormat(_))));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = SimConfigBuilder::new()
            .variant(ModelVariant::Kvs)
            .workload(WorkloadConfig::Script {
                steps: vec![
                    ScriptStep::Insert { key: 5, value: 9 },
                    ScriptStep::Lookup {
                        key: 5,
                        expect: Some(Expectation::Value(9)),
                    },
                ],
            })
            .build()
            .unwrap();

        let yaml = config.to_yaml().unwrap();
        let restored = SimConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config, restored);
    }
}
