//! Configuration types for the scheduler runtime.

use prometheus::Registry;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedError};
use crate::mab::MabKnobs;

/// Configuration for a fuzzing campaign's scheduler.
///
/// Deserializable from TOML, YAML, JSON, or environment variables through
/// figment (see [`SchedulerBuilder`](crate::SchedulerBuilder)).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Thread name and metric prefix (default: "fuzzloom")
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Number of fuzzing workers (default: 1)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Campaign seed. Worker `i` seeds its RNG with `seed + i`; entropy if unset.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Pin each worker thread to a CPU (default: false)
    #[serde(default)]
    pub pin_workers: bool,

    /// CPU list for pinning (e.g. "0-7,16-23"), or None for all CPUs
    #[serde(default)]
    pub cpuset: Option<String>,

    /// Stop each worker after this many rounds; None runs until shutdown
    #[serde(default)]
    pub rounds_per_worker: Option<u64>,

    /// Bandit hyperparameters
    #[serde(default)]
    pub knobs: MabKnobs,

    /// Batch execution settings
    #[serde(default)]
    pub batch: BatchConfig,

    /// Prometheus registry for metrics exposition.
    /// Not serializable - must be set programmatically.
    #[serde(skip)]
    pub prometheus_registry: Option<Registry>,
}

fn default_prefix() -> String {
    "fuzzloom".to_string()
}

fn default_workers() -> usize {
    1
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            workers: default_workers(),
            seed: None,
            pin_workers: false,
            cpuset: None,
            rounds_per_worker: None,
            knobs: MabKnobs::default(),
            batch: BatchConfig::default(),
            prometheus_registry: None,
        }
    }
}

impl SchedulerConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check structural settings and hyperparameters.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for zero workers or a bad batch section, `InvalidKnob`
    /// for out-of-range hyperparameters.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(SchedError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.prefix.is_empty() {
            return Err(SchedError::InvalidConfig(
                "prefix must not be empty".to_string(),
            ));
        }
        self.knobs.validate()?;
        self.batch.validate()
    }
}

/// Settings for replaying a fixed list of entries.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Parallel executors (default: 1)
    pub procs: usize,

    /// Passes over the entry list; 0 repeats until shutdown (default: 1)
    pub repeat: u64,

    /// Gate capacity as a multiple of `procs` (default: 2)
    pub gate_factor: usize,

    /// Minimum seconds between progress lines (default: 5)
    pub progress_interval_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            procs: 1,
            repeat: 1,
            gate_factor: 2,
            progress_interval_secs: 5,
        }
    }
}

impl BatchConfig {
    /// Admission gate capacity.
    pub fn gate_capacity(&self) -> usize {
        self.gate_factor.saturating_mul(self.procs)
    }

    /// Check the batch settings.
    pub fn validate(&self) -> Result<()> {
        if self.procs == 0 {
            return Err(SchedError::InvalidConfig(
                "batch.procs must be at least 1".to_string(),
            ));
        }
        if self.gate_capacity() == 0 {
            return Err(SchedError::InvalidConfig(
                "batch gate capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.prefix, "fuzzloom");
        assert_eq!(config.workers, 1);
        assert!(config.seed.is_none());
        assert!(!config.pin_workers);
        assert_eq!(config.batch.gate_capacity(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = SchedulerConfig {
            workers: 0,
            ..SchedulerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SchedError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_checks_knobs_and_batch() {
        let mut config = SchedulerConfig::default();
        config.knobs.eta = -1.0;
        assert!(matches!(
            config.validate(),
            Err(SchedError::InvalidKnob { name: "eta", .. })
        ));

        let mut config = SchedulerConfig::default();
        config.batch.gate_factor = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_config() {
        let toml = r#"
            prefix = "syz"
            workers = 4
            seed = 1234
            cpuset = "0-3"

            [knobs]
            eta = 0.5
            exp31_enabled = true

            [batch]
            procs = 8
            repeat = 0
        "#;

        let config: SchedulerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.prefix, "syz");
        assert_eq!(config.workers, 4);
        assert_eq!(config.seed, Some(1234));
        assert_eq!(config.cpuset.as_deref(), Some("0-3"));
        assert_eq!(config.knobs.eta, 0.5);
        assert!(config.knobs.exp31_enabled);
        assert!(config.knobs.softmax_enabled);
        assert_eq!(config.batch.procs, 8);
        assert_eq!(config.batch.repeat, 0);
        assert_eq!(config.batch.gate_capacity(), 16);
    }
}
