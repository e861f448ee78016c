//! Builder for constructing scheduler runtimes.
//!
//! Configuration sources are layered with figment:
//! - Default values
//! - Config files (TOML, YAML, JSON)
//! - Environment variables
//! - Programmatic overrides
//! - CLI arguments via clap

use std::path::Path;

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use prometheus::Registry;

use crate::config::{BatchConfig, SchedulerConfig};
use crate::error::Result;
use crate::mab::{MabKnobs, RewardPolicy};
use crate::runtime::SchedulerRuntime;

/// Builder for a [`SchedulerRuntime`].
///
/// Sources merge in the order they are added; later ones win:
/// 1. Default values
/// 2. Config files (in order added)
/// 3. Environment variables
/// 4. Programmatic overrides
///
/// # Examples
///
/// ```ignore
/// use fuzzloom::SchedulerBuilder;
///
/// let runtime = SchedulerBuilder::new()
///     .file("fuzzer.toml")
///     .env_prefix("FUZZLOOM")
///     .workers(8)
///     .seed(42)
///     .build()?;
/// ```
pub struct SchedulerBuilder {
    figment: Figment,
    prometheus_registry: Option<Registry>,
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SchedulerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerBuilder")
            .field("figment", &self.figment)
            .field(
                "prometheus_registry",
                &self.prometheus_registry.as_ref().map(|_| "<Registry>"),
            )
            .finish()
    }
}

impl SchedulerBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self {
            figment: Figment::from(Serialized::defaults(SchedulerConfig::default())),
            prometheus_registry: None,
        }
    }

    fn set<V: serde::Serialize>(mut self, key: &str, value: V) -> Self {
        self.figment = self.figment.merge(Serialized::default(key, value));
        self
    }

    /// Add a configuration file (format detected by extension, TOML otherwise).
    ///
    /// ```ignore
    /// let builder = SchedulerBuilder::new()
    ///     .file("fuzzer.toml")
    ///     .file("fuzzer.local.yaml"); // overrides fuzzer.toml
    /// ```
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref();
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        self.figment = match extension.to_lowercase().as_str() {
            "yaml" | "yml" => self.figment.merge(Yaml::file(path)),
            "json" => self.figment.merge(Json::file(path)),
            _ => self.figment.merge(Toml::file(path)),
        };
        self
    }

    /// Add environment variables named `{PREFIX}_{KEY}`.
    ///
    /// Nested keys use a double underscore: `FUZZLOOM_WORKERS=8`,
    /// `FUZZLOOM_KNOBS__ETA=0.1`, `FUZZLOOM_BATCH__PROCS=4`.
    pub fn env_prefix(mut self, prefix: &str) -> Self {
        self.figment = self
            .figment
            .merge(Env::prefixed(&format!("{prefix}_")).split("__"));
        self
    }

    /// Set the thread name and metric prefix.
    ///
    /// Worker threads are named `{prefix}-worker-{NNNN}`.
    pub fn prefix(self, prefix: impl Into<String>) -> Self {
        self.set("prefix", prefix.into())
    }

    /// Set the number of fuzzing workers.
    pub fn workers(self, n: usize) -> Self {
        self.set("workers", n)
    }

    /// Seed every worker RNG (`seed + worker_id`) for reproducible runs.
    pub fn seed(self, seed: u64) -> Self {
        self.set("seed", seed)
    }

    /// Pin worker threads to CPUs.
    pub fn pin_workers(self, pin: bool) -> Self {
        self.set("pin_workers", pin)
    }

    /// Restrict pinning to a CPU list, e.g. `"0-7,16-23"`. Implies pinning.
    pub fn cpuset(self, cpuset: impl Into<String>) -> Self {
        self.set("cpuset", cpuset.into()).set("pin_workers", true)
    }

    /// Stop each worker after `n` rounds.
    pub fn rounds_per_worker(self, n: u64) -> Self {
        self.set("rounds_per_worker", n)
    }

    /// Set all bandit knobs. See [`MabKnobs`].
    pub fn knobs(self, knobs: MabKnobs) -> Self {
        self.set("knobs", knobs)
    }

    /// Set the batch execution settings.
    pub fn batch(self, batch: BatchConfig) -> Self {
        self.set("batch", batch)
    }

    /// Provide an external Prometheus registry for metrics exposition.
    ///
    /// ```ignore
    /// let registry = prometheus::Registry::new();
    /// let runtime = SchedulerBuilder::new()
    ///     .prometheus_registry(registry.clone())
    ///     .build()?;
    /// ```
    pub fn prometheus_registry(mut self, registry: Registry) -> Self {
        self.prometheus_registry = Some(registry);
        self
    }

    /// Apply CLI argument overrides (only the flags that were given).
    pub fn with_cli_args(mut self, args: &SchedulerArgs) -> Self {
        if let Some(ref prefix) = args.sched_prefix {
            self = self.set("prefix", prefix.clone());
        }
        if let Some(workers) = args.sched_workers {
            self = self.set("workers", workers);
        }
        if let Some(seed) = args.sched_seed {
            self = self.set("seed", seed);
        }
        if let Some(ref cpuset) = args.sched_cpuset {
            self = self.cpuset(cpuset.clone());
        }
        if let Some(eta) = args.sched_eta {
            self = self.set("knobs.eta", eta);
        }
        if let Some(gamma) = args.sched_gamma {
            self = self.set("knobs.gamma", gamma);
        }
        if let Some(decay) = args.sched_decay {
            self = self.set("knobs.decay", decay);
        }
        if args.sched_no_softmax {
            self = self.set("knobs.softmax_enabled", false);
        }
        if args.sched_exp31 {
            self = self.set("knobs.exp31_enabled", true);
        }
        if args.sched_importance_weighted {
            self = self.set("knobs.reward_policy", RewardPolicy::ImportanceWeighted);
        }
        if let Some(procs) = args.sched_procs {
            self = self.set("batch.procs", procs);
        }
        if let Some(repeat) = args.sched_repeat {
            self = self.set("batch.repeat", repeat);
        }
        self
    }

    /// Extract the merged configuration without building a runtime.
    ///
    /// # Errors
    ///
    /// Returns `SchedError::Config` if extraction fails.
    pub fn config(&self) -> Result<SchedulerConfig> {
        let mut config: SchedulerConfig = self.figment.extract().map_err(Box::new)?;
        config.prometheus_registry = self.prometheus_registry.clone();
        Ok(config)
    }

    /// Build the runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration extraction fails
    /// - A knob or structural setting is out of range
    /// - The CPU set is invalid or contains unavailable CPUs
    /// - The worker pool cannot be built
    pub fn build(self) -> Result<SchedulerRuntime> {
        SchedulerRuntime::from_config(self.config()?)
    }
}

/// CLI arguments for scheduler configuration.
///
/// Flatten into an application's clap parser and apply with
/// [`SchedulerBuilder::with_cli_args`].
///
/// ```ignore
/// use clap::Parser;
///
/// #[derive(Parser)]
/// struct Cli {
///     #[command(flatten)]
///     sched: fuzzloom::SchedulerArgs,
/// }
///
/// let cli = Cli::parse();
/// let runtime = SchedulerBuilder::new().with_cli_args(&cli.sched).build()?;
/// ```
#[derive(Debug, Default, Clone, clap::Args)]
pub struct SchedulerArgs {
    /// Thread name and metric prefix
    #[arg(long)]
    pub sched_prefix: Option<String>,

    /// Number of fuzzing workers
    #[arg(long)]
    pub sched_workers: Option<usize>,

    /// Campaign seed for worker RNGs
    #[arg(long)]
    pub sched_seed: Option<u64>,

    /// CPU set to pin workers to (e.g., "0-7,16-23")
    #[arg(long)]
    pub sched_cpuset: Option<String>,

    /// Inverse temperature applied to reward estimates
    #[arg(long)]
    pub sched_eta: Option<f64>,

    /// Exploration rate
    #[arg(long)]
    pub sched_gamma: Option<f64>,

    /// Estimate smoothing factor
    #[arg(long)]
    pub sched_decay: Option<f64>,

    /// Disable softmax weighting
    #[arg(long)]
    pub sched_no_softmax: bool,

    /// Enable Exp3.1 epoch annealing
    #[arg(long)]
    pub sched_exp31: bool,

    /// Importance-weight rewards by selection probability
    #[arg(long)]
    pub sched_importance_weighted: bool,

    /// Parallel executors for batch replay
    #[arg(long)]
    pub sched_procs: Option<usize>,

    /// Batch replay passes (0 = until interrupted)
    #[arg(long)]
    pub sched_repeat: Option<u64>,
}
