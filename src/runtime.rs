//! Scheduler runtime: the shared bandit state plus a pool of fuzzing workers.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  SchedulerRuntime                     │
//! │  state: Arc<SchedulerState>   (RwLock'd estimates)    │
//! │  metrics: SchedMetrics        shutdown: ShutdownSignal│
//! └──────────────────────────────────────────────────────┘
//!                   │ pool.scope, one WorkerLoop per thread
//!                   ▼
//! ┌──────────────┐ ┌──────────────┐     ┌──────────────┐
//! │ worker-0000  │ │ worker-0001  │ ... │ worker-NNNN  │
//! │ own SmallRng │ │ own SmallRng │     │ own SmallRng │
//! └──────────────┘ └──────────────┘     └──────────────┘
//! ```
//!
//! Workers run on a dedicated rayon pool sized to exactly `workers` threads,
//! so every worker loop gets its own OS thread for the whole campaign.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::affinity::{format_cpuset, pin_to_cpu, resolve_cpus, CpuAllocator};
use crate::batch::BatchRunner;
use crate::collab::{Collaborators, Sandbox};
use crate::config::SchedulerConfig;
use crate::error::{Result, SchedError};
use crate::mab::SchedulerState;
use crate::metrics::SchedMetrics;
use crate::shutdown::ShutdownSignal;
use crate::worker::{worker_rng, WorkerLoop, WorkerStats};

/// Build a rayon pool with `threads` threads named `{prefix}-{role}-NNNN`,
/// optionally pinned round-robin over `cpus`.
pub(crate) fn build_pool(
    prefix: &Arc<str>,
    role: &'static str,
    threads: usize,
    cpus: Option<Vec<usize>>,
) -> Result<rayon::ThreadPool> {
    let name_prefix = Arc::clone(prefix);
    let start_prefix = Arc::clone(prefix);
    let allocator = cpus.map(|cpus| Arc::new(CpuAllocator::new(cpus)));

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(move |i| format!("{}-{}-{:04}", name_prefix, role, i))
        .start_handler(move |thread_index| {
            let Some(allocator) = &allocator else {
                return;
            };
            let cpu_id = allocator.allocate();
            debug!(thread_index, cpu_id, prefix = %start_prefix, role, "thread starting");
            if let Err(e) = pin_to_cpu(cpu_id) {
                warn!(%e, prefix = %start_prefix, cpu_id, thread_index, "failed to pin thread");
            }
        })
        .build()?;

    Ok(pool)
}

/// Owns the shared scheduler state and the worker pool.
///
/// # Example
///
/// ```ignore
/// let runtime = SchedulerBuilder::new().workers(8).build()?;
/// let stats = runtime.run(Collaborators::new(corpus, queue, ops, sandbox))?;
/// ```
pub struct SchedulerRuntime {
    config: SchedulerConfig,
    state: Arc<SchedulerState>,
    metrics: SchedMetrics,
    shutdown: ShutdownSignal,
    pool: rayon::ThreadPool,
    cpus: Vec<usize>,
}

impl SchedulerRuntime {
    /// Create a runtime from a configuration.
    ///
    /// This is typically called via `SchedulerBuilder::build()`.
    ///
    /// # Errors
    ///
    /// Returns configuration errors for invalid settings or CPU sets, and
    /// `SchedError::ThreadPool` if the worker threads cannot be spawned.
    pub fn from_config(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;

        let cpus = if config.pin_workers {
            resolve_cpus(config.cpuset.as_deref())?
        } else {
            Vec::new()
        };

        info!(
            prefix = %config.prefix,
            workers = config.workers,
            seed = ?config.seed,
            pinned = config.pin_workers,
            cpus = %format_cpuset(&cpus),
            softmax = config.knobs.softmax_enabled,
            exp31 = config.knobs.exp31_enabled,
            eta = config.knobs.eta,
            "building scheduler runtime"
        );

        let state = Arc::new(SchedulerState::new(config.knobs.clone())?);

        let metrics = SchedMetrics::with_prefix(&config.prefix);
        metrics.set_params(state.params());
        if let Some(ref registry) = config.prometheus_registry {
            if let Err(e) = metrics.register(registry) {
                warn!(%e, "failed to register prometheus metrics");
            }
        }

        let prefix: Arc<str> = config.prefix.as_str().into();
        let pin = (!cpus.is_empty()).then(|| cpus.clone());
        let pool = build_pool(&prefix, "worker", config.workers, pin)?;

        Ok(Self {
            config,
            state,
            metrics,
            shutdown: ShutdownSignal::new(),
            pool,
            cpus,
        })
    }

    /// Run one worker per pool thread until shutdown (or the per-worker round
    /// limit) and collect their statistics.
    ///
    /// Blocks the calling thread. Call [`shutdown`](Self::shutdown) from
    /// another thread, or hold a clone of [`shutdown_signal`](Self::shutdown_signal),
    /// to stop a campaign without a round limit.
    ///
    /// # Errors
    ///
    /// Returns the first fatal worker error (`NoFeasibleAction`). The caller
    /// is expected to terminate the campaign.
    pub fn run<P, T>(&self, collab: Collaborators<P, T>) -> Result<Vec<WorkerStats>> {
        let workers = self.config.workers;
        let results: Mutex<Vec<Option<Result<WorkerStats>>>> =
            Mutex::new((0..workers).map(|_| None).collect());

        self.pool.scope(|s| {
            for id in 0..workers {
                let worker = WorkerLoop::new(
                    id,
                    Arc::clone(&self.state),
                    collab.clone(),
                    self.metrics.clone(),
                    self.shutdown.clone(),
                    worker_rng(self.config.seed, id),
                )
                .with_round_limit(self.config.rounds_per_worker);
                let results = &results;
                s.spawn(move |_| {
                    let outcome = worker.run();
                    results.lock()[id] = Some(outcome);
                });
            }
        });

        let mut stats = Vec::with_capacity(workers);
        for (id, result) in results.into_inner().into_iter().enumerate() {
            match result {
                Some(Ok(s)) => stats.push(s),
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(SchedError::InvalidConfig(format!(
                        "worker {id} exited without reporting"
                    )))
                }
            }
        }

        info!(
            rounds = self.state.round(),
            epoch = self.state.epoch(),
            "scheduler run finished"
        );
        Ok(stats)
    }

    /// Build a batch runner that replays `entries` on this runtime's CPU set,
    /// sharing its shutdown signal.
    pub fn batch_runner<P: Sync>(
        &self,
        entries: Vec<P>,
        sandbox: Arc<dyn Sandbox<P>>,
    ) -> Result<BatchRunner<P>> {
        let pin = (!self.cpus.is_empty()).then(|| self.cpus.clone());
        BatchRunner::with_pinning(
            &self.config.prefix,
            entries,
            sandbox,
            self.config.batch.clone(),
            self.shutdown.clone(),
            pin,
        )
    }

    /// Ask every worker to stop at its next round boundary.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Clone of the shared shutdown flag.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Get the runtime configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Shared bandit state.
    pub fn state(&self) -> &Arc<SchedulerState> {
        &self.state
    }

    /// Prometheus metrics (always active, registry optional).
    pub fn metrics(&self) -> &SchedMetrics {
        &self.metrics
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// CPUs workers are pinned to (empty when pinning is off).
    pub fn cpus(&self) -> &[usize] {
        &self.cpus
    }
}

impl std::fmt::Debug for SchedulerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerRuntime")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("shutdown", &self.shutdown.is_triggered())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for SchedulerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cpus = if self.cpus.is_empty() {
            "unpinned".to_string()
        } else {
            format_cpuset(&self.cpus)
        };
        write!(
            f,
            "SchedulerRuntime[{}]: workers({}, cpus={}) round={} epoch={}",
            self.config.prefix,
            self.workers(),
            cpus,
            self.state.round(),
            self.state.epoch(),
        )
    }
}
