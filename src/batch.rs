//! Replay a fixed list of entries through the sandbox.
//!
//! The batch variant has no bandit: `procs` executors share a position
//! counter over the entry list and run each entry in turn, `repeat` passes
//! over the list (0 keeps cycling until shutdown). Executions are admitted
//! through an [`ExecutionGate`] of capacity `gate_factor * procs`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::collab::Sandbox;
use crate::config::BatchConfig;
use crate::error::{Result, SchedError};
use crate::gate::ExecutionGate;
use crate::runtime::build_pool;
use crate::shutdown::ShutdownSignal;

/// Totals of a batch run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Entries executed (including failed ones)
    pub executed: u64,
    /// Executions the sandbox reported as failed
    pub failed: u64,
}

struct Progress {
    pos: u64,
    last_print: Option<Instant>,
}

/// Parallel replay of a fixed entry list.
pub struct BatchRunner<P> {
    entries: Vec<P>,
    sandbox: Arc<dyn Sandbox<P>>,
    config: BatchConfig,
    shutdown: ShutdownSignal,
    gate: ExecutionGate,
    progress: Mutex<Progress>,
    pool: rayon::ThreadPool,
}

impl<P: Sync> BatchRunner<P> {
    /// Create a runner with unpinned executor threads named `{prefix}-exec-NNNN`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for an empty entry list or a bad batch section,
    /// `ThreadPool` if the executor threads cannot be spawned.
    pub fn new(
        prefix: &str,
        entries: Vec<P>,
        sandbox: Arc<dyn Sandbox<P>>,
        config: BatchConfig,
        shutdown: ShutdownSignal,
    ) -> Result<Self> {
        Self::with_pinning(prefix, entries, sandbox, config, shutdown, None)
    }

    pub(crate) fn with_pinning(
        prefix: &str,
        entries: Vec<P>,
        sandbox: Arc<dyn Sandbox<P>>,
        config: BatchConfig,
        shutdown: ShutdownSignal,
        cpus: Option<Vec<usize>>,
    ) -> Result<Self> {
        if entries.is_empty() {
            return Err(SchedError::InvalidConfig(
                "batch run needs at least one entry".to_string(),
            ));
        }
        config.validate()?;

        let gate = ExecutionGate::new(config.gate_capacity())?;
        let prefix: Arc<str> = prefix.into();
        let pool = build_pool(&prefix, "exec", config.procs, cpus)?;

        Ok(Self {
            entries,
            sandbox,
            config,
            shutdown,
            gate,
            progress: Mutex::new(Progress {
                pos: 0,
                last_print: None,
            }),
            pool,
        })
    }

    /// Execute until every pass is done or shutdown is observed.
    pub fn run(&self) -> BatchStats {
        let executed = AtomicU64::new(0);
        let failed = AtomicU64::new(0);

        info!(
            entries = self.entries.len(),
            procs = self.config.procs,
            repeat = self.config.repeat,
            gate = self.gate.capacity(),
            "starting batch execution"
        );

        self.pool.scope(|s| {
            for pid in 0..self.config.procs {
                let executed = &executed;
                let failed = &failed;
                s.spawn(move |_| self.executor(pid, executed, failed));
            }
        });

        let stats = BatchStats {
            executed: executed.into_inner(),
            failed: failed.into_inner(),
        };
        info!(executed = stats.executed, failed = stats.failed, "batch execution finished");
        stats
    }

    fn executor(&self, pid: usize, executed: &AtomicU64, failed: &AtomicU64) {
        let len = self.entries.len() as u64;
        while !self.shutdown.is_triggered() {
            let idx = self.next_index();
            if self.config.repeat > 0 && idx >= len.saturating_mul(self.config.repeat) {
                return;
            }
            let entry = &self.entries[(idx % len) as usize];

            let ticket = self.gate.enter();
            let result = self.sandbox.execute(entry);
            drop(ticket);

            executed.fetch_add(1, Ordering::Relaxed);
            match result {
                Ok(report) => {
                    debug!(pid, idx, reward = report.reward, "executed entry");
                }
                Err(e) => {
                    failed.fetch_add(1, Ordering::Relaxed);
                    warn!(pid, idx, error = %e, "execution failed");
                }
            }
        }
    }

    /// Claim the next position, logging progress at the start of each pass.
    fn next_index(&self) -> u64 {
        let interval = Duration::from_secs(self.config.progress_interval_secs);
        let mut progress = self.progress.lock();
        let idx = progress.pos;
        progress.pos += 1;
        if idx % self.entries.len() as u64 == 0
            && progress.last_print.map_or(true, |t| t.elapsed() >= interval)
        {
            info!(executed = idx, "executed programs");
            progress.last_print = Some(Instant::now());
        }
        idx
    }

    /// Entries in the replay list.
    pub fn entries(&self) -> &[P] {
        &self.entries
    }

    /// The admission gate.
    pub fn gate(&self) -> &ExecutionGate {
        &self.gate
    }
}

impl<P> std::fmt::Debug for BatchRunner<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRunner")
            .field("entries", &self.entries.len())
            .field("config", &self.config)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}
