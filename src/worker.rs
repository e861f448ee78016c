//! Per-thread fuzzing loop driven by the bandit.
//!
//! Each worker cycles through
//!
//! ```text
//! Idle ──► Deciding ──► Dispatching ──► Awaiting ──► Reporting ──► Idle
//!  │           │
//!  └───────────┴──► Stopped   (shutdown observed)
//! ```
//!
//! A round takes one weight snapshot, draws one action, runs it through the
//! collaborators and folds the measured reward rate back into the shared
//! [`SchedulerState`]. Collaborator failures still report a zero-reward
//! round; the only round that reports nothing is a triage pick that finds the
//! queue already drained by another worker.

use std::sync::Arc;
use std::time::Instant;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use tracing::{debug, error, trace, warn};

use crate::collab::Collaborators;
use crate::error::{CollaboratorError, Result};
use crate::mab::{
    choose, Action, ApplyReport, Decision, Feasibility, RewardSample, SchedulerState, NUM_ACTIONS,
};
use crate::metrics::SchedMetrics;
use crate::shutdown::ShutdownSignal;

/// Observable phase of a worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    /// Between rounds; drains non-bandit work.
    Idle,
    /// Snapshotting weights and drawing an action.
    Deciding,
    /// Invoking the collaborator for the chosen action.
    Dispatching,
    /// Waiting for the collaborator call to return.
    Awaiting,
    /// Folding the sample into the shared state.
    Reporting,
    /// Shutdown observed; the loop has exited.
    Stopped,
}

/// What one call to [`WorkerLoop::step`] did.
#[derive(Clone, Debug, PartialEq)]
pub enum RoundOutcome {
    /// A sample was applied to the scheduler state.
    Reported {
        /// The sample that was applied
        sample: RewardSample,
        /// Resulting scheduler bookkeeping
        report: ApplyReport,
        /// Collaborator failure that zeroed the reward, if any
        error: Option<CollaboratorError>,
    },
    /// The chosen action's precondition vanished; nothing was reported.
    Skipped {
        /// The action that was drawn
        action: Action,
    },
    /// Shutdown was observed before a decision was made.
    Stopped,
}

/// Per-worker summary returned when the loop exits.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Worker index within the pool
    pub worker_id: usize,
    /// Rounds that applied an outcome
    pub reported: u64,
    /// Triage races
    pub skipped: u64,
    /// Rounds whose collaborator call failed
    pub errors: u64,
    /// Non-triage work items processed at idle
    pub background: u64,
    /// Reported rounds per action
    pub per_action: [u64; NUM_ACTIONS],
}

impl WorkerStats {
    fn new(worker_id: usize) -> Self {
        Self {
            worker_id,
            ..Self::default()
        }
    }

    /// Reported rounds for `action`.
    pub fn count(&self, action: Action) -> u64 {
        self.per_action[action.index()]
    }
}

/// Result of running the chosen action against the collaborators.
enum Dispatched {
    Done {
        reward: f64,
        seed_index: Option<usize>,
        error: Option<CollaboratorError>,
    },
    QueueDrained,
}

/// Build the per-worker RNG: reproducible from `seed + worker_id` when a
/// campaign seed is set, OS entropy otherwise.
pub fn worker_rng(seed: Option<u64>, worker_id: usize) -> SmallRng {
    match seed {
        Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(worker_id as u64)),
        None => SmallRng::from_entropy(),
    }
}

/// One fuzzing worker.
pub struct WorkerLoop<P, T> {
    id: usize,
    state: Arc<SchedulerState>,
    collab: Collaborators<P, T>,
    metrics: SchedMetrics,
    shutdown: ShutdownSignal,
    rng: SmallRng,
    phase: WorkerState,
    stats: WorkerStats,
    round_limit: Option<u64>,
}

impl<P, T> WorkerLoop<P, T> {
    /// Create a worker bound to the shared state and collaborators.
    pub fn new(
        id: usize,
        state: Arc<SchedulerState>,
        collab: Collaborators<P, T>,
        metrics: SchedMetrics,
        shutdown: ShutdownSignal,
        rng: SmallRng,
    ) -> Self {
        Self {
            id,
            state,
            collab,
            metrics,
            shutdown,
            rng,
            phase: WorkerState::Idle,
            stats: WorkerStats::new(id),
            round_limit: None,
        }
    }

    /// Stop after this many decided rounds (reported or skipped).
    pub fn with_round_limit(mut self, limit: Option<u64>) -> Self {
        self.round_limit = limit;
        self
    }

    /// Current phase.
    pub fn phase(&self) -> WorkerState {
        self.phase
    }

    /// Statistics so far.
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Run rounds until shutdown or the round limit.
    ///
    /// # Errors
    ///
    /// Returns `SchedError::NoFeasibleAction` if the weights collapse. The
    /// shared shutdown signal is triggered first so sibling workers stop too.
    pub fn run(mut self) -> Result<WorkerStats> {
        debug!(worker = self.id, "worker started");
        loop {
            if let Some(limit) = self.round_limit {
                if self.stats.reported + self.stats.skipped >= limit {
                    self.phase = WorkerState::Stopped;
                    break;
                }
            }
            if let RoundOutcome::Stopped = self.step()? {
                break;
            }
        }
        debug!(
            worker = self.id,
            reported = self.stats.reported,
            skipped = self.stats.skipped,
            errors = self.stats.errors,
            "worker stopped"
        );
        Ok(self.stats)
    }

    /// Run a single round.
    pub fn step(&mut self) -> Result<RoundOutcome> {
        self.phase = WorkerState::Idle;
        if self.shutdown.is_triggered() {
            self.phase = WorkerState::Stopped;
            return Ok(RoundOutcome::Stopped);
        }
        self.drain_background();

        self.phase = WorkerState::Deciding;
        if self.shutdown.is_triggered() {
            self.phase = WorkerState::Stopped;
            return Ok(RoundOutcome::Stopped);
        }
        let decision = self.decide()?;
        let action = decision.action;
        self.metrics.record_decision(action);

        self.phase = WorkerState::Dispatching;
        let start = Instant::now();
        let dispatched = self.dispatch(action);
        let elapsed = start.elapsed().as_secs_f64();

        let (reward, seed_index, error) = match dispatched {
            Dispatched::QueueDrained => {
                debug!(worker = self.id, %action, "triage queue drained by another worker, skipping round");
                self.metrics.record_triage_race();
                self.stats.skipped += 1;
                self.phase = WorkerState::Idle;
                return Ok(RoundOutcome::Skipped { action });
            }
            Dispatched::Done {
                reward,
                seed_index,
                error,
            } => (reward, seed_index, error),
        };

        self.phase = WorkerState::Reporting;
        if let Some(ref e) = error {
            warn!(worker = self.id, %action, error = %e, "collaborator failed, recording zero reward");
            self.metrics.record_collaborator_error();
            self.stats.errors += 1;
        }

        let mut sample =
            RewardSample::new(action, elapsed, reward).with_propensity(decision.propensity());
        if let Some(index) = seed_index {
            sample = sample.with_seed(index);
        }
        let metrics = &self.metrics;
        let report = self
            .state
            .apply_outcome_with(sample, |report, estimates, params| {
                metrics.record_apply(action, report);
                if report.epoch_advanced {
                    metrics.set_estimates(estimates);
                    metrics.set_params(params);
                }
            });

        if let Some(index) = seed_index {
            self.collab.corpus.credit(index, &sample);
        }

        debug!(
            worker = self.id,
            %action,
            elapsed,
            reward,
            round = report.round,
            estimate = report.estimate,
            "round reported"
        );

        self.stats.reported += 1;
        self.stats.per_action[action.index()] += 1;
        self.phase = WorkerState::Idle;
        Ok(RoundOutcome::Reported {
            sample,
            report,
            error,
        })
    }

    /// Process queued non-triage items. These are not bandit rounds.
    fn drain_background(&mut self) {
        while let Some(item) = self.collab.queue.dequeue_other() {
            if let Err(e) = self.collab.ops.process(item) {
                warn!(worker = self.id, error = %e, "background work item failed");
                self.metrics.record_collaborator_error();
            }
            self.metrics.record_background_item();
            self.stats.background += 1;
            if self.shutdown.is_triggered() {
                break;
            }
        }
    }

    fn decide(&mut self) -> Result<Decision> {
        let feasibility = Feasibility::new(
            !self.collab.corpus.is_empty(),
            self.collab.queue.pending_triage() > 0,
        );
        let weights = self.state.snapshot_weights();
        match choose(&weights, &feasibility, &mut self.rng) {
            Ok(decision) => {
                debug!(
                    worker = self.id,
                    action = %decision.action,
                    index = decision.action.index(),
                    probabilities = ?decision.probabilities,
                    "decided"
                );
                Ok(decision)
            }
            Err(e) => {
                error!(worker = self.id, ?weights, ?feasibility, error = %e, "no selectable action, stopping all workers");
                self.shutdown.trigger();
                self.phase = WorkerState::Stopped;
                Err(e)
            }
        }
    }

    fn dispatch(&mut self, action: Action) -> Dispatched {
        if action == Action::Triage {
            let Some(item) = self.collab.queue.dequeue_triage() else {
                return Dispatched::QueueDrained;
            };
            self.phase = WorkerState::Awaiting;
            return match self.collab.ops.triage(item) {
                Ok(outcome) => Dispatched::Done {
                    reward: outcome.reward,
                    seed_index: None,
                    error: None,
                },
                Err(e) => Dispatched::Done {
                    reward: 0.0,
                    seed_index: None,
                    error: Some(e),
                },
            };
        }

        let (program, seed_index) = match action.mutation_op() {
            None => (self.collab.ops.generate(&mut self.rng), None),
            Some(op) => match self.collab.corpus.choose_entry(&mut self.rng) {
                Some((index, seed)) => (
                    self.collab.ops.mutate(seed, op, &mut self.rng),
                    Some(index),
                ),
                None => {
                    return Dispatched::Done {
                        reward: 0.0,
                        seed_index: None,
                        error: Some(CollaboratorError::EmptyCorpus),
                    }
                }
            },
        };

        self.phase = WorkerState::Awaiting;
        match self.collab.sandbox.execute(&program) {
            Ok(exec) => {
                if let Some(hint) = exec.elapsed_hint {
                    trace!(worker = self.id, %action, hint, "sandbox elapsed hint");
                }
                Dispatched::Done {
                    reward: exec.reward,
                    seed_index,
                    error: None,
                }
            }
            Err(e) => Dispatched::Done {
                reward: 0.0,
                seed_index,
                error: Some(e),
            },
        }
    }
}

impl<P, T> std::fmt::Debug for WorkerLoop<P, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerLoop")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
