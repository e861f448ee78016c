//! Shared, lock-protected bandit state.
//!
//! Every worker holds an `Arc<SchedulerState>`. Decisions take a read lock
//! just long enough to compute the weight vector; outcomes take the write
//! lock for one estimator update plus epoch bookkeeping. The long part of a
//! round (executing the candidate) happens with no lock held.

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::Result;

use super::estimator::{reward_value, RewardEstimator};
use super::knobs::MabKnobs;
use super::schedule::{DoublingSchedule, EpochSchedule};
use super::types::{Action, ExplorationParams, RewardSample, NUM_ACTIONS};
use super::weights::compute_weights;

/// Internal mutable state of the scheduler.
struct MabInner {
    /// Per-action reward estimates
    estimator: RewardEstimator,
    /// Number of outcomes applied so far
    round: u64,
    /// Current Exp3.1 epoch (stays 0 when Exp3.1 is off)
    epoch: u32,
    /// Round at which the current epoch ends
    epoch_end: u64,
    /// Parameters in effect for the current epoch
    params: ExplorationParams,
}

/// Consistent view of the scheduler at one instant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Snapshot {
    /// Reward estimates in action order
    pub estimates: [f64; NUM_ACTIONS],
    /// Weights computed from `estimates` with the effective `eta`
    pub weights: [f64; NUM_ACTIONS],
    /// Outcomes applied so far
    pub round: u64,
    /// Current Exp3.1 epoch
    pub epoch: u32,
    /// Exploration parameters in effect
    pub params: ExplorationParams,
}

/// What `apply_outcome` did, for metrics and logging.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ApplyReport {
    /// Round count after this outcome
    pub round: u64,
    /// Epoch after this outcome
    pub epoch: u32,
    /// New estimate for the sample's action
    pub estimate: f64,
    /// Whether this outcome crossed an epoch boundary
    pub epoch_advanced: bool,
}

/// Shared bandit state: estimates, round counter, and exploration schedule.
///
/// # Example
///
/// ```ignore
/// let state = SchedulerState::new(MabKnobs::default())?;
/// let weights = state.snapshot_weights();
/// let decision = selector::choose(&weights, &feasibility, &mut rng)?;
/// // ... execute decision.action ...
/// state.apply_outcome(RewardSample::new(decision.action, elapsed, reward));
/// ```
pub struct SchedulerState {
    inner: RwLock<MabInner>,
    knobs: MabKnobs,
    schedule: Box<dyn EpochSchedule>,
}

impl SchedulerState {
    /// Create a state with neutral estimates and the default epoch schedule.
    ///
    /// # Errors
    ///
    /// Returns `SchedError::InvalidKnob` if `knobs` fail validation.
    pub fn new(knobs: MabKnobs) -> Result<Self> {
        let schedule = DoublingSchedule::from_knobs(&knobs);
        Self::with_schedule(knobs, Box::new(schedule))
    }

    /// Create a state with a custom Exp3.1 schedule.
    pub fn with_schedule(knobs: MabKnobs, schedule: Box<dyn EpochSchedule>) -> Result<Self> {
        Self::build(knobs, schedule, RewardEstimator::new())
    }

    /// Create a state seeded with explicit estimates.
    pub fn with_estimates(knobs: MabKnobs, estimates: [f64; NUM_ACTIONS]) -> Result<Self> {
        let schedule = DoublingSchedule::from_knobs(&knobs);
        Self::build(
            knobs,
            Box::new(schedule),
            RewardEstimator::from_estimates(estimates),
        )
    }

    fn build(
        knobs: MabKnobs,
        schedule: Box<dyn EpochSchedule>,
        estimator: RewardEstimator,
    ) -> Result<Self> {
        knobs.validate()?;
        let params = Self::params_for(&knobs, schedule.as_ref(), 0);
        let epoch_end = schedule.epoch_end(0);
        Ok(Self {
            inner: RwLock::new(MabInner {
                estimator,
                round: 0,
                epoch: 0,
                epoch_end,
                params,
            }),
            knobs,
            schedule,
        })
    }

    /// Compute the weight vector from a consistent view of the estimates.
    pub fn snapshot_weights(&self) -> [f64; NUM_ACTIONS] {
        let inner = self.inner.read();
        compute_weights(inner.estimator.estimates(), inner.params.eta)
    }

    /// Full consistent view for diagnostics.
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.read();
        let estimates = *inner.estimator.estimates();
        Snapshot {
            estimates,
            weights: compute_weights(&estimates, inner.params.eta),
            round: inner.round,
            epoch: inner.epoch,
            params: inner.params,
        }
    }

    /// Fold one completed action into the estimates.
    ///
    /// Atomic with respect to every other `apply_outcome` and snapshot.
    pub fn apply_outcome(&self, sample: RewardSample) -> ApplyReport {
        self.apply_outcome_with(sample, |_, _, _| {})
    }

    /// Like [`apply_outcome`](Self::apply_outcome), but calls `observe` with
    /// the report, the estimates and the parameters in effect before the
    /// write lock is released. Observers therefore see outcomes in the order
    /// they were applied. `observe` must not call back into this state.
    pub fn apply_outcome_with<F>(&self, sample: RewardSample, observe: F) -> ApplyReport
    where
        F: FnOnce(&ApplyReport, &[f64; NUM_ACTIONS], ExplorationParams),
    {
        let mut inner = self.inner.write();

        // Normalize with the parameters the action was chosen under.
        let value = reward_value(&sample, &self.knobs, inner.params.gamma);
        inner.round += 1;

        let mut epoch_advanced = false;
        if self.knobs.exp31_enabled {
            while inner.round >= inner.epoch_end {
                inner.epoch += 1;
                inner.epoch_end = self.schedule.epoch_end(inner.epoch);
                inner.params = Self::params_for(&self.knobs, self.schedule.as_ref(), inner.epoch);
                if self.knobs.exp31_restart {
                    inner.estimator.reset();
                }
                epoch_advanced = true;
                info!(
                    epoch = inner.epoch,
                    round = inner.round,
                    next_boundary = inner.epoch_end,
                    gamma = inner.params.gamma,
                    eta = inner.params.eta,
                    "exp3.1 epoch advanced"
                );
            }
        }

        // After any restart, so the boundary round seeds the new epoch.
        inner
            .estimator
            .update(sample.action, value, self.knobs.decay);

        let estimate = inner.estimator.read(sample.action);
        debug!(
            action = %sample.action,
            value,
            estimate,
            round = inner.round,
            "applied outcome"
        );

        let report = ApplyReport {
            round: inner.round,
            epoch: inner.epoch,
            estimate,
            epoch_advanced,
        };
        observe(&report, inner.estimator.estimates(), inner.params);
        report
    }

    /// Outcomes applied so far.
    pub fn round(&self) -> u64 {
        self.inner.read().round
    }

    /// Current Exp3.1 epoch.
    pub fn epoch(&self) -> u32 {
        self.inner.read().epoch
    }

    /// Current estimate for `action`.
    pub fn estimate(&self, action: Action) -> f64 {
        self.inner.read().estimator.read(action)
    }

    /// Exploration parameters currently in effect.
    pub fn params(&self) -> ExplorationParams {
        self.inner.read().params
    }

    /// Get the knobs configuration.
    pub fn knobs(&self) -> &MabKnobs {
        &self.knobs
    }

    /// Effective parameters for `epoch` given the mode toggles.
    fn params_for(knobs: &MabKnobs, schedule: &dyn EpochSchedule, epoch: u32) -> ExplorationParams {
        let base = ExplorationParams {
            gamma: knobs.gamma,
            eta: knobs.eta,
        };
        if knobs.exp31_enabled {
            schedule.params(epoch, base)
        } else if knobs.softmax_enabled {
            base
        } else {
            // Bandit disabled: uniform weights.
            ExplorationParams {
                gamma: knobs.gamma,
                eta: 0.0,
            }
        }
    }
}

impl std::fmt::Debug for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snap = self.snapshot();
        f.debug_struct("SchedulerState")
            .field("round", &snap.round)
            .field("epoch", &snap.epoch)
            .field("params", &snap.params)
            .field("estimates", &snap.estimates)
            .finish_non_exhaustive()
    }
}
