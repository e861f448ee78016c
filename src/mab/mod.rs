//! Multi-Armed Bandit (MAB) strategy scheduler for fuzzing workers.
//!
//! This module decides, round by round, which fuzzing action a worker runs
//! next: generate a program, mutate a corpus entry with one of six
//! operators, or triage a pending candidate. It learns from the coverage
//! each action gains per second of work.
//!
//! # Pipeline
//!
//! ```text
//! RewardEstimator ──► compute_weights ──► choose ──► Decision
//!        ▲                                              │
//!        └──────────── SchedulerState::apply_outcome ◄──┘
//! ```
//!
//! - **Estimator**: exponentially weighted reward rate per action
//! - **Weights**: `exp(eta * estimate)`, median-centered and clamped
//! - **Selector**: inverse-CDF draw over the feasible actions
//! - **State**: reader/writer-locked aggregate shared by all workers
//!
//! # Modes
//!
//! - **softmax**: constant `eta`
//! - **exp3.1**: round-indexed epochs re-tune `eta`/`gamma` through a
//!   pluggable [`EpochSchedule`]
//!
//! # Usage
//!
//! ```ignore
//! use fuzzloom::mab::{choose, Feasibility, MabKnobs, RewardSample, SchedulerState};
//!
//! let state = SchedulerState::new(MabKnobs::default())?;
//! let weights = state.snapshot_weights();
//! let decision = choose(&weights, &Feasibility::new(true, false), &mut rng)?;
//! let (elapsed, reward) = run(decision.action);
//! state.apply_outcome(
//!     RewardSample::new(decision.action, elapsed, reward)
//!         .with_propensity(decision.propensity()),
//! );
//! ```

mod estimator;
mod knobs;
mod schedule;
mod scheduler;
mod selector;
mod types;
mod weights;

pub use estimator::{reward_value, RewardEstimator};
pub use knobs::{exp31_base_rounds, MabKnobs, RewardPolicy};
pub use schedule::{DoublingSchedule, EpochSchedule};
pub use scheduler::{ApplyReport, SchedulerState, Snapshot};
pub use selector::{choose, probabilities};
pub use types::{
    Action, Decision, ExplorationParams, Feasibility, MutationOp, RewardSample, NUM_ACTIONS,
};
pub use weights::{compute_weights, median, WEIGHT_MAX, WEIGHT_MIN};
