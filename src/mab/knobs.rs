//! Configuration knobs for the MAB scheduler.
//!
//! All knobs have defaults suited to a long-running campaign. Most users
//! only touch `eta` and the two mode toggles.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedError};

use super::types::NUM_ACTIONS;

/// How an observed reward is turned into the value fed to the estimator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardPolicy {
    /// Feed the raw reward rate.
    #[default]
    Plain,
    /// Divide the rate by `propensity + gamma` before feeding it.
    ImportanceWeighted,
}

/// Configuration knobs for the Multi-Armed Bandit scheduler.
///
/// # Weight Model
///
/// ```text
/// weight[i] = clamp(exp(eta * estimate[i] - median(eta * estimate)), 1e-300, 1e300)
/// ```
///
/// # Modes
///
/// - **softmax**: `eta` is constant for the whole campaign.
/// - **exp31**: `eta`/`gamma` follow an epoch schedule indexed by round count;
///   the estimator optionally restarts at every epoch boundary.
/// - Neither: weights are uniform over feasible actions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MabKnobs {
    // === Mode toggles ===
    /// Plain softmax weighting with a constant `eta`.
    /// Default: true
    pub softmax_enabled: bool,

    /// Exp3.1 epoch annealing of `eta`/`gamma`.
    /// Default: false
    pub exp31_enabled: bool,

    // === Weight shaping ===
    /// Inverse temperature applied to estimates. Must be finite and > 0.
    /// Default: 0.05
    pub eta: f64,

    /// Exploration rate in `[0, 1]`. Used by importance weighting and
    /// annealed by the Exp3.1 schedule.
    /// Default: 0.1
    pub gamma: f64,

    // === Estimation ===
    /// Smoothing factor in `(0, 1]` for the per-action reward estimate.
    /// Default: 0.05 (roughly the last 40 samples dominate)
    pub decay: f64,

    /// Floor applied to elapsed time before computing a rate (seconds).
    /// Default: 1e-6
    pub min_elapsed_secs: f64,

    /// Reward normalization policy.
    /// Default: `Plain`
    pub reward_policy: RewardPolicy,

    // === Exp3.1 schedule ===
    /// Length of the first epoch in rounds.
    /// Default: K ln K / (e - 1) with K = 8
    pub exp31_base_rounds: f64,

    /// Epoch length growth factor.
    /// Default: 4.0
    pub exp31_growth: f64,

    /// Epoch after which `eta` stops growing.
    /// Default: 8
    pub exp31_max_epoch: u32,

    /// Restart the estimator at each epoch boundary.
    /// Default: true
    pub exp31_restart: bool,
}

/// First Exp3.1 epoch length for K arms: `K ln K / (e - 1)`.
pub fn exp31_base_rounds(k: usize) -> f64 {
    let k = k as f64;
    k * k.ln() / (std::f64::consts::E - 1.0)
}

impl Default for MabKnobs {
    fn default() -> Self {
        Self {
            softmax_enabled: true,
            exp31_enabled: false,

            eta: 0.05,
            gamma: 0.1,

            decay: 0.05,
            min_elapsed_secs: 1e-6,
            reward_policy: RewardPolicy::Plain,

            exp31_base_rounds: exp31_base_rounds(NUM_ACTIONS),
            exp31_growth: 4.0,
            exp31_max_epoch: 8,
            exp31_restart: true,
        }
    }
}

impl MabKnobs {
    /// Create knobs with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check every hyperparameter against its valid range.
    ///
    /// # Errors
    ///
    /// Returns `SchedError::InvalidKnob` naming the first offending knob.
    pub fn validate(&self) -> Result<()> {
        let invalid = |name: &'static str, value: f64| Err(SchedError::InvalidKnob { name, value });

        if !(self.eta.is_finite() && self.eta > 0.0) {
            return invalid("eta", self.eta);
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return invalid("gamma", self.gamma);
        }
        if !(self.decay > 0.0 && self.decay <= 1.0) {
            return invalid("decay", self.decay);
        }
        if !(self.min_elapsed_secs.is_finite() && self.min_elapsed_secs > 0.0) {
            return invalid("min_elapsed_secs", self.min_elapsed_secs);
        }
        if self.exp31_enabled {
            if !(self.exp31_base_rounds.is_finite() && self.exp31_base_rounds >= 1.0) {
                return invalid("exp31_base_rounds", self.exp31_base_rounds);
            }
            if !(self.exp31_growth.is_finite() && self.exp31_growth > 1.0) {
                return invalid("exp31_growth", self.exp31_growth);
            }
            // Epoch lengths must grow by at least one round per epoch.
            if self.exp31_base_rounds * (self.exp31_growth - 1.0) < 1.0 {
                return invalid("exp31_growth", self.exp31_growth);
            }
        }
        Ok(())
    }

    /// Builder method to set `eta`.
    pub fn with_eta(mut self, eta: f64) -> Self {
        self.eta = eta;
        self
    }

    /// Builder method to set `gamma`.
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Builder method to set the estimator smoothing factor.
    pub fn with_decay(mut self, decay: f64) -> Self {
        self.decay = decay;
        self
    }

    /// Builder method to enable Exp3.1 epoch annealing.
    pub fn with_exp31(mut self, enabled: bool) -> Self {
        self.exp31_enabled = enabled;
        self
    }

    /// Builder method to toggle softmax weighting.
    pub fn with_softmax(mut self, enabled: bool) -> Self {
        self.softmax_enabled = enabled;
        self
    }

    /// Builder method to set the reward policy.
    pub fn with_reward_policy(mut self, policy: RewardPolicy) -> Self {
        self.reward_policy = policy;
        self
    }
}
