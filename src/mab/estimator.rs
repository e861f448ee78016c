//! Per-action reward-rate estimation.

use super::knobs::{MabKnobs, RewardPolicy};
use super::types::{Action, RewardSample, NUM_ACTIONS};

/// Running per-action estimate of reward per second.
///
/// Each estimate is an exponentially weighted moving average, so recent
/// outcomes dominate and the scheduler follows the campaign as the coverage
/// landscape shifts. Untried actions sit at the neutral value `0.0`.
///
/// Not synchronized; [`SchedulerState`](super::SchedulerState) guards it.
#[derive(Clone, Debug, Default)]
pub struct RewardEstimator {
    estimates: [f64; NUM_ACTIONS],
    samples: [u64; NUM_ACTIONS],
}

impl RewardEstimator {
    /// Create an estimator with every estimate at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an estimator seeded with explicit estimates.
    ///
    /// Non-finite values are sanitized the same way updates are.
    pub fn from_estimates(estimates: [f64; NUM_ACTIONS]) -> Self {
        Self {
            estimates: estimates.map(sanitize),
            samples: [0; NUM_ACTIONS],
        }
    }

    /// Incorporate `value` into the estimate for `action`.
    ///
    /// The first sample for an action replaces the neutral baseline outright.
    pub fn update(&mut self, action: Action, value: f64, decay: f64) {
        let i = action.index();
        let value = sanitize(value);
        let next = if self.samples[i] == 0 {
            value
        } else {
            let current = self.estimates[i];
            current + decay * (value - current)
        };
        self.estimates[i] = sanitize(next);
        self.samples[i] = self.samples[i].saturating_add(1);
    }

    /// Current estimate for `action`.
    #[inline]
    pub fn read(&self, action: Action) -> f64 {
        self.estimates[action.index()]
    }

    /// All estimates in action order.
    #[inline]
    pub fn estimates(&self) -> &[f64; NUM_ACTIONS] {
        &self.estimates
    }

    /// Number of samples folded into the estimate for `action`.
    pub fn sample_count(&self, action: Action) -> u64 {
        self.samples[action.index()]
    }

    /// Drop everything learned so far.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Convert a sample into the value fed to the estimator.
///
/// The rate is `reward / elapsed` with non-finite or negative rewards treated
/// as zero and elapsed time floored at `knobs.min_elapsed_secs`.
pub fn reward_value(sample: &RewardSample, knobs: &MabKnobs, gamma: f64) -> f64 {
    let reward = if sample.reward.is_finite() {
        sample.reward.max(0.0)
    } else {
        0.0
    };
    let elapsed = if sample.elapsed_secs.is_finite() {
        sample.elapsed_secs.max(knobs.min_elapsed_secs)
    } else {
        knobs.min_elapsed_secs
    };
    let rate = reward / elapsed;

    match knobs.reward_policy {
        RewardPolicy::Plain => rate,
        RewardPolicy::ImportanceWeighted => {
            let p = sample.propensity.filter(|p| p.is_finite()).unwrap_or(1.0);
            let denom = p.clamp(0.0, 1.0) + gamma;
            if denom > 0.0 {
                rate / denom
            } else {
                rate
            }
        }
    }
}

fn sanitize(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(-f64::MAX, f64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untried_actions_are_neutral() {
        let est = RewardEstimator::new();
        for action in Action::ALL {
            assert_eq!(est.read(action), 0.0);
            assert_eq!(est.sample_count(action), 0);
        }
    }

    #[test]
    fn test_first_sample_initializes() {
        let mut est = RewardEstimator::new();
        est.update(Action::Splice, 40.0, 0.1);
        assert_eq!(est.read(Action::Splice), 40.0);
        assert_eq!(est.sample_count(Action::Splice), 1);
        assert_eq!(est.read(Action::Generate), 0.0);
    }

    #[test]
    fn test_recent_samples_dominate() {
        let mut est = RewardEstimator::new();
        est.update(Action::Mutate, 100.0, 0.5);
        for _ in 0..20 {
            est.update(Action::Mutate, 0.0, 0.5);
        }
        assert!(est.read(Action::Mutate) < 1e-3);
    }

    #[test]
    fn test_estimates_stay_finite() {
        let mut est = RewardEstimator::new();
        est.update(Action::Generate, f64::INFINITY, 0.5);
        assert!(est.read(Action::Generate).is_finite());
        est.update(Action::Generate, f64::NAN, 0.5);
        assert!(est.read(Action::Generate).is_finite());
    }

    #[test]
    fn test_reset() {
        let mut est = RewardEstimator::from_estimates([1.0; NUM_ACTIONS]);
        est.reset();
        assert_eq!(est.estimates(), &[0.0; NUM_ACTIONS]);
    }

    #[test]
    fn test_reward_value_floors_elapsed() {
        let knobs = MabKnobs::default();
        let zero = RewardSample::new(Action::Generate, 0.0, 1.0);
        assert_eq!(reward_value(&zero, &knobs, 0.0), 1.0 / knobs.min_elapsed_secs);
        let negative = RewardSample::new(Action::Generate, -3.0, 1.0);
        assert!(reward_value(&negative, &knobs, 0.0).is_finite());
        let nan = RewardSample::new(Action::Generate, f64::NAN, 2.0);
        assert!(reward_value(&nan, &knobs, 0.0).is_finite());
    }

    #[test]
    fn test_reward_value_plain_rate() {
        let knobs = MabKnobs::default();
        let s = RewardSample::new(Action::Mutate, 2.0, 10.0).with_propensity(0.1);
        assert!((reward_value(&s, &knobs, 0.1) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_reward_value_importance_weighted() {
        let knobs = MabKnobs::default().with_reward_policy(RewardPolicy::ImportanceWeighted);
        let s = RewardSample::new(Action::Mutate, 2.0, 10.0).with_propensity(0.15);
        // 5.0 / (0.15 + 0.1)
        assert!((reward_value(&s, &knobs, 0.1) - 20.0).abs() < 1e-9);

        // Missing propensity is treated as certain selection.
        let s = RewardSample::new(Action::Mutate, 2.0, 10.0);
        assert!((reward_value(&s, &knobs, 0.0) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_negative_reward_clamped() {
        let knobs = MabKnobs::default();
        let s = RewardSample::new(Action::Triage, 1.0, -4.0);
        assert_eq!(reward_value(&s, &knobs, 0.0), 0.0);
    }
}
