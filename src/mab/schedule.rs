//! Exp3.1 epoch schedules.
//!
//! Exp3.1 runs Exp3 in epochs of growing length and re-tunes the exploration
//! parameters at every boundary. Here epochs are indexed by the global round
//! counter, and the schedule is a trait so campaigns can plug in their own.

use std::fmt::Debug;

use super::knobs::MabKnobs;
use super::types::ExplorationParams;

/// Round-indexed epoch schedule.
///
/// Implementations must be monotone: `epoch_end(r + 1) > epoch_end(r)`.
pub trait EpochSchedule: Send + Sync + Debug {
    /// Round count at which `epoch` ends and `epoch + 1` begins.
    fn epoch_end(&self, epoch: u32) -> u64;

    /// Exploration parameters in effect during `epoch`.
    fn params(&self, epoch: u32, base: ExplorationParams) -> ExplorationParams;
}

/// Geometric epochs: lengths grow by `growth`, `gamma` halves and `eta`
/// doubles each epoch (until `max_epoch`).
#[derive(Clone, Debug)]
pub struct DoublingSchedule {
    base_rounds: f64,
    growth: f64,
    max_epoch: u32,
}

impl DoublingSchedule {
    /// Create a schedule. `base_rounds >= 1`, `growth > 1`.
    ///
    /// When `base_rounds * (growth - 1) < 1` consecutive geometric ends can
    /// round to the same value; those schedules add `epoch` to every end so
    /// each epoch still lasts at least one round.
    pub fn new(base_rounds: f64, growth: f64, max_epoch: u32) -> Self {
        Self {
            base_rounds,
            growth,
            max_epoch,
        }
    }

    /// Schedule described by the Exp3.1 knobs.
    pub fn from_knobs(knobs: &MabKnobs) -> Self {
        Self::new(
            knobs.exp31_base_rounds,
            knobs.exp31_growth,
            knobs.exp31_max_epoch,
        )
    }
}

impl EpochSchedule for DoublingSchedule {
    fn epoch_end(&self, epoch: u32) -> u64 {
        let mut end = (self.base_rounds * self.growth.powi(epoch as i32)).ceil();
        if self.base_rounds * (self.growth - 1.0) < 1.0 {
            end += f64::from(epoch);
        }
        if end >= u64::MAX as f64 {
            u64::MAX
        } else {
            end as u64
        }
    }

    fn params(&self, epoch: u32, base: ExplorationParams) -> ExplorationParams {
        let scale = 2f64.powi(epoch.min(self.max_epoch) as i32);
        ExplorationParams {
            gamma: (base.gamma / 2f64.powi(epoch.min(1023) as i32)).min(1.0),
            eta: base.eta * scale,
        }
    }
}
