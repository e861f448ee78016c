//! Weighted categorical sampling over the feasible actions.

use rand::Rng;

use crate::error::{Result, SchedError};

use super::types::{Action, Decision, Feasibility, NUM_ACTIONS};

/// Draw one feasible action with probability proportional to its weight.
///
/// Infeasible actions contribute zero mass but keep their learned weight for
/// later rounds. The returned [`Decision`] carries the probability vector
/// actually used, which callers log and may feed back as a propensity.
///
/// Sampling is inverse-CDF over the fixed action order: draw
/// `u ~ Uniform(0, W)` and take the first feasible action whose cumulative
/// mass reaches `u`, so lower indices win exact boundary ties.
///
/// # Errors
///
/// Returns `SchedError::NoFeasibleAction` if the total feasible weight is
/// zero (or not a finite positive number). This is a fatal condition.
pub fn choose<R: Rng + ?Sized>(
    weights: &[f64; NUM_ACTIONS],
    feasibility: &Feasibility,
    rng: &mut R,
) -> Result<Decision> {
    let probabilities = probabilities(weights, feasibility)?;
    let realized = realized_weights(weights, feasibility);
    let total: f64 = realized.iter().sum();

    let u = rng.gen::<f64>() * total;
    let mut cumulative = 0.0;
    let mut chosen = None;
    for action in Action::ALL {
        let w = realized[action.index()];
        if w <= 0.0 {
            continue;
        }
        cumulative += w;
        chosen = Some(action);
        if u <= cumulative {
            break;
        }
    }

    // `total > 0` guarantees some feasible action was visited; falling off
    // the end only happens through rounding and lands on the last one.
    let action = chosen.ok_or(SchedError::NoFeasibleAction)?;
    Ok(Decision {
        action,
        probabilities,
    })
}

/// Normalized selection probabilities without drawing.
///
/// # Errors
///
/// Same as [`choose`].
pub fn probabilities(
    weights: &[f64; NUM_ACTIONS],
    feasibility: &Feasibility,
) -> Result<[f64; NUM_ACTIONS]> {
    let realized = realized_weights(weights, feasibility);
    let total: f64 = realized.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        return Err(SchedError::NoFeasibleAction);
    }
    Ok(realized.map(|w| w / total))
}

fn realized_weights(weights: &[f64; NUM_ACTIONS], feasibility: &Feasibility) -> [f64; NUM_ACTIONS] {
    let mut realized = [0.0; NUM_ACTIONS];
    for action in Action::ALL {
        if feasibility.allows(action) {
            let w = weights[action.index()];
            realized[action.index()] = if w.is_finite() && w > 0.0 { w } else { 0.0 };
        }
    }
    realized
}
