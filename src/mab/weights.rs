//! Exponential weights with overflow protection.

use super::types::NUM_ACTIONS;

/// Upper clamp for a single weight.
pub const WEIGHT_MAX: f64 = 1.0e300;

/// Lower clamp for a single weight.
pub const WEIGHT_MIN: f64 = 1.0e-300;

/// Convert estimates into unnormalized exponential weights.
///
/// Every exponent is centered on the median of the scaled estimates before
/// `exp`, which leaves the normalized distribution unchanged while keeping
/// the exponents near zero. Results are clamped into
/// `[WEIGHT_MIN, WEIGHT_MAX]`, so every weight is strictly positive and
/// finite for any input, including non-finite estimates.
pub fn compute_weights(estimates: &[f64; NUM_ACTIONS], eta: f64) -> [f64; NUM_ACTIONS] {
    let scaled = estimates.map(|e| finite_or_zero(eta * e));
    let center = median(&scaled);

    // Both operands are finite, so the difference is never NaN.
    scaled.map(|x| (x - center).exp().clamp(WEIGHT_MIN, WEIGHT_MAX))
}

/// Median of the 8 values: mean of the 4th and 5th order statistics.
///
/// Halves are summed separately so two huge values cannot overflow.
pub fn median(values: &[f64; NUM_ACTIONS]) -> f64 {
    let mut sorted = *values;
    sorted.sort_by(f64::total_cmp);
    let lo = sorted[NUM_ACTIONS / 2 - 1];
    let hi = sorted[NUM_ACTIONS / 2];
    lo / 2.0 + hi / 2.0
}

fn finite_or_zero(x: f64) -> f64 {
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
    fn test_zero_estimates_give_unit_weights() {
        let w = compute_weights(&[0.0; NUM_ACTIONS], 1.0);
        assert_eq!(w, [1.0; NUM_ACTIONS]);
    }

    #[test]
    fn test_median_uses_middle_pair() {
        let v = [8.0, 1.0, 7.0, 2.0, 6.0, 3.0, 5.0, 4.0];
        assert_eq!(median(&v), 4.5);
    }

    #[test]
    fn test_median_does_not_overflow() {
        let v = [f64::MAX; NUM_ACTIONS];
        assert_eq!(median(&v), f64::MAX);
    }

    #[test]
    fn test_weights_are_proportional() {
        let est = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let w = compute_weights(&est, 1.0);
        for i in 1..NUM_ACTIONS {
            let ratio = w[i] / w[i - 1];
            assert!((ratio - 1.0_f64.exp()).abs() < 1e-9, "ratio {ratio}");
        }
    }

    #[test]
    fn test_extreme_estimate_is_clamped() {
        let mut est = [0.0; NUM_ACTIONS];
        est[3] = 1e308;
        let w = compute_weights(&est, 1.0);
        assert_eq!(w[3], WEIGHT_MAX);
        assert!(w.iter().all(|x| x.is_finite() && *x > 0.0));
    }

    #[test]
    fn test_extreme_negative_is_clamped() {
        let mut est = [0.0; NUM_ACTIONS];
        est[0] = -1e308;
        let w = compute_weights(&est, 10.0);
        assert_eq!(w[0], WEIGHT_MIN);
    }

    #[test]
    fn test_non_finite_inputs_stay_in_range() {
        let est = [
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NAN,
            f64::MAX,
            -f64::MAX,
            0.0,
            1.0,
            f64::INFINITY,
        ];
        let w = compute_weights(&est, 2.0);
        for x in w {
            assert!((WEIGHT_MIN..=WEIGHT_MAX).contains(&x), "weight {x}");
        }
    }
}
