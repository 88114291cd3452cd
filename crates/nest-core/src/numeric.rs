//! Log-space arithmetic used by the evidence accounting.

/// Sentinel used where a log value must be finite but represents "nothing".
pub const LOG_ZERO: f64 = -1.0e300;

/// Natural log of 10, for reporting evidences in 10-log.
pub const LN_10: f64 = std::f64::consts::LN_10;

/// Returns `ln(exp(a) + exp(b))` without overflow.
pub fn log_add_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// Returns `ln(sum(exp(values)))`; negative infinity for an empty slice.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = values.iter().map(|v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Weighted mean and standard deviation of `values`.
///
/// Weights need not be normalised. Returns `(0, 0)` when all weights vanish.
pub fn weighted_mean_std(values: &[f64], weights: &[f64]) -> (f64, f64) {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return (0.0, 0.0);
    }
    let mean = values
        .iter()
        .zip(weights)
        .map(|(v, w)| v * w)
        .sum::<f64>()
        / total;
    let var = values
        .iter()
        .zip(weights)
        .map(|(v, w)| w * (v - mean) * (v - mean))
        .sum::<f64>()
        / total;
    (mean, var.max(0.0).sqrt())
}

/// Wraps `value` into `(-period/2, period/2]`.
pub fn wrap_half_period(value: f64, period: f64) -> f64 {
    if period <= 0.0 || !value.is_finite() {
        return value;
    }
    let half = 0.5 * period;
    let mut r = (value + half).rem_euclid(period) - half;
    if r <= -half {
        r += period;
    }
    r
}
