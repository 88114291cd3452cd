use nest_core::numeric::{log_add_exp, log_sum_exp, weighted_mean_std, wrap_half_period};
use proptest::prelude::*;

#[test]
fn log_add_exp_handles_negative_infinity() {
    assert_eq!(log_add_exp(f64::NEG_INFINITY, 2.0), 2.0);
    assert_eq!(log_add_exp(-1.0, f64::NEG_INFINITY), -1.0);
    assert!((log_add_exp(0.0, 0.0) - 2f64.ln()).abs() < 1e-15);
    assert_eq!(log_sum_exp(&[]), f64::NEG_INFINITY);
}

#[test]
fn weighted_statistics_of_constant_are_exact() {
    let (mean, std) = weighted_mean_std(&[3.0, 3.0, 3.0], &[0.2, 0.5, 0.3]);
    assert!((mean - 3.0).abs() < 1e-15);
    assert!(std.abs() < 1e-7);
    assert_eq!(weighted_mean_std(&[1.0], &[0.0]), (0.0, 0.0));
}

proptest! {
    #[test]
    fn log_add_exp_matches_direct_sum(a in -50.0f64..50.0, b in -50.0f64..50.0) {
        let direct = (a.exp() + b.exp()).ln();
        prop_assert!((log_add_exp(a, b) - direct).abs() < 1e-9);
        prop_assert!((log_sum_exp(&[a, b]) - direct).abs() < 1e-9);
    }

    #[test]
    fn wrapped_residuals_stay_within_half_period(x in -100.0f64..100.0, period in 0.1f64..10.0) {
        let r = wrap_half_period(x, period);
        prop_assert!(r <= 0.5 * period + 1e-12);
        prop_assert!(r > -0.5 * period - 1e-12);
        let k = ((x - r) / period).round();
        prop_assert!((x - r - k * period).abs() < 1e-9);
    }
}
