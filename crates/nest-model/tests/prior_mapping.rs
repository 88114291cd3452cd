use nest_core::NestError;
use nest_model::{Prior, PriorKind};
use proptest::prelude::*;

fn priors() -> Vec<Prior> {
    vec![
        Prior::uniform(-5.0, 5.0).unwrap(),
        Prior::jeffreys(0.01, 10.0).unwrap(),
        Prior::gauss(1.0, 2.0).unwrap(),
        Prior::exponential(3.0).unwrap(),
        Prior::laplace(-1.0, 0.5).unwrap(),
        Prior::cauchy(0.0, 1.0).unwrap(),
        Prior::gauss(0.0, 1.0).unwrap().with_limits(-1.0, 2.0).unwrap(),
        Prior::cauchy(0.0, 1.0).unwrap().with_limits(-3.0, 3.0).unwrap(),
    ]
}

proptest! {
    #[test]
    fn unit_round_trip(u in 0.001f64..0.999) {
        for prior in priors() {
            let d = prior.unit_to_domain(u);
            let back = prior.domain_to_unit(d);
            prop_assert!((back - u).abs() < 1e-7, "{:?}: {} -> {} -> {}", prior.kind(), u, d, back);
        }
    }

    #[test]
    fn limited_priors_stay_inside(u in 0.0f64..1.0) {
        let prior = Prior::gauss(0.0, 1.0).unwrap().with_limits(-1.0, 2.0).unwrap();
        let d = prior.unit_to_domain(u);
        prop_assert!(d >= -1.0 - 1e-9 && d <= 2.0 + 1e-9);
    }

    #[test]
    fn circular_residuals_fit_half_period(r in -100.0f64..100.0) {
        let prior = Prior::uniform(0.0, 360.0).unwrap().circular(360.0).unwrap();
        let wrapped = prior.wrap(r);
        prop_assert!(wrapped.abs() <= 180.0 + 1e-9);
        prop_assert!(((r - wrapped) / 360.0 - ((r - wrapped) / 360.0).round()).abs() < 1e-9);
    }
}

#[test]
fn domain_round_trip_on_support() {
    let uniform = Prior::uniform(-5.0, 5.0).unwrap();
    for x in [-4.5, -1.0, 0.0, 3.3] {
        assert!((uniform.unit_to_domain(uniform.domain_to_unit(x)) - x).abs() < 1e-12);
    }
    let jeffreys = Prior::jeffreys(0.01, 10.0).unwrap();
    for x in [0.02, 0.5, 7.0] {
        assert!((jeffreys.unit_to_domain(jeffreys.domain_to_unit(x)) - x).abs() < 1e-10);
    }
}

#[test]
fn densities_vanish_outside_limits() {
    let uniform = Prior::uniform(-5.0, 5.0).unwrap();
    assert!((uniform.result(0.0) - 0.1).abs() < 1e-12);
    assert_eq!(uniform.result(6.0), 0.0);
    assert_eq!(uniform.log_result(-6.0), f64::NEG_INFINITY);
    assert!(uniform.is_bound());

    let exp = Prior::exponential(1.0).unwrap();
    assert!(exp.is_out_of_limits(-0.1));
    assert_eq!(exp.result(-0.1), 0.0);
    assert!(!exp.is_bound());
}

#[test]
fn limited_gauss_is_renormalised() {
    let full = Prior::gauss(0.0, 1.0).unwrap();
    let half = full.clone().with_limits(0.0, 50.0).unwrap();
    assert!((half.result(0.5) - 2.0 * full.result(0.5)).abs() < 1e-9);
    assert_eq!(half.result(-0.5), 0.0);
}

#[test]
fn gauss_inverse_is_clamped() {
    let prior = Prior::gauss(0.0, 1.0).unwrap();
    assert_eq!(prior.unit_to_domain(0.0), -8.5);
    assert_eq!(prior.unit_to_domain(1.0), 8.5);
}

#[test]
fn partial_log_matches_difference() {
    for prior in priors() {
        let x = prior.unit_to_domain(0.37);
        let h = 1e-6;
        let numeric = (prior.log_result(x + h) - prior.log_result(x - h)) / (2.0 * h);
        assert!(
            (numeric - prior.partial_log(x)).abs() < 1e-4,
            "{:?}: {} vs {}",
            prior.kind(),
            numeric,
            prior.partial_log(x)
        );
    }
}

#[test]
fn invalid_arguments_are_config_errors() {
    assert!(matches!(Prior::uniform(1.0, 1.0), Err(NestError::Config(_))));
    assert!(matches!(Prior::jeffreys(0.0, 1.0), Err(NestError::Config(_))));
    assert!(matches!(Prior::gauss(0.0, -1.0), Err(NestError::Config(_))));
    let err = Prior::exponential(f64::NAN).unwrap_err();
    assert_eq!(err.info().code, "prior-scale");
}

#[test]
fn prior_serializes_with_kind_tag() {
    let prior = Prior::laplace(1.0, 2.0).unwrap();
    let json = serde_json::to_string(&prior).unwrap();
    assert!(json.contains("\"kind\":\"laplace\""));
    let back: Prior = serde_json::from_str(&json).unwrap();
    assert_eq!(back.kind(), PriorKind::Laplace { center: 1.0, scale: 2.0 });
}
