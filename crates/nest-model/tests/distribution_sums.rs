use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::sync::Arc;

use nest_core::NestError;
use nest_model::{
    ErrorDistribution, Model, ParIndex, PolynomialModel, Prior, Problem, XyAccuracy,
};

fn line_problem() -> Problem {
    let model: Arc<dyn Model> =
        Arc::new(PolynomialModel::new(1).with_prior(Prior::uniform(-10.0, 10.0).unwrap()));
    let xs: Vec<f64> = (0..8).map(f64::from).collect();
    let ys: Vec<f64> = xs.iter().map(|x| 1.0 + 0.5 * x + 0.3 * (x * 1.7).sin()).collect();
    Problem::classic(model, xs, ys).unwrap()
}

fn count_problem() -> Problem {
    let model: Arc<dyn Model> =
        Arc::new(PolynomialModel::new(1).with_prior(Prior::uniform(0.0, 10.0).unwrap()));
    Problem::classic(model, vec![0.0, 1.0, 2.0, 3.0], vec![1.0, 3.0, 2.0, 6.0]).unwrap()
}

fn probability_problem() -> Problem {
    let model: Arc<dyn Model> =
        Arc::new(PolynomialModel::new(1).with_prior(Prior::uniform(0.0, 1.0).unwrap()));
    Problem::classic(model, vec![0.0, 1.0, 2.0], vec![0.0, 1.0, 1.0]).unwrap()
}

fn continuous() -> Vec<ErrorDistribution> {
    vec![
        ErrorDistribution::gauss(0.7),
        ErrorDistribution::laplace(0.7),
        ErrorDistribution::cauchy(0.7),
        ErrorDistribution::uniform(2.0),
        ErrorDistribution::exponential(0.7, 1.5),
        ErrorDistribution::mixed(ErrorDistribution::gauss(0.5), ErrorDistribution::gauss(3.0), 0.8)
            .unwrap(),
    ]
}

#[test]
fn log_likelihood_is_the_sum_of_the_data_terms() {
    let problem = line_problem();
    let params = [0.9, 0.55];
    for dist in continuous() {
        let hypars = dist.hyper_values();
        let total = dist.log_likelihood(&problem, &params, &hypars);
        let parts: f64 = dist.log_l_data(&problem, &params, &hypars, None).iter().sum();
        assert!(total.is_finite(), "{}", dist.name());
        assert!((total - parts).abs() < 1e-12, "{}", dist.name());
    }

    let counts = count_problem();
    let poisson = ErrorDistribution::poisson();
    let total = poisson.log_likelihood(&counts, &[1.0, 1.5], &[]);
    let parts: f64 = poisson.log_l_data(&counts, &[1.0, 1.5], &[], None).iter().sum();
    assert!((total - parts).abs() < 1e-12);

    let coins = probability_problem();
    let bernoulli = ErrorDistribution::bernoulli();
    let total = bernoulli.log_likelihood(&coins, &[0.2, 0.3], &[]);
    let expected = (0.8f64).ln() + (0.5f64).ln() + (0.8f64).ln();
    assert!((total - expected).abs() < 1e-12);
}

#[test]
fn gauss_matches_the_closed_form() {
    let problem = line_problem();
    let params = [1.0, 0.5];
    let sigma = 0.3;
    let residuals = problem.residuals(&params);
    let n = residuals.len() as f64;
    let chisq: f64 = residuals.iter().map(|r| r * r).sum();
    let expected = -0.5 * n * (2.0 * PI * sigma * sigma).ln() - 0.5 * chisq / (sigma * sigma);
    let dist = ErrorDistribution::gauss(sigma);
    let got = dist.log_likelihood(&problem, &params, &[sigma]);
    assert!((got - expected).abs() < 1e-10);
}

#[test]
fn mock_data_replaces_observations() {
    let problem = line_problem();
    let dist = ErrorDistribution::gauss(1.0);
    let params = [1.0, 0.5];
    let perfect = problem.result(&params);
    let mock = dist.log_l_data(&problem, &params, &[1.0], Some(&perfect));
    let expected = -0.5 * (2.0 * PI).ln();
    assert!(mock.iter().all(|l| (l - expected).abs() < 1e-12));
}

#[test]
fn analytic_gradients_match_differences() {
    let problem = line_problem();
    let params = [0.9, 0.55];
    let fit_index = [ParIndex::Param(0), ParIndex::Param(1), ParIndex::Hyper(0)];
    for dist in continuous() {
        if dist.name() == "uniform" {
            continue;
        }
        let hypars = dist.hyper_values();
        let analytic = dist.partial_log_l(&problem, &params, &hypars, &fit_index);
        let h = 1e-6;
        for (slot, index) in fit_index.iter().enumerate() {
            let mut p = params.to_vec();
            let mut hy = hypars.clone();
            let v = index.get(&p, &hy);
            index.set(&mut p, &mut hy, v + h);
            let up = dist.log_likelihood(&problem, &p, &hy);
            index.set(&mut p, &mut hy, v - h);
            let down = dist.log_likelihood(&problem, &p, &hy);
            let numeric = (up - down) / (2.0 * h);
            assert!(
                (numeric - analytic[slot]).abs() < 1e-4 * numeric.abs().max(1.0),
                "{} slot {}: {} vs {}",
                dist.name(),
                slot,
                numeric,
                analytic[slot]
            );
        }
    }
}

#[test]
fn mixed_fraction_gradient_and_count() {
    let problem = line_problem();
    let mut dist =
        ErrorDistribution::mixed(ErrorDistribution::gauss(0.5), ErrorDistribution::gauss(3.0), 0.3)
            .unwrap();
    assert_eq!(dist.nphypar(), 3);
    assert_eq!(dist.hyper_names(), vec!["first.scale", "second.scale", "fraction"]);
    dist.set_prior(2, Prior::uniform(0.0, 1.0).unwrap()).unwrap();
    assert_eq!(dist.hyper_fit_index(), vec![ParIndex::Hyper(2)]);

    let params = [1.0, 0.5];
    let hypars = dist.hyper_values();
    let grad = dist.partial_log_l(&problem, &params, &hypars, &[ParIndex::Hyper(2)]);
    let h = 1e-6;
    let up = dist.log_likelihood(&problem, &params, &[0.5, 3.0, 0.3 + h]);
    let down = dist.log_likelihood(&problem, &params, &[0.5, 3.0, 0.3 - h]);
    assert!((grad[0] - (up - down) / (2.0 * h)).abs() < 1e-5);
}

#[test]
fn partial_data_is_lazy_per_index() {
    let problem = line_problem();
    let dist = ErrorDistribution::gauss(0.5);
    let index = [ParIndex::Hyper(0), ParIndex::Param(1)];
    let mut columns = dist.partial_data(&problem, &[1.0, 0.5], &[0.5], &index).unwrap();
    assert_eq!(columns.size_hint(), (2, Some(2)));
    let first = columns.next().unwrap();
    assert_eq!(first.len(), problem.ndata());
    assert_eq!(columns.size_hint(), (1, Some(1)));
    assert!(columns.next().is_some());
    assert!(columns.next().is_none());
}

#[test]
fn distance_has_no_analytic_gradient() {
    let problem = Problem::order(vec![0.0, 1.0, 1.0, 0.0], vec![0.0, 0.0, 1.0, 1.0]).unwrap();
    let dist = ErrorDistribution::distance();
    dist.accepts(&problem).unwrap();
    let tour = [0.0, 1.0, 2.0, 3.0];
    assert!((dist.log_likelihood(&problem, &tour, &[]) + 4.0).abs() < 1e-12);
    assert!(dist.partial_data(&problem, &tour, &[], &[]).is_none());
}

#[test]
fn gauss2d_scores_both_residuals() {
    let model: Arc<dyn Model> =
        Arc::new(PolynomialModel::new(1).with_prior(Prior::uniform(-10.0, 10.0).unwrap()));
    let problem = Problem::errors_in_xy(
        model,
        vec![0.0, 1.0],
        vec![0.0, 1.0],
        XyAccuracy::independent(&[0.2, 0.2], &[0.3, 0.3]),
    )
    .unwrap();
    let dist = ErrorDistribution::gauss2d();
    dist.accepts(&problem).unwrap();
    let on_line = [0.0, 1.0, 0.0, 1.0];
    let det: f64 = 0.04 * 0.09;
    let expected = -(det.ln() + (2.0 * PI).ln());
    let got = dist.log_likelihood(&problem, &on_line, &[0.0]);
    assert!((got - expected).abs() < 1e-10);
    let shifted = [0.0, 1.0, 0.1, 1.0];
    assert!(dist.log_likelihood(&problem, &shifted, &[0.0]) < got);
    let sum: f64 = dist.log_l_data(&problem, &shifted, &[0.0], None).iter().sum();
    assert!((sum - dist.log_likelihood(&problem, &shifted, &[0.0])).abs() < 1e-12);
}

#[test]
fn gauss2d_normalisation_carries_one_log_two_pi_per_datum() {
    let model: Arc<dyn Model> =
        Arc::new(PolynomialModel::new(1).with_prior(Prior::uniform(-10.0, 10.0).unwrap()));
    let problem = Problem::errors_in_xy(
        model,
        vec![0.0],
        vec![0.0],
        XyAccuracy::independent(&[1.0], &[1.0]),
    )
    .unwrap();
    let got = ErrorDistribution::gauss2d().log_likelihood(&problem, &[0.0, 1.0, 0.0], &[0.0]);
    assert!((got + 0.5 * (2.0 * PI).ln()).abs() < 1e-12, "{got}");
}

#[test]
fn incompatible_combinations_are_rejected() {
    let problem = line_problem();
    let err = ErrorDistribution::gauss2d().accepts(&problem).unwrap_err();
    assert!(matches!(err, NestError::UnsupportedCombination(_)));
    let err = ErrorDistribution::distance().accepts(&problem).unwrap_err();
    assert_eq!(err.info().code, "distance-order");

    let weighted = problem.clone().with_weights(vec![1.0; 8]).unwrap();
    let err = ErrorDistribution::bernoulli().accepts(&weighted).unwrap_err();
    assert_eq!(err.info().code, "bernoulli-weights");

    let with_accuracy = problem.with_accuracy(vec![0.5; 8]).unwrap();
    ErrorDistribution::from_name("gauss", Some([0.1, 10.0]))
        .unwrap()
        .accepts(&with_accuracy)
        .unwrap();
    let err = ErrorDistribution::from_name("laplace", Some([0.1, 10.0]))
        .unwrap()
        .accepts(&with_accuracy)
        .unwrap_err();
    assert_eq!(err.info().code, "accuracy-scale");

    let mut orphan = ErrorDistribution::gauss(1.0);
    orphan.hyper_mut(0).unwrap().fixed = false;
    let err = orphan.accepts(&line_problem()).unwrap_err();
    assert_eq!(err.info().code, "hyper-prior");
}

#[test]
fn names_limits_and_keep() {
    let mut dist = ErrorDistribution::from_name("Gauss", Some([0.01, 10.0])).unwrap();
    assert_eq!(dist.name(), "gauss");
    assert_eq!(dist.hyper_fit_index(), vec![ParIndex::Hyper(0)]);
    assert_eq!(dist.hyper(0).unwrap().limits(), Some([0.01, 10.0]));
    dist.keep_fixed(&BTreeMap::from([(0, 0.4)])).unwrap();
    assert!(dist.hyper_fit_index().is_empty());
    assert_eq!(dist.hyper_values(), vec![0.4]);
    assert!(dist.keep_fixed(&BTreeMap::from([(3, 1.0)])).is_err());
    assert!(ErrorDistribution::from_name("student", None).is_err());
}

#[test]
fn call_counter_is_shared_by_clones() {
    let problem = line_problem();
    let dist = ErrorDistribution::gauss(1.0);
    let copy = dist.clone();
    dist.log_likelihood(&problem, &[1.0, 0.5], &[1.0]);
    copy.log_likelihood(&problem, &[1.0, 0.5], &[1.0]);
    assert_eq!(dist.ncalls(), 2);
}

#[test]
fn model_evidence_is_finite_for_a_linear_fit() {
    let problem = line_problem();
    let dist = ErrorDistribution::from_name("model", None).unwrap();
    let log_z = dist.log_likelihood(&problem, &[0.0, 0.0], &[0.3]);
    assert!(log_z.is_finite());
    assert!(log_z > -1.0e6);
}
