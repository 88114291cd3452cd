use std::f64::consts::PI;
use std::sync::Arc;

use nest_model::{laplace_log_z, Fitter, GaussSumModel, LevenbergMarquardt, Model, PolynomialModel, Prior, Problem};

fn noisy_line() -> Problem {
    let model: Arc<dyn Model> =
        Arc::new(PolynomialModel::new(1).with_prior(Prior::uniform(-10.0, 10.0).unwrap()));
    let xs: Vec<f64> = (0..20).map(f64::from).collect();
    let ys = xs
        .iter()
        .map(|x| 2.0 + 0.5 * x + 0.3 * (x * 2.3).sin())
        .collect();
    Problem::classic(model, xs, ys).unwrap()
}

#[test]
fn linear_fit_matches_least_squares() {
    let problem = noisy_line();
    let fit = LevenbergMarquardt::default().fit(&problem, &[0.0, 0.0]).unwrap();

    let (xs, ys) = (problem.xdata(), problem.ydata());
    let n = xs.len() as f64;
    let mx = xs.iter().sum::<f64>() / n;
    let my = ys.iter().sum::<f64>() / n;
    let sxy: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();
    let sxx: f64 = xs.iter().map(|x| (x - mx) * (x - mx)).sum();
    let slope = sxy / sxx;
    let offset = my - slope * mx;

    assert!((fit.params[1] - slope).abs() < 1e-6);
    assert!((fit.params[0] - offset).abs() < 1e-6);
    assert!(fit.scale() > 0.1 && fit.scale() < 0.4);
    assert!(fit.stdevs().iter().all(|s| *s > 0.0));
}

#[test]
fn nonlinear_fit_recovers_a_bump() {
    let model = GaussSumModel::new(
        1,
        [
            Prior::uniform(0.0, 10.0).unwrap(),
            Prior::uniform(-5.0, 5.0).unwrap(),
            Prior::uniform(0.1, 3.0).unwrap(),
        ],
        Prior::exponential(1.0).unwrap(),
    );
    let xs: Vec<f64> = (0..41).map(|i| -4.0 + 0.2 * f64::from(i)).collect();
    let truth = [3.0, 0.5, 0.8];
    let ys = model.result(&xs, &truth);
    let problem = Problem::classic(Arc::new(model), xs, ys).unwrap();
    let fit = LevenbergMarquardt::default().fit(&problem, &[2.5, 0.3, 1.0]).unwrap();
    for (p, t) in fit.params.iter().zip(truth) {
        assert!((p - t).abs() < 1e-4, "{p} vs {t}");
    }
}

#[test]
fn laplace_evidence_of_a_constant_is_analytic() {
    let model: Arc<dyn Model> =
        Arc::new(PolynomialModel::new(0).with_prior(Prior::uniform(-5.0, 5.0).unwrap()));
    let ys = vec![1.8, 2.1, 2.3, 1.9, 2.0, 2.2, 1.7, 2.0];
    let n = ys.len() as f64;
    let problem = Problem::classic(model, vec![0.0; ys.len()], ys.clone()).unwrap();
    let fit = LevenbergMarquardt::default().fit(&problem, &[0.0]).unwrap();
    let sigma = 1.0;
    let log_z = laplace_log_z(&problem, &fit, Some(sigma)).unwrap();

    let mean = ys.iter().sum::<f64>() / n;
    let chisq: f64 = ys.iter().map(|y| (y - mean) * (y - mean)).sum();
    let expected = -0.5 * n * (2.0 * PI).ln() - 0.5 * chisq + (0.1f64).ln()
        + 0.5 * (2.0 * PI / n).ln();
    assert!((log_z - expected).abs() < 1e-8);
}

#[test]
fn prediction_errors_scale_with_distance() {
    let problem = noisy_line();
    let fit = LevenbergMarquardt::default().fit(&problem, &[0.0, 0.0]).unwrap();
    let errors = fit.monte_carlo_error(&problem, &[9.5, 40.0]);
    assert!(errors[0] < errors[1]);
}

#[test]
fn trait_surface_agrees_with_the_fit() {
    let problem = noisy_line();
    let lm = LevenbergMarquardt::default();
    let fitter: &dyn Fitter = &lm;
    let fit = lm.fit(&problem, &[0.0, 0.0]).unwrap();
    assert!((fitter.scale(&problem, &[0.0, 0.0]).unwrap() - fit.scale()).abs() < 1e-12);
    let errors = fitter.monte_carlo_error(&problem, &[0.0, 0.0], &[9.5, 40.0]).unwrap();
    assert_eq!(errors, fit.monte_carlo_error(&problem, &[9.5, 40.0]));
    assert!(fitter.log_z(&problem, &[0.0, 0.0], Some(0.3)).unwrap().is_finite());
}
