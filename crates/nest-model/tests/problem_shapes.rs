use std::sync::Arc;

use nest_core::NestError;
use nest_model::{
    FunctionModel, Model, ParType, PolynomialModel, Prior, Problem, ProblemKind, XyAccuracy,
};
use proptest::prelude::*;

fn line() -> Arc<dyn Model> {
    Arc::new(PolynomialModel::new(1).with_prior(Prior::uniform(-10.0, 10.0).unwrap()))
}

#[test]
fn classic_residuals_and_shapes() {
    let problem = Problem::classic(line(), vec![0.0, 1.0, 2.0], vec![1.0, 3.0, 5.5]).unwrap();
    assert_eq!(problem.kind(), ProblemKind::Classic);
    assert_eq!(problem.partype(), ParType::Float);
    assert_eq!(problem.npars(), 2);
    assert_eq!(problem.nuisance(), 0);
    let residuals = problem.residuals(&[1.0, 2.0]);
    assert_eq!(residuals, vec![0.0, 0.0, 0.5]);
    assert_eq!(problem.sum_weights(), 3.0);
    let jacobian = problem.partial(&[1.0, 2.0]);
    assert_eq!(jacobian, vec![vec![1.0, 1.0, 1.0], vec![0.0, 1.0, 2.0]]);
}

#[test]
fn mismatched_lengths_are_rejected() {
    let err = Problem::classic(line(), vec![0.0, 1.0], vec![1.0]).unwrap_err();
    assert!(matches!(err, NestError::Config(_)));
    assert_eq!(err.info().context.get("expected").map(String::as_str), Some("2"));
}

#[test]
fn weights_broadcast_over_outputs() {
    let prior = Prior::uniform(-1.0, 1.0).unwrap();
    let model = FunctionModel::new("pair", vec![prior.clone(), prior], 2, |x, p| {
        x.iter().flat_map(|&xi| [p[0] * xi, p[1]]).collect()
    });
    let problem = Problem::multiple(Arc::new(model), vec![1.0, 2.0], vec![0.5, 0.1, 1.0, 0.1])
        .unwrap()
        .with_weights(vec![2.0, 3.0])
        .unwrap();
    assert_eq!(problem.ndout(), 2);
    assert_eq!(problem.weights().unwrap(), &[2.0, 2.0, 3.0, 3.0]);
    assert_eq!(problem.sum_weights(), 10.0);
    let residuals = problem.residuals(&[0.5, 0.1]);
    assert!(residuals.iter().all(|r| r.abs() < 1e-12));
    let jacobian = problem.partial(&[0.5, 0.1]);
    assert_eq!(jacobian.len(), 2);
    assert_eq!(jacobian[0].len(), 4);
}

#[test]
fn errors_problem_carries_targets() {
    let xs = vec![0.0, 1.0, 2.0, 3.0];
    let ys = vec![0.1, 1.1, 1.9, 3.2];
    let problem = Problem::errors_in_xy(line(), xs.clone(), ys, XyAccuracy::uniform(4, 0.2, 0.3, 0.0))
        .unwrap();
    assert_eq!(problem.nuisance(), 4);
    assert_eq!(problem.npars(), 6);
    let mut params = vec![0.0, 1.0];
    params.extend(xs.iter().map(|x| x + 0.1));
    let result = problem.result(&params);
    for (r, e) in result.iter().zip([0.1, 1.1, 2.1, 3.1]) {
        assert!((r - e).abs() < 1e-12);
    }
    let rx = problem.x_residuals(&params);
    assert!(rx.iter().all(|r| (r + 0.1).abs() < 1e-12));
    let target_prior = problem.prior(3).unwrap();
    assert!((target_prior.unit_to_domain(0.5) - 1.0).abs() < 1e-9);

    let jacobian = problem.partial(&params);
    assert_eq!(jacobian.len(), 6);
    assert_eq!(jacobian[3], vec![0.0, 1.0, 0.0, 0.0]);
}

#[test]
fn errors_problem_needs_matching_accuracy() {
    let err = Problem::errors_in_xy(line(), vec![0.0, 1.0], vec![0.0, 1.0], XyAccuracy::uniform(3, 1.0, 1.0, 0.0))
        .unwrap_err();
    assert_eq!(err.info().code, "problem-shape");
}

proptest! {
    #[test]
    fn xy_distance_is_symmetric(
        rx in -3.0f64..3.0,
        ry in -3.0f64..3.0,
        sx in 0.1f64..2.0,
        sy in 0.1f64..2.0,
        rho in -0.9f64..0.9,
        scale in 0.0f64..1.0,
    ) {
        let acc = XyAccuracy::uniform(1, sx, sy, rho);
        let flipped = acc.transposed();
        let q = acc.quadratic(0, rx, ry, scale) / acc.determinant(0, scale);
        let q_flipped = flipped.quadratic(0, ry, rx, scale) / flipped.determinant(0, scale);
        prop_assert!((q - q_flipped).abs() <= 1e-9 * q.abs().max(1.0));
        prop_assert!(q >= 0.0);
    }
}

#[test]
fn swapping_axes_keeps_the_weighted_distance() {
    let (a, b) = (0.5, 2.0);
    let xs = vec![0.1, 1.2, 1.9, 3.3];
    let ys = vec![0.8, 2.7, 4.6, 7.0];
    let targets = [0.2, 1.1, 2.05, 3.2];
    let acc = XyAccuracy {
        vxx: vec![0.04, 0.09, 0.01, 0.16],
        vyy: vec![0.25, 0.09, 0.36, 0.04],
        vxy: vec![0.02, -0.03, 0.05, 0.0],
    };
    let forward = Problem::errors_in_xy(line(), xs.clone(), ys.clone(), acc.clone()).unwrap();
    let mut params = vec![a, b];
    params.extend_from_slice(&targets);

    // x = -a/b + y/b with the true y positions as targets.
    let flipped = Problem::errors_in_xy(line(), ys, xs, acc.transposed()).unwrap();
    let mut flipped_params = vec![-a / b, 1.0 / b];
    flipped_params.extend(targets.iter().map(|t| a + b * t));

    for scale in [0.0, 0.4] {
        let det = forward.xy_determinants(scale);
        let det_flipped = flipped.xy_determinants(scale);
        let forward_sq = forward.weighted_res_sq(&params, scale);
        let flipped_sq = flipped.weighted_res_sq(&flipped_params, scale);
        for i in 0..4 {
            let q = forward_sq[i] / det[i];
            let q_flipped = flipped_sq[i] / det_flipped[i];
            assert!(q > 0.0);
            assert!((q - q_flipped).abs() < 1e-9 * q.max(1.0), "datum {i} scale {scale}: {q} vs {q_flipped}");
        }
    }
}

#[test]
fn determinant_includes_model_scale() {
    let acc = XyAccuracy::uniform(1, 2.0, 3.0, 0.5);
    let (vxx, vyy, vxy) = (4.0, 9.0, 3.0);
    let s2 = 0.25;
    let expected = vxx * vyy - vxy * vxy + s2 * (vxx + vyy + s2);
    assert!((acc.determinant(0, 0.5) - expected).abs() < 1e-12);
    let direct = (vxx + s2) * (vyy + s2) - vxy * vxy;
    assert!((acc.determinant(0, 0.5) - direct).abs() < 1e-12);
}

#[test]
fn cyclic_models_wrap_residuals() {
    #[derive(Debug)]
    struct Angle(Prior);
    impl Model for Angle {
        fn name(&self) -> String {
            "angle".into()
        }
        fn npars(&self) -> usize {
            1
        }
        fn result(&self, x: &[f64], p: &[f64]) -> Vec<f64> {
            x.iter().map(|_| p[0]).collect()
        }
        fn prior(&self, _k: usize) -> Option<&Prior> {
            Some(&self.0)
        }
        fn cyclic(&self) -> Option<f64> {
            Some(360.0)
        }
    }
    let model = Arc::new(Angle(Prior::uniform(0.0, 360.0).unwrap()));
    let problem = Problem::classic(model, vec![0.0, 1.0], vec![350.0, 10.0]).unwrap();
    let residuals = problem.residuals(&[5.0]);
    assert!((residuals[0] + 15.0).abs() < 1e-9);
    assert!((residuals[1] - 5.0).abs() < 1e-9);
    assert!(residuals.iter().all(|r| r.abs() <= 180.0));
}

#[test]
fn order_problem_measures_tours() {
    let problem = Problem::order(vec![0.0, 1.0, 1.0, 0.0], vec![0.0, 0.0, 1.0, 1.0]).unwrap();
    assert_eq!(problem.partype(), ParType::Int);
    assert_eq!(problem.npars(), 4);
    let square = problem.segment_costs(&[0.0, 1.0, 2.0, 3.0]);
    assert!((square.iter().sum::<f64>() - 4.0).abs() < 1e-12);
    let crossed = problem.segment_costs(&[0.0, 2.0, 1.0, 3.0]);
    assert!(crossed.iter().sum::<f64>() > 4.0);
    assert!((problem.distance(0, 2) - 2f64.sqrt()).abs() < 1e-12);
    assert_eq!(
        problem.default_engines(),
        vec!["move", "reverse", "switch", "shuffle", "loop", "near"]
    );
}

#[test]
fn default_engines_follow_the_model() {
    let problem = Problem::classic(line(), vec![0.0], vec![0.0]).unwrap();
    assert_eq!(problem.default_engines(), vec!["galilean", "chord"]);
}

#[test]
fn with_model_shares_data() {
    let problem = Problem::classic(line(), vec![0.0, 1.0], vec![0.0, 1.0]).unwrap();
    let quadratic: Arc<dyn Model> =
        Arc::new(PolynomialModel::new(2).with_prior(Prior::uniform(-1.0, 1.0).unwrap()));
    let other = problem.with_model(quadratic);
    assert_eq!(other.npars(), 3);
    assert_eq!(other.ydata(), problem.ydata());
}
