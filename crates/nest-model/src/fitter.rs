//! Least-squares fitter used by best-boost and the model-evidence
//! distribution.

use std::f64::consts::PI;
use std::fmt;

use nalgebra::{DMatrix, DVector};
use nest_core::errors::ErrorInfo;
use nest_core::{NestError, NestResult};
use tracing::trace;

use crate::problem::Problem;

/// Outcome of a fit.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Optimal model parameters.
    pub params: Vec<f64>,
    /// Weighted sum of squared residuals at the optimum.
    pub chisq: f64,
    /// Sum of the weights used in the fit.
    pub sum_weights: f64,
    /// Inverse of the weighted normal matrix `J' W J` (unit noise).
    pub covariance: DMatrix<f64>,
    /// Iterations used.
    pub iterations: usize,
}

impl FitResult {
    /// Noise scale estimated from the residuals.
    pub fn scale(&self) -> f64 {
        let dof = (self.sum_weights - self.params.len() as f64).max(1.0);
        (self.chisq / dof).sqrt()
    }

    /// Standard deviations of the parameters.
    pub fn stdevs(&self) -> Vec<f64> {
        let scale = self.scale();
        (0..self.params.len())
            .map(|k| scale * self.covariance[(k, k)].max(0.0).sqrt())
            .collect()
    }

    /// Standard deviation of the model result at `x`, propagated from the
    /// parameter covariance.
    pub fn monte_carlo_error(&self, problem: &Problem, x: &[f64]) -> Vec<f64> {
        let columns = problem.model().partial(x, &self.params);
        let scale2 = self.scale().powi(2);
        let nvalues = columns.first().map_or(0, Vec::len);
        (0..nvalues)
            .map(|i| {
                let mut var = 0.0;
                for (a, ca) in columns.iter().enumerate() {
                    for (b, cb) in columns.iter().enumerate() {
                        var += ca[i] * self.covariance[(a, b)] * cb[i];
                    }
                }
                (scale2 * var).max(0.0).sqrt()
            })
            .collect()
    }
}

/// Contract for fitters used inside the sampler.
pub trait Fitter: fmt::Debug + Send + Sync {
    /// Fits the model parameters of `problem`, starting at `start`.
    fn fit(&self, problem: &Problem, start: &[f64]) -> NestResult<FitResult>;

    /// Laplace approximation of the log evidence around the optimum.
    ///
    /// With `noise_scale` unset the scale estimated by the fit is used.
    fn log_z(&self, problem: &Problem, start: &[f64], noise_scale: Option<f64>) -> NestResult<f64> {
        let fit = self.fit(problem, start)?;
        laplace_log_z(problem, &fit, noise_scale)
    }

    /// Noise scale of the residuals at the optimum.
    fn scale(&self, problem: &Problem, start: &[f64]) -> NestResult<f64> {
        Ok(self.fit(problem, start)?.scale())
    }

    /// Standard deviation of the fitted model result at `x`.
    fn monte_carlo_error(&self, problem: &Problem, start: &[f64], x: &[f64]) -> NestResult<Vec<f64>> {
        Ok(self.fit(problem, start)?.monte_carlo_error(problem, x))
    }
}

/// Levenberg-Marquardt on the weighted residuals of the model parameters.
#[derive(Debug, Clone, Copy)]
pub struct LevenbergMarquardt {
    /// Iteration cap.
    pub max_iterations: usize,
    /// Relative chisq improvement below which the fit stops.
    pub tolerance: f64,
    /// Initial damping.
    pub lambda: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1.0e-10,
            lambda: 1.0e-3,
        }
    }
}

const LAMBDA_MAX: f64 = 1.0e12;

impl LevenbergMarquardt {
    fn residuals(problem: &Problem, params: &[f64]) -> (DVector<f64>, f64) {
        let model = problem.model();
        let predicted = model.result(problem.xdata(), params);
        let period = model.cyclic();
        let r = DVector::from_iterator(
            predicted.len(),
            problem.ydata().iter().zip(&predicted).map(|(y, m)| match period {
                Some(p) => nest_core::wrap_half_period(y - m, p),
                None => y - m,
            }),
        );
        let chisq = r
            .iter()
            .enumerate()
            .map(|(i, ri)| problem.weight(i) * ri * ri)
            .sum();
        (r, chisq)
    }

    fn normal_equations(
        problem: &Problem,
        params: &[f64],
        r: &DVector<f64>,
    ) -> (DMatrix<f64>, DVector<f64>) {
        let columns = problem.model().partial(problem.xdata(), params);
        let n = r.len();
        let k = params.len();
        let jac = DMatrix::from_fn(n, k, |i, j| columns[j][i]);
        let w = DVector::from_iterator(n, (0..n).map(|i| problem.weight(i)));
        let weighted = DMatrix::from_fn(n, k, |i, j| jac[(i, j)] * w[i]);
        let hessian = jac.transpose() * &weighted;
        let gradient = weighted.transpose() * r;
        (hessian, gradient)
    }
}

impl Fitter for LevenbergMarquardt {
    fn fit(&self, problem: &Problem, start: &[f64]) -> NestResult<FitResult> {
        let k = problem.nmodel();
        if start.len() < k {
            return Err(NestError::config("fit-start", "start vector is shorter than the model"));
        }
        let mut params = start[..k].to_vec();
        let (mut r, mut chisq) = Self::residuals(problem, &params);
        let mut lambda = self.lambda;
        let mut iterations = 0;
        while iterations < self.max_iterations {
            iterations += 1;
            let (hessian, gradient) = Self::normal_equations(problem, &params, &r);
            let mut improved = false;
            while lambda < LAMBDA_MAX {
                let mut damped = hessian.clone();
                for d in 0..k {
                    damped[(d, d)] *= 1.0 + lambda;
                    if damped[(d, d)] == 0.0 {
                        damped[(d, d)] = lambda;
                    }
                }
                let Some(step) = damped.cholesky().map(|c| c.solve(&gradient)) else {
                    lambda *= 10.0;
                    continue;
                };
                let trial: Vec<f64> = params.iter().zip(step.iter()).map(|(p, s)| p + s).collect();
                let (trial_r, trial_chisq) = Self::residuals(problem, &trial);
                if trial_chisq.is_finite() && trial_chisq <= chisq {
                    let gain = chisq - trial_chisq;
                    params = trial;
                    r = trial_r;
                    chisq = trial_chisq;
                    lambda = (lambda * 0.1).max(1.0e-12);
                    improved = gain > self.tolerance * chisq.max(f64::MIN_POSITIVE);
                    break;
                }
                lambda *= 10.0;
            }
            if !improved {
                break;
            }
        }
        let (hessian, _) = Self::normal_equations(problem, &params, &r);
        let covariance = hessian.try_inverse().ok_or_else(|| {
            NestError::NumericFailure(
                ErrorInfo::new("fit-singular", "normal matrix is singular at the optimum")
                    .with_context("npars", k),
            )
        })?;
        trace!(iterations, chisq, "levenberg-marquardt converged");
        Ok(FitResult {
            params,
            chisq,
            sum_weights: problem.sum_weights(),
            covariance,
            iterations,
        })
    }
}

/// Gaussian Laplace approximation of the evidence at a fit optimum.
pub fn laplace_log_z(problem: &Problem, fit: &FitResult, noise_scale: Option<f64>) -> NestResult<f64> {
    let sigma = noise_scale.unwrap_or_else(|| fit.scale());
    if !(sigma > 0.0) {
        return Err(NestError::numeric("laplace-scale", "noise scale must be positive"));
    }
    let k = fit.params.len() as f64;
    let log_l = -0.5 * fit.sum_weights * (2.0 * PI * sigma * sigma).ln()
        - 0.5 * fit.chisq / (sigma * sigma);
    let log_prior: f64 = fit
        .params
        .iter()
        .enumerate()
        .map(|(j, &p)| problem.prior(j).map_or(0.0, |prior| prior.log_result(p)))
        .sum();
    let det = fit.covariance.determinant();
    if !(det > 0.0) || !log_prior.is_finite() {
        return Err(NestError::NumericFailure(
            ErrorInfo::new("laplace-degenerate", "posterior peak is degenerate")
                .with_context("det", det)
                .with_context("log_prior", log_prior),
        ));
    }
    let log_volume = 0.5 * k * (2.0 * PI).ln() + 0.5 * (k * (sigma * sigma).ln() + det.ln());
    Ok(log_l + log_prior + log_volume)
}
