//! Error distributions: log likelihoods of a problem given its parameters
//! and the hyperparameters of the noise.
//!
//! Every distribution returns per-value contributions from
//! [`ErrorDistribution::log_l_data`]; [`ErrorDistribution::log_likelihood`]
//! is their sum. Gradients come from a lazy iterator that yields one
//! per-value vector for every entry of a fit index.

use std::collections::BTreeMap;
use std::f64::consts::{LN_2, PI};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use nest_core::errors::ErrorInfo;
use nest_core::{log_add_exp, NestError, NestResult, LOG_ZERO};
use statrs::function::gamma::{digamma, ln_gamma};
use tracing::warn;

use crate::fitter::{Fitter, LevenbergMarquardt};
use crate::hyper::{HyperParameter, ParIndex};
use crate::prior::Prior;
use crate::problem::{Problem, ProblemKind};

/// Mixed likelihoods below this value get a zero inverse in the gradient.
const MIXED_FLOOR: f64 = 1.0e-300;

/// Relative step of the central difference fallback.
const PARTIAL_STEP: f64 = 1.0e-6;

/// Shape of the error distribution.
#[derive(Debug, Clone)]
pub enum DistributionKind {
    /// Normal errors; hyperparameter: scale.
    Gauss,
    /// Bivariate normal errors in x and y; hyperparameter: model scale.
    Gauss2d,
    /// Double exponential errors; hyperparameter: scale.
    Laplace,
    /// Lorentzian errors; hyperparameter: scale.
    Cauchy,
    /// Flat errors within `+-scale`; hyperparameter: scale.
    Uniform,
    /// Generalised Gaussian `exp(-|r/s|^p)`; hyperparameters: scale, power.
    Exponential,
    /// Counts with the model as rate.
    Poisson,
    /// Binary or categorical outcomes with the model as probability.
    Bernoulli,
    /// Cost function for order problems: `logL = -sum(result)`.
    Distance,
    /// Convex combination of two distributions; own hyperparameter: fraction
    /// of the first.
    Mixed(Box<ErrorDistribution>, Box<ErrorDistribution>),
    /// Evidence of an embedded fit; hyperparameter: noise scale.
    Model(Arc<dyn Fitter>),
}

/// Error distribution with its hyperparameters and a call counter.
///
/// Clones share the call counter.
#[derive(Debug, Clone)]
pub struct ErrorDistribution {
    kind: DistributionKind,
    hyper: Vec<HyperParameter>,
    ncalls: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Point {
    value: f64,
    d_mu: f64,
    d_hyper: [f64; 2],
}

/// Per-value derivatives of the log likelihood with respect to the model
/// result and to every hyperparameter.
#[derive(Debug, Clone)]
struct Gradients {
    d_mu: Vec<f64>,
    d_hyper: Vec<Vec<f64>>,
}

impl ErrorDistribution {
    fn with_hyper(kind: DistributionKind, hyper: Vec<HyperParameter>) -> Self {
        Self {
            kind,
            hyper,
            ncalls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Gaussian errors with the scale pinned at `scale`.
    pub fn gauss(scale: f64) -> Self {
        Self::with_hyper(DistributionKind::Gauss, vec![HyperParameter::fixed(scale)])
    }

    /// Bivariate Gaussian errors for errors-in-x-and-y problems.
    pub fn gauss2d() -> Self {
        Self::with_hyper(DistributionKind::Gauss2d, vec![HyperParameter::fixed(0.0)])
    }

    /// Laplace errors with the scale pinned at `scale`.
    pub fn laplace(scale: f64) -> Self {
        Self::with_hyper(DistributionKind::Laplace, vec![HyperParameter::fixed(scale)])
    }

    /// Cauchy errors with the scale pinned at `scale`.
    pub fn cauchy(scale: f64) -> Self {
        Self::with_hyper(DistributionKind::Cauchy, vec![HyperParameter::fixed(scale)])
    }

    /// Uniform errors within `+-scale`.
    pub fn uniform(scale: f64) -> Self {
        Self::with_hyper(DistributionKind::Uniform, vec![HyperParameter::fixed(scale)])
    }

    /// Generalised Gaussian errors with pinned scale and power.
    pub fn exponential(scale: f64, power: f64) -> Self {
        Self::with_hyper(
            DistributionKind::Exponential,
            vec![HyperParameter::fixed(scale), HyperParameter::fixed(power)],
        )
    }

    /// Poisson counts.
    pub fn poisson() -> Self {
        Self::with_hyper(DistributionKind::Poisson, Vec::new())
    }

    /// Bernoulli outcomes.
    pub fn bernoulli() -> Self {
        Self::with_hyper(DistributionKind::Bernoulli, Vec::new())
    }

    /// Path cost of an order problem.
    pub fn distance() -> Self {
        Self::with_hyper(DistributionKind::Distance, Vec::new())
    }

    /// Mixture `f * first + (1 - f) * second` with `f` pinned.
    pub fn mixed(first: Self, second: Self, fraction: f64) -> NestResult<Self> {
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(NestError::Config(
                ErrorInfo::new("mixed-fraction", "mixing fraction must lie in (0, 1)")
                    .with_context("fraction", fraction),
            ));
        }
        Ok(Self::with_hyper(
            DistributionKind::Mixed(Box::new(first), Box::new(second)),
            vec![HyperParameter::fixed(fraction)],
        ))
    }

    /// Evidence of an embedded fit by `fitter`, noise scale pinned at `scale`.
    pub fn model(fitter: Arc<dyn Fitter>, scale: f64) -> Self {
        Self::with_hyper(DistributionKind::Model(fitter), vec![HyperParameter::fixed(scale)])
    }

    /// Builds a distribution by name. With `limits` the first scale becomes
    /// a sampled hyperparameter with a Jeffreys prior (uniform when the lower
    /// limit is not positive).
    pub fn from_name(name: &str, limits: Option<[f64; 2]>) -> NestResult<Self> {
        let mut dist = match name.to_ascii_lowercase().as_str() {
            "gauss" => Self::gauss(1.0),
            "gauss2d" => Self::gauss2d(),
            "laplace" => Self::laplace(1.0),
            "cauchy" => Self::cauchy(1.0),
            "uniform" => Self::uniform(1.0),
            "exponential" => Self::exponential(1.0, 2.0),
            "poisson" => Self::poisson(),
            "bernoulli" => Self::bernoulli(),
            "distance" => Self::distance(),
            "model" => Self::model(Arc::new(LevenbergMarquardt::default()), 1.0),
            "mixed" => Self::mixed(Self::gauss(1.0), Self::gauss(1.0), 0.5)?,
            other => {
                return Err(NestError::Config(
                    ErrorInfo::new("distribution-name", "unknown error distribution")
                        .with_context("name", other),
                ))
            }
        };
        if let Some(limits) = limits {
            dist.set_limits(limits)?;
        }
        Ok(dist)
    }

    /// Canonical name.
    pub fn name(&self) -> &'static str {
        match self.kind {
            DistributionKind::Gauss => "gauss",
            DistributionKind::Gauss2d => "gauss2d",
            DistributionKind::Laplace => "laplace",
            DistributionKind::Cauchy => "cauchy",
            DistributionKind::Uniform => "uniform",
            DistributionKind::Exponential => "exponential",
            DistributionKind::Poisson => "poisson",
            DistributionKind::Bernoulli => "bernoulli",
            DistributionKind::Distance => "distance",
            DistributionKind::Mixed(..) => "mixed",
            DistributionKind::Model(_) => "model",
        }
    }

    /// The distribution shape.
    pub fn kind(&self) -> &DistributionKind {
        &self.kind
    }

    /// Number of log likelihood evaluations so far.
    pub fn ncalls(&self) -> u64 {
        self.ncalls.load(Ordering::Relaxed)
    }

    /// Total number of hyperparameters, fixed ones included.
    pub fn nphypar(&self) -> usize {
        match &self.kind {
            DistributionKind::Mixed(a, b) => a.nphypar() + b.nphypar() + self.hyper.len(),
            _ => self.hyper.len(),
        }
    }

    /// Hyperparameter `j` in global order.
    pub fn hyper(&self, j: usize) -> Option<&HyperParameter> {
        match &self.kind {
            DistributionKind::Mixed(a, b) => {
                let (na, nb) = (a.nphypar(), b.nphypar());
                if j < na {
                    a.hyper(j)
                } else if j < na + nb {
                    b.hyper(j - na)
                } else {
                    self.hyper.get(j - na - nb)
                }
            }
            _ => self.hyper.get(j),
        }
    }

    /// Mutable access to hyperparameter `j`.
    pub fn hyper_mut(&mut self, j: usize) -> Option<&mut HyperParameter> {
        match &mut self.kind {
            DistributionKind::Mixed(a, b) => {
                let (na, nb) = (a.nphypar(), b.nphypar());
                if j < na {
                    a.hyper_mut(j)
                } else if j < na + nb {
                    b.hyper_mut(j - na)
                } else {
                    self.hyper.get_mut(j - na - nb)
                }
            }
            _ => self.hyper.get_mut(j),
        }
    }

    /// Names of the hyperparameters in global order.
    pub fn hyper_names(&self) -> Vec<String> {
        match &self.kind {
            DistributionKind::Mixed(a, b) => a
                .hyper_names()
                .into_iter()
                .map(|n| format!("first.{n}"))
                .chain(b.hyper_names().into_iter().map(|n| format!("second.{n}")))
                .chain(std::iter::once("fraction".to_string()))
                .collect(),
            DistributionKind::Exponential => vec!["scale".into(), "power".into()],
            _ => self.hyper.iter().map(|_| "scale".to_string()).collect(),
        }
    }

    /// Current hyperparameter values in global order.
    pub fn hyper_values(&self) -> Vec<f64> {
        (0..self.nphypar())
            .filter_map(|j| self.hyper(j).map(|h| h.value))
            .collect()
    }

    /// Fit index entries of the hyperparameters that are sampled.
    pub fn hyper_fit_index(&self) -> Vec<ParIndex> {
        (0..self.nphypar())
            .filter(|&j| self.hyper(j).is_some_and(|h| !h.fixed))
            .map(ParIndex::Hyper)
            .collect()
    }

    /// Pins hyperparameters at the given values.
    pub fn keep_fixed(&mut self, keep: &BTreeMap<usize, f64>) -> NestResult<()> {
        for (&j, &value) in keep {
            self.checked_hyper_mut(j)?.keep(value);
        }
        Ok(())
    }

    /// Makes the first hyperparameter sampled between `limits`.
    ///
    /// For a mixture the limits apply to the first hyperparameter of both
    /// components.
    pub fn set_limits(&mut self, limits: [f64; 2]) -> NestResult<()> {
        let [lo, hi] = limits;
        let prior = if lo > 0.0 {
            Prior::jeffreys(lo, hi)?
        } else {
            Prior::uniform(lo, hi)?
        };
        match &mut self.kind {
            DistributionKind::Mixed(a, b) => {
                a.set_limits(limits)?;
                b.set_limits(limits)
            }
            _ => self.set_prior(0, prior),
        }
    }

    /// Sets the prior of hyperparameter `j`, which makes it sampled.
    pub fn set_prior(&mut self, j: usize, prior: Prior) -> NestResult<()> {
        let hyper = self.checked_hyper_mut(j)?;
        if prior.is_out_of_limits(hyper.value) {
            hyper.value = prior.unit_to_domain(0.5);
        }
        hyper.set_prior(prior);
        Ok(())
    }

    fn checked_hyper_mut(&mut self, j: usize) -> NestResult<&mut HyperParameter> {
        let n = self.nphypar();
        self.hyper_mut(j).ok_or_else(|| {
            NestError::Config(
                ErrorInfo::new("hyper-index", "no such hyperparameter")
                    .with_context("index", j)
                    .with_context("nphypar", n),
            )
        })
    }

    /// Prior of hyperparameter `j`.
    pub fn hyper_prior(&self, j: usize) -> Option<&Prior> {
        self.hyper(j).and_then(|h| h.prior.as_ref())
    }

    /// Checks that the distribution can be sampled with `problem`.
    pub fn accepts(&self, problem: &Problem) -> NestResult<()> {
        let kind = problem.kind();
        let needs = |ok: bool, code: &str, message: &str| -> NestResult<()> {
            if ok {
                Ok(())
            } else {
                Err(NestError::UnsupportedCombination(
                    ErrorInfo::new(code, message)
                        .with_context("distribution", self.name())
                        .with_context("problem", format!("{kind:?}")),
                ))
            }
        };
        let is_distance = matches!(self.kind, DistributionKind::Distance);
        needs(
            is_distance == (kind == ProblemKind::Order),
            "distance-order",
            "order problems go with the distance cost and nothing else",
        )?;
        let is_2d = matches!(self.kind, DistributionKind::Gauss2d);
        needs(
            is_2d == (kind == ProblemKind::ErrorsInXandY),
            "gauss2d-errors",
            "errors in x and y need the bivariate gauss distribution and vice versa",
        )?;
        if matches!(self.kind, DistributionKind::Bernoulli) {
            needs(problem.weights().is_none(), "bernoulli-weights", "bernoulli accepts no weights")?;
        }
        if problem.accuracy().is_some() && !matches!(self.kind, DistributionKind::Gauss) {
            needs(
                self.hyper.first().map_or(true, |h| h.fixed),
                "accuracy-scale",
                "per-datum accuracies need a fixed scale unless the errors are gaussian",
            )?;
        }
        for j in 0..self.nphypar() {
            if let Some(h) = self.hyper(j) {
                if !h.fixed && h.prior.is_none() {
                    return Err(NestError::UnsupportedCombination(
                        ErrorInfo::new("hyper-prior", "a sampled hyperparameter needs a prior")
                            .with_context("index", j),
                    ));
                }
            }
        }
        if let DistributionKind::Mixed(a, b) = &self.kind {
            a.check_component()?;
            b.check_component()?;
        }
        Ok(())
    }

    fn check_component(&self) -> NestResult<()> {
        match self.kind {
            DistributionKind::Gauss
            | DistributionKind::Laplace
            | DistributionKind::Cauchy
            | DistributionKind::Uniform
            | DistributionKind::Exponential
            | DistributionKind::Poisson => Ok(()),
            _ => Err(NestError::unsupported(
                "mixed-component",
                format!("{} cannot be a mixture component", self.name()),
            )),
        }
    }

    /// Log likelihood of `problem` at the given parameters.
    pub fn log_likelihood(&self, problem: &Problem, params: &[f64], hypars: &[f64]) -> f64 {
        self.log_l_data(problem, params, hypars, None).iter().sum()
    }

    /// Per-value log likelihood contributions; `mock` replaces the observed
    /// y values.
    pub fn log_l_data(
        &self,
        problem: &Problem,
        params: &[f64],
        hypars: &[f64],
        mock: Option<&[f64]>,
    ) -> Vec<f64> {
        self.ncalls.fetch_add(1, Ordering::Relaxed);
        let ydata = mock.unwrap_or_else(|| problem.ydata());
        let mu = problem.result(params);
        self.values(problem, params, &mu, ydata, hypars)
    }

    fn values(
        &self,
        problem: &Problem,
        params: &[f64],
        mu: &[f64],
        ydata: &[f64],
        hypars: &[f64],
    ) -> Vec<f64> {
        match &self.kind {
            DistributionKind::Distance => mu.iter().map(|c| -c).collect(),
            DistributionKind::Gauss2d => gauss2d_values(problem, params, mu, ydata, hypars[0]),
            DistributionKind::Mixed(a, b) => {
                let (ha, hb, fraction) = split_mixed(a, b, hypars);
                let la = a.values(problem, params, mu, ydata, ha);
                let lb = b.values(problem, params, mu, ydata, hb);
                let (lf, lg) = (fraction.ln(), (1.0 - fraction).ln());
                la.iter()
                    .zip(&lb)
                    .map(|(x, y)| log_add_exp(lf + x, lg + y))
                    .collect()
            }
            DistributionKind::Model(fitter) => model_evidence(fitter.as_ref(), problem, params, hypars),
            _ => self.points(problem, mu, ydata, hypars).map(|p| p.value).collect(),
        }
    }

    fn points<'s>(
        &'s self,
        problem: &'s Problem,
        mu: &'s [f64],
        ydata: &'s [f64],
        hypars: &'s [f64],
    ) -> impl Iterator<Item = Point> + 's {
        let period = problem.model().cyclic();
        let accuracy = problem.accuracy();
        let ndout = problem.ndout();
        (0..mu.len()).map(move |i| {
            let w = problem.weight(i);
            if w == 0.0 {
                return Point::default();
            }
            let r = match period {
                Some(p) => nest_core::wrap_half_period(ydata[i] - mu[i], p),
                None => ydata[i] - mu[i],
            };
            let acc = accuracy.map_or(1.0, |a| a[i]);
            self.point(w, ydata[i], mu[i], r, acc, ndout, hypars)
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn point(&self, w: f64, y: f64, mu: f64, r: f64, acc: f64, ndout: usize, hypars: &[f64]) -> Point {
        let scale = hypars.first().copied().unwrap_or(1.0);
        let s = scale * acc;
        let z = r / s;
        match self.kind {
            DistributionKind::Gauss => Point {
                value: w * (-0.5 * (2.0 * PI).ln() - s.ln() - 0.5 * z * z),
                d_mu: w * z / s,
                d_hyper: [w * (z * z - 1.0) / scale, 0.0],
            },
            DistributionKind::Laplace => Point {
                value: w * (-LN_2 - s.ln() - z.abs()),
                d_mu: w * r.signum() / s,
                d_hyper: [w * (z.abs() - 1.0) / scale, 0.0],
            },
            DistributionKind::Cauchy => {
                let q = 1.0 + z * z;
                Point {
                    value: w * (-PI.ln() - s.ln() - q.ln()),
                    d_mu: w * 2.0 * z / (s * q),
                    d_hyper: [w * (z * z - 1.0) / (q * scale), 0.0],
                }
            }
            DistributionKind::Uniform => Point {
                value: if z.abs() <= 1.0 {
                    -w * (2.0 * s).ln()
                } else {
                    f64::NEG_INFINITY
                },
                d_mu: 0.0,
                d_hyper: [-w / scale, 0.0],
            },
            DistributionKind::Exponential => {
                let power = hypars.get(1).copied().unwrap_or(2.0);
                let az = z.abs();
                let azp = az.powf(power);
                let log_az = if az > 0.0 { azp * az.ln() } else { 0.0 };
                let d_mu = if az > 0.0 {
                    w * power * az.powf(power - 1.0) * r.signum() / s
                } else {
                    0.0
                };
                Point {
                    value: w * (power.ln() - LN_2 - s.ln() - ln_gamma(1.0 / power) - azp),
                    d_mu,
                    d_hyper: [
                        w * (power * azp - 1.0) / scale,
                        w * (1.0 / power + digamma(1.0 / power) / (power * power) - log_az),
                    ],
                }
            }
            DistributionKind::Poisson => {
                if mu <= 0.0 {
                    return Point {
                        value: f64::NEG_INFINITY,
                        ..Point::default()
                    };
                }
                Point {
                    value: w * (y * mu.ln() - mu - ln_gamma(y + 1.0)),
                    d_mu: w * (y / mu - 1.0),
                    d_hyper: [0.0; 2],
                }
            }
            DistributionKind::Bernoulli if ndout > 1 => {
                if y == 0.0 {
                    return Point::default();
                }
                if mu <= 0.0 {
                    return Point {
                        value: f64::NEG_INFINITY,
                        ..Point::default()
                    };
                }
                Point {
                    value: y * mu.ln(),
                    d_mu: y / mu,
                    d_hyper: [0.0; 2],
                }
            }
            DistributionKind::Bernoulli => {
                if !(mu > 0.0 && mu < 1.0) {
                    return Point {
                        value: f64::NEG_INFINITY,
                        ..Point::default()
                    };
                }
                Point {
                    value: y * mu.ln() + (1.0 - y) * (-mu).ln_1p(),
                    d_mu: y / mu - (1.0 - y) / (1.0 - mu),
                    d_hyper: [0.0; 2],
                }
            }
            _ => Point::default(),
        }
    }

    fn gradients(
        &self,
        problem: &Problem,
        params: &[f64],
        mu: &[f64],
        hypars: &[f64],
    ) -> Option<Gradients> {
        let ydata = problem.ydata();
        match &self.kind {
            DistributionKind::Gauss2d | DistributionKind::Distance | DistributionKind::Model(_) => {
                None
            }
            DistributionKind::Mixed(a, b) => {
                let (ha, hb, fraction) = split_mixed(a, b, hypars);
                let ga = a.gradients(problem, params, mu, ha)?;
                let gb = b.gradients(problem, params, mu, hb)?;
                let la = a.values(problem, params, mu, ydata, ha);
                let lb = b.values(problem, params, mu, ydata, hb);
                let n = mu.len();
                let mut d_mu = Vec::with_capacity(n);
                let mut d_fraction = Vec::with_capacity(n);
                let mut scale_a = Vec::with_capacity(n);
                let mut scale_b = Vec::with_capacity(n);
                for i in 0..n {
                    let (pa, pb) = (la[i].exp(), lb[i].exp());
                    let mixed = fraction * pa + (1.0 - fraction) * pb;
                    let inv = if mixed < MIXED_FLOOR { 0.0 } else { 1.0 / mixed };
                    let (wa, wb) = (inv * fraction * pa, inv * (1.0 - fraction) * pb);
                    d_mu.push(wa * ga.d_mu[i] + wb * gb.d_mu[i]);
                    d_fraction.push(inv * (pa - pb));
                    scale_a.push(wa);
                    scale_b.push(wb);
                }
                let scaled = |rows: Vec<Vec<f64>>, factor: &[f64]| -> Vec<Vec<f64>> {
                    rows.into_iter()
                        .map(|row| row.iter().zip(factor).map(|(d, f)| d * f).collect())
                        .collect()
                };
                let mut d_hyper = scaled(ga.d_hyper, &scale_a);
                d_hyper.extend(scaled(gb.d_hyper, &scale_b));
                d_hyper.push(d_fraction);
                Some(Gradients { d_mu, d_hyper })
            }
            _ => {
                let points: Vec<Point> = self.points(problem, mu, ydata, hypars).collect();
                let d_mu = points.iter().map(|p| p.d_mu).collect();
                let d_hyper = (0..self.hyper.len())
                    .map(|j| points.iter().map(|p| p.d_hyper[j]).collect())
                    .collect();
                Some(Gradients { d_mu, d_hyper })
            }
        }
    }

    /// Lazy per-value gradients, one vector per entry of `fit_index`.
    ///
    /// `None` when the distribution has no analytic gradient.
    pub fn partial_data<'a>(
        &'a self,
        problem: &'a Problem,
        params: &'a [f64],
        hypars: &'a [f64],
        fit_index: &'a [ParIndex],
    ) -> Option<PartialData<'a>> {
        let mu = problem.result(params);
        let gradients = self.gradients(problem, params, &mu, hypars)?;
        Some(PartialData {
            problem,
            params,
            indices: fit_index.iter(),
            gradients,
            jacobian: None,
        })
    }

    /// Gradient of the log likelihood with respect to every fit index entry.
    ///
    /// Falls back to central differences when no analytic gradient exists.
    pub fn partial_log_l(
        &self,
        problem: &Problem,
        params: &[f64],
        hypars: &[f64],
        fit_index: &[ParIndex],
    ) -> Vec<f64> {
        if let Some(partials) = self.partial_data(problem, params, hypars, fit_index) {
            return partials.map(|column| column.iter().sum()).collect();
        }
        let mut p = params.to_vec();
        let mut h = hypars.to_vec();
        fit_index
            .iter()
            .map(|index| {
                let value = index.get(&p, &h);
                let step = PARTIAL_STEP * value.abs().max(1.0);
                index.set(&mut p, &mut h, value + step);
                let up = self.log_likelihood(problem, &p, &h);
                index.set(&mut p, &mut h, value - step);
                let down = self.log_likelihood(problem, &p, &h);
                index.set(&mut p, &mut h, value);
                (up - down) / (2.0 * step)
            })
            .collect()
    }
}

/// Iterator over per-value gradient vectors, one per fit index entry.
///
/// The problem Jacobian is computed on the first model parameter requested
/// and reused for the rest.
#[derive(Debug)]
pub struct PartialData<'a> {
    problem: &'a Problem,
    params: &'a [f64],
    indices: std::slice::Iter<'a, ParIndex>,
    gradients: Gradients,
    jacobian: Option<Vec<Vec<f64>>>,
}

impl Iterator for PartialData<'_> {
    type Item = Vec<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        match *self.indices.next()? {
            ParIndex::Param(k) => {
                let (problem, params) = (self.problem, self.params);
                let jacobian = self.jacobian.get_or_insert_with(|| problem.partial(params));
                Some(
                    jacobian[k]
                        .iter()
                        .zip(&self.gradients.d_mu)
                        .map(|(j, g)| j * g)
                        .collect(),
                )
            }
            ParIndex::Hyper(j) => Some(
                self.gradients
                    .d_hyper
                    .get(j)
                    .cloned()
                    .unwrap_or_else(|| vec![0.0; self.gradients.d_mu.len()]),
            ),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.indices.size_hint()
    }
}

fn gauss2d_values(
    problem: &Problem,
    params: &[f64],
    mu: &[f64],
    ydata: &[f64],
    scale: f64,
) -> Vec<f64> {
    let Some(xy) = problem.xy_accuracy() else {
        return vec![f64::NEG_INFINITY; mu.len()];
    };
    let rx = problem.x_residuals(params);
    let log_2pi = (2.0 * PI).ln();
    (0..mu.len())
        .map(|i| {
            let w = problem.weight(i);
            let ry = ydata[i] - mu[i];
            let det = xy.determinant(i, scale);
            let q = xy.quadratic(i, rx[i], ry, scale);
            -0.5 * w * (det.ln() + log_2pi + q / det)
        })
        .collect()
}

fn split_mixed<'h>(
    a: &ErrorDistribution,
    b: &ErrorDistribution,
    hypars: &'h [f64],
) -> (&'h [f64], &'h [f64], f64) {
    let (na, nb) = (a.nphypar(), b.nphypar());
    (&hypars[..na], &hypars[na..na + nb], hypars[na + nb])
}

/// Evidence of the embedded fit, spread evenly over the data so that the
/// per-value contributions still sum to the total.
fn model_evidence(fitter: &dyn Fitter, problem: &Problem, params: &[f64], hypars: &[f64]) -> Vec<f64> {
    let n = problem.ydata().len().max(1);
    let scale = hypars.first().copied();
    let log_z = fitter.log_z(problem, params, scale).unwrap_or_else(|err| {
        warn!(error = %err, fatal = err.is_fatal(), "embedded fit failed; evidence falls back to the floor");
        LOG_ZERO
    });
    vec![log_z / n as f64; n]
}
