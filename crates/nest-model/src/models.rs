//! Reference models implementing the [`Model`] contract.
//!
//! These are collaborators for tests, benches and small studies, not a model
//! library: polynomials, a dynamic sum of Gaussians, a piecewise-linear model
//! with movable knots, a closure-backed model and a component chain.

use std::fmt;
use std::sync::Arc;

use nest_core::{NestError, NestResult, RngHandle};

use crate::model::{Alteration, Model};
use crate::prior::Prior;

fn missing_priors(name: &str, expected: usize, got: usize) -> NestError {
    NestError::config("model-priors", format!("{name} expects {expected} priors, got {got}"))
}

/// Polynomial `sum_k p_k x^k`.
#[derive(Debug, Clone)]
pub struct PolynomialModel {
    degree: usize,
    priors: Vec<Prior>,
}

impl PolynomialModel {
    /// Polynomial of the given degree with no priors attached yet.
    pub fn new(degree: usize) -> Self {
        Self {
            degree,
            priors: Vec::new(),
        }
    }

    /// Attaches the same prior to every coefficient.
    pub fn with_prior(mut self, prior: Prior) -> Self {
        self.priors = vec![prior; self.degree + 1];
        self
    }

    /// Attaches one prior per coefficient.
    pub fn with_priors(mut self, priors: Vec<Prior>) -> NestResult<Self> {
        if priors.len() != self.degree + 1 {
            return Err(missing_priors("polynomial", self.degree + 1, priors.len()));
        }
        self.priors = priors;
        Ok(self)
    }
}

impl Model for PolynomialModel {
    fn name(&self) -> String {
        format!("polynomial of degree {}", self.degree)
    }

    fn npars(&self) -> usize {
        self.degree + 1
    }

    fn result(&self, x: &[f64], params: &[f64]) -> Vec<f64> {
        x.iter()
            .map(|&xi| params.iter().rev().fold(0.0, |acc, &p| acc * xi + p))
            .collect()
    }

    fn partial(&self, x: &[f64], _params: &[f64]) -> Vec<Vec<f64>> {
        (0..=self.degree)
            .map(|k| x.iter().map(|&xi| xi.powi(k as i32)).collect())
            .collect()
    }

    fn derivative(&self, x: &[f64], params: &[f64]) -> Vec<f64> {
        x.iter()
            .map(|&xi| {
                params
                    .iter()
                    .enumerate()
                    .skip(1)
                    .map(|(k, &p)| k as f64 * p * xi.powi(k as i32 - 1))
                    .sum()
            })
            .collect()
    }

    fn prior(&self, k: usize) -> Option<&Prior> {
        self.priors.get(k)
    }

    fn is_linear(&self) -> bool {
        true
    }
}

/// Sum of Gaussian bumps `a * exp(-0.5 ((x - c) / w)^2)` with a variable
/// number of components.
#[derive(Debug, Clone)]
pub struct GaussSumModel {
    ncomp: usize,
    min_comp: usize,
    max_comp: usize,
    priors: [Prior; 3],
    grow_prior: Prior,
}

impl GaussSumModel {
    /// Creates a model with `ncomp` components.
    ///
    /// `priors` holds the amplitude, center and width priors shared by every
    /// component; `grow_prior` is the prior on the number of components.
    pub fn new(ncomp: usize, priors: [Prior; 3], grow_prior: Prior) -> Self {
        Self {
            ncomp,
            min_comp: 0,
            max_comp: usize::MAX,
            priors,
            grow_prior,
        }
    }

    /// Limits the number of components to `min..=max`.
    pub fn with_component_range(mut self, min: usize, max: usize) -> NestResult<Self> {
        if min > max || self.ncomp < min || self.ncomp > max {
            return Err(NestError::config(
                "gauss-sum-range",
                format!("component range {min}..={max} excludes {}", self.ncomp),
            ));
        }
        self.min_comp = min;
        self.max_comp = max;
        Ok(self)
    }

    fn with_ncomp(&self, ncomp: usize) -> Self {
        Self {
            ncomp,
            ..self.clone()
        }
    }
}

impl Model for GaussSumModel {
    fn name(&self) -> String {
        format!("sum of {} gaussians", self.ncomp)
    }

    fn npars(&self) -> usize {
        3 * self.ncomp
    }

    fn result(&self, x: &[f64], params: &[f64]) -> Vec<f64> {
        x.iter()
            .map(|&xi| {
                params
                    .chunks_exact(3)
                    .map(|c| {
                        let z = (xi - c[1]) / c[2];
                        c[0] * (-0.5 * z * z).exp()
                    })
                    .sum()
            })
            .collect()
    }

    fn partial(&self, x: &[f64], params: &[f64]) -> Vec<Vec<f64>> {
        let mut columns = Vec::with_capacity(params.len());
        for c in params.chunks_exact(3) {
            let (amp, center, width) = (c[0], c[1], c[2]);
            let mut d_amp = Vec::with_capacity(x.len());
            let mut d_center = Vec::with_capacity(x.len());
            let mut d_width = Vec::with_capacity(x.len());
            for &xi in x {
                let z = (xi - center) / width;
                let e = (-0.5 * z * z).exp();
                d_amp.push(e);
                d_center.push(amp * e * z / width);
                d_width.push(amp * e * z * z / width);
            }
            columns.push(d_amp);
            columns.push(d_center);
            columns.push(d_width);
        }
        columns
    }

    fn prior(&self, k: usize) -> Option<&Prior> {
        (k < self.npars()).then(|| &self.priors[k % 3])
    }

    fn is_dynamic(&self) -> bool {
        true
    }

    fn ncomp(&self) -> usize {
        self.ncomp
    }

    fn grow_prior(&self) -> Option<&Prior> {
        Some(&self.grow_prior)
    }

    fn grow(&self, _rng: &mut RngHandle) -> Option<Alteration> {
        if self.ncomp >= self.max_comp {
            return None;
        }
        Some(Alteration {
            model: Arc::new(self.with_ncomp(self.ncomp + 1)),
            at: 3 * self.ncomp,
            count: 3,
        })
    }

    fn shrink(&self, rng: &mut RngHandle) -> Option<Alteration> {
        if self.ncomp <= self.min_comp || self.ncomp == 0 {
            return None;
        }
        let victim = rng.below(self.ncomp);
        Some(Alteration {
            model: Arc::new(self.with_ncomp(self.ncomp - 1)),
            at: 3 * victim,
            count: 3,
        })
    }
}

/// Piecewise-linear interpolation through knots whose interior positions may
/// move. Parameters are the values at the knots.
#[derive(Debug, Clone)]
pub struct KnotModel {
    knots: Vec<f64>,
    prior: Prior,
}

impl KnotModel {
    /// Creates the model; knots must be strictly increasing and at least two.
    pub fn new(knots: Vec<f64>, prior: Prior) -> NestResult<Self> {
        if knots.len() < 2 || knots.windows(2).any(|w| w[0] >= w[1]) {
            return Err(NestError::config(
                "knot-order",
                "knots must be strictly increasing and at least two",
            ));
        }
        Ok(Self { knots, prior })
    }

    /// Current knot positions.
    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    fn basis(&self, xi: f64) -> (usize, f64) {
        let last = self.knots.len() - 1;
        let seg = match self
            .knots
            .windows(2)
            .position(|w| xi >= w[0] && xi <= w[1])
        {
            Some(seg) => seg,
            None if xi < self.knots[0] => 0,
            None => last - 1,
        };
        let t = (xi - self.knots[seg]) / (self.knots[seg + 1] - self.knots[seg]);
        (seg, t)
    }
}

impl Model for KnotModel {
    fn name(&self) -> String {
        format!("piecewise linear with {} knots", self.knots.len())
    }

    fn npars(&self) -> usize {
        self.knots.len()
    }

    fn result(&self, x: &[f64], params: &[f64]) -> Vec<f64> {
        x.iter()
            .map(|&xi| {
                let (seg, t) = self.basis(xi);
                params[seg] * (1.0 - t) + params[seg + 1] * t
            })
            .collect()
    }

    fn partial(&self, x: &[f64], _params: &[f64]) -> Vec<Vec<f64>> {
        let mut columns = vec![vec![0.0; x.len()]; self.npars()];
        for (i, &xi) in x.iter().enumerate() {
            let (seg, t) = self.basis(xi);
            columns[seg][i] = 1.0 - t;
            columns[seg + 1][i] = t;
        }
        columns
    }

    fn prior(&self, k: usize) -> Option<&Prior> {
        (k < self.npars()).then_some(&self.prior)
    }

    fn is_linear(&self) -> bool {
        true
    }

    fn is_modifiable(&self) -> bool {
        true
    }

    fn nvary(&self) -> usize {
        self.knots.len().saturating_sub(2)
    }

    fn vary(&self, location: usize, rng: &mut RngHandle) -> Option<Arc<dyn Model>> {
        let k = location + 1;
        if k + 1 >= self.knots.len() {
            return None;
        }
        let (lo, hi) = (self.knots[k - 1], self.knots[k + 1]);
        let mut knots = self.knots.clone();
        knots[k] = lo + (hi - lo) * rng.open_uniform();
        Some(Arc::new(Self {
            knots,
            prior: self.prior.clone(),
        }))
    }
}

/// Signature of the closure behind a [`FunctionModel`].
pub type ModelFn = dyn Fn(&[f64], &[f64]) -> Vec<f64> + Send + Sync;

/// Model backed by a closure; partials are numeric.
#[derive(Clone)]
pub struct FunctionModel {
    name: String,
    npars: usize,
    ndout: usize,
    priors: Vec<Prior>,
    function: Arc<ModelFn>,
}

impl fmt::Debug for FunctionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionModel")
            .field("name", &self.name)
            .field("npars", &self.npars)
            .field("ndout", &self.ndout)
            .finish_non_exhaustive()
    }
}

impl FunctionModel {
    /// Wraps `function`; it must return `x.len() * ndout` values.
    pub fn new(
        name: impl Into<String>,
        priors: Vec<Prior>,
        ndout: usize,
        function: impl Fn(&[f64], &[f64]) -> Vec<f64> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            npars: priors.len(),
            ndout: ndout.max(1),
            priors,
            function: Arc::new(function),
        }
    }
}

impl Model for FunctionModel {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn npars(&self) -> usize {
        self.npars
    }

    fn ndout(&self) -> usize {
        self.ndout
    }

    fn result(&self, x: &[f64], params: &[f64]) -> Vec<f64> {
        (self.function)(x, params)
    }

    fn prior(&self, k: usize) -> Option<&Prior> {
        self.priors.get(k)
    }
}

/// Chain of models whose results are summed; each component owns the
/// parameter slice starting at the sum of the preceding `npars`.
#[derive(Debug, Clone)]
pub struct CompoundModel {
    components: Vec<Arc<dyn Model>>,
}

impl CompoundModel {
    /// Builds a chain; all components must share `ndout`.
    pub fn new(components: Vec<Arc<dyn Model>>) -> NestResult<Self> {
        let Some(first) = components.first() else {
            return Err(NestError::config("compound-empty", "a chain needs at least one model"));
        };
        let ndout = first.ndout();
        if components.iter().any(|c| c.ndout() != ndout) {
            return Err(NestError::config(
                "compound-ndout",
                "chained models must share the number of outputs",
            ));
        }
        Ok(Self { components })
    }

    fn offsets(&self) -> impl Iterator<Item = (usize, &Arc<dyn Model>)> + '_ {
        let mut offset = 0;
        self.components.iter().map(move |c| {
            let start = offset;
            offset += c.npars();
            (start, c)
        })
    }
}

impl Model for CompoundModel {
    fn name(&self) -> String {
        let names: Vec<String> = self.components.iter().map(|c| c.name()).collect();
        names.join(" + ")
    }

    fn npars(&self) -> usize {
        self.components.iter().map(|c| c.npars()).sum()
    }

    fn ndout(&self) -> usize {
        self.components[0].ndout()
    }

    fn result(&self, x: &[f64], params: &[f64]) -> Vec<f64> {
        let mut total = vec![0.0; x.len() * self.ndout()];
        for (offset, component) in self.offsets() {
            let slice = &params[offset..offset + component.npars()];
            for (t, v) in total.iter_mut().zip(component.result(x, slice)) {
                *t += v;
            }
        }
        total
    }

    fn partial(&self, x: &[f64], params: &[f64]) -> Vec<Vec<f64>> {
        self.offsets()
            .flat_map(|(offset, component)| {
                component.partial(x, &params[offset..offset + component.npars()])
            })
            .collect()
    }

    fn prior(&self, k: usize) -> Option<&Prior> {
        self.offsets()
            .find(|(offset, c)| k >= *offset && k < offset + c.npars())
            .and_then(|(offset, c)| c.prior(k - offset))
    }

    fn is_linear(&self) -> bool {
        self.components.iter().all(|c| c.is_linear())
    }

    fn is_dynamic(&self) -> bool {
        self.components.iter().any(|c| c.is_dynamic())
    }

    fn is_modifiable(&self) -> bool {
        self.components.iter().any(|c| c.is_modifiable())
    }

    fn components(&self) -> Vec<&dyn Model> {
        self.components.iter().map(|c| c.as_ref()).collect()
    }

    fn with_component(&self, index: usize, component: Arc<dyn Model>) -> Option<Arc<dyn Model>> {
        let mut components = self.components.clone();
        *components.get_mut(index)? = component;
        Some(Arc::new(Self { components }))
    }
}

/// Closed tour through 2-D cities; parameters are a permutation of the city
/// indices (stored as floats) and the result is the length of every leg.
#[derive(Debug, Clone)]
pub struct TourModel {
    cities: Arc<Vec<[f64; 2]>>,
}

impl TourModel {
    /// Creates the model for the given city coordinates.
    pub fn new(cities: Vec<[f64; 2]>) -> Self {
        Self {
            cities: Arc::new(cities),
        }
    }

    /// Euclidean distance between cities `i` and `j`.
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        let (a, b) = (self.cities[i], self.cities[j]);
        ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
    }
}

impl Model for TourModel {
    fn name(&self) -> String {
        format!("tour through {} cities", self.cities.len())
    }

    fn npars(&self) -> usize {
        self.cities.len()
    }

    fn result(&self, _x: &[f64], params: &[f64]) -> Vec<f64> {
        let n = params.len();
        (0..n)
            .map(|i| {
                let from = params[i] as usize;
                let to = params[(i + 1) % n] as usize;
                self.distance(from, to)
            })
            .collect()
    }

    fn prior(&self, _k: usize) -> Option<&Prior> {
        None
    }
}
