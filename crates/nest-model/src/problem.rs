//! Problems bundle a model with its data and expose what the likelihood and
//! the engines need: forward results, residuals, Jacobians and the mapping
//! between parameter domains and the unit cube.

use std::sync::Arc;

use nest_core::errors::ErrorInfo;
use nest_core::{NestError, NestResult};
use serde::{Deserialize, Serialize};

use crate::model::Model;
use crate::models::TourModel;
use crate::prior::Prior;

/// Problem variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProblemKind {
    /// `y = M(x)` with noise in y only.
    Classic,
    /// Noise in both x and y; true x positions are nuisance parameters.
    ErrorsInXandY,
    /// Vector valued model output per datum.
    MultipleOutput,
    /// Parameters are a permutation of the data points.
    Order,
}

/// Value type of the parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParType {
    /// Continuous parameters.
    Float,
    /// Integer parameters (permutations).
    Int,
}

/// Per-datum 2x2 covariance of x and y measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XyAccuracy {
    /// Variance in x.
    pub vxx: Vec<f64>,
    /// Variance in y.
    pub vyy: Vec<f64>,
    /// Covariance of x and y.
    pub vxy: Vec<f64>,
}

impl XyAccuracy {
    /// Independent x and y errors given as standard deviations.
    pub fn independent(sx: &[f64], sy: &[f64]) -> Self {
        Self {
            vxx: sx.iter().map(|s| s * s).collect(),
            vyy: sy.iter().map(|s| s * s).collect(),
            vxy: vec![0.0; sx.len()],
        }
    }

    /// Same covariance for every datum.
    pub fn uniform(ndata: usize, sx: f64, sy: f64, rho: f64) -> Self {
        Self {
            vxx: vec![sx * sx; ndata],
            vyy: vec![sy * sy; ndata],
            vxy: vec![rho * sx * sy; ndata],
        }
    }

    /// The covariance with the roles of x and y exchanged.
    pub fn transposed(&self) -> Self {
        Self {
            vxx: self.vyy.clone(),
            vyy: self.vxx.clone(),
            vxy: self.vxy.clone(),
        }
    }

    /// Number of data points described.
    pub fn len(&self) -> usize {
        self.vxx.len()
    }

    /// True when no data points are described.
    pub fn is_empty(&self) -> bool {
        self.vxx.is_empty()
    }

    /// Determinant of the covariance of datum `i` widened by a model scale.
    pub fn determinant(&self, i: usize, scale: f64) -> f64 {
        let s2 = scale * scale;
        self.vxx[i] * self.vyy[i] - self.vxy[i] * self.vxy[i]
            + s2 * (self.vxx[i] + self.vyy[i] + s2)
    }

    /// Numerator `Q` of the quadratic form `r' C^-1 r = Q / det` for datum `i`.
    pub fn quadratic(&self, i: usize, rx: f64, ry: f64, scale: f64) -> f64 {
        let s2 = scale * scale;
        (self.vyy[i] + s2) * rx * rx - 2.0 * self.vxy[i] * rx * ry + (self.vxx[i] + s2) * ry * ry
    }
}

#[derive(Debug, Clone)]
struct ProblemData {
    xdata: Vec<f64>,
    ydata: Vec<f64>,
    weights: Option<Vec<f64>>,
    accuracy: Option<Vec<f64>>,
    xy: Option<XyAccuracy>,
    targets: Vec<Prior>,
    ndata: usize,
    ndout: usize,
}

/// Model plus data. Cloning is cheap; the data arrays are shared.
#[derive(Debug, Clone)]
pub struct Problem {
    kind: ProblemKind,
    model: Arc<dyn Model>,
    data: Arc<ProblemData>,
}

fn length_error(what: &str, expected: usize, got: usize) -> NestError {
    NestError::Config(
        ErrorInfo::new("problem-shape", format!("{what} has the wrong length"))
            .with_context("expected", expected)
            .with_context("got", got),
    )
}

impl Problem {
    /// Classic problem `y = M(x) + noise`.
    pub fn classic(model: Arc<dyn Model>, xdata: Vec<f64>, ydata: Vec<f64>) -> NestResult<Self> {
        if model.ndout() != 1 {
            return Err(NestError::unsupported(
                "classic-ndout",
                "a classic problem needs a single output model",
            ));
        }
        if xdata.len() != ydata.len() {
            return Err(length_error("ydata", xdata.len(), ydata.len()));
        }
        let ndata = xdata.len();
        Ok(Self::assemble(ProblemKind::Classic, model, xdata, ydata, ndata, 1))
    }

    /// Problem with errors in both x and y.
    ///
    /// The true x positions become nuisance parameters; their priors default
    /// to a Gaussian centred on the observed x with the x accuracy as width.
    pub fn errors_in_xy(
        model: Arc<dyn Model>,
        xdata: Vec<f64>,
        ydata: Vec<f64>,
        accuracy: XyAccuracy,
    ) -> NestResult<Self> {
        if model.ndout() != 1 {
            return Err(NestError::unsupported(
                "errors-ndout",
                "errors in x and y need a single output model",
            ));
        }
        if xdata.len() != ydata.len() {
            return Err(length_error("ydata", xdata.len(), ydata.len()));
        }
        if accuracy.len() != xdata.len()
            || accuracy.vyy.len() != xdata.len()
            || accuracy.vxy.len() != xdata.len()
        {
            return Err(length_error("xy accuracy", xdata.len(), accuracy.len()));
        }
        let targets = xdata
            .iter()
            .zip(&accuracy.vxx)
            .map(|(&x, &vxx)| Prior::gauss(x, vxx.sqrt()))
            .collect::<NestResult<Vec<_>>>()?;
        let ndata = xdata.len();
        let mut problem =
            Self::assemble(ProblemKind::ErrorsInXandY, model, xdata, ydata, ndata, 1);
        problem.data_mut().xy = Some(accuracy);
        problem.data_mut().targets = targets;
        Ok(problem)
    }

    /// Problem whose model yields `ndout` values per datum; `ydata` is
    /// row-major `(ndata, ndout)`.
    pub fn multiple(model: Arc<dyn Model>, xdata: Vec<f64>, ydata: Vec<f64>) -> NestResult<Self> {
        let ndout = model.ndout();
        if ydata.len() != xdata.len() * ndout {
            return Err(length_error("ydata", xdata.len() * ndout, ydata.len()));
        }
        let ndata = xdata.len();
        Ok(Self::assemble(ProblemKind::MultipleOutput, model, xdata, ydata, ndata, ndout))
    }

    /// Travelling-salesman style problem through the points `(x[i], y[i])`.
    pub fn order(xdata: Vec<f64>, ydata: Vec<f64>) -> NestResult<Self> {
        if xdata.len() != ydata.len() {
            return Err(length_error("ydata", xdata.len(), ydata.len()));
        }
        if xdata.len() < 3 {
            return Err(NestError::config("order-size", "a tour needs at least three points"));
        }
        let cities = xdata.iter().zip(&ydata).map(|(&x, &y)| [x, y]).collect();
        let model: Arc<dyn Model> = Arc::new(TourModel::new(cities));
        let ndata = xdata.len();
        Ok(Self::assemble(ProblemKind::Order, model, xdata, ydata, ndata, 1))
    }

    fn assemble(
        kind: ProblemKind,
        model: Arc<dyn Model>,
        xdata: Vec<f64>,
        ydata: Vec<f64>,
        ndata: usize,
        ndout: usize,
    ) -> Self {
        Self {
            kind,
            model,
            data: Arc::new(ProblemData {
                xdata,
                ydata,
                weights: None,
                accuracy: None,
                xy: None,
                targets: Vec::new(),
                ndata,
                ndout,
            }),
        }
    }

    fn data_mut(&mut self) -> &mut ProblemData {
        Arc::make_mut(&mut self.data)
    }

    /// Attaches weights, one per datum (broadcast over outputs) or one per
    /// y value.
    pub fn with_weights(mut self, weights: Vec<f64>) -> NestResult<Self> {
        let weights = self.broadcast("weights", weights)?;
        if weights.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
            return Err(NestError::config("weights-negative", "weights must be finite and >= 0"));
        }
        self.data_mut().weights = Some(weights);
        Ok(self)
    }

    /// Attaches per-datum accuracies (standard deviations), broadcast like
    /// the weights.
    pub fn with_accuracy(mut self, accuracy: Vec<f64>) -> NestResult<Self> {
        let accuracy = self.broadcast("accuracy", accuracy)?;
        if accuracy.iter().any(|a| !(a.is_finite() && *a > 0.0)) {
            return Err(NestError::config("accuracy-positive", "accuracies must be positive"));
        }
        self.data_mut().accuracy = Some(accuracy);
        Ok(self)
    }

    /// Replaces the priors on the true x positions of an errors problem.
    pub fn with_target_priors(mut self, priors: Vec<Prior>) -> NestResult<Self> {
        if self.kind != ProblemKind::ErrorsInXandY {
            return Err(NestError::unsupported(
                "target-priors",
                "only errors-in-x-and-y problems have target priors",
            ));
        }
        if priors.len() != self.data.ndata {
            return Err(length_error("target priors", self.data.ndata, priors.len()));
        }
        self.data_mut().targets = priors;
        Ok(self)
    }

    /// The same data with a different model (used by structural engines).
    pub fn with_model(&self, model: Arc<dyn Model>) -> Self {
        Self {
            kind: self.kind,
            model,
            data: Arc::clone(&self.data),
        }
    }

    fn broadcast(&self, what: &str, values: Vec<f64>) -> NestResult<Vec<f64>> {
        let (ndata, ndout) = (self.data.ndata, self.data.ndout);
        if values.len() == ndata * ndout {
            Ok(values)
        } else if values.len() == ndata {
            Ok(values
                .iter()
                .flat_map(|&v| std::iter::repeat(v).take(ndout))
                .collect())
        } else {
            Err(length_error(what, ndata * ndout, values.len()))
        }
    }

    /// Problem variant.
    pub fn kind(&self) -> ProblemKind {
        self.kind
    }

    /// Parameter value type.
    pub fn partype(&self) -> ParType {
        match self.kind {
            ProblemKind::Order => ParType::Int,
            _ => ParType::Float,
        }
    }

    /// The model.
    pub fn model(&self) -> &Arc<dyn Model> {
        &self.model
    }

    /// Independent variable.
    pub fn xdata(&self) -> &[f64] {
        &self.data.xdata
    }

    /// Observations, flattened row-major over outputs.
    pub fn ydata(&self) -> &[f64] {
        &self.data.ydata
    }

    /// Weights per y value, if any.
    pub fn weights(&self) -> Option<&[f64]> {
        self.data.weights.as_deref()
    }

    /// Weight of y value `i` (1 without weights).
    pub fn weight(&self, i: usize) -> f64 {
        self.data.weights.as_ref().map_or(1.0, |w| w[i])
    }

    /// Sum of the weights (number of y values without weights).
    pub fn sum_weights(&self) -> f64 {
        match &self.data.weights {
            Some(w) => w.iter().sum(),
            None => self.data.ydata.len() as f64,
        }
    }

    /// Per y value accuracies, if any.
    pub fn accuracy(&self) -> Option<&[f64]> {
        self.data.accuracy.as_deref()
    }

    /// Covariances of an errors-in-x-and-y problem.
    pub fn xy_accuracy(&self) -> Option<&XyAccuracy> {
        self.data.xy.as_ref()
    }

    /// Number of data points.
    pub fn ndata(&self) -> usize {
        self.data.ndata
    }

    /// Number of outputs per datum.
    pub fn ndout(&self) -> usize {
        self.data.ndout
    }

    /// Number of model parameters.
    pub fn nmodel(&self) -> usize {
        self.model.npars()
    }

    /// Number of nuisance parameters.
    pub fn nuisance(&self) -> usize {
        match self.kind {
            ProblemKind::ErrorsInXandY => self.data.ndata,
            _ => 0,
        }
    }

    /// Total number of parameters: model plus nuisance.
    pub fn npars(&self) -> usize {
        self.nmodel() + self.nuisance()
    }

    /// True if the model is dynamic.
    pub fn is_dynamic(&self) -> bool {
        self.model.is_dynamic()
    }

    /// True if the model is modifiable.
    pub fn is_modifiable(&self) -> bool {
        self.model.is_modifiable()
    }

    /// The x positions the model is evaluated at.
    fn positions<'a>(&'a self, params: &'a [f64]) -> &'a [f64] {
        match self.kind {
            ProblemKind::ErrorsInXandY => &params[self.nmodel()..],
            _ => &self.data.xdata,
        }
    }

    /// Model results for the full parameter vector.
    ///
    /// For order problems the result is the length of every leg of the tour.
    pub fn result(&self, params: &[f64]) -> Vec<f64> {
        let nmodel = self.nmodel();
        self.model.result(self.positions(params), &params[..nmodel])
    }

    /// `ydata - result`, wrapped into half a period for cyclic models.
    pub fn residuals(&self, params: &[f64]) -> Vec<f64> {
        self.residuals_with(params, &self.data.ydata)
    }

    /// Residuals against arbitrary (mock) data.
    pub fn residuals_with(&self, params: &[f64], ydata: &[f64]) -> Vec<f64> {
        let period = self.model.cyclic();
        ydata
            .iter()
            .zip(self.result(params))
            .map(|(y, m)| {
                let r = y - m;
                match period {
                    Some(p) => nest_core::wrap_half_period(r, p),
                    None => r,
                }
            })
            .collect()
    }

    /// Residuals of the x positions (errors problems only; empty otherwise).
    pub fn x_residuals(&self, params: &[f64]) -> Vec<f64> {
        match self.kind {
            ProblemKind::ErrorsInXandY => self
                .data
                .xdata
                .iter()
                .zip(&params[self.nmodel()..])
                .map(|(x, t)| x - t)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Per-datum numerator of the combined x/y squared distance, weighted.
    ///
    /// Divide by [`Problem::xy_determinants`] to get `r' C^-1 r`. Returns
    /// plain weighted squared residuals for problems without x errors.
    pub fn weighted_res_sq(&self, params: &[f64], scale: f64) -> Vec<f64> {
        let ry = self.residuals(params);
        match &self.data.xy {
            Some(xy) => {
                let rx = self.x_residuals(params);
                (0..self.data.ndata)
                    .map(|i| self.weight(i) * xy.quadratic(i, rx[i], ry[i], scale))
                    .collect()
            }
            None => ry
                .iter()
                .enumerate()
                .map(|(i, r)| self.weight(i) * r * r)
                .collect(),
        }
    }

    /// Determinants of the per-datum covariances widened by `scale`.
    pub fn xy_determinants(&self, scale: f64) -> Vec<f64> {
        match &self.data.xy {
            Some(xy) => (0..self.data.ndata).map(|i| xy.determinant(i, scale)).collect(),
            None => vec![1.0; self.data.ndata],
        }
    }

    /// Jacobian of [`Problem::result`]: one column per parameter.
    ///
    /// Target columns of an errors problem are sparse; only datum `j` depends
    /// on target `j`.
    pub fn partial(&self, params: &[f64]) -> Vec<Vec<f64>> {
        let nmodel = self.nmodel();
        let xs = self.positions(params);
        let mut columns = self.model.partial(xs, &params[..nmodel]);
        if self.kind == ProblemKind::ErrorsInXandY {
            let slope = self.model.derivative(xs, &params[..nmodel]);
            for (j, d) in slope.into_iter().enumerate() {
                let mut column = vec![0.0; self.data.ndata];
                column[j] = d;
                columns.push(column);
            }
        }
        columns
    }

    /// Derivative of the model with respect to x at the model positions.
    pub fn derivative(&self, params: &[f64]) -> Vec<f64> {
        let nmodel = self.nmodel();
        self.model.derivative(self.positions(params), &params[..nmodel])
    }

    /// Prior of parameter `k` (model priors first, then target priors).
    pub fn prior(&self, k: usize) -> Option<&Prior> {
        let nmodel = self.nmodel();
        if k < nmodel {
            self.model.prior(k)
        } else {
            self.data.targets.get(k - nmodel)
        }
    }

    /// Maps the value of parameter `k` to the unit interval.
    pub fn domain_to_unit(&self, value: f64, k: usize) -> f64 {
        self.prior(k).map_or(value, |p| p.domain_to_unit(value))
    }

    /// Maps a unit value to the domain of parameter `k`.
    pub fn unit_to_domain(&self, unit: f64, k: usize) -> f64 {
        self.prior(k).map_or(unit, |p| p.unit_to_domain(unit))
    }

    /// True if `value` lies outside the support of parameter `k`.
    pub fn is_out_of_limits(&self, value: f64, k: usize) -> bool {
        self.prior(k).map_or(!value.is_finite(), |p| p.is_out_of_limits(value))
    }

    /// Euclidean distance between points `i` and `j` of an order problem.
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        let (x, y) = (&self.data.xdata, &self.data.ydata);
        ((x[i] - x[j]).powi(2) + (y[i] - y[j]).powi(2)).sqrt()
    }

    /// Length of each leg of the closed tour `order`.
    pub fn segment_costs(&self, order: &[f64]) -> Vec<f64> {
        self.result(order)
    }

    /// Coordinates of point `i` of an order problem.
    pub fn point(&self, i: usize) -> [f64; 2] {
        [self.data.xdata[i], self.data.ydata[i]]
    }

    /// Engines suited to this problem, by name.
    pub fn default_engines(&self) -> Vec<&'static str> {
        if self.kind == ProblemKind::Order {
            return vec!["move", "reverse", "switch", "shuffle", "loop", "near"];
        }
        let mut engines = vec!["galilean", "chord"];
        if self.model.is_dynamic() {
            engines.extend(["birth", "death"]);
        }
        if self.model.is_modifiable() {
            engines.push("structure");
        }
        engines
    }
}
