use serde::{Deserialize, Serialize};

use crate::prior::Prior;

/// Address of one sampled quantity.
///
/// Model and nuisance parameters live in one array, hyperparameters of the
/// error distribution in another; a fit index is a list of these addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "slot", content = "index", rename_all = "kebab-case")]
pub enum ParIndex {
    /// Model or nuisance parameter `k`.
    Param(usize),
    /// Hyperparameter `j` of the error distribution.
    Hyper(usize),
}

impl ParIndex {
    /// Reads the addressed value.
    pub fn get(&self, params: &[f64], hypars: &[f64]) -> f64 {
        match *self {
            ParIndex::Param(k) => params[k],
            ParIndex::Hyper(j) => hypars[j],
        }
    }

    /// Writes the addressed value.
    pub fn set(&self, params: &mut [f64], hypars: &mut [f64], value: f64) {
        match *self {
            ParIndex::Param(k) => params[k] = value,
            ParIndex::Hyper(j) => hypars[j] = value,
        }
    }
}

/// Hyperparameter of an error distribution (noise scale, power, fraction).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperParameter {
    /// Current (or pinned) value.
    pub value: f64,
    /// Prior used when the value is sampled.
    pub prior: Option<Prior>,
    /// Fixed hyperparameters never enter the fit index.
    pub fixed: bool,
}

impl HyperParameter {
    /// A hyperparameter pinned at `value`.
    pub fn fixed(value: f64) -> Self {
        Self {
            value,
            prior: None,
            fixed: true,
        }
    }

    /// A sampled hyperparameter; `value` is only a starting point.
    pub fn sampled(value: f64, prior: Prior) -> Self {
        Self {
            value,
            prior: Some(prior),
            fixed: false,
        }
    }

    /// Pins the value.
    pub fn keep(&mut self, value: f64) {
        self.value = value;
        self.fixed = true;
    }

    /// Sets the prior and releases the value for sampling.
    pub fn set_prior(&mut self, prior: Prior) {
        self.prior = Some(prior);
        self.fixed = false;
    }

    /// Limits of the prior, if any.
    pub fn limits(&self) -> Option<[f64; 2]> {
        self.prior.as_ref().and_then(Prior::limits)
    }
}
