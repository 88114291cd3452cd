use std::collections::BTreeMap;
use std::ops::Index;

use nest_core::errors::ErrorInfo;
use nest_core::{NestError, NestResult};
use nest_model::{ErrorDistribution, ParIndex, Problem};

/// One member of the live ensemble.
///
/// A walker owns its own [`Problem`] handle: for dynamic and modifiable
/// models each walker may carry a different model, while data arrays stay
/// shared behind the problem's `Arc`.
#[derive(Debug, Clone)]
pub struct Walker {
    /// Unique identifier within a run.
    pub id: usize,
    /// Walker this one was cloned from.
    pub parent: Option<usize>,
    /// Iteration at which the walker was created.
    pub start: usize,
    /// Problem (and model) the parameters belong to.
    pub problem: Problem,
    /// Model parameters followed by nuisance parameters.
    pub params: Vec<f64>,
    /// Hyperparameters of the error distribution.
    pub hypars: Vec<f64>,
    /// Quantities the engines are allowed to move.
    pub fit_index: Vec<ParIndex>,
    /// Log likelihood at the current position.
    pub log_l: f64,
    /// Log prior density offset; zero when sampling straight from the unit cube.
    pub log_prior: f64,
}

impl Walker {
    /// Creates a walker whose likelihood has not been evaluated yet.
    pub fn new(
        id: usize,
        problem: Problem,
        params: Vec<f64>,
        hypars: Vec<f64>,
        fit_index: Vec<ParIndex>,
    ) -> Self {
        Self {
            id,
            parent: None,
            start: 0,
            problem,
            params,
            hypars,
            fit_index,
            log_l: f64::NEG_INFINITY,
            log_prior: 0.0,
        }
    }

    /// Parameters and hyperparameters concatenated.
    pub fn allpars(&self) -> Vec<f64> {
        self.params.iter().chain(&self.hypars).copied().collect()
    }

    /// Model parameters only.
    pub fn model_params(&self) -> &[f64] {
        &self.params[..self.problem.nmodel().min(self.params.len())]
    }

    /// Nuisance parameters (target positions of an errors problem).
    pub fn nuisance(&self) -> &[f64] {
        &self.params[self.problem.nmodel().min(self.params.len())..]
    }

    /// A copy of this walker under a fresh identity.
    pub fn offspring(&self, id: usize, iteration: usize) -> Self {
        let mut child = self.clone();
        child.id = id;
        child.parent = Some(self.id);
        child.start = iteration;
        child
    }

    /// Verifies that the parameter arrays match the problem and distribution.
    pub fn check(&self, distribution: &ErrorDistribution) -> NestResult<()> {
        let npars = self.problem.npars();
        let nhyp = distribution.nphypar();
        let out_of_range = self.fit_index.iter().any(|index| match *index {
            ParIndex::Param(k) => k >= self.params.len(),
            ParIndex::Hyper(j) => j >= self.hypars.len(),
        });
        if self.params.len() != npars || self.hypars.len() != nhyp || out_of_range {
            return Err(NestError::ConsistencyMismatch(
                ErrorInfo::new("walker-shape", "walker arrays do not match the problem")
                    .with_context("walker", self.id)
                    .with_context("params", self.params.len())
                    .with_context("npars", npars)
                    .with_context("hypars", self.hypars.len())
                    .with_context("nphypar", nhyp),
            ));
        }
        if self.log_l.is_nan() {
            return Err(NestError::ConsistencyMismatch(
                ErrorInfo::new("walker-logl", "walker carries a NaN log likelihood")
                    .with_context("walker", self.id),
            ));
        }
        Ok(())
    }
}

/// Fit index over every unpinned parameter plus the free hyperparameters.
pub fn build_fit_index(
    problem: &Problem,
    distribution: &ErrorDistribution,
    keep: &BTreeMap<usize, f64>,
) -> Vec<ParIndex> {
    (0..problem.npars())
        .filter(|k| !keep.contains_key(k))
        .map(ParIndex::Param)
        .chain(distribution.hyper_fit_index())
        .collect()
}

/// The live ensemble, plus the identifier counter for new walkers.
#[derive(Debug, Clone, Default)]
pub struct WalkerList {
    walkers: Vec<Walker>,
    next_id: usize,
}

impl WalkerList {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a list whose identifiers continue at `next_id`.
    pub fn from_walkers(walkers: Vec<Walker>, next_id: usize) -> Self {
        let floor = walkers.iter().map(|w| w.id + 1).max().unwrap_or(0);
        Self {
            walkers,
            next_id: next_id.max(floor),
        }
    }

    /// Number of live walkers.
    pub fn len(&self) -> usize {
        self.walkers.len()
    }

    /// True if there are no walkers.
    pub fn is_empty(&self) -> bool {
        self.walkers.is_empty()
    }

    /// Iterates over the walkers in list order.
    pub fn iter(&self) -> std::slice::Iter<'_, Walker> {
        self.walkers.iter()
    }

    /// The walkers as a slice.
    pub fn as_slice(&self) -> &[Walker] {
        &self.walkers
    }

    /// Walker at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&Walker> {
        self.walkers.get(index)
    }

    /// Appends a walker.
    pub fn push(&mut self, walker: Walker) {
        self.next_id = self.next_id.max(walker.id + 1);
        self.walkers.push(walker);
    }

    /// Replaces the walker at `index`.
    pub fn replace(&mut self, index: usize, walker: Walker) {
        self.next_id = self.next_id.max(walker.id + 1);
        self.walkers[index] = walker;
    }

    /// Hands out a fresh walker identifier.
    pub fn next_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Identifier the next walker will receive.
    pub fn peek_next_id(&self) -> usize {
        self.next_id
    }

    /// Sorts by log likelihood, worst first. The sort is stable.
    pub fn sort_by_log_l(&mut self) {
        self.walkers.sort_by(|a, b| a.log_l.total_cmp(&b.log_l));
    }

    /// Removes and returns every walker.
    pub fn drain(&mut self) -> Vec<Walker> {
        std::mem::take(&mut self.walkers)
    }
}

impl Index<usize> for WalkerList {
    type Output = Walker;

    fn index(&self, index: usize) -> &Walker {
        &self.walkers[index]
    }
}
