use std::collections::BTreeMap;

use nest_core::errors::ErrorInfo;
use nest_core::{NestError, NestResult, RngHandle};
use nest_model::{apply_alteration, model_chain, ErrorDistribution, ParIndex, ParType, Problem};

use super::EngineCounters;
use crate::walker::{build_fit_index, Walker};

/// Upper bound on the components added to a dynamic model at start.
const MAX_GROWTH: usize = 64;

/// Draws initial walkers from the prior.
#[derive(Debug, Clone, Default)]
pub struct StartEngine {
    max_trials: usize,
    counters: EngineCounters,
}

impl StartEngine {
    /// A start engine retrying `max_trials * (1 + id)` times per walker.
    pub fn new(max_trials: usize) -> Self {
        Self {
            max_trials: max_trials.max(1),
            counters: EngineCounters::default(),
        }
    }

    /// Counters accumulated over all walkers drawn so far.
    pub fn counters(&self) -> &EngineCounters {
        &self.counters
    }

    /// Draws walker `id` with a finite likelihood.
    pub fn walker(
        &mut self,
        id: usize,
        problem: &Problem,
        distribution: &ErrorDistribution,
        keep: &BTreeMap<usize, f64>,
        rng: &mut RngHandle,
    ) -> NestResult<Walker> {
        let problem = grown(problem, rng);
        let npars = problem.npars();
        let fit_index = build_fit_index(&problem, distribution, keep);
        let base: Vec<f64> = (0..npars).map(|k| keep.get(&k).copied().unwrap_or(0.0)).collect();
        let attempts = self.max_trials * (1 + id);
        for _ in 0..attempts {
            let mut params = base.clone();
            let mut hypars = distribution.hyper_values();
            if problem.partype() == ParType::Int {
                params = rng.permutation(npars).into_iter().map(|c| c as f64).collect();
            } else {
                for index in &fit_index {
                    let u = rng.open_uniform();
                    let value = match *index {
                        ParIndex::Param(k) => problem.unit_to_domain(u, k),
                        ParIndex::Hyper(j) => distribution
                            .hyper_prior(j)
                            .map_or(hypars[j], |p| p.unit_to_domain(u)),
                    };
                    index.set(&mut params, &mut hypars, value);
                }
            }
            self.counters.ncalls += 1;
            let log_l = distribution.log_likelihood(&problem, &params, &hypars);
            if log_l.is_finite() {
                self.counters.success += 1;
                let mut walker = Walker::new(id, problem, params, hypars, fit_index);
                walker.log_l = log_l;
                return Ok(walker);
            }
            self.counters.reject += 1;
        }
        self.counters.failed += 1;
        Err(NestError::DegenerateLikelihood(
            ErrorInfo::new("start-degenerate", "no finite log likelihood found from the prior")
                .with_context("walker", id)
                .with_context("attempts", attempts)
                .with_hint("check the priors against the data and the error distribution"),
        ))
    }
}

/// Grows a dynamic model while its component count stays below a draw from
/// the grow prior.
fn grown(problem: &Problem, rng: &mut RngHandle) -> Problem {
    let mut problem = problem.clone();
    if !problem.is_dynamic() {
        return problem;
    }
    for _ in 0..MAX_GROWTH {
        let model = problem.model().clone();
        let links = model_chain(model.as_ref());
        let Some(link) = links.iter().find(|l| l.model.is_dynamic()) else {
            break;
        };
        let Some(prior) = link.model.grow_prior() else {
            break;
        };
        if link.model.ncomp() as f64 >= prior.unit_to_domain(rng.uniform()) {
            break;
        }
        let Some(alteration) = link.model.grow(rng) else {
            break;
        };
        let Some(spliced) = apply_alteration(model.as_ref(), link, alteration) else {
            break;
        };
        problem = problem.with_model(spliced.model);
    }
    problem
}
