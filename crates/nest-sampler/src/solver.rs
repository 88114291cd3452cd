use nest_core::errors::ErrorInfo;
use nest_core::{NestError, NestResult};
use nest_model::{ErrorDistribution, Problem, ProblemKind};

use crate::config::SamplerConfig;
use crate::sampler::NestedSampler;
use crate::samples::Sample;

/// Nested sampling used as an optimiser for order problems.
///
/// The likelihood is minus the tour length, so the best sample is the
/// shortest tour found.
#[derive(Debug)]
pub struct NestedSolver {
    sampler: NestedSampler,
}

impl NestedSolver {
    /// Solver for an order problem under the distance cost.
    pub fn new(problem: Problem, config: SamplerConfig) -> NestResult<Self> {
        if problem.kind() != ProblemKind::Order {
            return Err(NestError::UnsupportedCombination(
                ErrorInfo::new("solver-order", "the solver only handles order problems")
                    .with_context("problem", format!("{:?}", problem.kind())),
            ));
        }
        let sampler = NestedSampler::new(problem, ErrorDistribution::distance(), config)?;
        Ok(Self { sampler })
    }

    /// Runs the sampler and returns the sample with the highest likelihood.
    pub fn solve(&mut self) -> NestResult<Sample> {
        self.sampler.sample()?;
        let samples = self.sampler.samples();
        samples
            .max_likelihood_index()
            .and_then(|index| samples.get(index))
            .cloned()
            .ok_or_else(|| {
                NestError::DegenerateLikelihood(ErrorInfo::new(
                    "solver-empty",
                    "the run produced no samples",
                ))
            })
    }

    /// The underlying sampler, for reports and diagnostics.
    pub fn sampler(&self) -> &NestedSampler {
        &self.sampler
    }
}
