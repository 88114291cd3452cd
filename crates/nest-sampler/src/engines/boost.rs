use std::sync::Arc;

use nest_model::{Fitter, ParIndex, ParType, ProblemKind};
use tracing::debug;

use super::{out_of_limits, EngineContext, EngineCounters};
use crate::walker::Walker;

/// Pushes a walker that beat the best phantom to the nearby optimum with a
/// least-squares fit.
///
/// Only the fitted parameters move; kept parameters and hyperparameters are
/// restored after the fit. The result is adopted when it stays inside the
/// priors and improves the likelihood. Fitter failures are counted and
/// otherwise ignored.
#[derive(Debug, Clone)]
pub struct BestBoost {
    fitter: Arc<dyn Fitter>,
    counters: EngineCounters,
}

impl BestBoost {
    /// Boost driven by `fitter`.
    pub fn new(fitter: Arc<dyn Fitter>) -> Self {
        Self {
            fitter,
            counters: EngineCounters::default(),
        }
    }

    /// Accumulated counters.
    pub fn counters(&self) -> &EngineCounters {
        &self.counters
    }

    /// A copy sharing the fitter, with zeroed counters.
    pub fn fork(&self) -> Self {
        Self::new(Arc::clone(&self.fitter))
    }

    /// Folds the counters of a copy back in.
    pub fn absorb(&mut self, copy: &BestBoost) {
        self.counters.add(&copy.counters);
    }

    /// Returns true when the walker moved.
    pub fn boost(&mut self, walker: &mut Walker, ctx: &EngineContext<'_>) -> bool {
        let suitable = matches!(
            walker.problem.kind(),
            ProblemKind::Classic | ProblemKind::MultipleOutput
        ) && walker.problem.partype() == ParType::Float;
        if !suitable || walker.log_l <= ctx.best_log_l {
            return false;
        }
        let fit = match self.fitter.fit(&walker.problem, &walker.params) {
            Ok(fit) => fit,
            Err(err) => {
                self.counters.failed += 1;
                debug!(walker = walker.id, error = %err, "best boost fit failed");
                return false;
            }
        };
        let mut params = walker.params.clone();
        for (k, value) in fit.params.iter().enumerate() {
            if walker.fit_index.contains(&ParIndex::Param(k)) {
                params[k] = *value;
            }
        }
        if out_of_limits(&walker.problem, ctx.distribution, &walker.fit_index, &params, &walker.hypars) {
            self.counters.reject += 1;
            return false;
        }
        self.counters.ncalls += 1;
        let log_l = ctx.distribution.log_likelihood(&walker.problem, &params, &walker.hypars);
        if !log_l.is_finite() || log_l <= walker.log_l {
            self.counters.reject += 1;
            return false;
        }
        walker.params = params;
        walker.log_l = log_l;
        self.counters.success += 1;
        self.counters.best += 1;
        true
    }
}
