//! Birth and death moves for models with a variable number of components.
//!
//! A proposal first passes a Metropolis test on the ratio of the grow prior
//! at the new and the current component count; the altered walker is then
//! subject to the usual hard constraint on its likelihood.

use std::sync::Arc;

use nest_core::NestResult;
use nest_model::{apply_alteration, model_chain, Alteration, Model};

use super::{refit_index, Engine, EngineContext};
use crate::walker::Walker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Grow,
    Shrink,
}

pub(crate) fn birth(
    engine: &mut Engine,
    walker: &mut Walker,
    low_l: f64,
    ctx: &EngineContext<'_>,
) -> NestResult<usize> {
    alter(engine, walker, low_l, ctx, Direction::Grow)
}

pub(crate) fn death(
    engine: &mut Engine,
    walker: &mut Walker,
    low_l: f64,
    ctx: &EngineContext<'_>,
) -> NestResult<usize> {
    alter(engine, walker, low_l, ctx, Direction::Shrink)
}

fn alter(
    engine: &mut Engine,
    walker: &mut Walker,
    low_l: f64,
    ctx: &EngineContext<'_>,
    direction: Direction,
) -> NestResult<usize> {
    let full: Arc<dyn Model> = Arc::clone(walker.problem.model());
    let Some(alteration) = propose(engine, full.as_ref(), direction) else {
        return Ok(0);
    };
    let problem = walker.problem.with_model(alteration.model);
    let mut params = walker.params.clone();
    let span = alteration.at..alteration.at + alteration.count;
    match direction {
        Direction::Grow => {
            let mut fresh = Vec::with_capacity(alteration.count);
            for k in span.clone() {
                let Some(prior) = problem.prior(k) else {
                    return Ok(0);
                };
                fresh.push(prior.unit_to_domain(engine.rng().open_uniform()));
            }
            params.splice(span.start..span.start, fresh);
        }
        Direction::Shrink => {
            if span.end > params.len() {
                return Ok(0);
            }
            params.drain(span);
        }
    }

    let mut candidate = walker.clone();
    candidate.fit_index = refit_index(&problem, &walker.fit_index);
    candidate.problem = problem;
    let hypars = walker.hypars.clone();
    let Some(trial) = engine.try_position(&candidate, &candidate.problem, params, hypars, low_l, ctx)
    else {
        return Ok(0);
    };
    walker.problem = candidate.problem;
    walker.fit_index = candidate.fit_index;
    engine.commit(walker, trial, ctx);
    Ok(1)
}

/// Locates the dynamic component, runs the prior-ratio test and returns the
/// alteration of the full model.
fn propose(engine: &mut Engine, full: &dyn Model, direction: Direction) -> Option<Alteration> {
    let chain = model_chain(full);
    let link = chain.into_iter().find(|link| link.model.is_dynamic())?;
    let grow_prior = link.model.grow_prior()?;
    let k = link.model.ncomp();
    let target = match direction {
        Direction::Grow => k + 1,
        Direction::Shrink => k.checked_sub(1)?,
    };
    let current = grow_prior.result(k as f64);
    let ratio = grow_prior.result(target as f64) / current;
    let u = engine.rng().uniform();
    if current > 0.0 && (ratio.is_nan() || u >= ratio) {
        engine.reject();
        return None;
    }
    let alteration = match direction {
        Direction::Grow => link.model.grow(engine.rng())?,
        Direction::Shrink => link.model.shrink(engine.rng())?,
    };
    apply_alteration(full, &link, alteration)
}
