use nest_core::NestResult;

use super::{Engine, EngineContext};
use crate::walker::Walker;

/// Convex combination with another walker of the same shape.
///
/// The partner is neither the walker itself nor the walker it was cloned
/// from; every fit coordinate gets its own mixing fraction.
pub(crate) fn execute(
    engine: &mut Engine,
    walker: &mut Walker,
    low_l: f64,
    ctx: &EngineContext<'_>,
) -> NestResult<usize> {
    let partners: Vec<&Walker> = ctx
        .walkers
        .iter()
        .filter(|w| {
            w.id != walker.id
                && Some(w.id) != walker.parent
                && w.params.len() == walker.params.len()
                && w.fit_index == walker.fit_index
        })
        .collect();
    if partners.is_empty() || walker.fit_index.is_empty() {
        return Ok(0);
    }
    for _ in 0..ctx.config.max_trials {
        let partner = partners[engine.rng().below(partners.len())];
        let mut params = walker.params.clone();
        let mut hypars = walker.hypars.clone();
        for index in &walker.fit_index {
            let f = engine.rng().uniform();
            let mine = index.get(&walker.params, &walker.hypars);
            let theirs = index.get(&partner.params, &partner.hypars);
            index.set(&mut params, &mut hypars, f * mine + (1.0 - f) * theirs);
        }
        if let Some(trial) = engine.try_position(walker, &walker.problem, params, hypars, low_l, ctx) {
            engine.commit(walker, trial, ctx);
            return Ok(1);
        }
    }
    Ok(0)
}
