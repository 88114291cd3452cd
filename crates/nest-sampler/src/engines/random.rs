use nest_core::NestResult;

use super::{unit_range, Engine, EngineContext};
use crate::walker::Walker;

/// Independent uniform draws inside the phantom bounding box.
pub(crate) fn execute(
    engine: &mut Engine,
    walker: &mut Walker,
    low_l: f64,
    ctx: &EngineContext<'_>,
) -> NestResult<usize> {
    if walker.fit_index.is_empty() {
        return Ok(0);
    }
    let range = unit_range(walker, low_l, ctx);
    for _ in 0..ctx.config.max_trials {
        let u: Vec<f64> = range
            .umin
            .iter()
            .zip(&range.uran)
            .map(|(lo, r)| lo + r * engine.rng().uniform())
            .collect();
        if let Some(trial) = engine.try_units(walker, &u, low_l, ctx) {
            engine.commit(walker, trial, ctx);
            return Ok(1);
        }
    }
    Ok(0)
}
