use nest_core::NestResult;

use super::{mirror, unit_range, units, Engine, EngineContext};
use crate::walker::Walker;

/// Global random walk in the fit coordinates.
///
/// A rejected step is halved and reversed before the next try; an accepted
/// one draws a fresh step.
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
    let mut u = units(walker, ctx.distribution);
    let mut step = draw(engine, &range.uran);
    let mut moves = 0;
    let mut failures = 0;
    while moves < ctx.nstep && failures < ctx.config.max_trials {
        let trial_u: Vec<f64> = u.iter().zip(&step).map(|(a, s)| mirror(a + s).0).collect();
        if let Some(trial) = engine.try_units(walker, &trial_u, low_l, ctx) {
            engine.commit(walker, trial, ctx);
            u = trial_u;
            step = draw(engine, &range.uran);
            moves += 1;
        } else {
            failures += 1;
            step.iter_mut().for_each(|s| *s *= -0.5);
        }
    }
    Ok(moves)
}

fn draw(engine: &mut Engine, uran: &[f64]) -> Vec<f64> {
    uran.iter().map(|r| r * (engine.rng().uniform() - 0.5)).collect()
}
