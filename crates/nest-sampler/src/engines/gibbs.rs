use nest_core::NestResult;

use super::{mirror, unit_range, units, Engine, EngineContext};
use crate::walker::Walker;

/// Moves one fit coordinate at a time, in random order.
pub(crate) fn execute(
    engine: &mut Engine,
    walker: &mut Walker,
    low_l: f64,
    ctx: &EngineContext<'_>,
) -> NestResult<usize> {
    let m = walker.fit_index.len();
    if m == 0 {
        return Ok(0);
    }
    let range = unit_range(walker, low_l, ctx);
    let mut u = units(walker, ctx.distribution);
    let passes = (ctx.nstep / m).max(1);
    let mut moves = 0;
    for _ in 0..passes {
        for i in engine.rng().permutation(m) {
            let saved = u[i];
            let mut step = range.uran[i];
            let mut moved = false;
            for _ in 0..ctx.config.max_trials {
                let proposal = saved + step * (2.0 * engine.rng().uniform() - 1.0);
                u[i] = mirror(proposal).0;
                if let Some(trial) = engine.try_units(walker, &u, low_l, ctx) {
                    engine.commit(walker, trial, ctx);
                    moves += 1;
                    moved = true;
                    break;
                }
                step *= 0.5;
            }
            if !moved {
                u[i] = saved;
            }
        }
    }
    Ok(moves)
}
