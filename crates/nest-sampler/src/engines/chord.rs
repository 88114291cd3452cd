//! Slice sampling along random chords through the walker.
//!
//! Each chord uses a fresh random direction; the basis is not carried over
//! between accepted points.

use nest_core::NestResult;

use super::{unit_range, units, Engine, EngineContext, UnitRange};
use crate::walker::Walker;

/// Fraction of the box chord used as the initial segment when stepping out.
const STEP_OUT_START: f64 = 0.1;

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
    let mut moves = 0;
    for _ in 0..ctx.nstep {
        let direction: Vec<f64> = range.uran.iter().map(|r| r * engine.rng().normal()).collect();
        let Some((mut t0, mut t1)) = box_crossings(&u, &direction, &range) else {
            continue;
        };
        if ctx.config.step_out {
            (t0, t1) = step_out(engine, walker, &u, &direction, (t0, t1), low_l, ctx);
        }
        for _ in 0..ctx.config.max_trials {
            let t = t0 + (t1 - t0) * engine.rng().uniform();
            let trial_u = along(&u, &direction, t);
            if let Some(trial) = engine.try_units(walker, &trial_u, low_l, ctx) {
                engine.commit(walker, trial, ctx);
                u = trial_u;
                moves += 1;
                break;
            }
            if t < 0.0 {
                t0 = t;
            } else {
                t1 = t;
            }
        }
    }
    Ok(moves)
}

fn along(u: &[f64], d: &[f64], t: f64) -> Vec<f64> {
    u.iter()
        .zip(d)
        .map(|(ui, di)| (ui + t * di).clamp(0.0, 1.0))
        .collect()
}

/// Entry and exit times `t0 < 0 < t1` of the line `u + t·d` in the box.
fn box_crossings(u: &[f64], d: &[f64], range: &UnitRange) -> Option<(f64, f64)> {
    let mut t0 = f64::NEG_INFINITY;
    let mut t1 = f64::INFINITY;
    for (i, di) in d.iter().enumerate() {
        if *di == 0.0 {
            continue;
        }
        let lo = range.umin[i];
        let hi = lo + range.uran[i];
        let a = (lo - u[i]) / di;
        let b = (hi - u[i]) / di;
        t0 = t0.max(a.min(b));
        t1 = t1.min(a.max(b));
    }
    (t0.is_finite() && t1.is_finite() && t0 < t1).then_some((t0.min(0.0), t1.max(0.0)))
}

/// Starts from a short segment around the walker and doubles each end
/// until it leaves the constraint or reaches the box.
fn step_out(
    engine: &mut Engine,
    walker: &Walker,
    u: &[f64],
    d: &[f64],
    (t0, t1): (f64, f64),
    low_l: f64,
    ctx: &EngineContext<'_>,
) -> (f64, f64) {
    let width = STEP_OUT_START * (t1 - t0);
    let r = engine.rng().uniform();
    let mut lo = (-width * r).max(t0);
    let mut hi = (width * (1.0 - r)).min(t1);
    while lo > t0 && inside(engine, walker, &along(u, d, lo), low_l, ctx) {
        lo = (2.0 * lo).max(t0);
    }
    while hi < t1 && inside(engine, walker, &along(u, d, hi), low_l, ctx) {
        hi = (2.0 * hi).min(t1);
    }
    (lo, hi)
}

fn inside(engine: &mut Engine, walker: &Walker, units: &[f64], low_l: f64, ctx: &EngineContext<'_>) -> bool {
    engine.try_units(walker, units, low_l, ctx).is_some()
}
