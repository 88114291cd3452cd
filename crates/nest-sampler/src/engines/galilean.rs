//! Reflective ballistic moves.
//!
//! The walker travels along a velocity in unit space. A step that lands
//! inside the constraint is accepted and the velocity is wiggled. A step
//! that leaves it is traced back to the edge, where the velocity is mirrored
//! on the likelihood gradient and the remainder of the step is retried. A
//! second miss reverses the velocity and shrinks the step.

use nest_core::NestResult;
use nest_model::ParIndex;

use super::{mirror, place, unit_range, units, Engine, EngineContext};
use crate::walker::Walker;

/// Refinements spent locating the edge of the constraint.
const EDGE_STEPS: usize = 10;
/// Tolerance on `|logL - L*|` at the edge.
const EDGE_TOLERANCE: f64 = 1.0e-3;
/// Unit-space step for the chain-rule factor `dθ/du`.
const UNIT_STEP: f64 = 1.0e-6;

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
    let nominal = ctx.config.size;
    let (min_size, max_size) = (nominal / 4.0, nominal * 4.0);
    let grow = 1.0 + ctx.config.delta;
    let mut size = nominal;
    let mut u = units(walker, ctx.distribution);
    let mut v = velocity(engine, &range.uran, size);

    let mut moves = 0;
    let mut failures = 0;
    while moves < ctx.nstep && failures < ctx.config.max_trials {
        let (trial_u, reflected) = advance(&u, &v, 1.0);
        if reflected.iter().any(|r| *r) {
            regenerate(engine, &mut v, &reflected, &range.uran, size);
        }
        if let Some(trial) = engine.try_units(walker, &trial_u, low_l, ctx) {
            engine.commit(walker, trial, ctx);
            u = trial_u;
            wiggle(engine, &mut v, &range.uran, size, ctx.config.wiggle);
            if size * grow <= max_size {
                size *= grow;
                v.iter_mut().for_each(|x| *x *= grow);
            }
            moves += 1;
            continue;
        }

        // Outside for the first time: find the edge and reflect.
        if let Some((t, edge)) = find_edge(engine, walker, &u, &v, low_l, ctx) {
            if let Some(normal) = unit_gradient(engine, walker, &edge, ctx) {
                let reflected_v = reflect(&v, &normal);
                let (retry_u, _) = advance(&edge, &reflected_v, 1.0 - t);
                if let Some(trial) = engine.try_units(walker, &retry_u, low_l, ctx) {
                    engine.commit(walker, trial, ctx);
                    u = retry_u;
                    v = reflected_v;
                    moves += 1;
                    continue;
                }
            }
        }

        // Outside for the second time.
        failures += 1;
        v.iter_mut().for_each(|x| *x = -*x);
        if size / grow >= min_size {
            size /= grow;
            v.iter_mut().for_each(|x| *x /= grow);
        }
    }
    Ok(moves)
}

fn velocity(engine: &mut Engine, uran: &[f64], size: f64) -> Vec<f64> {
    let scale = size / (uran.len() as f64).sqrt();
    uran.iter().map(|r| scale * r * engine.rng().normal()).collect()
}

/// New random magnitudes, keeping the current signs.
fn regenerate(engine: &mut Engine, v: &mut [f64], reflected: &[bool], uran: &[f64], size: f64) {
    let fresh = velocity(engine, uran, size);
    for ((vi, f), r) in v.iter_mut().zip(fresh).zip(reflected) {
        let sign = if *r { -vi.signum() } else { vi.signum() };
        *vi = sign * f.abs();
    }
}

fn wiggle(engine: &mut Engine, v: &mut [f64], uran: &[f64], size: f64, fraction: f64) {
    let kick = velocity(engine, uran, size);
    for (vi, k) in v.iter_mut().zip(kick) {
        *vi += fraction * k;
    }
}

/// `u + t·v` mirrored into the unit cube, with the axes that reflected.
fn advance(u: &[f64], v: &[f64], t: f64) -> (Vec<f64>, Vec<bool>) {
    u.iter()
        .zip(v)
        .map(|(ui, vi)| mirror(ui + t * vi))
        .unzip()
}

fn reflect(v: &[f64], normal: &[f64]) -> Vec<f64> {
    let nn: f64 = normal.iter().map(|n| n * n).sum();
    let vn: f64 = v.iter().zip(normal).map(|(a, b)| a * b).sum();
    v.iter()
        .zip(normal)
        .map(|(vi, ni)| vi - 2.0 * vn / nn * ni)
        .collect()
}

fn score(
    engine: &mut Engine,
    walker: &Walker,
    units: &[f64],
    ctx: &EngineContext<'_>,
) -> f64 {
    match place(walker, ctx.distribution, units) {
        Some((params, hypars)) => {
            let inside = !walker.fit_index.iter().any(|index| match *index {
                ParIndex::Param(k) => walker.problem.is_out_of_limits(index.get(&params, &hypars), k),
                ParIndex::Hyper(_) => false,
            });
            if inside {
                engine.evaluate(ctx, &walker.problem, &params, &hypars)
            } else {
                f64::NEG_INFINITY
            }
        }
        None => f64::NEG_INFINITY,
    }
}

/// Locates `t` in `(0, 1)` where the likelihood crosses the floor along
/// `u + t·v`; returns the last inside point.
fn find_edge(
    engine: &mut Engine,
    walker: &Walker,
    u: &[f64],
    v: &[f64],
    low_l: f64,
    ctx: &EngineContext<'_>,
) -> Option<(f64, Vec<f64>)> {
    let mut lo = (0.0, walker.log_l - low_l);
    let outside = advance(u, v, 1.0).0;
    let mut hi = (1.0, score(engine, walker, &outside, ctx) - low_l);
    let mut third: Option<(f64, f64)> = None;
    for _ in 0..EDGE_STEPS {
        let t = quadratic_root(lo, hi, third)
            .or_else(|| secant(lo, hi))
            .unwrap_or(0.5 * (lo.0 + hi.0));
        let probe = advance(u, v, t).0;
        let f = score(engine, walker, &probe, ctx) - low_l;
        if f >= 0.0 {
            third = Some(lo);
            lo = (t, f);
        } else {
            third = Some(hi);
            hi = (t, f);
        }
        if f.abs() < EDGE_TOLERANCE {
            break;
        }
    }
    if lo.0 <= 0.0 {
        return None;
    }
    Some((lo.0, advance(u, v, lo.0).0))
}

fn secant(lo: (f64, f64), hi: (f64, f64)) -> Option<f64> {
    if !(lo.1.is_finite() && hi.1.is_finite()) || lo.1 == hi.1 {
        return None;
    }
    let t = lo.0 - lo.1 * (hi.0 - lo.0) / (hi.1 - lo.1);
    inside_bracket(t, lo.0, hi.0)
}

/// Root of the parabola through three samples, if it falls in the bracket.
fn quadratic_root(lo: (f64, f64), hi: (f64, f64), third: Option<(f64, f64)>) -> Option<f64> {
    let (t0, f0) = lo;
    let (t1, f1) = hi;
    let (t2, f2) = third?;
    if ![f0, f1, f2].iter().all(|f| f.is_finite()) || t0 == t1 || t1 == t2 || t0 == t2 {
        return None;
    }
    let d01 = (f1 - f0) / (t1 - t0);
    let d12 = (f2 - f1) / (t2 - t1);
    let a = (d12 - d01) / (t2 - t0);
    let b = d01 - a * (t0 + t1);
    let c = f0 - d01 * t0 + a * t0 * t1;
    if a.abs() < 1.0e-14 {
        return if b == 0.0 { None } else { inside_bracket(-c / b, t0, t1) };
    }
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    let sq = disc.sqrt();
    [(-b + sq) / (2.0 * a), (-b - sq) / (2.0 * a)]
        .into_iter()
        .find_map(|t| inside_bracket(t, t0, t1))
}

fn inside_bracket(t: f64, a: f64, b: f64) -> Option<f64> {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    (t > lo && t < hi).then_some(t)
}

/// Likelihood gradient with respect to the unit coordinates.
fn unit_gradient(
    engine: &mut Engine,
    walker: &Walker,
    edge: &[f64],
    ctx: &EngineContext<'_>,
) -> Option<Vec<f64>> {
    let (params, hypars) = place(walker, ctx.distribution, edge)?;
    engine.counters.ncalls += 1;
    let domain = ctx
        .distribution
        .partial_log_l(&walker.problem, &params, &hypars, &walker.fit_index);
    let mut gradient = Vec::with_capacity(edge.len());
    for (slot, g) in domain.iter().enumerate() {
        let lo = (edge[slot] - UNIT_STEP).max(0.0);
        let hi = (edge[slot] + UNIT_STEP).min(1.0);
        let mut a = edge.to_vec();
        let mut b = edge.to_vec();
        a[slot] = lo;
        b[slot] = hi;
        let (pa, ha) = place(walker, ctx.distribution, &a)?;
        let (pb, hb) = place(walker, ctx.distribution, &b)?;
        let index = walker.fit_index[slot];
        let dtheta = (index.get(&pb, &hb) - index.get(&pa, &ha)) / (hi - lo);
        gradient.push(g * dtheta);
    }
    let norm: f64 = gradient.iter().map(|g| g * g).sum();
    (norm > 0.0 && norm.is_finite()).then_some(gradient)
}
