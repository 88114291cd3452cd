//! Engines for order problems.
//!
//! The parameters of an order walker are a permutation of the point indices,
//! stored as floats. Every engine proposes a rearrangement and keeps it when
//! the tour still satisfies the likelihood floor.

use nest_core::{NestResult, RngHandle};
use nest_model::Problem;

use super::{Engine, EngineContext};
use crate::walker::Walker;

/// Longest block the shuffle engine rearranges.
const SHUFFLE_MAX: usize = 6;
/// Shortest block the shuffle engine rearranges.
const SHUFFLE_MIN: usize = 3;

/// Runs `propose` until `nstep` moves are accepted or `max_trials`
/// proposals fail.
fn run<F>(
    engine: &mut Engine,
    walker: &mut Walker,
    low_l: f64,
    ctx: &EngineContext<'_>,
    mut propose: F,
) -> NestResult<usize>
where
    F: FnMut(&mut RngHandle, &mut Vec<f64>, &Problem) -> bool,
{
    if walker.params.len() < 2 {
        return Ok(0);
    }
    let mut moves = 0;
    let mut failures = 0;
    while moves < ctx.nstep && failures < ctx.config.max_trials {
        let mut perm = walker.params.clone();
        if !propose(engine.rng(), &mut perm, &walker.problem) {
            engine.reject();
            failures += 1;
            continue;
        }
        let hypars = walker.hypars.clone();
        match engine.try_position(walker, &walker.problem, perm, hypars, low_l, ctx) {
            Some(trial) => {
                engine.commit(walker, trial, ctx);
                moves += 1;
            }
            None => failures += 1,
        }
    }
    Ok(moves)
}

/// Cuts out a block and reinserts it elsewhere.
pub(crate) fn move_block(
    engine: &mut Engine,
    walker: &mut Walker,
    low_l: f64,
    ctx: &EngineContext<'_>,
) -> NestResult<usize> {
    run(engine, walker, low_l, ctx, |rng, perm, _| {
        let n = perm.len();
        let len = 1 + rng.below((n / 2).max(1));
        let from = rng.below(n - len + 1);
        let block: Vec<f64> = perm.drain(from..from + len).collect();
        let to = rng.below(perm.len() + 1);
        if to == from {
            return false;
        }
        perm.splice(to..to, block);
        true
    })
}

/// Reverses a block whose length is two plus a geometric draw.
pub(crate) fn reverse(
    engine: &mut Engine,
    walker: &mut Walker,
    low_l: f64,
    ctx: &EngineContext<'_>,
) -> NestResult<usize> {
    run(engine, walker, low_l, ctx, |rng, perm, _| {
        let n = perm.len();
        let mut len = 2;
        while len < n && rng.uniform() < 0.5 {
            len += 1;
        }
        let from = rng.below(n - len + 1);
        perm[from..from + len].reverse();
        true
    })
}

/// Swaps two positions.
pub(crate) fn switch(
    engine: &mut Engine,
    walker: &mut Walker,
    low_l: f64,
    ctx: &EngineContext<'_>,
) -> NestResult<usize> {
    run(engine, walker, low_l, ctx, |rng, perm, _| {
        let n = perm.len();
        let i = rng.below(n);
        let j = (i + 1 + rng.below(n - 1)) % n;
        perm.swap(i, j);
        true
    })
}

/// Shuffles a short block.
pub(crate) fn shuffle(
    engine: &mut Engine,
    walker: &mut Walker,
    low_l: f64,
    ctx: &EngineContext<'_>,
) -> NestResult<usize> {
    run(engine, walker, low_l, ctx, |rng, perm, _| {
        let n = perm.len();
        let len = (SHUFFLE_MIN + rng.below(SHUFFLE_MAX - SHUFFLE_MIN + 1)).min(n);
        let from = rng.below(n - len + 1);
        let before = perm[from..from + len].to_vec();
        rng.shuffle(&mut perm[from..from + len]);
        perm[from..from + len] != before[..]
    })
}

/// Finds two crossing legs of the tour and uncrosses them.
pub(crate) fn uncross(
    engine: &mut Engine,
    walker: &mut Walker,
    low_l: f64,
    ctx: &EngineContext<'_>,
) -> NestResult<usize> {
    run(engine, walker, low_l, ctx, |rng, perm, problem| {
        let n = perm.len();
        if n < 4 {
            return false;
        }
        let offset = rng.below(n);
        match find_crossing(perm, problem, offset) {
            Some((a, b)) => {
                perm[a + 1..=b].reverse();
                true
            }
            None => false,
        }
    })
}

/// First pair of crossing legs `(a, a+1)` and `(b, b+1)`, scanning from
/// `offset`.
fn find_crossing(perm: &[f64], problem: &Problem, offset: usize) -> Option<(usize, usize)> {
    let n = perm.len();
    let point = |slot: usize| problem.point(perm[slot % n] as usize);
    for shift in 0..n {
        let a = (offset + shift) % n;
        for b in a + 2..n {
            if a == 0 && b == n - 1 {
                continue;
            }
            if segments_cross(point(a), point(a + 1), point(b), point(b + 1)) {
                return Some((a, b));
            }
        }
    }
    None
}

/// Moves the point nearest to a random city right behind it.
pub(crate) fn near(
    engine: &mut Engine,
    walker: &mut Walker,
    low_l: f64,
    ctx: &EngineContext<'_>,
) -> NestResult<usize> {
    run(engine, walker, low_l, ctx, |rng, perm, problem| {
        let n = perm.len();
        if n < 3 {
            return false;
        }
        let i = rng.below(n);
        let city = perm[i] as usize;
        let Some(j) = (0..n)
            .filter(|&j| j != i)
            .min_by(|&p, &q| {
                let dp = problem.distance(city, perm[p] as usize);
                let dq = problem.distance(city, perm[q] as usize);
                dp.total_cmp(&dq)
            })
        else {
            return false;
        };
        if j == (i + 1) % n || i == (j + 1) % n {
            return false;
        }
        let nearest = perm.remove(j);
        let at = if j < i { i } else { i + 1 };
        perm.insert(at, nearest);
        true
    })
}

fn orientation(p: [f64; 2], q: [f64; 2], r: [f64; 2]) -> f64 {
    (q[0] - p[0]) * (r[1] - p[1]) - (q[1] - p[1]) * (r[0] - p[0])
}

/// True if the open segments `p1 p2` and `q1 q2` properly intersect.
fn segments_cross(p1: [f64; 2], p2: [f64; 2], q1: [f64; 2], q2: [f64; 2]) -> bool {
    let d1 = orientation(q1, q2, p1);
    let d2 = orientation(q1, q2, p2);
    let d3 = orientation(p1, p2, q1);
    let d4 = orientation(p1, p2, q2);
    d1 * d2 < 0.0 && d3 * d4 < 0.0
}

#[cfg(test)]
mod tests {
    use super::segments_cross;

    #[test]
    fn diagonals_of_a_square_cross() {
        assert!(segments_cross([0.0, 0.0], [1.0, 1.0], [0.0, 1.0], [1.0, 0.0]));
        assert!(!segments_cross([0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]));
    }
}
