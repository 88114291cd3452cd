//! Engines move a walker under the hard constraint `logL >= L*`.
//!
//! Every engine works on trial copies of the walker's parameters and only
//! writes back into the walker when a trial is accepted. Accepted trials are
//! also kept in the engine's trial buffer; the explorer merges them into the
//! phantom collection once the pass has finished.

use nest_core::{NestError, NestResult, RngHandle};
use nest_model::{ErrorDistribution, ParIndex, Problem};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::phantoms::PhantomCollection;
use crate::walker::Walker;

/// Least-squares boost of the best walker.
pub mod boost;
pub mod chord;
/// Crossover with another walker.
pub mod cross;
pub mod dynamic;
pub mod galilean;
/// Coordinate-wise moves.
pub mod gibbs;
pub mod order;
/// Uniform draws in the bounding box.
pub mod random;
/// Initial walkers from the prior.
pub mod start;
/// Random walk.
pub mod step;
/// Structural variation of modifiable models.
pub mod structure;

/// Fraction of the phantom extent added on both sides of the bounding box.
const UNIT_MARGIN: f64 = 0.5;

/// The engines a sampler can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    /// Reflective ballistic moves in unit space.
    Galilean,
    /// Slice sampling along random chords.
    Chord,
    /// One coordinate at a time.
    Gibbs,
    /// Global random walk.
    Step,
    /// Convex combination with another walker.
    Cross,
    /// Independent draws inside the bounding box.
    Random,
    /// Adds a component to a dynamic model.
    Birth,
    /// Removes a component from a dynamic model.
    Death,
    /// Varies the internal structure of a modifiable model.
    Structure,
    /// Moves a block of a permutation.
    Move,
    /// Reverses a block of a permutation.
    Reverse,
    /// Swaps two positions of a permutation.
    Switch,
    /// Shuffles a block of a permutation.
    Shuffle,
    /// Uncrosses two legs of a tour.
    Loop,
    /// Moves the nearest neighbour next to a city.
    Near,
}

impl EngineKind {
    /// Parses an engine name (case-insensitive).
    pub fn from_name(name: &str) -> NestResult<Self> {
        let kind = match name.to_ascii_lowercase().as_str() {
            "galilean" => EngineKind::Galilean,
            "chord" => EngineKind::Chord,
            "gibbs" => EngineKind::Gibbs,
            "step" => EngineKind::Step,
            "cross" => EngineKind::Cross,
            "random" => EngineKind::Random,
            "birth" => EngineKind::Birth,
            "death" => EngineKind::Death,
            "structure" => EngineKind::Structure,
            "move" => EngineKind::Move,
            "reverse" => EngineKind::Reverse,
            "switch" => EngineKind::Switch,
            "shuffle" => EngineKind::Shuffle,
            "loop" => EngineKind::Loop,
            "near" => EngineKind::Near,
            _ => {
                return Err(NestError::Config(
                    nest_core::ErrorInfo::new("engine-name", "unknown engine")
                        .with_context("name", name),
                ))
            }
        };
        Ok(kind)
    }

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Galilean => "galilean",
            EngineKind::Chord => "chord",
            EngineKind::Gibbs => "gibbs",
            EngineKind::Step => "step",
            EngineKind::Cross => "cross",
            EngineKind::Random => "random",
            EngineKind::Birth => "birth",
            EngineKind::Death => "death",
            EngineKind::Structure => "structure",
            EngineKind::Move => "move",
            EngineKind::Reverse => "reverse",
            EngineKind::Switch => "switch",
            EngineKind::Shuffle => "shuffle",
            EngineKind::Loop => "loop",
            EngineKind::Near => "near",
        }
    }

    /// True for engines that permute integer parameters.
    pub fn is_order(&self) -> bool {
        matches!(
            self,
            EngineKind::Move
                | EngineKind::Reverse
                | EngineKind::Switch
                | EngineKind::Shuffle
                | EngineKind::Loop
                | EngineKind::Near
        )
    }
}

/// Tallies kept by every engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCounters {
    /// Accepted trials.
    pub success: u64,
    /// Rejected trials.
    pub reject: u64,
    /// Calls that produced no move at all.
    pub failed: u64,
    /// Accepted trials that beat the best phantom.
    pub best: u64,
    /// Likelihood evaluations.
    pub ncalls: u64,
}

impl EngineCounters {
    /// Adds another tally into this one.
    pub fn add(&mut self, other: &EngineCounters) {
        self.success += other.success;
        self.reject += other.reject;
        self.failed += other.failed;
        self.best += other.best;
        self.ncalls += other.ncalls;
    }
}

/// Read-only state shared by all engines during one exploration pass.
#[derive(Debug, Clone, Copy)]
pub struct EngineContext<'a> {
    /// Error distribution scoring the trials.
    pub distribution: &'a ErrorDistribution,
    /// Accepted positions from earlier passes.
    pub phantoms: &'a PhantomCollection,
    /// The live ensemble as it was before the pass.
    pub walkers: &'a [Walker],
    /// Engine tuning.
    pub config: &'a EngineConfig,
    /// Accepted steps per call.
    pub nstep: usize,
    /// Best phantom log likelihood before the pass.
    pub best_log_l: f64,
}

/// Unit-space bounding box for a walker's fit index.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitRange {
    /// Lower corner.
    pub umin: Vec<f64>,
    /// Extent along each axis.
    pub uran: Vec<f64>,
}

/// One engine with its counters, random stream and accepted-trial buffer.
#[derive(Debug, Clone)]
pub struct Engine {
    kind: EngineKind,
    counters: EngineCounters,
    rng: RngHandle,
    trials: Vec<Walker>,
}

impl Engine {
    /// Creates an engine seeded with `seed`.
    pub fn new(kind: EngineKind, seed: u64) -> Self {
        Self {
            kind,
            counters: EngineCounters::default(),
            rng: RngHandle::from_seed(seed),
            trials: Vec::new(),
        }
    }

    /// Which engine this is.
    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    /// Accumulated counters.
    pub fn counters(&self) -> &EngineCounters {
        &self.counters
    }

    /// Folds the counters of a copy back into this engine.
    pub fn absorb(&mut self, copy: &Engine) {
        self.counters.add(&copy.counters);
    }

    pub(crate) fn set_counters(&mut self, counters: EngineCounters) {
        self.counters = counters;
    }

    /// Removes and returns the accepted trials collected so far.
    pub fn take_trials(&mut self) -> Vec<Walker> {
        std::mem::take(&mut self.trials)
    }

    /// Moves `walker` under the constraint `logL >= low_l`.
    ///
    /// Returns the number of accepted moves. Zero moves is not an error; it
    /// is counted as a failed call.
    pub fn execute(
        &mut self,
        walker: &mut Walker,
        low_l: f64,
        ctx: &EngineContext<'_>,
    ) -> NestResult<usize> {
        let moves = match self.kind {
            EngineKind::Galilean => galilean::execute(self, walker, low_l, ctx),
            EngineKind::Chord => chord::execute(self, walker, low_l, ctx),
            EngineKind::Gibbs => gibbs::execute(self, walker, low_l, ctx),
            EngineKind::Step => step::execute(self, walker, low_l, ctx),
            EngineKind::Cross => cross::execute(self, walker, low_l, ctx),
            EngineKind::Random => random::execute(self, walker, low_l, ctx),
            EngineKind::Birth => dynamic::birth(self, walker, low_l, ctx),
            EngineKind::Death => dynamic::death(self, walker, low_l, ctx),
            EngineKind::Structure => structure::execute(self, walker, low_l, ctx),
            EngineKind::Move => order::move_block(self, walker, low_l, ctx),
            EngineKind::Reverse => order::reverse(self, walker, low_l, ctx),
            EngineKind::Switch => order::switch(self, walker, low_l, ctx),
            EngineKind::Shuffle => order::shuffle(self, walker, low_l, ctx),
            EngineKind::Loop => order::uncross(self, walker, low_l, ctx),
            EngineKind::Near => order::near(self, walker, low_l, ctx),
        }?;
        if moves == 0 {
            self.counters.failed += 1;
        }
        Ok(moves)
    }

    pub(crate) fn rng(&mut self) -> &mut RngHandle {
        &mut self.rng
    }

    /// Scores a trial position, counting the call.
    pub(crate) fn evaluate(
        &mut self,
        ctx: &EngineContext<'_>,
        problem: &Problem,
        params: &[f64],
        hypars: &[f64],
    ) -> f64 {
        self.counters.ncalls += 1;
        ctx.distribution.log_likelihood(problem, params, hypars)
    }

    /// Scores the unit-space position `units` of the walker's fit index.
    ///
    /// Returns `None` (and counts a reject) when the position leaves a prior
    /// or falls below the floor.
    pub(crate) fn try_units(
        &mut self,
        walker: &Walker,
        units: &[f64],
        low_l: f64,
        ctx: &EngineContext<'_>,
    ) -> Option<Trial> {
        let (params, hypars) = place(walker, ctx.distribution, units)?;
        self.try_position(walker, &walker.problem, params, hypars, low_l, ctx)
    }

    /// Scores a domain-space position.
    pub(crate) fn try_position(
        &mut self,
        walker: &Walker,
        problem: &Problem,
        params: Vec<f64>,
        hypars: Vec<f64>,
        low_l: f64,
        ctx: &EngineContext<'_>,
    ) -> Option<Trial> {
        if out_of_limits(problem, ctx.distribution, &walker.fit_index, &params, &hypars) {
            self.counters.reject += 1;
            return None;
        }
        let log_l = self.evaluate(ctx, problem, &params, &hypars);
        if log_l.is_finite() && log_l >= low_l {
            Some(Trial {
                params,
                hypars,
                log_l,
            })
        } else {
            self.counters.reject += 1;
            None
        }
    }

    /// Writes an accepted trial into the walker.
    pub(crate) fn commit(&mut self, walker: &mut Walker, trial: Trial, ctx: &EngineContext<'_>) {
        walker.params = trial.params;
        walker.hypars = trial.hypars;
        walker.log_l = trial.log_l;
        self.counters.success += 1;
        if trial.log_l > ctx.best_log_l {
            self.counters.best += 1;
        }
        self.trials.push(walker.clone());
    }

    /// Counts a rejected trial that was screened out before evaluation.
    pub(crate) fn reject(&mut self) {
        self.counters.reject += 1;
    }
}

/// An evaluated position above the floor.
#[derive(Debug, Clone)]
pub(crate) struct Trial {
    pub params: Vec<f64>,
    pub hypars: Vec<f64>,
    pub log_l: f64,
}

/// Unit-space coordinates of the walker's fit index.
pub fn units(walker: &Walker, distribution: &ErrorDistribution) -> Vec<f64> {
    walker
        .fit_index
        .iter()
        .map(|index| to_unit(&walker.problem, distribution, *index, index.get(&walker.params, &walker.hypars)))
        .collect()
}

fn to_unit(problem: &Problem, distribution: &ErrorDistribution, index: ParIndex, value: f64) -> f64 {
    match index {
        ParIndex::Param(k) => problem.domain_to_unit(value, k),
        ParIndex::Hyper(j) => distribution
            .hyper_prior(j)
            .map_or(value, |p| p.domain_to_unit(value)),
    }
}

fn to_domain(problem: &Problem, distribution: &ErrorDistribution, index: ParIndex, unit: f64) -> f64 {
    match index {
        ParIndex::Param(k) => problem.unit_to_domain(unit, k),
        ParIndex::Hyper(j) => distribution
            .hyper_prior(j)
            .map_or(unit, |p| p.unit_to_domain(unit)),
    }
}

/// Domain parameters for unit coordinates of the walker's fit index.
pub(crate) fn place(
    walker: &Walker,
    distribution: &ErrorDistribution,
    units: &[f64],
) -> Option<(Vec<f64>, Vec<f64>)> {
    if units.iter().any(|u| !(0.0..=1.0).contains(u)) {
        return None;
    }
    let mut params = walker.params.clone();
    let mut hypars = walker.hypars.clone();
    for (index, u) in walker.fit_index.iter().zip(units) {
        let value = to_domain(&walker.problem, distribution, *index, *u);
        index.set(&mut params, &mut hypars, value);
    }
    Some((params, hypars))
}

pub(crate) fn out_of_limits(
    problem: &Problem,
    distribution: &ErrorDistribution,
    fit_index: &[ParIndex],
    params: &[f64],
    hypars: &[f64],
) -> bool {
    fit_index.iter().any(|index| {
        let value = index.get(params, hypars);
        match *index {
            ParIndex::Param(k) => problem.is_out_of_limits(value, k),
            ParIndex::Hyper(j) => distribution
                .hyper_prior(j)
                .map_or(!value.is_finite(), |p| p.is_out_of_limits(value)),
        }
    })
}

/// Bounding box in unit space of the phantoms above `low_l`.
///
/// The box always contains the walker itself, is widened by a margin on
/// both sides and is clipped to `[0, 1]`. Axes without extent fall back to
/// the full unit interval.
pub fn unit_range(walker: &Walker, low_l: f64, ctx: &EngineContext<'_>) -> UnitRange {
    let here = units(walker, ctx.distribution);
    let bounds = ctx.phantoms.bounds(walker.params.len(), low_l);
    let mut umin = Vec::with_capacity(here.len());
    let mut uran = Vec::with_capacity(here.len());
    for (slot, index) in walker.fit_index.iter().enumerate() {
        let (mut lo, mut hi) = (here[slot], here[slot]);
        if let Some(b) = &bounds {
            let (dmin, dmax) = match *index {
                ParIndex::Param(k) => (b.param_min[k], b.param_max[k]),
                ParIndex::Hyper(j) => (b.hyper_min[j], b.hyper_max[j]),
            };
            let a = to_unit(&walker.problem, ctx.distribution, *index, dmin);
            let z = to_unit(&walker.problem, ctx.distribution, *index, dmax);
            lo = lo.min(a.min(z));
            hi = hi.max(a.max(z));
        }
        let extent = hi - lo;
        if extent.is_nan() || extent <= 1.0e-12 || bounds.is_none() {
            umin.push(0.0);
            uran.push(1.0);
            continue;
        }
        let lo = (lo - UNIT_MARGIN * extent).max(0.0);
        let hi = (hi + UNIT_MARGIN * extent).min(1.0);
        umin.push(lo);
        uran.push(hi - lo);
    }
    UnitRange { umin, uran }
}

/// Reflects a coordinate back into `[0, 1]`.
pub(crate) fn mirror(u: f64) -> (f64, bool) {
    if u < 0.0 {
        ((-u).min(1.0), true)
    } else if u > 1.0 {
        ((2.0 - u).max(0.0), true)
    } else {
        (u, false)
    }
}

/// Rebuilds a fit index for a walker whose parameter count changed.
pub(crate) fn refit_index(problem: &Problem, previous: &[ParIndex]) -> Vec<ParIndex> {
    (0..problem.npars())
        .map(ParIndex::Param)
        .chain(previous.iter().copied().filter(|i| matches!(i, ParIndex::Hyper(_))))
        .collect()
}
