use std::sync::Arc;

use nest_core::errors::ErrorInfo;
use nest_core::{NestError, NestResult, RngHandle};
use nest_model::{ErrorDistribution, Fitter};
use rayon::prelude::*;
use tracing::debug;

use crate::config::{EngineConfig, SamplerConfig};
use crate::determinism::engine_seed;
use crate::engines::boost::BestBoost;
use crate::engines::{Engine, EngineContext, EngineCounters, EngineKind};
use crate::phantoms::PhantomCollection;
use crate::walker::{Walker, WalkerList};

/// Relative tolerance of the recomputed log likelihood.
const CONSISTENCY_TOLERANCE: f64 = 1.0e-6;

/// Moves freshly cloned walkers with the configured engines.
///
/// Each slot gets its own engine copies seeded from `(iteration, slot)`, so
/// the outcome does not depend on the order in which slots are processed or
/// on whether they run on the thread pool. Accepted trials are merged into
/// the phantom collection only after every slot has finished.
#[derive(Debug)]
pub struct Explorer {
    engines: Vec<Engine>,
    boost: Option<BestBoost>,
    config: EngineConfig,
    nstep: usize,
    master_seed: u64,
    consistency_check: bool,
    pool: Option<rayon::ThreadPool>,
    verbose: u8,
}

struct Job {
    slot: usize,
    walker: Walker,
    boost: Option<BestBoost>,
    seed: u64,
}

struct Outcome {
    slot: usize,
    walker: Walker,
    engines: Vec<Engine>,
    boost: Option<BestBoost>,
    boosted: Option<Walker>,
    moves: usize,
}

impl Explorer {
    /// Builds the explorer; best boost is active only when a fitter is given
    /// and the configuration asks for it.
    pub fn new(
        kinds: &[EngineKind],
        config: &SamplerConfig,
        fitter: Option<Arc<dyn Fitter>>,
    ) -> NestResult<Self> {
        let pool = if config.threads {
            let pool = rayon::ThreadPoolBuilder::new().build().map_err(|err| {
                NestError::Config(ErrorInfo::new("thread-pool", err.to_string()))
            })?;
            Some(pool)
        } else {
            None
        };
        let boost = fitter
            .filter(|_| config.best_boost)
            .map(BestBoost::new);
        Ok(Self {
            engines: kinds.iter().map(|kind| Engine::new(*kind, 0)).collect(),
            boost,
            config: config.engine.clone(),
            nstep: config.engine.steps(config.rate),
            master_seed: config.seed_policy.master_seed,
            consistency_check: config.consistency_check,
            pool,
            verbose: config.verbose,
        })
    }

    /// Engines with their accumulated counters.
    pub fn engines(&self) -> &[Engine] {
        &self.engines
    }

    /// Best boost with its counters, when active.
    pub fn boost(&self) -> Option<&BestBoost> {
        self.boost.as_ref()
    }

    /// Replaces the best-boost fitter; boosting stays off unless enabled.
    pub fn set_fitter(&mut self, fitter: Arc<dyn Fitter>, enabled: bool) {
        self.boost = enabled.then(|| BestBoost::new(fitter));
    }

    /// Reinstates engine counters saved in a checkpoint.
    pub(crate) fn restore_counters(&mut self, counters: &[EngineCounters]) {
        for (engine, saved) in self.engines.iter_mut().zip(counters) {
            engine.set_counters(*saved);
        }
    }

    /// Explores the walkers at `slots` under `logL >= low_l`.
    ///
    /// `seed_index` selects the random substreams; returns the number of
    /// accepted moves over all slots.
    pub fn explore(
        &mut self,
        walkers: &mut WalkerList,
        slots: &[usize],
        low_l: f64,
        seed_index: usize,
        distribution: &ErrorDistribution,
        phantoms: &mut PhantomCollection,
    ) -> NestResult<usize> {
        let jobs: Vec<Job> = slots
            .iter()
            .filter_map(|&slot| walkers.get(slot).map(|walker| (slot, walker)))
            .map(|(slot, walker)| Job {
                slot,
                walker: walker.clone(),
                boost: self.boost.as_ref().map(BestBoost::fork),
                seed: engine_seed(self.master_seed, seed_index, slot),
            })
            .collect();
        let kinds: Vec<EngineKind> = self.engines.iter().map(Engine::kind).collect();
        let ctx = EngineContext {
            distribution,
            phantoms: &*phantoms,
            walkers: walkers.as_slice(),
            config: &self.config,
            nstep: self.nstep,
            best_log_l: phantoms.best_log_l(),
        };
        let check = self.consistency_check;
        let outcomes: Vec<Outcome> = match &self.pool {
            Some(pool) => {
                let results: Vec<NestResult<Outcome>> = pool.install(|| {
                    jobs.into_par_iter()
                        .map(|job| run_job(job, &kinds, low_l, &ctx, check))
                        .collect()
                });
                let mut outcomes = Vec::with_capacity(results.len());
                let mut errors = Vec::new();
                for result in results {
                    match result {
                        Ok(outcome) => outcomes.push(outcome),
                        Err(err) => errors.push(err),
                    }
                }
                if let Some(err) = NestError::from_workers(errors) {
                    return Err(err);
                }
                outcomes
            }
            None => jobs
                .into_iter()
                .map(|job| run_job(job, &kinds, low_l, &ctx, check))
                .collect::<NestResult<Vec<_>>>()?,
        };

        let mut total = 0;
        for mut outcome in outcomes {
            if self.verbose >= 4 {
                debug!(
                    slot = outcome.slot,
                    walker = outcome.walker.id,
                    moves = outcome.moves,
                    log_l = outcome.walker.log_l,
                    "explored"
                );
            }
            total += outcome.moves;
            for (engine, copy) in self.engines.iter_mut().zip(outcome.engines.iter_mut()) {
                engine.absorb(copy);
                phantoms.extend(copy.take_trials());
            }
            if let (Some(boost), Some(copy)) = (self.boost.as_mut(), outcome.boost.as_ref()) {
                boost.absorb(copy);
            }
            if let Some(boosted) = outcome.boosted {
                phantoms.store(boosted);
            }
            walkers.replace(outcome.slot, outcome.walker);
        }
        Ok(total)
    }
}

fn run_job(
    job: Job,
    kinds: &[EngineKind],
    low_l: f64,
    ctx: &EngineContext<'_>,
    consistency_check: bool,
) -> NestResult<Outcome> {
    let Job {
        slot,
        mut walker,
        mut boost,
        seed,
    } = job;
    let mut rng = RngHandle::from_seed(seed);
    let mut engines: Vec<Engine> = kinds
        .iter()
        .map(|kind| Engine::new(*kind, rng.fork_seed()))
        .collect();
    let mut moves = 0;
    for index in rng.permutation(engines.len()) {
        moves += engines[index].execute(&mut walker, low_l, ctx)?;
    }
    if consistency_check && moves == 0 && walker.log_l.is_finite() {
        let recomputed = ctx
            .distribution
            .log_likelihood(&walker.problem, &walker.params, &walker.hypars);
        let tolerance = CONSISTENCY_TOLERANCE * recomputed.abs().max(1.0);
        if recomputed.is_nan() || (recomputed - walker.log_l).abs() > tolerance {
            return Err(NestError::ConsistencyMismatch(
                ErrorInfo::new("logl-mismatch", "stored log likelihood disagrees with a recomputation")
                    .with_context("walker", walker.id)
                    .with_context("stored", walker.log_l)
                    .with_context("recomputed", recomputed),
            ));
        }
    }
    let mut boosted = None;
    if let Some(b) = boost.as_mut() {
        if b.boost(&mut walker, ctx) {
            boosted = Some(walker.clone());
        }
    }
    walker.check(ctx.distribution)?;
    Ok(Outcome {
        slot,
        walker,
        engines,
        boost,
        boosted,
        moves,
    })
}
