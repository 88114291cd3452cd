use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use nest_core::errors::ErrorInfo;
use nest_core::{log_add_exp, NestError, NestResult, RngHandle, RunProvenance, SchemaVersion, LOG_ZERO};
use nest_model::{ErrorDistribution, Fitter, Model, ParType, Problem, ProblemKind, XyAccuracy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::checkpoint::{checkpoint_path, Checkpoint, SampleState, WalkerState};
use crate::config::{SamplerConfig, SamplerVariant};
use crate::determinism::{explorer_seed, walker_seed};
use crate::engines::start::StartEngine;
use crate::engines::EngineKind;
use crate::explorer::Explorer;
use crate::phantoms::PhantomCollection;
use crate::report::{EngineReport, RunSummary};
use crate::samples::{Sample, SampleList};
use crate::walker::{Walker, WalkerList};

/// Evidence accounting and loop position of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Completed iterations.
    pub iteration: usize,
    /// Natural log of the evidence so far.
    pub log_z: f64,
    /// Information H so far.
    pub info: f64,
    /// Log of the prior mass still enclosed by the live walkers.
    pub log_width: f64,
    /// Change of `log_z` in the last iteration.
    pub dlog_z: f64,
    /// Set when no further iteration may run.
    pub finished: bool,
    /// Set once the live walkers have been added to the samples.
    pub flushed: bool,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            iteration: 0,
            log_z: LOG_ZERO,
            info: 0.0,
            log_width: 0.0,
            dlog_z: f64::MAX,
            finished: false,
            flushed: false,
        }
    }
}

impl RunState {
    /// Adds a weight to the evidence and updates the information, where
    /// `log_l` is the likelihood level the weight was taken at.
    fn accumulate(&mut self, log_weight: f64, log_l: f64) {
        let old = self.log_z;
        let new = log_add_exp(old, log_weight);
        let info = (log_weight - new).exp() * log_l + (old - new).exp() * (self.info + old) - new;
        self.info = if info.is_nan() || info < 0.0 { 0.0 } else { info };
        self.log_z = new;
    }
}

/// How raw data arrays are turned into a problem and a distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct DataOptions {
    /// "classic", "errors" or "multiple".
    pub problem: String,
    /// Per-datum weights.
    pub weights: Option<Vec<f64>>,
    /// Per-datum accuracies.
    pub accuracy: Option<Vec<f64>>,
    /// Covariances for an errors-in-x-and-y problem.
    pub xy_accuracy: Option<XyAccuracy>,
    /// Distribution name; gauss2d for errors in x and y, gauss otherwise.
    pub distribution: Option<String>,
    /// Limits that make the scale a sampled hyperparameter.
    pub limits: Option<[f64; 2]>,
}

impl Default for DataOptions {
    fn default() -> Self {
        Self {
            problem: "classic".to_string(),
            weights: None,
            accuracy: None,
            xy_accuracy: None,
            distribution: None,
            limits: None,
        }
    }
}

/// Nested sampling over a problem with an error distribution.
///
/// Each iteration discards the worst `discard` walkers into the sample list,
/// shrinks the enclosed prior mass and refills the ensemble by exploring
/// clones of the survivors under the new likelihood floor.
#[derive(Debug)]
pub struct NestedSampler {
    problem: Problem,
    distribution: ErrorDistribution,
    config: SamplerConfig,
    keep: BTreeMap<usize, f64>,
    engine_kinds: Vec<EngineKind>,
    walkers: WalkerList,
    phantoms: PhantomCollection,
    samples: SampleList,
    explorer: Explorer,
    state: RunState,
    inserted: Vec<usize>,
    checkpoints: Vec<PathBuf>,
    initialized: bool,
}

impl NestedSampler {
    /// Validates the combination and prepares a sampler; no likelihood is
    /// evaluated until [`NestedSampler::sample`].
    pub fn new(problem: Problem, distribution: ErrorDistribution, config: SamplerConfig) -> NestResult<Self> {
        config.validate()?;
        distribution.accepts(&problem)?;
        let names: Vec<String> = if config.engines.is_empty() {
            problem.default_engines().into_iter().map(str::to_string).collect()
        } else {
            config.engines.clone()
        };
        let engine_kinds = names
            .iter()
            .map(|name| EngineKind::from_name(name))
            .collect::<NestResult<Vec<_>>>()?;
        for kind in &engine_kinds {
            check_engine(*kind, &problem)?;
        }
        let explorer = Explorer::new(&engine_kinds, &config, None)?;
        let samples = SampleList::new(&problem);
        let slots = config.ensemble - config.discard + 1;
        Ok(Self {
            problem,
            distribution,
            config,
            keep: BTreeMap::new(),
            engine_kinds,
            walkers: WalkerList::new(),
            phantoms: PhantomCollection::new(),
            samples,
            explorer,
            state: RunState::default(),
            inserted: vec![0; slots],
            checkpoints: Vec::new(),
            initialized: false,
        })
    }

    /// Builds the problem from data arrays and the distribution by name.
    pub fn from_data(
        model: Arc<dyn Model>,
        xdata: Vec<f64>,
        ydata: Vec<f64>,
        options: DataOptions,
        config: SamplerConfig,
    ) -> NestResult<Self> {
        let mut problem = match options.problem.as_str() {
            "classic" => Problem::classic(model, xdata, ydata)?,
            "multiple" => Problem::multiple(model, xdata, ydata)?,
            "errors" => {
                let accuracy = options.xy_accuracy.ok_or_else(|| {
                    NestError::config("xy-accuracy", "errors in x and y need x and y accuracies")
                })?;
                Problem::errors_in_xy(model, xdata, ydata, accuracy)?
            }
            other => {
                return Err(NestError::Config(
                    ErrorInfo::new("problem-name", "unknown problem kind").with_context("name", other),
                ))
            }
        };
        if let Some(weights) = options.weights {
            problem = problem.with_weights(weights)?;
        }
        if let Some(accuracy) = options.accuracy {
            problem = problem.with_accuracy(accuracy)?;
        }
        let fallback = if problem.kind() == ProblemKind::ErrorsInXandY {
            "gauss2d"
        } else {
            "gauss"
        };
        let name = options.distribution.as_deref().unwrap_or(fallback);
        let distribution = ErrorDistribution::from_name(name, options.limits)?;
        Self::new(problem, distribution, config)
    }

    /// Pins parameters at fixed values for the whole run.
    ///
    /// Indices below `npars` address model and nuisance parameters, higher
    /// indices address hyperparameter `index - npars`.
    pub fn with_keep(mut self, keep: BTreeMap<usize, f64>) -> NestResult<Self> {
        if keep.is_empty() {
            return Ok(self);
        }
        if self.problem.is_dynamic() {
            return Err(NestError::unsupported("keep-dynamic", "parameters of a dynamic model cannot be kept"));
        }
        if self.problem.kind() == ProblemKind::Order {
            return Err(NestError::unsupported("keep-order", "an order problem cannot keep parameters"));
        }
        let npars = self.problem.npars();
        let hyper: BTreeMap<usize, f64> = keep
            .iter()
            .filter(|&(&k, _)| k >= npars)
            .map(|(&k, &v)| (k - npars, v))
            .collect();
        self.distribution.keep_fixed(&hyper)?;
        self.keep = keep;
        Ok(self)
    }

    /// Installs the fitter used by best boost.
    pub fn with_fitter(mut self, fitter: Arc<dyn Fitter>) -> Self {
        self.explorer.set_fitter(fitter, self.config.best_boost);
        self
    }

    fn param_keep(&self) -> BTreeMap<usize, f64> {
        let npars = self.problem.npars();
        self.keep
            .iter()
            .filter(|&(&k, _)| k < npars)
            .map(|(&k, &v)| (k, v))
            .collect()
    }

    fn initialize(&mut self) -> NestResult<()> {
        let keep = self.param_keep();
        if self.problem.partype() == ParType::Float {
            if let Some(k) = (0..self.problem.npars())
                .find(|k| !keep.contains_key(k) && self.problem.prior(*k).is_none())
            {
                return Err(NestError::UnsupportedCombination(
                    ErrorInfo::new("missing-prior", "a sampled parameter has no prior")
                        .with_context("parameter", k)
                        .with_hint("give the model a prior for every free parameter or keep it"),
                ));
            }
        }
        let master = self.config.seed_policy.master_seed;
        let mut start = StartEngine::new(self.config.engine.max_trials);
        for _ in 0..self.config.ensemble {
            let id = self.walkers.next_id();
            let mut rng = RngHandle::from_seed(walker_seed(master, id));
            let walker = start.walker(id, &self.problem, &self.distribution, &keep, &mut rng)?;
            self.walkers.push(walker);
        }
        self.phantoms.extend(self.walkers.iter().cloned());
        if !self.problem.model().is_linear() && self.problem.partype() == ParType::Float {
            let slots: Vec<usize> = (0..self.walkers.len()).collect();
            self.explorer.explore(
                &mut self.walkers,
                &slots,
                f64::NEG_INFINITY,
                0,
                &self.distribution,
                &mut self.phantoms,
            )?;
        }
        self.initialized = true;
        if self.config.verbose >= 1 {
            info!(
                walkers = self.walkers.len(),
                engines = ?self.engine_kinds.iter().map(EngineKind::as_str).collect::<Vec<_>>(),
                distribution = self.distribution.name(),
                "nested sampler initialised"
            );
        }
        Ok(())
    }

    fn should_continue(&self) -> bool {
        let state = &self.state;
        let rule = &self.config.termination;
        if state.finished {
            return false;
        }
        let horizon = rule.end * self.config.ensemble as f64 * state.info / self.config.discard as f64;
        state.iteration < rule.min_iterations
            || (state.dlog_z >= rule.tolerance
                && state.iteration as f64 <= horizon
                && state.iteration < rule.max_iterations)
    }

    fn iterate(&mut self) -> NestResult<()> {
        let n = self.walkers.len();
        let k = self.config.discard.min(n);
        let before = self.state.log_z;
        self.walkers.sort_by_log_l();
        let low_l = self.walkers[k - 1].log_l;

        let drained = match self.config.variant {
            SamplerVariant::Classic => {
                self.phantoms.prune(low_l);
                Vec::new()
            }
            SamplerVariant::Phantom => self.drain_phantoms(low_l),
        };

        // The shell between the previous floor and L* holds the evicted
        // walkers plus any drained phantoms; they share its prior mass.
        let degenerate = k == n;
        let shell = (k + drained.len()) as f64;
        let fraction = if degenerate {
            -shell.ln()
        } else {
            let shrink = k as f64 / n as f64;
            (-(-shrink).exp_m1()).ln() - shell.ln()
        };
        for phantom in &drained {
            let log_weight = self.state.log_width + fraction + phantom.log_l + phantom.log_prior;
            self.state.accumulate(log_weight, phantom.log_l);
            self.samples.push(Sample::from_walker(phantom, log_weight));
        }
        for walker in &self.walkers.as_slice()[..k] {
            let log_weight = self.state.log_width + fraction + walker.log_l + walker.log_prior;
            self.state.accumulate(log_weight, low_l);
            self.samples.push(Sample::from_walker(walker, log_weight));
        }

        if degenerate {
            self.state.log_width = LOG_ZERO;
            self.state.finished = true;
        } else {
            self.state.log_width -= k as f64 / n as f64;
            let mut rng = RngHandle::from_seed(explorer_seed(
                self.config.seed_policy.master_seed,
                self.state.iteration,
            ));
            let next = self.state.iteration + 1;
            for slot in 0..k {
                let source = k + rng.below(n - k);
                let id = self.walkers.next_id();
                let child = self.walkers[source].offspring(id, next);
                self.walkers.replace(slot, child);
            }
            let slots: Vec<usize> = (0..k).collect();
            self.explorer.explore(
                &mut self.walkers,
                &slots,
                low_l,
                next,
                &self.distribution,
                &mut self.phantoms,
            )?;
            let survivors = &self.walkers.as_slice()[k..];
            for walker in &self.walkers.as_slice()[..k] {
                let rank = survivors.partition_point(|s| s.log_l < walker.log_l);
                self.inserted[rank] += 1;
            }
        }

        if let Some(max_size) = self.config.max_size {
            self.samples.weed(max_size);
        }
        self.state.dlog_z = if before <= LOG_ZERO || !before.is_finite() {
            f64::MAX
        } else {
            self.state.log_z - before
        };
        self.state.iteration += 1;

        if self.config.verbose >= 2 && self.state.iteration % self.config.rep_iter.max(1) == 0 {
            info!(
                iteration = self.state.iteration,
                log_z = self.state.log_z,
                info = self.state.info,
                low_l,
                phantoms = self.phantoms.len(),
                "nested sampling progress"
            );
        }
        self.maybe_checkpoint()
    }

    /// Removes the phantoms below the floor that are not live walkers.
    fn drain_phantoms(&mut self, low_l: f64) -> Vec<Walker> {
        let live: BTreeSet<u64> = self.walkers.iter().map(|w| w.log_l.to_bits()).collect();
        let drained: Vec<Walker> = self
            .phantoms
            .prune(low_l)
            .into_iter()
            .filter(|phantom| !live.contains(&phantom.log_l.to_bits()))
            .collect();
        if !drained.is_empty() && self.config.verbose >= 4 {
            debug!(count = drained.len(), low_l, "phantoms drained");
        }
        drained
    }

    fn maybe_checkpoint(&mut self) -> NestResult<()> {
        let interval = self.config.checkpoint.interval;
        let Some(root) = self.config.checkpoint.directory.clone() else {
            return Ok(());
        };
        if interval == 0 || self.state.iteration % interval != 0 {
            return Ok(());
        }
        let path = checkpoint_path(&root, self.state.iteration);
        self.checkpoint().store(&path)?;
        self.checkpoints.push(path);
        Ok(())
    }

    /// Runs until the termination rule holds and returns the 10-log of the
    /// evidence. A second call returns the same value without sampling.
    pub fn sample(&mut self) -> NestResult<f64> {
        if !self.initialized {
            self.initialize()?;
        }
        while self.should_continue() {
            self.iterate()?;
        }
        self.finish();
        Ok(self.samples.evidence())
    }

    /// Adds the live walkers to the samples and normalises the weights.
    fn finish(&mut self) {
        if self.state.flushed {
            return;
        }
        if self.state.log_width > LOG_ZERO {
            self.walkers.sort_by_log_l();
            let share = self.state.log_width - (self.walkers.len() as f64).ln();
            for walker in self.walkers.iter() {
                let log_weight = share + walker.log_l + walker.log_prior;
                self.state.accumulate(log_weight, walker.log_l);
                self.samples.push(Sample::from_walker(walker, log_weight));
            }
        }
        self.samples.set_evidence(self.state.log_z, self.state.info);
        self.samples.normalize();
        self.state.finished = true;
        self.state.flushed = true;
        if self.config.verbose >= 1 {
            info!(
                log_z = self.state.log_z,
                log10_z = self.samples.evidence(),
                info = self.state.info,
                iterations = self.state.iteration,
                parameters = ?self.samples.parameters(),
                "nested sampling finished"
            );
        }
    }

    /// Natural log of the evidence so far.
    pub fn log_z(&self) -> f64 {
        self.state.log_z
    }

    /// Information H so far.
    pub fn info(&self) -> f64 {
        self.state.info
    }

    /// Completed iterations.
    pub fn iteration(&self) -> usize {
        self.state.iteration
    }

    /// Histogram of the rank at which explored walkers entered the survivors.
    pub fn inserted(&self) -> &[usize] {
        &self.inserted
    }

    /// Loop state.
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Posterior samples; normalised once `sample` has returned.
    pub fn samples(&self) -> &SampleList {
        &self.samples
    }

    /// The live ensemble.
    pub fn walkers(&self) -> &WalkerList {
        &self.walkers
    }

    /// Accepted trial positions.
    pub fn phantoms(&self) -> &PhantomCollection {
        &self.phantoms
    }

    /// The problem being sampled.
    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    /// The error distribution, with kept hyperparameters pinned.
    pub fn distribution(&self) -> &ErrorDistribution {
        &self.distribution
    }

    /// The validated configuration.
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Engines in use.
    pub fn engine_kinds(&self) -> &[EngineKind] {
        &self.engine_kinds
    }

    /// Counters per engine, plus best boost when it is active.
    pub fn engine_reports(&self) -> Vec<EngineReport> {
        let mut reports: Vec<EngineReport> = self
            .explorer
            .engines()
            .iter()
            .map(|engine| EngineReport::new(engine.kind().as_str(), engine.counters()))
            .collect();
        if let Some(boost) = self.explorer.boost() {
            reports.push(EngineReport::new("boost", boost.counters()));
        }
        reports
    }

    fn provenance(&self) -> RunProvenance {
        RunProvenance::new(
            self.config.seed_policy.master_seed,
            self.engine_kinds.iter().map(|k| k.as_str().to_string()).collect(),
            self.distribution.name(),
        )
    }

    /// Summary of the run so far.
    pub fn run_summary(&self) -> RunSummary {
        let engines = self.engine_reports();
        let acceptance_rates = engines
            .iter()
            .map(|report| (report.name.clone(), report.acceptance()))
            .collect();
        RunSummary {
            log_z: self.state.log_z,
            log10_z: self.samples.evidence(),
            info: self.state.info,
            iterations: self.state.iteration,
            evaluations: self.distribution.ncalls(),
            samples: self.samples.len(),
            inserted: self.inserted.clone(),
            acceptance_rates,
            engines,
            sample_digest: self.samples.digest(),
            provenance: self.provenance(),
            checkpoints: self.checkpoints.clone(),
        }
    }

    /// Snapshot from which [`NestedSampler::restore`] continues the run.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            schema: SchemaVersion::default(),
            provenance: self.provenance(),
            config: self.config.clone(),
            keep: self.keep.clone(),
            state: self.state.clone(),
            next_id: self.walkers.peek_next_id(),
            walkers: self.walkers.iter().map(WalkerState::capture).collect(),
            phantoms: self.phantoms.iter().map(WalkerState::capture).collect(),
            samples: self.samples.iter().map(SampleState::capture).collect(),
            inserted: self.inserted.clone(),
            engines: self.explorer.engines().iter().map(|e| *e.counters()).collect(),
        }
    }

    /// Continues a checkpointed run on the same problem and distribution.
    ///
    /// Models whose structure changes during a run cannot be restored, since
    /// the checkpoint only records parameters.
    pub fn restore(problem: Problem, distribution: ErrorDistribution, checkpoint: Checkpoint) -> NestResult<Self> {
        if problem.is_dynamic() || problem.is_modifiable() {
            return Err(NestError::unsupported(
                "checkpoint-dynamic",
                "walkers of dynamic or modifiable models cannot be restored",
            ));
        }
        let mut sampler = Self::new(problem, distribution, checkpoint.config)?.with_keep(checkpoint.keep)?;
        let walkers: Vec<Walker> = checkpoint
            .walkers
            .iter()
            .map(|state| state.restore(&sampler.problem))
            .collect();
        for walker in &walkers {
            walker.check(&sampler.distribution)?;
        }
        sampler.walkers = WalkerList::from_walkers(walkers, checkpoint.next_id);
        sampler
            .phantoms
            .extend(checkpoint.phantoms.iter().map(|state| state.restore(&sampler.problem)));
        for state in &checkpoint.samples {
            sampler.samples.push(state.restore(&sampler.problem));
        }
        if checkpoint.inserted.len() == sampler.inserted.len() {
            sampler.inserted = checkpoint.inserted;
        }
        sampler.explorer.restore_counters(&checkpoint.engines);
        sampler.state = checkpoint.state;
        sampler.initialized = true;
        Ok(sampler)
    }
}

fn check_engine(kind: EngineKind, problem: &Problem) -> NestResult<()> {
    let order = problem.kind() == ProblemKind::Order;
    let fits = match kind {
        EngineKind::Birth | EngineKind::Death => problem.is_dynamic(),
        EngineKind::Structure => problem.is_modifiable(),
        _ => kind.is_order() == order,
    };
    if fits {
        Ok(())
    } else {
        Err(NestError::UnsupportedCombination(
            ErrorInfo::new("engine-problem", "engine does not apply to this problem")
                .with_context("engine", kind.as_str())
                .with_context("problem", format!("{:?}", problem.kind())),
        ))
    }
}
