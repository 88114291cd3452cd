use std::fs;
use std::path::{Path, PathBuf};

use nest_core::errors::ErrorInfo;
use nest_core::{NestError, NestResult};
use serde::{Deserialize, Serialize};

use crate::engines::EngineKind;

/// YAML-configurable parameters governing a nested sampling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Number of walkers in the live ensemble.
    #[serde(default = "default_ensemble")]
    pub ensemble: usize,
    /// Number of walkers evicted per iteration.
    #[serde(default = "default_discard")]
    pub discard: usize,
    /// Speed of exploration; scales the number of steps per engine call.
    #[serde(default = "default_rate")]
    pub rate: f64,
    /// Maximum number of samples retained; `None` keeps everything.
    #[serde(default)]
    pub max_size: Option<usize>,
    /// Explore evicted walkers on a rayon pool.
    #[serde(default)]
    pub threads: bool,
    /// Reporting level, 0 (silent) to 5.
    #[serde(default = "default_verbose")]
    pub verbose: u8,
    /// Iterations between progress reports at verbose >= 2.
    #[serde(default = "default_rep_iter")]
    pub rep_iter: usize,
    /// Refit walkers that beat the best phantom with Levenberg-Marquardt.
    #[serde(default)]
    pub best_boost: bool,
    /// Recompute logL when every engine fails for a walker.
    #[serde(default)]
    pub consistency_check: bool,
    /// Classic eviction or phantom draining.
    #[serde(default)]
    pub variant: SamplerVariant,
    /// Engine names; empty means the problem's defaults.
    #[serde(default)]
    pub engines: Vec<String>,
    /// Stopping rule.
    #[serde(default)]
    pub termination: TerminationConfig,
    /// Per-engine tuning.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Checkpointing behaviour.
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    /// Master seed and substream policy.
    #[serde(default)]
    pub seed_policy: SeedPolicy,
}

fn default_ensemble() -> usize {
    100
}

fn default_discard() -> usize {
    1
}

fn default_rate() -> f64 {
    1.0
}

fn default_verbose() -> u8 {
    1
}

fn default_rep_iter() -> usize {
    100
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            ensemble: default_ensemble(),
            discard: default_discard(),
            rate: default_rate(),
            max_size: None,
            threads: false,
            verbose: default_verbose(),
            rep_iter: default_rep_iter(),
            best_boost: false,
            consistency_check: false,
            variant: SamplerVariant::default(),
            engines: Vec::new(),
            termination: TerminationConfig::default(),
            engine: EngineConfig::default(),
            checkpoint: CheckpointConfig::default(),
            seed_policy: SeedPolicy::default(),
        }
    }
}

impl SamplerConfig {
    /// Parses a configuration from YAML text and validates it.
    pub fn from_yaml_str(text: &str) -> NestResult<Self> {
        let config: Self = serde_yaml::from_str(text).map_err(|err| {
            NestError::Config(ErrorInfo::new("config-parse", err.to_string()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a YAML configuration file.
    pub fn from_path(path: &Path) -> NestResult<Self> {
        let text = fs::read_to_string(path).map_err(|err| {
            NestError::Config(
                ErrorInfo::new("config-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        Self::from_yaml_str(&text).map_err(|err| match err {
            NestError::Config(info) => {
                NestError::Config(info.with_context("path", path.display().to_string()))
            }
            other => other,
        })
    }

    /// Checks ranges and engine names.
    pub fn validate(&self) -> NestResult<()> {
        if self.ensemble == 0 {
            return Err(NestError::Config(
                ErrorInfo::new("ensemble", "the ensemble needs at least one walker")
                    .with_context("ensemble", self.ensemble),
            ));
        }
        if self.discard == 0 || self.discard > self.ensemble {
            return Err(NestError::Config(
                ErrorInfo::new("discard", "discard must lie in 1..=ensemble")
                    .with_context("discard", self.discard)
                    .with_context("ensemble", self.ensemble),
            ));
        }
        if !(self.rate > 0.0 && self.rate.is_finite()) {
            return Err(NestError::Config(
                ErrorInfo::new("rate", "rate must be positive").with_context("rate", self.rate),
            ));
        }
        if self.verbose > 5 {
            return Err(NestError::Config(
                ErrorInfo::new("verbose", "verbose ranges over 0..=5")
                    .with_context("verbose", self.verbose),
            ));
        }
        if let Some(max_size) = self.max_size {
            if max_size == 0 {
                return Err(NestError::config("max-size", "max_size must be positive"));
            }
        }
        for name in &self.engines {
            EngineKind::from_name(name)?;
        }
        self.termination.validate()?;
        self.engine.validate()
    }
}

/// How evicted likelihood mass enters the sample list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SamplerVariant {
    /// Evict the worst walkers each iteration.
    #[default]
    Classic,
    /// Additionally drain accepted trials that fall below L*.
    Phantom,
}

/// Termination rule parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminationConfig {
    /// Iterations always performed.
    #[serde(default = "default_min_iterations")]
    pub min_iterations: usize,
    /// Hard cap on iterations.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Stop once an iteration adds less than this to logZ.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Stop after `end * ensemble * H / discard` iterations.
    #[serde(default = "default_end")]
    pub end: f64,
}

fn default_min_iterations() -> usize {
    100
}

fn default_max_iterations() -> usize {
    100_000
}

fn default_tolerance() -> f64 {
    1.0e-12
}

fn default_end() -> f64 {
    2.0
}

impl Default for TerminationConfig {
    fn default() -> Self {
        Self {
            min_iterations: default_min_iterations(),
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            end: default_end(),
        }
    }
}

impl TerminationConfig {
    fn validate(&self) -> NestResult<()> {
        if self.max_iterations == 0 {
            return Err(NestError::config("max-iterations", "max_iterations must be positive"));
        }
        if self.end.is_nan() || self.end <= 0.0 || self.tolerance < 0.0 {
            return Err(NestError::Config(
                ErrorInfo::new("termination", "end must be positive and tolerance non-negative")
                    .with_context("end", self.end)
                    .with_context("tolerance", self.tolerance),
            ));
        }
        Ok(())
    }
}

/// Tuning shared by all engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Accepted steps per engine call (before `rate` scaling).
    #[serde(default = "default_nstep")]
    pub nstep: usize,
    /// Failures tolerated per engine call.
    #[serde(default = "default_max_trials")]
    pub max_trials: usize,
    /// Relative velocity perturbation after an accepted galilean step.
    #[serde(default = "default_wiggle")]
    pub wiggle: f64,
    /// Growth factor minus one of the galilean step size.
    #[serde(default = "default_delta")]
    pub delta: f64,
    /// Nominal galilean step size, in units of the bounding box.
    #[serde(default = "default_size")]
    pub size: f64,
    /// Let the chord engine step out from a short initial segment.
    #[serde(default)]
    pub step_out: bool,
}

fn default_nstep() -> usize {
    10
}

fn default_max_trials() -> usize {
    5
}

fn default_wiggle() -> f64 {
    0.2
}

fn default_delta() -> f64 {
    0.01
}

fn default_size() -> f64 {
    0.5
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            nstep: default_nstep(),
            max_trials: default_max_trials(),
            wiggle: default_wiggle(),
            delta: default_delta(),
            size: default_size(),
            step_out: false,
        }
    }
}

impl EngineConfig {
    fn validate(&self) -> NestResult<()> {
        if self.nstep == 0 || self.max_trials == 0 {
            return Err(NestError::Config(
                ErrorInfo::new("engine-budget", "nstep and max_trials must be positive")
                    .with_context("nstep", self.nstep)
                    .with_context("max_trials", self.max_trials),
            ));
        }
        if self.size.is_nan() || self.size <= 0.0 || self.delta < 0.0 || self.wiggle < 0.0 {
            return Err(NestError::Config(
                ErrorInfo::new("engine-tuning", "size must be positive, delta and wiggle non-negative")
                    .with_context("size", self.size)
                    .with_context("delta", self.delta)
                    .with_context("wiggle", self.wiggle),
            ));
        }
        Ok(())
    }

    /// Accepted steps per call once `rate` is applied.
    pub fn steps(&self, rate: f64) -> usize {
        ((self.nstep as f64 * rate).round() as usize).max(1)
    }
}

/// Checkpointing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Interval in iterations between checkpoint writes (0 disables checkpoints).
    #[serde(default)]
    pub interval: usize,
    /// Directory where checkpoints are stored.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            interval: 0,
            directory: None,
        }
    }
}

/// Deterministic seeding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedPolicy {
    /// Master seed used for the run.
    #[serde(default = "default_master_seed")]
    pub master_seed: u64,
    /// Optional label recorded alongside the seed.
    #[serde(default)]
    pub label: Option<String>,
}

fn default_master_seed() -> u64 {
    0x4E57_5EED_0000_0001
}

impl Default for SeedPolicy {
    fn default() -> Self {
        Self {
            master_seed: default_master_seed(),
            label: None,
        }
    }
}
