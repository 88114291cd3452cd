use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nest_core::errors::ErrorInfo;
use nest_core::{NestError, NestResult, RunProvenance, SchemaVersion};
use nest_model::{ParIndex, Problem};
use serde::{Deserialize, Serialize};

use crate::config::SamplerConfig;
use crate::engines::EngineCounters;
use crate::sampler::RunState;
use crate::samples::Sample;
use crate::walker::Walker;

/// Serializable form of a walker; the problem is supplied on restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkerState {
    /// Walker identifier.
    pub id: usize,
    /// Parent identifier.
    pub parent: Option<usize>,
    /// Creation iteration.
    pub start: usize,
    /// Model and nuisance parameters.
    pub params: Vec<f64>,
    /// Hyperparameters.
    pub hypars: Vec<f64>,
    /// Quantities the engines move.
    pub fit_index: Vec<ParIndex>,
    /// Log likelihood.
    pub log_l: f64,
    /// Log prior offset.
    pub log_prior: f64,
}

impl WalkerState {
    /// Captures a walker.
    pub fn capture(walker: &Walker) -> Self {
        Self {
            id: walker.id,
            parent: walker.parent,
            start: walker.start,
            params: walker.params.clone(),
            hypars: walker.hypars.clone(),
            fit_index: walker.fit_index.clone(),
            log_l: walker.log_l,
            log_prior: walker.log_prior,
        }
    }

    /// Rebuilds the walker on `problem`.
    pub fn restore(&self, problem: &Problem) -> Walker {
        let mut walker = Walker::new(
            self.id,
            problem.clone(),
            self.params.clone(),
            self.hypars.clone(),
            self.fit_index.clone(),
        );
        walker.parent = self.parent;
        walker.start = self.start;
        walker.log_l = self.log_l;
        walker.log_prior = self.log_prior;
        walker
    }
}

/// Serializable form of a posterior sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleState {
    /// Walker identifier.
    pub id: usize,
    /// Parent identifier.
    pub parent: Option<usize>,
    /// Creation iteration.
    pub start: usize,
    /// Model parameters.
    pub params: Vec<f64>,
    /// Nuisance parameters.
    pub nuisance: Vec<f64>,
    /// Hyperparameters.
    pub hypars: Vec<f64>,
    /// Log likelihood.
    pub log_l: f64,
    /// Log weight.
    pub log_w: f64,
}

impl SampleState {
    /// Captures a sample.
    pub fn capture(sample: &Sample) -> Self {
        Self {
            id: sample.id,
            parent: sample.parent,
            start: sample.start,
            params: sample.params.clone(),
            nuisance: sample.nuisance.clone(),
            hypars: sample.hypars.clone(),
            log_l: sample.log_l,
            log_w: sample.log_w,
        }
    }

    /// Rebuilds the sample with the model of `problem`.
    pub fn restore(&self, problem: &Problem) -> Sample {
        Sample {
            id: self.id,
            parent: self.parent,
            start: self.start,
            model: Arc::clone(problem.model()),
            params: self.params.clone(),
            nuisance: self.nuisance.clone(),
            hypars: self.hypars.clone(),
            log_l: self.log_l,
            log_w: self.log_w,
        }
    }
}

/// Everything needed to continue a run exactly where it stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Schema of this payload.
    pub schema: SchemaVersion,
    /// Seed, engines and distribution of the run.
    pub provenance: RunProvenance,
    /// Configuration the run was started with.
    pub config: SamplerConfig,
    /// Pinned parameters.
    pub keep: BTreeMap<usize, f64>,
    /// Evidence accounting and loop state.
    pub state: RunState,
    /// Next walker identifier.
    pub next_id: usize,
    /// Live walkers.
    pub walkers: Vec<WalkerState>,
    /// Phantoms.
    pub phantoms: Vec<WalkerState>,
    /// Posterior samples collected so far.
    pub samples: Vec<SampleState>,
    /// Insertion rank histogram.
    pub inserted: Vec<usize>,
    /// Engine counters, in configuration order.
    pub engines: Vec<EngineCounters>,
}

impl Checkpoint {
    /// Restores the payload from disk.
    pub fn load(path: &Path) -> NestResult<Self> {
        let contents = fs::read_to_string(path).map_err(|err| {
            NestError::Serde(
                ErrorInfo::new("checkpoint-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        let checkpoint: Self = serde_json::from_str(&contents).map_err(|err| {
            NestError::Serde(
                ErrorInfo::new("checkpoint-parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        if !SchemaVersion::default().reads(&checkpoint.schema) {
            return Err(NestError::Serde(
                ErrorInfo::new("checkpoint-schema", "checkpoint schema is not readable")
                    .with_context("path", path.display().to_string())
                    .with_context("major", checkpoint.schema.major)
                    .with_context("minor", checkpoint.schema.minor),
            ));
        }
        Ok(checkpoint)
    }

    /// Writes the payload to disk.
    pub fn store(&self, path: &Path) -> NestResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                NestError::Serde(
                    ErrorInfo::new("checkpoint-mkdir", err.to_string())
                        .with_context("path", parent.display().to_string()),
                )
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            NestError::Serde(
                ErrorInfo::new("checkpoint-serialize", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        fs::write(path, json).map_err(|err| {
            NestError::Serde(
                ErrorInfo::new("checkpoint-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }
}

/// Path of the checkpoint written at `iteration` under `root`.
pub fn checkpoint_path(root: &Path, iteration: usize) -> PathBuf {
    root.join(format!("ckpt_{iteration:05}.json"))
}
