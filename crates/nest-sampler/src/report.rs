use std::collections::BTreeMap;
use std::path::PathBuf;

use nest_core::RunProvenance;
use serde::{Deserialize, Serialize};

use crate::engines::EngineCounters;

/// Counters of one engine at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineReport {
    /// Engine name.
    pub name: String,
    /// Accepted trials.
    pub success: u64,
    /// Rejected trials.
    pub reject: u64,
    /// Calls without any accepted trial.
    pub failed: u64,
    /// Accepted trials that beat the best phantom.
    pub best: u64,
    /// Likelihood evaluations.
    pub ncalls: u64,
}

impl EngineReport {
    /// Report for `name` from its counters.
    pub fn new(name: impl Into<String>, counters: &EngineCounters) -> Self {
        Self {
            name: name.into(),
            success: counters.success,
            reject: counters.reject,
            failed: counters.failed,
            best: counters.best,
            ncalls: counters.ncalls,
        }
    }

    /// Fraction of trials that were accepted; zero without trials.
    pub fn acceptance(&self) -> f64 {
        let trials = self.success + self.reject;
        if trials == 0 {
            0.0
        } else {
            self.success as f64 / trials as f64
        }
    }
}

/// Machine-readable summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Natural log of the evidence.
    pub log_z: f64,
    /// 10-log of the evidence.
    pub log10_z: f64,
    /// Information in nats.
    pub info: f64,
    /// Iterations performed.
    pub iterations: usize,
    /// Likelihood evaluations by the distribution.
    pub evaluations: u64,
    /// Number of posterior samples.
    pub samples: usize,
    /// Histogram of insertion ranks of the explored walkers.
    pub inserted: Vec<usize>,
    /// Acceptance rate per engine name.
    pub acceptance_rates: BTreeMap<String, f64>,
    /// Counters per engine.
    pub engines: Vec<EngineReport>,
    /// Content hash of the sample list.
    pub sample_digest: String,
    /// Seed, engines and distribution of the run.
    pub provenance: RunProvenance,
    /// Checkpoints written during the run.
    pub checkpoints: Vec<PathBuf>,
}
