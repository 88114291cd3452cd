#![deny(missing_docs)]

//! Nested sampling over the problems and error distributions of
//! `nest-model`.
//!
//! A [`NestedSampler`] keeps an ensemble of walkers drawn from the prior,
//! repeatedly discards the worst into a [`SampleList`] and refills the
//! ensemble by exploring clones of the survivors with a set of engines under
//! a rising likelihood floor. Every random choice is derived from one master
//! seed, so a run can be repeated, spread over threads or resumed from a
//! [`Checkpoint`] with identical results.

/// Checkpoint payloads and their file layout.
pub mod checkpoint;
/// YAML configuration schema and defaults.
pub mod config;
/// Deterministic seed derivation helpers.
pub mod determinism;
/// Engines that move walkers under the likelihood constraint.
pub mod engines;
/// Runs the engines over the walkers of one iteration.
pub mod explorer;
/// Accepted trial positions.
pub mod phantoms;
/// Engine reports and run summaries.
pub mod report;
/// The nested sampling loop.
pub mod sampler;
/// Posterior samples and their summaries.
pub mod samples;
/// Order-problem optimiser.
pub mod solver;
/// Walkers and the live ensemble.
pub mod walker;

pub use checkpoint::{checkpoint_path, Checkpoint};
pub use config::{CheckpointConfig, EngineConfig, SamplerConfig, SamplerVariant, SeedPolicy, TerminationConfig};
pub use engines::{EngineCounters, EngineKind};
pub use explorer::Explorer;
pub use phantoms::PhantomCollection;
pub use report::{EngineReport, RunSummary};
pub use sampler::{DataOptions, NestedSampler, RunState};
pub use samples::{Sample, SampleList};
pub use solver::NestedSolver;
pub use walker::{Walker, WalkerList};
