#![deny(missing_docs)]

//! Core error, randomness and numeric helpers shared by the nested sampling
//! crates.
//!
//! Every fallible operation in the workspace returns [`NestError`], whose
//! variants carry a structured [`ErrorInfo`]. Randomness always flows through
//! an explicitly seeded [`RngHandle`]; there is no process-wide RNG.

pub mod errors;
pub mod numeric;
pub mod provenance;
pub mod rng;

pub use errors::{ErrorInfo, NestError};
pub use numeric::{log_add_exp, log_sum_exp, weighted_mean_std, wrap_half_period, LOG_ZERO};
pub use provenance::{RunProvenance, SchemaVersion};
pub use rng::{derive_substream_seed, RngHandle};

/// Convenience alias used across the workspace.
pub type NestResult<T> = Result<T, NestError>;
