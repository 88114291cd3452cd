#![deny(missing_docs)]

//! Everything the nested sampler consumes: priors, the model contract,
//! problems, error distributions with their hyperparameters, and a
//! least-squares fitter for best-boost and model evidences.

/// Error distributions and their lazy gradients.
pub mod distribution;
/// Fitter contract and the Levenberg-Marquardt implementation.
pub mod fitter;
/// Hyperparameters and parameter addressing.
pub mod hyper;
/// Model contract and chain helpers.
pub mod model;
/// Reference models.
pub mod models;
/// Priors and the unit-cube mapping.
pub mod prior;
/// Problem variants.
pub mod problem;

pub use distribution::{DistributionKind, ErrorDistribution, PartialData};
pub use fitter::{laplace_log_z, FitResult, Fitter, LevenbergMarquardt};
pub use hyper::{HyperParameter, ParIndex};
pub use model::{apply_alteration, model_chain, Alteration, ChainLink, Model};
pub use models::{CompoundModel, FunctionModel, GaussSumModel, KnotModel, PolynomialModel, TourModel};
pub use prior::{Prior, PriorKind};
pub use problem::{ParType, Problem, ProblemKind, XyAccuracy};
