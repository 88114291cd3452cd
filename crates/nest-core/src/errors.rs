//! Structured error types shared across the nested sampling crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`NestError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (indices, sizes, likelihood values, etc.).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the nested sampling engine.
///
/// Fatal families stop the sampler and surface to the caller. Numeric
/// failures are usually absorbed where they occur; they only reach the caller
/// when nothing sensible can be substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum NestError {
    /// A problem, distribution and prior combination that cannot be sampled.
    #[error("unsupported combination: {0}")]
    UnsupportedCombination(ErrorInfo),
    /// No finite likelihood could be found within the retry budget.
    #[error("degenerate likelihood: {0}")]
    DegenerateLikelihood(ErrorInfo),
    /// Linear algebra or special function failure.
    #[error("numeric failure: {0}")]
    NumericFailure(ErrorInfo),
    /// Stored likelihood disagrees with a recomputed one.
    #[error("consistency mismatch: {0}")]
    ConsistencyMismatch(ErrorInfo),
    /// Invalid arguments or configuration values.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Serialization, schema and file errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
    /// Errors collected from parallel workers after the join barrier.
    #[error("{} worker(s) failed: {0}", .1.len())]
    Workers(ErrorInfo, Vec<NestError>),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl NestError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            NestError::UnsupportedCombination(info)
            | NestError::DegenerateLikelihood(info)
            | NestError::NumericFailure(info)
            | NestError::ConsistencyMismatch(info)
            | NestError::Config(info)
            | NestError::Serde(info)
            | NestError::Workers(info, _) => info,
        }
    }

    /// Returns true for errors that must stop a run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, NestError::NumericFailure(_))
    }

    /// Folds worker errors into a single composite, or `None` if there are none.
    pub fn from_workers(errors: Vec<NestError>) -> Option<NestError> {
        if errors.is_empty() {
            return None;
        }
        let info = ErrorInfo::new("worker-errors", "parallel exploration failed")
            .with_context("count", errors.len());
        Some(NestError::Workers(info, errors))
    }

    /// Shorthand for a configuration error.
    pub fn config(code: &str, message: impl Into<String>) -> Self {
        NestError::Config(ErrorInfo::new(code, message))
    }

    /// Shorthand for an unsupported combination.
    pub fn unsupported(code: &str, message: impl Into<String>) -> Self {
        NestError::UnsupportedCombination(ErrorInfo::new(code, message))
    }

    /// Shorthand for a numeric failure.
    pub fn numeric(code: &str, message: impl Into<String>) -> Self {
        NestError::NumericFailure(ErrorInfo::new(code, message))
    }
}
