//! Unified error handling for the LOOCV sweep and the jackknife diagnostic.
//!
//! This module defines `InferenceError`, covering precondition failures of
//! the Cook's distance computation (too few records, malformed difference
//! vectors, degenerate covariance), thread-pool construction for the sweep,
//! and model-layer failures that abort a sweep before it starts (the full
//! fit). Individual holdout failures are *not* errors: they are recorded as
//! invalid LOOCV records. An alias `InferenceResult<T>` standardizes the
//! return type across inference code.
use thiserror::Error;

use crate::irt::errors::IrtError;

/// Unified error type for inference routines.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    // ---- Jackknife preconditions ----
    /// Fewer valid records than the `p + 1` needed for a full-rank
    /// covariance.
    #[error("Jackknife needs at least {required} valid records, found {n}")]
    TooFewRecords { n: usize, required: usize },

    #[error("Person {person} appears more than once among the LOOCV records")]
    DuplicatePerson { person: usize },

    #[error("Difference vector of person {person} has length {actual}, expected {expected}")]
    LengthMismatch { person: usize, expected: usize, actual: usize },

    #[error("Difference vector of person {person} has non-finite entry {value} at {index}")]
    NonFiniteDiff { person: usize, index: usize, value: f64 },

    /// All difference vectors coincide, so the covariance is zero.
    #[error("Jackknife covariance is degenerate (largest eigenvalue {lambda_max})")]
    DegenerateCovariance { lambda_max: f64 },

    // ---- Sweep ----
    #[error("Failed to build the LOOCV thread pool: {text}")]
    ThreadPool { text: String },

    // ---- Model layer ----
    #[error(transparent)]
    Irt(#[from] IrtError),
}

pub type InferenceResult<T> = Result<T, InferenceError>;

impl From<rayon::ThreadPoolBuildError> for InferenceError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        InferenceError::ThreadPool { text: err.to_string() }
    }
}
