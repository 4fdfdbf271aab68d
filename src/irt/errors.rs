//! Errors for the joint IRT model (schema validation, configuration checks,
//! parameter-vector shape, and fit failures).
//!
//! ## Conventions
//! - `row` fields are **1-based data rows** (the first record after a CSV
//!   header is row 1), so messages point straight at the offending line.
//! - `person`/`item` fields in schema errors are the 1-based indices as they
//!   appear in the input; everywhere else indices are 0-based.
//! - Optimizer/backend failures are wrapped in [`IrtError::Optimization`];
//!   a non-finite objective term surfacing from inside the optimizer becomes
//!   [`IrtError::Diverged`] together with the last finite term breakdown.
use thiserror::Error;

#[cfg(feature = "python-bindings")]
use pyo3::{PyErr, exceptions::PyValueError};

use crate::irt::core::objective::{ObjectiveTerms, describe_terms};
use crate::optimization::errors::OptError;

/// Result alias for model-layer operations.
pub type IrtResult<T> = Result<T, IrtError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IrtError {
    // ---- Schema ----
    #[error("No observations supplied")]
    EmptyObservations,

    #[error("Row {row}: person index {index} is out of range (indices are 1-based)")]
    PersonIndexOutOfRange { row: usize, index: usize },

    #[error("Row {row}: item index {index} is out of range (indices are 1-based)")]
    ItemIndexOutOfRange { row: usize, index: usize },

    /// Indices must be dense: every value in `1..=max` appears at least once.
    #[error("{kind} indices are not dense: index {missing} never appears")]
    NonDenseIndex { kind: &'static str, missing: usize },

    #[error("Row {row}: response category {response} is not below the category count {categories}")]
    ResponseOutOfRange { row: usize, response: usize, categories: usize },

    #[error("Row {row}: item must have at least 2 categories, found {categories}")]
    TooFewCategories { row: usize, categories: usize },

    #[error("Row {row}: person age must be finite, found {value}")]
    NonFiniteAge { row: usize, value: f64 },

    #[error("Row {row}: person {person} has age {found}, earlier rows gave {first}")]
    InconsistentAge { row: usize, person: usize, first: f64, found: f64 },

    #[error("Row {row}: item {item} disagrees with earlier rows on its {field}")]
    InconsistentItem { row: usize, item: usize, field: &'static str },

    #[error("Row {row}: unknown item dimension '{label}' (expected psychosocial or developmental)")]
    UnknownDimension { row: usize, label: String },

    #[error("Length mismatch for {field}: expected {expected}, found {actual}")]
    LengthMismatch { field: &'static str, expected: usize, actual: usize },

    // ---- Subsetting ----
    #[error("Person {person} is out of range for {n_persons} persons")]
    PersonOutOfRange { person: usize, n_persons: usize },

    #[error("Dropping person {person} would leave fewer than 2 persons")]
    TooFewPersons { person: usize },

    #[error("Replication factor must be at least 1")]
    InvalidReplication,

    // ---- Holdout ----
    /// `position` counts the person's responses from 1; `item` is 1-based.
    #[error("Holdout response {position}: item {item}, category {response}: {reason}")]
    InvalidHoldoutResponse { position: usize, item: usize, response: usize, reason: &'static str },

    // ---- Configuration ----
    #[error("Invalid hyperparameter {name} = {value}: {reason}")]
    InvalidHyperparameter { name: &'static str, value: f64, reason: &'static str },

    // ---- Parameter vector ----
    #[error("Theta length mismatch: expected {expected}, actual {actual}")]
    ThetaLengthMismatch { expected: usize, actual: usize },

    #[error("Invalid theta input at index {index}: {value}, must be finite")]
    InvalidThetaInput { index: usize, value: f64 },

    /// One additive objective term evaluated to NaN/±inf.
    #[error("Objective term '{term}' is non-finite ({value})")]
    NonFiniteTerm { term: &'static str, value: f64 },

    // ---- Fit ----
    #[error(
        "Joint fit did not converge ({status}) after {iterations} iterations; last finite terms: {}",
        describe_terms(.last_finite)
    )]
    NotConverged { status: String, iterations: usize, last_finite: Option<ObjectiveTerms> },

    #[error(
        "Joint fit diverged: term '{term}' became non-finite ({value}); last finite terms: {}",
        describe_terms(.last_finite)
    )]
    Diverged { term: &'static str, value: f64, last_finite: Option<ObjectiveTerms> },

    #[error("Model has not been fitted yet")]
    ModelNotFitted,

    #[error("Optimization failed: {0}")]
    Optimization(#[from] OptError),
}

#[cfg(feature = "python-bindings")]
impl From<IrtError> for PyErr {
    fn from(err: IrtError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}
