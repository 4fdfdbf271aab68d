//! optimization — L-BFGS posterior maximization, numerical helpers, and errors.
//!
//! Purpose
//! -------
//! Provide the optimization layer shared by every fit in the crate: the
//! joint IRT posterior, each leave-one-out refit, and the per-person
//! holdout ability scorer. Callers implement a log-objective, choose
//! tolerances, and get fitted parameters back without touching argmin.
//!
//! Key behaviors
//! -------------
//! - `loglik_optimizer` maximizes a user objective `ℓ(θ)` with L-BFGS
//!   (More–Thuente or Hager–Zhang line search), optional wall-clock
//!   timeout, and finite-difference fallbacks for gradients and Hessians.
//! - `numerical_stability` holds the soft floors and stable transforms the
//!   model layer builds on.
//! - `errors` normalizes configuration problems, non-finite objective
//!   terms, and backend solver failures into [`errors::OptError`].
//!
//! Invariants & assumptions
//! ------------------------
//! - Optimizers work in an unconstrained parameter space; any constrained
//!   quantity (category spacings, correlations, weights) is a smooth
//!   transform of an unconstrained coordinate owned by the model layer.
//! - Invalid states surface as `OptError`, never as panics.
//!
//! Conventions
//! -----------
//! - All solvers maximize `ℓ(θ)` by minimizing `c(θ) = -ℓ(θ)`; outcomes are
//!   reported in terms of `ℓ`.
//! - Nothing in this module logs or performs I/O; the model and inference
//!   layers own progress reporting.
//!
//! Downstream usage
//! ----------------
//! - `irt::models::joint` and `irt::models::holdout` implement
//!   `LogLikelihood` and call `maximize`.
//! - `inference::jackknife` uses `EIGEN_EPS` from `numerical_stability`.
//!
//! Testing notes
//! -------------
//! - Submodules carry unit tests for their local contracts; end-to-end
//!   solver behavior is exercised by the model tests and the integration
//!   tests under `tests/`.

pub mod errors;
pub mod loglik_optimizer;
pub mod numerical_stability;

// ---- Optional convenience prelude for downstream crates -------------------
//
// Downstream crates can write
//
//     use authenticity_irt::optimization::prelude::*;
//
// to import the main optimization surface in a single line.

pub mod prelude {
    pub use super::errors::{OptError, OptResult};
    pub use super::loglik_optimizer::prelude::*;
    pub use super::numerical_stability::prelude::*;
}
