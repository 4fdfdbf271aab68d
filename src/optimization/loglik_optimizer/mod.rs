//! loglik_optimizer — argmin-backed maximizer for log-posteriors.
//!
//! Purpose
//! -------
//! Maximize a smooth log-objective `ℓ(θ)` (the joint IRT log-posterior, or
//! a single person's holdout ability posterior) with L-BFGS. Callers
//! implement [`LogLikelihood`] and invoke [`maximize`].
//!
//! Key behaviors
//! -------------
//! - [`adapter::ArgMinAdapter`] turns `ℓ(θ)` into the argmin cost
//!   `c(θ) = -ℓ(θ)` and flips analytic gradients.
//! - [`maximize`] validates the starting point, builds the solver for the
//!   chosen [`LineSearcher`], runs it under the configured iteration and
//!   time budget, and returns an [`OptimOutcome`].
//! - [`finite_diff`] supplies validated finite-difference gradients (used
//!   when a model has no analytic gradient) and Hessians (used for
//!   posterior standard errors).
//!
//! Invariants & assumptions
//! ------------------------
//! - User code implements `ℓ(θ)` and `∇ℓ(θ)`, never the cost.
//! - [`OptimOutcome::converged`] is `true` only for genuine convergence;
//!   exhausting `max_iter` or the timeout is reported as not converged and
//!   the caller decides what that means.
//!
//! Conventions
//! -----------
//! - Parameters are [`Theta`] (`Array1<f64>`) in unconstrained space.
//! - Errors bubble up as [`OptError`](crate::optimization::errors::OptError).
//!
//! Testing notes
//! -------------
//! - Unit tests cover the sign convention and FD fallback of the adapter,
//!   solver construction, tolerance validation, the convergence mapping,
//!   and a small quadratic solve through [`maximize`].

pub mod adapter;
pub mod api;
pub mod builders;
pub mod finite_diff;
pub mod run;
pub mod traits;
pub mod types;
pub mod validation;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::api::maximize;
pub use self::finite_diff::compute_hessian;
pub use self::traits::{LineSearcher, LogLikelihood, MLEOptions, OptimOutcome, Tolerances};
pub use self::types::{Cost, DEFAULT_LBFGS_MEM, FnEvalMap, Grad, Theta};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::api::maximize;
    pub use super::traits::{LineSearcher, LogLikelihood, MLEOptions, OptimOutcome, Tolerances};
    pub use super::types::{Cost, Grad, Theta};
}
