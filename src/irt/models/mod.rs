//! models — fitting the joint model and scoring held-out persons.
//!
//! Purpose
//! -------
//! Collect the user-facing model APIs that sit on top of `irt::core`: the
//! joint fit driven by the generic L-BFGS optimizer, the post-fit
//! diagnostics, and single-person holdout scoring under fixed item
//! parameters.
//!
//! Key behaviors
//! -------------
//! - [`JointModel`] implements [`LogLikelihood`] over the full unconstrained
//!   vector and produces a read-only [`JointFit`].
//! - [`diagnose`] derives [`FitDiagnostics`] and per-person [`PersonStats`]
//!   from the forward pass at the optimum.
//! - [`HoldoutScorer`] implements [`LogLikelihood`] over a single person's
//!   two raw ability coordinates and returns a [`HoldoutScore`].
//!
//! Invariants & assumptions
//! ------------------------
//! - A [`JointFit`] exists only for converged runs; non-converged or
//!   diverged runs surface as `IrtError::NotConverged` / `IrtError::Diverged`.
//! - [`JointModel`] keeps per-run scratch state and is not shared across
//!   threads. [`HoldoutScorer`] is immutable and can be.
//!
//! Downstream usage
//! ----------------
//! - `JointModel::new(&data, options)?`, then `fit_default(&data)?` or
//!   `fit(theta0, &data)?` for warm starts; read results via `fitted()`.
//! - `HoldoutScorer::from_fit(&fit, item_meta, mle_opts).score(&person)?`.
//!
//! Testing notes
//! -------------
//! - Unit tests in [`joint`] cover the starting point, an end-to-end fit on
//!   simulated data, and failure reporting.
//! - Unit tests in [`holdout`] cover the analytic gradient, the direction of
//!   estimates, and standard errors.
//!
//! [`LogLikelihood`]: crate::optimization::loglik_optimizer::LogLikelihood

pub mod diagnostics;
pub mod holdout;
pub mod joint;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::diagnostics::{FitDiagnostics, PersonStats, SkewnessSummary, diagnose};
pub use self::holdout::{HoldoutScore, HoldoutScorer};
pub use self::joint::{FitStatus, JointFit, JointModel};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::holdout::{HoldoutScore, HoldoutScorer};
    pub use super::joint::{JointFit, JointModel};
}
