//! inference — leave-one-out refits and jackknife influence for fitted models.
//!
//! Purpose
//! -------
//! Provide post-estimation tools on top of a converged joint fit: the
//! leave-one-person-out (LOOCV) sweep with holdout scoring, and the
//! jackknife Cook's distance built from the item-parameter differences the
//! sweep produces.
//!
//! Key behaviors
//! -------------
//! - Define a unified error and result type, [`InferenceError`] and
//!   [`InferenceResult`], for sweep and jackknife failures.
//! - Run the sweep as a rayon parallel map with [`run_loocv`], configured by
//!   [`LoocvOptions`] and interruptible through a [`CancelToken`].
//! - Compute per-person [`CooksRecord`]s and the jackknife Hessian with
//!   [`cooks_distance`] / [`cooks_from_report`].
//!
//! Invariants & assumptions
//! ------------------------
//! - Difference vectors live in natural item-parameter units `[τ; β1; δ]`,
//!   not in the unconstrained optimizer space.
//! - Invalid LOOCV records are excluded from the jackknife, never
//!   zero-filled.
//!
//! Conventions
//! -----------
//! - Person indices are 0-based here; writers add 1 on output.
//! - Progress and warnings are logged with the `[LOOCV]` and `[COOKS D]`
//!   prefixes.
//!
//! Testing notes
//! -------------
//! - Unit tests cover report bookkeeping, cancellation, a small complete
//!   sweep, jackknife preconditions, exact values, order independence,
//!   duplication invariance, and the ridge.
//! - Integration tests run sweep determinism and the full LOOCV → Cook's D
//!   pipeline on simulated data.

pub mod errors;
pub mod jackknife;
pub mod loocv;

// ---- Re-exports (primary surface) -----------------------------------------

pub use self::errors::{InferenceError, InferenceResult};
pub use self::jackknife::{CooksRecord, JackknifeReport, cooks_distance, cooks_from_report};
pub use self::loocv::{CancelToken, LoocvOptions, LoocvRecord, LoocvReport, run_loocv};

// ---- Optional convenience prelude for downstream crates ------------------
//
// Downstream crates can `use authenticity_irt::inference::prelude::*;` to
// import the primary inference surface in a single line.

pub mod prelude {
    pub use super::errors::{InferenceError, InferenceResult};
    pub use super::jackknife::{JackknifeReport, cooks_distance, cooks_from_report};
    pub use super::loocv::{CancelToken, LoocvOptions, LoocvReport, run_loocv};
}
