//! numerical_stability — soft floors, stable transforms, and shared tolerances.
//!
//! Purpose
//! -------
//! Collect the numerically stable scalar transforms and the small named
//! tolerances used by the joint IRT objective, the skewness penalty, and
//! the jackknife inversion. This module is the single home of the crate's
//! floor policy: additive-epsilon soft floors everywhere, never hard
//! `max`/`min` clamps.
//!
//! Key behaviors
//! -------------
//! - Provide the named floor helpers `safe_div`, `safe_log`, and
//!   `soft_clip` (plus its derivative) that every division, pre-log floor,
//!   and outlier clip in the crate goes through.
//! - Provide stable maps between unconstrained optimizer coordinates and
//!   constrained model quantities (`safe_softplus`, `safe_softplus_inv`,
//!   `safe_logistic`) and log-domain helpers (`log_sum_exp2`, `log_cosh`).
//! - Provide Gaussian log densities for priors and the skewness penalty.
//! - Centralize tolerances (`LOG_PROB_FLOOR`, `SAFE_EPS`, `EIGEN_EPS`,
//!   `DEFAULT_SOFT_CLIP`, `GENERAL_TOL`).
//!
//! Invariants & assumptions
//! ------------------------
//! - All helpers assume finite `f64` inputs unless documented otherwise;
//!   shape and domain validation live in the model layer.
//! - `safe_div` is intended for non-negative denominators.
//!
//! Conventions
//! -----------
//! - Pure functions only: no logging, no I/O, no global state. Safe to call
//!   from inner loops and from rayon workers.
//!
//! Downstream usage
//! ----------------
//! - `irt::core` uses these helpers for category log-probabilities, the
//!   weight transforms, the LKJ term, and the skewness statistics.
//! - `inference::jackknife` uses `EIGEN_EPS` when inverting the jackknife
//!   covariance.
//!
//! Testing notes
//! -------------
//! - Unit tests in [`transformations`] compare against naïve formulas on
//!   safe inputs and check tail behavior and the floor contracts.

pub mod transformations;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::transformations::{
    DEFAULT_SOFT_CLIP, EIGEN_EPS, GENERAL_TOL, HALF_LN_2PI, LOG_PROB_FLOOR, SAFE_EPS, log_cosh,
    log_sum_exp2, normal_ln_pdf, safe_div, safe_log, safe_logistic, safe_softplus,
    safe_softplus_inv, soft_clip, soft_clip_deriv, std_normal_ln_pdf,
};

// ---- Optional convenience prelude for downstream crates -------------------
//
// Downstream crates can write
//
//     use authenticity_irt::optimization::numerical_stability::prelude::*;
//
// to import the main numerical-stability surface in a single line.

pub mod prelude {
    pub use super::transformations::{
        LOG_PROB_FLOOR, SAFE_EPS, safe_div, safe_log, safe_logistic, safe_softplus,
        safe_softplus_inv, soft_clip,
    };
}
