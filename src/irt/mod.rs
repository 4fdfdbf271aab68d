//! irt — joint two-dimensional graded-response model with authenticity
//! weights.
//!
//! Purpose
//! -------
//! Bundle the model stack under one namespace: data and configuration,
//! the additive log-posterior with its analytic gradient, model-level
//! fitting and holdout scoring, seeded simulation, and the shared error
//! type.
//!
//! Key behaviors
//! -------------
//! - [`core`]: validated [`IrtData`], [`JointOptions`], the parameter
//!   layout, GRM probabilities, the ability transform, weight strategies,
//!   the skewness penalty, and [`JointObjective`].
//! - [`models`]: [`JointModel`] / [`JointFit`], diagnostics, and
//!   [`HoldoutScorer`].
//! - [`simulate`]: synthetic samples with known generating values.
//! - [`errors`]: [`IrtError`] and the [`IrtResult`] alias.
//!
//! Invariants & assumptions
//! ------------------------
//! - Every item loads on exactly one of two dimensions (psychosocial,
//!   developmental). Responses are ordered categories `0..K_j`.
//! - Optimization happens in an unconstrained vector; constrained values
//!   (δ > 0, |ρ| < 1, w ∈ [0, 1]) come from smooth maps.
//! - A non-finite objective term is an error, never a silently clamped
//!   value.
//!
//! Conventions
//! -----------
//! - Category probabilities follow `P(Y ≥ k) = σ(lp − τ_j − (k − 1)·δ)`
//!   for `k ≥ 1`, with `lp = β1_j·age + θ_d`; higher ability moves mass to
//!   higher categories.
//! - The model layer does not log; logging lives in [`models`] and the
//!   inference layer.

pub mod core;
pub mod errors;
pub mod models;
pub mod simulate;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::core::{
    AbilityModel, DeltaSharing, Dimension, IrtData, ItemMeta, ItemParams, ItemPriors,
    JointObjective, JointOptions, ObjectiveTerms, Observation, ObservationRecord,
    OptimizerOptions, RestartOptions, SkewnessOptions, WeightModel,
};
pub use self::errors::{IrtError, IrtResult};
pub use self::models::{
    FitDiagnostics, FitStatus, HoldoutScore, HoldoutScorer, JointFit, JointModel, PersonStats,
};
pub use self::simulate::{SimulatedData, SimulationConfig, flip_responses, simulate};

// ---- Optional convenience prelude for downstream crates -------------------
//
// Downstream crates can write
//
//     use authenticity_irt::irt::prelude::*;
//
// to import the main model surface in a single line.

pub mod prelude {
    pub use super::{
        AbilityModel, DeltaSharing, IrtData, IrtError, IrtResult, JointFit, JointModel,
        JointOptions, ObservationRecord, WeightModel,
    };
}
