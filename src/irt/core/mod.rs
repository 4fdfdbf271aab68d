//! irt::core — data, parameterization, and objective pieces of the joint model.
//!
//! Purpose
//! -------
//! Hold every building block of the joint two-dimensional graded-response
//! model that does not itself drive an optimizer: the validated data
//! container, configuration, the parameter layout, and the additive terms
//! of the log-posterior with their analytic derivatives.
//!
//! Key behaviors
//! -------------
//! - [`data`]: schema validation and the person → observation index.
//! - [`options`]: serde-backed configuration ([`JointOptions`]).
//! - [`params`]: the flat unconstrained vector and its blocks.
//! - [`grm`]: category probabilities and per-observation log-probabilities.
//! - [`ability`]: correlated abilities with the LKJ prior.
//! - [`weights`]: the participant-weight strategies.
//! - [`skewness`]: the weighted-skewness statistic and penalty.
//! - [`objective`]: assembly of the joint objective and its gradient.
//!
//! Conventions
//! -----------
//! - Internal indices are 0-based; only `data::ObservationRecord` and error
//!   messages about input rows use 1-based values.
//! - Pure computation: nothing in this module logs.

pub mod ability;
pub mod data;
pub mod grm;
pub mod objective;
pub mod options;
pub mod params;
pub mod skewness;
pub mod weights;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::ability::{AbilityModel, AbilityTransform};
pub use self::data::{Dimension, IrtData, ItemMeta, Observation, ObservationRecord};
pub use self::objective::{JointObjective, ObjectiveTerms};
pub use self::options::{
    DeltaSharing, ItemPriors, JointOptions, OptimizerOptions, RestartOptions, SkewnessOptions,
};
pub use self::params::{ItemParams, ParamLayout};
pub use self::skewness::{SkewnessPenalty, SkewnessStats};
pub use self::weights::{
    FixedWeights, IndependentBeta, LogitMixture, SimplexDirichlet, SoftClip, WeightModel,
    WeightStrategy,
};
