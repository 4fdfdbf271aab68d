//! Joint model options — configuration for fitting and scoring.
//!
//! Purpose
//! -------
//! Collect every knob of the joint model in one serde-backed bundle,
//! [`JointOptions`], so a TOML file fully describes a fit. All fields carry
//! defaults; an empty file is a valid configuration.
//!
//! Key behaviors
//! -------------
//! - Group hyperparameters by concern: ability model, δ sharing, weight
//!   strategy, skewness penalty, item priors, optimizer settings and
//!   exclusion restarts.
//! - [`JointOptions::validate`] rejects non-finite or out-of-domain values
//!   before any evaluation happens.
//! - [`OptimizerOptions::to_mle_options`] converts the plain settings into
//!   the validated optimizer types.
//!
//! Conventions
//! -----------
//! - Field names are snake_case in TOML; variant tags use `kind = "..."`.
//! - Unknown fields are rejected so typos do not silently fall back to
//!   defaults.
use crate::{
    irt::{
        core::{ability::AbilityModel, weights::WeightModel},
        errors::{IrtError, IrtResult},
    },
    optimization::loglik_optimizer::{LineSearcher, MLEOptions, Tolerances},
};
use serde::{Deserialize, Serialize};

/// Whether threshold spacing δ is estimated per dimension or shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaSharing {
    #[default]
    PerDimension,
    Shared,
}

impl DeltaSharing {
    pub fn n_delta(self) -> usize {
        match self {
            DeltaSharing::PerDimension => 2,
            DeltaSharing::Shared => 1,
        }
    }
}

/// Weighted-skewness penalty settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SkewnessOptions {
    /// Penalty strength `λ_skew`; 0 disables the penalty.
    pub lambda: f64,
    /// Soft-clip constant `c` for per-person t-statistics.
    pub clip: f64,
}

impl Default for SkewnessOptions {
    fn default() -> Self {
        Self { lambda: 1.0, clip: 10.0 }
    }
}

/// Item-parameter priors: `τ ~ N(0, tau_sd)`, `β1 ~ N(0, beta1_sd)`,
/// `δ ~ half-t(delta_df, 0, delta_scale)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ItemPriors {
    pub tau_sd: f64,
    pub beta1_sd: f64,
    pub delta_df: f64,
    pub delta_scale: f64,
}

impl Default for ItemPriors {
    fn default() -> Self {
        Self { tau_sd: 5.0, beta1_sd: 2.0, delta_df: 3.0, delta_scale: 1.0 }
    }
}

/// Exclusion-mode restarts after the first converged run.
///
/// Persons whose mean log-probability lies more than `outlier_cutoff`
/// robust standard deviations below the sample median are re-fitted from
/// the exclusion state, worst first, one at a time. A restart is kept only
/// when it raises the objective; the first rejected restart ends the pass.
/// Only weight strategies with a per-person exclusion mode restart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RestartOptions {
    /// Maximum number of restarts; 0 disables them.
    pub max_restarts: usize,
    /// Cut-off in robust (MAD-scaled) standard deviations.
    pub outlier_cutoff: f64,
}

impl Default for RestartOptions {
    fn default() -> Self {
        Self { max_restarts: 5, outlier_cutoff: 3.0 }
    }
}

/// Plain optimizer settings as they appear in configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerOptions {
    pub max_iter: usize,
    pub tol_grad: f64,
    pub tol_cost: f64,
    pub line_search: String,
    pub lbfgs_mem: usize,
    pub timeout_secs: Option<f64>,
    pub verbose: bool,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            max_iter: 5000,
            tol_grad: 1e-6,
            tol_cost: 1e-10,
            line_search: "MoreThuente".to_string(),
            lbfgs_mem: 7,
            timeout_secs: None,
            verbose: false,
        }
    }
}

impl OptimizerOptions {
    /// Validated optimizer options.
    ///
    /// Errors
    /// ------
    /// - `IrtError::Optimization` wrapping the tolerance, line-search,
    ///   memory, or timeout validation error.
    pub fn to_mle_options(&self) -> IrtResult<MLEOptions> {
        let tols = Tolerances::new(Some(self.tol_grad), Some(self.tol_cost), Some(self.max_iter))?;
        let line_searcher: LineSearcher = self.line_search.parse()?;
        let mut opts = MLEOptions::new(tols, line_searcher, Some(self.lbfgs_mem))?
            .with_verbose(self.verbose);
        if let Some(secs) = self.timeout_secs {
            opts = opts.with_timeout(secs)?;
        }
        Ok(opts)
    }
}

/// `JointOptions` — the full configuration of a joint fit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JointOptions {
    pub ability: AbilityModel,
    pub delta_sharing: DeltaSharing,
    pub weights: WeightModel,
    pub skewness: SkewnessOptions,
    pub priors: ItemPriors,
    pub optimizer: OptimizerOptions,
    pub restarts: RestartOptions,
}

impl JointOptions {
    /// Reject out-of-domain hyperparameters.
    ///
    /// Errors
    /// ------
    /// - `IrtError::InvalidHyperparameter` naming the first bad field.
    /// - `IrtError::Optimization` for invalid optimizer settings.
    pub fn validate(&self) -> IrtResult<()> {
        self.ability.validate()?;
        self.weights.validate()?;
        let lambda = self.skewness.lambda;
        if !lambda.is_finite() || lambda < 0.0 {
            return Err(IrtError::InvalidHyperparameter {
                name: "skewness.lambda",
                value: lambda,
                reason: "must be finite and non-negative",
            });
        }
        require_positive("skewness.clip", self.skewness.clip)?;
        require_positive("priors.tau_sd", self.priors.tau_sd)?;
        require_positive("priors.beta1_sd", self.priors.beta1_sd)?;
        require_positive("priors.delta_df", self.priors.delta_df)?;
        require_positive("priors.delta_scale", self.priors.delta_scale)?;
        require_positive("restarts.outlier_cutoff", self.restarts.outlier_cutoff)?;
        self.optimizer.to_mle_options()?;
        Ok(())
    }
}

/// Shared check for strictly positive, finite hyperparameters.
pub(crate) fn require_positive(name: &'static str, value: f64) -> IrtResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(IrtError::InvalidHyperparameter {
            name,
            value,
            reason: "must be finite and strictly positive",
        });
    }
    Ok(())
}
