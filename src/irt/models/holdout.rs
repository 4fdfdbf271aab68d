//! Holdout scoring of one person under fixed item parameters.
//!
//! For a held-out person the scorer maximizes
//! `Σ_obs ln(P + ε) + Σ_d ln φ(z_d)` over the raw coordinates `z ∈ ℝ²`
//! with the item parameters and ρ of a fit held fixed, then reports the
//! ability `θ = z·Lᵀ`, the log-posterior, and the optimizer status.
//! Optional standard errors come from the finite-difference observed
//! information in `z`, mapped through `L`.
use crate::{
    irt::{
        core::{
            ability::AbilityTransform,
            data::{ItemMeta, PersonResponses},
            grm::category_prob,
            params::ItemParams,
        },
        errors::{IrtError, IrtResult},
        models::joint::JointFit,
    },
    optimization::{
        errors::{OptError, OptResult},
        loglik_optimizer::{
            Cost, Grad, LogLikelihood, MLEOptions, Theta, compute_hessian, maximize,
        },
        numerical_stability::{LOG_PROB_FLOOR, safe_log, std_normal_ln_pdf},
    },
};
use nalgebra::Matrix2;
use ndarray::{Array1, Array2, array};

/// Result of scoring one held-out person.
#[derive(Debug, Clone, PartialEq)]
pub struct HoldoutScore {
    pub ability: [f64; 2],
    pub z: [f64; 2],
    pub log_posterior: f64,
    pub converged: bool,
    pub status: String,
    pub iterations: usize,
    /// Standard errors of `ability`, when requested and the observed
    /// information is positive definite.
    pub standard_errors: Option<[f64; 2]>,
}

/// Scores held-out persons against fixed item parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct HoldoutScorer {
    items: ItemParams,
    item_meta: Vec<ItemMeta>,
    transform: AbilityTransform,
    mle_opts: MLEOptions,
    standard_errors: bool,
}

impl HoldoutScorer {
    pub fn new(
        items: ItemParams, item_meta: Vec<ItemMeta>, transform: AbilityTransform,
        mle_opts: MLEOptions,
    ) -> Self {
        Self { items, item_meta, transform, mle_opts, standard_errors: false }
    }

    /// Scorer holding the item parameters and ρ of `fit` fixed.
    pub fn from_fit(fit: &JointFit, item_meta: Vec<ItemMeta>, mle_opts: MLEOptions) -> Self {
        Self::new(fit.items.clone(), item_meta, fit.transform(), mle_opts)
    }

    pub fn with_standard_errors(mut self, enabled: bool) -> Self {
        self.standard_errors = enabled;
        self
    }

    /// Maximize the holdout log-posterior for `person`.
    ///
    /// A run that stops without converging is returned with
    /// `converged == false`; callers decide whether to keep it.
    ///
    /// Errors
    /// ------
    /// - `IrtError::InvalidHoldoutResponse` if a response names an unknown
    ///   item or a category outside the item's range.
    /// - `IrtError::Optimization` for solver failures.
    pub fn score(&self, person: &PersonResponses) -> IrtResult<HoldoutScore> {
        self.check_responses(person)?;
        let outcome = maximize(self, Array1::zeros(2), person, &self.mle_opts)?;
        let z = [outcome.theta_hat[0], outcome.theta_hat[1]];
        let standard_errors = if self.standard_errors {
            self.ability_standard_errors(&outcome.theta_hat, person)
        } else {
            None
        };
        Ok(HoldoutScore {
            ability: self.transform.apply_one(z),
            z,
            log_posterior: outcome.value,
            converged: outcome.converged,
            status: outcome.status,
            iterations: outcome.iterations,
            standard_errors,
        })
    }

    fn check_responses(&self, person: &PersonResponses) -> IrtResult<()> {
        for (pos, &(item, response)) in person.responses.iter().enumerate() {
            let reason = match self.item_meta.get(item) {
                None => "unknown item",
                Some(meta) if response >= meta.categories => "category out of range",
                Some(_) => continue,
            };
            return Err(IrtError::InvalidHoldoutResponse {
                position: pos + 1,
                item: item + 1,
                response,
                reason,
            });
        }
        Ok(())
    }

    /// `√diag(L·(−H)⁻¹·Lᵀ)` with `H` the finite-difference Hessian of the
    /// log-posterior in `z`.
    fn ability_standard_errors(
        &self, z_hat: &Theta, person: &PersonResponses,
    ) -> Option<[f64; 2]> {
        let grad = |z: &Theta| -> Grad {
            self.grad(z, person).unwrap_or_else(|_| Array1::from_elem(2, f64::NAN))
        };
        let hess = compute_hessian(&grad, z_hat).ok()?;
        let info = Matrix2::new(-hess[[0, 0]], -hess[[0, 1]], -hess[[1, 0]], -hess[[1, 1]]);
        let cov_z = info.try_inverse()?;
        let l = self.transform.cholesky();
        let l = Matrix2::new(l[[0, 0]], l[[0, 1]], l[[1, 0]], l[[1, 1]]);
        let cov = l * cov_z * l.transpose();
        if cov[(0, 0)] > 0.0 && cov[(1, 1)] > 0.0 {
            Some([cov[(0, 0)].sqrt(), cov[(1, 1)].sqrt()])
        } else {
            None
        }
    }
}

impl LogLikelihood for HoldoutScorer {
    type Data = PersonResponses;

    fn value(&self, theta: &Theta, data: &Self::Data) -> OptResult<Cost> {
        let ability = self.transform.apply_one([theta[0], theta[1]]);
        let mut total = std_normal_ln_pdf(theta[0]) + std_normal_ln_pdf(theta[1]);
        for &(j, y) in &data.responses {
            let meta = self.item_meta[j];
            let lp = self.items.beta1[j] * data.age + ability[meta.dimension.index()];
            let delta = self.items.delta_for(meta.dimension);
            total += safe_log(category_prob(y, meta.categories, self.items.tau[j], delta, lp).prob);
        }
        if !total.is_finite() {
            return Err(OptError::NonFiniteObjectiveTerm { term: "holdout", value: total });
        }
        Ok(total)
    }

    fn check(&self, theta: &Theta, _data: &Self::Data) -> OptResult<()> {
        if theta.len() != 2 {
            return Err(OptError::ThetaLengthMismatch { expected: 2, actual: theta.len() });
        }
        Ok(())
    }

    fn grad(&self, theta: &Theta, data: &Self::Data) -> OptResult<Grad> {
        let z = array![[theta[0], theta[1]]];
        let ability = self.transform.apply_one([theta[0], theta[1]]);
        let mut theta_grad = Array2::zeros((1, 2));
        for &(j, y) in &data.responses {
            let meta = self.item_meta[j];
            let lp = self.items.beta1[j] * data.age + ability[meta.dimension.index()];
            let delta = self.items.delta_for(meta.dimension);
            let cp = category_prob(y, meta.categories, self.items.tau[j], delta, lp);
            theta_grad[[0, meta.dimension.index()]] -=
                (cp.d_upper - cp.d_lower) / (cp.prob + LOG_PROB_FLOOR);
        }
        let mut z_grad = z.mapv(|v| -v);
        self.transform.backprop(z.view(), theta_grad.view(), z_grad.view_mut());
        Ok(array![z_grad[[0, 0]], z_grad[[0, 1]]])
    }
}
