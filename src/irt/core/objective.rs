//! Joint objective: the log-posterior maximized by the joint fit.
//!
//! Purpose
//! -------
//! Assemble the five additive terms of the joint objective from a flat
//! unconstrained parameter vector and return their values, separately
//! tracked, together with the analytic gradient over the whole vector.
//!
//! Key behaviors
//! -------------
//! - (a) item priors: `τ ~ N(0, tau_sd)`, `β1 ~ N(0, beta1_sd)`,
//!   `δ ~ half-t(ν, 0, s)` with `δ = softplus(raw)`;
//! - (b) ability prior `z ~ N(0, I)` plus the LKJ term;
//! - (c) weight prior from the configured `WeightStrategy`;
//! - (d) weighted likelihood `Σ wᵢ·llᵢ`;
//! - (e) skewness penalty `λ·ln φ(z_skew)`.
//! - Terms are checked for finiteness in that order; the first failure is
//!   reported as `IrtError::NonFiniteTerm` naming the term.
//!
//! Invariants & assumptions
//! ------------------------
//! - `θ` has passed `ParamLayout::check` (length and finiteness).
//! - The forward pass has no branches on parameter values beyond the
//!   skipped-penalty rule; everything else branches on data indices only.
//!
//! Downstream usage
//! ----------------
//! - `irt::models::joint` wraps [`JointObjective`] in the optimizer's
//!   `LogLikelihood` trait and turns the term breakdown into fit results.
//! - [`JointObjective::forward`] is reused after the fit to build the
//!   post-fit diagnostics without re-deriving any quantity.
use crate::{
    irt::{
        core::{
            ability::{
                AbilityModel, AbilityTransform, lkj_log_density, lkj_log_density_grad,
                z_log_prior,
            },
            data::IrtData,
            grm::{GrmEvaluation, ItemGradient},
            options::{ItemPriors, JointOptions},
            params::{ItemParams, ParamLayout},
            skewness::{SkewnessPenalty, SkewnessStats},
            weights::WeightModel,
        },
        errors::{IrtError, IrtResult},
    },
    optimization::{
        loglik_optimizer::{Grad, Theta},
        numerical_stability::{normal_ln_pdf, safe_logistic},
    },
};
use ndarray::{Array1, Array2, s};
use serde::{Deserialize, Serialize};
use statrs::function::gamma::ln_gamma;
use std::fmt;

/// Separately tracked objective terms.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectiveTerms {
    pub item_prior: f64,
    pub ability_prior: f64,
    pub weight_prior: f64,
    pub likelihood: f64,
    pub skew_penalty: f64,
    /// Whether the skewness penalty was applied at this evaluation.
    pub skew_applied: bool,
}

impl ObjectiveTerms {
    pub fn total(&self) -> f64 {
        self.item_prior + self.ability_prior + self.weight_prior + self.likelihood + self.skew_penalty
    }

    /// `(name, value)` pairs in evaluation order.
    pub fn named(&self) -> [(&'static str, f64); 5] {
        [
            ("item_prior", self.item_prior),
            ("ability_prior", self.ability_prior),
            ("weight_prior", self.weight_prior),
            ("likelihood", self.likelihood),
            ("skew_penalty", self.skew_penalty),
        ]
    }
}

impl fmt::Display for ObjectiveTerms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.named() {
            write!(f, "{name}={value:.6} ")?;
        }
        write!(f, "(total={:.6}", self.total())?;
        if !self.skew_applied {
            write!(f, ", skew penalty skipped")?;
        }
        write!(f, ")")
    }
}

/// Human-readable form of an optional breakdown, for error messages.
pub fn describe_terms(terms: &Option<ObjectiveTerms>) -> String {
    match terms {
        Some(t) => t.to_string(),
        None => "none recorded".to_string(),
    }
}

/// Every model quantity produced by one forward evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardPass {
    pub items: ItemParams,
    pub transform: AbilityTransform,
    /// Raw coordinates, `N × 2`.
    pub z: Array2<f64>,
    /// Abilities, `N × 2`.
    pub abilities: Array2<f64>,
    pub weights: Array1<f64>,
    pub grm: GrmEvaluation,
    pub person_loglik: Array1<f64>,
    pub skewness: SkewnessStats,
    pub terms: ObjectiveTerms,
}

/// Half-Student-t(ν, 0, s) log density on `δ > 0` and its derivative.
fn half_t_ln_pdf(delta: f64, df: f64, scale: f64) -> (f64, f64) {
    let norm = std::f64::consts::LN_2 + ln_gamma(0.5 * (df + 1.0))
        - ln_gamma(0.5 * df)
        - 0.5 * (df * std::f64::consts::PI).ln()
        - scale.ln();
    let q = df * scale * scale;
    let value = norm - 0.5 * (df + 1.0) * (delta * delta / q).ln_1p();
    let grad = -(df + 1.0) * delta / (q + delta * delta);
    (value, grad)
}

/// `JointObjective` — the joint log-posterior for one dataset shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointObjective {
    pub layout: ParamLayout,
    pub priors: ItemPriors,
    /// LKJ shape, `None` for independent abilities.
    pub lkj_shape: Option<f64>,
    pub weights: WeightModel,
    pub skewness: SkewnessPenalty,
}

impl JointObjective {
    pub fn new(data: &IrtData, options: &JointOptions) -> Self {
        let lkj_shape = match options.ability {
            AbilityModel::Correlated { lkj_shape } => Some(lkj_shape),
            AbilityModel::Independent => None,
        };
        Self {
            layout: ParamLayout::new(data.n_items(), data.n_persons(), options),
            priors: options.priors,
            lkj_shape,
            weights: options.weights,
            skewness: options.skewness.into(),
        }
    }

    /// Forward pass: every intermediate plus the term breakdown.
    ///
    /// Errors
    /// ------
    /// - `IrtError::ThetaLengthMismatch` / `InvalidThetaInput` from the
    ///   layout check.
    /// - `IrtError::NonFiniteTerm` for the first term that is NaN or ±inf.
    pub fn forward(&self, theta: &Theta, data: &IrtData) -> IrtResult<ForwardPass> {
        let layout = &self.layout;
        layout.check(theta)?;
        let items = layout.item_params(theta);
        let z = layout.z(theta);
        let transform = layout.transform(theta);
        let abilities = transform.apply(z.view());
        let strategy = self.weights.strategy();
        let raw_w = theta.slice(s![layout.weight_range()]);
        let weights = strategy.weights(raw_w, layout.n_persons);

        let item_prior = self.item_prior(&items);
        check_term("item_prior", item_prior)?;

        let mut ability_prior = z_log_prior(z.view());
        if let (Some(eta), Some(k)) = (self.lkj_shape, layout.rho_index()) {
            ability_prior += lkj_log_density(theta[k], eta);
        }
        check_term("ability_prior", ability_prior)?;

        let weight_prior = strategy.log_prior(raw_w, &weights);
        check_term("weight_prior", weight_prior)?;

        let grm = GrmEvaluation::evaluate(data, &items, abilities.view());
        let person_loglik = grm.person_loglik(data);
        let likelihood = weights.dot(&person_loglik);
        check_term("likelihood", likelihood)?;

        let skewness = self.skewness.evaluate(data, &grm.logp, &weights);
        check_term("skew_penalty", skewness.penalty)?;

        let terms = ObjectiveTerms {
            item_prior,
            ability_prior,
            weight_prior,
            likelihood,
            skew_penalty: skewness.penalty,
            skew_applied: skewness.applied,
        };
        Ok(ForwardPass {
            items,
            transform,
            z,
            abilities,
            weights,
            grm,
            person_loglik,
            skewness,
            terms,
        })
    }

    /// Analytic gradient of the total objective at a completed forward pass.
    pub fn gradient(&self, theta: &Theta, data: &IrtData, fp: &ForwardPass) -> Grad {
        let layout = &self.layout;
        let mut grad = Array1::zeros(layout.len());

        // Observation and weight adjoints from (d) and (e).
        let mut obs_adjoint = Array1::zeros(data.n_obs());
        for i in 0..layout.n_persons {
            obs_adjoint.slice_mut(s![data.person_range(i)]).fill(fp.weights[i]);
        }
        let mut w_adjoint = fp.person_loglik.clone();
        self.skewness.backprop(
            data,
            &fp.grm.logp,
            &fp.weights,
            &fp.skewness,
            &mut obs_adjoint,
            &mut w_adjoint,
        );

        // Likelihood → item parameters and abilities.
        let mut item_grad = ItemGradient::zeros(layout.n_items, layout.n_delta());
        let mut theta_grad = Array2::zeros((layout.n_persons, 2));
        fp.grm.backprop(data, &fp.items, &obs_adjoint, &mut item_grad, theta_grad.view_mut());

        // (a) item priors and the δ softplus chain.
        let tau_var = self.priors.tau_sd * self.priors.tau_sd;
        let beta_var = self.priors.beta1_sd * self.priors.beta1_sd;
        for j in 0..layout.n_items {
            grad[j] = item_grad.tau[j] - fp.items.tau[j] / tau_var;
            grad[layout.n_items + j] = item_grad.beta1[j] - fp.items.beta1[j] / beta_var;
        }
        for (k, idx) in layout.delta_range().enumerate() {
            let (_, prior_grad) =
                half_t_ln_pdf(fp.items.delta[k], self.priors.delta_df, self.priors.delta_scale);
            grad[idx] = (item_grad.delta[k] + prior_grad) * safe_logistic(theta[idx]);
        }

        // (b) abilities: pull back through L, then the N(0, I) and LKJ priors.
        let mut z_grad = fp.z.mapv(|v| -v);
        let u_grad = fp.transform.backprop(fp.z.view(), theta_grad.view(), z_grad.view_mut());
        for i in 0..layout.n_persons {
            for d in 0..2 {
                grad[layout.z_index(i, d)] = z_grad[[i, d]];
            }
        }
        if let (Some(eta), Some(k)) = (self.lkj_shape, layout.rho_index()) {
            grad[k] = u_grad + lkj_log_density_grad(theta[k], eta);
        }

        // (c) weights.
        let wr = layout.weight_range();
        self.weights.strategy().backprop(
            theta.slice(s![wr.clone()]),
            &fp.weights,
            &w_adjoint,
            grad.slice_mut(s![wr]),
        );
        grad
    }

    /// Total objective and optional gradient.
    pub fn evaluate(
        &self, theta: &Theta, data: &IrtData, want_grad: bool,
    ) -> IrtResult<(ObjectiveTerms, Option<Grad>)> {
        let fp = self.forward(theta, data)?;
        let grad = want_grad.then(|| self.gradient(theta, data, &fp));
        Ok((fp.terms, grad))
    }

    fn item_prior(&self, items: &ItemParams) -> f64 {
        let p = &self.priors;
        let tau: f64 = items.tau.iter().map(|&t| normal_ln_pdf(t, 0.0, p.tau_sd)).sum();
        let beta: f64 = items.beta1.iter().map(|&b| normal_ln_pdf(b, 0.0, p.beta1_sd)).sum();
        let delta: f64 =
            items.delta.iter().map(|&d| half_t_ln_pdf(d, p.delta_df, p.delta_scale).0).sum();
        tau + beta + delta
    }
}

fn check_term(term: &'static str, value: f64) -> IrtResult<()> {
    if value.is_finite() { Ok(()) } else { Err(IrtError::NonFiniteTerm { term, value }) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irt::core::{
        options::DeltaSharing,
        weights::{IndependentBeta, SimplexDirichlet, SoftClip},
    };
    use crate::irt::simulate::{SimulationConfig, simulate};
    use approx::assert_relative_eq;
    use statrs::distribution::{Continuous, StudentsT};

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - The half-t prior normalizer against statrs.
    // - The full analytic gradient against finite differences, for every
    //   weight variant and both ability/δ configurations.
    // - Non-finite term reporting.
    // -------------------------------------------------------------------------

    fn small_data() -> IrtData {
        let cfg = SimulationConfig { n_persons: 6, n_items: 4, seed: 11, ..Default::default() };
        simulate(&cfg).expect("valid simulation").data
    }

    fn test_theta(layout: &ParamLayout) -> Theta {
        (0..layout.len()).map(|k| 0.35 * ((k * 7 % 11) as f64 / 11.0 - 0.5) * 2.0).collect()
    }

    #[test]
    // Purpose
    // -------
    // The half-t density is twice the Student-t density on δ > 0.
    //
    // Given
    // -----
    // - ν = 3, s = 1.4, δ ∈ {0.1, 1, 4}.
    //
    // Expect
    // ------
    // - exp(value) = 2·t_pdf(δ) within 1e-12.
    fn half_t_matches_students_t() {
        // Arrange
        let t = StudentsT::new(0.0, 1.4, 3.0).expect("valid Student-t");
        for &d in &[0.1, 1.0, 4.0] {
            // Act
            let (value, _) = half_t_ln_pdf(d, 3.0, 1.4);

            // Assert
            assert_relative_eq!(value.exp(), 2.0 * t.pdf(d), epsilon = 1e-12);
        }
    }

    #[test]
    // Purpose
    // -------
    // The analytic gradient is the derivative of the total objective.
    //
    // Given
    // -----
    // - Six simulated persons, four items; every weight variant with
    //   correlated abilities and per-dimension δ, plus independent abilities
    //   with shared δ.
    //
    // Expect
    // ------
    // - Every coordinate agrees with a central difference to 1e-4 relative.
    fn gradient_matches_finite_differences() {
        // Arrange
        let data = small_data();
        let variants = vec![
            JointOptions::default(),
            JointOptions {
                weights: WeightModel::SimplexDirichlet(SimplexDirichlet { concentration: 2.0 }),
                ..Default::default()
            },
            JointOptions {
                weights: WeightModel::IndependentBeta(IndependentBeta::default()),
                ..Default::default()
            },
            JointOptions {
                weights: WeightModel::SoftClip(SoftClip::default()),
                ..Default::default()
            },
            JointOptions {
                ability: AbilityModel::Independent,
                delta_sharing: DeltaSharing::Shared,
                weights: WeightModel::Fixed,
                ..Default::default()
            },
        ];
        for options in variants {
            let obj = JointObjective::new(&data, &options);
            let theta = test_theta(&obj.layout);
            let total = |th: &Theta| obj.forward(th, &data).expect("finite terms").terms.total();

            // Act
            let (_, grad) = obj.evaluate(&theta, &data, true).expect("finite terms");
            let grad = grad.expect("gradient requested");

            // Assert
            let h = 1e-6;
            for k in 0..theta.len() {
                let (mut up, mut dn) = (theta.clone(), theta.clone());
                up[k] += h;
                dn[k] -= h;
                let fd = (total(&up) - total(&dn)) / (2.0 * h);
                assert_relative_eq!(grad[k], fd, epsilon = 1e-4, max_relative = 1e-4);
            }
        }
    }

    #[test]
    // Purpose
    // -------
    // A non-finite parameter vector is rejected before evaluation, while an
    // extreme but finite one still yields finite terms thanks to the floors.
    //
    // Given
    // -----
    // - θ with a NaN entry; θ with τ₀ = 1e6.
    //
    // Expect
    // ------
    // - `InvalidThetaInput { index: 0 }` for NaN; every term finite for the
    //   extreme τ, with a very negative item prior.
    fn non_finite_inputs_are_reported() {
        // Arrange
        let data = small_data();
        let obj = JointObjective::new(&data, &JointOptions::default());
        let mut theta = test_theta(&obj.layout);
        theta[0] = f64::NAN;
        let mut big = test_theta(&obj.layout);
        big[0] = 1e6;

        // Act
        let nan = obj.evaluate(&theta, &data, false);
        let huge = obj.evaluate(&big, &data, false).expect("finite terms");

        // Assert
        assert!(matches!(nan, Err(IrtError::InvalidThetaInput { index: 0, .. })));
        assert!(huge.0.named().iter().all(|(_, v)| v.is_finite()));
        assert!(huge.0.item_prior < -1e9);
        assert!(huge.1.is_none());
    }

    #[test]
    // Purpose
    // -------
    // The term breakdown prints every term and flags a skipped penalty.
    //
    // Given
    // -----
    // - Hand-built terms with `skew_applied = false`.
    //
    // Expect
    // ------
    // - The text names each term and mentions the skip; `None` prints a
    //   placeholder.
    fn terms_display_names_each_term() {
        // Arrange
        let terms = ObjectiveTerms { likelihood: -12.5, ..Default::default() };

        // Act
        let text = describe_terms(&Some(terms));

        // Assert
        for (name, _) in terms.named() {
            assert!(text.contains(name));
        }
        assert!(text.contains("skipped"));
        assert_eq!(describe_terms(&None), "none recorded");
    }
}
