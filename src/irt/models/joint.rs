//! Joint model: weighted two-dimensional GRM fitted by posterior mode.
//!
//! This module wires [`JointObjective`] to the `LogLikelihood` trait so the
//! L-BFGS driver in `optimization::loglik_optimizer` can maximize it, and
//! turns the optimizer outcome into a [`JointFit`].
//!
//! Key ideas:
//! - The parameter vector lives in unconstrained space (see
//!   `irt::core::params`); `value` and `grad` evaluate the full joint
//!   objective with its analytic gradient.
//! - Every successful evaluation records its term breakdown. When a term
//!   goes non-finite mid-run, the failure carries the last finite breakdown.
//! - A run that stops without convergence (iteration cap, timeout) is an
//!   error; a partial estimate is never returned.
//! - For weight strategies with an exclusion mode, outlying persons are
//!   re-fitted from that mode after the first run and the higher optimum
//!   is kept.
use crate::{
    irt::{
        core::{
            ability::AbilityTransform,
            data::IrtData,
            objective::{JointObjective, ObjectiveTerms},
            options::JointOptions,
            params::{ItemParams, ParamLayout},
        },
        errors::{IrtError, IrtResult},
        models::diagnostics::{FitDiagnostics, PersonStats, diagnose},
    },
    optimization::{
        errors::{OptError, OptResult},
        loglik_optimizer::{
            Cost, Grad, LogLikelihood, MLEOptions, OptimOutcome, Theta, maximize,
        },
        numerical_stability::safe_softplus_inv,
    },
};
use log::{debug, info, warn};
use ndarray::{Array1, Array2, s};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

/// Optimizer status of a completed fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitStatus {
    pub converged: bool,
    pub status: String,
    pub iterations: usize,
    /// Objective value at the optimum.
    pub objective: f64,
    pub grad_norm: Option<f64>,
}

/// Fitted joint model. Read-only after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct JointFit {
    pub items: ItemParams,
    /// `None` for independent abilities.
    pub rho: Option<f64>,
    /// `N × 2` abilities.
    pub abilities: Array2<f64>,
    pub weights: Array1<f64>,
    pub terms: ObjectiveTerms,
    pub diagnostics: FitDiagnostics,
    pub persons: Vec<PersonStats>,
    pub status: FitStatus,
    /// Optimum in unconstrained space, reused for warm starts.
    pub theta_hat: Theta,
    pub layout: ParamLayout,
}

impl JointFit {
    pub fn transform(&self) -> AbilityTransform {
        AbilityTransform::from_rho(self.rho)
    }
}

/// Joint IRT model with authenticity weights.
///
/// Encapsulates the validated options, the objective for one dataset
/// shape, and the optimizer settings. After [`JointModel::fit`], the
/// result is available from [`JointModel::fitted`].
///
/// # Notes
/// - Not `Sync`: the last finite term breakdown is tracked through a
///   `RefCell`. Parallel callers build one model per task.
#[derive(Debug)]
pub struct JointModel {
    pub options: JointOptions,
    objective: JointObjective,
    mle_opts: MLEOptions,
    last_finite: RefCell<Option<ObjectiveTerms>>,
    fitted: Option<JointFit>,
}

impl JointModel {
    /// Construct a model for `data` under `options`.
    ///
    /// # Errors
    /// - `IrtError::InvalidHyperparameter` / `IrtError::Optimization` from
    ///   [`JointOptions::validate`].
    pub fn new(data: &IrtData, options: JointOptions) -> IrtResult<Self> {
        options.validate()?;
        let mle_opts = options.optimizer.to_mle_options()?;
        let objective = JointObjective::new(data, &options);
        Ok(Self { options, objective, mle_opts, last_finite: RefCell::new(None), fitted: None })
    }

    pub fn layout(&self) -> &ParamLayout {
        &self.objective.layout
    }

    pub fn objective(&self) -> &JointObjective {
        &self.objective
    }

    /// Data-driven starting point.
    ///
    /// - `τ_j = logit((n0_j + 0.5)/(n_j + 1))` from the share of category-0
    ///   responses, which matches `P(0) = σ(τ − lp)` at `lp = 0`.
    /// - `β1 = 0`, `δ = 1`, `z = 0`, `ρ = 0`, weights at the strategy's
    ///   inclusion state.
    pub fn initial_theta(&self, data: &IrtData) -> Theta {
        let layout = self.layout();
        let mut theta = Array1::zeros(layout.len());
        let mut zeros = vec![0.0_f64; layout.n_items];
        let mut totals = vec![0.0_f64; layout.n_items];
        for o in data.observations() {
            totals[o.item] += 1.0;
            if o.response == 0 {
                zeros[o.item] += 1.0;
            }
        }
        for j in 0..layout.n_items {
            let share = (zeros[j] + 0.5) / (totals[j] + 1.0);
            theta[j] = (share / (1.0 - share)).ln();
        }
        theta.slice_mut(s![layout.delta_range()]).fill(safe_softplus_inv(1.0));
        let init_w = self.options.weights.strategy().init_raw(layout.n_persons);
        theta.slice_mut(s![layout.weight_range()]).assign(&init_w);
        theta
    }

    /// Fit by maximizing the joint objective from `theta0` and cache the
    /// result.
    ///
    /// ## Steps
    /// 1. Check that `data` matches the model shape.
    /// 2. Run L-BFGS per `options.optimizer`, moving `theta0` into the
    ///    executor.
    /// 3. Reject non-converged runs with `IrtError::NotConverged`.
    /// 4. Re-run the forward pass at the optimum and derive diagnostics.
    ///
    /// ## Errors
    /// - `IrtError::Diverged` when a term became non-finite during the run.
    /// - `IrtError::NotConverged` when the run stopped early.
    /// - `IrtError::Optimization` for any other solver failure.
    pub fn fit(&mut self, theta0: Theta, data: &IrtData) -> IrtResult<()> {
        self.check_data(data)?;
        *self.last_finite.borrow_mut() = None;
        let layout = *self.layout();
        info!(
            "[JOINT FIT] Fitting {} persons x {} items ({} observations, {} parameters, weights: {})",
            layout.n_persons,
            layout.n_items,
            data.n_obs(),
            layout.len(),
            self.options.weights.strategy().name()
        );

        let outcome = self.run(theta0, data)?;
        let outcome = self.restart_exclusions(outcome, data)?;

        let fp = self.objective.forward(&outcome.theta_hat, data)?;
        let (diagnostics, persons) = diagnose(&fp, data);
        info!(
            "[JOINT FIT] Converged after {} iterations ({}): {}",
            outcome.iterations, outcome.status, fp.terms
        );
        info!(
            "[JOINT FIT] rho = {:?}, sum(w) = {:.3}, w < 0.1: {}, w > 0.9: {}, skew z = {:.3}",
            diagnostics.rho,
            diagnostics.sum_weights,
            diagnostics.n_low_weight,
            diagnostics.n_high_weight,
            diagnostics.skewness.z
        );
        debug!("[JOINT FIT] Evaluations: {:?}", outcome.fn_evals);

        self.fitted = Some(JointFit {
            rho: fp.transform.rho(),
            items: fp.items,
            abilities: fp.abilities,
            weights: fp.weights,
            terms: fp.terms,
            diagnostics,
            persons,
            status: FitStatus {
                converged: outcome.converged,
                status: outcome.status,
                iterations: outcome.iterations,
                objective: outcome.value,
                grad_norm: outcome.grad_norm,
            },
            theta_hat: outcome.theta_hat,
            layout,
        });
        Ok(())
    }

    /// One L-BFGS run from `theta0`; only a converged run is returned.
    fn run(&self, theta0: Theta, data: &IrtData) -> IrtResult<OptimOutcome> {
        let outcome = match maximize(self, theta0, data, &self.mle_opts) {
            Ok(outcome) => outcome,
            Err(err) => {
                let failure = self.map_failure(err);
                warn!("[JOINT FIT] {failure}");
                return Err(failure);
            }
        };
        if !outcome.converged {
            let failure = IrtError::NotConverged {
                status: outcome.status,
                iterations: outcome.iterations,
                last_finite: self.last_finite_terms(),
            };
            warn!("[JOINT FIT] {failure}");
            return Err(failure);
        }
        Ok(outcome)
    }

    /// Re-fit outlying persons from the exclusion state.
    ///
    /// Starting at a weight's inclusion mode leaves the logistic flat, so a
    /// run from the inclusion state rarely crosses into the exclusion mode
    /// even when that mode has the higher objective. Each candidate (see
    /// [`exclusion_candidates`]) still in the inclusion state restarts from
    /// the current optimum with only its raw weight moved to the exclusion
    /// mode. A restart that fails or does not raise the objective ends the
    /// pass and the current optimum stands.
    fn restart_exclusions(&self, best: OptimOutcome, data: &IrtData) -> IrtResult<OptimOutcome> {
        let restarts = self.options.restarts;
        let Some(excluded_raw) = self.options.weights.strategy().exclusion_raw() else {
            return Ok(best);
        };
        if restarts.max_restarts == 0 {
            return Ok(best);
        }
        let weight_start = self.layout().weight_range().start;
        let fp = self.objective.forward(&best.theta_hat, data)?;
        let candidates = exclusion_candidates(&fp.skewness.person_mean, restarts.outlier_cutoff);

        let mut best = best;
        for person in candidates
            .into_iter()
            .filter(|&i| fp.weights[i] >= 0.5)
            .take(restarts.max_restarts)
        {
            let mut theta0 = best.theta_hat.clone();
            theta0[weight_start + person] = excluded_raw;
            match self.run(theta0, data) {
                Ok(trial) if trial.value > best.value => {
                    info!(
                        "[JOINT FIT] Exclusion restart for person {} raised the objective {:.4} -> {:.4}",
                        person + 1,
                        best.value,
                        trial.value
                    );
                    best = trial;
                }
                Ok(trial) => {
                    debug!(
                        "[JOINT FIT] Exclusion restart for person {} rejected ({:.4} <= {:.4})",
                        person + 1,
                        trial.value,
                        best.value
                    );
                    break;
                }
                Err(err) => {
                    debug!("[JOINT FIT] Exclusion restart for person {} failed: {err}", person + 1);
                    break;
                }
            }
        }
        Ok(best)
    }

    /// Fit from [`JointModel::initial_theta`].
    pub fn fit_default(&mut self, data: &IrtData) -> IrtResult<()> {
        let theta0 = self.initial_theta(data);
        self.fit(theta0, data)
    }

    /// The cached fit.
    ///
    /// # Errors
    /// - `IrtError::ModelNotFitted` before a successful [`JointModel::fit`].
    pub fn fitted(&self) -> IrtResult<&JointFit> {
        self.fitted.as_ref().ok_or(IrtError::ModelNotFitted)
    }

    pub fn into_fit(self) -> IrtResult<JointFit> {
        self.fitted.ok_or(IrtError::ModelNotFitted)
    }

    /// Term breakdown of the most recent finite evaluation.
    pub fn last_finite_terms(&self) -> Option<ObjectiveTerms> {
        *self.last_finite.borrow()
    }

    fn check_data(&self, data: &IrtData) -> IrtResult<()> {
        let layout = self.layout();
        if data.n_persons() != layout.n_persons {
            return Err(IrtError::LengthMismatch {
                field: "persons",
                expected: layout.n_persons,
                actual: data.n_persons(),
            });
        }
        if data.n_items() != layout.n_items {
            return Err(IrtError::LengthMismatch {
                field: "items",
                expected: layout.n_items,
                actual: data.n_items(),
            });
        }
        Ok(())
    }

    fn map_failure(&self, err: OptError) -> IrtError {
        let last_finite = self.last_finite_terms();
        match err {
            OptError::NonFiniteObjectiveTerm { term, value } => {
                IrtError::Diverged { term, value, last_finite }
            }
            other => IrtError::Optimization(other),
        }
    }
}

/// Persons whose mean log-probability lies more than `cutoff` robust
/// standard deviations below the median, most outlying first.
///
/// The spread is `1.4826·MAD`, floored at `MIN_SPREAD` so a sample of
/// identical persons still singles out one that differs.
pub(crate) fn exclusion_candidates(person_mean: &Array1<f64>, cutoff: f64) -> Vec<usize> {
    const MIN_SPREAD: f64 = 1e-6;
    if person_mean.is_empty() {
        return Vec::new();
    }
    let median = |mut v: Vec<f64>| {
        v.sort_by(f64::total_cmp);
        let mid = v.len() / 2;
        if v.len() % 2 == 0 { 0.5 * (v[mid - 1] + v[mid]) } else { v[mid] }
    };
    let center = median(person_mean.to_vec());
    let mad = median(person_mean.iter().map(|&m| (m - center).abs()).collect());
    let spread = 1.4826 * mad + MIN_SPREAD;

    let mut scored: Vec<(usize, f64)> = person_mean
        .iter()
        .enumerate()
        .map(|(i, &m)| (i, (m - center) / spread))
        .filter(|&(_, score)| score < -cutoff)
        .collect();
    scored.sort_by(|a, b| a.1.total_cmp(&b.1));
    scored.into_iter().map(|(i, _)| i).collect()
}

impl LogLikelihood for JointModel {
    type Data = IrtData;

    fn value(&self, theta: &Theta, data: &Self::Data) -> OptResult<Cost> {
        let (terms, _) = self.objective.evaluate(theta, data, false)?;
        *self.last_finite.borrow_mut() = Some(terms);
        Ok(terms.total())
    }

    fn check(&self, theta: &Theta, data: &Self::Data) -> OptResult<()> {
        self.check_data(data)?;
        self.layout().check(theta)?;
        Ok(())
    }

    fn grad(&self, theta: &Theta, data: &Self::Data) -> OptResult<Grad> {
        let (terms, grad) = self.objective.evaluate(theta, data, true)?;
        *self.last_finite.borrow_mut() = Some(terms);
        grad.ok_or(OptError::GradientNotImplemented)
    }
}
