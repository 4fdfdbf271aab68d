//! Graded response likelihood.
//!
//! Purpose
//! -------
//! Evaluate ordered-category response probabilities for every observation
//! and provide the partial derivatives the joint objective needs for its
//! analytic gradient.
//!
//! Key behaviors
//! -------------
//! - Linear predictor `lp = β1_j·age_i + θ_i[dim_j]`; every logistic
//!   argument has the form `τ_j + k·δ − lp`, so raising ability moves mass
//!   toward higher categories.
//! - `P(0) = σ(τ − lp)`, `P(K−1) = 1 − σ(τ + (K−2)δ − lp)`, and interior
//!   categories take the difference of adjacent cumulative terms.
//! - Log-probabilities use the soft floor `ln(P + 1e-10)`.
//! - Per-person log-likelihoods are an explicit grouped reduction over the
//!   person index of [`IrtData`]; there is no cross-person accumulation.
//!
//! Invariants & assumptions
//! ------------------------
//! - `δ > 0`, so the cumulative thresholds are strictly increasing and every
//!   category probability is non-negative.
//! - The only branches are on the observed category, a data index.
use crate::{
    irt::core::{data::IrtData, params::ItemParams},
    optimization::numerical_stability::{LOG_PROB_FLOOR, safe_log, safe_logistic},
};
use ndarray::{Array1, ArrayView2, ArrayViewMut2};

/// Probability of one category and the logistic slopes at its two bounds.
///
/// `d_upper = σ'(x_k)` at the upper argument `x_k = τ + kδ − lp` (zero for
/// the top category) and `d_lower = σ'(x_{k−1})` (zero for category 0).
/// Hence `∂P/∂τ = d_upper − d_lower`, `∂P/∂lp = −∂P/∂τ`, and
/// `∂P/∂δ = k·d_upper − (k−1)·d_lower`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryProb {
    pub prob: f64,
    pub d_upper: f64,
    pub d_lower: f64,
}

#[inline]
fn sigmoid_and_slope(x: f64) -> (f64, f64) {
    let s = safe_logistic(x);
    (s, s * (1.0 - s))
}

/// Probability of category `k` out of `n_cat` for one item at predictor `lp`.
pub fn category_prob(k: usize, n_cat: usize, tau: f64, delta: f64, lp: f64) -> CategoryProb {
    let (upper, d_upper) = if k + 1 < n_cat {
        sigmoid_and_slope(tau + k as f64 * delta - lp)
    } else {
        (1.0, 0.0)
    };
    let (lower, d_lower) =
        if k > 0 { sigmoid_and_slope(tau + (k as f64 - 1.0) * delta - lp) } else { (0.0, 0.0) };
    CategoryProb { prob: upper - lower, d_upper, d_lower }
}

/// All `n_cat` category probabilities for one item at predictor `lp`.
pub fn category_probs(n_cat: usize, tau: f64, delta: f64, lp: f64) -> Vec<f64> {
    (0..n_cat).map(|k| category_prob(k, n_cat, tau, delta, lp).prob).collect()
}

/// Gradient with respect to natural item parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemGradient {
    pub tau: Array1<f64>,
    pub beta1: Array1<f64>,
    pub delta: Array1<f64>,
}

impl ItemGradient {
    pub fn zeros(n_items: usize, n_delta: usize) -> Self {
        Self {
            tau: Array1::zeros(n_items),
            beta1: Array1::zeros(n_items),
            delta: Array1::zeros(n_delta),
        }
    }
}

/// `GrmEvaluation` — per-observation log-probabilities and score factors.
///
/// For observation `o` with probability `P_o`:
/// - `logp[o] = ln(P_o + ε)`
/// - `score_tau[o] = ∂logp/∂τ = (d_upper − d_lower)/(P_o + ε)`; the score
///   for `lp` is its negative.
/// - `score_delta[o] = ∂logp/∂δ`.
#[derive(Debug, Clone, PartialEq)]
pub struct GrmEvaluation {
    pub logp: Array1<f64>,
    score_tau: Vec<f64>,
    score_delta: Vec<f64>,
}

impl GrmEvaluation {
    /// Evaluate every observation at the given item parameters and the
    /// `N × 2` ability matrix `theta`.
    pub fn evaluate(data: &IrtData, items: &ItemParams, theta: ArrayView2<f64>) -> Self {
        let n = data.n_obs();
        let mut logp = Array1::zeros(n);
        let mut score_tau = vec![0.0; n];
        let mut score_delta = vec![0.0; n];
        for (o, obs) in data.observations().iter().enumerate() {
            let meta = data.item(obs.item);
            let lp = items.beta1[obs.item] * data.age(obs.person)
                + theta[[obs.person, meta.dimension.index()]];
            let cp = category_prob(
                obs.response,
                meta.categories,
                items.tau[obs.item],
                items.delta_for(meta.dimension),
                lp,
            );
            let denom = cp.prob + LOG_PROB_FLOOR;
            let k = obs.response as f64;
            logp[o] = safe_log(cp.prob);
            score_tau[o] = (cp.d_upper - cp.d_lower) / denom;
            score_delta[o] = (k * cp.d_upper - (k - 1.0) * cp.d_lower) / denom;
        }
        Self { logp, score_tau, score_delta }
    }

    /// `ll_i = Σ_{o ∈ person i} logp[o]` for every person.
    pub fn person_loglik(&self, data: &IrtData) -> Array1<f64> {
        (0..data.n_persons()).map(|i| self.logp.slice(ndarray::s![data.person_range(i)]).sum()).collect()
    }

    /// Pull per-observation adjoints `∂F/∂logp[o]` back to item parameters
    /// and abilities. Both outputs are accumulated into.
    pub fn backprop(
        &self, data: &IrtData, items: &ItemParams, obs_adjoint: &Array1<f64>,
        grad: &mut ItemGradient, mut theta_grad: ArrayViewMut2<f64>,
    ) {
        for (o, obs) in data.observations().iter().enumerate() {
            let g = obs_adjoint[o];
            if g == 0.0 {
                continue;
            }
            let meta = data.item(obs.item);
            let g_tau = g * self.score_tau[o];
            grad.tau[obs.item] += g_tau;
            grad.beta1[obs.item] -= g_tau * data.age(obs.person);
            grad.delta[items.delta_index(meta.dimension)] += g * self.score_delta[o];
            theta_grad[[obs.person, meta.dimension.index()]] -= g_tau;
        }
    }
}
