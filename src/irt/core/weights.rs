//! Participant weight sub-model.
//!
//! Purpose
//! -------
//! Map unconstrained raw parameters to per-person authenticity weights
//! `w_i` and supply their log-prior, behind one polymorphic interface,
//! [`WeightStrategy`]. The variant is chosen by configuration
//! ([`WeightModel`]); every variant exposes final weights that the joint
//! objective consumes identically.
//!
//! Key behaviors
//! -------------
//! - `fixed`: no parameters, `w_i = 1` (unweighted baseline).
//! - `simplex_dirichlet`: `w = N·softmax(u)`, Dirichlet(λ) on the simplex.
//! - `independent_beta`: `w = 0.1 + 0.9·σ(u)`, Beta(α, β) density at `w`.
//! - `logit_mixture`: `w = σ(ℓ)`, 50/50 Normal mixture on `ℓ`, and a
//!   Normal(N, σ_sum) spring on `Σw`.
//! - `soft_clip`: `r = softplus(u)`, `w = r − softplus(k(r − c))/k` never
//!   exceeds the ceiling `c`; Normal(N, σ_sum) spring on `Σw` only.
//!
//! Invariants & assumptions
//! ------------------------
//! - Every transform is smooth in the raw parameters, so the joint
//!   objective stays differentiable.
//! - `backprop` adds both the pull-back of the weight adjoint and the
//!   gradient of the log-prior; callers never differentiate the prior
//!   separately.
//!
//! Conventions
//! -----------
//! - Priors are evaluated in the optimizer's coordinates without Jacobian
//!   adjustments (posterior-mode estimation).
use crate::{
    irt::{
        core::options::require_positive,
        errors::{IrtError, IrtResult},
    },
    optimization::numerical_stability::{
        log_sum_exp2, normal_ln_pdf, safe_logistic, safe_softplus, safe_softplus_inv,
    },
};
use ndarray::{Array1, ArrayView1, ArrayViewMut1};
use serde::{Deserialize, Serialize};
use statrs::function::{beta::ln_beta, gamma::ln_gamma};

/// Lower bound of the independent-Beta weight range.
pub const BETA_WEIGHT_FLOOR: f64 = 0.1;

/// Raw → weight transform plus prior for one weight variant.
pub trait WeightStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Number of raw parameters for `n_persons` persons.
    fn n_params(&self, n_persons: usize) -> usize;

    /// Raw starting values.
    fn init_raw(&self, n_persons: usize) -> Array1<f64>;

    /// Raw value that puts one person in the exclusion state, for
    /// strategies with one raw parameter per person and a separate
    /// exclusion mode. `None` disables exclusion restarts.
    fn exclusion_raw(&self) -> Option<f64> {
        None
    }

    /// Final weights.
    fn weights(&self, raw: ArrayView1<f64>, n_persons: usize) -> Array1<f64>;

    /// Log-prior (including any sum regularization).
    fn log_prior(&self, raw: ArrayView1<f64>, w: &Array1<f64>) -> f64;

    /// Accumulate `∂F/∂raw` into `raw_grad`, given `w_adjoint = ∂F/∂w` for
    /// the non-prior part of `F`, plus the gradient of [`Self::log_prior`].
    fn backprop(
        &self, raw: ArrayView1<f64>, w: &Array1<f64>, w_adjoint: &Array1<f64>,
        raw_grad: ArrayViewMut1<f64>,
    );

    fn validate(&self) -> IrtResult<()>;
}

// ---- Shared pieces ----

/// Normal(N, σ) log density of `Σw` and its derivative with respect to `Σw`.
fn sum_spring(w: &Array1<f64>, sigma: f64) -> (f64, f64) {
    let n = w.len() as f64;
    let s = w.sum();
    (normal_ln_pdf(s, n, sigma), -(s - n) / (sigma * sigma))
}

fn validate_sum_sigma(sum_sigma: f64) -> IrtResult<()> {
    require_positive("weights.sum_sigma", sum_sigma)
}

// ---- fixed ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FixedWeights;

impl WeightStrategy for FixedWeights {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn n_params(&self, _n_persons: usize) -> usize {
        0
    }

    fn init_raw(&self, _n_persons: usize) -> Array1<f64> {
        Array1::zeros(0)
    }

    fn weights(&self, _raw: ArrayView1<f64>, n_persons: usize) -> Array1<f64> {
        Array1::ones(n_persons)
    }

    fn log_prior(&self, _raw: ArrayView1<f64>, _w: &Array1<f64>) -> f64 {
        0.0
    }

    fn backprop(
        &self, _raw: ArrayView1<f64>, _w: &Array1<f64>, _w_adjoint: &Array1<f64>,
        _raw_grad: ArrayViewMut1<f64>,
    ) {
    }

    fn validate(&self) -> IrtResult<()> {
        Ok(())
    }
}

// ---- simplex_dirichlet ----

/// `w = N·softmax(u)` with a Dirichlet(`concentration`) prior on the simplex.
///
/// `Σw = N` holds exactly. The softmax is invariant to adding a constant to
/// every `u_i`; the prior does not pin that direction, which L-BFGS
/// tolerates because the objective is flat along it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplexDirichlet {
    pub concentration: f64,
}

impl Default for SimplexDirichlet {
    fn default() -> Self {
        Self { concentration: 1.0 }
    }
}

fn log_softmax_normalizer(raw: ArrayView1<f64>) -> f64 {
    let m = raw.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    m + raw.iter().map(|&u| (u - m).exp()).sum::<f64>().ln()
}

impl WeightStrategy for SimplexDirichlet {
    fn name(&self) -> &'static str {
        "simplex_dirichlet"
    }

    fn n_params(&self, n_persons: usize) -> usize {
        n_persons
    }

    fn init_raw(&self, n_persons: usize) -> Array1<f64> {
        Array1::zeros(n_persons)
    }

    fn weights(&self, raw: ArrayView1<f64>, n_persons: usize) -> Array1<f64> {
        let lse = log_softmax_normalizer(raw);
        raw.mapv(|u| n_persons as f64 * (u - lse).exp())
    }

    fn log_prior(&self, raw: ArrayView1<f64>, _w: &Array1<f64>) -> f64 {
        let lam = self.concentration;
        let n = raw.len() as f64;
        let lse = log_softmax_normalizer(raw);
        let sum_log_s: f64 = raw.iter().map(|&u| u - lse).sum();
        (lam - 1.0) * sum_log_s + ln_gamma(n * lam) - n * ln_gamma(lam)
    }

    fn backprop(
        &self, raw: ArrayView1<f64>, w: &Array1<f64>, w_adjoint: &Array1<f64>,
        mut raw_grad: ArrayViewMut1<f64>,
    ) {
        let n = raw.len() as f64;
        let lam = self.concentration;
        // s = w/N and ∂F/∂s = N·∂F/∂w, so Σ s·∂F/∂s = Σ w·∂F/∂w.
        let inner: f64 = w.iter().zip(w_adjoint.iter()).map(|(wi, gi)| wi * gi).sum();
        for j in 0..raw.len() {
            let s = w[j] / n;
            raw_grad[j] += s * (n * w_adjoint[j] - inner) + (lam - 1.0) * (1.0 - n * s);
        }
    }

    fn validate(&self) -> IrtResult<()> {
        require_positive("weights.concentration", self.concentration)
    }
}

// ---- independent_beta ----

/// `w = 0.1 + 0.9·σ(u)` with a Beta(`alpha`, `beta`) density evaluated at `w`.
///
/// There is no sum constraint; with a mean-heavy prior (the default
/// α = 10, β = 1) the weights can drift together toward the floor when the
/// likelihood dominates, so `Σw` should be read alongside the weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndependentBeta {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for IndependentBeta {
    fn default() -> Self {
        Self { alpha: 10.0, beta: 1.0 }
    }
}

impl IndependentBeta {
    /// `ln(1 − w) = ln(1 − floor) − softplus(u)`.
    #[inline]
    fn log_one_minus_w(u: f64) -> f64 {
        (1.0 - BETA_WEIGHT_FLOOR).ln() - safe_softplus(u)
    }
}

impl WeightStrategy for IndependentBeta {
    fn name(&self) -> &'static str {
        "independent_beta"
    }

    fn n_params(&self, n_persons: usize) -> usize {
        n_persons
    }

    fn init_raw(&self, n_persons: usize) -> Array1<f64> {
        let mean = self.alpha / (self.alpha + self.beta);
        let frac = ((mean - BETA_WEIGHT_FLOOR) / (1.0 - BETA_WEIGHT_FLOOR)).clamp(0.01, 0.99);
        Array1::from_elem(n_persons, (frac / (1.0 - frac)).ln())
    }

    fn weights(&self, raw: ArrayView1<f64>, _n_persons: usize) -> Array1<f64> {
        raw.mapv(|u| BETA_WEIGHT_FLOOR + (1.0 - BETA_WEIGHT_FLOOR) * safe_logistic(u))
    }

    fn log_prior(&self, raw: ArrayView1<f64>, w: &Array1<f64>) -> f64 {
        let norm = ln_beta(self.alpha, self.beta);
        raw.iter()
            .zip(w.iter())
            .map(|(&u, &wi)| {
                (self.alpha - 1.0) * wi.ln() + (self.beta - 1.0) * Self::log_one_minus_w(u) - norm
            })
            .sum()
    }

    fn backprop(
        &self, raw: ArrayView1<f64>, w: &Array1<f64>, w_adjoint: &Array1<f64>,
        mut raw_grad: ArrayViewMut1<f64>,
    ) {
        for j in 0..raw.len() {
            let s = safe_logistic(raw[j]);
            let dw_du = (1.0 - BETA_WEIGHT_FLOOR) * s * (1.0 - s);
            let g_w = w_adjoint[j] + (self.alpha - 1.0) / w[j];
            raw_grad[j] += g_w * dw_du - (self.beta - 1.0) * s;
        }
    }

    fn validate(&self) -> IrtResult<()> {
        require_positive("weights.alpha", self.alpha)?;
        require_positive("weights.beta", self.beta)
    }
}

// ---- logit_mixture ----

/// `w = σ(ℓ)` with `ℓ ~ ½N(low_mean, scale) + ½N(high_mean, scale)` and a
/// Normal(N, `sum_sigma`) spring on `Σw`.
///
/// The two mixture modes are the exclusion and inclusion states; the spring
/// keeps the total weight near `N`, so smaller `sum_sigma` makes wholesale
/// down-weighting more expensive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogitMixture {
    pub low_mean: f64,
    pub high_mean: f64,
    pub scale: f64,
    pub sum_sigma: f64,
}

impl Default for LogitMixture {
    fn default() -> Self {
        Self { low_mean: -4.0, high_mean: 4.0, scale: 2.0, sum_sigma: 0.5 }
    }
}

impl LogitMixture {
    /// Mixture log density of one logit and its derivative.
    fn mixture(&self, l: f64) -> (f64, f64) {
        let half = std::f64::consts::LN_2;
        let a = normal_ln_pdf(l, self.low_mean, self.scale) - half;
        let b = normal_ln_pdf(l, self.high_mean, self.scale) - half;
        let lse = log_sum_exp2(a, b);
        let (r_low, r_high) = ((a - lse).exp(), (b - lse).exp());
        let var = self.scale * self.scale;
        let d = -(r_low * (l - self.low_mean) + r_high * (l - self.high_mean)) / var;
        (lse, d)
    }
}

impl WeightStrategy for LogitMixture {
    fn name(&self) -> &'static str {
        "logit_mixture"
    }

    fn n_params(&self, n_persons: usize) -> usize {
        n_persons
    }

    fn init_raw(&self, n_persons: usize) -> Array1<f64> {
        Array1::from_elem(n_persons, self.high_mean)
    }

    fn exclusion_raw(&self) -> Option<f64> {
        Some(self.low_mean)
    }

    fn weights(&self, raw: ArrayView1<f64>, _n_persons: usize) -> Array1<f64> {
        raw.mapv(safe_logistic)
    }

    fn log_prior(&self, raw: ArrayView1<f64>, w: &Array1<f64>) -> f64 {
        let mix: f64 = raw.iter().map(|&l| self.mixture(l).0).sum();
        mix + sum_spring(w, self.sum_sigma).0
    }

    fn backprop(
        &self, raw: ArrayView1<f64>, w: &Array1<f64>, w_adjoint: &Array1<f64>,
        mut raw_grad: ArrayViewMut1<f64>,
    ) {
        let spring = sum_spring(w, self.sum_sigma).1;
        for j in 0..raw.len() {
            let dw_dl = w[j] * (1.0 - w[j]);
            raw_grad[j] += (w_adjoint[j] + spring) * dw_dl + self.mixture(raw[j]).1;
        }
    }

    fn validate(&self) -> IrtResult<()> {
        require_positive("weights.scale", self.scale)?;
        validate_sum_sigma(self.sum_sigma)?;
        let ordered = self.low_mean.is_finite() && self.high_mean.is_finite();
        if !ordered || self.low_mean >= self.high_mean {
            return Err(IrtError::InvalidHyperparameter {
                name: "weights.low_mean",
                value: self.low_mean,
                reason: "mixture means must be finite with low_mean < high_mean",
            });
        }
        Ok(())
    }
}

// ---- soft_clip ----

/// Positive raw weight `r = softplus(u)` (improper flat prior) squashed by
/// `w = r − softplus(k(r − c))/k`, which approaches the ceiling `c` from
/// below. A Normal(N, `sum_sigma`) prior acts on `Σw` only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftClip {
    pub ceiling: f64,
    pub sharpness: f64,
    pub sum_sigma: f64,
}

impl Default for SoftClip {
    fn default() -> Self {
        Self { ceiling: 1.0, sharpness: 10.0, sum_sigma: 0.5 }
    }
}

impl SoftClip {
    /// Starting raw weight, above the ceiling so `w` starts just below it.
    const INIT_RAW_WEIGHT: f64 = 1.5;

    #[inline]
    fn squash(&self, r: f64) -> f64 {
        r - safe_softplus(self.sharpness * (r - self.ceiling)) / self.sharpness
    }
}

impl WeightStrategy for SoftClip {
    fn name(&self) -> &'static str {
        "soft_clip"
    }

    fn n_params(&self, n_persons: usize) -> usize {
        n_persons
    }

    fn init_raw(&self, n_persons: usize) -> Array1<f64> {
        let r0 = Self::INIT_RAW_WEIGHT * self.ceiling;
        Array1::from_elem(n_persons, safe_softplus_inv(r0))
    }

    fn weights(&self, raw: ArrayView1<f64>, _n_persons: usize) -> Array1<f64> {
        raw.mapv(|u| self.squash(safe_softplus(u)))
    }

    fn log_prior(&self, _raw: ArrayView1<f64>, w: &Array1<f64>) -> f64 {
        sum_spring(w, self.sum_sigma).0
    }

    fn backprop(
        &self, raw: ArrayView1<f64>, w: &Array1<f64>, w_adjoint: &Array1<f64>,
        mut raw_grad: ArrayViewMut1<f64>,
    ) {
        let spring = sum_spring(w, self.sum_sigma).1;
        for j in 0..raw.len() {
            let r = safe_softplus(raw[j]);
            let dw_dr = 1.0 - safe_logistic(self.sharpness * (r - self.ceiling));
            let dr_du = safe_logistic(raw[j]);
            raw_grad[j] += (w_adjoint[j] + spring) * dw_dr * dr_du;
        }
    }

    fn validate(&self) -> IrtResult<()> {
        require_positive("weights.ceiling", self.ceiling)?;
        require_positive("weights.sharpness", self.sharpness)?;
        validate_sum_sigma(self.sum_sigma)
    }
}

// ---- configuration ----

/// Weight-variant selection, tagged by `kind` in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WeightModel {
    Fixed,
    SimplexDirichlet(SimplexDirichlet),
    IndependentBeta(IndependentBeta),
    LogitMixture(LogitMixture),
    SoftClip(SoftClip),
}

impl Default for WeightModel {
    fn default() -> Self {
        WeightModel::LogitMixture(LogitMixture::default())
    }
}

impl WeightModel {
    pub fn strategy(&self) -> &dyn WeightStrategy {
        match self {
            WeightModel::Fixed => &FixedWeights,
            WeightModel::SimplexDirichlet(s) => s,
            WeightModel::IndependentBeta(s) => s,
            WeightModel::LogitMixture(s) => s,
            WeightModel::SoftClip(s) => s,
        }
    }

    pub fn validate(&self) -> IrtResult<()> {
        self.strategy().validate()
    }
}
