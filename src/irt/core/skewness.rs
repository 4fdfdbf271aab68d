//! Weighted-skewness diagnostic and penalty.
//!
//! Purpose
//! -------
//! Summarize how far each person's fit departs from the weighted sample by
//! a per-person t-statistic, measure the weighted skewness of those
//! statistics, and turn its standardized value into a penalty
//! `λ·ln φ(z)`. Authentic samples give roughly symmetric t-statistics;
//! a block of poorly fitting persons produces a long lower tail, which the
//! penalty discourages unless their weights drop.
//!
//! Key behaviors
//! -------------
//! - `μ = Σ wᵢMᵢ·meanᵢ / (Σ wᵢMᵢ + ε)` over per-person mean log-probabilities.
//! - `tᵢ = (meanᵢ − μ)/(sdᵢ/√Mᵢ)` with `sdᵢ = √(varᵢ + ε)`; `tᵢ = 0` when
//!   `Mᵢ ≤ 1`. Then `t̃ᵢ = c·tanh(tᵢ/c)`.
//! - Weighted moments of `t̃` normalized by `Σw + ε`;
//!   `skew = m3/(m2 + ε)^{3/2}`, Kish `N_eff = (Σw)²/(Σw² + ε)`,
//!   `z = skew·√((N_eff + ε)/6)`.
//! - When `z` is not finite the penalty is skipped for that evaluation and
//!   contributes neither value nor gradient.
//!
//! Invariants & assumptions
//! ------------------------
//! - Every person has at least one observation (guaranteed by [`IrtData`]).
//! - Every floor is additive (`safe_div`, `soft_clip`, `+ ε` under roots);
//!   nothing here branches on parameter values except the finiteness of `z`.
use crate::{
    irt::core::{data::IrtData, options::SkewnessOptions},
    optimization::numerical_stability::{
        SAFE_EPS, safe_div, soft_clip, soft_clip_deriv, std_normal_ln_pdf,
    },
};
use ndarray::Array1;
use statrs::distribution::{ContinuousCDF, Normal};

/// Forward-pass quantities of the skewness statistic.
#[derive(Debug, Clone, PartialEq)]
pub struct SkewnessStats {
    /// Weighted grand mean `μ`.
    pub mu: f64,
    pub person_sum: Array1<f64>,
    pub person_mean: Array1<f64>,
    pub person_sd: Array1<f64>,
    pub t: Array1<f64>,
    pub t_soft: Array1<f64>,
    pub m1: f64,
    pub m2: f64,
    pub m3: f64,
    pub skew: f64,
    pub n_eff: f64,
    pub z: f64,
    /// `λ·ln φ(z)`, or 0 when skipped.
    pub penalty: f64,
    /// `false` when `z` was not finite and the penalty was skipped.
    pub applied: bool,
}

impl SkewnessStats {
    /// Two-sided normal-approximation p-value of `z`.
    pub fn p_value(&self) -> Option<f64> {
        if !self.z.is_finite() {
            return None;
        }
        let normal = Normal::new(0.0, 1.0).ok()?;
        Some(2.0 * (1.0 - normal.cdf(self.z.abs())))
    }
}

/// The penalty with its configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkewnessPenalty {
    pub lambda: f64,
    pub clip: f64,
}

impl From<SkewnessOptions> for SkewnessPenalty {
    fn from(opts: SkewnessOptions) -> Self {
        Self { lambda: opts.lambda, clip: opts.clip }
    }
}

impl SkewnessPenalty {
    /// Forward pass.
    ///
    /// Parameters
    /// ----------
    /// - `data`: observations with the person index.
    /// - `logp`: per-observation log-probabilities, in storage order.
    /// - `w`: one weight per person.
    pub fn evaluate(&self, data: &IrtData, logp: &Array1<f64>, w: &Array1<f64>) -> SkewnessStats {
        let n = data.n_persons();
        let mut person_sum = Array1::zeros(n);
        let mut person_mean = Array1::zeros(n);
        let mut person_sd = Array1::zeros(n);
        for i in 0..n {
            let r = data.person_range(i);
            let m = r.len() as f64;
            let vals = logp.slice(ndarray::s![r]);
            let sum = vals.sum();
            let mean = sum / m;
            let var = if m > 1.0 {
                vals.iter().map(|&l| (l - mean) * (l - mean)).sum::<f64>() / (m - 1.0)
            } else {
                0.0
            };
            person_sum[i] = sum;
            person_mean[i] = mean;
            person_sd[i] = (var + SAFE_EPS).sqrt();
        }

        let weighted_count: f64 = (0..n).map(|i| w[i] * data.count(i) as f64).sum();
        let mu = safe_div(w.dot(&person_sum), weighted_count);

        let t: Array1<f64> = (0..n)
            .map(|i| {
                let m = data.count(i) as f64;
                if m > 1.0 { (person_mean[i] - mu) * m.sqrt() / person_sd[i] } else { 0.0 }
            })
            .collect();
        let t_soft = t.mapv(|v| soft_clip(v, self.clip));

        let w_sum = w.sum();
        let m1 = safe_div(w.dot(&t_soft), w_sum);
        let (mut s2, mut s3) = (0.0, 0.0);
        for i in 0..n {
            let d = t_soft[i] - m1;
            s2 += w[i] * d * d;
            s3 += w[i] * d * d * d;
        }
        let m2 = safe_div(s2, w_sum);
        let m3 = safe_div(s3, w_sum);
        let skew = m3 / (m2 + SAFE_EPS).powf(1.5);
        let n_eff = safe_div(w_sum * w_sum, w.dot(w));
        let z = skew * ((n_eff + SAFE_EPS) / 6.0).sqrt();
        let applied = z.is_finite();
        let penalty = if applied { self.lambda * std_normal_ln_pdf(z) } else { 0.0 };

        SkewnessStats {
            mu,
            person_sum,
            person_mean,
            person_sd,
            t,
            t_soft,
            m1,
            m2,
            m3,
            skew,
            n_eff,
            z,
            penalty,
            applied,
        }
    }

    /// Accumulate `∂penalty/∂logp` into `obs_adjoint` and `∂penalty/∂w`
    /// into `w_adjoint`. Does nothing when the penalty was skipped or
    /// `λ = 0`.
    pub fn backprop(
        &self, data: &IrtData, logp: &Array1<f64>, w: &Array1<f64>, stats: &SkewnessStats,
        obs_adjoint: &mut Array1<f64>, w_adjoint: &mut Array1<f64>,
    ) {
        if !stats.applied || self.lambda == 0.0 {
            return;
        }
        let n = data.n_persons();
        let w_sum = w.sum();
        let w_sq = w.dot(w);
        let den = w_sum + SAFE_EPS;

        // z = skew·r
        let r = ((stats.n_eff + SAFE_EPS) / 6.0).sqrt();
        let g_z = -self.lambda * stats.z;
        let g_skew = g_z * r;
        let g_neff = g_z * stats.skew / (12.0 * r);

        // skew = m3·(m2 + ε)^{−3/2}
        let base = stats.m2 + SAFE_EPS;
        let g_m3 = g_skew / base.powf(1.5);
        let g_m2 = -1.5 * g_skew * stats.m3 / base.powf(2.5);

        let d: Array1<f64> = stats.t_soft.mapv(|v| v - stats.m1);
        let wd_sum = w.dot(&d);
        let g_m1 = g_m2 * (-2.0 * wd_sum / den) + g_m3 * (-3.0 * stats.m2);

        // N_eff = W²/(Q + ε)
        let q_den = w_sq + SAFE_EPS;
        for i in 0..n {
            let di = d[i];
            w_adjoint[i] += g_m1 * di / den
                + g_m2 * (di * di - stats.m2) / den
                + g_m3 * (di * di * di - stats.m3) / den
                + g_neff * (2.0 * w_sum / q_den - 2.0 * w_sum * w_sum * w[i] / (q_den * q_den));
        }

        // Back through the soft clip and the t-statistics.
        let weighted_count: f64 = (0..n).map(|i| w[i] * data.count(i) as f64).sum();
        let mu_den = weighted_count + SAFE_EPS;
        let mut g_mu = 0.0;
        let mut g_mean = Array1::zeros(n);
        let mut g_var = Array1::zeros(n);
        for i in 0..n {
            let m = data.count(i) as f64;
            if m <= 1.0 {
                continue;
            }
            let di = d[i];
            let g_ts = w[i] / den * (g_m1 + 2.0 * g_m2 * di + 3.0 * g_m3 * di * di);
            let g_t = g_ts * soft_clip_deriv(stats.t[i], self.clip);
            let sd = stats.person_sd[i];
            let scale = m.sqrt() / sd;
            g_mean[i] = g_t * scale;
            g_mu -= g_t * scale;
            g_var[i] = -g_t * stats.t[i] / (2.0 * sd * sd);
        }

        // μ = Σ wᵢSᵢ / (Σ wᵢMᵢ + ε)
        for i in 0..n {
            let m = data.count(i) as f64;
            w_adjoint[i] += g_mu * (stats.person_sum[i] - stats.mu * m) / mu_den;
            let range = data.person_range(i);
            let var_scale = if m > 1.0 { 2.0 / (m - 1.0) } else { 0.0 };
            for o in range {
                obs_adjoint[o] += g_mean[i] / m
                    + g_var[i] * var_scale * (logp[o] - stats.person_mean[i])
                    + g_mu * w[i] / mu_den;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irt::core::data::{Dimension, ItemMeta, Observation};
    use approx::assert_relative_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Null behavior: symmetric t-statistics give z ≈ 0 and the maximal
    //   penalty value.
    // - A single poorly fitting person drives z negative.
    // - The skipped branch for non-finite input.
    // - The analytic adjoints against finite differences.
    // -------------------------------------------------------------------------

    /// Persons with the given response counts, each answering items `0..M`.
    fn data_with_counts(counts: &[usize]) -> IrtData {
        let n_items = counts.iter().copied().max().unwrap_or(1);
        let items = vec![ItemMeta { categories: 3, dimension: Dimension::Psychosocial }; n_items];
        let obs = counts
            .iter()
            .enumerate()
            .flat_map(|(p, &m)| (0..m).map(move |j| Observation { person: p, item: j, response: 0 }))
            .collect();
        IrtData::new(obs, vec![0.0; counts.len()], items).expect("valid data")
    }

    fn penalty() -> SkewnessPenalty {
        SkewnessPenalty { lambda: 1.0, clip: 10.0 }
    }

    #[test]
    // Purpose
    // -------
    // Mirror-symmetric person means give zero skewness.
    //
    // Given
    // -----
    // - Four persons with three responses each; means −1.5, −1.0, −0.5 and
    //   −1.0 ± the same offsets so t-statistics are symmetric; unit weights.
    //
    // Expect
    // ------
    // - |z| < 1e-6 and the penalty equals ln φ(0).
    fn symmetric_statistics_have_no_skew() {
        // Arrange
        let data = data_with_counts(&[3, 3, 3, 3]);
        let logp = array![
            -1.6, -1.5, -1.4, // mean −1.5
            -1.1, -1.0, -0.9, // mean −1.0
            -1.1, -1.0, -0.9, // mean −1.0
            -0.6, -0.5, -0.4, // mean −0.5
        ];
        let w = Array1::ones(4);

        // Act
        let stats = penalty().evaluate(&data, &logp, &w);

        // Assert
        assert!(stats.applied);
        assert!(stats.z.abs() < 1e-6, "z = {}", stats.z);
        assert_relative_eq!(stats.penalty, std_normal_ln_pdf(0.0), epsilon = 1e-10);
        assert_relative_eq!(stats.mu, -1.0, epsilon = 1e-6);
        let p = stats.p_value().expect("finite z");
        assert!(p > 0.99);
    }

    #[test]
    // Purpose
    // -------
    // One person fitting far worse than the rest creates a negative skew,
    // and zeroing that person's weight removes most of it.
    //
    // Given
    // -----
    // - Six persons; five near −1, one near −4.
    //
    // Expect
    // ------
    // - z < 0 with unit weights; |z| shrinks when that person's weight is 0.
    fn outlying_person_skews_left() {
        // Arrange
        let data = data_with_counts(&[3; 6]);
        let mut vals = Vec::new();
        for (p, centre) in [-1.0, -0.9, -1.1, -1.05, -0.95, -4.0].iter().enumerate() {
            let spread = 0.1 + 0.02 * p as f64;
            vals.extend_from_slice(&[centre - spread, *centre, centre + spread]);
        }
        let logp = Array1::from(vals);
        let unit = Array1::ones(6);
        let mut down = Array1::ones(6);
        down[5] = 0.0;

        // Act
        let full = penalty().evaluate(&data, &logp, &unit);
        let reduced = penalty().evaluate(&data, &logp, &down);

        // Assert
        assert!(full.z < 0.0 && full.skew < 0.0);
        assert!(reduced.z.abs() < full.z.abs());
        assert!(full.t[5] < 0.0);
        assert!(full.t_soft[5].abs() <= 10.0);
    }

    #[test]
    // Purpose
    // -------
    // A non-finite statistic skips the penalty without raising.
    //
    // Given
    // -----
    // - One NaN log-probability.
    //
    // Expect
    // ------
    // - `applied == false`, penalty 0, no p-value, and backprop leaves the
    //   adjoints untouched.
    fn non_finite_statistic_skips_penalty() {
        // Arrange
        let data = data_with_counts(&[2, 2, 2]);
        let logp = array![-1.0, f64::NAN, -0.5, -0.7, -1.2, -0.9];
        let w = Array1::ones(3);

        // Act
        let stats = penalty().evaluate(&data, &logp, &w);
        let mut g_obs = Array1::zeros(6);
        let mut g_w = Array1::zeros(3);
        penalty().backprop(&data, &logp, &w, &stats, &mut g_obs, &mut g_w);

        // Assert
        assert!(!stats.applied);
        assert_eq!(stats.penalty, 0.0);
        assert!(stats.p_value().is_none());
        assert!(g_obs.iter().chain(g_w.iter()).all(|&g| g == 0.0));
    }

    #[test]
    // Purpose
    // -------
    // The analytic adjoints match finite differences of the penalty.
    //
    // Given
    // -----
    // - Five persons with counts 3, 4, 1, 3, 2 (one single-response person),
    //   uneven log-probabilities, and unequal weights.
    //
    // Expect
    // ------
    // - ∂penalty/∂logp and ∂penalty/∂w agree with central differences.
    fn backprop_matches_finite_differences() {
        // Arrange
        let data = data_with_counts(&[3, 4, 1, 3, 2]);
        let logp = array![
            -0.8, -1.4, -0.6, -2.0, -0.3, -1.1, -0.9, -1.7, -0.5, -3.2, -0.7, -1.3, -0.4
        ];
        let w = array![0.9, 0.4, 1.1, 0.7, 0.95];
        let pen = SkewnessPenalty { lambda: 2.5, clip: 1.5 };
        let value = |l: &Array1<f64>, w: &Array1<f64>| pen.evaluate(&data, l, w).penalty;

        // Act
        let stats = pen.evaluate(&data, &logp, &w);
        let mut g_obs = Array1::zeros(logp.len());
        let mut g_w = Array1::zeros(w.len());
        pen.backprop(&data, &logp, &w, &stats, &mut g_obs, &mut g_w);

        // Assert
        let h = 1e-6;
        for o in 0..logp.len() {
            let (mut up, mut dn) = (logp.clone(), logp.clone());
            up[o] += h;
            dn[o] -= h;
            let fd = (value(&up, &w) - value(&dn, &w)) / (2.0 * h);
            assert_relative_eq!(g_obs[o], fd, epsilon = 1e-5, max_relative = 1e-5);
        }
        for i in 0..w.len() {
            let (mut up, mut dn) = (w.clone(), w.clone());
            up[i] += h;
            dn[i] -= h;
            let fd = (value(&logp, &up) - value(&logp, &dn)) / (2.0 * h);
            assert_relative_eq!(g_w[i], fd, epsilon = 1e-5, max_relative = 1e-5);
        }
    }
}
