//! Numerical stability utilities.
//!
//! Provides safe implementations of the nonlinear transforms and floors
//! used by the joint IRT objective. Every floor in the crate is an
//! **additive-epsilon soft floor** (`x + ε`) rather than a hard
//! `max(x, ε)`, so gradients stay informative near boundaries.
//!
//! # Provided items
//! - [`LOG_PROB_FLOOR`]: additive floor applied to category probabilities
//!   before taking logs (1e-10).
//! - [`SAFE_EPS`]: additive floor for divisions, variances, and moment
//!   normalizers (1e-8).
//! - [`safe_div`], [`safe_log`], [`soft_clip`]: the named helpers every
//!   division, pre-log floor, and outlier clip goes through.
//! - [`safe_softplus`] / [`safe_softplus_inv`]: ℝ → (0, ∞) and back.
//! - [`safe_logistic`]: overflow-free logistic sigmoid.
//! - [`log_sum_exp2`], [`log_cosh`]: stable log-domain helpers.
//! - [`std_normal_ln_pdf`], [`normal_ln_pdf`]: Gaussian log densities used
//!   by priors and the skewness penalty.

/// Additive floor applied to graded-response category probabilities
/// before `ln`.
///
/// `ln(P + 1e-10)` biases a category's log-probability only when `P` is
/// itself within a few orders of magnitude of 1e-10, i.e. for responses
/// the model considers essentially impossible. Those are exactly the
/// responses an inauthentic participant produces, and the floor caps
/// their contribution at about `−23` nats per item.
pub const LOG_PROB_FLOOR: f64 = 1e-10;

/// Additive floor for divisions, variance square roots, and moment
/// normalizers.
pub const SAFE_EPS: f64 = 1e-8;

/// Eigenvalues at or below this magnitude are treated as numerically zero.
pub const EIGEN_EPS: f64 = 1e-12;

/// Default soft-clip constant `c` for per-person t-statistics.
pub const DEFAULT_SOFT_CLIP: f64 = 10.0;

/// `0.5 · ln(2π)`.
pub const HALF_LN_2PI: f64 = 0.918_938_533_204_672_8;

/// General tolerance for comparisons in tests and sanity checks.
pub const GENERAL_TOL: f64 = 1e-9;

/// Soft-floored division `num / (den + SAFE_EPS)`.
///
/// Intended for non-negative denominators (weight sums, counts, variances).
/// The epsilon shifts the result by a relative `SAFE_EPS / den`, which is
/// negligible once `den` is away from zero and keeps the quotient finite
/// when it is not.
#[inline]
pub fn safe_div(num: f64, den: f64) -> f64 {
    num / (den + SAFE_EPS)
}

/// Soft-floored log of a probability: `ln(p + LOG_PROB_FLOOR)`.
#[inline]
pub fn safe_log(p: f64) -> f64 {
    (p + LOG_PROB_FLOOR).ln()
}

/// Smooth saturating clip `c · tanh(x / c)`.
///
/// Behaves like the identity for `|x| ≪ c` and approaches `±c` smoothly,
/// so cubing the result cannot blow up.
#[inline]
pub fn soft_clip(x: f64, c: f64) -> f64 {
    c * (x / c).tanh()
}

/// Derivative of [`soft_clip`] with respect to `x`: `1 − tanh²(x / c)`.
#[inline]
pub fn soft_clip_deriv(x: f64, c: f64) -> f64 {
    let th = (x / c).tanh();
    1.0 - th * th
}

/// Numerically stable softplus: `softplus(x) = ln(1 + exp(x))`.
///
/// For `x > 20` the correction `ln1p(exp(-x))` is below `f64` resolution
/// relative to `x`, so `x` is returned directly.
///
/// # Parameters
/// - `x`: real input
///
/// # Returns
/// - `softplus(x)` as `f64`, strictly positive for finite `x` above the
///   underflow range.
pub fn safe_softplus(x: f64) -> f64 {
    if x > 20.0 { x } else { x.exp().ln_1p() }
}

/// Stable inverse of softplus on `(0, ∞)`: `t = ln(exp(x) − 1)`.
///
/// # Parameters
/// - `x`: a positive real (the softplus output), must be finite and `> 0`.
///
/// # Returns
/// - `t` such that `softplus(t) = x`.
pub fn safe_softplus_inv(x: f64) -> f64 {
    if x > 20.0 { x } else { x.exp_m1().ln() }
}

/// Logistic sigmoid `σ(x) = 1 / (1 + exp(−x))` without overflow.
///
/// Uses the `exp(x) / (1 + exp(x))` form for negative inputs so the
/// exponential never overflows. Also the derivative of [`safe_softplus`].
#[inline]
pub fn safe_logistic(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// `ln(exp(a) + exp(b))` with max-shift.
pub fn log_sum_exp2(a: f64, b: f64) -> f64 {
    let m = a.max(b);
    if m == f64::NEG_INFINITY {
        return m;
    }
    m + ((a - m).exp() + (b - m).exp()).ln()
}

/// `ln(cosh(x))` evaluated as `|x| + ln1p(exp(−2|x|)) − ln 2`.
pub fn log_cosh(x: f64) -> f64 {
    let ax = x.abs();
    ax + (-2.0 * ax).exp().ln_1p() - std::f64::consts::LN_2
}

/// Standard normal log density `ln φ(z)`.
#[inline]
pub fn std_normal_ln_pdf(z: f64) -> f64 {
    -0.5 * z * z - HALF_LN_2PI
}

/// Normal log density `ln N(x | mu, sigma)`; `sigma` must be positive.
#[inline]
pub fn normal_ln_pdf(x: f64, mu: f64, sigma: f64) -> f64 {
    let u = (x - mu) / sigma;
    -0.5 * u * u - sigma.ln() - HALF_LN_2PI
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use statrs::distribution::{Continuous, Normal};

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Agreement of the stable transforms with naïve formulas where the
    //   naïve formulas are safe.
    // - Tail behavior (no overflow, no NaN) of logistic, softplus, log-sum-exp,
    //   and log-cosh.
    // - The soft-floor and soft-clip contracts used by the skewness penalty.
    //
    // They intentionally DO NOT cover:
    // - How these helpers are composed inside the joint objective; that is
    //   checked by gradient tests in `irt::core::objective`.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // `safe_softplus_inv` inverts `safe_softplus` on moderate and large inputs.
    //
    // Given
    // -----
    // - Positive outputs spanning the two branches of the guard.
    //
    // Expect
    // ------
    // - `softplus(softplus_inv(x)) ≈ x`.
    fn softplus_inverse_recovers_input() {
        // Arrange
        let xs = [1e-3, 0.5, 1.0, 7.5, 25.0];

        // Act / Assert
        for &x in &xs {
            let back = safe_softplus(safe_softplus_inv(x));
            assert_relative_eq!(back, x, max_relative = 1e-10);
        }
    }

    #[test]
    // Purpose
    // -------
    // `safe_logistic` stays finite and symmetric at extreme arguments.
    //
    // Given
    // -----
    // - Inputs ±800, where `exp` would overflow naïvely.
    //
    // Expect
    // ------
    // - σ(800) = 1, σ(−800) = 0, σ(x) + σ(−x) = 1 for moderate x.
    fn logistic_is_stable_and_symmetric() {
        // Arrange / Act / Assert
        assert_eq!(safe_logistic(800.0), 1.0);
        assert_eq!(safe_logistic(-800.0), 0.0);
        for &x in &[-3.0, -0.25, 0.0, 1.5, 9.0] {
            assert_relative_eq!(safe_logistic(x) + safe_logistic(-x), 1.0, epsilon = 1e-15);
        }
    }

    #[test]
    // Purpose
    // -------
    // The pre-log floor keeps impossible categories finite and leaves
    // ordinary probabilities essentially unchanged.
    //
    // Given
    // -----
    // - p = 0 and p = 0.25.
    //
    // Expect
    // ------
    // - safe_log(0) = ln(1e-10); safe_log(0.25) ≈ ln(0.25).
    fn safe_log_floors_zero_probability() {
        // Arrange / Act
        let at_zero = safe_log(0.0);
        let ordinary = safe_log(0.25);

        // Assert
        assert_relative_eq!(at_zero, LOG_PROB_FLOOR.ln(), epsilon = 1e-12);
        assert_relative_eq!(ordinary, 0.25_f64.ln(), epsilon = 1e-9);
    }

    #[test]
    // Purpose
    // -------
    // `soft_clip` is near-identity for small inputs and bounded by `c`.
    //
    // Given
    // -----
    // - c = 10, inputs 0.1 and ±1e6.
    //
    // Expect
    // ------
    // - soft_clip(0.1) ≈ 0.1; |soft_clip(±1e6)| ≤ 10; derivative ≈ 0 far out.
    fn soft_clip_is_bounded_and_near_identity() {
        // Arrange
        let c = DEFAULT_SOFT_CLIP;

        // Act / Assert
        assert_relative_eq!(soft_clip(0.1, c), 0.1, max_relative = 1e-4);
        assert!(soft_clip(1e6, c) <= c);
        assert!(soft_clip(-1e6, c) >= -c);
        assert!(soft_clip_deriv(1e6, c) < 1e-12);
        assert_relative_eq!(soft_clip_deriv(0.0, c), 1.0);
    }

    #[test]
    // Purpose
    // -------
    // Division by a vanishing denominator stays finite.
    //
    // Given
    // -----
    // - num = 1, den = 0 and den = 4.
    //
    // Expect
    // ------
    // - safe_div(1, 0) = 1 / SAFE_EPS; safe_div(1, 4) ≈ 0.25.
    fn safe_div_soft_floors_denominator() {
        // Arrange / Act / Assert
        assert_relative_eq!(safe_div(1.0, 0.0), 1.0 / SAFE_EPS);
        assert_relative_eq!(safe_div(1.0, 4.0), 0.25, max_relative = 1e-8);
    }

    #[test]
    // Purpose
    // -------
    // Log-domain helpers agree with naïve formulas and survive large inputs.
    //
    // Given
    // -----
    // - Moderate and very large arguments.
    //
    // Expect
    // ------
    // - log_sum_exp2 and log_cosh match naïve forms on moderate inputs and
    //   are finite on huge inputs.
    fn log_domain_helpers_match_naive_forms() {
        // Arrange
        let (a, b) = (0.3_f64, -1.2_f64);

        // Act / Assert
        assert_relative_eq!(log_sum_exp2(a, b), (a.exp() + b.exp()).ln(), epsilon = 1e-14);
        assert_relative_eq!(log_sum_exp2(1000.0, 1000.0), 1000.0 + std::f64::consts::LN_2);
        assert_relative_eq!(log_cosh(0.7), 0.7_f64.cosh().ln(), epsilon = 1e-14);
        assert!(log_cosh(900.0).is_finite());
    }

    #[test]
    // Purpose
    // -------
    // Gaussian log densities agree with `statrs`.
    //
    // Given
    // -----
    // - Normal(1.5, 2.0) evaluated at x = −0.3, and the standard normal at z = 0.8.
    //
    // Expect
    // ------
    // - Agreement to 1e-12.
    fn normal_log_densities_match_statrs() {
        // Arrange
        let reference = Normal::new(1.5, 2.0).expect("valid normal");
        let standard = Normal::new(0.0, 1.0).expect("valid normal");

        // Act / Assert
        assert_relative_eq!(normal_ln_pdf(-0.3, 1.5, 2.0), reference.ln_pdf(-0.3), epsilon = 1e-12);
        assert_relative_eq!(std_normal_ln_pdf(0.8), standard.ln_pdf(0.8), epsilon = 1e-12);
    }
}
