//! Two-dimensional ability model: non-centered abilities with an optional
//! correlation between the psychosocial and developmental dimensions.
//!
//! Raw person coordinates `z_i ∈ ℝ²` carry a standard normal prior. In the
//! correlated variant abilities are `θ_i = z_i·Lᵀ` with
//! `L = [[1, 0], [ρ, √(1−ρ²)]]` and `ρ = tanh(u)`, so each ability has unit
//! marginal variance for any `u`. An LKJ(η) prior is placed on the 2×2
//! correlation matrix; no Jacobian term is added because the fit is a
//! posterior mode in the optimizer's own coordinates.
//!
//! The independent variant uses `θ_i = z_i` and has no correlation
//! parameter.
use crate::{
    irt::{core::options::require_positive, errors::IrtResult},
    optimization::numerical_stability::{log_cosh, std_normal_ln_pdf},
};
use ndarray::{Array2, ArrayView2, ArrayViewMut2, array};
use serde::{Deserialize, Serialize};
use statrs::function::beta::ln_beta;

/// Ability-model configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbilityModel {
    /// Correlated dimensions with an LKJ(`lkj_shape`) prior on ρ.
    Correlated {
        #[serde(default = "default_lkj_shape")]
        lkj_shape: f64,
    },
    /// Independent standard-normal dimensions.
    Independent,
}

fn default_lkj_shape() -> f64 {
    1.0
}

impl Default for AbilityModel {
    fn default() -> Self {
        AbilityModel::Correlated { lkj_shape: default_lkj_shape() }
    }
}

impl AbilityModel {
    pub fn is_correlated(&self) -> bool {
        matches!(self, AbilityModel::Correlated { .. })
    }

    pub fn validate(&self) -> IrtResult<()> {
        match *self {
            AbilityModel::Correlated { lkj_shape } => require_positive("ability.lkj_shape", lkj_shape),
            AbilityModel::Independent => Ok(()),
        }
    }
}

/// The map `z ↦ θ` for a given correlation coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbilityTransform {
    rho: f64,
    /// `√(1−ρ²) = sech(u)`.
    comp: f64,
    correlated: bool,
}

impl AbilityTransform {
    /// Correlated transform from the unconstrained coordinate `u`.
    pub fn correlated(u: f64) -> Self {
        Self { rho: u.tanh(), comp: 1.0 / u.cosh(), correlated: true }
    }

    pub fn independent() -> Self {
        Self { rho: 0.0, comp: 1.0, correlated: false }
    }

    /// Build from an already-constrained ρ ∈ (−1, 1).
    pub fn from_rho(rho: Option<f64>) -> Self {
        match rho {
            Some(r) => Self { rho: r, comp: (1.0 - r * r).sqrt(), correlated: true },
            None => Self::independent(),
        }
    }

    /// `ρ`, or `None` for the independent variant.
    pub fn rho(&self) -> Option<f64> {
        self.correlated.then_some(self.rho)
    }

    /// Cholesky factor `L` of the correlation matrix.
    pub fn cholesky(&self) -> Array2<f64> {
        array![[1.0, 0.0], [self.rho, self.comp]]
    }

    /// Correlation matrix `Ω = L·Lᵀ`.
    pub fn omega(&self) -> Array2<f64> {
        let l = self.cholesky();
        l.dot(&l.t())
    }

    #[inline]
    pub fn apply_one(&self, z: [f64; 2]) -> [f64; 2] {
        [z[0], self.rho * z[0] + self.comp * z[1]]
    }

    /// Abilities for an `N × 2` matrix of raw coordinates.
    pub fn apply(&self, z: ArrayView2<f64>) -> Array2<f64> {
        let mut theta = z.to_owned();
        for mut row in theta.rows_mut() {
            let [a, b] = self.apply_one([row[0], row[1]]);
            row[0] = a;
            row[1] = b;
        }
        theta
    }

    /// Pull ability adjoints back to `z`, returning the adjoint of `u`.
    ///
    /// `z_grad` is accumulated into, not overwritten. The returned value is
    /// zero for the independent variant.
    pub fn backprop(
        &self, z: ArrayView2<f64>, theta_grad: ArrayView2<f64>, mut z_grad: ArrayViewMut2<f64>,
    ) -> f64 {
        let (rho, b) = (self.rho, self.comp);
        let mut u_grad = 0.0;
        for i in 0..z.nrows() {
            let (g0, g1) = (theta_grad[[i, 0]], theta_grad[[i, 1]]);
            z_grad[[i, 0]] += g0 + rho * g1;
            z_grad[[i, 1]] += b * g1;
            if self.correlated {
                // dρ/du = b², db/du = −ρ·b
                u_grad += g1 * (z[[i, 0]] * b * b - z[[i, 1]] * rho * b);
            }
        }
        u_grad
    }
}

/// Standard-normal log prior summed over all raw coordinates. Its gradient
/// is `−z`.
pub fn z_log_prior(z: ArrayView2<f64>) -> f64 {
    z.iter().map(|&v| std_normal_ln_pdf(v)).sum()
}

/// LKJ(η) log density of a 2×2 correlation matrix with `ρ = tanh(u)`:
/// `(η−1)·ln(1−ρ²) − (2η−1)·ln 2 − ln B(η, η)`.
///
/// `ln(1−ρ²) = −2·ln cosh(u)` keeps the term finite for large `|u|`.
pub fn lkj_log_density(u: f64, eta: f64) -> f64 {
    -2.0 * (eta - 1.0) * log_cosh(u) - (2.0 * eta - 1.0) * std::f64::consts::LN_2 - ln_beta(eta, eta)
}

/// Derivative of [`lkj_log_density`] with respect to `u`.
pub fn lkj_log_density_grad(u: f64, eta: f64) -> f64 {
    -2.0 * (eta - 1.0) * u.tanh()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Unit marginal variance and the correlation exposed through Ω.
    // - The LKJ normalizer (η = 1 is uniform on (−1, 1), density 1/2).
    // - The backprop of ability adjoints against finite differences.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Ω has a unit diagonal and ρ off the diagonal for any coordinate.
    //
    // Given
    // -----
    // - u ∈ {−3, −0.4, 0, 1.2, 6}.
    //
    // Expect
    // ------
    // - Ω[0,0] = Ω[1,1] = 1 and Ω[0,1] = tanh(u).
    fn omega_has_unit_diagonal() {
        for &u in &[-3.0, -0.4, 0.0, 1.2, 6.0] {
            // Arrange / Act
            let omega = AbilityTransform::correlated(u).omega();

            // Assert
            assert_relative_eq!(omega[[0, 0]], 1.0, epsilon = 1e-12);
            assert_relative_eq!(omega[[1, 1]], 1.0, epsilon = 1e-12);
            assert_relative_eq!(omega[[0, 1]], u.tanh(), epsilon = 1e-12);
        }
    }

    #[test]
    // Purpose
    // -------
    // The LKJ density integrates correctly in the uniform case and is
    // symmetric in ρ.
    //
    // Given
    // -----
    // - η = 1 at several u; η = 2 at ±u.
    //
    // Expect
    // ------
    // - exp(density) = 1/2 for η = 1; equal values at ±u for η = 2, and the
    //   η = 2 density at ρ = 0 equals 3/4.
    fn lkj_density_matches_closed_forms() {
        // Arrange / Act / Assert
        for &u in &[-2.0, 0.0, 0.7] {
            assert_relative_eq!(lkj_log_density(u, 1.0).exp(), 0.5, epsilon = 1e-12);
            assert_eq!(lkj_log_density_grad(u, 1.0), 0.0);
        }
        assert_relative_eq!(lkj_log_density(0.9, 2.0), lkj_log_density(-0.9, 2.0));
        // LKJ(2) in 2D is Beta(2,2) on (ρ+1)/2: density 3/4·(1−ρ²).
        assert_relative_eq!(lkj_log_density(0.0, 2.0).exp(), 0.75, epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // `backprop` is the exact adjoint of `apply` for a linear read-out.
    //
    // Given
    // -----
    // - Three raw rows, u = 0.6, and the scalar f = Σ G ⊙ θ for a fixed G.
    //
    // Expect
    // ------
    // - ∂f/∂z equals the accumulated `z_grad` and ∂f/∂u matches a central
    //   difference to 1e-6.
    fn backprop_matches_finite_differences() {
        // Arrange
        let z = array![[0.3, -1.1], [1.4, 0.2], [-0.8, 0.9]];
        let g = array![[0.5, 1.0], [-2.0, 0.3], [0.7, -1.5]];
        let u = 0.6;
        let f = |u: f64, z: &Array2<f64>| (&g * &AbilityTransform::correlated(u).apply(z.view())).sum();

        // Act
        let mut z_grad = Array2::<f64>::zeros((3, 2));
        let u_grad = AbilityTransform::correlated(u).backprop(z.view(), g.view(), z_grad.view_mut());

        // Assert
        let h = 1e-6;
        assert_relative_eq!(u_grad, (f(u + h, &z) - f(u - h, &z)) / (2.0 * h), epsilon = 1e-6);
        for i in 0..3 {
            for d in 0..2 {
                let mut zp = z.clone();
                let mut zm = z.clone();
                zp[[i, d]] += h;
                zm[[i, d]] -= h;
                let fd = (f(u, &zp) - f(u, &zm)) / (2.0 * h);
                assert_relative_eq!(z_grad[[i, d]], fd, epsilon = 1e-6);
            }
        }
    }
}
