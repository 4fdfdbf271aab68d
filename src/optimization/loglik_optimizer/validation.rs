//! Consistency checks shared by the optimizer.
//!
//! Tolerances must be finite and strictly positive when present; gradients,
//! Hessians, estimates, and objective values must have the expected shape
//! and contain only finite entries. Each check reports the first offending
//! element through a dedicated [`OptError`] variant.
use crate::optimization::{
    errors::{OptError, OptResult},
    loglik_optimizer::{Grad, Theta, types::Hessian},
};

/// Reason attached to tolerance errors, or `None` when `tol` is acceptable.
fn tolerance_problem(tol: f64) -> Option<&'static str> {
    if !tol.is_finite() {
        Some("Tolerance must be finite.")
    } else if tol <= 0.0 {
        Some("Tolerance must be positive.")
    } else {
        None
    }
}

/// Validate the optional gradient-norm tolerance.
pub fn verify_tol_grad(tol: Option<f64>) -> OptResult<()> {
    match tol.and_then(|t| tolerance_problem(t).map(|reason| (t, reason))) {
        Some((tol, reason)) => Err(OptError::InvalidTolGrad { tol, reason }),
        None => Ok(()),
    }
}

/// Validate the optional cost-change tolerance.
pub fn verify_tol_cost(tol: Option<f64>) -> OptResult<()> {
    match tol.and_then(|t| tolerance_problem(t).map(|reason| (t, reason))) {
        Some((tol, reason)) => Err(OptError::InvalidTolCost { tol, reason }),
        None => Ok(()),
    }
}

/// Check `grad.len() == dim` and that every element is finite.
///
/// # Errors
/// - [`OptError::GradientDimMismatch`] on a length mismatch.
/// - [`OptError::InvalidGradient`] for the first non-finite element.
pub fn validate_grad(grad: &Grad, dim: usize) -> OptResult<()> {
    if grad.len() != dim {
        return Err(OptError::GradientDimMismatch { expected: dim, found: grad.len() });
    }
    match grad.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(OptError::InvalidGradient {
            index,
            value: grad[index],
            reason: "Gradient elements must be finite.",
        }),
        None => Ok(()),
    }
}

/// Unwrap the solver's best parameter vector, requiring finite entries.
///
/// # Errors
/// - [`OptError::MissingThetaHat`] if the solver produced no estimate.
/// - [`OptError::InvalidThetaHat`] for the first non-finite element.
pub fn validate_theta_hat(theta_hat: Option<Theta>) -> OptResult<Theta> {
    let theta = theta_hat.ok_or(OptError::MissingThetaHat)?;
    match theta.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(OptError::InvalidThetaHat {
            index,
            value: theta[index],
            reason: "Parameter estimates must be finite.",
        }),
        None => Ok(theta),
    }
}

/// Objective values may be any finite number.
pub fn validate_value(value: f64) -> OptResult<()> {
    if !value.is_finite() {
        return Err(OptError::NonFiniteCost { value });
    }
    Ok(())
}

/// Check a Hessian is `dim × dim` with finite entries.
///
/// # Errors
/// - [`OptError::HessianDimMismatch`] on a shape mismatch.
/// - [`OptError::InvalidHessian`] with the first offending row/column.
pub fn validate_hessian(hessian: &Hessian, dim: usize) -> OptResult<()> {
    if hessian.nrows() != dim || hessian.ncols() != dim {
        return Err(OptError::HessianDimMismatch {
            expected: dim,
            found: (hessian.nrows(), hessian.ncols()),
        });
    }
    match hessian.indexed_iter().find(|(_, v)| !v.is_finite()) {
        Some(((row, col), &value)) => Err(OptError::InvalidHessian { row, col, value }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, array};

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover the first-offender reporting of each validator.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Validators point at the first non-finite element.
    //
    // Given
    // -----
    // - A gradient with NaN at index 1, an estimate with ∞ at index 2, and a
    //   Hessian with NaN at (1, 0).
    //
    // Expect
    // ------
    // - Errors carrying those positions.
    fn validators_report_first_offender() {
        // Arrange
        let grad = array![0.0, f64::NAN, f64::NAN];
        let theta = array![1.0, 2.0, f64::INFINITY];
        let mut hess = Array2::<f64>::zeros((2, 2));
        hess[[1, 0]] = f64::NAN;

        // Act / Assert
        assert!(matches!(validate_grad(&grad, 3), Err(OptError::InvalidGradient { index: 1, .. })));
        assert!(matches!(
            validate_theta_hat(Some(theta)),
            Err(OptError::InvalidThetaHat { index: 2, .. })
        ));
        assert!(matches!(
            validate_hessian(&hess, 2),
            Err(OptError::InvalidHessian { row: 1, col: 0, .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // Shape and presence checks fire before element checks.
    //
    // Given
    // -----
    // - A length-2 gradient checked against dim 3, a missing estimate, and
    //   a 2×3 Hessian.
    //
    // Expect
    // ------
    // - `GradientDimMismatch`, `MissingThetaHat`, `HessianDimMismatch`.
    fn validators_check_shape_and_presence() {
        // Arrange / Act / Assert
        assert_eq!(
            validate_grad(&array![0.0, 0.0], 3),
            Err(OptError::GradientDimMismatch { expected: 3, found: 2 })
        );
        assert_eq!(validate_theta_hat(None), Err(OptError::MissingThetaHat));
        assert_eq!(
            validate_hessian(&Array2::zeros((2, 3)), 2),
            Err(OptError::HessianDimMismatch { expected: 2, found: (2, 3) })
        );
        assert!(verify_tol_cost(Some(f64::INFINITY)).is_err());
        assert!(verify_tol_grad(None).is_ok());
    }
}
