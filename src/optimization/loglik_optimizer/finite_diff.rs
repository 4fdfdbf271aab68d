//! loglik_optimizer::finite_diff — validated finite-difference derivatives.
//!
//! Purpose
//! -------
//! Wrap the `finitediff` crate so the optimizer and the model layer can
//! request gradients and Hessians with shape/finiteness validation and
//! error capture, without depending on the `finitediff` API directly.
//!
//! Key behaviors
//! -------------
//! - [`run_fd_diff`]: forward-difference gradient of a scalar function,
//!   re-raising any error the function stashed while being differenced.
//! - [`compute_hessian`]: Hessian of a gradient function by central
//!   differences, falling back to forward differences, then symmetrized.
//!
//! Downstream usage
//! ----------------
//! - The argmin adapter uses [`run_fd_diff`] when a model has no analytic
//!   gradient.
//! - The holdout ability scorer differentiates its analytic gradient with
//!   [`compute_hessian`] to obtain posterior standard errors.
use crate::optimization::{
    errors::OptResult,
    loglik_optimizer::{
        Grad, Theta,
        types::Hessian,
        validation::{validate_grad, validate_hessian},
    },
};
use argmin::core::Error;
use finitediff::FiniteDiff;
use std::cell::RefCell;

/// Forward-difference gradient with error capture and validation.
///
/// Parameters
/// ----------
/// - `theta`: `&Theta`
///   Evaluation point; its length is the expected gradient length.
/// - `func`: `&G`
///   Scalar function. It must write any evaluation error into
///   `closure_err` and return `NaN` instead.
/// - `closure_err`: `&RefCell<Option<Error>>`
///   Shared error slot. Cleared on entry, inspected after differencing.
///
/// Returns
/// -------
/// `OptResult<Grad>`
///   The validated gradient.
///
/// Errors
/// ------
/// - Any error captured in `closure_err`, converted into `OptError`.
/// - `OptError::GradientDimMismatch` / `OptError::InvalidGradient` from
///   [`validate_grad`].
pub fn run_fd_diff<G: Fn(&Theta) -> f64>(
    theta: &Theta, func: &G, closure_err: &RefCell<Option<Error>>,
) -> OptResult<Grad> {
    closure_err.replace(None);
    let fd_grad = theta.forward_diff(func);
    if let Some(err) = closure_err.take() {
        return Err(err.into());
    }
    validate_grad(&fd_grad, theta.len())?;
    Ok(fd_grad)
}

/// Finite-difference Hessian of a gradient function, symmetrized.
///
/// Central differences are tried first; if they fail validation the
/// forward-difference Hessian is validated and returned instead. Only the
/// forward-difference validation error is surfaced.
///
/// Errors
/// ------
/// - `OptError::HessianDimMismatch` or `OptError::InvalidHessian` when the
///   fallback also fails.
pub fn compute_hessian<F: Fn(&Theta) -> Grad>(f: &F, theta: &Theta) -> OptResult<Hessian> {
    let dim = theta.len();
    let mut hess = theta.central_hessian(f);
    if validate_hessian(&hess, dim).is_err() {
        hess = theta.forward_hessian(f);
        validate_hessian(&hess, dim)?;
    }
    symmetrize_hess(&mut hess);
    Ok(hess)
}

// ---- Helper methods ----

/// Average each off-diagonal pair in place; the diagonal is untouched.
fn symmetrize_hess(hess: &mut Hessian) {
    for i in 0..hess.nrows() {
        for j in 0..i {
            let avg = 0.5 * (hess[[i, j]] + hess[[j, i]]);
            hess[[i, j]] = avg;
            hess[[j, i]] = avg;
        }
    }
}
