//! loglik_optimizer::builders — L-BFGS solver construction.
//!
//! Purpose
//! -------
//! Build L-BFGS solvers for the two supported line searches and apply the
//! tolerance part of [`MLEOptions`]. Starting point, iteration cap, and
//! timeout are run-time concerns applied by [`run_lbfgs`](super::run::run_lbfgs).
//!
//! Conventions
//! -----------
//! - History size is `opts.lbfgs_mem`, or [`DEFAULT_LBFGS_MEM`] when unset.
//! - Tolerances absent from `opts` leave argmin's own defaults in place.
use argmin::solver::quasinewton::LBFGS;

use crate::optimization::{
    errors::OptResult,
    loglik_optimizer::{
        traits::MLEOptions,
        types::{
            Cost, DEFAULT_LBFGS_MEM, Grad, HagerZhangLS, LbfgsHagerZhang, LbfgsMoreThuente,
            MoreThuenteLS, Theta,
        },
    },
};

/// L-BFGS with Hager–Zhang line search.
///
/// Errors
/// ------
/// - `OptError` (via `From<argmin::core::Error>`) if argmin rejects a
///   tolerance.
pub fn build_optimizer_hager_zhang(opts: &MLEOptions) -> OptResult<LbfgsHagerZhang> {
    let mem = opts.lbfgs_mem.unwrap_or(DEFAULT_LBFGS_MEM);
    configure_lbfgs(LbfgsHagerZhang::new(HagerZhangLS::new(), mem), opts)
}

/// L-BFGS with More–Thuente line search, the default for joint fits.
///
/// Errors
/// ------
/// - `OptError` (via `From<argmin::core::Error>`) if argmin rejects a
///   tolerance.
pub fn build_optimizer_more_thuente(opts: &MLEOptions) -> OptResult<LbfgsMoreThuente> {
    let mem = opts.lbfgs_mem.unwrap_or(DEFAULT_LBFGS_MEM);
    configure_lbfgs(LbfgsMoreThuente::new(MoreThuenteLS::new(), mem), opts)
}

/// Apply the optional gradient and cost-change tolerances to any L-BFGS
/// variant, whatever its line search.
pub fn configure_lbfgs<L>(
    mut solver: LBFGS<L, Theta, Grad, Cost>, opts: &MLEOptions,
) -> OptResult<LBFGS<L, Theta, Grad, Cost>> {
    if let Some(g) = opts.tols.tol_grad {
        solver = solver.with_tolerance_grad(g)?;
    }
    if let Some(c) = opts.tols.tol_cost {
        solver = solver.with_tolerance_cost(c)?;
    }
    Ok(solver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::loglik_optimizer::traits::{LineSearcher, Tolerances};

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover solver construction for both line searches with
    // default and explicit memory, and with partial tolerance sets.
    //
    // Actual solving is covered in `api`.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Both builders succeed with default and explicit history sizes.
    //
    // Given
    // -----
    // - Full tolerances with `lbfgs_mem` of `None` and `Some(11)`.
    //
    // Expect
    // ------
    // - Every combination builds.
    fn builders_accept_default_and_explicit_memory() {
        // Arrange
        let tols = Tolerances::new(Some(1e-6), Some(1e-10), Some(50)).expect("valid tolerances");

        for mem in [None, Some(11)] {
            // Act
            let hz = MLEOptions::new(tols, LineSearcher::HagerZhang, mem).expect("valid options");
            let mt = MLEOptions::new(tols, LineSearcher::MoreThuente, mem).expect("valid options");

            // Assert
            assert!(build_optimizer_hager_zhang(&hz).is_ok());
            assert!(build_optimizer_more_thuente(&mt).is_ok());
        }
    }

    #[test]
    // Purpose
    // -------
    // A tolerance set with only an iteration cap leaves argmin's defaults.
    //
    // Given
    // -----
    // - `Tolerances { tol_grad: None, tol_cost: None, max_iter: Some(5) }`.
    //
    // Expect
    // ------
    // - `configure_lbfgs` succeeds.
    fn configure_lbfgs_respects_absent_tolerances() {
        // Arrange
        let tols = Tolerances::new(None, None, Some(5)).expect("valid tolerances");
        let opts = MLEOptions::new(tols, LineSearcher::MoreThuente, None).expect("valid options");
        let raw = LbfgsMoreThuente::new(MoreThuenteLS::new(), DEFAULT_LBFGS_MEM);

        // Act
        let configured = configure_lbfgs(raw, &opts);

        // Assert
        assert!(configured.is_ok());
    }
}
