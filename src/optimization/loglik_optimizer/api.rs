//! High-level entry point for maximizing a user-provided [`LogLikelihood`].
use crate::optimization::{
    errors::OptResult,
    loglik_optimizer::{
        OptimOutcome, Theta,
        adapter::ArgMinAdapter,
        builders::{build_optimizer_hager_zhang, build_optimizer_more_thuente},
        run::run_lbfgs,
        traits::{LineSearcher, LogLikelihood, MLEOptions},
    },
};

/// Maximize `ℓ(θ)` with L-BFGS and the line search chosen in `opts`.
///
/// # Behavior
/// - Validates the starting point via `f.check(theta0, data)`.
/// - Wraps `(f, data)` in an [`ArgMinAdapter`] that minimizes `-ℓ(θ)`.
/// - Builds the solver for `opts.line_searcher` and runs it under the
///   iteration cap and optional timeout in `opts`.
///
/// # Errors
/// - Anything `f.check` rejects.
/// - Solver construction or runtime errors (line-search failures, a
///   non-finite objective term raised from inside `f.value`).
///
/// # Returns
/// An [`OptimOutcome`]. Running out of iterations or time is **not** an
/// error: it comes back with `converged == false`.
///
/// # Example
/// ```no_run
/// use ndarray::{Array1, array};
/// use authenticity_irt::optimization::errors::OptResult;
/// use authenticity_irt::optimization::loglik_optimizer::{LogLikelihood, MLEOptions, maximize};
///
/// struct Ridge;
/// impl LogLikelihood for Ridge {
///     type Data = ();
///     fn value(&self, theta: &Array1<f64>, _: &()) -> OptResult<f64> {
///         Ok(-theta.dot(theta))
///     }
///     fn check(&self, _: &Array1<f64>, _: &()) -> OptResult<()> {
///         Ok(())
///     }
/// }
///
/// let out = maximize(&Ridge, array![0.1, -0.2, 0.3], &(), &MLEOptions::default())?;
/// println!("θ̂ = {:?}", out.theta_hat);
/// # Ok::<(), authenticity_irt::optimization::errors::OptError>(())
/// ```
pub fn maximize<F: LogLikelihood>(
    f: &F, theta0: Theta, data: &F::Data, opts: &MLEOptions,
) -> OptResult<OptimOutcome> {
    f.check(&theta0, data)?;
    let problem = ArgMinAdapter::new(f, data);
    match opts.line_searcher {
        LineSearcher::MoreThuente => {
            let solver = build_optimizer_more_thuente(opts)?;
            run_lbfgs(theta0, opts, problem, solver)
        }
        LineSearcher::HagerZhang => {
            let solver = build_optimizer_hager_zhang(opts)?;
            run_lbfgs(theta0, opts, problem, solver)
        }
    }
}
