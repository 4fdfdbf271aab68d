//! inference::loocv — leave-one-person-out refits and holdout scoring.
//!
//! Purpose
//! -------
//! For every person `i`, refit the joint model on the remaining `N − 1`
//! persons, score person `i` against the refitted item parameters, and
//! record how far the item parameters moved. The difference vectors feed
//! the jackknife influence diagnostic in [`crate::inference::jackknife`].
//!
//! Key behaviors
//! -------------
//! - Each refit is warm-started from the full fit with person `i`'s raw
//!   ability (and per-person raw weight) removed.
//! - Persons are processed as a rayon parallel map. An optional dedicated
//!   thread pool bounds the number of worker threads.
//! - A failed or non-converged refit or holdout fit yields an invalid
//!   record carrying the failure reason. Invalid records never carry
//!   numbers.
//! - A [`CancelToken`] is checked before each person; persons reached
//!   after cancellation are recorded invalid with reason `"cancelled"`.
//!
//! Invariants & assumptions
//! ------------------------
//! - No mutable state is shared between tasks: each task builds its own
//!   [`JointModel`] and the dataset and full fit are read-only.
//! - Records are sorted by person index before the report is built, so the
//!   report does not depend on completion order.
//! - Difference vectors are `(N−1 fit) − (full fit)` in natural units,
//!   ordered `[τ; β1; δ]`, of length `p = 2J + n_δ`.
//!
//! Downstream usage
//! ----------------
//! - `run_loocv(&data, &options, &full_fit, &LoocvOptions::default(),
//!   &CancelToken::new())?`, then [`LoocvReport::valid_diffs`] for
//!   `cooks_distance`.
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use log::{debug, info, warn};
use ndarray::Array1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    inference::errors::InferenceResult,
    irt::{
        core::{data::IrtData, options::JointOptions},
        errors::{IrtError, IrtResult},
        models::{holdout::HoldoutScorer, joint::JointFit, joint::JointModel},
    },
};

/// Sweep configuration.
///
/// - `threads`: size of a dedicated pool; `None` uses the global rayon
///   pool.
/// - `standard_errors`: also compute holdout standard errors of θ.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoocvOptions {
    pub threads: Option<usize>,
    pub standard_errors: bool,
}

/// Cooperative cancellation flag shared between the caller and the sweep.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome for one excluded person. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct LoocvRecord {
    /// 0-based person index.
    pub person: usize,
    pub valid: bool,
    /// Failure reason of an invalid record.
    pub reason: Option<String>,
    pub ability: Option<[f64; 2]>,
    pub standard_errors: Option<[f64; 2]>,
    pub log_posterior: Option<f64>,
    /// `(N−1 fit) − (full fit)` item parameters, `[τ; β1; δ]`.
    pub diff: Option<Array1<f64>>,
}

impl LoocvRecord {
    pub fn invalid(person: usize, reason: impl Into<String>) -> Self {
        Self {
            person,
            valid: false,
            reason: Some(reason.into()),
            ability: None,
            standard_errors: None,
            log_posterior: None,
            diff: None,
        }
    }
}

/// Sorted records of a whole sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct LoocvReport {
    pub records: Vec<LoocvRecord>,
    /// Length of every difference vector.
    pub n_params: usize,
}

impl LoocvReport {
    /// Sort `records` by person index.
    pub fn new(mut records: Vec<LoocvRecord>, n_params: usize) -> Self {
        records.sort_by_key(|r| r.person);
        Self { records, n_params }
    }

    pub fn n_valid(&self) -> usize {
        self.records.iter().filter(|r| r.valid).count()
    }

    /// Persons whose record is invalid, ascending.
    pub fn excluded(&self) -> Vec<usize> {
        self.records.iter().filter(|r| !r.valid).map(|r| r.person).collect()
    }

    /// `(person, diff)` pairs of the valid records.
    pub fn valid_diffs(&self) -> Vec<(usize, Array1<f64>)> {
        self.records
            .iter()
            .filter(|r| r.valid)
            .filter_map(|r| r.diff.clone().map(|d| (r.person, d)))
            .collect()
    }
}

/// Run the leave-one-out sweep against a converged full fit.
///
/// Parameters
/// ----------
/// - `data`: the full dataset the fit was produced from.
/// - `options`: model options; every refit uses the same configuration.
/// - `full`: the converged full fit, used for warm starts and as the
///   reference for difference vectors.
/// - `loocv`: thread count and standard-error switch.
/// - `cancel`: checked before each person.
///
/// Errors
/// ------
/// - `InferenceError::ThreadPool` if a dedicated pool cannot be built.
/// - `InferenceError::Irt` if the optimizer options are invalid.
///
/// Per-person failures never surface here; they become invalid records.
pub fn run_loocv(
    data: &IrtData, options: &JointOptions, full: &JointFit, loocv: &LoocvOptions,
    cancel: &CancelToken,
) -> InferenceResult<LoocvReport> {
    options.validate()?;
    let n = data.n_persons();
    let n_params = full.items.n_params();
    info!(
        "[LOOCV] Sweeping {} persons ({} item parameters each, {} threads)",
        n,
        n_params,
        loocv.threads.map_or_else(|| "default".to_string(), |t| t.to_string())
    );

    let sweep = || -> Vec<LoocvRecord> {
        (0..n)
            .into_par_iter()
            .map(|i| loocv_person(i, data, options, full, loocv.standard_errors, cancel))
            .collect()
    };
    let records = match loocv.threads {
        Some(threads) => {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
            pool.install(sweep)
        }
        None => sweep(),
    };

    let report = LoocvReport::new(records, n_params);
    let excluded = report.excluded();
    if excluded.is_empty() {
        info!("[LOOCV] All {} records valid", n);
    } else {
        warn!(
            "[LOOCV] {} of {} records invalid; excluded persons (0-based): {:?}",
            excluded.len(),
            n,
            excluded
        );
    }
    Ok(report)
}

fn loocv_person(
    i: usize, data: &IrtData, options: &JointOptions, full: &JointFit, standard_errors: bool,
    cancel: &CancelToken,
) -> LoocvRecord {
    if cancel.is_cancelled() {
        return LoocvRecord::invalid(i, "cancelled");
    }
    match refit_and_score(i, data, options, full, standard_errors) {
        Ok(record) => {
            debug!("[LOOCV] Person {i}: log-posterior {:?}", record.log_posterior);
            record
        }
        Err(err) => {
            warn!("[LOOCV] Person {i} excluded: {err}");
            LoocvRecord::invalid(i, err.to_string())
        }
    }
}

fn refit_and_score(
    i: usize, data: &IrtData, options: &JointOptions, full: &JointFit, standard_errors: bool,
) -> IrtResult<LoocvRecord> {
    let reduced = data.without_person(i)?;
    let mut model = JointModel::new(&reduced, options.clone())?;
    let theta0 = full.layout.drop_person(&full.theta_hat, i);
    model.fit(theta0, &reduced)?;
    let refit = model.into_fit()?;
    let diff = refit.items.to_vector() - full.items.to_vector();

    let mle_opts = options.optimizer.to_mle_options()?;
    let scorer = HoldoutScorer::from_fit(&refit, data.items().to_vec(), mle_opts)
        .with_standard_errors(standard_errors);
    let score = scorer.score(&data.holdout(i)?)?;
    if !score.converged {
        return Err(IrtError::NotConverged {
            status: format!("holdout: {}", score.status),
            iterations: score.iterations,
            last_finite: None,
        });
    }
    Ok(LoocvRecord {
        person: i,
        valid: true,
        reason: None,
        ability: Some(score.ability),
        standard_errors: score.standard_errors,
        log_posterior: Some(score.log_posterior),
        diff: Some(diff),
    })
}
