//! inference::jackknife — Cook's distance from leave-one-out differences.
//!
//! Purpose
//! -------
//! Turn the item-parameter difference vectors of a LOOCV sweep into a
//! per-person influence measure. The spread of the differences gives a
//! jackknife covariance whose inverse plays the role of the Hessian in a
//! Cook's distance.
//!
//! Key behaviors
//! -------------
//! - Records are keyed and sorted by person; input order is irrelevant.
//! - `Σ_jack = cov(diff)·(n−1)`, i.e. the centered scatter matrix.
//! - `H = Σ_jack⁻¹` via symmetric eigendecomposition. When the condition
//!   number exceeds [`CONDITION_LIMIT`] a ridge `r = RIDGE_FACTOR·λmax` is
//!   added to every eigenvalue and recorded in the report.
//! - `D_i = diff_iᵀ·H·diff_i / p` and `D_scaled = n·D_i`, flagged against
//!   the cut-offs 4 and `n`.
//!
//! Invariants & assumptions
//! ------------------------
//! - At least `p + 1` valid records, all of length `p` with finite entries
//!   and distinct persons. Violations are errors raised before any
//!   decomposition.
//! - The adequacy ratio `n/p` is reported; below [`ADEQUACY_RATIO`] the
//!   report carries a reliability warning.
//! - `D_scaled` is unchanged when the whole sample is duplicated `k`
//!   times: each difference shrinks by `1/k`, `Σ_jack` by `1/k`, and the
//!   factor `n` absorbs the rest.
use std::collections::HashSet;

use log::{info, warn};
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::{
    inference::{
        errors::{InferenceError, InferenceResult},
        loocv::LoocvReport,
    },
    optimization::numerical_stability::EIGEN_EPS,
};

/// Condition number above which the ridge is applied.
pub const CONDITION_LIMIT: f64 = 1e10;
/// Ridge size relative to the largest eigenvalue.
pub const RIDGE_FACTOR: f64 = 1e-8;
/// Minimum `n/p` considered reliable.
pub const ADEQUACY_RATIO: f64 = 5.0;

/// Influence of one person.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CooksRecord {
    pub person: usize,
    pub cooks_d: f64,
    pub cooks_d_scaled: f64,
    pub influential_at_4: bool,
    pub influential_at_n: bool,
}

/// Result of the jackknife influence computation.
#[derive(Debug, Clone, PartialEq)]
pub struct JackknifeReport {
    /// Sorted by person.
    pub records: Vec<CooksRecord>,
    /// `p × p` inverse jackknife covariance.
    pub hessian: Array2<f64>,
    pub n: usize,
    pub p: usize,
    pub adequacy_ratio: f64,
    pub reliability_warning: bool,
    pub condition_number: f64,
    /// Ridge added to the eigenvalues, if any.
    pub ridge: Option<f64>,
}

/// Cook's distances from `(person, diff)` pairs of length `p`.
///
/// Errors
/// ------
/// - `InferenceError::TooFewRecords` for fewer than `p + 1` records.
/// - `InferenceError::DuplicatePerson` / `LengthMismatch` /
///   `NonFiniteDiff` for malformed records.
/// - `InferenceError::DegenerateCovariance` if all differences coincide.
pub fn cooks_distance(
    records: &[(usize, Array1<f64>)], p: usize,
) -> InferenceResult<JackknifeReport> {
    let n = records.len();
    if p == 0 || n < p + 1 {
        return Err(InferenceError::TooFewRecords { n, required: p + 1 });
    }
    let mut seen = HashSet::with_capacity(n);
    for (person, diff) in records {
        if !seen.insert(*person) {
            return Err(InferenceError::DuplicatePerson { person: *person });
        }
        if diff.len() != p {
            return Err(InferenceError::LengthMismatch {
                person: *person,
                expected: p,
                actual: diff.len(),
            });
        }
        if let Some((index, &value)) = diff.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(InferenceError::NonFiniteDiff { person: *person, index, value });
        }
    }

    let mut sorted: Vec<&(usize, Array1<f64>)> = records.iter().collect();
    sorted.sort_by_key(|(person, _)| *person);

    let adequacy_ratio = n as f64 / p as f64;
    let reliability_warning = adequacy_ratio < ADEQUACY_RATIO;
    info!("[COOKS D] {n} records, {p} parameters, n/p = {adequacy_ratio:.2}");
    if reliability_warning {
        warn!(
            "[COOKS D] n/p = {adequacy_ratio:.2} is below {ADEQUACY_RATIO}; \
             influence estimates are unreliable"
        );
    }

    let mut diffs = Array2::zeros((n, p));
    for (row, (_, diff)) in sorted.iter().enumerate() {
        diffs.row_mut(row).assign(diff);
    }
    let (hessian, condition_number, ridge) = inverse_scatter(&diffs)?;
    if let Some(r) = ridge {
        warn!("[COOKS D] Condition number {condition_number:.3e}; ridge {r:.3e} applied");
    }

    let n_f = n as f64;
    let out: Vec<CooksRecord> = sorted
        .iter()
        .map(|(person, diff)| {
            let cooks_d = diff.dot(&hessian.dot(diff)) / p as f64;
            let cooks_d_scaled = cooks_d * n_f;
            CooksRecord {
                person: *person,
                cooks_d,
                cooks_d_scaled,
                influential_at_4: cooks_d_scaled > 4.0,
                influential_at_n: cooks_d_scaled > n_f,
            }
        })
        .collect();
    let n_flagged = out.iter().filter(|r| r.influential_at_4).count();
    info!("[COOKS D] {n_flagged} persons with scaled D > 4");

    Ok(JackknifeReport {
        records: out,
        hessian,
        n,
        p,
        adequacy_ratio,
        reliability_warning,
        condition_number,
        ridge,
    })
}

/// Cook's distances from the valid records of a LOOCV sweep.
pub fn cooks_from_report(report: &LoocvReport) -> InferenceResult<JackknifeReport> {
    cooks_distance(&report.valid_diffs(), report.n_params)
}

/// Inverse of the centered scatter matrix of `diffs` with the
/// condition-number ridge. Returns `(H, κ, ridge)`.
fn inverse_scatter(diffs: &Array2<f64>) -> InferenceResult<(Array2<f64>, f64, Option<f64>)> {
    let p = diffs.ncols();
    let centered = diffs - &diffs.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(p));
    let scatter = centered.t().dot(&centered);

    let mut mat = DMatrix::<f64>::zeros(p, p);
    for i in 0..p {
        for j in 0..p {
            mat[(i, j)] = 0.5 * (scatter[[i, j]] + scatter[[j, i]]);
        }
    }
    let eig = mat.symmetric_eigen();
    let lambda_max = eig.eigenvalues.max();
    let lambda_min = eig.eigenvalues.min();
    if !(lambda_max > EIGEN_EPS) {
        return Err(InferenceError::DegenerateCovariance { lambda_max });
    }
    let condition_number = if lambda_min > 0.0 { lambda_max / lambda_min } else { f64::INFINITY };
    let ridge = (condition_number > CONDITION_LIMIT).then(|| RIDGE_FACTOR * lambda_max);
    let r = ridge.unwrap_or(0.0);

    let q = &eig.eigenvectors;
    let mut hessian = Array2::zeros((p, p));
    for k in 0..p {
        let inv = 1.0 / (eig.eigenvalues[k].max(0.0) + r);
        for i in 0..p {
            for j in 0..p {
                hessian[[i, j]] += q[(i, k)] * inv * q[(j, k)];
            }
        }
    }
    Ok((hessian, condition_number, ridge))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Precondition errors.
    // - Exact values on a one-parameter example.
    // - Order independence and scale invariance under duplication.
    // - The ridge on a rank-deficient scatter matrix.
    // -------------------------------------------------------------------------

    fn base_records() -> Vec<(usize, Array1<f64>)> {
        vec![
            (0, array![0.10, -0.05]),
            (1, array![-0.20, 0.02]),
            (2, array![0.05, 0.08]),
            (3, array![0.30, -0.10]),
            (4, array![-0.15, 0.01]),
            (5, array![-0.02, 0.04]),
        ]
    }

    #[test]
    // Purpose
    // -------
    // Malformed inputs are rejected before any decomposition.
    //
    // Given
    // -----
    // - Too few records, a duplicate person, a short vector, a NaN entry,
    //   and identical vectors.
    //
    // Expect
    // ------
    // - The matching `InferenceError` variant in each case.
    fn preconditions_are_enforced() {
        // Arrange
        let few = vec![(0, array![1.0, 0.0]), (1, array![0.0, 1.0])];
        let mut dup = base_records();
        dup[1].0 = 0;
        let mut short = base_records();
        short[2].1 = array![0.1];
        let mut nan = base_records();
        nan[3].1[1] = f64::NAN;
        let same: Vec<(usize, Array1<f64>)> = (0..4).map(|i| (i, array![0.5, 0.5])).collect();

        // Act / Assert
        assert!(matches!(
            cooks_distance(&few, 2),
            Err(InferenceError::TooFewRecords { n: 2, required: 3 })
        ));
        assert!(matches!(
            cooks_distance(&dup, 2),
            Err(InferenceError::DuplicatePerson { person: 0 })
        ));
        assert!(matches!(
            cooks_distance(&short, 2),
            Err(InferenceError::LengthMismatch { person: 2, expected: 2, actual: 1 })
        ));
        assert!(matches!(
            cooks_distance(&nan, 2),
            Err(InferenceError::NonFiniteDiff { person: 3, index: 1, .. })
        ));
        assert!(matches!(
            cooks_distance(&same, 2),
            Err(InferenceError::DegenerateCovariance { .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // Exact values for a single parameter.
    //
    // Given
    // -----
    // - Differences [1, −1, 2, −2] (mean 0, scatter 10).
    //
    // Expect
    // ------
    // - H = 0.1, D = d²/10 and D_scaled = 4·D = [0.4, 0.4, 1.6, 1.6].
    // - Nothing is flagged; n/p = 4 raises the reliability warning.
    fn single_parameter_values() {
        // Arrange
        let records: Vec<(usize, Array1<f64>)> =
            [1.0, -1.0, 2.0, -2.0].iter().enumerate().map(|(i, &d)| (i, array![d])).collect();

        // Act
        let report = cooks_distance(&records, 1).expect("valid records");

        // Assert
        assert_relative_eq!(report.hessian[[0, 0]], 0.1, epsilon = 1e-12);
        let scaled: Vec<f64> = report.records.iter().map(|r| r.cooks_d_scaled).collect();
        for (got, want) in scaled.iter().zip([0.4, 0.4, 1.6, 1.6]) {
            assert_relative_eq!(*got, want, epsilon = 1e-12);
        }
        assert!(report.records.iter().all(|r| !r.influential_at_4 && !r.influential_at_n));
        assert!(report.reliability_warning);
        assert_eq!(report.ridge, None);
    }

    #[test]
    // Purpose
    // -------
    // Input order does not matter.
    //
    // Given
    // -----
    // - The same records forward and reversed.
    //
    // Expect
    // ------
    // - Identical reports, sorted by person.
    fn input_order_is_irrelevant() {
        // Arrange
        let forward = base_records();
        let mut reversed = base_records();
        reversed.reverse();

        // Act
        let a = cooks_distance(&forward, 2).expect("valid records");
        let b = cooks_distance(&reversed, 2).expect("valid records");

        // Assert
        let persons: Vec<usize> = a.records.iter().map(|r| r.person).collect();
        assert_eq!(persons, vec![0, 1, 2, 3, 4, 5]);
        for (x, y) in a.records.iter().zip(&b.records) {
            assert_relative_eq!(x.cooks_d, y.cooks_d, epsilon = 1e-12);
        }
    }

    #[test]
    // Purpose
    // -------
    // Scaled distances survive k-fold duplication of the sample.
    //
    // Given
    // -----
    // - Base records, and for k = 2, 3 every record repeated k times with
    //   its difference divided by k.
    //
    // Expect
    // ------
    // - Each copy's D_scaled equals the base person's D_scaled.
    fn scaled_distance_is_duplication_invariant() {
        // Arrange
        let base = base_records();
        let n = base.len();
        let reference = cooks_distance(&base, 2).expect("valid records");

        for k in [2usize, 3] {
            let dup: Vec<(usize, Array1<f64>)> = (0..k)
                .flat_map(|c| base.iter().map(move |(i, d)| (c * n + i, d / k as f64)))
                .collect();

            // Act
            let report = cooks_distance(&dup, 2).expect("valid records");

            // Assert
            for r in &report.records {
                let want = reference.records[r.person % n].cooks_d_scaled;
                assert_relative_eq!(r.cooks_d_scaled, want, max_relative = 1e-9);
            }
        }
    }

    #[test]
    // Purpose
    // -------
    // A rank-deficient scatter matrix is regularized, not inverted blindly.
    //
    // Given
    // -----
    // - Second coordinate exactly twice the first.
    //
    // Expect
    // ------
    // - Ridge recorded, condition number above the limit, finite output.
    fn collinear_differences_get_a_ridge() {
        // Arrange
        let records: Vec<(usize, Array1<f64>)> = [0.1, -0.3, 0.2, 0.05, -0.05]
            .iter()
            .enumerate()
            .map(|(i, &x)| (i, array![x, 2.0 * x]))
            .collect();

        // Act
        let report = cooks_distance(&records, 2).expect("ridge rescues the inversion");

        // Assert
        assert!(report.ridge.is_some());
        assert!(report.condition_number > CONDITION_LIMIT);
        assert!(report.records.iter().all(|r| r.cooks_d.is_finite() && r.cooks_d >= 0.0));
        assert!(report.hessian.iter().all(|h| h.is_finite()));
    }
}
