//! Integration tests for the LOOCV sweep and jackknife Cook's distance.
//!
//! Purpose
//! -------
//! - Validate the post-estimation pipeline end to end: full joint fit,
//!   leave-one-person-out refits with holdout scoring, persistence of the
//!   sweep to CSV, and Cook's distance from the stored differences.
//! - Check the reproducibility guarantees the sweep documents.
//!
//! Coverage
//! --------
//! - `inference::loocv`: `run_loocv` with the global and a dedicated pool.
//! - `inference::jackknife`: `cooks_from_report` on a real sweep.
//! - `io`: `write_loocv` / `read_loocv` round trip and the result writers.
//! - `IrtData::replicate`: the scaled distance on a duplicated sample.
//!
//! Exclusions
//! ----------
//! - Jackknife preconditions, ridge behavior and duplication invariance on
//!   hand-built differences; these are unit tests next to the jackknife.
//! - Holdout gradient checks, covered next to the scorer.
use approx::assert_relative_eq;
use authenticity_irt::{
    inference::{CancelToken, LoocvOptions, LoocvReport, cooks_from_report, run_loocv},
    io::{read_loocv, write_cooks, write_loocv, write_matrix},
    irt::{
        IrtData, JointFit, JointModel, JointOptions, SimulationConfig, WeightModel, simulate,
    },
};

/// Purpose
/// -------
/// A small simulated sample, its options (logit-mixture weights with the
/// skewness penalty off), and the converged full fit.
fn fitted_sample(n_persons: usize) -> (IrtData, JointOptions, JointFit) {
    let cfg = SimulationConfig { n_persons, n_items: 3, seed: 7, ..Default::default() };
    let data = simulate(&cfg).expect("valid simulation").data;
    let mut options = JointOptions::default();
    options.skewness.lambda = 0.0;
    let fit = full_fit(&data, &options);
    (data, options, fit)
}

fn full_fit(data: &IrtData, options: &JointOptions) -> JointFit {
    let mut model = JointModel::new(data, options.clone()).expect("valid options");
    model.fit_default(data).expect("full fit converges");
    model.into_fit().expect("fitted")
}

fn sweep(
    data: &IrtData, options: &JointOptions, fit: &JointFit, threads: Option<usize>,
) -> LoocvReport {
    let loocv = LoocvOptions { threads, standard_errors: false };
    run_loocv(data, options, fit, &loocv, &CancelToken::new()).expect("sweep runs")
}

#[test]
// Purpose
// -------
// Re-running the sweep on identical data reproduces it exactly.
//
// Given
// -----
// - 20 simulated persons, 3 items, λ_skew = 0, fixed seed.
// - One sweep on the global pool and one on a dedicated 3-thread pool.
//
// Expect
// ------
// - Identical validity flags, difference vectors and holdout scores,
//   bit for bit, regardless of scheduling.
fn sweep_is_deterministic() {
    // Arrange
    let (data, options, fit) = fitted_sample(20);

    // Act
    let first = sweep(&data, &options, &fit, None);
    let second = sweep(&data, &options, &fit, Some(3));

    // Assert
    assert_eq!(first.records.len(), 20);
    assert_eq!(first, second);
    assert!(first.n_valid() > 0);
}

#[test]
// Purpose
// -------
// Cook's distance from a real sweep, before and after a CSV round trip.
//
// Given
// -----
// - 20 simulated persons, 3 items (p = 2·3 + 2 = 8), λ_skew = 0.
//
// Expect
// ------
// - One Cook's record per valid LOOCV record, sorted by person, all
//   finite and non-negative, flags consistent with the cut-offs.
// - n/p = 20/8 < 5, so the reliability warning is set.
// - Without a ridge, Σ D_i ≥ 1 (equality for centered differences).
// - Reading loocv.csv back gives the same distances.
// - The result writers produce the expected files.
fn sweep_feeds_cooks_distance() {
    // Arrange
    let (data, options, fit) = fitted_sample(20);
    let report = sweep(&data, &options, &fit, Some(2));
    let dir = tempfile::tempdir().expect("temp dir");
    let loocv_path = dir.path().join("loocv.csv");

    // Act
    let direct = cooks_from_report(&report).expect("enough valid records");
    write_loocv(&loocv_path, &report).expect("write loocv.csv");
    let reread = read_loocv(&loocv_path).expect("read loocv.csv");
    let from_file = cooks_from_report(&reread).expect("enough valid records");
    write_cooks(&dir.path().join("cooks_d.csv"), &direct).expect("write cooks_d.csv");
    write_matrix(&dir.path().join("jackknife_hessian.csv"), &direct.hessian)
        .expect("write jackknife_hessian.csv");

    // Assert
    assert_eq!(report.n_params, 8);
    assert_eq!(direct.p, 8);
    assert_eq!(direct.n, report.n_valid());
    assert_eq!(direct.records.len(), report.n_valid());
    assert!(direct.reliability_warning);
    assert_relative_eq!(direct.adequacy_ratio, direct.n as f64 / 8.0);

    let persons: Vec<usize> = direct.records.iter().map(|r| r.person).collect();
    let mut sorted = persons.clone();
    sorted.sort_unstable();
    assert_eq!(persons, sorted);
    let n = direct.n as f64;
    for r in &direct.records {
        assert!(r.cooks_d.is_finite() && r.cooks_d >= 0.0, "{r:?}");
        assert_relative_eq!(r.cooks_d_scaled, n * r.cooks_d, max_relative = 1e-12);
        assert_eq!(r.influential_at_4, r.cooks_d_scaled > 4.0);
        assert_eq!(r.influential_at_n, r.cooks_d_scaled > n);
    }
    if direct.ridge.is_none() {
        let total: f64 = direct.records.iter().map(|r| r.cooks_d).sum();
        assert!(total >= 1.0 - 1e-6, "sum of D = {total}");
    }

    assert_eq!(reread.n_valid(), report.n_valid());
    assert_eq!(reread.excluded(), report.excluded());
    for (a, b) in direct.records.iter().zip(&from_file.records) {
        assert_eq!(a.person, b.person);
        assert_relative_eq!(a.cooks_d, b.cooks_d, max_relative = 1e-6);
    }
    assert_eq!(direct.hessian.dim(), (8, 8));
    assert!(dir.path().join("cooks_d.csv").exists());
    assert!(dir.path().join("jackknife_hessian.csv").exists());
}

#[test]
// Purpose
// -------
// The scaled distance n·D measures one person's influence independently
// of the sample size: duplicating the whole sample and re-running the fit,
// the sweep and Cook's distance leaves it (nearly) unchanged.
//
// Given
// -----
// - 30 simulated persons, 4 items (p = 2·4 + 2 = 10), seed 5.
// - Fixed unit weights, λ_skew = 0, so the item parameters are the only
//   quantities shared across persons.
// - The same sample duplicated twice (60 persons; copy c of person i is
//   person 30·c + i).
//
// Expect
// ------
// - Every record is valid in both sweeps.
// - The two copies of a person get the same scaled distance (1e-3
//   relative).
// - Each person's scaled distance on the duplicated sample is within 30 %
//   (plus 0.1 absolute) of the original; leaving one person out of 60 is
//   a smaller perturbation than out of 30, so only higher-order terms of
//   the parameter shift differ.
fn scaled_distance_survives_duplicating_the_sample() {
    // Arrange
    let cfg = SimulationConfig { n_persons: 30, n_items: 4, seed: 5, ..Default::default() };
    let data = simulate(&cfg).expect("valid simulation").data;
    let doubled = data.replicate(2).expect("k = 2 is valid");
    let mut options = JointOptions { weights: WeightModel::Fixed, ..JointOptions::default() };
    options.skewness.lambda = 0.0;

    // Act
    let cooks = |sample: &IrtData| {
        let fit = full_fit(sample, &options);
        let report = sweep(sample, &options, &fit, None);
        assert_eq!(report.n_valid(), sample.n_persons());
        cooks_from_report(&report).expect("enough valid records")
    };
    let single = cooks(&data);
    let dup = cooks(&doubled);

    // Assert
    assert_eq!(single.p, 10);
    assert_eq!(dup.n, 60);
    for i in 0..30 {
        let original = &single.records[i];
        let (first, second) = (&dup.records[i], &dup.records[30 + i]);
        assert_eq!((original.person, first.person, second.person), (i, i, 30 + i));
        let copies_gap = (first.cooks_d_scaled - second.cooks_d_scaled).abs();
        assert!(
            copies_gap <= 1e-3 * first.cooks_d_scaled.max(second.cooks_d_scaled) + 1e-6,
            "person {i}: copies {} vs {}",
            first.cooks_d_scaled,
            second.cooks_d_scaled
        );
        let gap = (first.cooks_d_scaled - original.cooks_d_scaled).abs();
        let bound = 0.3 * original.cooks_d_scaled.max(first.cooks_d_scaled) + 0.1;
        assert!(
            gap <= bound,
            "person {i}: duplicated {} vs original {}",
            first.cooks_d_scaled,
            original.cooks_d_scaled
        );
    }
}
