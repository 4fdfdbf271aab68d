//! Post-fit diagnostics.
//!
//! A pure function of a completed forward pass: correlation structure,
//! the skewness summary with its normal-approximation p-value, weight
//! classification counts and per-person fit statistics. Nothing here
//! re-evaluates the model.
use crate::irt::core::{data::IrtData, objective::ForwardPass};
use serde::{Deserialize, Serialize};

/// Weights below this are counted as likely inauthentic.
pub const LOW_WEIGHT: f64 = 0.1;
/// Weights above this are counted as likely authentic.
pub const HIGH_WEIGHT: f64 = 0.9;

/// Skewness statistic at the fitted parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkewnessSummary {
    pub mu: f64,
    pub skew: f64,
    pub n_eff: f64,
    pub z: f64,
    pub p_value: Option<f64>,
    pub penalty_applied: bool,
}

/// Sample-level diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitDiagnostics {
    pub rho: Option<f64>,
    pub omega: [[f64; 2]; 2],
    pub skewness: SkewnessSummary,
    pub n_low_weight: usize,
    pub n_high_weight: usize,
    pub sum_weights: f64,
}

/// Fit statistics of one person.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersonStats {
    pub person: usize,
    pub ability: [f64; 2],
    pub weight: f64,
    pub mean_loglik: f64,
    pub sd_loglik: f64,
    pub t_stat: f64,
}

/// Summarize a forward pass evaluated at the fitted parameters.
pub fn diagnose(fp: &ForwardPass, data: &IrtData) -> (FitDiagnostics, Vec<PersonStats>) {
    let omega = fp.transform.omega();
    let sk = &fp.skewness;
    let diagnostics = FitDiagnostics {
        rho: fp.transform.rho(),
        omega: [[omega[[0, 0]], omega[[0, 1]]], [omega[[1, 0]], omega[[1, 1]]]],
        skewness: SkewnessSummary {
            mu: sk.mu,
            skew: sk.skew,
            n_eff: sk.n_eff,
            z: sk.z,
            p_value: sk.p_value(),
            penalty_applied: sk.applied,
        },
        n_low_weight: fp.weights.iter().filter(|&&w| w < LOW_WEIGHT).count(),
        n_high_weight: fp.weights.iter().filter(|&&w| w > HIGH_WEIGHT).count(),
        sum_weights: fp.weights.sum(),
    };
    let persons = (0..data.n_persons())
        .map(|i| PersonStats {
            person: i,
            ability: [fp.abilities[[i, 0]], fp.abilities[[i, 1]]],
            weight: fp.weights[i],
            mean_loglik: sk.person_mean[i],
            sd_loglik: sk.person_sd[i],
            t_stat: sk.t[i],
        })
        .collect();
    (diagnostics, persons)
}
