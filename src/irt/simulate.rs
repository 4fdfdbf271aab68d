//! Synthetic data from the graded-response model.
//!
//! Generates a seeded sample of persons with correlated two-dimensional
//! abilities answering ordered-category items, using the same category
//! probabilities as the likelihood. Items alternate between the
//! psychosocial (even index) and developmental (odd index) dimensions.
//! [`flip_responses`] reverses the response scale for chosen persons,
//! producing the kind of inauthentic pattern the weights should detect.
use crate::irt::{
    core::{
        ability::AbilityTransform,
        data::{Dimension, IrtData, ItemMeta, Observation},
        grm::category_probs,
        options::{DeltaSharing, require_positive},
        params::ItemParams,
    },
    errors::{IrtError, IrtResult},
};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

/// Generating configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub n_persons: usize,
    pub n_items: usize,
    /// Categories per item (`K ≥ 2`).
    pub n_categories: usize,
    /// Ability correlation.
    pub rho: f64,
    /// Threshold spacing per dimension `[psychosocial, developmental]`.
    pub delta: [f64; 2],
    /// First thresholds are evenly spaced over `[tau_low, tau_high]`.
    pub tau_low: f64,
    pub tau_high: f64,
    /// Common age slope.
    pub beta1: f64,
    /// Ages are uniform on `[age_min, age_max]`.
    pub age_min: f64,
    pub age_max: f64,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            n_persons: 200,
            n_items: 12,
            n_categories: 3,
            rho: 0.4,
            delta: [1.5, 1.5],
            tau_low: -1.5,
            tau_high: 0.5,
            beta1: 0.3,
            age_min: -1.0,
            age_max: 1.0,
            seed: 42,
        }
    }
}

impl SimulationConfig {
    fn validate(&self) -> IrtResult<()> {
        if self.n_persons < 2 || self.n_items < 1 || self.n_categories < 2 {
            return Err(IrtError::InvalidHyperparameter {
                name: "simulation.size",
                value: self.n_persons.min(self.n_items).min(self.n_categories) as f64,
                reason: "need at least 2 persons, 1 item and 2 categories",
            });
        }
        if !(self.rho.abs() < 1.0) {
            return Err(IrtError::InvalidHyperparameter {
                name: "simulation.rho",
                value: self.rho,
                reason: "must lie strictly inside (-1, 1)",
            });
        }
        require_positive("simulation.delta", self.delta[0])?;
        require_positive("simulation.delta", self.delta[1])?;
        let finite = [self.tau_low, self.tau_high, self.beta1, self.age_min, self.age_max];
        if let Some(&bad) = finite.iter().find(|v| !v.is_finite()) {
            return Err(IrtError::InvalidHyperparameter {
                name: "simulation.range",
                value: bad,
                reason: "thresholds, slope and age range must be finite",
            });
        }
        if self.age_min > self.age_max {
            return Err(IrtError::InvalidHyperparameter {
                name: "simulation.age_min",
                value: self.age_min,
                reason: "must not exceed age_max",
            });
        }
        Ok(())
    }

    fn dimension(j: usize) -> Dimension {
        if j % 2 == 0 { Dimension::Psychosocial } else { Dimension::Developmental }
    }

    /// True item parameters.
    pub fn item_params(&self) -> ItemParams {
        let j_max = self.n_items.saturating_sub(1).max(1) as f64;
        let tau = (0..self.n_items)
            .map(|j| self.tau_low + (self.tau_high - self.tau_low) * j as f64 / j_max)
            .collect();
        ItemParams {
            tau,
            beta1: Array1::from_elem(self.n_items, self.beta1),
            delta: Array1::from(self.delta.to_vec()),
            sharing: DeltaSharing::PerDimension,
        }
    }
}

/// A simulated sample with its generating values.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedData {
    pub data: IrtData,
    /// True abilities, `N × 2`.
    pub abilities: Array2<f64>,
    pub items: ItemParams,
}

/// Draw a complete sample (every person answers every item).
///
/// Errors
/// ------
/// - `IrtError::InvalidHyperparameter` for an out-of-domain configuration.
pub fn simulate(cfg: &SimulationConfig) -> IrtResult<SimulatedData> {
    cfg.validate()?;
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let transform = AbilityTransform::from_rho(Some(cfg.rho));
    let items = cfg.item_params();
    let metas: Vec<ItemMeta> = (0..cfg.n_items)
        .map(|j| ItemMeta {
            categories: cfg.n_categories,
            dimension: SimulationConfig::dimension(j),
        })
        .collect();

    let mut abilities = Array2::zeros((cfg.n_persons, 2));
    let mut ages = Vec::with_capacity(cfg.n_persons);
    let mut obs = Vec::with_capacity(cfg.n_persons * cfg.n_items);
    for i in 0..cfg.n_persons {
        let z = [StandardNormal.sample(&mut rng), StandardNormal.sample(&mut rng)];
        let theta = transform.apply_one(z);
        abilities[[i, 0]] = theta[0];
        abilities[[i, 1]] = theta[1];
        let age = if cfg.age_max > cfg.age_min {
            rng.gen_range(cfg.age_min..=cfg.age_max)
        } else {
            cfg.age_min
        };
        ages.push(age);

        for (j, meta) in metas.iter().enumerate() {
            let lp = items.beta1[j] * age + theta[meta.dimension.index()];
            let delta = items.delta_for(meta.dimension);
            let probs = category_probs(meta.categories, items.tau[j], delta, lp);
            let u: f64 = rng.gen();
            let mut cum = 0.0;
            let mut response = meta.categories - 1;
            for (k, p) in probs.iter().enumerate() {
                cum += p;
                if u < cum {
                    response = k;
                    break;
                }
            }
            obs.push(Observation { person: i, item: j, response });
        }
    }

    let data = IrtData::new(obs, ages, metas)?;
    Ok(SimulatedData { data, abilities, items })
}

/// Reverse the response scale (`k ↦ K − 1 − k`) for the given persons.
///
/// Errors
/// ------
/// - `IrtError::PersonOutOfRange` for an unknown person.
pub fn flip_responses(data: &IrtData, persons: &[usize]) -> IrtResult<IrtData> {
    let n = data.n_persons();
    if let Some(&bad) = persons.iter().find(|&&p| p >= n) {
        return Err(IrtError::PersonOutOfRange { person: bad, n_persons: n });
    }
    let mut flip = vec![false; n];
    for &p in persons {
        flip[p] = true;
    }
    let obs = data
        .observations()
        .iter()
        .map(|o| {
            if flip[o.person] {
                let k = data.item(o.item).categories;
                Observation { response: k - 1 - o.response, ..*o }
            } else {
                *o
            }
        })
        .collect();
    IrtData::new(obs, data.ages().to_vec(), data.items().to_vec())
}
