//! Parameter layout of the joint model in unconstrained optimizer space.
//!
//! Purpose
//! -------
//! Define the single flat vector `θ` handed to the optimizer and the maps
//! from its blocks to model quantities.
//!
//! Conventions
//! -----------
//! Block order in `θ`:
//!
//! | block       | length          | model quantity                         |
//! |-------------|-----------------|----------------------------------------|
//! | `tau`       | `J`             | first thresholds `τ_j`                 |
//! | `beta1`     | `J`             | age slopes `β1_j`                      |
//! | `delta_raw` | `n_δ` (1 or 2)  | `δ = softplus(delta_raw)`              |
//! | `z`         | `2N`            | raw abilities, row-major `z[2i + d]`   |
//! | `rho_raw`   | 1 if correlated | `ρ = tanh(rho_raw)`                    |
//! | `weights`   | strategy-defined| raw weight parameters                  |
//!
//! The item-parameter vector used by the jackknife is in natural units,
//! `[τ; β1; δ]`, of length `p = 2J + n_δ`.
use crate::{
    irt::{
        core::{
            ability::AbilityTransform,
            data::Dimension,
            options::{DeltaSharing, JointOptions},
        },
        errors::{IrtError, IrtResult},
    },
    optimization::{loglik_optimizer::Theta, numerical_stability::safe_softplus},
};
use ndarray::{Array1, Array2, s};
use std::ops::Range;

/// Item parameters in natural units.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemParams {
    pub tau: Array1<f64>,
    pub beta1: Array1<f64>,
    /// One spacing per dimension, or a single shared spacing.
    pub delta: Array1<f64>,
    pub sharing: DeltaSharing,
}

impl ItemParams {
    /// Slot of `delta` used by items on `dim`.
    #[inline]
    pub fn delta_index(&self, dim: Dimension) -> usize {
        delta_slot(self.sharing, dim)
    }

    #[inline]
    pub fn delta_for(&self, dim: Dimension) -> f64 {
        self.delta[self.delta_index(dim)]
    }

    /// `[τ; β1; δ]`.
    pub fn to_vector(&self) -> Array1<f64> {
        self.tau.iter().chain(self.beta1.iter()).chain(self.delta.iter()).copied().collect()
    }

    pub fn n_params(&self) -> usize {
        self.tau.len() + self.beta1.len() + self.delta.len()
    }
}

#[inline]
fn delta_slot(sharing: DeltaSharing, dim: Dimension) -> usize {
    match sharing {
        DeltaSharing::PerDimension => dim.index(),
        DeltaSharing::Shared => 0,
    }
}

/// `ParamLayout` — offsets of each block inside `θ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamLayout {
    pub n_items: usize,
    pub n_persons: usize,
    pub sharing: DeltaSharing,
    pub correlated: bool,
    pub n_weight: usize,
}

impl ParamLayout {
    pub fn new(n_items: usize, n_persons: usize, options: &JointOptions) -> Self {
        Self {
            n_items,
            n_persons,
            sharing: options.delta_sharing,
            correlated: options.ability.is_correlated(),
            n_weight: options.weights.strategy().n_params(n_persons),
        }
    }

    pub fn n_delta(&self) -> usize {
        self.sharing.n_delta()
    }

    /// `p = 2J + n_δ`.
    pub fn n_item_params(&self) -> usize {
        2 * self.n_items + self.n_delta()
    }

    pub fn tau_range(&self) -> Range<usize> {
        0..self.n_items
    }

    pub fn beta1_range(&self) -> Range<usize> {
        self.n_items..2 * self.n_items
    }

    pub fn delta_range(&self) -> Range<usize> {
        let start = 2 * self.n_items;
        start..start + self.n_delta()
    }

    pub fn z_range(&self) -> Range<usize> {
        let start = self.delta_range().end;
        start..start + 2 * self.n_persons
    }

    pub fn rho_index(&self) -> Option<usize> {
        self.correlated.then_some(self.z_range().end)
    }

    pub fn weight_range(&self) -> Range<usize> {
        let start = self.z_range().end + usize::from(self.correlated);
        start..start + self.n_weight
    }

    pub fn len(&self) -> usize {
        self.weight_range().end
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn z_index(&self, person: usize, dim: usize) -> usize {
        self.z_range().start + 2 * person + dim
    }

    #[inline]
    pub fn delta_index(&self, dim: Dimension) -> usize {
        self.delta_range().start + delta_slot(self.sharing, dim)
    }

    /// Length and finiteness check on a candidate `θ`.
    ///
    /// Errors
    /// ------
    /// - `IrtError::ThetaLengthMismatch`
    /// - `IrtError::InvalidThetaInput` for the first non-finite entry.
    pub fn check(&self, theta: &Theta) -> IrtResult<()> {
        if theta.len() != self.len() {
            return Err(IrtError::ThetaLengthMismatch { expected: self.len(), actual: theta.len() });
        }
        match theta.iter().position(|v| !v.is_finite()) {
            Some(index) => Err(IrtError::InvalidThetaInput { index, value: theta[index] }),
            None => Ok(()),
        }
    }

    pub fn item_params(&self, theta: &Theta) -> ItemParams {
        ItemParams {
            tau: theta.slice(s![self.tau_range()]).to_owned(),
            beta1: theta.slice(s![self.beta1_range()]).to_owned(),
            delta: theta.slice(s![self.delta_range()]).mapv(safe_softplus),
            sharing: self.sharing,
        }
    }

    /// Raw abilities as an `N × 2` matrix.
    pub fn z(&self, theta: &Theta) -> Array2<f64> {
        let start = self.z_range().start;
        Array2::from_shape_fn((self.n_persons, 2), |(i, d)| theta[start + 2 * i + d])
    }

    pub fn transform(&self, theta: &Theta) -> AbilityTransform {
        match self.rho_index() {
            Some(k) => AbilityTransform::correlated(theta[k]),
            None => AbilityTransform::independent(),
        }
    }

    /// Layout for the same model with one person fewer.
    pub fn without_person(&self) -> Self {
        let n_persons = self.n_persons.saturating_sub(1);
        let n_weight = if self.n_weight == self.n_persons { n_persons } else { self.n_weight };
        Self { n_persons, n_weight, ..*self }
    }

    /// `θ` with person `i`'s raw ability (and raw weight, for per-person
    /// weight strategies) removed, laid out for [`Self::without_person`].
    pub fn drop_person(&self, theta: &Theta, i: usize) -> Theta {
        let skip_z = self.z_index(i, 0)..self.z_index(i, 0) + 2;
        let w = self.weight_range();
        let skip_w = if self.n_weight == self.n_persons { w.start + i..w.start + i + 1 } else { 0..0 };
        theta
            .iter()
            .enumerate()
            .filter(|(k, _)| !skip_z.contains(k) && !skip_w.contains(k))
            .map(|(_, &v)| v)
            .collect()
    }
}
