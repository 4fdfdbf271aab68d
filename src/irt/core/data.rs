//! Observation containers for the joint IRT model.
//!
//! Purpose
//! -------
//! Validate raw `(person, item, response)` records once, at load time, and
//! store them in a layout the likelihood can reduce over without any
//! per-evaluation bookkeeping.
//!
//! Key behaviors
//! -------------
//! - [`IrtData::from_records`] checks the external schema (1-based dense
//!   indices, response below the item's category count, finite and
//!   consistent ages, consistent item metadata, known dimension labels) and
//!   names the offending 1-based data row on failure.
//! - Observations are stored sorted by person; a CSR offset table maps each
//!   person to its contiguous observation range. The table is built once
//!   and never mutated.
//! - Subsetting helpers build new, independent containers:
//!   [`IrtData::without_person`], [`IrtData::holdout`], [`IrtData::replicate`].
//!
//! Invariants & assumptions
//! ------------------------
//! - Every person has at least one observation (dense person index).
//! - `response < items[item].categories` and `categories >= 2` for all rows.
//! - After `without_person`, an item may have no remaining observations; its
//!   parameters are then identified by their priors only.
//!
//! Conventions
//! -----------
//! - Internally all indices are 0-based. [`ObservationRecord`] is the only
//!   type carrying 1-based indices.
//! - Dimension 0 is psychosocial, dimension 1 developmental.
use crate::irt::errors::{IrtError, IrtResult};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Latent dimension an item loads on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Psychosocial,
    Developmental,
}

impl Dimension {
    pub const ALL: [Dimension; 2] = [Dimension::Psychosocial, Dimension::Developmental];

    /// Column of the ability matrix for this dimension.
    pub fn index(self) -> usize {
        match self {
            Dimension::Psychosocial => 0,
            Dimension::Developmental => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Dimension::Psychosocial => "psychosocial",
            Dimension::Developmental => "developmental",
        }
    }

    /// Case-insensitive parse of an external dimension label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "psychosocial" => Some(Dimension::Psychosocial),
            "developmental" => Some(Dimension::Developmental),
            _ => None,
        }
    }
}

/// One row of the external observation table. Indices are 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub person_index: usize,
    pub item_index: usize,
    pub response_category: usize,
    pub person_age: f64,
    pub item_category_count: usize,
    pub item_dimension: String,
}

/// Static item metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemMeta {
    pub categories: usize,
    pub dimension: Dimension,
}

/// A single validated response, 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub person: usize,
    pub item: usize,
    pub response: usize,
}

/// One person's responses, detached from the rest of the sample.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonResponses {
    pub age: f64,
    /// `(item, response)` pairs, 0-based.
    pub responses: Vec<(usize, usize)>,
}

/// `IrtData` — validated observations with a person → range index.
///
/// Fields
/// ------
/// - `obs`: observations sorted by `(person, item)`.
/// - `offsets`: CSR table of length `n_persons + 1`; person `i` owns
///   `obs[offsets[i]..offsets[i + 1]]`.
/// - `ages`: one age per person.
/// - `items`: one [`ItemMeta`] per item.
#[derive(Debug, Clone, PartialEq)]
pub struct IrtData {
    obs: Vec<Observation>,
    offsets: Vec<usize>,
    ages: Array1<f64>,
    items: Vec<ItemMeta>,
}

impl IrtData {
    /// Build from 0-based observations plus person and item tables.
    ///
    /// Parameters
    /// ----------
    /// - `obs`: `Vec<Observation>`
    ///   Responses in any order; they are sorted by person here.
    /// - `ages`: `Vec<f64>`
    ///   Age per person. Its length defines the number of persons.
    /// - `items`: `Vec<ItemMeta>`
    ///   Metadata per item. Its length defines the number of items.
    ///
    /// Errors
    /// ------
    /// - `IrtError::EmptyObservations` when `obs` is empty.
    /// - `IrtError::NonFiniteAge` / `IrtError::TooFewCategories` with `row`
    ///   pointing into `ages` / `items` (1-based).
    /// - `IrtError::PersonIndexOutOfRange`, `ItemIndexOutOfRange`,
    ///   `ResponseOutOfRange` with `row` pointing into `obs` (1-based).
    /// - `IrtError::NonDenseIndex` when a person or item has no responses.
    pub fn new(mut obs: Vec<Observation>, ages: Vec<f64>, items: Vec<ItemMeta>) -> IrtResult<Self> {
        if obs.is_empty() {
            return Err(IrtError::EmptyObservations);
        }
        if let Some(pos) = ages.iter().position(|a| !a.is_finite()) {
            return Err(IrtError::NonFiniteAge { row: pos + 1, value: ages[pos] });
        }
        if let Some(pos) = items.iter().position(|m| m.categories < 2) {
            return Err(IrtError::TooFewCategories { row: pos + 1, categories: items[pos].categories });
        }
        let n_persons = ages.len();
        let mut person_seen = vec![false; n_persons];
        let mut item_seen = vec![false; items.len()];
        for (r, o) in obs.iter().enumerate() {
            if o.person >= n_persons {
                return Err(IrtError::PersonIndexOutOfRange { row: r + 1, index: o.person + 1 });
            }
            let meta = items
                .get(o.item)
                .ok_or(IrtError::ItemIndexOutOfRange { row: r + 1, index: o.item + 1 })?;
            if o.response >= meta.categories {
                return Err(IrtError::ResponseOutOfRange {
                    row: r + 1,
                    response: o.response,
                    categories: meta.categories,
                });
            }
            person_seen[o.person] = true;
            item_seen[o.item] = true;
        }
        if let Some(missing) = person_seen.iter().position(|s| !s) {
            return Err(IrtError::NonDenseIndex { kind: "Person", missing: missing + 1 });
        }
        if let Some(missing) = item_seen.iter().position(|s| !s) {
            return Err(IrtError::NonDenseIndex { kind: "Item", missing: missing + 1 });
        }
        obs.sort_by_key(|o| (o.person, o.item));
        Ok(Self::from_sorted(obs, Array1::from(ages), items))
    }

    /// Validate external 1-based records and build the container.
    ///
    /// The number of persons and items is the largest index seen; every
    /// index below it must appear. Person age and item metadata are taken
    /// from the first row that mentions them and must agree on every later
    /// row.
    ///
    /// Errors
    /// ------
    /// - Any schema violation, naming the 1-based data row (see
    ///   [`IrtError`]).
    pub fn from_records(records: &[ObservationRecord]) -> IrtResult<Self> {
        if records.is_empty() {
            return Err(IrtError::EmptyObservations);
        }
        let n_persons = records.iter().map(|r| r.person_index).max().unwrap_or(0);
        let n_items = records.iter().map(|r| r.item_index).max().unwrap_or(0);
        let mut ages: Vec<Option<f64>> = vec![None; n_persons];
        let mut items: Vec<Option<ItemMeta>> = vec![None; n_items];
        let mut obs = Vec::with_capacity(records.len());

        for (idx, rec) in records.iter().enumerate() {
            let row = idx + 1;
            if rec.person_index == 0 {
                return Err(IrtError::PersonIndexOutOfRange { row, index: 0 });
            }
            if rec.item_index == 0 {
                return Err(IrtError::ItemIndexOutOfRange { row, index: 0 });
            }
            if !rec.person_age.is_finite() {
                return Err(IrtError::NonFiniteAge { row, value: rec.person_age });
            }
            if rec.item_category_count < 2 {
                return Err(IrtError::TooFewCategories { row, categories: rec.item_category_count });
            }
            if rec.response_category >= rec.item_category_count {
                return Err(IrtError::ResponseOutOfRange {
                    row,
                    response: rec.response_category,
                    categories: rec.item_category_count,
                });
            }
            let dimension = Dimension::from_label(&rec.item_dimension)
                .ok_or_else(|| IrtError::UnknownDimension { row, label: rec.item_dimension.clone() })?;

            let person = rec.person_index - 1;
            let item = rec.item_index - 1;
            match ages[person] {
                Some(first) if first != rec.person_age => {
                    return Err(IrtError::InconsistentAge {
                        row,
                        person: rec.person_index,
                        first,
                        found: rec.person_age,
                    });
                }
                Some(_) => {}
                None => ages[person] = Some(rec.person_age),
            }
            let meta = ItemMeta { categories: rec.item_category_count, dimension };
            match items[item] {
                Some(known) if known.categories != meta.categories => {
                    return Err(IrtError::InconsistentItem {
                        row,
                        item: rec.item_index,
                        field: "category count",
                    });
                }
                Some(known) if known.dimension != meta.dimension => {
                    return Err(IrtError::InconsistentItem {
                        row,
                        item: rec.item_index,
                        field: "dimension",
                    });
                }
                Some(_) => {}
                None => items[item] = Some(meta),
            }
            obs.push(Observation { person, item, response: rec.response_category });
        }

        let ages = collect_dense(ages, "Person")?;
        let items = collect_dense(items, "Item")?;
        Self::new(obs, ages, items)
    }

    fn from_sorted(obs: Vec<Observation>, ages: Array1<f64>, items: Vec<ItemMeta>) -> Self {
        let n_persons = ages.len();
        let mut offsets = vec![0usize; n_persons + 1];
        for o in &obs {
            offsets[o.person + 1] += 1;
        }
        for i in 0..n_persons {
            offsets[i + 1] += offsets[i];
        }
        Self { obs, offsets, ages, items }
    }

    // ---- Accessors ----

    pub fn n_persons(&self) -> usize {
        self.ages.len()
    }

    pub fn n_items(&self) -> usize {
        self.items.len()
    }

    pub fn n_obs(&self) -> usize {
        self.obs.len()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.obs
    }

    /// Observation index range owned by person `i`.
    pub fn person_range(&self, i: usize) -> Range<usize> {
        self.offsets[i]..self.offsets[i + 1]
    }

    pub fn person_obs(&self, i: usize) -> &[Observation] {
        &self.obs[self.person_range(i)]
    }

    /// Number of responses `M_i` of person `i`.
    pub fn count(&self, i: usize) -> usize {
        self.offsets[i + 1] - self.offsets[i]
    }

    pub fn ages(&self) -> &Array1<f64> {
        &self.ages
    }

    pub fn age(&self, i: usize) -> f64 {
        self.ages[i]
    }

    pub fn items(&self) -> &[ItemMeta] {
        &self.items
    }

    pub fn item(&self, j: usize) -> ItemMeta {
        self.items[j]
    }

    // ---- Subsetting ----

    /// Copy of the data without person `i`. Items are kept as they are and
    /// persons above `i` shift down by one.
    ///
    /// Errors
    /// ------
    /// - `IrtError::PersonOutOfRange` if `i >= n_persons`.
    /// - `IrtError::TooFewPersons` if fewer than two persons would remain.
    pub fn without_person(&self, i: usize) -> IrtResult<IrtData> {
        let n = self.n_persons();
        if i >= n {
            return Err(IrtError::PersonOutOfRange { person: i, n_persons: n });
        }
        if n < 3 {
            return Err(IrtError::TooFewPersons { person: i });
        }
        let obs: Vec<Observation> = self
            .obs
            .iter()
            .filter(|o| o.person != i)
            .map(|o| Observation { person: if o.person > i { o.person - 1 } else { o.person }, ..*o })
            .collect();
        let ages: Array1<f64> =
            self.ages.iter().enumerate().filter(|(p, _)| *p != i).map(|(_, &a)| a).collect();
        Ok(Self::from_sorted(obs, ages, self.items.clone()))
    }

    /// Person `i`'s age and responses.
    pub fn holdout(&self, i: usize) -> IrtResult<PersonResponses> {
        let n = self.n_persons();
        if i >= n {
            return Err(IrtError::PersonOutOfRange { person: i, n_persons: n });
        }
        let responses = self.person_obs(i).iter().map(|o| (o.item, o.response)).collect();
        Ok(PersonResponses { age: self.ages[i], responses })
    }

    /// The whole sample duplicated `k` times; copy `c` of person `i` becomes
    /// person `c·N + i`.
    pub fn replicate(&self, k: usize) -> IrtResult<IrtData> {
        if k == 0 {
            return Err(IrtError::InvalidReplication);
        }
        let n = self.n_persons();
        let obs: Vec<Observation> = (0..k)
            .flat_map(|c| self.obs.iter().map(move |o| Observation { person: c * n + o.person, ..*o }))
            .collect();
        let ages: Array1<f64> = (0..k).flat_map(|_| self.ages.iter().copied()).collect();
        Ok(Self::from_sorted(obs, ages, self.items.clone()))
    }

    /// External 1-based records, in storage order.
    pub fn to_records(&self) -> Vec<ObservationRecord> {
        self.obs
            .iter()
            .map(|o| {
                let meta = self.items[o.item];
                ObservationRecord {
                    person_index: o.person + 1,
                    item_index: o.item + 1,
                    response_category: o.response,
                    person_age: self.ages[o.person],
                    item_category_count: meta.categories,
                    item_dimension: meta.dimension.label().to_string(),
                }
            })
            .collect()
    }
}

fn collect_dense<T>(slots: Vec<Option<T>>, kind: &'static str) -> IrtResult<Vec<T>> {
    slots
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| slot.ok_or(IrtError::NonDenseIndex { kind, missing: idx + 1 }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Schema validation in `from_records`, including the reported row.
    // - The CSR person index built from unsorted input.
    // - `without_person`, `holdout`, and `replicate` re-indexing.
    // -------------------------------------------------------------------------

    fn rec(person: usize, item: usize, response: usize, age: f64, dim: &str) -> ObservationRecord {
        ObservationRecord {
            person_index: person,
            item_index: item,
            response_category: response,
            person_age: age,
            item_category_count: 3,
            item_dimension: dim.to_string(),
        }
    }

    fn sample() -> Vec<ObservationRecord> {
        vec![
            rec(2, 1, 0, 3.5, "psychosocial"),
            rec(1, 2, 2, 2.0, "Developmental"),
            rec(1, 1, 1, 2.0, "psychosocial"),
            rec(3, 2, 1, 4.0, "developmental"),
            rec(2, 2, 2, 3.5, "DEVELOPMENTAL"),
            rec(3, 1, 2, 4.0, "psychosocial"),
        ]
    }

    #[test]
    // Purpose
    // -------
    // Unsorted records become a person-sorted CSR layout.
    //
    // Given
    // -----
    // - Six records for 3 persons × 2 items in shuffled order.
    //
    // Expect
    // ------
    // - Each person owns a contiguous range of two observations, sorted by
    //   item, with 0-based indices and the right ages.
    fn from_records_builds_person_index() {
        // Arrange / Act
        let data = IrtData::from_records(&sample()).expect("valid records");

        // Assert
        assert_eq!(data.n_persons(), 3);
        assert_eq!(data.n_items(), 2);
        for i in 0..3 {
            assert_eq!(data.count(i), 2);
            let obs = data.person_obs(i);
            assert!(obs.iter().all(|o| o.person == i));
            assert_eq!(obs[0].item, 0);
            assert_eq!(obs[1].item, 1);
        }
        assert_eq!(data.ages().to_vec(), vec![2.0, 3.5, 4.0]);
        assert_eq!(data.item(1).dimension, Dimension::Developmental);
    }

    #[test]
    // Purpose
    // -------
    // Schema violations name the 1-based data row.
    //
    // Given
    // -----
    // - A response equal to the category count on row 4, an unknown
    //   dimension on row 2, and a conflicting age on row 5.
    //
    // Expect
    // ------
    // - `ResponseOutOfRange { row: 4 }`, `UnknownDimension { row: 2 }`,
    //   `InconsistentAge { row: 5 }`.
    fn from_records_reports_offending_row() {
        // Arrange
        let mut bad_response = sample();
        bad_response[3].response_category = 3;
        let mut bad_dim = sample();
        bad_dim[1].item_dimension = "motor".to_string();
        let mut bad_age = sample();
        bad_age[4].person_age = 9.0;

        // Act / Assert
        assert_eq!(
            IrtData::from_records(&bad_response),
            Err(IrtError::ResponseOutOfRange { row: 4, response: 3, categories: 3 })
        );
        assert!(matches!(
            IrtData::from_records(&bad_dim),
            Err(IrtError::UnknownDimension { row: 2, .. })
        ));
        assert!(matches!(
            IrtData::from_records(&bad_age),
            Err(IrtError::InconsistentAge { row: 5, person: 2, .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // Gaps in the 1-based index space are rejected.
    //
    // Given
    // -----
    // - Records for persons 1 and 3 only.
    //
    // Expect
    // ------
    // - `NonDenseIndex` naming person 2.
    fn from_records_rejects_gaps() {
        // Arrange
        let records = vec![rec(1, 1, 0, 2.0, "psychosocial"), rec(3, 1, 1, 2.0, "psychosocial")];

        // Act
        let err = IrtData::from_records(&records).expect_err("gap must fail");

        // Assert
        assert_eq!(err, IrtError::NonDenseIndex { kind: "Person", missing: 2 });
    }

    #[test]
    // Purpose
    // -------
    // Dropping a person shifts later persons down and keeps the item table.
    //
    // Given
    // -----
    // - The 3-person sample; drop person 0.
    //
    // Expect
    // ------
    // - Two persons with the former persons 1 and 2's ages and responses;
    //   still two items.
    fn without_person_reindexes_persons() {
        // Arrange
        let data = IrtData::from_records(&sample()).expect("valid records");

        // Act
        let reduced = data.without_person(0).expect("drop succeeds");

        // Assert
        assert_eq!(reduced.n_persons(), 2);
        assert_eq!(reduced.n_items(), 2);
        assert_eq!(reduced.ages().to_vec(), vec![3.5, 4.0]);
        assert_eq!(reduced.person_obs(0)[0].response, data.person_obs(1)[0].response);
        assert_eq!(reduced.person_obs(1)[1].response, data.person_obs(2)[1].response);
        assert!(matches!(data.without_person(7), Err(IrtError::PersonOutOfRange { .. })));
    }

    #[test]
    // Purpose
    // -------
    // Replication tiles persons and holdout extracts a single person.
    //
    // Given
    // -----
    // - The 3-person sample replicated twice.
    //
    // Expect
    // ------
    // - Six persons; person 4 is a copy of person 1; holdout(4) equals
    //   holdout(1).
    fn replicate_tiles_persons() {
        // Arrange
        let data = IrtData::from_records(&sample()).expect("valid records");

        // Act
        let doubled = data.replicate(2).expect("k = 2 is valid");

        // Assert
        assert_eq!(doubled.n_persons(), 6);
        assert_eq!(doubled.n_obs(), 12);
        assert_eq!(
            doubled.holdout(4).expect("in range"),
            data.holdout(1).expect("in range")
        );
        assert_eq!(data.replicate(0), Err(IrtError::InvalidReplication));
    }
}
