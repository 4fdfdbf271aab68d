//! Python-boundary helpers: array extraction and record assembly.
//!
//! Everything here is compiled only with the `python-bindings` feature and
//! is used by the `#[pyclass]` wrappers in the crate root.
#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, prelude::*, types::PyAny};

#[cfg(feature = "python-bindings")]
use crate::irt::core::data::ObservationRecord;

#[cfg(feature = "python-bindings")]
use numpy::{
    IntoPyArray,    // Vec → PyArray
    PyArrayMethods, // .readonly()
    PyReadonlyArray1,
};

/// Accept a contiguous float64 ndarray, a pandas Series (via `to_numpy`),
/// or any sequence of floats.
#[cfg(feature = "python-bindings")]
#[inline]
pub fn extract_f64_array<'py>(
    py: Python<'py>, raw_data: &Bound<'py, PyAny>,
) -> PyResult<PyReadonlyArray1<'py, f64>> {
    if let Ok(arr_ro) = raw_data.extract::<PyReadonlyArray1<f64>>() {
        if arr_ro.as_slice().is_ok() {
            return Ok(arr_ro);
        }
    }

    if let Ok(obj) = raw_data.call_method("to_numpy", (false,), None) {
        if let Ok(series_ro) = obj.extract::<PyReadonlyArray1<f64>>() {
            if series_ro.as_slice().is_ok() {
                return Ok(series_ro);
            }
        }
    }

    let vec: Vec<f64> = raw_data.extract().map_err(|_| {
        pyo3::exceptions::PyTypeError::new_err(
            "expected a 1-D numpy.ndarray, pandas.Series, or sequence of float64",
        )
    })?;
    Ok(vec.into_pyarray(py).readonly())
}

/// Float array as an owned `Vec`.
#[cfg(feature = "python-bindings")]
pub fn extract_f64_vec<'py>(
    py: Python<'py>, raw_data: &Bound<'py, PyAny>, name: &str,
) -> PyResult<Vec<f64>> {
    let arr = extract_f64_array(py, raw_data)?;
    arr.as_slice()
        .map(|s| s.to_vec())
        .map_err(|_| PyValueError::new_err(format!("{name} must be a contiguous 1-D array")))
}

/// Non-negative integer sequence (ndarray of ints or list).
#[cfg(feature = "python-bindings")]
pub fn extract_index_vec(raw_data: &Bound<'_, PyAny>, name: &str) -> PyResult<Vec<usize>> {
    let values: Vec<i64> = raw_data.extract().map_err(|_| {
        pyo3::exceptions::PyTypeError::new_err(format!("{name} must be a sequence of integers"))
    })?;
    values
        .into_iter()
        .map(|v| {
            usize::try_from(v)
                .map_err(|_| PyValueError::new_err(format!("{name} must be non-negative, got {v}")))
        })
        .collect()
}

/// Assemble 1-based observation records from observation-level arrays and
/// person-/item-level tables.
#[cfg(feature = "python-bindings")]
pub fn build_records(
    person_index: &[usize], item_index: &[usize], response: &[usize], person_age: &[f64],
    item_categories: &[usize], item_dimension: &[String],
) -> PyResult<Vec<ObservationRecord>> {
    let n_obs = person_index.len();
    if item_index.len() != n_obs || response.len() != n_obs {
        return Err(PyValueError::new_err(
            "person_index, item_index and response must have the same length",
        ));
    }
    if item_categories.len() != item_dimension.len() {
        return Err(PyValueError::new_err(
            "item_categories and item_dimension must have one entry per item",
        ));
    }
    (0..n_obs)
        .map(|r| {
            let (p, j) = (person_index[r], item_index[r]);
            let age = p.checked_sub(1).and_then(|i| person_age.get(i)).ok_or_else(|| {
                PyValueError::new_err(format!("row {}: person_index {p} has no age", r + 1))
            })?;
            let j0 = j.checked_sub(1).filter(|&j0| j0 < item_categories.len()).ok_or_else(|| {
                PyValueError::new_err(format!("row {}: item_index {j} has no metadata", r + 1))
            })?;
            Ok(ObservationRecord {
                person_index: p,
                item_index: j,
                response_category: response[r],
                person_age: *age,
                item_category_count: item_categories[j0],
                item_dimension: item_dimension[j0].clone(),
            })
        })
        .collect()
}
