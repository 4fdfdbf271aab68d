//! authenticity_irt — joint two-dimensional IRT with participant
//! authenticity weights, LOOCV holdout scoring, and jackknife influence.
//!
//! Purpose
//! -------
//! Serve as the crate root for Rust callers and, behind the
//! `python-bindings` feature, as the PyO3 bridge exposing the joint fit to
//! Python via the `_authenticity_irt` extension module.
//!
//! Key behaviors
//! -------------
//! - Re-export the core Rust modules:
//!   - [`irt`]: data, configuration, the joint objective, fitting, holdout
//!     scoring and simulation.
//!   - [`inference`]: the LOOCV sweep and jackknife Cook's distance.
//!   - [`optimization`]: the generic L-BFGS log-likelihood driver and the
//!     shared numerical-stability helpers.
//!   - [`io`]: CSV/TOML readers and writers.
//! - Define the `JointFit` `#[pyclass]` and the `#[pymodule]` initializer.
//!
//! Invariants & assumptions
//! ------------------------
//! - All numerical work lives in the inner Rust modules; this file performs
//!   only FFI glue, input validation, and error mapping.
//! - Python inputs use the same 1-based index convention as the
//!   observation CSV.
//!
//! Conventions
//! -----------
//! - The Python class lives under `_authenticity_irt.models`.
//! - Errors from core Rust code are converted to `PyErr` (`ValueError`)
//!   at the PyO3 boundary with their `Display` message.
//!
//! Downstream usage
//! ----------------
//! - Native Rust code depends directly on the inner modules and can ignore
//!   the PyO3 items guarded by the `python-bindings` feature.
//! - The command-line front end (`src/main.rs`) drives the same APIs for
//!   file-based workflows.

pub mod inference;
pub mod io;
pub mod irt;
pub mod optimization;
pub mod utils;

#[cfg(feature = "python-bindings")]
use numpy::{IntoPyArray, PyArray2};

#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, prelude::*, types::PyAny};

#[cfg(feature = "python-bindings")]
use crate::{
    irt::{
        core::{data::IrtData, options::JointOptions},
        models::joint::{JointFit, JointModel},
    },
    utils::{build_records, extract_f64_vec, extract_index_vec},
};

/// JointFit — Python-facing fit of the joint weighted GRM.
///
/// Constructed from Python as
/// `JointFit(person_index, item_index, response, person_age,
/// item_categories, item_dimension, config=None)`:
/// - `person_index`, `item_index`, `response`: one entry per observation;
///   indices are 1-based.
/// - `person_age`: one entry per person.
/// - `item_categories`, `item_dimension`: one entry per item; dimensions are
///   `"psychosocial"` or `"developmental"`.
/// - `config`: optional TOML text parsed into `JointOptions`.
///
/// The fit runs in the constructor; a non-converged run raises
/// `ValueError`.
#[cfg(feature = "python-bindings")]
#[pyclass(name = "JointFit", module = "authenticity_irt.models")]
pub struct PyJointFit {
    inner: JointFit,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl PyJointFit {
    #[new]
    #[pyo3(
        signature = (
            person_index,
            item_index,
            response,
            person_age,
            item_categories,
            item_dimension,
            config = None,
        )
    )]
    pub fn new<'py>(
        py: Python<'py>, person_index: &Bound<'py, PyAny>, item_index: &Bound<'py, PyAny>,
        response: &Bound<'py, PyAny>, person_age: &Bound<'py, PyAny>,
        item_categories: &Bound<'py, PyAny>, item_dimension: Vec<String>,
        config: Option<&str>,
    ) -> PyResult<Self> {
        let records = build_records(
            &extract_index_vec(person_index, "person_index")?,
            &extract_index_vec(item_index, "item_index")?,
            &extract_index_vec(response, "response")?,
            &extract_f64_vec(py, person_age, "person_age")?,
            &extract_index_vec(item_categories, "item_categories")?,
            &item_dimension,
        )?;
        let data = IrtData::from_records(&records)?;
        let options: JointOptions = match config {
            Some(text) => toml::from_str(text)
                .map_err(|e| PyValueError::new_err(format!("invalid config: {e}")))?,
            None => JointOptions::default(),
        };
        let mut model = JointModel::new(&data, options)?;
        model.fit_default(&data)?;
        Ok(Self { inner: model.into_fit()? })
    }

    #[getter]
    pub fn tau(&self) -> Vec<f64> {
        self.inner.items.tau.to_vec()
    }

    #[getter]
    pub fn beta1(&self) -> Vec<f64> {
        self.inner.items.beta1.to_vec()
    }

    #[getter]
    pub fn delta(&self) -> Vec<f64> {
        self.inner.items.delta.to_vec()
    }

    #[getter]
    pub fn rho(&self) -> Option<f64> {
        self.inner.rho
    }

    /// `N × 2` abilities (psychosocial, developmental).
    #[getter]
    pub fn abilities<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<f64>> {
        self.inner.abilities.clone().into_pyarray(py)
    }

    #[getter]
    pub fn weights(&self) -> Vec<f64> {
        self.inner.weights.to_vec()
    }

    #[getter]
    pub fn skew_z(&self) -> f64 {
        self.inner.diagnostics.skewness.z
    }

    #[getter]
    pub fn skew_p_value(&self) -> Option<f64> {
        self.inner.diagnostics.skewness.p_value
    }

    #[getter]
    pub fn n_eff(&self) -> f64 {
        self.inner.diagnostics.skewness.n_eff
    }

    #[getter]
    pub fn n_low_weight(&self) -> usize {
        self.inner.diagnostics.n_low_weight
    }

    #[getter]
    pub fn n_high_weight(&self) -> usize {
        self.inner.diagnostics.n_high_weight
    }

    #[getter]
    pub fn converged(&self) -> bool {
        self.inner.status.converged
    }

    #[getter]
    pub fn iterations(&self) -> usize {
        self.inner.status.iterations
    }

    #[getter]
    pub fn objective(&self) -> f64 {
        self.inner.status.objective
    }
}

/// Module initializer for `_authenticity_irt`.
///
/// Creates the `models` submodule, attaches it to the parent, and registers
/// it in `sys.modules` so dotted imports work.
#[cfg(feature = "python-bindings")]
#[pymodule]
fn _authenticity_irt<'py>(_py: Python<'py>, m: &Bound<'py, PyModule>) -> PyResult<()> {
    let models_mod = PyModule::new(_py, "models")?;
    models(_py, m, &models_mod)?;

    // Manually add submodules into sys.modules to allow for dot notation.
    _py.import("sys")?.getattr("modules")?.set_item("authenticity_irt.models", models_mod)?;
    Ok(())
}

#[cfg(feature = "python-bindings")]
fn models<'py>(
    _py: Python, authenticity_irt: &Bound<'py, PyModule>, m: &Bound<'py, PyModule>,
) -> PyResult<()> {
    m.add_class::<PyJointFit>()?;
    authenticity_irt.add_submodule(m)?;
    Ok(())
}
