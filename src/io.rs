//! File formats: observation CSV, TOML configuration, and result tables.
//!
//! Purpose
//! -------
//! Keep every file-format concern out of the numerical layers. Readers
//! parse and validate into the model types; writers serialize fits, LOOCV
//! records and Cook's distances into flat CSV/TOML artifacts.
//!
//! Key behaviors
//! -------------
//! - Observation CSV: columns `person_index, item_index, response_category,
//!   person_age, item_category_count, item_dimension`, 1-based indices,
//!   whitespace trimmed. Schema checks happen in `IrtData::from_records`.
//! - `JointOptions` / `SimulationConfig` from TOML; missing fields take
//!   defaults, unknown fields are rejected.
//! - `fit.toml` and `persons.csv` for a joint fit.
//! - `loocv.csv` through [`LoocvCsvWriter`], which appends rows keyed by
//!   `person_index` and writes the header only into an empty file.
//!   [`read_loocv`] keeps the last row per person.
//! - `cooks_d.csv` and the `p × p` `jackknife_hessian.csv`.
//!
//! Conventions
//! -----------
//! - Person indices are written 1-based; all in-memory types are 0-based.
//! - Invalid LOOCV rows leave the numeric cells empty.
use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
};

use csv::{ReaderBuilder, Trim, WriterBuilder};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::{
    inference::{JackknifeReport, LoocvRecord, LoocvReport},
    irt::{
        core::{data::IrtData, data::ObservationRecord, objective::ObjectiveTerms},
        errors::IrtError,
        models::{FitDiagnostics, FitStatus, JointFit, PersonStats},
    },
};

/// Errors raised while reading or writing data files.
#[derive(Debug, Error)]
pub enum DataIoError {
    #[error("I/O error on '{}': {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },

    #[error("CSV error in '{}': {source}", path.display())]
    Csv { path: PathBuf, source: csv::Error },

    #[error("Invalid TOML in '{}': {source}", path.display())]
    TomlRead { path: PathBuf, source: toml::de::Error },

    #[error("Failed to serialize TOML: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    #[error("'{}', row {row}: {reason}", path.display())]
    Malformed { path: PathBuf, row: usize, reason: String },

    #[error(transparent)]
    Irt(#[from] IrtError),
}

pub type DataIoResult<T> = Result<T, DataIoError>;

fn csv_err(path: &Path) -> impl FnOnce(csv::Error) -> DataIoError + '_ {
    move |source| DataIoError::Csv { path: path.to_path_buf(), source }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> DataIoError + '_ {
    move |source| DataIoError::Io { path: path.to_path_buf(), source }
}

// ---- Observations ----

/// Read and validate an observation CSV.
pub fn read_observations(path: &Path) -> DataIoResult<IrtData> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(csv_err(path))?;
    let records = rdr
        .deserialize::<ObservationRecord>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(csv_err(path))?;
    Ok(IrtData::from_records(&records)?)
}

pub fn write_observations(path: &Path, data: &IrtData) -> DataIoResult<()> {
    let mut wtr = WriterBuilder::new().has_headers(true).from_path(path).map_err(csv_err(path))?;
    for rec in data.to_records() {
        wtr.serialize(rec).map_err(csv_err(path))?;
    }
    wtr.flush().map_err(io_err(path))
}

// ---- Configuration ----

/// Parse a TOML file into any configuration type (`JointOptions`,
/// `SimulationConfig`, ...).
pub fn read_toml<T: DeserializeOwned>(path: &Path) -> DataIoResult<T> {
    let text = fs::read_to_string(path).map_err(io_err(path))?;
    toml::from_str(&text)
        .map_err(|source| DataIoError::TomlRead { path: path.to_path_buf(), source })
}

// ---- Joint fit ----

/// Item parameters in natural units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub tau: Vec<f64>,
    pub beta1: Vec<f64>,
    /// One entry per dimension, or a single shared value.
    pub delta: Vec<f64>,
}

/// Contents of `fit.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    pub rho: Option<f64>,
    pub status: FitStatus,
    pub terms: ObjectiveTerms,
    pub items: ItemSummary,
    pub diagnostics: FitDiagnostics,
}

impl From<&JointFit> for FitSummary {
    fn from(fit: &JointFit) -> Self {
        Self {
            rho: fit.rho,
            status: fit.status.clone(),
            terms: fit.terms,
            items: ItemSummary {
                tau: fit.items.tau.to_vec(),
                beta1: fit.items.beta1.to_vec(),
                delta: fit.items.delta.to_vec(),
            },
            diagnostics: fit.diagnostics.clone(),
        }
    }
}

pub fn write_fit_summary(path: &Path, fit: &JointFit) -> DataIoResult<()> {
    let text = toml::to_string_pretty(&FitSummary::from(fit))?;
    fs::write(path, text).map_err(io_err(path))
}

#[derive(Debug, Serialize)]
struct PersonRow {
    person_index: usize,
    ability_psychosocial: f64,
    ability_developmental: f64,
    weight: f64,
    mean_loglik: f64,
    sd_loglik: f64,
    t_stat: f64,
}

pub fn write_persons(path: &Path, persons: &[PersonStats]) -> DataIoResult<()> {
    let mut wtr = WriterBuilder::new().has_headers(true).from_path(path).map_err(csv_err(path))?;
    for p in persons {
        wtr.serialize(PersonRow {
            person_index: p.person + 1,
            ability_psychosocial: p.ability[0],
            ability_developmental: p.ability[1],
            weight: p.weight,
            mean_loglik: p.mean_loglik,
            sd_loglik: p.sd_loglik,
            t_stat: p.t_stat,
        })
        .map_err(csv_err(path))?;
    }
    wtr.flush().map_err(io_err(path))
}

// ---- LOOCV ----

const LOOCV_FIXED_COLUMNS: [&str; 6] = [
    "person_index",
    "valid",
    "reason",
    "ability_psychosocial",
    "ability_developmental",
    "log_posterior",
];

/// Append-only writer for `loocv.csv`.
pub struct LoocvCsvWriter {
    path: PathBuf,
    n_params: usize,
    wtr: csv::Writer<File>,
}

impl LoocvCsvWriter {
    /// Open `path` for appending, writing the header if the file is empty.
    pub fn open(path: &Path, n_params: usize) -> DataIoResult<Self> {
        let file =
            OpenOptions::new().create(true).append(true).open(path).map_err(io_err(path))?;
        let empty = file.metadata().map_err(io_err(path))?.len() == 0;
        let mut wtr = WriterBuilder::new().has_headers(false).from_writer(file);
        if empty {
            let header = LOOCV_FIXED_COLUMNS
                .iter()
                .map(|s| s.to_string())
                .chain((1..=n_params).map(|k| format!("diff_{k}")));
            wtr.write_record(header).map_err(csv_err(path))?;
        }
        Ok(Self { path: path.to_path_buf(), n_params, wtr })
    }

    pub fn append(&mut self, record: &LoocvRecord) -> DataIoResult<()> {
        let num = |v: Option<f64>| v.map(|x| format!("{x:.12e}")).unwrap_or_default();
        let mut row = vec![
            (record.person + 1).to_string(),
            record.valid.to_string(),
            record.reason.clone().unwrap_or_default(),
            num(record.ability.map(|a| a[0])),
            num(record.ability.map(|a| a[1])),
            num(record.log_posterior),
        ];
        match &record.diff {
            Some(diff) => row.extend(diff.iter().map(|d| format!("{d:.12e}"))),
            None => row.extend(std::iter::repeat(String::new()).take(self.n_params)),
        }
        self.wtr.write_record(&row).map_err(csv_err(&self.path))
    }

    pub fn flush(&mut self) -> DataIoResult<()> {
        self.wtr.flush().map_err(io_err(&self.path))
    }
}

/// Write a whole report, appending to any rows already in `path`.
pub fn write_loocv(path: &Path, report: &LoocvReport) -> DataIoResult<()> {
    let mut writer = LoocvCsvWriter::open(path, report.n_params)?;
    for record in &report.records {
        writer.append(record)?;
    }
    writer.flush()
}

/// Read `loocv.csv` back into a report. Later rows for the same person
/// replace earlier ones.
pub fn read_loocv(path: &Path) -> DataIoResult<LoocvReport> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(csv_err(path))?;
    let header = rdr.headers().map_err(csv_err(path))?.clone();
    let fixed = LOOCV_FIXED_COLUMNS.len();
    let header_ok = header.len() >= fixed
        && header.iter().zip(LOOCV_FIXED_COLUMNS).all(|(h, want)| h == want);
    if !header_ok {
        return Err(DataIoError::Malformed {
            path: path.to_path_buf(),
            row: 0,
            reason: format!("expected header to start with {}", LOOCV_FIXED_COLUMNS.join(",")),
        });
    }
    let n_params = header.len() - fixed;

    let mut by_person = BTreeMap::new();
    for (idx, rec) in rdr.records().enumerate() {
        let row = idx + 1;
        let rec = rec.map_err(csv_err(path))?;
        let malformed =
            |reason: String| DataIoError::Malformed { path: path.to_path_buf(), row, reason };
        let field = |k: usize| rec.get(k).unwrap_or("");
        let opt_num = |k: usize| -> DataIoResult<Option<f64>> {
            let s = field(k);
            if s.is_empty() {
                return Ok(None);
            }
            s.parse::<f64>()
                .map(Some)
                .map_err(|e| malformed(format!("column '{}': {e}", &header[k])))
        };

        let person_index: usize = field(0)
            .parse()
            .map_err(|e| malformed(format!("person_index: {e}")))?;
        if person_index == 0 {
            return Err(malformed("person_index is 1-based".to_string()));
        }
        let valid: bool = field(1).parse().map_err(|e| malformed(format!("valid: {e}")))?;
        let reason = Some(field(2).to_string()).filter(|s| !s.is_empty());
        let ability = match (opt_num(3)?, opt_num(4)?) {
            (Some(a), Some(b)) => Some([a, b]),
            _ => None,
        };
        let log_posterior = opt_num(5)?;
        let diff = if valid {
            let values = (fixed..fixed + n_params)
                .map(|k| opt_num(k)?.ok_or_else(|| malformed(format!("missing {}", &header[k]))))
                .collect::<DataIoResult<Vec<f64>>>()?;
            Some(Array1::from(values))
        } else {
            None
        };
        let person = person_index - 1;
        by_person.insert(
            person,
            LoocvRecord {
                person,
                valid,
                reason,
                ability: if valid { ability } else { None },
                standard_errors: None,
                log_posterior: if valid { log_posterior } else { None },
                diff,
            },
        );
    }
    Ok(LoocvReport::new(by_person.into_values().collect(), n_params))
}

// ---- Cook's distance ----

#[derive(Debug, Serialize)]
struct CooksRow {
    person_index: usize,
    cooks_d: f64,
    cooks_d_scaled: f64,
    influential_at_4: bool,
    influential_at_n: bool,
}

pub fn write_cooks(path: &Path, report: &JackknifeReport) -> DataIoResult<()> {
    let mut wtr = WriterBuilder::new().has_headers(true).from_path(path).map_err(csv_err(path))?;
    for r in &report.records {
        wtr.serialize(CooksRow {
            person_index: r.person + 1,
            cooks_d: r.cooks_d,
            cooks_d_scaled: r.cooks_d_scaled,
            influential_at_4: r.influential_at_4,
            influential_at_n: r.influential_at_n,
        })
        .map_err(csv_err(path))?;
    }
    wtr.flush().map_err(io_err(path))
}

/// Write a matrix with `param_1..param_p` headers.
pub fn write_matrix(path: &Path, mat: &Array2<f64>) -> DataIoResult<()> {
    let mut wtr = WriterBuilder::new().has_headers(true).from_path(path).map_err(csv_err(path))?;
    wtr.write_record((1..=mat.ncols()).map(|j| format!("param_{j}"))).map_err(csv_err(path))?;
    for row in mat.rows() {
        wtr.write_record(row.iter().map(|v| format!("{v:.12e}"))).map_err(csv_err(path))?;
    }
    wtr.flush().map_err(io_err(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irt::{
        core::options::JointOptions,
        simulate::{SimulationConfig, simulate},
    };
    use ndarray::array;
    use tempfile::tempdir;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover the observation CSV, TOML configuration, the
    // append-only LOOCV table, and the fixed-layout result writers.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Observation files are read back into identical data, and schema
    // errors surface with their row.
    //
    // Given
    // -----
    // - A simulated sample written to CSV; a hand-written file with an
    //   unknown dimension on its second data row and padded fields.
    //
    // Expect
    // ------
    // - Equal data; `IrtError::UnknownDimension { row: 2, .. }`.
    fn observations_read_back() {
        // Arrange
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("obs.csv");
        let sim = simulate(&SimulationConfig { n_persons: 5, n_items: 3, ..Default::default() })
            .expect("valid config");
        let bad = dir.path().join("bad.csv");
        let header = concat!(
            "person_index,item_index,response_category,",
            "person_age,item_category_count,item_dimension"
        );
        let rows = "1, 1, 0, 0.5, 3, Psychosocial\n1, 2, 2, 0.5, 3, cognitive\n";
        fs::write(&bad, format!("{header}\n{rows}")).expect("write");

        // Act
        write_observations(&path, &sim.data).expect("write");
        let back = read_observations(&path).expect("read");
        let err = read_observations(&bad).expect_err("unknown dimension");

        // Assert
        assert_eq!(back, sim.data);
        assert!(matches!(err, DataIoError::Irt(IrtError::UnknownDimension { row: 2, .. })));
    }

    #[test]
    // Purpose
    // -------
    // Partial TOML configuration fills in defaults.
    //
    // Given
    // -----
    // - A file setting only the skewness weight and the weight model.
    //
    // Expect
    // ------
    // - Those fields set, everything else default; a typo is rejected.
    fn options_from_toml() {
        // Arrange
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("model.toml");
        fs::write(&path, "[skewness]\nlambda = 0.0\n\n[weights]\nkind = \"fixed\"\n")
            .expect("write");
        let typo = dir.path().join("typo.toml");
        fs::write(&typo, "[skewnes]\nlambda = 0.0\n").expect("write");

        // Act
        let opts: JointOptions = read_toml(&path).expect("valid toml");
        let err = read_toml::<JointOptions>(&typo).expect_err("unknown section");

        // Assert
        assert_eq!(opts.skewness.lambda, 0.0);
        assert_eq!(opts.weights, crate::irt::core::weights::WeightModel::Fixed);
        assert_eq!(opts.priors, JointOptions::default().priors);
        assert!(matches!(err, DataIoError::TomlRead { .. }));
    }

    #[test]
    // Purpose
    // -------
    // The LOOCV table appends, keeps the header once, and reads back keyed
    // by person.
    //
    // Given
    // -----
    // - Two appends: persons 1 (valid) and 0 (invalid), then person 1 again
    //   with a different difference vector.
    //
    // Expect
    // ------
    // - One header; the report holds persons 0 and 1 sorted, person 1 with
    //   the later vector, person 0 invalid with its reason and no numbers.
    fn loocv_table_appends_and_reads() {
        // Arrange
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("loocv.csv");
        let valid = |diff: Array1<f64>| LoocvRecord {
            person: 1,
            valid: true,
            reason: None,
            ability: Some([0.25, -0.5]),
            standard_errors: None,
            log_posterior: Some(-3.5),
            diff: Some(diff),
        };
        let first = LoocvReport::new(
            vec![valid(array![0.1, 0.2, 0.3]), LoocvRecord::invalid(0, "refit diverged")],
            3,
        );

        // Act
        write_loocv(&path, &first).expect("write");
        let mut writer = LoocvCsvWriter::open(&path, 3).expect("reopen");
        writer.append(&valid(array![0.4, 0.5, 0.6])).expect("append");
        writer.flush().expect("flush");
        let back = read_loocv(&path).expect("read");

        // Assert
        let text = fs::read_to_string(&path).expect("read text");
        assert_eq!(text.matches("person_index").count(), 1);
        assert_eq!(back.n_params, 3);
        assert_eq!(back.records.len(), 2);
        assert_eq!(back.records[0].reason.as_deref(), Some("refit diverged"));
        assert!(!back.records[0].valid && back.records[0].diff.is_none());
        let diff = back.records[1].diff.as_ref().expect("valid record");
        assert!((diff[2] - 0.6).abs() < 1e-12);
        assert_eq!(back.records[1].ability, Some([0.25, -0.5]));
    }

    #[test]
    // Purpose
    // -------
    // Result writers produce the documented columns.
    //
    // Given
    // -----
    // - A small Cook's distance report and a 2 × 2 matrix.
    //
    // Expect
    // ------
    // - Headers as documented with 1-based person indices.
    fn result_tables_have_documented_columns() {
        // Arrange
        let dir = tempdir().expect("temp dir");
        let records: Vec<(usize, Array1<f64>)> =
            [1.0, -1.0, 2.0, -2.0].iter().enumerate().map(|(i, &d)| (i, array![d])).collect();
        let report = crate::inference::cooks_distance(&records, 1).expect("valid records");
        let cooks = dir.path().join("cooks_d.csv");
        let hess = dir.path().join("jackknife_hessian.csv");

        // Act
        write_cooks(&cooks, &report).expect("write");
        write_matrix(&hess, &array![[1.0, 0.5], [0.5, 2.0]]).expect("write");

        // Assert
        let text = fs::read_to_string(&cooks).expect("read");
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("person_index,cooks_d,cooks_d_scaled,influential_at_4,influential_at_n")
        );
        assert!(lines.next().expect("first row").starts_with("1,"));
        let text = fs::read_to_string(&hess).expect("read");
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("param_1,param_2"));
    }
}
