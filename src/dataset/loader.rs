//! Tabular dataset loader for CSV and `.npy` inputs.

use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, Axis};
use ndarray_npy::{ReadNpyError, read_npy};
use thiserror::Error;

use super::labels::{LabelValue, canonical_label};

/// Trailing header names recognized as a label column when the arity is unknown.
pub const LABEL_COLUMN_NAMES: &[&str] = &["label", "labels", "species", "final_label"];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("unsupported file extension {extension:?} for {}", path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },
    #[error("csv error in {}: {source}", path.display())]
    Csv { path: PathBuf, source: csv::Error },
    #[error("npy error in {}: {source}", path.display())]
    Npy { path: PathBuf, source: ReadNpyError },
    #[error("{}: row {row}, column {column:?}: {message}", path.display())]
    Malformed {
        path: PathBuf,
        row: usize,
        column: String,
        message: String,
    },
    #[error("{} has no feature columns", .0.display())]
    NoFeatures(PathBuf),
    #[error("{}: expected {expected} feature columns, found {found}", path.display())]
    ArityMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
    #[error("{} has no label column", .0.display())]
    NoLabelColumn(PathBuf),
    #[error("{}: {features} feature rows but {labels} labels", path.display())]
    LabelCountMismatch {
        path: PathBuf,
        features: usize,
        labels: usize,
    },
}

/// Supported on-disk encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Npy,
}

impl TableFormat {
    /// Detect the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "csv" => Ok(TableFormat::Csv),
            "npy" => Ok(TableFormat::Npy),
            _ => Err(LoadError::UnsupportedFormat {
                path: path.to_path_buf(),
                extension,
            }),
        }
    }
}

/// Feature matrix plus the optional label column found next to it.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub path: PathBuf,
    pub format: TableFormat,
    /// Names of the feature columns, synthesized as `feature_{i}` for `.npy`.
    pub feature_names: Vec<String>,
    /// Row-major features, one row per sample.
    pub features: Array2<f32>,
    /// Name of the stripped label column, when one was detected.
    pub label_column: Option<String>,
    /// Canonical labels aligned with `features`, when a label column was detected.
    pub labels: Option<Vec<String>>,
}

impl FeatureTable {
    pub fn n_rows(&self) -> usize {
        self.features.nrows()
    }

    pub fn arity(&self) -> usize {
        self.features.ncols()
    }

    /// Copy one row out of the matrix.
    pub fn row(&self, index: usize) -> Option<Vec<f32>> {
        if index >= self.n_rows() {
            return None;
        }
        Some(self.features.row(index).to_vec())
    }
}

/// Load a feature table.
///
/// Only the trailing column can be a label column. With a known
/// `feature_arity` it is stripped when the file has exactly one extra column;
/// otherwise it is stripped when its header is a known label name.
pub fn load_features(path: &Path, feature_arity: Option<usize>) -> Result<FeatureTable, LoadError> {
    ensure_exists(path)?;
    match TableFormat::from_path(path)? {
        TableFormat::Csv => load_csv(path, feature_arity),
        TableFormat::Npy => load_npy_features(path, feature_arity),
    }
}

/// Labels read from a dedicated label file.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelColumn {
    /// Header of the label column; `None` for `.npy` files.
    pub name: Option<String>,
    /// Canonical labels in row order.
    pub values: Vec<String>,
}

/// Load a label vector: the last column of a table, or a 1-D `.npy` array.
pub fn load_labels(path: &Path) -> Result<LabelColumn, LoadError> {
    ensure_exists(path)?;
    match TableFormat::from_path(path)? {
        TableFormat::Csv => {
            let mut reader = csv_reader(path)?;
            let name = reader
                .headers()
                .map_err(|source| LoadError::Csv {
                    path: path.to_path_buf(),
                    source,
                })?
                .iter()
                .last()
                .map(str::to_string);
            let mut values = Vec::new();
            for (row_idx, record) in reader.records().enumerate() {
                let record = record.map_err(|source| LoadError::Csv {
                    path: path.to_path_buf(),
                    source,
                })?;
                let Some(cell) = record.iter().last() else {
                    return Err(malformed(path, row_idx, "", "empty row"));
                };
                values.push(canonical_label(cell));
            }
            Ok(LabelColumn { name, values })
        }
        TableFormat::Npy => Ok(LabelColumn {
            name: None,
            values: load_npy_labels(path)?,
        }),
    }
}

fn ensure_exists(path: &Path) -> Result<(), LoadError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(LoadError::NotFound(path.to_path_buf()))
    }
}

fn csv_reader(path: &Path) -> Result<csv::Reader<std::fs::File>, LoadError> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })
}

fn malformed(path: &Path, row: usize, column: &str, message: &str) -> LoadError {
    LoadError::Malformed {
        path: path.to_path_buf(),
        row,
        column: column.to_string(),
        message: message.to_string(),
    }
}

/// Index of the trailing label column for a header, if any.
fn detect_label_column(headers: &[String], feature_arity: Option<usize>) -> Option<usize> {
    let last = headers.len().checked_sub(1).filter(|&last| last > 0)?;
    match feature_arity {
        Some(arity) => (headers.len() == arity + 1).then_some(last),
        None => LABEL_COLUMN_NAMES
            .iter()
            .any(|known| headers[last].eq_ignore_ascii_case(known))
            .then_some(last),
    }
}

fn load_csv(path: &Path, feature_arity: Option<usize>) -> Result<FeatureTable, LoadError> {
    let mut reader = csv_reader(path)?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .iter()
        .map(str::to_string)
        .collect();
    let label_idx = detect_label_column(&headers, feature_arity);
    let feature_idx: Vec<usize> = (0..headers.len()).filter(|&i| Some(i) != label_idx).collect();
    if feature_idx.is_empty() {
        return Err(LoadError::NoFeatures(path.to_path_buf()));
    }
    if let Some(expected) = feature_arity
        && expected != feature_idx.len()
    {
        return Err(LoadError::ArityMismatch {
            path: path.to_path_buf(),
            expected,
            found: feature_idx.len(),
        });
    }

    let mut values = Vec::new();
    let mut labels = Vec::new();
    let mut n_rows = 0usize;
    for (row_idx, record) in reader.records().enumerate() {
        let record = record.map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        for &col in &feature_idx {
            let cell = record.get(col).unwrap_or_default();
            let value = cell
                .parse::<f32>()
                .map_err(|err| malformed(path, row_idx, &headers[col], &err.to_string()))?;
            values.push(value);
        }
        if let Some(col) = label_idx {
            labels.push(canonical_label(record.get(col).unwrap_or_default()));
        }
        n_rows += 1;
    }

    let features = Array2::from_shape_vec((n_rows, feature_idx.len()), values)
        .map_err(|err| malformed(path, n_rows, "", &err.to_string()))?;
    Ok(FeatureTable {
        path: path.to_path_buf(),
        format: TableFormat::Csv,
        feature_names: feature_idx.iter().map(|&i| headers[i].clone()).collect(),
        features,
        label_column: label_idx.map(|i| headers[i].clone()),
        labels: label_idx.map(|_| labels),
    })
}

fn read_matrix(path: &Path) -> Result<Array2<f32>, LoadError> {
    let npy_err = |source| LoadError::Npy {
        path: path.to_path_buf(),
        source,
    };
    if let Ok(matrix) = read_npy::<_, Array2<f32>>(path) {
        return Ok(matrix);
    }
    match read_npy::<_, Array2<f64>>(path) {
        Ok(matrix) => Ok(matrix.mapv(|v| v as f32)),
        Err(_) => {
            // Single-feature datasets are often saved as 1-D arrays.
            let column = read_npy::<_, Array1<f64>>(path).map_err(npy_err)?;
            Ok(column.mapv(|v| v as f32).insert_axis(Axis(1)))
        }
    }
}

fn load_npy_features(path: &Path, feature_arity: Option<usize>) -> Result<FeatureTable, LoadError> {
    let matrix = read_matrix(path)?;
    let (features, labels) = match feature_arity {
        Some(arity) if matrix.ncols() == arity + 1 => {
            let labels = matrix
                .column(arity)
                .iter()
                .map(|&v| LabelValue::Float(v as f64).canonical())
                .collect();
            (matrix.slice(ndarray::s![.., ..arity]).to_owned(), Some(labels))
        }
        Some(arity) if matrix.ncols() != arity => {
            return Err(LoadError::ArityMismatch {
                path: path.to_path_buf(),
                expected: arity,
                found: matrix.ncols(),
            });
        }
        _ => (matrix, None),
    };
    if features.ncols() == 0 {
        return Err(LoadError::NoFeatures(path.to_path_buf()));
    }
    Ok(FeatureTable {
        path: path.to_path_buf(),
        format: TableFormat::Npy,
        feature_names: (0..features.ncols()).map(|i| format!("feature_{i}")).collect(),
        features,
        label_column: labels.as_ref().map(|_| "label".to_string()),
        labels,
    })
}

fn load_npy_labels(path: &Path) -> Result<Vec<String>, LoadError> {
    if let Ok(values) = read_npy::<_, Array1<i64>>(path) {
        return Ok(values.iter().map(|v| v.to_string()).collect());
    }
    if let Ok(values) = read_npy::<_, Array1<f64>>(path) {
        return Ok(values
            .iter()
            .map(|&v| LabelValue::Float(v).canonical())
            .collect());
    }
    let matrix = read_matrix(path)?;
    let last = matrix.ncols().saturating_sub(1);
    Ok(matrix
        .column(last)
        .iter()
        .map(|&v| LabelValue::Float(v as f64).canonical())
        .collect())
}
