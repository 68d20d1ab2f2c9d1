//! The canonical labeled dataset and its on-disk form.

use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};
use ndarray_npy::WriteNpyExt;
use tempfile::NamedTempFile;

use super::labels::LabelSpace;
use super::loader::{FeatureTable, LoadError, TableFormat, load_features, load_labels};

/// Default header for the label column when the source did not name one.
pub const DEFAULT_LABEL_COLUMN: &str = "label";

/// One labeled row.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSample {
    pub features: Vec<f32>,
    /// Canonical label string.
    pub label: String,
    /// Row of the original unlabeled dataset this sample was promoted from.
    pub original_index: Option<usize>,
}

/// Exact feature-value identity used for deduplication.
///
/// `-0.0` and `0.0` compare equal, matching float equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureKey(Vec<u32>);

impl FeatureKey {
    pub fn new(values: &[f32]) -> Self {
        Self(
            values
                .iter()
                .map(|&v| if v == 0.0 { 0.0f32.to_bits() } else { v.to_bits() })
                .collect(),
        )
    }
}

/// Labeled dataset as it stands for the current round.
#[derive(Debug, Clone)]
pub struct LabeledSet {
    pub data_path: PathBuf,
    pub labels_path: PathBuf,
    pub format: TableFormat,
    pub labels_format: TableFormat,
    pub feature_names: Vec<String>,
    pub label_column: String,
    pub samples: Vec<LabeledSample>,
}

impl LabeledSet {
    /// Load features and labels, which may live in the same file.
    pub fn load(
        data_path: &Path,
        labels_path: &Path,
        feature_arity: usize,
    ) -> Result<Self, LoadError> {
        let table = load_features(data_path, Some(feature_arity))?;
        if data_path == labels_path {
            let labels = table
                .labels
                .clone()
                .ok_or_else(|| LoadError::NoLabelColumn(data_path.to_path_buf()))?;
            let labels_format = table.format;
            let label_column = table.label_column.clone();
            return Self::from_parts(table, labels, labels_path, labels_format, label_column);
        }
        let column = load_labels(labels_path)?;
        let labels_format = TableFormat::from_path(labels_path)?;
        Self::from_parts(table, column.values, labels_path, labels_format, column.name)
    }

    fn from_parts(
        table: FeatureTable,
        labels: Vec<String>,
        labels_path: &Path,
        labels_format: TableFormat,
        label_column: Option<String>,
    ) -> Result<Self, LoadError> {
        if labels.len() != table.n_rows() {
            return Err(LoadError::LabelCountMismatch {
                path: labels_path.to_path_buf(),
                features: table.n_rows(),
                labels: labels.len(),
            });
        }
        let samples = table
            .features
            .rows()
            .into_iter()
            .zip(labels)
            .map(|(row, label)| LabeledSample {
                features: row.to_vec(),
                label,
                original_index: None,
            })
            .collect();
        Ok(Self {
            data_path: table.path,
            labels_path: labels_path.to_path_buf(),
            format: table.format,
            labels_format,
            feature_names: table.feature_names,
            label_column: label_column.unwrap_or_else(|| DEFAULT_LABEL_COLUMN.to_string()),
            samples,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn labels(&self) -> Vec<String> {
        self.samples.iter().map(|s| s.label.clone()).collect()
    }

    /// Feature identities of every row.
    pub fn feature_keys(&self) -> HashSet<FeatureKey> {
        self.samples
            .iter()
            .map(|s| FeatureKey::new(&s.features))
            .collect()
    }

    /// True when labels are the trailing column of the data file.
    pub fn labels_inline(&self) -> bool {
        self.data_path == self.labels_path
    }

    /// Files backing this set: the data file, then the label file if separate.
    pub fn source_files(&self) -> Vec<&Path> {
        if self.labels_inline() {
            vec![self.data_path.as_path()]
        } else {
            vec![self.data_path.as_path(), self.labels_path.as_path()]
        }
    }

    /// Copy every backing file to its backup for `round`.
    pub fn backup(&self, round: u32) -> io::Result<Vec<PathBuf>> {
        self.source_files()
            .into_iter()
            .map(|source| {
                let target = backup_path(source, round);
                std::fs::copy(source, &target)?;
                Ok(target)
            })
            .collect()
    }

    /// Rewrite the backing files with `samples`, keeping their layout and formats.
    ///
    /// Every file is staged in a temp file first; nothing is renamed into
    /// place unless all of them were written.
    pub fn write_samples(&self, samples: &[LabeledSample]) -> io::Result<()> {
        let inline = self.labels_inline();
        let mut staged = vec![(self.stage_data(samples, inline)?, &self.data_path)];
        if !inline {
            let labels = match self.labels_format {
                TableFormat::Csv => stage_csv(
                    &self.labels_path,
                    std::slice::from_ref(&self.label_column),
                    samples.iter().map(|s| vec![s.label.clone()]),
                )?,
                TableFormat::Npy => stage_npy_labels(&self.labels_path, samples)?,
            };
            staged.push((labels, &self.labels_path));
        }
        for (file, target) in staged {
            file.persist(target).map_err(|err| err.error)?;
        }
        Ok(())
    }

    fn stage_data(&self, samples: &[LabeledSample], with_label: bool) -> io::Result<NamedTempFile> {
        let arity = self.feature_names.len();
        match (self.format, with_label) {
            (TableFormat::Csv, _) => {
                let mut header = self.feature_names.clone();
                if with_label {
                    header.push(self.label_column.clone());
                }
                stage_csv(
                    &self.data_path,
                    &header,
                    samples.iter().map(|s| csv_row(s, with_label)),
                )
            }
            (TableFormat::Npy, true) => stage_npy(&self.data_path, &labeled_matrix(samples, arity)?),
            (TableFormat::Npy, false) => stage_npy(&self.data_path, &feature_matrix(samples, arity)?),
        }
    }

    /// Feature rows and label indices for the given rows.
    pub fn training_rows(&self, rows: &[usize], space: &LabelSpace) -> (Vec<Vec<f32>>, Vec<usize>) {
        let mut x = Vec::with_capacity(rows.len());
        let mut y = Vec::with_capacity(rows.len());
        for &row in rows {
            let Some(sample) = self.samples.get(row) else {
                continue;
            };
            let Some(class_idx) = space.index_of(&sample.label) else {
                continue;
            };
            x.push(sample.features.clone());
            y.push(class_idx);
        }
        (x, y)
    }
}

/// Path of the pre-append backup for a round, next to the original file.
pub fn backup_path(path: &Path, round: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("labeled_samples");
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("csv");
    path.with_file_name(format!("{stem}.backup_iter_{round}.{extension}"))
}

fn temp_file_for(path: &Path) -> io::Result<NamedTempFile> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    NamedTempFile::new_in(dir)
}

fn csv_row(sample: &LabeledSample, with_label: bool) -> Vec<String> {
    let mut record: Vec<String> = sample.features.iter().map(|v| v.to_string()).collect();
    if with_label {
        record.push(sample.label.clone());
    }
    record
}

fn stage_csv(
    path: &Path,
    header: &[String],
    rows: impl IntoIterator<Item = Vec<String>>,
) -> io::Result<NamedTempFile> {
    let mut tmp = temp_file_for(path)?;
    {
        let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
        writer.write_record(header).map_err(io::Error::other)?;
        for row in rows {
            writer.write_record(&row).map_err(io::Error::other)?;
        }
        writer.flush()?;
    }
    tmp.as_file_mut().flush()?;
    Ok(tmp)
}

fn stage_npy<T: WriteNpyExt>(path: &Path, array: &T) -> io::Result<NamedTempFile> {
    let mut tmp = temp_file_for(path)?;
    array
        .write_npy(tmp.as_file_mut())
        .map_err(io::Error::other)?;
    tmp.as_file_mut().flush()?;
    Ok(tmp)
}

fn stage_npy_labels(path: &Path, samples: &[LabeledSample]) -> io::Result<NamedTempFile> {
    let ints: Option<Vec<i64>> = samples.iter().map(|s| s.label.parse().ok()).collect();
    if let Some(ints) = ints {
        return stage_npy(path, &Array1::from(ints));
    }
    let floats = numeric_labels(samples)?;
    stage_npy(path, &Array1::from(floats))
}

fn numeric_labels(samples: &[LabeledSample]) -> io::Result<Vec<f64>> {
    samples
        .iter()
        .map(|s| {
            s.label.parse::<f64>().map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("label {:?} cannot be stored in a .npy file", s.label),
                )
            })
        })
        .collect()
}

fn shape_error(err: ndarray::ShapeError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

fn feature_matrix(samples: &[LabeledSample], arity: usize) -> io::Result<Array2<f32>> {
    let values: Vec<f32> = samples.iter().flat_map(|s| s.features.iter().copied()).collect();
    Array2::from_shape_vec((samples.len(), arity), values).map_err(shape_error)
}

/// Features widened to `f64` with the numeric label as the trailing column.
fn labeled_matrix(samples: &[LabeledSample], arity: usize) -> io::Result<Array2<f64>> {
    let labels = numeric_labels(samples)?;
    let values: Vec<f64> = samples
        .iter()
        .zip(labels)
        .flat_map(|(s, label)| {
            s.features
                .iter()
                .map(|&v| v as f64)
                .chain(std::iter::once(label))
        })
        .collect();
    Array2::from_shape_vec((samples.len(), arity + 1), values).map_err(shape_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn samples() -> Vec<LabeledSample> {
        vec![
            LabeledSample {
                features: vec![5.1, 3.5],
                label: "1".into(),
                original_index: None,
            },
            LabeledSample {
                features: vec![0.1 + 0.2, -0.0],
                label: "2".into(),
                original_index: Some(4),
            },
        ]
    }

    #[test]
    fn rewritten_csv_round_trips_exact_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("labeled_samples.csv");
        std::fs::write(&path, "a,b,species\n1,1,0\n").unwrap();
        let set = LabeledSet::load(&path, &path, 2).unwrap();
        let samples = samples();
        set.write_samples(&samples).unwrap();

        let set = LabeledSet::load(&path, &path, 2).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.label_column, "species");
        assert!(set.labels_inline());
        let keys = set.feature_keys();
        for sample in &samples {
            assert!(keys.contains(&FeatureKey::new(&sample.features)));
        }
    }

    #[test]
    fn separate_csv_files_are_rewritten_together() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("x.csv");
        let labels = dir.path().join("y.csv");
        std::fs::write(&data, "a,b\n1,1\n").unwrap();
        std::fs::write(&labels, "target\n0\n").unwrap();
        let set = LabeledSet::load(&data, &labels, 2).unwrap();
        assert_eq!(set.source_files(), vec![data.as_path(), labels.as_path()]);

        let backups = set.backup(2).unwrap();
        assert_eq!(backups.len(), 2);
        assert_eq!(std::fs::read_to_string(&backups[1]).unwrap(), "target\n0\n");

        set.write_samples(&samples()).unwrap();
        assert_eq!(std::fs::read_to_string(&labels).unwrap(), "target\n1\n2\n");
        let reloaded = LabeledSet::load(&data, &labels, 2).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.labels(), vec!["1", "2"]);
        assert_eq!(reloaded.samples[0].features, vec![5.1, 3.5]);
    }

    #[test]
    fn npy_layouts_are_rewritten_in_place() {
        use ndarray::array;
        use ndarray_npy::write_npy;

        let dir = tempdir().unwrap();
        let inline = dir.path().join("labeled.npy");
        write_npy(&inline, &array![[1.0f64, 1.0, 0.0]]).unwrap();
        let set = LabeledSet::load(&inline, &inline, 2).unwrap();
        set.write_samples(&samples()).unwrap();
        let reloaded = LabeledSet::load(&inline, &inline, 2).unwrap();
        assert_eq!(reloaded.labels(), vec!["1", "2"]);
        assert_eq!(reloaded.samples[1].features, samples()[1].features);

        let data = dir.path().join("x.npy");
        let labels = dir.path().join("y.npy");
        write_npy(&data, &array![[1.0f32, 1.0]]).unwrap();
        write_npy(&labels, &array![0i64]).unwrap();
        let set = LabeledSet::load(&data, &labels, 2).unwrap();
        set.write_samples(&samples()).unwrap();
        let reloaded = LabeledSet::load(&data, &labels, 2).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.labels(), vec!["1", "2"]);
    }

    #[test]
    fn text_labels_cannot_go_into_npy() {
        use ndarray::array;
        use ndarray_npy::write_npy;

        let dir = tempdir().unwrap();
        let path = dir.path().join("labeled.npy");
        write_npy(&path, &array![[1.0f64, 1.0, 0.0]]).unwrap();
        let set = LabeledSet::load(&path, &path, 2).unwrap();
        let mut rows = samples();
        rows[0].label = "setosa".into();
        assert!(set.write_samples(&rows).is_err());
        assert_eq!(LabeledSet::load(&path, &path, 2).unwrap().len(), 1);
    }

    #[test]
    fn backup_sits_next_to_the_labeled_file() {
        let path = Path::new("/data/p1/labeled_samples.csv");
        assert_eq!(
            backup_path(path, 3),
            PathBuf::from("/data/p1/labeled_samples.backup_iter_3.csv")
        );
        assert_eq!(
            backup_path(Path::new("/data/p1/y.npy"), 2),
            PathBuf::from("/data/p1/y.backup_iter_2.npy")
        );
    }

    #[test]
    fn separate_label_file_must_match_row_count() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("x.csv");
        let labels = dir.path().join("y.csv");
        std::fs::write(&data, "a,b\n1,2\n3,4\n").unwrap();
        std::fs::write(&labels, "label\n0\n").unwrap();
        assert!(matches!(
            LabeledSet::load(&data, &labels, 2),
            Err(LoadError::LabelCountMismatch { .. })
        ));
    }
}
