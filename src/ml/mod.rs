//! In-house classifiers, evaluation metrics and the serialized model artifact.
//!
//! The estimators avoid external ML dependencies, train deterministically for
//! a fixed seed and export to JSON.

pub mod estimator;
pub mod gbdt_stump;
pub mod logreg;
pub mod margin;
pub mod metrics;
pub mod scaling;

pub use estimator::{ArtifactError, Classifier, Estimator, ModelArtifact, TrainError};

/// In-memory training set shared by every estimator.
#[derive(Debug, Clone)]
pub struct TrainDataset {
    /// Ordered list of class identifiers.
    pub classes: Vec<String>,
    /// Feature matrix, row-major.
    pub x: Vec<Vec<f32>>,
    /// Class indices aligned with `x`.
    pub y: Vec<usize>,
}

impl TrainDataset {
    /// Number of `f32` values per row, taken from the first row.
    pub fn feature_len(&self) -> usize {
        self.x.first().map_or(0, Vec::len)
    }

    /// Shared shape checks run before any training loop.
    pub(crate) fn check_shape(&self) -> Result<usize, String> {
        if self.x.is_empty() || self.y.is_empty() {
            return Err("Empty training set".to_string());
        }
        if self.x.len() != self.y.len() {
            return Err("Mismatched training inputs/labels".to_string());
        }
        let dim = self.feature_len();
        if dim == 0 {
            return Err("Training rows have no features".to_string());
        }
        if self.x.iter().any(|row| row.len() != dim) {
            return Err("Inconsistent feature row length".to_string());
        }
        Ok(dim)
    }
}

/// Index of the largest value; ties resolve to the first occurrence.
pub fn argmax(values: &[f32]) -> usize {
    let mut best_idx = 0usize;
    let mut best_val = f32::NEG_INFINITY;
    for (idx, &v) in values.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best_idx = idx;
        }
    }
    best_idx
}
