//! Per-feature standardization stored alongside linear models.

use serde::{Deserialize, Serialize};

/// Mean/std pair fitted on the training rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

impl FeatureScaler {
    /// Fit population mean and standard deviation per column.
    pub fn fit(rows: &[Vec<f32>], d: usize) -> Self {
        let mut mean = vec![0.0f32; d];
        for row in rows {
            for i in 0..d {
                mean[i] += row[i];
            }
        }
        let n = rows.len().max(1) as f32;
        for v in &mut mean {
            *v /= n;
        }

        let mut std = vec![0.0f32; d];
        for row in rows {
            for i in 0..d {
                let diff = row[i] - mean[i];
                std[i] += diff * diff;
            }
        }
        for v in &mut std {
            *v = (*v / n).sqrt();
        }
        Self { mean, std }
    }

    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    /// Standardize a row; constant columns map to zero.
    pub fn apply(&self, features: &[f32]) -> Vec<f32> {
        features
            .iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(&x, (&mean, &std))| (x - mean) / std.max(1e-6))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardizes_columns() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaler = FeatureScaler::fit(&rows, 2);
        assert_eq!(scaler.mean, vec![2.0, 5.0]);
        assert_eq!(scaler.apply(&[3.0, 5.0]), vec![1.0, 0.0]);
    }
}
