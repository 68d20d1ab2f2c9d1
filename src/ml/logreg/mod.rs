//! Multinomial logistic regression, the linear model kind.

use serde::{Deserialize, Serialize};

use crate::ml::argmax;
use crate::ml::gbdt_stump::softmax;
use crate::ml::scaling::FeatureScaler;

mod train;
pub use train::{TrainOptions, train_logreg};

/// Versioned logistic regression model over standardized features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRegModel {
    pub model_version: i64,
    pub feature_len: usize,
    pub classes: Vec<String>,
    /// Row-major `[class][feature]` weights.
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
    pub scaler: FeatureScaler,
    pub temperature: f32,
}

impl LogRegModel {
    /// Validate the model dimensions.
    pub fn validate(&self) -> Result<(), String> {
        let classes = self.classes.len();
        if classes == 0 {
            return Err("No classes defined".to_string());
        }
        if self.feature_len == 0 {
            return Err("feature_len must be > 0".to_string());
        }
        if self.weights.len() != classes * self.feature_len {
            return Err("weights length mismatch".to_string());
        }
        if self.bias.len() != classes {
            return Err("bias length mismatch".to_string());
        }
        if self.scaler.len() != self.feature_len || self.scaler.std.len() != self.feature_len {
            return Err("scaler length mismatch".to_string());
        }
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err("temperature must be > 0".to_string());
        }
        Ok(())
    }

    /// Raw class scores for a standardized row.
    pub(crate) fn logits(weights: &[f32], bias: &[f32], x: &[f32]) -> Vec<f32> {
        let dim = x.len();
        bias.iter()
            .enumerate()
            .map(|(c, &b)| {
                let base = c * dim;
                b + weights[base..base + dim]
                    .iter()
                    .zip(x)
                    .map(|(w, v)| w * v)
                    .sum::<f32>()
            })
            .collect()
    }

    /// Compute class probabilities for a single feature row.
    pub fn predict_proba(&self, features: &[f32]) -> Vec<f32> {
        if features.len() != self.feature_len || self.classes.is_empty() {
            return Vec::new();
        }
        let x = self.scaler.apply(features);
        let temp = self.temperature.max(1e-6);
        let logits: Vec<f32> = Self::logits(&self.weights, &self.bias, &x)
            .into_iter()
            .map(|v| v / temp)
            .collect();
        softmax(&logits)
    }

    /// Return the argmax class index for the given row.
    pub fn predict_class_index(&self, features: &[f32]) -> usize {
        argmax(&self.predict_proba(features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_model_is_uniform() {
        let model = LogRegModel {
            model_version: 1,
            feature_len: 3,
            classes: vec!["a".into(), "b".into()],
            weights: vec![0.0; 6],
            bias: vec![0.0; 2],
            scaler: FeatureScaler {
                mean: vec![0.0; 3],
                std: vec![1.0; 3],
            },
            temperature: 1.0,
        };
        model.validate().unwrap();
        let out = model.predict_proba(&[1.0, 2.0, 3.0]);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert!(model.predict_proba(&[1.0]).is_empty());
    }
}
