//! One-vs-rest linear SVM, the margin classifier model kind.
//!
//! Probabilities are a softmax over the per-class decision margins, so the
//! query step can rank rows with the same uncertainty measures as the other
//! model kinds.

use serde::{Deserialize, Serialize};

use crate::ml::argmax;
use crate::ml::gbdt_stump::softmax;
use crate::ml::logreg::LogRegModel;
use crate::ml::scaling::FeatureScaler;

mod train;
pub use train::{TrainOptions, train_margin};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginModel {
    pub model_version: i64,
    pub feature_len: usize,
    pub classes: Vec<String>,
    /// Row-major `[class][feature]` hyperplane normals.
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
    pub scaler: FeatureScaler,
    /// Softmax temperature applied to the margins.
    pub temperature: f32,
}

impl MarginModel {
    pub fn validate(&self) -> Result<(), String> {
        let classes = self.classes.len();
        if classes < 2 {
            return Err("Margin model needs at least 2 classes".to_string());
        }
        if self.feature_len == 0 {
            return Err("feature_len must be > 0".to_string());
        }
        if self.weights.len() != classes * self.feature_len || self.bias.len() != classes {
            return Err("weights/bias length mismatch".to_string());
        }
        if self.scaler.len() != self.feature_len || self.scaler.std.len() != self.feature_len {
            return Err("scaler length mismatch".to_string());
        }
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err("temperature must be > 0".to_string());
        }
        Ok(())
    }

    /// Signed distance-like score per class; empty on arity mismatch.
    pub fn decision_function(&self, features: &[f32]) -> Vec<f32> {
        if features.len() != self.feature_len {
            return Vec::new();
        }
        let x = self.scaler.apply(features);
        LogRegModel::logits(&self.weights, &self.bias, &x)
    }

    pub fn predict_proba(&self, features: &[f32]) -> Vec<f32> {
        let margins = self.decision_function(features);
        if margins.is_empty() {
            return margins;
        }
        let temp = self.temperature.max(1e-6);
        let scaled: Vec<f32> = margins.into_iter().map(|m| m / temp).collect();
        softmax(&scaled)
    }

    pub fn predict_class_index(&self, features: &[f32]) -> usize {
        argmax(&self.decision_function(features))
    }
}
