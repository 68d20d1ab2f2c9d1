use rand::rngs::StdRng;
use rand::{Rng, SeedableRng, seq::SliceRandom};
use serde::Deserialize;

use super::LogRegModel;
use crate::ml::TrainDataset;
use crate::ml::gbdt_stump::softmax;
use crate::ml::scaling::FeatureScaler;

/// Training options for the logistic regression model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrainOptions {
    #[serde(alias = "max_iter")]
    pub epochs: usize,
    #[serde(alias = "eta0")]
    pub learning_rate: f32,
    /// L2 penalty; takes precedence over `c`.
    #[serde(alias = "alpha")]
    pub l2: Option<f32>,
    /// Inverse regularization strength, mapped to `l2 = 1 / (C * n)`.
    #[serde(alias = "C")]
    pub c: Option<f32>,
    pub batch_size: usize,
    #[serde(alias = "random_state")]
    pub seed: Option<u64>,
    pub balance_classes: bool,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 100,
            learning_rate: 0.1,
            l2: None,
            c: None,
            batch_size: 16,
            seed: None,
            balance_classes: false,
        }
    }
}

impl TrainOptions {
    pub(crate) fn effective_l2(&self, n: usize) -> f32 {
        match (self.l2, self.c) {
            (Some(l2), _) => l2.max(0.0),
            (None, Some(c)) if c > 0.0 => 1.0 / (c * n.max(1) as f32),
            _ => 1e-4,
        }
    }
}

/// Per-class loss weights; zero for classes without rows.
pub(crate) fn class_weights(y: &[usize], classes: usize, balance: bool) -> Vec<f32> {
    if !balance {
        return vec![1.0; classes];
    }
    let mut counts = vec![0f32; classes];
    for &label in y {
        if label < classes {
            counts[label] += 1.0;
        }
    }
    let total: f32 = counts.iter().sum();
    counts
        .into_iter()
        .map(|count| {
            if count == 0.0 {
                0.0
            } else {
                total / (classes as f32 * count)
            }
        })
        .collect()
}

pub fn train_logreg(dataset: &TrainDataset, options: &TrainOptions) -> Result<LogRegModel, String> {
    let dim = dataset.check_shape()?;
    let classes = dataset.classes.len();
    if classes == 0 {
        return Err("No classes available for training".to_string());
    }

    let scaler = FeatureScaler::fit(&dataset.x, dim);
    let rows: Vec<Vec<f32>> = dataset.x.iter().map(|row| scaler.apply(row)).collect();

    let mut rng = StdRng::seed_from_u64(options.seed.unwrap_or(42));
    let mut weights = vec![0.0f32; classes * dim];
    let mut bias = vec![0.0f32; classes];
    for w in &mut weights {
        *w = (rng.random::<f32>() - 0.5) * 0.01;
    }

    let mut indices: Vec<usize> = (0..rows.len()).collect();
    let batch_size = options.batch_size.max(1);
    let lr = options.learning_rate;
    let l2 = options.effective_l2(rows.len());
    let class_weights = class_weights(&dataset.y, classes, options.balance_classes);

    for _epoch in 0..options.epochs {
        indices.shuffle(&mut rng);
        for chunk in indices.chunks(batch_size) {
            let mut grad_w = vec![0.0f32; weights.len()];
            let mut grad_b = vec![0.0f32; bias.len()];
            let mut batch_weight = 0.0f32;
            for &idx in chunk {
                let x = &rows[idx];
                let y = dataset.y[idx];
                if y >= classes {
                    continue;
                }
                let weight = class_weights[y];
                if weight == 0.0 {
                    continue;
                }
                let probs = softmax(&LogRegModel::logits(&weights, &bias, x));
                for c in 0..classes {
                    let diff = probs[c] - if c == y { 1.0 } else { 0.0 };
                    let base = c * dim;
                    for i in 0..dim {
                        grad_w[base + i] += diff * x[i] * weight;
                    }
                    grad_b[c] += diff * weight;
                }
                batch_weight += weight;
            }
            if batch_weight == 0.0 {
                continue;
            }
            let inv = 1.0 / batch_weight;
            for c in 0..classes {
                let base = c * dim;
                for i in 0..dim {
                    let idx = base + i;
                    let l2_term = l2 * weights[idx];
                    weights[idx] -= lr * (grad_w[idx] * inv + l2_term);
                }
                bias[c] -= lr * grad_b[c] * inv;
            }
        }
    }

    let model = LogRegModel {
        model_version: 1,
        feature_len: dim,
        classes: dataset.classes.clone(),
        weights,
        bias,
        scaler,
        temperature: 1.0,
    };
    model.validate()?;
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> TrainDataset {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..15 {
            let jitter = (i % 5) as f32 * 0.1;
            x.push(vec![1.0 + jitter, 1.0 - jitter]);
            y.push(0);
            x.push(vec![5.0 + jitter, 5.0 - jitter]);
            y.push(1);
            x.push(vec![1.0 + jitter, 5.0 - jitter]);
            y.push(2);
        }
        TrainDataset {
            classes: vec!["a".into(), "b".into(), "c".into()],
            x,
            y,
        }
    }

    #[test]
    fn separates_three_blobs() {
        let model = train_logreg(&blobs(), &TrainOptions::default()).unwrap();
        assert_eq!(model.predict_class_index(&[1.1, 0.9]), 0);
        assert_eq!(model.predict_class_index(&[5.1, 4.9]), 1);
        assert_eq!(model.predict_class_index(&[1.1, 4.9]), 2);
    }

    #[test]
    fn same_seed_same_model() {
        let options = TrainOptions {
            seed: Some(9),
            epochs: 5,
            ..TrainOptions::default()
        };
        let a = train_logreg(&blobs(), &options).unwrap();
        let b = train_logreg(&blobs(), &options).unwrap();
        assert_eq!(a.weights, b.weights);
    }

    #[test]
    fn c_maps_to_l2() {
        let options: TrainOptions = serde_json::from_str(r#"{"C": 2.0, "max_iter": 50}"#).unwrap();
        assert_eq!(options.epochs, 50);
        assert!((options.effective_l2(10) - 0.05).abs() < 1e-6);
    }
}
