use rand::rngs::StdRng;
use rand::{SeedableRng, seq::SliceRandom};
use serde::Deserialize;

use super::MarginModel;
use crate::ml::TrainDataset;
use crate::ml::logreg::LogRegModel;
use crate::ml::scaling::FeatureScaler;

/// Hinge-loss SGD options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrainOptions {
    #[serde(alias = "max_iter")]
    pub epochs: usize,
    #[serde(alias = "eta0")]
    pub learning_rate: f32,
    #[serde(alias = "alpha")]
    pub l2: Option<f32>,
    #[serde(alias = "C")]
    pub c: Option<f32>,
    pub batch_size: usize,
    #[serde(alias = "random_state")]
    pub seed: Option<u64>,
    pub temperature: f32,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 100,
            learning_rate: 0.05,
            l2: None,
            c: None,
            batch_size: 8,
            seed: None,
            temperature: 0.5,
        }
    }
}

pub fn train_margin(dataset: &TrainDataset, options: &TrainOptions) -> Result<MarginModel, String> {
    let dim = dataset.check_shape()?;
    let classes = dataset.classes.len();
    if classes < 2 {
        return Err("Need at least 2 classes".to_string());
    }

    let scaler = FeatureScaler::fit(&dataset.x, dim);
    let rows: Vec<Vec<f32>> = dataset.x.iter().map(|row| scaler.apply(row)).collect();
    let l2 = match (options.l2, options.c) {
        (Some(l2), _) => l2.max(0.0),
        (None, Some(c)) if c > 0.0 => 1.0 / (c * rows.len() as f32),
        _ => 1e-3,
    };

    let mut rng = StdRng::seed_from_u64(options.seed.unwrap_or(42));
    let mut weights = vec![0.0f32; classes * dim];
    let mut bias = vec![0.0f32; classes];
    let mut indices: Vec<usize> = (0..rows.len()).collect();
    let batch_size = options.batch_size.max(1);
    let lr = options.learning_rate;

    for _epoch in 0..options.epochs {
        indices.shuffle(&mut rng);
        for chunk in indices.chunks(batch_size) {
            let mut grad_w = vec![0.0f32; weights.len()];
            let mut grad_b = vec![0.0f32; classes];
            let mut count = 0usize;
            for &idx in chunk {
                let y = dataset.y[idx];
                if y >= classes {
                    continue;
                }
                let x = &rows[idx];
                let scores = LogRegModel::logits(&weights, &bias, x);
                for c in 0..classes {
                    let target = if c == y { 1.0 } else { -1.0 };
                    if target * scores[c] < 1.0 {
                        let base = c * dim;
                        for i in 0..dim {
                            grad_w[base + i] -= target * x[i];
                        }
                        grad_b[c] -= target;
                    }
                }
                count += 1;
            }
            if count == 0 {
                continue;
            }
            let inv = 1.0 / count as f32;
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= lr * (g * inv + l2 * *w);
            }
            for (b, g) in bias.iter_mut().zip(&grad_b) {
                *b -= lr * g * inv;
            }
        }
    }

    let model = MarginModel {
        model_version: 1,
        feature_len: dim,
        classes: dataset.classes.clone(),
        weights,
        bias,
        scaler,
        temperature: options.temperature,
    };
    model.validate()?;
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separates_two_lines() {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..20 {
            let t = i as f32 * 0.1;
            x.push(vec![t, 0.0]);
            y.push(0);
            x.push(vec![t, 3.0]);
            y.push(1);
        }
        let dataset = TrainDataset {
            classes: vec!["bottom".into(), "top".into()],
            x,
            y,
        };
        let model = train_margin(&dataset, &TrainOptions::default()).unwrap();
        assert_eq!(model.predict_class_index(&[1.0, 0.2]), 0);
        assert_eq!(model.predict_class_index(&[1.0, 2.8]), 1);
        let proba = model.predict_proba(&[1.0, 1.5]);
        assert_eq!(proba.len(), 2);
        assert!((proba.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }
}
