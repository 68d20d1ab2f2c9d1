use serde::Deserialize;

use super::model::{GbdtStumpModel, Stump, softmax};
use crate::ml::TrainDataset;

/// Training hyperparameters for stump boosting.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrainOptions {
    /// Number of boosting rounds.
    #[serde(alias = "n_estimators")]
    pub rounds: usize,
    /// Learning rate applied per round.
    pub learning_rate: f32,
    /// Number of bins used for split search.
    #[serde(alias = "max_bins")]
    pub bins: usize,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            rounds: 100,
            learning_rate: 0.1,
            bins: 32,
        }
    }
}

/// Fit one stump per class per boosting round on the softmax residuals.
pub fn train_gbdt_stump(
    dataset: &TrainDataset,
    options: &TrainOptions,
) -> Result<GbdtStumpModel, String> {
    let feature_len = dataset.check_shape()?;
    let n_classes = dataset.classes.len();
    if n_classes < 2 {
        return Err("Need at least 2 classes".to_string());
    }
    if !options.learning_rate.is_finite() || options.learning_rate <= 0.0 {
        return Err("learning_rate must be > 0".to_string());
    }

    let grid = BinGrid::build(&dataset.x, feature_len, options.bins);
    let init_raw: Vec<f32> = class_priors(&dataset.y, n_classes)
        .into_iter()
        .map(|p| p.max(1e-6).ln())
        .collect();
    let mut logits = vec![init_raw.clone(); dataset.x.len()];

    let mut stumps = Vec::with_capacity(options.rounds);
    for _ in 0..options.rounds {
        let probs: Vec<Vec<f32>> = logits.iter().map(|row| softmax(row)).collect();
        let round: Vec<Stump> = (0..n_classes)
            .map(|class_idx| {
                let residuals: Vec<f32> = dataset
                    .y
                    .iter()
                    .zip(&probs)
                    .map(|(&label, p)| f32::from(u8::from(label == class_idx)) - p[class_idx])
                    .collect();
                grid.best_stump(&dataset.x, &residuals)
            })
            .collect();
        for (row, raw) in dataset.x.iter().zip(logits.iter_mut()) {
            for (value, stump) in raw.iter_mut().zip(&round) {
                *value += options.learning_rate * stump.predict(row);
            }
        }
        stumps.push(round);
    }

    let model = GbdtStumpModel {
        model_version: 1,
        feature_len,
        classes: dataset.classes.clone(),
        learning_rate: options.learning_rate,
        init_raw,
        stumps,
    };
    model.validate()?;
    Ok(model)
}

fn class_priors(y: &[usize], n_classes: usize) -> Vec<f32> {
    let mut counts = vec![0usize; n_classes];
    for &label in y.iter().filter(|&&label| label < n_classes) {
        counts[label] += 1;
    }
    let total = y.len().max(1) as f32;
    counts.into_iter().map(|c| c as f32 / total).collect()
}

/// Equal-width quantization of every feature, stored column-major.
struct BinGrid {
    bins: usize,
    mins: Vec<f32>,
    widths: Vec<f32>,
    /// `codes[feature][row]`.
    codes: Vec<Vec<u8>>,
}

impl BinGrid {
    fn build(x: &[Vec<f32>], feature_len: usize, bins: usize) -> Self {
        let bins = bins.clamp(2, 256);
        let mut mins = Vec::with_capacity(feature_len);
        let mut widths = Vec::with_capacity(feature_len);
        let mut codes = Vec::with_capacity(feature_len);
        for feature in 0..feature_len {
            let (lo, hi) = x
                .iter()
                .map(|row| row[feature])
                .filter(|v| v.is_finite())
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                });
            let (lo, width) = if lo.is_finite() && hi > lo {
                (lo, hi - lo)
            } else {
                (if lo.is_finite() { lo } else { 0.0 }, 1.0)
            };
            let scale = (bins - 1) as f32;
            codes.push(
                x.iter()
                    .map(|row| {
                        let t = ((row[feature] - lo) / width).clamp(0.0, 1.0);
                        if t.is_nan() { 0 } else { (t * scale).round() as u8 }
                    })
                    .collect(),
            );
            mins.push(lo);
            widths.push(width);
        }
        Self {
            bins,
            mins,
            widths,
            codes,
        }
    }

    /// Upper edge of `bin` in feature units; codes at or below it go left.
    fn edge(&self, feature: usize, bin: usize) -> f32 {
        let t = (bin as f32 + 0.5) / (self.bins - 1) as f32;
        self.mins[feature] + t * self.widths[feature]
    }

    fn best_stump(&self, x: &[Vec<f32>], residuals: &[f32]) -> Stump {
        let mut best: Option<(f64, usize, usize)> = None;
        for (feature, codes) in self.codes.iter().enumerate() {
            if let Some((sse, bin)) = Histogram::collect(codes, residuals, self.bins).best_split()
                && best.is_none_or(|(best_sse, _, _)| sse < best_sse)
            {
                best = Some((sse, feature, bin));
            }
        }
        let (feature, threshold) = match best {
            Some((_, feature, bin)) => (feature, self.edge(feature, bin)),
            None => (0, f32::INFINITY),
        };
        let (left_value, right_value) = leaf_means(x, residuals, feature, threshold);
        Stump {
            feature_index: feature as u16,
            threshold,
            left_value,
            right_value,
        }
    }
}

/// Residual count, sum and sum of squares per bin.
struct Histogram {
    count: Vec<u32>,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl Histogram {
    fn collect(codes: &[u8], residuals: &[f32], bins: usize) -> Self {
        let mut hist = Self {
            count: vec![0; bins],
            sum: vec![0.0; bins],
            sum_sq: vec![0.0; bins],
        };
        for (&code, &r) in codes.iter().zip(residuals) {
            let (b, r) = (code as usize, f64::from(r));
            hist.count[b] += 1;
            hist.sum[b] += r;
            hist.sum_sq[b] += r * r;
        }
        hist
    }

    /// Lowest total squared error over splits `bin <= b | bin > b`, with both sides non-empty.
    fn best_split(&self) -> Option<(f64, usize)> {
        let total_count: u32 = self.count.iter().sum();
        let total_sum: f64 = self.sum.iter().sum();
        let total_sq: f64 = self.sum_sq.iter().sum();
        let (mut count, mut sum, mut sq) = (0u32, 0.0f64, 0.0f64);
        let mut best: Option<(f64, usize)> = None;
        for b in 0..self.count.len() - 1 {
            count += self.count[b];
            sum += self.sum[b];
            sq += self.sum_sq[b];
            let rest = total_count - count;
            if count == 0 || rest == 0 {
                continue;
            }
            let sse = (sq - sum * sum / f64::from(count))
                + ((total_sq - sq) - (total_sum - sum).powi(2) / f64::from(rest));
            if best.is_none_or(|(best_sse, _)| sse < best_sse) {
                best = Some((sse, b));
            }
        }
        best
    }
}

fn leaf_means(x: &[Vec<f32>], residuals: &[f32], feature: usize, threshold: f32) -> (f32, f32) {
    let mut sides = [(0.0f32, 0u32); 2];
    for (row, &r) in x.iter().zip(residuals) {
        let side = &mut sides[usize::from(row[feature] > threshold)];
        side.0 += r;
        side.1 += 1;
    }
    let mean = |(sum, count): (f32, u32)| if count == 0 { 0.0 } else { sum / count as f32 };
    (mean(sides[0]), mean(sides[1]))
}
