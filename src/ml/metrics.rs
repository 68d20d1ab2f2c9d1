//! Evaluation metrics for classification models.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
/// Confusion matrix for a `K`-class classifier.
pub struct ConfusionMatrix {
    /// Number of classes.
    pub n_classes: usize,
    /// Row-major `KxK` counts (`truth * K + predicted`).
    pub counts: Vec<u32>,
}

impl ConfusionMatrix {
    /// Create an empty `KxK` confusion matrix.
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            counts: vec![0; n_classes * n_classes],
        }
    }

    pub fn add(&mut self, truth: usize, predicted: usize) {
        if truth >= self.n_classes || predicted >= self.n_classes {
            return;
        }
        let idx = truth * self.n_classes + predicted;
        self.counts[idx] = self.counts[idx].saturating_add(1);
    }

    pub fn get(&self, truth: usize, predicted: usize) -> u32 {
        self.counts[truth * self.n_classes + predicted]
    }

    /// Total number of recorded predictions.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&v| v as u64).sum()
    }
}

#[derive(Debug, Clone)]
/// Precision/recall statistics for a single class.
pub struct PerClassStats {
    /// `TP / (TP + FP)`.
    pub precision: f32,
    /// `TP / (TP + FN)`.
    pub recall: f32,
    /// Total number of true examples for the class.
    pub support: u32,
}

impl PerClassStats {
    pub fn f1(&self) -> f32 {
        f1_score(self.precision, self.recall)
    }
}

/// How per-class scores are reduced to one number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AverageStrategy {
    /// Scores of the positive class only.
    Binary,
    /// Per-class scores weighted by support.
    Weighted,
}

impl AverageStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            AverageStrategy::Binary => "binary",
            AverageStrategy::Weighted => "weighted",
        }
    }
}

/// Averaged precision, recall and F1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AveragedScores {
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
}

/// Compute per-class precision and recall from a confusion matrix.
pub fn precision_recall_by_class(cm: &ConfusionMatrix) -> Vec<PerClassStats> {
    let k = cm.n_classes;
    let mut stats = Vec::with_capacity(k);
    for class_idx in 0..k {
        let tp = cm.get(class_idx, class_idx) as f32;
        let mut fp = 0f32;
        let mut fn_ = 0f32;
        let mut support = 0u32;
        for j in 0..k {
            let v = cm.get(class_idx, j);
            support = support.saturating_add(v);
            if j != class_idx {
                fn_ += v as f32;
            }
        }
        for i in 0..k {
            if i != class_idx {
                fp += cm.get(i, class_idx) as f32;
            }
        }
        let precision = if tp + fp == 0.0 { 0.0 } else { tp / (tp + fp) };
        let recall = if tp + fn_ == 0.0 { 0.0 } else { tp / (tp + fn_) };
        stats.push(PerClassStats {
            precision,
            recall,
            support,
        });
    }
    stats
}

/// Compute overall accuracy from a confusion matrix.
pub fn accuracy(cm: &ConfusionMatrix) -> f32 {
    let mut correct = 0u64;
    for class_idx in 0..cm.n_classes {
        correct += cm.get(class_idx, class_idx) as u64;
    }
    let total = cm.total();
    if total == 0 {
        0.0
    } else {
        (correct as f32) / (total as f32)
    }
}

/// Harmonic mean of precision and recall, zero when both are zero.
pub fn f1_score(precision: f32, recall: f32) -> f32 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// Reduce per-class scores according to `strategy`.
///
/// `positive` is the class index scored under [`AverageStrategy::Binary`].
pub fn averaged_scores(
    cm: &ConfusionMatrix,
    strategy: AverageStrategy,
    positive: usize,
) -> AveragedScores {
    let stats = precision_recall_by_class(cm);
    match strategy {
        AverageStrategy::Binary => match stats.get(positive) {
            Some(class) => AveragedScores {
                precision: class.precision,
                recall: class.recall,
                f1: class.f1(),
            },
            None => AveragedScores {
                precision: 0.0,
                recall: 0.0,
                f1: 0.0,
            },
        },
        AverageStrategy::Weighted => {
            let total: f32 = stats.iter().map(|s| s.support as f32).sum();
            if total == 0.0 {
                return AveragedScores {
                    precision: 0.0,
                    recall: 0.0,
                    f1: 0.0,
                };
            }
            let weighted = |f: &dyn Fn(&PerClassStats) -> f32| {
                stats.iter().map(|s| f(s) * s.support as f32).sum::<f32>() / total
            };
            AveragedScores {
                precision: weighted(&|s| s.precision).clamp(0.0, 1.0),
                recall: weighted(&|s| s.recall).clamp(0.0, 1.0),
                f1: weighted(&|s| s.f1()).clamp(0.0, 1.0),
            }
        }
    }
}
