//! Held-out evaluation of the round's estimator.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dataset::LabeledSet;
use crate::dataset::split::SplitPlan;
use crate::ml::metrics::{AverageStrategy, ConfusionMatrix, accuracy, averaged_scores};
use crate::ml::{Classifier, Estimator};

/// Contents of `performance_round_{N}.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub test_samples: usize,
    pub training_samples: usize,
    pub label_space: Vec<String>,
    pub average_strategy: String,
    /// Unix seconds.
    pub timestamp: f64,
    pub iso_timestamp: String,
    pub final_training: bool,
    pub round: u32,
    pub model_type: String,
    pub training_path: String,
    /// Train and test are the same full labeled set.
    pub degraded_split: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Round facts copied into the metrics record.
#[derive(Debug, Clone)]
pub struct EvaluationContext<'a> {
    pub round: u32,
    pub final_training: bool,
    pub label_space: &'a [String],
    pub model_type: &'a str,
    pub training_path: &'a str,
    pub timestamp: f64,
    pub iso_timestamp: String,
}

struct Scores {
    accuracy: f32,
    precision: f32,
    recall: f32,
    f1: f32,
    strategy: AverageStrategy,
}

/// Score `model` on the test rows of `plan`; failures yield zeroed metrics.
pub fn evaluate(
    model: &Estimator,
    labeled: &LabeledSet,
    plan: &SplitPlan,
    ctx: EvaluationContext<'_>,
) -> PerformanceMetrics {
    let mut metrics = PerformanceMetrics {
        accuracy: 0.0,
        precision: 0.0,
        recall: 0.0,
        f1_score: 0.0,
        test_samples: plan.test.len(),
        training_samples: plan.train.len(),
        label_space: ctx.label_space.to_vec(),
        average_strategy: AverageStrategy::Weighted.as_str().to_string(),
        timestamp: ctx.timestamp,
        iso_timestamp: ctx.iso_timestamp,
        final_training: ctx.final_training,
        round: ctx.round,
        model_type: ctx.model_type.to_string(),
        training_path: ctx.training_path.to_string(),
        degraded_split: plan.degraded,
        error: None,
    };
    match score(model, labeled, &plan.test) {
        Ok(scores) => {
            metrics.accuracy = unit(scores.accuracy);
            metrics.precision = unit(scores.precision);
            metrics.recall = unit(scores.recall);
            metrics.f1_score = unit(scores.f1);
            metrics.average_strategy = scores.strategy.as_str().to_string();
            info!(
                accuracy = metrics.accuracy,
                f1 = metrics.f1_score,
                test = metrics.test_samples,
                train = metrics.training_samples,
                "Evaluated model"
            );
        }
        Err(message) => {
            warn!("Evaluation failed, reporting zeroed metrics: {message}");
            metrics.error = Some(message);
        }
    }
    metrics
}

fn unit(value: f32) -> f64 {
    if value.is_finite() {
        (value as f64).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn score(model: &Estimator, labeled: &LabeledSet, test: &[usize]) -> Result<Scores, String> {
    if test.is_empty() {
        return Err("no test samples".to_string());
    }
    let mut pairs = Vec::with_capacity(test.len());
    for &row in test {
        let sample = labeled
            .samples
            .get(row)
            .ok_or_else(|| format!("test row {row} is out of range"))?;
        let predicted = model
            .predict_label(&sample.features)
            .ok_or_else(|| format!("model returned no prediction for test row {row}"))?;
        pairs.push((sample.label.as_str(), predicted));
    }

    // Union of observed and predictable classes, so unseen predictions still count as errors.
    let mut classes: Vec<&str> = model.classes().iter().map(String::as_str).collect();
    for (truth, _) in &pairs {
        if !classes.contains(truth) {
            classes.push(*truth);
        }
    }
    let index = |label: &str| classes.iter().position(|c| *c == label).unwrap_or(0);
    let mut cm = ConfusionMatrix::new(classes.len());
    for &(truth, predicted) in &pairs {
        cm.add(index(truth), index(predicted));
    }

    let mut present: Vec<&str> = pairs.iter().map(|(truth, _)| *truth).collect();
    present.sort_unstable();
    present.dedup();
    let (strategy, positive) = if present.len() == 2 {
        (AverageStrategy::Binary, index(present[1]))
    } else {
        (AverageStrategy::Weighted, 0)
    };
    let averaged = averaged_scores(&cm, strategy, positive);
    Ok(Scores {
        accuracy: accuracy(&cm),
        precision: averaged.precision,
        recall: averaged.recall,
        f1: averaged.f1,
        strategy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelSpec;
    use crate::dataset::LabeledSample;
    use crate::dataset::loader::TableFormat;
    use crate::ml::TrainDataset;
    use std::path::PathBuf;

    fn labeled(rows: &[(f32, &str)]) -> LabeledSet {
        LabeledSet {
            data_path: PathBuf::from("l.csv"),
            labels_path: PathBuf::from("l.csv"),
            format: TableFormat::Csv,
            labels_format: TableFormat::Csv,
            feature_names: vec!["x".into()],
            label_column: "label".into(),
            samples: rows
                .iter()
                .map(|&(x, label)| LabeledSample {
                    features: vec![x],
                    label: label.to_string(),
                    original_index: None,
                })
                .collect(),
        }
    }

    fn model() -> Estimator {
        let dataset = TrainDataset {
            classes: vec!["neg".into(), "pos".into()],
            x: vec![vec![0.0], vec![0.1], vec![0.9], vec![1.0]],
            y: vec![0, 0, 1, 1],
        };
        Estimator::fit(&ModelSpec::default(), &dataset, 1).unwrap()
    }

    fn ctx(space: &[String]) -> EvaluationContext<'_> {
        EvaluationContext {
            round: 1,
            final_training: false,
            label_space: space,
            model_type: "tree_ensemble",
            training_path: "cold_start",
            timestamp: 0.0,
            iso_timestamp: "1970-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn two_classes_use_binary_averaging() {
        let set = labeled(&[(0.0, "neg"), (1.0, "pos"), (0.05, "neg"), (0.95, "pos")]);
        let plan = SplitPlan {
            train: vec![0, 1],
            test: vec![2, 3],
            degraded: false,
        };
        let space = vec!["neg".to_string(), "pos".to_string()];
        let metrics = evaluate(&model(), &set, &plan, ctx(&space));
        assert_eq!(metrics.average_strategy, "binary");
        assert_eq!(metrics.accuracy, 1.0);
        assert_eq!(metrics.test_samples, 2);
        assert!(metrics.error.is_none());
    }

    #[test]
    fn unseen_test_class_counts_as_error() {
        let set = labeled(&[(0.0, "neg"), (1.0, "pos"), (0.5, "other")]);
        let plan = SplitPlan {
            train: vec![0, 1],
            test: vec![0, 1, 2],
            degraded: true,
        };
        let space = Vec::new();
        let metrics = evaluate(&model(), &set, &plan, ctx(&space));
        assert_eq!(metrics.average_strategy, "weighted");
        for value in [metrics.accuracy, metrics.precision, metrics.recall, metrics.f1_score] {
            assert!((0.0..=1.0).contains(&value));
        }
        assert!(metrics.accuracy < 1.0);
        assert!(metrics.degraded_split);
    }

    #[test]
    fn empty_test_split_degrades_to_zeroes() {
        let set = labeled(&[(0.0, "neg")]);
        let plan = SplitPlan {
            train: vec![0],
            test: vec![],
            degraded: false,
        };
        let metrics = evaluate(&model(), &set, &plan, ctx(&[]));
        assert_eq!(metrics.accuracy, 0.0);
        assert_eq!(metrics.error.as_deref(), Some("no test samples"));
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["error"], "no test samples");
    }
}
