//! Uniform fit/predict contract over the model kinds and the round artifact.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::gbdt_stump::{GbdtStumpModel, train_gbdt_stump};
use super::logreg::{LogRegModel, train_logreg};
use super::margin::{MarginModel, train_margin};
use super::{TrainDataset, argmax};
use crate::config::{ModelKind, ModelSpec};

/// Current on-disk artifact format.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("labeled training split is empty")]
    EmptyDataset,
    #[error("need at least 2 classes to train a {kind} model, found {found}")]
    TooFewClasses { kind: &'static str, found: usize },
    #[error("{kind} training failed: {message}")]
    Failed { kind: &'static str, message: String },
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("read failed: {0}")]
    Read(#[from] std::io::Error),
    #[error("decode failed: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unsupported artifact format version {0}")]
    UnsupportedVersion(u32),
    #[error("invalid estimator: {0}")]
    Invalid(String),
    #[error("artifact expects {expected} features but the dataset has {found}")]
    FeatureArity { expected: usize, found: usize },
}

/// Prediction contract shared by every estimator.
pub trait Classifier {
    /// Ordered class identifiers matching probability positions.
    fn classes(&self) -> &[String];

    /// Number of features expected per row.
    fn feature_len(&self) -> usize;

    /// Class probabilities; empty when the row has the wrong arity.
    fn predict_proba(&self, features: &[f32]) -> Vec<f32>;

    /// Most probable class label.
    fn predict_label(&self, features: &[f32]) -> Option<&str> {
        let proba = self.predict_proba(features);
        if proba.is_empty() {
            return None;
        }
        self.classes().get(argmax(&proba)).map(String::as_str)
    }
}

/// A fitted estimator of one of the supported kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    TreeEnsemble(GbdtStumpModel),
    Linear(LogRegModel),
    MarginClassifier(MarginModel),
}

impl Estimator {
    /// Fit a fresh estimator for `spec`; `seed` applies when the spec has none.
    pub fn fit(spec: &ModelSpec, dataset: &TrainDataset, seed: u64) -> Result<Self, TrainError> {
        if dataset.x.is_empty() {
            return Err(TrainError::EmptyDataset);
        }
        let kind = spec.kind();
        if dataset.classes.len() < 2 {
            return Err(TrainError::TooFewClasses {
                kind: kind.as_str(),
                found: dataset.classes.len(),
            });
        }
        let failed = |message: String| TrainError::Failed {
            kind: kind.as_str(),
            message,
        };
        match spec {
            ModelSpec::TreeEnsemble(options) => train_gbdt_stump(dataset, options)
                .map(Estimator::TreeEnsemble)
                .map_err(failed),
            ModelSpec::Linear(options) => {
                let mut options = options.clone();
                options.seed = options.seed.or(Some(seed));
                train_logreg(dataset, &options)
                    .map(Estimator::Linear)
                    .map_err(failed)
            }
            ModelSpec::Margin(options) => {
                let mut options = options.clone();
                options.seed = options.seed.or(Some(seed));
                train_margin(dataset, &options)
                    .map(Estimator::MarginClassifier)
                    .map_err(failed)
            }
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Estimator::TreeEnsemble(_) => ModelKind::TreeEnsemble,
            Estimator::Linear(_) => ModelKind::Linear,
            Estimator::MarginClassifier(_) => ModelKind::Margin,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            Estimator::TreeEnsemble(model) => model.validate(),
            Estimator::Linear(model) => model.validate(),
            Estimator::MarginClassifier(model) => model.validate(),
        }
    }
}

impl Classifier for Estimator {
    fn classes(&self) -> &[String] {
        match self {
            Estimator::TreeEnsemble(model) => &model.classes,
            Estimator::Linear(model) => &model.classes,
            Estimator::MarginClassifier(model) => &model.classes,
        }
    }

    fn feature_len(&self) -> usize {
        match self {
            Estimator::TreeEnsemble(model) => model.feature_len,
            Estimator::Linear(model) => model.feature_len,
            Estimator::MarginClassifier(model) => model.feature_len,
        }
    }

    fn predict_proba(&self, features: &[f32]) -> Vec<f32> {
        if features.len() != self.feature_len() {
            return Vec::new();
        }
        match self {
            Estimator::TreeEnsemble(model) => model.predict_proba(features),
            Estimator::Linear(model) => model.predict_proba(features),
            Estimator::MarginClassifier(model) => model.predict_proba(features),
        }
    }
}

/// Serialized estimator for one round, the warm-start input of the next.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub project_id: String,
    pub round: u32,
    pub created_at: String,
    pub feature_names: Vec<String>,
    pub estimator: Estimator,
}

impl ModelArtifact {
    pub fn new(
        project_id: &str,
        round: u32,
        created_at: String,
        feature_names: Vec<String>,
        estimator: Estimator,
    ) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            project_id: project_id.to_string(),
            round,
            created_at,
            feature_names,
            estimator,
        }
    }

    /// Read, decode and validate an artifact.
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let bytes = std::fs::read(path)?;
        let artifact: Self = serde_json::from_slice(&bytes)?;
        if artifact.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedVersion(artifact.format_version));
        }
        artifact
            .estimator
            .validate()
            .map_err(ArtifactError::Invalid)?;
        Ok(artifact)
    }

    /// Reject artifacts fitted on a different feature arity.
    pub fn ensure_arity(&self, found: usize) -> Result<(), ArtifactError> {
        let expected = self.estimator.feature_len();
        if expected != found {
            return Err(ArtifactError::FeatureArity { expected, found });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::gbdt_stump::TrainOptions;
    use tempfile::tempdir;

    fn dataset() -> TrainDataset {
        TrainDataset {
            classes: vec!["0".into(), "1".into()],
            x: vec![vec![0.0, 0.0], vec![0.1, 0.2], vec![1.0, 1.0], vec![0.9, 1.1]],
            y: vec![0, 0, 1, 1],
        }
    }

    #[test]
    fn artifact_round_trips_through_json() {
        let spec = ModelSpec::TreeEnsemble(TrainOptions {
            rounds: 5,
            ..TrainOptions::default()
        });
        let estimator = Estimator::fit(&spec, &dataset(), 1).unwrap();
        let artifact = ModelArtifact::new("p", 1, "now".into(), vec!["a".into(), "b".into()], estimator);
        let dir = tempdir().unwrap();
        let path = dir.path().join("model_round_1.json");
        std::fs::write(&path, serde_json::to_vec(&artifact).unwrap()).unwrap();

        let loaded = ModelArtifact::load(&path).unwrap();
        assert_eq!(loaded.estimator.kind(), ModelKind::TreeEnsemble);
        assert_eq!(
            loaded.estimator.predict_label(&[1.0, 1.0]),
            artifact.estimator.predict_label(&[1.0, 1.0])
        );
        assert!(loaded.ensure_arity(3).is_err());
    }

    #[test]
    fn garbage_artifact_is_a_decode_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model_round_1.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(ModelArtifact::load(&path), Err(ArtifactError::Decode(_))));
    }

    #[test]
    fn every_kind_fits_and_predicts() {
        for spec in [
            ModelSpec::TreeEnsemble(Default::default()),
            ModelSpec::Linear(Default::default()),
            ModelSpec::Margin(Default::default()),
        ] {
            let estimator = Estimator::fit(&spec, &dataset(), 3).unwrap();
            assert_eq!(estimator.kind(), spec.kind());
            let proba = estimator.predict_proba(&[0.5, 0.5]);
            assert_eq!(proba.len(), 2);
            assert!(estimator.predict_proba(&[0.5]).is_empty());
        }
    }
}
