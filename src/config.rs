//! Round configuration loaded from the project's JSON config file.
//!
//! Config keys (JSON): `model_type`, `training_args`, `label_space`,
//! `query_batch_size`, `max_iterations`, `query_strategy`, `random_seed`,
//! `refit_on_warm_start`, `emit_voting_contract`, `min_split_size`,
//! `test_fraction`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::dataset::labels::LabelValue;
use crate::dataset::split::{DEFAULT_MIN_SPLIT_SIZE, DEFAULT_TEST_FRACTION};
use crate::engine::query::QueryStrategy;
use crate::ml::{gbdt_stump, logreg, margin};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {} not found", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("round must be a positive integer, got {0}")]
    InvalidRound(u32),
    #[error("query_batch_size must be a positive integer, got {0}")]
    InvalidBatchSize(i64),
    #[error("label_space contains {0:?} more than once")]
    DuplicateLabel(String),
    #[error("test_fraction must lie strictly between 0 and 1, got {0}")]
    InvalidTestFraction(f64),
    #[error("invalid training_args for {kind}: {source}")]
    TrainingArgs {
        kind: &'static str,
        source: serde_json::Error,
    },
}

/// Closed set of supported model kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    TreeEnsemble,
    Linear,
    Margin,
}

impl ModelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::TreeEnsemble => "tree_ensemble",
            ModelKind::Linear => "linear",
            ModelKind::Margin => "margin_classifier",
        }
    }

    /// Parse a canonical or legacy estimator name.
    pub fn parse(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "tree_ensemble" | "tree" | "gbdt" | "randomforestclassifier"
            | "gradientboostingclassifier" => Some(ModelKind::TreeEnsemble),
            "linear" | "logreg" | "logisticregression" => Some(ModelKind::Linear),
            "margin_classifier" | "margin" | "svm" | "linearsvc" | "svc" | "sgdclassifier" => {
                Some(ModelKind::Margin)
            }
            _ => None,
        }
    }
}

/// Model kind with its typed hyperparameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSpec {
    TreeEnsemble(gbdt_stump::TrainOptions),
    Linear(logreg::TrainOptions),
    Margin(margin::TrainOptions),
}

impl ModelSpec {
    /// Decode `training_args` into the hyperparameters of `kind`.
    pub fn from_args(kind: ModelKind, args: &Map<String, Value>) -> Result<Self, ConfigError> {
        let value = Value::Object(args.clone());
        let map_err = |source| ConfigError::TrainingArgs {
            kind: kind.as_str(),
            source,
        };
        Ok(match kind {
            ModelKind::TreeEnsemble => {
                ModelSpec::TreeEnsemble(serde_json::from_value(value).map_err(map_err)?)
            }
            ModelKind::Linear => ModelSpec::Linear(serde_json::from_value(value).map_err(map_err)?),
            ModelKind::Margin => ModelSpec::Margin(serde_json::from_value(value).map_err(map_err)?),
        })
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            ModelSpec::TreeEnsemble(_) => ModelKind::TreeEnsemble,
            ModelSpec::Linear(_) => ModelKind::Linear,
            ModelSpec::Margin(_) => ModelKind::Margin,
        }
    }
}

impl Default for ModelSpec {
    fn default() -> Self {
        ModelSpec::TreeEnsemble(gbdt_stump::TrainOptions::default())
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default = "default_model_type")]
    model_type: String,
    #[serde(default)]
    training_args: Map<String, Value>,
    #[serde(default)]
    label_space: Vec<LabelValue>,
    #[serde(default = "default_query_batch_size")]
    query_batch_size: i64,
    #[serde(default)]
    max_iterations: Option<u32>,
    #[serde(default)]
    query_strategy: QueryStrategy,
    #[serde(default = "default_random_seed")]
    random_seed: u64,
    #[serde(default)]
    refit_on_warm_start: bool,
    #[serde(default = "default_true")]
    emit_voting_contract: bool,
    #[serde(default = "default_min_split_size")]
    min_split_size: usize,
    #[serde(default = "default_test_fraction")]
    test_fraction: f64,
}

fn default_model_type() -> String {
    ModelKind::TreeEnsemble.as_str().to_string()
}

fn default_query_batch_size() -> i64 {
    1
}

fn default_random_seed() -> u64 {
    42
}

fn default_true() -> bool {
    true
}

fn default_min_split_size() -> usize {
    DEFAULT_MIN_SPLIT_SIZE
}

fn default_test_fraction() -> f64 {
    DEFAULT_TEST_FRACTION
}

/// Validated configuration for one round.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub model: ModelSpec,
    /// Declared label space in canonical form; empty means inferred.
    pub label_space: Vec<String>,
    pub query_batch_size: usize,
    /// Carried for the external driver; the engine never reads it.
    pub max_iterations: Option<u32>,
    pub query_strategy: QueryStrategy,
    pub random_seed: u64,
    pub refit_on_warm_start: bool,
    pub emit_voting_contract: bool,
    pub min_split_size: usize,
    pub test_fraction: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: ModelSpec::default(),
            label_space: Vec::new(),
            query_batch_size: 1,
            max_iterations: None,
            query_strategy: QueryStrategy::default(),
            random_seed: default_random_seed(),
            refit_on_warm_start: false,
            emit_voting_contract: true,
            min_split_size: DEFAULT_MIN_SPLIT_SIZE,
            test_fraction: DEFAULT_TEST_FRACTION,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        if raw.query_batch_size <= 0 {
            return Err(ConfigError::InvalidBatchSize(raw.query_batch_size));
        }
        if !(raw.test_fraction > 0.0 && raw.test_fraction < 1.0) {
            return Err(ConfigError::InvalidTestFraction(raw.test_fraction));
        }
        let mut label_space: Vec<String> = Vec::with_capacity(raw.label_space.len());
        for value in &raw.label_space {
            let label = value.canonical();
            if label_space.contains(&label) {
                return Err(ConfigError::DuplicateLabel(label));
            }
            label_space.push(label);
        }
        Ok(Self {
            model: resolve_model(&raw.model_type, &raw.training_args)?,
            label_space,
            query_batch_size: raw.query_batch_size as usize,
            max_iterations: raw.max_iterations,
            query_strategy: raw.query_strategy,
            random_seed: raw.random_seed,
            refit_on_warm_start: raw.refit_on_warm_start,
            emit_voting_contract: raw.emit_voting_contract,
            min_split_size: raw.min_split_size,
            test_fraction: raw.test_fraction,
        })
    }
}

fn resolve_model(model_type: &str, args: &Map<String, Value>) -> Result<ModelSpec, ConfigError> {
    match ModelKind::parse(model_type) {
        Some(kind) => ModelSpec::from_args(kind, args),
        None => {
            warn!(
                model_type,
                "Unknown model_type; falling back to {}",
                ModelKind::TreeEnsemble.as_str()
            );
            // Arguments were written for another estimator; keep what still applies.
            Ok(ModelSpec::from_args(ModelKind::TreeEnsemble, args).unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_object_uses_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config.model, ModelSpec::default());
        assert_eq!(config.query_batch_size, 1);
        assert_eq!(config.random_seed, 42);
        assert!(config.label_space.is_empty());
        assert!(config.emit_voting_contract);
        assert!(!config.refit_on_warm_start);
    }

    #[test]
    fn legacy_names_and_aliases_decode() {
        let config = EngineConfig::from_json(
            r#"{"model_type": "LogisticRegression",
                "training_args": {"max_iter": 7, "C": 2.0, "random_state": 5, "unknown": true},
                "label_space": ["setosa", "versicolor", "virginica"],
                "query_batch_size": 3,
                "max_iterations": 10}"#,
        )
        .unwrap();
        match config.model {
            ModelSpec::Linear(options) => {
                assert_eq!(options.epochs, 7);
                assert_eq!(options.c, Some(2.0));
                assert_eq!(options.seed, Some(5));
            }
            other => panic!("unexpected model {other:?}"),
        }
        assert_eq!(config.query_batch_size, 3);
        assert_eq!(config.max_iterations, Some(10));
        assert_eq!(config.label_space.len(), 3);
    }

    #[test]
    fn unknown_model_type_falls_back_to_tree_ensemble() {
        let config = EngineConfig::from_json(
            r#"{"model_type": "KNeighborsClassifier", "training_args": {"n_neighbors": 3}}"#,
        )
        .unwrap();
        assert_eq!(config.model.kind(), ModelKind::TreeEnsemble);
    }

    #[test]
    fn mixed_label_space_is_canonicalized_and_deduplicated() {
        let config = EngineConfig::from_json(r#"{"label_space": [0, 1.0, "2"]}"#).unwrap();
        assert_eq!(config.label_space, vec!["0", "1", "2"]);
        let err = EngineConfig::from_json(r#"{"label_space": [1, "1"]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateLabel(label) if label == "1"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            EngineConfig::from_json(r#"{"query_batch_size": 0}"#),
            Err(ConfigError::InvalidBatchSize(0))
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{"test_fraction": 1.5}"#),
            Err(ConfigError::InvalidTestFraction(_))
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{"training_args": {"n_estimators": "many"}}"#),
            Err(ConfigError::TrainingArgs { .. })
        ));
    }

    #[test]
    fn load_reports_missing_file_and_parse_path() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("config.json");
        assert!(matches!(
            EngineConfig::load(&missing),
            Err(ConfigError::NotFound(_))
        ));
        std::fs::write(&missing, "{ not json").unwrap();
        match EngineConfig::load(&missing) {
            Err(ConfigError::Parse { path, .. }) => assert_eq!(path, missing),
            other => panic!("unexpected {other:?}"),
        }
    }
}
