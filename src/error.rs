//! Top-level error taxonomy for a single active learning round.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::dataset::LoadError;
use crate::dataset::labels::LabelError;
use crate::ml::estimator::{ArtifactError, TrainError};

/// Fatal errors that abort a round before its outputs are written.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// A required input file does not exist.
    #[error("required input not found: {}", path.display())]
    InputNotFound { path: PathBuf },
    /// Unsupported file extension or malformed tabular structure.
    #[error("format error: {0}")]
    Format(LoadError),
    /// A bootstrap label is outside the declared label space.
    #[error("label error: {0}")]
    Label(#[from] LabelError),
    /// A prior-round model artifact exists but cannot be used.
    #[error("model artifact {} is corrupt: {source}", path.display())]
    ArtifactCorrupt {
        path: PathBuf,
        source: ArtifactError,
    },
    /// The labeled set cannot produce a fitted estimator.
    #[error("training failed: {0}")]
    Training(#[from] TrainError),
    /// Unexpected filesystem failure while persisting outputs.
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Output serialization failure.
    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        source: serde_json::Error,
    },
}

impl EngineError {
    /// Stable snake_case tag for the structured result.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Config(_) => "config_error",
            EngineError::InputNotFound { .. } => "input_not_found",
            EngineError::Format(_) => "format_error",
            EngineError::Label(_) => "label_error",
            EngineError::ArtifactCorrupt { .. } => "artifact_corrupt",
            EngineError::Training(_) => "training_error",
            EngineError::Io { .. } => "io_error",
            EngineError::Serialize { .. } => "internal_error",
        }
    }

    /// True when the caller can fix the problem by changing inputs or config.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            EngineError::Config(_)
                | EngineError::InputNotFound { .. }
                | EngineError::Format(_)
                | EngineError::Label(_)
                | EngineError::Training(_)
        )
    }

    /// Human-readable message that states who is expected to act on it.
    pub fn user_message(&self) -> String {
        if self.is_caller_error() {
            format!("Invalid input or configuration: {self}")
        } else {
            format!("Internal error (please report): {self}")
        }
    }
}

impl From<LoadError> for EngineError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::NotFound(path) => EngineError::InputNotFound { path },
            other => EngineError::Format(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_input_is_a_caller_error() {
        let err = EngineError::from(LoadError::NotFound(PathBuf::from("x.csv")));
        assert_eq!(err.kind(), "input_not_found");
        assert!(err.is_caller_error());
        assert!(err.user_message().starts_with("Invalid input"));
    }

    #[test]
    fn io_failure_is_internal() {
        let err = EngineError::Io {
            path: PathBuf::from("out"),
            source: std::io::Error::other("disk full"),
        };
        assert!(!err.is_caller_error());
        assert!(err.user_message().starts_with("Internal error"));
    }
}
