//! Pool-based active learning rounds driven entirely by files on disk.
//!
//! Each invocation rebuilds the round's state from the project directory,
//! folds in labels voted on since the last round, retrains or warm starts the
//! estimator, evaluates it and writes the next query batch.

/// Round configuration.
pub mod config;
/// Labeled and unlabeled datasets.
pub mod dataset;
/// The round pipeline.
pub mod engine;
/// Top-level error taxonomy.
pub mod error;
/// Logging setup.
pub mod logging;
/// Estimators, metrics and model artifacts.
pub mod ml;
/// Project location and file naming.
pub mod project;

pub use config::EngineConfig;
pub use engine::{IterationOutcome, IterationRequest, run_iteration};
pub use error::EngineError;
pub use project::ProjectContext;
