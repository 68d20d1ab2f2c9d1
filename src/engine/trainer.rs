//! Cold start or warm start of the round's estimator.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::ml::{Estimator, ModelArtifact, TrainDataset};
use crate::project::ProjectContext;

/// How the round's estimator was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingPath {
    ColdStart,
    /// Imported artifact used as-is.
    WarmStart,
    /// Artifact found, but the configured model was re-fit on this round's data.
    WarmStartRefit,
}

impl TrainingPath {
    pub fn as_str(self) -> &'static str {
        match self {
            TrainingPath::ColdStart => "cold_start",
            TrainingPath::WarmStart => "warm_start",
            TrainingPath::WarmStartRefit => "warm_start_refit",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoundModel {
    pub estimator: Estimator,
    pub path: TrainingPath,
    pub artifact_in: Option<PathBuf>,
}

/// Prior artifact to warm start from, if one exists.
///
/// An explicit path wins; otherwise round `N` looks for `model_round_{N-1}`.
/// A missing file is the expected first-round case, not an error.
pub fn locate_artifact(
    ctx: &ProjectContext,
    round: u32,
    explicit: Option<&Path>,
) -> Option<PathBuf> {
    let candidate = match explicit {
        Some(path) => ctx.resolve(path),
        None if round > 1 => ctx.model_path(round - 1),
        None => return None,
    };
    if candidate.is_file() {
        Some(candidate)
    } else {
        info!("No model artifact at {}; cold start", candidate.display());
        None
    }
}

/// Produce the round's estimator from `artifact` or by fitting `train`.
pub fn train_or_warm_start(
    config: &EngineConfig,
    train: &TrainDataset,
    feature_arity: usize,
    artifact: Option<&Path>,
) -> Result<RoundModel, EngineError> {
    let Some(path) = artifact else {
        let estimator = Estimator::fit(&config.model, train, config.random_seed)?;
        info!(
            kind = estimator.kind().as_str(),
            rows = train.x.len(),
            "Trained model from scratch"
        );
        return Ok(RoundModel {
            estimator,
            path: TrainingPath::ColdStart,
            artifact_in: None,
        });
    };

    let corrupt = |source| EngineError::ArtifactCorrupt {
        path: path.to_path_buf(),
        source,
    };
    let imported = ModelArtifact::load(path).map_err(corrupt)?;
    imported.ensure_arity(feature_arity).map_err(corrupt)?;

    if !config.refit_on_warm_start {
        info!(
            kind = imported.estimator.kind().as_str(),
            from_round = imported.round,
            "Warm start from {}",
            path.display()
        );
        return Ok(RoundModel {
            estimator: imported.estimator,
            path: TrainingPath::WarmStart,
            artifact_in: Some(path.to_path_buf()),
        });
    }

    let configured = config.model.kind();
    if imported.estimator.kind() != configured {
        warn!(
            "Imported model is {} but config selects {}; re-fitting {}",
            imported.estimator.kind().as_str(),
            configured.as_str(),
            configured.as_str()
        );
    }
    let estimator = Estimator::fit(&config.model, train, config.random_seed)?;
    info!(kind = configured.as_str(), rows = train.x.len(), "Re-fit model on warm start");
    Ok(RoundModel {
        estimator,
        path: TrainingPath::WarmStartRefit,
        artifact_in: Some(path.to_path_buf()),
    })
}
