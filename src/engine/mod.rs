//! One active learning round, reconstructed from disk.
//!
//! A round runs `load -> accumulate -> reconcile -> train -> evaluate ->
//! query -> persist`. Nothing survives the process except the files written
//! by the persist step and the rewritten labeled dataset.

pub mod accumulate;
pub mod evaluate;
pub mod outcome;
pub mod persist;
pub mod query;
pub mod reconcile;
pub mod state;
pub mod trainer;

use std::path::PathBuf;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{error, info, info_span};

use crate::config::{ConfigError, EngineConfig};
use crate::dataset::split::stratified_split;
use crate::error::EngineError;
use crate::ml::{ModelArtifact, TrainDataset};
use crate::project::ProjectContext;
use evaluate::{EvaluationContext, evaluate};
use outcome::RoundReport;
use persist::{QueryRecord, RoundArtifacts, VotingContract, persist_round};
use query::select_queries;
use state::IterationState;
use trainer::{locate_artifact, train_or_warm_start};

pub use outcome::IterationOutcome;

/// Input files and switches for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationRequest {
    pub labeled_data_path: PathBuf,
    /// Equal to `labeled_data_path` when labels are a column of that file.
    pub labeled_labels_path: PathBuf,
    pub unlabeled_data_path: PathBuf,
    pub model_in: Option<PathBuf>,
    pub config_path: PathBuf,
    pub round: u32,
    /// Train and evaluate only; no query batch is produced.
    pub final_training: bool,
}

impl IterationRequest {
    /// Request whose labels live in the labeled data file.
    pub fn new(
        labeled_data_path: impl Into<PathBuf>,
        unlabeled_data_path: impl Into<PathBuf>,
        config_path: impl Into<PathBuf>,
        round: u32,
    ) -> Self {
        let labeled_data_path = labeled_data_path.into();
        Self {
            labeled_labels_path: labeled_data_path.clone(),
            labeled_data_path,
            unlabeled_data_path: unlabeled_data_path.into(),
            model_in: None,
            config_path: config_path.into(),
            round,
            final_training: false,
        }
    }
}

/// Run one round and report the result; never panics on bad input.
pub fn run_iteration(ctx: &ProjectContext, request: &IterationRequest) -> IterationOutcome {
    let span = info_span!("round", project = %ctx.project_id, round = request.round);
    let _entered = span.enter();
    match run_round(ctx, request) {
        Ok(report) => {
            info!(
                accumulated = report.accumulated_samples,
                queried = report.queried_indices.len(),
                exhausted = report.pool_exhausted,
                "Round complete"
            );
            IterationOutcome::succeeded(request.round, &ctx.project_id, report)
        }
        Err(err) => {
            error!(kind = err.kind(), "Round failed: {err}");
            IterationOutcome::failed(request.round, &ctx.project_id, &err)
        }
    }
}

/// The round itself; fatal errors surface before any round output is written.
pub fn run_round(
    ctx: &ProjectContext,
    request: &IterationRequest,
) -> Result<RoundReport, EngineError> {
    let round = request.round;
    if round == 0 {
        return Err(ConfigError::InvalidRound(round).into());
    }
    let config = EngineConfig::load(&ctx.resolve(&request.config_path))?;
    let state = IterationState::reconstruct(ctx, request, &config)?;
    let classes = state.label_space.classes().to_vec();

    let plan = stratified_split(
        &state.labeled.labels(),
        config.random_seed,
        config.test_fraction,
        config.min_split_size,
    );
    let (x, y) = state.labeled.training_rows(&plan.train, &state.label_space);
    let train = TrainDataset {
        classes: classes.clone(),
        x,
        y,
    };

    let artifact_in = locate_artifact(ctx, round, request.model_in.as_deref());
    let model = train_or_warm_start(
        &config,
        &train,
        state.unlabeled.arity(),
        artifact_in.as_deref(),
    )?;

    let now = OffsetDateTime::now_utc();
    let iso_timestamp = now.format(&Rfc3339).unwrap_or_else(|_| now.to_string());
    let model_type = model.estimator.kind().as_str();
    let performance = evaluate(
        &model.estimator,
        &state.labeled,
        &plan,
        EvaluationContext {
            round,
            final_training: request.final_training,
            label_space: &classes,
            model_type,
            training_path: model.path.as_str(),
            timestamp: now.unix_timestamp_nanos() as f64 / 1e9,
            iso_timestamp: iso_timestamp.clone(),
        },
    );

    let queries: Option<Vec<QueryRecord>> = if request.final_training {
        info!("Final training round; skipping query selection");
        None
    } else {
        let picked = select_queries(
            &model.estimator,
            state.pool.features.view(),
            config.query_batch_size,
            config.query_strategy,
            config.random_seed.wrapping_add(u64::from(round)),
        );
        let records = picked
            .iter()
            .filter_map(|candidate| {
                let original_index = state.pool.index_map.to_original(candidate.position)?;
                let features = state.unlabeled.row(original_index)?;
                Some(QueryRecord {
                    original_index,
                    features,
                })
            })
            .collect::<Vec<_>>();
        info!(
            strategy = config.query_strategy.as_str(),
            selected = records.len(),
            eligible = state.pool.len(),
            "Selected query batch"
        );
        Some(records)
    };
    let contract = match &queries {
        Some(records) if config.emit_voting_contract && !records.is_empty() => {
            Some(VotingContract::new(
                ctx,
                round,
                &classes,
                &state.unlabeled.feature_names,
                records,
            ))
        }
        _ => None,
    };

    let training_path = model.path.as_str().to_string();
    let artifact = ModelArtifact::new(
        &ctx.project_id,
        round,
        iso_timestamp,
        state.labeled.feature_names.clone(),
        model.estimator,
    );
    let outputs = persist_round(
        ctx,
        round,
        &RoundArtifacts {
            model: &artifact,
            performance: &performance,
            queries: queries.as_deref(),
            contract: contract.as_ref(),
            feature_names: &state.unlabeled.feature_names,
            format: state.unlabeled.format,
        },
    )?;

    let queried_indices = queries
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|q| q.original_index)
        .collect();
    Ok(RoundReport {
        outputs,
        accumulated_samples: state.accumulation.added,
        labeled_samples: state.labeled.len(),
        excluded_indices: state.pool.excluded.len(),
        eligible_pool_size: state.pool.len(),
        queried_indices,
        pool_exhausted: !request.final_training && state.pool.is_empty(),
        training_path,
        model_in: model.artifact_in,
    })
}
