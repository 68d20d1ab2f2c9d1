//! Per-round state rebuilt from the project files.

use tracing::info;

use super::IterationRequest;
use super::accumulate::{AccumulationReport, accumulate_labels};
use super::reconcile::{EligiblePool, reconcile_pool};
use crate::config::EngineConfig;
use crate::dataset::labels::LabelSpace;
use crate::dataset::{FeatureTable, LabeledSet, load_features};
use crate::error::EngineError;
use crate::project::ProjectContext;

/// Everything later stages read, computed once per round.
#[derive(Debug, Clone)]
pub struct IterationState {
    pub round: u32,
    pub labeled: LabeledSet,
    pub label_space: LabelSpace,
    /// Immutable original unlabeled dataset.
    pub unlabeled: FeatureTable,
    pub pool: EligiblePool,
    pub accumulation: AccumulationReport,
}

impl IterationState {
    /// Load, then accumulate and reconcile for rounds after the first.
    pub fn reconstruct(
        ctx: &ProjectContext,
        request: &IterationRequest,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        let round = request.round;
        let unlabeled = load_features(&ctx.resolve(&request.unlabeled_data_path), None)?;
        let mut labeled = LabeledSet::load(
            &ctx.resolve(&request.labeled_data_path),
            &ctx.resolve(&request.labeled_labels_path),
            unlabeled.arity(),
        )?;
        let mut label_space = LabelSpace::resolve(&config.label_space, &labeled.labels())?;
        info!(
            labeled = labeled.len(),
            unlabeled = unlabeled.n_rows(),
            features = unlabeled.arity(),
            classes = label_space.len(),
            "Loaded datasets"
        );

        let accumulation = accumulate_labels(ctx, round, &mut labeled, &unlabeled, &label_space);
        if !label_space.is_declared() && accumulation.added > 0 {
            let labels = labeled.labels();
            label_space = LabelSpace::inferred(labels.iter().map(String::as_str));
        }
        let pool = reconcile_pool(ctx, round, &unlabeled.features);

        Ok(Self {
            round,
            labeled,
            label_space,
            unlabeled,
            pool,
            accumulation,
        })
    }
}
