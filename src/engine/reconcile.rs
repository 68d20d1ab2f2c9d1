//! Pool index reconciliation: which unlabeled rows are still eligible.
//!
//! Persisted query batches are the only record of what was already asked, so
//! the exclusion set for round `N` is the union of `original_index` values in
//! `query_samples_round_{1..N-1}.json`. Working-pool positions are translated
//! back to original indices through [`IndexMap`] before anything is persisted.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use ndarray::{Array2, Axis};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::project::ProjectContext;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{}: entry {entry} has no integer original_index", path.display())]
    MissingIndex { path: PathBuf, entry: usize },
}

/// Dense `working position -> original index` mapping, strictly increasing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMap(Vec<usize>);

impl IndexMap {
    pub fn identity(n: usize) -> Self {
        Self((0..n).collect())
    }

    /// All original indices in `0..n` that are not excluded, in order.
    pub fn from_exclusions(n: usize, excluded: &BTreeSet<usize>) -> Self {
        Self((0..n).filter(|idx| !excluded.contains(idx)).collect())
    }

    pub fn to_original(&self, position: usize) -> Option<usize> {
        self.0.get(position).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }
}

/// Unlabeled rows still available for querying this round.
#[derive(Debug, Clone)]
pub struct EligiblePool {
    pub features: Array2<f32>,
    pub index_map: IndexMap,
    /// Exclusions that fell inside the original dataset.
    pub excluded: BTreeSet<usize>,
}

impl EligiblePool {
    /// Whole dataset, nothing excluded.
    pub fn identity(original: &Array2<f32>) -> Self {
        Self {
            features: original.clone(),
            index_map: IndexMap::identity(original.nrows()),
            excluded: BTreeSet::new(),
        }
    }

    /// Slice `original` down to the rows not in `excluded`.
    pub fn filtered(original: &Array2<f32>, excluded: &BTreeSet<usize>) -> Self {
        let n = original.nrows();
        let excluded: BTreeSet<usize> = excluded.range(..n).copied().collect();
        let index_map = IndexMap::from_exclusions(n, &excluded);
        let features = original.select(Axis(0), index_map.as_slice());
        Self {
            features,
            index_map,
            excluded,
        }
    }

    pub fn len(&self) -> usize {
        self.index_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_map.is_empty()
    }
}

/// Original indices queried in rounds `1..round`.
pub fn collect_exclusions(
    ctx: &ProjectContext,
    round: u32,
) -> Result<BTreeSet<usize>, ReconcileError> {
    let mut excluded = BTreeSet::new();
    for prior in 1..round {
        let path = ctx.query_samples_path(prior);
        if !path.is_file() {
            debug!("No query batch for round {prior} at {}", path.display());
            continue;
        }
        excluded.extend(read_query_indices(&path)?);
    }
    Ok(excluded)
}

/// `original_index` of every entry of one persisted query batch.
pub fn read_query_indices(path: &Path) -> Result<Vec<usize>, ReconcileError> {
    let bytes = std::fs::read(path).map_err(|source| ReconcileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let entries: Vec<Value> =
        serde_json::from_slice(&bytes).map_err(|source| ReconcileError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    entries
        .iter()
        .enumerate()
        .map(|(entry, value)| {
            value
                .get("original_index")
                .and_then(Value::as_u64)
                .map(|idx| idx as usize)
                .ok_or_else(|| ReconcileError::MissingIndex {
                    path: path.to_path_buf(),
                    entry,
                })
        })
        .collect()
}

/// Build this round's eligible pool, degrading to identity on any error.
pub fn reconcile_pool(ctx: &ProjectContext, round: u32, original: &Array2<f32>) -> EligiblePool {
    if round <= 1 {
        return EligiblePool::identity(original);
    }
    match collect_exclusions(ctx, round) {
        Ok(excluded) => {
            let pool = EligiblePool::filtered(original, &excluded);
            info!(
                excluded = pool.excluded.len(),
                eligible = pool.len(),
                "Reconciled unlabeled pool"
            );
            pool
        }
        Err(err) => {
            warn!("Could not compute pool exclusions, using the full pool: {err}");
            EligiblePool::identity(original)
        }
    }
}
