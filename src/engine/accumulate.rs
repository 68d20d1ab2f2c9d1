//! Label accumulation from prior rounds' voting results.
//!
//! Every round rescans `voting_results_round_{1..N-1}.json` and appends the
//! entries whose feature vector is not yet in the labeled set. Dedup by exact
//! feature values makes the rescan idempotent.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::dataset::FeatureTable;
use crate::dataset::labels::{LabelSpace, LabelValue};
use crate::dataset::store::{FeatureKey, LabeledSample, LabeledSet};
use crate::project::ProjectContext;

/// Relative tolerance when comparing a vote's feature snapshot to the pool row.
const SNAPSHOT_TOLERANCE: f32 = 1e-5;

#[derive(Debug, Error)]
pub enum AccumulateError {
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
    #[error("failed to back up labeled data at {}: {source}", path.display())]
    Backup {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to rewrite labeled data at {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// What one accumulation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccumulationReport {
    pub added: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub files_read: usize,
    /// Pre-append copies of every labeled file, empty when nothing was added.
    pub backups: Vec<PathBuf>,
}

/// One finalized label decision, as written by the labeling process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VotingResult {
    pub original_index: usize,
    pub final_label: LabelValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votes: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus: Option<bool>,
    pub timestamp: String,
    pub round: u32,
}

/// Lenient view of a voting results entry; unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct VotingEntry {
    #[serde(default)]
    original_index: Option<i64>,
    #[serde(default)]
    final_label: Option<LabelValue>,
    #[serde(default)]
    sample_data: Option<Map<String, Value>>,
}

/// Append new voting results to `labeled`, never failing the round.
///
/// The in-memory set only changes once the rewritten file is on disk.
pub fn accumulate_labels(
    ctx: &ProjectContext,
    round: u32,
    labeled: &mut LabeledSet,
    unlabeled: &FeatureTable,
    space: &LabelSpace,
) -> AccumulationReport {
    if round <= 1 {
        return AccumulationReport::default();
    }
    match try_accumulate(ctx, round, labeled, unlabeled, space) {
        Ok(report) => {
            info!(
                added = report.added,
                duplicates = report.duplicates,
                skipped = report.skipped,
                files = report.files_read,
                "Accumulated voting results"
            );
            report
        }
        Err(err) => {
            warn!("Label accumulation failed, training on the previous labeled set: {err}");
            AccumulationReport::default()
        }
    }
}

fn try_accumulate(
    ctx: &ProjectContext,
    round: u32,
    labeled: &mut LabeledSet,
    unlabeled: &FeatureTable,
    space: &LabelSpace,
) -> Result<AccumulationReport, AccumulateError> {
    let mut report = AccumulationReport::default();
    let mut seen = labeled.feature_keys();
    let mut candidates = Vec::new();

    for prior in 1..round {
        let path = ctx.voting_results_path(prior);
        if !path.is_file() {
            debug!("No voting results for round {prior}");
            continue;
        }
        let entries = read_voting_file(&path)?;
        report.files_read += 1;
        for (position, value) in entries.into_iter().enumerate() {
            let Some(sample) = candidate_from_entry(&path, position, value, unlabeled, space)
            else {
                report.skipped += 1;
                continue;
            };
            if seen.insert(FeatureKey::new(&sample.features)) {
                candidates.push(sample);
            } else {
                report.duplicates += 1;
            }
        }
    }

    if candidates.is_empty() {
        return Ok(report);
    }

    let backups = labeled.backup(round).map_err(|source| AccumulateError::Backup {
        path: labeled.data_path.clone(),
        source,
    })?;

    let mut samples = labeled.samples.clone();
    samples.extend(candidates.iter().cloned());
    labeled
        .write_samples(&samples)
        .map_err(|source| AccumulateError::Write {
            path: labeled.data_path.clone(),
            source,
        })?;

    labeled.samples = samples;
    report.added = candidates.len();
    report.backups = backups;
    Ok(report)
}

fn read_voting_file(path: &Path) -> Result<Vec<Value>, AccumulateError> {
    let bytes = std::fs::read(path).map_err(|source| AccumulateError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| AccumulateError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Decode one entry into a labeled sample, or `None` with a warning.
fn candidate_from_entry(
    path: &Path,
    position: usize,
    value: Value,
    unlabeled: &FeatureTable,
    space: &LabelSpace,
) -> Option<LabeledSample> {
    let entry: VotingEntry = match serde_json::from_value(value) {
        Ok(entry) => entry,
        Err(err) => {
            warn!("{} entry {position}: unreadable voting result: {err}", path.display());
            return None;
        }
    };
    let (Some(index), Some(label)) = (entry.original_index, entry.final_label) else {
        debug!("{} entry {position}: missing original_index or final_label", path.display());
        return None;
    };
    let Some(features) = usize::try_from(index).ok().and_then(|idx| unlabeled.row(idx)) else {
        warn!(
            "{} entry {position}: original_index {index} is outside the unlabeled pool of {} rows",
            path.display(),
            unlabeled.n_rows()
        );
        return None;
    };
    let label = label.canonical();
    if let Err(err) = space.check(&label) {
        warn!("{} entry {position}: {err}", path.display());
        return None;
    }
    if let Some(snapshot) = &entry.sample_data {
        check_snapshot(path, index, snapshot, &unlabeled.feature_names, &features);
    }
    Some(LabeledSample {
        features,
        label,
        original_index: Some(index as usize),
    })
}

fn check_snapshot(
    path: &Path,
    index: i64,
    snapshot: &Map<String, Value>,
    feature_names: &[String],
    features: &[f32],
) {
    let mismatched: Vec<&str> = feature_names
        .iter()
        .zip(features)
        .filter_map(|(name, &actual)| {
            let reported = snapshot.get(name)?.as_f64()? as f32;
            let tolerance = SNAPSHOT_TOLERANCE * actual.abs().max(1.0);
            ((reported - actual).abs() > tolerance).then_some(name.as_str())
        })
        .collect();
    if !mismatched.is_empty() {
        warn!(
            "{}: sample_data for original_index {index} disagrees with the unlabeled row on {mismatched:?}; using the unlabeled row",
            path.display()
        );
    }
}
