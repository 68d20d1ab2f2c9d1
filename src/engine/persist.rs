//! Round outputs written with write-then-rename.
//!
//! Every file of a round is serialized into a temp file next to its target
//! before any of them is renamed, so a failure while writing leaves the
//! previous outputs untouched.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value, json};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use super::evaluate::PerformanceMetrics;
use crate::dataset::TableFormat;
use crate::error::EngineError;
use crate::ml::ModelArtifact;
use crate::project::{ProjectContext, voting_results_file_name};

/// One queried row as handed to the labeling process.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRecord {
    pub original_index: usize,
    pub features: Vec<f32>,
}

/// Schema the next round expects from the labeling process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VotingContract {
    pub project_id: String,
    pub round: u32,
    pub expected_file: String,
    pub consumed_in_round: u32,
    pub required_fields: Vec<String>,
    pub optional_fields: Vec<String>,
    pub label_space: Vec<String>,
    pub feature_names: Vec<String>,
    pub queried_indices: Vec<usize>,
}

impl VotingContract {
    pub fn new(
        ctx: &ProjectContext,
        round: u32,
        label_space: &[String],
        feature_names: &[String],
        queries: &[QueryRecord],
    ) -> Self {
        let fields =
            |names: &[&str]| -> Vec<String> { names.iter().map(|name| name.to_string()).collect() };
        Self {
            project_id: ctx.project_id.clone(),
            round,
            expected_file: voting_results_file_name(round),
            consumed_in_round: round + 1,
            required_fields: fields(&["original_index", "final_label"]),
            optional_fields: fields(&["sample_data", "votes", "consensus", "timestamp", "round"]),
            label_space: label_space.to_vec(),
            feature_names: feature_names.to_vec(),
            queried_indices: queries.iter().map(|q| q.original_index).collect(),
        }
    }
}

/// Everything one round persists.
#[derive(Debug)]
pub struct RoundArtifacts<'a> {
    pub model: &'a ModelArtifact,
    pub performance: &'a PerformanceMetrics,
    /// `None` in final-training mode.
    pub queries: Option<&'a [QueryRecord]>,
    pub contract: Option<&'a VotingContract>,
    pub feature_names: &'a [String],
    pub format: TableFormat,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoundOutputs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_samples: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_out: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voting_contract: Option<PathBuf>,
}

/// Write the round's files under the project output directory.
pub fn persist_round(
    ctx: &ProjectContext,
    round: u32,
    artifacts: &RoundArtifacts<'_>,
) -> Result<RoundOutputs, EngineError> {
    std::fs::create_dir_all(&ctx.output_dir).map_err(|source| EngineError::Io {
        path: ctx.output_dir.clone(),
        source,
    })?;
    let mut outputs = RoundOutputs::default();
    let mut staged = Vec::with_capacity(4);

    let model_path = ctx.model_path(round);
    staged.push(stage_json(&model_path, "model artifact", artifacts.model)?);
    outputs.model_out = Some(model_path);

    let performance_path = ctx.performance_path(round);
    staged.push(stage_json(&performance_path, "performance metrics", artifacts.performance)?);
    outputs.performance = Some(performance_path);

    if let Some(queries) = artifacts.queries {
        let records: Vec<Value> = queries
            .iter()
            .map(|q| query_record_json(q, artifacts.feature_names, artifacts.format))
            .collect();
        let query_path = ctx.query_samples_path(round);
        staged.push(stage_json(&query_path, "query samples", &records)?);
        outputs.query_samples = Some(query_path);
    }

    if let Some(contract) = artifacts.contract {
        let contract_path = ctx.voting_contract_path(round);
        staged.push(stage_json(&contract_path, "voting contract", contract)?);
        outputs.voting_contract = Some(contract_path);
    }

    commit_all(staged)?;
    info!(round, output_dir = %ctx.output_dir.display(), "Persisted round outputs");
    Ok(outputs)
}

/// Tabular inputs keep named feature fields; `.npy` inputs use a `features` array.
pub fn query_record_json(record: &QueryRecord, feature_names: &[String], format: TableFormat) -> Value {
    match format {
        TableFormat::Csv if feature_names.len() == record.features.len() => {
            let mut fields = Map::new();
            for (name, &value) in feature_names.iter().zip(&record.features) {
                fields.insert(name.clone(), json_number(value));
            }
            fields.insert("original_index".into(), json!(record.original_index));
            Value::Object(fields)
        }
        _ => json!({
            "features": record.features.iter().map(|&v| json_number(v)).collect::<Vec<_>>(),
            "original_index": record.original_index,
        }),
    }
}

/// Shortest decimal form of an `f32`, so `5.1` is written as `5.1`.
fn json_number(value: f32) -> Value {
    value
        .to_string()
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map_or(Value::Null, Value::Number)
}

/// Serialized content waiting next to its target.
#[derive(Debug)]
struct StagedFile {
    tmp: NamedTempFile,
    target: PathBuf,
}

fn stage_json<T: Serialize + ?Sized>(
    path: &Path,
    what: &'static str,
    value: &T,
) -> Result<StagedFile, EngineError> {
    let io_err = |source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    };
    let bytes =
        serde_json::to_vec_pretty(value).map_err(|source| EngineError::Serialize { what, source })?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(&bytes).map_err(io_err)?;
    tmp.flush().map_err(io_err)?;
    Ok(StagedFile {
        tmp,
        target: path.to_path_buf(),
    })
}

/// Rename staged files into place. If one rename fails, the files already
/// renamed by this call are removed and the rest are discarded.
fn commit_all(staged: Vec<StagedFile>) -> Result<(), EngineError> {
    let mut committed: Vec<PathBuf> = Vec::with_capacity(staged.len());
    for file in staged {
        if let Err(err) = file.tmp.persist(&file.target) {
            for path in &committed {
                if let Err(remove_err) = std::fs::remove_file(path) {
                    warn!("Failed to remove partial output {}: {remove_err}", path.display());
                }
            }
            return Err(EngineError::Io {
                path: file.target,
                source: err.error,
            });
        }
        committed.push(file.target);
    }
    Ok(())
}

/// Serialize to a temp file in the target directory, then rename over `path`.
pub fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    what: &'static str,
    value: &T,
) -> Result<(), EngineError> {
    commit_all(vec![stage_json(path, what, value)?])
}
