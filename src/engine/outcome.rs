//! Structured result of one invocation.

use std::path::PathBuf;

use serde::Serialize;

use super::persist::RoundOutputs;
use crate::error::EngineError;

/// Summary of a successful round.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoundReport {
    pub outputs: RoundOutputs,
    pub accumulated_samples: usize,
    pub labeled_samples: usize,
    /// Number of original indices excluded from the pool.
    pub excluded_indices: usize,
    pub eligible_pool_size: usize,
    pub queried_indices: Vec<usize>,
    /// The eligible pool was empty when querying; nothing left to ask.
    pub pool_exhausted: bool,
    pub training_path: String,
    /// Artifact the round warm-started from, if any.
    pub model_in: Option<PathBuf>,
}

/// What the caller always receives, success or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationOutcome {
    pub success: bool,
    pub round: u32,
    pub project_id: String,
    pub outputs: RoundOutputs,
    pub accumulated_samples: usize,
    pub labeled_samples: usize,
    pub excluded_indices: usize,
    pub eligible_pool_size: usize,
    pub queried_indices: Vec<usize>,
    pub pool_exhausted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub training_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_in: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_error: Option<bool>,
}

impl IterationOutcome {
    pub fn succeeded(round: u32, project_id: &str, report: RoundReport) -> Self {
        Self {
            success: true,
            round,
            project_id: project_id.to_string(),
            outputs: report.outputs,
            accumulated_samples: report.accumulated_samples,
            labeled_samples: report.labeled_samples,
            excluded_indices: report.excluded_indices,
            eligible_pool_size: report.eligible_pool_size,
            queried_indices: report.queried_indices,
            pool_exhausted: report.pool_exhausted,
            training_path: Some(report.training_path),
            model_in: report.model_in,
            error: None,
            error_kind: None,
            caller_error: None,
        }
    }

    pub fn failed(round: u32, project_id: &str, err: &EngineError) -> Self {
        Self {
            success: false,
            round,
            project_id: project_id.to_string(),
            outputs: RoundOutputs::default(),
            accumulated_samples: 0,
            labeled_samples: 0,
            excluded_indices: 0,
            eligible_pool_size: 0,
            queried_indices: Vec::new(),
            pool_exhausted: false,
            training_path: None,
            model_in: None,
            error: Some(err.user_message()),
            error_kind: Some(err.kind()),
            caller_error: Some(err.is_caller_error()),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|err| {
            format!(r#"{{"success": false, "error": "failed to serialize result: {err}"}}"#)
        })
    }
}
