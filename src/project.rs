//! Explicit project location and output file naming.

use std::path::{Path, PathBuf};

/// Where a project lives and where its round artifacts go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectContext {
    pub root: PathBuf,
    pub project_id: String,
    pub output_dir: PathBuf,
}

impl ProjectContext {
    /// Project rooted at `root` with outputs under `<root>/outputs`.
    pub fn new(root: impl Into<PathBuf>, project_id: impl Into<String>) -> Self {
        let root = root.into();
        let output_dir = root.join("outputs");
        Self {
            root,
            project_id: project_id.into(),
            output_dir,
        }
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn query_samples_path(&self, round: u32) -> PathBuf {
        self.output_dir.join(format!("query_samples_round_{round}.json"))
    }

    pub fn performance_path(&self, round: u32) -> PathBuf {
        self.output_dir.join(format!("performance_round_{round}.json"))
    }

    pub fn model_path(&self, round: u32) -> PathBuf {
        self.output_dir.join(format!("model_round_{round}.json"))
    }

    pub fn voting_results_path(&self, round: u32) -> PathBuf {
        self.output_dir.join(voting_results_file_name(round))
    }

    pub fn voting_contract_path(&self, round: u32) -> PathBuf {
        self.output_dir.join(format!("voting_contract_round_{round}.json"))
    }

    /// Resolve a possibly relative input path against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

pub fn voting_results_file_name(round: u32) -> String {
    format!("voting_results_round_{round}.json")
}
