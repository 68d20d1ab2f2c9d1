use std::path::{Path, PathBuf};

use al_engine::{IterationOutcome, IterationRequest, ProjectContext, run_iteration};
use serde_json::{Value, json};
use tempfile::TempDir;

pub const CLASSES: [&str; 3] = ["setosa", "versicolor", "virginica"];
const CENTERS: [[f32; 4]; 3] = [
    [5.0, 3.4, 1.5, 0.2],
    [5.9, 2.8, 4.3, 1.3],
    [6.6, 3.0, 5.5, 2.0],
];
const HEADER: &str = "sepal_length,sepal_width,petal_length,petal_width";

/// Iris-like project: 10 labeled rows, 4 features, 3 classes.
pub struct TestProject {
    _dir: TempDir,
    pub ctx: ProjectContext,
    pub labeled_path: PathBuf,
    /// Same as `labeled_path` unless labels were moved to their own file.
    pub labels_path: PathBuf,
    pub unlabeled_path: PathBuf,
    pub config_path: PathBuf,
}

impl TestProject {
    pub fn new(unlabeled_rows: usize, config: Value) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let datasets = root.join("inputs").join("datasets");
        std::fs::create_dir_all(&datasets).unwrap();

        let labeled_path = datasets.join("labeled_samples.csv");
        let mut labeled = format!("{HEADER},species\n");
        for k in 0..10 {
            let class = k % 3;
            let row = row_values(class, -0.1 - k as f32 * 0.01);
            labeled.push_str(&format!("{},{}\n", row, CLASSES[class]));
        }
        std::fs::write(&labeled_path, labeled).unwrap();

        let unlabeled_path = datasets.join("unlabeled_samples.csv");
        let mut unlabeled = format!("{HEADER}\n");
        for idx in 0..unlabeled_rows {
            unlabeled.push_str(&row_values(idx % 3, (idx / 3) as f32 * 0.01));
            unlabeled.push('\n');
        }
        std::fs::write(&unlabeled_path, unlabeled).unwrap();

        let config_path = root.join("config.json");
        std::fs::write(&config_path, serde_json::to_vec_pretty(&config).unwrap()).unwrap();

        Self {
            ctx: ProjectContext::new(&root, "iris-test"),
            _dir: dir,
            labels_path: labeled_path.clone(),
            labeled_path,
            unlabeled_path,
            config_path,
        }
    }

    pub fn iris(unlabeled_rows: usize) -> Self {
        Self::new(
            unlabeled_rows,
            json!({
                "model_type": "RandomForestClassifier",
                "training_args": {"n_estimators": 20},
                "label_space": CLASSES,
                "query_batch_size": 2,
                "max_iterations": 5,
            }),
        )
    }

    /// Move the species column of the labeled CSV into `labeled_labels.csv`.
    pub fn with_separate_labels(mut self) -> Self {
        let text = std::fs::read_to_string(&self.labeled_path).unwrap();
        let mut features = String::new();
        let mut labels = String::new();
        for line in text.lines() {
            let (row, label) = line.rsplit_once(',').unwrap();
            features.push_str(row);
            features.push('\n');
            labels.push_str(label);
            labels.push('\n');
        }
        self.labels_path = self.labeled_path.with_file_name("labeled_labels.csv");
        std::fs::write(&self.labeled_path, features).unwrap();
        std::fs::write(&self.labels_path, labels).unwrap();
        self
    }

    pub fn request(&self, round: u32) -> IterationRequest {
        let mut request = IterationRequest::new(
            &self.labeled_path,
            &self.unlabeled_path,
            &self.config_path,
            round,
        );
        request.labeled_labels_path = self.labels_path.clone();
        request
    }

    pub fn run(&self, round: u32) -> IterationOutcome {
        run_iteration(&self.ctx, &self.request(round))
    }

    /// Ground-truth label of an unlabeled row.
    pub fn true_label(idx: usize) -> &'static str {
        CLASSES[idx % 3]
    }

    /// Write `voting_results_round_{round}.json` for `(original_index, label)` pairs.
    pub fn write_votes(&self, round: u32, votes: &[(i64, &str)]) {
        let entries: Vec<Value> = votes
            .iter()
            .map(|&(idx, label)| {
                json!({
                    "original_index": idx,
                    "final_label": label,
                    "votes": {"user1": label, "user2": label},
                    "consensus": true,
                    "timestamp": "2025-01-01T00:00:00Z",
                    "round": round,
                })
            })
            .collect();
        std::fs::create_dir_all(&self.ctx.output_dir).unwrap();
        std::fs::write(
            self.ctx.voting_results_path(round),
            serde_json::to_vec_pretty(&entries).unwrap(),
        )
        .unwrap();
    }

    /// Vote the true label for every row queried in `round`.
    pub fn answer_queries(&self, round: u32) -> Vec<usize> {
        let queried = self.query_indices(round);
        let votes: Vec<(i64, &str)> = queried
            .iter()
            .map(|&idx| (idx as i64, Self::true_label(idx)))
            .collect();
        self.write_votes(round, &votes);
        queried
    }

    pub fn query_indices(&self, round: u32) -> Vec<usize> {
        read_json(&self.ctx.query_samples_path(round))
            .as_array()
            .unwrap()
            .iter()
            .map(|entry| entry["original_index"].as_u64().unwrap() as usize)
            .collect()
    }

    pub fn performance(&self, round: u32) -> Value {
        read_json(&self.ctx.performance_path(round))
    }

    /// Data rows currently in the labeled CSV.
    pub fn labeled_rows(&self) -> usize {
        let text = std::fs::read_to_string(&self.labeled_path).unwrap();
        text.lines().skip(1).filter(|line| !line.trim().is_empty()).count()
    }
}

pub fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

fn row_values(class: usize, jitter: f32) -> String {
    CENTERS[class]
        .iter()
        .enumerate()
        .map(|(col, &center)| format!("{:.2}", center + jitter * (col as f32 + 1.0)))
        .collect::<Vec<_>>()
        .join(",")
}
