mod support;

use std::collections::BTreeSet;

use al_engine::ml::{Classifier, ModelArtifact};
use serde_json::json;
use support::project::{TestProject, read_json};

#[test]
fn round_one_queries_a_batch_and_writes_a_loadable_model() {
    let project = TestProject::iris(100);
    let outcome = project.run(1);
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.eligible_pool_size, 100);
    assert_eq!(outcome.excluded_indices, 0);
    assert!(outcome.model_in.is_none());

    let queried = project.query_indices(1);
    assert_eq!(queried.len(), 2);
    assert!(queried.iter().all(|&idx| idx < 100));
    assert_ne!(queried[0], queried[1]);
    assert_eq!(outcome.queried_indices, queried);

    let batch = read_json(&project.ctx.query_samples_path(1));
    let first = &batch[0];
    assert!(first.get("sepal_length").is_some());
    assert!(first.get("petal_width").is_some());

    let artifact = ModelArtifact::load(&project.ctx.model_path(1)).unwrap();
    assert_eq!(artifact.round, 1);
    assert_eq!(artifact.estimator.feature_len(), 4);
    assert_eq!(artifact.estimator.classes().len(), 3);

    let performance = project.performance(1);
    assert_eq!(performance["final_training"], false);
    assert_eq!(performance["degraded_split"], true);
    assert_eq!(performance["training_samples"], 10);
    assert_eq!(performance["test_samples"], 10);
    assert_eq!(performance["training_path"], "cold_start");
    assert!(project.ctx.voting_contract_path(1).is_file());
}

#[test]
fn round_two_accumulates_votes_and_excludes_queried_rows() {
    let project = TestProject::iris(100);
    assert!(project.run(1).success);
    let first_batch = project.answer_queries(1);

    let outcome = project.run(2);
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.accumulated_samples, 2);
    assert_eq!(outcome.labeled_samples, 12);
    assert_eq!(project.labeled_rows(), 12);
    assert_eq!(outcome.excluded_indices, 2);
    assert_eq!(outcome.eligible_pool_size, 98);
    assert_eq!(outcome.training_path.as_deref(), Some("warm_start"));
    assert_eq!(outcome.model_in, Some(project.ctx.model_path(1)));

    let second_batch = project.query_indices(2);
    assert_eq!(second_batch.len(), 2);
    assert!(second_batch.iter().all(|idx| !first_batch.contains(idx)));

    let backup = project
        .labeled_path
        .with_file_name("labeled_samples.backup_iter_2.csv");
    let backup_rows = std::fs::read_to_string(backup).unwrap().lines().count() - 1;
    assert_eq!(backup_rows, 10);

    let performance = project.performance(2);
    assert_eq!(performance["degraded_split"], false);
    let test = performance["test_samples"].as_u64().unwrap();
    let train = performance["training_samples"].as_u64().unwrap();
    assert_eq!(test + train, 12);
    assert!(test >= 1 && test <= 4);
}

#[test]
fn separate_label_file_accumulates_votes() {
    let project = TestProject::iris(100).with_separate_labels();
    let outcome = project.run(1);
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.labeled_samples, 10);
    project.answer_queries(1);

    let outcome = project.run(2);
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.accumulated_samples, 2);
    assert_eq!(outcome.labeled_samples, 12);
    assert_eq!(project.labeled_rows(), 12);
    let labels = std::fs::read_to_string(&project.labels_path).unwrap();
    assert_eq!(labels.lines().next(), Some("species"));
    assert_eq!(labels.lines().count() - 1, 12);
    assert!(
        project
            .labels_path
            .with_file_name("labeled_labels.backup_iter_2.csv")
            .is_file()
    );
}

#[test]
fn two_dimensional_pool_keeps_its_y_feature() {
    let project = TestProject::new(6, json!({"query_batch_size": 1}));
    let mut labeled = String::from("x,y,label\n");
    for k in 0..6 {
        let label = if k % 2 == 0 { "low" } else { "high" };
        labeled.push_str(&format!("{}.0,{}.5,{label}\n", k, k));
    }
    std::fs::write(&project.labeled_path, labeled).unwrap();
    std::fs::write(&project.unlabeled_path, "x,y\n0.1,0.2\n1.1,1.2\n2.1,2.2\n").unwrap();

    let outcome = project.run(1);
    assert!(outcome.success, "{:?}", outcome.error);
    let artifact = ModelArtifact::load(&project.ctx.model_path(1)).unwrap();
    assert_eq!(artifact.feature_names, vec!["x", "y"]);
    let batch = read_json(&project.ctx.query_samples_path(1));
    assert!(batch[0].get("y").is_some());
}

#[test]
fn out_of_range_vote_is_skipped_without_aborting() {
    let project = TestProject::iris(100);
    assert!(project.run(1).success);
    project.write_votes(1, &[(9999, "setosa")]);

    let outcome = project.run(2);
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.accumulated_samples, 0);
    assert_eq!(project.labeled_rows(), 10);
    assert!(project.ctx.query_samples_path(2).is_file());
}

#[test]
fn final_training_writes_metrics_and_model_but_no_queries() {
    let project = TestProject::iris(100);
    let mut request = project.request(1);
    request.final_training = true;
    let outcome = al_engine::run_iteration(&project.ctx, &request);

    assert!(outcome.success, "{:?}", outcome.error);
    assert!(outcome.outputs.query_samples.is_none());
    assert!(project.ctx.performance_path(1).is_file());
    assert!(project.ctx.model_path(1).is_file());
    assert!(!project.ctx.query_samples_path(1).exists());
    assert!(!project.ctx.voting_contract_path(1).exists());
    assert_eq!(project.performance(1)["final_training"], true);
}

#[test]
fn rerunning_a_round_adds_no_duplicates() {
    let project = TestProject::iris(100);
    assert!(project.run(1).success);
    project.answer_queries(1);

    let first = project.run(2);
    assert_eq!(first.accumulated_samples, 2);
    let again = project.run(2);
    assert!(again.success);
    assert_eq!(again.accumulated_samples, 0);
    assert_eq!(project.labeled_rows(), 12);
}

#[test]
fn labeled_set_grows_monotonically_and_queries_never_repeat() {
    let project = TestProject::iris(100);
    let mut asked: BTreeSet<usize> = BTreeSet::new();
    let mut previous_rows = project.labeled_rows();

    for round in 1..=5u32 {
        if round > 1 {
            project.answer_queries(round - 1);
        }
        let outcome = project.run(round);
        assert!(outcome.success, "round {round}: {:?}", outcome.error);

        let rows = project.labeled_rows();
        assert!(rows >= previous_rows);
        assert_eq!(rows, 10 + 2 * (round as usize - 1));
        previous_rows = rows;

        assert_eq!(outcome.excluded_indices, asked.len());
        for idx in project.query_indices(round) {
            assert!(asked.insert(idx), "index {idx} queried twice");
        }

        let performance = project.performance(round);
        for key in ["accuracy", "precision", "recall", "f1_score"] {
            let value = performance[key].as_f64().unwrap();
            assert!((0.0..=1.0).contains(&value), "{key} = {value}");
        }
    }
    assert_eq!(asked.len(), 10);
}

#[test]
fn exhausted_pool_is_a_successful_empty_batch() {
    let project = TestProject::new(
        2,
        json!({"query_batch_size": 5, "label_space": support::project::CLASSES}),
    );
    let first = project.run(1);
    assert!(first.success);
    assert_eq!(project.query_indices(1).len(), 2);

    let second = project.run(2);
    assert!(second.success, "{:?}", second.error);
    assert!(second.pool_exhausted);
    assert_eq!(second.eligible_pool_size, 0);
    assert!(project.query_indices(2).is_empty());
    assert!(!project.ctx.voting_contract_path(2).exists());
}

#[test]
fn missing_config_fails_before_writing_outputs() {
    let project = TestProject::iris(100);
    std::fs::remove_file(&project.config_path).unwrap();

    let outcome = project.run(1);
    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some("config_error"));
    assert_eq!(outcome.caller_error, Some(true));
    assert!(!project.ctx.model_path(1).exists());
    assert!(!project.ctx.performance_path(1).exists());
}

#[test]
fn corrupt_prior_model_is_reported_as_internal() {
    let project = TestProject::iris(100);
    assert!(project.run(1).success);
    std::fs::write(project.ctx.model_path(1), b"{\"format_version\": 1").unwrap();

    let outcome = project.run(2);
    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some("artifact_corrupt"));
    assert_eq!(outcome.caller_error, Some(false));
    assert!(!project.ctx.performance_path(2).exists());
}

#[test]
fn label_outside_declared_space_is_rejected_for_bootstrap_data() {
    let project = TestProject::new(10, json!({"label_space": ["setosa", "versicolor"]}));
    let outcome = project.run(1);
    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some("label_error"));
}

#[test]
fn refit_on_warm_start_is_reported() {
    let project = TestProject::new(
        30,
        json!({
            "model_type": "linear",
            "training_args": {"max_iter": 30},
            "query_batch_size": 2,
            "refit_on_warm_start": true,
            "query_strategy": "entropy",
        }),
    );
    assert!(project.run(1).success);
    project.answer_queries(1);
    let outcome = project.run(2);
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.training_path.as_deref(), Some("warm_start_refit"));
    assert_eq!(project.performance(2)["model_type"], "linear");
}
