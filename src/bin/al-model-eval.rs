//! Developer utility to evaluate a model artifact against a labeled dataset.

use std::path::PathBuf;

use al_engine::dataset::LabeledSet;
use al_engine::ml::metrics::{ConfusionMatrix, accuracy, precision_recall_by_class};
use al_engine::ml::{Classifier, ModelArtifact};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Clone)]
struct CliOptions {
    model_path: PathBuf,
    data_path: PathBuf,
    labels_path: Option<PathBuf>,
    top: usize,
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    let artifact = ModelArtifact::load(&options.model_path).map_err(|err| err.to_string())?;
    let model = &artifact.estimator;
    let labels_path = options.labels_path.as_ref().unwrap_or(&options.data_path);
    let dataset = LabeledSet::load(&options.data_path, labels_path, model.feature_len())
        .map_err(|err| err.to_string())?;

    let classes = model.classes();
    let mut cm = ConfusionMatrix::new(classes.len());
    let mut unknown = 0usize;
    for sample in &dataset.samples {
        let Some(truth) = classes.iter().position(|c| *c == sample.label) else {
            unknown += 1;
            continue;
        };
        let proba = model.predict_proba(&sample.features);
        if proba.len() != classes.len() {
            continue;
        }
        cm.add(truth, al_engine::ml::argmax(&proba));
    }

    println!(
        "model: {} (round {}, {})",
        model.kind().as_str(),
        artifact.round,
        artifact.project_id
    );
    println!("accuracy: {:.4}", accuracy(&cm));
    for (idx, stats) in precision_recall_by_class(&cm).iter().enumerate() {
        println!(
            "class {:>2} {:<16}  precision={:.3}  recall={:.3}  f1={:.3}  support={}",
            idx,
            classes[idx],
            stats.precision,
            stats.recall,
            stats.f1(),
            stats.support
        );
    }
    if unknown > 0 {
        println!("skipped {unknown} rows with labels the model does not know");
    }
    println!("confusion matrix (rows=true, cols=pred):");
    for truth in 0..cm.n_classes {
        let mut row = String::new();
        for pred in 0..cm.n_classes {
            row.push_str(&format!("{:6}", cm.get(truth, pred)));
        }
        println!("{row}");
    }

    let mut confusions = Vec::new();
    for truth in 0..cm.n_classes {
        for pred in 0..cm.n_classes {
            let count = cm.get(truth, pred);
            if truth != pred && count > 0 {
                confusions.push((count, truth, pred));
            }
        }
    }
    if !confusions.is_empty() {
        println!();
        println!("Top confusions:");
        confusions.sort_by(|a, b| b.0.cmp(&a.0));
        for (count, truth, pred) in confusions.into_iter().take(options.top) {
            println!("- {} -> {}: {}", classes[truth], classes[pred], count);
        }
    }
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut model_path: Option<PathBuf> = None;
    let mut data_path: Option<PathBuf> = None;
    let mut labels_path: Option<PathBuf> = None;
    let mut top = 10usize;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--model" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--model requires a value".to_string())?;
                model_path = Some(PathBuf::from(value));
            }
            "--data" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--data requires a value".to_string())?;
                data_path = Some(PathBuf::from(value));
            }
            "--labels" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--labels requires a value".to_string())?;
                labels_path = Some(PathBuf::from(value));
            }
            "--top" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--top requires a value".to_string())?;
                top = value
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid --top value: {value}"))?;
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }

    let model_path = model_path.ok_or_else(|| "--model is required".to_string())?;
    let data_path = data_path.ok_or_else(|| "--data is required".to_string())?;
    Ok(CliOptions {
        model_path,
        data_path,
        labels_path,
        top,
    })
}

fn help_text() -> String {
    [
        "al-model-eval",
        "",
        "Usage:",
        "  al-model-eval --model <model_round_n.json> --data <labeled.csv> [options]",
        "",
        "Options:",
        "  --labels <path>  Separate label file (default: label column of --data).",
        "  --top <n>        Top N confusions (default: 10).",
    ]
    .join("\n")
}
