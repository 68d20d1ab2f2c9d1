//! Developer utility to fake a round of voting results for local simulation.

use std::path::PathBuf;

use al_engine::ProjectContext;
use al_engine::dataset::labels::LabelValue;
use al_engine::engine::accumulate::VotingResult;
use al_engine::engine::persist::write_json_atomic;
use al_engine::engine::reconcile::read_query_indices;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Clone)]
struct CliOptions {
    project_root: PathBuf,
    project_id: String,
    output_dir: Option<PathBuf>,
    round: u32,
    samples: Option<Vec<usize>>,
    labels: Vec<String>,
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    let mut ctx = ProjectContext::new(&options.project_root, options.project_id.clone());
    if let Some(dir) = &options.output_dir {
        ctx = ctx.with_output_dir(dir);
    }

    let samples = match options.samples {
        Some(samples) => samples,
        None => read_query_indices(&ctx.query_samples_path(options.round))
            .map_err(|err| format!("No --samples given and no query batch to read: {err}"))?,
    };
    let labels = expand_labels(&options.labels, samples.len())?;
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|err| err.to_string())?;

    let results: Vec<VotingResult> = samples
        .iter()
        .zip(&labels)
        .map(|(&original_index, label)| {
            let value = LabelValue::from_text(label);
            let mut votes = Map::new();
            votes.insert("user1".into(), Value::String(value.canonical()));
            votes.insert("user2".into(), Value::String(value.canonical()));
            VotingResult {
                original_index,
                final_label: value,
                sample_data: None,
                votes: Some(votes),
                consensus: Some(true),
                timestamp: timestamp.clone(),
                round: options.round,
            }
        })
        .collect();

    std::fs::create_dir_all(&ctx.output_dir).map_err(|err| err.to_string())?;
    let path = ctx.voting_results_path(options.round);
    write_json_atomic(&path, "voting results", &results).map_err(|err| err.to_string())?;
    println!("wrote {} voting results to {}", results.len(), path.display());
    for result in &results {
        println!("- {} -> {}", result.original_index, result.final_label.canonical());
    }
    Ok(())
}

/// One label applies to every sample; otherwise counts must match.
fn expand_labels(labels: &[String], count: usize) -> Result<Vec<String>, String> {
    match labels.len() {
        1 => Ok(vec![labels[0].clone(); count]),
        n if n == count => Ok(labels.to_vec()),
        n => Err(format!("{n} labels given for {count} samples")),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut project_root = PathBuf::from(".");
    let mut project_id = "default".to_string();
    let mut output_dir: Option<PathBuf> = None;
    let mut round: Option<u32> = None;
    let mut samples: Option<Vec<usize>> = None;
    let mut labels: Vec<String> = Vec::new();

    let mut idx = 0usize;
    while idx < args.len() {
        let flag = args[idx].replace('_', "-");
        match flag.as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--project-root" => {
                idx += 1;
                let value =
                    args.get(idx).ok_or_else(|| "--project-root requires a value".to_string())?;
                project_root = PathBuf::from(value);
            }
            "--project-id" => {
                idx += 1;
                let value =
                    args.get(idx).ok_or_else(|| "--project-id requires a value".to_string())?;
                project_id = value.clone();
            }
            "--output-dir" => {
                idx += 1;
                let value =
                    args.get(idx).ok_or_else(|| "--output-dir requires a value".to_string())?;
                output_dir = Some(PathBuf::from(value));
            }
            "--iteration" | "--round" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| format!("{flag} requires a value"))?;
                round = Some(
                    value
                        .parse::<u32>()
                        .map_err(|_| format!("Invalid {flag} value: {value}"))?,
                );
            }
            "--samples" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--samples requires a value".to_string())?;
                let parsed = parse_list(value)
                    .iter()
                    .map(|item| {
                        item.parse::<usize>()
                            .map_err(|_| format!("Invalid sample index: {item}"))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                samples = Some(parsed);
            }
            "--labels" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--labels requires a value".to_string())?;
                labels = parse_list(value);
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }

    let round = round.ok_or_else(|| "--iteration is required".to_string())?;
    if labels.is_empty() {
        return Err("--labels is required".to_string());
    }
    Ok(CliOptions {
        project_root,
        project_id,
        output_dir,
        round,
        samples,
        labels,
    })
}

fn help_text() -> String {
    [
        "al-mock-votes",
        "",
        "Usage:",
        "  al-mock-votes --iteration <n> --labels <a,b,...> [options]",
        "",
        "Options:",
        "  --samples <i,j,...>    Original indices (default: query_samples_round_<n>.json).",
        "  --project-root <dir>   Project directory (default: .).",
        "  --project-id <id>      Project id (default: default).",
        "  --output-dir <dir>     Round outputs (default: <project-root>/outputs).",
    ]
    .join("\n")
}
