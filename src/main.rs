//! Command-line entry point: run one active learning round.
//!
//! Prints the structured result as JSON on stdout. Exit status is 0 on
//! success, 1 when the round fails and 2 for invalid arguments.

use std::path::PathBuf;

use al_engine::{IterationRequest, ProjectContext, logging, run_iteration};

fn main() {
    let options = match parse_args(std::env::args().skip(1).collect()) {
        Ok(Command::Run(options)) => options,
        Ok(Command::Help) => {
            println!("{}", help_text());
            return;
        }
        Err(err) => {
            eprintln!("{err}\n\n{}", help_text());
            std::process::exit(2);
        }
    };

    let mut ctx = ProjectContext::new(options.project_root, options.project_id);
    if let Some(output_dir) = options.output_dir {
        ctx = ctx.with_output_dir(output_dir);
    }
    if let Err(err) = logging::init(&ctx, options.request.round) {
        eprintln!("Logging to file disabled: {err}");
    }

    let outcome = run_iteration(&ctx, &options.request);
    println!("{}", outcome.to_json());
    if !outcome.success {
        std::process::exit(1);
    }
}

#[derive(Debug)]
enum Command {
    Help,
    Run(CliOptions),
}

#[derive(Debug)]
struct CliOptions {
    project_root: PathBuf,
    project_id: String,
    output_dir: Option<PathBuf>,
    request: IterationRequest,
}

fn parse_args(args: Vec<String>) -> Result<Command, String> {
    let mut labeled_data: Option<PathBuf> = None;
    let mut labeled_labels: Option<PathBuf> = None;
    let mut unlabeled_data: Option<PathBuf> = None;
    let mut model_in: Option<PathBuf> = None;
    let mut config: Option<PathBuf> = None;
    let mut round: Option<u32> = None;
    let mut project_id: Option<String> = None;
    let mut project_root = PathBuf::from(".");
    let mut output_dir: Option<PathBuf> = None;
    let mut final_training = false;

    let mut idx = 0usize;
    while idx < args.len() {
        let flag = args[idx].replace('_', "-");
        match flag.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "--final-training" => final_training = true,
            "--labeled-data" | "--labeled-labels" | "--unlabeled-data" | "--model-in"
            | "--config" | "--iteration" | "--round" | "--project-id" | "--project-root"
            | "--output-dir" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| format!("{flag} requires a value"))?;
                match flag.as_str() {
                    "--labeled-data" => labeled_data = Some(PathBuf::from(value)),
                    "--labeled-labels" => labeled_labels = Some(PathBuf::from(value)),
                    "--unlabeled-data" => unlabeled_data = Some(PathBuf::from(value)),
                    "--model-in" => model_in = Some(PathBuf::from(value)),
                    "--config" => config = Some(PathBuf::from(value)),
                    "--project-id" => project_id = Some(value.clone()),
                    "--project-root" => project_root = PathBuf::from(value),
                    "--output-dir" => output_dir = Some(PathBuf::from(value)),
                    _ => {
                        let parsed = value
                            .parse::<u32>()
                            .ok()
                            .filter(|round| *round > 0)
                            .ok_or_else(|| format!("Invalid {flag} value: {value}"))?;
                        round = Some(parsed);
                    }
                }
            }
            unknown => return Err(format!("Unknown argument: {unknown}")),
        }
        idx += 1;
    }

    let labeled_data = labeled_data.ok_or_else(|| "--labeled-data is required".to_string())?;
    let unlabeled_data =
        unlabeled_data.ok_or_else(|| "--unlabeled-data is required".to_string())?;
    let config = config.ok_or_else(|| "--config is required".to_string())?;
    let round = round.ok_or_else(|| "--iteration is required".to_string())?;
    let project_id = project_id.ok_or_else(|| "--project-id is required".to_string())?;

    let mut request = IterationRequest::new(labeled_data, unlabeled_data, config, round);
    if let Some(labels) = labeled_labels {
        request.labeled_labels_path = labels;
    }
    request.model_in = model_in;
    request.final_training = final_training;
    Ok(Command::Run(CliOptions {
        project_root,
        project_id,
        output_dir,
        request,
    }))
}

fn help_text() -> String {
    [
        "al-engine",
        "",
        "Usage:",
        "  al-engine --labeled-data <csv> --unlabeled-data <csv|npy> --config <json>",
        "            --iteration <n> --project-id <id> [options]",
        "",
        "Options:",
        "  --labeled-labels <path>  Separate label file (default: label column of --labeled-data).",
        "  --model-in <path>        Prior model artifact (default: outputs/model_round_{n-1}.json).",
        "  --project-root <dir>     Project directory (default: .).",
        "  --output-dir <dir>       Round outputs (default: <project-root>/outputs).",
        "  --final-training         Train and evaluate only; skip query selection.",
        "",
        "Underscore spellings (--labeled_data, --project_id, ...) are accepted.",
    ]
    .join("\n")
}
