use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use imagedupe::{find_similar, init, AppError, Config, MatchRecord, Result, SearchOutcome};

/// Find images visually similar to a reference image
#[derive(Parser, Debug)]
#[command(name = "imagedupe")]
#[command(version)]
struct Args {
    /// The reference image
    reference: PathBuf,

    /// Directory to search (recursively)
    target: PathBuf,

    /// Keep candidates scoring strictly above this value
    #[arg(short, long)]
    threshold: Option<f32>,

    /// Side length of the model input
    #[arg(long)]
    image_size: Option<u32>,

    /// Model file name inside the models directory
    #[arg(long)]
    model: Option<String>,

    /// Directory holding model artifacts
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Where to download the model from when it is missing
    #[arg(long)]
    model_url: Option<String>,

    /// Preprocessing workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the outcome as JSON
    #[arg(long)]
    json: bool,

    /// Never download the model
    #[arg(long)]
    no_download: bool,
}

impl Args {
    fn into_config(self) -> Result<(Config, PathBuf, PathBuf, bool)> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };
        // A missing .env file is fine
        let _ = dotenv::dotenv();
        config.apply_env()?;

        if let Some(threshold) = self.threshold {
            config.similarity.threshold = threshold;
        }
        if let Some(size) = self.image_size {
            config.preprocess.image_size = size;
        }
        if let Some(model) = self.model {
            config.model.visual_model_file = model;
        }
        if let Some(dir) = self.models_dir {
            config.model.models_dir = dir;
        }
        if let Some(url) = self.model_url {
            config.model.visual_model_url = Some(url);
        }
        if let Some(workers) = self.workers {
            config.scan.workers = workers;
        }
        if self.no_download {
            config.model.visual_model_url = None;
        }
        config.validate()?;

        Ok((config, self.reference, self.target, self.json))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let json = args.json;

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            if json {
                match serde_json::to_string_pretty(&e.to_json()) {
                    Ok(body) => println!("{}", body),
                    Err(_) => eprintln!("error: {}", e),
                }
            } else {
                eprintln!("error: {}", e);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    init()?;

    let (config, reference, target, json) = args.into_config()?;
    if !reference.is_file() {
        return Err(AppError::NotFound(format!(
            "reference image not found: {}",
            reference.display()
        )));
    }

    log::info!("Reference image: {}", reference.display());
    log::info!("Target directory: {}", target.display());

    let outcome = find_similar(&reference, &target, &config).await?;

    if json {
        println!("{}", outcome.to_json()?);
    } else {
        render(&outcome);
    }
    Ok(())
}

fn render(outcome: &SearchOutcome) {
    match outcome {
        SearchOutcome::NoCandidates { root } => {
            println!("There is no image in the target directory: {}", root.display());
        }
        SearchOutcome::NoMatches { described, threshold, .. } => {
            println!(
                "No images above similarity threshold {:.2} ({} compared)",
                threshold, described
            );
        }
        SearchOutcome::Matches { matches, .. } => print_table(matches),
    }

    let skipped = outcome.skipped();
    if !skipped.is_empty() {
        println!();
        println!("Skipped {} image(s):", skipped.len());
        for s in skipped {
            println!("  {}: {}", s.path.display(), s.reason);
        }
    }
}

fn print_table(matches: &[MatchRecord]) {
    let rows: Vec<(String, String, String)> = matches
        .iter()
        .map(|m| (m.source_name(), m.target_name(), format!("{:.6}", m.score)))
        .collect();

    let headers = ("Source file", "Target file", "Similarity");
    let w0 = rows.iter().map(|r| r.0.len()).chain([headers.0.len()]).max().unwrap_or(0);
    let w1 = rows.iter().map(|r| r.1.len()).chain([headers.1.len()]).max().unwrap_or(0);
    let w2 = rows.iter().map(|r| r.2.len()).chain([headers.2.len()]).max().unwrap_or(0);

    println!("{:<w0$}  {:<w1$}  {:>w2$}", headers.0, headers.1, headers.2);
    println!("{}  {}  {}", "-".repeat(w0), "-".repeat(w1), "-".repeat(w2));
    for (source, target, score) in rows {
        println!("{:<w0$}  {:<w1$}  {:>w2$}", source, target, score);
    }
}
