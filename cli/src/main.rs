//! The `segex` binary: runs extractions, checks the Python sandbox, and
//! validates JSON files against a schema.

use anyhow::Context;
use clap::{Parser, Subcommand};
use segex_cli::setup::{build_orchestrator, load_validator};
use segex_cli::{AppConfig, Overrides};
use segex_extract::extraction::Source;
use segex_extract::worker::{ExtractionEvent, spawn_worker};
use segex_python::PythonSandbox;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract records from the given files
    Run {
        /// Input documents
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Configuration file (TOML)
        #[arg(long, env = "SEGEX_CONFIG")]
        config: Option<PathBuf>,
        /// JSON Schema file, overriding `schema.path`
        #[arg(long)]
        schema: Option<PathBuf>,
        /// Output directory, overriding `output.folder`
        #[arg(long)]
        output: Option<PathBuf>,
        /// Model name, overriding `model.model`
        #[arg(long)]
        model: Option<String>,
        /// Send each document as a single segment
        #[arg(long)]
        no_segmentation: bool,
    },
    /// Locate the Python interpreter and check that it runs
    CheckPython {
        /// Interpreter to check instead of discovering one
        #[arg(long)]
        python: Option<PathBuf>,
    },
    /// Validate a JSON file against a schema
    Validate {
        /// JSON Schema file
        #[arg(long)]
        schema: PathBuf,
        /// JSON document to check
        file: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Commands::Run {
            files,
            config,
            schema,
            output,
            model,
            no_segmentation,
        } => {
            let mut app = AppConfig::resolve(config.as_deref()).context("Failed to load configuration")?;
            app.apply(&Overrides {
                output,
                model,
                schema,
                no_segmentation,
            });
            run(app, files).await
        }
        Commands::CheckPython { python } => check_python(python).await,
        Commands::Validate { schema, file } => validate(&schema, &file),
    }
}

async fn run(config: AppConfig, files: Vec<PathBuf>) -> anyhow::Result<ExitCode> {
    let orchestrator = build_orchestrator(&config)?;
    let sources = files.into_iter().map(Source::from).collect();
    let mut handle = spawn_worker(orchestrator, sources).context("Failed to start worker thread")?;

    let stop = handle.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!(event = "stop_requested", "finishing the current segment, then stopping");
            stop.stop();
        }
    });

    let mut failed = false;
    while let Some(event) = handle.events().recv().await {
        match event {
            ExtractionEvent::Progress { current, total } => {
                println!("[{current}/{total}]");
            }
            ExtractionEvent::Log(_) => {}
            ExtractionEvent::Error(message) => {
                eprintln!("error: {message}");
                failed = true;
            }
            ExtractionEvent::Finished(summary) => {
                failed |= summary.files_failed > 0;
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
        }
    }

    tokio::task::spawn_blocking(move || handle.join())
        .await?
        .map_err(|_| anyhow::anyhow!("Worker thread panicked"))?;

    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

async fn check_python(python: Option<PathBuf>) -> anyhow::Result<ExitCode> {
    let sandbox = PythonSandbox::discover(python)?;
    let version = sandbox.check_health().await?;
    println!("{} ({})", sandbox.path.display(), version.trim());
    Ok(ExitCode::SUCCESS)
}

fn validate(schema: &std::path::Path, file: &std::path::Path) -> anyhow::Result<ExitCode> {
    let validator = load_validator(schema)?;
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Could not read {}", file.display()))?;
    let result = validator.validate(&raw);
    if result.valid {
        println!("valid");
        return Ok(ExitCode::SUCCESS);
    }
    for issue in &result.errors {
        println!("{issue}");
    }
    Ok(ExitCode::FAILURE)
}
