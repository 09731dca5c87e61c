use anyhow::{Context, Result};
use bugfixer::catalog::planted_defects;
use bugfixer::config::Config;
use bugfixer::llm::GeminiClient;
use bugfixer::logging;
use bugfixer::runner::{RunController, RunPaths};
use bugfixer::snapshot::inspect::{inspect_directory, output_path};
use bugfixer::snapshot::DEFAULT_SNAPSHOT_FILE;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "bugfixer",
    version,
    about = "Generate minimal fixes for planted bugs with a generative model"
)]
struct Cli {
    /// Optional TOML config file (environment variables still take precedence)
    #[arg(long, global = true, env = "BUGFIXER_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, global = true, default_value = logging::DEFAULT_LEVEL)]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect the project, generate a fix for every planted bug, write the report
    Run(RunArgs),
    /// Write a codebase snapshot only
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(long, default_value = ".")]
    project_root: PathBuf,
    /// Snapshot location; relative paths resolve against the project root
    #[arg(long)]
    snapshot: Option<PathBuf>,
    /// Report location; relative paths resolve against the project root
    #[arg(long)]
    report: Option<PathBuf>,
    /// Reuse an existing snapshot instead of inspecting the project
    #[arg(long)]
    skip_inspect: bool,
    /// Do not delete the snapshot after the run
    #[arg(long)]
    keep_snapshot: bool,
}

#[derive(Args, Debug)]
struct InspectArgs {
    #[arg(short, long, default_value = ".")]
    directory: PathBuf,
    #[arg(short, long, default_value = DEFAULT_SNAPSHOT_FILE)]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let result = match cli.command {
        Commands::Run(args) => run(cli.config, args).await,
        Commands::Inspect(args) => inspect(args),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(config_file: Option<PathBuf>, args: RunArgs) -> Result<bool> {
    let config = Config::load(config_file.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "configuration loaded");

    let client = GeminiClient::new(&config).context("failed to create generation client")?;

    let mut paths = RunPaths::new(&args.project_root);
    if let Some(snapshot) = &args.snapshot {
        paths.snapshot = output_path(&args.project_root, snapshot);
    }
    if let Some(report) = &args.report {
        paths.report = output_path(&args.project_root, report);
    }

    let mut controller = RunController::new(config, planted_defects(), Arc::new(client), paths)
        .skip_inspect(args.skip_inspect)
        .keep_snapshot(args.keep_snapshot);
    let summary = controller.run().await.context("bug fixer run aborted")?;

    println!("\n{}", summary.banner());
    Ok(summary.success())
}

fn inspect(args: InspectArgs) -> Result<bool> {
    let output = output_path(&args.directory, &args.output);
    let summary = inspect_directory(&args.directory, &output)
        .with_context(|| format!("failed to inspect {}", args.directory.display()))?;

    println!(
        "Wrote {} files to {} ({} skipped)",
        summary.files_added.len(),
        output.display(),
        summary.skipped.len()
    );
    Ok(true)
}
