use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ferrite_seg::setup;
use ferrite_seg::sink::{FanoutSink, JsonlSink, TracingSink};
use ferrite_seg::{Config, RunDir, RunSummary, TrainError, TrainingOrchestrator};

/// Train a pixel segmentation model with periodic validation and
/// best-model checkpointing.
#[derive(Parser, Debug)]
#[command(name = "ferrite-seg", version, about)]
struct Cli {
    /// Configuration file to use
    #[arg(long, default_value = "configs/pixel_softmax_synthetic.toml")]
    config: PathBuf,

    /// Directory under which run directories are created
    #[arg(long, default_value = "runs")]
    runs_root: PathBuf,

    /// Checkpoint to resume from (overrides `training.resume`)
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors to stderr
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let run_dir = match RunDir::create(&cli.runs_root, &cli.config) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!(
                "error: cannot create run directory for {}: {e}",
                cli.config.display()
            );
            return ExitCode::FAILURE;
        }
    };

    let _guard = init_tracing(cli.verbose, cli.quiet, &run_dir);
    info!("RUNDIR: {}", run_dir.path().display());
    info!("Let the games begin");

    match train(&cli, &run_dir) {
        Ok(summary) => {
            info!(
                final_iteration = summary.final_iteration,
                steps_taken = summary.steps_taken,
                best_score = summary.best_score,
                checkpoints = summary.checkpoints_written,
                "done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            match e.downcast_ref::<TrainError>() {
                Some(fatal) => error!(phase = %fatal.phase(), "{e:#}"),
                None => error!("{e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn train(cli: &Cli, run_dir: &RunDir) -> anyhow::Result<RunSummary> {
    let mut config = Config::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    if let Some(resume) = &cli.resume {
        config.training.resume = Some(resume.clone());
    }

    let jsonl = JsonlSink::create(run_dir.metrics_path())
        .with_context(|| format!("opening {}", run_dir.metrics_path().display()))?;
    let sink = FanoutSink::new()
        .with(Box::new(TracingSink))
        .with(Box::new(jsonl));

    let parts = setup::collaborators(&config, Box::new(sink));
    let mut orchestrator = TrainingOrchestrator::new(&config, run_dir.path(), parts)?;
    Ok(orchestrator.run()?)
}

/// Human-readable stderr plus a JSON log file in the run directory.
fn init_tracing(verbose: u8, quiet: bool, run_dir: &RunDir) -> WorkerGuard {
    let filter = match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let file_appender = tracing_appender::rolling::never(run_dir.path(), run_dir.log_file_name());
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();
    guard
}
