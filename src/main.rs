use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use stepgate_lib::control::record_session;
use stepgate_lib::platform::{CoreGraphicsCapture, CoreGraphicsSimulator, EventTapSource};
use stepgate_lib::recorder::capture::CaptureProvider;
use stepgate_lib::recorder::storage::{read_actions, write_actions, write_actions_to};
use stepgate_lib::{
    ActionLog, Clock, Config, EventRecorder, ReplayOutcome, ReplayScheduler, SystemClock,
};

#[derive(Parser)]
#[command(name = "stepgate")]
#[command(about = "Record desktop input and replay it with visual checkpoints", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Similarity a checkpoint must exceed (overrides configuration)
    #[arg(long, global = true)]
    threshold: Option<f64>,

    /// Directory for screenshots and the action log (overrides configuration)
    #[arg(long, global = true)]
    screenshot_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record until Ctrl-C, save the actions, then replay them
    Record {
        /// Where to write the action log (default: <screenshot_dir>/actions.json)
        #[arg(long)]
        save: Option<PathBuf>,
        /// Stop after saving
        #[arg(long)]
        no_replay: bool,
    },
    /// Replay a saved action log
    Replay {
        /// Action log written by `record`
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(threshold) = cli.threshold {
        config.replay.threshold = threshold;
    }
    if let Some(dir) = cli.screenshot_dir {
        config.recorder.screenshot_dir = dir;
    }
    config.validate()?;

    match cli.command {
        Commands::Record { save, no_replay } => {
            let stop = Arc::new(AtomicBool::new(false));
            let handler_stop = Arc::clone(&stop);
            // First Ctrl-C ends the recording, any later one exits.
            ctrlc::set_handler(move || {
                if handler_stop.swap(true, Ordering::SeqCst) {
                    std::process::exit(130);
                }
            })
            .context("failed to install Ctrl-C handler")?;

            info!(
                countdown_s = config.recorder.countdown.as_secs_f64(),
                "recording starts shortly"
            );
            SystemClock.sleep(config.recorder.countdown);

            let capture = CoreGraphicsCapture::new()?;
            let mut source = EventTapSource::new()?;
            let recorder = EventRecorder::new(&capture, &config.recorder);
            let log = record_session(
                &mut source,
                recorder,
                &stop,
                config.recorder.stop_poll_interval,
            )?;

            let path = match save {
                Some(path) => {
                    write_actions_to(&path, &log)?;
                    path
                }
                None => write_actions(&config.recorder.screenshot_dir, &log)?,
            };
            info!(path = %path.display(), actions = log.len(), "saved action log");

            if no_replay {
                return Ok(ExitCode::SUCCESS);
            }
            replay(&config, &log, &capture)
        }
        Commands::Replay { file } => {
            let log = read_actions(&file)
                .with_context(|| format!("failed to read action log {}", file.display()))?;
            let capture = CoreGraphicsCapture::new()?;
            replay(&config, &log, &capture)
        }
    }
}

fn replay<C: CaptureProvider>(config: &Config, log: &ActionLog, capture: C) -> Result<ExitCode> {
    let simulator = CoreGraphicsSimulator::new()?;
    let mut scheduler =
        ReplayScheduler::new(capture, simulator, SystemClock, config.replay.clone());

    match scheduler.run(log)? {
        ReplayOutcome::Finished { .. } => Ok(ExitCode::SUCCESS),
        ReplayOutcome::Aborted { index, .. } => {
            error!(index, "screen never matched the recorded checkpoint");
            Ok(ExitCode::FAILURE)
        }
    }
}
