//! Syncprep - local change preparation
//!
//! `syncprep watch` prints the actions prepared from live filesystem changes;
//! `syncprep replay` runs recorded event batches through the same
//! reconciliation cycles. Actions are printed as JSON lines on stdout, logs
//! go to stderr.

use std::{
    fs::File,
    io::{BufRead, BufReader, Write, stderr, stdout},
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use {
    anyhow::{Error, bail},
    async_channel::unbounded,
    clap::{Parser, Subcommand},
    parking_lot::RwLock,
    serde_json::{error::Category, from_str, to_string},
    tokio::{signal::ctrl_c, spawn},
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, prelude::*},
};

use syncprep::{
    config::{SettingsManager, UserSettings},
    error::{ErrorReporter, ResultExt, domain::Result},
    local::LocalChangePipeline,
    reconcile::{Action, RawEvent, Reconciler},
};

/// Prepare local filesystem changes for a sync client
#[derive(Parser, Debug)]
#[command(name = "syncprep")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Settings file to use instead of the XDG config location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// The command to run
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch directories and print prepared actions until interrupted
    Watch {
        /// Directories to watch in addition to the configured ones
        dirs: Vec<PathBuf>,
    },

    /// Reconcile recorded event batches and print the resulting actions
    ///
    /// The file holds one JSON array of raw events per line; every line is
    /// one reconciliation cycle.
    Replay {
        /// Recorded batches
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", ErrorReporter::to_user_message(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let manager = match cli.config {
        Some(path) => SettingsManager::with_config_path(path),
        None => SettingsManager::new(),
    }
    .add_context("Failed to load settings")?;
    let settings = manager.get_settings().clone();

    init_logging(&settings.log_filter)?;

    match cli.command {
        Commands::Watch { dirs } => watch(settings, dirs).await,
        Commands::Replay { file } => replay(&file),
    }
}

/// Installs the log subscriber, writing to stderr.
///
/// `RUST_LOG` wins over the filter from the settings.
fn init_logging(default_filter: &str) -> Result<()> {
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .add_contextf(format!("Invalid log filter {default_filter:?}"))?;
    let fmt_layer = fmt::layer()
        .with_writer(stderr)
        .with_target(true)
        .with_level(true)
        .compact();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()
        .add_context("Failed to install log subscriber")?;

    Ok(())
}

async fn watch(mut settings: UserSettings, dirs: Vec<PathBuf>) -> Result<()> {
    settings.watch_directories.extend(dirs);
    if settings.watch_directories.is_empty() {
        bail!("Nothing to watch: pass directories or set watch_directories in the settings");
    }

    let (action_sender, action_receiver) = unbounded();
    let pipeline = LocalChangePipeline::new(Arc::new(RwLock::new(settings)), action_sender, None)
        .add_context("Failed to start the local change pipeline")?;

    let printer = spawn(async move {
        while let Ok(actions) = action_receiver.recv().await {
            if let Err(e) = print_actions(&mut stdout().lock(), &actions) {
                ErrorReporter::error(&e, "Failed to print actions");
                break;
            }
        }
    });

    ctrl_c()
        .await
        .add_context("Failed to listen for interrupt")?;
    info!("Interrupted, draining observed changes");

    pipeline.shutdown().await;
    if let Err(e) = printer.await {
        warn!("Printer task failed: {}", e);
    }
    Ok(())
}

fn replay(path: &Path) -> Result<()> {
    let file = File::open(path).add_contextf(format!("Failed to open {}", path.display()))?;
    replay_batches(BufReader::new(file), &mut stdout().lock())
}

/// Reconciles one batch per line of `reader`, writing actions to `out`.
///
/// A line that is not JSON stops the replay. A batch whose events do not
/// fit the event format, or that fails reconciliation, is reported and
/// skipped.
fn replay_batches<R: BufRead, W: Write>(reader: R, out: &mut W) -> Result<()> {
    let mut reconciler = Reconciler::new();

    for (index, line) in reader.lines().enumerate() {
        let number = index + 1;
        let line = line.add_contextf(format!("Failed to read line {number}"))?;
        if line.trim().is_empty() {
            continue;
        }

        let batch: Vec<RawEvent> = match from_str(&line) {
            Ok(batch) => batch,
            Err(e) if e.classify() == Category::Data => {
                ErrorReporter::error(&Error::from(e), &format!("Batch on line {number} aborted"));
                continue;
            }
            Err(e) => {
                let context = format!("Invalid event batch on line {number}");
                return Err(Error::from(e).context(context));
            }
        };
        match reconciler.process(batch) {
            Ok(actions) => print_actions(out, &actions)?,
            Err(e) => {
                ErrorReporter::error(&Error::from(e), &format!("Batch on line {number} aborted"))
            }
        }
    }

    let pending = reconciler.pending().len();
    if pending > 0 {
        warn!("{} action(s) still waiting for completion", pending);
    }
    Ok(())
}

fn print_actions<W: Write>(out: &mut W, actions: &[Action]) -> Result<()> {
    for action in actions {
        writeln!(out, "{}", to_string(action)?)?;
    }
    out.flush()?;
    Ok(())
}
