//! snapwatchd - live pattern detection daemon
//!
//! This daemon:
//! 1. Loads a detection model from the model directory
//! 2. Opens the configured frame source
//! 3. Runs the detection loop, logging the detection count as it changes
//! 4. Saves throttled snapshots while objects are present
//! 5. Stops cleanly on Ctrl-C

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::time::Duration;

use snapwatch::{Controller, LogPresenter, ModelCatalog, Presenter, SnapwatchConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Model file to load from the model directory.
    #[arg(long)]
    model: Option<String>,
    /// Frame source url (stub://NAME, dir://PATH, /dev/videoN).
    #[arg(long, env = "SNAPWATCH_SOURCE")]
    source: Option<String>,
    /// Directory holding model descriptors.
    #[arg(long)]
    model_dir: Option<PathBuf>,
    /// Directory receiving snapshots.
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,
    /// Seconds between snapshots while an object stays in view.
    #[arg(long)]
    interval_secs: Option<u64>,
    /// List available models and exit.
    #[arg(long)]
    list_models: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = SnapwatchConfig::load()?;
    if let Some(source) = args.source {
        cfg.source.url = source;
    }
    if let Some(dir) = args.model_dir {
        cfg.model_dir = dir;
    }
    if let Some(dir) = args.snapshot_dir {
        cfg.snapshots.dir = dir;
    }
    if let Some(secs) = args.interval_secs {
        if secs == 0 {
            return Err(anyhow!("--interval-secs must be >= 1"));
        }
        cfg.snapshots.interval = Duration::from_secs(secs);
    }

    if args.list_models {
        let catalog = ModelCatalog::new(&cfg.model_dir);
        for name in catalog.list()? {
            println!("{}", name);
        }
        return Ok(());
    }

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("install Ctrl-C handler")?;

    let mut controller = Controller::from_config(&cfg);
    let model = args.model.unwrap_or_default();
    let updates = controller.start_with_channel(&model)?;
    log::info!(
        "snapwatchd running. source={} snapshots={}",
        cfg.source.url,
        cfg.snapshots.dir.display()
    );

    let mut display = LogPresenter::new();
    loop {
        match stop_rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }
        match updates.recv_timeout(Duration::from_millis(200)) {
            Ok(update) => display.on_update(update),
            Err(RecvTimeoutError::Timeout) if controller.is_running() => {}
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                log::error!("detection worker exited unexpectedly");
                break;
            }
        }
    }

    if let Some(stats) = controller.stop() {
        println!("snapwatchd summary:");
        println!("  frames processed: {}", stats.frames_processed);
        println!("  read failures: {}", stats.read_failures);
        println!("  snapshots attempted: {}", stats.captures_attempted);
        println!("  snapshot failures: {}", stats.persistence_failures);
    }
    Ok(())
}
