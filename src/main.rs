use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use max6675_monitor::board::Board;
use max6675_monitor::calibrate::{self, DEFAULT_SAMPLES, DEFAULT_SAMPLE_DELAY};
use max6675_monitor::Config;

/// Polls MAX6675 thermocouple converters and logs their temperatures.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Read every sensor once and exit
    #[arg(long)]
    once: bool,

    /// Calibrate all sensors against this reference temperature (°C) and print the offsets
    #[arg(long, value_name = "CELSIUS", conflicts_with = "once")]
    calibrate: Option<f64>,

    /// Log raw sensor words and other debug output
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.verbose);

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;
    let board = Board::new(config).context("Failed to initialise hardware")?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            info!("Interrupted, stopping after the current cycle");
            running.store(false, Ordering::SeqCst);
        })
        .context("Failed to set Ctrl+C handler")?;
    }

    let mut poller = board.poller().context("Failed to set up sensors")?;

    if let Some(reference) = args.calibrate {
        info!("Calibrating sensors to temperature {reference} °C");
        let offsets = calibrate::calibrate(
            poller.sensors_mut(),
            reference,
            DEFAULT_SAMPLES,
            DEFAULT_SAMPLE_DELAY,
            &running,
        );
        println!("{}", calibrate::offsets_line(&offsets));
    } else if args.once {
        poller.poll_once().context("Failed to read sensors")?;
    } else {
        poller.run(&running).context("Failed to read sensors")?;
    }

    // Dropping the poller releases every chip select and GPIO pin.
    drop(poller);
    info!("Exiting");
    Ok(())
}
