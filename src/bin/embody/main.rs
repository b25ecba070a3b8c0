//! embody - control loop with simulated adapters and a terminal dashboard
//!
//! Run with: cargo run -- --help

mod app;
mod sim;
mod ui;

use std::{fs::File, io::IsTerminal, path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use color_eyre::eyre::{Result as EyreResult, WrapErr};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use app::Embody;
use embody::EngineConfig;

#[derive(Debug, Parser)]
#[command(name = "embody", version, about = "Multimodal expression control loop")]
struct Args {
    /// Control loop rate in Hz
    #[arg(long, default_value_t = 60.0)]
    rate: f64,

    /// Voice pool size (1-15)
    #[arg(long, default_value_t = embody::MAX_VOICES)]
    voices: usize,

    /// Observation staleness window in milliseconds
    #[arg(long, default_value_t = 250)]
    staleness_ms: u64,

    /// Run without the dashboard and print the final diagnostics
    #[arg(long)]
    headless: bool,

    /// Headless run length in seconds
    #[arg(long, default_value_t = 10.0)]
    duration: f64,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> EyreResult<()> {
    color_eyre::install()?;
    let args = Args::parse();
    init_tracing(&args)?;

    let config = EngineConfig::default()
        .with_tick_rate(args.rate)
        .with_max_voices(args.voices)
        .with_staleness(Duration::from_millis(args.staleness_ms));

    let app = Embody::new(config).wrap_err("invalid engine configuration")?;
    if args.headless {
        app.run_headless(Duration::from_secs_f64(args.duration.max(0.0)))
    } else {
        app.run_dashboard()
    }
}

/// Logs go to stderr in headless mode; the dashboard owns the terminal, so
/// there they are dropped unless a log file is given.
fn init_tracing(args: &Args) -> EyreResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match &args.log_file {
        Some(path) => {
            let file = File::create(path)
                .wrap_err_with(|| format!("failed to create log file {}", path.display()))?;
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(Arc::new(file));
            Registry::default().with(filter).with(fmt_layer).init();
        }
        None if args.headless => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(std::io::stderr().is_terminal())
                .with_writer(std::io::stderr);
            Registry::default().with(filter).with(fmt_layer).init();
        }
        None => {}
    }
    Ok(())
}
