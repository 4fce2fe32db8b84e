use clap::Parser;
use powerfly_agent::{runner, AgentConfig};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Flies the power-measurement pattern on one vehicle and signals the power device.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Agent instance. 0 attaches to the serial vehicle, N to SITL instance N.
    #[arg(short = 'I', long, default_value_t = 0)]
    instance: u8,

    /// TOML configuration file. Built-in defaults are used without one.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `info,telemetry=debug`. Overrides RUST_LOG.
    #[arg(long)]
    log_level: Option<String>,
}

fn setup_logging(log_level: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let filter = match log_level {
        Some(directives) => EnvFilter::try_new(directives)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_logging(args.log_level.as_deref())?;

    let config = match &args.config {
        Some(path) => AgentConfig::load(path)?,
        None => AgentConfig::default(),
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupted, shutting down"),
            Err(err) => {
                warn!("cannot listen for ctrl-c: {err}");
                return;
            }
        }
        on_signal.cancel();
    });

    runner::run(config, args.instance, cancel).await?;
    Ok(())
}
