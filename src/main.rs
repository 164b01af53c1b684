use std::path::PathBuf;

use clap::Parser;

use lb_router::config::{apply_env_overrides, load_config, ProxyConfig};
use lb_router::lifecycle::{signals, LifecycleController};
use lb_router::observability::logging;

/// HTTP load-balancing router.
#[derive(Debug, Parser)]
#[command(name = "lb-router", version)]
struct Args {
    /// TOML configuration file. Defaults are used when omitted.
    #[arg(short, long, env = "LB_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    apply_env_overrides(&mut config)?;

    logging::init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        "lb-router starting"
    );

    let controller = LifecycleController::start(config, None).await?;
    signals::install(controller.shutdown_handle());

    let report = controller.run().await?;
    println!(
        "shutdown: cancelled={} telemetry accepted={} dropped={} flushed={} buffered={}",
        report.cancelled_requests,
        report.telemetry.accepted,
        report.telemetry.dropped,
        report.telemetry.flushed,
        report.telemetry.buffered,
    );
    Ok(())
}
