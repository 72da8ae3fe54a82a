//! Failover status reconciler

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use failover::app;
use failover::Config;
use failover_common::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    if config.print_instance {
        println!("{}", app::sample_instance(&config.instance_kind())?);
        return Ok(());
    }

    init_telemetry(config.telemetry())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let cancel = CancellationToken::new();
    app::shutdown_on_signal(cancel.clone())?;

    let result = app::run(config, cancel).await;
    if let Err(e) = &result {
        error!(error = %e, "reconciler exited with error");
    } else {
        info!("reconciler stopped");
    }
    result
}
