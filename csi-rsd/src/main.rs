use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use csi_rsd::backend::MemoryBackend;
use csi_rsd::config::{Cli, LogFormat};
use csi_rsd::driver::{DRIVER_NAME, DRIVER_VERSION, Driver};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);
    info!(name = DRIVER_NAME, version = DRIVER_VERSION, "starting CSI plugin");

    let backend = Arc::new(MemoryBackend::new(cli.capacity_bytes));
    let driver = Arc::new(Driver::new(cli.driver_config(), backend));

    let signal_driver = Arc::clone(&driver);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping");
            signal_driver.stop();
        }
    });

    driver
        .run()
        .await
        .with_context(|| format!("CSI driver on {} failed", driver.endpoint()))
}
