//! Accounting engine server binary

use accounting_core::{Accounting, Config};
use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());
    if std::env::var("ACCOUNTING_LOG_JSON").is_ok() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!("Starting accounting server");

    // Load configuration
    let config = match std::env::var("ACCOUNTING_CONFIG") {
        Ok(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        Err(_) => Config::from_env().context("Failed to load config from environment")?,
    };

    let accounting = Accounting::open(config)
        .await
        .context("Failed to open accounting engine")?;
    tracing::info!(
        workers = accounting.config().pipeline.workers,
        "Accounting engine ready"
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down accounting server");
    accounting.shutdown().await?;
    Ok(())
}
