use std::time::Duration;

use tracing_subscriber::EnvFilter;

use gamenight::config::AppConfig;
use gamenight::{bus, sched};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    tracing::info!("Starting gamenight DLQ retry daemon");

    let broker = bus::connect(&config.broker.url).await?;

    let shutdown = sched::shutdown_channel();
    sched::retry::run(
        &broker,
        Duration::from_secs(config.broker.retry_interval_secs),
        shutdown,
    )
    .await
}
