use std::time::Duration;

use tracing_subscriber::EnvFilter;

use gamenight::config::AppConfig;
use gamenight::{bus, db, sched};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    tracing::info!("Starting gamenight notification daemon");

    let pool = db::create_pool(&config.database.url, config.database.max_connections).await?;
    let broker = bus::connect(&config.broker.url).await?;
    let publisher = bus::Publisher::new(&broker).await?;

    let shutdown = sched::shutdown_channel();
    sched::notifications::run(
        pool,
        publisher,
        Duration::from_secs(config.scheduler.safety_tick_secs),
        shutdown,
    )
    .await
}
