use tracing_subscriber::EnvFilter;

use gamenight::config::AppConfig;
use gamenight::{bus, db};

/// Init container: applies migrations with the privileged role and declares
/// the bus topology, then exits. Every other service assumes both are done.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;

    let admin_url = config
        .database
        .admin_url
        .as_deref()
        .unwrap_or(&config.database.url);
    db::run_migrations(admin_url).await?;
    tracing::info!("Migrations applied");

    let broker = bus::connect(&config.broker.url).await?;
    let channel = broker.create_channel().await?;
    bus::declare_topology(&channel).await?;
    tracing::info!("Bus topology declared");

    Ok(())
}
