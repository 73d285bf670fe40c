use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use gamenight::chat::{self, BotContext, MessageEditor};
use gamenight::config::AppConfig;
use gamenight::{bus, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    tracing::info!("Starting gamenight chat gateway");

    let db = db::create_pool(&config.database.url, config.database.max_connections).await?;
    let redis_client = redis::Client::open(config.redis.url.as_str())?;
    let redis = redis::aio::ConnectionManager::new(redis_client).await?;
    let broker = bus::connect(&config.broker.url).await?;
    let publisher = Arc::new(bus::Publisher::new(&broker).await?);

    let chat_client = chat::Client::new(&config.chat, redis.clone());
    let editor = MessageEditor::new(
        chat_client.clone(),
        redis.clone(),
        config.scheduler.edit_window_ms,
    );

    let ctx = BotContext {
        db,
        redis,
        config: Arc::new(config),
        chat: chat_client,
        editor,
        publisher,
    };

    // One interactive session plus one bus consumer, cooperatively; either
    // failing permanently takes the process down for the supervisor to
    // restart.
    tokio::select! {
        result = chat::session::run(ctx.clone()) => result,
        result = chat::consumer::run(ctx, &broker) => result,
    }
}
