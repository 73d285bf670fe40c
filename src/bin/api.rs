use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use gamenight::config::AppConfig;
use gamenight::state::AppState;
use gamenight::{api, bus, chat, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    tracing::info!("Starting gamenight API service");

    let db = db::create_pool(&config.database.url, config.database.max_connections).await?;
    tracing::info!("Database connected");

    let redis_client = redis::Client::open(config.redis.url.as_str())?;
    let redis = redis::aio::ConnectionManager::new(redis_client).await?;
    tracing::info!("Redis connected");

    let broker = bus::connect(&config.broker.url).await?;
    let publisher = Arc::new(bus::Publisher::new(&broker).await?);
    tracing::info!("Broker connected");

    let chat = chat::Client::new(&config.chat, redis.clone());

    let state = AppState {
        db,
        redis,
        config: Arc::new(config.clone()),
        chat,
        publisher,
    };

    let app = api::router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    tracing::info!("Shutting down...");
}
