use std::sync::Arc;

use sqlx::PgPool;

use crate::bus::Publisher;
use crate::chat;
use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub redis: redis::aio::ConnectionManager,
    pub config: Arc<AppConfig>,
    pub chat: chat::Client,
    pub publisher: Arc<Publisher>,
}
