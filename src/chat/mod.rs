pub mod client;
pub mod consumer;
pub mod editor;
pub mod handlers;
pub mod interactions;
pub mod render;
pub mod session;

use std::sync::Arc;

use sqlx::PgPool;

use crate::bus::Publisher;
use crate::config::AppConfig;
pub use client::Client;
pub use editor::MessageEditor;

/// Shared state of the gateway process: the chat session, the bus consumer,
/// and the interaction handlers all hang off this.
#[derive(Clone)]
pub struct BotContext {
    pub db: PgPool,
    pub redis: redis::aio::ConnectionManager,
    pub config: Arc<AppConfig>,
    pub chat: Client,
    pub editor: MessageEditor,
    pub publisher: Arc<Publisher>,
}
