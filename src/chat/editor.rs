use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;

use crate::chat::Client;
use crate::error::ApiError;

/// Per-message edit throttle. The first edit in a window goes straight out;
/// later ones are coalesced: each replaces the pending payload, and a single
/// flush runs when the window closes. The window key lives in redis so every
/// writer observes the same cooldown.
#[derive(Clone)]
pub struct MessageEditor {
    client: Client,
    redis: redis::aio::ConnectionManager,
    window_ms: u64,
    pending: Arc<DashMap<i64, PendingEdit>>,
}

#[derive(Clone)]
struct PendingEdit {
    channel_id: i64,
    payload: Value,
}

impl MessageEditor {
    pub fn new(client: Client, redis: redis::aio::ConnectionManager, window_ms: u64) -> Self {
        Self {
            client,
            redis,
            window_ms,
            pending: Arc::new(DashMap::new()),
        }
    }

    pub async fn submit(
        &self,
        channel_id: i64,
        message_id: i64,
        payload: Value,
    ) -> Result<(), ApiError> {
        if self.acquire_window(message_id).await {
            return self.edit(channel_id, message_id, payload).await;
        }

        let first_in_window = self
            .pending
            .insert(
                message_id,
                PendingEdit {
                    channel_id,
                    payload,
                },
            )
            .is_none();

        if first_in_window {
            let editor = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(editor.window_ms)).await;
                editor.flush(message_id).await;
            });
        }
        Ok(())
    }

    async fn flush(&self, message_id: i64) {
        let Some((_, edit)) = self.pending.remove(&message_id) else {
            return;
        };
        // Claim the next window so a concurrent submit queues instead of
        // racing this flush.
        let _ = self.acquire_window(message_id).await;
        if let Err(e) = self.edit(edit.channel_id, message_id, edit.payload).await {
            tracing::warn!(message_id, error = %e, "Coalesced edit failed");
        }
    }

    async fn edit(&self, channel_id: i64, message_id: i64, payload: Value) -> Result<(), ApiError> {
        let edited = self.client.edit_message(channel_id, message_id, &payload).await?;
        if !edited {
            tracing::info!(message_id, "Message gone, skipping edit");
        }
        Ok(())
    }

    /// True when this caller owns a fresh window. Redis being down degrades to
    /// unthrottled edits, never to lost ones.
    async fn acquire_window(&self, message_id: i64) -> bool {
        let mut redis = self.redis.clone();
        let result: Result<Option<String>, _> = redis::cmd("SET")
            .arg(format!("edit_window:{message_id}"))
            .arg("1")
            .arg("NX")
            .arg("PX")
            .arg(self.window_ms)
            .query_async(&mut redis)
            .await;
        match result {
            Ok(reply) => reply.is_some(),
            Err(_) => true,
        }
    }
}
