use std::time::Duration;

use chrono::{DateTime, Utc};
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::{BasicProperties, Channel, Connection};

use crate::types::events::Event;

const PUBLISH_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(250);

/// Synchronous publisher on a confirm-select channel. `publish` resolves only
/// after the broker acks, so callers may treat a returned `Ok` as durable;
/// the schedule daemons delete their rows on it.
pub struct Publisher {
    channel: Channel,
}

impl Publisher {
    pub async fn new(conn: &Connection) -> Result<Self, lapin::Error> {
        let channel = conn.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        Ok(Self { channel })
    }

    pub async fn publish(&self, event: &Event) -> Result<(), anyhow::Error> {
        self.publish_with_ttl(event, None).await
    }

    /// Publish with an optional per-message TTL. Stale notifications expire
    /// in the broker instead of reaching the chat platform.
    pub async fn publish_with_ttl(
        &self,
        event: &Event,
        ttl_ms: Option<u64>,
    ) -> Result<(), anyhow::Error> {
        let body = serde_json::to_vec(event)?;

        let mut properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2)
            .with_message_id(event.event_id.to_string().into());
        if let Some(ttl) = ttl_ms {
            properties = properties.with_expiration(ttl.to_string().into());
        }

        let mut last_err: Option<anyhow::Error> = None;
        for attempt in 0..PUBLISH_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(BACKOFF_BASE * 2u32.pow(attempt - 1)).await;
            }

            let result = self
                .channel
                .basic_publish(
                    super::EVENTS_EXCHANGE,
                    event.routing_key(),
                    BasicPublishOptions::default(),
                    &body,
                    properties.clone(),
                )
                .await;

            match result {
                Ok(confirm) => match confirm.await {
                    Ok(Confirmation::Nack(_)) => {
                        last_err = Some(anyhow::anyhow!(
                            "broker nacked publish of {}",
                            event.event_id
                        ));
                    }
                    Ok(_) => return Ok(()),
                    Err(e) => last_err = Some(e.into()),
                },
                Err(e) => last_err = Some(e.into()),
            }

            tracing::warn!(
                event_id = %event.event_id,
                routing_key = event.routing_key(),
                attempt = attempt + 1,
                "Publish not confirmed, retrying"
            );
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("publish failed")))
    }
}

/// Milliseconds until `deadline`, clamped at zero. The broker drops expired
/// messages silently, which is exactly what a reminder for an
/// already-started game should get.
pub fn ttl_ms_until(deadline: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (deadline - now).num_milliseconds().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn ttl_is_zero_for_past_deadlines() {
        let now = Utc::now();
        assert_eq!(ttl_ms_until(now - ChronoDuration::seconds(5), now), 0);
    }

    #[test]
    fn ttl_counts_down_to_the_deadline() {
        let now = Utc::now();
        assert_eq!(
            ttl_ms_until(now + ChronoDuration::minutes(1), now),
            60_000
        );
    }
}
