use futures_util::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions};
use lapin::types::FieldTable;
use lapin::Connection;

use crate::bus;
use crate::chat::{handlers, BotContext};
use crate::types::events::Event;

/// Bus consumer loop for `bot_events`. Manual ack only: a handler either
/// acks, or nacks without requeue so the message dead-letters into
/// `bot_events.dlq` for the retry daemon. Auto-ack would silently drop
/// failures; it is deliberately not used anywhere.
pub async fn run(ctx: BotContext, conn: &Connection) -> anyhow::Result<()> {
    let channel = conn.create_channel().await?;
    channel.basic_qos(1, BasicQosOptions::default()).await?;

    let mut consumer = channel
        .basic_consume(
            bus::BOT_EVENTS_QUEUE,
            "gamenight-gateway",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    tracing::info!(queue = bus::BOT_EVENTS_QUEUE, "Consuming bus events");

    while let Some(delivery) = consumer.next().await {
        let delivery = delivery?;

        let event: Event = match serde_json::from_slice(&delivery.data) {
            Ok(event) => event,
            Err(e) => {
                // A malformed message can never succeed; acking it keeps it
                // from cycling through the DLQ forever.
                tracing::warn!(error = %e, "Dropping unparseable bus message");
                delivery.ack(BasicAckOptions::default()).await?;
                continue;
            }
        };

        match handlers::handle(&ctx, &event).await {
            Ok(()) => {
                delivery.ack(BasicAckOptions::default()).await?;
            }
            Err(e) => {
                tracing::error!(
                    event_id = %event.event_id,
                    event_type = event.routing_key(),
                    error = %e,
                    "Handler failed, dead-lettering"
                );
                delivery
                    .nack(BasicNackOptions {
                        requeue: false,
                        ..Default::default()
                    })
                    .await?;
            }
        }
    }

    anyhow::bail!("bus consumer stream ended")
}
