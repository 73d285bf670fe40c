use std::time::Duration;

use lapin::message::BasicGetMessage;
use lapin::options::{
    BasicAckOptions, BasicGetOptions, BasicNackOptions, BasicPublishOptions, ConfirmSelectOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection};
use tokio::sync::watch;

use crate::bus;

/// DLQ retry daemon, the sole consumer of the dead-letter queues. On
/// startup and on every tick it drains each DLQ, republishing messages to
/// their original exchange and routing key. Letting other services consume
/// DLQs alongside this one multiplied messages; don't.
pub async fn run(
    conn: &Connection,
    tick: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let channel = conn.create_channel().await?;
    channel
        .confirm_select(ConfirmSelectOptions::default())
        .await?;

    loop {
        for &dlq in bus::DLQS {
            match drain_dlq(&channel, dlq).await {
                Ok(0) => {}
                Ok(count) => tracing::info!(dlq, count, "Republished dead-lettered messages"),
                Err(e) => tracing::warn!(dlq, error = %e, "DLQ drain failed, retrying next tick"),
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(tick) => {}
            _ = shutdown.changed() => {
                tracing::info!("Retry daemon stopped");
                return Ok(());
            }
        }
    }
}

/// Pull until the queue is empty. Republish failures nack the message back
/// onto the DLQ and stop the drain; the next tick picks it up again.
async fn drain_dlq(channel: &Channel, dlq: &str) -> anyhow::Result<u64> {
    let mut republished = 0u64;

    loop {
        let Some(message) = channel.basic_get(dlq, BasicGetOptions::default()).await? else {
            return Ok(republished);
        };

        // TTL-expired messages were stale by definition (reminders for games
        // that already started); resurrecting them would defeat the TTL.
        if death_reason(&message) == Some("expired".to_string()) {
            message.delivery.ack(BasicAckOptions::default()).await?;
            continue;
        }

        let Some((exchange, routing_key)) = death_route(&message) else {
            tracing::warn!(dlq, "Dead-lettered message without x-death route, dropping");
            message.delivery.ack(BasicAckOptions::default()).await?;
            continue;
        };

        match republish(channel, &exchange, &routing_key, &message).await {
            Ok(()) => {
                message.delivery.ack(BasicAckOptions::default()).await?;
                republished += 1;
            }
            Err(e) => {
                message
                    .delivery
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    })
                    .await?;
                return Err(e);
            }
        }
    }
}

async fn republish(
    channel: &Channel,
    exchange: &str,
    routing_key: &str,
    message: &BasicGetMessage,
) -> anyhow::Result<()> {
    let properties = BasicProperties::default()
        .with_content_type("application/json".into())
        .with_delivery_mode(2);

    let confirm = channel
        .basic_publish(
            exchange,
            routing_key,
            BasicPublishOptions::default(),
            &message.delivery.data,
            properties,
        )
        .await?
        .await?;

    if let Confirmation::Nack(_) = confirm {
        anyhow::bail!("broker nacked DLQ republish to {exchange}/{routing_key}");
    }
    Ok(())
}

/// First x-death entry: the queue the message died in, with the original
/// exchange and routing keys.
fn first_death(message: &BasicGetMessage) -> Option<&FieldTable> {
    let headers = message.delivery.properties.headers().as_ref()?;
    let deaths = headers
        .inner()
        .iter()
        .find(|(key, _)| key.as_str() == "x-death")
        .map(|(_, value)| value)?;
    let AMQPValue::FieldArray(deaths) = deaths else {
        return None;
    };
    match deaths.as_slice().first()? {
        AMQPValue::FieldTable(death) => Some(death),
        _ => None,
    }
}

fn death_field(death: &FieldTable, field: &str) -> Option<AMQPValue> {
    death
        .inner()
        .iter()
        .find(|(key, _)| key.as_str() == field)
        .map(|(_, value)| value.clone())
}

fn death_reason(message: &BasicGetMessage) -> Option<String> {
    match death_field(first_death(message)?, "reason")? {
        AMQPValue::LongString(reason) => Some(reason.to_string()),
        _ => None,
    }
}

fn death_route(message: &BasicGetMessage) -> Option<(String, String)> {
    let death = first_death(message)?;

    let exchange = match death_field(death, "exchange")? {
        AMQPValue::LongString(exchange) => exchange.to_string(),
        _ => return None,
    };
    let routing_key = match death_field(death, "routing-keys")? {
        AMQPValue::FieldArray(keys) => match keys.as_slice().first()? {
            AMQPValue::LongString(key) => key.to_string(),
            _ => return None,
        },
        _ => return None,
    };
    Some((exchange, routing_key))
}
