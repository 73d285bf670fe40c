pub mod publisher;

use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, Connection, ConnectionProperties, ExchangeKind};

pub use publisher::Publisher;

/// Topic exchange every service publishes to.
pub const EVENTS_EXCHANGE: &str = "events";
/// Dead-letter exchange. Direct: each primary queue dead-letters with its own
/// routing key, so rejected messages land in exactly one DLQ.
pub const DLX_EXCHANGE: &str = "events.dlx";

pub const BOT_EVENTS_QUEUE: &str = "bot_events";
pub const BOT_EVENTS_DLQ: &str = "bot_events.dlq";
pub const BOT_EVENTS_BINDINGS: &[&str] = &["game.*", "participant.*", "notification.*"];

/// Every DLQ the retry daemon drains.
pub const DLQS: &[&str] = &[BOT_EVENTS_DLQ];

pub async fn connect(url: &str) -> Result<Connection, lapin::Error> {
    Connection::connect(url, ConnectionProperties::default()).await
}

/// Declare the full topology. Idempotent; run by the init binary before any
/// other service starts. The services themselves declare nothing and fail
/// fast if the broker is missing pieces.
pub async fn declare_topology(channel: &Channel) -> Result<(), lapin::Error> {
    let durable = ExchangeDeclareOptions {
        durable: true,
        ..Default::default()
    };

    channel
        .exchange_declare(EVENTS_EXCHANGE, ExchangeKind::Topic, durable, FieldTable::default())
        .await?;
    channel
        .exchange_declare(DLX_EXCHANGE, ExchangeKind::Direct, durable, FieldTable::default())
        .await?;

    let queue_opts = QueueDeclareOptions {
        durable: true,
        ..Default::default()
    };

    let mut primary_args = FieldTable::default();
    primary_args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(DLX_EXCHANGE.into()),
    );
    primary_args.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(BOT_EVENTS_DLQ.into()),
    );
    channel
        .queue_declare(BOT_EVENTS_QUEUE, queue_opts, primary_args)
        .await?;

    channel
        .queue_declare(BOT_EVENTS_DLQ, queue_opts, FieldTable::default())
        .await?;
    channel
        .queue_bind(
            BOT_EVENTS_DLQ,
            DLX_EXCHANGE,
            BOT_EVENTS_DLQ,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    for pattern in BOT_EVENTS_BINDINGS {
        channel
            .queue_bind(
                BOT_EVENTS_QUEUE,
                EVENTS_EXCHANGE,
                pattern,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
    }

    Ok(())
}
