use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

use crate::chat::{interactions, BotContext};

const OP_DISPATCH: u64 = 0;
const OP_HEARTBEAT: u64 = 1;
const OP_IDENTIFY: u64 = 2;
const OP_RECONNECT: u64 = 7;
const OP_INVALID_SESSION: u64 = 9;
const OP_HELLO: u64 = 10;
const OP_HEARTBEAT_ACK: u64 = 11;

const INTENT_GUILDS: u64 = 1 << 0;

/// Long-lived platform session. Owns its reconnects: every exit from one
/// session attempt (clean close, reconnect request, transport error) loops
/// back into a fresh connect with capped back-off.
pub async fn run(ctx: BotContext) -> anyhow::Result<()> {
    let mut backoff_secs = 1u64;
    loop {
        match serve_once(&ctx).await {
            Ok(()) => {
                tracing::info!("Chat session ended, reconnecting");
                backoff_secs = 1;
            }
            Err(e) => {
                tracing::warn!(error = %e, backoff_secs, "Chat session failed, reconnecting");
                backoff_secs = (backoff_secs * 2).min(60);
            }
        }
        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
    }
}

async fn serve_once(ctx: &BotContext) -> anyhow::Result<()> {
    let (ws, _) = tokio_tungstenite::connect_async(ctx.config.chat.gateway_url.as_str()).await?;
    let (mut sink, mut stream) = ws.split();

    // The platform speaks first: hello carries the heartbeat cadence.
    let hello = loop {
        let Some(message) = stream.next().await else {
            anyhow::bail!("socket closed before hello");
        };
        if let Message::Text(text) = message? {
            let payload: Value = serde_json::from_str(&text)?;
            if payload["op"].as_u64() == Some(OP_HELLO) {
                break payload;
            }
        }
    };
    let heartbeat_ms = hello["d"]["heartbeat_interval"]
        .as_u64()
        .unwrap_or(41_250);

    let identify = json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": ctx.config.chat.bot_token,
            "intents": INTENT_GUILDS,
            "properties": { "os": "linux", "browser": "gamenight", "device": "gamenight" },
        },
    });
    sink.send(Message::Text(identify.to_string())).await?;

    let mut ticker = tokio::time::interval(Duration::from_millis(heartbeat_ms));
    ticker.tick().await; // first tick is immediate; heartbeat on the next
    let mut last_seq: Option<u64> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let heartbeat = json!({ "op": OP_HEARTBEAT, "d": last_seq });
                sink.send(Message::Text(heartbeat.to_string())).await?;
            }
            message = stream.next() => {
                let Some(message) = message else {
                    return Ok(());
                };
                match message? {
                    Message::Text(text) => {
                        let payload: Value = serde_json::from_str(&text)?;
                        match payload["op"].as_u64() {
                            Some(OP_DISPATCH) => {
                                if let Some(seq) = payload["s"].as_u64() {
                                    last_seq = Some(seq);
                                }
                                dispatch(ctx, &payload);
                            }
                            Some(OP_HEARTBEAT) => {
                                let heartbeat = json!({ "op": OP_HEARTBEAT, "d": last_seq });
                                sink.send(Message::Text(heartbeat.to_string())).await?;
                            }
                            Some(OP_RECONNECT) | Some(OP_INVALID_SESSION) => return Ok(()),
                            Some(OP_HEARTBEAT_ACK) => {}
                            _ => {}
                        }
                    }
                    Message::Ping(data) => sink.send(Message::Pong(data)).await?,
                    Message::Close(_) => return Ok(()),
                    _ => {}
                }
            }
        }
    }
}

fn dispatch(ctx: &BotContext, payload: &Value) {
    let event_name = payload["t"].as_str().unwrap_or_default();
    if event_name != "INTERACTION_CREATE" {
        return;
    }

    let interaction = match serde_json::from_value(payload["d"].clone()) {
        Ok(interaction) => interaction,
        Err(e) => {
            tracing::warn!(error = %e, "Unparseable interaction payload");
            return;
        }
    };

    // The 3-second ack window starts now; never block the read loop on it.
    let ctx = ctx.clone();
    tokio::spawn(async move {
        if let Err(e) = interactions::handle(&ctx, interaction).await {
            tracing::error!(error = %e, "Interaction handler failed");
        }
    });
}
