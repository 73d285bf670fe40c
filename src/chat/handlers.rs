use anyhow::Context;
use serde_json::json;
use uuid::Uuid;

use crate::chat::client::snowflake;
use crate::chat::{render, BotContext};
use crate::db::{queries, GuildScope};
use crate::services::ordering::partition;
use crate::types::entities::{Game, GameStatus, NotificationType, ParticipantWithUser};
use crate::types::events::{Event, EventKind};

/// Dispatch table for everything arriving on `bot_events`. Every branch is
/// idempotent on `event_id`: message updates render to a derived state, DMs
/// deduplicate on the event id, announcements converge to a refresh once the
/// message exists.
pub async fn handle(ctx: &BotContext, event: &Event) -> anyhow::Result<()> {
    match &event.kind {
        EventKind::GameCreated { game_id } => announce(ctx, event.guild_id, *game_id).await,
        EventKind::GameUpdated { game_id }
        | EventKind::GameCancelled { game_id }
        | EventKind::GameStarted { game_id }
        | EventKind::GameCompleted { game_id }
        | EventKind::ParticipantJoined { game_id, .. }
        | EventKind::ParticipantLeft { game_id, .. }
        | EventKind::ParticipantRemoved { game_id, .. } => {
            refresh_message(ctx, event.guild_id, *game_id).await
        }
        EventKind::ParticipantPromoted { game_id, user_id } => {
            dm_promoted(ctx, event, *game_id, *user_id).await
        }
        EventKind::NotificationDue {
            game_id,
            notification_type,
            participant_id,
            ..
        } => match notification_type {
            NotificationType::Reminder => dm_reminder(ctx, event, *game_id).await,
            NotificationType::JoinNotification => {
                dm_join_notification(ctx, event, *game_id, *participant_id).await
            }
        },
    }
}

async fn load_game(
    ctx: &BotContext,
    guild_id: i64,
    game_id: Uuid,
) -> anyhow::Result<Option<(Game, Vec<ParticipantWithUser>)>> {
    let mut scope = GuildScope::begin(&ctx.db, guild_id).await?;
    let Some(game) = queries::get_game(scope.conn(), game_id).await? else {
        return Ok(None);
    };
    let participants = queries::get_participants_with_users(scope.conn(), game_id).await?;
    scope.commit().await?;
    Ok(Some((game, participants)))
}

async fn announce(ctx: &BotContext, guild_id: i64, game_id: Uuid) -> anyhow::Result<()> {
    let Some((game, participants)) = load_game(ctx, guild_id, game_id).await? else {
        tracing::info!(%game_id, "Game gone before announcement, skipping");
        return Ok(());
    };

    // Redelivery after the message was posted: converge to an edit.
    if game.message_id.is_some() {
        return refresh_message(ctx, guild_id, game_id).await;
    }

    let split = partition(&participants, game.max_players);
    let mut payload = render::game_message(&game, &split, &ctx.config.frontend.base_url);
    if let Some(content) = render::notify_content(&game) {
        payload["content"] = json!(content);
    }

    let message = ctx.chat.create_message(game.channel_id, &payload).await?;
    let message_id = snowflake(&message.id).context("non-numeric message id")?;

    let mut scope = GuildScope::begin(&ctx.db, guild_id).await?;
    queries::set_game_message_id(scope.conn(), game_id, message_id).await?;
    scope.commit().await?;

    tracing::info!(%game_id, message_id, "Announced game");
    Ok(())
}

async fn refresh_message(ctx: &BotContext, guild_id: i64, game_id: Uuid) -> anyhow::Result<()> {
    let Some((game, participants)) = load_game(ctx, guild_id, game_id).await? else {
        tracing::info!(%game_id, "Game gone, skipping message refresh");
        return Ok(());
    };
    let Some(message_id) = game.message_id else {
        tracing::info!(%game_id, "Game has no announcement yet, skipping refresh");
        return Ok(());
    };

    let split = partition(&participants, game.max_players);
    let payload = render::game_message(&game, &split, &ctx.config.frontend.base_url);
    ctx.editor.submit(game.channel_id, message_id, payload).await?;
    Ok(())
}

async fn dm_promoted(
    ctx: &BotContext,
    event: &Event,
    game_id: Uuid,
    user_id: Uuid,
) -> anyhow::Result<()> {
    let Some((game, _)) = load_game(ctx, event.guild_id, game_id).await? else {
        tracing::info!(%game_id, "Game gone, dropping promotion DM");
        return Ok(());
    };
    let Some(user) = queries::get_user_by_id(&ctx.db, user_id).await? else {
        tracing::info!(%user_id, "Unknown user, dropping promotion DM");
        return Ok(());
    };

    if !claim_dm(ctx, event.event_id, user.discord_id).await {
        return Ok(());
    }

    let payload = json!({
        "content": format!(
            "A spot opened up in **{}** and you're confirmed! Starts <t:{}:F>.",
            game.title,
            game.scheduled_at.timestamp()
        ),
    });
    if !ctx.chat.send_dm(user.discord_id, &payload).await? {
        tracing::info!(discord_id = user.discord_id, "Promotion DM undeliverable");
    }
    Ok(())
}

async fn dm_reminder(ctx: &BotContext, event: &Event, game_id: Uuid) -> anyhow::Result<()> {
    let Some((game, participants)) = load_game(ctx, event.guild_id, game_id).await? else {
        tracing::info!(%game_id, "Game gone, dropping reminder");
        return Ok(());
    };
    if game.status != GameStatus::Scheduled {
        tracing::info!(%game_id, status = ?game.status, "Game not scheduled, dropping reminder");
        return Ok(());
    }

    let split = partition(&participants, game.max_players);
    let payload = json!({
        "content": format!(
            "Reminder: **{}** starts <t:{}:R>.",
            game.title,
            game.scheduled_at.timestamp()
        ),
    });

    for seat in split.confirmed() {
        let Some(discord_id) = seat.discord_id else {
            continue;
        };
        if !claim_dm(ctx, event.event_id, discord_id).await {
            continue;
        }
        if !ctx.chat.send_dm(discord_id, &payload).await? {
            tracing::info!(discord_id, "Reminder DM undeliverable");
        }
    }
    Ok(())
}

async fn dm_join_notification(
    ctx: &BotContext,
    event: &Event,
    game_id: Uuid,
    participant_id: Option<Uuid>,
) -> anyhow::Result<()> {
    let Some((game, participants)) = load_game(ctx, event.guild_id, game_id).await? else {
        tracing::info!(%game_id, "Game gone, dropping join notification");
        return Ok(());
    };

    let joined = participant_id.and_then(|id| participants.iter().find(|p| p.id == id));
    let Some(joined) = joined else {
        tracing::info!(%game_id, "Participant gone, dropping join notification");
        return Ok(());
    };

    let host = participants
        .iter()
        .find(|p| p.position_type == crate::types::entities::PositionType::Host);
    let Some(host_discord) = host.and_then(|h| h.discord_id) else {
        tracing::info!(%game_id, "No reachable host, dropping join notification");
        return Ok(());
    };

    if !claim_dm(ctx, event.event_id, host_discord).await {
        return Ok(());
    }

    let name = joined
        .display_name
        .clone()
        .or_else(|| joined.username.clone())
        .or_else(|| joined.mention.clone())
        .unwrap_or_else(|| "Someone".into());
    let payload = json!({
        "content": format!("{} joined **{}**.", name, game.title),
    });
    if !ctx.chat.send_dm(host_discord, &payload).await? {
        tracing::info!(discord_id = host_discord, "Join DM undeliverable");
    }
    Ok(())
}

/// At-least-once delivery with idempotent effect: the first claim on
/// (event_id, recipient) wins, replays and DLQ redeliveries no-op.
async fn claim_dm(ctx: &BotContext, event_id: Uuid, discord_id: i64) -> bool {
    let mut redis = ctx.redis.clone();
    let result: Result<Option<String>, _> = redis::cmd("SET")
        .arg(format!("dm_sent:{event_id}:{discord_id}"))
        .arg("1")
        .arg("NX")
        .arg("EX")
        .arg(86_400)
        .query_async(&mut redis)
        .await;
    match result {
        Ok(reply) => reply.is_some(),
        // Cache down: sending twice beats never sending.
        Err(_) => true,
    }
}
