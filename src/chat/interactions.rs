use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::chat::client::{snowflake, ApiMember};
use crate::chat::BotContext;
use crate::db::queries;
use crate::error::ApiError;
use crate::services::signup;

const INTERACTION_APPLICATION_COMMAND: u8 = 2;
const INTERACTION_MESSAGE_COMPONENT: u8 = 3;
const CALLBACK_MESSAGE: u8 = 4;
const CALLBACK_DEFERRED_UPDATE: u8 = 6;
const FLAG_EPHEMERAL: u64 = 1 << 6;

#[derive(Debug, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub token: String,
    #[serde(rename = "type")]
    pub kind: u8,
    pub guild_id: Option<String>,
    pub member: Option<ApiMember>,
    pub data: Option<InteractionData>,
}

#[derive(Debug, Deserialize)]
pub struct InteractionData {
    pub custom_id: Option<String>,
    pub name: Option<String>,
}

/// Platform-initiated interactions: slash commands and the join/leave
/// buttons on announcement messages. The platform gives us 3 seconds to
/// acknowledge, so callbacks go out before any database work; embed
/// refreshes then arrive through the bus like every other update.
pub async fn handle(ctx: &BotContext, interaction: Interaction) -> anyhow::Result<()> {
    match interaction.kind {
        INTERACTION_APPLICATION_COMMAND => handle_command(ctx, interaction).await,
        INTERACTION_MESSAGE_COMPONENT => handle_button(ctx, interaction).await,
        _ => Ok(()),
    }
}

/// `/games`: an ephemeral list of the guild's upcoming games.
async fn handle_command(ctx: &BotContext, interaction: Interaction) -> anyhow::Result<()> {
    let name = interaction
        .data
        .as_ref()
        .and_then(|d| d.name.as_deref())
        .unwrap_or_default();
    if name != "games" {
        return Ok(());
    }
    let Some(guild_id) = interaction.guild_id.as_deref().and_then(snowflake) else {
        return Ok(());
    };

    let mut scope = crate::db::GuildScope::begin(&ctx.db, guild_id).await?;
    let games = queries::list_games(
        scope.conn(),
        Some(crate::types::entities::GameStatus::Scheduled),
    )
    .await?;
    scope.commit().await?;

    let content = if games.is_empty() {
        "No games scheduled.".to_string()
    } else {
        games
            .iter()
            .take(5)
            .map(|g| format!("**{}** starts <t:{}:F>", g.title, g.scheduled_at.timestamp()))
            .collect::<Vec<_>>()
            .join("\n")
    };

    ctx.chat
        .interaction_callback(
            &interaction.id,
            &interaction.token,
            &json!({
                "type": CALLBACK_MESSAGE,
                "data": { "content": content, "flags": FLAG_EPHEMERAL },
            }),
        )
        .await?;
    Ok(())
}

async fn handle_button(ctx: &BotContext, interaction: Interaction) -> anyhow::Result<()> {
    let Some((action, game_id)) = interaction
        .data
        .as_ref()
        .and_then(|d| d.custom_id.as_deref())
        .and_then(parse_custom_id)
    else {
        return Ok(());
    };

    ctx.chat
        .interaction_callback(
            &interaction.id,
            &interaction.token,
            &json!({ "type": CALLBACK_DEFERRED_UPDATE }),
        )
        .await?;

    let Some(guild_id) = interaction.guild_id.as_deref().and_then(snowflake) else {
        return Ok(());
    };
    let Some(api_user) = interaction.member.as_ref().and_then(|m| m.user.clone()) else {
        return Ok(());
    };
    let Some(discord_id) = snowflake(&api_user.id) else {
        return Ok(());
    };

    let user = queries::upsert_user(
        &ctx.db,
        Uuid::now_v7(),
        discord_id,
        &api_user.username,
        api_user.global_name.as_deref(),
        api_user.avatar.as_deref(),
    )
    .await?;

    let result = match action {
        ButtonAction::Join => signup::join_game(&ctx.db, &ctx.publisher, guild_id, game_id, &user)
            .await
            .map(|_| ()),
        ButtonAction::Leave => {
            signup::leave_game(&ctx.db, &ctx.publisher, guild_id, game_id, &user).await
        }
    };

    match result {
        Ok(()) => Ok(()),
        // Stale presses (double-click, game already started) get a private
        // explanation instead of a dead-letter loop.
        Err(e @ (ApiError::Conflict { .. } | ApiError::NotFound(_))) => {
            let reason = e.to_string();
            tracing::info!(%game_id, discord_id, reason = %reason, "Button press rejected");
            let _ = ctx
                .chat
                .interaction_followup(
                    &interaction.token,
                    &json!({
                        "content": reason,
                        "flags": FLAG_EPHEMERAL,
                    }),
                )
                .await;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ButtonAction {
    Join,
    Leave,
}

fn parse_custom_id(custom_id: &str) -> Option<(ButtonAction, Uuid)> {
    let (action, id) = custom_id.split_once(':')?;
    let action = match action {
        "join" => ButtonAction::Join,
        "leave" => ButtonAction::Leave,
        _ => return None,
    };
    Some((action, Uuid::parse_str(id).ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_ids_parse_into_actions() {
        let id = Uuid::new_v4();
        assert_eq!(
            parse_custom_id(&format!("join:{id}")),
            Some((ButtonAction::Join, id))
        );
        assert_eq!(
            parse_custom_id(&format!("leave:{id}")),
            Some((ButtonAction::Leave, id))
        );
        assert_eq!(parse_custom_id("nope"), None);
        assert_eq!(parse_custom_id("join:not-a-uuid"), None);
    }
}
