use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::auth::SessionUser;
use crate::chat::client::snowflake;
use crate::db::{queries, GuildScope};
use crate::error::ApiError;
use crate::services::{authz, mentions};
use crate::state::AppState;
use crate::types::entities::{UpdateGuildRequest, ValidateMentionRequest};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_guilds))
        .route("/{guild_id}", get(get_guild).put(update_guild))
        .route("/{guild_id}/config", get(get_config))
        .route("/{guild_id}/channels", get(get_channels))
        .route("/{guild_id}/roles", get(get_roles))
        .route("/{guild_id}/validate-mention", post(validate_mention))
}

/// Guilds the requester and the bot share. The user's own guild list comes
/// from their OAuth token; the intersection is what the dashboard can manage.
async fn list_guilds(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<impl IntoResponse, ApiError> {
    let user_guilds = state
        .chat
        .user_guilds(&user.access_token, user.discord_id)
        .await?;
    let bot_guilds = state.chat.bot_guilds().await?;

    let mutual: Vec<_> = user_guilds
        .into_iter()
        .filter(|g| bot_guilds.iter().any(|b| b.id == g.id))
        .collect();

    Ok(Json(mutual))
}

async fn get_guild(
    State(state): State<AppState>,
    user: SessionUser,
    Path(guild_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require_member(&state.chat, guild_id, user.discord_id).await?;

    // Keep the tenant row in step with the platform's name.
    let api_guild = state.chat.guild(guild_id).await?;
    let guild = queries::upsert_guild(&state.db, guild_id, &api_guild.name).await?;

    Ok(Json(guild))
}

async fn get_config(
    State(state): State<AppState>,
    user: SessionUser,
    Path(guild_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require_member(&state.chat, guild_id, user.discord_id).await?;

    let guild = ensure_guild(&state, guild_id).await?;

    Ok(Json(guild))
}

async fn update_guild(
    State(state): State<AppState>,
    user: SessionUser,
    Path(guild_id): Path<i64>,
    Json(body): Json<UpdateGuildRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let membership = authz::require_member(&state.chat, guild_id, user.discord_id).await?;

    let api_guild = state.chat.guild(guild_id).await?;
    let guild = queries::upsert_guild(&state.db, guild_id, &api_guild.name).await?;
    authz::require_manager(&membership, &guild)?;

    if let Some(ref role_ids) = body.bot_manager_role_ids {
        let known = state.chat.guild_roles(guild_id).await?;
        for role_id in role_ids {
            if !known
                .iter()
                .any(|r| snowflake(&r.id) == Some(*role_id))
            {
                return Err(ApiError::InvalidInput(format!(
                    "Unknown role id {role_id}"
                )));
            }
        }
    }

    let updated = queries::update_guild_config(
        &state.db,
        guild_id,
        body.bot_manager_role_ids.as_deref(),
        body.require_host_role,
    )
    .await?;

    Ok(Json(updated))
}

async fn get_channels(
    State(state): State<AppState>,
    user: SessionUser,
    Path(guild_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require_member(&state.chat, guild_id, user.discord_id).await?;
    let channels = state.chat.guild_channels(guild_id).await?;
    Ok(Json(channels))
}

async fn get_roles(
    State(state): State<AppState>,
    user: SessionUser,
    Path(guild_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require_member(&state.chat, guild_id, user.discord_id).await?;
    let roles = state.chat.guild_roles(guild_id).await?;
    Ok(Json(roles))
}

/// Submit-time mention validation for the game form. Success echoes the
/// entries back; failure is the structured 422 with suggestions.
async fn validate_mention(
    State(state): State<AppState>,
    user: SessionUser,
    Path(guild_id): Path<i64>,
    Json(body): Json<ValidateMentionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require_member(&state.chat, guild_id, user.discord_id).await?;

    let resolved = mentions::resolve_entries(&state.chat, guild_id, &body.entries).await?;
    let entries: Vec<_> = resolved.into_iter().map(|r| r.entry).collect();

    Ok(Json(serde_json::json!({
        "valid": true,
        "valid_participants": entries,
    })))
}

/// Shared by game-scoped routes: make sure the tenant row exists before the
/// guild-scoped transaction opens.
pub async fn ensure_guild(state: &AppState, guild_id: i64) -> Result<crate::types::entities::Guild, ApiError> {
    if let Some(guild) = queries::get_guild(&state.db, guild_id).await? {
        return Ok(guild);
    }
    let api_guild = state.chat.guild(guild_id).await?;
    Ok(queries::upsert_guild(&state.db, guild_id, &api_guild.name).await?)
}

/// Resolve a template id to its guild or 404, without leaking which.
pub async fn resolve_template_or_404(
    state: &AppState,
    template_id: uuid::Uuid,
) -> Result<i64, ApiError> {
    queries::resolve_template_guild(&state.db, template_id)
        .await?
        .ok_or(ApiError::NotFound("Template"))
}

/// Resolve a game id to its guild or 404.
pub async fn resolve_game_or_404(
    state: &AppState,
    game_id: uuid::Uuid,
) -> Result<i64, ApiError> {
    queries::resolve_game_guild(&state.db, game_id)
        .await?
        .ok_or(ApiError::NotFound("Game"))
}

/// Convenience: open a guild scope after the membership gate passed.
pub async fn guild_scope<'a>(
    state: &'a AppState,
    guild_id: i64,
) -> Result<GuildScope<'a>, ApiError> {
    Ok(GuildScope::begin(&state.db, guild_id).await?)
}
