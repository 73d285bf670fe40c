use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, post};
use axum::{Json, Router};
use uuid::Uuid;

use crate::api::auth::SessionUser;
use crate::api::guilds::{ensure_guild, guild_scope, resolve_game_or_404};
use crate::db::queries;
use crate::error::ApiError;
use crate::services::{authz, signup};
use crate::state::AppState;
use crate::types::entities::PositionType;

/// Nested under /games alongside the game routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/{game_id}/join", post(join_game))
        .route("/{game_id}/leave", post(leave_game))
        .route(
            "/{game_id}/participants/{participant_id}",
            delete(remove_participant),
        )
}

async fn join_game(
    State(state): State<AppState>,
    user: SessionUser,
    Path(game_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let guild_id = resolve_game_or_404(&state, game_id).await?;
    let membership = authz::require_member(&state.chat, guild_id, user.discord_id).await?;

    // The join button and this endpoint share the visibility rule: you can
    // only sign up for games your roles let you see.
    let mut scope = guild_scope(&state, guild_id).await?;
    let game = queries::get_game(scope.conn(), game_id)
        .await?
        .ok_or(ApiError::NotFound("Game"))?;
    let template = queries::get_template(scope.conn(), game.template_id).await?;
    scope.commit().await?;

    if let Some(template) = template {
        authz::require_player_visibility(&membership, &template.allowed_player_role_ids)?;
    }

    let requester = queries::get_user_by_id(&state.db, user.user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let participant =
        signup::join_game(&state.db, &state.publisher, guild_id, game_id, &requester).await?;

    Ok((StatusCode::CREATED, Json(participant)))
}

async fn leave_game(
    State(state): State<AppState>,
    user: SessionUser,
    Path(game_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let guild_id = resolve_game_or_404(&state, game_id).await?;
    authz::require_member(&state.chat, guild_id, user.discord_id).await?;

    let requester = queries::get_user_by_id(&state.db, user.user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    signup::leave_game(&state.db, &state.publisher, guild_id, game_id, &requester).await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn remove_participant(
    State(state): State<AppState>,
    user: SessionUser,
    Path((game_id, participant_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let guild_id = resolve_game_or_404(&state, game_id).await?;
    let membership = authz::require_member(&state.chat, guild_id, user.discord_id).await?;
    let guild = ensure_guild(&state, guild_id).await?;

    let mut scope = guild_scope(&state, guild_id).await?;
    let with_users = queries::get_participants_with_users(scope.conn(), game_id).await?;
    scope.commit().await?;

    let host_discord = with_users
        .iter()
        .find(|p| p.position_type == PositionType::Host)
        .and_then(|p| p.discord_id);
    authz::require_game_manager(&membership, &guild, host_discord)?;

    signup::remove_participant(&state.db, &state.publisher, guild_id, game_id, participant_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
