use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use uuid::Uuid;

use crate::api::auth::SessionUser;
use crate::api::guilds::{guild_scope, resolve_game_or_404};
use crate::db::queries;
use crate::error::ApiError;
use crate::services::{authz, ical};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/game/{game_id}", get(export_game))
}

/// Calendar download behind the same gates as the game itself. The chat
/// embed links here via the frontend, which re-authenticates and streams
/// this response through.
async fn export_game(
    State(state): State<AppState>,
    user: SessionUser,
    Path(game_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let guild_id = resolve_game_or_404(&state, game_id).await?;
    let membership = authz::require_member(&state.chat, guild_id, user.discord_id).await?;

    let mut scope = guild_scope(&state, guild_id).await?;
    let game = queries::get_game(scope.conn(), game_id)
        .await?
        .ok_or(ApiError::NotFound("Game"))?;
    let template = queries::get_template(scope.conn(), game.template_id).await?;
    scope.commit().await?;

    if let Some(template) = template {
        authz::require_player_visibility(&membership, &template.allowed_player_role_ids)?;
    }

    let body = ical::render_game(&game);
    let disposition = format!(
        "attachment; filename=\"{}\"",
        ical::attachment_filename(&game)
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}
