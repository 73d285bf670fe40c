use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::api::auth::SessionUser;
use crate::api::guilds::{ensure_guild, guild_scope, resolve_game_or_404, resolve_template_or_404};
use crate::db::queries;
use crate::error::ApiError;
use crate::services::mentions::ResolvedEntry;
use crate::services::{authz, images, mentions, ordering, schedule, signup};
use crate::state::AppState;
use crate::types::entities::{
    CreateGameRequest, Game, GameStatus, ListGamesQuery, ParticipantWithUser, PositionType,
    SignupMethod, Template, UpdateGameRequest,
};
use crate::types::events::{Event, EventKind};

// Two 5 MiB images plus the JSON payload.
const BODY_LIMIT: usize = 12 * 1024 * 1024;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_games).post(create_game))
        .route(
            "/{game_id}",
            get(get_game).put(update_game).delete(cancel_game),
        )
        .route("/{game_id}/thumbnail", get(get_thumbnail))
        .route("/{game_id}/image", get(get_banner))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
}

#[derive(Debug, Serialize)]
struct GameDetail {
    game: Game,
    /// In partition order: confirmed seats first, then the waitlist.
    participants: Vec<ParticipantWithUser>,
    confirmed_participant_ids: Vec<Uuid>,
    waitlist_participant_ids: Vec<Uuid>,
}

async fn list_games(
    State(state): State<AppState>,
    user: SessionUser,
    Query(query): Query<ListGamesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let membership = authz::require_member(&state.chat, query.guild_id, user.discord_id).await?;

    let mut scope = guild_scope(&state, query.guild_id).await?;
    let games = queries::list_games(scope.conn(), query.status).await?;
    let templates = queries::list_templates(scope.conn()).await?;
    scope.commit().await?;

    // Visibility rides on the template's player-role list.
    let visible: Vec<Game> = games
        .into_iter()
        .filter(|game| {
            templates
                .iter()
                .find(|t| t.id == game.template_id)
                .is_none_or(|t| authz::can_view(&membership, &t.allowed_player_role_ids))
        })
        .collect();

    Ok(Json(visible))
}

/// JSON body, or multipart with a `payload` JSON part plus optional
/// `thumbnail` / `banner` image parts.
async fn create_game(
    State(state): State<AppState>,
    user: SessionUser,
    request: Request,
) -> Result<impl IntoResponse, ApiError> {
    let (body, thumbnail, banner) = parse_create_request(request).await?;

    let thumbnail = thumbnail
        .map(|data| images::validate_image(&data).map(|mime| (data, mime)))
        .transpose()?;
    let banner = banner
        .map(|data| images::validate_image(&data).map(|mime| (data, mime)))
        .transpose()?;

    let guild_id = resolve_template_or_404(&state, body.template_id).await?;
    let membership = authz::require_member(&state.chat, guild_id, user.discord_id).await?;
    let guild = ensure_guild(&state, guild_id).await?;

    let mut scope = guild_scope(&state, guild_id).await?;
    let template = queries::get_template(scope.conn(), body.template_id)
        .await?
        .ok_or(ApiError::NotFound("Template"))?;
    scope.commit().await?;

    if !authz::can_host(&membership, &guild, &template.allowed_host_role_ids) {
        return Err(ApiError::Forbidden);
    }

    if body.title.is_empty() || body.title.len() > 200 {
        return Err(ApiError::InvalidInput("Title must be 1-200 characters".into()));
    }
    if body.scheduled_at <= Utc::now() {
        return Err(ApiError::InvalidInput(
            "Scheduled time must be in the future".into(),
        ));
    }

    // Locked fields come from the template no matter what the request says;
    // the rest default from the template and accept overrides.
    let max_players = effective(
        &template,
        "max_players",
        template.default_max_players,
        body.max_players,
    );
    let duration_minutes = effective(
        &template,
        "duration_minutes",
        template.default_duration_minutes,
        body.duration_minutes,
    );
    let location = effective_opt(
        &template,
        "location",
        template.default_location.clone(),
        body.location.clone(),
    );
    let signup_instructions = effective_opt(
        &template,
        "signup_instructions",
        template.default_signup_instructions.clone(),
        body.signup_instructions.clone(),
    );
    let reminder_minutes = effective(
        &template,
        "reminder_minutes",
        template.default_reminder_minutes.clone(),
        body.reminder_minutes.clone(),
    );
    let notify_role_ids = effective(
        &template,
        "notify_role_ids",
        template.notify_role_ids.clone(),
        body.notify_role_ids.clone(),
    );
    let signup_method = effective(
        &template,
        "signup_method",
        template.default_signup_method,
        body.signup_method,
    );

    if max_players <= 0 {
        return Err(ApiError::InvalidInput("Max players must be positive".into()));
    }
    if duration_minutes <= 0 {
        return Err(ApiError::InvalidInput("Duration must be positive".into()));
    }
    if !template.allows_signup_method(signup_method) {
        return Err(ApiError::InvalidInput(
            "Signup method not allowed by this template".into(),
        ));
    }
    if body
        .participants
        .iter()
        .any(|e| e.position_type == PositionType::Host)
    {
        return Err(ApiError::InvalidInput(
            "The host seat is assigned automatically".into(),
        ));
    }

    // Submit-time mention validation; a structured 422 carries failures and
    // survivors back to the form.
    let resolved = mentions::resolve_entries(&state.chat, guild_id, &body.participants).await?;
    let seats = persist_users(&state, &resolved).await?;

    let host = queries::get_user_by_id(&state.db, user.user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let mut scope = guild_scope(&state, guild_id).await?;
    let game = queries::create_game(
        scope.conn(),
        Uuid::now_v7(),
        guild_id,
        template.id,
        &body.title,
        body.description.as_deref(),
        signup_instructions.as_deref(),
        body.scheduled_at,
        duration_minutes,
        location.as_deref(),
        max_players,
        &reminder_minutes,
        &notify_role_ids,
        template.channel_id,
        signup_method,
    )
    .await?;

    queries::insert_participant(
        scope.conn(),
        Uuid::now_v7(),
        game.id,
        guild_id,
        Some(host.id),
        None,
        PositionType::Host,
        0,
    )
    .await?;

    for seat in &seats {
        queries::insert_participant(
            scope.conn(),
            Uuid::now_v7(),
            game.id,
            guild_id,
            seat.user_id,
            seat.mention.as_deref(),
            seat.position_type,
            seat.position,
        )
        .await?;
    }

    schedule::populate_for_game(scope.conn(), &game).await?;

    if let Some((data, mime)) = thumbnail {
        queries::set_game_thumbnail(scope.conn(), game.id, &data, mime).await?;
    }
    if let Some((data, mime)) = banner {
        queries::set_game_banner(scope.conn(), game.id, &data, mime).await?;
    }

    let participants = queries::get_participants_with_users(scope.conn(), game.id).await?;
    scope.commit().await?;

    state
        .publisher
        .publish(&Event::new(guild_id, EventKind::GameCreated { game_id: game.id }))
        .await?;

    Ok((StatusCode::CREATED, Json(detail(game, participants))))
}

async fn get_game(
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
    let participants = queries::get_participants_with_users(scope.conn(), game_id).await?;
    scope.commit().await?;

    if let Some(template) = template {
        authz::require_player_visibility(&membership, &template.allowed_player_role_ids)?;
    }

    Ok(Json(detail(game, participants)))
}

async fn update_game(
    State(state): State<AppState>,
    user: SessionUser,
    Path(game_id): Path<Uuid>,
    Json(body): Json<UpdateGameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let guild_id = resolve_game_or_404(&state, game_id).await?;
    let membership = authz::require_member(&state.chat, guild_id, user.discord_id).await?;
    let guild = ensure_guild(&state, guild_id).await?;

    let mut scope = guild_scope(&state, guild_id).await?;
    let game = queries::get_game(scope.conn(), game_id)
        .await?
        .ok_or(ApiError::NotFound("Game"))?;
    let template = queries::get_template(scope.conn(), game.template_id)
        .await?
        .ok_or(ApiError::NotFound("Template"))?;
    let before = queries::get_participants(scope.conn(), game_id).await?;
    let with_users = queries::get_participants_with_users(scope.conn(), game_id).await?;
    scope.commit().await?;

    let host_discord = with_users
        .iter()
        .find(|p| p.position_type == PositionType::Host)
        .and_then(|p| p.discord_id);
    authz::require_game_manager(&membership, &guild, host_discord)?;

    if game.status != GameStatus::Scheduled {
        return Err(ApiError::conflict(
            "stale_version",
            "Only scheduled games can be edited",
        ));
    }
    if let Some(field) = locked_violation(&template, &body) {
        return Err(ApiError::InvalidInput(format!(
            "The template locks {field}"
        )));
    }
    if let Some(scheduled_at) = body.scheduled_at {
        if scheduled_at <= Utc::now() {
            return Err(ApiError::InvalidInput(
                "Scheduled time must be in the future".into(),
            ));
        }
    }
    if let Some(max_players) = body.max_players {
        if max_players <= 0 {
            return Err(ApiError::InvalidInput("Max players must be positive".into()));
        }
    }
    if let Some(duration) = body.duration_minutes {
        if duration <= 0 {
            return Err(ApiError::InvalidInput("Duration must be positive".into()));
        }
    }
    if let Some(method) = body.signup_method {
        if !template.allows_signup_method(method) {
            return Err(ApiError::InvalidInput(
                "Signup method not allowed by this template".into(),
            ));
        }
    }
    if let Some(ref entries) = body.participants {
        if entries.iter().any(|e| e.position_type == PositionType::Host) {
            return Err(ApiError::InvalidInput(
                "The host seat is assigned automatically".into(),
            ));
        }
    }

    let seats = match &body.participants {
        Some(entries) => {
            let resolved = mentions::resolve_entries(&state.chat, guild_id, entries).await?;
            Some(persist_users(&state, &resolved).await?)
        }
        None => None,
    };

    // Only timing-bearing fields invalidate schedule rows. A max_players
    // change moves the waitlist split, not any due_at.
    let timing_changed = body.scheduled_at.is_some()
        || body.duration_minutes.is_some()
        || body.reminder_minutes.is_some();

    let mut scope = guild_scope(&state, guild_id).await?;
    let updated = queries::update_game(
        scope.conn(),
        game_id,
        body.title.as_deref(),
        body.description.as_deref(),
        body.signup_instructions.as_deref(),
        body.scheduled_at,
        body.duration_minutes,
        body.location.as_deref(),
        body.max_players,
        body.reminder_minutes.as_deref(),
        body.notify_role_ids.as_deref(),
        body.signup_method,
    )
    .await?;

    if let Some(ref seats) = seats {
        queries::delete_non_host_participants(scope.conn(), game_id).await?;
        for seat in seats {
            queries::insert_participant(
                scope.conn(),
                Uuid::now_v7(),
                game_id,
                guild_id,
                seat.user_id,
                seat.mention.as_deref(),
                seat.position_type,
                seat.position,
            )
            .await?;
        }
    }

    if timing_changed {
        schedule::replace_for_game(scope.conn(), &updated).await?;
    }

    let after = queries::get_participants(scope.conn(), game_id).await?;
    let participants = queries::get_participants_with_users(scope.conn(), game_id).await?;
    scope.commit().await?;

    state
        .publisher
        .publish(&Event::new(guild_id, EventKind::GameUpdated { game_id }))
        .await?;
    signup::publish_promotions(
        &state.publisher,
        guild_id,
        game_id,
        &before,
        &after,
        game.max_players,
        updated.max_players,
    )
    .await?;

    Ok(Json(detail(updated, participants)))
}

/// Cancellation. The game row stays (status `cancelled`) so history and the
/// chat message survive; every pending schedule row dies with it in the same
/// transaction.
async fn cancel_game(
    State(state): State<AppState>,
    user: SessionUser,
    Path(game_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let guild_id = resolve_game_or_404(&state, game_id).await?;
    let membership = authz::require_member(&state.chat, guild_id, user.discord_id).await?;
    let guild = ensure_guild(&state, guild_id).await?;

    let mut scope = guild_scope(&state, guild_id).await?;
    let game = queries::get_game(scope.conn(), game_id)
        .await?
        .ok_or(ApiError::NotFound("Game"))?;
    let with_users = queries::get_participants_with_users(scope.conn(), game_id).await?;

    let host_discord = with_users
        .iter()
        .find(|p| p.position_type == PositionType::Host)
        .and_then(|p| p.discord_id);
    authz::require_game_manager(&membership, &guild, host_discord)?;

    if game.status == GameStatus::Cancelled {
        scope.rollback().await?;
        return Ok(StatusCode::NO_CONTENT);
    }

    queries::set_game_status(scope.conn(), game_id, GameStatus::Cancelled).await?;
    schedule::clear_for_game(scope.conn(), game_id).await?;
    scope.commit().await?;

    state
        .publisher
        .publish(&Event::new(guild_id, EventKind::GameCancelled { game_id }))
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn get_thumbnail(
    State(state): State<AppState>,
    user: SessionUser,
    Path(game_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    serve_image(&state, &user, game_id, ImageKind::Thumbnail).await
}

async fn get_banner(
    State(state): State<AppState>,
    user: SessionUser,
    Path(game_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    serve_image(&state, &user, game_id, ImageKind::Banner).await
}

enum ImageKind {
    Thumbnail,
    Banner,
}

async fn serve_image(
    state: &AppState,
    user: &SessionUser,
    game_id: Uuid,
    kind: ImageKind,
) -> Result<axum::response::Response, ApiError> {
    let guild_id = resolve_game_or_404(state, game_id).await?;
    authz::require_member(&state.chat, guild_id, user.discord_id).await?;

    let mut scope = guild_scope(state, guild_id).await?;
    let blob = match kind {
        ImageKind::Thumbnail => queries::get_game_thumbnail(scope.conn(), game_id).await?,
        ImageKind::Banner => queries::get_game_banner(scope.conn(), game_id).await?,
    };
    scope.commit().await?;

    let (data, mime) = blob.ok_or(ApiError::NotFound("Image"))?;
    Ok((
        [
            (header::CONTENT_TYPE, mime),
            (
                header::CACHE_CONTROL,
                "public, max-age=31536000, immutable".to_string(),
            ),
        ],
        data,
    )
        .into_response())
}

// ── Helpers ────────────────────────────────────────────

struct SeatRow {
    user_id: Option<Uuid>,
    mention: Option<String>,
    position_type: PositionType,
    position: i32,
}

/// Upsert user projections for resolved mentions and flatten entries into
/// insertable rows. Placeholder inputs keep their text and are forced into
/// the placeholder tier.
async fn persist_users(
    state: &AppState,
    resolved: &[ResolvedEntry],
) -> Result<Vec<SeatRow>, ApiError> {
    let mut rows = Vec::with_capacity(resolved.len());
    for entry in resolved {
        match &entry.member {
            Some(member) => {
                let user = queries::upsert_user(
                    &state.db,
                    Uuid::now_v7(),
                    member.discord_id,
                    &member.username,
                    member.display_name.as_deref(),
                    member.avatar_hash.as_deref(),
                )
                .await?;
                rows.push(SeatRow {
                    user_id: Some(user.id),
                    mention: None,
                    position_type: entry.entry.position_type,
                    position: entry.entry.position,
                });
            }
            None => rows.push(SeatRow {
                user_id: None,
                mention: Some(entry.entry.input.clone()),
                position_type: PositionType::Placeholder,
                position: entry.entry.position,
            }),
        }
    }
    Ok(rows)
}

fn effective<T>(template: &Template, field: &str, template_value: T, requested: Option<T>) -> T {
    if template.is_locked(field) {
        template_value
    } else {
        requested.unwrap_or(template_value)
    }
}

fn effective_opt<T>(
    template: &Template,
    field: &str,
    template_value: Option<T>,
    requested: Option<T>,
) -> Option<T> {
    if template.is_locked(field) {
        template_value
    } else {
        requested.or(template_value)
    }
}

fn locked_violation<'a>(template: &'a Template, body: &UpdateGameRequest) -> Option<&'a str> {
    let provided = [
        ("max_players", body.max_players.is_some()),
        ("duration_minutes", body.duration_minutes.is_some()),
        ("location", body.location.is_some()),
        ("signup_instructions", body.signup_instructions.is_some()),
        ("reminder_minutes", body.reminder_minutes.is_some()),
        ("notify_role_ids", body.notify_role_ids.is_some()),
        ("signup_method", body.signup_method.is_some()),
    ];
    provided
        .into_iter()
        .filter(|(_, provided)| *provided)
        .find_map(|(field, _)| template.locked_fields.iter().find(|f| f.as_str() == field))
        .map(String::as_str)
}

fn detail(game: Game, participants: Vec<ParticipantWithUser>) -> GameDetail {
    let split = ordering::partition(&participants, game.max_players);
    GameDetail {
        confirmed_participant_ids: split.confirmed().iter().map(|p| p.id).collect(),
        waitlist_participant_ids: split.overflow().iter().map(|p| p.id).collect(),
        participants: split.sorted,
        game,
    }
}

async fn parse_create_request(
    request: Request,
) -> Result<(CreateGameRequest, Option<Vec<u8>>, Option<Vec<u8>>), ApiError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if !content_type.starts_with("multipart/form-data") {
        let bytes = axum::body::to_bytes(request.into_body(), BODY_LIMIT)
            .await
            .map_err(|e| ApiError::InvalidInput(format!("Unreadable body: {e}")))?;
        let body = serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::InvalidInput(format!("Invalid JSON body: {e}")))?;
        return Ok((body, None, None));
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| ApiError::InvalidInput(format!("Invalid multipart body: {e}")))?;

    let mut payload = None;
    let mut thumbnail = None;
    let mut banner = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidInput(format!("Invalid multipart field: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::InvalidInput(format!("Unreadable multipart field: {e}")))?;
        match name.as_str() {
            "payload" => {
                payload = Some(serde_json::from_slice(&data).map_err(|e| {
                    ApiError::InvalidInput(format!("Invalid payload JSON: {e}"))
                })?)
            }
            "thumbnail" => thumbnail = Some(data.to_vec()),
            "banner" => banner = Some(data.to_vec()),
            _ => {}
        }
    }

    let payload =
        payload.ok_or_else(|| ApiError::InvalidInput("Missing payload part".into()))?;
    Ok((payload, thumbnail, banner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn template(locked: &[&str]) -> Template {
        Template {
            id: Uuid::nil(),
            guild_id: 1,
            name: "One-shot".into(),
            channel_id: 10,
            notify_role_ids: vec![],
            allowed_host_role_ids: vec![],
            allowed_player_role_ids: vec![],
            default_max_players: 5,
            default_reminder_minutes: vec![60],
            default_duration_minutes: 180,
            default_location: Some("Main hall".into()),
            default_signup_instructions: None,
            allowed_signup_methods: vec![],
            default_signup_method: SignupMethod::SelfSignup,
            locked_fields: locked.iter().map(|s| s.to_string()).collect(),
            is_default: true,
            position: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn locked_fields_ignore_requested_overrides() {
        let t = template(&["max_players"]);
        assert_eq!(effective(&t, "max_players", t.default_max_players, Some(99)), 5);
        assert_eq!(
            effective(&t, "duration_minutes", t.default_duration_minutes, Some(60)),
            60
        );
    }

    #[test]
    fn unlocked_fields_default_from_the_template() {
        let t = template(&[]);
        assert_eq!(effective(&t, "max_players", t.default_max_players, None), 5);
        assert_eq!(
            effective_opt(&t, "location", t.default_location.clone(), None),
            Some("Main hall".into())
        );
        assert_eq!(
            effective_opt(&t, "location", t.default_location.clone(), Some("Attic".into())),
            Some("Attic".into())
        );
    }

    #[test]
    fn updates_touching_locked_fields_are_flagged() {
        let t = template(&["signup_method", "location"]);
        let body = UpdateGameRequest {
            location: Some("Elsewhere".into()),
            ..Default::default()
        };
        assert_eq!(locked_violation(&t, &body), Some("location"));

        let clean = UpdateGameRequest {
            title: Some("New title".into()),
            ..Default::default()
        };
        assert_eq!(locked_violation(&t, &clean), None);
    }
}
