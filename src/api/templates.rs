use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use crate::api::auth::SessionUser;
use crate::api::guilds::{ensure_guild, guild_scope, resolve_template_or_404};
use crate::db::queries;
use crate::error::ApiError;
use crate::services::authz;
use crate::state::AppState;
use crate::types::entities::{
    CreateTemplateRequest, ReorderTemplatesRequest, SignupMethod, UpdateTemplateRequest,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_templates).post(create_template))
        .route("/reorder", post(reorder_templates))
        .route(
            "/{template_id}",
            get(get_template).put(update_template).delete(delete_template),
        )
        .route("/{template_id}/default", post(make_default))
}

#[derive(serde::Deserialize)]
struct ListQuery {
    guild_id: i64,
}

async fn list_templates(
    State(state): State<AppState>,
    user: SessionUser,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require_member(&state.chat, query.guild_id, user.discord_id).await?;

    let mut scope = guild_scope(&state, query.guild_id).await?;
    let templates = queries::list_templates(scope.conn()).await?;
    scope.commit().await?;

    Ok(Json(templates))
}

async fn create_template(
    State(state): State<AppState>,
    user: SessionUser,
    Json(body): Json<CreateTemplateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let membership = authz::require_member(&state.chat, body.guild_id, user.discord_id).await?;
    let guild = ensure_guild(&state, body.guild_id).await?;
    authz::require_manager(&membership, &guild)?;

    if body.name.is_empty() || body.name.len() > 100 {
        return Err(ApiError::InvalidInput(
            "Template name must be 1-100 characters".into(),
        ));
    }
    if body.default_max_players <= 0 {
        return Err(ApiError::InvalidInput("Max players must be positive".into()));
    }
    if body.default_duration_minutes <= 0 {
        return Err(ApiError::InvalidInput("Duration must be positive".into()));
    }

    let allowed_methods = body.allowed_signup_methods.clone().unwrap_or_default();
    let default_method = body.default_signup_method.unwrap_or(SignupMethod::SelfSignup);
    if !allowed_methods.is_empty() && !allowed_methods.contains(&default_method) {
        return Err(ApiError::InvalidInput(
            "Default signup method must be in the allowed set".into(),
        ));
    }

    let mut scope = guild_scope(&state, body.guild_id).await?;
    let existing = queries::count_templates(scope.conn()).await?;

    let template = queries::create_template(
        scope.conn(),
        Uuid::now_v7(),
        body.guild_id,
        &body.name,
        body.channel_id,
        body.notify_role_ids.as_deref().unwrap_or(&[]),
        body.allowed_host_role_ids.as_deref().unwrap_or(&[]),
        body.allowed_player_role_ids.as_deref().unwrap_or(&[]),
        body.default_max_players,
        body.default_reminder_minutes.as_deref().unwrap_or(&[]),
        body.default_duration_minutes,
        body.default_location.as_deref(),
        body.default_signup_instructions.as_deref(),
        &allowed_methods,
        default_method,
        body.locked_fields.as_deref().unwrap_or(&[]),
        // The guild's first template is its default until told otherwise.
        existing == 0,
        existing as i32,
    )
    .await?;
    scope.commit().await?;

    Ok((StatusCode::CREATED, Json(template)))
}

async fn get_template(
    State(state): State<AppState>,
    user: SessionUser,
    Path(template_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let guild_id = resolve_template_or_404(&state, template_id).await?;
    authz::require_member(&state.chat, guild_id, user.discord_id).await?;

    let mut scope = guild_scope(&state, guild_id).await?;
    let template = queries::get_template(scope.conn(), template_id)
        .await?
        .ok_or(ApiError::NotFound("Template"))?;
    scope.commit().await?;

    Ok(Json(template))
}

async fn update_template(
    State(state): State<AppState>,
    user: SessionUser,
    Path(template_id): Path<Uuid>,
    Json(body): Json<UpdateTemplateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let guild_id = resolve_template_or_404(&state, template_id).await?;
    let membership = authz::require_member(&state.chat, guild_id, user.discord_id).await?;
    let guild = ensure_guild(&state, guild_id).await?;
    authz::require_manager(&membership, &guild)?;

    if let Some(max_players) = body.default_max_players {
        if max_players <= 0 {
            return Err(ApiError::InvalidInput("Max players must be positive".into()));
        }
    }
    if let Some(duration) = body.default_duration_minutes {
        if duration <= 0 {
            return Err(ApiError::InvalidInput("Duration must be positive".into()));
        }
    }

    let mut scope = guild_scope(&state, guild_id).await?;
    let current = queries::get_template(scope.conn(), template_id)
        .await?
        .ok_or(ApiError::NotFound("Template"))?;

    let allowed = body
        .allowed_signup_methods
        .clone()
        .unwrap_or_else(|| current.allowed_signup_methods.clone());
    let default_method = body.default_signup_method.unwrap_or(current.default_signup_method);
    if !allowed.is_empty() && !allowed.contains(&default_method) {
        return Err(ApiError::InvalidInput(
            "Default signup method must be in the allowed set".into(),
        ));
    }

    let template = queries::update_template(
        scope.conn(),
        template_id,
        body.name.as_deref(),
        body.channel_id,
        body.notify_role_ids.as_deref(),
        body.allowed_host_role_ids.as_deref(),
        body.allowed_player_role_ids.as_deref(),
        body.default_max_players,
        body.default_reminder_minutes.as_deref(),
        body.default_duration_minutes,
        body.default_location.as_deref(),
        body.default_signup_instructions.as_deref(),
        body.allowed_signup_methods.as_deref(),
        body.default_signup_method,
        body.locked_fields.as_deref(),
    )
    .await?;
    scope.commit().await?;

    Ok(Json(template))
}

async fn delete_template(
    State(state): State<AppState>,
    user: SessionUser,
    Path(template_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let guild_id = resolve_template_or_404(&state, template_id).await?;
    let membership = authz::require_member(&state.chat, guild_id, user.discord_id).await?;
    let guild = ensure_guild(&state, guild_id).await?;
    authz::require_manager(&membership, &guild)?;

    let mut scope = guild_scope(&state, guild_id).await?;
    let template = queries::get_template(scope.conn(), template_id)
        .await?
        .ok_or(ApiError::NotFound("Template"))?;

    if template.is_default {
        return Err(ApiError::conflict(
            "default_template",
            "The default template cannot be deleted; pick another default first",
        ));
    }
    if queries::count_games_for_template(scope.conn(), template_id).await? > 0 {
        return Err(ApiError::conflict(
            "template_in_use",
            "Games were created from this template",
        ));
    }

    queries::delete_template(scope.conn(), template_id).await?;
    scope.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn make_default(
    State(state): State<AppState>,
    user: SessionUser,
    Path(template_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let guild_id = resolve_template_or_404(&state, template_id).await?;
    let membership = authz::require_member(&state.chat, guild_id, user.discord_id).await?;
    let guild = ensure_guild(&state, guild_id).await?;
    authz::require_manager(&membership, &guild)?;

    let mut scope = guild_scope(&state, guild_id).await?;
    queries::set_default_template(scope.conn(), template_id)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => ApiError::NotFound("Template"),
            other => ApiError::Database(other),
        })?;
    let template = queries::get_template(scope.conn(), template_id)
        .await?
        .ok_or(ApiError::NotFound("Template"))?;
    scope.commit().await?;

    Ok(Json(template))
}

async fn reorder_templates(
    State(state): State<AppState>,
    user: SessionUser,
    Json(body): Json<ReorderTemplatesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let membership = authz::require_member(&state.chat, body.guild_id, user.discord_id).await?;
    let guild = ensure_guild(&state, body.guild_id).await?;
    authz::require_manager(&membership, &guild)?;

    let mut scope = guild_scope(&state, body.guild_id).await?;
    let current = queries::list_templates(scope.conn()).await?;

    // The submitted order must be a permutation of the guild's templates.
    let mut submitted: Vec<Uuid> = body.template_ids.clone();
    submitted.sort();
    submitted.dedup();
    let mut existing: Vec<Uuid> = current.iter().map(|t| t.id).collect();
    existing.sort();
    if submitted != existing {
        return Err(ApiError::InvalidInput(
            "Reorder must list every template of the guild exactly once".into(),
        ));
    }

    queries::reorder_templates(scope.conn(), &body.template_ids).await?;
    let templates = queries::list_templates(scope.conn()).await?;
    scope.commit().await?;

    Ok(Json(templates))
}
