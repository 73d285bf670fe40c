use chrono::{DateTime, Utc};
use sqlx::postgres::PgConnection;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::types::entities::{
    Game, GameStatus, Guild, NotificationSchedule, NotificationType, Participant,
    ParticipantWithUser, PositionType, SignupMethod, StatusTransitionSchedule, Template, User,
};

const GAME_COLUMNS: &str = r#"id, guild_id, template_id, title, description, signup_instructions,
       scheduled_at, duration_minutes, location, max_players, reminder_minutes,
       notify_role_ids, status, channel_id, message_id, signup_method, created_at, updated_at"#;

const TEMPLATE_COLUMNS: &str = r#"id, guild_id, name, channel_id, notify_role_ids, allowed_host_role_ids,
       allowed_player_role_ids, default_max_players, default_reminder_minutes,
       default_duration_minutes, default_location, default_signup_instructions,
       allowed_signup_methods, default_signup_method, locked_fields, is_default,
       position, created_at, updated_at"#;

// ── Guilds ─────────────────────────────────────────────

pub async fn upsert_guild(
    conn: impl PgExecutor<'_>,
    id: i64,
    name: &str,
) -> Result<Guild, sqlx::Error> {
    sqlx::query_as::<_, Guild>(
        r#"
        INSERT INTO guilds (id, name)
        VALUES ($1, $2)
        ON CONFLICT (id) DO UPDATE SET name = $2, updated_at = now()
        RETURNING id, name, bot_manager_role_ids, require_host_role, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(name)
    .fetch_one(conn)
    .await
}

pub async fn get_guild(conn: impl PgExecutor<'_>, id: i64) -> Result<Option<Guild>, sqlx::Error> {
    sqlx::query_as::<_, Guild>(
        r#"
        SELECT id, name, bot_manager_role_ids, require_host_role, created_at, updated_at
        FROM guilds WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await
}

pub async fn update_guild_config(
    conn: impl PgExecutor<'_>,
    id: i64,
    bot_manager_role_ids: Option<&[i64]>,
    require_host_role: Option<bool>,
) -> Result<Guild, sqlx::Error> {
    sqlx::query_as::<_, Guild>(
        r#"
        UPDATE guilds
        SET bot_manager_role_ids = COALESCE($2, bot_manager_role_ids),
            require_host_role = COALESCE($3, require_host_role),
            updated_at = now()
        WHERE id = $1
        RETURNING id, name, bot_manager_role_ids, require_host_role, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(bot_manager_role_ids)
    .bind(require_host_role)
    .fetch_one(conn)
    .await
}

// ── Users ──────────────────────────────────────────────

pub async fn upsert_user(
    conn: impl PgExecutor<'_>,
    id: Uuid,
    discord_id: i64,
    username: &str,
    display_name: Option<&str>,
    avatar_hash: Option<&str>,
) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, discord_id, username, display_name, avatar_hash)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (discord_id) DO UPDATE
            SET username = $3, display_name = $4, avatar_hash = $5, updated_at = now()
        RETURNING id, discord_id, username, display_name, avatar_hash, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(discord_id)
    .bind(username)
    .bind(display_name)
    .bind(avatar_hash)
    .fetch_one(conn)
    .await
}

pub async fn get_user_by_id(
    conn: impl PgExecutor<'_>,
    id: Uuid,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT id, discord_id, username, display_name, avatar_hash, created_at, updated_at
        FROM users WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await
}

pub async fn get_user_by_discord_id(
    conn: impl PgExecutor<'_>,
    discord_id: i64,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT id, discord_id, username, display_name, avatar_hash, created_at, updated_at
        FROM users WHERE discord_id = $1
        "#,
    )
    .bind(discord_id)
    .fetch_optional(conn)
    .await
}

// ── Tenant resolution ──────────────────────────────────
// SECURITY DEFINER lookups; the only data they disclose is the owning guild
// id, which the caller still has to pass the membership check for.

pub async fn resolve_game_guild(
    conn: impl PgExecutor<'_>,
    game_id: Uuid,
) -> Result<Option<i64>, sqlx::Error> {
    let row: Option<(Option<i64>,)> = sqlx::query_as("SELECT game_guild_id($1)")
        .bind(game_id)
        .fetch_optional(conn)
        .await?;
    Ok(row.and_then(|r| r.0))
}

pub async fn resolve_template_guild(
    conn: impl PgExecutor<'_>,
    template_id: Uuid,
) -> Result<Option<i64>, sqlx::Error> {
    let row: Option<(Option<i64>,)> = sqlx::query_as("SELECT template_guild_id($1)")
        .bind(template_id)
        .fetch_optional(conn)
        .await?;
    Ok(row.and_then(|r| r.0))
}

// ── Templates ──────────────────────────────────────────
// All guild-scoped: callers run these inside a GuildScope transaction.

#[allow(clippy::too_many_arguments)]
pub async fn create_template(
    conn: impl PgExecutor<'_>,
    id: Uuid,
    guild_id: i64,
    name: &str,
    channel_id: i64,
    notify_role_ids: &[i64],
    allowed_host_role_ids: &[i64],
    allowed_player_role_ids: &[i64],
    default_max_players: i32,
    default_reminder_minutes: &[i32],
    default_duration_minutes: i32,
    default_location: Option<&str>,
    default_signup_instructions: Option<&str>,
    allowed_signup_methods: &[SignupMethod],
    default_signup_method: SignupMethod,
    locked_fields: &[String],
    is_default: bool,
    position: i32,
) -> Result<Template, sqlx::Error> {
    sqlx::query_as::<_, Template>(&format!(
        r#"
        INSERT INTO templates (id, guild_id, name, channel_id, notify_role_ids,
            allowed_host_role_ids, allowed_player_role_ids, default_max_players,
            default_reminder_minutes, default_duration_minutes, default_location,
            default_signup_instructions, allowed_signup_methods, default_signup_method,
            locked_fields, is_default, position)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        RETURNING {TEMPLATE_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(guild_id)
    .bind(name)
    .bind(channel_id)
    .bind(notify_role_ids)
    .bind(allowed_host_role_ids)
    .bind(allowed_player_role_ids)
    .bind(default_max_players)
    .bind(default_reminder_minutes)
    .bind(default_duration_minutes)
    .bind(default_location)
    .bind(default_signup_instructions)
    .bind(allowed_signup_methods)
    .bind(default_signup_method)
    .bind(locked_fields)
    .bind(is_default)
    .bind(position)
    .fetch_one(conn)
    .await
}

pub async fn get_template(
    conn: impl PgExecutor<'_>,
    id: Uuid,
) -> Result<Option<Template>, sqlx::Error> {
    sqlx::query_as::<_, Template>(&format!(
        "SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await
}

pub async fn list_templates(conn: impl PgExecutor<'_>) -> Result<Vec<Template>, sqlx::Error> {
    sqlx::query_as::<_, Template>(&format!(
        "SELECT {TEMPLATE_COLUMNS} FROM templates ORDER BY position, created_at"
    ))
    .fetch_all(conn)
    .await
}

pub async fn count_templates(conn: impl PgExecutor<'_>) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM templates")
        .fetch_one(conn)
        .await?;
    Ok(row.0)
}

#[allow(clippy::too_many_arguments)]
pub async fn update_template(
    conn: impl PgExecutor<'_>,
    id: Uuid,
    name: Option<&str>,
    channel_id: Option<i64>,
    notify_role_ids: Option<&[i64]>,
    allowed_host_role_ids: Option<&[i64]>,
    allowed_player_role_ids: Option<&[i64]>,
    default_max_players: Option<i32>,
    default_reminder_minutes: Option<&[i32]>,
    default_duration_minutes: Option<i32>,
    default_location: Option<&str>,
    default_signup_instructions: Option<&str>,
    allowed_signup_methods: Option<&[SignupMethod]>,
    default_signup_method: Option<SignupMethod>,
    locked_fields: Option<&[String]>,
) -> Result<Template, sqlx::Error> {
    sqlx::query_as::<_, Template>(&format!(
        r#"
        UPDATE templates
        SET name = COALESCE($2, name),
            channel_id = COALESCE($3, channel_id),
            notify_role_ids = COALESCE($4, notify_role_ids),
            allowed_host_role_ids = COALESCE($5, allowed_host_role_ids),
            allowed_player_role_ids = COALESCE($6, allowed_player_role_ids),
            default_max_players = COALESCE($7, default_max_players),
            default_reminder_minutes = COALESCE($8, default_reminder_minutes),
            default_duration_minutes = COALESCE($9, default_duration_minutes),
            default_location = COALESCE($10, default_location),
            default_signup_instructions = COALESCE($11, default_signup_instructions),
            allowed_signup_methods = COALESCE($12, allowed_signup_methods),
            default_signup_method = COALESCE($13, default_signup_method),
            locked_fields = COALESCE($14, locked_fields),
            updated_at = now()
        WHERE id = $1
        RETURNING {TEMPLATE_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(name)
    .bind(channel_id)
    .bind(notify_role_ids)
    .bind(allowed_host_role_ids)
    .bind(allowed_player_role_ids)
    .bind(default_max_players)
    .bind(default_reminder_minutes)
    .bind(default_duration_minutes)
    .bind(default_location)
    .bind(default_signup_instructions)
    .bind(allowed_signup_methods)
    .bind(default_signup_method)
    .bind(locked_fields)
    .fetch_one(conn)
    .await
}

pub async fn delete_template(conn: impl PgExecutor<'_>, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM templates WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Two statements, caller's transaction: clear the old default, set the new
/// one. The partial unique index would reject any interleaving that leaves
/// two defaults.
pub async fn set_default_template(conn: &mut PgConnection, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE templates SET is_default = false, updated_at = now() WHERE is_default")
        .execute(&mut *conn)
        .await?;
    let result = sqlx::query("UPDATE templates SET is_default = true, updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(sqlx::Error::RowNotFound);
    }
    Ok(())
}

pub async fn reorder_templates(
    conn: &mut PgConnection,
    template_ids: &[Uuid],
) -> Result<(), sqlx::Error> {
    for (position, id) in template_ids.iter().enumerate() {
        sqlx::query("UPDATE templates SET position = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(position as i32)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub async fn count_games_for_template(
    conn: impl PgExecutor<'_>,
    template_id: Uuid,
) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM games WHERE template_id = $1")
        .bind(template_id)
        .fetch_one(conn)
        .await?;
    Ok(row.0)
}

// ── Games ──────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
pub async fn create_game(
    conn: impl PgExecutor<'_>,
    id: Uuid,
    guild_id: i64,
    template_id: Uuid,
    title: &str,
    description: Option<&str>,
    signup_instructions: Option<&str>,
    scheduled_at: DateTime<Utc>,
    duration_minutes: i32,
    location: Option<&str>,
    max_players: i32,
    reminder_minutes: &[i32],
    notify_role_ids: &[i64],
    channel_id: i64,
    signup_method: SignupMethod,
) -> Result<Game, sqlx::Error> {
    sqlx::query_as::<_, Game>(&format!(
        r#"
        INSERT INTO games (id, guild_id, template_id, title, description, signup_instructions,
            scheduled_at, duration_minutes, location, max_players, reminder_minutes,
            notify_role_ids, channel_id, signup_method)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING {GAME_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(guild_id)
    .bind(template_id)
    .bind(title)
    .bind(description)
    .bind(signup_instructions)
    .bind(scheduled_at)
    .bind(duration_minutes)
    .bind(location)
    .bind(max_players)
    .bind(reminder_minutes)
    .bind(notify_role_ids)
    .bind(channel_id)
    .bind(signup_method)
    .fetch_one(conn)
    .await
}

pub async fn get_game(conn: impl PgExecutor<'_>, id: Uuid) -> Result<Option<Game>, sqlx::Error> {
    sqlx::query_as::<_, Game>(&format!("SELECT {GAME_COLUMNS} FROM games WHERE id = $1"))
        .bind(id)
        .fetch_optional(conn)
        .await
}

pub async fn list_games(
    conn: impl PgExecutor<'_>,
    status: Option<GameStatus>,
) -> Result<Vec<Game>, sqlx::Error> {
    sqlx::query_as::<_, Game>(&format!(
        r#"
        SELECT {GAME_COLUMNS} FROM games
        WHERE ($1::game_status IS NULL OR status = $1)
        ORDER BY scheduled_at
        "#
    ))
    .bind(status)
    .fetch_all(conn)
    .await
}

#[allow(clippy::too_many_arguments)]
pub async fn update_game(
    conn: impl PgExecutor<'_>,
    id: Uuid,
    title: Option<&str>,
    description: Option<&str>,
    signup_instructions: Option<&str>,
    scheduled_at: Option<DateTime<Utc>>,
    duration_minutes: Option<i32>,
    location: Option<&str>,
    max_players: Option<i32>,
    reminder_minutes: Option<&[i32]>,
    notify_role_ids: Option<&[i64]>,
    signup_method: Option<SignupMethod>,
) -> Result<Game, sqlx::Error> {
    sqlx::query_as::<_, Game>(&format!(
        r#"
        UPDATE games
        SET title = COALESCE($2, title),
            description = COALESCE($3, description),
            signup_instructions = COALESCE($4, signup_instructions),
            scheduled_at = COALESCE($5, scheduled_at),
            duration_minutes = COALESCE($6, duration_minutes),
            location = COALESCE($7, location),
            max_players = COALESCE($8, max_players),
            reminder_minutes = COALESCE($9, reminder_minutes),
            notify_role_ids = COALESCE($10, notify_role_ids),
            signup_method = COALESCE($11, signup_method),
            updated_at = now()
        WHERE id = $1
        RETURNING {GAME_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(title)
    .bind(description)
    .bind(signup_instructions)
    .bind(scheduled_at)
    .bind(duration_minutes)
    .bind(location)
    .bind(max_players)
    .bind(reminder_minutes)
    .bind(notify_role_ids)
    .bind(signup_method)
    .fetch_one(conn)
    .await
}

pub async fn set_game_status(
    conn: impl PgExecutor<'_>,
    id: Uuid,
    status: GameStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE games SET status = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(status)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_game_message_id(
    conn: impl PgExecutor<'_>,
    id: Uuid,
    message_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE games SET message_id = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(message_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_game_thumbnail(
    conn: impl PgExecutor<'_>,
    id: Uuid,
    data: &[u8],
    mime: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE games SET thumbnail = $2, thumbnail_mime = $3, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(data)
        .bind(mime)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_game_banner(
    conn: impl PgExecutor<'_>,
    id: Uuid,
    data: &[u8],
    mime: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE games SET banner = $2, banner_mime = $3, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(data)
        .bind(mime)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn get_game_thumbnail(
    conn: impl PgExecutor<'_>,
    id: Uuid,
) -> Result<Option<(Vec<u8>, String)>, sqlx::Error> {
    let row: Option<(Option<Vec<u8>>, Option<String>)> =
        sqlx::query_as("SELECT thumbnail, thumbnail_mime FROM games WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await?;
    Ok(row.and_then(|(data, mime)| data.zip(mime)))
}

pub async fn get_game_banner(
    conn: impl PgExecutor<'_>,
    id: Uuid,
) -> Result<Option<(Vec<u8>, String)>, sqlx::Error> {
    let row: Option<(Option<Vec<u8>>, Option<String>)> =
        sqlx::query_as("SELECT banner, banner_mime FROM games WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await?;
    Ok(row.and_then(|(data, mime)| data.zip(mime)))
}

// ── Participants ───────────────────────────────────────

#[allow(clippy::too_many_arguments)]
pub async fn insert_participant(
    conn: impl PgExecutor<'_>,
    id: Uuid,
    game_id: Uuid,
    guild_id: i64,
    user_id: Option<Uuid>,
    mention: Option<&str>,
    position_type: PositionType,
    position: i32,
) -> Result<Participant, sqlx::Error> {
    sqlx::query_as::<_, Participant>(
        r#"
        INSERT INTO participants (id, game_id, guild_id, user_id, mention, position_type, position)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, game_id, guild_id, user_id, mention, position_type, position, joined_at
        "#,
    )
    .bind(id)
    .bind(game_id)
    .bind(guild_id)
    .bind(user_id)
    .bind(mention)
    .bind(position_type)
    .bind(position)
    .fetch_one(conn)
    .await
}

pub async fn get_participant(
    conn: impl PgExecutor<'_>,
    id: Uuid,
) -> Result<Option<Participant>, sqlx::Error> {
    sqlx::query_as::<_, Participant>(
        r#"
        SELECT id, game_id, guild_id, user_id, mention, position_type, position, joined_at
        FROM participants WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await
}

pub async fn get_participant_for_user(
    conn: impl PgExecutor<'_>,
    game_id: Uuid,
    user_id: Uuid,
) -> Result<Option<Participant>, sqlx::Error> {
    sqlx::query_as::<_, Participant>(
        r#"
        SELECT id, game_id, guild_id, user_id, mention, position_type, position, joined_at
        FROM participants WHERE game_id = $1 AND user_id = $2
        "#,
    )
    .bind(game_id)
    .bind(user_id)
    .fetch_optional(conn)
    .await
}

pub async fn get_participants(
    conn: impl PgExecutor<'_>,
    game_id: Uuid,
) -> Result<Vec<Participant>, sqlx::Error> {
    sqlx::query_as::<_, Participant>(
        r#"
        SELECT id, game_id, guild_id, user_id, mention, position_type, position, joined_at
        FROM participants
        WHERE game_id = $1
        ORDER BY position_type, position, joined_at
        "#,
    )
    .bind(game_id)
    .fetch_all(conn)
    .await
}

pub async fn get_participants_with_users(
    conn: impl PgExecutor<'_>,
    game_id: Uuid,
) -> Result<Vec<ParticipantWithUser>, sqlx::Error> {
    sqlx::query_as::<_, ParticipantWithUser>(
        r#"
        SELECT p.id, p.game_id, p.guild_id, p.user_id, p.mention, p.position_type,
               p.position, p.joined_at, u.discord_id, u.username, u.display_name
        FROM participants p
        LEFT JOIN users u ON u.id = p.user_id
        WHERE p.game_id = $1
        ORDER BY p.position_type, p.position, p.joined_at
        "#,
    )
    .bind(game_id)
    .fetch_all(conn)
    .await
}

pub async fn delete_participant(conn: impl PgExecutor<'_>, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM participants WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Replace every non-host row. Host assignment survives list edits; the host
/// can only change through an explicit host transfer.
pub async fn delete_non_host_participants(
    conn: impl PgExecutor<'_>,
    game_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM participants WHERE game_id = $1 AND position_type <> 0")
        .bind(game_id)
        .execute(conn)
        .await?;
    Ok(())
}

// ── Notification schedule ──────────────────────────────

#[allow(clippy::too_many_arguments)]
pub async fn insert_notification_row(
    conn: impl PgExecutor<'_>,
    id: Uuid,
    game_id: Uuid,
    guild_id: i64,
    notification_type: NotificationType,
    participant_id: Option<Uuid>,
    offset_minutes: i32,
    due_at: DateTime<Utc>,
    game_scheduled_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO notification_schedule
            (id, game_id, guild_id, notification_type, participant_id, offset_minutes,
             due_at, game_scheduled_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(id)
    .bind(game_id)
    .bind(guild_id)
    .bind(notification_type)
    .bind(participant_id)
    .bind(offset_minutes)
    .bind(due_at)
    .bind(game_scheduled_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn delete_reminder_rows(
    conn: impl PgExecutor<'_>,
    game_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "DELETE FROM notification_schedule WHERE game_id = $1 AND notification_type = 'reminder'",
    )
    .bind(game_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn delete_notification_rows(
    conn: impl PgExecutor<'_>,
    game_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM notification_schedule WHERE game_id = $1")
        .bind(game_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn next_notification_due(
    conn: impl PgExecutor<'_>,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    let row: Option<(DateTime<Utc>,)> =
        sqlx::query_as("SELECT due_at FROM notification_schedule ORDER BY due_at LIMIT 1")
            .fetch_optional(conn)
            .await?;
    Ok(row.map(|r| r.0))
}

/// Earliest due row, locked for this transaction. SKIP LOCKED keeps a second
/// daemon instance from double-firing the same row.
pub async fn lock_due_notification(
    conn: impl PgExecutor<'_>,
) -> Result<Option<NotificationSchedule>, sqlx::Error> {
    sqlx::query_as::<_, NotificationSchedule>(
        r#"
        SELECT id, game_id, guild_id, notification_type, participant_id, offset_minutes,
               due_at, game_scheduled_at, created_at
        FROM notification_schedule
        WHERE due_at <= now()
        ORDER BY due_at
        LIMIT 1
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .fetch_optional(conn)
    .await
}

pub async fn delete_notification_row(
    conn: impl PgExecutor<'_>,
    id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM notification_schedule WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

// ── Status-transition schedule ─────────────────────────

pub async fn insert_status_transition_row(
    conn: impl PgExecutor<'_>,
    id: Uuid,
    game_id: Uuid,
    guild_id: i64,
    target_status: GameStatus,
    due_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO status_transition_schedule (id, game_id, guild_id, target_status, due_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(game_id)
    .bind(guild_id)
    .bind(target_status)
    .bind(due_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn delete_status_transition_rows(
    conn: impl PgExecutor<'_>,
    game_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM status_transition_schedule WHERE game_id = $1")
        .bind(game_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn next_status_transition_due(
    conn: impl PgExecutor<'_>,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    let row: Option<(DateTime<Utc>,)> =
        sqlx::query_as("SELECT due_at FROM status_transition_schedule ORDER BY due_at LIMIT 1")
            .fetch_optional(conn)
            .await?;
    Ok(row.map(|r| r.0))
}

pub async fn lock_due_status_transition(
    conn: impl PgExecutor<'_>,
) -> Result<Option<StatusTransitionSchedule>, sqlx::Error> {
    sqlx::query_as::<_, StatusTransitionSchedule>(
        r#"
        SELECT id, game_id, guild_id, target_status, due_at, created_at
        FROM status_transition_schedule
        WHERE due_at <= now()
        ORDER BY due_at
        LIMIT 1
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .fetch_optional(conn)
    .await
}

pub async fn delete_status_transition_row(
    conn: impl PgExecutor<'_>,
    id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM status_transition_schedule WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}
