use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ── Guilds (tenants) ───────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Guild {
    /// Chat-platform snowflake. Tenant root; immutable on every owned row.
    pub id: i64,
    pub name: String,
    pub bot_manager_role_ids: Vec<i64>,
    pub require_host_role: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateGuildRequest {
    pub bot_manager_role_ids: Option<Vec<i64>>,
    pub require_host_role: Option<bool>,
}

// ── Users ──────────────────────────────────────────────

/// Projection of a chat-platform user. The platform stays authoritative for
/// names and avatars; only the hash is cached here.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub discord_id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Enums ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "game_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "signup_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SignupMethod {
    SelfSignup,
    HostSelected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "notification_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Reminder,
    JoinNotification,
}

/// Participant tier. Stored as a sparse integer so future tiers can slot in
/// between the existing ones without renumbering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[repr(i32)]
#[serde(rename_all = "snake_case")]
pub enum PositionType {
    Host = 0,
    Cohost = 10,
    Regular = 20,
    Placeholder = 30,
}

// ── Templates ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Template {
    pub id: Uuid,
    pub guild_id: i64,
    pub name: String,
    pub channel_id: i64,
    pub notify_role_ids: Vec<i64>,
    pub allowed_host_role_ids: Vec<i64>,
    pub allowed_player_role_ids: Vec<i64>,
    pub default_max_players: i32,
    pub default_reminder_minutes: Vec<i32>,
    pub default_duration_minutes: i32,
    pub default_location: Option<String>,
    pub default_signup_instructions: Option<String>,
    /// Empty means every signup method is allowed.
    pub allowed_signup_methods: Vec<SignupMethod>,
    pub default_signup_method: SignupMethod,
    /// Field names copied verbatim into new games, non-overridable.
    pub locked_fields: Vec<String>,
    pub is_default: bool,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Template {
    pub fn is_locked(&self, field: &str) -> bool {
        self.locked_fields.iter().any(|f| f == field)
    }

    pub fn allows_signup_method(&self, method: SignupMethod) -> bool {
        self.allowed_signup_methods.is_empty() || self.allowed_signup_methods.contains(&method)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTemplateRequest {
    pub guild_id: i64,
    pub name: String,
    pub channel_id: i64,
    pub notify_role_ids: Option<Vec<i64>>,
    pub allowed_host_role_ids: Option<Vec<i64>>,
    pub allowed_player_role_ids: Option<Vec<i64>>,
    pub default_max_players: i32,
    pub default_reminder_minutes: Option<Vec<i32>>,
    pub default_duration_minutes: i32,
    pub default_location: Option<String>,
    pub default_signup_instructions: Option<String>,
    pub allowed_signup_methods: Option<Vec<SignupMethod>>,
    pub default_signup_method: Option<SignupMethod>,
    pub locked_fields: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTemplateRequest {
    pub name: Option<String>,
    pub channel_id: Option<i64>,
    pub notify_role_ids: Option<Vec<i64>>,
    pub allowed_host_role_ids: Option<Vec<i64>>,
    pub allowed_player_role_ids: Option<Vec<i64>>,
    pub default_max_players: Option<i32>,
    pub default_reminder_minutes: Option<Vec<i32>>,
    pub default_duration_minutes: Option<i32>,
    pub default_location: Option<String>,
    pub default_signup_instructions: Option<String>,
    pub allowed_signup_methods: Option<Vec<SignupMethod>>,
    pub default_signup_method: Option<SignupMethod>,
    pub locked_fields: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ReorderTemplatesRequest {
    pub guild_id: i64,
    /// Every template id of the guild, in the desired order.
    pub template_ids: Vec<Uuid>,
}

// ── Games ──────────────────────────────────────────────

/// Image blobs are fetched separately; they never ride along on game reads.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Game {
    pub id: Uuid,
    pub guild_id: i64,
    pub template_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub signup_instructions: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub location: Option<String>,
    pub max_players: i32,
    pub reminder_minutes: Vec<i32>,
    pub notify_role_ids: Vec<i64>,
    pub status: GameStatus,
    pub channel_id: i64,
    pub message_id: Option<i64>,
    pub signup_method: SignupMethod,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Game {
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.scheduled_at + chrono::Duration::minutes(self.duration_minutes as i64)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateGameRequest {
    pub template_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub signup_instructions: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: Option<i32>,
    pub location: Option<String>,
    pub max_players: Option<i32>,
    pub reminder_minutes: Option<Vec<i32>>,
    pub notify_role_ids: Option<Vec<i64>>,
    pub signup_method: Option<SignupMethod>,
    #[serde(default)]
    pub participants: Vec<ParticipantEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateGameRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub signup_instructions: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub location: Option<String>,
    pub max_players: Option<i32>,
    pub reminder_minutes: Option<Vec<i32>>,
    pub notify_role_ids: Option<Vec<i64>>,
    pub signup_method: Option<SignupMethod>,
    pub participants: Option<Vec<ParticipantEntry>>,
}

#[derive(Debug, Deserialize)]
pub struct ListGamesQuery {
    pub guild_id: i64,
    pub status: Option<GameStatus>,
}

// ── Participants ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Participant {
    pub id: Uuid,
    pub game_id: Uuid,
    pub guild_id: i64,
    /// Null for placeholder slots: a string occupying a confirmed seat.
    pub user_id: Option<Uuid>,
    pub mention: Option<String>,
    pub position_type: PositionType,
    pub position: i32,
    pub joined_at: DateTime<Utc>,
}

/// Participant joined with its cached user projection, for rendering and
/// notification targeting.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ParticipantWithUser {
    pub id: Uuid,
    pub game_id: Uuid,
    pub guild_id: i64,
    pub user_id: Option<Uuid>,
    pub mention: Option<String>,
    pub position_type: PositionType,
    pub position: i32,
    pub joined_at: DateTime<Utc>,
    pub discord_id: Option<i64>,
    pub username: Option<String>,
    pub display_name: Option<String>,
}

/// One participant line of a game-create or game-update submission. `input`
/// is either a chat mention or a free-form placeholder string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantEntry {
    pub input: String,
    pub position_type: PositionType,
    pub position: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct MentionSuggestion {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvalidMention {
    pub input: String,
    pub reason: String,
    pub suggestions: Vec<MentionSuggestion>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateMentionRequest {
    pub entries: Vec<ParticipantEntry>,
}

// ── Schedule rows ──────────────────────────────────────

#[derive(Debug, Clone, FromRow)]
pub struct NotificationSchedule {
    pub id: Uuid,
    pub game_id: Uuid,
    pub guild_id: i64,
    pub notification_type: NotificationType,
    pub participant_id: Option<Uuid>,
    pub offset_minutes: i32,
    pub due_at: DateTime<Utc>,
    /// Snapshot of the game start, used to derive the per-message TTL without
    /// re-reading the game row.
    pub game_scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct StatusTransitionSchedule {
    pub id: Uuid,
    pub game_id: Uuid,
    pub guild_id: i64,
    pub target_status: GameStatus,
    pub due_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
