use crate::chat::client::{parse_permissions, snowflake, Client, Permissions};
use crate::error::ApiError;
use crate::types::entities::Guild;

/// Everything authorization needs to know about the requester inside one
/// guild. Built once per request by `require_member`; the pure checks below
/// take it by reference so route handlers never inline membership logic.
#[derive(Debug, Clone)]
pub struct Membership {
    pub guild_id: i64,
    pub discord_id: i64,
    pub role_ids: Vec<i64>,
    /// Guild owner or a role with the platform ADMINISTRATOR bit.
    pub is_admin: bool,
}

/// The membership gate. Non-members get 404, never 403, so probing for
/// other tenants' resource ids discloses nothing.
pub async fn require_member(
    chat: &Client,
    guild_id: i64,
    discord_id: i64,
) -> Result<Membership, ApiError> {
    let member = chat
        .guild_member(guild_id, discord_id)
        .await?
        .ok_or(ApiError::NotFound("Guild"))?;

    let role_ids: Vec<i64> = member.roles.iter().filter_map(|r| snowflake(r)).collect();

    let guild = chat.guild(guild_id).await?;
    let is_owner = guild.owner_id.as_deref().and_then(snowflake) == Some(discord_id);

    let is_admin = is_owner
        || chat.guild_roles(guild_id).await?.iter().any(|role| {
            snowflake(&role.id).is_some_and(|id| role_ids.contains(&id))
                && parse_permissions(role.permissions.as_deref())
                    .contains(Permissions::ADMINISTRATOR)
        });

    Ok(Membership {
        guild_id,
        discord_id,
        role_ids,
        is_admin,
    })
}

pub fn is_bot_manager(membership: &Membership, guild: &Guild) -> bool {
    membership.is_admin
        || guild
            .bot_manager_role_ids
            .iter()
            .any(|role| membership.role_ids.contains(role))
}

/// Mutations on guild-level resources: bot-manager role or platform admin.
pub fn require_manager(membership: &Membership, guild: &Guild) -> Result<(), ApiError> {
    if is_bot_manager(membership, guild) {
        return Ok(());
    }
    Err(ApiError::Forbidden)
}

/// Mutations on a specific game: its host, a bot-manager, or an admin.
pub fn require_game_manager(
    membership: &Membership,
    guild: &Guild,
    host_discord_id: Option<i64>,
) -> Result<(), ApiError> {
    if host_discord_id == Some(membership.discord_id) || is_bot_manager(membership, guild) {
        return Ok(());
    }
    Err(ApiError::Forbidden)
}

/// Player-role visibility filter from the game's template. An empty role list
/// means visible to every member. Deliberately a generic 403: the requester
/// is a member, so existence is no secret, but the content stays gated.
pub fn require_player_visibility(
    membership: &Membership,
    allowed_player_role_ids: &[i64],
) -> Result<(), ApiError> {
    if can_view(membership, allowed_player_role_ids) {
        return Ok(());
    }
    Err(ApiError::Forbidden)
}

pub fn can_view(membership: &Membership, allowed_player_role_ids: &[i64]) -> bool {
    membership.is_admin
        || allowed_player_role_ids.is_empty()
        || allowed_player_role_ids
            .iter()
            .any(|role| membership.role_ids.contains(role))
}

/// Host-role gate for creating games from a template. With no template
/// restriction, the guild-level `require_host_role` flag falls back to the
/// bot-manager check.
pub fn can_host(membership: &Membership, guild: &Guild, allowed_host_role_ids: &[i64]) -> bool {
    if membership.is_admin {
        return true;
    }
    if !allowed_host_role_ids.is_empty() {
        return allowed_host_role_ids
            .iter()
            .any(|role| membership.role_ids.contains(role));
    }
    if guild.require_host_role {
        return is_bot_manager(membership, guild);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn membership(role_ids: Vec<i64>, is_admin: bool) -> Membership {
        Membership {
            guild_id: 1,
            discord_id: 100,
            role_ids,
            is_admin,
        }
    }

    fn guild(bot_manager_role_ids: Vec<i64>, require_host_role: bool) -> Guild {
        Guild {
            id: 1,
            name: "test".into(),
            bot_manager_role_ids,
            require_host_role,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn bot_manager_requires_a_listed_role_or_admin() {
        let g = guild(vec![7], false);
        assert!(is_bot_manager(&membership(vec![7], false), &g));
        assert!(is_bot_manager(&membership(vec![], true), &g));
        assert!(!is_bot_manager(&membership(vec![8], false), &g));
    }

    #[test]
    fn game_manager_accepts_the_host() {
        let g = guild(vec![], false);
        let m = membership(vec![], false);
        assert!(require_game_manager(&m, &g, Some(100)).is_ok());
        assert!(require_game_manager(&m, &g, Some(999)).is_err());
        assert!(require_game_manager(&m, &g, None).is_err());
    }

    #[test]
    fn empty_player_role_list_is_visible_to_members() {
        let m = membership(vec![3], false);
        assert!(can_view(&m, &[]));
        assert!(can_view(&m, &[3, 9]));
        assert!(!can_view(&m, &[9]));
        assert!(can_view(&membership(vec![], true), &[9]));
    }

    #[test]
    fn host_gate_prefers_template_roles_over_the_guild_flag() {
        let strict = guild(vec![7], true);
        // Template names roles: only those roles may host.
        assert!(can_host(&membership(vec![5], false), &strict, &[5]));
        assert!(!can_host(&membership(vec![6], false), &strict, &[5]));
        // No template roles + require_host_role: managers only.
        assert!(can_host(&membership(vec![7], false), &strict, &[]));
        assert!(!can_host(&membership(vec![6], false), &strict, &[]));
        // Relaxed guild: any member may host.
        let relaxed = guild(vec![], false);
        assert!(can_host(&membership(vec![], false), &relaxed, &[]));
    }
}
