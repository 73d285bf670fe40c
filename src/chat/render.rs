use serde_json::{json, Value};

use crate::services::ordering::Partition;
use crate::types::entities::{Game, GameStatus, ParticipantWithUser, SignupMethod};

const COLOR_SCHEDULED: u32 = 0x57F287;
const COLOR_IN_PROGRESS: u32 = 0xFEE75C;
const COLOR_FINISHED: u32 = 0x99AAB5;
const COLOR_CANCELLED: u32 = 0xED4245;

/// Render the announcement message for a game. Pure: given the same game and
/// partition this produces identical JSON, which is what makes message-update
/// handlers replayable.
pub fn game_message(
    game: &Game,
    partition: &Partition<ParticipantWithUser>,
    frontend_url: &str,
) -> Value {
    json!({
        "embeds": [embed(game, partition, frontend_url)],
        "components": [button_row(game)],
    })
}

/// Role pings for the initial announcement only; edits must not re-ping.
pub fn notify_content(game: &Game) -> Option<String> {
    if game.notify_role_ids.is_empty() {
        return None;
    }
    Some(
        game.notify_role_ids
            .iter()
            .map(|id| format!("<@&{id}>"))
            .collect::<Vec<_>>()
            .join(" "),
    )
}

fn embed(game: &Game, partition: &Partition<ParticipantWithUser>, frontend_url: &str) -> Value {
    let mut fields = vec![json!({
        "name": "When",
        "value": format!(
            "<t:{0}:F> to <t:{1}:t>",
            game.scheduled_at.timestamp(),
            game.ends_at().timestamp()
        ),
        "inline": false,
    })];

    if let Some(ref location) = game.location {
        fields.push(json!({ "name": "Where", "value": location, "inline": true }));
    }

    fields.push(json!({
        "name": format!("Players ({}/{})", partition.confirmed().len(), game.max_players),
        "value": seat_lines(partition.confirmed()),
        "inline": false,
    }));

    if !partition.overflow().is_empty() {
        fields.push(json!({
            "name": "Waitlist",
            "value": seat_lines(partition.overflow()),
            "inline": false,
        }));
    }

    if let Some(ref instructions) = game.signup_instructions {
        fields.push(json!({ "name": "How to join", "value": instructions, "inline": false }));
    }

    let mut embed = json!({
        "title": game.title,
        "url": format!("{}/download-calendar/{}", frontend_url.trim_end_matches('/'), game.id),
        "color": status_color(game.status),
        "fields": fields,
        "footer": { "text": status_line(game) },
    });

    if let Some(ref description) = game.description {
        embed["description"] = json!(description);
    }
    embed
}

fn seat_lines(seats: &[ParticipantWithUser]) -> String {
    if seats.is_empty() {
        return "*No one yet*".into();
    }
    seats
        .iter()
        .map(|seat| format!("{} {}", tier_marker(seat), seat_label(seat)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn tier_marker(seat: &ParticipantWithUser) -> &'static str {
    use crate::types::entities::PositionType;
    match seat.position_type {
        PositionType::Host => "👑",
        PositionType::Cohost => "🎖️",
        PositionType::Regular => "▫️",
        PositionType::Placeholder => "▪️",
    }
}

fn seat_label(seat: &ParticipantWithUser) -> String {
    if let Some(discord_id) = seat.discord_id {
        return format!("<@{discord_id}>");
    }
    if let Some(ref mention) = seat.mention {
        return mention.clone();
    }
    if let Some(ref name) = seat.display_name {
        return name.clone();
    }
    seat.username.clone().unwrap_or_else(|| "unknown".into())
}

fn button_row(game: &Game) -> Value {
    let joinable =
        game.status == GameStatus::Scheduled && game.signup_method == SignupMethod::SelfSignup;
    let leavable = game.status == GameStatus::Scheduled;

    json!({
        "type": 1,
        "components": [
            {
                "type": 2,
                "style": 3,
                "label": "Join",
                "custom_id": format!("join:{}", game.id),
                "disabled": !joinable,
            },
            {
                "type": 2,
                "style": 4,
                "label": "Leave",
                "custom_id": format!("leave:{}", game.id),
                "disabled": !leavable,
            },
        ],
    })
}

fn status_color(status: GameStatus) -> u32 {
    match status {
        GameStatus::Scheduled => COLOR_SCHEDULED,
        GameStatus::InProgress => COLOR_IN_PROGRESS,
        GameStatus::Completed => COLOR_FINISHED,
        GameStatus::Cancelled => COLOR_CANCELLED,
    }
}

fn status_line(game: &Game) -> &'static str {
    match game.status {
        GameStatus::Scheduled => "Scheduled",
        GameStatus::InProgress => "In progress",
        GameStatus::Completed => "Finished",
        GameStatus::Cancelled => "Cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ordering::partition;
    use crate::types::entities::PositionType;
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    fn game(status: GameStatus, signup_method: SignupMethod) -> Game {
        Game {
            id: Uuid::nil(),
            guild_id: 1,
            template_id: Uuid::nil(),
            title: "Poker Night".into(),
            description: None,
            signup_instructions: None,
            scheduled_at: DateTime::<Utc>::from_timestamp(1_751_659_200, 0).unwrap(),
            duration_minutes: 120,
            location: None,
            max_players: 4,
            reminder_minutes: vec![],
            notify_role_ids: vec![5, 6],
            status,
            channel_id: 10,
            message_id: None,
            signup_method,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn seat(discord_id: Option<i64>, position_type: PositionType) -> ParticipantWithUser {
        ParticipantWithUser {
            id: Uuid::now_v7(),
            game_id: Uuid::nil(),
            guild_id: 1,
            user_id: discord_id.map(|_| Uuid::new_v4()),
            mention: None,
            position_type,
            position: 0,
            joined_at: Utc::now(),
            discord_id,
            username: discord_id.map(|_| "player".into()),
            display_name: None,
        }
    }

    #[test]
    fn player_count_reflects_confirmed_over_cap() {
        let g = game(GameStatus::Scheduled, SignupMethod::SelfSignup);
        let seats = vec![seat(Some(100), PositionType::Host)];
        let p = partition(&seats, g.max_players);

        let message = game_message(&g, &p, "https://games.example");
        let fields = message["embeds"][0]["fields"].as_array().unwrap();
        assert!(fields
            .iter()
            .any(|f| f["name"] == "Players (1/4)" && f["value"].as_str().unwrap().contains("<@100>")));
    }

    #[test]
    fn waitlist_section_appears_only_with_overflow() {
        let g = game(GameStatus::Scheduled, SignupMethod::SelfSignup);
        let seats = vec![
            seat(Some(1), PositionType::Host),
            seat(Some(2), PositionType::Regular),
        ];

        let roomy = game_message(&g, &partition(&seats, 4), "u");
        let full = game_message(
            &g,
            &partition(&seats, 1),
            "u",
        );

        let has_waitlist = |m: &Value| {
            m["embeds"][0]["fields"]
                .as_array()
                .unwrap()
                .iter()
                .any(|f| f["name"] == "Waitlist")
        };
        assert!(!has_waitlist(&roomy));
        assert!(has_waitlist(&full));
    }

    #[test]
    fn join_button_disabled_for_host_selected_signups() {
        let g = game(GameStatus::Scheduled, SignupMethod::HostSelected);
        let p = partition(&[] as &[ParticipantWithUser], 4);
        let message = game_message(&g, &p, "u");
        let join = &message["components"][0]["components"][0];
        assert_eq!(join["custom_id"], "join:00000000-0000-0000-0000-000000000000");
        assert_eq!(join["disabled"], true);
    }

    #[test]
    fn join_button_disabled_once_the_game_starts() {
        let g = game(GameStatus::InProgress, SignupMethod::SelfSignup);
        let p = partition(&[] as &[ParticipantWithUser], 4);
        let message = game_message(&g, &p, "u");
        assert_eq!(message["components"][0]["components"][0]["disabled"], true);
    }

    #[test]
    fn title_links_to_the_calendar_download() {
        let g = game(GameStatus::Scheduled, SignupMethod::SelfSignup);
        let p = partition(&[] as &[ParticipantWithUser], 4);
        let message = game_message(&g, &p, "https://games.example/");
        assert_eq!(
            message["embeds"][0]["url"],
            "https://games.example/download-calendar/00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn notify_content_pings_each_role_once() {
        let g = game(GameStatus::Scheduled, SignupMethod::SelfSignup);
        assert_eq!(notify_content(&g).unwrap(), "<@&5> <@&6>");
    }
}
