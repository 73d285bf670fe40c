use chrono::{DateTime, Utc};

use crate::types::entities::Game;

/// Minimal VCALENDAR emission for the calendar download endpoint. One VEVENT
/// per file; the frontend proxies this behind its own auth check.
pub fn render_game(game: &Game) -> String {
    let mut out = String::new();
    out.push_str("BEGIN:VCALENDAR\r\n");
    out.push_str("VERSION:2.0\r\n");
    out.push_str("PRODID:-//gamenight//scheduler//EN\r\n");
    out.push_str("BEGIN:VEVENT\r\n");
    out.push_str(&format!("UID:{}@gamenight\r\n", game.id));
    out.push_str(&format!("DTSTAMP:{}\r\n", format_utc(Utc::now())));
    out.push_str(&format!("DTSTART:{}\r\n", format_utc(game.scheduled_at)));
    out.push_str(&format!("DTEND:{}\r\n", format_utc(game.ends_at())));
    out.push_str(&format!("SUMMARY:{}\r\n", escape_text(&game.title)));
    if let Some(ref description) = game.description {
        out.push_str(&format!("DESCRIPTION:{}\r\n", escape_text(description)));
    }
    if let Some(ref location) = game.location {
        out.push_str(&format!("LOCATION:{}\r\n", escape_text(location)));
    }
    out.push_str("END:VEVENT\r\n");
    out.push_str("END:VCALENDAR\r\n");
    out
}

/// `Content-Disposition` filename: the title with unsafe characters squashed,
/// suffixed with the start date.
pub fn attachment_filename(game: &Game) -> String {
    let safe_title: String = game
        .title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    format!(
        "{}_{}.ics",
        safe_title.trim_matches('_'),
        game.scheduled_at.format("%Y-%m-%d")
    )
}

fn format_utc(instant: DateTime<Utc>) -> String {
    instant.format("%Y%m%dT%H%M%SZ").to_string()
}

fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace(';', "\\;")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::entities::{GameStatus, SignupMethod};
    use uuid::Uuid;

    fn game() -> Game {
        Game {
            id: Uuid::nil(),
            guild_id: 1,
            template_id: Uuid::nil(),
            title: "Poker Night".into(),
            description: Some("Cards, snacks".into()),
            signup_instructions: None,
            scheduled_at: DateTime::<Utc>::from_timestamp(1_751_659_200, 0).unwrap(),
            duration_minutes: 120,
            location: Some("Table 3; back room".into()),
            max_players: 4,
            reminder_minutes: vec![60, 15],
            notify_role_ids: vec![],
            status: GameStatus::Scheduled,
            channel_id: 10,
            message_id: None,
            signup_method: SignupMethod::SelfSignup,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn event_window_spans_start_to_start_plus_duration() {
        let ics = render_game(&game());
        assert!(ics.contains("DTSTART:20250704T200000Z"));
        assert!(ics.contains("DTEND:20250704T220000Z"));
        assert!(ics.contains("SUMMARY:Poker Night"));
        assert!(ics.contains("LOCATION:Table 3\\; back room"));
    }

    #[test]
    fn filename_is_title_and_date() {
        assert_eq!(attachment_filename(&game()), "Poker_Night_2025-07-04.ics");
    }
}
