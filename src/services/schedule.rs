use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgConnection;
use uuid::Uuid;

use crate::db::queries;
use crate::types::entities::{Game, GameStatus, NotificationType};

/// Delay between a join and its notification fire. Gives a burst of joins a
/// chance to coalesce before the host hears about them.
pub const JOIN_NOTIFICATION_DELAY_SECS: i64 = 60;

pub fn reminder_due_at(scheduled_at: DateTime<Utc>, offset_minutes: i32) -> DateTime<Utc> {
    scheduled_at - Duration::minutes(offset_minutes as i64)
}

/// Insert the full schedule for a freshly created game: one reminder row per
/// offset, plus the start and end status transitions. Runs on the caller's
/// transaction so the rows never exist without the game row.
pub async fn populate_for_game(conn: &mut PgConnection, game: &Game) -> Result<(), sqlx::Error> {
    insert_reminder_rows(conn, game).await?;
    insert_status_rows(conn, game).await?;
    Ok(())
}

/// A reschedule or reminder-list change invalidates every timed row; drop and
/// rebuild them in the mutation's transaction. The statement-level trigger
/// wakes the daemons once the transaction commits.
pub async fn replace_for_game(conn: &mut PgConnection, game: &Game) -> Result<(), sqlx::Error> {
    queries::delete_reminder_rows(&mut *conn, game.id).await?;
    queries::delete_status_transition_rows(&mut *conn, game.id).await?;
    insert_reminder_rows(conn, game).await?;
    insert_status_rows(conn, game).await?;
    Ok(())
}

/// Cancellation path: no further fires of any kind for this game.
pub async fn clear_for_game(conn: &mut PgConnection, game_id: Uuid) -> Result<(), sqlx::Error> {
    queries::delete_notification_rows(&mut *conn, game_id).await?;
    queries::delete_status_transition_rows(&mut *conn, game_id).await?;
    Ok(())
}

/// Queue a join notification for one participant. Fires after a short delay;
/// the per-message TTL derived from `game_scheduled_at` drops it if the game
/// starts first.
pub async fn schedule_join_notification(
    conn: &mut PgConnection,
    game: &Game,
    participant_id: Uuid,
) -> Result<(), sqlx::Error> {
    queries::insert_notification_row(
        &mut *conn,
        Uuid::now_v7(),
        game.id,
        game.guild_id,
        NotificationType::JoinNotification,
        Some(participant_id),
        0,
        Utc::now() + Duration::seconds(JOIN_NOTIFICATION_DELAY_SECS),
        game.scheduled_at,
    )
    .await
}

async fn insert_reminder_rows(conn: &mut PgConnection, game: &Game) -> Result<(), sqlx::Error> {
    for &offset in &game.reminder_minutes {
        queries::insert_notification_row(
            &mut *conn,
            Uuid::now_v7(),
            game.id,
            game.guild_id,
            NotificationType::Reminder,
            None,
            offset,
            reminder_due_at(game.scheduled_at, offset),
            game.scheduled_at,
        )
        .await?;
    }
    Ok(())
}

async fn insert_status_rows(conn: &mut PgConnection, game: &Game) -> Result<(), sqlx::Error> {
    queries::insert_status_transition_row(
        &mut *conn,
        Uuid::now_v7(),
        game.id,
        game.guild_id,
        GameStatus::InProgress,
        game.scheduled_at,
    )
    .await?;
    queries::insert_status_transition_row(
        &mut *conn,
        Uuid::now_v7(),
        game.id,
        game.guild_id,
        GameStatus::Completed,
        game.ends_at(),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reminder_due_precedes_start_by_the_offset() {
        let start = DateTime::<Utc>::from_timestamp(1_751_659_200, 0).unwrap(); // 2025-07-04T20:00Z
        assert_eq!(
            reminder_due_at(start, 60),
            DateTime::<Utc>::from_timestamp(1_751_655_600, 0).unwrap()
        );
        assert_eq!(
            reminder_due_at(start, 15),
            DateTime::<Utc>::from_timestamp(1_751_658_300, 0).unwrap()
        );
    }

    #[test]
    fn oversized_offset_lands_in_the_past_and_stays_there() {
        // The daemon fires past-due rows immediately; the zero TTL then drops
        // the message if the game already started.
        let start = Utc::now() + Duration::minutes(5);
        let due = reminder_due_at(start, 120);
        assert!(due < Utc::now());
    }
}
