use std::time::Duration;

use chrono::Utc;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::watch;

use crate::bus::publisher::{ttl_ms_until, Publisher};
use crate::db::queries;
use crate::types::entities::NotificationType;
use crate::types::events::{Event, EventKind};

const LISTEN_CHANNEL: &str = "notification_schedule_changed";
const FAILURE_BACKOFF: Duration = Duration::from_secs(5);

/// Notification daemon: fires due notification-schedule rows as
/// `notification.due` events. Single instance; all progress is the table
/// itself, so a crash at any point is recovered by the first query after
/// restart.
pub async fn run(
    pool: PgPool,
    publisher: Publisher,
    safety_tick: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut listener = PgListener::connect_with(&pool).await?;
    listener.listen(LISTEN_CHANNEL).await?;
    tracing::info!(channel = LISTEN_CHANNEL, "Notification daemon listening");

    while !super::shutdown_requested(&shutdown) {
        let next_due = queries::next_notification_due(&pool).await?;

        match next_due {
            Some(due) if due <= Utc::now() => {
                if let Err(e) = fire_one(&pool, &publisher).await {
                    tracing::error!(error = %e, "Notification fire failed, backing off");
                    tokio::time::sleep(FAILURE_BACKOFF).await;
                }
            }
            other => {
                super::wait_for_work(&mut listener, other, safety_tick, &mut shutdown).await;
            }
        }
    }

    tracing::info!("Notification daemon stopped");
    Ok(())
}

/// One row, one transaction: re-read under SKIP LOCKED, publish with broker
/// confirm, then delete. Publish failure rolls everything back; a crash
/// after the confirm but before the commit redelivers, and the gateway's
/// idempotent handlers absorb the duplicate.
async fn fire_one(pool: &PgPool, publisher: &Publisher) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;

    let Some(row) = queries::lock_due_notification(&mut *tx).await? else {
        // Raced another instance to the row; nothing to do.
        return Ok(());
    };

    let kind = match row.notification_type {
        NotificationType::Reminder => EventKind::NotificationDue {
            game_id: row.game_id,
            notification_type: NotificationType::Reminder,
            offset_minutes: Some(row.offset_minutes),
            participant_id: None,
        },
        NotificationType::JoinNotification => EventKind::NotificationDue {
            game_id: row.game_id,
            notification_type: NotificationType::JoinNotification,
            offset_minutes: None,
            participant_id: row.participant_id,
        },
    };
    let event = Event::new(row.guild_id, kind);

    // Messages about a game that already started are worthless; the broker
    // drops them at TTL zero without any consumer seeing them.
    let ttl = ttl_ms_until(row.game_scheduled_at, Utc::now());
    publisher.publish_with_ttl(&event, Some(ttl)).await?;

    queries::delete_notification_row(&mut *tx, row.id).await?;
    tx.commit().await?;

    tracing::info!(
        game_id = %row.game_id,
        notification_type = ?row.notification_type,
        due_at = %row.due_at,
        ttl_ms = ttl,
        "Fired notification"
    );
    Ok(())
}
