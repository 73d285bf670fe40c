use std::time::Duration;

use chrono::Utc;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::watch;

use crate::bus::Publisher;
use crate::db::{self, queries};
use crate::types::entities::GameStatus;
use crate::types::events::{Event, EventKind};

const LISTEN_CHANNEL: &str = "status_schedule_changed";
const FAILURE_BACKOFF: Duration = Duration::from_secs(5);

/// Status-transition daemon: flips games to `in_progress` / `completed` at
/// their scheduled instants and announces the change on the bus. Same loop
/// shape as the notification daemon; the extra step is the status column
/// update inside the fire transaction.
pub async fn run(
    pool: PgPool,
    publisher: Publisher,
    safety_tick: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut listener = PgListener::connect_with(&pool).await?;
    listener.listen(LISTEN_CHANNEL).await?;
    tracing::info!(channel = LISTEN_CHANNEL, "Status-transition daemon listening");

    while !super::shutdown_requested(&shutdown) {
        let next_due = queries::next_status_transition_due(&pool).await?;

        match next_due {
            Some(due) if due <= Utc::now() => {
                if let Err(e) = fire_one(&pool, &publisher).await {
                    tracing::error!(error = %e, "Status transition failed, backing off");
                    tokio::time::sleep(FAILURE_BACKOFF).await;
                }
            }
            other => {
                super::wait_for_work(&mut listener, other, safety_tick, &mut shutdown).await;
            }
        }
    }

    tracing::info!("Status-transition daemon stopped");
    Ok(())
}

async fn fire_one(pool: &PgPool, publisher: &Publisher) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;

    let Some(row) = queries::lock_due_status_transition(&mut *tx).await? else {
        return Ok(());
    };

    // The games table sits behind the isolation policy even for daemons.
    db::bind_guild(&mut tx, row.guild_id).await?;

    let game = queries::get_game(&mut *tx, row.game_id).await?;
    let Some(game) = game else {
        // Game deleted out from under the row; clear it and move on.
        queries::delete_status_transition_row(&mut *tx, row.id).await?;
        tx.commit().await?;
        return Ok(());
    };

    // A cancelled game fires nothing; the API already published
    // game.cancelled and normally clears these rows in the same transaction.
    if game.status == GameStatus::Cancelled {
        queries::delete_status_transition_row(&mut *tx, row.id).await?;
        tx.commit().await?;
        return Ok(());
    }

    let kind = match row.target_status {
        GameStatus::InProgress => EventKind::GameStarted { game_id: row.game_id },
        GameStatus::Completed => EventKind::GameCompleted { game_id: row.game_id },
        _ => {
            tracing::warn!(target = ?row.target_status, "Unexpected transition target, dropping row");
            queries::delete_status_transition_row(&mut *tx, row.id).await?;
            tx.commit().await?;
            return Ok(());
        }
    };

    // Status events have no TTL: they must always be delivered eventually.
    publisher.publish(&Event::new(row.guild_id, kind)).await?;

    queries::set_game_status(&mut *tx, row.game_id, row.target_status).await?;
    queries::delete_status_transition_row(&mut *tx, row.id).await?;
    tx.commit().await?;

    tracing::info!(
        game_id = %row.game_id,
        target = ?row.target_status,
        due_at = %row.due_at,
        "Fired status transition"
    );
    Ok(())
}
