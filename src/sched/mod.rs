pub mod notifications;
pub mod retry;
pub mod transitions;

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgListener;
use tokio::sync::watch;

/// Park until there is plausibly work: the next due instant arrives, a LISTEN
/// notification lands, the safety tick elapses, or shutdown is requested.
/// The notification is a pure hint; the caller re-queries on wake, so a lost
/// NOTIFY costs at most one safety tick of latency.
pub async fn wait_for_work(
    listener: &mut PgListener,
    next_due: Option<DateTime<Utc>>,
    safety_tick: Duration,
    shutdown: &mut watch::Receiver<bool>,
) {
    let sleep_for = match next_due {
        None => safety_tick,
        Some(due) => (due - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            .min(safety_tick),
    };
    if sleep_for.is_zero() {
        return;
    }

    tokio::select! {
        result = tokio::time::timeout(sleep_for, listener.recv()) => {
            if let Ok(Err(e)) = result {
                // PgListener re-establishes its connection on the next recv;
                // treat the error as a spurious wake-up.
                tracing::warn!(error = %e, "LISTEN connection hiccup");
            }
        }
        _ = shutdown.changed() => {}
    }
}

pub fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// SIGTERM/ctrl-c to a watch flag. Daemons poll it between row fires, so an
/// in-flight fire always completes before exit.
pub fn shutdown_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        tracing::info!("Shutdown requested");
        let _ = tx.send(true);
    });
    rx
}
