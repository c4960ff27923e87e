//! Periodic deactivation of idle chats.

use std::sync::Arc;

use tokio::time::MissedTickBehavior;

use crate::service::ChatService;

/// Every `every`, deactivates chats idle for longer than `max_idle`.
///
/// Runs until the task is aborted. Storage failures are logged and the
/// sweep is retried on the next tick.
pub async fn run_deactivation(
    service: Arc<ChatService>,
    max_idle: chrono::Duration,
    every: std::time::Duration,
) {
    tracing::info!(
        max_idle_minutes = max_idle.num_minutes(),
        interval_secs = every.as_secs(),
        "chat deactivation job started"
    );
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if let Err(e) = service.deactivate_inactive(max_idle).await {
            tracing::error!(error = %e, "chat deactivation failed");
        }
    }
}
