//! Background jobs running next to the HTTP server.
//!
//! - [`notifications`]: turns stored messages into a push notification for
//!   the user or an email to support.
//! - [`deactivation`]: periodically closes conversations nobody has written
//!   to for a while.
//! - [`relay`]: shares chat events with the other gateway processes through
//!   Redis.

pub mod deactivation;
pub mod notifications;
pub mod relay;

use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinHandle;

use crate::config::ChatConfig;
use crate::service::ChatService;

pub use deactivation::run_deactivation;
pub use notifications::{Notification, NotificationDispatcher};
pub use relay::RedisRelay;

/// Spawns every background job and returns their handles.
///
/// # Errors
///
/// Returns an error if the configured Redis URL is malformed.
pub fn spawn_all(
    config: &ChatConfig,
    service: &Arc<ChatService>,
) -> anyhow::Result<Vec<JoinHandle<()>>> {
    let mut handles = Vec::with_capacity(3);

    handles.push(tokio::spawn(run_deactivation(
        Arc::clone(service),
        chrono::Duration::minutes(config.chat_time_life_minutes),
        std::time::Duration::from_secs(config.deactivation_interval_secs.max(1)),
    )));

    if config.notifications_enabled {
        let dispatcher = NotificationDispatcher::from_config(config, service.store().clone());
        let rx = service.event_bus().subscribe();
        handles.push(tokio::spawn(dispatcher.run(rx)));
    } else {
        tracing::info!("notifications disabled");
    }

    match &config.redis_url {
        Some(url) => {
            let relay = RedisRelay::new(
                url,
                config.redis_channel.clone(),
                service.event_bus().clone(),
            )
            .context("invalid redis url")?;
            handles.push(tokio::spawn(relay.run()));
        }
        None => tracing::info!("redis relay disabled; chat events stay in this process"),
    }

    Ok(handles)
}
