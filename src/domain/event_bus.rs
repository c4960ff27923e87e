//! In-process fan-out of chat events.
//!
//! One [`EventBus`] exists per gateway process. Every chat WebSocket holds a
//! receiver and keeps only the events of its own chat, so a chat's group is
//! the set of receivers filtering on its [`super::ChatId`]. Across processes
//! the Redis relay (`jobs::relay`) republishes remote events on this bus.

use tokio::sync::broadcast;

use super::ChatEvent;

/// Broadcast bus for [`ChatEvent`]s.
///
/// Slow receivers lose the oldest events once `capacity` events are
/// buffered; they observe this as `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ChatEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per receiver.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Hands `event` to every current receiver and returns how many there
    /// were. A message stored while nobody listens reaches no one.
    pub fn publish(&self, event: ChatEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Opens a receiver for events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.sender.subscribe()
    }

    /// Number of open receivers: chat sockets plus background consumers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
