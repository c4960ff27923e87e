//! Redis pub/sub relay between gateway processes.
//!
//! Each process fans events out to its own sockets through the local
//! [`EventBus`]. With several `web` replicas, the user and the admin of a
//! chat may be connected to different processes, so every locally stored
//! message is also published on a Redis channel and every process
//! republishes the messages of its peers on its own bus.

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::{ChatEvent, ChatId, ChatMessage, EventBus, EventOrigin};

/// Pause before reconnecting after a Redis failure.
const RECONNECT_DELAY: std::time::Duration = std::time::Duration::from_secs(2);

/// Message as it travels between processes.
#[derive(Debug, Serialize, Deserialize)]
struct RelayedMessage {
    id: i64,
    message_text: String,
    created_at: DateTime<Utc>,
    from_user: bool,
    file: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RelayEnvelope {
    origin: Uuid,
    chat_id: ChatId,
    user_id: i64,
    chat_title: Option<String>,
    message: RelayedMessage,
}

/// Encodes local events for the channel and decodes the events of peers.
#[derive(Debug, Clone, Copy)]
pub struct RelayCodec {
    origin: Uuid,
}

impl RelayCodec {
    /// Codec for a process identified by `origin`.
    #[must_use]
    pub const fn new(origin: Uuid) -> Self {
        Self { origin }
    }

    /// Serializes a locally stored event. Relayed events are never sent
    /// back out.
    #[must_use]
    pub fn encode(&self, event: &ChatEvent) -> Option<String> {
        if !event.is_local() {
            return None;
        }
        let ChatEvent::MessagePosted {
            chat_id,
            user_id,
            chat_title,
            message,
            ..
        } = event;
        let envelope = RelayEnvelope {
            origin: self.origin,
            chat_id: *chat_id,
            user_id: *user_id,
            chat_title: chat_title.clone(),
            message: RelayedMessage {
                id: message.id,
                message_text: message.message_text.clone(),
                created_at: message.created_at,
                from_user: message.from_user,
                file: message.file.clone(),
            },
        };
        serde_json::to_string(&envelope).ok()
    }

    /// Parses a channel payload. Returns `None` for this process's own
    /// messages, which its sockets already received.
    ///
    /// # Errors
    ///
    /// Returns the JSON error for a payload that is not an envelope.
    pub fn decode(&self, payload: &str) -> Result<Option<ChatEvent>, serde_json::Error> {
        let envelope: RelayEnvelope = serde_json::from_str(payload)?;
        if envelope.origin == self.origin {
            return Ok(None);
        }
        let RelayEnvelope {
            chat_id,
            user_id,
            chat_title,
            message,
            ..
        } = envelope;
        Ok(Some(ChatEvent::MessagePosted {
            chat_id,
            user_id,
            chat_title,
            message: ChatMessage {
                id: message.id,
                chat_id,
                message_text: message.message_text,
                created_at: message.created_at,
                from_user: message.from_user,
                file: message.file,
            },
            origin: EventOrigin::Relayed,
        }))
    }
}

/// Bridges the local [`EventBus`] and a Redis channel.
#[derive(Debug, Clone)]
pub struct RedisRelay {
    client: redis::Client,
    channel: String,
    bus: EventBus,
    codec: RelayCodec,
}

impl RedisRelay {
    /// Creates a relay for `bus` on `channel` of the Redis server at `url`.
    ///
    /// # Errors
    ///
    /// Returns the Redis error for a malformed URL. No connection is made.
    pub fn new(url: &str, channel: impl Into<String>, bus: EventBus) -> redis::RedisResult<Self> {
        Ok(Self {
            client: redis::Client::open(url)?,
            channel: channel.into(),
            bus,
            codec: RelayCodec::new(Uuid::new_v4()),
        })
    }

    /// Runs both directions until the event bus closes. Connection failures
    /// are logged and retried.
    pub async fn run(self) {
        tracing::info!(channel = %self.channel, "redis relay started");
        let rx = self.bus.subscribe();
        tokio::join!(self.forward_local(rx), self.republish_remote());
    }

    async fn forward_local(&self, mut rx: broadcast::Receiver<ChatEvent>) {
        loop {
            let mut conn = match self.client.get_multiplexed_tokio_connection().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "redis unavailable; retrying");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            };
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let Some(payload) = self.codec.encode(&event) else {
                            continue;
                        };
                        let sent: redis::RedisResult<i64> =
                            conn.publish(&self.channel, payload).await;
                        if let Err(e) = sent {
                            tracing::error!(chat_id = %event.chat_id(), error = %e, "redis publish failed");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "redis relay lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        }
    }

    async fn republish_remote(&self) {
        loop {
            let mut pubsub = match self.client.get_async_pubsub().await {
                Ok(pubsub) => pubsub,
                Err(e) => {
                    tracing::warn!(error = %e, "redis unavailable; retrying");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            };
            if let Err(e) = pubsub.subscribe(&self.channel).await {
                tracing::warn!(error = %e, "redis subscribe failed; retrying");
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }

            let mut messages = pubsub.on_message();
            while let Some(msg) = messages.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!(error = %e, "unreadable relay payload");
                        continue;
                    }
                };
                match self.codec.decode(&payload) {
                    Ok(Some(event)) => {
                        self.bus.publish(event);
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!(error = %e, "malformed relay payload"),
                }
            }
            tracing::warn!("redis subscription ended; reconnecting");
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn local_event(text: &str) -> ChatEvent {
        ChatEvent::MessagePosted {
            chat_id: ChatId::new(3),
            user_id: 30,
            chat_title: Some("Login".to_string()),
            message: ChatMessage {
                id: 11,
                chat_id: ChatId::new(3),
                message_text: text.to_string(),
                created_at: Utc::now(),
                from_user: true,
                file: Some("/media/technical_support_files/a_b.png".to_string()),
            },
            origin: EventOrigin::Local,
        }
    }

    #[test]
    fn peer_messages_arrive_as_relayed_events_of_the_same_chat() {
        let here = RelayCodec::new(Uuid::new_v4());
        let peer = RelayCodec::new(Uuid::new_v4());

        let Some(payload) = peer.encode(&local_event("cannot log in")) else {
            panic!("local event not encoded");
        };
        let Ok(Some(event)) = here.decode(&payload) else {
            panic!("peer payload rejected");
        };

        assert!(event.is_for_chat(ChatId::new(3)));
        assert!(!event.is_local());
        let ChatEvent::MessagePosted { message, user_id, .. } = event;
        assert_eq!(user_id, 30);
        assert_eq!(message.chat_id, ChatId::new(3));
        assert_eq!(message.message_text, "cannot log in");
        assert_eq!(message.file.as_deref(), Some("/media/technical_support_files/a_b.png"));
    }

    #[test]
    fn own_messages_are_not_delivered_twice() {
        let here = RelayCodec::new(Uuid::new_v4());
        let Some(payload) = here.encode(&local_event("hi")) else {
            panic!("local event not encoded");
        };
        assert!(matches!(here.decode(&payload), Ok(None)));
    }

    #[test]
    fn relayed_events_are_not_sent_back_out() {
        let here = RelayCodec::new(Uuid::new_v4());
        let peer = RelayCodec::new(Uuid::new_v4());
        let payload = peer.encode(&local_event("hi")).unwrap_or_default();
        let Ok(Some(relayed)) = here.decode(&payload) else {
            panic!("peer payload rejected");
        };
        assert!(here.encode(&relayed).is_none());
    }

    #[test]
    fn malformed_payloads_are_errors() {
        let here = RelayCodec::new(Uuid::new_v4());
        assert!(here.decode("{\"chat\":1}").is_err());
    }

    #[test]
    fn relay_accepts_redis_urls_without_connecting() {
        let bus = EventBus::new(4);
        assert!(RedisRelay::new("redis://:secret@127.0.0.1:6379", "chat_events", bus.clone()).is_ok());
        assert!(RedisRelay::new("not a url", "chat_events", bus).is_err());
    }
}
