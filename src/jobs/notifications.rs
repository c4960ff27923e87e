//! Outbound notifications for stored chat messages.
//!
//! Support answers reach the user as an Expo push notification on every
//! registered device. User messages reach support as an email, sent through
//! an HTTP mail webhook.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::config::ChatConfig;
use crate::domain::ChatEvent;
use crate::persistence::{ChatStore, PushToken};

/// Android channel the push notifications are posted to.
pub const PUSH_CHANNEL_ID: &str = "tech_support";

const DEFAULT_SUBJECT: &str = "Technical support";

/// Notification derived from a stored message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Push a support answer to the user's devices.
    PushToUser {
        /// Recipient.
        user_id: i64,
        /// Notification body.
        body: String,
    },
    /// Mail a user message to the support address.
    EmailToAdmin {
        /// Mail subject (chat title).
        subject: String,
        /// Mail body.
        body: String,
    },
}

impl Notification {
    /// Maps a domain event to the notification it triggers.
    #[must_use]
    pub fn for_event(event: &ChatEvent) -> Self {
        match event {
            ChatEvent::MessagePosted {
                user_id,
                chat_title,
                message,
                ..
            } => {
                if message.from_user {
                    Self::EmailToAdmin {
                        subject: chat_title
                            .clone()
                            .filter(|t| !t.is_empty())
                            .unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
                        body: message.message_text.clone(),
                    }
                } else {
                    Self::PushToUser {
                        user_id: *user_id,
                        body: message.message_text.clone(),
                    }
                }
            }
        }
    }
}

/// Localized push title.
#[must_use]
pub fn push_title(language: &str) -> &'static str {
    match language {
        "en" => "Technical support",
        _ => "Технічна підтримка",
    }
}

/// Returns `true` for tokens in Expo's `ExponentPushToken[...]` format.
#[must_use]
pub fn is_expo_token(token: &str) -> bool {
    (token.starts_with("ExponentPushToken[") || token.starts_with("ExpoPushToken["))
        && token.ends_with(']')
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExpoPushMessage<'a> {
    to: &'a str,
    title: &'a str,
    body: &'a str,
    data: Value,
    channel_id: &'a str,
    sound: &'a str,
}

#[derive(Debug, Serialize)]
struct MailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    body: &'a str,
}

/// Outcome of a single push attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Expo accepted the ticket.
    Delivered,
    /// The token is unknown to Expo and should be forgotten.
    InvalidToken,
    /// Expo rejected the message for another reason.
    Rejected,
}

/// Classifies an Expo push response body.
#[must_use]
pub fn classify_push_response(body: &Value) -> PushOutcome {
    let ticket = match body.get("data") {
        Some(Value::Array(tickets)) => tickets.first(),
        other => other,
    };
    let Some(ticket) = ticket else {
        return PushOutcome::Rejected;
    };
    match ticket.get("status").and_then(Value::as_str) {
        Some("ok") => PushOutcome::Delivered,
        _ => {
            let error = ticket
                .get("details")
                .and_then(|d| d.get("error"))
                .and_then(Value::as_str);
            if error == Some("DeviceNotRegistered") {
                PushOutcome::InvalidToken
            } else {
                PushOutcome::Rejected
            }
        }
    }
}

/// Consumes [`ChatEvent`]s and delivers the matching [`Notification`]s.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    store: ChatStore,
    client: reqwest::Client,
    expo_push_url: String,
    mail_webhook_url: Option<String>,
    fallback_admin_email: Option<String>,
    from_email: String,
}

impl NotificationDispatcher {
    /// Builds a dispatcher from the notification settings.
    #[must_use]
    pub fn from_config(config: &ChatConfig, store: ChatStore) -> Self {
        Self {
            store,
            client: reqwest::Client::new(),
            expo_push_url: config.expo_push_url.clone(),
            mail_webhook_url: config.mail_webhook_url.clone(),
            fallback_admin_email: config.fallback_admin_email.clone(),
            from_email: config.default_from_email.clone(),
        }
    }

    /// Delivers notifications until the event bus closes.
    ///
    /// Each notification is delivered on its own task so a slow upstream
    /// never holds back the event stream.
    pub async fn run(self, mut rx: broadcast::Receiver<ChatEvent>) {
        tracing::info!("notification dispatcher started");
        loop {
            match rx.recv().await {
                Ok(event) if !event.is_local() => {
                    tracing::trace!(chat_id = %event.chat_id(), "relayed event; notified by its origin");
                }
                Ok(event) => {
                    let notification = Notification::for_event(&event);
                    let dispatcher = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = dispatcher.deliver(notification).await {
                            tracing::error!(error = %e, "notification delivery failed");
                        }
                    });
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "notification dispatcher lagged behind event bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::debug!("notification dispatcher stopped");
    }

    /// Delivers a single notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or the mail webhook
    /// fails. Individual push failures are logged, not returned.
    pub async fn deliver(&self, notification: Notification) -> anyhow::Result<()> {
        match notification {
            Notification::PushToUser { user_id, body } => self.push_to_user(user_id, &body).await,
            Notification::EmailToAdmin { subject, body } => {
                self.email_admin(&subject, &body).await
            }
        }
    }

    async fn push_to_user(&self, user_id: i64, body: &str) -> anyhow::Result<()> {
        let tokens = self.store.push_tokens_for_user(user_id).await?;
        tracing::info!(user_id, devices = tokens.len(), "sending support push");

        for token in tokens {
            if let Err(e) = self.push_to_device(&token, body).await {
                tracing::error!(user_id, error = %e, "push to device failed");
            }
        }
        Ok(())
    }

    async fn push_to_device(&self, token: &PushToken, body: &str) -> anyhow::Result<()> {
        let outcome = if is_expo_token(&token.token) {
            self.push_one(token, body).await
        } else {
            PushOutcome::InvalidToken
        };
        if outcome == PushOutcome::InvalidToken {
            tracing::error!(token = %token.token, "push token is invalid; deleting");
            self.store.delete_push_token(&token.token).await?;
        }
        Ok(())
    }

    async fn push_one(&self, token: &PushToken, body: &str) -> PushOutcome {
        let message = ExpoPushMessage {
            to: &token.token,
            title: push_title(&token.language),
            body,
            data: Value::Object(serde_json::Map::new()),
            channel_id: PUSH_CHANNEL_ID,
            sound: "default",
        };
        let response = match self
            .client
            .post(&self.expo_push_url)
            .json(&message)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "push request failed");
                return PushOutcome::Rejected;
            }
        };
        match response.json::<Value>().await {
            Ok(body) => {
                let outcome = classify_push_response(&body);
                if outcome == PushOutcome::Rejected {
                    tracing::warn!(response = %body, "push rejected");
                }
                outcome
            }
            Err(e) => {
                tracing::error!(error = %e, "unreadable push response");
                PushOutcome::Rejected
            }
        }
    }

    async fn email_admin(&self, subject: &str, body: &str) -> anyhow::Result<()> {
        let stored = self.store.admin_email().await?;
        let Some(to) = stored.or_else(|| self.fallback_admin_email.clone()) else {
            tracing::warn!("support admin email not configured; message not mailed");
            return Ok(());
        };
        let Some(url) = &self.mail_webhook_url else {
            tracing::warn!(to = %to, subject, "mail webhook not configured; message not mailed");
            return Ok(());
        };

        let request = MailRequest {
            from: &self.from_email,
            to: [to.as_str()],
            subject,
            body,
        };
        self.client
            .post(url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        tracing::info!(to = %to, subject, "support email sent");
        Ok(())
    }
}
