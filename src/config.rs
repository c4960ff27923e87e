//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). The Compose deployment passes the same
//! `POSTGRES_*` variables to both the database and the gateway, so the
//! connection string is assembled from them when `DATABASE_URL` is absent.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::ChatError;

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`ChatConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:8000`).
    pub listen_addr: SocketAddr,

    /// PostgreSQL connection string.
    pub database_url: String,

    /// Maximum number of database connections in the pool.
    pub database_max_connections: u32,

    /// Minimum idle connections in the pool.
    pub database_min_connections: u32,

    /// Timeout in seconds for acquiring a database connection.
    pub database_connect_timeout_secs: u64,

    /// `false` keeps all chats in memory (local development and tests).
    pub persistence_enabled: bool,

    /// Capacity of the EventBus broadcast channel.
    pub event_bus_capacity: usize,

    /// Redis server relaying chat events between gateway processes.
    /// `None` runs a single process without a relay.
    pub redis_url: Option<String>,

    /// Redis pub/sub channel carrying relayed chat events.
    pub redis_channel: String,

    /// Bearer token granting admin access. Admin endpoints are closed when unset.
    pub admin_api_token: Option<String>,

    /// Public host (and port) the admin widget connects its WebSocket to.
    pub server_domain: String,

    /// Directory attachments are written to.
    pub media_root: PathBuf,

    /// URL prefix attachments are served under.
    pub media_url: String,

    /// Upper bound for a decoded attachment.
    pub attachment_max_bytes: usize,

    /// Minutes without activity after which a chat is deactivated.
    pub chat_time_life_minutes: i64,

    /// Seconds between two deactivation sweeps.
    pub deactivation_interval_secs: u64,

    /// Automatic answer posted when a user opens a new conversation.
    pub auto_reply_text: String,

    /// Fallback support address when none is stored in the database.
    pub fallback_admin_email: Option<String>,

    /// Sender address for support mail.
    pub default_from_email: String,

    /// HTTP endpoint accepting outbound mail as JSON.
    pub mail_webhook_url: Option<String>,

    /// Expo push API endpoint.
    pub expo_push_url: String,

    /// Master switch for push and mail delivery.
    pub notifications_enabled: bool,

    /// Emit logs as JSON lines instead of human-readable text.
    pub log_json: bool,

    /// Per-request timeout for the HTTP API.
    pub request_timeout_secs: u64,
}

impl ChatConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Config`] if `LISTEN_ADDR` or `MEDIA_URL` cannot
    /// be parsed, if `REDIS_HOST` is set without `REDIS_PASSWORD`, or if
    /// persistence is enabled and neither `DATABASE_URL` nor the
    /// `POSTGRES_DB`/`POSTGRES_USER`/`POSTGRES_PASSWORD` triple is set.
    pub fn from_env() -> Result<Self, ChatError> {
        dotenvy::dotenv().ok();

        let raw_addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let listen_addr: SocketAddr = raw_addr
            .parse()
            .map_err(|e| ChatError::Config(format!("invalid LISTEN_ADDR {raw_addr}: {e}")))?;

        let persistence_enabled = parse_env_bool("PERSISTENCE_ENABLED", true);
        let database_url = match std::env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) if persistence_enabled => postgres_url_from_parts()?,
            Err(_) => String::new(),
        };

        let media_root = PathBuf::from(
            std::env::var("MEDIA_ROOT").unwrap_or_else(|_| "./media".to_string()),
        );
        let media_url = normalize_media_url(&std::env::var("MEDIA_URL").unwrap_or_default())?;

        Ok(Self {
            listen_addr,
            database_url,
            database_max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 10),
            database_min_connections: parse_env("DATABASE_MIN_CONNECTIONS", 2),
            database_connect_timeout_secs: parse_env("DATABASE_CONNECT_TIMEOUT_SECS", 5),
            persistence_enabled,
            event_bus_capacity: parse_env("EVENT_BUS_CAPACITY", 10_000),
            redis_url: redis_url_from_env()?,
            redis_channel: std::env::var("REDIS_CHANNEL")
                .unwrap_or_else(|_| DEFAULT_REDIS_CHANNEL.to_string()),
            admin_api_token: non_empty_env("ADMIN_API_TOKEN"),
            server_domain: std::env::var("SERVER_DOMAIN")
                .unwrap_or_else(|_| "localhost:8000".to_string()),
            media_root,
            media_url,
            attachment_max_bytes: parse_env("ATTACHMENT_MAX_BYTES", 20 * 1024 * 1024),
            chat_time_life_minutes: parse_env("TIME_LIFE_CHAT", 30),
            deactivation_interval_secs: parse_env("DEACTIVATION_INTERVAL_SECS", 60),
            auto_reply_text: std::env::var("SUPPORT_AUTO_REPLY")
                .unwrap_or_else(|_| DEFAULT_AUTO_REPLY.to_string()),
            fallback_admin_email: non_empty_env("TECHNICAL_SUPPORT_ADMIN"),
            default_from_email: std::env::var("DEFAULT_FROM_EMAIL")
                .unwrap_or_else(|_| "support@localhost".to_string()),
            mail_webhook_url: non_empty_env("MAIL_WEBHOOK_URL"),
            expo_push_url: std::env::var("EXPO_PUSH_URL")
                .unwrap_or_else(|_| "https://exp.host/--/api/v2/push/send".to_string()),
            notifications_enabled: parse_env_bool("NOTIFICATIONS_ENABLED", true),
            log_json: std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")),
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", 30),
        })
    }

    /// Configuration for tests and local runs: in-memory store, no
    /// outbound notifications.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_url: String::new(),
            database_max_connections: 1,
            database_min_connections: 0,
            database_connect_timeout_secs: 5,
            persistence_enabled: false,
            event_bus_capacity: 1_000,
            redis_url: None,
            redis_channel: DEFAULT_REDIS_CHANNEL.to_string(),
            admin_api_token: None,
            server_domain: "localhost:8000".to_string(),
            media_root: std::env::temp_dir().join("support-chat-media"),
            media_url: DEFAULT_MEDIA_URL.to_string(),
            attachment_max_bytes: 20 * 1024 * 1024,
            chat_time_life_minutes: 30,
            deactivation_interval_secs: 60,
            auto_reply_text: DEFAULT_AUTO_REPLY.to_string(),
            fallback_admin_email: None,
            default_from_email: "support@localhost".to_string(),
            mail_webhook_url: None,
            expo_push_url: "https://exp.host/--/api/v2/push/send".to_string(),
            notifications_enabled: false,
            log_json: false,
            request_timeout_secs: 30,
        }
    }
}

/// URL path attachments are served under when `MEDIA_URL` is unset.
pub const DEFAULT_MEDIA_URL: &str = "/media";

/// Normalizes `MEDIA_URL` to the path prefix attachments are served under.
///
/// The result starts with `/` and has no trailing slash; `"/"` maps to the
/// empty prefix (files served from the site root) and an empty value to
/// [`DEFAULT_MEDIA_URL`]. A Django-style `media/` becomes `/media`.
///
/// # Errors
///
/// Returns [`ChatError::Config`] for absolute URLs and for characters the
/// router treats specially.
pub fn normalize_media_url(raw: &str) -> Result<String, ChatError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(DEFAULT_MEDIA_URL.to_string());
    }
    if raw.contains(|c: char| matches!(c, ':' | '?' | '#' | '{' | '}' | '*') || c.is_whitespace())
    {
        return Err(ChatError::Config(format!(
            "MEDIA_URL must be a URL path such as /media, got {raw}"
        )));
    }
    Ok(raw
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| format!("/{s}"))
        .collect())
}

/// Answer posted on behalf of support when a user starts a conversation.
pub const DEFAULT_AUTO_REPLY: &str =
    "Thank you for contacting technical support! An operator will answer you shortly.";

fn postgres_url_from_parts() -> Result<String, ChatError> {
    let required = |key: &str| {
        non_empty_env(key).ok_or_else(|| {
            ChatError::Config(format!("{key} must be set when DATABASE_URL is absent"))
        })
    };
    let db = required("POSTGRES_DB")?;
    let user = required("POSTGRES_USER")?;
    let password = required("POSTGRES_PASSWORD")?;
    let host = std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port: u16 = parse_env("POSTGRES_PORT", 5432);
    Ok(format!("postgres://{user}:{password}@{host}:{port}/{db}"))
}

/// Channel chat events are relayed on when `REDIS_CHANNEL` is unset.
pub const DEFAULT_REDIS_CHANNEL: &str = "support_chat_events";

/// `REDIS_URL`, or a URL assembled from `REDIS_HOST`, `REDIS_PORT`,
/// `REDIS_USERNAME` and `REDIS_PASSWORD`.
fn redis_url_from_env() -> Result<Option<String>, ChatError> {
    if let Some(url) = non_empty_env("REDIS_URL") {
        return Ok(Some(url));
    }
    let Some(host) = non_empty_env("REDIS_HOST") else {
        return Ok(None);
    };
    let password = non_empty_env("REDIS_PASSWORD").ok_or_else(|| {
        ChatError::Config("REDIS_PASSWORD must be set when REDIS_HOST is set".to_string())
    })?;
    let username = non_empty_env("REDIS_USERNAME").unwrap_or_default();
    Ok(Some(redis_url(
        &host,
        parse_env("REDIS_PORT", 6379),
        &username,
        &password,
    )))
}

/// Builds a `redis://` URL. An empty username selects the default user.
#[must_use]
pub fn redis_url(host: &str, port: u16, username: &str, password: &str) -> String {
    format!("redis://{username}:{password}@{host}:{port}")
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().map(|v| v.to_ascii_lowercase()).as_deref() {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}
