//! support-chat-gateway server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints and the
//! background jobs. `support-chat-gateway issue-token <user_id>` creates an
//! API token for an end user and exits.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use support_chat_gateway::app_state::AppState;
use support_chat_gateway::build_app;
use support_chat_gateway::config::ChatConfig;
use support_chat_gateway::jobs;
use support_chat_gateway::persistence::ChatStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ChatConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let store = ChatStore::from_config(&config).await?;

    let mut args = std::env::args().skip(1);
    if let Some(command) = args.next() {
        return run_command(&command, args, &store).await;
    }

    tracing::info!(addr = %config.listen_addr, "starting support-chat-gateway");
    let listen_addr = config.listen_addr;
    let config_for_jobs = config.clone();

    // Build application state
    let app_state = AppState::new(config, store);
    let job_handles = jobs::spawn_all(&config_for_jobs, &app_state.chat_service)?;
    let app = build_app(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("binding {listen_addr}"))?;
    tracing::info!(addr = %listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for handle in job_handles {
        handle.abort();
    }
    tracing::info!("server stopped");

    Ok(())
}

async fn run_command(
    command: &str,
    mut args: impl Iterator<Item = String>,
    store: &ChatStore,
) -> anyhow::Result<()> {
    match command {
        "issue-token" => {
            let user_id: i64 = args
                .next()
                .context("usage: issue-token <user_id>")?
                .parse()
                .context("user_id must be an integer")?;
            let token = uuid::Uuid::new_v4().simple().to_string();
            store.insert_user_token(&token, user_id).await?;
            tracing::info!(user_id, "issued user api token");
            println!("{token}");
            Ok(())
        }
        other => anyhow::bail!("unknown command: {other}"),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
