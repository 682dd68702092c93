// chat-switchboard: routes chat requests to one of several hosted LLM providers, keeps
// recent conversation history in a two-tier cache, and stores signed-in users' conversations.

use chat_switchboard::config::Config;
use chat_switchboard::http::{router, AppState};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ============================
// Main
// ============================
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chat_switchboard=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;
    let addr = config.listen_addr;
    let state = Arc::new(AppState::connect(config).await?);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "chat-switchboard listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}
