use crate::auth::oauth::OAuthRegistry;
use crate::auth::SessionKeys;
use crate::config::Config;
use crate::db::Database;
use crate::history::HistoryCache;
use crate::llm::LlmRouter;
use crate::rate_limit::RateLimiter;
use crate::redis_store::{KvStore, MemoryStore, RedisStore};
use anyhow::Result;
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::warn;

pub mod chat;
pub mod conversations;
pub mod models;
pub mod session;
pub mod signin;
pub mod user;
pub mod web;

pub use chat::chat;

pub struct AppState {
    pub config: Config,
    pub history: HistoryCache,
    pub limiter: RateLimiter,
    pub llm: LlmRouter,
    pub db: Database,
    pub sessions: SessionKeys,
    pub oauth: OAuthRegistry,
    pub fetcher: reqwest::Client,
}

impl AppState {
    /// Connects the key-value store and the database named in `config`.
    pub async fn connect(config: Config) -> Result<Self> {
        let kv: Arc<dyn KvStore> = match &config.redis_url {
            Some(url) => Arc::new(RedisStore::connect(url).await?),
            None => {
                warn!("REDIS_URL not set, conversation cache and rate limits stay in-process");
                Arc::new(MemoryStore::new())
            }
        };
        let db = Database::connect(&config.database_url).await?;
        Self::new(config, kv, db)
    }

    pub fn new(config: Config, kv: Arc<dyn KvStore>, db: Database) -> Result<Self> {
        let history = HistoryCache::new(kv.clone(), config.chat_ttl_secs);
        let limiter = RateLimiter::new(kv, config.rate_limit_max, config.rate_limit_window_secs);
        let llm = LlmRouter::new(&config)?;
        let oauth = OAuthRegistry::from_config(&config)?;
        let sessions = SessionKeys::new(&config.session_secret);
        // redirects are followed by `web::fetch_page` so every hop gets checked
        let fetcher = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            config,
            history,
            limiter,
            llm,
            db,
            sessions,
            oauth,
            fetcher,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chat", post(chat).get(models::models))
        .route("/api/models", get(models::models))
        .route("/api/session", get(session::anonymous_session))
        .route(
            "/api/conversations",
            get(conversations::list).post(conversations::save),
        )
        .route("/api/conversations/{id}", delete(conversations::remove))
        .route("/api/user/delete", delete(user::delete_account))
        .route("/api/auth/providers", get(signin::providers))
        .route("/api/auth/signin/{provider}", get(signin::sign_in))
        .route("/api/auth/callback/{provider}", get(signin::callback))
        .route("/api/auth/session", get(signin::session))
        .route("/api/auth/signout", post(signin::sign_out))
        .route("/api/web", get(web::fetch_page))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
