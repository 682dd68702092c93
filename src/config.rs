//! Loads runtime configuration for the chat-switchboard service by reading environment
//! variables, applying sensible defaults, and exposing the values through the
//! strongly typed `Config` struct.
use anyhow::{anyhow, bail, Context, Result};
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::str::FromStr;

pub const MIN_SECRET_LEN: usize = 32;

#[derive(Clone, Debug)]
pub struct ProviderKeys {
    pub deepseek: Option<String>,
    pub deepcode: Option<String>,
    pub phi4: Option<String>,
    pub perplexity: Option<String>,
    pub gemini: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Endpoints {
    pub openrouter: String,
    pub perplexity: String,
    pub gemini: String,
}

#[derive(Clone, Debug)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub public_base_url: String,
    pub production: bool,
    pub allowed_origins: Vec<String>,
    pub redis_url: Option<String>,
    pub database_url: String,
    pub session_secret: String,
    pub chat_ttl_secs: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_max: u64,
    pub history_window: usize,
    pub slow_probe_ms: u64,
    pub upstream_timeout_secs: u64,
    /// Lets `/api/web` reach loopback and private addresses. Off unless set.
    pub web_allow_private: bool,
    pub app_title: String,
    pub keys: ProviderKeys,
    pub endpoints: Endpoints,
    pub google: Option<OAuthClient>,
    pub github: Option<OAuthClient>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let listen_addr = parse(&or("LISTEN_ADDR", "0.0.0.0:3000"), "LISTEN_ADDR")?;
        let public_base_url = or("PUBLIC_BASE_URL", "http://localhost:3000")
            .trim_end_matches('/')
            .to_string();
        let production = or("APP_ENV", "development").eq_ignore_ascii_case("production");
        let allowed_origins = or("ALLOWED_ORIGINS", "http://localhost:3000")
            .split(',')
            .map(|o| o.trim().trim_end_matches('/').to_string())
            .filter(|o| !o.is_empty())
            .collect::<Vec<_>>();
        if allowed_origins.is_empty() {
            bail!("ALLOWED_ORIGINS must list at least one origin");
        }

        let session_secret = var("SESSION_SECRET").ok_or_else(|| anyhow!("SESSION_SECRET is required"))?;
        if session_secret.len() < MIN_SECRET_LEN {
            bail!("SESSION_SECRET must be at least {MIN_SECRET_LEN} bytes");
        }

        let oauth = |id: &str, secret: &str| match (var(id), var(secret)) {
            (Some(client_id), Some(client_secret)) => Some(OAuthClient {
                client_id,
                client_secret,
            }),
            _ => None,
        };

        Ok(Config {
            listen_addr,
            public_base_url,
            production,
            allowed_origins,
            redis_url: var("REDIS_URL"),
            database_url: or("DATABASE_URL", "sqlite://chat-switchboard.db?mode=rwc"),
            session_secret,
            chat_ttl_secs: parse(&or("CHAT_TTL_SECS", "300"), "CHAT_TTL_SECS")?,
            rate_limit_window_secs: parse(&or("RATE_LIMIT_WINDOW_SECS", "60"), "RATE_LIMIT_WINDOW_SECS")?,
            rate_limit_max: parse(&or("RATE_LIMIT_MAX", "10"), "RATE_LIMIT_MAX")?,
            history_window: parse(&or("HISTORY_WINDOW", "5"), "HISTORY_WINDOW")?,
            slow_probe_ms: parse(&or("SLOW_PROBE_MS", "1000"), "SLOW_PROBE_MS")?,
            upstream_timeout_secs: parse(&or("UPSTREAM_TIMEOUT_SECS", "60"), "UPSTREAM_TIMEOUT_SECS")?,
            web_allow_private: parse(&or("WEB_FETCH_ALLOW_PRIVATE", "false"), "WEB_FETCH_ALLOW_PRIVATE")?,
            app_title: or("APP_TITLE", "CodaWeb AI"),
            keys: ProviderKeys {
                deepseek: var("OPENROUTER_DEEPSEEK_API_KEY"),
                deepcode: var("DEEPCODE_API_KEY"),
                phi4: var("PHI4_API_KEY"),
                perplexity: var("PERPLEXITY_API_KEY"),
                gemini: var("GEMINI_API_KEY"),
            },
            endpoints: Endpoints {
                openrouter: trimmed(or("OPENROUTER_BASE_URL", "https://openrouter.ai/api/v1")),
                perplexity: trimmed(or("PERPLEXITY_BASE_URL", "https://api.perplexity.ai")),
                gemini: trimmed(or(
                    "GEMINI_BASE_URL",
                    "https://generativelanguage.googleapis.com",
                )),
            },
            google: oauth("GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET"),
            github: oauth("GITHUB_CLIENT_ID", "GITHUB_CLIENT_SECRET"),
        })
    }
}

fn parse<T>(raw: &str, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("{key} has an invalid value: {raw:?}"))
}

fn trimmed(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
