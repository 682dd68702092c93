use crate::cache_utils::rate_limit_key;
use crate::redis_store::KvStore;
use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

/// Fixed-window request counter per client ip, kept in the key-value store.
#[derive(Clone)]
pub struct RateLimiter {
    kv: Arc<dyn KvStore>,
    max_requests: u64,
    window_secs: u64,
}

impl RateLimiter {
    pub fn new(kv: Arc<dyn KvStore>, max_requests: u64, window_secs: u64) -> Self {
        Self {
            kv,
            max_requests,
            window_secs,
        }
    }

    /// `true` when the request may proceed. Each allowed request counts and
    /// pushes the window expiry forward.
    pub async fn check(&self, ip: &str) -> Result<bool> {
        let key = rate_limit_key(ip);
        let current = self.kv.get_counter(&key).await?.unwrap_or(0);
        if current >= self.max_requests {
            debug!(ip, current, "rate limit reached");
            return Ok(false);
        }
        self.kv.incr_with_ttl(&key, self.window_secs).await?;
        Ok(true)
    }
}
