//! Key-value store behind the history cache and the rate limiter.
//!
//! `RedisStore` talks to Redis over a multiplexed connection. `MemoryStore` keeps
//! everything in-process with the same expiry semantics and is used when no
//! `REDIS_URL` is configured.
use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[async_trait]
pub trait KvStore: Send + Sync {
    /// All fields of a hash; empty when the key is missing or expired.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Writes the given hash fields and sets the key's expiry in one round trip.
    async fn hset_with_ttl(&self, key: &str, fields: &[(&str, String)], ttl_secs: u64) -> Result<()>;

    async fn get_counter(&self, key: &str) -> Result<Option<u64>>;

    /// Increments a counter and (re)sets its expiry, returning the new value.
    async fn incr_with_ttl(&self, key: &str, ttl_secs: u64) -> Result<u64>;
}

// ============================
// Redis
// ============================
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("invalid REDIS_URL")?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .context("failed to connect to redis")?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        let map: HashMap<String, String> = conn.hgetall(key).await?;
        Ok(map)
    }

    async fn hset_with_ttl(&self, key: &str, fields: &[(&str, String)], ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (field, value) in fields {
            pipe.hset(key, *field, value).ignore();
        }
        pipe.expire(key, ttl_secs as i64).ignore();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn get_counter(&self, key: &str) -> Result<Option<u64>> {
        let mut conn = self.conn.clone();
        let v: Option<String> = conn.get(key).await?;
        Ok(v.and_then(|s| s.trim_matches('"').parse().ok()))
    }

    async fn incr_with_ttl(&self, key: &str, ttl_secs: u64) -> Result<u64> {
        let mut conn = self.conn.clone();
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, ttl_secs as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }
}

// ============================
// In-process
// ============================
enum Entry {
    Hash(HashMap<String, String>),
    Counter(u64),
}

struct Slot {
    entry: Entry,
    expires_at: Instant,
}

/// New keys between two sweeps of lapsed slots.
const SWEEP_EVERY: usize = 256;

#[derive(Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, Slot>>,
    inserts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live<'a>(slots: &'a mut HashMap<String, Slot>, key: &str) -> Option<&'a mut Slot> {
        let now = Instant::now();
        if slots.get(key).is_some_and(|s| s.expires_at <= now) {
            slots.remove(key);
        }
        slots.get_mut(key)
    }

    /// Adds a new key, first dropping every lapsed slot once per `SWEEP_EVERY` keys.
    fn insert(&self, slots: &mut HashMap<String, Slot>, key: &str, slot: Slot) {
        if self.inserts.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            let now = Instant::now();
            slots.retain(|_, s| s.expires_at > now);
        }
        slots.insert(key.to_string(), slot);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut slots = self.slots.lock();
        Ok(match Self::live(&mut slots, key) {
            Some(Slot {
                entry: Entry::Hash(map),
                ..
            }) => map.clone(),
            _ => HashMap::new(),
        })
    }

    async fn hset_with_ttl(&self, key: &str, fields: &[(&str, String)], ttl_secs: u64) -> Result<()> {
        let mut slots = self.slots.lock();
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs);
        match Self::live(&mut slots, key) {
            Some(slot) => {
                if let Entry::Hash(map) = &mut slot.entry {
                    for (field, value) in fields {
                        map.insert(field.to_string(), value.clone());
                    }
                } else {
                    anyhow::bail!("WRONGTYPE {key} holds a counter");
                }
                slot.expires_at = expires_at;
            }
            None => {
                let map = fields
                    .iter()
                    .map(|(f, v)| (f.to_string(), v.clone()))
                    .collect();
                self.insert(
                    &mut slots,
                    key,
                    Slot {
                        entry: Entry::Hash(map),
                        expires_at,
                    },
                );
            }
        }
        Ok(())
    }

    async fn get_counter(&self, key: &str) -> Result<Option<u64>> {
        let mut slots = self.slots.lock();
        Ok(match Self::live(&mut slots, key) {
            Some(Slot {
                entry: Entry::Counter(n),
                ..
            }) => Some(*n),
            _ => None,
        })
    }

    async fn incr_with_ttl(&self, key: &str, ttl_secs: u64) -> Result<u64> {
        let mut slots = self.slots.lock();
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs);
        match Self::live(&mut slots, key) {
            Some(slot) => {
                let Entry::Counter(n) = &mut slot.entry else {
                    anyhow::bail!("WRONGTYPE {key} holds a hash");
                };
                *n += 1;
                let count = *n;
                slot.expires_at = expires_at;
                Ok(count)
            }
            None => {
                self.insert(
                    &mut slots,
                    key,
                    Slot {
                        entry: Entry::Counter(1),
                        expires_at,
                    },
                );
                Ok(1)
            }
        }
    }
}
