//! Two-tier conversation cache: an in-process map in front of the key-value store.
//!
//! Reads go memory first, then the store (promoting hits into memory). Writes go to
//! both. Both tiers expire entries after the same TTL; concurrent writers to one
//! conversation resolve last-write-wins.
use crate::cache_utils::chat_key;
use crate::models::ModelId;
use crate::redis_store::KvStore;
use crate::types::HistoryMessage;
use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const FIELD_MODEL: &str = "model";
const FIELD_HISTORY: &str = "history";
/// Lapsed entries are swept from memory once every this many writes.
const SWEEP_EVERY: usize = 256;

#[derive(Clone, Debug, PartialEq)]
pub struct ChatRecord {
    /// `None` when the stored model id is no longer recognised.
    pub model: Option<ModelId>,
    pub history: Vec<HistoryMessage>,
}

struct Cached {
    record: ChatRecord,
    expires_at: Instant,
}

#[derive(Clone)]
pub struct HistoryCache {
    memory: Arc<RwLock<HashMap<String, Cached>>>,
    writes: Arc<AtomicUsize>,
    kv: Arc<dyn KvStore>,
    ttl: Duration,
}

impl HistoryCache {
    pub fn new(kv: Arc<dyn KvStore>, ttl_secs: u64) -> Self {
        Self {
            memory: Arc::new(RwLock::new(HashMap::new())),
            writes: Arc::new(AtomicUsize::new(0)),
            kv,
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    pub async fn load(&self, chat_id: &str) -> Result<Option<ChatRecord>> {
        if let Some(record) = self.from_memory(chat_id) {
            debug!(chat_id, "history served from memory");
            return Ok(Some(record));
        }

        let raw = self.kv.hgetall(&chat_key(chat_id)).await?;
        let Some(history) = raw.get(FIELD_HISTORY) else {
            return Ok(None);
        };
        let history: Vec<HistoryMessage> =
            serde_json::from_str(history).context("stored history is not valid JSON")?;
        let model = raw.get(FIELD_MODEL).and_then(|m| match m.parse() {
            Ok(model) => Some(model),
            Err(err) => {
                warn!(chat_id, %err, "ignoring stored model");
                None
            }
        });

        let record = ChatRecord { model, history };
        self.put_memory(chat_id, record.clone());
        debug!(chat_id, "history promoted from key-value store");
        Ok(Some(record))
    }

    pub async fn store(&self, chat_id: &str, model: ModelId, history: Vec<HistoryMessage>) -> Result<()> {
        let encoded = serde_json::to_string(&history)?;
        self.put_memory(
            chat_id,
            ChatRecord {
                model: Some(model),
                history,
            },
        );
        self.kv
            .hset_with_ttl(
                &chat_key(chat_id),
                &[
                    (FIELD_MODEL, model.as_str().to_string()),
                    (FIELD_HISTORY, encoded),
                ],
                self.ttl.as_secs(),
            )
            .await
    }

    fn from_memory(&self, chat_id: &str) -> Option<ChatRecord> {
        {
            let memory = self.memory.read();
            match memory.get(chat_id) {
                Some(c) if c.expires_at > Instant::now() => return Some(c.record.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // a writer may have refreshed the entry since the read lock was dropped
        remove_if_lapsed(&mut self.memory.write(), chat_id, Instant::now());
        None
    }

    fn put_memory(&self, chat_id: &str, record: ChatRecord) {
        let now = Instant::now();
        let mut memory = self.memory.write();
        if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            let before = memory.len();
            memory.retain(|_, c| c.expires_at > now);
            debug!(swept = before - memory.len(), "lapsed conversations dropped from memory");
        }
        memory.insert(
            chat_id.to_string(),
            Cached {
                record,
                expires_at: now + self.ttl,
            },
        );
    }
}

fn remove_if_lapsed(memory: &mut HashMap<String, Cached>, chat_id: &str, now: Instant) {
    if memory.get(chat_id).is_some_and(|c| c.expires_at <= now) {
        memory.remove(chat_id);
    }
}
