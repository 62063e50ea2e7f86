use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::MemoryError;

use super::traits::{default_document, Document, MemoryStore};

const KEY_PREFIX: &str = "giblet";

/// Redis 后端：长期记忆与快照各存一个 hash，值为 JSON 字符串
pub struct RedisStore {
    conn: MultiplexedConnection,
    memory_key: String,
    checkpoint_key: String,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, MemoryError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("connected to redis memory backend at {}", url);
        Ok(Self {
            conn,
            memory_key: format!("{}:long_term_memory", KEY_PREFIX),
            checkpoint_key: format!("{}:checkpoints", KEY_PREFIX),
        })
    }
}

#[async_trait]
impl MemoryStore for RedisStore {
    fn backend_name(&self) -> &str {
        "redis"
    }

    async fn load_all(&self) -> Result<Document, MemoryError> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = conn.hgetall(&self.memory_key).await?;
        if raw.is_empty() {
            return Ok(default_document());
        }

        let mut doc = Document::new();
        for (key, json) in raw {
            match serde_json::from_str::<Value>(&json) {
                Ok(value) => {
                    doc.insert(key, value);
                }
                Err(e) => warn!("skipping undecodable redis memory key '{}': {}", key, e),
            }
        }
        Ok(doc)
    }

    async fn put(&self, key: &str, value: &Value) -> Result<(), MemoryError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(value)?;
        conn.hset::<_, _, _, ()>(&self.memory_key, key, json).await?;
        Ok(())
    }

    async fn save_checkpoint(&self, name: &str, session: &Document) -> Result<(), MemoryError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(session)?;
        conn.hset::<_, _, _, ()>(&self.checkpoint_key, name, json).await?;
        Ok(())
    }

    async fn load_checkpoint(&self, name: &str) -> Result<Option<Document>, MemoryError> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.hget(&self.checkpoint_key, name).await?;
        match json {
            Some(j) => Ok(Some(serde_json::from_str(&j)?)),
            None => Ok(None),
        }
    }

    async fn list_checkpoints(&self) -> Result<Vec<String>, MemoryError> {
        let mut conn = self.conn.clone();
        let mut names: Vec<String> = conn.hkeys(&self.checkpoint_key).await?;
        names.sort();
        Ok(names)
    }
}
