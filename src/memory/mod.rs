pub mod json;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod traits;

use std::collections::HashMap;
use std::sync::Mutex;

use color_eyre::eyre::{eyre, Result};
use serde_json::{json, Value};
use tracing::{debug, info};

pub use json::JsonFileStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use traits::{default_document, Document, MemoryStore};

use crate::config::Config;
use crate::error::MemoryError;

/// 命令历史在长期记忆中的 key
pub const COMMAND_LOG_KEY: &str = "giblet_command_log_v1";
/// 会话记忆中当前关注点的 key
pub const FOCUS_KEY: &str = "current_focus";
/// 命令历史最多保留条数
const COMMAND_LOG_LIMIT: usize = 500;

/// 会话记忆 + 长期记忆
///
/// 会话记忆只在进程内存活；长期记忆每次 `commit` 都会写回后端。
pub struct Memory {
    session: Mutex<HashMap<String, Value>>,
    long_term: tokio::sync::Mutex<Document>,
    store: Box<dyn MemoryStore>,
}

impl Memory {
    /// 从后端加载长期记忆
    pub async fn open(store: Box<dyn MemoryStore>) -> Result<Self, MemoryError> {
        let long_term = store.load_all().await?;
        debug!(
            "loaded {} long-term keys from {} backend",
            long_term.len(),
            store.backend_name()
        );
        Ok(Self {
            session: Mutex::new(HashMap::new()),
            long_term: tokio::sync::Mutex::new(long_term),
            store,
        })
    }

    /// 根据 `[memory].backend` 选择后端
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store: Box<dyn MemoryStore> = match config.memory.backend.as_str() {
            "json" => Box::new(JsonFileStore::open(&config.data_dir()?)?),
            #[cfg(feature = "redis")]
            "redis" => Box::new(RedisStore::connect(&config.memory.redis_url).await?),
            #[cfg(not(feature = "redis"))]
            "redis" => {
                return Err(eyre!(
                    "redis memory backend requested but giblet was built without the `redis` feature"
                ))
            }
            other => return Err(eyre!("unknown memory backend '{}'", other)),
        };
        info!("memory backend: {}", store.backend_name());
        Ok(Self::open(store).await?)
    }

    pub fn backend_name(&self) -> &str {
        self.store.backend_name()
    }

    // --- 会话记忆 ---

    /// 写入会话记忆（不持久化）
    pub fn remember(&self, key: &str, value: impl Into<Value>) {
        self.session_lock().insert(key.to_string(), value.into());
    }

    /// 读取会话记忆；`null` 视为不存在
    pub fn recall(&self, key: &str) -> Option<Value> {
        self.session_lock()
            .get(key)
            .filter(|v| !v.is_null())
            .cloned()
    }

    /// 读取会话记忆中的字符串值
    pub fn recall_str(&self, key: &str) -> Option<String> {
        self.recall(key).and_then(|v| v.as_str().map(String::from))
    }

    pub fn forget(&self, key: &str) -> Option<Value> {
        self.session_lock().remove(key)
    }

    /// 会话记忆快照
    pub fn session_snapshot(&self) -> HashMap<String, Value> {
        self.session_lock().clone()
    }

    fn session_lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        // 锁中毒只会发生在持锁线程 panic 后，此时数据仍然可用
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // --- 长期记忆 ---

    /// 写入长期记忆并立即持久化
    pub async fn commit(&self, key: &str, value: impl Into<Value>) -> Result<(), MemoryError> {
        let value = value.into();
        let mut long_term = self.long_term.lock().await;
        self.store.put(key, &value).await?;
        long_term.insert(key.to_string(), value);
        Ok(())
    }

    /// 在持有长期记忆锁的情况下 读-改-写 一个 key
    ///
    /// `f` 返回 `None` 表示不写入；返回值表示是否写入。`f` 内不能再调用 `Memory`。
    pub async fn update(
        &self,
        key: &str,
        f: impl FnOnce(Option<&Value>) -> Result<Option<Value>, MemoryError>,
    ) -> Result<bool, MemoryError> {
        let mut long_term = self.long_term.lock().await;
        let Some(value) = f(long_term.get(key))? else {
            return Ok(false);
        };
        self.store.put(key, &value).await?;
        long_term.insert(key.to_string(), value);
        Ok(true)
    }

    /// 读取长期记忆
    pub async fn retrieve(&self, key: &str) -> Option<Value> {
        self.long_term.lock().await.get(key).cloned()
    }

    /// 长期记忆所有 key（排序）
    pub async fn long_term_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.long_term.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    // --- 快照 ---

    /// 将当前会话记忆保存为命名快照
    pub async fn save_checkpoint(&self, name: &str) -> Result<(), MemoryError> {
        validate_checkpoint_name(name)?;
        let snapshot: Document = self.session_snapshot().into_iter().collect();
        self.store.save_checkpoint(name, &snapshot).await?;
        info!("checkpoint '{}' saved ({} keys)", name, snapshot.len());
        Ok(())
    }

    /// 用快照替换当前会话记忆
    pub async fn load_checkpoint(&self, name: &str) -> Result<(), MemoryError> {
        validate_checkpoint_name(name)?;
        let snapshot = self
            .store
            .load_checkpoint(name)
            .await?
            .ok_or_else(|| MemoryError::CheckpointNotFound(name.to_string()))?;

        let mut session = self.session_lock();
        session.clear();
        session.extend(snapshot);
        info!("checkpoint '{}' loaded ({} keys)", name, session.len());
        Ok(())
    }

    pub async fn list_checkpoints(&self) -> Result<Vec<String>, MemoryError> {
        self.store.list_checkpoints().await
    }

    // --- 命令历史 ---

    /// 追加一条已执行命令记录（供模式分析使用）
    pub async fn log_command(&self, name: &str, args: &[String]) -> Result<(), MemoryError> {
        let entry = json!({
            "command": name,
            "args": args,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        self.update(COMMAND_LOG_KEY, |current| {
            let mut log = match current {
                Some(Value::Array(entries)) => entries.clone(),
                _ => vec![],
            };
            log.push(entry);
            if log.len() > COMMAND_LOG_LIMIT {
                let excess = log.len() - COMMAND_LOG_LIMIT;
                log.drain(..excess);
            }
            Ok(Some(Value::Array(log)))
        })
        .await
        .map(|_| ())
    }

    /// 命令历史（旧到新）
    pub async fn command_log(&self) -> Vec<Value> {
        match self.retrieve(COMMAND_LOG_KEY).await {
            Some(Value::Array(entries)) => entries,
            _ => vec![],
        }
    }

    /// 命令历史中的命令名序列
    pub async fn command_names(&self) -> Vec<String> {
        self.command_log()
            .await
            .iter()
            .filter_map(|e| e.get("command").and_then(|c| c.as_str()).map(String::from))
            .collect()
    }
}

/// 快照名必须是非空 ASCII 字母数字（同时作为文件名）
pub fn validate_checkpoint_name(name: &str) -> Result<(), MemoryError> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(MemoryError::InvalidCheckpointName(name.to_string()));
    }
    Ok(())
}

/// 临时目录中的 JSON 记忆，供单元测试使用
#[cfg(test)]
pub(crate) async fn test_memory() -> (std::sync::Arc<Memory>, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(tmp.path()).unwrap();
    (
        std::sync::Arc::new(Memory::open(Box::new(store)).await.unwrap()),
        tmp,
    )
}
