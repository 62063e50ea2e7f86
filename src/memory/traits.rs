use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::MemoryError;

/// 长期记忆文档（扁平 key → JSON 值）
pub type Document = Map<String, Value>;

/// 长期记忆的初始结构
pub fn default_document() -> Document {
    let mut doc = Document::new();
    doc.insert("roadmap".to_string(), Value::Array(vec![]));
    doc.insert("bug_archive".to_string(), Value::Array(vec![]));
    doc.insert("preferences".to_string(), Value::Object(Map::new()));
    doc
}

/// 记忆持久化后端
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// 后端名称（用于日志 / 状态展示）
    fn backend_name(&self) -> &str;

    /// 读取全部长期记忆；后端为空时返回 `default_document()`
    async fn load_all(&self) -> Result<Document, MemoryError>;

    /// 写入单个 key
    async fn put(&self, key: &str, value: &Value) -> Result<(), MemoryError>;

    /// 保存会话快照（名称已由调用方校验）
    async fn save_checkpoint(&self, name: &str, session: &Document) -> Result<(), MemoryError>;

    /// 读取会话快照，不存在时返回 None
    async fn load_checkpoint(&self, name: &str) -> Result<Option<Document>, MemoryError>;

    /// 已保存的快照名称（排序）
    async fn list_checkpoints(&self) -> Result<Vec<String>, MemoryError>;
}
