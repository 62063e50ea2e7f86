use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::MemoryError;

use super::traits::{default_document, Document, MemoryStore};

const MEMORY_FILE: &str = "memory.json";
const CHECKPOINT_DIR: &str = "checkpoints";
const CHECKPOINT_EXT: &str = "vibe";
const BACKUP_EXT: &str = "json.corrupted.bak";
const TMP_EXT: &str = "json.tmp";

/// JSON 文件后端：每次写入都整体读回并重写 `memory.json`
pub struct JsonFileStore {
    path: PathBuf,
    checkpoint_dir: PathBuf,
    /// 串行化 读-改-写
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// 在数据目录下打开（目录不存在则创建）
    pub fn open(data_dir: &Path) -> Result<Self, MemoryError> {
        std::fs::create_dir_all(data_dir)?;
        Ok(Self {
            path: data_dir.join(MEMORY_FILE),
            checkpoint_dir: data_dir.join(CHECKPOINT_DIR),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn checkpoint_path(&self, name: &str) -> PathBuf {
        self.checkpoint_dir
            .join(format!("{}.{}", name, CHECKPOINT_EXT))
    }

    async fn read_document(&self) -> Result<Document, MemoryError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(default_document()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(default_document());
        }

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) | Err(_) => {
                let backup = self.path.with_extension(BACKUP_EXT);
                warn!(
                    "memory file {} is not a JSON object, backing up to {} and starting fresh",
                    self.path.display(),
                    backup.display()
                );
                match tokio::fs::rename(&self.path, &backup).await {
                    Ok(()) => {}
                    // 并发读取时另一方已经备份
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                Ok(default_document())
            }
        }
    }

    /// 先写临时文件再 rename，中断的写入不会留下半个文件
    async fn write_document(&self, doc: &Document) -> Result<(), MemoryError> {
        let json = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension(TMP_EXT);
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("memory written to {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for JsonFileStore {
    fn backend_name(&self) -> &str {
        "json"
    }

    async fn load_all(&self) -> Result<Document, MemoryError> {
        self.read_document().await
    }

    async fn put(&self, key: &str, value: &Value) -> Result<(), MemoryError> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.read_document().await?;
        doc.insert(key.to_string(), value.clone());
        self.write_document(&doc).await
    }

    async fn save_checkpoint(&self, name: &str, session: &Document) -> Result<(), MemoryError> {
        tokio::fs::create_dir_all(&self.checkpoint_dir).await?;
        let json = serde_json::to_string_pretty(session)?;
        tokio::fs::write(self.checkpoint_path(name), json).await?;
        Ok(())
    }

    async fn load_checkpoint(&self, name: &str) -> Result<Option<Document>, MemoryError> {
        let content = match tokio::fs::read_to_string(self.checkpoint_path(name)).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn list_checkpoints(&self) -> Result<Vec<String>, MemoryError> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.checkpoint_dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(CHECKPOINT_EXT) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
