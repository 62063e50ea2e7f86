use std::path::{Path, PathBuf};

use color_eyre::eyre::{eyre, Context, Result};
use serde_json::{json, Map, Value};
use tracing::warn;

pub const STYLE_FILE: &str = "style_preference.json";

/// 多个组件共享的风格偏好
pub type SharedStyle = std::sync::Arc<tokio::sync::RwLock<StylePreferences>>;

/// 文档/项目风格偏好，持久化在独立的 JSON 文件
#[derive(Debug)]
pub struct StylePreferences {
    path: PathBuf,
    prefs: Map<String, Value>,
}

/// 默认风格偏好
pub fn default_style() -> Map<String, Value> {
    let value = json!({
        "readme": {
            "default_style": "standard",
            "default_tone": "professional",
            "default_sections": ["Overview", "Features", "Getting Started", "Roadmap Link", "Contributing"],
        },
        "roadmap": {
            "default_format": "phase_based",
            "default_tone": "neutral",
        },
        "project": {
            "default_repo_visibility": "private",
            "default_primary_language": "python",
            "include_gitignore": true,
            "include_license": "MIT",
        },
        "general_tone": "neutral",
        "coding_style": {
            "preferred_formatter": "black",
            "docstring_format": "google",
        },
    });
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl StylePreferences {
    /// 在数据目录下打开 `style_preference.json`
    pub fn open_in(data_dir: &Path) -> Result<Self> {
        Self::open(data_dir.join(STYLE_FILE))
    }

    /// 打开偏好文件；不存在则写入默认值，损坏则备份后重建
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let prefs = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Value>(&content) {
                Ok(Value::Object(map)) => Some(map),
                _ => {
                    let backup = path.with_extension("json.corrupted.bak");
                    warn!(
                        "style preferences at {} are corrupted, backing up to {}",
                        path.display(),
                        backup.display()
                    );
                    std::fs::rename(&path, &backup)
                        .wrap_err("failed to back up corrupted style preferences")?;
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(e).wrap_err_with(|| format!("reading {} failed", path.display()))
            }
        };

        let style = Self {
            path,
            prefs: prefs.clone().unwrap_or_else(default_style),
        };
        if prefs.is_none() {
            style.save()?;
        }
        Ok(style)
    }

    /// 包装成可共享的句柄
    pub fn shared(self) -> SharedStyle {
        std::sync::Arc::new(tokio::sync::RwLock::new(self))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn all(&self) -> &Map<String, Value> {
        &self.prefs
    }

    /// 按点分路径读取，如 `readme.default_tone`
    pub fn get(&self, key_path: &str) -> Option<&Value> {
        let mut parts = key_path.split('.');
        let first = parts.next()?;
        let mut current = self.prefs.get(first)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// 读取字符串偏好，缺失时使用默认值
    pub fn get_str(&self, key_path: &str, default: &str) -> String {
        self.get(key_path)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
            .to_string()
    }

    /// 按点分路径写入；中间层不存在或不是对象时创建
    pub fn set(&mut self, key_path: &str, value: impl Into<Value>) -> Result<()> {
        let parts: Vec<&str> = key_path.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(eyre!("invalid preference path '{}'", key_path));
        }

        let (last, parents) = parts
            .split_last()
            .ok_or_else(|| eyre!("empty preference path"))?;
        let mut current = &mut self.prefs;
        for part in parents {
            let entry = current
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            current = match entry {
                Value::Object(map) => map,
                _ => return Err(eyre!("preference path '{}' is not an object", part)),
            };
        }
        current.insert(last.to_string(), value.into());
        self.save()
    }

    /// 整体替换某个分类
    pub fn set_category(&mut self, category: &str, values: Map<String, Value>) -> Result<()> {
        self.prefs
            .insert(category.to_string(), Value::Object(values));
        self.save()
    }

    pub fn reset_to_defaults(&mut self) -> Result<()> {
        self.prefs = default_style();
        self.save()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).wrap_err("failed to create data directory")?;
        }
        let json = serde_json::to_string_pretty(&self.prefs)?;
        std::fs::write(&self.path, json)
            .wrap_err_with(|| format!("writing {} failed", self.path.display()))
    }
}

/// 从 CLI 文本推断 JSON 值：true/false/数字/JSON 数组对象，其余作为字符串
pub fn parse_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(v) if !v.is_string() => v,
        _ => Value::String(trimmed.trim_matches('"').to_string()),
    }
}
