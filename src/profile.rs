use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::MemoryError;
use crate::memory::Memory;

/// 用户画像在长期记忆中的 key
pub const PROFILE_KEY: &str = "user_profile_data_v1";

/// 用户画像：偏好分类 + 反馈日志，每次修改都写回长期记忆
#[derive(Clone)]
pub struct UserProfile {
    memory: Arc<Memory>,
}

/// 画像初始结构
pub fn default_profile() -> Map<String, Value> {
    let value = json!({
        "general": {
            "user_name": "",
            "company_name": "",
        },
        "coding_style": {
            "preferred_quote_type": "double",
            "indent_size": "4",
            "summary": "standard conventions",
        },
        "llm_settings": {
            "idea_synth_persona": "creative and helpful",
            "code_gen_persona": "expert Python programmer",
        },
    });
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl UserProfile {
    /// 加载画像；缺失或结构损坏时写入默认值
    pub async fn load(memory: Arc<Memory>) -> Result<Self, MemoryError> {
        let profile = Self { memory };
        if !matches!(profile.memory.retrieve(PROFILE_KEY).await, Some(Value::Object(_))) {
            debug!("initialising default user profile");
            profile.save(default_profile()).await?;
        }
        Ok(profile)
    }

    /// 完整画像
    pub async fn get_all(&self) -> Map<String, Value> {
        match self.memory.retrieve(PROFILE_KEY).await {
            Some(Value::Object(map)) => map,
            _ => default_profile(),
        }
    }

    /// 读取偏好（字符串化），不存在时返回 None
    pub async fn get_preference(&self, category: &str, key: &str) -> Option<String> {
        self.get_all()
            .await
            .get(category)
            .and_then(|c| c.get(key))
            .map(value_to_string)
    }

    /// 读取偏好，缺失时使用默认值
    pub async fn preference_or(&self, category: &str, key: &str, default: &str) -> String {
        self.get_preference(category, key)
            .await
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    /// 写入偏好（分类不存在时创建）
    pub async fn add_preference(
        &self,
        category: &str,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<(), MemoryError> {
        let value = value.into();
        self.modify(|data| {
            let entry = data
                .entry(category.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(cat) = entry {
                cat.insert(key.to_string(), value);
            }
        })
        .await
    }

    /// 恢复默认画像
    pub async fn clear(&self) -> Result<(), MemoryError> {
        self.save(default_profile()).await
    }

    /// 记录一条反馈
    pub async fn add_feedback(
        &self,
        rating: &str,
        comment: &str,
        context: &str,
    ) -> Result<(), MemoryError> {
        let entry = json!({
            "rating": rating.to_lowercase(),
            "comment": comment,
            "context": context,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        self.modify(|data| match data.get_mut("feedback_log") {
            Some(Value::Array(log)) => log.push(entry),
            _ => {
                data.insert("feedback_log".to_string(), Value::Array(vec![entry]));
            }
        })
        .await
    }

    /// 反馈日志
    pub async fn feedback_log(&self) -> Vec<Value> {
        match self.get_all().await.get("feedback_log") {
            Some(Value::Array(log)) => log.clone(),
            _ => vec![],
        }
    }

    async fn save(&self, data: Map<String, Value>) -> Result<(), MemoryError> {
        self.memory.commit(PROFILE_KEY, Value::Object(data)).await
    }

    /// 在记忆锁内修改画像
    async fn modify(&self, f: impl FnOnce(&mut Map<String, Value>)) -> Result<(), MemoryError> {
        self.memory
            .update(PROFILE_KEY, |current| {
                let mut data = match current {
                    Some(Value::Object(map)) => map.clone(),
                    _ => default_profile(),
                };
                f(&mut data);
                Ok(Some(Value::Object(data)))
            })
            .await
            .map(|_| ())
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::JsonFileStore;

    async fn profile() -> (UserProfile, Arc<Memory>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let memory = Arc::new(
            Memory::open(Box::new(JsonFileStore::open(tmp.path()).unwrap()))
                .await
                .unwrap(),
        );
        (UserProfile::load(memory.clone()).await.unwrap(), memory, tmp)
    }

    #[tokio::test]
    async fn defaults_are_persisted_on_first_load() {
        let (profile, memory, _tmp) = profile().await;
        assert!(memory.retrieve(PROFILE_KEY).await.is_some());
        assert_eq!(
            profile.get_preference("coding_style", "indent_size").await.as_deref(),
            Some("4")
        );
    }

    #[tokio::test]
    async fn add_preference_creates_category() {
        let (profile, _memory, _tmp) = profile().await;
        profile.add_preference("editor", "theme", "gruvbox").await.unwrap();
        assert_eq!(
            profile.get_preference("editor", "theme").await.as_deref(),
            Some("gruvbox")
        );
        assert!(profile.get_preference("editor", "font").await.is_none());
    }

    #[tokio::test]
    async fn preference_or_falls_back_for_empty_values() {
        let (profile, _memory, _tmp) = profile().await;
        // user_name 默认是空串
        assert_eq!(profile.preference_or("general", "user_name", "friend").await, "friend");
    }

    #[tokio::test]
    async fn clear_restores_defaults() {
        let (profile, _memory, _tmp) = profile().await;
        profile.add_preference("general", "user_name", "Robin").await.unwrap();
        profile.clear().await.unwrap();
        assert_eq!(
            profile.get_preference("general", "user_name").await.as_deref(),
            Some("")
        );
    }

    #[tokio::test]
    async fn feedback_is_appended_with_lowercased_rating() {
        let (profile, _memory, _tmp) = profile().await;
        profile.add_feedback("GOOD", "very detailed", "readme").await.unwrap();
        profile.add_feedback("3", "ok", "readme").await.unwrap();

        let log = profile.feedback_log().await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[0]["rating"], "good");
        assert_eq!(log[1]["context"], "readme");
        assert!(log[0]["timestamp"].as_str().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_feedback_and_preferences_are_all_kept() {
        let (profile, _memory, _tmp) = profile().await;
        let mut handles = Vec::new();
        for i in 0..10 {
            let profile = profile.clone();
            handles.push(tokio::spawn(async move {
                profile.add_feedback("4", &format!("note {}", i), "ideas").await.unwrap();
                profile
                    .add_preference("keys", &format!("k{}", i), "v")
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(profile.feedback_log().await.len(), 10);
        let all = profile.get_all().await;
        assert_eq!(all["keys"].as_object().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn corrupt_profile_value_is_reset() {
        let tmp = tempfile::tempdir().unwrap();
        let memory = Arc::new(
            Memory::open(Box::new(JsonFileStore::open(tmp.path()).unwrap()))
                .await
                .unwrap(),
        );
        memory.commit(PROFILE_KEY, "not an object").await.unwrap();
        let profile = UserProfile::load(memory).await.unwrap();
        assert!(profile.get_all().await.contains_key("llm_settings"));
    }
}
