use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use color_eyre::eyre::{eyre, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::memory::Memory;

/// 共享任务在长期记忆中的 key
pub const SHARED_TASKS_KEY: &str = "shared_tasks";

/// roadmap.md 中的一个复选框任务
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoadmapTask {
    pub description: String,
    pub complete: bool,
}

/// 团队共享待办
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedTask {
    pub id: String,
    pub description: String,
    pub assignee: String,
    pub status: String,
    pub created_at: String,
}

fn task_regex() -> Result<&'static Regex> {
    static TASK: OnceLock<Option<Regex>> = OnceLock::new();
    TASK.get_or_init(|| Regex::new(r"^\s*[*-]\s*\[( |x|X)\]\s*(\*\*(.*?)\*\*|.+)$").ok())
        .as_ref()
        .ok_or_else(|| eyre!("roadmap task pattern failed to compile"))
}

/// 解析一行任务；不是任务行返回 None
fn parse_task_line(re: &Regex, line: &str) -> Option<RoadmapTask> {
    let caps = re.captures(line)?;
    let description = caps
        .get(3)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().trim().to_string())?;
    Some(RoadmapTask {
        description,
        complete: !caps[1].trim().is_empty(),
    })
}

/// 解析 markdown 中所有复选框任务
pub fn parse_tasks(content: &str) -> Result<Vec<RoadmapTask>> {
    let re = task_regex()?;
    Ok(content
        .lines()
        .filter_map(|line| parse_task_line(re, line))
        .collect())
}

/// 项目 roadmap.md 与共享任务
pub struct RoadmapManager {
    path: PathBuf,
    memory: Arc<Memory>,
}

impl RoadmapManager {
    pub fn new(path: impl Into<PathBuf>, memory: Arc<Memory>) -> Self {
        Self {
            path: path.into(),
            memory,
        }
    }

    /// 项目根目录下的 roadmap.md
    pub fn in_project(root: &Path, memory: Arc<Memory>) -> Self {
        Self::new(root.join("roadmap.md"), memory)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 每次调用都重新读取文件；文件不存在时为空
    pub fn tasks(&self) -> Result<Vec<RoadmapTask>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => parse_tasks(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("roadmap file {} not found", self.path.display());
                Ok(vec![])
            }
            Err(e) => Err(e).wrap_err_with(|| format!("reading {} failed", self.path.display())),
        }
    }

    /// 勾选第一个描述包含 `description` 的未完成任务
    ///
    /// 找不到（或已完成）返回 `Ok(false)`。
    pub fn complete_task(&self, description: &str) -> Result<bool> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(e).wrap_err_with(|| format!("reading {} failed", self.path.display()))
            }
        };
        let re = task_regex()?;
        let needle = description.trim();

        let mut lines: Vec<String> = content.lines().map(String::from).collect();
        let Some(line) = lines.iter_mut().find(|line| {
            parse_task_line(re, line)
                .is_some_and(|t| !t.complete && t.description.contains(needle))
        }) else {
            info!("task '{}' not found or already complete", needle);
            return Ok(false);
        };
        *line = line.replacen("[ ]", "[x]", 1);

        let mut updated = lines.join("\n");
        updated.push('\n');
        std::fs::write(&self.path, updated)
            .wrap_err_with(|| format!("writing {} failed", self.path.display()))?;
        info!("task '{}' marked as complete", needle);
        Ok(true)
    }

    /// 新建共享任务，返回任务 id
    pub async fn add_shared_task(&self, description: &str, assignee: &str) -> Result<String> {
        let task = SharedTask {
            id: uuid::Uuid::new_v4().to_string(),
            description: description.trim().to_string(),
            assignee: assignee.trim().to_string(),
            status: "open".to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        let id = task.id.clone();
        self.memory
            .update(SHARED_TASKS_KEY, |current| {
                let mut tasks = parse_shared(current);
                tasks.push(task);
                Ok(Some(serde_json::to_value(tasks)?))
            })
            .await?;
        Ok(id)
    }

    pub async fn shared_tasks(&self) -> Vec<SharedTask> {
        parse_shared(self.memory.retrieve(SHARED_TASKS_KEY).await.as_ref())
    }

    /// 关闭共享任务；id 不存在返回 false
    pub async fn close_shared_task(&self, id: &str) -> Result<bool> {
        let closed = self
            .memory
            .update(SHARED_TASKS_KEY, |current| {
                let mut tasks = parse_shared(current);
                let Some(task) = tasks.iter_mut().find(|t| t.id == id) else {
                    return Ok(None);
                };
                task.status = "done".to_string();
                Ok(Some(serde_json::to_value(tasks)?))
            })
            .await?;
        Ok(closed)
    }
}

fn parse_shared(value: Option<&Value>) -> Vec<SharedTask> {
    match value {
        Some(value @ Value::Array(_)) => serde_json::from_value(value.clone()).unwrap_or_default(),
        _ => vec![],
    }
}
