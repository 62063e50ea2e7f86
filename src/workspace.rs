use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::error::WorkspaceError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// 目录遍历时跳过的目录
const IGNORED_DIRS: &[&str] = &[".git", "target", "node_modules", "__pycache__", ".venv"];

/// 命令执行结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// stdout + stderr，作为修复提示中的错误日志
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// 项目根目录沙箱：所有文件操作和命令都限定在 root 内
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    command_timeout: Duration,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self {
            root,
            command_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 解析路径并确认它在 root 内
    /// 会 canonicalize 已存在的祖先以防 symlink 和 `..` 逃逸
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf, WorkspaceError> {
        let path = path.as_ref();
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let resolved = canonicalize_with_ancestors(&normalize_path(&joined));

        if !resolved.starts_with(&self.root) {
            return Err(WorkspaceError::OutsideRoot(path.to_path_buf()));
        }
        Ok(resolved)
    }

    /// 相对 root 的显示路径
    pub fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    pub async fn read_file(&self, path: impl AsRef<Path>) -> Result<String, WorkspaceError> {
        let resolved = self.resolve(path)?;
        if !resolved.is_file() {
            return Err(WorkspaceError::NotAFile(resolved));
        }
        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|source| WorkspaceError::Io {
                path: resolved,
                source,
            })
    }

    /// 写文件（自动创建父目录），返回解析后的路径
    pub async fn write_file(
        &self,
        path: impl AsRef<Path>,
        content: &str,
    ) -> Result<PathBuf, WorkspaceError> {
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| WorkspaceError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(&resolved, content)
            .await
            .map_err(|source| WorkspaceError::Io {
                path: resolved.clone(),
                source,
            })?;
        debug!("wrote {} bytes to {}", content.len(), resolved.display());
        Ok(resolved)
    }

    /// 递归列出目录下的文件（相对 root，排序，跳过 .git 等）
    pub fn list_files(&self, dir: impl AsRef<Path>) -> Result<Vec<String>, WorkspaceError> {
        let resolved = self.resolve(dir)?;
        let mut files: Vec<String> = walkdir::WalkDir::new(&resolved)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0 || !(e.file_type().is_dir() && is_ignored_dir(e.file_name()))
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| self.relative(e.path()))
            .collect();
        files.sort();
        Ok(files)
    }

    /// 在 root 下用 `sh -c` 执行命令
    /// 超时返回 code -1；无法启动 shell 返回 code 127
    pub async fn execute(&self, command: &str) -> CommandOutput {
        debug!("exec in {}: {}", self.root.display(), command);
        let result = tokio::time::timeout(
            self.command_timeout,
            Command::new("sh")
                .arg("-c")
                .arg(command)
                .current_dir(&self.root)
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) => CommandOutput {
                code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            },
            Ok(Err(e)) => CommandOutput::failure(127, format!("failed to spawn shell: {}", e)),
            Err(_) => CommandOutput::failure(
                -1,
                format!(
                    "command timed out after {}s",
                    self.command_timeout.as_secs()
                ),
            ),
        }
    }
}

/// 是否为遍历时应跳过的目录名
pub fn is_ignored_dir(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| IGNORED_DIRS.contains(&n))
}

/// 手动规范化路径（处理 `.` 和 `..`，不访问文件系统）
fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                components.pop();
            }
            Component::CurDir => {}
            other => components.push(other),
        }
    }
    components.iter().collect()
}

/// 向上查找可 canonicalize 的祖先目录，解析中间 symlink
fn canonicalize_with_ancestors(path: &Path) -> PathBuf {
    let mut current = path.to_path_buf();
    let mut suffix_parts = Vec::new();

    loop {
        match current.canonicalize() {
            Ok(canonical) => {
                let mut result = canonical;
                for part in suffix_parts.into_iter().rev() {
                    result = result.join(part);
                }
                return result;
            }
            Err(_) => match (current.file_name(), current.parent()) {
                (Some(file_name), Some(parent)) => {
                    suffix_parts.push(file_name.to_os_string());
                    current = parent.to_path_buf();
                }
                _ => return path.to_path_buf(),
            },
        }
    }
}

/// 目录名: 小写，空白/连字符转下划线，去掉其他非单词字符，合并连续下划线
pub fn sanitize_directory_name(name: &str) -> String {
    sanitize_with(name, '_')
}

/// 文件名: 同上，但使用连字符
pub fn sanitize_filename(name: &str) -> String {
    sanitize_with(name, '-')
}

fn sanitize_with(name: &str, sep: char) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().to_lowercase().chars() {
        let mapped = if c.is_whitespace() || c == '-' || c == '_' {
            Some(sep)
        } else if c.is_alphanumeric() {
            Some(c)
        } else {
            None
        };
        if let Some(m) = mapped {
            if m == sep && out.ends_with(sep) {
                continue;
            }
            out.push(m);
        }
    }
    out.trim_matches(sep).to_string()
}
