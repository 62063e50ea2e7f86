use std::path::PathBuf;

use thiserror::Error;

/// 工作区文件操作错误（调用方需要区分"越界"与"普通 I/O 失败"）
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("path '{}' resolves outside the project root", .0.display())]
    OutsideRoot(PathBuf),

    #[error("'{}' is not a file", .0.display())]
    NotAFile(PathBuf),

    #[error("i/o error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 记忆存储错误
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("invalid checkpoint name '{0}': use letters and digits only")]
    InvalidCheckpointName(String),

    #[error("checkpoint '{0}' not found")]
    CheckpointNotFound(String),

    #[error("memory backend i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("memory document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// LLM 调用中需要按类型区分的错误（决定是否重试）
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} API key missing: {hint}")]
    MissingKey {
        provider: &'static str,
        hint: &'static str,
    },

    #[error("{provider} request failed ({status}): {body}")]
    Status {
        provider: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("{provider} blocked the prompt: {reason}")]
    Blocked {
        provider: &'static str,
        reason: String,
    },
}

impl ProviderError {
    /// 重试也无法恢复：缺 key、内容拦截、除 408/429 外的 4xx
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::MissingKey { .. } | Self::Blocked { .. } => true,
            Self::Status { status, .. } => {
                status.is_client_error()
                    && *status != reqwest::StatusCode::TOO_MANY_REQUESTS
                    && *status != reqwest::StatusCode::REQUEST_TIMEOUT
            }
        }
    }
}

/// GitHub API 调用错误
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub token not configured: set GITHUB_TOKEN or [github].token")]
    MissingToken,

    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("GitHub request failed: {0}")]
    Http(#[from] reqwest::Error),
}
