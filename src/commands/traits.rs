use std::sync::Arc;

use async_trait::async_trait;
use color_eyre::eyre::Result;

use crate::memory::Memory;
use crate::profile::UserProfile;
use crate::providers::{GenerationOptions, Provider};
use crate::style::SharedStyle;
use crate::workspace::{CommandOutput, Workspace};

/// `write` 没有内联内容时向用户索取文件内容；返回 None 表示放弃
pub type ContentPrompt = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// 命令执行时可用的共享依赖
#[derive(Clone)]
pub struct CommandContext {
    pub workspace: Arc<Workspace>,
    pub memory: Arc<Memory>,
    pub provider: Arc<dyn Provider>,
    pub options: GenerationOptions,
    pub profile: UserProfile,
    pub style: SharedStyle,
    pub content_prompt: Option<ContentPrompt>,
}

/// 可分派的命令抽象
#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &str;

    /// 用法，如 `read <path>`
    fn usage(&self) -> &str;

    fn description(&self) -> &str;

    /// 执行命令；参数错误返回非零 code 的输出，只有意外故障才返回 Err
    async fn execute(&self, args: &[String], ctx: &CommandContext) -> Result<CommandOutput>;
}
