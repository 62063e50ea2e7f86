pub mod exec;
pub mod file;
pub mod generate;
pub mod traits;

pub use exec::ExecCommand;
pub use file::{LsCommand, ReadCommand, WriteCommand, LAST_FILE_WRITTEN};
pub use generate::{GenerateCommand, LAST_TESTS_WRITTEN};
pub use traits::{Command, CommandContext, ContentPrompt};

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::workspace::CommandOutput;

/// 未知命令的退出码（与 shell 的 "command not found" 一致）
pub const UNKNOWN_COMMAND_CODE: i32 = 127;

/// 命令注册表与分派器
pub struct CommandManager {
    commands: BTreeMap<String, Box<dyn Command>>,
    ctx: CommandContext,
}

impl CommandManager {
    /// 空注册表
    pub fn new(ctx: CommandContext) -> Self {
        Self {
            commands: BTreeMap::new(),
            ctx,
        }
    }

    /// 注册全部内置命令
    pub fn with_builtins(ctx: CommandContext) -> Self {
        let mut manager = Self::new(ctx);
        manager.register(Box::new(ReadCommand));
        manager.register(Box::new(WriteCommand));
        manager.register(Box::new(LsCommand));
        manager.register(Box::new(ExecCommand));
        manager.register(Box::new(GenerateCommand));
        manager
    }

    /// 同名命令后注册的覆盖先注册的
    pub fn register(&mut self, command: Box<dyn Command>) {
        self.commands.insert(command.name().to_lowercase(), command);
    }

    pub fn context(&self) -> &CommandContext {
        &self.ctx
    }

    pub fn has(&self, name: &str) -> bool {
        self.commands.contains_key(&name.to_lowercase())
    }

    /// 分派命令；未知命令返回 code 127，命令内部错误返回 code 1
    pub async fn execute(&self, name: &str, args: &[String]) -> CommandOutput {
        let key = name.to_lowercase();
        let Some(command) = self.commands.get(&key) else {
            return CommandOutput::failure(
                UNKNOWN_COMMAND_CODE,
                format!("unknown command '{}'. Type 'help' for options.", name),
            );
        };

        debug!("dispatching {} {:?}", key, args);
        let output = match command.execute(args, &self.ctx).await {
            Ok(output) => output,
            Err(e) => CommandOutput::failure(1, format!("{:#}", e)),
        };

        if let Err(e) = self.ctx.memory.log_command(&key, args).await {
            warn!("failed to record command history: {}", e);
        }
        output
    }

    /// (用法, 描述)，按名称排序
    pub fn list(&self) -> Vec<(String, String)> {
        self.commands
            .values()
            .map(|c| (c.usage().to_string(), c.description().to_string()))
            .collect()
    }
}

/// 测试用的命令上下文：临时项目根 + 临时数据目录
#[cfg(test)]
pub(crate) async fn test_context_with(
    provider: std::sync::Arc<dyn crate::providers::Provider>,
) -> (CommandContext, tempfile::TempDir, tempfile::TempDir) {
    use std::sync::Arc;

    let root = tempfile::tempdir().unwrap();
    let (memory, data) = crate::memory::test_memory().await;
    let profile = crate::profile::UserProfile::load(memory.clone()).await.unwrap();
    let style = crate::style::StylePreferences::open_in(data.path())
        .unwrap()
        .shared();
    let ctx = CommandContext {
        workspace: Arc::new(crate::workspace::Workspace::new(root.path())),
        memory,
        provider,
        options: crate::providers::GenerationOptions::default(),
        profile,
        style,
        content_prompt: None,
    };
    (ctx, root, data)
}

#[cfg(test)]
pub(crate) async fn test_context() -> (CommandContext, tempfile::TempDir, tempfile::TempDir) {
    test_context_with(std::sync::Arc::new(
        crate::providers::testing::ScriptedProvider::new(vec![]),
    ))
    .await
}
