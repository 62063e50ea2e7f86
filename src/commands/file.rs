use async_trait::async_trait;
use color_eyre::eyre::Result;
use tracing::info;

use crate::workspace::CommandOutput;

use super::traits::{Command, CommandContext};

/// 会话记忆中最近写入的文件
pub const LAST_FILE_WRITTEN: &str = "last_file_written";

/// 读取文件内容
pub struct ReadCommand;

#[async_trait]
impl Command for ReadCommand {
    fn name(&self) -> &str {
        "read"
    }

    fn usage(&self) -> &str {
        "read <path>"
    }

    fn description(&self) -> &str {
        "Print the content of a file inside the project"
    }

    async fn execute(&self, args: &[String], ctx: &CommandContext) -> Result<CommandOutput> {
        let Some(path) = args.first() else {
            return Ok(CommandOutput::failure(2, format!("usage: {}", self.usage())));
        };
        match ctx.workspace.read_file(path).await {
            Ok(content) => Ok(CommandOutput::ok(content)),
            Err(e) => Ok(CommandOutput::failure(1, e.to_string())),
        }
    }
}

/// 写文件：内联内容或通过 ContentPrompt 获取
pub struct WriteCommand;

#[async_trait]
impl Command for WriteCommand {
    fn name(&self) -> &str {
        "write"
    }

    fn usage(&self) -> &str {
        "write <path> [content...]"
    }

    fn description(&self) -> &str {
        "Write a file; without inline content the content is asked for interactively"
    }

    async fn execute(&self, args: &[String], ctx: &CommandContext) -> Result<CommandOutput> {
        let Some((path, rest)) = args.split_first() else {
            return Ok(CommandOutput::failure(2, format!("usage: {}", self.usage())));
        };

        let content = if rest.is_empty() {
            match &ctx.content_prompt {
                Some(prompt) => match prompt(path) {
                    Some(content) => content,
                    None => return Ok(CommandOutput::failure(1, "write cancelled: no content")),
                },
                None => {
                    return Ok(CommandOutput::failure(
                        1,
                        format!("no content given for {} and no interactive input available", path),
                    ))
                }
            }
        } else {
            unescape(&rest.join(" "))
        };

        match ctx.workspace.write_file(path, &content).await {
            Ok(resolved) => {
                let relative = ctx.workspace.relative(&resolved);
                ctx.memory.remember(LAST_FILE_WRITTEN, relative.clone());
                info!("wrote {}", relative);
                Ok(CommandOutput::ok(format!(
                    "wrote {} bytes to {}",
                    content.len(),
                    relative
                )))
            }
            Err(e) => Ok(CommandOutput::failure(1, e.to_string())),
        }
    }
}

/// 列出目录下的文件
pub struct LsCommand;

#[async_trait]
impl Command for LsCommand {
    fn name(&self) -> &str {
        "ls"
    }

    fn usage(&self) -> &str {
        "ls [dir]"
    }

    fn description(&self) -> &str {
        "List files recursively (skipping .git, target, node_modules and friends)"
    }

    async fn execute(&self, args: &[String], ctx: &CommandContext) -> Result<CommandOutput> {
        let dir = args.first().map(String::as_str).unwrap_or(".");
        match ctx.workspace.list_files(dir) {
            Ok(files) => Ok(CommandOutput::ok(files.join("\n"))),
            Err(e) => Ok(CommandOutput::failure(1, e.to_string())),
        }
    }
}

/// 内联内容中的 `\n` `\t` 转义
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some('n') => {
                    out.push('\n');
                    chars.next();
                }
                Some('t') => {
                    out.push('\t');
                    chars.next();
                }
                Some('\\') => {
                    out.push('\\');
                    chars.next();
                }
                _ => out.push(c),
            }
        } else {
            out.push(c);
        }
    }
    out
}
