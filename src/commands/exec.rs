use async_trait::async_trait;
use color_eyre::eyre::Result;

use crate::workspace::CommandOutput;

use super::traits::{Command, CommandContext};

/// 在项目根目录执行 shell 命令
pub struct ExecCommand;

/// 把分词后的参数还原成 shell 命令行
///
/// 单个参数视为完整命令（`exec "pytest -q"`）；多个参数重新加引号拼接。
pub fn shell_line(args: &[String]) -> String {
    match args {
        [single] => single.clone(),
        many => shell_words::join(many),
    }
}

#[async_trait]
impl Command for ExecCommand {
    fn name(&self) -> &str {
        "exec"
    }

    fn usage(&self) -> &str {
        "exec \"<shell command>\""
    }

    fn description(&self) -> &str {
        "Run a shell command in the project root"
    }

    async fn execute(&self, args: &[String], ctx: &CommandContext) -> Result<CommandOutput> {
        if args.is_empty() {
            return Ok(CommandOutput::failure(2, format!("usage: {}", self.usage())));
        }
        Ok(ctx.workspace.execute(&shell_line(args)).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_context;

    #[test]
    fn single_argument_is_passed_verbatim() {
        assert_eq!(shell_line(&["pytest -q tests/".to_string()]), "pytest -q tests/");
    }

    #[test]
    fn multiple_arguments_are_requoted() {
        let args = vec!["echo".to_string(), "a b".to_string()];
        assert_eq!(shell_line(&args), "echo 'a b'");
    }

    #[tokio::test]
    async fn exec_reports_exit_code() {
        let (ctx, _root, _data) = test_context().await;
        let out = ExecCommand
            .execute(&["echo hi && exit 4".to_string()], &ctx)
            .await
            .unwrap();
        assert_eq!(out.code, 4);
        assert_eq!(out.stdout.trim(), "hi");
    }
}
