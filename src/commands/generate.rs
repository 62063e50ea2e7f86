use std::path::Path;

use async_trait::async_trait;
use color_eyre::eyre::Result;
use tracing::info;

use crate::generators::{CodeGenerator, MiniReadmeGenerator};
use crate::workspace::CommandOutput;

use super::traits::{Command, CommandContext};

/// 会话记忆中最近生成的测试文件
pub const LAST_TESTS_WRITTEN: &str = "last_tests_written";

/// `generate tests <path>` / `generate readme <path>`
pub struct GenerateCommand;

/// 源文件对应的生成测试路径：`tests/test_generated_for_<stem>.<ext>`
pub fn generated_tests_path(source: &str) -> String {
    let path = Path::new(source);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "source".to_string());
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_else(|| "py".to_string());
    format!("tests/test_generated_for_{}.{}", stem, ext)
}

#[async_trait]
impl Command for GenerateCommand {
    fn name(&self) -> &str {
        "generate"
    }

    fn usage(&self) -> &str {
        "generate tests|readme <path>"
    }

    fn description(&self) -> &str {
        "Generate unit tests or a mini README for a source file"
    }

    async fn execute(&self, args: &[String], ctx: &CommandContext) -> Result<CommandOutput> {
        let (Some(kind), Some(source)) = (args.first(), args.get(1)) else {
            return Ok(CommandOutput::failure(2, format!("usage: {}", self.usage())));
        };

        match kind.to_lowercase().as_str() {
            "tests" | "test" => generate_tests(source, ctx).await,
            "readme" => {
                let generator = MiniReadmeGenerator::new(
                    ctx.provider.clone(),
                    ctx.style.clone(),
                    ctx.workspace.clone(),
                    ctx.options,
                );
                let written = generator.generate_for_file(source).await?;
                Ok(CommandOutput::ok(format!(
                    "mini README written to {}",
                    ctx.workspace.relative(&written)
                )))
            }
            other => Ok(CommandOutput::failure(
                2,
                format!("unknown generate target '{}'; usage: {}", other, self.usage()),
            )),
        }
    }
}

async fn generate_tests(source: &str, ctx: &CommandContext) -> Result<CommandOutput> {
    let code = match ctx.workspace.read_file(source).await {
        Ok(code) => code,
        Err(e) => return Ok(CommandOutput::failure(1, e.to_string())),
    };
    let file_name = Path::new(source)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| source.to_string());

    let generator = CodeGenerator::new(
        ctx.provider.clone(),
        ctx.memory.clone(),
        ctx.profile.clone(),
        ctx.options,
    );
    let tests = generator.generate_unit_tests(&code, &file_name).await?;

    let target = generated_tests_path(source);
    let written = match ctx.workspace.write_file(&target, &tests).await {
        Ok(p) => ctx.workspace.relative(&p),
        Err(e) => return Ok(CommandOutput::failure(1, e.to_string())),
    };
    ctx.memory.remember(LAST_TESTS_WRITTEN, written.clone());
    info!("generated tests for {} at {}", source, written);
    Ok(CommandOutput::ok(format!("tests written to {}", written)))
}
