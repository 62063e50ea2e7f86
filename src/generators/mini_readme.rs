use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::eyre::{bail, eyre, Context, Result};
use tracing::info;

use crate::providers::{GenerationOptions, Provider};
use crate::style::SharedStyle;
use crate::workspace::Workspace;

use super::code::language_for;

/// 为单个源文件生成 `<file>.readme.md`
pub struct MiniReadmeGenerator {
    provider: Arc<dyn Provider>,
    style: SharedStyle,
    workspace: Arc<Workspace>,
    options: GenerationOptions,
}

impl MiniReadmeGenerator {
    pub fn new(
        provider: Arc<dyn Provider>,
        style: SharedStyle,
        workspace: Arc<Workspace>,
        options: GenerationOptions,
    ) -> Self {
        Self {
            provider,
            style,
            workspace,
            options: options.with_max_tokens(600),
        }
    }

    /// 读取源文件、生成说明并写到旁边，返回写入的路径
    pub async fn generate_for_file(&self, path: &str) -> Result<PathBuf> {
        let content = self.workspace.read_file(path).await?;
        if content.trim().is_empty() {
            bail!("{} is empty, nothing to document", path);
        }

        let resolved = self.workspace.resolve(path)?;
        let file_name = resolved
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| eyre!("{} has no file name", path))?;
        let tone = self.style.read().await.get_str("general_tone", "professional");
        let (language, _) = language_for(&file_name);

        let prompt = format!(
            "You are an expert technical writer producing concise, developer-friendly docs.\n\
             Write a 'mini README' in Markdown for the {language} file '{file_name}'.\n\n\
             **Style:** tone {tone}; standard Markdown with headers, bullets and code blocks.\n\n\
             **File content:**\n```\n{content}\n```\n\n\
             Include exactly these sections:\n\
             1. `## Purpose`: one or two sentences on the file's role.\n\
             2. `## Key Components`: the main classes, functions or variables, one bullet each.\n\
             3. `## Usage Example`: a short snippet, or \"No specific usage example required.\"\n\n\
             Output only the raw Markdown."
        );

        let readme = self
            .provider
            .generate_text(&prompt, &self.options)
            .await
            .wrap_err_with(|| format!("mini README generation for {} failed", file_name))?;
        if readme.trim().is_empty() {
            bail!("provider returned an empty mini README for {}", file_name);
        }

        let target = resolved.with_file_name(format!("{}.readme.md", file_name));
        let written = self.workspace.write_file(&target, &readme).await?;
        info!("mini README for {} saved to {}", file_name, written.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::ScriptedProvider;
    use crate::style::StylePreferences;

    fn setup(
        provider: Arc<ScriptedProvider>,
    ) -> (MiniReadmeGenerator, tempfile::TempDir, tempfile::TempDir) {
        let root = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let style = StylePreferences::open_in(data.path()).unwrap().shared();
        let generator = MiniReadmeGenerator::new(
            provider,
            style,
            Arc::new(Workspace::new(root.path())),
            GenerationOptions::default(),
        );
        (generator, root, data)
    }

    #[tokio::test]
    async fn writes_readme_beside_source() {
        let provider = Arc::new(ScriptedProvider::new(vec!["## Purpose\nMath helpers."]));
        let (generator, root, _data) = setup(provider.clone());
        std::fs::create_dir(root.path().join("core")).unwrap();
        std::fs::write(root.path().join("core/calc.py"), "def add(a, b):\n    return a + b\n")
            .unwrap();

        let written = generator.generate_for_file("core/calc.py").await.unwrap();
        assert!(written.ends_with("core/calc.py.readme.md"));
        assert_eq!(
            std::fs::read_to_string(written).unwrap(),
            "## Purpose\nMath helpers."
        );
        assert!(provider.last_prompt().contains("'calc.py'"));
    }

    #[tokio::test]
    async fn empty_source_is_rejected_without_llm_call() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let (generator, root, _data) = setup(provider.clone());
        std::fs::write(root.path().join("empty.py"), "  \n").unwrap();

        assert!(generator.generate_for_file("empty.py").await.is_err());
        assert!(provider.prompts().is_empty());
    }
}
