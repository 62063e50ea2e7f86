use std::path::{Path, PathBuf};

use color_eyre::eyre::{bail, Context, Result};
use tracing::info;

use crate::generators::readme::brief_title;
use crate::generators::{ReadmeGenerator, RoadmapGenerator};
use crate::workspace::{sanitize_directory_name, Workspace};

/// 新项目的标准子目录
pub const PROJECT_SUBDIRS: &[&str] = &["core", "data/prompts", "data/documents", "tests", "ui"];

const GITIGNORE: &str = "*.pyc\n__pycache__/\n.env\n.venv/\ndata/local_llm_models/\n*.log\n";
const REQUIREMENTS: &str = "# Project dependencies\nfastapi\nuvicorn\n";
const GITKEEP_DIRS: &[&str] = &["core", "data/prompts", "data/documents", "tests"];

/// 在本地创建新项目的目录结构与初始文件
pub struct ProjectScaffolder {
    readme: ReadmeGenerator,
    roadmap: RoadmapGenerator,
}

impl ProjectScaffolder {
    pub fn new(readme: ReadmeGenerator, roadmap: RoadmapGenerator) -> Self {
        Self { readme, roadmap }
    }

    /// 在 `base` 下创建 `<sanitised name>/`，返回项目目录
    pub async fn scaffold(
        &self,
        name: &str,
        brief: &[(String, String)],
        base: &Path,
    ) -> Result<PathBuf> {
        let dir_name = sanitize_directory_name(name);
        if dir_name.is_empty() {
            bail!("project name '{}' has no usable characters", name);
        }
        let project = base.join(&dir_name);
        info!("scaffolding project at {}", project.display());

        for sub in PROJECT_SUBDIRS {
            tokio::fs::create_dir_all(project.join(sub))
                .await
                .wrap_err_with(|| format!("failed to create {}/{}", dir_name, sub))?;
        }

        // brief 缺少 title 时用项目名
        let mut brief = brief.to_vec();
        if !brief.iter().any(|(k, _)| k == "title") {
            brief.insert(0, ("title".to_string(), name.to_string()));
        }

        let readme = self.readme.generate(&brief).await?;
        let roadmap = self.roadmap.generate(&brief).await?;

        let ws = Workspace::new(&project);
        ws.write_file("README.md", &readme).await?;
        ws.write_file("roadmap.md", &roadmap).await?;
        ws.write_file(".gitignore", GITIGNORE).await?;
        ws.write_file("main.py", &main_py(brief_title(&brief))).await?;
        ws.write_file("requirements.txt", REQUIREMENTS).await?;
        for dir in GITKEEP_DIRS {
            ws.write_file(format!("{}/.gitkeep", dir), "").await?;
        }

        info!("project '{}' scaffolded", name);
        Ok(ws.root().to_path_buf())
    }
}

fn main_py(title: &str) -> String {
    format!(
        "# main.py for {title}\n\n\
         def main():\n    print(\"Welcome to {title}!\")\n\n\
         if __name__ == \"__main__\":\n    main()\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::providers::testing::ScriptedProvider;
    use crate::providers::GenerationOptions;
    use crate::style::StylePreferences;

    fn scaffolder(replies: Vec<&str>, data: &Path) -> (ProjectScaffolder, Arc<ScriptedProvider>) {
        let provider = Arc::new(ScriptedProvider::new(replies));
        let style = StylePreferences::open_in(data).unwrap().shared();
        let opts = GenerationOptions::default();
        (
            ProjectScaffolder::new(
                ReadmeGenerator::new(provider.clone(), style.clone(), opts),
                RoadmapGenerator::new(provider.clone(), style, opts),
            ),
            provider,
        )
    }

    #[tokio::test]
    async fn creates_layout_and_files() {
        let data = tempfile::tempdir().unwrap();
        let base = tempfile::tempdir().unwrap();
        let (scaffolder, provider) = scaffolder(vec!["# Sock Matcher", "- [ ] Phase 1"], data.path());

        let project = scaffolder
            .scaffold("Sock Matcher!", &[("summary".to_string(), "pairs socks".to_string())], base.path())
            .await
            .unwrap();

        assert!(project.ends_with("sock_matcher"));
        for sub in PROJECT_SUBDIRS {
            assert!(project.join(sub).is_dir(), "{} missing", sub);
        }
        assert_eq!(std::fs::read_to_string(project.join("README.md")).unwrap(), "# Sock Matcher");
        assert_eq!(std::fs::read_to_string(project.join("roadmap.md")).unwrap(), "- [ ] Phase 1");
        assert!(std::fs::read_to_string(project.join("main.py"))
            .unwrap()
            .contains("print(\"Welcome to Sock Matcher!!\")"));
        assert!(project.join("data/prompts/.gitkeep").exists());
        assert!(project.join("requirements.txt").exists());
        assert!(std::fs::read_to_string(project.join(".gitignore")).unwrap().contains("__pycache__/"));

        // 项目名作为 title 注入简介
        assert!(provider.prompts()[0].contains("- title: Sock Matcher!"));
    }

    #[tokio::test]
    async fn unusable_name_is_rejected() {
        let data = tempfile::tempdir().unwrap();
        let (scaffolder, provider) = scaffolder(vec![], data.path());
        assert!(scaffolder.scaffold("???", &[], data.path()).await.is_err());
        assert!(provider.prompts().is_empty());
    }

    #[tokio::test]
    async fn generator_failure_propagates() {
        let data = tempfile::tempdir().unwrap();
        let base = tempfile::tempdir().unwrap();
        let (scaffolder, _provider) = scaffolder(vec!["# only readme"], data.path());
        assert!(scaffolder.scaffold("demo", &[], base.path()).await.is_err());
        assert!(!base.path().join("demo/README.md").exists());
    }
}
