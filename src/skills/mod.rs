pub mod manifest;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use color_eyre::eyre::{bail, eyre, Context, Result};
use regex::Regex;
use tracing::{info, warn};

pub use manifest::{parse_skill_md, SkillManifest, SkillParameter};

use crate::commands::CommandManager;
use crate::workspace::CommandOutput;

// 内置 skill 文件（编译时嵌入）
const BUILTIN_HELLO_WORLD: &str = include_str!("builtin/hello-world.md");
const BUILTIN_CREATE_PROJECT_DIRS: &str = include_str!("builtin/create-project-dirs.md");
const BUILTIN_SUMMARIZE_FILE: &str = include_str!("builtin/summarize-file.md");

/// 项目级 skill 目录（相对项目根）
pub const PROJECT_SKILLS_DIR: &str = ".giblet/skills";

/// Skill 来源（决定优先级和显示标签）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SkillSource {
    BuiltIn,
    Global,
    Project,
}

impl SkillSource {
    pub fn label(&self) -> &'static str {
        match self {
            SkillSource::BuiltIn => "[builtin]",
            SkillSource::Global => "[global]",
            SkillSource::Project => "[project]",
        }
    }
}

/// Skill 元数据
#[derive(Debug, Clone)]
pub struct SkillMeta {
    pub name: String,
    pub description: String,
    pub triggers: Vec<String>,
    pub source: SkillSource,
    /// SKILL.md 所在目录，内置 skill 为 None
    pub path: Option<PathBuf>,
}

/// 一次 skill 执行的结果
#[derive(Debug, Clone, Default)]
pub struct SkillOutcome {
    pub success: bool,
    /// (展开后的步骤, 输出)
    pub steps: Vec<(String, CommandOutput)>,
}

/// 可插拔行为单元
#[async_trait]
pub trait Skill: Send + Sync {
    fn meta(&self) -> &SkillMeta;

    /// 目标描述是否适合由该 skill 处理
    fn can_handle(&self, goal: &str) -> bool;

    fn parameters(&self) -> &[SkillParameter];

    async fn execute(
        &self,
        goal: &str,
        params: &HashMap<String, String>,
        commands: &CommandManager,
    ) -> Result<SkillOutcome>;
}

/// 由 SKILL.md 声明的 skill：按顺序分派 `## Steps` 中的命令
#[derive(Debug, Clone)]
pub struct ManifestSkill {
    meta: SkillMeta,
    parameters: Vec<SkillParameter>,
    steps: Vec<String>,
}

impl ManifestSkill {
    pub fn from_manifest(manifest: SkillManifest, source: SkillSource, path: Option<PathBuf>) -> Self {
        Self {
            meta: SkillMeta {
                name: manifest.name,
                description: manifest.description,
                triggers: manifest.triggers,
                source,
                path,
            },
            parameters: manifest.parameters,
            steps: manifest.steps,
        }
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    /// 合并默认值并检查必填参数
    pub fn resolve_params(
        &self,
        params: &HashMap<String, String>,
    ) -> Result<HashMap<String, String>> {
        let mut resolved = HashMap::new();
        for p in &self.parameters {
            match params.get(&p.name).or(p.default.as_ref()) {
                Some(v) => {
                    resolved.insert(p.name.clone(), v.clone());
                }
                None => bail!(
                    "skill '{}' needs parameter '{}' ({})",
                    self.meta.name,
                    p.name,
                    p.description
                ),
            }
        }
        // 未声明的参数也允许用于占位符
        for (k, v) in params {
            resolved.entry(k.clone()).or_insert_with(|| v.clone());
        }
        Ok(resolved)
    }
}

/// 替换 `{name}` 占位符；未知占位符保持原样
pub fn substitute(step: &str, params: &HashMap<String, String>) -> String {
    static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = PLACEHOLDER
        .get_or_init(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").ok())
        .as_ref()
    else {
        return step.to_string();
    };
    re.replace_all(step, |caps: &regex::Captures| {
        params
            .get(&caps[1])
            .cloned()
            .unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}

#[async_trait]
impl Skill for ManifestSkill {
    fn meta(&self) -> &SkillMeta {
        &self.meta
    }

    fn can_handle(&self, goal: &str) -> bool {
        let goal = goal.to_lowercase();
        self.meta
            .triggers
            .iter()
            .any(|t| !t.is_empty() && goal.contains(&t.to_lowercase()))
    }

    fn parameters(&self) -> &[SkillParameter] {
        &self.parameters
    }

    async fn execute(
        &self,
        goal: &str,
        params: &HashMap<String, String>,
        commands: &CommandManager,
    ) -> Result<SkillOutcome> {
        let params = self.resolve_params(params)?;
        info!("running skill {} for goal: {}", self.meta.name, goal);

        let mut outcome = SkillOutcome {
            success: true,
            steps: vec![],
        };
        for template in &self.steps {
            let step = substitute(template, &params);
            let parts = shell_words::split(&step)
                .wrap_err_with(|| format!("cannot tokenize skill step '{}'", step))?;
            let Some((name, args)) = parts.split_first() else {
                continue;
            };
            let output = commands.execute(&name.to_lowercase(), args).await;
            let failed = !output.success();
            outcome.steps.push((step, output));
            if failed {
                outcome.success = false;
                break;
            }
        }
        Ok(outcome)
    }
}

/// 校验 skill name 合法性
/// 格式: ^[a-z0-9][a-z0-9-]*$，长度 1-64
pub fn validate_skill_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 {
        return Err(eyre!("skill name must be 1-64 characters long"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(eyre!(
            "skill name may only contain lowercase letters, digits and '-', got: {}",
            name
        ));
    }
    if name.starts_with('-') {
        return Err(eyre!("skill name must not start with '-'"));
    }
    Ok(())
}

/// 扫描目录，每个子目录需包含 SKILL.md；无效的跳过并告警
pub fn scan_skills_dir(dir: &Path, source: SkillSource) -> Vec<ManifestSkill> {
    let mut skills = Vec::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return skills,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let skill_file = path.join("SKILL.md");
        let content = match std::fs::read_to_string(&skill_file) {
            Ok(c) => c,
            Err(_) => continue,
        };

        match parse_skill_md(&content).and_then(|m| validate_skill_name(&m.name).map(|_| m)) {
            Ok(manifest) => skills.push(ManifestSkill::from_manifest(manifest, source, Some(path))),
            Err(e) => warn!("skipping invalid skill {}: {}", skill_file.display(), e),
        }
    }

    skills
}

/// 内置 skills
pub fn builtin_skills() -> Vec<ManifestSkill> {
    let builtins = [
        ("hello-world", BUILTIN_HELLO_WORLD),
        ("create-project-dirs", BUILTIN_CREATE_PROJECT_DIRS),
        ("summarize-file", BUILTIN_SUMMARIZE_FILE),
    ];
    let mut skills = Vec::new();
    for (key, content) in builtins {
        match parse_skill_md(content) {
            Ok(manifest) => {
                skills.push(ManifestSkill::from_manifest(manifest, SkillSource::BuiltIn, None))
            }
            Err(e) => warn!("builtin skill '{}' failed to parse: {}", key, e),
        }
    }
    skills
}

/// skill 注册表：内置 < 全局 < 项目，同名高优先级覆盖
pub struct SkillManager {
    project_root: PathBuf,
    global_dir: PathBuf,
    skills: Vec<ManifestSkill>,
}

impl SkillManager {
    pub fn discover(project_root: &Path, global_dir: &Path) -> Self {
        let mut manager = Self {
            project_root: project_root.to_path_buf(),
            global_dir: global_dir.to_path_buf(),
            skills: vec![],
        };
        manager.refresh();
        manager
    }

    /// 重新扫描所有目录
    pub fn refresh(&mut self) {
        let project_dir = self.project_dir();
        let global = scan_skills_dir(&self.global_dir, SkillSource::Global);
        let project = scan_skills_dir(&project_dir, SkillSource::Project);

        let mut result: Vec<ManifestSkill> = Vec::new();
        for skill in builtin_skills().into_iter().chain(global).chain(project) {
            if let Some(pos) = result.iter().position(|s| s.meta.name == skill.meta.name) {
                result[pos] = skill;
            } else {
                result.push(skill);
            }
        }
        result.sort_by(|a, b| a.meta.name.cmp(&b.meta.name));
        info!("{} skills available", result.len());
        self.skills = result;
    }

    pub fn project_dir(&self) -> PathBuf {
        self.project_root.join(PROJECT_SKILLS_DIR)
    }

    pub fn get(&self, name: &str) -> Option<&ManifestSkill> {
        self.skills.iter().find(|s| s.meta.name == name)
    }

    pub fn list(&self) -> Vec<&SkillMeta> {
        self.skills.iter().map(|s| &s.meta).collect()
    }

    /// 第一个能处理该目标的 skill（按名称顺序）
    pub fn find_for(&self, goal: &str) -> Option<&ManifestSkill> {
        self.skills.iter().find(|s| s.can_handle(goal))
    }

    /// 把 SKILL.md 内容保存为项目级 skill 并刷新
    pub fn save_project_skill(&mut self, content: &str) -> Result<PathBuf> {
        let manifest = parse_skill_md(content)?;
        validate_skill_name(&manifest.name)?;
        let dir = self.project_dir().join(&manifest.name);
        std::fs::create_dir_all(&dir)
            .wrap_err_with(|| format!("creating {} failed", dir.display()))?;
        let file = dir.join("SKILL.md");
        std::fs::write(&file, content)
            .wrap_err_with(|| format!("writing {} failed", file.display()))?;
        self.refresh();
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_context;
    use tempfile::tempdir;

    fn write_skill(dir: &Path, name: &str, desc: &str, steps: &str) {
        let skill_dir = dir.join(name);
        std::fs::create_dir_all(&skill_dir).unwrap();
        let content = format!(
            "---\nname: {}\ndescription: {}\ntriggers: [{}]\n---\n\n## Steps\n{}",
            name, desc, name, steps
        );
        std::fs::write(skill_dir.join("SKILL.md"), content).unwrap();
    }

    #[test]
    fn validate_valid_names() {
        assert!(validate_skill_name("hello-world").is_ok());
        assert!(validate_skill_name("abc123").is_ok());
        assert!(validate_skill_name("a").is_ok());
    }

    #[test]
    fn validate_invalid_names() {
        assert!(validate_skill_name("").is_err());
        assert!(validate_skill_name("-starts-with-dash").is_err());
        assert!(validate_skill_name("HasUpperCase").is_err());
        assert!(validate_skill_name("has space").is_err());
        assert!(validate_skill_name("has_underscore").is_err());
        assert!(validate_skill_name(&"a".repeat(65)).is_err());
    }

    #[test]
    fn builtin_skills_parse() {
        let skills = builtin_skills();
        let names: Vec<&str> = skills.iter().map(|s| s.meta.name.as_str()).collect();
        assert_eq!(names, vec!["hello-world", "create-project-dirs", "summarize-file"]);
        for s in &skills {
            assert!(!s.steps().is_empty(), "skill '{}' has no steps", s.meta.name);
        }
    }

    #[test]
    fn scan_skips_invalid_manifests() {
        let tmp = tempdir().unwrap();
        write_skill(tmp.path(), "valid-skill", "works", "- ls");
        std::fs::create_dir(tmp.path().join("no-manifest")).unwrap();
        let bad = tmp.path().join("bad");
        std::fs::create_dir(&bad).unwrap();
        std::fs::write(bad.join("SKILL.md"), "no frontmatter").unwrap();
        write_skill(tmp.path(), "Bad_Name", "invalid name", "- ls");

        let skills = scan_skills_dir(tmp.path(), SkillSource::Global);
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].meta.name, "valid-skill");
    }

    #[test]
    fn priority_is_project_over_global_over_builtin() {
        let project = tempdir().unwrap();
        let global = tempdir().unwrap();
        write_skill(global.path(), "hello-world", "global hello", "- ls");
        write_skill(global.path(), "shared", "global shared", "- ls");
        write_skill(&project.path().join(PROJECT_SKILLS_DIR), "shared", "project shared", "- ls");

        let manager = SkillManager::discover(project.path(), global.path());
        assert_eq!(manager.get("hello-world").unwrap().meta().source, SkillSource::Global);
        let shared = manager.get("shared").unwrap();
        assert_eq!(shared.meta().description, "project shared");
        assert_eq!(shared.meta().source, SkillSource::Project);
        assert_eq!(manager.list().len(), 4);
    }

    #[test]
    fn find_for_matches_triggers_case_insensitively() {
        let project = tempdir().unwrap();
        let global = tempdir().unwrap();
        let manager = SkillManager::discover(project.path(), global.path());
        assert_eq!(
            manager.find_for("Please SAY HELLO to me").unwrap().meta().name,
            "hello-world"
        );
        assert!(manager.find_for("deploy to prod").is_none());
    }

    #[test]
    fn params_resolve_defaults_and_require_missing() {
        let skills = builtin_skills();
        let summarize = skills.iter().find(|s| s.meta.name == "summarize-file").unwrap();
        assert!(summarize.resolve_params(&HashMap::new()).is_err());

        let hello = skills.iter().find(|s| s.meta.name == "hello-world").unwrap();
        let resolved = hello.resolve_params(&HashMap::new()).unwrap();
        assert_eq!(resolved["name"], "World");
    }

    #[test]
    fn substitute_leaves_unknown_placeholders() {
        let mut params = HashMap::new();
        params.insert("path".to_string(), "a.py".to_string());
        assert_eq!(substitute("read {path} {other}", &params), "read a.py {other}");
    }

    #[tokio::test]
    async fn hello_world_runs_through_commands() {
        let (ctx, _root, _data) = test_context().await;
        let commands = CommandManager::with_builtins(ctx);
        let skills = builtin_skills();
        let hello = skills.iter().find(|s| s.meta.name == "hello-world").unwrap();

        let mut params = HashMap::new();
        params.insert("name".to_string(), "Robin".to_string());
        let outcome = hello.execute("say hello", &params, &commands).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.steps[0].1.stdout.contains("Hello, Robin!"));
    }

    #[tokio::test]
    async fn create_project_dirs_creates_layout() {
        let (ctx, root, _data) = test_context().await;
        let commands = CommandManager::with_builtins(ctx);
        let skills = builtin_skills();
        let skill = skills.iter().find(|s| s.meta.name == "create-project-dirs").unwrap();

        let mut params = HashMap::new();
        params.insert("base_path".to_string(), "app".to_string());
        let outcome = skill.execute("create project structure", &params, &commands).await.unwrap();
        assert!(outcome.success, "{:?}", outcome.steps);
        for dir in ["src", "tests", "docs", "data"] {
            assert!(root.path().join("app").join(dir).is_dir());
        }
    }

    #[tokio::test]
    async fn failing_step_stops_skill() {
        let (ctx, _root, _data) = test_context().await;
        let commands = CommandManager::with_builtins(ctx);
        let skill = ManifestSkill::from_manifest(
            parse_skill_md("---\nname: two\ndescription: d\n---\n## Steps\n- read missing.txt\n- ls\n")
                .unwrap(),
            SkillSource::Project,
            None,
        );
        let outcome = skill.execute("", &HashMap::new(), &commands).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.steps.len(), 1);
    }

    #[test]
    fn save_project_skill_is_discoverable() {
        let project = tempdir().unwrap();
        let global = tempdir().unwrap();
        let mut manager = SkillManager::discover(project.path(), global.path());
        let path = manager
            .save_project_skill("---\nname: my-plan\ndescription: replay\n---\n## Steps\n- ls\n")
            .unwrap();
        assert!(path.ends_with(".giblet/skills/my-plan/SKILL.md"));
        assert_eq!(manager.get("my-plan").unwrap().steps(), ["ls"]);
    }
}
