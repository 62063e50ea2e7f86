//! 创世模式：一句话点子经过一轮提问与回答，整理成结构化的项目简介

use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::eyre::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::generators::{record_interaction, strip_code_fences, truncate_chars};
use crate::git::GitAnalyzer;
use crate::memory::{Memory, FOCUS_KEY};
use crate::profile::UserProfile;
use crate::providers::{GenerationOptions, Provider};
use crate::style::SharedStyle;
use crate::workspace::is_ignored_dir;

/// 会话记忆：进行中的访谈
pub const GENESIS_SESSION_KEY: &str = "genesis_session";
/// 会话记忆：最近一次整理出的简介
pub const GENESIS_BRIEF_KEY: &str = "last_genesis_brief";

const CONTEXT_MAX_FILES: usize = 20;
const CONTEXT_COMMITS: usize = 3;
const RELEVANT_EXTENSIONS: &[&str] = &["py", "rs", "md", "txt", "json", "yml", "yaml", "toml", "sh", "ipynb"];
const RELEVANT_NAMES: &[&str] = &["Dockerfile"];
const CONTEXT_IGNORED: &[&str] = &[".idea", ".vscode", "venv", "build", "dist"];

/// 为 LLM 汇总当前项目的文件结构、最近提交和关注点
pub struct ProjectContextualizer {
    root: PathBuf,
    memory: Arc<Memory>,
}

impl ProjectContextualizer {
    pub fn new(root: impl Into<PathBuf>, memory: Arc<Memory>) -> Self {
        Self {
            root: root.into(),
            memory,
        }
    }

    fn is_relevant(name: &str) -> bool {
        RELEVANT_NAMES.contains(&name)
            || name
                .rsplit_once('.')
                .is_some_and(|(_, ext)| RELEVANT_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
    }

    /// 排序后的相关文件，最多列出 `max_files` 个
    pub fn file_structure_summary(&self, max_files: usize) -> String {
        let mut files: Vec<String> = walkdir::WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !(e.file_type().is_dir()
                        && (is_ignored_dir(e.file_name())
                            || e.file_name().to_str().is_some_and(|n| CONTEXT_IGNORED.contains(&n))))
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && Self::is_relevant(&e.file_name().to_string_lossy()))
            .map(|e| {
                e.path()
                    .strip_prefix(&self.root)
                    .unwrap_or(e.path())
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        files.sort();

        let mut out = String::from("Project File Structure (Partial):\n");
        if files.is_empty() {
            out.push_str("  - No relevant files found or project empty.\n");
            return out;
        }
        for file in files.iter().take(max_files) {
            out.push_str(&format!("  - {}\n", file));
        }
        if files.len() > max_files {
            out.push_str(&format!("  ... and {} more files.\n", files.len() - max_files));
        }
        out
    }

    pub async fn recent_changes_summary(&self, n: usize) -> String {
        let commits = match GitAnalyzer::new(self.root.clone()).commit_log(n).await {
            Ok(c) if !c.is_empty() => c,
            _ => return "Recent Changes: Not a Git repository or no commits found.\n".to_string(),
        };
        let mut out = format!("Recent Changes (last {} commits):\n", commits.len());
        for c in &commits {
            out.push_str(&format!(
                "  - {}: {}\n",
                c.sha,
                c.message.lines().next().unwrap_or_default().trim()
            ));
        }
        out
    }

    pub fn focus_summary(&self) -> String {
        match self.memory.recall_str(FOCUS_KEY) {
            Some(focus) if !focus.is_empty() => format!("Current Focus: {}\n", focus),
            _ => "Current Focus: Not set.\n".to_string(),
        }
    }

    pub async fn full_context(&self) -> String {
        [
            self.file_structure_summary(CONTEXT_MAX_FILES),
            self.recent_changes_summary(CONTEXT_COMMITS).await,
            self.focus_summary(),
        ]
        .join("\n")
    }
}

/// 进行中的访谈：原始点子和 LLM 提出的问题
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisSession {
    pub idea: String,
    pub questions: String,
}

/// 访谈整理出的项目简介
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisBrief {
    pub title: String,
    pub summary: String,
    pub objectives: Vec<String>,
    pub tech_stack: Vec<String>,
    pub target_audience: String,
    pub core_features: Vec<String>,
    pub tone: String,
    /// LLM 没有返回 JSON 时保留的原始整理文本
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

fn text_field(obj: &serde_json::Map<String, Value>, key: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Array(items)) => list_of(items).join(", "),
        _ => String::new(),
    }
}

fn list_field(obj: &serde_json::Map<String, Value>, key: &str) -> Vec<String> {
    match obj.get(key) {
        Some(Value::Array(items)) => list_of(items),
        Some(Value::String(s)) => s
            .split([',', '\n'])
            .map(|p| p.trim().trim_start_matches(['-', '*']).trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        _ => vec![],
    }
}

fn list_of(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .filter(|s| !s.is_empty())
        .collect()
}

impl GenesisBrief {
    /// 解析 LLM 的整理结果；不是 JSON 对象时退化为只含原文的简介
    pub fn parse(raw: &str, idea: &str, default_tone: &str) -> Self {
        let text = strip_code_fences(raw);
        let object = match (text.find('{'), text.rfind('}')) {
            (Some(start), Some(end)) if end > start => {
                match serde_json::from_str::<Value>(&text[start..=end]) {
                    Ok(Value::Object(obj)) => Some(obj),
                    _ => None,
                }
            }
            _ => None,
        };

        let mut brief = match object {
            Some(obj) => Self {
                title: text_field(&obj, "title"),
                summary: text_field(&obj, "summary"),
                objectives: list_field(&obj, "objectives"),
                tech_stack: list_field(&obj, "tech_stack"),
                target_audience: text_field(&obj, "target_audience"),
                core_features: list_field(&obj, "core_features"),
                tone: text_field(&obj, "tone"),
                notes: None,
            },
            None => {
                debug!("genesis synthesis was not JSON, keeping it as notes");
                Self {
                    summary: text
                        .lines()
                        .map(str::trim)
                        .find(|l| !l.is_empty())
                        .unwrap_or_default()
                        .to_string(),
                    notes: (!text.is_empty()).then(|| text.clone()),
                    ..Self::default()
                }
            }
        };
        if brief.title.is_empty() {
            brief.title = truncate_chars(idea.trim(), 60);
        }
        if brief.tone.is_empty() {
            brief.tone = default_tone.to_string();
        }
        brief
    }

    /// 生成器使用的有序 key/value 简介；空字段省略
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let fields = [
            ("title", self.title.clone()),
            ("summary", self.summary.clone()),
            ("objectives", self.objectives.join("; ")),
            ("tech_stack", self.tech_stack.join(", ")),
            ("target_audience", self.target_audience.clone()),
            ("core_features", self.core_features.join("; ")),
            ("tone", self.tone.clone()),
            ("notes", self.notes.clone().unwrap_or_default()),
        ];
        fields
            .into_iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    /// 会话记忆中最近一次的简介
    pub fn recall(memory: &Memory) -> Option<Self> {
        memory
            .recall(GENESIS_BRIEF_KEY)
            .and_then(|v| serde_json::from_value(v).ok())
    }
}

/// 把点子展开成项目简介的对话链
pub struct IdeaInterpreter {
    provider: Arc<dyn Provider>,
    memory: Arc<Memory>,
    profile: UserProfile,
    style: SharedStyle,
    contextualizer: ProjectContextualizer,
    options: GenerationOptions,
}

impl IdeaInterpreter {
    pub fn new(
        provider: Arc<dyn Provider>,
        memory: Arc<Memory>,
        profile: UserProfile,
        style: SharedStyle,
        contextualizer: ProjectContextualizer,
        options: GenerationOptions,
    ) -> Self {
        Self {
            provider,
            memory,
            profile,
            style,
            contextualizer,
            options,
        }
    }

    async fn general_tone(&self) -> String {
        self.style.read().await.get_str("general_tone", "neutral")
    }

    pub async fn question_prompt(&self, idea: &str) -> String {
        let user_name = self.profile.preference_or("general", "user_name", "Dev").await;
        let tone = self.general_tone().await;
        let context = self.contextualizer.full_context().await;
        format!(
            "You are the Genesis Mode of The Giblet, a creative and technical partner helping \
             {user_name} turn a raw idea into a well-defined project plan. \
             Their preferred communication style is '{tone}'.\n\n\
             Current Project Context (if any):\n{context}\n\
             Here is the initial idea: '{idea}'\n\n\
             Ask 3-4 open-ended questions that clarify:\n\
             1. The core problem the idea solves or the primary goal.\n\
             2. The key features (1-3 main ones).\n\
             3. The intended audience or users.\n\
             4. Technology, platform (web, mobile, CLI) and the overall vibe of the project.\n\n\
             Return ONLY the questions, one per line, with no text before or after them."
        )
    }

    pub fn synthesis_prompt(session: &GenesisSession, answers: &str) -> String {
        format!(
            "Based on the following conversation, synthesize a structured project brief.\n\
             Respond with ONLY a JSON object with these keys: \"title\", \"summary\" (one sentence), \
             \"objectives\" (list), \"tech_stack\" (list), \"target_audience\", \"core_features\" (list), \
             \"tone\". If the conversation is too short to decide a field, make a reasonable placeholder.\n\n\
             Conversation History:\n\
             User: {}\n\
             Assistant: {}\n\
             User: {}",
            session.idea, session.questions, answers
        )
    }

    /// 开始访谈：返回问题，并把会话存入会话记忆
    pub async fn start(&self, idea: &str) -> Result<String> {
        let idea = idea.trim();
        if idea.is_empty() {
            bail!("a genesis session needs an idea");
        }
        if !self.provider.is_available().await {
            bail!(
                "cannot start genesis: provider '{}' is not available",
                self.provider.name()
            );
        }
        info!("starting genesis interview for '{}'", idea);
        let prompt = self.question_prompt(idea).await;
        let questions = self
            .provider
            .generate_text(&prompt, &self.options.with_max_tokens(300))
            .await
            .wrap_err("genesis questions failed")?;
        let questions = questions.trim().to_string();

        let session = GenesisSession {
            idea: idea.to_string(),
            questions: questions.clone(),
        };
        self.memory
            .remember(GENESIS_SESSION_KEY, serde_json::to_value(&session)?);
        record_interaction(&self.memory, "IdeaInterpreter", "start", idea, &questions);
        Ok(questions)
    }

    pub fn active_session(&self) -> Option<GenesisSession> {
        self.memory
            .recall(GENESIS_SESSION_KEY)
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// 提交回答并整理出简介；简介写入会话记忆，访谈结束
    pub async fn submit_answers(&self, answers: &str) -> Result<GenesisBrief> {
        let Some(session) = self.active_session() else {
            bail!("no genesis session in progress; start one with 'genesis start <idea>'");
        };
        let prompt = Self::synthesis_prompt(&session, answers.trim());
        let raw = self
            .provider
            .generate_text(&prompt, &self.options.with_max_tokens(700))
            .await
            .wrap_err("genesis brief synthesis failed")?;
        let brief = GenesisBrief::parse(&raw, &session.idea, &self.general_tone().await);
        info!("genesis brief ready: {}", brief.title);

        self.memory
            .remember(GENESIS_BRIEF_KEY, serde_json::to_value(&brief)?);
        self.memory.forget(GENESIS_SESSION_KEY);
        record_interaction(&self.memory, "IdeaInterpreter", "submit_answers", answers, &raw);
        Ok(brief)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::commands::{test_context, test_context_with};
    use crate::providers::testing::ScriptedProvider;

    async fn interpreter_with(
        replies: Vec<&str>,
    ) -> (IdeaInterpreter, Arc<ScriptedProvider>, tempfile::TempDir, tempfile::TempDir) {
        let provider = Arc::new(ScriptedProvider::new(replies));
        let (ctx, root, data) = test_context_with(provider.clone()).await;
        let contextualizer = ProjectContextualizer::new(ctx.workspace.root(), ctx.memory.clone());
        let interpreter = IdeaInterpreter::new(
            ctx.provider.clone(),
            ctx.memory.clone(),
            ctx.profile.clone(),
            ctx.style.clone(),
            contextualizer,
            ctx.options,
        );
        (interpreter, provider, root, data)
    }

    #[tokio::test]
    async fn file_summary_filters_and_caps() {
        let (ctx, root, _data) = test_context().await;
        for name in ["a.py", "b.md", "c.bin", "Dockerfile", "node_modules/x.py", "dist/out.py"] {
            let path = root.path().join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "x").unwrap();
        }
        let ctxr = ProjectContextualizer::new(root.path(), ctx.memory.clone());
        assert_eq!(
            ctxr.file_structure_summary(20),
            "Project File Structure (Partial):\n  - Dockerfile\n  - a.py\n  - b.md\n"
        );
        assert!(ctxr.file_structure_summary(1).ends_with("  - Dockerfile\n  ... and 2 more files.\n"));
    }

    #[tokio::test]
    async fn context_reports_focus_and_missing_git() {
        let (ctx, root, _data) = test_context().await;
        let ctxr = ProjectContextualizer::new(root.path(), ctx.memory.clone());
        assert_eq!(ctxr.focus_summary(), "Current Focus: Not set.\n");
        ctx.memory.remember(FOCUS_KEY, "the lexer");

        let full = ctxr.full_context().await;
        assert!(full.contains("No relevant files found"));
        assert!(full.contains("Not a Git repository"));
        assert!(full.ends_with("Current Focus: the lexer\n"));
    }

    #[test]
    fn parses_json_brief_with_loose_field_types() {
        let raw = "```json\n{\"title\": \"Sock Radar\", \"summary\": \"Finds socks.\", \
                   \"objectives\": \"pair socks, reduce waste\", \"tech_stack\": [\"rust\", \"axum\"], \
                   \"target_audience\": [\"parents\", \"students\"], \"core_features\": [\"scan\"]}\n```";
        let brief = GenesisBrief::parse(raw, "socks", "neutral");
        assert_eq!(brief.title, "Sock Radar");
        assert_eq!(brief.objectives, vec!["pair socks", "reduce waste"]);
        assert_eq!(brief.tech_stack, vec!["rust", "axum"]);
        assert_eq!(brief.target_audience, "parents, students");
        assert_eq!(brief.tone, "neutral");
        assert!(brief.notes.is_none());
        assert_eq!(
            brief.to_pairs()[..3],
            [
                ("title".to_string(), "Sock Radar".to_string()),
                ("summary".to_string(), "Finds socks.".to_string()),
                ("objectives".to_string(), "pair socks; reduce waste".to_string()),
            ]
        );
    }

    #[test]
    fn prose_synthesis_falls_back_to_notes() {
        let brief = GenesisBrief::parse("\nA radar for socks.\nIt beeps.", "lost socks finder", "playful");
        assert_eq!(brief.title, "lost socks finder");
        assert_eq!(brief.summary, "A radar for socks.");
        assert_eq!(brief.notes.as_deref(), Some("A radar for socks.\nIt beeps."));
        let pairs = brief.to_pairs();
        assert_eq!(pairs.last().unwrap().0, "notes");
        assert!(pairs.iter().all(|(k, _)| k != "objectives"));
    }

    #[tokio::test]
    async fn interview_produces_and_stores_a_brief() {
        let (interp, provider, _root, _data) = interpreter_with(vec![
            "What problem does it solve?\nWho is it for?",
            r#"{"title": "Sock Radar", "summary": "Finds lost socks.", "tone": "playful"}"#,
        ])
        .await;

        let questions = interp.start("find lost socks").await.unwrap();
        assert!(questions.starts_with("What problem"));
        assert!(provider.last_prompt().contains("Here is the initial idea: 'find lost socks'"));
        assert_eq!(interp.active_session().unwrap().idea, "find lost socks");

        let brief = interp.submit_answers("Parents, mobile app").await.unwrap();
        assert_eq!(brief.title, "Sock Radar");
        let prompt = provider.last_prompt();
        assert!(prompt.contains("Assistant: What problem does it solve?"));
        assert!(prompt.contains("User: Parents, mobile app"));

        assert!(interp.active_session().is_none());
        assert_eq!(GenesisBrief::recall(&interp.memory), Some(brief));
    }

    #[tokio::test]
    async fn answers_without_a_session_fail() {
        let (interp, provider, _root, _data) = interpreter_with(vec![]).await;
        let err = interp.submit_answers("anything").await.unwrap_err();
        assert!(err.to_string().contains("no genesis session"));
        assert!(interp.start("   ").await.is_err());
        assert!(provider.prompts().is_empty());
    }
}
