//! 命令行入口共享的装配逻辑

pub mod render;
pub mod repl;

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::{Context, Result};
use tracing::info;

use crate::agent::{Agent, PlanConfirm, PlanExecutor, PlanObserver, PlanReport};
use crate::api::ApiState;
use crate::commands::{CommandContext, CommandManager, ContentPrompt};
use crate::config::Config;
use crate::generators::{IdeaSynthesizer, ReadmeGenerator, RoadmapGenerator};
use crate::genesis::{IdeaInterpreter, ProjectContextualizer};
use crate::git::GitAnalyzer;
use crate::github::GitHubClient;
use crate::guardrails::ModularityGuardrails;
use crate::memory::Memory;
use crate::profile::UserProfile;
use crate::providers::{build_provider, default_options};
use crate::roadmap::RoadmapManager;
use crate::scaffold::ProjectScaffolder;
use crate::skills::{Skill, SkillManager, SkillOutcome};
use crate::style::StylePreferences;
use crate::workspace::Workspace;

/// 全局 skill 目录: `~/.giblet/skills`
pub fn global_skills_dir() -> Result<PathBuf> {
    Ok(Config::home_dir()?.join("skills"))
}

/// 装配好的运行时：所有前端（REPL、一次性子命令、HTTP）共用
pub struct App {
    pub config: Config,
    pub data_dir: PathBuf,
    pub ctx: CommandContext,
    pub commands: Arc<CommandManager>,
    pub agent: Arc<Agent>,
    pub skills: SkillManager,
}

impl App {
    /// 从配置构建；`provider` 覆盖 `[default].provider`
    pub async fn build(
        config: Config,
        provider: Option<&str>,
        content_prompt: Option<ContentPrompt>,
    ) -> Result<Self> {
        let data_dir = config.data_dir()?;
        let memory = Arc::new(
            Memory::from_config(&config)
                .await
                .wrap_err("failed to open memory")?,
        );
        let provider = build_provider(&config, provider)?;
        let profile = UserProfile::load(memory.clone())
            .await
            .wrap_err("failed to load user profile")?;
        let style = StylePreferences::open_in(&data_dir)?.shared();
        let workspace = Workspace::new(config.project_root())
            .with_timeout(Duration::from_secs(config.workspace.command_timeout_secs));
        info!(
            "project root {}, provider {} ({})",
            workspace.root().display(),
            provider.name(),
            provider.model()
        );

        let ctx = CommandContext {
            workspace: Arc::new(workspace),
            memory,
            provider,
            options: default_options(&config),
            profile,
            style,
            content_prompt,
        };
        Ok(Self::from_context(config, data_dir, global_skills_dir()?, ctx))
    }

    /// 用现成的上下文装配（测试与嵌入使用）
    pub fn from_context(
        config: Config,
        data_dir: PathBuf,
        global_skills: PathBuf,
        ctx: CommandContext,
    ) -> Self {
        let commands = Arc::new(CommandManager::with_builtins(ctx.clone()));
        let agent = Arc::new(Agent::new(ctx.provider.clone(), ctx.memory.clone(), ctx.options));
        let skills = SkillManager::discover(ctx.workspace.root(), &global_skills);
        Self {
            config,
            data_dir,
            ctx,
            commands,
            agent,
            skills,
        }
    }

    pub fn executor(&self, observer: Option<PlanObserver>) -> PlanExecutor {
        let executor = PlanExecutor::new(self.agent.clone(), self.commands.clone(), &self.config.agent);
        match observer {
            Some(o) => executor.with_observer(o),
            None => executor,
        }
    }

    pub fn ideas(&self) -> IdeaSynthesizer {
        IdeaSynthesizer::new(
            self.ctx.provider.clone(),
            self.ctx.memory.clone(),
            self.ctx.profile.clone(),
            self.ctx.options,
        )
    }

    pub fn interpreter(&self) -> IdeaInterpreter {
        IdeaInterpreter::new(
            self.ctx.provider.clone(),
            self.ctx.memory.clone(),
            self.ctx.profile.clone(),
            self.ctx.style.clone(),
            ProjectContextualizer::new(self.ctx.workspace.root(), self.ctx.memory.clone()),
            self.ctx.options,
        )
    }

    pub fn git(&self) -> GitAnalyzer {
        GitAnalyzer::new(self.ctx.workspace.root())
    }

    pub fn github(&self) -> GitHubClient {
        GitHubClient::from_config(&self.config.github)
    }

    pub fn roadmap(&self) -> RoadmapManager {
        RoadmapManager::in_project(self.ctx.workspace.root(), self.ctx.memory.clone())
    }

    pub fn guardrails(&self) -> ModularityGuardrails {
        ModularityGuardrails::from_config(&self.config.guardrails)
    }

    pub fn scaffolder(&self) -> ProjectScaffolder {
        ProjectScaffolder::new(
            ReadmeGenerator::new(self.ctx.provider.clone(), self.ctx.style.clone(), self.ctx.options),
            RoadmapGenerator::new(self.ctx.provider.clone(), self.ctx.style.clone(), self.ctx.options),
        )
    }

    pub fn api_state(&self) -> ApiState {
        ApiState::new(self.ctx.clone())
    }

    /// 目标命中某个无需额外参数的 skill 时直接运行它，否则规划后执行
    pub async fn pursue(
        &self,
        goal: &str,
        confirm: &PlanConfirm,
        observer: Option<PlanObserver>,
    ) -> Result<GoalOutcome> {
        if let Some(skill) = self.skills.find_for(goal) {
            let no_params = HashMap::new();
            if skill.resolve_params(&no_params).is_ok() {
                info!("goal handled by skill {}", skill.meta().name);
                let outcome = skill.execute(goal, &no_params, &self.commands).await?;
                return Ok(GoalOutcome::Skill {
                    name: skill.meta().name.clone(),
                    outcome,
                });
            }
        }

        let plan = self.agent.create_plan(goal).await?;
        let report = self.executor(observer).execute(&plan, confirm).await;
        Ok(GoalOutcome::Plan(report))
    }
}

/// `pursue` 的结果
#[derive(Debug)]
pub enum GoalOutcome {
    Skill { name: String, outcome: SkillOutcome },
    Plan(PlanReport),
}

impl GoalOutcome {
    pub fn succeeded(&self) -> bool {
        match self {
            GoalOutcome::Skill { outcome, .. } => outcome.success,
            GoalOutcome::Plan(report) => report.succeeded(),
        }
    }
}

/// 从 stdin 逐行读取文件内容，单独一行 `EOF` 结束
pub fn stdin_content_prompt() -> ContentPrompt {
    Arc::new(|path: &str| {
        println!("Enter content for {}. Type 'EOF' on a new line to finish.", path);
        let _ = std::io::stdout().flush();
        let mut lines = Vec::new();
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(l) if l.trim_end() == "EOF" => return Some(lines.join("\n")),
                Ok(l) => lines.push(l),
                Err(_) => return None,
            }
        }
        // stdin 提前结束视为取消
        None
    })
}

/// 执行前展示计划并用 dialoguer 确认
pub fn interactive_confirm() -> PlanConfirm {
    Box::new(|plan: &[String]| {
        println!("{}", render::plan(plan));
        dialoguer::Confirm::new()
            .with_prompt("Execute this plan?")
            .default(false)
            .interact()
            .unwrap_or(false)
    })
}

/// 自动确认（`--yes`）
pub fn auto_confirm() -> PlanConfirm {
    Box::new(|plan: &[String]| {
        println!("{}", render::plan(plan));
        true
    })
}

/// 把执行进度打印到 stdout
pub fn printing_observer() -> PlanObserver {
    Arc::new(|event| println!("{}", render::event(event)))
}

#[cfg(test)]
pub(crate) fn test_app(ctx: CommandContext, data: &std::path::Path) -> App {
    let mut config = Config::default();
    config.agent.test_commands = vec!["grep -q".to_string()];
    App::from_context(config, data.to_path_buf(), data.join("global-skills"), ctx)
}
