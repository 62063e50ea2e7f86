use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::commands::exec::shell_line;
use crate::commands::{CommandManager, LAST_FILE_WRITTEN};
use crate::config::AgentConfig;
use crate::workspace::CommandOutput;

use super::{has_actual_code, Agent};

/// 执行前确认：收到完整计划，返回 false 取消
pub type PlanConfirm = Box<dyn Fn(&[String]) -> bool + Send + Sync>;

/// 执行过程通知（REPL 用来打印进度）
pub type PlanObserver = Arc<dyn Fn(&PlanEvent) + Send + Sync>;

/// 单步执行结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed { code: i32 },
    Skipped,
    /// 测试失败后经过若干次修复通过
    Repaired { attempts: usize },
    /// 测试失败且修复未成功
    RepairFailed { attempts: usize, reason: String },
}

impl StepStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, StepStatus::Succeeded | StepStatus::Skipped | StepStatus::Repaired { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    /// 从 1 开始
    pub index: usize,
    pub step: String,
    pub status: StepStatus,
    /// 该步最后一次执行的输出
    pub output: CommandOutput,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanReport {
    pub cancelled: bool,
    pub steps: Vec<StepReport>,
}

impl PlanReport {
    /// 未取消且每一步都成功（含修复成功）
    pub fn succeeded(&self) -> bool {
        !self.cancelled && self.steps.iter().all(|s| s.status.is_ok())
    }
}

/// 执行过程中的事件
#[derive(Debug, Clone)]
pub enum PlanEvent {
    StepStarted { index: usize, step: String },
    StepFinished { index: usize, status: StepStatus, output: CommandOutput },
    FixAttempt { attempt: usize, max: usize, file: String },
    FixApplied { attempt: usize, file: String },
}

/// 按顺序执行计划；测试步骤失败时进入有界的自我修复循环
pub struct PlanExecutor {
    agent: Arc<Agent>,
    commands: Arc<CommandManager>,
    max_fix_attempts: usize,
    test_commands: Vec<String>,
    observer: Option<PlanObserver>,
}

impl PlanExecutor {
    pub fn new(agent: Arc<Agent>, commands: Arc<CommandManager>, config: &AgentConfig) -> Self {
        Self {
            agent,
            commands,
            max_fix_attempts: config.max_fix_attempts,
            test_commands: config.test_commands.clone(),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: PlanObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    fn emit(&self, event: PlanEvent) {
        if let Some(observer) = &self.observer {
            observer(&event);
        }
    }

    /// 是否为测试步骤：`exec` 且命令行包含某个测试命令
    pub fn is_test_step(&self, command: &str, args: &[String]) -> bool {
        if command != "exec" || args.is_empty() {
            return false;
        }
        let line = args.join(" ");
        self.test_commands
            .iter()
            .any(|t| !t.is_empty() && line.contains(t.as_str()))
    }

    pub async fn execute(&self, plan: &[String], confirm: &PlanConfirm) -> PlanReport {
        if plan.is_empty() {
            return PlanReport::default();
        }
        if !confirm(plan) {
            info!("plan execution cancelled by user");
            return PlanReport {
                cancelled: true,
                steps: vec![],
            };
        }

        let mut report = PlanReport::default();
        for (i, step) in plan.iter().enumerate() {
            let index = i + 1;
            self.emit(PlanEvent::StepStarted {
                index,
                step: step.clone(),
            });
            let (status, output) = self.run_step(step).await;
            self.emit(PlanEvent::StepFinished {
                index,
                status: status.clone(),
                output: output.clone(),
            });
            report.steps.push(StepReport {
                index,
                step: step.clone(),
                status,
                output,
            });
        }
        info!(
            "plan finished: {}/{} steps ok",
            report.steps.iter().filter(|s| s.status.is_ok()).count(),
            report.steps.len()
        );
        report
    }

    async fn run_step(&self, step: &str) -> (StepStatus, CommandOutput) {
        let parts = match shell_words::split(step) {
            Ok(parts) => parts,
            Err(e) => {
                let output = CommandOutput::failure(2, format!("cannot parse step '{}': {}", step, e));
                return (StepStatus::Failed { code: 2 }, output);
            }
        };
        let Some((name, args)) = parts.split_first() else {
            return (StepStatus::Skipped, CommandOutput::default());
        };
        let name = name.to_lowercase();

        let output = self.commands.execute(&name, args).await;
        if output.success() {
            return (StepStatus::Succeeded, output);
        }
        if !self.is_test_step(&name, args) || self.max_fix_attempts == 0 {
            return (StepStatus::Failed { code: output.code }, output);
        }
        self.self_correct(args, output).await
    }

    /// 修复循环：定位目标文件 → 请求修复 → 写回 → 重跑测试
    async fn self_correct(&self, args: &[String], failed: CommandOutput) -> (StepStatus, CommandOutput) {
        let ctx = self.commands.context();
        let test_line = shell_line(args);
        let mut last = failed;
        let max = self.max_fix_attempts;

        for attempt in 1..=max {
            let Some(target) = self.fix_target(args) else {
                return self.give_up(attempt - 1, "could not determine which file to fix", last);
            };
            self.emit(PlanEvent::FixAttempt {
                attempt,
                max,
                file: target.clone(),
            });
            warn!("tests failed, self-correction {}/{} on {}", attempt, max, target);

            let code = match ctx.workspace.read_file(&target).await {
                Ok(code) if !code.trim().is_empty() => code,
                Ok(_) => return self.give_up(attempt - 1, &format!("{} is empty", target), last),
                Err(e) => {
                    return self.give_up(attempt - 1, &format!("could not read {}: {}", target, e), last)
                }
            };

            let fixed = match self.agent.attempt_fix(&code, &last.combined()).await {
                Ok(fixed) => fixed,
                Err(e) => return self.give_up(attempt - 1, &format!("fix request failed: {:#}", e), last),
            };
            if !has_actual_code(&fixed) {
                return self.give_up(attempt, "the model did not return usable code", last);
            }
            if let Err(e) = ctx.workspace.write_file(&target, &fixed).await {
                return self.give_up(attempt, &format!("could not write {}: {}", target, e), last);
            }
            self.emit(PlanEvent::FixApplied {
                attempt,
                file: target.clone(),
            });

            last = ctx.workspace.execute(&test_line).await;
            if last.success() {
                info!("self-correction succeeded after {} attempt(s)", attempt);
                return (StepStatus::Repaired { attempts: attempt }, last);
            }
        }

        self.give_up(max, &format!("tests still failing after {} attempt(s)", max), last)
    }

    fn give_up(&self, attempts: usize, reason: &str, output: CommandOutput) -> (StepStatus, CommandOutput) {
        warn!("self-correction stopped: {}", reason);
        (
            StepStatus::RepairFailed {
                attempts,
                reason: reason.to_string(),
            },
            output,
        )
    }

    /// 修复目标：会话中最近写入的文件，否则命令行中第一个存在的文件
    fn fix_target(&self, args: &[String]) -> Option<String> {
        let ctx = self.commands.context();
        if let Some(last) = ctx.memory.recall_str(LAST_FILE_WRITTEN) {
            return Some(last);
        }
        args.iter()
            .flat_map(|a| shell_words::split(a).unwrap_or_else(|_| vec![a.clone()]))
            .find(|token| {
                ctx.workspace
                    .resolve(token)
                    .map(|p| p.is_file())
                    .unwrap_or(false)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_context_with;
    use crate::memory::Memory;
    use crate::providers::testing::ScriptedProvider;
    use crate::providers::GenerationOptions;

    /// 只检查 calc.py 是否含 "a + b" 的 "测试命令"
    const CHECK: &str = "exec \"grep -q 'a + b' calc.py && echo passed\"";

    fn config() -> AgentConfig {
        AgentConfig {
            max_fix_attempts: 3,
            test_commands: vec!["grep -q".to_string()],
        }
    }

    async fn executor(
        replies: Vec<&str>,
    ) -> (PlanExecutor, Arc<ScriptedProvider>, Arc<Memory>, tempfile::TempDir, tempfile::TempDir) {
        let provider = Arc::new(ScriptedProvider::new(replies));
        let (ctx, root, data) = test_context_with(provider.clone()).await;
        let memory = ctx.memory.clone();
        let agent = Arc::new(Agent::new(provider.clone(), memory.clone(), GenerationOptions::default()));
        let commands = Arc::new(CommandManager::with_builtins(ctx));
        (PlanExecutor::new(agent, commands, &config()), provider, memory, root, data)
    }

    fn yes() -> PlanConfirm {
        Box::new(|_| true)
    }

    fn plan(steps: &[&str]) -> Vec<String> {
        steps.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn declined_plan_is_cancelled() {
        let (executor, _p, _m, root, _d) = executor(vec![]).await;
        let no: PlanConfirm = Box::new(|_| false);
        let report = executor.execute(&plan(&["write a.txt hi"]), &no).await;
        assert!(report.cancelled);
        assert!(report.steps.is_empty());
        assert!(!root.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_failure_is_repaired() {
        let (executor, provider, _m, root, _d) =
            executor(vec!["```python\ndef add(a, b):\n    return a + b\n```"]).await;
        let report = executor
            .execute(&plan(&["write calc.py def add(a, b): return a - b", CHECK]), &yes())
            .await;

        assert_eq!(report.steps[0].status, StepStatus::Succeeded);
        assert_eq!(report.steps[1].status, StepStatus::Repaired { attempts: 1 });
        assert!(report.succeeded());
        assert!(report.steps[1].output.stdout.contains("passed"));
        assert!(std::fs::read_to_string(root.path().join("calc.py"))
            .unwrap()
            .contains("a + b"));
        assert!(provider.last_prompt().contains("return a - b"));
    }

    #[tokio::test]
    async fn repair_gives_up_after_max_attempts() {
        let bad = "def add(a, b):\n    return a * b";
        let (executor, provider, _m, _root, _d) = executor(vec![bad, bad, bad, bad]).await;
        let report = executor
            .execute(&plan(&["write calc.py def add(a, b): return a - b", CHECK]), &yes())
            .await;

        match &report.steps[1].status {
            StepStatus::RepairFailed { attempts, reason } => {
                assert_eq!(*attempts, 3);
                assert!(reason.contains("still failing"));
            }
            other => panic!("unexpected status {:?}", other),
        }
        assert_eq!(provider.prompts().len(), 3);
        assert!(!report.succeeded());
    }

    #[tokio::test]
    async fn comment_only_fix_stops_loop() {
        let (executor, provider, _m, _root, _d) =
            executor(vec!["# I could not fix this", "def add(a, b): return a + b"]).await;
        let report = executor
            .execute(&plan(&["write calc.py def add(a, b): return a - b", CHECK]), &yes())
            .await;
        assert_eq!(
            report.steps[1].status,
            StepStatus::RepairFailed {
                attempts: 1,
                reason: "the model did not return usable code".to_string()
            }
        );
        assert_eq!(provider.prompts().len(), 1);
    }

    #[tokio::test]
    async fn missing_target_stops_before_llm() {
        let (executor, provider, _m, _root, _d) = executor(vec!["x = 1"]).await;
        let report = executor.execute(&plan(&[CHECK]), &yes()).await;
        assert!(matches!(
            &report.steps[0].status,
            StepStatus::RepairFailed { attempts: 0, .. }
        ));
        assert!(provider.prompts().is_empty());
    }

    #[tokio::test]
    async fn target_falls_back_to_file_in_command() {
        let (executor, _p, memory, root, _d) =
            executor(vec!["def add(a, b):\n    return a + b"]).await;
        std::fs::write(root.path().join("calc.py"), "def add(a, b): return a - b").unwrap();
        assert!(memory.recall(LAST_FILE_WRITTEN).is_none());

        let report = executor.execute(&plan(&[CHECK]), &yes()).await;
        assert_eq!(report.steps[0].status, StepStatus::Repaired { attempts: 1 });
    }

    #[tokio::test]
    async fn non_test_failures_continue_and_bad_steps_are_reported() {
        let (executor, _p, _m, _root, _d) = executor(vec![]).await;
        let report = executor
            .execute(
                &plan(&["read missing.txt", "exec \"unterminated", "bogus", "exec true"]),
                &yes(),
            )
            .await;
        assert_eq!(report.steps.len(), 4);
        assert_eq!(report.steps[0].status, StepStatus::Failed { code: 1 });
        assert_eq!(report.steps[1].status, StepStatus::Failed { code: 2 });
        assert_eq!(report.steps[2].status, StepStatus::Failed { code: 127 });
        assert_eq!(report.steps[3].status, StepStatus::Succeeded);
    }

    #[tokio::test]
    async fn whitespace_step_is_skipped() {
        let (executor, _p, _m, _root, _d) = executor(vec![]).await;
        let report = executor.execute(&plan(&["   "]), &yes()).await;
        assert_eq!(report.steps[0].status, StepStatus::Skipped);
        assert!(report.succeeded());
    }

    #[tokio::test]
    async fn test_step_detection() {
        let (executor, _p, _m, _root, _d) = executor(vec![]).await;
        assert!(executor.is_test_step("exec", &["grep -q x f".to_string()]));
        assert!(!executor.is_test_step("read", &["grep -q".to_string()]));
        assert!(!executor.is_test_step("exec", &["ls".to_string()]));
    }

    #[tokio::test]
    async fn observer_sees_fix_events() {
        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = events.clone();
        let (executor, _p, _m, _root, _d) =
            executor(vec!["def add(a, b):\n    return a + b"]).await;
        let executor = executor.with_observer(Arc::new(move |e: &PlanEvent| {
            let label = match e {
                PlanEvent::StepStarted { .. } => "start",
                PlanEvent::StepFinished { .. } => "finish",
                PlanEvent::FixAttempt { .. } => "attempt",
                PlanEvent::FixApplied { .. } => "applied",
            };
            sink.lock().unwrap().push(label);
        }));
        executor
            .execute(&plan(&["write calc.py x = a - b", CHECK]), &yes())
            .await;
        assert_eq!(
            *events.lock().unwrap(),
            vec!["start", "finish", "start", "attempt", "applied", "finish"]
        );
    }
}
