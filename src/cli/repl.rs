use std::collections::HashMap;

use color_eyre::eyre::{Context, Result};
use reedline::{DefaultPrompt, DefaultPromptSegment, Reedline, Signal};
use serde_json::Value;
use tracing::{error, info};

use crate::agent::{PlanConfirm, PlanObserver};
use crate::automate::generate_stubs;
use crate::duplication::DuplicationAnalyzer;
use crate::generators::{random_weird_idea, LAST_INTERACTION_KEY};
use crate::genesis::GenesisBrief;
use crate::insights::{PatternAnalyzer, ProactiveLearner};
use crate::memory::FOCUS_KEY;
use crate::skills::Skill;
use crate::style::parse_value;

use super::{render, App, GoalOutcome};

/// `git log` 默认显示的提交数
const GIT_LOG_COUNT: usize = 5;
const GIT_SUMMARY_COUNT: usize = 10;

/// REPL 会话：把一行输入翻译成对 App 的调用
pub struct Session {
    app: App,
    confirm: PlanConfirm,
    observer: Option<PlanObserver>,
}

impl Session {
    pub fn new(app: App, confirm: PlanConfirm, observer: Option<PlanObserver>) -> Self {
        Self {
            app,
            confirm,
            observer,
        }
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    /// 当前提示符文字
    pub async fn prompt_label(&self) -> String {
        let focus = self.app.ctx.memory.recall_str(FOCUS_KEY);
        let branch = if focus.is_none() {
            self.app.git().current_branch().await.ok()
        } else {
            None
        };
        render::prompt_label(focus.as_deref(), branch.as_deref())
    }

    /// 处理一行输入；返回 None 表示退出
    pub async fn handle(&mut self, line: &str) -> Result<Option<String>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Some(String::new()));
        }
        let tokens = match shell_words::split(line) {
            Ok(t) => t,
            Err(e) => return Ok(Some(format!("Could not parse input: {}", e))),
        };
        let Some((command, args)) = tokens.split_first() else {
            return Ok(Some(String::new()));
        };
        let command = command.to_lowercase();
        // 去掉命令名后的原始文本，保留引号内外的空格
        let rest = line[line.find(char::is_whitespace).unwrap_or(line.len())..].trim();

        let reply = match command.as_str() {
            "exit" | "quit" => return Ok(None),
            "help" => help(),
            "focus" => self.focus(args, rest),
            "idea" => self.idea(args).await?,
            "roadmap" => self.roadmap(args)?,
            "task" => self.task(args).await?,
            "git" => self.git(args).await?,
            "automate" => self.automate(args).await?,
            "checkpoint" => self.checkpoint(args).await?,
            "remember" | "commit" => self.store(&command, args).await?,
            "recall" | "retrieve" => self.lookup(&command, args).await,
            "profile" => self.profile(args).await?,
            "style" => self.style(args).await?,
            "plan" => self.plan(args).await?,
            "agent" => self.agent(args).await?,
            "skills" => {
                self.app.skills.refresh();
                render::skills(&self.app.skills.list())
            }
            "skill" => self.skill(args).await?,
            "learn" => self.learn(args).await?,
            "feedback" => self.feedback(args).await?,
            "suggest" => ProactiveLearner::suggestions(&self.app.ctx.profile)
                .await
                .iter()
                .map(|s| format!("- {}", s))
                .collect::<Vec<_>>()
                .join("\n"),
            "patterns" => self.patterns().await,
            "guard" => {
                let guard = self.app.guardrails();
                let report = guard.scan(self.app.ctx.workspace.root());
                let mut text = render::long_files(&report, guard.threshold);
                if !report.is_empty() {
                    text.push('\n');
                    text.push_str(&guard.suggest(&report));
                }
                text
            }
            "genesis" => self.genesis(args).await?,
            "duplicates" => render::duplicates(&DuplicationAnalyzer::find_duplicates(self.app.ctx.workspace.root())),
            "new" => self.new_project(args).await?,
            name if self.app.commands.has(name) => {
                render::output(&self.app.commands.execute(name, args).await)
            }
            other => format!("Unknown command: '{}'. Type 'help' for options.", other),
        };
        Ok(Some(reply))
    }

    fn focus(&self, args: &[String], rest: &str) -> String {
        let memory = &self.app.ctx.memory;
        match args.first().map(String::as_str) {
            Some("--clear") => {
                memory.remember(FOCUS_KEY, Value::Null);
                "Focus cleared.".to_string()
            }
            Some(_) => {
                let text = rest.trim_matches('"').to_string();
                memory.remember(FOCUS_KEY, text.clone());
                format!("OK. Focusing on: \"{}\"", text)
            }
            None => match memory.recall_str(FOCUS_KEY) {
                Some(focus) => format!("Your current focus is: \"{}\"", focus),
                None => "No focus is set. Use 'focus \"<your task>\"'.".to_string(),
            },
        }
    }

    async fn idea(&self, args: &[String]) -> Result<String> {
        let (weird, words) = match args.split_first() {
            Some((flag, rest)) if flag == "--weird" => (true, rest),
            _ => (false, args),
        };
        let prompt = if words.is_empty() && weird {
            random_weird_idea()
        } else {
            words.join(" ")
        };
        if prompt.trim().is_empty() {
            return Ok("Usage: idea \"<prompt>\" or idea --weird [\"<prompt>\"]".to_string());
        }
        let ideas = self.app.ideas().generate_ideas(&prompt, weird).await?;
        Ok(format!("--- Giblet's Ideas ---\n{}", ideas.trim_end()))
    }

    fn roadmap(&self, args: &[String]) -> Result<String> {
        let manager = self.app.roadmap();
        match args.first().map(String::as_str) {
            None => {
                let tasks = manager.tasks()?;
                if tasks.is_empty() {
                    return Ok(format!("No tasks found in {}.", manager.path().display()));
                }
                Ok(tasks
                    .iter()
                    .map(|t| format!("[{}] {}", if t.complete { "x" } else { " " }, t.description))
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            Some("done") => {
                let description = args[1..].join(" ");
                if description.is_empty() {
                    return Ok("Usage: roadmap done \"<task description>\"".to_string());
                }
                Ok(if manager.complete_task(&description)? {
                    format!("Marked as done: {}", description)
                } else {
                    format!("No open task matching '{}'.", description)
                })
            }
            Some(other) => Ok(format!(
                "Unknown roadmap command: '{}'. Try 'roadmap' or 'roadmap done \"<description>\"'.",
                other
            )),
        }
    }

    async fn task(&self, args: &[String]) -> Result<String> {
        let manager = self.app.roadmap();
        match args.first().map(String::as_str) {
            Some("add") if args.len() >= 2 => {
                let assignee = args.get(2).map(String::as_str).unwrap_or("me");
                let id = manager.add_shared_task(&args[1], assignee).await?;
                Ok(format!("Shared task added with id {}", id))
            }
            Some("list") | None => {
                let tasks = manager.shared_tasks().await;
                if tasks.is_empty() {
                    return Ok("No shared tasks.".to_string());
                }
                Ok(tasks
                    .iter()
                    .map(|t| format!("[{}] {} ({}, {})", t.status, t.description, t.assignee, t.id))
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            Some("close") if args.len() == 2 => Ok(if manager.close_shared_task(&args[1]).await? {
                format!("Closed task {}", args[1])
            } else {
                format!("No shared task with id {}", args[1])
            }),
            _ => Ok("Usage: task add \"<description>\" [assignee] | task list | task close <id>".to_string()),
        }
    }

    async fn git(&self, args: &[String]) -> Result<String> {
        let git = self.app.git();
        Ok(match args.first().map(String::as_str) {
            Some("status") => format!("Branch status: {}", git.branch_status().await?),
            Some("branches") => {
                let branches = git.branches().await?;
                format!("Available branches:\n - {}", branches.join("\n - "))
            }
            Some("log") => {
                let log = git.commit_log(GIT_LOG_COUNT).await?;
                if log.is_empty() {
                    "No commits yet.".to_string()
                } else {
                    let lines: Vec<String> = log
                        .iter()
                        .map(|c| {
                            format!(
                                "  - [{}] {} - {} ({})",
                                c.day(),
                                c.sha,
                                c.message.lines().next().unwrap_or_default(),
                                c.author
                            )
                        })
                        .collect();
                    format!("Recent commits:\n{}", lines.join("\n"))
                }
            }
            Some("summary") => {
                let summary = git.summarize(&self.app.ideas(), GIT_SUMMARY_COUNT).await?;
                format!("--- AI Summary of Recent Activity ---\n{}", summary.trim_end())
            }
            _ => "Unknown git command. Try 'status', 'branches', 'log', or 'summary'.".to_string(),
        })
    }

    async fn automate(&self, args: &[String]) -> Result<String> {
        match args.first().map(String::as_str) {
            Some("changelog") => {
                let path = self.app.git().changelog(&self.app.data_dir).await?;
                Ok(format!("Changelog written to {}", path.display()))
            }
            Some("stubs") => {
                let Some(file) = args.get(1) else {
                    return Ok("Usage: automate stubs <file.py>".to_string());
                };
                Ok(match generate_stubs(&self.app.ctx.workspace, file).await? {
                    0 => format!("No empty functions found to stub in {}.", file),
                    n => format!("Replaced {} 'pass' statement(s) with TODO stubs in {}.", n, file),
                })
            }
            _ => Ok("Unknown automate command. Try 'automate changelog' or 'automate stubs <file>'.".to_string()),
        }
    }

    async fn checkpoint(&self, args: &[String]) -> Result<String> {
        let memory = &self.app.ctx.memory;
        match (args.first().map(String::as_str), args.get(1)) {
            (Some("save"), Some(name)) => {
                memory.save_checkpoint(name).await?;
                Ok(format!("Session saved to checkpoint '{}'.", name))
            }
            (Some("load"), Some(name)) => {
                memory.load_checkpoint(name).await?;
                Ok(format!("Checkpoint '{}' loaded into the session.", name))
            }
            (Some("list"), _) => {
                let names = memory.list_checkpoints().await?;
                Ok(if names.is_empty() {
                    "No checkpoints saved.".to_string()
                } else {
                    names.join("\n")
                })
            }
            _ => Ok("Usage: checkpoint save|load <name> or checkpoint list".to_string()),
        }
    }

    async fn store(&self, command: &str, args: &[String]) -> Result<String> {
        let (Some(key), true) = (args.first(), args.len() > 1) else {
            return Ok(format!("Usage: {} <key> <value>", command));
        };
        let value = args[1..].join(" ");
        let memory = &self.app.ctx.memory;
        if command == "commit" {
            memory.commit(key, value).await?;
            Ok(format!("OK. Committed '{}' to long-term memory.", key))
        } else {
            memory.remember(key, value);
            Ok(format!("OK. I'll remember '{}' for this session.", key))
        }
    }

    async fn lookup(&self, command: &str, args: &[String]) -> String {
        let Some(key) = args.first() else {
            return format!("Usage: {} <key>", command);
        };
        let memory = &self.app.ctx.memory;
        let (value, scope) = if command == "retrieve" {
            (memory.retrieve(key).await, "long-term memory")
        } else {
            (memory.recall(key), "session memory")
        };
        match value {
            Some(Value::String(s)) => format!("{}: {}", key, s),
            Some(v) => format!("{}: {}", key, v),
            None => format!("'{}' not found in {}.", key, scope),
        }
    }

    async fn profile(&self, args: &[String]) -> Result<String> {
        let profile = &self.app.ctx.profile;
        match args.first().map(String::as_str) {
            None => Ok(serde_json::to_string_pretty(&profile.get_all().await)?),
            Some("get") if args.len() == 3 => Ok(
                match profile.get_preference(&args[1], &args[2]).await {
                    Some(v) => format!("{}.{} = {}", args[1], args[2], v),
                    None => format!("{}.{} is not set.", args[1], args[2]),
                },
            ),
            Some("set") if args.len() >= 4 => {
                let value = args[3..].join(" ");
                profile.add_preference(&args[1], &args[2], value.clone()).await?;
                Ok(format!("Set {}.{} = {}", args[1], args[2], value))
            }
            Some("clear") => {
                profile.clear().await?;
                Ok("Profile reset to defaults.".to_string())
            }
            _ => Ok("Usage: profile [get <category> <key> | set <category> <key> <value> | clear]".to_string()),
        }
    }

    async fn style(&self, args: &[String]) -> Result<String> {
        let style = &self.app.ctx.style;
        match args.first().map(String::as_str) {
            None => Ok(serde_json::to_string_pretty(style.read().await.all())?),
            Some("get") if args.len() == 2 => Ok(match style.read().await.get(&args[1]) {
                Some(v) => format!("{} = {}", args[1], v),
                None => format!("{} is not set.", args[1]),
            }),
            Some("set") if args.len() >= 3 => {
                let value = parse_value(&args[2..].join(" "));
                style.write().await.set(&args[1], value.clone())?;
                Ok(format!("Set {} = {}", args[1], value))
            }
            Some("reset") => {
                style.write().await.reset_to_defaults()?;
                Ok("Style preferences reset to defaults.".to_string())
            }
            _ => Ok("Usage: style [get <path> | set <path> <value> | reset]".to_string()),
        }
    }

    async fn plan(&self, args: &[String]) -> Result<String> {
        let goal = args.join(" ");
        if goal.trim().is_empty() {
            return Ok("Usage: plan \"<goal>\"".to_string());
        }
        let plan = self.app.agent.create_plan(&goal).await?;
        Ok(render::plan(&plan))
    }

    async fn agent(&self, args: &[String]) -> Result<String> {
        let goal = args.join(" ");
        if goal.trim().is_empty() {
            return Ok("Usage: agent \"<goal>\"".to_string());
        }
        Ok(match self.app.pursue(&goal, &self.confirm, self.observer.clone()).await? {
            GoalOutcome::Skill { name, outcome } => render::skill_outcome(&name, &outcome),
            GoalOutcome::Plan(report) => render::report(&report),
        })
    }

    async fn skill(&self, args: &[String]) -> Result<String> {
        let Some((name, pairs)) = args.split_first() else {
            return Ok("Usage: skill <name> [key=value ...]".to_string());
        };
        let Some(skill) = self.app.skills.get(name) else {
            return Ok(format!("Unknown skill '{}'. Type 'skills' to list them.", name));
        };
        let mut params = HashMap::new();
        for pair in pairs {
            match pair.split_once('=') {
                Some((k, v)) => {
                    params.insert(k.trim().to_string(), v.to_string());
                }
                None => return Ok(format!("Skill parameters must look like key=value, got '{}'.", pair)),
            }
        }
        let outcome = skill.execute(name, &params, &self.app.commands).await?;
        Ok(render::skill_outcome(&skill.meta().name, &outcome))
    }

    async fn learn(&mut self, args: &[String]) -> Result<String> {
        let Some(name) = args.first() else {
            return Ok("Usage: learn <skill-name> [trigger phrase]".to_string());
        };
        let Some(plan) = self.app.agent.last_plan() else {
            return Ok("No plan to learn from yet. Use 'plan' or 'agent' first.".to_string());
        };
        let trigger = (args.len() > 1).then(|| args[1..].join(" "));
        let content = self
            .app
            .agent
            .generate_skill_from_plan(&plan, name, trigger.as_deref())
            .await?;
        let path = self.app.skills.save_project_skill(&content)?;
        Ok(format!("Learned skill '{}' ({} steps), saved to {}", name, plan.len(), path.display()))
    }

    async fn feedback(&self, args: &[String]) -> Result<String> {
        let Some((rating, comment)) = args.split_first() else {
            return Ok("Usage: feedback <rating> [comment]".to_string());
        };
        let context = self
            .app
            .ctx
            .memory
            .recall(LAST_INTERACTION_KEY)
            .and_then(|v| v.get("module").and_then(Value::as_str).map(String::from))
            .unwrap_or_else(|| "general".to_string());
        self.app
            .ctx
            .profile
            .add_feedback(rating, &comment.join(" "), &context)
            .await?;
        Ok(format!("Thanks! Feedback recorded for '{}'.", context))
    }

    async fn patterns(&self) -> String {
        let names = self.app.ctx.memory.command_names().await;
        let sequences = PatternAnalyzer::frequent_sequences(&names, 2, 4, 2);
        if sequences.is_empty() {
            return "No significant command patterns detected yet.".to_string();
        }
        let lines: Vec<String> = sequences
            .iter()
            .take(10)
            .map(|s| format!("  {}x  {}", s.count, s.commands.join(" -> ")))
            .collect();
        format!(
            "Frequent command sequences:\n{}\nConsider turning a repeated sequence into a skill with 'learn'.",
            lines.join("\n")
        )
    }

    async fn genesis(&self, args: &[String]) -> Result<String> {
        let interpreter = self.app.interpreter();
        match args.first().map(String::as_str) {
            Some(sub @ ("start" | "random")) => {
                let idea = if sub == "random" {
                    random_weird_idea()
                } else {
                    args[1..].join(" ")
                };
                if idea.trim().is_empty() {
                    return Ok("Usage: genesis start \"<idea>\"".to_string());
                }
                let questions = interpreter.start(&idea).await?;
                Ok(format!(
                    "Genesis: {}\n\n{}\n\nReply with: genesis answer \"<your answers>\"",
                    idea, questions
                ))
            }
            Some("answer") => {
                if interpreter.active_session().is_none() {
                    return Ok("No genesis session in progress. Start one with 'genesis start \"<idea>\"'.".to_string());
                }
                let answers = if args.len() > 1 {
                    Some(args[1..].join(" "))
                } else {
                    self.app.ctx.content_prompt.as_ref().and_then(|ask| ask("your answers"))
                };
                let Some(answers) = answers.filter(|a| !a.trim().is_empty()) else {
                    return Ok("Usage: genesis answer \"<your answers>\"".to_string());
                };
                let brief = interpreter.submit_answers(&answers).await?;
                Ok(format!(
                    "{}\n\nScaffold it with: new <name> [--github]",
                    render::brief(&brief)
                ))
            }
            Some("show") => Ok(match GenesisBrief::recall(&self.app.ctx.memory) {
                Some(brief) => render::brief(&brief),
                None => "No project brief yet. Start with 'genesis start \"<idea>\"'.".to_string(),
            }),
            _ => Ok("Usage: genesis start \"<idea>\" | genesis random | genesis answer [\"<answers>\"] | genesis show".to_string()),
        }
    }

    async fn new_project(&self, args: &[String]) -> Result<String> {
        let github = args.iter().any(|a| a == "--github");
        let words: Vec<&String> = args.iter().filter(|a| *a != "--github").collect();
        let Some((name, summary)) = words.split_first() else {
            return Ok("Usage: new <name> [\"<summary>\"] [--github]".to_string());
        };
        let mut summary = summary.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(" ");
        // 没有简介时沿用 genesis 访谈的结果
        let brief = match GenesisBrief::recall(&self.app.ctx.memory) {
            Some(genesis) if summary.is_empty() => {
                summary = genesis.summary.clone();
                genesis.to_pairs()
            }
            _ => {
                let mut brief = vec![("title".to_string(), name.to_string())];
                if !summary.is_empty() {
                    brief.push(("summary".to_string(), summary.clone()));
                }
                brief
            }
        };

        let path = self
            .app
            .scaffolder()
            .scaffold(name, &brief, self.app.ctx.workspace.root())
            .await?;
        let mut out = format!("Project scaffolded at {}", path.display());
        if github {
            let private = self
                .app
                .ctx
                .style
                .read()
                .await
                .get_str("project.default_repo_visibility", "private")
                != "public";
            let repo_name = crate::workspace::sanitize_filename(name);
            let repo = self
                .app
                .github()
                .create_repo(&repo_name, &summary, private)
                .await
                .wrap_err("GitHub repository creation failed")?;
            out.push_str(&format!("\nGitHub repository created: {}", repo.html_url));
        }
        Ok(out)
    }
}

fn help() -> String {
    r#"--- The Giblet ---

Creative:
  idea "<prompt>"              Brainstorm practical ideas
  idea --weird ["<prompt>"]    Brainstorm weird ideas (random prompt if none)

Agent:
  plan "<goal>"                Show the command plan for a goal
  agent "<goal>"               Plan and execute a goal, with self-correction on failing tests
  skills                       List available skills
  skill <name> [k=v ...]       Run a skill
  learn <name> [trigger]       Save the last plan as a project skill

Project:
  roadmap                      Show roadmap tasks
  roadmap done "<desc>"        Mark a task as complete
  task add "<desc>" [who]      Add a shared team task (task list, task close <id>)
  new <name> ["<summary>"] [--github]  Scaffold a new project
  guard                        Report files over the length threshold
  git status|branches|log|summary
  automate changelog           Write a changelog from git history
  automate stubs <file.py>     Replace 'pass' in empty functions with TODO comments
  duplicates                   Find structurally identical Python functions
  genesis start "<idea>"       Start an idea interview (genesis random for a weird idea)
  genesis answer ["<answers>"] Turn your answers into a project brief (genesis show)

Files:
  read <path>  write <path> [content]  ls [dir]  exec "<command>"
  generate tests <path>        Generate unit tests for a file
  generate readme <path>       Write a mini README beside a file

Memory:
  focus ["<task>" | --clear]   Set, show or clear your focus
  remember|commit <key> <value>  recall|retrieve <key>
  checkpoint save|load <name>  checkpoint list

Personalisation:
  profile [get|set|clear]      style [get|set|reset]
  feedback <rating> [comment]  suggest  patterns

  help                         Show this help
  exit, quit                   Leave"#
        .to_string()
}

/// 运行 reedline 交互循环
pub async fn run(mut session: Session) -> Result<()> {
    let mut line_editor = Reedline::create();
    println!("The Giblet is awake. Type 'help' for a list of commands.");
    println!();

    loop {
        let prompt = DefaultPrompt::new(
            DefaultPromptSegment::Basic(session.prompt_label().await),
            DefaultPromptSegment::Empty,
        );
        match line_editor.read_line(&prompt) {
            Ok(Signal::Success(line)) => {
                if line.trim() == "clear" {
                    line_editor.clear_scrollback().wrap_err("failed to clear screen")?;
                    continue;
                }
                match session.handle(&line).await {
                    Ok(Some(reply)) if reply.is_empty() => {}
                    Ok(Some(reply)) => println!("{}\n", reply),
                    Ok(None) => {
                        println!("Going to sleep. Goodbye!");
                        break;
                    }
                    Err(e) => {
                        error!("command '{}' failed: {:#}", line.trim(), e);
                        eprintln!("Error: {:#}\n", e);
                    }
                }
            }
            Ok(Signal::CtrlD) | Ok(Signal::CtrlC) => {
                println!("\nGoing to sleep. Goodbye!");
                break;
            }
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }
    info!("repl session ended");
    Ok(())
}
