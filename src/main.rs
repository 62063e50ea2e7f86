use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;

use giblet::cli::{self, render, repl, App, GoalOutcome};
use giblet::config::Config;

#[derive(Parser)]
#[command(name = "giblet", about = "The Giblet: a personal AI dev assistant", version)]
struct Cli {
    /// 指定 Provider（覆盖配置文件中的 default）
    #[arg(short, long, global = true)]
    provider: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive assistant (default)
    Repl,
    /// Serve the HTTP API
    Serve {
        /// Listen address, overrides [api].bind
        #[arg(long)]
        bind: Option<String>,
    },
    /// Show the command plan for a goal without running it
    Plan { goal: Vec<String> },
    /// Plan and execute a goal
    Run {
        goal: Vec<String>,
        /// Execute without asking for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// List available skills
    Skills,
    /// Report source files that exceed the length threshold
    Guard {
        #[arg(long)]
        threshold: Option<usize>,
        path: Option<PathBuf>,
    },
    /// Watch the project and print suggestions when files change
    Watch { path: Option<PathBuf> },
    /// Interactive configuration wizard
    Setup,
    /// Create the config file
    Init,
    /// Show the current config file
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing()?;

    let cli = Cli::parse();
    let provider = cli.provider.as_deref();

    match cli.command.unwrap_or(Commands::Repl) {
        Commands::Repl => run_repl(provider).await?,
        Commands::Serve { bind } => run_serve(provider, bind).await?,
        Commands::Plan { goal } => run_plan(provider, &goal.join(" ")).await?,
        Commands::Run { goal, yes } => run_goal(provider, &goal.join(" "), yes).await?,
        Commands::Skills => {
            let app = App::build(load_config()?, provider, None).await?;
            println!("{}", render::skills(&app.skills.list()));
        }
        Commands::Guard { threshold, path } => run_guard(threshold, path)?,
        Commands::Watch { path } => {
            let config = load_config()?;
            let root = path.unwrap_or_else(|| config.project_root());
            giblet::watcher::watch(&root, config.guardrails.extensions.clone()).await?;
        }
        Commands::Setup => giblet::config::run_setup()?,
        Commands::Init => run_init()?,
        Commands::Config => run_config()?,
    }

    Ok(())
}

fn load_config() -> Result<Config> {
    Config::load_or_init().wrap_err("failed to load config")
}

async fn run_repl(provider: Option<&str>) -> Result<()> {
    let app = App::build(load_config()?, provider, Some(cli::stdin_content_prompt())).await?;
    let session = repl::Session::new(app, cli::interactive_confirm(), Some(cli::printing_observer()));
    repl::run(session).await
}

async fn run_serve(provider: Option<&str>, bind: Option<String>) -> Result<()> {
    let config = load_config()?;
    let bind = bind.unwrap_or_else(|| config.api.bind.clone());
    let app = App::build(config, provider, None).await?;
    giblet::api::serve(app.api_state(), &bind).await
}

async fn run_plan(provider: Option<&str>, goal: &str) -> Result<()> {
    if goal.trim().is_empty() {
        color_eyre::eyre::bail!("a goal is required, e.g. `giblet plan add a lexer`");
    }
    let app = App::build(load_config()?, provider, None).await?;
    let plan = app.agent.create_plan(goal).await?;
    println!("{}", render::plan(&plan));
    Ok(())
}

async fn run_goal(provider: Option<&str>, goal: &str, yes: bool) -> Result<()> {
    if goal.trim().is_empty() {
        color_eyre::eyre::bail!("a goal is required, e.g. `giblet run add a lexer`");
    }
    let app = App::build(load_config()?, provider, Some(cli::stdin_content_prompt())).await?;
    let confirm = if yes {
        cli::auto_confirm()
    } else {
        cli::interactive_confirm()
    };
    let outcome = app
        .pursue(goal, &confirm, Some(cli::printing_observer()))
        .await?;
    match &outcome {
        GoalOutcome::Skill { name, outcome } => println!("{}", render::skill_outcome(name, outcome)),
        GoalOutcome::Plan(report) => println!("{}", render::report(report)),
    }
    if !outcome.succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

fn run_guard(threshold: Option<usize>, path: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let mut guard = giblet::guardrails::ModularityGuardrails::from_config(&config.guardrails);
    if let Some(t) = threshold {
        guard.threshold = t;
    }
    let root = path.unwrap_or_else(|| config.project_root());
    let report = guard.scan(&root);
    println!("{}", render::long_files(&report, guard.threshold));
    if !report.is_empty() {
        println!("\n{}", guard.suggest(&report));
    }
    Ok(())
}

fn run_init() -> Result<()> {
    let config_path = Config::config_path()?;

    if config_path.exists() {
        println!("Config file already exists: {}", config_path.display());
        println!("Delete it first if you want to start over.");
    } else {
        let _ = Config::load_or_init()?;
        println!("Created config file: {}", config_path.display());
        println!("Add your Gemini API key there, or run `giblet setup`.");
    }

    Ok(())
}

fn run_config() -> Result<()> {
    let config_path = Config::config_path()?;

    if !config_path.exists() {
        println!("No config file yet. Run `giblet init` to create one.");
        return Ok(());
    }

    let content = std::fs::read_to_string(&config_path).wrap_err("failed to read config file")?;
    println!("Config file: {}\n", config_path.display());
    println!("{}", content);

    Ok(())
}

/// 初始化 tracing: stderr 只输出 warn+，日志文件输出 debug+
fn init_tracing() -> Result<()> {
    let log_dir = Config::home_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)
        .wrap_err_with(|| format!("failed to create log dir {}", log_dir.display()))?;

    // 文件日志: 按天滚动
    let file_appender = tracing_appender::rolling::daily(&log_dir, "giblet.log");
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("giblet=debug")),
        );

    // stderr: 只输出 warn+（不干扰 REPL 交互）
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(tracing_subscriber::EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(())
}
