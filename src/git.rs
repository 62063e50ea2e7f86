use std::path::{Path, PathBuf};

use color_eyre::eyre::{bail, eyre, Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::generators::IdeaSynthesizer;

/// 变更日志最多包含的提交数
const CHANGELOG_COMMIT_LIMIT: usize = 50;
/// 字段分隔符 / 记录分隔符（git pretty format 中的 %x1f / %x1e）
const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: char = '\u{1e}';

/// 一条提交记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    pub sha: String,
    pub author: String,
    /// `%Y-%m-%d %H:%M:%S`
    pub date: String,
    pub message: String,
}

impl CommitInfo {
    /// 只取日期部分
    pub fn day(&self) -> &str {
        self.date.split(' ').next().unwrap_or(&self.date)
    }
}

/// 通过 `git` 子进程读取仓库状态
pub struct GitAnalyzer {
    root: PathBuf,
}

impl GitAnalyzer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 是否位于 git 仓库内
    pub async fn is_repo(&self) -> bool {
        self.git(&["rev-parse", "--is-inside-work-tree"])
            .await
            .is_ok_and(|out| out.trim() == "true")
    }

    /// 工作区状态的一句话描述
    pub async fn branch_status(&self) -> Result<String> {
        if !self.is_repo().await {
            return Ok("Not a Git repository.".to_string());
        }
        let porcelain = self.git(&["status", "--porcelain"]).await?;
        Ok(if porcelain.trim().is_empty() {
            "Working directory is clean.".to_string()
        } else {
            "Uncommitted changes or untracked files present.".to_string()
        })
    }

    /// 本地分支名
    pub async fn branches(&self) -> Result<Vec<String>> {
        let out = self.git(&["branch", "--format=%(refname:short)"]).await?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    /// 当前分支；detached HEAD 时返回 "HEAD"
    pub async fn current_branch(&self) -> Result<String> {
        let out = self.git(&["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        Ok(out.trim().to_string())
    }

    /// 最近 n 条提交（新到旧）；仓库还没有提交时返回空
    pub async fn commit_log(&self, n: usize) -> Result<Vec<CommitInfo>> {
        if self.git(&["rev-parse", "--verify", "-q", "HEAD"]).await.is_err() {
            return Ok(vec![]);
        }
        let count = format!("-n{}", n);
        let out = self
            .git(&[
                "log",
                &count,
                "--date=format:%Y-%m-%d %H:%M:%S",
                "--format=%h%x1f%an%x1f%ad%x1f%B%x1e",
            ])
            .await?;
        Ok(parse_log(&out))
    }

    /// 让 LLM 概括最近的开发动态
    pub async fn summarize(&self, ideas: &IdeaSynthesizer, n: usize) -> Result<String> {
        let commits = self.commit_log(n).await?;
        if commits.is_empty() {
            return Ok("No commits found to summarize.".to_string());
        }
        ideas.generate_text(&summary_prompt(&commits)).await
    }

    /// 生成 markdown 变更日志，写到 `<data_dir>/changelogs/`
    pub async fn changelog(&self, data_dir: &Path) -> Result<PathBuf> {
        if !self.is_repo().await {
            bail!("'{}' is not a git repository", self.root.display());
        }
        let commits = self.commit_log(CHANGELOG_COMMIT_LIMIT).await?;
        let branch = self.current_branch().await.unwrap_or_else(|_| "unknown".to_string());

        let dir = data_dir.join("changelogs");
        tokio::fs::create_dir_all(&dir)
            .await
            .wrap_err("failed to create changelog directory")?;
        let file_name = format!(
            "CHANGELOG_{}_{}.md",
            branch.replace('/', "_"),
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        );
        let path = dir.join(file_name);
        tokio::fs::write(&path, render_changelog(&commits))
            .await
            .wrap_err_with(|| format!("writing {} failed", path.display()))?;
        info!("changelog with {} commits written to {}", commits.len(), path.display());
        Ok(path)
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        debug!("git {:?} in {}", args, self.root.display());
        let output = tokio::process::Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .await
            .wrap_err("failed to run git (is it installed?)")?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(eyre!(
                "git {} failed ({}): {}",
                args.first().copied().unwrap_or_default(),
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ))
        }
    }
}

/// 解析 `%h%x1f%an%x1f%ad%x1f%B%x1e` 格式的 git log 输出
pub fn parse_log(raw: &str) -> Vec<CommitInfo> {
    raw.split(RECORD_SEP)
        .filter_map(|record| {
            let mut fields = record.trim_start_matches('\n').splitn(4, FIELD_SEP);
            let sha = fields.next()?.trim();
            if sha.is_empty() {
                return None;
            }
            Some(CommitInfo {
                sha: sha.chars().take(7).collect(),
                author: fields.next()?.trim().to_string(),
                date: fields.next()?.trim().to_string(),
                message: fields.next().unwrap_or_default().trim().to_string(),
            })
        })
        .collect()
}

/// 提交摘要提示词
pub fn summary_prompt(commits: &[CommitInfo]) -> String {
    let lines: Vec<String> = commits
        .iter()
        .map(|c| {
            format!(
                "- {} (by {} on {})",
                c.message.lines().next().unwrap_or_default(),
                c.author,
                c.day()
            )
        })
        .collect();
    format!(
        "Here are the most recent commits of a software project:\n{}\n\n\
         Summarize the recent development activity as a few concise bullet points, \
         grouping related changes together. \
         Finish with a single sentence describing the project's current momentum.",
        lines.join("\n")
    )
}

/// 渲染变更日志 markdown
pub fn render_changelog(commits: &[CommitInfo]) -> String {
    let mut out = String::from("# Project Changelog\n");
    for commit in commits {
        out.push_str(&format!(
            "\n## [{}] - {}\n**Author:** {}\n\n",
            commit.sha, commit.date, commit.author
        ));
        for line in commit.message.lines() {
            out.push_str(&format!("> {}\n", line));
        }
    }
    out
}
