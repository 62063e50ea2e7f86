//! 终端输出格式

use crate::agent::{PlanEvent, PlanReport, StepStatus};
use crate::duplication::FunctionLocation;
use crate::genesis::GenesisBrief;
use crate::guardrails::LongFile;
use crate::skills::{SkillMeta, SkillOutcome};
use crate::workspace::CommandOutput;

const FOCUS_DISPLAY_MAX: usize = 23;

/// REPL 提示符：focus 优先，其次 git 分支
pub fn prompt_label(focus: Option<&str>, branch: Option<&str>) -> String {
    match (focus.filter(|f| !f.is_empty()), branch.filter(|b| !b.is_empty())) {
        (Some(focus), _) => {
            let shown = if focus.chars().count() > FOCUS_DISPLAY_MAX {
                format!("{}...", focus.chars().take(20).collect::<String>())
            } else {
                focus.to_string()
            };
            format!("giblet [focus: {}]", shown)
        }
        (None, Some(branch)) => format!("giblet [branch: {}]", branch),
        (None, None) => "giblet".to_string(),
    }
}

pub fn plan(steps: &[String]) -> String {
    let mut out = String::from("Proposed plan:");
    for (i, step) in steps.iter().enumerate() {
        out.push_str(&format!("\n  {}. {}", i + 1, step));
    }
    out
}

/// 命令输出：成功只显示 stdout，失败附带退出码与 stderr
pub fn output(out: &CommandOutput) -> String {
    if out.success() {
        return out.stdout.trim_end().to_string();
    }
    let mut text = format!("[exit code {}]", out.code);
    if !out.stdout.trim().is_empty() {
        text.push_str(&format!("\n[stdout]:\n{}", out.stdout.trim_end()));
    }
    if !out.stderr.trim().is_empty() {
        text.push_str(&format!("\n[stderr]:\n{}", out.stderr.trim_end()));
    }
    text
}

pub fn status(status: &StepStatus) -> String {
    match status {
        StepStatus::Succeeded => "ok".to_string(),
        StepStatus::Failed { code } => format!("failed (code {})", code),
        StepStatus::Skipped => "skipped".to_string(),
        StepStatus::Repaired { attempts } => format!("repaired after {} fix(es)", attempts),
        StepStatus::RepairFailed { attempts, reason } => {
            format!("repair failed after {} fix(es): {}", attempts, reason)
        }
    }
}

pub fn event(event: &PlanEvent) -> String {
    match event {
        PlanEvent::StepStarted { index, step } => format!("[{}] {}", index, step),
        PlanEvent::StepFinished { index, status: s, .. } => format!("[{}] -> {}", index, status(s)),
        PlanEvent::FixAttempt { attempt, max, file } => {
            format!("    self-correction {}/{}: asking for a fix to {}", attempt, max, file)
        }
        PlanEvent::FixApplied { attempt, file } => {
            format!("    fix {} written to {}, re-running tests", attempt, file)
        }
    }
}

pub fn report(report: &PlanReport) -> String {
    if report.cancelled {
        return "Plan cancelled.".to_string();
    }
    if report.steps.is_empty() {
        return "Nothing to do.".to_string();
    }
    let mut out = String::from("Plan summary:");
    for step in &report.steps {
        out.push_str(&format!("\n  {}. {} -> {}", step.index, step.step, status(&step.status)));
        if !step.status.is_ok() {
            let detail = output(&step.output);
            for line in detail.lines().take(8) {
                out.push_str(&format!("\n       {}", line));
            }
        }
    }
    out.push_str(if report.succeeded() {
        "\nAll steps completed."
    } else {
        "\nSome steps failed."
    });
    out
}

pub fn skill_outcome(name: &str, outcome: &SkillOutcome) -> String {
    let mut out = format!("Skill '{}':", name);
    for (step, result) in &outcome.steps {
        out.push_str(&format!("\n$ {}", step));
        let shown = output(result);
        if !shown.is_empty() {
            out.push_str(&format!("\n{}", shown));
        }
    }
    out.push_str(if outcome.success {
        "\nSkill finished."
    } else {
        "\nSkill stopped at a failing step."
    });
    out
}

pub fn skills(list: &[&SkillMeta]) -> String {
    if list.is_empty() {
        return "No skills available.".to_string();
    }
    let width = list.iter().map(|s| s.name.len()).max().unwrap_or(0);
    let mut out = String::from("Available skills:");
    for skill in list {
        out.push_str(&format!(
            "\n  {:<width$}  {:<9}  {}",
            skill.name,
            skill.source.label(),
            skill.description,
            width = width
        ));
    }
    out
}

pub fn long_files(report: &[LongFile], threshold: usize) -> String {
    if report.is_empty() {
        return format!("All files are within the {}-line threshold.", threshold);
    }
    let mut out = format!("{} file(s) exceed {} lines:", report.len(), threshold);
    for f in report {
        out.push_str(&format!("\n  {:>6}  {}", f.lines, f.path.display()));
    }
    out
}

pub fn brief(brief: &GenesisBrief) -> String {
    let mut out = format!("--- Project Brief: {} ---", brief.title);
    for (key, value) in brief.to_pairs().iter().filter(|(k, _)| k != "title") {
        out.push_str(&format!("\n{}: {}", key.replace('_', " "), value));
    }
    out
}

pub fn duplicates(groups: &[Vec<FunctionLocation>]) -> String {
    if groups.is_empty() {
        return "No structurally duplicate functions found.".to_string();
    }
    let mut out = format!("{} group(s) of structurally identical functions:", groups.len());
    for (i, group) in groups.iter().enumerate() {
        out.push_str(&format!("\n  Group {}:", i + 1));
        for loc in group {
            out.push_str(&format!(
                "\n    {}:{}  {}()",
                loc.file, loc.line_number, loc.function_name
            ));
        }
    }
    out
}
