use color_eyre::eyre::{bail, Context, Result};
use serde_json::Value;
use tracing::{debug, info};

use crate::generators::{record_interaction, strip_code_fences};
use crate::skills::manifest::list_item;

use super::{Agent, LAST_PLAN_KEY};

const COMMAND_CATALOGUE: &str = "\
- `write <filepath>` (writes user-provided content to a file; always the first step when new code is needed)
- `generate tests <filepath>` (generates unit tests for an existing file into tests/)
- `exec \"<shell_command>\"` (runs a shell command such as `pytest` or `python main.py`)
- `read <filepath>`
- `ls [directory]`";

impl Agent {
    /// 让 LLM 把目标拆成 giblet 命令序列
    pub async fn create_plan(&self, goal: &str) -> Result<Vec<String>> {
        let prompt = format!(
            "You are an expert software development agent.\n\
             Create a sequence of `giblet` commands that accomplishes the goal below.\n\n\
             Available commands:\n{COMMAND_CATALOGUE}\n\n\
             IMPORTANT: to create a new script you must use `write` first; the user is then \
             asked for the code. Only after the file exists can tests be generated for it.\n\n\
             Goal: \"{goal}\"\n\n\
             Respond with ONLY the commands, one per line, unnumbered. Example:\n\
             write my_script.py\n\
             generate tests my_script.py\n\
             exec \"pytest\""
        );

        let raw = self
            .provider
            .generate_text(&prompt, &self.options)
            .await
            .wrap_err("plan generation failed")?;
        let plan = parse_plan(&raw);
        if plan.is_empty() {
            bail!("the model returned an empty plan");
        }
        info!("plan for '{}': {} steps", goal, plan.len());

        record_interaction(&self.memory, "Agent", "create_plan", goal, &plan.join("\n"));
        self.memory.remember(LAST_PLAN_KEY, plan.clone());
        Ok(plan)
    }
}

/// 解析 LLM 返回的计划：JSON 字符串数组或每行一条命令
///
/// 去掉代码围栏、空行、列表标记，以及每步开头的一个 `giblet `。
pub fn parse_plan(raw: &str) -> Vec<String> {
    let text = strip_code_fences(raw);

    let steps: Vec<String> = match parse_json_array(&text) {
        Some(items) => items,
        None => text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| list_item(l).unwrap_or(l).trim().to_string())
            .collect(),
    };

    steps
        .into_iter()
        .map(|s| {
            let s = s.trim().trim_matches('`').trim();
            s.strip_prefix("giblet ").unwrap_or(s).trim().to_string()
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// 从文本中截取 `[...]` 并解析为字符串数组
fn parse_json_array(text: &str) -> Option<Vec<String>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end <= start || !text[..start].trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Array(items)) => {
            let strings: Option<Vec<String>> = items
                .into_iter()
                .map(|v| v.as_str().map(String::from))
                .collect();
            strings
        }
        _ => {
            debug!("plan output looked like JSON but did not parse, falling back to lines");
            None
        }
    }
}
