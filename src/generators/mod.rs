//! 基于 LLM 的内容生成：点子、代码、README、路线图

pub mod code;
pub mod ideas;
pub mod mini_readme;
pub mod readme;
pub mod roadmap_gen;

pub use code::CodeGenerator;
pub use ideas::{random_weird_idea, IdeaSynthesizer};
pub use mini_readme::MiniReadmeGenerator;
pub use readme::ReadmeGenerator;
pub use roadmap_gen::RoadmapGenerator;

use serde_json::json;

use crate::memory::Memory;

/// 项目简介：有序的 key/value 列表
pub type ProjectBrief = Vec<(String, String)>;

/// 会话记忆中最近一次 AI 调用的 key
pub const LAST_INTERACTION_KEY: &str = "last_ai_interaction";

/// 去掉包裹整个回复的 markdown 代码块（任意语言标记）
///
/// 没有围栏时原样返回（去首尾空白）。
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // 第一行剩余部分是语言标记
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim().to_string()
}

/// 按字符截断
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// 把最近一次 AI 调用的摘要写入会话记忆
pub(crate) fn record_interaction(
    memory: &Memory,
    module: &str,
    method: &str,
    prompt: &str,
    output: &str,
) {
    memory.remember(
        LAST_INTERACTION_KEY,
        json!({
            "module": module,
            "method": method,
            "prompt_summary": truncate_chars(prompt, 100),
            "output_summary": truncate_chars(output, 150),
        }),
    );
}

/// 把项目简介渲染成 `- key: value` 行
pub(crate) fn render_brief(brief: &[(String, String)]) -> String {
    brief
        .iter()
        .map(|(k, v)| format!("- {}: {}", k, v))
        .collect::<Vec<_>>()
        .join("\n")
}
