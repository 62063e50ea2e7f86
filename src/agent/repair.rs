use color_eyre::eyre::{Context, Result};

use crate::generators::{record_interaction, strip_code_fences};

use super::Agent;

/// 错误日志过长时只保留末尾部分
const MAX_ERROR_LOG_CHARS: usize = 6000;

impl Agent {
    /// 根据错误日志让 LLM 给出修正后的完整代码
    pub async fn attempt_fix(&self, code: &str, error_log: &str) -> Result<String> {
        let prompt = format!(
            "You are an expert debugging agent.\n\
             The code below failed with the following error. Analyse the error log and the code \
             and provide a corrected version of the code.\n\n\
             Error Log:\n---\n{}\n---\n\n\
             Code with Bug:\n---\n{}\n---\n\n\
             Respond with ONLY the complete, corrected code. Do not include explanations.",
            tail_chars(error_log, MAX_ERROR_LOG_CHARS),
            code
        );

        let raw = self
            .provider
            .generate_text(&prompt, &self.options)
            .await
            .wrap_err("fix generation failed")?;
        let fixed = strip_code_fences(&raw);
        record_interaction(&self.memory, "Agent", "attempt_fix", error_log, &fixed);
        Ok(fixed)
    }
}

/// 修复结果是否包含真正的代码（不只是空行和注释）
pub fn has_actual_code(code: &str) -> bool {
    code.lines().map(str::trim).any(|line| {
        !line.is_empty() && !line.starts_with('#') && !line.starts_with("//")
    })
}

fn tail_chars(text: &str, max: usize) -> &str {
    let count = text.chars().count();
    if count <= max {
        return text;
    }
    match text.char_indices().nth(count - max) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::test_memory;
    use crate::providers::testing::ScriptedProvider;
    use crate::providers::GenerationOptions;
    use std::sync::Arc;

    #[test]
    fn comments_only_is_not_code() {
        assert!(!has_actual_code(""));
        assert!(!has_actual_code("# TODO\n\n   # still nothing\n// nor this"));
        assert!(has_actual_code("# header\ndef add(a, b):\n    return a + b"));
    }

    #[test]
    fn tail_keeps_end_of_log() {
        assert_eq!(tail_chars("abcdef", 3), "def");
        assert_eq!(tail_chars("abc", 10), "abc");
        assert_eq!(tail_chars("ééé", 2), "éé");
    }

    #[tokio::test]
    async fn fix_prompt_has_log_and_code_and_output_is_unfenced() {
        let (memory, _tmp) = test_memory().await;
        let provider = Arc::new(ScriptedProvider::new(vec![
            "```python\ndef add(a, b):\n    return a + b\n```",
        ]));
        let agent = Agent::new(provider.clone(), memory, GenerationOptions::default());

        let fixed = agent
            .attempt_fix("def add(a, b):\n    return a - b", "AssertionError: assert -1 == 5")
            .await
            .unwrap();
        assert_eq!(fixed, "def add(a, b):\n    return a + b");

        let prompt = provider.last_prompt();
        assert!(prompt.contains("Error Log:\n---\nAssertionError: assert -1 == 5\n---"));
        assert!(prompt.contains("return a - b"));
        assert!(prompt.contains("corrected"));
    }
}
