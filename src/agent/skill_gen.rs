use color_eyre::eyre::{bail, Result};
use tracing::warn;

use crate::skills::{validate_skill_name, SkillManifest};

use super::Agent;

impl Agent {
    /// 把一个已执行的计划保存为可重放的 SKILL.md
    ///
    /// 描述由 LLM 撰写；调用失败或输出不可用时使用固定模板。
    pub async fn generate_skill_from_plan(
        &self,
        plan: &[String],
        name: &str,
        trigger: Option<&str>,
    ) -> Result<String> {
        validate_skill_name(name)?;
        if plan.is_empty() {
            bail!("cannot create skill '{}' from an empty plan", name);
        }

        let trigger = trigger
            .map(|t| t.replace(',', " ").trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| name.replace('-', " "));

        let steps_text = plan
            .iter()
            .enumerate()
            .map(|(i, s)| format!("Step {}: giblet {}", i + 1, s))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "You write skills for another developer agent. A skill named '{name}' replays the \
             plan below when the user says \"{trigger}\".\n\n{steps_text}\n\n\
             Write a single sentence (max 25 words) describing what this skill does and when to \
             use it. Respond with the sentence only."
        );

        let description = match self.provider.generate_text(&prompt, &self.options).await {
            Ok(text) => usable_description(&text),
            Err(e) => {
                warn!("skill description generation failed: {}", e);
                None
            }
        }
        .unwrap_or_else(|| format!("Replays a saved {}-step plan.", plan.len()));

        let manifest = SkillManifest {
            name: name.to_string(),
            description,
            triggers: vec![trigger],
            parameters: vec![],
            steps: plan.to_vec(),
            body: steps_text_body(plan),
        };
        Ok(manifest.to_markdown())
    }
}

/// 取第一行非空文本；含 frontmatter 分隔符或过长时视为不可用
fn usable_description(text: &str) -> Option<String> {
    let line = text
        .lines()
        .map(|l| l.trim().trim_matches('"').trim())
        .find(|l| !l.is_empty())?;
    if line.starts_with("---") || line.starts_with("```") || line.chars().count() > 300 {
        return None;
    }
    Some(line.to_string())
}

fn steps_text_body(plan: &[String]) -> String {
    format!("Generated from a {}-step plan.", plan.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::test_memory;
    use crate::providers::testing::ScriptedProvider;
    use crate::providers::GenerationOptions;
    use crate::skills::parse_skill_md;
    use std::sync::Arc;

    fn plan() -> Vec<String> {
        vec!["write calc.py".to_string(), "exec \"pytest\"".to_string()]
    }

    #[tokio::test]
    async fn manifest_uses_llm_description() {
        let (memory, _tmp) = test_memory().await;
        let provider = Arc::new(ScriptedProvider::new(vec!["\"Creates and tests a calculator.\"\n"]));
        let agent = Agent::new(provider.clone(), memory, GenerationOptions::default());

        let md = agent
            .generate_skill_from_plan(&plan(), "calc-setup", Some("Build Calc"))
            .await
            .unwrap();
        let manifest = parse_skill_md(&md).unwrap();
        assert_eq!(manifest.name, "calc-setup");
        assert_eq!(manifest.description, "Creates and tests a calculator.");
        assert_eq!(manifest.triggers, vec!["build calc"]);
        assert_eq!(manifest.steps, plan());
        assert!(provider.last_prompt().contains("Step 2: giblet exec \"pytest\""));
    }

    #[tokio::test]
    async fn falls_back_when_llm_fails() {
        let (memory, _tmp) = test_memory().await;
        let provider = Arc::new(ScriptedProvider::failing("offline"));
        let agent = Agent::new(provider, memory, GenerationOptions::default());

        let md = agent.generate_skill_from_plan(&plan(), "calc-setup", None).await.unwrap();
        let manifest = parse_skill_md(&md).unwrap();
        assert_eq!(manifest.description, "Replays a saved 2-step plan.");
        assert_eq!(manifest.triggers, vec!["calc setup"]);
    }

    #[tokio::test]
    async fn invalid_name_or_empty_plan_rejected() {
        let (memory, _tmp) = test_memory().await;
        let agent = Agent::new(
            Arc::new(ScriptedProvider::new(vec![])),
            memory,
            GenerationOptions::default(),
        );
        assert!(agent.generate_skill_from_plan(&plan(), "Bad Name", None).await.is_err());
        assert!(agent.generate_skill_from_plan(&[], "ok-name", None).await.is_err());
    }

    #[test]
    fn unusable_descriptions_rejected() {
        assert_eq!(usable_description("\n  ok then \n"), Some("ok then".to_string()));
        assert!(usable_description("---\nname: x").is_none());
        assert!(usable_description("   ").is_none());
    }
}
