use std::sync::Arc;

use color_eyre::eyre::{bail, Context, Result};
use serde_json::Value;
use tracing::info;

use crate::providers::{GenerationOptions, Provider};
use crate::style::SharedStyle;

use super::render_brief;

/// 根据项目简介和风格偏好生成 README.md
pub struct ReadmeGenerator {
    provider: Arc<dyn Provider>,
    style: SharedStyle,
    options: GenerationOptions,
}

impl ReadmeGenerator {
    pub fn new(provider: Arc<dyn Provider>, style: SharedStyle, options: GenerationOptions) -> Self {
        Self {
            provider,
            style,
            options: options.with_max_tokens(1024),
        }
    }

    pub async fn build_prompt(&self, brief: &[(String, String)]) -> String {
        let (style, tone, sections) = {
            let prefs = self.style.read().await;
            let sections = match prefs.get("readme.default_sections") {
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                _ => "Overview, Features, Getting Started".to_string(),
            };
            (
                prefs.get_str("readme.default_style", "standard"),
                prefs.get_str("readme.default_tone", "professional"),
                sections,
            )
        };

        format!(
            "You are a professional technical writer creating the README.md of a new software \
             project. Follow the user's style and content requirements strictly.\n\n\
             **User's Style Preferences:**\n\
             - Overall Style: {style}\n\
             - Tone: {tone}\n\n\
             **Project Brief (Source of Truth):**\n{}\n\n\
             **Required Sections:**\n\
             Include these sections in a logical order: {sections}.\n\
             - Use the project brief as the only source of content.\n\
             - Keep the tone consistently '{tone}'.\n\
             - Structure it like a '{style}' README.\n\
             - Where the brief lacks information for a section, write a sensible placeholder.\n\n\
             Output only the raw Markdown of README.md, with no text before or after it.",
            render_brief(brief)
        )
    }

    pub async fn generate(&self, brief: &[(String, String)]) -> Result<String> {
        let title = brief_title(brief);
        info!("generating README for {}", title);
        if !self.provider.is_available().await {
            bail!(
                "cannot generate README: provider '{}' is not available",
                self.provider.name()
            );
        }
        let prompt = self.build_prompt(brief).await;
        self.provider
            .generate_text(&prompt, &self.options)
            .await
            .wrap_err("README generation failed")
    }
}

/// 简介中的 title，缺失时为 "Untitled Project"
pub(crate) fn brief_title(brief: &[(String, String)]) -> &str {
    brief
        .iter()
        .find(|(k, _)| k == "title")
        .map(|(_, v)| v.as_str())
        .unwrap_or("Untitled Project")
}
