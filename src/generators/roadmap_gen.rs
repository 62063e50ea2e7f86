use std::sync::Arc;

use color_eyre::eyre::{bail, Context, Result};
use tracing::info;

use crate::providers::{GenerationOptions, Provider};
use crate::style::SharedStyle;

use super::readme::brief_title;
use super::render_brief;

/// 根据项目简介生成可被 `RoadmapManager` 解析的 roadmap.md
pub struct RoadmapGenerator {
    provider: Arc<dyn Provider>,
    style: SharedStyle,
    options: GenerationOptions,
}

impl RoadmapGenerator {
    pub fn new(provider: Arc<dyn Provider>, style: SharedStyle, options: GenerationOptions) -> Self {
        Self {
            provider,
            style,
            options: options.with_max_tokens(1024),
        }
    }

    pub async fn build_prompt(&self, brief: &[(String, String)]) -> String {
        let (format, tone) = {
            let prefs = self.style.read().await;
            (
                prefs.get_str("roadmap.default_format", "phase_based"),
                prefs.get_str("roadmap.default_tone", "professional"),
            )
        };

        format!(
            "You are an expert project manager. Create a project roadmap in Markdown from the \
             project brief, following the user's format and tone strictly.\n\n\
             **User's Style Preferences:**\n\
             - Roadmap Format: {format}\n\
             - Tone: {tone}\n\n\
             **Project Brief (Source of Truth):**\n{}\n\n\
             **Your Task:**\n\
             Write a complete roadmap.md. Using the '{format}' format, split the project into \
             logical phases (e.g. Phase 0: Foundation, Phase 1: Core Features, Phase 2: Deployment). \
             Under each phase list 3-5 specific, actionable tasks as Markdown checkboxes \
             (`- [ ] Task description`).\n\
             - Keep the tone consistently '{tone}'.\n\
             - Every task line must be a checkbox so the roadmap can be tracked.\n\n\
             Output only the raw Markdown of roadmap.md, with no other text.",
            render_brief(brief)
        )
    }

    pub async fn generate(&self, brief: &[(String, String)]) -> Result<String> {
        info!("generating roadmap for {}", brief_title(brief));
        if !self.provider.is_available().await {
            bail!(
                "cannot generate roadmap: provider '{}' is not available",
                self.provider.name()
            );
        }
        let prompt = self.build_prompt(brief).await;
        self.provider
            .generate_text(&prompt, &self.options)
            .await
            .wrap_err("roadmap generation failed")
    }
}
