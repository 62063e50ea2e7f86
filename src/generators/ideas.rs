use std::sync::Arc;

use color_eyre::eyre::{Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

use crate::memory::Memory;
use crate::profile::UserProfile;
use crate::providers::{GenerationOptions, Provider};

use super::record_interaction;

/// 结合用户画像（人设、创意等级）进行头脑风暴
pub struct IdeaSynthesizer {
    provider: Arc<dyn Provider>,
    memory: Arc<Memory>,
    profile: UserProfile,
    options: GenerationOptions,
}

impl IdeaSynthesizer {
    pub fn new(
        provider: Arc<dyn Provider>,
        memory: Arc<Memory>,
        profile: UserProfile,
        options: GenerationOptions,
    ) -> Self {
        Self {
            provider,
            memory,
            profile,
            options,
        }
    }

    /// 生成三个点子；`weird` 模式下追求离奇、不按常理的方案
    pub async fn generate_ideas(&self, prompt: &str, weird: bool) -> Result<String> {
        let user_name = self.profile.preference_or("general", "user_name", "the user").await;
        let company = self
            .profile
            .preference_or("general", "company_name", "their project")
            .await;
        info!("synthesizing ideas for {} (weird: {})", user_name, weird);

        let final_prompt = if weird {
            format!(
                "User prompt: \"{prompt}\"\n\
                 Context: you are brainstorming for {user_name}, working on {company}.\n\n\
                 You are the weird-mode creative engine of The Giblet.\n\
                 Brainstorm three bizarre, unconventional, out-of-the-box ideas for the prompt.\n\
                 Embrace surreal combinations and unexpected angles; practicality is optional.\n\
                 Give each idea a catchy name and a two-sentence pitch."
            )
        } else {
            let persona = self
                .profile
                .preference_or("llm_settings", "idea_synth_persona", "creative and helpful")
                .await;
            let creativity = self
                .profile
                .get_preference("llm_settings", "idea_synth_creativity")
                .await
                .and_then(|v| v.trim().parse::<u8>().ok())
                .unwrap_or(3);
            let style = self
                .profile
                .preference_or("coding_style", "summary", "standard conventions")
                .await;

            format!(
                "User prompt: \"{prompt}\"\n\
                 Context: you are helping {user_name}, working on {company}. \
                 Their coding style is described as: {style}.\n\n\
                 Adopt the following persona for your response: \"{persona}\".\n\
                 Your approach to creativity should be: \"{}\".\n\
                 Brainstorm three distinct solutions or ideas based on the user's prompt, \
                 keeping this persona and creativity level in mind.\n\
                 For each idea, list its main pros and cons.",
                creativity_description(creativity)
            )
        };

        let response = self
            .provider
            .generate_text(&final_prompt, &self.options)
            .await
            .wrap_err("idea generation failed")?;
        record_interaction(&self.memory, "IdeaSynthesizer", "generate_ideas", prompt, &response);
        Ok(response)
    }

    /// 带用户上下文的通用文本生成
    pub async fn generate_text(&self, prompt: &str) -> Result<String> {
        let user_name = self.profile.preference_or("general", "user_name", "the user").await;
        let contextual = format!("Considering the user is {}:\n\n{}", user_name, prompt);

        let response = self
            .provider
            .generate_text(&contextual, &self.options)
            .await
            .wrap_err("text generation failed")?;
        record_interaction(&self.memory, "IdeaSynthesizer", "generate_text", prompt, &response);
        Ok(response)
    }
}

/// 创意等级 1-5 的提示词描述，越界按 3 处理
pub fn creativity_description(level: u8) -> &'static str {
    match level {
        1 => "highly practical and conventional",
        2 => "mostly practical with a touch of novelty",
        4 => "leaning towards novel and experimental",
        5 => "highly experimental and unconventional",
        _ => "balanced between practical and novel",
    }
}

const ADJECTIVES: &[&str] = &[
    "Sentient",
    "Quantum",
    "Blockchain-Powered",
    "Artisanal",
    "Hyper-Local",
    "Cloud-Native",
    "Steampunk",
    "Retro-Futuristic",
    "Minimalist",
    "Acoustic",
    "AI-Driven",
    "Organic",
];

const NOUNS: &[&str] = &[
    "Toaster",
    "Sock-Matching App",
    "Cat Meme Generator",
    "Recipe Book",
    "Alarm Clock",
    "Weather App",
    "Fitness Tracker",
    "Social Network",
    "Pancake Flipper",
    "Dream Journal",
    "Plant Watering System",
];

const AUDIENCES: &[&str] = &[
    "for Ghosts",
    "for Time Travelers",
    "for Existentialists",
    "for Super-Intelligent Goldfish",
    "for People Who Only Speak in Questions",
    "for Left-Handed Astronauts",
    "for Shy Robots",
    "for Existentially Tired Cats",
];

/// 随机拼一个离奇的项目点子，如 "Steampunk Toaster for Ghosts"
pub fn random_weird_idea() -> String {
    weird_idea_with(&mut rand::thread_rng())
}

pub fn weird_idea_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = pick(ADJECTIVES, rng);
    let noun = pick(NOUNS, rng);
    let audience = pick(AUDIENCES, rng);
    format!("{} {} {}", adjective, noun, audience)
}

fn pick<R: Rng + ?Sized>(words: &[&'static str], rng: &mut R) -> &'static str {
    words.choose(rng).copied().unwrap_or_default()
}
