use async_trait::async_trait;
use color_eyre::eyre::{eyre, Context, Result};
use serde::Deserialize;

use crate::config::GeminiConfig;
use crate::error::ProviderError;

use super::traits::{GenerationOptions, Provider};

/// Google Gemini（generativelanguage REST API）
pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(config: &GeminiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    /// 构造请求 URL（不含 key，key 通过 query 参数附加）
    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn build_body(prompt: &str, options: &GenerationOptions) -> serde_json::Value {
        serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }],
            }],
            "generationConfig": {
                "temperature": options.temperature,
                "maxOutputTokens": options.max_tokens,
            },
        })
    }

    /// 拼接第一个候选的所有文本片段
    fn parse_response(body: &GeminiResponse) -> Result<String> {
        if let Some(feedback) = &body.prompt_feedback {
            if let Some(reason) = &feedback.block_reason {
                return Err(ProviderError::Blocked {
                    provider: "Gemini",
                    reason: reason.clone(),
                }
                .into());
            }
        }

        let candidate = body
            .candidates
            .first()
            .ok_or_else(|| eyre!("Gemini returned no candidates"))?;

        let text: String = candidate
            .content
            .as_ref()
            .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(eyre!(
                "Gemini returned an empty response (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            ));
        }
        Ok(text)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn generate_text(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingKey {
                provider: "Gemini",
                hint: "set GEMINI_API_KEY or [providers.gemini].api_key",
            }
            .into());
        }

        let url = url::Url::parse_with_params(&self.endpoint(), &[("key", self.api_key.as_str())])
            .wrap_err("invalid Gemini base URL")?;

        let resp = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(&Self::build_body(prompt, options))
            .send()
            .await
            .wrap_err("sending request to Gemini failed")?;

        let status = resp.status();
        let resp_text = resp.text().await.wrap_err("reading Gemini response failed")?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: "Gemini",
                status,
                body: resp_text,
            }
            .into());
        }

        let parsed: GeminiResponse =
            serde_json::from_str(&resp_text).wrap_err("parsing Gemini response JSON failed")?;
        Self::parse_response(&parsed)
    }
}

// --- Gemini 响应结构体（仅用于反序列化）---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}
