use std::time::Duration;

use async_trait::async_trait;
use color_eyre::eyre::{eyre, Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::config::OllamaConfig;
use crate::error::ProviderError;

use super::traits::{GenerationOptions, Provider};

const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(3);

/// 本地 Ollama 服务（/api/generate，非流式）
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(config: &OllamaConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    fn build_body(&self, prompt: &str, options: &GenerationOptions) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": options.temperature,
                "num_predict": options.max_tokens,
            },
        })
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        let response = self
            .client
            .get(format!("{}/", self.base_url))
            .timeout(AVAILABILITY_TIMEOUT)
            .send()
            .await;
        match response {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("Ollama not reachable at {}: {}", self.base_url, e);
                false
            }
        }
    }

    async fn generate_text(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let resp = self
            .client
            .post(self.endpoint())
            .json(&self.build_body(prompt, options))
            .send()
            .await
            .wrap_err_with(|| format!("sending request to Ollama at {} failed", self.base_url))?;

        let status = resp.status();
        let resp_text = resp.text().await.wrap_err("reading Ollama response failed")?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: "Ollama",
                status,
                body: resp_text,
            }
            .into());
        }

        let parsed: OllamaResponse =
            serde_json::from_str(&resp_text).wrap_err("parsing Ollama response JSON failed")?;
        if let Some(error) = parsed.error {
            return Err(eyre!("Ollama error: {}", error));
        }
        Ok(parsed.response.unwrap_or_default().trim().to_string())
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: Option<String>,
    error: Option<String>,
}
