pub mod gemini;
pub mod ollama;
pub mod reliable;
#[cfg(test)]
pub(crate) mod testing;
pub mod traits;

use std::sync::Arc;

use color_eyre::eyre::{eyre, Result};

pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use reliable::{ReliableProvider, RetryConfig};
pub use traits::{GenerationOptions, Provider};

use crate::config::Config;

/// 已知 Provider 名称
pub const PROVIDER_NAMES: &[&str] = &["gemini", "ollama"];

/// 根据名称创建裸 Provider 实例
pub fn create_provider(name: &str, config: &Config) -> Result<Box<dyn Provider>> {
    match name.to_lowercase().as_str() {
        "gemini" => Ok(Box::new(GeminiProvider::new(&config.providers.gemini))),
        "ollama" => Ok(Box::new(OllamaProvider::new(&config.providers.ollama))),
        other => Err(eyre!(
            "unknown provider '{}' (available: {})",
            other,
            PROVIDER_NAMES.join(", ")
        )),
    }
}

/// 创建带重试与 fallback 的默认 Provider
///
/// `name_override` 为空时使用 `[default].provider`。
pub fn build_provider(config: &Config, name_override: Option<&str>) -> Result<Arc<dyn Provider>> {
    let name = name_override.unwrap_or(&config.default.provider);
    let mut provider = ReliableProvider::new(
        create_provider(name, config)?,
        RetryConfig::from(&config.reliability),
    );
    for fallback in config
        .reliability
        .fallback_providers
        .iter()
        .filter(|f| f.as_str() != name)
    {
        provider = provider.with_fallback(create_provider(fallback, config)?);
    }
    Ok(Arc::new(provider))
}

/// 从配置生成默认生成参数
pub fn default_options(config: &Config) -> GenerationOptions {
    GenerationOptions {
        temperature: config.default.temperature,
        max_tokens: config.default.max_tokens,
    }
}
