use async_trait::async_trait;
use color_eyre::eyre::Result;

/// 单次生成参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
        }
    }
}

impl GenerationOptions {
    /// 覆盖 max_tokens（README/路线图等较短输出使用 1024）
    pub fn with_max_tokens(self, max_tokens: u32) -> Self {
        Self { max_tokens, ..self }
    }
}

/// LLM 后端抽象：只暴露一个文本生成调用
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider 名称，如 "gemini"
    fn name(&self) -> &str;

    /// 当前使用的模型
    fn model(&self) -> &str;

    /// 后端是否可用（API key 已配置 / 服务可达）
    async fn is_available(&self) -> bool;

    async fn generate_text(&self, prompt: &str, options: &GenerationOptions) -> Result<String>;
}
