use async_trait::async_trait;
use color_eyre::eyre::{eyre, Report, Result};
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::config::ReliabilityConfig;
use crate::error::ProviderError;

use super::traits::{GenerationOptions, Provider};

/// 重试配置
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 首次尝试之外的重试次数
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 10_000,
        }
    }
}

impl From<&ReliabilityConfig> for RetryConfig {
    fn from(config: &ReliabilityConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff_ms: config.initial_backoff_ms,
            ..Self::default()
        }
    }
}

impl RetryConfig {
    /// 每次重试前的等待时间，共 `max_retries` 个
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let mut next = self.initial_backoff_ms as f64;
        (0..self.max_retries).map(move |_| {
            let current = (next as u64).min(self.max_backoff_ms);
            next *= self.backoff_multiplier;
            Duration::from_millis(current)
        })
    }
}

/// 按顺序尝试的 Provider 链，每个成员独立重试
pub struct ReliableProvider {
    /// 第一个为主 Provider
    chain: Vec<Box<dyn Provider>>,
    retry: RetryConfig,
}

impl ReliableProvider {
    pub fn new(primary: Box<dyn Provider>, retry: RetryConfig) -> Self {
        Self {
            chain: vec![primary],
            retry,
        }
    }

    /// 追加一个 fallback
    pub fn with_fallback(mut self, fallback: Box<dyn Provider>) -> Self {
        self.chain.push(fallback);
        self
    }

    pub fn fallback_count(&self) -> usize {
        self.chain.len() - 1
    }

    fn primary(&self) -> &dyn Provider {
        &*self.chain[0]
    }

    async fn call_with_retries(
        &self,
        provider: &dyn Provider,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String> {
        let mut delays = self.retry.delays();
        let mut attempt = 1;
        loop {
            let err = match provider.generate_text(prompt, options).await {
                Ok(text) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", provider.name(), attempt);
                    }
                    return Ok(text);
                }
                Err(e) => e,
            };
            let message = format!("{:#}", err);
            if !is_transient(&err) {
                warn!("{}: permanent error, not retrying: {}", provider.name(), message);
                return Err(err);
            }
            let Some(delay) = delays.next() else {
                return Err(err);
            };
            warn!(
                "{}: attempt {} failed, retrying in {:?}: {}",
                provider.name(),
                attempt,
                delay,
                crate::generators::truncate_chars(&message, 150)
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl Provider for ReliableProvider {
    fn name(&self) -> &str {
        self.primary().name()
    }

    fn model(&self) -> &str {
        self.primary().model()
    }

    async fn is_available(&self) -> bool {
        for provider in &self.chain {
            if provider.is_available().await {
                return true;
            }
        }
        false
    }

    async fn generate_text(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let mut last_err = None;
        for (i, provider) in self.chain.iter().enumerate() {
            if i > 0 {
                warn!("falling back to {} ({}/{})", provider.name(), i, self.fallback_count());
            }
            match self.call_with_retries(&**provider, prompt, options).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!("provider {} gave up: {:#}", provider.name(), e);
                    last_err = Some(e);
                }
            }
        }
        let summary = format!(
            "all providers failed (primary + {} fallback(s))",
            self.fallback_count()
        );
        match last_err {
            Some(e) => Err(e.wrap_err(summary)),
            None => Err(eyre!(summary)),
        }
    }
}

/// 超时、连接失败、5xx 与 429 可重试；鉴权失败、请求错误与内容拦截不可重试
fn is_transient(err: &Report) -> bool {
    !err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<ProviderError>())
        .any(ProviderError::is_permanent)
}
