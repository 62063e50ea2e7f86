use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// 全局配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub default: DefaultConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub reliability: ReliabilityConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub guardrails: GuardrailsConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub github: GithubConfig,
}

/// 默认 Provider 与生成参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultConfig {
    /// "gemini" 或 "ollama"
    pub provider: String,
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    2048
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            temperature: 0.7,
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// 为空时回退到 GEMINI_API_KEY 环境变量
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-1.5-flash-latest".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "mistral".to_string(),
        }
    }
}

/// 可靠性配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    /// 最大重试次数，默认 3
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// 初始退避毫秒，默认 500
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Fallback provider 名称列表（按顺序）
    #[serde(default)]
    pub fallback_providers: Vec<String>,
}

fn default_max_retries() -> usize {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            fallback_providers: vec![],
        }
    }
}

/// 记忆后端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "json"（默认）或 "redis"
    pub backend: String,
    /// 覆盖默认数据目录 ~/.giblet/data
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: "json".to_string(),
            data_dir: None,
            redis_url: default_redis_url(),
        }
    }
}

/// Agent 执行循环配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// 单个失败测试步骤的最大自我修复次数
    #[serde(default = "default_max_fix_attempts")]
    pub max_fix_attempts: usize,
    /// exec 步骤包含其中任一子串时视为测试步骤
    #[serde(default = "default_test_commands")]
    pub test_commands: Vec<String>,
}

fn default_max_fix_attempts() -> usize {
    3
}

fn default_test_commands() -> Vec<String> {
    vec!["pytest", "cargo test", "npm test"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_fix_attempts: default_max_fix_attempts(),
            test_commands: default_test_commands(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// 项目根目录，默认当前目录
    #[serde(default)]
    pub project_root: Option<PathBuf>,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_command_timeout_secs() -> u64 {
    120
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            project_root: None,
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailsConfig {
    pub file_length_threshold: usize,
    pub extensions: Vec<String>,
}

impl Default for GuardrailsConfig {
    fn default() -> Self {
        Self {
            file_length_threshold: 500,
            extensions: vec![".py".to_string(), ".rs".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GithubConfig {
    /// 为空时回退到 GITHUB_TOKEN 环境变量
    #[serde(default)]
    pub token: String,
}

/// 默认配置 TOML 模板
pub(crate) const DEFAULT_CONFIG_TOML: &str = r#"[default]
provider = "gemini"     # "gemini" or "ollama"
temperature = 0.7
max_tokens = 2048

[providers.gemini]
# api_key = "your-key"  # or export GEMINI_API_KEY
model = "gemini-1.5-flash-latest"
base_url = "https://generativelanguage.googleapis.com"

[providers.ollama]
base_url = "http://localhost:11434"
model = "mistral"

[memory]
backend = "json"        # "json" or "redis" (needs --features redis)
# redis_url = "redis://localhost:6379"

[agent]
max_fix_attempts = 3
test_commands = ["pytest", "cargo test", "npm test"]

[guardrails]
file_length_threshold = 500
extensions = [".py", ".rs"]

[api]
bind = "127.0.0.1:8000"

# 可靠性配置（可选）
# [reliability]
# max_retries = 3
# initial_backoff_ms = 500
# fallback_providers = ["ollama"]  # 主 Provider 失败时按顺序切换
"#;

impl Config {
    /// 返回 Giblet 主目录: `~/.giblet`
    pub fn home_dir() -> Result<PathBuf> {
        let base_dirs = directories::BaseDirs::new()
            .ok_or_else(|| color_eyre::eyre::eyre!("cannot locate home directory"))?;
        Ok(base_dirs.home_dir().join(".giblet"))
    }

    /// 返回配置文件路径: `~/.giblet/config.toml`
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::home_dir()?.join("config.toml"))
    }

    /// 数据目录: `[memory].data_dir` 或 `~/.giblet/data`
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.memory.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::home_dir()?.join("data")),
        }
    }

    /// 项目根目录: `[workspace].project_root` 或当前目录
    pub fn project_root(&self) -> PathBuf {
        self.workspace
            .project_root
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    /// 加载配置，如果配置文件不存在则创建默认配置
    pub fn load_or_init() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent).wrap_err("failed to create config directory")?;
            }
            std::fs::write(&config_path, DEFAULT_CONFIG_TOML)
                .wrap_err("failed to write default config")?;
        }

        Self::load_from_path(&config_path)
    }

    /// 从指定路径加载配置（figment 多层合并）
    ///
    /// 嵌套字段用双下划线分隔，如 `GIBLET_DEFAULT__PROVIDER=ollama`。
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("GIBLET_").split("__"))
            .extract()
            .wrap_err("failed to parse config file")?;

        config.apply_env_fallbacks(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// 兼容常见的扁平环境变量（API key、token、记忆后端）
    pub fn apply_env_fallbacks(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.providers.gemini.api_key.is_empty() {
            if let Some(key) = lookup("GEMINI_API_KEY") {
                self.providers.gemini.api_key = key;
            }
        }
        if self.github.token.is_empty() {
            if let Some(token) = lookup("GITHUB_TOKEN") {
                self.github.token = token;
            }
        }
        if let Some(backend) = lookup("GIBLET_MEMORY_BACKEND") {
            self.memory.backend = backend.to_lowercase();
        }
        if let Some(url) = lookup("GIBLET_REDIS_URL") {
            self.memory.redis_url = url;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_has_sensible_values() {
        let config = Config::default();
        assert_eq!(config.default.provider, "gemini");
        assert!((config.default.temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.default.max_tokens, 2048);
        assert_eq!(config.memory.backend, "json");
        assert_eq!(config.memory.redis_url, "redis://localhost:6379");
        assert_eq!(config.agent.max_fix_attempts, 3);
        assert!(config.agent.test_commands.contains(&"pytest".to_string()));
        assert_eq!(config.guardrails.file_length_threshold, 500);
        assert_eq!(config.providers.ollama.model, "mistral");
        assert_eq!(config.providers.gemini.model, "gemini-1.5-flash-latest");
    }

    #[test]
    fn load_from_toml_file() {
        let tmp = tempfile::tempdir().unwrap();
        let toml_path = tmp.path().join("config.toml");
        std::fs::write(
            &toml_path,
            r#"
[default]
provider = "ollama"
temperature = 0.2

[providers.ollama]
base_url = "http://gpu-box:11434"
model = "llama3"

[agent]
max_fix_attempts = 5
test_commands = ["make check"]
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&toml_path).unwrap();
        assert_eq!(config.default.provider, "ollama");
        assert!((config.default.temperature - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.providers.ollama.base_url, "http://gpu-box:11434");
        assert_eq!(config.providers.ollama.model, "llama3");
        assert_eq!(config.agent.max_fix_attempts, 5);
        assert_eq!(config.agent.test_commands, vec!["make check"]);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let toml_path = tmp.path().join("config.toml");
        // 只写一个 section，其他应该用默认值
        std::fs::write(&toml_path, "[default]\nprovider = \"ollama\"\ntemperature = 0.9\n").unwrap();

        let config = Config::load_from_path(&toml_path).unwrap();
        assert_eq!(config.default.provider, "ollama");
        assert_eq!(config.default.max_tokens, 2048);
        assert_eq!(config.memory.backend, "json");
        assert_eq!(config.api.bind, "127.0.0.1:8000");
    }

    #[test]
    fn default_template_parses() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join(".giblet").join("config.toml");
        std::fs::create_dir_all(config_path.parent().unwrap()).unwrap();
        std::fs::write(&config_path, DEFAULT_CONFIG_TOML).unwrap();

        let config = Config::load_from_path(&config_path).unwrap();
        assert_eq!(config.default.provider, "gemini");
        assert_eq!(config.guardrails.extensions, vec![".py", ".rs"]);
    }

    #[test]
    fn env_fallbacks_fill_missing_secrets() {
        let env: HashMap<&str, &str> = [
            ("GEMINI_API_KEY", "g-key"),
            ("GITHUB_TOKEN", "ghp_x"),
            ("GIBLET_MEMORY_BACKEND", "REDIS"),
            ("GIBLET_REDIS_URL", "redis://cache:6380"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_fallbacks(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.providers.gemini.api_key, "g-key");
        assert_eq!(config.github.token, "ghp_x");
        assert_eq!(config.memory.backend, "redis");
        assert_eq!(config.memory.redis_url, "redis://cache:6380");
    }

    #[test]
    fn explicit_api_key_wins_over_env() {
        let mut config = Config::default();
        config.providers.gemini.api_key = "from-file".to_string();
        config.apply_env_fallbacks(|k| (k == "GEMINI_API_KEY").then(|| "from-env".to_string()));
        assert_eq!(config.providers.gemini.api_key, "from-file");
    }

    #[test]
    fn data_dir_override() {
        let mut config = Config::default();
        config.memory.data_dir = Some(PathBuf::from("/srv/giblet"));
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/srv/giblet"));
    }

    #[test]
    fn config_path_ends_with_giblet() {
        let path = Config::config_path().unwrap();
        assert!(path.ends_with(".giblet/config.toml"));
    }
}
