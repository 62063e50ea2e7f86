use color_eyre::eyre::{Context, Result};
use dialoguer::{Input, Password, Select};

use super::schema::{Config, GeminiConfig, OllamaConfig};

/// Provider 选项: (名称, 说明)
const PROVIDERS: &[(&str, &str)] = &[
    ("gemini", "Google Gemini (needs an API key)"),
    ("ollama", "Ollama (local models)"),
];

/// 运行交互式配置向导
pub fn run_setup() -> Result<()> {
    println!("Giblet setup\n");

    let labels: Vec<String> = PROVIDERS
        .iter()
        .map(|(name, desc)| format!("{:<8} {}", name, desc))
        .collect();
    let provider_idx = Select::new()
        .with_prompt("Default provider")
        .items(&labels)
        .default(0)
        .interact()
        .wrap_err("provider selection failed")?;
    let (provider_name, _) = PROVIDERS[provider_idx];
    println!();

    let mut config = Config::default();
    config.default.provider = provider_name.to_string();

    match provider_name {
        "gemini" => {
            let api_key: String = Password::new()
                .with_prompt("Gemini API key (leave empty to use GEMINI_API_KEY)")
                .allow_empty_password(true)
                .interact()
                .wrap_err("reading API key failed")?;
            let model: String = Input::new()
                .with_prompt("Model")
                .default(GeminiConfig::default().model)
                .interact_text()
                .wrap_err("reading model failed")?;
            config.providers.gemini.api_key = api_key;
            config.providers.gemini.model = model;
        }
        _ => {
            let base_url: String = Input::new()
                .with_prompt("Ollama base URL")
                .default(OllamaConfig::default().base_url)
                .interact_text()
                .wrap_err("reading base URL failed")?;
            let model: String = Input::new()
                .with_prompt("Model")
                .default(OllamaConfig::default().model)
                .interact_text()
                .wrap_err("reading model failed")?;
            config.providers.ollama.base_url = base_url;
            config.providers.ollama.model = model;
        }
    }
    println!();

    config.default.temperature = Input::new()
        .with_prompt("Temperature (0.0-2.0)")
        .default(0.7)
        .interact_text()
        .wrap_err("reading temperature failed")?;
    println!();

    let backend_idx = Select::new()
        .with_prompt("Memory backend")
        .items(["json (file in ~/.giblet/data)", "redis"])
        .default(0)
        .interact()
        .wrap_err("backend selection failed")?;
    if backend_idx == 1 {
        config.memory.backend = "redis".to_string();
        config.memory.redis_url = Input::new()
            .with_prompt("Redis URL")
            .default(config.memory.redis_url.clone())
            .interact_text()
            .wrap_err("reading redis URL failed")?;
    }

    let config_path = Config::config_path()?;
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).wrap_err("failed to create config directory")?;
    }
    std::fs::write(&config_path, toml_from_config(&config))
        .wrap_err("failed to write config file")?;

    println!("Saved configuration to {}", config_path.display());
    Ok(())
}

/// 将 Config 转为可读的 TOML 字符串（只写向导涉及的字段）
fn toml_from_config(config: &Config) -> String {
    let mut lines = Vec::new();

    lines.push("[default]".to_string());
    lines.push(format!("provider = \"{}\"", config.default.provider));
    lines.push(format!("temperature = {}", config.default.temperature));
    lines.push(format!("max_tokens = {}", config.default.max_tokens));
    lines.push(String::new());

    let gemini = &config.providers.gemini;
    lines.push("[providers.gemini]".to_string());
    if !gemini.api_key.is_empty() {
        lines.push(format!("api_key = \"{}\"", gemini.api_key));
    }
    lines.push(format!("model = \"{}\"", gemini.model));
    lines.push(format!("base_url = \"{}\"", gemini.base_url));
    lines.push(String::new());

    let ollama = &config.providers.ollama;
    lines.push("[providers.ollama]".to_string());
    lines.push(format!("base_url = \"{}\"", ollama.base_url));
    lines.push(format!("model = \"{}\"", ollama.model));
    lines.push(String::new());

    lines.push("[memory]".to_string());
    lines.push(format!("backend = \"{}\"", config.memory.backend));
    lines.push(format!("redis_url = \"{}\"", config.memory.redis_url));
    lines.push(String::new());

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_toml_round_trips() {
        let mut config = Config::default();
        config.default.provider = "ollama".to_string();
        config.providers.ollama.model = "codellama".to_string();
        config.memory.backend = "redis".to_string();

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, toml_from_config(&config)).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.default.provider, "ollama");
        assert_eq!(loaded.providers.ollama.model, "codellama");
    }

    #[test]
    fn empty_api_key_is_omitted() {
        let toml = toml_from_config(&Config::default());
        assert!(!toml.contains("api_key"));
        assert!(toml.contains("[providers.ollama]"));
    }
}
