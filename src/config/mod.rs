pub mod schema;
pub mod setup;

pub use schema::{
    AgentConfig, ApiConfig, Config, DefaultConfig, GeminiConfig, GithubConfig, GuardrailsConfig,
    MemoryConfig, OllamaConfig, ProvidersConfig, ReliabilityConfig, WorkspaceConfig,
};
pub use setup::run_setup;
