//! 集成测试公共辅助函数

// 每个集成测试文件只使用 common 的一部分，未用到的辅助函数属于预期 dead_code
#![allow(dead_code)]

pub mod mock_provider;
pub use mock_provider::MockProvider;

use std::path::Path;
use std::sync::Arc;

use giblet::cli::App;
use giblet::commands::CommandContext;
use giblet::config::Config;
use giblet::memory::{JsonFileStore, Memory};
use giblet::profile::UserProfile;
use giblet::providers::{GenerationOptions, Provider};
use giblet::style::StylePreferences;
use giblet::workspace::Workspace;

/// 临时项目根 + 临时数据目录；TempDir 由调用方持有
pub struct TestEnv {
    pub root: tempfile::TempDir,
    pub data: tempfile::TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().expect("创建项目目录失败"),
            data: tempfile::tempdir().expect("创建数据目录失败"),
        }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn data(&self) -> &Path {
        self.data.path()
    }

    /// 打开数据目录下的 JSON 长期记忆
    pub async fn memory(&self) -> Arc<Memory> {
        open_memory(self.data()).await
    }

    /// 用 MockProvider 构建命令上下文
    pub async fn context(&self, provider: Arc<dyn Provider>) -> CommandContext {
        let memory = self.memory().await;
        CommandContext {
            workspace: Arc::new(Workspace::new(self.root())),
            profile: UserProfile::load(memory.clone()).await.expect("加载画像失败"),
            style: StylePreferences::open_in(self.data())
                .expect("打开风格偏好失败")
                .shared(),
            memory,
            provider,
            options: GenerationOptions::default(),
            content_prompt: None,
        }
    }

    /// 装配 App；测试步骤识别 `grep -q`，避免依赖 pytest
    pub async fn app(&self, provider: Arc<dyn Provider>) -> App {
        let mut config = Config::default();
        config.agent.test_commands = vec!["grep -q".to_string()];
        let ctx = self.context(provider).await;
        App::from_context(
            config,
            self.data().to_path_buf(),
            self.data().join("global-skills"),
            ctx,
        )
    }
}

pub async fn open_memory(data_dir: &Path) -> Arc<Memory> {
    let store = JsonFileStore::open(data_dir).expect("打开 JSON 存储失败");
    Arc::new(Memory::open(Box::new(store)).await.expect("加载长期记忆失败"))
}

/// 全部确认的 PlanConfirm
pub fn yes() -> giblet::agent::PlanConfirm {
    Box::new(|_| true)
}
