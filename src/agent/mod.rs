//! 目标 → 命令计划 → 带自我修复的执行

pub mod executor;
pub mod planner;
pub mod repair;
pub mod skill_gen;

pub use executor::{PlanConfirm, PlanEvent, PlanExecutor, PlanObserver, PlanReport, StepReport, StepStatus};
pub use planner::parse_plan;
pub use repair::has_actual_code;

use std::sync::Arc;

use crate::memory::Memory;
use crate::providers::{GenerationOptions, Provider};

/// 会话记忆中最近一次生成的计划
pub const LAST_PLAN_KEY: &str = "last_plan";

/// 规划与修复都通过同一个 Provider 完成
pub struct Agent {
    provider: Arc<dyn Provider>,
    memory: Arc<Memory>,
    options: GenerationOptions,
}

impl Agent {
    pub fn new(provider: Arc<dyn Provider>, memory: Arc<Memory>, options: GenerationOptions) -> Self {
        Self {
            provider,
            memory,
            options,
        }
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// 最近一次 `create_plan` 的结果
    pub fn last_plan(&self) -> Option<Vec<String>> {
        let value = self.memory.recall(LAST_PLAN_KEY)?;
        serde_json::from_value(value).ok()
    }
}
