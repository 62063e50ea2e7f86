// 每个集成测试文件只使用 MockProvider 的部分方法，dead_code 为预期行为
#![allow(dead_code)]

//! 测试专用 MockProvider
//!
//! 预置回复队列（VecDeque），每次 generate_text 从队头弹出一条，
//! 同时记录收到的 prompt。队列空时返回 Err，便于发现意外的额外 LLM 调用。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use color_eyre::eyre::{eyre, Result};

use giblet::providers::{GenerationOptions, Provider};

pub struct MockProvider {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(vec![]),
        }
    }

    /// 计划回复：JSON 字符串数组
    pub fn plan(steps: &[&str]) -> String {
        serde_json::to_string(steps).unwrap()
    }

    /// 包在 markdown 代码块里的代码回复
    pub fn fenced(lang: &str, code: &str) -> String {
        format!("```{}\n{}\n```", lang, code)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn generate_text(&self, prompt: &str, _options: &GenerationOptions) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| eyre!("MockProvider: response queue is empty"))
    }
}
