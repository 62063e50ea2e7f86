use std::path::Path;
use std::sync::Arc;

use color_eyre::eyre::{Context, Result};
use tracing::info;

use crate::memory::Memory;
use crate::profile::UserProfile;
use crate::providers::{GenerationOptions, Provider};

use super::{record_interaction, strip_code_fences};

/// 代码生成：函数、重构、单元测试；输出都会去掉 markdown 围栏
pub struct CodeGenerator {
    provider: Arc<dyn Provider>,
    memory: Arc<Memory>,
    profile: UserProfile,
    options: GenerationOptions,
}

/// 根据文件扩展名推断语言和测试框架
pub fn language_for(filename: &str) -> (&'static str, &'static str) {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    match ext.as_str() {
        "rs" => ("Rust", "the built-in #[test] harness"),
        "js" | "mjs" => ("JavaScript", "jest"),
        "ts" => ("TypeScript", "jest"),
        "go" => ("Go", "the testing package"),
        _ => ("Python", "pytest"),
    }
}

impl CodeGenerator {
    pub fn new(
        provider: Arc<dyn Provider>,
        memory: Arc<Memory>,
        profile: UserProfile,
        options: GenerationOptions,
    ) -> Self {
        Self {
            provider,
            memory,
            profile,
            options,
        }
    }

    /// 按用户的编码风格生成单个 Python 函数
    pub async fn generate_function(&self, prompt: &str) -> Result<String> {
        let user_name = self.profile.preference_or("general", "user_name", "the user").await;
        let quotes = self
            .profile
            .preference_or("coding_style", "preferred_quote_type", "double")
            .await;
        let indent = self.profile.preference_or("coding_style", "indent_size", "4").await;
        info!("generating function for {}: {}", user_name, prompt);

        let final_prompt = format!(
            "User prompt: \"Create a Python function that {prompt}\"\n\
             This function is for a user named {user_name}.\n\n\
             You are an expert Python code generator. Generate a single, complete and clean \
             Python function that satisfies the prompt. The function MUST include:\n\
             1. Type hints for all arguments and the return value.\n\
             2. A concise docstring explaining what it does.\n\
             3. No side effects where avoidable.\n\
             4. These style preferences: use {quotes} quotes for strings and an indent of {indent} spaces.\n\n\
             Return ONLY the code, in a single markdown code block, with no explanation."
        );
        self.run("generate_function", prompt, &final_prompt).await
    }

    /// 按指令重写一段代码
    pub async fn refactor_code(&self, source: &str, instruction: &str) -> Result<String> {
        let user_name = self.profile.preference_or("general", "user_name", "the user").await;
        let aggressiveness = self
            .profile
            .preference_or("coding_style", "refactor_aggressiveness", "moderate")
            .await;

        let final_prompt = format!(
            "You are an expert code refactoring assistant.\n\
             Rewrite the source code below according to the instruction, keeping its behaviour. \
             The user is {user_name}; their preferred refactoring aggressiveness is '{aggressiveness}'.\n\
             Return ONLY the complete new source code in a single markdown code block.\n\n\
             Refactoring instruction: \"{instruction}\"\n\n\
             Source code:\n```\n{source}\n```"
        );
        self.run("refactor_code", instruction, &final_prompt).await
    }

    /// 为源码生成单元测试；测试依据函数名的意图而不是当前实现
    pub async fn generate_unit_tests(&self, source: &str, filename: &str) -> Result<String> {
        let (language, framework) = language_for(filename);
        info!("generating {} tests for {}", framework, filename);

        let final_prompt = format!(
            "You are an expert {language} test author using {framework}.\n\
             Write a comprehensive set of unit tests for the source code below.\n\
             The tests MUST check the behaviour implied by each function's name and common \
             conventions, NOT its current, possibly flawed implementation: a function named \
             'add' must be tested as addition (add(2, 3) == 5) whatever the code does now.\n\
             The test file must:\n\
             1. Import the code under test from '{filename}'.\n\
             2. Cover normal inputs and edge cases.\n\
             3. Assert that invalid inputs make the function itself raise an error \
             (pytest.raises in Python) instead of wrapping correct assertions in error checks.\n\
             4. Be complete and runnable as-is, following {framework} naming conventions.\n\n\
             Return ONLY the test code in a single markdown code block.\n\n\
             Source code from '{filename}':\n```\n{source}\n```"
        );
        self.run("generate_unit_tests", filename, &final_prompt).await
    }

    /// 通用生成（同样去掉围栏）
    pub async fn generate_text(&self, prompt: &str) -> Result<String> {
        self.run("generate_text", prompt, prompt).await
    }

    async fn run(&self, method: &str, summary: &str, prompt: &str) -> Result<String> {
        let response = self
            .provider
            .generate_text(prompt, &self.options)
            .await
            .wrap_err_with(|| format!("code generation ({}) failed", method))?;
        let code = strip_code_fences(&response);
        record_interaction(&self.memory, "CodeGenerator", method, summary, &code);
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::test_memory;
    use crate::providers::testing::ScriptedProvider;

    async fn generator(
        provider: Arc<ScriptedProvider>,
    ) -> (CodeGenerator, Arc<Memory>, tempfile::TempDir) {
        let (memory, tmp) = test_memory().await;
        let profile = UserProfile::load(memory.clone()).await.unwrap();
        (
            CodeGenerator::new(provider, memory.clone(), profile, GenerationOptions::default()),
            memory,
            tmp,
        )
    }

    #[tokio::test]
    async fn function_is_unfenced_and_uses_style() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            "```python\ndef add(a: int, b: int) -> int:\n    return a + b\n```",
        ]));
        let (generator, memory, _tmp) = generator(provider.clone()).await;

        let code = generator.generate_function("adds two numbers").await.unwrap();
        assert!(code.starts_with("def add"));
        assert!(!code.contains("```"));

        let prompt = provider.last_prompt();
        assert!(prompt.contains("use double quotes"));
        assert!(prompt.contains("indent of 4 spaces"));
        assert_eq!(memory.recall("last_ai_interaction").unwrap()["method"], "generate_function");
    }

    #[tokio::test]
    async fn unit_tests_prompt_names_file_and_intent() {
        let provider = Arc::new(ScriptedProvider::new(vec!["```\nimport pytest\n```"]));
        let (generator, _memory, _tmp) = generator(provider.clone()).await;

        let tests = generator
            .generate_unit_tests("def add(a, b): return a - b", "calc.py")
            .await
            .unwrap();
        assert_eq!(tests, "import pytest");
        let prompt = provider.last_prompt();
        assert!(prompt.contains("'calc.py'"));
        assert!(prompt.contains("pytest"));
        assert!(prompt.contains("return a - b"));
    }

    #[tokio::test]
    async fn refactor_includes_instruction() {
        let provider = Arc::new(ScriptedProvider::new(vec!["x = 2"]));
        let (generator, _memory, _tmp) = generator(provider.clone()).await;
        let out = generator.refactor_code("x=1", "rename nothing").await.unwrap();
        assert_eq!(out, "x = 2");
        assert!(provider.last_prompt().contains("\"rename nothing\""));
    }

    #[test]
    fn language_follows_extension() {
        assert_eq!(language_for("lib.rs").0, "Rust");
        assert_eq!(language_for("app.ts").1, "jest");
        assert_eq!(language_for("script.py").1, "pytest");
        assert_eq!(language_for("Makefile").0, "Python");
    }
}
