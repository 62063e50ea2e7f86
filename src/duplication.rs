//! 结构性重复检测：规范化 Python 函数体后按内容分组
//!
//! 标识符统一成 `_name_`，字符串字面量统一成 `_str_`，注释和开头的文档字符串被丢弃；
//! 关键字、属性名、数字和缩进结构保留。

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::pysource::{self, indent_of, PyFunction};
use crate::workspace::is_ignored_dir;

/// 除通用忽略目录外，重复检测还跳过的虚拟环境目录
const EXTRA_IGNORED: &[&str] = &["venv", "site-packages"];

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

/// 规范化后没有实际内容的函数体
const TRIVIAL_BODIES: &[&str] = &["", "pass", "...", "return", "return None"];

/// 重复函数的位置
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionLocation {
    /// 相对项目根，`/` 分隔
    pub file: String,
    pub function_name: String,
    pub line_number: usize,
}

/// 在项目中寻找函数体结构相同的 Python 函数
pub struct DuplicationAnalyzer;

impl DuplicationAnalyzer {
    /// 返回至少两个成员的分组；组内与组间都按 (文件, 行号) 排序
    pub fn find_duplicates(root: &Path) -> Vec<Vec<FunctionLocation>> {
        let mut groups: HashMap<String, Vec<FunctionLocation>> = HashMap::new();
        let files = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !(e.file_type().is_dir()
                        && (is_ignored_dir(e.file_name())
                            || e.file_name().to_str().is_some_and(|n| EXTRA_IGNORED.contains(&n))))
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && e.path().extension().is_some_and(|x| x == "py"));

        for entry in files {
            let source = match std::fs::read_to_string(entry.path()) {
                Ok(s) => s,
                Err(e) => {
                    warn!("skipping {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            let lines: Vec<&str> = source.lines().collect();
            for f in pysource::functions(&source) {
                let shape = normalize_body(&lines, &f);
                if TRIVIAL_BODIES.contains(&shape.as_str()) {
                    continue;
                }
                groups.entry(shape).or_default().push(FunctionLocation {
                    file: relative.clone(),
                    function_name: f.name.clone(),
                    line_number: f.lineno(),
                });
            }
        }

        let mut duplicates: Vec<Vec<FunctionLocation>> = groups
            .into_values()
            .filter(|locs| locs.len() > 1)
            .map(|mut locs| {
                locs.sort_by(|a, b| (&a.file, a.line_number).cmp(&(&b.file, b.line_number)));
                locs
            })
            .collect();
        duplicates.sort_by(|a, b| (&a[0].file, a[0].line_number).cmp(&(&b[0].file, b[0].line_number)));
        debug!("found {} duplicate group(s) under {}", duplicates.len(), root.display());
        duplicates
    }
}

/// 函数体的规范化形状
pub fn normalize_body(lines: &[&str], f: &PyFunction) -> String {
    let body = f.body_lines(lines);
    let base = body
        .iter()
        .find(|l| !l.trim().is_empty())
        .map(|l| indent_of(l))
        .unwrap_or(0);
    let text = body
        .iter()
        .map(|l| l.get(base..).filter(|_| indent_of(l) >= base).unwrap_or(l.trim_start()))
        .collect::<Vec<_>>()
        .join("\n");

    let mut tokens = tokenize(&text);
    // 开头的文档字符串及其换行
    if tokens.first().map(String::as_str) == Some("_str_") {
        tokens.remove(0);
        while tokens.first().is_some_and(|t| t.starts_with('\n')) {
            tokens.remove(0);
        }
    }
    while tokens.last().is_some_and(|t| t.starts_with('\n')) {
        tokens.pop();
    }
    tokens.join(" ")
}

/// 逻辑行开头记为 `\n<缩进>`，括号内换行不计
fn tokenize(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens: Vec<String> = Vec::new();
    let mut depth = 0i32;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\n' {
            i += 1;
            let mut width = 0;
            while i < chars.len() && (chars[i] == ' ' || chars[i] == '\t') {
                width += 1;
                i += 1;
            }
            let blank = i >= chars.len() || chars[i] == '\n' || chars[i] == '#';
            if depth <= 0 && !blank && tokens.last().is_some_and(|t| !t.starts_with('\n')) {
                tokens.push(format!("\n{}", width));
            }
            continue;
        }
        if c == ' ' || c == '\t' || c == '\\' {
            i += 1;
            continue;
        }
        if c == '#' {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            // 字符串前缀，如 r"..." / f'...'
            if i < chars.len() && (chars[i] == '"' || chars[i] == '\'') && word.len() <= 2 {
                i = skip_string(&chars, i);
                tokens.push("_str_".to_string());
                continue;
            }
            let attribute = tokens.last().is_some_and(|t| t == ".");
            if attribute || KEYWORDS.contains(&word.as_str()) {
                tokens.push(word);
            } else {
                tokens.push("_name_".to_string());
            }
            continue;
        }
        if c == '"' || c == '\'' {
            i = skip_string(&chars, i);
            tokens.push("_str_".to_string());
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '.' || chars[i] == '_') {
                i += 1;
            }
            tokens.push(chars[start..i].iter().collect());
            continue;
        }
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
        tokens.push(c.to_string());
        i += 1;
    }
    tokens
}

/// 跳过从 `start` 开始的字符串字面量，返回其后的位置
fn skip_string(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let triple = chars.len() >= start + 3 && chars[start + 1] == quote && chars[start + 2] == quote;
    let mut i = if triple { start + 3 } else { start + 1 };
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote && !triple => return i + 1,
            '\n' if !triple => return i,
            c if c == quote && chars.len() >= i + 3 && chars[i + 1] == quote && chars[i + 2] == quote => {
                return i + 3;
            }
            _ => i += 1,
        }
    }
    chars.len()
}
