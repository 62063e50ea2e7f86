//! 源码自动化：为空函数生成 TODO 桩

use color_eyre::eyre::Result;
use tracing::info;

use crate::pysource::{self, code_part, indent_of, PyFunction};
use crate::workspace::Workspace;

pub const STUB_COMMENT: &str = "# TODO: Implement this function.";

/// 函数体只有 `pass`（前面可有一个文档字符串）时返回 `pass` 所在行
fn lone_pass(lines: &[&str], f: &PyFunction) -> Option<usize> {
    let statements: Vec<usize> = f
        .body
        .clone()
        .filter(|&k| {
            let t = lines[k].trim();
            !t.is_empty() && !t.starts_with('#')
        })
        .collect();
    let (&last, rest) = statements.split_last()?;
    if code_part(lines[last]).trim() != "pass" || indent_of(lines[last]) != indent_of(lines[statements[0]]) {
        return None;
    }
    let Some(&doc_end) = rest.last() else {
        return Some(last);
    };
    let doc = lines[statements[0]..=doc_end]
        .iter()
        .map(|l| l.trim())
        .collect::<Vec<_>>()
        .join("\n");
    is_string_literal(&doc).then_some(last)
}

/// 整段文本是否恰好是一个字符串字面量（允许 r/u/b 前缀）
fn is_string_literal(text: &str) -> bool {
    let body = text.trim_start_matches(['r', 'R', 'u', 'U', 'b', 'B']);
    if text.len() - body.len() > 2 {
        return false;
    }
    for delim in ["\"\"\"", "'''"] {
        if let Some(inner) = body.strip_prefix(delim) {
            return inner
                .strip_suffix(delim)
                .is_some_and(|content| !content.contains(delim));
        }
    }
    for quote in ['"', '\''] {
        if let Some(inner) = body.strip_prefix(quote) {
            return !inner.contains('\n')
                && inner
                    .strip_suffix(quote)
                    .is_some_and(|content| !content.contains(quote));
        }
    }
    false
}

/// 把空函数的 `pass` 行替换成同缩进的 TODO 注释；返回 (新源码, 替换数)
///
/// 没有可替换的函数时原样返回。
pub fn stub_empty_functions(source: &str) -> (String, usize) {
    let original: Vec<&str> = source.lines().collect();
    let targets: Vec<usize> = pysource::functions(source)
        .iter()
        .filter_map(|f| lone_pass(&original, f))
        .collect();
    if targets.is_empty() {
        return (source.to_string(), 0);
    }

    let mut lines: Vec<String> = original.iter().map(|l| l.to_string()).collect();
    for &idx in &targets {
        let line = original[idx];
        let indent = line.get(..indent_of(line)).unwrap_or_default();
        lines[idx] = format!("{}{}", indent, STUB_COMMENT);
    }
    let mut out = lines.join("\n");
    if source.ends_with('\n') {
        out.push('\n');
    }
    (out, targets.len())
}

/// `automate stubs <file>`：就地改写项目内的 Python 文件，返回替换数
pub async fn generate_stubs(workspace: &Workspace, path: &str) -> Result<usize> {
    let source = workspace.read_file(path).await?;
    let (stubbed, count) = stub_empty_functions(&source);
    if count > 0 {
        workspace.write_file(path, &stubbed).await?;
    }
    info!("stubbed {} empty function(s) in {}", count, path);
    Ok(count)
}
