//! Python 源码的轻量函数扫描，按行和缩进切分，不构建语法树

use std::ops::Range;

const TRIPLE_QUOTES: [&str; 2] = ["\"\"\"", "'''"];

/// 一个 `def` / `async def` 函数块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyFunction {
    pub name: String,
    /// `def` 所在行（0 起）
    pub def_line: usize,
    pub indent: usize,
    /// 函数体的行区间；单行定义为空区间
    pub body: Range<usize>,
}

impl PyFunction {
    /// 1 起的行号
    pub fn lineno(&self) -> usize {
        self.def_line + 1
    }

    pub fn body_lines<'a>(&self, lines: &'a [&'a str]) -> &'a [&'a str] {
        &lines[self.body.clone()]
    }
}

/// 行首空白宽度（tab 记一列）
pub fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// 去掉引号之外的 `#` 注释
pub fn code_part(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '#' => return &line[..i],
                '\'' | '"' => quote = Some(c),
                _ => {}
            },
        }
    }
    line
}

/// 读完这一行后仍未闭合的三引号字符串
fn track_triple(line: &str, mut open: Option<&'static str>) -> Option<&'static str> {
    let mut rest = line;
    loop {
        match open {
            Some(delim) => match rest.find(delim) {
                Some(i) => {
                    rest = &rest[i + delim.len()..];
                    open = None;
                }
                None => return open,
            },
            None => {
                let code = code_part(rest);
                let next = TRIPLE_QUOTES
                    .into_iter()
                    .filter_map(|d| code.find(d).map(|i| (i, d)))
                    .min_by_key(|(i, _)| *i);
                match next {
                    Some((i, delim)) => {
                        rest = &rest[i + delim.len()..];
                        open = Some(delim);
                    }
                    None => return None,
                }
            }
        }
    }
}

/// `def name(` / `async def name(` 行的函数名
fn def_name(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let rest = trimmed
        .strip_prefix("async ")
        .map(str::trim_start)
        .unwrap_or(trimmed)
        .strip_prefix("def ")?;
    let name: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    (!name.is_empty()).then_some(name)
}

fn bracket_delta(code: &str) -> i32 {
    code.chars().fold(0, |depth, c| match c {
        '(' | '[' | '{' => depth + 1,
        ')' | ']' | '}' => depth - 1,
        _ => depth,
    })
}

/// 从 `def` 行开始解析签名（可跨行）和缩进更深的函数体
fn function_at(lines: &[&str], start: usize, name: String) -> Option<PyFunction> {
    let indent = indent_of(lines[start]);
    let mut depth = 0;
    let mut header_end = None;
    for (j, line) in lines.iter().enumerate().skip(start) {
        let code = code_part(line);
        depth += bracket_delta(code);
        if depth <= 0 {
            header_end = Some((j, code.trim_end().ends_with(':')));
            break;
        }
    }
    let (header_end, block) = header_end?;
    let body_start = header_end + 1;
    if !block {
        return Some(PyFunction {
            name,
            def_line: start,
            indent,
            body: body_start..body_start,
        });
    }

    let mut body_end = body_start;
    let mut open = None;
    for (k, line) in lines.iter().enumerate().skip(body_start) {
        if open.is_none() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if indent_of(line) <= indent {
                break;
            }
        }
        open = track_triple(line, open);
        body_end = k + 1;
    }
    Some(PyFunction {
        name,
        def_line: start,
        indent,
        body: body_start..body_end,
    })
}

/// 按出现顺序列出所有函数（含嵌套函数和方法）
pub fn functions(source: &str) -> Vec<PyFunction> {
    let lines: Vec<&str> = source.lines().collect();
    let mut found = Vec::new();
    let mut open = None;
    for (i, line) in lines.iter().enumerate() {
        if open.is_none() {
            if let Some(f) = def_name(line).and_then(|name| function_at(&lines, i, name)) {
                found.push(f);
            }
        }
        open = track_triple(line, open);
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_functions_methods_and_async_defs() {
        let src = "\
import os

def top(a, b):
    return a + b

class Greeter:
    def hello(self):
        print('hi')

    async def later(self):
        await thing()
";
        let found = functions(src);
        let names: Vec<&str> = found.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["top", "hello", "later"]);
        assert_eq!(found[0].lineno(), 3);
        assert_eq!(found[0].body, 3..4);
        assert_eq!(found[1].indent, 4);
        assert_eq!(found[2].body, 10..11);
    }

    #[test]
    fn multi_line_signature_and_trailing_comment() {
        let src = "\
def configure(
    name,
    verbose=False,
) -> dict:  # returns settings
    x = 1

    return {'name': name}
after = 2
";
        let found = functions(src);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].body, 4..7);
    }

    #[test]
    fn docstring_lines_at_column_zero_stay_in_body() {
        let src = "\
def documented():
    \"\"\"Summary.

def not_a_function():
    \"\"\"
    pass
";
        let found = functions(src);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "documented");
        assert_eq!(found[0].body, 1..6);
    }

    #[test]
    fn one_line_def_has_empty_body() {
        let found = functions("def quick(): return 1\nx = 2\n");
        assert_eq!(found[0].body, 1..1);
    }

    #[test]
    fn comments_respect_quotes() {
        assert_eq!(code_part("x = '#' # note"), "x = '#' ");
        assert_eq!(code_part("s = \"a\\\"#b\""), "s = \"a\\\"#b\"");
        assert_eq!(code_part("# all comment"), "");
    }
}
