use color_eyre::eyre::{eyre, Result};

/// skill 参数；没有默认值的参数是必填的
#[derive(Debug, Clone, PartialEq)]
pub struct SkillParameter {
    pub name: String,
    pub description: String,
    pub default: Option<String>,
}

impl SkillParameter {
    pub fn required(&self) -> bool {
        self.default.is_none()
    }
}

/// 解析后的 SKILL.md
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SkillManifest {
    pub name: String,
    pub description: String,
    pub triggers: Vec<String>,
    pub parameters: Vec<SkillParameter>,
    /// `## Steps` 下的命令，可含 `{param}` 占位符
    pub steps: Vec<String>,
    /// 去掉 frontmatter 的正文
    pub body: String,
}

/// 解析 SKILL.md 的 frontmatter 和 `## Steps` 列表
pub fn parse_skill_md(content: &str) -> Result<SkillManifest> {
    let content = content.trim();
    let rest = content
        .strip_prefix("---")
        .ok_or_else(|| eyre!("SKILL.md is missing frontmatter (must start with ---)"))?;
    let end = rest
        .find("\n---")
        .ok_or_else(|| eyre!("frontmatter is not closed (missing ---)"))?;

    let frontmatter = rest[..end].trim();
    let body = rest[end + 4..].trim().to_string();

    let mut manifest = SkillManifest::default();
    for line in frontmatter.lines() {
        let line = line.trim();
        if let Some(val) = line.strip_prefix("name:") {
            manifest.name = val.trim().trim_matches('"').to_string();
        } else if let Some(val) = line.strip_prefix("description:") {
            manifest.description = val.trim().trim_matches('"').to_string();
        } else if let Some(val) = line.strip_prefix("triggers:") {
            manifest.triggers = parse_list(val);
        } else if let Some(val) = line.strip_prefix("parameters:") {
            manifest.parameters = parse_list(val)
                .iter()
                .map(|item| parse_parameter(item))
                .collect::<Result<_>>()?;
        }
    }

    if manifest.name.is_empty() {
        return Err(eyre!("SKILL.md frontmatter is missing the name field"));
    }
    if manifest.description.is_empty() {
        return Err(eyre!("SKILL.md frontmatter is missing the description field"));
    }

    manifest.steps = parse_steps(&body);
    manifest.body = body;
    Ok(manifest)
}

/// `[a, "b", c]` → ["a", "b", "c"]
fn parse_list(raw: &str) -> Vec<String> {
    raw.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|t| t.trim().trim_matches('"').to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// `name=default:description`，默认值和描述都可省略
fn parse_parameter(raw: &str) -> Result<SkillParameter> {
    let (head, description) = match raw.split_once(':') {
        Some((h, d)) => (h.trim(), d.trim().to_string()),
        None => (raw.trim(), String::new()),
    };
    let (name, default) = match head.split_once('=') {
        Some((n, d)) => (n.trim(), Some(d.trim().to_string())),
        None => (head, None),
    };
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(eyre!("invalid skill parameter '{}'", raw));
    }
    Ok(SkillParameter {
        name: name.to_string(),
        description,
        default,
    })
}

/// 收集 `## Steps` 标题到下一个标题之间的列表项
fn parse_steps(body: &str) -> Vec<String> {
    let mut steps = Vec::new();
    let mut in_steps = false;
    for line in body.lines() {
        let trimmed = line.trim();
        if let Some(heading) = trimmed.strip_prefix("## ") {
            in_steps = heading.trim().eq_ignore_ascii_case("steps");
            continue;
        }
        if !in_steps {
            continue;
        }
        if let Some(item) = list_item(trimmed) {
            let item = item.trim().trim_matches('`').trim();
            if !item.is_empty() {
                steps.push(item.to_string());
            }
        }
    }
    steps
}

/// 去掉 `- ` / `* ` / `1. ` 列表标记
pub(crate) fn list_item(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        return Some(rest);
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        return line[digits..]
            .strip_prefix(". ")
            .or_else(|| line[digits..].strip_prefix(") "));
    }
    None
}

impl SkillManifest {
    /// 渲染为 SKILL.md
    pub fn to_markdown(&self) -> String {
        let mut out = String::from("---\n");
        out.push_str(&format!("name: {}\n", self.name));
        out.push_str(&format!("description: {}\n", self.description.replace('\n', " ")));
        if !self.triggers.is_empty() {
            out.push_str(&format!("triggers: [{}]\n", self.triggers.join(", ")));
        }
        if !self.parameters.is_empty() {
            let params: Vec<String> = self
                .parameters
                .iter()
                .map(|p| {
                    let mut s = p.name.clone();
                    if let Some(d) = &p.default {
                        s.push('=');
                        s.push_str(d);
                    }
                    if !p.description.is_empty() {
                        s.push(':');
                        s.push_str(&p.description);
                    }
                    s
                })
                .collect();
            out.push_str(&format!("parameters: [{}]\n", params.join(", ")));
        }
        out.push_str("---\n\n");
        if !self.body.is_empty() && !self.body.contains("## Steps") {
            out.push_str(self.body.trim());
            out.push_str("\n\n");
        }
        out.push_str("## Steps\n");
        for step in &self.steps {
            out.push_str(&format!("- {}\n", step));
        }
        out
    }
}
