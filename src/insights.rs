use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::Value;

use crate::profile::UserProfile;

/// 至少这么多条反馈才给出建议
const MIN_FEEDBACK_ENTRIES: usize = 3;
const LOW_RATING: f64 = 2.5;
const HIGH_RATING: f64 = 4.0;

pub const NO_SUGGESTIONS: &str =
    "No specific proactive suggestions at this time. Keep providing feedback to help Giblet learn!";

/// 一个重复出现的命令序列
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSequence {
    pub commands: Vec<String>,
    pub count: usize,
}

/// 在命令历史中寻找重复的命令序列
pub struct PatternAnalyzer;

impl PatternAnalyzer {
    /// 统计长度在 `[min_len, max_len]` 的连续子序列，
    /// 保留出现次数 >= `min_occurrences` 的，按次数降序、长度降序排序
    pub fn frequent_sequences(
        log: &[String],
        min_len: usize,
        max_len: usize,
        min_occurrences: usize,
    ) -> Vec<CommandSequence> {
        let min_len = min_len.max(1);
        let mut counts: HashMap<&[String], usize> = HashMap::new();
        for n in min_len..=max_len {
            for window in log.windows(n) {
                *counts.entry(window).or_default() += 1;
            }
        }

        let mut frequent: Vec<CommandSequence> = counts
            .into_iter()
            .filter(|(_, count)| *count >= min_occurrences)
            .map(|(seq, count)| CommandSequence {
                commands: seq.to_vec(),
                count,
            })
            .collect();
        // 最后按内容排序，保证结果稳定
        frequent.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(b.commands.len().cmp(&a.commands.len()))
                .then(a.commands.cmp(&b.commands))
        });
        frequent
    }
}

/// 单个上下文的反馈统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedbackSummary {
    pub count: usize,
    pub avg_rating: Option<f64>,
    pub comments: Vec<String>,
}

/// 按上下文汇总反馈日志；无法解析为数字的评分只计数不计分
pub fn summarize_feedback(log: &[Value]) -> BTreeMap<String, FeedbackSummary> {
    let mut ratings: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut summaries: BTreeMap<String, FeedbackSummary> = BTreeMap::new();

    for entry in log {
        let context = entry
            .get("context")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .unwrap_or("general")
            .to_string();
        let summary = summaries.entry(context.clone()).or_default();
        summary.count += 1;

        let rating = match entry.get("rating") {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        if let Some(r) = rating {
            ratings.entry(context.clone()).or_default().push(r);
        }
        if let Some(comment) = entry.get("comment").and_then(Value::as_str) {
            if !comment.is_empty() {
                summary.comments.push(comment.to_lowercase());
            }
        }
    }

    for (context, values) in ratings {
        if let Some(summary) = summaries.get_mut(&context) {
            summary.avg_rating = Some(values.iter().sum::<f64>() / values.len() as f64);
        }
    }
    summaries
}

/// 根据反馈和画像偏好给出调整建议
pub struct ProactiveLearner;

impl ProactiveLearner {
    pub async fn suggestions(profile: &UserProfile) -> Vec<String> {
        let feedback = profile.feedback_log().await;
        let verbosity = profile.get_preference("llm_settings", "ai_verbosity").await;
        let tone = profile.get_preference("llm_settings", "ai_tone").await;
        let persona = profile.get_preference("llm_settings", "idea_synth_persona").await;
        Self::from_parts(&feedback, verbosity.as_deref(), tone.as_deref(), persona.as_deref())
    }

    fn from_parts(
        feedback: &[Value],
        verbosity: Option<&str>,
        tone: Option<&str>,
        persona: Option<&str>,
    ) -> Vec<String> {
        let mut suggestions = Vec::new();

        for (context, summary) in summarize_feedback(feedback) {
            let Some(avg) = summary.avg_rating else {
                continue;
            };
            if summary.count < MIN_FEEDBACK_ENTRIES {
                continue;
            }
            if avg < LOW_RATING {
                suggestions.push(format!(
                    "Consider reviewing prompts/behavior for '{}'. It has a low average rating ({:.2} from {} entries).",
                    context, avg, summary.count
                ));
            } else if avg > HIGH_RATING {
                let comments = summary.comments.join(" ");
                if comments.contains("detail") || comments.contains("thorough") {
                    suggestions.push(format!(
                        "Users appreciate detailed/thorough responses for '{}'. Ensure prompts for this context continue to encourage this.",
                        context
                    ));
                }
            }
        }

        if verbosity == Some("low") {
            suggestions.push(
                "Your preference is for 'low' AI verbosity. Review prompts to ensure concise outputs where appropriate."
                    .to_string(),
            );
        }
        if let Some(tone) = tone.filter(|t| !t.is_empty()) {
            suggestions.push(format!(
                "Your preferred AI tone is '{}'. Ensure prompts align with this.",
                tone
            ));
        }
        if let Some(persona) = persona.filter(|p| !p.is_empty()) {
            suggestions.push(format!(
                "For idea synthesis, you prefer the '{}' persona. Ensure idea prompts leverage this effectively.",
                persona
            ));
        }

        let mut seen = std::collections::HashSet::new();
        suggestions.retain(|s| seen.insert(s.clone()));
        if suggestions.is_empty() {
            suggestions.push(NO_SUGGESTIONS.to_string());
        }
        suggestions
    }
}
