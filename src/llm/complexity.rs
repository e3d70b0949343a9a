//! 任务复杂度分析（供模型路由使用）
//!
//! 表驱动：每组关键词命中一次即调整分数并可能设置 reasoning / speed 标志与任务类型；
//! 单词关键词按词前缀匹配（"quickly" 命中 "quick"，"show" 不命中 "how"），短语按子串匹配。
//! 基础分 5，按请求长度、累计上下文规模、对话轮数微调，最终夹在 1..=10。

use serde::Serialize;

/// 任务类型（多组命中时后出现的规则覆盖前者）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    General,
    ComplexAnalysis,
    Reasoning,
    QuickResponse,
    CodeGeneration,
}

/// 复杂度分析结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskComplexity {
    /// 1..=10
    pub score: u8,
    pub requires_reasoning: bool,
    pub requires_speed: bool,
    pub estimated_tokens: usize,
    pub task_type: TaskType,
}

impl TaskComplexity {
    /// 直接构造（测试与外部调用方），标志按分数补全
    pub fn new(score: u8, requires_reasoning: bool, requires_speed: bool) -> Self {
        let score = score.clamp(1, 10);
        Self {
            score,
            requires_reasoning: requires_reasoning || score >= 7,
            requires_speed: requires_speed || score <= 3,
            estimated_tokens: 0,
            task_type: TaskType::General,
        }
    }

    pub fn with_estimated_tokens(mut self, tokens: usize) -> Self {
        self.estimated_tokens = tokens;
        self
    }

    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }
}

#[derive(Clone, Copy)]
enum Flag {
    Reasoning,
    Speed,
    None,
}

struct Rule {
    terms: &'static [&'static str],
    delta: i32,
    flag: Flag,
    task_type: TaskType,
}

const RULES: &[Rule] = &[
    Rule {
        terms: &[
            "refactor", "analyze", "debug", "optimize", "implement", "design", "architecture",
            "complex", "multiple", "across", "entire", "system",
        ],
        delta: 3,
        flag: Flag::Reasoning,
        task_type: TaskType::ComplexAnalysis,
    },
    Rule {
        terms: &[
            "why", "how", "explain", "analyze", "compare", "evaluate", "decide", "recommend",
            "strategy", "approach", "best", "optimize",
        ],
        delta: 2,
        flag: Flag::Reasoning,
        task_type: TaskType::Reasoning,
    },
    Rule {
        terms: &[
            "show", "list", "display", "status", "quick", "simple", "what is", "help", "summary",
        ],
        delta: -2,
        flag: Flag::Speed,
        task_type: TaskType::QuickResponse,
    },
    Rule {
        terms: &[
            "write", "create", "generate", "implement", "build", "develop", "function", "class",
            "method",
        ],
        delta: 1,
        flag: Flag::None,
        task_type: TaskType::CodeGeneration,
    },
];

const BASE_SCORE: i32 = 5;
const LONG_REQUEST_CHARS: usize = 400;
const LARGE_CONTEXT_TOKENS: usize = 8000;
const LONG_HISTORY_MESSAGES: usize = 10;

fn term_matches(lower: &str, words: &[&str], term: &str) -> bool {
    if term.contains(' ') {
        lower.contains(term)
    } else {
        words.iter().any(|w| w.starts_with(term))
    }
}

/// 分析请求复杂度
///
/// - `context_chars`：累计上下文（检索片段 + 历史结果）的字符数
/// - `history_len`：对话消息条数
pub fn analyze(request: &str, context_chars: usize, history_len: usize) -> TaskComplexity {
    let lower = request.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let mut score = BASE_SCORE;
    let mut requires_reasoning = false;
    let mut requires_speed = false;
    let mut task_type = TaskType::General;

    for rule in RULES {
        if rule.terms.iter().any(|t| term_matches(&lower, &words, t)) {
            score += rule.delta;
            task_type = rule.task_type;
            match rule.flag {
                Flag::Reasoning => requires_reasoning = true,
                Flag::Speed => requires_speed = true,
                Flag::None => {}
            }
        }
    }

    if request.chars().count() > LONG_REQUEST_CHARS {
        score += 1;
    }
    let context_tokens = context_chars / 4;
    if context_tokens > LARGE_CONTEXT_TOKENS {
        score += 1;
    }
    if history_len > LONG_HISTORY_MESSAGES {
        score += 1;
    }

    let score = score.clamp(1, 10) as u8;
    let estimated_tokens = request.split_whitespace().count() * 4 + context_tokens;

    TaskComplexity {
        score,
        requires_reasoning: requires_reasoning || score >= 7,
        requires_speed: requires_speed || score <= 3 || task_type == TaskType::QuickResponse,
        estimated_tokens,
        task_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quick_lookup_prefers_speed() {
        let c = analyze("show git status", 0, 0);
        assert_eq!(c.score, 3);
        assert!(c.requires_speed);
        assert!(!c.requires_reasoning);
        assert_eq!(c.task_type, TaskType::QuickResponse);
    }

    #[test]
    fn test_broad_scope_requires_reasoning() {
        let c = analyze("refactor the entire module and explain why", 0, 0);
        assert_eq!(c.score, 10);
        assert!(c.requires_reasoning);
        assert_eq!(c.task_type, TaskType::Reasoning);
    }

    #[test]
    fn test_mixed_request_sets_both_flags() {
        let c = analyze("quickly refactor the entire system and explain why", 0, 0);
        assert!(c.score >= 7);
        assert!(c.requires_reasoning && c.requires_speed);
    }

    #[test]
    fn test_context_and_history_raise_score() {
        let plain = analyze("rename variable", 0, 0);
        let heavy = analyze("rename variable", 40_000, 12);
        assert_eq!(plain.score, 5);
        assert_eq!(heavy.score, 7);
        assert_eq!(heavy.estimated_tokens, 2 * 4 + 10_000);
    }

    #[test]
    fn test_score_clamped() {
        let c = TaskComplexity::new(42, false, false);
        assert_eq!(c.score, 10);
        assert!(c.requires_reasoning);
        let c = TaskComplexity::new(0, false, false);
        assert_eq!(c.score, 1);
        assert!(c.requires_speed);
    }
}
