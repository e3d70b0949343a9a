//! Plan Interpreter：把模型的自由文本输出转为规范化的动作列表
//!
//! 由严到宽依次尝试，前一步失败只是信号，不报错：
//! 1. 去除思考段
//! 2. 整段解析为 JSON 文档
//! 3. 平衡定界符扫描，收集文本中所有合法文档（计划形态优先，其次取最大）
//! 4. 修复（尾随逗号、非法转义、截断）后重试
//! 5. 意图短语合成单个动作；否则原样回复

mod fallback;
mod normalize;
mod repair;
mod scan;
mod think;

use std::sync::Arc;

use serde_json::Value;

use crate::plan::{AcceptAll, Action, ActionValidator};

pub use fallback::intent_action;
pub use normalize::{is_plan_shaped, normalize, Normalized};
pub use repair::repair;
pub use scan::{scan, Candidate, ScanResult};
pub use think::strip_reasoning;

/// 修复阶段最多尝试的失败片段数
const MAX_REPAIR_SPANS: usize = 8;

/// 计划来自哪一步
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseSource {
    /// 去除思考段后文本为空
    Empty,
    /// 整段文本即文档
    Document,
    /// 从叙述文本中提取
    Extracted,
    /// 修复后解析成功
    Repaired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackKind {
    IntentPhrase,
    Verbatim,
}

/// 没有结构化内容时合成的单个动作
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackAction {
    pub action: Action,
    pub kind: FallbackKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    Plan {
        actions: Vec<Action>,
        source: ParseSource,
        /// 校验未通过而被丢弃的动作
        rejected: Vec<String>,
    },
    Fallback(FallbackAction),
}

impl Interpretation {
    /// 可执行的动作列表
    pub fn actions(&self) -> Vec<Action> {
        match self {
            Interpretation::Plan { actions, .. } => actions.clone(),
            Interpretation::Fallback(f) => vec![f.action.clone()],
        }
    }

    pub fn into_actions(self) -> Vec<Action> {
        match self {
            Interpretation::Plan { actions, .. } => actions,
            Interpretation::Fallback(f) => vec![f.action],
        }
    }

    pub fn rejected(&self) -> &[String] {
        match self {
            Interpretation::Plan { rejected, .. } => rejected,
            Interpretation::Fallback(_) => &[],
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Interpretation::Fallback(_))
    }

    /// 日志用标签
    pub fn label(&self) -> &'static str {
        match self {
            Interpretation::Plan { source, .. } => match source {
                ParseSource::Empty => "empty",
                ParseSource::Document => "document",
                ParseSource::Extracted => "extracted",
                ParseSource::Repaired => "repaired",
            },
            Interpretation::Fallback(f) => match f.kind {
                FallbackKind::IntentPhrase => "intent_phrase",
                FallbackKind::Verbatim => "verbatim",
            },
        }
    }
}

pub struct PlanInterpreter {
    validator: Arc<dyn ActionValidator>,
}

impl Default for PlanInterpreter {
    fn default() -> Self {
        Self::new(Arc::new(AcceptAll))
    }
}

impl PlanInterpreter {
    /// validator 通常是工具注册表：负责参数别名改写与必填参数检查
    pub fn new(validator: Arc<dyn ActionValidator>) -> Self {
        Self { validator }
    }

    /// 总能返回结果，不会失败
    pub fn interpret(&self, raw: &str) -> Interpretation {
        let text = strip_reasoning(raw);
        let text = text.trim();
        if text.is_empty() {
            return Interpretation::Plan {
                actions: Vec::new(),
                source: ParseSource::Empty,
                rejected: Vec::new(),
            };
        }

        if let Ok(value) = serde_json::from_str::<Value>(text) {
            if let Some(n) = self.normalize(&value) {
                return plan(n, ParseSource::Document);
            }
        }

        let scanned = scan(text);
        if let Some(n) = self.best_candidate(&scanned.valid) {
            return plan(n, ParseSource::Extracted);
        }

        if let Some(n) = self.try_repairs(text, &scanned) {
            return plan(n, ParseSource::Repaired);
        }

        if let Some(action) = intent_action(text) {
            tracing::debug!(action = %action.describe(), "no structured plan, synthesised action from intent phrase");
            return Interpretation::Fallback(FallbackAction {
                action,
                kind: FallbackKind::IntentPhrase,
            });
        }

        tracing::debug!("no structured plan, responding verbatim");
        Interpretation::Fallback(FallbackAction {
            action: Action::respond(text),
            kind: FallbackKind::Verbatim,
        })
    }

    fn normalize(&self, value: &Value) -> Option<Normalized> {
        normalize(value, self.validator.as_ref())
    }

    /// 计划形态候选中取最大；非计划形态的候选无法规范化为动作，直接忽略
    fn best_candidate(&self, candidates: &[Candidate]) -> Option<Normalized> {
        let mut shaped: Vec<&Candidate> = candidates.iter().filter(|c| is_plan_shaped(&c.value)).collect();
        shaped.sort_by(|a, b| b.len.cmp(&a.len).then(a.start.cmp(&b.start)));
        shaped.first().and_then(|c| self.normalize(&c.value))
    }

    fn try_repairs(&self, text: &str, scanned: &ScanResult) -> Option<Normalized> {
        let mut spans: Vec<(usize, usize)> = scanned.invalid.clone();
        spans.sort_by(|a, b| (b.1 - b.0).cmp(&(a.1 - a.0)).then(a.0.cmp(&b.0)));
        spans.truncate(MAX_REPAIR_SPANS);

        let mut attempts: Vec<&str> = spans.iter().map(|&(s, e)| &text[s..e]).collect();
        if let Some(start) = scanned.unterminated {
            attempts.push(&text[start..]);
        }
        if text.starts_with('{') || text.starts_with('[') {
            attempts.push(text);
        }

        for attempt in attempts {
            let repaired = repair(attempt);
            if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
                if let Some(n) = self.normalize(&value) {
                    return Some(n);
                }
            }
            // 修复后的片段内部可能仍夹着可用的子文档
            if let Some(n) = self.best_candidate(&scan(&repaired).valid) {
                return Some(n);
            }
        }
        None
    }
}

fn plan(n: Normalized, source: ParseSource) -> Interpretation {
    Interpretation::Plan {
        actions: n.actions,
        source,
        rejected: n.rejected,
    }
}

/// 使用不做校验的解释器
pub fn interpret(raw: &str) -> Interpretation {
    PlanInterpreter::default().interpret(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ToolAction, RESPOND_TOOL};
    use serde_json::json;

    fn source_of(i: &Interpretation) -> Option<ParseSource> {
        match i {
            Interpretation::Plan { source, .. } => Some(*source),
            Interpretation::Fallback(_) => None,
        }
    }

    #[test]
    fn test_empty_and_whitespace() {
        for raw in ["", "   \n", "<think>only thoughts</think>"] {
            let i = interpret(raw);
            assert_eq!(source_of(&i), Some(ParseSource::Empty));
            assert!(i.actions().is_empty());
        }
    }

    #[test]
    fn test_whole_document() {
        let i = interpret(r#"{"actions": [{"type": "tool_use", "tool_name": "git_status", "parameters": {}}]}"#);
        assert_eq!(source_of(&i), Some(ParseSource::Document));
        assert_eq!(i.actions(), vec![Action::tool("git_status", json!({}))]);
    }

    #[test]
    fn test_reasoning_block_does_not_pollute() {
        let raw = r#"<think>maybe {"action": "respond", "message": "wrong"}</think>
{"action": "use_tool", "tool": "read_file", "parameters": {"file_path": "a.rs"}}"#;
        let i = interpret(raw);
        assert_eq!(i.actions(), vec![Action::tool("read_file", json!({"file_path": "a.rs"}))]);
    }

    #[test]
    fn test_extracts_from_prose_and_fences() {
        let raw = "Sure! Here is my plan:\n```json\n{\"tool_name\": \"list_directory\", \"args\": {\"path\": \".\"}}\n```\nLet me know.";
        let i = interpret(raw);
        assert_eq!(source_of(&i), Some(ParseSource::Extracted));
        assert_eq!(i.actions(), vec![Action::tool("list_directory", json!({"path": "."}))]);
    }

    #[test]
    fn test_shape_match_beats_larger_candidate() {
        let raw = r#"Context: {"files": ["a.rs", "b.rs", "c.rs"], "notes": "a very long unrelated document body"}
Plan: {"actions": []}"#;
        let i = interpret(raw);
        assert_eq!(source_of(&i), Some(ParseSource::Extracted));
        assert!(i.actions().is_empty());
    }

    #[test]
    fn test_largest_shaped_candidate_wins() {
        let raw = r#"{"tool": "a"} and then {"actions": [{"tool": "b"}, {"tool": "c"}]}"#;
        let i = interpret(raw);
        let names: Vec<_> = i.actions().iter().filter_map(|a| a.tool_name().map(str::to_string)).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn test_repairs_trailing_comma_and_truncation() {
        let i = interpret(r#"Plan: {"actions": [{"tool": "git_status", "args": {},},]}"#);
        assert_eq!(source_of(&i), Some(ParseSource::Repaired));
        assert_eq!(i.actions(), vec![Action::tool("git_status", json!({}))]);

        let i = interpret(r#"{"actions": [{"type": "tool_use", "tool_name": "read_file", "parameters": {"file_path": "src/li"#);
        assert_eq!(source_of(&i), Some(ParseSource::Repaired));
        assert_eq!(i.actions(), vec![Action::tool("read_file", json!({"file_path": "src/li"}))]);
    }

    #[test]
    fn test_plan_after_long_checklist() {
        let mut raw: String = (0..600).map(|i| format!("- [x] item {i}\n")).collect();
        raw.push_str(r#"Plan: {"actions": [{"tool": "git_status"}]}"#);
        let i = interpret(&raw);
        assert_eq!(source_of(&i), Some(ParseSource::Extracted));
        assert_eq!(i.actions(), vec![Action::tool("git_status", json!({}))]);
    }

    #[test]
    fn test_repairs_invalid_escape() {
        let i = interpret(r#"{"tool": "read_file", "args": {"file_path": "C:\src\lib.rs"}}"#);
        assert_eq!(i.actions(), vec![Action::tool("read_file", json!({"file_path": r"C:\src\lib.rs"}))]);
    }

    #[test]
    fn test_intent_phrase_fallback() {
        let i = interpret("I should search for \"fn main\" first.");
        match &i {
            Interpretation::Fallback(f) => {
                assert_eq!(f.kind, FallbackKind::IntentPhrase);
                assert_eq!(f.action.tool_name(), Some("search_files"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_verbatim_fallback_for_prose_and_garbage() {
        for raw in ["Hello there, how can I help?", "{{{{", "]]}} nonsense {", "{\"foo\": 1}"] {
            let i = interpret(raw);
            assert!(i.is_fallback(), "{raw}");
            let actions = i.actions();
            assert_eq!(actions.len(), 1);
            assert_eq!(actions[0].tool_name(), Some(RESPOND_TOOL));
        }
    }

    #[test]
    fn test_validator_rejections_are_reported() {
        struct NeedsPath;
        impl ActionValidator for NeedsPath {
            fn validate(&self, action: ToolAction) -> Result<ToolAction, String> {
                if action.tool_name == "read_file" && action.param_str("file_path").is_none() {
                    return Err("read_file: missing required parameter 'file_path'".into());
                }
                Ok(action)
            }
        }
        let interpreter = PlanInterpreter::new(Arc::new(NeedsPath));
        let i = interpreter.interpret(r#"{"actions": [{"tool": "read_file", "args": {}}, {"tool": "git_status"}]}"#);
        assert_eq!(i.actions(), vec![Action::tool("git_status", json!({}))]);
        assert_eq!(i.rejected().len(), 1);
    }

    #[test]
    fn test_never_panics_on_odd_input() {
        let inputs = [
            "\"just a string\"",
            "42",
            "null",
            "[1, 2, {\"x\": ",
            "</think>",
            "{\"actions\": \"nope\"}",
            "日本語のテキスト {\"message\": \"こんにちは\"}",
            "\\\\\\\"",
        ];
        for raw in inputs {
            let _ = interpret(raw).actions();
        }
        let i = interpret("日本語のテキスト {\"message\": \"こんにちは\"}");
        assert_eq!(i.actions(), vec![Action::respond("こんにちは")]);
    }
}
